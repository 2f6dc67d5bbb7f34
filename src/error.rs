use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error categories reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credential or invalid settings
    Configuration,
    /// Unreadable input or unwritable output
    FileAccess,
    /// LLM call failure, including malformed responses
    Request,
    /// Diagram text the renderer cannot handle
    Render,
    /// Serialization and clock failures
    Internal,
}

/// Error types for the codeqa library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// The API credential is not available.
    #[error("Missing credential: {variable} is not set")]
    MissingCredential {
        /// Name of the environment variable expected to hold the key
        variable: String,
    },

    /// Prompt template registration or rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// No loadable files found in directory.
    #[error("No readable text files found in '{path}'. Check .gitignore rules, filters or file permissions.")]
    NoFiles {
        /// Directory that was scanned
        path: PathBuf,
    },

    /// Invalid UTF-8 encountered in file.
    #[error("Invalid UTF-8 encoding in file '{path}'. File may be binary or use unsupported encoding.")]
    InvalidUtf8 {
        /// Path to file with encoding issues
        path: PathBuf,
    },

    /// Transport-level failure talking to the LLM endpoint.
    #[error("LLM request failed: {message}")]
    Request {
        /// Error message
        message: String,
    },

    /// The LLM endpoint answered with a non-success status.
    #[error("LLM API error ({status}): {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Model output did not match the expected schema.
    #[error("Malformed LLM response: {message}")]
    Parse {
        /// What was wrong with the response
        message: String,
    },

    /// Refinement produced fewer valid pairs than required.
    #[error("Refinement produced {found} valid pairs, at least {minimum} required")]
    InsufficientPairs {
        /// Number of valid pairs after refinement
        found: usize,
        /// Configured minimum
        minimum: usize,
    },

    /// Diagram text rejected by validation or by the renderer.
    #[error("Diagram rendering failed: {message}")]
    Render {
        /// Error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// System time error.
    #[error("System time error: {message}")]
    SystemTime {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a missing credential error.
    #[must_use]
    pub fn missing_credential(variable: impl Into<String>) -> Self {
        Self::MissingCredential {
            variable: variable.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        // tera hides the useful part of the message in the source chain
        let mut message = source.to_string();
        let mut cause = std::error::Error::source(&source);
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }

        Self::Template {
            template: template.into(),
            message,
        }
    }

    /// Creates a template error from a validation message.
    #[must_use]
    pub fn invalid_template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid UTF-8 error.
    #[must_use]
    pub fn invalid_utf8(path: impl Into<PathBuf>) -> Self {
        Self::InvalidUtf8 { path: path.into() }
    }

    /// Creates a no files error.
    #[must_use]
    pub fn no_files(path: impl Into<PathBuf>) -> Self {
        Self::NoFiles { path: path.into() }
    }

    /// Creates a request error.
    #[must_use]
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a render error.
    #[must_use]
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    /// Returns the category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::MissingCredential { .. } | Self::Template { .. } => {
                ErrorKind::Configuration
            }
            Self::Io { .. } | Self::NoFiles { .. } | Self::InvalidUtf8 { .. } => {
                ErrorKind::FileAccess
            }
            Self::Request { .. }
            | Self::Api { .. }
            | Self::Parse { .. }
            | Self::InsufficientPairs { .. } => ErrorKind::Request,
            Self::Render { .. } => ErrorKind::Render,
            Self::Serialization { .. } | Self::SystemTime { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration)
    }

    /// Returns true if this is a file access error.
    #[must_use]
    pub const fn is_file_access(&self) -> bool {
        matches!(self.kind(), ErrorKind::FileAccess)
    }

    /// Returns true if this is a request error.
    #[must_use]
    pub const fn is_request(&self) -> bool {
        matches!(self.kind(), ErrorKind::Request)
    }

    /// Returns true if this is a render error.
    #[must_use]
    pub const fn is_render(&self) -> bool {
        matches!(self, Self::Render { .. })
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(e: std::time::SystemTimeError) -> Self {
        Self::SystemTime {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            format!("request timed out: {e}")
        } else if e.is_connect() {
            format!("could not connect: {e}")
        } else {
            e.to_string()
        };
        Self::Request { message }
    }
}
