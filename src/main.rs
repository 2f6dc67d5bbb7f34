use anyhow::Context;
use clap::{Parser, Subcommand};
use codeqa::{
    Config, ContextMode, DiagramSource, FileFilterConfig, OpenAiClient, Pipeline,
    RenderMode, RendererKind, stage::print_summary,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "codeqa",
    version,
    author,
    about = "Generate question-answer pairs and diagrams from a codebase with an LLM",
    long_about = "Sends a codebase to an OpenAI-compatible chat-completion API to produce \
    question-answer pairs and Mermaid class diagrams, then renders the diagrams.\n\n\
    The stages run in a fixed order and communicate through files in the output \
    directory, so each one can be re-run on its own.\n\n\
    USAGE EXAMPLES:\n  \
      # Run every stage on ./src\n  \
      codeqa --dir ./src run\n\n  \
      # Generate pairs with one request per file\n  \
      codeqa --dir ./src generate --per-file\n\n  \
      # Draw the diagram without the LLM and render it to SVG\n  \
      codeqa --dir ./src describe --from-analysis\n  \
      codeqa render --renderer svg\n\n  \
      # Ask about one file\n  \
      codeqa --dir ./src ask \"What does api.py do?\""
)]
struct Cli {
    /// Codebase directory to read source files from
    #[arg(short, long, default_value = ".", value_name = "PATH", global = true)]
    dir: PathBuf,

    /// Output directory for all stage files
    #[arg(short, long, default_value = "output", value_name = "PATH", global = true)]
    out: PathBuf,

    /// API key for the chat-completion endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Chat-completion model
    #[arg(long, env = "CODEQA_MODEL", default_value = "gpt-4", global = true)]
    model: String,

    /// Base URL of the OpenAI-compatible API
    #[arg(
        long,
        env = "OPENAI_BASE_URL",
        default_value = "https://api.openai.com/v1",
        global = true
    )]
    base_url: String,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.0, global = true)]
    temperature: f32,

    /// Upper bound on tokens per response
    #[arg(long, value_name = "N", global = true)]
    max_response_tokens: Option<u32>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 120, value_name = "SECS", global = true)]
    timeout: u64,

    /// Directory with .tera files overriding built-in prompts
    #[arg(long, value_name = "PATH", global = true)]
    prompts: Option<PathBuf>,

    /// Only load files matching these globs
    #[arg(long = "include", value_name = "GLOB", global = true)]
    include: Vec<String>,

    /// Skip files matching these globs
    #[arg(long = "exclude", value_name = "GLOB", global = true)]
    exclude: Vec<String>,

    /// Skip directories matching these globs
    #[arg(long = "exclude-dir", value_name = "GLOB", global = true)]
    exclude_dir: Vec<String>,

    /// Overwrite outputs without keeping a backup
    #[arg(long, global = true)]
    no_backup: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Task 1: generate question-answer pairs from the codebase
    Generate(GenerateArgs),

    /// Task 2: deduplicate and improve the generated pairs
    Refine(RefineArgs),

    /// Task 3: write a Mermaid diagram of the codebase structure
    Describe(DescribeArgs),

    /// Task 4: render the diagram
    Render(RenderArgs),

    /// Analyze Python sources and write analysis.json
    Analyze,

    /// Answer a question about a file named in it
    Ask {
        /// Question mentioning a file, e.g. "What does api.py do?"
        question: String,
    },

    /// Run Tasks 1 to 4 in order
    Run {
        #[command(flatten)]
        generate: GenerateArgs,

        #[command(flatten)]
        refine: RefineArgs,

        #[command(flatten)]
        describe: DescribeArgs,

        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(clap::Args, Debug)]
struct GenerateArgs {
    /// Send one request per file instead of packing the codebase
    #[arg(long)]
    per_file: bool,

    /// Estimated token budget of one request
    #[arg(long, default_value_t = 100_000, value_name = "N")]
    max_tokens: usize,
}

#[derive(clap::Args, Debug)]
struct RefineArgs {
    /// Fail if fewer refined pairs remain
    #[arg(long, default_value_t = 1, value_name = "N")]
    min_pairs: usize,
}

#[derive(clap::Args, Debug)]
struct DescribeArgs {
    /// Build the diagram from the structure analysis without the LLM
    #[arg(long)]
    from_analysis: bool,
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// Let the LLM repair the diagram before rendering
    #[arg(long)]
    reinterpret: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "html")]
    renderer: CliRenderer,

    /// Mermaid CLI executable for svg and png output
    #[arg(long, default_value = "mmdc", value_name = "PATH")]
    mmdc: PathBuf,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliRenderer {
    Html,
    Svg,
    Png,
}

impl From<CliRenderer> for RendererKind {
    fn from(r: CliRenderer) -> Self {
        match r {
            CliRenderer::Html => Self::Html,
            CliRenderer::Svg => Self::Svg,
            CliRenderer::Png => Self::Png,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let config = build_config(&cli).context("Failed to build configuration")?;
    let client = OpenAiClient::new(&config).context("Failed to create LLM client")?;
    let pipeline = Pipeline::new(config, client).context("Failed to create pipeline")?;

    let reports = match &cli.command {
        Command::Generate(_) => vec![pipeline.generate().context("QA generation failed")?],
        Command::Refine(_) => vec![pipeline.refine().context("QA refinement failed")?],
        Command::Describe(_) => vec![pipeline.describe().context("Diagram description failed")?],
        Command::Render(_) => vec![pipeline.render().context("Diagram rendering failed")?],
        Command::Ask { question } => {
            vec![pipeline.ask(question).context("Answering the question failed")?]
        }
        Command::Analyze => {
            let analysis = pipeline.analyze().context("Analysis failed")?;
            for file in &analysis.files {
                println!(
                    "{}: {} class(es), {} function(s), {} import(s)",
                    file.path,
                    file.classes.len(),
                    file.functions.len(),
                    file.imports.len()
                );
            }
            println!("Common functions: {}", analysis.common_functions_summary());
            println!("✓ Wrote {}", pipeline.config().analysis_path().display());
            return Ok(());
        }
        Command::Run { .. } => pipeline.run_all().context("Pipeline execution failed")?,
    };

    print_summary(&reports);
    Ok(())
}

fn build_config(cli: &Cli) -> codeqa::Result<Config> {
    let mut builder = Config::builder()
        .root_dir(&cli.dir)
        .output_dir(&cli.out)
        .api_key(cli.api_key.clone())
        .model(&cli.model)
        .base_url(&cli.base_url)
        .temperature(cli.temperature)
        .max_response_tokens(cli.max_response_tokens)
        .request_timeout(Duration::from_secs(cli.timeout))
        .backup_existing(!cli.no_backup)
        .file_filter_config(
            FileFilterConfig::new()
                .allow_only(cli.include.clone())
                .exclude_files(cli.exclude.clone())
                .exclude_directories(cli.exclude_dir.clone()),
        );

    if let Some(ref dir) = cli.prompts {
        builder = builder.prompt_dir(dir);
    }

    let (generate, refine, describe, render) = match &cli.command {
        Command::Generate(g) => (Some(g), None, None, None),
        Command::Refine(r) => (None, Some(r), None, None),
        Command::Describe(d) => (None, None, Some(d), None),
        Command::Render(r) => (None, None, None, Some(r)),
        Command::Run {
            generate,
            refine,
            describe,
            render,
        } => (Some(generate), Some(refine), Some(describe), Some(render)),
        Command::Analyze | Command::Ask { .. } => (None, None, None, None),
    };

    if let Some(args) = generate {
        builder = builder
            .context_mode(if args.per_file {
                ContextMode::PerFile
            } else {
                ContextMode::Codebase
            })
            .max_context_tokens(args.max_tokens);
    }

    if let Some(args) = refine {
        builder = builder.min_refined_pairs(args.min_pairs);
    }

    if let Some(args) = describe {
        builder = builder.diagram_source(if args.from_analysis {
            DiagramSource::Analysis
        } else {
            DiagramSource::Llm
        });
    }

    if let Some(args) = render {
        builder = builder
            .render_mode(if args.reinterpret {
                RenderMode::Reinterpret
            } else {
                RenderMode::Forward
            })
            .renderer(args.renderer.into())
            .mmdc_program(&args.mmdc);
    }

    builder.build()
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("codeqa=info"),
        1 => EnvFilter::new("codeqa=debug"),
        _ => EnvFilter::new("codeqa=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .init();

    Ok(())
}
