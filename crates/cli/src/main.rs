mod check;
mod graph;
mod select;
mod session;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Formwire form and rule inspection tool.
#[derive(Parser)]
#[command(name = "formwire", version, about = "Formwire form and rule inspection tool")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override `calculation_hops` from the configuration
    #[arg(long, global = true)]
    calculation_hops: Option<usize>,

    /// Log engine activity to stderr (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Form and rule files shared by every subcommand.
#[derive(clap::Args)]
pub(crate) struct FormArgs {
    /// Path to the form-structure JSON file
    #[arg(long)]
    form: PathBuf,
    /// Rules file, used when the form does not name one
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which fields watch which subjects, and the rules each binding fires
    Graph {
        #[command(flatten)]
        files: FormArgs,
    },

    /// List the rules selected when a field changes
    Select {
        #[command(flatten)]
        files: FormArgs,
        /// Name of the changed field
        #[arg(long)]
        field: String,
    },

    /// Report rules, subjects and calculations that refer to nothing
    Check {
        #[command(flatten)]
        files: FormArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => match formwire_engine::EngineConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                report_error(&e.to_string(), cli.output, cli.quiet);
                process::exit(1);
            }
        },
        None => formwire_engine::EngineConfig::default(),
    };
    if let Some(hops) = cli.calculation_hops {
        config.calculation_hops = hops;
    }

    match cli.command {
        Commands::Graph { files } => {
            graph::cmd_graph(&files, config, cli.output, cli.quiet);
        }
        Commands::Select { files, field } => {
            select::cmd_select(&files, &field, config, cli.output, cli.quiet);
        }
        Commands::Check { files } => {
            check::cmd_check(&files, config, cli.output, cli.quiet);
        }
    }
}

/// `RUST_LOG` wins when set; otherwise `warn`, or `debug` with `-v`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Report an error to stderr in the requested format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
