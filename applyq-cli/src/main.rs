use applyq_cli::{commands, output};
use clap::{Parser, Subcommand};
use eyre::Result;

#[derive(Parser)]
#[command(name = "applyq")]
#[command(version)]
struct Cli {
    /// Suppress output (errors and final result only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed output with timing information and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind the pipeline and evaluate it over the project's rows
    Run {
        /// Directory containing applyq.toml (defaults to current directory or project root)
        #[clap(short, long)]
        path: Option<String>,

        /// Write the result rows to this file instead of stdout
        #[clap(short, long)]
        output: Option<String>,

        /// Print the rows as single-line JSON
        #[clap(long)]
        compact: bool,
    },

    /// Print the bound plan without evaluating it
    Explain {
        /// Directory containing applyq.toml (defaults to current directory or project root)
        #[clap(short, long)]
        path: Option<String>,

        /// Render for this translated provider instead of the configured backend
        #[clap(long)]
        provider: Option<String>,
    },

    /// Validate the project configuration, schema and pipeline
    Check {
        /// Directory containing applyq.toml (defaults to current directory or project root)
        #[clap(short, long)]
        path: Option<String>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let verbosity = output::Verbosity::from_flags(cli.quiet, cli.verbose);
    output::Verbosity::set(verbosity);
    output::init_tracing(verbosity);

    let result = match cli.command {
        Commands::Run {
            path,
            output,
            compact,
        } => commands::run::run(path, output, compact),
        Commands::Explain { path, provider } => commands::explain::run(path, provider),
        Commands::Check { path } => commands::check::run(path),
    };

    if let Err(e) = result {
        eprintln!("{e:?}");
        std::process::exit(1);
    }

    Ok(())
}
