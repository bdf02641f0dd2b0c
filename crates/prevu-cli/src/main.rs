#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "prevu")]
#[command(author, version, about = "Instant in-memory preview for TypeScript/React projects", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Watch a project directory and run it in the live preview
    Run {
        /// Project directory
        dir: PathBuf,

        /// Entry-point module whose default export mounts as the app root
        #[arg(long, default_value = "src/App.tsx")]
        entry: String,

        /// Compile and execute once, print the rendered HTML, then exit
        #[arg(long)]
        once: bool,

        /// Persist the mock data store to disk, keyed by --project-id
        #[arg(long)]
        durable: bool,

        /// Project identity for durable store snapshots
        #[arg(long, default_value = "default")]
        project_id: String,
    },

    /// Compile a project directory into a bundle script
    Build {
        /// Project directory
        dir: PathBuf,

        /// Entry-point module
        #[arg(long, default_value = "src/App.tsx")]
        entry: String,

        /// Output file (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    match cli.command {
        Commands::Version => commands::version::run(cli.json),
        Commands::Run {
            dir,
            entry,
            once,
            durable,
            project_id,
        } => commands::run::run(&dir, entry, once, durable, project_id, cli.json).await,
        Commands::Build { dir, entry, out } => commands::build::run(&dir, &entry, out.as_deref()),
    }
}
