//! mmdshot CLI - Mermaid diagram screenshot harness.
//!
//! Provides commands for:
//! - `run`: Render a batch, trim the screenshots and write the checksum report
//! - `validate`: Check a batch and print the normalized renderer request

mod commands;
mod error;
mod input;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{RunArgs, ValidateArgs};
use output::Output;

/// mmdshot - Mermaid diagram screenshot harness.
#[derive(Parser)]
#[command(name = "mmdshot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a batch of diagrams to trimmed screenshots.
    Run(RunArgs),
    /// Validate a batch and print the normalized request.
    Validate(ValidateArgs),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Self::Run(args) => args.verbose,
            Self::Validate(args) => args.verbose,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.command.verbose() {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run(args) => args.execute(),
        Commands::Validate(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
