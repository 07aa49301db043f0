//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, OutputFlags};
use crate::commands;

/// Disposable vSphere virtual machines for tests and builds
#[derive(Parser)]
#[command(
    name = "vcdriver",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Clone fresh VMs, run a command on each, destroy them
    Run(commands::run::RunArgs),

    /// Show the resolved configuration
    Config(commands::config::ConfigArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Output flags shared by every command.
    #[must_use]
    pub fn output_flags(&self) -> OutputFlags {
        OutputFlags {
            no_color: self.no_color,
            quiet: self.quiet,
            json: self.json,
        }
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let app = AppContext::new(&self.output_flags());
        match self.command {
            Command::Version => {
                commands::version::run(app.json);
                Ok(())
            }
            Command::Config(args) => commands::config::run(&app, &args),
            Command::Run(args) => commands::run::run(&app, args).await,
        }
    }
}
