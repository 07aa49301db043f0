//! vcdriver - Disposable vSphere virtual machines for tests and builds

use clap::Parser;

use vcdriver::cli::Cli;
use vcdriver::domain::error::is_fatal;
use vcdriver::output::OutputContext;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let output = OutputContext::new(cli.no_color, false);
    if let Err(e) = cli.run().await {
        let prefix = if is_fatal(&e) { "fatal: " } else { "" };
        output.error(&format!("{prefix}{e:#}"));
        std::process::exit(1);
    }
}
