use std::process::ExitCode;

use clap::Parser;
use loader_installer_lib::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    loader_installer_lib::init_tracing();
    let cli = Cli::parse();
    cli::execute(cli).await
}
