use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use coverage_runner::app::{self, Cli};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    app::init_tracing(cli.verbose);
    app::run(cli)
}
