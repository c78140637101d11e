use std::{

    process::{ExitCode},
};

use anyhow::{Context, Result};
use clap::{Parser};
use tracing::{warn, Level};

use echotrace::{

    cli::{Cli},
    StopFlag,
    app,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    cli.validate().map_err(anyhow::Error::msg)?;

    // First Ctrl+C asks the running command to wrap up, a second one quits.
    let stop = StopFlag::new();
    let handle = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if handle.is_raised() {
            std::process::exit(130);
        }
        handle.raise();
    }) {
        warn!("Could not install Ctrl+C handler: {}", e);
    }

    app::execute(&cli.command, &stop)
        .with_context(|| format!("{} failed", cli.command.name()))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}
