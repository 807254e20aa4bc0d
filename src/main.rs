//! soundprobe CLI entry point

use clap::Parser;
use soundprobe::config::{Cli, Settings};
use soundprobe::error::EXIT_CLIENT_ERROR;
use soundprobe::export::Response;
use soundprobe::pipeline::{CancellationToken, Orchestrator};
use soundprobe::RawUpload;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli);

    let settings = Settings::from_cli(&cli);

    let bytes = match std::fs::read(&cli.input) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!(
                "Error: cannot read {}: {}\n\n  Tip: Check the path is correct and accessible.\n  Example:\n    soundprobe -i ./track.mp3",
                cli.input.display(),
                e
            );
            return ExitCode::from(EXIT_CLIENT_ERROR);
        }
    };

    let orchestrator = match Orchestrator::new(settings) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let upload = RawUpload::new(cli.upload_name(), bytes);
    let outcome = orchestrator.handle(Some(upload), &CancellationToken::new());
    debug!(
        "Request {} visited {:?}",
        outcome.request_id, outcome.transitions
    );

    let response = Response::from_result(&outcome.result);
    if let Err(e) = response.write_to(std::io::stdout().lock(), cli.pretty) {
        eprintln!("Fatal error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::from(response.status.exit_code())
}

fn init_logging(cli: &Cli) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
