//! questctl - command line client for questd

use clap::Parser;
use questctl::cli::Cli;
use questctl::client::DaemonError;
use questctl::output;
use quest_common::ErrorKind;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match questctl::commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<DaemonError>() {
                // Refusals exit 1, faults exit 2
                Some(daemon) if daemon.kind() != ErrorKind::Storage => {
                    output::print_error(&daemon.to_string());
                    ExitCode::from(1)
                }
                _ => {
                    output::print_error(&format!("{:#}", e));
                    ExitCode::from(2)
                }
            }
        }
    }
}
