mod cli;
mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli::command().get_matches();

    let filter = if matches.get_flag("verbose") {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_default();

    match matches.subcommand() {
        Some((cli::SERVE, sub)) => match commands::serve::run(sub, &config_path).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %format!("{e:#}"), "Fatal");
                ExitCode::FAILURE
            }
        },
        Some((name, sub)) => match chbackup_core::operation::find(name) {
            Some(op) => commands::operation::run(op, sub, &config_path).await,
            None => ExitCode::from(2),
        },
        None => ExitCode::from(2),
    }
}
