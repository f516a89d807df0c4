use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gridsql_shell::{shell, telemetry};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    telemetry::init("gridsql-shell")?;
    let cli = shell::Cli::parse();
    let router = cli.connect().await?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received; cancelling running statement");
                on_signal.cancel();
            }
            Err(error) => warn!(%error, "failed to listen for interrupt"),
        }
    });

    let summary = shell::run(
        &router,
        cli.fail_fast,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown,
    )
    .await?;
    info!(executed = summary.executed, failed = summary.failed, "session finished");

    if cli.fail_fast && summary.failed > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
