//! YAKS CLI
//!
//! Runs declarative tests as Test resources on a Kubernetes cluster.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use yaks_common::telemetry::{init_tracing, TelemetryConfig};

use yaks_cli::console::Console;
use yaks_cli::{Cli, Error, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(TelemetryConfig {
        format: cli.globals.log_format.into(),
        ..Default::default()
    })
    .map_err(|e| Error::config(e.to_string()))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping the run");
            on_interrupt.cancel();
        }
    });

    cli.run(Console::stdio(), cancel).await
}
