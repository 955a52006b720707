use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use acsystem::config::Cli;
use acsystem::logging::init_logging;
use acsystem::SystemMonitor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug).context("failed to initialise logging")?;

    info!("starting AC system aggregation supervisor");
    let connection = cli.dbus.connect().await.context("failed to connect to D-Bus")?;

    let monitor = SystemMonitor::new(connection);
    let monitor_for_run = monitor.clone();
    let run_task = tokio::spawn(async move { monitor_for_run.run().await });
    let tick_task = tokio::spawn(acsystem::tick::run(monitor));

    tokio::select! {
        result = run_task => {
            match result {
                Ok(Ok(())) => info!("bus discovery loop exited"),
                Ok(Err(e)) => error!("bus discovery loop failed: {e}"),
                Err(e) => error!("bus discovery task panicked: {e}"),
            }
        }
        result = tick_task => {
            if let Err(e) = result {
                error!("tick loop task panicked: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, shutting down");
        }
    }

    Ok(())
}
