//! `rpzd serve` - run the policy zone server until ctrl-c.

use anyhow::Result;
use rpz_srv::ServerConfig;
use tracing::{info, warn};

use crate::cli::args::ServeArgs;

pub async fn execute(mut config: ServerConfig, args: ServeArgs) -> Result<()> {
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    info!(
        zone = %config.zone.name,
        listen = %config.listen,
        lists = config.lists.len(),
        downstreams = config.downstreams.len(),
        "starting rpzd"
    );

    let serial = rpz_srv::server::serve(&config, shutdown_signal()).await?;
    info!(serial, "rpzd stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            // Without a signal handler the server runs until it fails.
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
