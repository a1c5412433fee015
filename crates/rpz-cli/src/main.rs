//! rpzd - response policy zone aggregation server.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    rpz_cli::run().await
}
