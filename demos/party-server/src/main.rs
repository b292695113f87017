use partyhall::prelude::*;

/// Listen address used when `PARTYHALL_ADDR` is unset.
const DEFAULT_ADDR: &str = "0.0.0.0:8080";

fn bind_addr(configured: Option<String>) -> String {
    configured
        .filter(|addr| !addr.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string())
}

async fn build_server(addr: &str) -> Result<PartyhallServer, PartyhallError> {
    PartyhallServer::builder().bind(addr).build().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    partyhall::setup_logger(env!("CARGO_PKG_NAME"), "info");

    let addr = bind_addr(std::env::var("PARTYHALL_ADDR").ok());
    let server = build_server(&addr).await?;
    tracing::info!(addr = %server.local_addr()?, "party server listening");
    server.run().await?;
    Ok(())
}
