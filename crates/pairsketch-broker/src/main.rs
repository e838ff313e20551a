//! PairSketch broker binary.

use pairsketch_broker::{BrokerState, router};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

/// Environment variable overriding the listen address.
const ADDR_ENV: &str = "PAIRSKETCH_BROKER_ADDR";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pairsketch_broker=info,tower_http=info".into()),
        )
        .init();

    let addr: SocketAddr = match std::env::var(ADDR_ENV) {
        Ok(value) => value.parse()?,
        Err(_) => SocketAddr::from(([0, 0, 0, 0], 3030)),
    };

    let app = router(Arc::new(BrokerState::new()));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("PairSketch broker listening on {}", listener.local_addr()?);
    info!("WebSocket endpoint: ws://localhost:{}/ws", addr.port());

    axum::serve(listener, app).await?;
    Ok(())
}
