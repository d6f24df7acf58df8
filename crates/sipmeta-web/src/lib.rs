//! sipmeta-web - HTTP API for sipmeta using Axum

pub mod router;
pub mod sse;

pub use router::create_router;

use anyhow::Result;
use sipmeta_core::TokenService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Run the web server
pub async fn run(service: Arc<TokenService>, port: u16) -> Result<()> {
    let router = create_router(service);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;

    info!("HTTP API listening on http://{}", addr);
    println!("HTTP API listening on http://{}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
