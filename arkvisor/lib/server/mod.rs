//! HTTP surface of the orchestrator.
//!
//! A thin axum layer over [`Orchestrator`](crate::orchestration::Orchestrator): every route
//! parses its request, calls one orchestrator operation and renders the result. Request
//! bodies that fail to parse are rejected with `400` before anything else happens.

mod handlers;
mod routes;
mod state;
mod types;

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;

use crate::{orchestration::Orchestrator, ArkvisorResult};

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use routes::*;
pub use state::*;
pub use types::*;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Serves the API on `addr` until the process receives Ctrl-C.
pub async fn serve(orchestrator: Arc<Orchestrator>, addr: SocketAddr) -> ArkvisorResult<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("arkvisor listening on {}", listener.local_addr()?);

    serve_on(listener, orchestrator).await
}

/// Serves the API on an already bound listener until the process receives Ctrl-C.
pub async fn serve_on(listener: TcpListener, orchestrator: Arc<Orchestrator>) -> ArkvisorResult<()> {
    let router = create_router(ServerState::new(orchestrator));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("arkvisor server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c, shutting down"),
        Err(e) => tracing::error!("failed to listen for ctrl-c: {}", e),
    }
}
