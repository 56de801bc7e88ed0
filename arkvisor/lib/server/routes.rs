//! Route definitions for the HTTP server.

use axum::{
    routing::{get, post},
    Router,
};

use super::{handlers, state::ServerState};

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Creates a router with every API endpoint configured.
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/vm/create", post(handlers::create_handler))
        .route("/vm/start/{name}", post(handlers::start_handler))
        .route("/vm/stop/{name}", post(handlers::stop_handler))
        .route("/vm/status/{name}", get(handlers::status_handler))
        .route("/vm/migrate/{name}", post(handlers::migrate_handler))
        .route("/vm/logs/{name}", get(handlers::logs_handler))
        .with_state(state)
}
