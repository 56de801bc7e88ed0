//! Server state management.

use std::sync::Arc;

use crate::orchestration::Orchestrator;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Shared server state handed to every request handler.
///
/// The orchestrator serializes operations per VM itself, so no outer lock is needed.
#[derive(Clone)]
pub struct ServerState {
    orchestrator: Arc<Orchestrator>,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl ServerState {
    /// Creates the state around `orchestrator`.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// The shared orchestrator.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}
