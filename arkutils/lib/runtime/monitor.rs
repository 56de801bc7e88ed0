use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpStream;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// A check that decides when a launched process is actually serving.
///
/// Spawning a process only proves that the binary started. A probe is polled by the
/// supervisor until it succeeds or the process exits.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Returns true once the process is ready.
    async fn is_ready(&self) -> bool;

    /// A short human-readable description used in logs.
    fn describe(&self) -> String;
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Considers a process ready as soon as it has been spawned.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnedProbe;

/// Considers a process ready once a TCP connection to `addr` succeeds.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    addr: SocketAddr,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TcpProbe {
    /// Creates a probe for `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ReadinessProbe for SpawnedProbe {
    async fn is_ready(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        "spawned".to_string()
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn is_ready(&self) -> bool {
        TcpStream::connect(self.addr).await.is_ok()
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.addr)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
