//! `arkvisor` drives the lifecycle of drafter VMs on a single host.
//!
//! # Overview
//!
//! A VM goes through three request-scoped phases, each of which launches external drafter
//! helpers as supervised background processes and returns as soon as they are spawned:
//!
//! - **Create** downloads the OS and application bundles, extracts them into a blueprint
//!   directory, makes sure the host-wide NAT service is up and launches the snapshotter that
//!   packages the VM.
//! - **Start** resumes a packaged VM: a peer listens for migration requests and a forwarder
//!   exposes the guest service on the host.
//! - **Migrate** pulls a running VM from another host: the local peer connects to the
//!   source's peer and a forwarder exposes the guest service on a separate port.
//!
//! **Stop** terminates a VM's helpers, **status** reports which of its services appear to be
//! running and **logs** returns the helper output of its latest request.
//!
//! Nothing is kept in memory between requests. Everything is reconstructed from the output
//! tree, the pid files under the state directory and the host process table.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use arkvisor::{
//!     config::{ArkvisorConfig, VmConfig},
//!     orchestration::Orchestrator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ArkvisorConfig::load(None).await?;
//!     let orchestrator = Orchestrator::new(config)?;
//!
//!     let vm = VmConfig::builder().name("valkey").memory("1024").build();
//!     let launched = orchestrator.create(vm).await?;
//!     println!("logs at {}", launched.logs_path.display());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`artifact`] - Bundle download and extraction
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Daemon and VM configuration
//! - [`devices`] - The device manifest and descriptors handed to the helpers
//! - [`helpers`] - Helper command lines and pid files
//! - [`layout`] - The per-VM directory tree
//! - [`logsink`] - Per-request helper logs and their retention
//! - [`orchestration`] - The lifecycle operations
//! - [`server`] - REST API server implementation
//! - [`utils`] - Common utilities and helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod artifact;
pub mod cli;
pub mod config;
pub mod devices;
pub mod helpers;
pub mod layout;
pub mod logsink;
pub mod orchestration;
pub mod server;
pub mod utils;

pub use error::*;
