use std::path::PathBuf;

use clap::Parser;

use crate::config::{DEFAULT_CPUS, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT};

use super::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// `arkvisor` creates, starts, migrates and stops drafter VMs on this host
#[derive(Debug, Parser)]
#[command(name = "arkvisor", author, version, about, styles=styles::styles())]
pub struct ArkvisorArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<ArkvisorSubcommand>,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available subcommands
#[derive(Debug, Parser)]
pub enum ArkvisorSubcommand {
    /// Serve the HTTP API
    #[command(name = "serve")]
    Serve {
        /// Address to bind to
        #[arg(long, default_value = DEFAULT_SERVER_HOST)]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,
    },

    /// Download, extract and package a new VM
    #[command(name = "create")]
    Create {
        /// Name of the VM
        #[arg(short, long)]
        name: String,

        /// Guest memory in MiB
        #[arg(short, long)]
        memory: String,

        /// Number of guest CPUs
        #[arg(long, default_value_t = DEFAULT_CPUS)]
        cpus: u32,

        /// Requested disk size
        #[arg(long)]
        disk_size: Option<String>,

        /// Requested image path
        #[arg(long)]
        image_path: Option<String>,
    },

    /// Resume a packaged VM on this host
    #[command(name = "start")]
    Start {
        /// Name of the VM
        name: String,
    },

    /// Terminate every helper of a VM
    #[command(name = "stop")]
    Stop {
        /// Name of the VM
        name: String,
    },

    /// Show which services of a VM are running
    #[command(name = "status")]
    Status {
        /// Name of the VM
        name: String,
    },

    /// Pull a running VM from another host
    #[command(name = "migrate")]
    Migrate {
        /// Name of the VM
        name: String,

        /// Address of the host currently running the VM
        #[arg(short, long)]
        source_ip: String,
    },

    /// Print the helper logs of a VM's latest request
    #[command(name = "logs")]
    Logs {
        /// Name of the VM
        name: String,

        /// Only this component, e.g. `peer`
        #[arg(long)]
        component: Option<String>,

        /// Only the last N lines of each log
        #[arg(short, long, value_name = "N")]
        tail: Option<usize>,
    },
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
