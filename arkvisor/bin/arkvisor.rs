use std::{net::SocketAddr, sync::Arc};

use arkutils::RotatingLog;
use arkvisor::{
    cli::{AnsiStyles, ArkvisorArgs, ArkvisorSubcommand},
    config::{ArkvisorConfig, VmConfig},
    orchestration::{Launched, Orchestrator, VmStatus},
    server::{self, HelperResponse},
    ArkvisorError, ArkvisorResult,
};
use clap::{CommandFactory, Parser};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ArkvisorResult<()> {
    let _ = dotenvy::dotenv();

    let args = ArkvisorArgs::parse();
    let Some(subcommand) = args.subcommand else {
        ArkvisorArgs::command().print_help()?;
        return Ok(());
    };

    let config = ArkvisorConfig::load(args.config.as_deref()).await?;
    let daemon_log = match &subcommand {
        ArkvisorSubcommand::Serve { .. } => Some(open_daemon_log(&config).await?),
        _ => None,
    };
    let _guard = init_tracing(daemon_log.as_ref());

    let orchestrator = Orchestrator::new(config)?;
    match subcommand {
        ArkvisorSubcommand::Serve { host, port } => {
            let addr: SocketAddr = format!("{host}:{port}").parse().map_err(|e| {
                ArkvisorError::InvalidRequest(format!("invalid listen address {host}:{port}: {e}"))
            })?;
            for (program, error) in orchestrator.missing_helpers() {
                tracing::warn!("helper `{}` is not on PATH: {}", program, error);
            }
            server::serve(Arc::new(orchestrator), addr).await?;
        }
        ArkvisorSubcommand::Create {
            name,
            memory,
            cpus,
            disk_size,
            image_path,
        } => {
            tracing::trace!("creating vm: name={name}, memory={memory}, cpus={cpus}");
            let vm = VmConfig::builder()
                .name(name)
                .memory(memory)
                .cpus(cpus)
                .disk_size(disk_size)
                .image_path(image_path)
                .build();
            print_launched("VM creation initiated", &orchestrator.create(vm).await?);
        }
        ArkvisorSubcommand::Start { name } => {
            print_launched("VM started", &orchestrator.start(&name).await?);
        }
        ArkvisorSubcommand::Stop { name } => {
            let report = orchestrator.stop(&name).await?;
            println!("{} {}", "VM stopped".header(), report.name.literal());
            for pid in &report.terminated {
                println!("  terminated {}", pid.to_string().valid());
            }
            for (pid, reason) in &report.failed {
                println!("  {} {}: {}", "failed".error(), pid, reason);
            }
        }
        ArkvisorSubcommand::Status { name } => {
            print_status(&orchestrator.status(&name).await?);
        }
        ArkvisorSubcommand::Migrate { name, source_ip } => {
            print_launched("Migration initiated", &orchestrator.migrate(&name, &source_ip).await?);
        }
        ArkvisorSubcommand::Logs {
            name,
            component,
            tail,
        } => {
            print!("{}", orchestrator.logs(&name, component.as_deref(), tail).await?);
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

async fn open_daemon_log(config: &ArkvisorConfig) -> ArkvisorResult<RotatingLog> {
    tokio::fs::create_dir_all(config.log_dir()).await?;
    Ok(RotatingLog::new(config.daemon_log_path()).await?)
}

/// Logs to stderr, and to the daemon log as well when one is given.
fn init_tracing(daemon_log: Option<&RotatingLog>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_writer(std::io::stderr);

    let (file, guard) = match daemon_log {
        Some(log) => {
            let (writer, guard) = tracing_appender::non_blocking(log.writer());
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();

    guard
}

fn print_launched(message: &str, launched: &Launched) {
    println!("{} {}", message.header(), launched.name.literal());
    for helper in &launched.helpers {
        let state = HelperResponse::from(helper).state;
        println!("  {} pid {} ({})", helper.component.literal(), helper.pid, state);
    }
    println!("  logs: {}", launched.logs_path.display());
}

fn print_status(status: &VmStatus) {
    println!("{}", status.name.header());
    for (service, running) in [
        ("nat", status.services.nat),
        ("peer", status.services.peer),
        ("forwarder", status.services.forwarder),
    ] {
        let state = if running {
            "running".valid()
        } else {
            "stopped".invalid()
        };
        println!("  {:<10} {}", service, state);
    }
}
