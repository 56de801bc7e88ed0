#![allow(dead_code)]

use std::{
    collections::HashMap,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use arkutils::{ArkutilsError, ArkutilsResult, ProcessEntry, ProcessTable};
use arkvisor::{
    config::{ArkvisorConfig, ArtifactSpec, HelperBinaries},
    devices::DeviceName,
};
use axum::{http::StatusCode, routing::get, Router};
use nix::errno::Errno;
use tokio::net::TcpListener;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Prints its arguments, then waits to be terminated.
const LONG_RUNNING_HELPER: &str = r#"#!/bin/sh
echo "$@"
trap 'kill $! 2>/dev/null; exit 0' TERM
sleep 30 &
wait
"#;

/// Writes a small file at every `"path"` of its `--devices` list.
const FAKE_PACKAGER: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
    case "$1" in
        --devices) devices="$2"; shift ;;
    esac
    shift
done
echo "$devices" | grep -o '"path":"[^"]*"' | sed -e 's/^"path":"//' -e 's/"$//' | while read -r path; do
    printf 'fake device\n' > "$path"
done
"#;

/// Records `kill -TERM <pid>` requests next to itself; only pid 101 can be killed.
const FAKE_SUDO: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/sudo.calls"
case "$3" in
    101) exit 0 ;;
    *) echo "kill: ($3) - Operation not permitted" >&2; exit 1 ;;
esac
"#;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A process table with fixed entries that records what it is asked to terminate.
#[derive(Default)]
pub struct FakeProcessTable {
    pub entries: Vec<ProcessEntry>,
    pub terminated: Mutex<Vec<u32>>,
    pub refusals: HashMap<u32, Errno>,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl ProcessTable for FakeProcessTable {
    fn list(&self) -> Vec<ProcessEntry> {
        self.entries.clone()
    }

    fn terminate(&self, pid: u32) -> ArkutilsResult<()> {
        if let Some(errno) = self.refusals.get(&pid) {
            return Err(ArkutilsError::Signal {
                pid,
                source: *errno,
            });
        }

        self.terminated.lock().unwrap().push(pid);
        Ok(())
    }
}

impl FakeProcessTable {
    pub fn with_entries(entries: &[(u32, &str)]) -> Arc<Self> {
        Self::with_refusals(entries, &[])
    }

    /// Like `with_entries`, but signalling a pid in `refusals` fails with its errno.
    pub fn with_refusals(entries: &[(u32, &str)], refusals: &[(u32, Errno)]) -> Arc<Self> {
        Arc::new(Self {
            entries: entries
                .iter()
                .map(|(pid, cmdline)| ProcessEntry {
                    pid: *pid,
                    cmdline: cmdline.to_string(),
                })
                .collect(),
            terminated: Mutex::new(Vec::new()),
            refusals: refusals.iter().copied().collect(),
        })
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Serves two small bundles at `/os.tar` and `/app.tar`; anything else is a 404.
pub async fn spawn_artifact_server() -> anyhow::Result<String> {
    let app = Router::new()
        .route("/os.tar", get(|| async { vec![0x1fu8, 0x8b, 0x08, 0x00, 1, 2, 3, 4] }))
        .route("/app.tar", get(|| async { vec![0x28u8, 0xb5, 0x2f, 0xfd, 5, 6, 7] }))
        .route("/empty.tar", get(|| async { Vec::<u8>::new() }))
        .fallback(|| async { (StatusCode::NOT_FOUND, "no such bundle") });

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });

    Ok(format!("http://{addr}"))
}

/// Writes the fake helper programs into `<dir>/bin`.
pub fn write_fake_helpers(dir: &Path) -> anyhow::Result<HelperBinaries> {
    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin)?;

    let write = |name: &str, content: &str| -> anyhow::Result<String> {
        let path = bin.join(name);
        std::fs::write(&path, content)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path.display().to_string())
    };

    Ok(HelperBinaries::builder()
        .packager(write("drafter-packager", FAKE_PACKAGER)?)
        .nat(write("drafter-nat", LONG_RUNNING_HELPER)?)
        .snapshotter(write("drafter-snapshotter", LONG_RUNNING_HELPER)?)
        .peer(write("drafter-peer", LONG_RUNNING_HELPER)?)
        .forwarder(write("drafter-forwarder", LONG_RUNNING_HELPER)?)
        .sudo(write("sudo", FAKE_SUDO)?)
        .build())
}

/// A configuration rooted in `dir` that runs the fake helpers unprivileged.
pub fn test_config(dir: &Path, artifact_base: &str) -> anyhow::Result<ArkvisorConfig> {
    build_test_config(dir, artifact_base, false, Duration::from_millis(100))
}

/// Like `test_config`, but waits `settle` between dependent helpers.
pub fn test_config_with_settle(
    dir: &Path,
    artifact_base: &str,
    settle: Duration,
) -> anyhow::Result<ArkvisorConfig> {
    build_test_config(dir, artifact_base, false, settle)
}

/// Like `test_config`, but privileged: host commands go through the fake `sudo`, which
/// records its arguments in `<dir>/bin/sudo.calls`.
pub fn privileged_test_config(dir: &Path, artifact_base: &str) -> anyhow::Result<ArkvisorConfig> {
    build_test_config(dir, artifact_base, true, Duration::from_millis(100))
}

fn build_test_config(
    dir: &Path,
    artifact_base: &str,
    privileged: bool,
    settle: Duration,
) -> anyhow::Result<ArkvisorConfig> {
    let artifacts = vec![
        ArtifactSpec::builder()
            .url(format!("{artifact_base}/os.tar"))
            .archive("os.tar")
            .devices(vec![DeviceName::Kernel, DeviceName::Disk])
            .build(),
        ArtifactSpec::builder()
            .url(format!("{artifact_base}/app.tar"))
            .archive("app.tar")
            .devices(vec![DeviceName::Oci])
            .build(),
    ];

    Ok(ArkvisorConfig::builder()
        .output_dir(dir.join("out"))
        .state_dir(dir.join("state"))
        .artifacts(artifacts)
        .binaries(write_fake_helpers(dir)?)
        .privileged(privileged)
        .owner(None)
        .load_nbd_module(false)
        .settle_interval(settle)
        .download_timeout(Duration::from_secs(10))
        .build())
}

/// Writes every package file of `vm`, as a finished snapshotter would.
pub fn write_package(config: &ArkvisorConfig, vm: &str) -> anyhow::Result<Vec<PathBuf>> {
    let layout = arkvisor::layout::VmLayout::new(config, vm);
    let files = layout.package_files();
    for file in &files {
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(file, b"packaged")?;
    }

    Ok(files)
}

/// Waits up to five seconds for `path` to contain `needle`, returning the content.
pub async fn wait_for_content(path: &Path, needle: &str) -> anyhow::Result<String> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let content = tokio::fs::read_to_string(path).await.unwrap_or_default();
        if content.contains(needle) {
            return Ok(content);
        }

        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("{} never contained {needle:?}; got {content:?}", path.display());
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
