use std::{path::PathBuf, sync::LazyLock, time::Duration};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Directory under `$HOME` that receives VM artifacts.
pub const OUTPUT_DIR_NAME: &str = "out";

/// Directory under `$HOME` that holds logs and pid files.
pub const STATE_DIR_NAME: &str = "drafter-api";

/// Sub-directory of the state dir for per-VM request logs.
pub const LOG_SUBDIR: &str = "logs";

/// Sub-directory of the state dir for helper pid files.
pub const RUN_SUBDIR: &str = "run";

/// File name of the daemon's own log inside [`LOG_SUBDIR`].
pub const DAEMON_LOG_FILENAME: &str = "arkvisor.log";

/// Environment variable overriding the output directory.
pub const OUTPUT_DIR_ENV_VAR: &str = "ARKVISOR_OUTPUT_DIR";

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV_VAR: &str = "ARKVISOR_STATE_DIR";

/// Default address the HTTP server binds to.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default port for the HTTP server
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default guest OS bundle.
pub const DEFAULT_OS_ARTIFACT_URL: &str =
    "https://github.com/loopholelabs/drafter/releases/download/v0.5.0/drafteros-oci-x86_64_pvm.tar.zst";

/// File name the guest OS bundle is saved under.
pub const DEFAULT_OS_ARCHIVE: &str = "drafteros-oci.tar.zst";

/// Default application bundle.
pub const DEFAULT_APP_ARTIFACT_URL: &str =
    "https://github.com/loopholelabs/drafter/releases/download/v0.5.0/oci-valkey-x86_64.tar.zst";

/// File name the application bundle is saved under.
pub const DEFAULT_APP_ARCHIVE: &str = "oci-valkey.tar.zst";

/// Host interface NAT is set up on.
pub const DEFAULT_HOST_INTERFACE: &str = "eth0";

/// Network namespace the guest runs in.
pub const DEFAULT_NETNS: &str = "ark0";

/// CPU template passed to the snapshotter.
pub const DEFAULT_CPU_TEMPLATE: &str = "T2A";

/// Owner applied to a freshly created VM tree.
pub const DEFAULT_OWNER: &str = "ec2-user:ec2-user";

/// Number of NBD devices the kernel module is loaded with.
pub const DEFAULT_NBD_MAX_DEVICES: u32 = 4096;

/// Pause between dependent helper launches.
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on a single artifact download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Port the peer listens on in the source role.
pub const DEFAULT_PEER_PORT: u16 = 1337;

/// Listen address of the peer in the source role.
pub const DEFAULT_PEER_LISTEN_ADDR: &str = ":1337";

/// Guest service port exposed by the forwarder.
pub const DEFAULT_FORWARD_INTERNAL_PORT: &str = "6379";

/// Protocol of the forwarded port.
pub const DEFAULT_FORWARD_PROTOCOL: &str = "tcp";

/// Host address the forwarder exposes after a start.
pub const DEFAULT_START_EXTERNAL_ADDR: &str = "127.0.0.1:3333";

/// Host address the forwarder exposes after a migration.
pub const DEFAULT_MIGRATE_EXTERNAL_ADDR: &str = "127.0.0.1:3334";

/// Prefix of the per-VM instance tag.
pub const DEFAULT_TAG_PREFIX: &str = "ark";

/// Default number of CPUs in a create request.
pub const DEFAULT_CPUS: u32 = 1;

/// Default maximum age for per-request log directories (7 days).
pub const DEFAULT_LOG_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Format of the per-request log directory name.
pub const LOG_DIR_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// The directory VM artifacts are written to.
pub static DEFAULT_OUTPUT_DIR: LazyLock<PathBuf> =
    LazyLock::new(|| home_dir().join(OUTPUT_DIR_NAME));

/// The directory logs and pid files are written to.
pub static DEFAULT_STATE_DIR: LazyLock<PathBuf> =
    LazyLock::new(|| home_dir().join(STATE_DIR_NAME));

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}
