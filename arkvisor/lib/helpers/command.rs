use std::{
    fmt::{self, Display},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
};

use arkutils::{CommandSpec, TcpProbe};
use serde::Serialize;

use crate::{
    config::{ArkvisorConfig, VmConfig},
    devices::{devices_json, DeviceDescriptor, ExtractionDevice, PackagingDevice},
    ArkvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The helper programs arkvisor drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Archive extraction. Runs to completion.
    Packager,

    /// Host-wide NAT service.
    Nat,

    /// Snapshot packaging.
    Snapshotter,

    /// Migration transport.
    Peer,

    /// Port forwarder.
    Forwarder,
}

/// A helper invocation, before it is turned into a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    /// Which helper this is.
    component: Component,

    /// The program name or path.
    program: String,

    /// Arguments in helper grammar.
    args: Vec<String>,

    /// The privilege wrapper, if the helper runs through one.
    wrapper: Option<String>,

    /// The instance tag carried in `argv[0]`.
    tag: Option<String>,

    /// Where the helper accepts connections once it is serving.
    ready_addr: Option<SocketAddr>,
}

/// One entry of the forwarder's `--port-forwards` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForward {
    /// Namespace the guest port lives in.
    pub netns: String,

    /// Guest port.
    pub internal_port: String,

    /// Transport protocol.
    pub protocol: String,

    /// Host address the port is exposed on.
    pub external_addr: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Component {
    /// The component name used for log files and pid files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Packager => "packager",
            Component::Nat => "nat",
            Component::Snapshotter => "snapshotter",
            Component::Peer => "peer",
            Component::Forwarder => "forwarder",
        }
    }
}

impl HelperCommand {
    fn new(config: &ArkvisorConfig, component: Component, program: &str) -> Self {
        Self {
            component,
            program: program.to_string(),
            args: Vec::new(),
            wrapper: config
                .get_privileged()
                .then(|| config.get_binaries().get_sudo().clone()),
            tag: None,
            ready_addr: None,
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn tagged(mut self, config: &ArkvisorConfig, vm: &str) -> Self {
        self.tag = Some(config.instance_tag(vm));
        self
    }

    /// `drafter-packager --package-path <archive> --extract --devices <json>`
    pub fn packager_extract(
        config: &ArkvisorConfig,
        archive: &Path,
        devices: &[ExtractionDevice],
    ) -> ArkvisorResult<Self> {
        Ok(
            Self::new(config, Component::Packager, config.get_binaries().get_packager())
                .arg("--package-path")
                .arg(archive.display().to_string())
                .arg("--extract")
                .arg("--devices")
                .arg(devices_json(devices)?),
        )
    }

    /// `drafter-nat --host-interface <iface>`
    pub fn nat(config: &ArkvisorConfig) -> Self {
        Self::new(config, Component::Nat, config.get_binaries().get_nat())
            .arg("--host-interface")
            .arg(config.get_host_interface())
    }

    /// `drafter-snapshotter --netns <ns> --cpu-template <t> --memory-size <m> --devices <json>`
    pub fn snapshotter(
        config: &ArkvisorConfig,
        vm: &VmConfig,
        devices: &[PackagingDevice],
    ) -> ArkvisorResult<Self> {
        Ok(
            Self::new(config, Component::Snapshotter, config.get_binaries().get_snapshotter())
                .tagged(config, vm.get_name())
                .arg("--netns")
                .arg(config.get_netns())
                .arg("--cpu-template")
                .arg(config.get_cpu_template())
                .arg("--memory-size")
                .arg(vm.get_memory())
                .arg("--devices")
                .arg(devices_json(devices)?),
        )
    }

    /// `drafter-peer --netns <ns> --raddr <remote> --laddr <local> --devices <json>`
    ///
    /// An empty `raddr` with a listen `laddr` makes the peer the migration source; a remote
    /// `raddr` with an empty `laddr` makes it the destination.
    pub fn peer(
        config: &ArkvisorConfig,
        vm: &str,
        raddr: &str,
        laddr: &str,
        devices: &[DeviceDescriptor],
    ) -> ArkvisorResult<Self> {
        let mut command = Self::new(config, Component::Peer, config.get_binaries().get_peer())
            .tagged(config, vm)
            .arg("--netns")
            .arg(config.get_netns())
            .arg("--raddr")
            .arg(raddr)
            .arg("--laddr")
            .arg(laddr)
            .arg("--devices")
            .arg(devices_json(devices)?);

        command.ready_addr = local_probe_addr(laddr);
        Ok(command)
    }

    /// `drafter-forwarder --port-forwards <json>`
    pub fn forwarder(config: &ArkvisorConfig, vm: &str, external_addr: &str) -> ArkvisorResult<Self> {
        let forwards = [PortForward {
            netns: config.get_netns().clone(),
            internal_port: config.get_forward_internal_port().clone(),
            protocol: config.get_forward_protocol().clone(),
            external_addr: external_addr.to_string(),
        }];

        let mut command =
            Self::new(config, Component::Forwarder, config.get_binaries().get_forwarder())
                .tagged(config, vm)
                .arg("--port-forwards")
                .arg(serde_json::to_string(&forwards)?);

        command.ready_addr = external_addr.parse().ok();
        Ok(command)
    }

    /// Which helper this is.
    pub fn component(&self) -> Component {
        self.component
    }

    /// The program name or path.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The helper's own arguments, without any wrapper.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The instance tag, for tagged helpers.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// A probe that succeeds once the helper accepts connections, where that is observable.
    pub fn probe(&self) -> Option<TcpProbe> {
        self.ready_addr.map(TcpProbe::new)
    }

    /// The file name of the program, which is what process-table patterns match on.
    pub fn program_name(&self) -> &str {
        program_name(&self.program)
    }

    /// Builds the process spec: `argv[0]` carries `<tag>:<program>` for tagged helpers and
    /// the wrapper, if any, becomes the spawned program.
    pub fn to_spec(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program).args(self.args.iter().cloned());
        if let Some(tag) = &self.tag {
            spec = spec.arg0(format!("{}:{}", tag, self.program_name()));
        }

        match &self.wrapper {
            Some(wrapper) => spec.wrapped(wrapper.clone()),
            None => spec,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// A host command run directly or through the configured privilege wrapper.
pub fn host_command<I, S>(config: &ArkvisorConfig, program: &str, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let spec = CommandSpec::new(program).args(args);
    if *config.get_privileged() {
        spec.wrapped(config.get_binaries().get_sudo().clone())
    } else {
        spec
    }
}

/// Returns the last path component of `program`.
pub fn program_name(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}

/// Turns a listen address such as `:1337` or `0.0.0.0:1337` into a loopback address to
/// probe. Returns `None` when the peer is not listening.
fn local_probe_addr(laddr: &str) -> Option<SocketAddr> {
    let (_, port) = laddr.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
