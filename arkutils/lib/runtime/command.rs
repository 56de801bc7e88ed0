use std::process::Stdio;

use tokio::process::Command;

use crate::{ArkutilsError, ArkutilsResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A fully-specified external command.
///
/// `arg0`, when set, replaces the program name the child sees as `argv[0]`. It is how a
/// launched process is made findable in the process table by a tag of our choosing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The program to execute, looked up on `PATH` if not a path.
    program: String,

    /// The arguments passed after `argv[0]`.
    args: Vec<String>,

    /// Optional override for `argv[0]`.
    arg0: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CommandSpec {
    /// Creates a command spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            arg0: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the `argv[0]` the child will see.
    pub fn arg0(mut self, arg0: impl Into<String>) -> Self {
        self.arg0 = Some(arg0.into());
        self
    }

    /// Wraps this command so that it runs through `wrapper` (e.g. `sudo`).
    ///
    /// The `argv[0]` override moves to the wrapper, which is the process we spawn.
    pub fn wrapped(self, wrapper: impl Into<String>) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);

        Self {
            program: wrapper.into(),
            args,
            arg0: self.arg0,
        }
    }

    /// The program that will be executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments that will be passed.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// The `argv[0]` override, if any.
    pub fn get_arg0(&self) -> Option<&str> {
        self.arg0.as_deref()
    }

    /// The command line as it will appear in the process table.
    pub fn cmdline(&self) -> String {
        let mut parts = vec![self.arg0.as_deref().unwrap_or(&self.program)];
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }

    /// Builds a tokio command from this spec. Stdio is left for the caller to set.
    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(arg0) = &self.arg0 {
            command.arg0(arg0);
        }
        command
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Runs a command to completion and returns its combined output.
///
/// On a non-zero exit the error carries both the exit status and everything the command
/// printed, so callers can surface it verbatim.
pub async fn run_captured(spec: &CommandSpec) -> ArkutilsResult<String> {
    tracing::info!("executing command: {}", spec.cmdline());

    let output = spec
        .to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| spawn_error(spec, e))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(ArkutilsError::CommandFailed {
            command: spec.cmdline(),
            status: output.status.to_string(),
            output: combined,
        });
    }

    if !combined.is_empty() {
        tracing::debug!("command output: {}", combined.trim_end());
    }

    Ok(combined)
}

/// Maps a spawn failure to a typed error, distinguishing a missing binary.
pub(crate) fn spawn_error(spec: &CommandSpec, error: std::io::Error) -> ArkutilsError {
    match error.kind() {
        std::io::ErrorKind::NotFound => {
            ArkutilsError::BinaryNotFound(spec.program.clone(), error.to_string())
        }
        _ => ArkutilsError::IoError(error),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
