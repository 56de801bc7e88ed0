use std::path::PathBuf;

use arkutils::LOG_SUFFIX;
use tokio::fs;

use crate::{
    config::validate_vm_name,
    logsink::latest_request_dir,
    utils::{file_len, read_tail},
    ArkvisorError, ArkvisorResult,
};

use super::Orchestrator;

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Orchestrator {
    /// Returns the helper output of the most recent request on the VM `name`.
    ///
    /// With a `component`, only that helper's log is returned. Without one, every log of the
    /// request is concatenated in name order, each under a `==> <file> <==` header. `tail`
    /// keeps the last lines of each log.
    pub async fn logs(
        &self,
        name: &str,
        component: Option<&str>,
        tail: Option<usize>,
    ) -> ArkvisorResult<String> {
        validate_vm_name(name)?;

        let Some(dir) = latest_request_dir(self.config.log_dir(), name).await? else {
            return Err(ArkvisorError::LogsNotFound(name.to_string()));
        };

        if let Some(component) = component {
            if component.is_empty() || component.contains(['/', '\\']) || component.starts_with('.') {
                return Err(ArkvisorError::InvalidRequest(format!(
                    "invalid component: {component}"
                )));
            }

            let path = dir.join(format!("{component}.{LOG_SUFFIX}"));
            if file_len(&path).await.is_none() {
                return Err(ArkvisorError::LogsNotFound(format!("{name}/{component}")));
            }

            return read_tail(&path, tail).await;
        }

        let files = log_files(&dir).await?;
        if files.is_empty() {
            return Err(ArkvisorError::LogsNotFound(name.to_string()));
        }

        let mut output = String::new();
        for path in files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            output.push_str(&format!("==> {file_name} <==\n"));
            output.push_str(&read_tail(&path, tail).await?);
        }

        Ok(output)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn log_files(dir: &std::path::Path) -> ArkvisorResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(LOG_SUFFIX) && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}
