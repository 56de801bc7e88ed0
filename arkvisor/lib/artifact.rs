//! Downloading, extracting and verifying the image bundles a VM is built from.

use std::{path::Path, time::Duration};

use arkutils::ArkutilsError;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use tokio::{fs, io::AsyncWriteExt};

use crate::{helpers::HelperCommand, utils::file_len, ArkvisorError, ArkvisorResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Number of leading bytes logged from each download.
const SIGNATURE_LEN: usize = 32;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Fetches bundles over HTTP and turns them into blueprint images.
///
/// There is no checksum manifest. A truncated or corrupt archive is caught by the packager
/// failing to extract it.
#[derive(Clone)]
pub struct ArtifactStore {
    client: ClientWithMiddleware,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ArtifactStore {
    /// Creates a store whose requests give up after `timeout`.
    ///
    /// Transient failures are retried with exponential backoff only if `retries` is non-zero.
    pub fn new(timeout: Duration, retries: u32) -> ArkvisorResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let client = if retries > 0 {
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(retries);
            ClientBuilder::new(client)
                .with(RetryTransientMiddleware::new_with_policy(retry_policy))
                .build()
        } else {
            ClientBuilder::new(client).build()
        };

        Ok(Self { client })
    }

    /// Downloads `url` to `path` and returns the number of bytes written.
    ///
    /// Any status other than 200 fails before `path` is created. An empty body fails after.
    pub async fn download(&self, url: &str, path: &Path) -> ArkvisorResult<u64> {
        tracing::info!("starting download from: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ArkvisorError::DownloadFailed {
                url: url.to_string(),
                reason: format!("bad HTTP response: {status}"),
            });
        }

        tracing::debug!("response headers: {:?}", response.headers());
        tracing::debug!("content length: {:?}", response.content_length());

        let mut file = fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        let mut signature = Vec::with_capacity(SIGNATURE_LEN);

        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            if signature.len() < SIGNATURE_LEN {
                let take = (SIGNATURE_LEN - signature.len()).min(bytes.len());
                signature.extend_from_slice(&bytes[..take]);
            }

            file.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        if written == 0 {
            return Err(ArkvisorError::DownloadFailed {
                url: url.to_string(),
                reason: "downloaded file is empty".to_string(),
            });
        }

        tracing::info!(
            "downloaded {} bytes to {}, first {} bytes: {}",
            written,
            path.display(),
            signature.len(),
            hex::encode(&signature)
        );

        Ok(written)
    }

    /// Runs the packager in extract mode and returns what it printed.
    pub async fn extract(&self, command: &HelperCommand, archive: &Path) -> ArkvisorResult<String> {
        tracing::info!("extracting {}", archive.display());

        let spec = command.to_spec();
        match arkutils::run_captured(&spec).await {
            Ok(output) => {
                tracing::info!("extraction output for {}: {}", archive.display(), output.trim_end());
                Ok(output)
            }
            Err(ArkutilsError::CommandFailed { status, output, .. }) => {
                Err(ArkvisorError::ExtractionFailed {
                    archive: archive.to_path_buf(),
                    status,
                    output,
                })
            }
            Err(source) => Err(ArkvisorError::HelperLaunch {
                component: command.component().to_string(),
                source,
            }),
        }
    }

    /// Checks that every path exists and is non-empty.
    pub async fn verify_non_empty<P: AsRef<Path>>(paths: &[P]) -> ArkvisorResult<()> {
        for path in paths {
            let path = path.as_ref();
            match file_len(path).await {
                Some(len) if len > 0 => {
                    tracing::info!("extracted file {} size: {} bytes", path.display(), len);
                }
                _ => return Err(ArkvisorError::MissingArtifact(path.to_path_buf())),
            }
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
