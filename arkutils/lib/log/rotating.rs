//! Size-capped rotating log files.
//!
//! A [`RotatingLog`] owns a background task that appends whatever its writers send to a file.
//! Once the file would grow past the configured maximum, it is renamed to `<name>.old`
//! (replacing any previous backup) and a fresh file is started under the original name.
//!
//! Writers are plain [`std::io::Write`] implementations, so they can be handed to
//! `tracing-appender` or any other synchronous logging sink.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{remove_file, rename, File, OpenOptions},
    io::AsyncWriteExt,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

use crate::{DEFAULT_LOG_MAX_SIZE, ROTATED_LOG_SUFFIX};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A log file that rotates itself when it reaches a maximum size.
///
/// # Example
///
/// ```no_run
/// use std::io::Write;
/// use arkutils::RotatingLog;
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     let log = RotatingLog::new("arkvisor.log").await?;
///     let mut writer = log.writer();
///     writeln!(writer, "hello")?;
///     Ok(())
/// }
/// ```
pub struct RotatingLog {
    /// Path to the current log file
    path: PathBuf,

    /// Maximum size in bytes before rotation
    max_size: u64,

    /// Channel feeding the background writer
    tx: UnboundedSender<Vec<u8>>,

    /// Background task handle
    _background_task: JoinHandle<()>,
}

/// A sync writer that forwards everything written to a [`RotatingLog`].
#[derive(Clone)]
pub struct RotatingLogWriter {
    tx: UnboundedSender<Vec<u8>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RotatingLog {
    /// Opens a rotating log with the default maximum size, [`DEFAULT_LOG_MAX_SIZE`].
    pub async fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::with_max_size(path, DEFAULT_LOG_MAX_SIZE).await
    }

    /// Opens a rotating log, appending to the file if it already exists.
    ///
    /// ## Errors
    ///
    /// Will return an error if:
    /// * The file cannot be created or opened
    /// * File metadata cannot be read
    pub async fn with_max_size(path: impl AsRef<Path>, max_size: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let current_size = file.metadata().await?.len();
        let (tx, rx) = mpsc::unbounded_channel();

        let bg_path = path.clone();
        let background_task = tokio::spawn(async move {
            write_loop(rx, file, bg_path, max_size, current_size).await
        });

        Ok(Self {
            path,
            max_size,
            tx,
            _background_task: background_task,
        })
    }

    /// Returns a writer that appends to this log.
    pub fn writer(&self) -> RotatingLogWriter {
        RotatingLogWriter {
            tx: self.tx.clone(),
        }
    }

    /// Returns the path of the live log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the size at which the log is rotated.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the path a log file is moved to when it is rotated.
pub fn rotated_path(path: &Path) -> PathBuf {
    path.with_extension(ROTATED_LOG_SUFFIX)
}

/// Moves the live file aside and opens a fresh one in its place.
async fn rotate(file: File, path: &Path) -> io::Result<File> {
    file.sync_all().await?;
    drop(file);

    let backup_path = rotated_path(path);
    if backup_path.exists() {
        remove_file(&backup_path).await?;
    }
    rename(path, &backup_path).await?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

async fn write_loop(
    mut rx: UnboundedReceiver<Vec<u8>>,
    mut file: File,
    path: PathBuf,
    max_size: u64,
    mut current_size: u64,
) {
    while let Some(data) = rx.recv().await {
        let data_len = data.len() as u64;

        if current_size > 0 && current_size + data_len > max_size {
            let old_file = match file.try_clone().await {
                Ok(f) => f,
                Err(e) => {
                    tracing::error!("failed to clone log file handle for rotation: {}", e);
                    continue;
                }
            };

            match rotate(old_file, &path).await {
                Ok(new_file) => {
                    file = new_file;
                    current_size = 0;
                }
                Err(e) => tracing::error!("failed to rotate log file {}: {}", path.display(), e),
            }
        }

        match file.write_all(&data).await {
            Ok(()) => current_size += data_len,
            Err(e) => tracing::error!("failed to write to log file {}: {}", path.display(), e),
        }

        if let Err(e) = file.flush().await {
            tracing::error!("failed to flush log file {}: {}", path.display(), e);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Write for RotatingLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::other("rotating log writer task has stopped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_create_new_log() -> io::Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("test.log");

        let log = RotatingLog::with_max_size(&log_path, 1024).await?;
        assert!(log_path.exists());
        assert_eq!(log.max_size(), 1024);
        assert_eq!(log.path(), log_path.as_path());

        Ok(())
    }

    #[tokio::test]
    async fn test_writer_appends() -> io::Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("test.log");
        fs::write(&log_path, "existing\n")?;

        let log = RotatingLog::with_max_size(&log_path, 1024).await?;
        let mut writer = log.writer();
        writer.write_all(b"appended\n")?;
        settle().await;

        let content = fs::read_to_string(&log_path)?;
        assert_eq!(content, "existing\nappended\n");

        Ok(())
    }

    #[tokio::test]
    async fn test_log_rotation() -> io::Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("test.log");

        let log = RotatingLog::with_max_size(&log_path, 20).await?;
        let mut writer = log.writer();

        writer.write_all(b"first entry\n")?;
        settle().await;
        writer.write_all(b"second entry\n")?;
        settle().await;

        let old_content = fs::read_to_string(rotated_path(&log_path))?;
        assert_eq!(old_content, "first entry\n");

        let new_content = fs::read_to_string(&log_path)?;
        assert_eq!(new_content, "second entry\n");

        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_write_into_empty_log() -> io::Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("test.log");

        let log = RotatingLog::with_max_size(&log_path, 10).await?;
        let mut writer = log.writer();

        let large_entry = b"this is a very large log entry that exceeds the maximum size\n";
        writer.write_all(large_entry)?;
        settle().await;

        // Nothing to rotate away yet, so the entry lands in the live file.
        assert!(!rotated_path(&log_path).exists());
        let content = fs::read_to_string(&log_path)?;
        assert_eq!(content, String::from_utf8_lossy(large_entry));

        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_rotations_keep_one_backup() -> io::Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("test.log");

        let log = RotatingLog::with_max_size(&log_path, 20).await?;
        let mut writer = log.writer();

        for i in 0..3 {
            writer.write_all(format!("rotation test {}\n", i).as_bytes())?;
            settle().await;
        }

        assert_eq!(fs::read_to_string(&log_path)?, "rotation test 2\n");
        assert_eq!(
            fs::read_to_string(rotated_path(&log_path))?,
            "rotation test 1\n"
        );

        Ok(())
    }
}
