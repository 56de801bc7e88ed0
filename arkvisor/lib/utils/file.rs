use std::path::Path;

use tokio::fs;

use crate::ArkvisorResult;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the size of `path`, or `None` if it does not exist or is not a regular file.
pub async fn file_len(path: &Path) -> Option<u64> {
    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Some(metadata.len()),
        _ => None,
    }
}

/// Reads `path` and keeps only its last `lines` lines, if given.
///
/// Invalid UTF-8 is replaced with `U+FFFD`. The result always ends with a newline unless it
/// is empty.
pub async fn read_tail(path: &Path, lines: Option<usize>) -> ArkvisorResult<String> {
    let bytes = fs::read(path).await?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    let content = match lines {
        Some(n) => {
            let all: Vec<&str> = content.lines().collect();
            let start = all.len().saturating_sub(n);
            all[start..].join("\n")
        }
        None => content,
    };

    if content.is_empty() || content.ends_with('\n') {
        Ok(content)
    } else {
        Ok(content + "\n")
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
