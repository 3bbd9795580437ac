//! File editing capability shared by the HTTP and socket transports.
//!
//! Paths are resolved against the process working directory and normalized
//! lexically; no workspace confinement is applied. The bridge runs with the
//! privileges of the user who started it.

use std::path::{Component, Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};

/// Resolve `path` to an absolute, normalized path.
pub fn resolve(path: &str) -> PathBuf {
    let target = Path::new(path);
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(target))
            .unwrap_or_else(|_| target.to_path_buf())
    };
    normalize_path(&joined)
}

/// Drop `.` components and fold `..` into their parent.
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            _ => normalized.push(component),
        }
    }
    normalized
}

/// Read a UTF-8 file. Missing files yield [`BridgeError::NotFound`].
pub async fn read(path: &Path) -> Result<String> {
    read_optional(path)
        .await?
        .ok_or_else(|| BridgeError::NotFound("File not found".to_string()))
}

/// Read a UTF-8 file, `None` when it does not exist.
pub async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Insert `text` into a file, creating it if needed.
///
/// Without `line` the text is appended verbatim. With `line` the text becomes
/// a new line at that zero-based index (clamped to the end of the file).
pub async fn insert(path: &Path, text: &str, line: Option<usize>) -> Result<()> {
    let current = read_optional(path).await?.unwrap_or_default();
    let updated = match line {
        Some(index) => {
            let mut lines: Vec<&str> = current.split('\n').collect();
            let index = index.min(lines.len());
            lines.insert(index, text);
            lines.join("\n")
        }
        None => current + text,
    };
    tokio::fs::write(path, updated).await?;
    debug!(file = %path.display(), "Inserted text");
    Ok(())
}

/// Overwrite a file with `text`.
pub async fn replace(path: &Path, text: &str) -> Result<()> {
    tokio::fs::write(path, text).await?;
    debug!(file = %path.display(), bytes = text.len(), "Replaced file content");
    Ok(())
}

/// Open `path` in VS Code, falling back to the OS default handler.
///
/// Fire-and-forget: returns immediately; failures are only logged.
pub fn open(path: &Path) {
    let target = path.to_path_buf();
    tokio::spawn(async move {
        let opened_in_code = matches!(
            Command::new(crate::shell::script_program("code"))
                .arg(&target)
                .status()
                .await,
            Ok(status) if status.success()
        );
        if opened_in_code {
            return;
        }

        let mut fallback = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]).arg(&target);
            c
        } else if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.arg(&target);
            c
        } else {
            let mut c = Command::new("xdg-open");
            c.arg(&target);
            c
        };
        if let Err(e) = fallback.status().await {
            warn!(file = %target.display(), error = %e, "Failed to open file");
        }
    });
}
