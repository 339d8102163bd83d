use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to serialize artifact '{}': {source}", path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write artifact '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

pub fn write_text_artifact(path: &Path, content: &str) -> Result<(), ArtifactError> {
    fs::write(path, normalize_text_artifact(content)).map_err(|source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-printed JSON with canonical line endings and a trailing newline.
pub fn write_json_artifact<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), ArtifactError> {
    let content =
        serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
    write_text_artifact(path, &content)
}
