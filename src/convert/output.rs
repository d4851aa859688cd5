//! Writes merged artifacts and JSON reports to disk.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::convert::merge::MergedArtifact;

/// Writes `artifact` under `output_root`, creating its type directory.
/// Returns the written path.
pub fn write_artifact(output_root: &Path, artifact: &MergedArtifact) -> Result<PathBuf> {
    let path = output_root.join(&artifact.target_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(&path, artifact.render())
        .with_context(|| format!("failed to write artifact: {}", path.display()))?;

    if artifact.failed {
        info!("Wrote failed-conversion marker {}", path.display());
    } else {
        info!("Converted {} → {}", artifact.unit_name, path.display());
    }
    Ok(path)
}

/// Pretty-printed JSON report, parent directories created as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(value).context("failed to serialize report")?;
    std::fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
}
