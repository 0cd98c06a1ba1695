//! Saved defaults in `<data-dir>/settings.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use insightlens_rag::RagConfig;
use tracing::{debug, info};

pub const SETTINGS_FILE: &str = "settings.json";

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}

/// Load saved settings. A missing file yields the defaults; a file that
/// cannot be read, parsed, or validated is an error.
pub async fn load(data_dir: &Path) -> Result<RagConfig> {
    let path = settings_path(data_dir);
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no saved settings, using defaults");
            return Ok(RagConfig::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let config: RagConfig = serde_json::from_str(&raw)
        .with_context(|| format!("invalid settings file {}", path.display()))?;
    config.validate().with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(config)
}

/// Validate and save settings, replacing the file atomically.
pub async fn save(data_dir: &Path, config: &RagConfig) -> Result<()> {
    config.validate()?;
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let path = settings_path(data_dir);
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(config)?;
    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;

    info!(path = %path.display(), "settings saved");
    Ok(())
}
