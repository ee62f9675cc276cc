pub mod matfile;
pub mod recorder;
pub mod sample;

pub use recorder::Recorder;
pub use sample::{NavSample, TelemetryLog};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `.mat` writes MATLAB v5 (Pitch/Roll), `.json` the full samples.
    pub output: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { output: "motor_fault_sim_dataset/arrdata.mat".into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Mat,
    Json,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
            Some(ext) if ext == "mat" => Ok(Self::Mat),
            Some(ext) if ext == "json" => Ok(Self::Json),
            other => anyhow::bail!("unsupported telemetry output extension {:?} (use .mat or .json)", other),
        }
    }
}

/// Write the log to `path`, creating parent directories.
pub fn save(log: &TelemetryLog, path: &Path) -> Result<()> {
    let format = OutputFormat::from_path(path)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }

    let bytes = match format {
        OutputFormat::Mat => {
            let (pitch, roll) = (log.pitch(), log.roll());
            matfile::encode(&[("Pitch", pitch.as_slice()), ("Roll", roll.as_slice())])?
        }
        OutputFormat::Json => serde_json::to_vec_pretty(log).context("encode telemetry json")?,
    };
    std::fs::write(path, &bytes).with_context(|| format!("write {}", path.display()))?;
    info!("telemetry: wrote {} samples to {}", log.len(), path.display());
    Ok(())
}
