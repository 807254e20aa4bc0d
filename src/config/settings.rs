//! Runtime configuration settings

use crate::analysis::tempo::TempoConfig;
use crate::analysis::tonal::chroma::ChromaConfig;
use crate::audio::DEFAULT_MAX_INPUT_BYTES;
use crate::error::{Result, SoundprobeError};
use std::path::PathBuf;

/// DSP parameters for the extractors
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    pub tempo: TempoConfig,
    pub chroma: ChromaConfig,
}

/// Runtime settings for the analysis orchestrator
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory where uploads are staged for the duration of a request
    pub staging_dir: PathBuf,
    /// Number of analysis worker threads
    pub analysis_threads: usize,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: u64,
    /// Extractor parameters
    pub analysis: AnalysisConfig,
}

impl Settings {
    /// Create settings from CLI arguments
    pub fn from_cli(cli: &super::cli::Cli) -> Self {
        let defaults = Self::default();
        Self {
            staging_dir: cli.staging_dir.clone().unwrap_or(defaults.staging_dir),
            analysis_threads: cli.threads.unwrap_or(defaults.analysis_threads),
            max_upload_bytes: cli.max_upload_mb.saturating_mul(1024 * 1024),
            analysis: defaults.analysis,
        }
    }

    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.analysis_threads == 0 {
            return Err(SoundprobeError::ConfigError(
                "analysis thread count must be at least 1".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(SoundprobeError::ConfigError(
                "upload limit must be non-zero".to_string(),
            ));
        }
        if !self.staging_dir.is_dir() {
            return Err(SoundprobeError::ConfigError(format!(
                "staging directory does not exist: {}",
                self.staging_dir.display()
            )));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            staging_dir: std::env::temp_dir(),
            analysis_threads: num_cpus::get().max(1),
            max_upload_bytes: DEFAULT_MAX_INPUT_BYTES,
            analysis: AnalysisConfig::default(),
        }
    }
}
