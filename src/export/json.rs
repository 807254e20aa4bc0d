//! JSON response bodies
//!
//! Success bodies carry the flat descriptor set with fixed rounding; error
//! bodies carry a single `error` message.

use crate::error::{ResponseStatus, Result, SoundprobeError};
use crate::types::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Prefix of every server-side error message
const SERVER_ERROR_PREFIX: &str = "Failed to analyze audio";

/// Success payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Tempo, 2 decimals
    pub bpm: f64,
    pub beats_count: usize,
    /// 3 decimals
    pub beats_confidence: f64,
    /// Sharp spelling ("C", "C#", ...)
    pub key: String,
    /// "major" or "minor"
    pub scale: String,
    /// 3 decimals
    pub key_strength: f64,
    /// 3 decimals
    pub danceability: f64,
    /// 5 decimals
    pub energy: f64,
    /// 5 decimals
    pub rms: f64,
    /// Seconds, 3 decimals
    pub duration: f64,
}

impl From<&AnalysisResult> for AnalysisReport {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            bpm: round_to(result.tempo.bpm, 2),
            beats_count: result.tempo.beats.len(),
            beats_confidence: round_to(result.tempo.confidence, 3),
            key: result.tonal.key.label().to_string(),
            scale: result.tonal.scale.label().to_string(),
            key_strength: round_to(result.tonal.strength, 3),
            danceability: round_to(result.danceability.score, 3),
            energy: round_to(result.loudness.energy, 5),
            rms: round_to(result.loudness.rms, 5),
            duration: round_to(result.duration, 3),
        }
    }
}

/// Error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<&SoundprobeError> for ErrorBody {
    fn from(err: &SoundprobeError) -> Self {
        let error = if err.is_client_error() {
            err.to_string()
        } else {
            format!("{}: {}", SERVER_ERROR_PREFIX, err)
        };
        Self { error }
    }
}

/// Body of a response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Report(AnalysisReport),
    Error(ErrorBody),
}

/// Status + body ready for the request-handling layer
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: ResponseStatus,
    pub body: ResponseBody,
}

impl Response {
    pub fn from_result(result: &Result<AnalysisResult>) -> Self {
        match result {
            Ok(analysis) => Self {
                status: ResponseStatus::Ok,
                body: ResponseBody::Report(AnalysisReport::from(analysis)),
            },
            Err(err) => Self {
                status: err.status(),
                body: ResponseBody::Error(ErrorBody::from(err)),
            },
        }
    }

    /// Serialize the body
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(&self.body)
        } else {
            serde_json::to_string(&self.body)
        };
        json.map_err(|e| SoundprobeError::Io(e.into()))
    }

    /// Write the body followed by a newline
    pub fn write_to<W: Write>(&self, mut writer: W, pretty: bool) -> Result<()> {
        let json = self.to_json(pretty)?;
        writeln!(writer, "{}", json)?;
        Ok(())
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
