//! soundprobe - musical descriptors for uploaded audio
//!
//! Decodes an uploaded audio file and computes tempo (BPM, beats), key and
//! scale, a danceability score, and loudness measures, with a per-request
//! lifecycle that never leaves staged uploads behind.
//!
//! # Architecture
//!
//! - `config`: CLI argument parsing and runtime settings
//! - `audio`: Audio decoding using symphonia
//! - `analysis`: Tempo, tonal, danceability and loudness extractors
//! - `pipeline`: Request orchestration, staging and cancellation
//! - `export`: JSON response bodies
//!
//! # Example
//!
//! ```no_run
//! use soundprobe::{config::Settings, pipeline::Orchestrator, types::RawUpload};
//!
//! let orchestrator = Orchestrator::new(Settings::default()).expect("invalid settings");
//! let bytes = std::fs::read("track.wav").expect("read failed");
//! let result = orchestrator
//!     .analyze(Some(RawUpload::new("track.wav", bytes)))
//!     .expect("analysis failed");
//! println!("{:.1} BPM, {} {}", result.tempo.bpm, result.tonal.key.label(), result.tonal.scale.label());
//! ```

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod types;

// Re-export key types at crate root
pub use error::{Result, SoundprobeError};
pub use types::{AnalysisResult, RawUpload, SampleBuffer};
