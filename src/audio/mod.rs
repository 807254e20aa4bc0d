//! Audio decoding
//!
//! Turns uploaded bytes into a mono [`SampleBuffer`](crate::types::SampleBuffer)
//! at 44.1 kHz.

pub mod decoder;

pub use decoder::{decode, extension_hint, AudioDecoder, DEFAULT_MAX_INPUT_BYTES};
