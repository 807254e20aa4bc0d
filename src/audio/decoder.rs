//! Audio decoding using symphonia
//!
//! Decodes uploaded audio to mono f32 samples at the target sample rate.
//! Uses rubato for high-quality resampling with proper anti-aliasing.

use crate::error::{Result, SoundprobeError};
use crate::types::{SampleBuffer, TARGET_SAMPLE_RATE};
use rubato::{FftFixedInOut, Resampler};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer as PcmBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

/// Default upper bound on the size of an input we attempt to decode (512 MiB)
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 512 * 1024 * 1024;

/// Longest extension accepted as a codec hint
const MAX_HINT_LEN: usize = 8;

/// Decoder with an input size limit
#[derive(Debug, Clone, Copy)]
pub struct AudioDecoder {
    max_input_bytes: u64,
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INPUT_BYTES)
    }
}

impl AudioDecoder {
    pub fn new(max_input_bytes: u64) -> Self {
        Self { max_input_bytes }
    }

    /// Decode an in-memory file. The bytes are copied, not retained.
    pub fn decode(&self, bytes: &[u8], filename_hint: &str) -> Result<SampleBuffer> {
        self.check_size(bytes.len() as u64, filename_hint)?;
        let source = Cursor::new(bytes.to_vec());
        decode_source(Box::new(source), filename_hint)
    }

    /// Decode a file on disk, using `filename_hint` rather than the path for
    /// the codec hint
    pub fn decode_file(&self, path: &Path, filename_hint: &str) -> Result<SampleBuffer> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            SoundprobeError::decode_error(filename_hint, format!("Failed to read file metadata: {}", e))
        })?;
        self.check_size(metadata.len(), filename_hint)?;

        let file = std::fs::File::open(path).map_err(|e| {
            SoundprobeError::decode_error(filename_hint, format!("Failed to open file: {}", e))
        })?;
        decode_source(Box::new(file), filename_hint)
    }

    fn check_size(&self, len: u64, filename_hint: &str) -> Result<()> {
        if len > self.max_input_bytes {
            return Err(SoundprobeError::decode_error(
                filename_hint,
                format!(
                    "File too large ({:.1} MB). Maximum supported size is {:.1} MB.",
                    len as f64 / (1024.0 * 1024.0),
                    self.max_input_bytes as f64 / (1024.0 * 1024.0)
                ),
            ));
        }
        if len == 0 {
            return Err(SoundprobeError::decode_error(filename_hint, "File is empty"));
        }
        Ok(())
    }
}

/// Decode raw file bytes to a mono [`SampleBuffer`] with the default size limit
pub fn decode(bytes: &[u8], filename_hint: &str) -> Result<SampleBuffer> {
    AudioDecoder::default().decode(bytes, filename_hint)
}

/// Derive a codec hint from an untrusted filename
///
/// Only a short ASCII-alphanumeric extension survives; anything else yields
/// no hint and the prober falls back to content sniffing.
pub fn extension_hint(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty()
        || ext.len() > MAX_HINT_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn decode_source(source: Box<dyn MediaSource>, filename_hint: &str) -> Result<SampleBuffer> {
    let fail = |reason: String| SoundprobeError::decode_error(filename_hint, reason);

    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint(filename_hint) {
        hint.with_extension(&ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| fail(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;

    // First decodable audio track
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| fail("No audio tracks found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let mut source_sample_rate = codec_params.sample_rate;

    debug!(
        "Decoding '{}': {:?}Hz, {:?} channels",
        filename_hint,
        source_sample_rate,
        codec_params.channels.map(|c| c.count())
    );

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| fail(format!("Failed to create decoder: {}", e)))?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(fail(format!("Failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                trace!("Skipping corrupted frame: {}", e);
                continue;
            }
            Err(e) => return Err(fail(format!("Decode error: {}", e))),
        };

        let spec = *decoded.spec();
        if source_sample_rate.is_none() {
            source_sample_rate = Some(spec.rate);
        }
        let channels = spec.channels.count().max(1);

        let mut pcm = PcmBuffer::<f32>::new(decoded.capacity() as u64, spec);
        pcm.copy_interleaved_ref(decoded);
        mono.extend(to_mono(pcm.samples(), channels));
    }

    if mono.is_empty() {
        return Err(fail("Audio decoded to zero samples".to_string()));
    }

    let source_sample_rate = source_sample_rate.unwrap_or(TARGET_SAMPLE_RATE);
    if source_sample_rate == 0 {
        return Err(fail("Invalid source sample rate".to_string()));
    }

    let samples = if source_sample_rate != TARGET_SAMPLE_RATE {
        resample(&mono, source_sample_rate, TARGET_SAMPLE_RATE)
    } else {
        mono
    };

    debug!(
        "Decoded {} samples ({:.2}s)",
        samples.len(),
        samples.len() as f64 / TARGET_SAMPLE_RATE as f64
    );

    SampleBuffer::new(samples).ok_or_else(|| fail("Audio decoded to zero samples".to_string()))
}

/// Convert interleaved multi-channel audio to mono by averaging channels
fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// FFT-based resampling with rubato
///
/// Falls back to linear interpolation if rubato cannot be initialised for
/// the given rate pair.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    const CHUNK_SIZE: usize = 1024;

    let mut resampler =
        match FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 1) {
            Ok(r) => r,
            Err(e) => {
                debug!("Rubato initialization failed ({}), using fallback", e);
                return resample_linear_fallback(samples, from_rate, to_rate);
            }
        };

    let input_frames = resampler.input_frames_next();
    let output_frames = resampler.output_frames_next();

    let ratio = to_rate as f64 / from_rate as f64;
    let mut output = Vec::with_capacity((samples.len() as f64 * ratio).ceil() as usize);

    let mut pos = 0;
    while pos < samples.len() {
        let end = (pos + input_frames).min(samples.len());
        let mut chunk = samples[pos..end].to_vec();
        let valid_in = chunk.len();
        chunk.resize(input_frames, 0.0);

        match resampler.process(&[chunk], None) {
            Ok(resampled) => {
                if let Some(channel) = resampled.first() {
                    let valid_out = if valid_in < input_frames {
                        ((valid_in as f64 * ratio).ceil() as usize).min(output_frames)
                    } else {
                        output_frames
                    };
                    output.extend_from_slice(&channel[..valid_out.min(channel.len())]);
                }
            }
            Err(e) => {
                debug!("Rubato processing error ({}), using fallback for remaining", e);
                output.extend(resample_linear_fallback(&samples[pos..], from_rate, to_rate));
                break;
            }
        }

        pos += input_frames;
    }

    output
}

/// Linear interpolation resampler, used only when rubato fails
fn resample_linear_fallback(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let step = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / step) as usize;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * step;
            let idx = src_pos as usize;
            let frac = (src_pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
                (Some(&a), None) => a,
                _ => samples[samples.len() - 1],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal 16-bit PCM WAV container
    fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_to_mono_stereo() {
        let stereo = vec![0.5, 0.3, 0.8, 0.2, 1.0, 0.0];
        let mono = to_mono(&stereo, 2);
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.4).abs() < 0.001);
        assert!((mono[1] - 0.5).abs() < 0.001);
        assert!((mono[2] - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_to_mono_already_mono() {
        let mono = vec![0.5, 0.8, 1.0];
        assert_eq!(to_mono(&mono, 1), mono);
    }

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint("track.MP3").as_deref(), Some("mp3"));
        assert_eq!(extension_hint("a.b.flac").as_deref(), Some("flac"));
        assert_eq!(extension_hint("noext"), None);
        assert_eq!(extension_hint("../../etc/passwd"), None);
        assert_eq!(extension_hint("x.w/av"), None);
        assert_eq!(extension_hint("trailing."), None);
        assert_eq!(extension_hint("song.averyveryverylongext"), None);
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1, 0.2, 0.3, 0.4, 0.5];
        assert_eq!(resample(&samples, 44100, 44100), samples);
    }

    #[test]
    fn test_resample_upsample_length() {
        let samples: Vec<f32> = (0..22050).map(|i| (i as f32 * 0.01).sin()).collect();
        let result = resample(&samples, 22050, 44100);
        assert!((result.len() as f64 - 44100.0).abs() < 10.0);
    }

    #[test]
    fn test_resample_fallback_length() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let result = resample_linear_fallback(&samples, 48000, 24000);
        assert!((result.len() as f64 - 50.0).abs() < 2.0);
    }

    #[test]
    fn test_decode_wav_bytes() {
        let samples: Vec<i16> = (0..44100).map(|i| ((i % 100) as i16 - 50) * 100).collect();
        let bytes = wav_bytes(&samples, 1, 44100);
        let buffer = decode(&bytes, "tone.wav").expect("WAV should decode");
        assert_eq!(buffer.len(), 44100);
        assert!((buffer.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_stereo_wav_downmixes() {
        // Left = +0.5, right = -0.5 -> mono silence
        let frames = 4410;
        let mut interleaved = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            interleaved.push(16384);
            interleaved.push(-16384);
        }
        let bytes = wav_bytes(&interleaved, 2, 44100);
        let buffer = decode(&bytes, "stereo.wav").unwrap();
        assert_eq!(buffer.len(), frames);
        assert!(buffer.peak() < 1e-3);
    }

    #[test]
    fn test_decode_resamples_to_target_rate() {
        let samples = vec![1000i16; 22050];
        let bytes = wav_bytes(&samples, 1, 22050);
        let buffer = decode(&bytes, "low_rate.wav").unwrap();
        assert!((buffer.duration() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let garbage = b"definitely not an audio stream, just text\n".repeat(64);
        let err = decode(&garbage, "track.mp3").unwrap_err();
        assert!(matches!(err, SoundprobeError::DecodeError { .. }));
    }

    #[test]
    fn test_decode_rejects_empty_input() {
        let err = decode(&[], "empty.wav").unwrap_err();
        assert!(matches!(err, SoundprobeError::DecodeError { .. }));
    }

    #[test]
    fn test_decode_rejects_header_without_samples() {
        let bytes = wav_bytes(&[], 1, 44100);
        let err = decode(&bytes, "hollow.wav").unwrap_err();
        assert!(matches!(err, SoundprobeError::DecodeError { .. }));
    }

    #[test]
    fn test_size_limit() {
        let decoder = AudioDecoder::new(16);
        let bytes = wav_bytes(&[0; 64], 1, 44100);
        let err = decoder.decode(&bytes, "big.wav").unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
