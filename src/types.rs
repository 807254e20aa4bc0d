//! Core data types for soundprobe
//!
//! These types represent the domain model and flow through the pipeline.

use serde::{Deserialize, Serialize};

/// Sample rate every decoded buffer is converted to (44.1 kHz)
pub const TARGET_SAMPLE_RATE: u32 = 44100;

// =============================================================================
// Musical primitives
// =============================================================================

/// The 12 pitch classes in Western music
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    Cs, // C#
    D,
    Ds, // D#
    E,
    F,
    Fs, // F#
    G,
    Gs, // G#
    A,
    As, // A#
    B,
}

impl PitchClass {
    /// All pitch classes in chromatic order starting at C
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::Cs,
        PitchClass::D,
        PitchClass::Ds,
        PitchClass::E,
        PitchClass::F,
        PitchClass::Fs,
        PitchClass::G,
        PitchClass::Gs,
        PitchClass::A,
        PitchClass::As,
        PitchClass::B,
    ];

    /// Convert from numeric index (0 = C, 1 = C#, ..., 11 = B), wrapping at 12
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 12]
    }

    /// Convert to numeric index (0 = C, 1 = C#, ..., 11 = B)
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Sharp spelling ("C", "C#", ..., "B")
    pub fn label(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Cs => "C#",
            PitchClass::D => "D",
            PitchClass::Ds => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Fs => "F#",
            PitchClass::G => "G",
            PitchClass::Gs => "G#",
            PitchClass::A => "A",
            PitchClass::As => "A#",
            PitchClass::B => "B",
        }
    }
}

/// Major or minor scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Major,
    Minor,
}

impl Scale {
    pub fn label(self) -> &'static str {
        match self {
            Scale::Major => "major",
            Scale::Minor => "minor",
        }
    }
}

// =============================================================================
// Request input
// =============================================================================

/// An uploaded file as received at the request boundary
///
/// The filename is client-supplied and untrusted. It is only ever used to
/// derive a codec hint, never to address storage.
#[derive(Clone)]
pub struct RawUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl RawUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

impl std::fmt::Debug for RawUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawUpload")
            .field("filename", &self.filename)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

// =============================================================================
// Audio buffer
// =============================================================================

/// Decoded mono samples at [`TARGET_SAMPLE_RATE`]
///
/// Never empty: construction fails for an empty sample vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
}

impl SampleBuffer {
    /// Wrap mono samples already at [`TARGET_SAMPLE_RATE`]
    pub fn new(samples: Vec<f32>) -> Option<Self> {
        if samples.is_empty() {
            None
        } else {
            Some(Self { samples })
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a constructed buffer
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        TARGET_SAMPLE_RATE
    }

    /// Duration in seconds (`len / sample_rate`)
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / TARGET_SAMPLE_RATE as f64
    }

    /// Peak absolute amplitude
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
    }
}

// =============================================================================
// Analysis results
// =============================================================================

/// Tempo analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoResult {
    /// Detected tempo; 0.0 for silent or too-short input
    pub bpm: f64,
    /// Beat positions in seconds, strictly increasing
    pub beats: Vec<f64>,
    /// Beat-tracking confidence (0.0 - 1.0)
    pub confidence: f64,
}

impl TempoResult {
    /// Result for silent or too-short input
    pub fn none() -> Self {
        Self {
            bpm: 0.0,
            beats: Vec::new(),
            confidence: 0.0,
        }
    }

    /// Result for audible material without a detectable pulse
    ///
    /// Reports `bpm` with no beats and zero confidence.
    pub fn unpulsed(bpm: f64) -> Self {
        Self {
            bpm,
            beats: Vec::new(),
            confidence: 0.0,
        }
    }
}

/// Musical key analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TonalResult {
    pub key: PitchClass,
    pub scale: Scale,
    /// Template correlation (0.0 - 1.0)
    pub strength: f64,
}

/// Rhythmic regularity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DanceabilityResult {
    /// Score in [0, 3], higher is more regular
    pub score: f64,
}

/// Loudness measures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoudnessResult {
    /// Mean squared sample amplitude
    pub energy: f64,
    /// Root mean square amplitude
    pub rms: f64,
}

/// Complete descriptor set for a single upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub tempo: TempoResult,
    pub tonal: TonalResult,
    pub danceability: DanceabilityResult,
    pub loudness: LoudnessResult,
    /// Duration in seconds
    pub duration: f64,
    /// Number of decoded mono samples
    pub sample_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_class_index_round_trip() {
        for (i, pc) in PitchClass::ALL.iter().enumerate() {
            assert_eq!(pc.to_index(), i);
            assert_eq!(PitchClass::from_index(i), *pc);
        }
        assert_eq!(PitchClass::from_index(14), PitchClass::D);
    }

    #[test]
    fn test_pitch_class_labels_use_sharps() {
        let labels: Vec<_> = PitchClass::ALL.iter().map(|p| p.label()).collect();
        assert_eq!(
            labels,
            ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"]
        );
    }

    #[test]
    fn test_scale_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Scale::Minor).unwrap(), "\"minor\"");
        assert_eq!(Scale::Major.label(), "major");
    }

    #[test]
    fn test_sample_buffer_rejects_empty() {
        assert!(SampleBuffer::new(Vec::new()).is_none());
    }

    #[test]
    fn test_sample_buffer_duration() {
        let buffer = SampleBuffer::new(vec![0.0; 88200]).unwrap();
        assert_eq!(buffer.len(), 88200);
        assert!((buffer.duration() - 2.0).abs() < 1e-12);
        assert_eq!(buffer.sample_rate(), 44100);
    }

    #[test]
    fn test_raw_upload_debug_hides_bytes() {
        let upload = RawUpload::new("a.wav", vec![1, 2, 3]);
        let dbg = format!("{:?}", upload);
        assert!(dbg.contains("a.wav"));
        assert!(dbg.contains('3'));
        assert!(!dbg.contains("[1, 2, 3]"));
    }
}
