//! Request orchestration
//!
//! Drives one upload through `Received → Decoding → Analyzing → Completed`
//! (or `Failed` from any state). The staged copy of the upload is released
//! on every exit path. Extractors run concurrently on a dedicated rayon pool
//! and report back over a crossbeam channel.

use crate::analysis::{
    DanceabilityEstimator, Descriptor, FeatureExtractor, LoudnessAnalyzer, TempoEstimator,
    TonalAnalyzer,
};
use crate::audio::AudioDecoder;
use crate::config::Settings;
use crate::error::{ErrorContext, Result, SoundprobeError};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::staging::StagedUpload;
use crate::types::{AnalysisResult, RawUpload, SampleBuffer};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the orchestrator checks for cancellation while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(10);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Decoding,
    Analyzing,
    Completed,
    Failed,
}

/// Everything observable about one handled request
#[derive(Debug)]
pub struct RequestOutcome {
    pub request_id: u64,
    /// States visited, in order
    pub transitions: Vec<RequestState>,
    pub result: Result<AnalysisResult>,
}

impl RequestOutcome {
    pub fn final_state(&self) -> RequestState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(RequestState::Received)
    }
}

/// Analysis orchestrator
///
/// Holds no per-request state; one instance can serve concurrent requests.
pub struct Orchestrator {
    settings: Settings,
    decoder: AudioDecoder,
    extractors: Vec<Arc<dyn FeatureExtractor>>,
    pool: rayon::ThreadPool,
}

impl Orchestrator {
    /// Orchestrator with the four standard extractors
    pub fn new(settings: Settings) -> Result<Self> {
        let extractors: Vec<Arc<dyn FeatureExtractor>> = vec![
            Arc::new(TempoEstimator::new(settings.analysis.tempo.clone())),
            Arc::new(TonalAnalyzer::new(settings.analysis.chroma.clone())),
            Arc::new(DanceabilityEstimator::new()),
            Arc::new(LoudnessAnalyzer::new()),
        ];
        Self::with_extractors(settings, extractors)
    }

    /// Orchestrator with a custom extractor set
    pub fn with_extractors(
        settings: Settings,
        extractors: Vec<Arc<dyn FeatureExtractor>>,
    ) -> Result<Self> {
        settings.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.analysis_threads)
            .thread_name(|i| format!("soundprobe-analysis-{}", i))
            .build()
            .map_err(|e| {
                SoundprobeError::ConfigError(format!("Failed to configure thread pool: {}", e))
            })?;
        debug!(
            "Configured analysis pool with {} threads",
            settings.analysis_threads
        );

        Ok(Self {
            decoder: AudioDecoder::new(settings.max_upload_bytes),
            settings,
            extractors,
            pool,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Analyze an upload, returning only the result
    pub fn analyze(&self, upload: Option<RawUpload>) -> Result<AnalysisResult> {
        self.handle(upload, &CancellationToken::new()).result
    }

    /// Handle one request end to end
    pub fn handle(&self, upload: Option<RawUpload>, cancel: &CancellationToken) -> RequestOutcome {
        let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let mut transitions = vec![RequestState::Received];
        let mut staged: Option<StagedUpload> = None;

        let result = self.process(request_id, upload, cancel, &mut transitions, &mut staged);

        if let Some(mut artifact) = staged.take() {
            artifact.release();
        }

        match &result {
            Ok(analysis) => {
                transitions.push(RequestState::Completed);
                info!(
                    "[request {}] completed in {:.2}s: {:.1} BPM, {} {}",
                    request_id,
                    started.elapsed().as_secs_f64(),
                    analysis.tempo.bpm,
                    analysis.tonal.key.label(),
                    analysis.tonal.scale.label()
                );
            }
            Err(e) => {
                transitions.push(RequestState::Failed);
                if e.is_client_error() {
                    debug!("[request {}] rejected: {}", request_id, e);
                } else {
                    warn!("[request {}] failed: {}", request_id, e);
                }
            }
        }

        RequestOutcome {
            request_id,
            transitions,
            result,
        }
    }

    fn process(
        &self,
        request_id: u64,
        upload: Option<RawUpload>,
        cancel: &CancellationToken,
        transitions: &mut Vec<RequestState>,
        staged: &mut Option<StagedUpload>,
    ) -> Result<AnalysisResult> {
        let upload = upload.ok_or(SoundprobeError::MissingUpload)?;
        if upload.filename.is_empty() {
            return Err(SoundprobeError::EmptyFilename);
        }
        ensure_not_cancelled(cancel)?;

        transitions.push(RequestState::Decoding);
        let RawUpload { filename, bytes } = upload;
        debug!(
            "[request {}] decoding '{}' ({} bytes)",
            request_id,
            filename,
            bytes.len()
        );

        let artifact = staged.insert(StagedUpload::create(
            &self.settings.staging_dir,
            &filename,
            &bytes,
        )?);
        drop(bytes);
        let buffer = self.decoder.decode_file(artifact.path(), &filename)?;
        ensure_not_cancelled(cancel)?;

        transitions.push(RequestState::Analyzing);
        debug!(
            "[request {}] analyzing {:.2}s of audio",
            request_id,
            buffer.duration()
        );
        let buffer = Arc::new(buffer);
        let descriptors = self.run_extractors(&buffer, cancel)?;

        assemble(&buffer, descriptors)
    }

    /// Run every extractor on the pool and collect their descriptors
    ///
    /// Returns on the first failure or on cancellation. Extractors still
    /// running finish detached and their results are dropped.
    fn run_extractors(
        &self,
        buffer: &Arc<SampleBuffer>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Descriptor>> {
        let (tx, rx) = unbounded::<(&'static str, Result<Descriptor>)>();

        for extractor in &self.extractors {
            let tx = tx.clone();
            let buffer = Arc::clone(buffer);
            let extractor = Arc::clone(extractor);
            self.pool.spawn(move || {
                let name = extractor.name();
                let started = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(&buffer)))
                    .unwrap_or_else(|payload| {
                        Err(SoundprobeError::analysis_error(
                            name,
                            format!("extractor panicked: {}", panic_message(payload.as_ref())),
                        ))
                    });
                debug!(
                    "Extractor {} finished in {:.3}s",
                    name,
                    started.elapsed().as_secs_f64()
                );
                if tx.send((name, outcome)).is_err() {
                    // Request already finished
                    debug!("Dropping late result from {}", name);
                }
            });
        }
        drop(tx);

        let mut descriptors = Vec::with_capacity(self.extractors.len());
        while descriptors.len() < self.extractors.len() {
            ensure_not_cancelled(cancel)?;
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok((_, Ok(descriptor))) => descriptors.push(descriptor),
                Ok((_, Err(e))) => return Err(e),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(e @ RecvTimeoutError::Disconnected) => {
                    return Err(e).with_extractor_context("orchestrator");
                }
            }
        }

        Ok(descriptors)
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(SoundprobeError::Cancelled)
    } else {
        Ok(())
    }
}

/// Combine one descriptor of each kind into the final result
fn assemble(buffer: &SampleBuffer, descriptors: Vec<Descriptor>) -> Result<AnalysisResult> {
    let mut tempo = None;
    let mut tonal = None;
    let mut danceability = None;
    let mut loudness = None;

    for descriptor in descriptors {
        match descriptor {
            Descriptor::Tempo(r) => tempo = Some(r),
            Descriptor::Tonal(r) => tonal = Some(r),
            Descriptor::Danceability(r) => danceability = Some(r),
            Descriptor::Loudness(r) => loudness = Some(r),
        }
    }

    let missing =
        |kind: &str| SoundprobeError::analysis_error("orchestrator", format!("no {} descriptor", kind));

    Ok(AnalysisResult {
        tempo: tempo.ok_or_else(|| missing("tempo"))?,
        tonal: tonal.ok_or_else(|| missing("tonal"))?,
        danceability: danceability.ok_or_else(|| missing("danceability"))?,
        loudness: loudness.ok_or_else(|| missing("loudness"))?,
        duration: buffer.duration(),
        sample_count: buffer.len(),
    })
}

/// Extract a readable message from a panic payload
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DanceabilityResult, LoudnessResult, PitchClass, Scale, TempoResult, TonalResult};
    use std::io::Cursor;

    fn wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn settings(dir: &std::path::Path) -> Settings {
        Settings {
            staging_dir: dir.to_path_buf(),
            analysis_threads: 2,
            ..Settings::default()
        }
    }

    struct Fixed(Descriptor);

    impl FeatureExtractor for Fixed {
        fn extract(&self, _: &SampleBuffer) -> Result<Descriptor> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &'static str {
            self.0.kind()
        }
    }

    struct Panicking;

    impl FeatureExtractor for Panicking {
        fn extract(&self, _: &SampleBuffer) -> Result<Descriptor> {
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            "tonal"
        }
    }

    struct Slow;

    impl FeatureExtractor for Slow {
        fn extract(&self, _: &SampleBuffer) -> Result<Descriptor> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(Descriptor::Danceability(DanceabilityResult { score: 1.0 }))
        }
        fn name(&self) -> &'static str {
            "danceability"
        }
    }

    fn stub_extractors(tonal: Arc<dyn FeatureExtractor>) -> Vec<Arc<dyn FeatureExtractor>> {
        vec![
            Arc::new(Fixed(Descriptor::Tempo(TempoResult::none()))),
            tonal,
            Arc::new(Fixed(Descriptor::Danceability(DanceabilityResult { score: 0.5 }))),
            Arc::new(Fixed(Descriptor::Loudness(LoudnessResult { energy: 0.0, rms: 0.0 }))),
        ]
    }

    fn fixed_tonal() -> Arc<dyn FeatureExtractor> {
        Arc::new(Fixed(Descriptor::Tonal(TonalResult {
            key: PitchClass::E,
            scale: Scale::Minor,
            strength: 0.5,
        })))
    }

    fn staging_is_empty(dir: &std::path::Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_missing_upload_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(settings(dir.path())).unwrap();
        let outcome = orchestrator.handle(None, &CancellationToken::new());
        assert!(matches!(outcome.result, Err(SoundprobeError::MissingUpload)));
        assert_eq!(
            outcome.transitions,
            vec![RequestState::Received, RequestState::Failed]
        );
        assert!(staging_is_empty(dir.path()));
    }

    #[test]
    fn test_empty_filename_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(settings(dir.path())).unwrap();
        let upload = RawUpload::new("", wav(&[0.1; 1000], 44100));
        let err = orchestrator.analyze(Some(upload)).unwrap_err();
        assert!(matches!(err, SoundprobeError::EmptyFilename));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_completed_request_with_stub_extractors() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            Orchestrator::with_extractors(settings(dir.path()), stub_extractors(fixed_tonal()))
                .unwrap();
        let upload = RawUpload::new("clip.wav", wav(&vec![0.25; 22050], 44100));
        let outcome = orchestrator.handle(Some(upload), &CancellationToken::new());

        assert_eq!(
            outcome.transitions,
            vec![
                RequestState::Received,
                RequestState::Decoding,
                RequestState::Analyzing,
                RequestState::Completed
            ]
        );
        let result = outcome.result.unwrap();
        assert_eq!(result.sample_count, 22050);
        assert!((result.duration - 0.5).abs() < 1e-9);
        assert_eq!(result.tonal.key, PitchClass::E);
        assert!(staging_is_empty(dir.path()));
    }

    #[test]
    fn test_extractor_panic_becomes_analysis_error() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            Orchestrator::with_extractors(settings(dir.path()), stub_extractors(Arc::new(Panicking)))
                .unwrap();
        let upload = RawUpload::new("clip.wav", wav(&vec![0.25; 4410], 44100));
        let outcome = orchestrator.handle(Some(upload), &CancellationToken::new());

        match &outcome.result {
            Err(SoundprobeError::AnalysisError { extractor, reason }) => {
                assert_eq!(extractor, "tonal");
                assert!(reason.contains("boom"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(outcome.final_state(), RequestState::Failed);
        assert!(staging_is_empty(dir.path()));
    }

    #[test]
    fn test_decode_failure_releases_staging() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(settings(dir.path())).unwrap();
        let upload = RawUpload::new("track.mp3", b"not audio at all".repeat(100));
        let outcome = orchestrator.handle(Some(upload), &CancellationToken::new());

        assert!(matches!(outcome.result, Err(SoundprobeError::DecodeError { .. })));
        assert_eq!(
            outcome.transitions,
            vec![RequestState::Received, RequestState::Decoding, RequestState::Failed]
        );
        assert!(staging_is_empty(dir.path()));
    }

    #[test]
    fn test_cancel_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(settings(dir.path())).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let upload = RawUpload::new("a.wav", wav(&[0.1; 4410], 44100));
        let outcome = orchestrator.handle(Some(upload), &token);
        assert!(matches!(outcome.result, Err(SoundprobeError::Cancelled)));
        assert_eq!(
            outcome.transitions,
            vec![RequestState::Received, RequestState::Failed]
        );
    }

    #[test]
    fn test_cancel_while_analyzing() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractors = stub_extractors(fixed_tonal());
        extractors[2] = Arc::new(Slow);
        let orchestrator = Orchestrator::with_extractors(settings(dir.path()), extractors).unwrap();

        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                token.cancel();
            })
        };

        let upload = RawUpload::new("a.wav", wav(&[0.1; 4410], 44100));
        let outcome = orchestrator.handle(Some(upload), &token);
        canceller.join().unwrap();

        assert!(matches!(outcome.result, Err(SoundprobeError::Cancelled)));
        assert!(outcome.transitions.contains(&RequestState::Analyzing));
        assert_eq!(outcome.final_state(), RequestState::Failed);
        assert!(staging_is_empty(dir.path()));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(settings(dir.path())).unwrap();
        let a = orchestrator.handle(None, &CancellationToken::new());
        let b = orchestrator.handle(None, &CancellationToken::new());
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = Settings {
            analysis_threads: 0,
            ..settings(dir.path())
        };
        match Orchestrator::new(bad) {
            Err(err) => {
                assert!(matches!(err, SoundprobeError::ConfigError(_)));
                assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG_ERROR);
                assert_ne!(err.exit_code(), crate::error::EXIT_CLIENT_ERROR);
            }
            Ok(_) => panic!("zero analysis threads accepted"),
        }
    }
}
