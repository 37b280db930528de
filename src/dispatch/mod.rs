//! The transcription dispatcher: sole entry point of the engine.
//!
//! Turns a raw upload into a cached, validated transcription result through
//! one linear pipeline: limits → fingerprint/cache check → scoped temp file →
//! normalize/validate → language detection → duration routing → inline call
//! or blob-staged background job → cache write → cleanup. Every intermediate
//! artifact is a scoped value (temp files, blob lease), so every exit path,
//! whether success, typed failure, or cancellation, releases what it created.
//!
//! Two concurrent requests with identical content may compute the same
//! fingerprint twice; the duplicate work is accepted (single-flight
//! deduplication would be a possible enhancement).

pub mod route;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AudioNormalizer, NormalizedAudio};
use crate::cache::{self, FingerprintCache};
use crate::config::ScribedConfig;
use crate::detect::LanguageDetector;
use crate::error::ProcessingError;
use crate::job::{JobOutput, JobPoller};
use crate::provider::{ProviderJob, TranscriptionProvider, TranscriptionResult, RESULT_VERSION};
use crate::storage::blob::{BlobLease, BlobRef, BlobStore};
use crate::storage::TempStore;

use route::Route;

/// Configured limits, reported by the health/status query.
#[derive(Debug, Clone, Serialize)]
pub struct EngineLimits {
    pub max_payload_bytes: u64,
    pub inline_threshold_secs: u64,
    pub job_timeout_secs: u64,
    pub supported_formats: Vec<String>,
}

/// Orchestrates fingerprinting, caching, normalization, routing, and
/// cleanup for one upload at a time. Collaborators are injected so tests
/// can substitute fakes.
pub struct TranscriptionDispatcher {
    max_payload_bytes: u64,
    allowed_extensions: Vec<String>,
    inline_threshold: Duration,
    job_timeout: Duration,
    cache: FingerprintCache,
    normalizer: AudioNormalizer,
    temp: TempStore,
    poller: JobPoller,
    detector: Arc<dyn LanguageDetector>,
    provider: Arc<dyn TranscriptionProvider>,
    blob_store: Arc<dyn BlobStore>,
}

impl TranscriptionDispatcher {
    /// Builds a dispatcher from configuration and injected collaborators.
    ///
    /// # Errors
    /// - If the cache or spool directories cannot be created
    pub fn new(
        config: &ScribedConfig,
        detector: Arc<dyn LanguageDetector>,
        provider: Arc<dyn TranscriptionProvider>,
        blob_store: Arc<dyn BlobStore>,
    ) -> anyhow::Result<Self> {
        let cache_dir = config
            .dispatch
            .cache_dir
            .clone()
            .unwrap_or_else(default_cache_dir);
        let spool_dir = config
            .dispatch
            .spool_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("scribed"));

        Ok(Self {
            max_payload_bytes: config.dispatch.max_payload_bytes,
            allowed_extensions: config.dispatch.allowed_extensions.clone(),
            inline_threshold: config.dispatch.inline_threshold(),
            job_timeout: config.dispatch.job_timeout(),
            cache: FingerprintCache::new(&cache_dir)?,
            normalizer: AudioNormalizer::new(&config.audio),
            temp: TempStore::new(&spool_dir)?,
            poller: JobPoller::new(config.dispatch.poll_interval(), config.dispatch.job_timeout()),
            detector,
            provider,
            blob_store,
        })
    }

    /// Reports configured limits. Pure; no side effects.
    pub fn limits(&self) -> EngineLimits {
        EngineLimits {
            max_payload_bytes: self.max_payload_bytes,
            inline_threshold_secs: self.inline_threshold.as_secs(),
            job_timeout_secs: self.job_timeout.as_secs(),
            supported_formats: self.allowed_extensions.clone(),
        }
    }

    /// Processes one upload to a transcription result.
    ///
    /// Cache hits return immediately with `cached = true` and are otherwise
    /// identical to the originally computed result. Failed runs never
    /// populate the cache, and all artifacts created during the run are
    /// removed on every exit path.
    ///
    /// # Errors
    /// See [`ProcessingError`] for the full set of failure kinds.
    pub async fn process(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<TranscriptionResult, ProcessingError> {
        if bytes.len() as u64 > self.max_payload_bytes {
            return Err(ProcessingError::TooLarge {
                size: bytes.len() as u64,
                limit: self.max_payload_bytes,
            });
        }

        let extension = accepted_extension(filename, &self.allowed_extensions)?;

        let fingerprint = cache::fingerprint(bytes);
        if let Some(hit) = self.cache.lookup(&fingerprint) {
            tracing::info!(fingerprint = fingerprint.short(), "Cache hit");
            return Ok(hit);
        }

        // Raw bytes and the normalized form live in scoped temp files; both
        // are removed when this call returns, whatever the outcome.
        let raw = self.temp.write_scoped(
            &format!("{}-raw-", fingerprint.short()),
            &format!(".{extension}"),
            bytes,
        )?;

        let normalized = self
            .normalizer
            .normalize(&self.temp, raw.path(), fingerprint.short())?;
        self.normalizer.validate(&normalized)?;

        let language = self
            .detector
            .detect(normalized.path())
            .await
            .map_err(|e| ProcessingError::Provider(format!("language detection failed: {e:#}")))?;

        let route = route::classify(normalized.duration(), self.inline_threshold);
        tracing::info!(
            fingerprint = fingerprint.short(),
            language = %language,
            duration_secs = normalized.duration().as_secs_f64(),
            ?route,
            "Dispatching transcription"
        );

        let result = match route {
            Route::Inline => self.transcribe_inline(&normalized, &language).await?,
            Route::Background => self.transcribe_background(&normalized, &language).await?,
        };

        // A cache-write failure costs a recomputation later, not the result
        // already in hand.
        if let Err(e) = self.cache.store(&fingerprint, &result) {
            tracing::warn!(fingerprint = fingerprint.short(), "Cache write failed: {e:#}");
        }

        Ok(result)
    }

    /// Short-clip path: one synchronous provider call.
    async fn transcribe_inline(
        &self,
        normalized: &NormalizedAudio,
        language: &str,
    ) -> Result<TranscriptionResult, ProcessingError> {
        let audio = tokio::fs::read(normalized.path()).await?;

        let segments = self
            .provider
            .transcribe_inline(&audio, language)
            .await
            .map_err(|e| ProcessingError::Provider(format!("{e:#}")))?;

        if segments.is_empty() {
            return Err(ProcessingError::NoTranscript);
        }

        let text = segments
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        let confidence = segments.iter().map(|s| s.confidence).sum::<f32>() / segments.len() as f32;

        Ok(self.result(text, language, confidence))
    }

    /// Long-clip path: stage a blob, submit a job, poll to terminal, and
    /// always drop the blob afterwards.
    async fn transcribe_background(
        &self,
        normalized: &NormalizedAudio,
        language: &str,
    ) -> Result<TranscriptionResult, ProcessingError> {
        let lease = BlobLease::acquire(Arc::clone(&self.blob_store), normalized.path()).await?;

        let outcome = self.run_job(lease.blob(), language).await;

        // The blob is removed on success, provider error, and timeout alike;
        // cancellation is covered by the lease's drop.
        lease.release().await;

        let output = outcome?;
        Ok(self.result(output.text, language, output.confidence))
    }

    async fn run_job(&self, blob: &BlobRef, language: &str) -> Result<JobOutput, ProcessingError> {
        let handle = self
            .provider
            .submit_long_job(blob, language)
            .await
            .map_err(|e| ProcessingError::Provider(format!("{e:#}")))?;

        let output = self
            .poller
            .await_completion(&ProviderJob(self.provider.as_ref()), &handle)
            .await?;

        Ok(output)
    }

    fn result(&self, text: String, language: &str, confidence: f32) -> TranscriptionResult {
        TranscriptionResult {
            text,
            language: language.to_string(),
            confidence,
            provider: self.provider.id().to_string(),
            cached: false,
            version: RESULT_VERSION,
        }
    }
}

/// Checks the filename against the accepted-extension allowlist and returns
/// the lowercased extension.
fn accepted_extension(
    filename: &str,
    allowed: &[String],
) -> Result<String, ProcessingError> {
    let extension = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .ok_or_else(|| ProcessingError::UnsupportedFormat(filename.to_string()))?;

    if allowed.iter().any(|a| a == &extension) {
        Ok(extension)
    } else {
        Err(ProcessingError::UnsupportedFormat(extension))
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("scribed"))
        .unwrap_or_else(|| std::env::temp_dir().join("scribed-cache"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatchConfig, ScribedConfig};
    use crate::error::{AudioError, JobError};
    use crate::job::{JobHandle, JobStatus};
    use crate::provider::Segment;
    use async_trait::async_trait;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::collections::HashSet;
    use std::f32::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeDetector {
        language: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageDetector for FakeDetector {
        async fn detect(&self, _audio_path: &Path) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.language.to_string())
        }
    }

    struct FakeProvider {
        segments: Vec<Segment>,
        job_statuses: Mutex<Vec<JobStatus>>,
        inline_calls: AtomicUsize,
        submitted: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn inline(segments: Vec<Segment>) -> Arc<Self> {
            Arc::new(Self {
                segments,
                job_statuses: Mutex::new(vec![JobStatus::Pending]),
                inline_calls: AtomicUsize::new(0),
                submitted: Mutex::new(Vec::new()),
            })
        }

        fn background(statuses: Vec<JobStatus>) -> Arc<Self> {
            Arc::new(Self {
                segments: Vec::new(),
                job_statuses: Mutex::new(statuses),
                inline_calls: AtomicUsize::new(0),
                submitted: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TranscriptionProvider for FakeProvider {
        fn id(&self) -> &str {
            "fake"
        }

        async fn transcribe_inline(
            &self,
            _audio: &[u8],
            _language: &str,
        ) -> anyhow::Result<Vec<Segment>> {
            self.inline_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.segments.clone())
        }

        async fn submit_long_job(
            &self,
            blob: &BlobRef,
            _language: &str,
        ) -> anyhow::Result<JobHandle> {
            self.submitted.lock().unwrap().push(blob.uri().to_string());
            Ok(JobHandle("job-1".to_string()))
        }

        async fn poll(&self, _handle: &JobHandle) -> anyhow::Result<JobStatus> {
            let mut statuses = self.job_statuses.lock().unwrap();
            if statuses.len() > 1 {
                Ok(statuses.remove(0))
            } else {
                Ok(statuses[0].clone())
            }
        }
    }

    struct FakeBlobStore {
        live: Mutex<HashSet<BlobRef>>,
        uploads: AtomicUsize,
    }

    impl FakeBlobStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                live: Mutex::new(HashSet::new()),
                uploads: AtomicUsize::new(0),
            })
        }

        fn live_count(&self) -> usize {
            self.live.lock().unwrap().len()
        }

        fn upload_count(&self) -> usize {
            self.uploads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BlobStore for FakeBlobStore {
        async fn upload(&self, path: &Path) -> anyhow::Result<BlobRef> {
            let n = self.uploads.fetch_add(1, Ordering::SeqCst);
            let blob = BlobRef(format!("mem://{n}/{}", path.display()));
            self.live.lock().unwrap().insert(blob.clone());
            Ok(blob)
        }

        async fn delete(&self, blob: &BlobRef) -> anyhow::Result<()> {
            self.live.lock().unwrap().remove(blob);
            Ok(())
        }

        async fn exists(&self, blob: &BlobRef) -> anyhow::Result<bool> {
            Ok(self.live.lock().unwrap().contains(blob))
        }
    }

    /// Dispatcher over fakes plus the handles the assertions need.
    struct Harness {
        dispatcher: TranscriptionDispatcher,
        detector: Arc<FakeDetector>,
        provider: Arc<FakeProvider>,
        blob_store: Arc<FakeBlobStore>,
        spool_dir: TempDir,
        _cache_dir: TempDir,
    }

    impl Harness {
        fn new(provider: Arc<FakeProvider>, tune: impl FnOnce(&mut DispatchConfig)) -> Self {
            let cache_dir = tempfile::tempdir().unwrap();
            let spool_dir = tempfile::tempdir().unwrap();

            let mut config = ScribedConfig::default();
            config.dispatch.cache_dir = Some(cache_dir.path().to_path_buf());
            config.dispatch.spool_dir = Some(spool_dir.path().to_path_buf());
            tune(&mut config.dispatch);

            let detector = Arc::new(FakeDetector {
                language: "hindi",
                calls: AtomicUsize::new(0),
            });
            let blob_store = FakeBlobStore::new();

            let dispatcher = TranscriptionDispatcher::new(
                &config,
                detector.clone(),
                provider.clone(),
                blob_store.clone(),
            )
            .unwrap();

            Self {
                dispatcher,
                detector,
                provider,
                blob_store,
                spool_dir,
                _cache_dir: cache_dir,
            }
        }

        fn spool_is_empty(&self) -> bool {
            std::fs::read_dir(self.spool_dir.path()).unwrap().count() == 0
        }
    }

    /// In-memory WAV bytes: mono 16 kHz sine tone.
    fn wav_bytes(secs: f32, amplitude: f32) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = WavWriter::new(cursor, spec).unwrap();
            let count = (16_000.0 * secs) as usize;
            for n in 0..count {
                let sample = amplitude * (2.0 * PI * 440.0 * n as f32 / 16_000.0).sin();
                writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        buf
    }

    fn segment(text: &str, confidence: f32) -> Segment {
        Segment {
            text: text.to_string(),
            confidence,
        }
    }

    #[tokio::test]
    async fn short_clip_takes_inline_path_and_caches() {
        let provider = FakeProvider::inline(vec![segment("namaste duniya", 0.9)]);
        let harness = Harness::new(provider, |_| {});
        let bytes = wav_bytes(0.5, 0.5);

        let result = harness.dispatcher.process(&bytes, "clip.wav").await.unwrap();

        assert!(!result.cached);
        assert_eq!(result.text, "namaste duniya");
        assert_eq!(result.language, "hindi");
        assert_eq!(result.provider, "fake");
        assert_eq!(harness.provider.inline_calls.load(Ordering::SeqCst), 1);
        assert!(harness.spool_is_empty());

        // Identical re-upload: cache hit, no further provider or detector work.
        let hit = harness.dispatcher.process(&bytes, "clip.wav").await.unwrap();
        assert!(hit.cached);
        assert_eq!(hit.text, result.text);
        assert_eq!(hit.language, result.language);
        assert_eq!(hit.confidence, result.confidence);
        assert_eq!(harness.provider.inline_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.detector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn long_clip_takes_background_path_and_releases_blob() {
        let provider = FakeProvider::background(vec![
            JobStatus::Processing,
            JobStatus::Completed(JobOutput {
                text: "a longer speech".to_string(),
                confidence: 0.77,
            }),
        ]);
        let harness = Harness::new(provider, |d| {
            d.inline_threshold_secs = 1;
        });
        let bytes = wav_bytes(2.0, 0.5);

        let result = harness.dispatcher.process(&bytes, "talk.wav").await.unwrap();

        assert!(!result.cached);
        assert_eq!(result.text, "a longer speech");
        assert_eq!(result.confidence, 0.77);
        assert_eq!(harness.blob_store.upload_count(), 1);
        assert_eq!(harness.blob_store.live_count(), 0, "blob leaked");
        assert_eq!(harness.provider.submitted.lock().unwrap().len(), 1);
        assert!(harness.spool_is_empty());

        let hit = harness.dispatcher.process(&bytes, "talk.wav").await.unwrap();
        assert!(hit.cached);
        assert_eq!(harness.blob_store.upload_count(), 1);
    }

    #[tokio::test]
    async fn silent_audio_fails_before_any_provider_call() {
        let provider = FakeProvider::inline(vec![segment("should never be used", 0.9)]);
        let harness = Harness::new(provider, |_| {});
        let bytes = wav_bytes(1.0, 0.0);

        let err = harness.dispatcher.process(&bytes, "quiet.wav").await.unwrap_err();

        assert!(matches!(
            err,
            ProcessingError::Audio(AudioError::TooSilent { .. })
        ));
        assert_eq!(harness.detector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.provider.inline_calls.load(Ordering::SeqCst), 0);
        assert!(harness.spool_is_empty());

        // No stale cache write: the same upload fails again instead of hitting.
        let err = harness.dispatcher.process(&bytes, "quiet.wav").await.unwrap_err();
        assert!(matches!(err, ProcessingError::Audio(_)));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_before_any_io() {
        let provider = FakeProvider::inline(vec![segment("unused", 0.9)]);
        let harness = Harness::new(provider, |d| d.max_payload_bytes = 1024);
        let bytes = vec![0u8; 2048];

        let err = harness.dispatcher.process(&bytes, "big.wav").await.unwrap_err();

        assert!(matches!(
            err,
            ProcessingError::TooLarge { size: 2048, limit: 1024 }
        ));
        assert!(harness.spool_is_empty(), "oversized payload touched disk");
    }

    #[tokio::test(start_paused = true)]
    async fn job_timeout_deletes_blob_and_caches_nothing() {
        let provider = FakeProvider::background(vec![JobStatus::Processing]);
        let harness = Harness::new(provider, |d| {
            d.inline_threshold_secs = 1;
            d.job_timeout_secs = 10;
        });
        let bytes = wav_bytes(2.0, 0.5);

        let err = harness.dispatcher.process(&bytes, "talk.wav").await.unwrap_err();

        assert!(matches!(err, ProcessingError::Job(JobError::Timeout(_))));
        assert_eq!(harness.blob_store.upload_count(), 1);
        assert_eq!(harness.blob_store.live_count(), 0, "blob leaked on timeout");
        assert!(harness.spool_is_empty());

        // Failed runs never populate the cache: a retry does the work again.
        let _ = harness.dispatcher.process(&bytes, "talk.wav").await.unwrap_err();
        assert_eq!(harness.blob_store.upload_count(), 2);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let provider = FakeProvider::inline(vec![segment("unused", 0.9)]);
        let harness = Harness::new(provider, |_| {});

        let err = harness
            .dispatcher
            .process(b"plain text", "notes.txt")
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessingError::UnsupportedFormat(ext) if ext == "txt"));
        assert!(harness.spool_is_empty());
    }

    #[tokio::test]
    async fn empty_segment_set_is_no_transcript() {
        let provider = FakeProvider::inline(vec![]);
        let harness = Harness::new(provider, |_| {});
        let bytes = wav_bytes(0.5, 0.5);

        let err = harness.dispatcher.process(&bytes, "clip.wav").await.unwrap_err();

        assert!(matches!(err, ProcessingError::NoTranscript));
        assert!(harness.spool_is_empty());

        // Not cached: the retry reaches the provider again.
        let _ = harness.dispatcher.process(&bytes, "clip.wav").await.unwrap_err();
        assert_eq!(harness.provider.inline_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn inline_confidence_is_averaged_across_segments() {
        let provider =
            FakeProvider::inline(vec![segment("first part", 0.8), segment("second part", 0.6)]);
        let harness = Harness::new(provider, |_| {});
        let bytes = wav_bytes(0.5, 0.5);

        let result = harness.dispatcher.process(&bytes, "clip.wav").await.unwrap();

        assert_eq!(result.text, "first part second part");
        assert!((result.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn limits_report_configuration() {
        let provider = FakeProvider::inline(vec![]);
        let harness = Harness::new(provider, |d| d.max_payload_bytes = 5 * 1024 * 1024);

        let limits = harness.dispatcher.limits();
        assert_eq!(limits.max_payload_bytes, 5 * 1024 * 1024);
        assert_eq!(limits.inline_threshold_secs, 60);
        assert_eq!(limits.job_timeout_secs, 120);
        assert!(limits.supported_formats.contains(&"wav".to_string()));
    }
}
