//! Transcription provider capability and result types.
//!
//! Providers expose two paths: a synchronous inline call for short clips and
//! a submit/poll job API for long ones. The dispatcher picks the path from
//! the normalized clip's duration and doesn't otherwise care which provider
//! is behind the trait.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::job::{JobHandle, JobStatus, PollJob};
use crate::storage::blob::BlobRef;

/// Schema version written into cached results. Bumping it invalidates all
/// prior cache entries on read.
pub const RESULT_VERSION: u32 = 1;

fn default_version() -> u32 {
    RESULT_VERSION
}

/// One transcript segment from an inline provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Transcribed text of this segment
    pub text: String,
    /// Provider confidence in [0, 1]
    pub confidence: f32,
}

/// Immutable transcription record. Created once per distinct fingerprint and
/// stored in the cache; recomputation overwrites wholesale, never merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Full transcript text
    pub text: String,
    /// Detected language code
    pub language: String,
    /// Confidence score in [0, 1]
    pub confidence: f32,
    /// Identifier of the provider that produced the transcript
    pub provider: String,
    /// Set only by the cache-read path, never by the component that
    /// computed the result
    #[serde(default)]
    pub cached: bool,
    /// Result schema version; mismatched entries read as cache misses
    #[serde(default = "default_version")]
    pub version: u32,
}

/// Capability interface over an external speech-to-text service.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Stable provider identifier recorded in results (e.g. "assemblyai").
    fn id(&self) -> &str;

    /// Synchronously transcribes canonical audio bytes. Used for clips at or
    /// below the inline duration threshold.
    async fn transcribe_inline(&self, audio: &[u8], language: &str)
        -> anyhow::Result<Vec<Segment>>;

    /// Submits a long-running transcription job referencing an uploaded
    /// blob. The job is then driven by [`crate::job::JobPoller`].
    async fn submit_long_job(&self, blob: &BlobRef, language: &str)
        -> anyhow::Result<JobHandle>;

    /// Queries the status of a submitted job.
    async fn poll(&self, handle: &JobHandle) -> anyhow::Result<JobStatus>;
}

/// Adapts a provider's `poll` to the generic [`PollJob`] capability.
pub struct ProviderJob<'a>(pub &'a dyn TranscriptionProvider);

#[async_trait]
impl PollJob for ProviderJob<'_> {
    async fn poll(&self, handle: &JobHandle) -> anyhow::Result<JobStatus> {
        self.0.poll(handle).await
    }
}
