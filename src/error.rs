//! Typed errors surfaced by the dispatch engine.
//!
//! Error kinds distinguish user-input problems (size, format, silence) from
//! infrastructure problems (provider, job, blob store), since callers react
//! differently to the two: fix the input vs. retry later.

use std::time::Duration;
use thiserror::Error;

/// Errors from audio validation and normalization.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The input could not be decoded as audio.
    #[error("audio is not decodable: {0}")]
    Unreadable(String),

    /// The input is below the configured loudness floor.
    #[error("audio is too silent to transcribe ({rms_dbfs:.1} dBFS, floor is {floor_dbfs:.1} dBFS)")]
    TooSilent { rms_dbfs: f32, floor_dbfs: f32 },
}

/// Errors from driving an asynchronous external job to a terminal state.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job did not reach a terminal state within the deadline.
    #[error("job did not complete within {0:?}")]
    Timeout(Duration),

    /// The job reached the `error` terminal state; carries the provider's
    /// diagnostic payload.
    #[error("job failed at the provider: {0}")]
    Provider(String),
}

/// Top-level error returned by [`crate::dispatch::TranscriptionDispatcher::process`].
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The payload exceeds the configured size limit. Raised before any I/O.
    #[error("payload is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// The filename extension is not on the accepted-format allowlist.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Validation or normalization of the audio failed.
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// The provider returned an empty segment set for the inline path.
    #[error("provider returned no transcript segments")]
    NoTranscript,

    /// A provider or language-detection call failed outright.
    #[error("provider error: {0}")]
    Provider(String),

    /// The background transcription job failed or timed out.
    #[error(transparent)]
    Job(#[from] JobError),

    /// The object store rejected an upload.
    #[error("blob store error: {0}")]
    BlobStore(String),

    /// Local file handling failed (temp-file creation, reads).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessingError {
    /// Whether the caller can fix this by changing the input, as opposed to
    /// retrying later against healthier infrastructure.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::TooLarge { .. }
                | Self::UnsupportedFormat(_)
                | Self::Audio(_)
                | Self::NoTranscript
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_classified() {
        assert!(ProcessingError::TooLarge { size: 2, limit: 1 }.is_user_error());
        assert!(ProcessingError::UnsupportedFormat("exe".into()).is_user_error());
        assert!(ProcessingError::Audio(AudioError::Unreadable("not audio".into())).is_user_error());
        assert!(!ProcessingError::Provider("500".into()).is_user_error());
        assert!(!ProcessingError::Job(JobError::Timeout(Duration::from_secs(120))).is_user_error());
        assert!(!ProcessingError::BlobStore("denied".into()).is_user_error());
    }
}
