//! Duration-based routing between the inline and background paths.

use std::time::Duration;

/// Which transcription path a clip takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Synchronous provider call; low latency, short clips
    Inline,
    /// Blob upload plus polled background job; long clips
    Background,
}

/// Classifies a clip by its normalized duration.
///
/// Inline iff `duration <= threshold`. Evaluated exactly once per request,
/// on the normalized file's duration, since transcoding can change the raw
/// upload's length.
pub fn classify(duration: Duration, threshold: Duration) -> Route {
    if duration <= threshold {
        Route::Inline
    } else {
        Route::Background
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_durations_route_correctly() {
        let threshold = Duration::from_secs(60);

        assert_eq!(classify(Duration::from_secs(59), threshold), Route::Inline);
        assert_eq!(classify(Duration::from_secs(60), threshold), Route::Inline);
        assert_eq!(
            classify(Duration::from_secs(61), threshold),
            Route::Background
        );
    }

    #[test]
    fn short_and_long_clips_route_as_expected() {
        let threshold = Duration::from_secs(60);
        assert_eq!(classify(Duration::from_secs(5), threshold), Route::Inline);
        assert_eq!(
            classify(Duration::from_secs(90), threshold),
            Route::Background
        );
    }
}
