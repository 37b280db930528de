//! Generic state machine for driving asynchronous external jobs.
//!
//! Any submitted job (format conversion, long-running transcription) is
//! polled at a fixed interval until it reaches a terminal state or the
//! overall deadline elapses. Suspension happens only at the poll and sleep
//! boundaries, so dropping the future cancels the wait cleanly; any
//! out-of-band cleanup of the remote job itself stays with the caller, since
//! most job services have no cancel endpoint.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::JobError;

/// Opaque identifier for one outstanding job at an external service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle(pub String);

/// Completed-job payload.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    /// Transcript text produced by the job
    pub text: String,
    /// Provider-reported confidence in [0, 1]
    pub confidence: f32,
}

/// Status reported by one poll of an external job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Queued, not yet started
    Pending,
    /// Running
    Processing,
    /// Terminal: finished with output
    Completed(JobOutput),
    /// Terminal: failed with the provider's diagnostic payload
    Error(String),
}

/// Capability to query the status of a submitted job.
///
/// Submission stays with the service that owns the job (see
/// [`crate::provider::TranscriptionProvider::submit_long_job`]); the poller
/// drives any handle to a terminal state.
#[async_trait]
pub trait PollJob: Send + Sync {
    /// Queries current job status. Errors are treated as provider failures.
    async fn poll(&self, handle: &JobHandle) -> anyhow::Result<JobStatus>;
}

/// Fixed-interval poller with a hard completion deadline.
#[derive(Debug, Clone, Copy)]
pub struct JobPoller {
    poll_interval: Duration,
    timeout: Duration,
}

impl JobPoller {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Polls until the job reaches a terminal state.
    ///
    /// Returns the output immediately on `Completed` (no further polling)
    /// and fails immediately on `Error`. The loop never polls faster than
    /// the configured interval. If the deadline elapses before a terminal
    /// state, fails with [`JobError::Timeout`].
    ///
    /// # Errors
    /// - [`JobError::Provider`] if the job fails or a poll request errors
    /// - [`JobError::Timeout`] if no terminal state is reached in time
    pub async fn await_completion(
        &self,
        driver: &dyn PollJob,
        handle: &JobHandle,
    ) -> Result<JobOutput, JobError> {
        let poll_loop = async {
            loop {
                let status = driver
                    .poll(handle)
                    .await
                    .map_err(|e| JobError::Provider(format!("{e:#}")))?;

                match status {
                    JobStatus::Completed(output) => return Ok(output),
                    JobStatus::Error(diagnostic) => return Err(JobError::Provider(diagnostic)),
                    JobStatus::Pending | JobStatus::Processing => {
                        tracing::trace!(job = %handle.0, ?status, "Job not terminal yet");
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        };

        match tokio::time::timeout(self.timeout, poll_loop).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(job = %handle.0, timeout = ?self.timeout, "Job polling timed out");
                Err(JobError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted driver: pops one status per poll, repeating the last.
    struct ScriptedJob {
        statuses: Mutex<Vec<JobStatus>>,
        polls: AtomicUsize,
    }

    impl ScriptedJob {
        fn new(statuses: Vec<JobStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses),
                polls: AtomicUsize::new(0),
            }
        }

        fn poll_count(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PollJob for ScriptedJob {
        async fn poll(&self, _handle: &JobHandle) -> anyhow::Result<JobStatus> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                Ok(statuses.remove(0))
            } else {
                Ok(statuses[0].clone())
            }
        }
    }

    fn output(text: &str) -> JobOutput {
        JobOutput {
            text: text.to_string(),
            confidence: 0.8,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completed_job_returns_output() {
        let driver = ScriptedJob::new(vec![
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed(output("done")),
        ]);
        let poller = JobPoller::new(Duration::from_secs(3), Duration::from_secs(120));

        let result = poller
            .await_completion(&driver, &JobHandle("job-1".into()))
            .await
            .unwrap();

        assert_eq!(result.text, "done");
        assert_eq!(driver.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_error_fails_immediately() {
        let driver = ScriptedJob::new(vec![JobStatus::Error("decoder exploded".into())]);
        let poller = JobPoller::new(Duration::from_secs(3), Duration::from_secs(120));

        let err = poller
            .await_completion(&driver, &JobHandle("job-2".into()))
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Provider(diag) if diag.contains("decoder exploded")));
        assert_eq!(driver.poll_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn never_terminal_times_out() {
        let driver = ScriptedJob::new(vec![JobStatus::Processing]);
        let poller = JobPoller::new(Duration::from_secs(3), Duration::from_secs(10));

        let err = poller
            .await_completion(&driver, &JobHandle("job-3".into()))
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Timeout(t) if t == Duration::from_secs(10)));
        // 10 s deadline at 3 s intervals allows at most four polls.
        assert!(driver.poll_count() <= 4, "polled faster than the interval");
    }
}
