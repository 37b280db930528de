//! HTTP transcription provider binding.
//!
//! Talks to a speech service that exposes both paths the dispatcher needs:
//! a synchronous multipart `/transcribe` endpoint for short clips and an
//! asynchronous `/transcript` job API (submit with a blob URI, then poll by
//! job id) for long ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Segment, TranscriptionProvider};
use crate::config::ProviderEndpointConfig;
use crate::job::{JobHandle, JobOutput, JobStatus};
use crate::storage::blob::BlobRef;

/// Inline endpoint response.
#[derive(Debug, Deserialize)]
struct InlineResponse {
    segments: Vec<SegmentResponse>,
}

#[derive(Debug, Deserialize)]
struct SegmentResponse {
    text: String,
    confidence: f32,
}

/// Request body for the job-submission endpoint.
#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    audio_url: &'a str,
    language_code: &'a str,
}

/// Response from the job endpoints (both submit and poll).
#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    status: String,
    text: Option<String>,
    confidence: Option<f32>,
    error: Option<String>,
}

/// Reqwest-backed [`TranscriptionProvider`].
pub struct HttpTranscriptionProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTranscriptionProvider {
    /// Builds a provider with connection pooling and request timeouts.
    ///
    /// # Errors
    /// - If the HTTP client cannot be constructed
    pub fn new(config: &ProviderEndpointConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn network_error(context: &str, e: reqwest::Error) -> anyhow::Error {
        if e.is_connect() {
            anyhow::anyhow!("Failed to connect to the transcription service ({context})")
        } else if e.is_timeout() {
            anyhow::anyhow!("Transcription service did not respond ({context})")
        } else {
            anyhow::anyhow!("Transcription service network error ({context}): {e}")
        }
    }

    async fn check_status(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(anyhow::anyhow!(format_error(status.as_u16(), &error_body)))
    }
}

#[async_trait]
impl TranscriptionProvider for HttpTranscriptionProvider {
    fn id(&self) -> &str {
        "http"
    }

    async fn transcribe_inline(
        &self,
        audio: &[u8],
        language: &str,
    ) -> anyhow::Result<Vec<Segment>> {
        let file_part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| anyhow::anyhow!("Failed to create file part for upload: {e}"))?;

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("language", language.to_string());

        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::network_error("inline transcribe", e))?;

        let inline: InlineResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse inline response: {e}"))?;

        Ok(inline
            .segments
            .into_iter()
            .map(|s| Segment {
                text: s.text,
                confidence: s.confidence,
            })
            .collect())
    }

    async fn submit_long_job(
        &self,
        blob: &BlobRef,
        language: &str,
    ) -> anyhow::Result<JobHandle> {
        let request = SubmitRequest {
            audio_url: blob.uri(),
            language_code: language,
        };

        let response = self
            .client
            .post(format!("{}/transcript", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::network_error("job submit", e))?;

        let job: JobResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse submit response: {e}"))?;

        tracing::debug!(job = %job.id, "Transcription job submitted");
        Ok(JobHandle(job.id))
    }

    async fn poll(&self, handle: &JobHandle) -> anyhow::Result<JobStatus> {
        let response = self
            .client
            .get(format!("{}/transcript/{}", self.base_url, handle.0))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Self::network_error("job poll", e))?;

        let job: JobResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse poll response: {e}"))?;

        let status = match job.status.as_str() {
            "completed" => {
                let text = job.text.ok_or_else(|| {
                    anyhow::anyhow!("Job reported completed without transcript text")
                })?;
                JobStatus::Completed(JobOutput {
                    text: text.trim().to_string(),
                    confidence: job.confidence.unwrap_or(1.0),
                })
            }
            "error" => JobStatus::Error(
                job.error
                    .unwrap_or_else(|| "Unknown transcription error".to_string()),
            ),
            "processing" => JobStatus::Processing,
            // Anything else ("queued", provider-specific states) is still pending.
            _ => JobStatus::Pending,
        };

        Ok(status)
    }
}

/// Formats HTTP error codes into human-readable messages.
fn format_error(status: u16, error_body: &str) -> String {
    match status {
        401 => "Transcription service API key is invalid or expired".to_string(),
        403 => "Not permitted to use the transcription service; check the API key".to_string(),
        429 => "Transcription service rate limit hit; wait and retry".to_string(),
        500 | 502 | 503 | 504 => {
            "Transcription service is experiencing issues; try again later".to_string()
        }
        _ => format!("Transcription service error (status {status}): {error_body}"),
    }
}
