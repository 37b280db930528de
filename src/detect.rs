//! Language identification capability.
//!
//! The dispatcher runs detection over the normalized audio and feeds the
//! resulting language code to the transcription provider. Detection output
//! is never independently cached; it rides along with the transcription
//! result. The concrete binding posts the clip to the detection model
//! service as multipart form data.

use async_trait::async_trait;
use std::path::Path;

use serde::Deserialize;

/// Identifies the spoken language of a clip in the normalizer's canonical
/// output format.
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    /// Returns a language code (e.g. "hindi", "tamil") for the audio file.
    async fn detect(&self, audio_path: &Path) -> anyhow::Result<String>;
}

/// Response from the detection service.
#[derive(Debug, Deserialize)]
struct DetectResponse {
    predicted_language: String,
}

/// HTTP binding to the language-detection model service.
pub struct HttpLanguageDetector {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLanguageDetector {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl LanguageDetector for HttpLanguageDetector {
    async fn detect(&self, audio_path: &Path) -> anyhow::Result<String> {
        let audio_data = tokio::fs::read(audio_path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read audio file: {e}"))?;

        let file_name = audio_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let file_part = reqwest::multipart::Part::bytes(audio_data)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| anyhow::anyhow!("Failed to create file part for upload: {e}"))?;

        let form = reqwest::multipart::Form::new().part("file", file_part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    anyhow::anyhow!("Failed to connect to the language detection service")
                } else if e.is_timeout() {
                    anyhow::anyhow!("Language detection request timed out")
                } else {
                    anyhow::anyhow!("Language detection network error: {e}")
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Language detection error (status {status}): {error_body}"
            ));
        }

        let detected: DetectResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse detection response: {e}"))?;

        tracing::debug!(language = %detected.predicted_language, "Language identified");
        Ok(detected.predicted_language)
    }
}
