use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::config::TranscriptionConfig;
use crate::error::{Result, ClipForgeError};
use super::{TranscriberTrait, TranscriptionResult};

/// Response from the multipart upload endpoint.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    audio_url: String,
}

/// Response from job submission.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

/// Client for the Gladia-style transcription service.
pub struct GladiaClient {
    pub(super) client: reqwest::Client,
    pub(super) config: TranscriptionConfig,
}

impl GladiaClient {
    pub fn new(config: TranscriptionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// Backoff delay for a 1-based attempt number: base doubling each retry.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.config.retry_base_delay_secs << (attempt - 1))
    }

    /// Run `op` with up to `max_retries` attempts, backing off exponentially
    /// on transient failures only. 4xx/5xx business responses are not
    /// retried.
    async fn retry_transient<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        "{} attempt {} failed ({}), retrying in {:?}",
                        what, attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn upload_once(&self, path: &Path) -> Result<String> {
        let metadata = tokio::fs::metadata(path).await?;
        let file = tokio::fs::File::open(path).await?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio")
            .to_string();

        let mime_type = match path.extension().and_then(|e| e.to_str()) {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("flac") => "audio/flac",
            Some("ogg") => "audio/ogg",
            Some("aac") => "audio/aac",
            _ => "application/octet-stream",
        };

        // Stream the file rather than loading it into memory; recordings
        // routinely run into hundreds of megabytes.
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, metadata.len())
            .file_name(filename)
            .mime_str(mime_type)
            .map_err(|e| ClipForgeError::Transcription(format!("Invalid mime type: {}", e)))?;
        let form = Form::new().part("audio", part);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .header("x-gladia-key", &self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClipForgeError::Transcription(format!(
                "Upload failed with {}: {}",
                status, body
            )));
        }

        let upload: UploadResponse = response.json().await?;
        Ok(upload.audio_url)
    }

    async fn submit_once(&self, audio_url: &str) -> Result<String> {
        let request_body = serde_json::json!({
            "audio_url": audio_url,
            "diarization": true,
            "diarization_config": {
                "number_of_speakers": self.config.expected_speakers,
                "min_speakers": 1,
                "max_speakers": 10
            },
            "summarization": true,
            "sentiment_analysis": true,
            "chapterization": true,
            "detect_language": true
        });

        let response = self
            .client
            .post(self.endpoint("pre-recorded"))
            .header("x-gladia-key", &self.config.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClipForgeError::Transcription(format!(
                "Job submission failed with {}: {}",
                status, body
            )));
        }

        let submit: SubmitResponse = response.json().await?;
        debug!("Transcription job submitted: {}", submit.id);
        Ok(submit.id)
    }
}

#[async_trait]
impl TranscriberTrait for GladiaClient {
    async fn upload_file(&self, path: &Path) -> Result<String> {
        info!("Uploading {} for transcription", path.display());
        self.retry_transient("Upload", || self.upload_once(path))
            .await
    }

    async fn submit_job(&self, audio_url: &str) -> Result<String> {
        self.retry_transient("Job submission", || self.submit_once(audio_url))
            .await
    }

    async fn poll_transcription(&self, job_id: &str) -> Result<TranscriptionResult> {
        super::poller::poll_until_complete(self, job_id).await
    }
}
