// Modular transcription architecture
//
// This module talks to the external speech-transcription service:
// - client: streaming multipart upload and job submission with retry
// - poller: completion polling and sidecar persistence
//
// To add a new transcription service:
// 1. Create service-specific data structures for parsing JSON
// 2. Implement TranscriberTrait for your service
// 3. Update the factory to create your implementation

pub mod client;
pub mod poller;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use client::GladiaClient;
pub use poller::{persist_sidecars, read_sidecars};

use crate::config::TranscriptionConfig;
use crate::error::Result;

/// One diarized utterance from the structured transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    /// Generic speaker index assigned by diarization
    pub speaker: Option<u32>,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Completed transcription: plain text plus the structured utterance list
/// and the raw JSON as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub full_transcript: String,
    pub utterances: Vec<Utterance>,
    /// Raw structured result, persisted verbatim as a sidecar
    pub raw: serde_json::Value,
}

/// Main trait for transcription service operations
#[async_trait]
pub trait TranscriberTrait: Send + Sync {
    /// Upload an audio file, returning the service-side audio URL
    async fn upload_file(&self, path: &Path) -> Result<String>;

    /// Submit a transcription job for an uploaded audio URL, returning the
    /// job id
    async fn submit_job(&self, audio_url: &str) -> Result<String>;

    /// Poll a job until completion, error, or the configured timeout
    async fn poll_transcription(&self, job_id: &str) -> Result<TranscriptionResult>;
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    /// Create the default transcriber implementation (Gladia-style service)
    pub fn create_default(config: TranscriptionConfig) -> Box<dyn TranscriberTrait> {
        Box::new(GladiaClient::new(config))
    }
}
