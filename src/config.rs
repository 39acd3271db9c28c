use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, ClipForgeError};

// Default values for optional analysis configuration
fn default_max_concurrent_analyses() -> usize {
    3
}

fn default_max_concurrent_sessions() -> usize {
    2
}

fn default_discussion_questions() -> Vec<String> {
    Vec::new()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub transcription: TranscriptionConfig,
    pub analysis: AnalysisConfig,
    pub media: MediaConfig,
    pub clips: ClipConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Transcription service base URL
    pub endpoint: String,
    /// API key for the transcription service
    pub api_key: String,
    /// Maximum retries for transient upload/submit failures
    pub max_retries: u32,
    /// Base delay in seconds for exponential backoff
    pub retry_base_delay_secs: u64,
    /// Poll interval while waiting for a transcription job
    pub poll_interval_secs: u64,
    /// Hard ceiling on total poll time before declaring a timeout
    pub poll_timeout_secs: u64,
    /// Files above this size in the uncompressed format must be converted
    /// to MP3 before upload
    pub max_upload_bytes: u64,
    /// Expected number of speakers hint passed to diarization
    pub expected_speakers: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// LLM service base URL (chat/completions style)
    pub endpoint: String,
    /// API key for the LLM service
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// Maximum retries for transient failures (rate limits retry separately)
    pub max_retries: u32,
    /// Base delay in seconds for exponential backoff
    pub retry_base_delay_secs: u64,
    /// Character budget for the aggregated transcript document
    pub transcript_char_budget: usize,
    /// Bounded concurrency for cross-session analysis batches
    #[serde(default = "default_max_concurrent_analyses")]
    pub max_concurrent_analyses: usize,
    /// Discussion questions embedded into the analysis prompt
    #[serde(default = "default_discussion_questions")]
    pub discussion_questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Target MP3 bitrate, e.g. "64k"
    pub mp3_bitrate: String,
    /// Target sample rate for conversion
    pub mp3_sample_rate: u32,
    /// Target channel count for conversion
    pub mp3_channels: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipConfig {
    /// Directory clips are written under; URLs are relative to it
    pub output_dir: String,
    /// Seconds of context added before a category-winner timestamp
    pub winner_padding_before_secs: u32,
    /// Seconds of context added after a category-winner timestamp
    pub winner_padding_after_secs: u32,
    /// Default clip length for top-five entries without an explicit end
    pub default_duration_secs: u32,
    /// Maximum allowed clip length
    pub max_duration_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory for the status folder tree
    pub root_dir: String,
    /// Directory the file-backed session store persists into
    pub store_dir: String,
    /// Participant roster in microphone order; index = 0-based speaker slot
    #[serde(default)]
    pub participants: Vec<String>,
    /// Bound on session folders processed concurrently during a batch run
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transcription: TranscriptionConfig {
                endpoint: "https://api.gladia.io/v2".to_string(),
                api_key: String::new(),
                max_retries: 3,
                retry_base_delay_secs: 2,
                poll_interval_secs: 10,
                poll_timeout_secs: 30 * 60,
                max_upload_bytes: 100 * 1024 * 1024,
                expected_speakers: 6,
            },
            analysis: AnalysisConfig {
                endpoint: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "gpt-4o".to_string(),
                max_retries: 3,
                retry_base_delay_secs: 2,
                transcript_char_budget: 120_000,
                max_concurrent_analyses: 3,
                discussion_questions: Vec::new(),
            },
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                mp3_bitrate: "64k".to_string(),
                mp3_sample_rate: 16000,
                mp3_channels: 1,
            },
            clips: ClipConfig {
                output_dir: "clips".to_string(),
                winner_padding_before_secs: 3,
                winner_padding_after_secs: 12,
                default_duration_secs: 30,
                max_duration_secs: 300,
            },
            pipeline: PipelineConfig {
                root_dir: "sessions".to_string(),
                store_dir: ".clipforge/store".to_string(),
                participants: Vec::new(),
                max_concurrent_sessions: 2,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClipForgeError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ClipForgeError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClipForgeError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ClipForgeError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
