// Modular media processing architecture
//
// This module provides a clean abstraction over the external transcoding
// tool:
// - Processor: FFmpeg-backed implementation
// - Commands: command builders and abstractions

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Main trait for media processing operations
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Convert an audio file to compressed MP3 with fixed quality settings
    async fn convert_to_mp3(&self, input_path: &Path, output_path: &Path) -> Result<()>;

    /// Check if the transcoding tool is available (process spawn, exit code)
    fn check_availability(&self) -> Result<()>;

    /// Get transcoding tool version information
    async fn get_version_info(&self) -> Result<String>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig) -> Box<dyn MediaProcessorTrait> {
        Box::new(processor::MediaProcessorImpl::new(config))
    }
}
