use async_trait::async_trait;
use std::path::Path;
use std::process::Command;
use tracing::{info, debug};

use crate::config::MediaConfig;
use crate::error::{Result, ClipForgeError};
use super::{MediaProcessorTrait, MediaCommandBuilder};

/// Concrete implementation of media processor (FFmpeg-based)
pub struct MediaProcessorImpl {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl MediaProcessorImpl {
    /// Create a new media processor implementation
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    /// Convert audio to MP3 using the configured bitrate/sample-rate/channels
    async fn convert_to_mp3(&self, input_path: &Path, output_path: &Path) -> Result<()> {
        info!(
            "Converting {} -> {}",
            input_path.display(),
            output_path.display()
        );

        let command = self.command_builder.convert_to_mp3(
            input_path,
            output_path,
            &self.config.mp3_bitrate,
            self.config.mp3_sample_rate,
            self.config.mp3_channels,
        );

        command.execute().await?;

        info!("MP3 conversion completed successfully");
        Ok(())
    }

    /// Check if the transcoding tool is available
    fn check_availability(&self) -> Result<()> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .map_err(|e| ClipForgeError::Media(format!("Transcoding tool not found: {}", e)))?;

        if output.status.success() {
            info!("Transcoding tool is available");
            Ok(())
        } else {
            Err(ClipForgeError::Media(
                "Transcoding tool version check failed".to_string(),
            ))
        }
    }

    /// Get transcoding tool version information
    async fn get_version_info(&self) -> Result<String> {
        debug!("Getting transcoding tool version information");

        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .map_err(|e| ClipForgeError::Media(format!("Failed to execute transcoding tool: {}", e)))?;

        if output.status.success() {
            let version_info = String::from_utf8_lossy(&output.stdout);
            // First line typically carries the version
            let first_line = version_info.lines().next().unwrap_or("Unknown version");
            Ok(first_line.to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ClipForgeError::Media(format!(
                "Transcoding tool version check failed: {}",
                stderr
            )))
        }
    }
}
