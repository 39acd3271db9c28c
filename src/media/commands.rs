use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::error::{Result, ClipForgeError};

/// Abstract ffmpeg command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Disable video streams
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Execute the command, failing with captured stderr on non-zero exit
    pub async fn execute(&self) -> Result<()> {
        debug!("Executing media command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args);

        let output = cmd
            .output()
            .map_err(|e| ClipForgeError::Media(format!("Failed to execute media processor: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipForgeError::Media(format!(
                "{} failed: {}",
                self.description, stderr
            )));
        }

        Ok(())
    }
}

/// Builder for the ffmpeg operations the pipeline needs
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build an MP3 transcode command with fixed quality settings
    pub fn convert_to_mp3<P: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: P,
        bitrate: &str,
        sample_rate: u32,
        channels: u32,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "MP3 conversion")
            .overwrite()
            .input(input_path)
            .no_video()
            .audio_codec("libmp3lame")
            .audio_bitrate(bitrate)
            .audio_sample_rate(sample_rate)
            .audio_channels(channels)
            .output(output_path)
    }

    /// Build version check command used by the availability probe
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_convert_to_mp3_args() {
        let builder = MediaCommandBuilder::new("ffmpeg");
        let cmd = builder.convert_to_mp3(
            &PathBuf::from("in.wav"),
            &PathBuf::from("out.mp3"),
            "64k",
            16000,
            1,
        );

        assert_eq!(
            cmd.args,
            vec![
                "-y", "-i", "in.wav", "-vn", "-c:a", "libmp3lame", "-b:a", "64k", "-ar", "16000",
                "-ac", "1", "out.mp3"
            ]
        );
    }

    #[test]
    fn test_version_check_args() {
        let builder = MediaCommandBuilder::new("ffmpeg");
        let cmd = builder.version_check();
        assert_eq!(cmd.args, vec!["-version"]);
    }
}
