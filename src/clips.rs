use hound::{SampleFormat, WavReader, WavWriter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::config::ClipConfig;
use crate::error::{Result, ClipForgeError};
use crate::session::{AudioFile, Session};

/// A clip tied to the category (and rank) it illustrates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledClip {
    /// Category key, e.g. `best_joke` or `funniest_sentences_2`
    pub label: String,
    pub clip: Clip,
}

/// One extracted clip and its statically-servable relative URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub path: PathBuf,
    pub url: String,
    pub start_secs: f64,
    pub duration_secs: f64,
}

/// Cuts short standalone WAV clips out of the master recording.
pub struct ClipExtractor {
    config: ClipConfig,
}

impl ClipExtractor {
    pub fn new(config: ClipConfig) -> Self {
        Self { config }
    }

    /// Clip timestamps are only meaningful against the master timeline;
    /// individual mic files are not clip-compatible.
    pub fn clip_source<'a>(&self, session: &'a Session) -> Result<&'a AudioFile> {
        let master = session.master_file().ok_or_else(|| {
            ClipForgeError::Clip(format!(
                "Session '{}' has no master recording to clip from",
                session.title
            ))
        })?;
        if master.extension() != "wav" {
            return Err(ClipForgeError::Clip(format!(
                "Clip extraction requires the WAV master, found {}",
                master.file_name
            )));
        }
        Ok(master)
    }

    /// Clip a category winner with asymmetric padding: a little lead-in for
    /// the setup, more tail for the group reaction.
    pub fn extract_winner_clip(
        &self,
        source: &Path,
        session_id: &str,
        timestamp_secs: f64,
    ) -> Result<Clip> {
        let start = timestamp_secs - self.config.winner_padding_before_secs as f64;
        let end = timestamp_secs + self.config.winner_padding_after_secs as f64;
        self.extract_clip(source, session_id, start, end)
    }

    /// Clip a ranked-list entry; without an explicit end the default
    /// duration applies.
    pub fn extract_entry_clip(
        &self,
        source: &Path,
        session_id: &str,
        timestamp_secs: f64,
        end_secs: Option<f64>,
    ) -> Result<Clip> {
        let end = end_secs.unwrap_or(timestamp_secs + self.config.default_duration_secs as f64);
        self.extract_clip(source, session_id, timestamp_secs, end)
    }

    /// Extract `[start, end)` seconds of the source into a new WAV file,
    /// copying whole seconds at a time. The requested duration must be
    /// positive and within the ceiling; bounds are clamped to the source
    /// length so the read never runs past the file.
    pub fn extract_clip(
        &self,
        source: &Path,
        session_id: &str,
        start_secs: f64,
        end_secs: f64,
    ) -> Result<Clip> {
        let requested = end_secs - start_secs;
        if requested <= 0.0 {
            return Err(ClipForgeError::Clip(format!(
                "Requested clip duration must be positive, got {:.1}s",
                requested
            )));
        }
        if requested > self.config.max_duration_secs as f64 {
            return Err(ClipForgeError::Clip(format!(
                "Requested clip duration {:.1}s exceeds the {}s ceiling",
                requested, self.config.max_duration_secs
            )));
        }

        let mut reader = WavReader::open(source)?;
        let spec = reader.spec();
        let total_frames = reader.duration() as u64;
        let file_len_secs = total_frames as f64 / spec.sample_rate as f64;

        let start = start_secs.max(0.0).min(file_len_secs);
        let end = end_secs.max(0.0).min(file_len_secs);
        if end - start <= 0.0 {
            return Err(ClipForgeError::Clip(format!(
                "Clip window [{:.1}, {:.1}) falls outside the {:.1}s source",
                start_secs, end_secs, file_len_secs
            )));
        }

        let start_frame = (start * spec.sample_rate as f64) as u32;
        let whole_seconds = (end - start).ceil() as u64;
        let frames_to_copy =
            (whole_seconds * spec.sample_rate as u64).min(total_frames - start_frame as u64);

        reader.seek(start_frame)?;

        let clip_id = Uuid::new_v4().to_string();
        let clip_dir = Path::new(&self.config.output_dir).join(session_id);
        std::fs::create_dir_all(&clip_dir)?;
        let clip_path = clip_dir.join(format!("{}.wav", clip_id));

        let mut writer = WavWriter::create(&clip_path, spec)?;
        let samples_to_copy = frames_to_copy * spec.channels as u64;
        match spec.sample_format {
            SampleFormat::Int => {
                for sample in reader.samples::<i32>().take(samples_to_copy as usize) {
                    writer.write_sample(sample?)?;
                }
            }
            SampleFormat::Float => {
                for sample in reader.samples::<f32>().take(samples_to_copy as usize) {
                    writer.write_sample(sample?)?;
                }
            }
        }
        writer.finalize()?;

        let duration = frames_to_copy as f64 / spec.sample_rate as f64;
        let url = format!("/clips/{}/{}.wav", session_id, clip_id);
        info!(
            "Extracted {:.1}s clip from {} -> {}",
            duration,
            source.display(),
            url
        );

        Ok(Clip {
            id: clip_id,
            path: clip_path,
            url,
            start_secs: start,
            duration_secs: duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavSpec;

    fn test_config(dir: &Path) -> ClipConfig {
        ClipConfig {
            output_dir: dir.to_string_lossy().to_string(),
            winner_padding_before_secs: 3,
            winner_padding_after_secs: 12,
            default_duration_secs: 30,
            max_duration_secs: 300,
        }
    }

    /// Write `seconds` of mono 8 kHz audio.
    fn write_source(path: &Path, seconds: u32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..(seconds * 8000) {
            writer.write_sample((i % 128) as i16 as i32).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn clip_duration_secs(path: &Path) -> f64 {
        let reader = WavReader::open(path).unwrap();
        reader.duration() as f64 / reader.spec().sample_rate as f64
    }

    #[test]
    fn test_basic_extraction_and_url() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("MASTER_MIX.wav");
        write_source(&source, 30);
        let extractor = ClipExtractor::new(test_config(dir.path()));

        let clip = extractor.extract_clip(&source, "s1", 5.0, 10.0).unwrap();
        assert!(clip.path.exists());
        assert!(clip.url.starts_with("/clips/s1/"));
        assert!(clip.url.ends_with(".wav"));
        assert_eq!(clip_duration_secs(&clip.path), 5.0);
    }

    #[test]
    fn test_nonpositive_duration_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("MASTER_MIX.wav");
        write_source(&source, 10);
        let extractor = ClipExtractor::new(test_config(dir.path()));

        assert!(extractor.extract_clip(&source, "s1", 5.0, 5.0).is_err());
        assert!(extractor.extract_clip(&source, "s1", 5.0, 4.0).is_err());
    }

    #[test]
    fn test_duration_over_ceiling_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("MASTER_MIX.wav");
        write_source(&source, 10);
        let extractor = ClipExtractor::new(test_config(dir.path()));

        let result = extractor.extract_clip(&source, "s1", 0.0, 301.0);
        assert!(matches!(result, Err(ClipForgeError::Clip(_))));
    }

    #[test]
    fn test_bounds_clamped_to_source_length() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("MASTER_MIX.wav");
        write_source(&source, 10);
        let extractor = ClipExtractor::new(test_config(dir.path()));

        // End past the file: clip stops at the source end
        let clip = extractor.extract_clip(&source, "s1", 7.0, 20.0).unwrap();
        assert!(clip.duration_secs <= 3.0 + f64::EPSILON);
        assert!(clip_duration_secs(&clip.path) <= 3.0);

        // Window entirely past the file
        assert!(extractor.extract_clip(&source, "s1", 11.0, 12.0).is_err());
    }

    #[test]
    fn test_negative_start_clamped_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("MASTER_MIX.wav");
        write_source(&source, 10);
        let extractor = ClipExtractor::new(test_config(dir.path()));

        let clip = extractor.extract_winner_clip(&source, "s1", 1.0).unwrap();
        assert_eq!(clip.start_secs, 0.0);
    }

    #[test]
    fn test_entry_clip_uses_default_duration() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("MASTER_MIX.wav");
        write_source(&source, 60);
        let extractor = ClipExtractor::new(test_config(dir.path()));

        let clip = extractor
            .extract_entry_clip(&source, "s1", 10.0, None)
            .unwrap();
        assert_eq!(clip.duration_secs, 30.0);
    }

    #[test]
    fn test_clip_source_requires_wav_master() {
        use crate::session::Session;
        use chrono::Utc;

        let dir = tempfile::tempdir().unwrap();
        let extractor = ClipExtractor::new(test_config(dir.path()));
        let mut session = Session::new(
            "s1".to_string(),
            "Heat".to_string(),
            dir.path().to_path_buf(),
            Utc::now(),
        );
        assert!(extractor.clip_source(&session).is_err());

        let mut master = AudioFile::new(dir.path().join("MASTER_MIX.mp3"), 1);
        master.is_master = true;
        session.audio_files.push(master);
        assert!(extractor.clip_source(&session).is_err());

        session.audio_files[0].path = dir.path().join("MASTER_MIX.wav");
        assert!(extractor.clip_source(&session).is_ok());
    }
}
