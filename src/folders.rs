use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, ClipForgeError};
use crate::session::{AudioFile, AudioProcessingStatus};

/// Physical folder name for each per-file processing status. The directory
/// tree is `root/{status}/{sessionName}/{file}`; both post-upload statuses
/// live in `processed_mp3`.
pub fn status_folder_name(status: AudioProcessingStatus) -> &'static str {
    match status {
        AudioProcessingStatus::Pending => "pending",
        AudioProcessingStatus::PendingMp3 => "pending_mp3",
        AudioProcessingStatus::Failed => "failed",
        AudioProcessingStatus::FailedMp3 => "failed_mp3",
        AudioProcessingStatus::UploadedToGladia => "processed_mp3",
        AudioProcessingStatus::TranscriptionComplete => "processed_mp3",
    }
}

/// Maps per-file status to a physical directory and performs safe moves.
/// All path construction for the status tree goes through this type.
pub struct StatusOrganizer {
    root: PathBuf,
}

impl StatusOrganizer {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Target directory for a status within a session, created on demand.
    pub fn status_dir(&self, status: AudioProcessingStatus, session_name: &str) -> PathBuf {
        self.root
            .join(status_folder_name(status))
            .join(session_name)
    }

    /// Move a file into the folder for `status`, updating the file's path and
    /// status on success.
    ///
    /// Hard invariant: MP3-stage folders only accept `.mp3` files and
    /// WAV-stage folders never accept them. Violations fail before anything
    /// moves so conversion and transcription stages cannot cross-contaminate.
    pub fn move_to_status(
        &self,
        file: &mut AudioFile,
        session_name: &str,
        status: AudioProcessingStatus,
    ) -> Result<PathBuf> {
        self.check_stage_invariant(file, status)?;

        let target_dir = self.status_dir(status, session_name);
        std::fs::create_dir_all(&target_dir)?;

        let direct = target_dir.join(&file.file_name);
        if file.path == direct {
            debug!("{} already at {}", file.file_name, direct.display());
            file.status = status;
            return Ok(direct);
        }

        let target = self.collision_free_path(&target_dir, &file.file_name);
        let source_dir = file.path.parent().map(|p| p.to_path_buf());
        std::fs::rename(&file.path, &target)?;
        info!(
            "Moved {} -> {}",
            file.path.display(),
            target.display()
        );

        file.path = target.clone();
        file.file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.file_name.clone());
        file.status = status;

        if let Some(dir) = source_dir {
            self.prune_empty_dirs(&dir);
        }

        Ok(target)
    }

    fn check_stage_invariant(
        &self,
        file: &AudioFile,
        status: AudioProcessingStatus,
    ) -> Result<()> {
        let ext = file.extension();
        let is_mp3_file = ext == "mp3";
        if status.is_mp3_stage() && !is_mp3_file {
            return Err(ClipForgeError::InvalidMove(format!(
                "Cannot move non-MP3 file {} into MP3-only status folder {}",
                file.file_name,
                status_folder_name(status)
            )));
        }
        if !status.is_mp3_stage() && is_mp3_file {
            return Err(ClipForgeError::InvalidMove(format!(
                "Cannot move MP3 file {} into WAV-stage status folder {}",
                file.file_name,
                status_folder_name(status)
            )));
        }
        Ok(())
    }

    /// Append an incrementing numeric suffix until the name is free at the
    /// target, unless the occupying path IS the file being moved.
    fn collision_free_path(&self, target_dir: &Path, file_name: &str) -> PathBuf {
        let direct = target_dir.join(file_name);
        if !direct.exists() {
            return direct;
        }

        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);
        let ext = Path::new(file_name).extension().and_then(|e| e.to_str());

        let mut counter = 1;
        loop {
            let candidate_name = match ext {
                Some(ext) => format!("{}_{}.{}", stem, counter, ext),
                None => format!("{}_{}", stem, counter),
            };
            let candidate = target_dir.join(candidate_name);
            if !candidate.exists() {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Remove a now-empty session folder, and its parent status folder only
    /// if that parent itself becomes empty. Never touches anything outside
    /// the organizer root.
    fn prune_empty_dirs(&self, dir: &Path) {
        if !dir.starts_with(&self.root) || dir == self.root {
            return;
        }
        if Self::is_empty_dir(dir) && std::fs::remove_dir(dir).is_ok() {
            debug!("Pruned empty directory {}", dir.display());
            if let Some(parent) = dir.parent() {
                if parent.starts_with(&self.root)
                    && parent != self.root
                    && Self::is_empty_dir(parent)
                    && std::fs::remove_dir(parent).is_ok()
                {
                    debug!("Pruned empty status directory {}", parent.display());
                }
            }
        }
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_file(root: &Path, rel: &str) -> AudioFile {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"audio").unwrap();
        AudioFile::new(path, 5)
    }

    #[test]
    fn test_status_folder_names() {
        assert_eq!(status_folder_name(AudioProcessingStatus::Pending), "pending");
        assert_eq!(status_folder_name(AudioProcessingStatus::PendingMp3), "pending_mp3");
        assert_eq!(status_folder_name(AudioProcessingStatus::Failed), "failed");
        assert_eq!(status_folder_name(AudioProcessingStatus::FailedMp3), "failed_mp3");
        assert_eq!(
            status_folder_name(AudioProcessingStatus::UploadedToGladia),
            "processed_mp3"
        );
    }

    #[test]
    fn test_wav_into_mp3_folder_is_rejected_and_not_moved() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = StatusOrganizer::new(dir.path());
        let mut file = make_file(dir.path(), "pending/s1/MIC1.wav");
        let original_path = file.path.clone();

        let result =
            organizer.move_to_status(&mut file, "s1", AudioProcessingStatus::PendingMp3);
        assert!(matches!(result, Err(ClipForgeError::InvalidMove(_))));
        assert!(original_path.exists());
        assert_eq!(file.path, original_path);
        assert_eq!(file.status, AudioProcessingStatus::Pending);
    }

    #[test]
    fn test_mp3_into_wav_folder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = StatusOrganizer::new(dir.path());
        let mut file = make_file(dir.path(), "pending_mp3/s1/MIC1.mp3");
        file.status = AudioProcessingStatus::PendingMp3;

        let result = organizer.move_to_status(&mut file, "s1", AudioProcessingStatus::Failed);
        assert!(matches!(result, Err(ClipForgeError::InvalidMove(_))));
    }

    #[test]
    fn test_move_updates_path_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = StatusOrganizer::new(dir.path());
        let mut file = make_file(dir.path(), "pending_mp3/s1/MIC1.mp3");
        file.status = AudioProcessingStatus::PendingMp3;

        let target = organizer
            .move_to_status(&mut file, "s1", AudioProcessingStatus::UploadedToGladia)
            .unwrap();
        assert_eq!(target, dir.path().join("processed_mp3/s1/MIC1.mp3"));
        assert!(target.exists());
        assert_eq!(file.status, AudioProcessingStatus::UploadedToGladia);
    }

    #[test]
    fn test_collision_gets_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = StatusOrganizer::new(dir.path());

        let occupied = dir.path().join("processed_mp3/s1/MIC1.mp3");
        std::fs::create_dir_all(occupied.parent().unwrap()).unwrap();
        std::fs::write(&occupied, b"previous").unwrap();

        let mut file = make_file(dir.path(), "pending_mp3/s1/MIC1.mp3");
        file.status = AudioProcessingStatus::PendingMp3;

        let target = organizer
            .move_to_status(&mut file, "s1", AudioProcessingStatus::UploadedToGladia)
            .unwrap();
        assert_eq!(target, dir.path().join("processed_mp3/s1/MIC1_1.mp3"));
        assert_eq!(file.file_name, "MIC1_1.mp3");
        assert!(occupied.exists());
    }

    #[test]
    fn test_empty_source_dirs_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = StatusOrganizer::new(dir.path());
        let mut file = make_file(dir.path(), "pending_mp3/s1/MIC1.mp3");
        file.status = AudioProcessingStatus::PendingMp3;

        organizer
            .move_to_status(&mut file, "s1", AudioProcessingStatus::UploadedToGladia)
            .unwrap();

        assert!(!dir.path().join("pending_mp3/s1").exists());
        assert!(!dir.path().join("pending_mp3").exists());
    }

    #[test]
    fn test_nonempty_status_dir_survives_pruning() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = StatusOrganizer::new(dir.path());
        let mut file = make_file(dir.path(), "pending_mp3/s1/MIC1.mp3");
        file.status = AudioProcessingStatus::PendingMp3;
        make_file(dir.path(), "pending_mp3/s2/MIC1.mp3");

        organizer
            .move_to_status(&mut file, "s1", AudioProcessingStatus::UploadedToGladia)
            .unwrap();

        assert!(!dir.path().join("pending_mp3/s1").exists());
        assert!(dir.path().join("pending_mp3/s2").exists());
        assert!(dir.path().join("pending_mp3").exists());
    }
}
