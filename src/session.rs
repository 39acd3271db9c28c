use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::analyze::AnalysisResults;
use crate::clips::LabeledClip;
use crate::stats::SessionStats;

/// Overall session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Pending,
    Validating,
    Transcribing,
    Analyzing,
    Complete,
    Failed,
}

/// Per-file processing status. Mirrors the physical status-folder layout:
/// `Pending`/`Failed` are the uncompressed (WAV) stage, the rest belong to
/// the MP3 stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioProcessingStatus {
    Pending,
    PendingMp3,
    Failed,
    FailedMp3,
    UploadedToGladia,
    TranscriptionComplete,
}

impl AudioProcessingStatus {
    /// Statuses whose physical folder only ever holds MP3 artifacts.
    pub fn is_mp3_stage(&self) -> bool {
        matches!(
            self,
            AudioProcessingStatus::PendingMp3
                | AudioProcessingStatus::FailedMp3
                | AudioProcessingStatus::UploadedToGladia
                | AudioProcessingStatus::TranscriptionComplete
        )
    }
}

/// Auxiliary (non-participant) recording roles recognized by exact filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuxRole {
    Phone,
    SoundPad,
}

impl AuxRole {
    pub fn label(&self) -> &'static str {
        match self {
            AuxRole::Phone => "Phone",
            AuxRole::SoundPad => "Sound Pad",
        }
    }
}

/// One recording within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFile {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_secs: Option<f64>,
    /// 0-based microphone slot; stable for the session's lifetime once set
    pub speaker_slot: Option<u32>,
    pub is_master: bool,
    pub aux_role: Option<AuxRole>,
    pub status: AudioProcessingStatus,
    pub transcript: Option<String>,
    /// External transcription job id
    pub transcript_id: Option<String>,
    /// Sidecar path of the saved raw structured transcription
    pub raw_transcription_path: Option<PathBuf>,
    /// Converted MP3 artifact, when conversion happened
    pub mp3_path: Option<PathBuf>,
    pub conversion_error: Option<String>,
    pub retry_eligible: bool,
}

impl AudioFile {
    pub fn new(path: PathBuf, size_bytes: u64) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            file_name,
            path,
            size_bytes,
            duration_secs: None,
            speaker_slot: None,
            is_master: false,
            aux_role: None,
            status: AudioProcessingStatus::Pending,
            transcript: None,
            transcript_id: None,
            raw_transcription_path: None,
            mp3_path: None,
            conversion_error: None,
            retry_eligible: true,
        }
    }

    /// The file classifier considers a file identified once it has a speaker
    /// slot, an auxiliary role, or the master flag.
    pub fn is_identified(&self) -> bool {
        self.speaker_slot.is_some() || self.aux_role.is_some() || self.is_master
    }

    pub fn has_transcript(&self) -> bool {
        self.status == AudioProcessingStatus::TranscriptionComplete
            && self
                .transcript
                .as_ref()
                .map(|t| !t.trim().is_empty())
                .unwrap_or(false)
    }

    /// Extension in lowercase, empty string when absent.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default()
    }
}

/// One discussion event: the unit of pipeline processing and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub folder_path: PathBuf,
    pub status: SessionStatus,
    pub audio_files: Vec<AudioFile>,
    /// Microphone slot (0-based) to participant name
    pub mic_assignments: BTreeMap<u32, String>,
    pub participants_present: Vec<String>,
    pub participants_absent: Vec<String>,
    pub analysis: Option<AnalysisResults>,
    pub stats: Option<SessionStats>,
    pub clips: Vec<LabeledClip>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: String, title: String, folder_path: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title,
            folder_path,
            status: SessionStatus::Pending,
            audio_files: Vec::new(),
            mic_assignments: BTreeMap::new(),
            participants_present: Vec::new(),
            participants_absent: Vec::new(),
            analysis: None,
            stats: None,
            clips: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Participant name for a 0-based speaker slot.
    pub fn participant_for_slot(&self, slot: u32) -> Option<&str> {
        self.mic_assignments.get(&slot).map(|s| s.as_str())
    }

    /// Derive present participants from mic assignments that actually have a
    /// recording; everyone else in the roster is absent.
    pub fn derive_participants(&mut self) {
        let mut present = Vec::new();
        let mut absent = Vec::new();
        for (slot, name) in &self.mic_assignments {
            let has_file = self
                .audio_files
                .iter()
                .any(|f| f.speaker_slot == Some(*slot));
            if has_file {
                present.push(name.clone());
            } else {
                absent.push(name.clone());
            }
        }
        self.participants_present = present;
        self.participants_absent = absent;
    }

    pub fn master_file(&self) -> Option<&AudioFile> {
        self.audio_files.iter().find(|f| f.is_master)
    }

    /// Completion invariant: at least one file finished transcription with a
    /// non-empty transcript AND analysis results exist.
    pub fn meets_completion_invariant(&self) -> bool {
        let any_transcript = self.audio_files.iter().any(|f| f.has_transcript());
        any_transcript && self.analysis.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::AnalysisResults;

    fn session_with_file(status: AudioProcessingStatus, transcript: Option<&str>) -> Session {
        let mut session = Session::new(
            "s1".to_string(),
            "Inception".to_string(),
            PathBuf::from("/tmp/s1"),
            Utc::now(),
        );
        let mut file = AudioFile::new(PathBuf::from("/tmp/s1/MIC1.wav"), 1024);
        file.status = status;
        file.transcript = transcript.map(|t| t.to_string());
        session.audio_files.push(file);
        session
    }

    #[test]
    fn test_complete_requires_transcript_and_analysis() {
        let mut session = session_with_file(
            AudioProcessingStatus::TranscriptionComplete,
            Some("Alice: great movie"),
        );
        assert!(!session.meets_completion_invariant());

        session.analysis = Some(AnalysisResults::degraded_placeholder("no categories parsed"));
        assert!(session.meets_completion_invariant());
    }

    #[test]
    fn test_empty_transcript_never_completes() {
        let mut session = session_with_file(AudioProcessingStatus::TranscriptionComplete, Some("   "));
        session.analysis = Some(AnalysisResults::degraded_placeholder("placeholder"));
        assert!(!session.meets_completion_invariant());
    }

    #[test]
    fn test_analysis_without_transcript_never_completes() {
        let mut session = session_with_file(AudioProcessingStatus::Pending, None);
        session.analysis = Some(AnalysisResults::degraded_placeholder("placeholder"));
        assert!(!session.meets_completion_invariant());
    }

    #[test]
    fn test_derive_participants_splits_present_and_absent() {
        let mut session = session_with_file(AudioProcessingStatus::Pending, None);
        session.audio_files[0].speaker_slot = Some(0);
        session.mic_assignments.insert(0, "Alice".to_string());
        session.mic_assignments.insert(1, "Bob".to_string());
        session.derive_participants();
        assert_eq!(session.participants_present, vec!["Alice".to_string()]);
        assert_eq!(session.participants_absent, vec!["Bob".to_string()]);
    }

    #[test]
    fn test_mp3_stage_statuses() {
        assert!(!AudioProcessingStatus::Pending.is_mp3_stage());
        assert!(!AudioProcessingStatus::Failed.is_mp3_stage());
        assert!(AudioProcessingStatus::PendingMp3.is_mp3_stage());
        assert!(AudioProcessingStatus::FailedMp3.is_mp3_stage());
        assert!(AudioProcessingStatus::UploadedToGladia.is_mp3_stage());
        assert!(AudioProcessingStatus::TranscriptionComplete.is_mp3_stage());
    }
}
