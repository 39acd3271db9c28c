use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::aggregate::aggregate_transcripts;
use crate::analyze::{AnalysisResults, AnalyzerFactory, AnalyzerTrait};
use crate::classify::classify_session;
use crate::clips::{ClipExtractor, LabeledClip};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Result, ClipForgeError};
use crate::folders::StatusOrganizer;
use crate::media::{MediaProcessorFactory, MediaProcessorTrait};
use crate::session::{AudioFile, AudioProcessingStatus, Session, SessionStatus};
use crate::speakers::{map_speaker_labels, strategy_for_file};
use crate::stats::compute_stats;
use crate::storage::{FileSessionStore, SessionStore};
use crate::transcribe::{persist_sidecars, read_sidecars, TranscriberFactory, TranscriberTrait};

/// Directory names under the pipeline root that are never session folders.
const RESERVED_DIRS: &[&str] = &[
    "pending",
    "pending_mp3",
    "failed",
    "failed_mp3",
    "processed_mp3",
];

/// Drives one session through classification, conversion, transcription,
/// analysis, and clip extraction. The session record is persisted after
/// every phase and per-file mutation so an interrupted run can resume from
/// its last recorded state.
pub struct Pipeline {
    config: Config,
    media: Box<dyn MediaProcessorTrait>,
    transcriber: Box<dyn TranscriberTrait>,
    analyzer: Box<dyn AnalyzerTrait>,
    store: Arc<dyn SessionStore>,
    organizer: StatusOrganizer,
    clock: Arc<dyn Clock>,
    /// Bounds concurrent LLM analysis passes across a batch
    analysis_slots: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let media = MediaProcessorFactory::create_processor(config.media.clone());
        let transcriber = TranscriberFactory::create_default(config.transcription.clone());
        let analyzer =
            AnalyzerFactory::create_default(config.analysis.clone(), Arc::clone(&clock));
        let store: Arc<dyn SessionStore> =
            Arc::new(FileSessionStore::new(&config.pipeline.store_dir));
        Self::with_components(config, media, transcriber, analyzer, store, clock)
    }

    pub fn with_components(
        config: Config,
        media: Box<dyn MediaProcessorTrait>,
        transcriber: Box<dyn TranscriberTrait>,
        analyzer: Box<dyn AnalyzerTrait>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let organizer = StatusOrganizer::new(&config.pipeline.root_dir);
        let analysis_slots = Arc::new(Semaphore::new(config.analysis.max_concurrent_analyses));
        Self {
            config,
            media,
            transcriber,
            analyzer,
            store,
            organizer,
            clock,
            analysis_slots,
        }
    }

    /// Process one session folder end to end. An existing record for the
    /// same id is resumed rather than restarted; completed files keep their
    /// state and are not re-uploaded.
    pub async fn process_session(&self, folder: &Path) -> Result<Session> {
        let id = folder
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ClipForgeError::Classify(format!(
                    "Invalid session folder name: {}",
                    folder.display()
                ))
            })?;

        let mut session = match self.store.get_by_id(&id).await? {
            Some(existing) => {
                info!("Resuming session {} from status {:?}", id, existing.status);
                existing
            }
            None => Session::new(id.clone(), id.clone(), folder.to_path_buf(), self.clock.now()),
        };

        if let Err(e) = self.run_phases(&mut session).await {
            error!("Session {} failed: {}", session.id, e);
            session.status = SessionStatus::Failed;
            session.error_message = Some(e.to_string());
            self.persist(&mut session).await?;
            return Err(e);
        }
        Ok(session)
    }

    /// Re-run a previously stored session from its recorded state.
    pub async fn repair_session(&self, id: &str) -> Result<Session> {
        let session = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| ClipForgeError::SessionNotFound(id.to_string()))?;
        info!("Repairing session {} (status {:?})", id, session.status);
        let folder = session.folder_path.clone();
        self.process_session(&folder).await
    }

    /// Process every session folder under the pipeline root. Concurrent
    /// sessions are bounded by `max_concurrent_sessions`; within that bound
    /// the analysis phase is additionally bounded by
    /// `max_concurrent_analyses`.
    pub async fn process_batch(self: &Arc<Self>) -> Result<Vec<Session>> {
        let root = PathBuf::from(&self.config.pipeline.root_dir);
        let folders = discover_session_folders(&root)?;
        info!(
            "Processing {} session folders under {}",
            folders.len(),
            root.display()
        );

        let session_slots = Arc::new(Semaphore::new(
            self.config.pipeline.max_concurrent_sessions.max(1),
        ));
        let mut handles = Vec::new();
        for folder in folders {
            let pipeline = Arc::clone(self);
            let slots = Arc::clone(&session_slots);
            handles.push(tokio::spawn(async move {
                let _permit = slots.acquire_owned().await.map_err(|_| {
                    ClipForgeError::Analysis("batch semaphore closed".to_string())
                })?;
                pipeline.process_session(&folder).await
            }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(session)) => sessions.push(session),
                Ok(Err(e)) => warn!("Session failed: {}", e),
                Err(e) => warn!("Session task panicked: {}", e),
            }
        }
        Ok(sessions)
    }

    async fn run_phases(&self, session: &mut Session) -> Result<()> {
        self.phase_validate(session).await?;
        self.phase_convert(session).await?;
        self.phase_transcribe(session).await?;
        self.phase_analyze(session).await?;
        self.phase_complete(session).await
    }

    /// Classify the folder contents and derive the participant roster.
    async fn phase_validate(&self, session: &mut Session) -> Result<()> {
        session.status = SessionStatus::Validating;

        // A resumed record already carries classified files with moved paths
        if session.audio_files.is_empty() {
            classify_session(session)?;
        }
        for (slot, name) in self.config.pipeline.participants.iter().enumerate() {
            session
                .mic_assignments
                .entry(slot as u32)
                .or_insert_with(|| name.clone());
        }
        session.derive_participants();

        if session.audio_files.is_empty() {
            return Err(ClipForgeError::Classify(format!(
                "No audio files found in {}",
                session.folder_path.display()
            )));
        }

        // WAV-stage files occupy the pending folder. The master stays in the
        // session folder because its timeline is the clip source; MP3
        // sources become their own upload artifact during conversion.
        let session_id = session.id.clone();
        for file in &mut session.audio_files {
            if file.status == AudioProcessingStatus::Pending
                && !file.is_master
                && file.extension() != "mp3"
            {
                self.move_with_sidecars(&session_id, file, AudioProcessingStatus::Pending)?;
            }
        }
        self.persist(session).await
    }

    /// Convert uncompressed recordings to MP3 upload artifacts. Failures are
    /// recorded per file; a file over the upload limit that cannot be
    /// converted is permanently failed, everything else continues.
    async fn phase_convert(&self, session: &mut Session) -> Result<()> {
        let transcoder_ok = match self.media.check_availability() {
            Ok(()) => true,
            Err(e) => {
                warn!("Transcoder unavailable: {}", e);
                false
            }
        };

        let session_id = session.id.clone();
        for idx in 0..session.audio_files.len() {
            self.convert_one(&session_id, &mut session.audio_files[idx], transcoder_ok)
                .await?;
            self.persist(session).await?;
        }
        Ok(())
    }

    async fn convert_one(
        &self,
        session_id: &str,
        file: &mut AudioFile,
        transcoder_ok: bool,
    ) -> Result<()> {
        if file.status != AudioProcessingStatus::Pending {
            return Ok(());
        }

        if file.extension() == "mp3" {
            // The source itself is the upload artifact
            self.organizer
                .move_to_status(file, session_id, AudioProcessingStatus::PendingMp3)?;
            file.mp3_path = Some(file.path.clone());
            return Ok(());
        }

        let must_convert = file.size_bytes > self.config.transcription.max_upload_bytes;
        if !transcoder_ok {
            if must_convert {
                warn!(
                    "{} exceeds the upload limit and no transcoder is available",
                    file.file_name
                );
                file.conversion_error =
                    Some("file exceeds the upload limit and no transcoder is available".to_string());
                file.retry_eligible = false;
                self.move_with_sidecars(session_id, file, AudioProcessingStatus::Failed)?;
            }
            // Small files upload uncompressed
            return Ok(());
        }

        let target_dir = self
            .organizer
            .status_dir(AudioProcessingStatus::PendingMp3, session_id);
        std::fs::create_dir_all(&target_dir)?;
        let stem = file
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio")
            .to_string();
        let target = target_dir.join(format!("{}.mp3", stem));

        if target.exists() {
            debug!("Reusing existing MP3 artifact {}", target.display());
            file.mp3_path = Some(target);
            file.status = AudioProcessingStatus::PendingMp3;
            return Ok(());
        }

        match self.media.convert_to_mp3(&file.path, &target).await {
            Ok(()) => {
                file.mp3_path = Some(target);
                file.conversion_error = None;
                file.status = AudioProcessingStatus::PendingMp3;
            }
            Err(e) => {
                warn!("Conversion failed for {}: {}", file.file_name, e);
                file.conversion_error = Some(e.to_string());
                if must_convert {
                    file.retry_eligible = false;
                    self.move_with_sidecars(session_id, file, AudioProcessingStatus::Failed)?;
                }
            }
        }
        Ok(())
    }

    /// Upload every pending file and poll each submitted job to completion.
    /// Upload and poll run as separate passes so the uploaded state is
    /// persisted before the long poll begins.
    async fn phase_transcribe(&self, session: &mut Session) -> Result<()> {
        session.status = SessionStatus::Transcribing;
        self.persist(session).await?;

        let session_id = session.id.clone();
        let assignments = session.mic_assignments.clone();

        for idx in 0..session.audio_files.len() {
            self.upload_one(&session_id, &assignments, &mut session.audio_files[idx])
                .await?;
            self.persist(session).await?;
        }
        for idx in 0..session.audio_files.len() {
            self.poll_one(&session_id, &assignments, &mut session.audio_files[idx])
                .await?;
            self.persist(session).await?;
        }
        Ok(())
    }

    async fn upload_one(
        &self,
        session_id: &str,
        assignments: &BTreeMap<u32, String>,
        file: &mut AudioFile,
    ) -> Result<()> {
        match file.status {
            AudioProcessingStatus::Pending | AudioProcessingStatus::PendingMp3 => {}
            _ => return Ok(()),
        }

        // Sidecars from an earlier run make the upload unnecessary
        if let Some((text, raw_path)) = read_sidecars(&file.path) {
            info!("Reusing transcription sidecars for {}", file.file_name);
            file.transcript = Some(map_speaker_labels(
                &text,
                strategy_for_file(file),
                assignments,
            ));
            file.raw_transcription_path = Some(raw_path);
            self.move_artifact(session_id, file, AudioProcessingStatus::TranscriptionComplete)?;
            return Ok(());
        }

        let artifact = file.mp3_path.clone().unwrap_or_else(|| file.path.clone());
        let artifact_size = std::fs::metadata(&artifact)
            .map(|m| m.len())
            .unwrap_or(file.size_bytes);
        if artifact_size > self.config.transcription.max_upload_bytes {
            warn!(
                "{} exceeds the upload limit even after conversion",
                file.file_name
            );
            file.retry_eligible = false;
            self.move_artifact(session_id, file, AudioProcessingStatus::FailedMp3)?;
            return Ok(());
        }

        let submitted = async {
            let audio_url = self.transcriber.upload_file(&artifact).await?;
            self.transcriber.submit_job(&audio_url).await
        }
        .await;

        match submitted {
            Ok(job_id) => {
                info!("Submitted {} as job {}", file.file_name, job_id);
                file.transcript_id = Some(job_id);
                self.move_artifact(session_id, file, AudioProcessingStatus::UploadedToGladia)?;
            }
            Err(e) => {
                warn!("Upload failed for {}: {}", file.file_name, e);
                self.move_artifact(session_id, file, AudioProcessingStatus::FailedMp3)?;
            }
        }
        Ok(())
    }

    async fn poll_one(
        &self,
        session_id: &str,
        assignments: &BTreeMap<u32, String>,
        file: &mut AudioFile,
    ) -> Result<()> {
        if file.status != AudioProcessingStatus::UploadedToGladia {
            return Ok(());
        }
        let Some(job_id) = file.transcript_id.clone() else {
            return Ok(());
        };

        match self.transcriber.poll_transcription(&job_id).await {
            Ok(result) => {
                let (raw_path, _) = persist_sidecars(&file.path, &result)?;
                file.raw_transcription_path = Some(raw_path);
                file.transcript = Some(map_speaker_labels(
                    &result.full_transcript,
                    strategy_for_file(file),
                    assignments,
                ));
                // Already in the post-upload folder, only the status changes
                file.status = AudioProcessingStatus::TranscriptionComplete;
                info!("Transcription complete for {}", file.file_name);
            }
            Err(e) => {
                warn!(
                    "Transcription failed for {} (job {}): {}",
                    file.file_name, job_id, e
                );
                self.move_artifact(session_id, file, AudioProcessingStatus::FailedMp3)?;
            }
        }
        Ok(())
    }

    /// Aggregate transcripts, run the LLM analysis, derive stats, and cut
    /// highlight clips. A failed analysis call degrades to the labeled
    /// placeholder so the session can still complete.
    async fn phase_analyze(&self, session: &mut Session) -> Result<()> {
        session.status = SessionStatus::Analyzing;
        self.persist(session).await?;

        if !session.audio_files.iter().any(|f| f.has_transcript()) {
            warn!("No usable transcripts for session {}", session.id);
            return Ok(());
        }

        let transcript =
            aggregate_transcripts(session, self.config.analysis.transcript_char_budget);

        let _permit = self
            .analysis_slots
            .acquire()
            .await
            .map_err(|_| ClipForgeError::Analysis("analysis semaphore closed".to_string()))?;

        let results = match self
            .analyzer
            .analyze_session(session, &transcript, &session.folder_path)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!("Analysis failed for session {}: {}", session.id, e);
                AnalysisResults::degraded_placeholder("analysis request failed")
            }
        };

        session.stats = Some(compute_stats(session, &results));
        self.extract_clips(session, &results);
        // Whole-set replacement, never merged with a previous run
        session.analysis = Some(results);
        self.persist(session).await
    }

    fn extract_clips(&self, session: &mut Session, analysis: &AnalysisResults) {
        if analysis.degraded {
            info!("Skipping clip extraction for degraded analysis");
            return;
        }

        let extractor = ClipExtractor::new(self.config.clips.clone());
        let source = match extractor.clip_source(session) {
            Ok(master) => master.path.clone(),
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };

        let mut clips = Vec::new();
        for winner in &analysis.winners {
            let Some(ts) = winner.timestamp_secs else {
                continue;
            };
            match extractor.extract_winner_clip(&source, &session.id, ts) {
                Ok(clip) => clips.push(LabeledClip {
                    label: winner.category.key().to_string(),
                    clip,
                }),
                Err(e) => warn!("Clip extraction failed for {}: {}", winner.category.key(), e),
            }
        }
        for list in &analysis.top_fives {
            for entry in &list.entries {
                let Some(ts) = entry.timestamp_secs else {
                    continue;
                };
                match extractor.extract_entry_clip(&source, &session.id, ts, None) {
                    Ok(clip) => clips.push(LabeledClip {
                        label: format!("{}_{}", list.category.key(), entry.rank),
                        clip,
                    }),
                    Err(e) => warn!(
                        "Clip extraction failed for {} rank {}: {}",
                        list.category.key(),
                        entry.rank,
                        e
                    ),
                }
            }
        }
        session.clips = clips;
    }

    async fn phase_complete(&self, session: &mut Session) -> Result<()> {
        if session.meets_completion_invariant() {
            session.status = SessionStatus::Complete;
            session.error_message = None;
            info!("Session {} complete", session.id);
        } else {
            session.status = SessionStatus::Failed;
            if session.error_message.is_none() {
                session.error_message =
                    Some("session did not produce a transcript and analysis".to_string());
            }
            warn!("Session {} did not meet the completion invariant", session.id);
        }
        self.persist(session).await
    }

    /// Move the MP3 upload artifact into the folder for `status`. A file
    /// uploaded uncompressed has no artifact: a failure moves the original
    /// into the WAV-stage failed folder, while post-upload statuses only
    /// change the record because WAV originals never enter MP3-stage folders.
    fn move_artifact(
        &self,
        session_id: &str,
        file: &mut AudioFile,
        status: AudioProcessingStatus,
    ) -> Result<()> {
        match file.mp3_path.clone() {
            Some(mp3) if mp3 == file.path => {
                self.organizer.move_to_status(file, session_id, status)?;
                file.mp3_path = Some(file.path.clone());
            }
            Some(mp3) => {
                let mut artifact = AudioFile::new(mp3, 0);
                let target = self.organizer.move_to_status(&mut artifact, session_id, status)?;
                file.mp3_path = Some(target);
                file.status = status;
            }
            None => match status {
                AudioProcessingStatus::Failed | AudioProcessingStatus::FailedMp3 => {
                    self.move_with_sidecars(session_id, file, AudioProcessingStatus::Failed)?;
                }
                other => file.status = other,
            },
        }
        Ok(())
    }

    /// Move a WAV-stage file into the folder for `status`, carrying its
    /// transcript sidecars along so reruns still find them.
    fn move_with_sidecars(
        &self,
        session_id: &str,
        file: &mut AudioFile,
        status: AudioProcessingStatus,
    ) -> Result<()> {
        let (old_txt, old_json) = sidecar_paths(&file.path);
        self.organizer.move_to_status(file, session_id, status)?;
        let (new_txt, new_json) = sidecar_paths(&file.path);

        for (from, to) in [(old_txt, new_txt), (old_json, new_json.clone())] {
            if from != to && from.exists() {
                if let Err(e) = std::fs::rename(&from, &to) {
                    warn!("Could not move sidecar {}: {}", from.display(), e);
                }
            }
        }
        if file.raw_transcription_path.is_some() {
            file.raw_transcription_path = Some(new_json);
        }
        Ok(())
    }

    async fn persist(&self, session: &mut Session) -> Result<()> {
        session.updated_at = self.clock.now();
        self.store.upsert(session).await
    }
}

/// Sidecar locations for an audio path: `{base}.txt` and
/// `{base}_transcription.json` next to the file.
fn sidecar_paths(audio_path: &Path) -> (PathBuf, PathBuf) {
    let parent = audio_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let base = audio_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    (
        parent.join(format!("{}.txt", base)),
        parent.join(format!("{}_transcription.json", base)),
    )
}

fn discover_session_folders(root: &Path) -> Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || RESERVED_DIRS.contains(&name.as_str()) {
            continue;
        }
        folders.push(path);
    }
    folders.sort();
    Ok(folders)
}
