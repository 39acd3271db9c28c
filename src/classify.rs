use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{Result, ClipForgeError};
use crate::session::{AudioFile, AuxRole, Session};

/// Extensions considered audio recordings during a session-folder scan.
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "flac", "ogg", "aac"];

/// Canonical base name the chosen master recording is renamed to. The
/// original extension is preserved.
pub const MASTER_BASE_NAME: &str = "MASTER_MIX";

fn mic_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^MIC(\d+)$").unwrap())
}

fn legacy_speaker_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d+)_Speaker").unwrap())
}

fn timestamp_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}_\d{4}_\d{4}").unwrap())
}

/// How a single filename classified, before elimination heuristics run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Individual microphone with a 0-based speaker slot
    Mic(u32),
    /// Known auxiliary role (no speaker slot)
    Aux(AuxRole),
    /// Master/group mix
    Master,
    Unidentified,
}

/// Classify one filename (stem only, extension stripped) in priority order.
pub fn classify_name(file_name: &str) -> FileKind {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    if let Some(caps) = mic_pattern().captures(stem) {
        if let Ok(n) = caps[1].parse::<u32>() {
            if n >= 1 {
                return FileKind::Mic(n - 1);
            }
        }
    }

    if let Some(caps) = legacy_speaker_pattern().captures(stem) {
        if let Ok(n) = caps[1].parse::<u32>() {
            if n >= 1 {
                return FileKind::Mic(n - 1);
            }
        }
    }

    let normalized = stem.to_lowercase().replace(['_', '-'], " ");
    match normalized.trim() {
        "phone" => return FileKind::Aux(AuxRole::Phone),
        "sound pad" | "soundpad" => return FileKind::Aux(AuxRole::SoundPad),
        _ => {}
    }

    if timestamp_pattern().is_match(stem) {
        return FileKind::Master;
    }
    let lowered = stem.to_lowercase();
    if ["master", "combined", "full", "group"]
        .iter()
        .any(|kw| lowered.contains(kw))
    {
        return FileKind::Master;
    }

    FileKind::Unidentified
}

/// Scan a session folder for audio files (top level only, sorted by name so
/// classification order is deterministic).
pub fn scan_audio_files(folder: &Path) -> Result<Vec<AudioFile>> {
    if !folder.is_dir() {
        return Err(ClipForgeError::Classify(format!(
            "Session path is not a directory: {}",
            folder.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        if let Some(ext) = ext {
            if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                files.push(AudioFile::new(path.to_path_buf(), size));
            }
        }
    }

    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(files)
}

/// Scan and classify a session's folder, resolving the master recording by
/// elimination when the filename patterns don't identify one. Mutates the
/// session's audio-file list and may perform one filesystem rename.
pub fn classify_session(session: &mut Session) -> Result<()> {
    let mut files = scan_audio_files(&session.folder_path)?;
    info!(
        "Classifying {} audio files in {}",
        files.len(),
        session.folder_path.display()
    );

    for file in &mut files {
        match classify_name(&file.file_name) {
            FileKind::Mic(slot) => {
                file.speaker_slot = Some(slot);
                info!("{} -> speaker slot {}", file.file_name, slot);
            }
            FileKind::Aux(role) => {
                file.aux_role = Some(role);
                info!("{} -> auxiliary role {}", file.file_name, role.label());
            }
            FileKind::Master => {
                file.is_master = true;
                info!("{} -> master recording", file.file_name);
            }
            FileKind::Unidentified => {}
        }
    }

    demote_extra_masters(&mut files);
    resolve_master_by_elimination(&mut files);

    if let Some(master) = files.iter_mut().find(|f| f.is_master) {
        rename_master_to_canonical(master)?;
    } else {
        // Data-quality anomaly, not fatal: aggregation degrades to
        // individual mic tracks only.
        warn!(
            "No master recording identified for session '{}'",
            session.title
        );
    }

    session.audio_files = files;
    session.derive_participants();
    Ok(())
}

/// Exactly one file may carry the master flag. When several filenames match
/// master patterns the largest by byte size keeps it; the rest are demoted
/// and logged as a data-quality anomaly.
fn demote_extra_masters(files: &mut [AudioFile]) {
    let masters: Vec<usize> = files
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_master)
        .map(|(i, _)| i)
        .collect();
    if masters.len() <= 1 {
        return;
    }

    let keep = masters
        .iter()
        .copied()
        .max_by_key(|&i| files[i].size_bytes)
        .unwrap();
    warn!(
        "{} files match master patterns; keeping largest ({}, {} bytes)",
        masters.len(),
        files[keep].file_name,
        files[keep].size_bytes
    );
    for i in masters {
        if i != keep {
            files[i].is_master = false;
        }
    }
}

/// If exactly one file is left unidentified it becomes the master; with
/// several candidates the largest by byte size wins.
fn resolve_master_by_elimination(files: &mut [AudioFile]) {
    if files.iter().any(|f| f.is_master) {
        return;
    }

    let unidentified: Vec<usize> = files
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.is_identified())
        .map(|(i, _)| i)
        .collect();

    match unidentified.len() {
        0 => {}
        1 => {
            let idx = unidentified[0];
            info!(
                "{} is the only unidentified file, marking as master by elimination",
                files[idx].file_name
            );
            files[idx].is_master = true;
        }
        _ => {
            let idx = unidentified
                .into_iter()
                .max_by_key(|&i| files[i].size_bytes)
                .unwrap();
            warn!(
                "Multiple unidentified files; choosing largest ({}, {} bytes) as master",
                files[idx].file_name, files[idx].size_bytes
            );
            files[idx].is_master = true;
        }
    }
}

/// Rename the master to `MASTER_MIX.<ext>` unless that name is already taken
/// (never overwrites).
fn rename_master_to_canonical(master: &mut AudioFile) -> Result<()> {
    let ext = master.extension();
    let canonical_name = if ext.is_empty() {
        MASTER_BASE_NAME.to_string()
    } else {
        format!("{}.{}", MASTER_BASE_NAME, ext)
    };

    if master.file_name == canonical_name {
        return Ok(());
    }

    let parent = master
        .path
        .parent()
        .ok_or_else(|| ClipForgeError::Classify("Master file has no parent directory".to_string()))?;
    let target = parent.join(&canonical_name);

    if target.exists() {
        warn!(
            "Canonical master name {} already taken, keeping {}",
            canonical_name, master.file_name
        );
        return Ok(());
    }

    std::fs::rename(&master.path, &target)?;
    info!("Renamed master {} -> {}", master.file_name, canonical_name);
    master.path = target;
    master.file_name = canonical_name;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn write_file(dir: &Path, name: &str, bytes: usize) {
        std::fs::write(dir.join(name), vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn test_mic_filenames_assign_zero_based_slots() {
        assert_eq!(classify_name("MIC1.wav"), FileKind::Mic(0));
        assert_eq!(classify_name("MIC2.wav"), FileKind::Mic(1));
        assert_eq!(classify_name("mic7.flac"), FileKind::Mic(6));
        assert_eq!(classify_name("MIC10.wav"), FileKind::Mic(9));
    }

    #[test]
    fn test_legacy_speaker_pattern() {
        assert_eq!(classify_name("3_Speaker_John.wav"), FileKind::Mic(2));
        assert_eq!(classify_name("1_speaker.mp3"), FileKind::Mic(0));
    }

    #[test]
    fn test_aux_roles_match_exact_names() {
        assert_eq!(classify_name("phone.wav"), FileKind::Aux(AuxRole::Phone));
        assert_eq!(classify_name("PHONE.m4a"), FileKind::Aux(AuxRole::Phone));
        assert_eq!(classify_name("sound_pad.wav"), FileKind::Aux(AuxRole::SoundPad));
        assert_eq!(classify_name("SOUND PAD.wav"), FileKind::Aux(AuxRole::SoundPad));
    }

    #[test]
    fn test_master_patterns() {
        assert_eq!(classify_name("2024_0315_1900.wav"), FileKind::Master);
        assert_eq!(classify_name("master.wav"), FileKind::Master);
        assert_eq!(classify_name("group_recording.wav"), FileKind::Master);
        assert_eq!(classify_name("full-session.wav"), FileKind::Master);
    }

    #[test]
    fn test_unidentified() {
        assert_eq!(classify_name("random.wav"), FileKind::Unidentified);
        assert_eq!(classify_name("MIC.wav"), FileKind::Unidentified);
    }

    #[test]
    fn test_single_unidentified_becomes_master() {
        let mut files = vec![
            {
                let mut f = AudioFile::new(PathBuf::from("MIC1.wav"), 10);
                f.speaker_slot = Some(0);
                f
            },
            AudioFile::new(PathBuf::from("mystery.wav"), 10),
        ];
        resolve_master_by_elimination(&mut files);
        assert!(files[1].is_master);
    }

    #[test]
    fn test_largest_unidentified_wins() {
        let mut files = vec![
            AudioFile::new(PathBuf::from("a.wav"), 10),
            AudioFile::new(PathBuf::from("b.wav"), 5000),
            AudioFile::new(PathBuf::from("c.wav"), 100),
        ];
        resolve_master_by_elimination(&mut files);
        assert!(!files[0].is_master);
        assert!(files[1].is_master);
        assert!(!files[2].is_master);
    }

    #[test]
    fn test_classify_session_scenario_march_inception() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "MIC1.wav", 16);
        write_file(dir.path(), "MIC2.wav", 16);
        write_file(dir.path(), "2024_0315_1900.wav", 64);

        let mut session = Session::new(
            "2024-March-Inception".to_string(),
            "Inception".to_string(),
            dir.path().to_path_buf(),
            Utc::now(),
        );
        classify_session(&mut session).unwrap();

        let slots: Vec<Option<u32>> = session
            .audio_files
            .iter()
            .filter(|f| !f.is_master)
            .map(|f| f.speaker_slot)
            .collect();
        assert_eq!(slots, vec![Some(0), Some(1)]);

        let master = session.master_file().expect("master identified");
        assert_eq!(master.file_name, "MASTER_MIX.wav");
        assert!(dir.path().join("MASTER_MIX.wav").exists());
        assert!(!dir.path().join("2024_0315_1900.wav").exists());
    }

    #[test]
    fn test_master_rename_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "MASTER_MIX.wav", 8);
        write_file(dir.path(), "2024_0101_2000.wav", 64);
        write_file(dir.path(), "MIC1.wav", 16);

        let mut session = Session::new(
            "s".to_string(),
            "s".to_string(),
            dir.path().to_path_buf(),
            Utc::now(),
        );
        classify_session(&mut session).unwrap();

        // The larger timestamped file wins the master flag but must keep its
        // name because the canonical one is taken.
        assert!(dir.path().join("2024_0101_2000.wav").exists());
        assert!(dir.path().join("MASTER_MIX.wav").exists());
        let master = session.master_file().expect("master identified");
        assert_eq!(master.file_name, "2024_0101_2000.wav");
    }

    #[test]
    fn test_multiple_master_matches_demote_to_largest() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "master.wav", 8);
        write_file(dir.path(), "2024_0101_2000.wav", 64);
        write_file(dir.path(), "MIC1.wav", 16);

        let mut session = Session::new(
            "s".to_string(),
            "s".to_string(),
            dir.path().to_path_buf(),
            Utc::now(),
        );
        classify_session(&mut session).unwrap();

        let masters: Vec<_> = session
            .audio_files
            .iter()
            .filter(|f| f.is_master)
            .collect();
        assert_eq!(masters.len(), 1);
        // The larger timestamped file kept the flag and took the canonical
        // name; the smaller match was demoted and left untouched.
        assert_eq!(masters[0].file_name, "MASTER_MIX.wav");
        assert!(dir.path().join("master.wav").exists());
    }
}
