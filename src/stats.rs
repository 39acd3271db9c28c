use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analyze::AnalysisResults;
use crate::session::Session;

/// Words counted as profanity in per-participant tallies.
const PROFANITY: &[&str] = &["damn", "hell", "shit", "fuck", "crap", "bastard"];

/// Trailing fragments treated as an interruption of the speaker.
const INTERRUPTION_SUFFIXES: &[&str] = &["--", "-", "...", "\u{2026}"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantStats {
    pub words: u64,
    pub questions: u64,
    pub interruptions: u64,
    pub profanities: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

/// Derived aggregate counters for one session. Regenerated whenever analysis
/// reruns; never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub per_participant: BTreeMap<String, ParticipantStats>,
    pub total_words: u64,
    pub total_questions: u64,
    pub energy_level: EnergyLevel,
    pub summary: String,
}

/// Compute session statistics deterministically from the mapped transcripts
/// and the parsed category results.
pub fn compute_stats(session: &Session, analysis: &AnalysisResults) -> SessionStats {
    let mut per_participant: BTreeMap<String, ParticipantStats> = BTreeMap::new();
    for name in session.mic_assignments.values() {
        per_participant.insert(name.clone(), ParticipantStats::default());
    }

    // Prefer the master transcript: its speaker-labeled lines attribute text
    // across the whole conversation. Fall back to per-mic transcripts.
    let attributed = attributed_lines(session);
    for (speaker, text) in &attributed {
        let stats = per_participant.entry(speaker.clone()).or_default();
        tally_text(stats, text);
    }

    let total_words: u64 = per_participant.values().map(|s| s.words).sum();
    let total_questions: u64 = per_participant.values().map(|s| s.questions).sum();
    let total_interruptions: u64 = per_participant.values().map(|s| s.interruptions).sum();
    let exclamations: u64 = attributed
        .iter()
        .map(|(_, t)| t.matches('!').count() as u64)
        .sum();

    let energy_level = energy_level(total_words, exclamations, total_interruptions);

    let most_talkative = per_participant
        .iter()
        .max_by_key(|(_, s)| s.words)
        .map(|(name, _)| name.clone());

    let mut summary = format!(
        "{} words across {} participants, {} questions, energy {:?}.",
        total_words,
        per_participant.len(),
        total_questions,
        energy_level
    );
    if let Some(name) = most_talkative {
        summary.push_str(&format!(" Most talkative: {}.", name));
    }
    if let Some(joke) = analysis
        .winners
        .iter()
        .find(|w| w.category == crate::analyze::WinnerCategory::BestJoke)
    {
        if !analysis.degraded {
            summary.push_str(&format!(" Best joke went to {}.", joke.speaker));
        }
    }

    SessionStats {
        per_participant,
        total_words,
        total_questions,
        energy_level,
        summary,
    }
}

/// Split transcripts into (speaker, text) lines. Lines in a mapped
/// transcript look like `Name: said something`.
fn attributed_lines(session: &Session) -> Vec<(String, String)> {
    let mut lines = Vec::new();

    let source_files: Vec<_> = match session.master_file().filter(|f| f.transcript.is_some()) {
        Some(master) => vec![master],
        None => session
            .audio_files
            .iter()
            .filter(|f| f.speaker_slot.is_some() && f.transcript.is_some())
            .collect(),
    };

    for file in source_files {
        let default_speaker = file
            .speaker_slot
            .and_then(|slot| session.participant_for_slot(slot))
            .unwrap_or("Unknown")
            .to_string();
        let Some(text) = file.transcript.as_ref() else {
            continue;
        };
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((speaker, rest)) if !speaker.trim().is_empty() && speaker.len() < 40 => {
                    lines.push((speaker.trim().to_string(), rest.trim().to_string()));
                }
                _ => lines.push((default_speaker.clone(), line.to_string())),
            }
        }
    }
    lines
}

fn tally_text(stats: &mut ParticipantStats, text: &str) {
    stats.words += text.split_whitespace().count() as u64;
    stats.questions += text.matches('?').count() as u64;
    if INTERRUPTION_SUFFIXES
        .iter()
        .any(|suffix| text.trim_end().ends_with(suffix))
    {
        stats.interruptions += 1;
    }
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if PROFANITY.contains(&word.to_lowercase().as_str()) {
            stats.profanities += 1;
        }
    }
}

fn energy_level(words: u64, exclamations: u64, interruptions: u64) -> EnergyLevel {
    if words == 0 {
        return EnergyLevel::Low;
    }
    // Exclamations and interruptions per thousand words
    let intensity = (exclamations + interruptions * 2) as f64 / (words as f64 / 1000.0);
    if intensity >= 20.0 {
        EnergyLevel::High
    } else if intensity >= 5.0 {
        EnergyLevel::Medium
    } else {
        EnergyLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::AnalysisResults;
    use crate::session::{AudioFile, Session};
    use chrono::Utc;
    use std::path::PathBuf;

    fn session_with_master(transcript: &str) -> Session {
        let mut session = Session::new(
            "s1".to_string(),
            "Heat".to_string(),
            PathBuf::from("/tmp/s1"),
            Utc::now(),
        );
        session.mic_assignments.insert(0, "Alice".to_string());
        session.mic_assignments.insert(1, "Bob".to_string());
        let mut master = AudioFile::new(PathBuf::from("/tmp/s1/MASTER_MIX.wav"), 1);
        master.is_master = true;
        master.transcript = Some(transcript.to_string());
        session.audio_files.push(master);
        session
    }

    #[test]
    fn test_per_participant_counters() {
        let session = session_with_master(
            "Alice: what did you think of the ending?\n\
             Bob: it was damn good!\n\
             Alice: I was not sure --\n\
             Bob: exactly what I said",
        );
        let analysis = AnalysisResults::degraded_placeholder("n/a");
        let stats = compute_stats(&session, &analysis);

        let alice = &stats.per_participant["Alice"];
        assert_eq!(alice.words, 12);
        assert_eq!(alice.questions, 1);
        assert_eq!(alice.interruptions, 1);
        assert_eq!(alice.profanities, 0);

        let bob = &stats.per_participant["Bob"];
        assert_eq!(bob.profanities, 1);
        assert_eq!(bob.questions, 0);
        assert_eq!(stats.total_questions, 1);
    }

    #[test]
    fn test_stats_are_deterministic() {
        let session = session_with_master("Alice: hello there!\nBob: hi!");
        let analysis = AnalysisResults::degraded_placeholder("n/a");
        let a = compute_stats(&session, &analysis);
        let b = compute_stats(&session, &analysis);
        assert_eq!(a.summary, b.summary);
        assert_eq!(a.total_words, b.total_words);
        assert_eq!(a.energy_level, b.energy_level);
    }

    #[test]
    fn test_energy_level_thresholds() {
        assert_eq!(energy_level(0, 0, 0), EnergyLevel::Low);
        assert_eq!(energy_level(1000, 1, 0), EnergyLevel::Low);
        assert_eq!(energy_level(1000, 10, 0), EnergyLevel::Medium);
        assert_eq!(energy_level(1000, 10, 10), EnergyLevel::High);
    }

    #[test]
    fn test_degraded_analysis_not_credited_in_summary() {
        let session = session_with_master("Alice: hello");
        let analysis = AnalysisResults::degraded_placeholder("n/a");
        let stats = compute_stats(&session, &analysis);
        assert!(!stats.summary.contains("Best joke"));
    }
}
