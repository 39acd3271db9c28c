use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

use crate::session::{AudioFile, AuxRole};

/// Matches the generic diarization labels in their textual variants:
/// `Speaker 3`, `speaker 3`, `[Speaker 3]`, `(Speaker 3)`, `Speaker_3`.
fn speaker_label_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)[\[\(]?\bspeaker[ _](\d{1,2})\b[\]\)]?").unwrap())
}

/// How generic speaker labels in one file's transcript get rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingStrategy {
    /// Personal mic: every label becomes the single owning participant
    IndividualMic(u32),
    /// Auxiliary source: every label becomes the fixed role label
    AuxRole(AuxRole),
    /// Master mix: each numbered label maps to its slot's participant
    MasterMix,
}

/// Decide the rewrite strategy from the file's classification.
pub fn strategy_for_file(file: &AudioFile) -> MappingStrategy {
    if let Some(slot) = file.speaker_slot {
        MappingStrategy::IndividualMic(slot)
    } else if let Some(role) = file.aux_role {
        MappingStrategy::AuxRole(role)
    } else {
        MappingStrategy::MasterMix
    }
}

/// Rewrite generic "Speaker N" labels into participant names.
///
/// Pure and idempotent: names never re-match the label pattern, and labels
/// with no mapped participant are left untouched, so running the transform
/// twice yields the same text as running it once.
pub fn map_speaker_labels(
    text: &str,
    strategy: MappingStrategy,
    assignments: &BTreeMap<u32, String>,
) -> String {
    let pattern = speaker_label_pattern();

    match strategy {
        MappingStrategy::IndividualMic(slot) => {
            // A personal mic captures only its owner; every label, whatever
            // its number, belongs to that one participant.
            match assignments.get(&slot) {
                Some(name) => pattern.replace_all(text, name.as_str()).to_string(),
                None => {
                    debug!("No participant assigned to slot {}, leaving labels", slot);
                    text.to_string()
                }
            }
        }
        MappingStrategy::AuxRole(role) => pattern.replace_all(text, role.label()).to_string(),
        MappingStrategy::MasterMix => pattern
            .replace_all(text, |caps: &Captures| {
                let number: u32 = caps[1].parse().unwrap_or(u32::MAX);
                if number <= 10 {
                    if let Some(name) = assignments.get(&number) {
                        return name.clone();
                    }
                }
                caps[0].to_string()
            })
            .to_string(),
    }
}
