use tracing::{info, warn};

use crate::session::Session;
use crate::speakers::{map_speaker_labels, strategy_for_file};

/// Marker inserted where the middle of an over-budget master transcript was
/// cut. Exactly one appears in a truncated document.
pub const TRUNCATION_MARKER: &str = "\n[... middle of transcript omitted ...]\n";

/// Minimum characters of a file's content worth including; below this the
/// file is reported as skipped instead of silently dropped.
const MIN_USEFUL_CHARS: usize = 300;

/// Share of the retained master text taken from the opening. Openings set
/// context and endings carry wrap-up opinions, so both survive truncation.
const HEAD_SHARE: f64 = 0.6;

/// The size-bounded document handed to the LLM.
#[derive(Debug, Clone)]
pub struct AggregatedTranscript {
    pub text: String,
    pub used_master: bool,
    pub truncated: bool,
    /// Files that could not fit in the budget, by file name
    pub skipped_files: Vec<String>,
}

/// Build one bounded transcript document for a session: header plus the
/// master recording when present, otherwise individual mic tracks in
/// speaker-slot order.
pub fn aggregate_transcripts(session: &Session, char_budget: usize) -> AggregatedTranscript {
    let header = build_header(session);
    let remaining = char_budget.saturating_sub(header.chars().count());

    if let Some(master) = session.master_file() {
        if let Some(raw) = master.transcript.as_ref().filter(|t| !t.trim().is_empty()) {
            let body = normalize_transcript(raw, session, master);
            let (body, truncated) = truncate_head_tail(&body, remaining);
            info!(
                "Aggregated master transcript ({} chars, truncated: {})",
                body.chars().count(),
                truncated
            );
            return AggregatedTranscript {
                text: format!("{}{}", header, body),
                used_master: true,
                truncated,
                skipped_files: Vec::new(),
            };
        }
        warn!("Master recording has no transcript, falling back to individual mics");
    }

    aggregate_individual(session, header, remaining)
}

fn build_header(session: &Session) -> String {
    let participants = if session.participants_present.is_empty() {
        "unknown".to_string()
    } else {
        session.participants_present.join(", ")
    };
    format!(
        "# {}\nDate: {}\nParticipants: {}\n\n",
        session.title,
        session.created_at.format("%Y-%m-%d"),
        participants
    )
}

/// Flatten a structured (JSON) transcript into plain `speaker: text` lines;
/// plain text passes through the speaker-label mapper unchanged otherwise.
fn normalize_transcript(
    raw: &str,
    session: &Session,
    file: &crate::session::AudioFile,
) -> String {
    let text = flatten_structured(raw).unwrap_or_else(|| raw.to_string());
    map_speaker_labels(&text, strategy_for_file(file), &session.mic_assignments)
}

/// Convert a structured transcription JSON body (an utterance list) into
/// `Speaker N: text` lines. Returns None for plain-text input.
fn flatten_structured(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    let utterances = value
        .get("transcription")
        .and_then(|t| t.get("utterances"))
        .or_else(|| value.get("utterances"))?
        .as_array()?;

    let lines: Vec<String> = utterances
        .iter()
        .filter_map(|u| {
            let text = u.get("text")?.as_str()?.trim();
            if text.is_empty() {
                return None;
            }
            let speaker = u
                .get("speaker")
                .and_then(|s| s.as_u64())
                .map(|s| format!("Speaker {}", s))
                .unwrap_or_else(|| "Speaker ?".to_string());
            Some(format!("{}: {}", speaker, text))
        })
        .collect();

    Some(lines.join("\n"))
}

/// Keep the first ~60% and last ~40% of the available space, with one
/// explicit marker where the middle was cut.
fn truncate_head_tail(text: &str, budget: usize) -> (String, bool) {
    let total: Vec<char> = text.chars().collect();
    if total.len() <= budget {
        return (text.to_string(), false);
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    // A budget that cannot fit the marker plus content yields an empty body
    // rather than a bare marker that overshoots the budget.
    if budget <= marker_len {
        return (String::new(), true);
    }
    let keep = budget - marker_len;
    let head_len = (keep as f64 * HEAD_SHARE) as usize;
    let tail_len = keep - head_len;

    let head: String = total[..head_len].iter().collect();
    let tail: String = total[total.len() - tail_len..].iter().collect();
    (format!("{}{}{}", head, TRUNCATION_MARKER, tail), true)
}

fn aggregate_individual(
    session: &Session,
    header: String,
    mut remaining: usize,
) -> AggregatedTranscript {
    let mut mic_files: Vec<_> = session
        .audio_files
        .iter()
        .filter(|f| f.speaker_slot.is_some())
        .collect();
    mic_files.sort_by_key(|f| f.speaker_slot);

    let mut body = String::new();
    let mut skipped = Vec::new();
    let mut budget_exhausted = false;

    for file in mic_files {
        let Some(raw) = file.transcript.as_ref().filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        let slot = file.speaker_slot.unwrap_or(0);
        let speaker = session
            .participant_for_slot(slot)
            .unwrap_or("Unknown")
            .to_string();

        if budget_exhausted {
            skipped.push(file.file_name.clone());
            continue;
        }

        let content = normalize_transcript(raw, session, file);
        let section_header = format!("=== {} (mic {}) ===\n", speaker, slot + 1);
        let overhead = section_header.chars().count() + 2;

        if remaining <= overhead + MIN_USEFUL_CHARS {
            warn!("Budget exhausted, skipping {}", file.file_name);
            skipped.push(file.file_name.clone());
            budget_exhausted = true;
            continue;
        }

        let available = remaining - overhead;
        let content_chars: Vec<char> = content.chars().collect();
        let taken: String = if content_chars.len() > available {
            warn!(
                "Truncating {} to fit remaining budget ({} of {} chars)",
                file.file_name,
                available,
                content_chars.len()
            );
            content_chars[..available].iter().collect()
        } else {
            content
        };

        let section = format!("{}{}\n\n", section_header, taken);
        remaining = remaining.saturating_sub(section.chars().count());
        body.push_str(&section);
    }

    if !skipped.is_empty() {
        warn!("Skipped transcript files (budget): {}", skipped.join(", "));
    }

    AggregatedTranscript {
        text: format!("{}{}", header, body),
        used_master: false,
        truncated: false,
        skipped_files: skipped,
    }
}
