use crate::aggregate::AggregatedTranscript;
use crate::session::Session;
use super::{RankedCategory, WinnerCategory};

/// Build the analysis prompt: participant roster with explicit
/// microphone-to-name ordering, the enumerated category list, configured
/// discussion questions, and the aggregated transcript.
pub fn build_prompt(
    session: &Session,
    transcript: &AggregatedTranscript,
    discussion_questions: &[String],
) -> String {
    let roster = if session.mic_assignments.is_empty() {
        "unknown".to_string()
    } else {
        session
            .mic_assignments
            .iter()
            .map(|(slot, name)| format!("mic {} = {}", slot + 1, name))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let winner_list = WinnerCategory::ALL
        .iter()
        .map(|c| format!("- \"{}\": the single best moment, with runner-ups", c.key()))
        .collect::<Vec<_>>()
        .join("\n");

    let ranked_list = RankedCategory::ALL
        .iter()
        .map(|c| format!("- \"{}\": a ranked list of exactly 5 entries", c.key()))
        .collect::<Vec<_>>()
        .join("\n");

    let questions = if discussion_questions.is_empty() {
        String::new()
    } else {
        format!(
            "\nDISCUSSION QUESTIONS THE GROUP WAS GIVEN:\n{}\n",
            discussion_questions
                .iter()
                .map(|q| format!("- {}", q))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    format!(
        r#"You are an entertainment editor reviewing a recorded group discussion.

PARTICIPANTS (microphone order, use these exact names): {roster}

TASK: Find the most entertainment-worthy highlights. Quote people verbatim from the transcript and report the timestamp in seconds where each quote occurs.

SINGLE-WINNER CATEGORIES:
{winner_list}

RANKED CATEGORIES:
{ranked_list}
{questions}
For every winner provide: "speaker", "quote", "timestamp" (seconds), "context" (what was being discussed), "reaction" (how the group responded), "score" (0-10), and "runner_ups" (up to 3, each with speaker/quote/timestamp/score).

For every ranked entry provide: "rank" (1-5), "speaker", "quote", "timestamp", "score", "reasoning".

Return ONLY a JSON object of the form:
{{
  "categories": {{
    "best_joke": {{ ... }},
    "hottest_take": {{ ... }},
    "most_boring_statement": {{ ... }},
    "funniest_sentences": [ ... ],
    "wildest_takes": [ ... ]
  }}
}}

TRANSCRIPT:
{transcript}
"#,
        roster = roster,
        winner_list = winner_list,
        ranked_list = ranked_list,
        questions = questions,
        transcript = transcript.text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    #[test]
    fn test_prompt_embeds_roster_categories_and_transcript() {
        let mut session = Session::new(
            "s1".to_string(),
            "Inception".to_string(),
            PathBuf::from("/tmp/s1"),
            Utc::now(),
        );
        session.mic_assignments.insert(0, "Alice".to_string());
        session.mic_assignments.insert(1, "Bob".to_string());

        let transcript = AggregatedTranscript {
            text: "Alice: it was great.".to_string(),
            used_master: true,
            truncated: false,
            skipped_files: vec![],
        };

        let prompt = build_prompt(
            &session,
            &transcript,
            &["Would it hold up today?".to_string()],
        );

        assert!(prompt.contains("mic 1 = Alice, mic 2 = Bob"));
        assert!(prompt.contains("\"best_joke\""));
        assert!(prompt.contains("\"funniest_sentences\""));
        assert!(prompt.contains("Would it hold up today?"));
        assert!(prompt.contains("Alice: it was great."));
    }

    #[test]
    fn test_questions_section_omitted_when_empty() {
        let session = Session::new(
            "s1".to_string(),
            "Heat".to_string(),
            PathBuf::from("/tmp/s1"),
            Utc::now(),
        );
        let transcript = AggregatedTranscript {
            text: "text".to_string(),
            used_master: false,
            truncated: false,
            skipped_files: vec![],
        };
        let prompt = build_prompt(&session, &transcript, &[]);
        assert!(!prompt.contains("DISCUSSION QUESTIONS"));
    }
}
