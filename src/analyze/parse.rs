use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{
    AnalysisResults, CategoryWinner, RankedCategory, RunnerUp, TopFiveEntry, TopFiveList,
    WinnerCategory,
};

/// Fixed corrections for recurring transcription mis-hearings of participant
/// names. Applied in one centralized pass over the whole result set.
const SPEAKER_CORRECTIONS: &[(&str, &str)] = &[
    ("micheal", "Michael"),
    ("mikael", "Michael"),
    ("jonh", "John"),
    ("jon", "John"),
    ("kris", "Chris"),
    ("kristopher", "Christopher"),
    ("sara", "Sarah"),
    ("megan", "Meghan"),
    ("eric", "Erik"),
];

/// Outcome of the two-strategy response parse. Explicit sum type instead of
/// reflection-style guessing.
#[derive(Debug)]
pub enum ParseOutcome {
    NestedOk(AnalysisResults),
    FlatOk(AnalysisResults),
    Failed,
}

/// Parse an LLM response defensively: nested structure first (tolerating
/// alternate key names and numeric keys), then the strict flat DTO shape.
pub fn parse_analysis(content: &str) -> ParseOutcome {
    let cleaned = remove_markdown_code_blocks(content);
    let candidates = json_candidates(&cleaned);

    for candidate in &candidates {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if let Some(results) = parse_nested(&value) {
                return ParseOutcome::NestedOk(results);
            }
        }
    }

    for candidate in &candidates {
        if let Ok(dto) = serde_json::from_str::<FlatDto>(candidate) {
            return ParseOutcome::FlatOk(dto.into_results());
        }
    }

    ParseOutcome::Failed
}

/// Candidate JSON texts to attempt, most specific first: the cleaned text
/// itself, then the first-{ to last-} substring when it differs.
fn json_candidates(text: &str) -> Vec<String> {
    let mut candidates = vec![text.to_string()];
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            let inner = &text[start..=end];
            if inner != text {
                candidates.push(inner.to_string());
            }
        }
    }
    candidates
}

/// Strip common markdown code fences from model output.
fn remove_markdown_code_blocks(text: &str) -> String {
    let text = text.trim();

    if text.starts_with("```json") && text.ends_with("```") {
        return text[7..text.len() - 3].trim().to_string();
    }
    if text.starts_with("```") && text.ends_with("```") && text.len() > 6 {
        return text[3..text.len() - 3].trim().to_string();
    }
    if text.starts_with('`') && text.ends_with('`') && text.len() > 2 {
        return text[1..text.len() - 1].trim().to_string();
    }

    text.to_string()
}

// ---------------------------------------------------------------------------
// Nested strategy
// ---------------------------------------------------------------------------

/// Walk the response as a loose tree: categories may live under a wrapper
/// key, be keyed by canonical names, renamed, or numbered, in which case a
/// title-like field is matched against the category's keywords.
fn parse_nested(value: &Value) -> Option<AnalysisResults> {
    let container = ["categories", "results", "analysis", "sections"]
        .iter()
        .find_map(|key| value.get(key))
        .unwrap_or(value);
    if !container.is_object() {
        return None;
    }

    let mut winners = Vec::new();
    for category in WinnerCategory::ALL {
        if let Some(entry) = find_category_value(container, category.key(), category.keywords()) {
            if let Some(winner) = parse_winner(category, entry) {
                winners.push(winner);
            }
        }
    }

    let mut top_fives = Vec::new();
    for category in RankedCategory::ALL {
        if let Some(entry) = find_category_value(container, category.key(), category.keywords()) {
            let entries = parse_ranked_entries(entry);
            if !entries.is_empty() {
                top_fives.push(TopFiveList { category, entries });
            }
        }
    }

    if winners.is_empty() && top_fives.is_empty() {
        debug!("Nested strategy recovered nothing");
        return None;
    }

    Some(AnalysisResults {
        winners,
        top_fives,
        degraded: false,
        degraded_reason: None,
    })
}

/// Locate one category's value: direct key match (snake_case, spaced, or
/// case-insensitive), then content-based heuristic over all entries,
/// including numerically-keyed ones.
fn find_category_value<'a>(container: &'a Value, key: &str, keywords: &[&str]) -> Option<&'a Value> {
    let object = container.as_object()?;

    if let Some(direct) = object.get(key) {
        return Some(direct);
    }
    let spaced = key.replace('_', " ");
    for (k, v) in object {
        let normalized = k.to_lowercase().replace(['_', '-'], " ");
        if normalized == spaced {
            return Some(v);
        }
    }

    // Numeric or renamed keys: match by what the object says it is.
    for v in object.values() {
        if title_mentions_keywords(v, keywords) {
            return Some(v);
        }
    }
    None
}

/// Does this object's title-like field mention every expected keyword?
fn title_mentions_keywords(value: &Value, keywords: &[&str]) -> bool {
    let title = ["category", "title", "name", "label"]
        .iter()
        .find_map(|field| value.get(field).and_then(|v| v.as_str()));
    match title {
        Some(title) => {
            let lowered = title.to_lowercase();
            keywords.iter().all(|kw| lowered.contains(kw))
        }
        None => false,
    }
}

fn parse_winner(category: WinnerCategory, value: &Value) -> Option<CategoryWinner> {
    let speaker = get_str(value, &["speaker", "winner", "person", "name"])?;
    let quote = get_str(value, &["quote", "text", "line", "statement"])?;

    let runner_ups = value
        .get("runner_ups")
        .or_else(|| value.get("runners_up"))
        .or_else(|| value.get("runnerups"))
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(RunnerUp {
                        speaker: get_str(item, &["speaker", "person", "name"])?,
                        quote: get_str(item, &["quote", "text", "line"])?,
                        timestamp_secs: get_timestamp(item),
                        score: get_score(item),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(CategoryWinner {
        category,
        speaker,
        quote,
        timestamp_secs: get_timestamp(value),
        context: get_str(value, &["context", "supporting_context", "setup"]),
        reaction: get_str(value, &["reaction", "group_reaction", "response"]),
        score: get_score(value),
        runner_ups,
    })
}

/// Ranked entries may arrive as an array, as an object with an `entries`
/// array, or as an object keyed "1".."5".
fn parse_ranked_entries(value: &Value) -> Vec<TopFiveEntry> {
    let items: Vec<&Value> = if let Some(array) = value.as_array() {
        array.iter().collect()
    } else if let Some(array) = value.get("entries").and_then(|v| v.as_array()) {
        array.iter().collect()
    } else if let Some(object) = value.as_object() {
        let mut keyed: Vec<(u8, &Value)> = object
            .iter()
            .filter_map(|(k, v)| k.parse::<u8>().ok().map(|rank| (rank, v)))
            .collect();
        keyed.sort_by_key(|(rank, _)| *rank);
        keyed.into_iter().map(|(_, v)| v).collect()
    } else {
        Vec::new()
    };

    let mut entries: Vec<TopFiveEntry> = items
        .into_iter()
        .filter_map(|item| {
            Some(TopFiveEntry {
                rank: 0, // assigned below
                speaker: get_str(item, &["speaker", "person", "name"])?,
                quote: get_str(item, &["quote", "text", "line", "sentence"])?,
                timestamp_secs: get_timestamp(item),
                score: get_score(item),
                reasoning: get_str(item, &["reasoning", "reason", "why"]),
            })
        })
        .take(5)
        .collect();

    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.rank = (idx + 1) as u8;
    }
    entries
}

fn get_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Timestamps arrive as numbers, numeric strings, or clock strings
/// ("MM:SS", "HH:MM:SS").
fn get_timestamp(value: &Value) -> Option<f64> {
    let raw = ["timestamp", "timestamp_seconds", "time", "start"]
        .iter()
        .find_map(|key| value.get(key))?;

    if let Some(n) = raw.as_f64() {
        return Some(n);
    }
    let text = raw.as_str()?.trim();
    if let Ok(n) = text.parse::<f64>() {
        return Some(n);
    }

    let parts: Vec<&str> = text.split(':').collect();
    let nums: Vec<f64> = parts
        .iter()
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match nums.as_slice() {
        [m, s] => Some(m * 60.0 + s),
        [h, m, s] => Some(h * 3600.0 + m * 60.0 + s),
        _ => None,
    }
}

fn get_score(value: &Value) -> Option<f64> {
    let raw = ["score", "rating"].iter().find_map(|key| value.get(key))?;
    raw.as_f64()
        .or_else(|| raw.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

// ---------------------------------------------------------------------------
// Flat strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FlatRunnerUp {
    speaker: String,
    quote: String,
    timestamp: Option<f64>,
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FlatWinner {
    speaker: String,
    quote: String,
    timestamp: Option<f64>,
    context: Option<String>,
    reaction: Option<String>,
    score: Option<f64>,
    #[serde(default)]
    runner_ups: Vec<FlatRunnerUp>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    rank: Option<u8>,
    speaker: String,
    quote: String,
    timestamp: Option<f64>,
    score: Option<f64>,
    reasoning: Option<String>,
}

/// The strict flat DTO shape attempted after the nested walk yields nothing.
#[derive(Debug, Deserialize)]
struct FlatDto {
    best_joke: FlatWinner,
    hottest_take: FlatWinner,
    most_boring_statement: FlatWinner,
    #[serde(default)]
    funniest_sentences: Vec<FlatEntry>,
    #[serde(default)]
    wildest_takes: Vec<FlatEntry>,
}

impl FlatDto {
    fn into_results(self) -> AnalysisResults {
        let winners = vec![
            flat_winner(WinnerCategory::BestJoke, self.best_joke),
            flat_winner(WinnerCategory::HottestTake, self.hottest_take),
            flat_winner(WinnerCategory::MostBoringStatement, self.most_boring_statement),
        ];
        let top_fives = vec![
            flat_list(RankedCategory::FunniestSentences, self.funniest_sentences),
            flat_list(RankedCategory::WildestTakes, self.wildest_takes),
        ];
        AnalysisResults {
            winners,
            top_fives,
            degraded: false,
            degraded_reason: None,
        }
    }
}

fn flat_winner(category: WinnerCategory, w: FlatWinner) -> CategoryWinner {
    CategoryWinner {
        category,
        speaker: w.speaker,
        quote: w.quote,
        timestamp_secs: w.timestamp,
        context: w.context,
        reaction: w.reaction,
        score: w.score,
        runner_ups: w
            .runner_ups
            .into_iter()
            .map(|r| RunnerUp {
                speaker: r.speaker,
                quote: r.quote,
                timestamp_secs: r.timestamp,
                score: r.score,
            })
            .collect(),
    }
}

fn flat_list(category: RankedCategory, entries: Vec<FlatEntry>) -> TopFiveList {
    let entries = entries
        .into_iter()
        .take(5)
        .enumerate()
        .map(|(idx, e)| TopFiveEntry {
            rank: e.rank.unwrap_or((idx + 1) as u8),
            speaker: e.speaker,
            quote: e.quote,
            timestamp_secs: e.timestamp,
            score: e.score,
            reasoning: e.reasoning,
        })
        .collect();
    TopFiveList { category, entries }
}

// ---------------------------------------------------------------------------
// Speaker-name corrections
// ---------------------------------------------------------------------------

fn correct_name(name: &str) -> String {
    let trimmed = name.trim();
    let lowered = trimmed.to_lowercase();
    for (wrong, right) in SPEAKER_CORRECTIONS {
        if lowered == *wrong {
            return right.to_string();
        }
    }
    trimmed.to_string()
}

/// Apply the corrections table uniformly across every category winner, every
/// runner-up, and every top-five entry.
pub fn apply_speaker_corrections(results: &mut AnalysisResults) {
    for winner in &mut results.winners {
        winner.speaker = correct_name(&winner.speaker);
        for runner_up in &mut winner.runner_ups {
            runner_up.speaker = correct_name(&runner_up.speaker);
        }
    }
    for list in &mut results.top_fives {
        for entry in &mut list.entries {
            entry.speaker = correct_name(&entry.speaker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn winner_json(speaker: &str, quote: &str) -> Value {
        json!({
            "speaker": speaker,
            "quote": quote,
            "timestamp": 125.5,
            "context": "mid discussion",
            "reaction": "laughter",
            "score": 8.5,
            "runner_ups": [
                {"speaker": "Bob", "quote": "second best", "timestamp": 200.0, "score": 7.0}
            ]
        })
    }

    #[test]
    fn test_nested_with_canonical_keys() {
        let response = json!({
            "categories": {
                "best_joke": winner_json("Alice", "that one"),
                "hottest_take": winner_json("Bob", "spicy"),
                "most_boring_statement": winner_json("Carol", "meh"),
                "funniest_sentences": [
                    {"speaker": "Alice", "quote": "ha", "timestamp": 10.0, "score": 9.0, "reasoning": "timing"}
                ]
            }
        })
        .to_string();

        match parse_analysis(&response) {
            ParseOutcome::NestedOk(results) => {
                assert_eq!(results.winners.len(), 3);
                assert_eq!(results.winners[0].speaker, "Alice");
                assert_eq!(results.winners[0].runner_ups.len(), 1);
                assert_eq!(results.top_fives.len(), 1);
                assert_eq!(results.top_fives[0].entries[0].rank, 1);
                assert!(!results.degraded);
            }
            other => panic!("expected NestedOk, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_with_numeric_keys_recovers_by_title() {
        let response = json!({
            "categories": {
                "1": {
                    "title": "Best Joke of the Night",
                    "speaker": "Alice",
                    "quote": "the joke",
                    "timestamp": "2:05",
                    "score": 9
                },
                "2": {
                    "title": "Hottest Take",
                    "speaker": "Bob",
                    "quote": "the take",
                    "timestamp": 61
                }
            }
        })
        .to_string();

        match parse_analysis(&response) {
            ParseOutcome::NestedOk(results) => {
                let joke = results
                    .winners
                    .iter()
                    .find(|w| w.category == WinnerCategory::BestJoke)
                    .unwrap();
                assert_eq!(joke.speaker, "Alice");
                assert_eq!(joke.timestamp_secs, Some(125.0));
                let take = results
                    .winners
                    .iter()
                    .find(|w| w.category == WinnerCategory::HottestTake)
                    .unwrap();
                assert_eq!(take.speaker, "Bob");
            }
            other => panic!("expected NestedOk, got {:?}", other),
        }
    }

    #[test]
    fn test_markdown_fenced_response_is_parsed() {
        let inner = json!({
            "categories": { "best_joke": winner_json("Alice", "ha") }
        });
        let response = format!("```json\n{}\n```", inner);
        assert!(matches!(
            parse_analysis(&response),
            ParseOutcome::NestedOk(_)
        ));
    }

    #[test]
    fn test_json_embedded_in_prose_is_extracted() {
        let inner = json!({
            "categories": { "best_joke": winner_json("Alice", "ha") }
        });
        let response = format!("Here are the results:\n{}\nHope that helps!", inner);
        assert!(matches!(
            parse_analysis(&response),
            ParseOutcome::NestedOk(_)
        ));
    }

    #[test]
    fn test_flat_fallback_when_no_wrapper() {
        let response = json!({
            "best_joke": {"speaker": "Alice", "quote": "ha", "timestamp": 5.0},
            "hottest_take": {"speaker": "Bob", "quote": "spice", "timestamp": 6.0},
            "most_boring_statement": {"speaker": "Carol", "quote": "zzz", "timestamp": 7.0},
            "funniest_sentences": [],
            "wildest_takes": []
        })
        .to_string();

        // Canonical keys at the root are still found by the nested walk
        // (container falls back to the root object); the flat DTO is the
        // backstop for shapes the walk cannot interpret.
        match parse_analysis(&response) {
            ParseOutcome::NestedOk(r) | ParseOutcome::FlatOk(r) => {
                assert_eq!(r.winners.len(), 3);
            }
            ParseOutcome::Failed => panic!("expected a successful parse"),
        }
    }

    #[test]
    fn test_unparseable_response_fails() {
        assert!(matches!(parse_analysis("total nonsense"), ParseOutcome::Failed));
        assert!(matches!(
            parse_analysis("{\"weather\": \"sunny\"}"),
            ParseOutcome::Failed
        ));
    }

    #[test]
    fn test_clock_string_timestamps() {
        let v = json!({"timestamp": "1:02:03"});
        assert_eq!(get_timestamp(&v), Some(3723.0));
        let v = json!({"timestamp": "2:05"});
        assert_eq!(get_timestamp(&v), Some(125.0));
        let v = json!({"timestamp": "95.5"});
        assert_eq!(get_timestamp(&v), Some(95.5));
        let v = json!({"timestamp": 42});
        assert_eq!(get_timestamp(&v), Some(42.0));
    }

    #[test]
    fn test_corrections_applied_across_all_result_parts() {
        let mut results = AnalysisResults {
            winners: vec![CategoryWinner {
                category: WinnerCategory::BestJoke,
                speaker: "micheal".to_string(),
                quote: "q".to_string(),
                timestamp_secs: None,
                context: None,
                reaction: None,
                score: None,
                runner_ups: vec![RunnerUp {
                    speaker: "sara".to_string(),
                    quote: "r".to_string(),
                    timestamp_secs: None,
                    score: None,
                }],
            }],
            top_fives: vec![TopFiveList {
                category: RankedCategory::FunniestSentences,
                entries: vec![TopFiveEntry {
                    rank: 1,
                    speaker: "jon".to_string(),
                    quote: "e".to_string(),
                    timestamp_secs: None,
                    score: None,
                    reasoning: None,
                }],
            }],
            degraded: false,
            degraded_reason: None,
        };

        apply_speaker_corrections(&mut results);
        assert_eq!(results.winners[0].speaker, "Michael");
        assert_eq!(results.winners[0].runner_ups[0].speaker, "Sarah");
        assert_eq!(results.top_fives[0].entries[0].speaker, "John");
    }

    #[test]
    fn test_degraded_placeholder_is_deterministic_and_labeled() {
        let a = AnalysisResults::degraded_placeholder("nothing parsed");
        let b = AnalysisResults::degraded_placeholder("nothing parsed");
        assert!(a.degraded);
        assert_eq!(a.winners.len(), WinnerCategory::ALL.len());
        for (wa, wb) in a.winners.iter().zip(b.winners.iter()) {
            assert_eq!(wa.score, wb.score);
            assert_eq!(wa.quote, wb.quote);
            assert_eq!(wa.quote, "analysis unavailable");
            assert_eq!(wa.score, Some(0.0));
        }
    }
}
