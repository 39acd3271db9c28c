// Analysis orchestration
//
// This module runs the LLM highlight-analysis pass over an aggregated
// transcript:
// - prompt: builds the category prompt
// - client: chat/completions call with rate-limit-aware retry and audit
//   records
// - parse: defense-in-depth response parsing (nested, then flat, then a
//   labeled degraded placeholder)

pub mod client;
pub mod parse;
pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub use client::LlmClient;
pub use parse::{parse_analysis, ParseOutcome};

use crate::aggregate::AggregatedTranscript;
use crate::clock::Clock;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::session::Session;

/// Single-winner entertainment categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WinnerCategory {
    BestJoke,
    HottestTake,
    MostBoringStatement,
}

impl WinnerCategory {
    pub const ALL: [WinnerCategory; 3] = [
        WinnerCategory::BestJoke,
        WinnerCategory::HottestTake,
        WinnerCategory::MostBoringStatement,
    ];

    /// Canonical snake_case key expected in responses.
    pub fn key(&self) -> &'static str {
        match self {
            WinnerCategory::BestJoke => "best_joke",
            WinnerCategory::HottestTake => "hottest_take",
            WinnerCategory::MostBoringStatement => "most_boring_statement",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            WinnerCategory::BestJoke => "Best Joke",
            WinnerCategory::HottestTake => "Hottest Take",
            WinnerCategory::MostBoringStatement => "Most Boring Statement",
        }
    }

    /// Words a title-like field must mention for heuristic matching when the
    /// response uses numeric or renamed keys.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            WinnerCategory::BestJoke => &["joke"],
            WinnerCategory::HottestTake => &["hot", "take"],
            WinnerCategory::MostBoringStatement => &["boring"],
        }
    }
}

/// Rank-ordered top-five categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankedCategory {
    FunniestSentences,
    WildestTakes,
}

impl RankedCategory {
    pub const ALL: [RankedCategory; 2] = [
        RankedCategory::FunniestSentences,
        RankedCategory::WildestTakes,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            RankedCategory::FunniestSentences => "funniest_sentences",
            RankedCategory::WildestTakes => "wildest_takes",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            RankedCategory::FunniestSentences => "Top 5 Funniest Sentences",
            RankedCategory::WildestTakes => "Top 5 Wildest Takes",
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            RankedCategory::FunniestSentences => &["funniest", "funny"],
            RankedCategory::WildestTakes => &["wildest", "wild"],
        }
    }
}

/// Runner-up entry attached to a category winner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerUp {
    pub speaker: String,
    pub quote: String,
    pub timestamp_secs: Option<f64>,
    pub score: Option<f64>,
}

/// The single best quote/moment for one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWinner {
    pub category: WinnerCategory,
    pub speaker: String,
    pub quote: String,
    pub timestamp_secs: Option<f64>,
    pub context: Option<String>,
    pub reaction: Option<String>,
    pub score: Option<f64>,
    pub runner_ups: Vec<RunnerUp>,
}

/// One entry of a rank-ordered list (rank 1..=5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopFiveEntry {
    pub rank: u8,
    pub speaker: String,
    pub quote: String,
    pub timestamp_secs: Option<f64>,
    pub score: Option<f64>,
    pub reasoning: Option<String>,
}

/// A rank-ordered set of up to five quotes for a comparative category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopFiveList {
    pub category: RankedCategory,
    pub entries: Vec<TopFiveEntry>,
}

/// Immutable-once-parsed analysis output; rerunning analysis replaces the
/// whole set atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub winners: Vec<CategoryWinner>,
    pub top_fives: Vec<TopFiveList>,
    /// True when both parsing strategies failed and this is the labeled
    /// placeholder set
    pub degraded: bool,
    pub degraded_reason: Option<String>,
}

impl AnalysisResults {
    /// Deterministic, clearly-labeled stand-in used when no usable analysis
    /// could be produced. Scores are zero, never fabricated.
    pub fn degraded_placeholder(reason: &str) -> Self {
        let winners = WinnerCategory::ALL
            .iter()
            .map(|category| CategoryWinner {
                category: *category,
                speaker: "Unknown".to_string(),
                quote: "analysis unavailable".to_string(),
                timestamp_secs: None,
                context: Some(reason.to_string()),
                reaction: None,
                score: Some(0.0),
                runner_ups: Vec::new(),
            })
            .collect();
        let top_fives = RankedCategory::ALL
            .iter()
            .map(|category| TopFiveList {
                category: *category,
                entries: Vec::new(),
            })
            .collect();
        Self {
            winners,
            top_fives,
            degraded: true,
            degraded_reason: Some(reason.to_string()),
        }
    }
}

/// Main trait for the highlight-analysis pass.
#[async_trait]
pub trait AnalyzerTrait: Send + Sync {
    /// Run one analysis pass for a session. The returned result set is
    /// complete: either fully parsed or the labeled degraded placeholder,
    /// never a partial merge.
    async fn analyze_session(
        &self,
        session: &Session,
        transcript: &AggregatedTranscript,
        audit_dir: &Path,
    ) -> Result<AnalysisResults>;
}

/// Factory for creating analyzer instances
pub struct AnalyzerFactory;

impl AnalyzerFactory {
    /// Create the default analyzer (chat/completions-backed)
    pub fn create_default(config: AnalysisConfig, clock: Arc<dyn Clock>) -> Box<dyn AnalyzerTrait> {
        Box::new(AnalysisOrchestrator::new(config, clock))
    }
}

/// Builds the prompt, calls the LLM, and defensively parses the response.
pub struct AnalysisOrchestrator {
    client: LlmClient,
    config: AnalysisConfig,
}

impl AnalysisOrchestrator {
    pub fn new(config: AnalysisConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: LlmClient::new(config.clone(), clock),
            config,
        }
    }
}

#[async_trait]
impl AnalyzerTrait for AnalysisOrchestrator {
    async fn analyze_session(
        &self,
        session: &Session,
        transcript: &AggregatedTranscript,
        audit_dir: &Path,
    ) -> Result<AnalysisResults> {
        let prompt = prompt::build_prompt(
            session,
            transcript,
            &self.config.discussion_questions,
        );

        let raw_response = self.client.complete(&prompt, audit_dir).await?;

        let mut results = match parse_analysis(&raw_response) {
            ParseOutcome::NestedOk(results) => {
                info!("Analysis parsed with the nested strategy");
                results
            }
            ParseOutcome::FlatOk(results) => {
                info!("Analysis parsed with the flat DTO strategy");
                results
            }
            ParseOutcome::Failed => {
                warn!("Both parsing strategies failed, returning degraded analysis");
                AnalysisResults::degraded_placeholder("response could not be parsed")
            }
        };

        // One centralized corrections pass over every speaker name.
        parse::apply_speaker_corrections(&mut results);
        Ok(results)
    }
}
