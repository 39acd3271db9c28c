use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::AnalysisConfig;
use crate::error::{Result, ClipForgeError};

/// System role fixed for every analysis call.
const SYSTEM_PROMPT: &str =
    "You are a precise entertainment editor. You only answer with valid JSON.";

/// Rate-limit retries are allowed more attempts than other transients since
/// they resolve on their own.
const RATE_LIMIT_MAX_RETRIES: u32 = 6;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Client for the chat/completions-style LLM service.
pub struct LlmClient {
    client: reqwest::Client,
    config: AnalysisConfig,
    clock: Arc<dyn Clock>,
}

impl LlmClient {
    pub fn new(config: AnalysisConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            clock,
        }
    }

    /// Send one completion request with retry, returning the first choice's
    /// message content. Also writes a timestamped audit record with the full
    /// prompt and raw response next to the session artifacts.
    pub async fn complete(&self, prompt: &str, audit_dir: &Path) -> Result<String> {
        let mut rate_limit_attempts = 0;
        let mut transient_attempts = 0;

        loop {
            match self.complete_once(prompt).await {
                Ok(content) => {
                    self.write_audit_record(audit_dir, prompt, &content)?;
                    return Ok(content);
                }
                Err(ClipForgeError::RateLimited(detail))
                    if rate_limit_attempts < RATE_LIMIT_MAX_RETRIES =>
                {
                    rate_limit_attempts += 1;
                    let delay = Duration::from_secs(
                        self.config.retry_base_delay_secs << (rate_limit_attempts - 1),
                    );
                    warn!(
                        "Rate limited ({}), backing off {:?} (attempt {})",
                        detail, delay, rate_limit_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() && transient_attempts + 1 < self.config.max_retries => {
                    transient_attempts += 1;
                    let delay = Duration::from_secs(
                        self.config.retry_base_delay_secs << (transient_attempts - 1),
                    );
                    warn!(
                        "LLM call failed ({}), retrying in {:?} (attempt {})",
                        e, delay, transient_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn complete_once(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.7
        });

        debug!("Sending analysis request ({} prompt chars)", prompt.len());
        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.endpoint.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(ClipForgeError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClipForgeError::Analysis(format!(
                "LLM call failed with {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                ClipForgeError::Analysis("LLM response contained no choices".to_string())
            })?;
        Ok(content)
    }

    /// Persist `openai_analysis_{timestamp}.json` with the full prompt and
    /// raw response for later review.
    fn write_audit_record(&self, audit_dir: &Path, prompt: &str, response: &str) -> Result<()> {
        std::fs::create_dir_all(audit_dir)?;
        let timestamp = self.clock.now().format("%Y%m%d_%H%M%S");
        let path = audit_dir.join(format!("openai_analysis_{}.json", timestamp));

        let record = serde_json::json!({
            "timestamp": self.clock.now().to_rfc3339(),
            "model": self.config.model,
            "prompt": prompt,
            "response": response,
        });
        std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        info!("Wrote analysis audit record {}", path.display());
        Ok(())
    }
}
