use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const GROQ_MODEL: &str = "llama-3.3-70b-versatile";
const MAX_ATTEMPTS: u32 = 3;

const SCORING_SYSTEM_PROMPT: &str = r#"You are an editor scoring entertainment columns for a daily ranking.
Score the article on three axes:
- quality_score (0-40): writing craft, structure, clarity
- originality_score (0-30): fresh perspective, personal insight
- entertainment_score (0-30): how fun it is to read
Also write ai_summary: a neutral teaser of at most 300 characters.
Respond with a single JSON object containing article_id, quality_score,
originality_score, entertainment_score and ai_summary. No other text."#;

const RETRY_SCORING_SYSTEM_PROMPT: &str = r#"You are a second, independent editor re-scoring an entertainment column.
Read closely and judge on its own merits; do not aim for average numbers.
Score quality_score (0-40), originality_score (0-30), entertainment_score (0-30)
and write ai_summary (at most 300 characters).
Respond with a single JSON object containing article_id, quality_score,
originality_score, entertainment_score and ai_summary. No other text."#;

/// What the scorer sends to the oracle for one article.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub article_id: String,
    pub title: String,
    pub author: String,
    pub category: String,
    pub preview: String,
}

/// Structured response as the oracle returned it, before validation.
/// Everything is optional; validation decides what is fatal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawScore {
    pub article_id: Option<String>,
    pub quality_score: Option<i64>,
    pub originality_score: Option<i64>,
    pub entertainment_score: Option<i64>,
    #[allow(dead_code)]
    pub total_score: Option<i64>,
    pub ai_summary: Option<String>,
}

/// External scoring service. `rescore` is used when a result repeats a
/// recent score pattern and the queue wants an independent second opinion.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn score(&self, request: &ScoreRequest) -> Result<RawScore>;
    async fn rescore(&self, request: &ScoreRequest) -> Result<RawScore>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

pub struct GroqOracle {
    client: Client,
    api_key: String,
}

impl GroqOracle {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, api_key }
    }

    fn user_prompt(request: &ScoreRequest) -> String {
        format!(
            "article_id: {}\nCategory: {}\nTitle: {}\nAuthor: {}\n\nArticle text:\n{}",
            request.article_id, request.category, request.title, request.author, request.preview
        )
    }

    async fn complete(&self, system_prompt: &str, request: &ScoreRequest, temperature: f32) -> Result<RawScore> {
        let body = ChatRequest {
            model: GROQ_MODEL.to_string(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: Self::user_prompt(request),
                },
            ],
            max_tokens: 1000,
            temperature,
            top_p: 0.9,
        };

        let mut last_error = String::new();

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                // Exponential back-off between transport retries
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }

            let response = match self
                .client
                .post(GROQ_API_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Scoring API call failed (attempt {}): {e}", attempt + 1);
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                tracing::warn!("Scoring API returned {status} (attempt {})", attempt + 1);
                last_error = format!("HTTP {status}");
                continue;
            }
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                return Err(AppError::Oracle(format!("API error: {error_text}")));
            }

            let chat: ChatResponse = response
                .json()
                .await
                .map_err(|e| AppError::Oracle(format!("unreadable API response: {e}")))?;

            let content = chat
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .unwrap_or_default();

            return parse_score_content(&content);
        }

        Err(AppError::Oracle(format!(
            "scoring call failed after {MAX_ATTEMPTS} attempts: {last_error}"
        )))
    }
}

#[async_trait]
impl ScoringOracle for GroqOracle {
    async fn score(&self, request: &ScoreRequest) -> Result<RawScore> {
        self.complete(SCORING_SYSTEM_PROMPT, request, 0.3).await
    }

    async fn rescore(&self, request: &ScoreRequest) -> Result<RawScore> {
        // Higher temperature to break out of the repeated pattern
        self.complete(RETRY_SCORING_SYSTEM_PROMPT, request, 0.7).await
    }
}

/// Pull the JSON object out of the completion text; models pad it with
/// prose more often than not.
fn parse_score_content(content: &str) -> Result<RawScore> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => {
            return Err(AppError::Validation(
                "no JSON object in oracle response".to_string(),
            ))
        }
    };

    serde_json::from_str(json)
        .map_err(|e| AppError::Validation(format!("malformed oracle JSON: {e}")))
}
