//! Cluster titles.
//!
//! A title is three underscore-joined words naming the theme shared by a
//! cluster's most central members, generated by an LLM behind an
//! OpenAI-compatible chat-completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Words sent to the title generator per cluster.
pub const PROMPT_WORDS: usize = 45;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that generates concise category titles.";

#[async_trait]
pub trait TitleGenerator: Send + Sync {
    /// Produces a sanitised title for the given representative words.
    async fn generate(&self, words: &[String]) -> AppResult<String>;
}

/// Replaces spaces with underscores and drops everything that is not
/// alphanumeric or `_`.
pub fn sanitize_title(raw: &str) -> String {
    raw.trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Title used when generation fails: `Cluster_` plus the first three words.
pub fn fallback_title(words: &[String]) -> String {
    let mut title = String::from("Cluster");
    for word in words.iter().take(3) {
        title.push('_');
        title.push_str(word);
    }
    title
}

fn build_prompt(words: &[String]) -> String {
    let words_string = words
        .iter()
        .take(PROMPT_WORDS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are an expert linguist analyzing word clusters.\n\
         Given the following related words: {words_string}\n\n\
         Generate EXACTLY 3 words (separated by underscores) that best describe the common theme or category of these words.\n\
         The title should be concise, descriptive, and capture the semantic essence.\n\n\
         Examples:\n\
         - If words are: doctor, nurse, hospital, medicine → Medical_Health_Care\n\
         - If words are: computer, software, programming, code → Technology_Computing_Software\n\
         - If words are: happy, joy, excited, cheerful → Positive_Emotions_Feelings\n\n\
         Respond with ONLY the 3-word title, nothing else."
    )
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

/// Title generator backed by a chat-completions API.
pub struct LlmTitleGenerator {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl LlmTitleGenerator {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.llm_api_url.clone(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            max_retries: config.llm_max_retries.max(1),
            retry_delay: Duration::from_secs(config.llm_retry_delay_secs),
        })
    }

    pub fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn request_title(&self, prompt: &str) -> AppResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: 20,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "LLM API returned {status}: {message}"
            )));
        }

        let data: ChatResponse = response.json().await?;
        let raw = data
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        let title = sanitize_title(&raw);
        if title.is_empty() {
            return Err(AppError::Internal(format!(
                "LLM API returned an unusable title: {raw:?}"
            )));
        }
        Ok(title)
    }
}

#[async_trait]
impl TitleGenerator for LlmTitleGenerator {
    async fn generate(&self, words: &[String]) -> AppResult<String> {
        if !self.is_available() {
            return Err(AppError::Internal(
                "AVALAI_API_KEY is not configured".to_string(),
            ));
        }

        let prompt = build_prompt(words);
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.request_title(&prompt).await {
                Ok(title) => return Ok(title),
                Err(e) => {
                    tracing::warn!(attempt, max = self.max_retries, error = %e, "Title generation failed");
                    last_error = Some(e);
                }
            }
            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::Internal("Title generation was not attempted".to_string())))
    }
}
