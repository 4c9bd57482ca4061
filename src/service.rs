//! OpenAI-compatible chat-completions client for diagnosis.
//!
//! Defaults target Groq. The model is asked for JSON only; the answer's
//! outermost object is parsed into a [`Diagnosis`].

use crate::config::ServiceConfig;
use crate::diagnosis::{Diagnosis, ReasoningService, ServiceError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const SYSTEM_PROMPT: &str = r#"You are an expert at debugging programs.

RULES:
1. Answer with valid JSON ONLY.
2. Give PRECISE corrections with line numbers.
3. Propose ONLY the corrections that are needed.
4. Explain WHY the error happens.

JSON FORMAT:
{
  "type_erreur": "exception name",
  "ligne_erreur": number,
  "cause": "explanation",
  "corrections": [
    {
      "ligne": number,
      "code_original": "current code",
      "code_corrige": "corrected code",
      "explication": "why this correction"
    }
  ],
  "conseil": "general advice"
}

IMPORTANT for code_corrige:
- Give ONLY the corrected line, not a whole block
- Keep the same indentation as the original line
- For a division by zero, replace "x / y" with "x / y if y != 0 else 0"
- Be MINIMAL, replace only what causes the error"#;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// Build the user message for one diagnosis request.
pub fn build_user_prompt(code: &str, error: &str, filename: &str) -> String {
    format!(
        "Analyze this error.\n\n\
         FILE: {filename}\n\n\
         CODE:\n```\n{code}\n```\n\n\
         ERROR:\n```\n{error}\n```\n\n\
         Answer in JSON only."
    )
}

/// Blocking chat-completions client.
#[derive(Debug)]
pub struct ChatCompletionsClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

impl ChatCompletionsClient {
    /// Build a client from config, reading the API key from the environment
    /// variable the config names.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::Auth(format!("environment variable {} is not set", config.api_key_env))
            })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &ServiceConfig, api_key: impl Into<String>) -> Result<Self, ServiceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, system: &str, user: &str) -> Result<String, ServiceError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ServiceError::Malformed(format!("unexpected response shape: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ServiceError::Malformed("response has no message content".to_string()))
    }
}

/// Map an HTTP error status to a service error.
pub fn classify_status(status: u16, body: &str) -> ServiceError {
    let detail = truncate(body.trim(), 300);
    match status {
        401 | 403 => ServiceError::Auth(format!("HTTP {status}: {detail}")),
        429 => ServiceError::Quota(format!("HTTP {status}: {detail}")),
        _ => ServiceError::Transport(format!("HTTP {status}: {detail}")),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let snippet: String = s.chars().take(max).collect();
        format!("{snippet}…")
    }
}

impl ReasoningService for ChatCompletionsClient {
    fn analyze(&self, code: &str, error: &str, filename: &str) -> Result<Diagnosis, ServiceError> {
        info!(model = %self.model, file = filename, "requesting diagnosis");
        let content = self.complete(SYSTEM_PROMPT, &build_user_prompt(code, error, filename))?;
        debug!(len = content.len(), "diagnosis received");
        Diagnosis::from_response_text(&content)
    }
}
