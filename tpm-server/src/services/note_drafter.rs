//! LLM-assisted drafting of session note sections
//!
//! The drafter receives the note format, the sections written so far and
//! the clinician's instruction, and returns text for one section. The
//! shipped implementation talks to any `/v1/chat/completions` endpoint.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tpm_common::config::LlmConfig;
use tracing::{debug, error};

use crate::db::notes::{NoteContent, NoteFormat};

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned no text")]
    EmptyResponse,
}

#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub format: NoteFormat,
    pub section: String,
    pub content: NoteContent,
    pub prompt: String,
}

#[async_trait]
pub trait NoteDrafter: Send + Sync {
    async fn draft(&self, request: &DraftRequest) -> Result<String, DraftError>;
}

const SYSTEM_PROMPT: &str = "You help licensed therapists write clinical session notes. \
     Write only the requested section, in professional clinical language, without \
     headings. Do not invent facts that the clinician did not provide.";

/// Render the user message sent to the model
pub fn build_user_message(request: &DraftRequest) -> String {
    let mut message = String::new();
    let _ = writeln!(
        message,
        "Note format: {}. Write the '{}' section.",
        request.format.as_str().to_uppercase(),
        request.section
    );

    let written: Vec<_> = request
        .format
        .sections()
        .iter()
        .filter(|key| **key != request.section)
        .filter_map(|key| request.content.get(*key).map(|text| (key, text)))
        .collect();
    if !written.is_empty() {
        let _ = writeln!(message, "\nSections written so far:");
        for (key, text) in written {
            let _ = writeln!(message, "[{}]\n{}", key, text);
        }
    }

    let _ = write!(message, "\nClinician's instruction:\n{}", request.prompt.trim());
    message
}

/// Drafter for any OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleDrafter {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAiCompatibleDrafter {
    pub fn from_config(config: &LlmConfig) -> Result<Self, DraftError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DraftError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: config.api_key(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl NoteDrafter for OpenAiCompatibleDrafter {
    async fn draft(&self, request: &DraftRequest) -> Result<String, DraftError> {
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message { role: "system", content: SYSTEM_PROMPT.to_string() },
                Message { role: "user", content: build_user_message(request) },
            ],
            temperature: self.temperature,
        };

        debug!(model = %self.model, section = %request.section, "Sending note draft request");

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM request failed (transport)");
            DraftError::Request(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "LLM endpoint returned an error");
            return Err(DraftError::Request(format!("HTTP {status}: {body}")));
        }

        let parsed = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| DraftError::Request(format!("failed to parse response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(DraftError::EmptyResponse)
    }
}

/// Drafter that echoes the instruction back; for tests and offline demos
#[derive(Debug, Clone, Default)]
pub struct EchoDrafter;

#[async_trait]
impl NoteDrafter for EchoDrafter {
    async fn draft(&self, request: &DraftRequest) -> Result<String, DraftError> {
        Ok(format!("[draft:{}] {}", request.section, request.prompt.trim()))
    }
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DraftRequest {
        let mut content = NoteContent::new();
        content.insert("subjective".to_string(), "Reports poor sleep".to_string());
        content.insert("plan".to_string(), "old plan".to_string());
        DraftRequest {
            format: NoteFormat::Soap,
            section: "plan".to_string(),
            content,
            prompt: "  Weekly CBT, sleep hygiene  ".to_string(),
        }
    }

    #[test]
    fn test_user_message_includes_context_but_not_target_section() {
        let message = build_user_message(&request());
        assert!(message.starts_with("Note format: SOAP. Write the 'plan' section."));
        assert!(message.contains("[subjective]\nReports poor sleep"));
        assert!(!message.contains("old plan"));
        assert!(message.ends_with("Weekly CBT, sleep hygiene"));
    }

    #[tokio::test]
    async fn test_echo_drafter() {
        let text = EchoDrafter.draft(&request()).await.unwrap();
        assert_eq!(text, "[draft:plan] Weekly CBT, sleep hygiene");
    }

    #[test]
    fn test_response_parsing() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" Continue weekly. "}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some(" Continue weekly. "));
    }
}
