use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::BrainConfig;

pub const APOLOGY: &str = "Desculpe, tive um problema para pensar agora.";
pub const NOT_READY: &str = "Erro: Cérebro não inicializado.";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_HISTORY: usize = 40;

/// Conversational AI. Never fails: problems come back as an apology line.
pub trait Brain: Send + Sync {
    fn process(&self, text: &str) -> String;

    /// Replace the personality prompt and start a fresh conversation.
    fn configure(&self, _instruction: &str) {}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn new(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    system_instruction: Content,
    contents: &'a [Content],
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// First non-empty text of the first candidate.
fn extract_text(response: GenerateResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Gemini chat session over the REST API.
///
/// `process` is called from the main loop thread, so requests are driven to
/// completion with the runtime handle instead of being awaited.
pub struct GeminiBrain {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    instruction: Mutex<String>,
    history: Mutex<Vec<Content>>,
    runtime: tokio::runtime::Handle,
}

impl GeminiBrain {
    pub fn new(config: &BrainConfig, runtime: tokio::runtime::Handle) -> Self {
        if config.api_key.is_none() {
            warn!("no Gemini API key configured, conversation is disabled");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            instruction: Mutex::new(config.system_instruction.clone()),
            history: Mutex::new(Vec::new()),
            runtime,
        }
    }

    async fn generate(&self, api_key: &str, instruction: String, contents: Vec<Content>) -> Result<String> {
        let url = format!("{API_BASE}/models/{}:generateContent", self.model);
        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: instruction }],
            },
            contents: &contents,
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .context("request to Gemini failed")?
            .error_for_status()
            .context("Gemini rejected the request")?;

        let body: GenerateResponse = response.json().await.context("unreadable Gemini response")?;
        extract_text(body).ok_or_else(|| anyhow!("Gemini returned no text"))
    }
}

impl Brain for GeminiBrain {
    fn process(&self, text: &str) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            return NOT_READY.to_string();
        };

        let instruction = self.instruction.lock().map(|i| i.clone()).unwrap_or_default();
        let mut contents = self.history.lock().map(|h| h.clone()).unwrap_or_default();
        contents.push(Content::new("user", text));

        match self.runtime.block_on(self.generate(api_key, instruction, contents)) {
            Ok(reply) => {
                debug!(%text, %reply, "brain replied");
                if let Ok(mut history) = self.history.lock() {
                    history.push(Content::new("user", text));
                    history.push(Content::new("model", &reply));
                    let excess = history.len().saturating_sub(MAX_HISTORY);
                    history.drain(..excess);
                }
                reply
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "brain error");
                APOLOGY.to_string()
            }
        }
    }

    fn configure(&self, instruction: &str) {
        if let Ok(mut current) = self.instruction.lock() {
            *current = instruction.to_string();
        }
        if let Ok(mut history) = self.history.lock() {
            history.clear();
        }
        info!(model = %self.model, "brain configured");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_candidate_text() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Olá! "},{"text":"Vamos brincar?"}]}},
                              {"content":{"parts":[{"text":"ignored"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(body).as_deref(), Some("Olá! Vamos brincar?"));
    }

    #[test]
    fn empty_response_has_no_text() {
        let body: GenerateResponse = serde_json::from_str(r#"{"candidates":[{"content":{"parts":[]}}]}"#).unwrap();
        assert_eq!(extract_text(body), None);
        let body: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(extract_text(body), None);
    }

    #[test]
    fn request_shape_matches_api() {
        let contents = vec![Content::new("user", "oi")];
        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: "seja gentil".into() }],
            },
            contents: &contents,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["system_instruction"]["parts"][0]["text"], "seja gentil");
        assert!(json["system_instruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
    }

    #[tokio::test]
    async fn without_key_fails_closed() {
        let brain = GeminiBrain::new(&BrainConfig::default(), tokio::runtime::Handle::current());
        assert_eq!(brain.process("oi"), NOT_READY);
    }
}
