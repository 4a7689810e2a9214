//! One-shot text exchange over the REST surface.
//!
//! No persistent session: each call carries the full instruction context and
//! one user message, and resolves to the agent's text reply.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SessionConfig;
use crate::error::{ConfabError, Result};
use crate::live::wire::{Content, Part};

/// The one-shot seam.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Resolve one user message to the agent's reply text.
    async fn generate(&self, user_text: &str) -> Result<String>;
}

pub struct GenerateClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    system_instruction: String,
}

impl GenerateClient {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.rest_base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_instruction: config.system_instruction.clone(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[async_trait]
impl TextGenerator for GenerateClient {
    async fn generate(&self, user_text: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateContentRequest {
            contents: vec![Content::user_text(user_text)],
            system_instruction: if self.system_instruction.is_empty() {
                None
            } else {
                Some(Content::system_text(self.system_instruction.clone()))
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConfabError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ConfabError::Request(format!("{status}: {detail}")));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ConfabError::Request(format!("malformed reply: {e}")))?;

        let text = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ConfabError::Request("reply contained no text".into()));
        }
        Ok(text)
    }
}
