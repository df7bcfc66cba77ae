//! External payload generators.
//!
//! Both generators speak JSON over HTTP and must answer with a non-empty
//! array of strings. Anything else is a `GenerationError`; the payload source
//! decides what to do about it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::core::endpoint::Parameter;
use crate::core::task::Payload;
use crate::errors::GenerationError;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

#[async_trait]
pub trait PayloadGenerator: Send + Sync {
    async fn generate(&self, parameter: &Parameter) -> Result<Vec<Payload>, GenerationError>;

    fn name(&self) -> &str;
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    parameter_name: &'a str,
    parameter_type: &'a str,
}

/// Generic generation service: POST `{parameter_name, parameter_type}`,
/// receive a JSON array of payload strings.
pub struct ServiceGenerator {
    client: Client,
    url: String,
}

impl ServiceGenerator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl PayloadGenerator for ServiceGenerator {
    async fn generate(&self, parameter: &Parameter) -> Result<Vec<Payload>, GenerationError> {
        let request = GenerationRequest {
            parameter_name: &parameter.name,
            parameter_type: parameter.inferred_type.as_str(),
        };
        let resp = self.client.post(&self.url).json(&request).send().await?;
        if !resp.status().is_success() {
            return Err(GenerationError::Status(resp.status().as_u16()));
        }
        let text = resp.text().await?;
        parse_payload_list(&text)
    }

    fn name(&self) -> &str {
        "service"
    }
}

/// Asks a local Ollama model for context-aware payloads.
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn prompt(parameter: &Parameter) -> String {
        format!(
            "Generate context-aware SQL injection payloads for parameter `{}` of type `{}`. \
             Return only a JSON list of strings.",
            parameter.name,
            parameter.inferred_type.as_str()
        )
    }
}

#[async_trait]
impl PayloadGenerator for OllamaGenerator {
    async fn generate(&self, parameter: &Parameter) -> Result<Vec<Payload>, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": Self::prompt(parameter),
            "stream": false
        });
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let resp = self.client.post(url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(GenerationError::Status(resp.status().as_u16()));
        }
        let envelope: Value = resp.json().await?;
        let text = envelope
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| GenerationError::Malformed("missing 'response' field".to_string()))?;
        parse_payload_list(strip_code_fence(text))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Parses a JSON array of strings. Any other shape is malformed.
pub fn parse_payload_list(text: &str) -> Result<Vec<Payload>, GenerationError> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| GenerationError::Malformed(e.to_string()))?;
    let items = value
        .as_array()
        .ok_or_else(|| GenerationError::Malformed("expected a JSON array".to_string()))?;

    let mut payloads = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str() {
            Some(s) => payloads.push(s.to_string()),
            None => {
                return Err(GenerationError::Malformed(format!(
                    "non-string entry {}",
                    item
                )))
            }
        }
    }

    if payloads.is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(payloads)
}

/// Models like to wrap JSON in ```json fences.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
