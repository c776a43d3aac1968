use std::time::Duration;

use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::auth::Token;
use crate::config::OracleConfig;
use crate::error::{MigrafixError, Result};

/// Context for one fix request.
#[derive(Debug, Clone, Copy)]
pub struct FixRequest<'a> {
    pub test_source: &'a str,
    /// Empty when the subject could not be located
    pub subject_source: &'a str,
    pub failure_detail: &'a str,
}

#[allow(async_fn_in_trait)]
pub trait FixOracle {
    /// Returns replacement test source, or `None` when no usable
    /// suggestion was produced.
    async fn propose_fix(&self, request: &FixRequest<'_>) -> Option<String>;
}

/// Gemini `generateContent` client.
pub struct GeminiOracle {
    client: Client,
    base_url: String,
    model: String,
    api_key: Token,
    markers: Vec<String>,
    language: String,
}

impl GeminiOracle {
    pub fn new(config: &OracleConfig, api_key: Token) -> Result<Self> {
        Self::with_timeout(config, api_key, config.request_timeout())
    }

    fn with_timeout(config: &OracleConfig, api_key: Token, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("migrafix/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| MigrafixError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            markers: config.structural_markers.clone(),
            language: config.language.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&json!({
                "contents": [
                    {
                        "role": "user",
                        "parts": [{"text": prompt}]
                    }
                ]
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            warn!(
                "Oracle request failed with status {status}: {}",
                truncate(&body, 300)
            );
            return Ok(None);
        }

        let body: GenerateContentResponse = response.json().await?;
        Ok(body.text())
    }
}

impl FixOracle for GeminiOracle {
    async fn propose_fix(&self, request: &FixRequest<'_>) -> Option<String> {
        let prompt = build_prompt(request, &self.language);
        let text = match self.generate(&prompt).await {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!("Oracle error: {e}");
                return None;
            }
        };

        let cleaned = strip_code_fence(&text);
        if is_plausible_source(&cleaned, &self.markers) {
            Some(cleaned)
        } else {
            debug!("Oracle response rejected: {}", truncate(&cleaned, 200));
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(self) -> Option<String> {
        let parts = self
            .candidates?
            .into_iter()
            .next()?
            .content?
            .parts?;
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

pub fn build_prompt(request: &FixRequest<'_>, language: &str) -> String {
    format!(
        "You are an expert {language} developer. \
Given the following failing test case and its corresponding main class, \
fix the test case so that it passes, without removing the assertion or test logic. \
Explain your fix as comments in the code. \
Provide only the code content without any markdown formatting or language tags. Just raw code. \
If you need to change the main class, do so only if necessary.\n\n\
Failing test case code:\n```\n{}\n```\n\n\
Main class code:\n```\n{}\n```\n\n\
Error message:\n{}\n\n\
Return only the fixed test case code.",
        request.test_source, request.subject_source, request.failure_detail
    )
}

/// Removes a leading markdown fence if the model added one anyway, along
/// with anything after the closing fence.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // drop the language tag line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim_matches(['\n', '\r']).trim_end().to_string()
}

/// A response counts as source when one of `markers` appears as a word.
pub fn is_plausible_source(text: &str, markers: &[String]) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| markers.iter().any(|marker| marker == word))
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
