//! Gemini Developer API backend.

mod types;

use std::time::Duration;

use reqwest::{Client as ReqwestClient, StatusCode};
use tracing::{debug, error, instrument};
use url::Url;

use self::types::{GenerateContentRequest, GenerateContentResponse};
use super::ModelBackend;
use super::types::{Conversation, Generation, GenerationOptions, ToolDeclaration};
use crate::error::{Error, Result};

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Retry hint used when a 429 carries no Retry-After header
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Calls `models/{model}:generateContent` with an API key
#[derive(Clone)]
pub struct GeminiBackend {
    client: ReqwestClient,
    base_url: String,
    api_key: String,
    api_version: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl GeminiBackend {
    /// Set the base URL (for testing only)
    pub fn set_base_url(&mut self, url: String) {
        self.base_url = url;
    }
}

impl GeminiBackend {
    /// Create a backend for the Gemini Developer API
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Auth("Gemini API key is empty".to_string()));
        }
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            api_version: "v1beta".to_string(),
        })
    }

    fn build_url(&self, model: &str) -> Result<Url> {
        let url = format!(
            "{}/{}/models/{}:generateContent",
            self.base_url, self.api_version, model
        );
        Url::parse(&url).map_err(|e| Error::Other(format!("Invalid URL: {}", e)))
    }
}

impl ModelBackend for GeminiBackend {
    #[instrument(skip(self, conversation, tools, options), fields(turns = conversation.turns.len()))]
    async fn generate(
        &self,
        model: &str,
        conversation: &Conversation,
        tools: Option<&[ToolDeclaration]>,
        options: &GenerationOptions,
    ) -> Result<Generation> {
        let body = GenerateContentRequest::new(conversation, tools, options);
        let url = self.build_url(model)?;

        debug!("Generating content from model {}", model);
        let response = self
            .client
            .post(url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            let response_text = response.text().await?;
            error!("API error: {} - {}", status, response_text);
            return Err(Error::RateLimit {
                retry_after_secs: retry_after,
            });
        }

        let response_text = response.text().await?;
        if !status.is_success() {
            error!("API error: {} - {}", status, response_text);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Error::Auth("Invalid API key or credentials".to_string())
                }
                _ => Error::Api {
                    status_code: status.as_u16(),
                    message: response_text,
                },
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&response_text).map_err(|e| {
                error!("Failed to parse response: {}", e);
                Error::UnexpectedResponse(format!("Failed to parse response: {}", e))
            })?;
        parsed.into_generation()
    }
}
