//! Code generation client.
//!
//! The [`CodeGenerator`] trait decouples the retry loop from the model
//! backend (currently the Gemini `generateContent` API). Tests use scripted
//! generators that return predetermined completions without network access.

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::config::GeneratorConfig;

/// Turns a prompt into a raw text completion.
///
/// Errors are fatal for the whole run; implementations must not retry.
pub trait CodeGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Gemini `generateContent` client.
pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, config: &GeneratorConfig) -> Result<Self> {
        if config.accept_invalid_certs {
            warn!("TLS certificate verification disabled for the generation API");
        }
        let client = Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("build HTTP client")?;

        let model = config
            .model
            .strip_prefix("models/")
            .unwrap_or(&config.model);
        let endpoint = format!(
            "{}/models/{model}:generateContent",
            config.base_url.trim_end_matches('/')
        );

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
        })
    }

    /// Read the API key from the environment variable named in `config`.
    pub fn from_env(config: &GeneratorConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .with_context(|| format!("missing API key: set {}", config.api_key_env))?;
        Self::new(api_key, config)
    }
}

impl CodeGenerator for GeminiGenerator {
    #[instrument(skip_all, fields(endpoint = %self.endpoint, prompt_bytes = prompt.len()))]
    fn generate(&self, prompt: &str) -> Result<String> {
        info!("requesting completion");
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .context("send generateContent request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("generateContent failed\n\nStatus: {status}\nBody: {body}");
        }

        let decoded: GenerateContentResponse =
            response.json().context("decode generateContent response")?;
        let text = first_candidate_text(decoded)?;
        debug!(completion_bytes = text.len(), "completion received");
        Ok(text)
    }
}

/// Concatenate the text parts of the first candidate.
fn first_candidate_text(response: GenerateContentResponse) -> Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("generateContent returned no candidates"))?;
    let parts = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default();
    let texts: Vec<String> = parts.into_iter().filter_map(|part| part.text).collect();
    if texts.is_empty() {
        bail!("first candidate has no text content");
    }
    Ok(texts.concat())
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
