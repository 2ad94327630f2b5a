//! LLM agent module for summarisation.
//!
//! Walks an ordered list of model candidates. Each failure is classified by
//! [`AgentError::disposition`]: fatal errors stop the walk, candidate-scoped
//! errors and misses move on to the next model.

pub use crate::summary::Summary;

use crate::config::Config;
use crate::gemini::{GeminiError, GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("pagegist/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid API key. Please check your settings.")]
    InvalidApiKey,
    #[error("API key is invalid or doesn't have permission.")]
    PermissionDenied,
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,
    #[error("Network error. Please check your internet connection. ({0})")]
    Network(String),
    #[error("Summary generation stopped: {0}")]
    Stopped(String),
    #[error("Model {0} not found")]
    ModelNotFound(String),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("No summary generated. Please try again.")]
    EmptyResponse,
    #[error("Failed to generate summary with all available models")]
    AllModelsFailed,
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

/// What a failed attempt means for the remaining candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Affects every candidate identically; stop now.
    Fatal,
    /// Only this model is unusable; try the next one.
    CandidateScoped,
    /// No usable answer this time; try the next one.
    Miss,
}

impl AgentError {
    pub fn disposition(&self) -> Disposition {
        match self {
            AgentError::InvalidApiKey
            | AgentError::PermissionDenied
            | AgentError::RateLimited
            | AgentError::Network(_)
            | AgentError::Stopped(_)
            | AgentError::InvalidBaseUrl(_)
            | AgentError::Client(_)
            | AgentError::ConfigError(_) => Disposition::Fatal,
            AgentError::ModelNotFound(_) => Disposition::CandidateScoped,
            AgentError::Api { .. }
            | AgentError::ParseError(_)
            | AgentError::EmptyResponse
            | AgentError::AllModelsFailed => Disposition::Miss,
        }
    }
}

/// Map a non-success HTTP status to an error.
pub fn classify_status(status: u16, message: &str, model: &str) -> AgentError {
    match status {
        400 if message.to_lowercase().contains("api key") => AgentError::InvalidApiKey,
        401 | 403 => AgentError::PermissionDenied,
        429 => AgentError::RateLimited,
        404 => AgentError::ModelNotFound(model.to_string()),
        _ => AgentError::Api {
            status,
            message: message.to_string(),
        },
    }
}

/// A model to try, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCandidate {
    pub id: String,
}

impl ModelCandidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Gemini client with ordered model fallback.
pub struct SummaryClient {
    client: Client,
    base_url: String,
    api_key: String,
    candidates: Vec<ModelCandidate>,
    prompt: String,
    generation: GenerationConfig,
}

impl SummaryClient {
    /// Build a client from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self, AgentError> {
        let candidates = config
            .agent
            .models
            .iter()
            .map(ModelCandidate::new)
            .collect();

        let settings = config.settings()?;
        Ok(Self::new(&settings.api_key, &config.api.base_url, candidates)?
            .with_prompt(&config.agent.prompt)
            .with_generation(GenerationConfig {
                temperature: config.agent.temperature,
                max_output_tokens: config.agent.max_output_tokens,
            }))
    }

    pub fn new(
        api_key: &str,
        base_url: &str,
        candidates: Vec<ModelCandidate>,
    ) -> Result<Self, AgentError> {
        Url::parse(base_url).map_err(|e| AgentError::InvalidBaseUrl(e.to_string()))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Client(e.to_string()))?;

        let defaults = crate::config::AgentConfig::default();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            candidates,
            prompt: defaults.prompt,
            generation: GenerationConfig {
                temperature: defaults.temperature,
                max_output_tokens: defaults.max_output_tokens,
            },
        })
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = prompt.to_string();
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.candidates
    }

    /// Run the summarisation on the provided text
    pub async fn summarize(&self, text: &str) -> Result<Summary, AgentError> {
        let request = GenerateContentRequest::prompt(
            format!("{}\n\n{}", self.prompt, text),
            self.generation.clone(),
        );

        let mut last_error = None;
        for candidate in &self.candidates {
            info!(model = %candidate.id, "requesting summary");
            match self.attempt(candidate, &request).await {
                Ok(summary) => return Ok(summary),
                Err(err) => match err.disposition() {
                    Disposition::Fatal => {
                        warn!(model = %candidate.id, error = %err, "fatal summarisation error");
                        return Err(err);
                    }
                    disposition => {
                        debug!(model = %candidate.id, ?disposition, error = %err, "trying next model");
                        last_error = Some(err);
                    }
                },
            }
        }

        Err(last_error.unwrap_or(AgentError::AllModelsFailed))
    }

    async fn attempt(
        &self,
        candidate: &ModelCandidate,
        request: &GenerateContentRequest,
    ) -> Result<Summary, AgentError> {
        let url = self.endpoint(&candidate.id)?;

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiError>(&body)
                .ok()
                .map(|e| e.error.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("API error: {}", status.as_u16()));
            return Err(classify_status(status.as_u16(), &message, &candidate.id));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| AgentError::ParseError(e.to_string()))?;

        match parsed.summary_text() {
            Some(text) => Ok(Summary::new(text, candidate.id.as_str())),
            None => match parsed.finish_reason() {
                Some(reason) => Err(AgentError::Stopped(reason.to_string())),
                None => Err(AgentError::EmptyResponse),
            },
        }
    }

    fn endpoint(&self, model: &str) -> Result<Url, AgentError> {
        let mut url = Url::parse(&format!(
            "{}/models/{}:generateContent",
            self.base_url, model
        ))
        .map_err(|e| AgentError::InvalidBaseUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}
