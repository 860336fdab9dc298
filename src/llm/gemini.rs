//! Client for the Gemini `generateContent` endpoint.
//!
//! Behaviour:
//! - One non-streaming `POST {base_url}/v1beta/models/{model}:generateContent` per call.
//! - The API key travels in the `x-goog-api-key` header, never in the URL.
//! - No retries and no overall request timeout; only connecting is bounded.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::chat::errors::{ChatError, ChatResult};
use crate::config::{GeminiConfig, GenerationConfig, SafetySetting};
use crate::llm::{Candidate, CompletionResponse, CompletionService, Transcript, TurnRole};

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body excerpt kept in error messages.
const ERROR_BODY_EXCERPT: usize = 200;

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfigBody<'a> {
    #[serde(skip_serializing_if = "is_empty_slice")]
    stop_sequences: &'a [String],
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    #[serde(skip_serializing_if = "is_empty_slice")]
    safety_settings: &'a [SafetySetting],
    generation_config: GenerationConfigBody<'a>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

const fn is_empty_slice<T>(items: &&[T]) -> bool {
    items.is_empty()
}

const fn wire_role(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Model => "model",
    }
}

fn build_request<'a>(
    transcript: &'a Transcript,
    generation: &'a GenerationConfig,
) -> GenerateContentRequest<'a> {
    let contents = transcript
        .turns
        .iter()
        .map(|turn| Content {
            role: wire_role(turn.role),
            parts: vec![Part { text: &turn.text }],
        })
        .collect();

    let system_instruction = transcript.system.as_deref().map(|text| SystemInstruction {
        parts: vec![Part { text }],
    });

    GenerateContentRequest {
        contents,
        system_instruction,
        safety_settings: &generation.safety_settings,
        generation_config: GenerationConfigBody {
            stop_sequences: &generation.stop_sequences,
            temperature: generation.temperature,
            max_output_tokens: generation.max_output_tokens,
            top_p: generation.top_p,
            top_k: generation.top_k,
        },
    }
}

fn into_completion(response: GenerateContentResponse) -> CompletionResponse {
    let candidates = response
        .candidates
        .into_iter()
        .map(|candidate| Candidate {
            text: candidate
                .content
                .and_then(|content| content.parts.into_iter().next())
                .and_then(|part| part.text),
        })
        .collect();
    CompletionResponse { candidates }
}

/// Build the `generateContent` URL for a model.
///
/// # Errors
/// Returns an error if the resulting URL is invalid.
pub fn generate_content_url(base_url: &str, model: &str) -> ChatResult<Url> {
    let base = base_url.trim_end_matches('/');
    Ok(Url::parse(&format!(
        "{base}/v1beta/models/{model}:generateContent"
    ))?)
}

/// Async Gemini client.
pub struct GeminiClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl GeminiClient {
    /// Create a client for the configured endpoint.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the URL is invalid.
    pub fn new(config: &GeminiConfig) -> ChatResult<Self> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        let endpoint = generate_content_url(&config.base_url, &config.model)?;
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
        })
    }

    /// Endpoint the client posts to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl CompletionService for GeminiClient {
    async fn complete(
        &self,
        transcript: &Transcript,
        generation: &GenerationConfig,
    ) -> ChatResult<CompletionResponse> {
        let body = build_request(transcript, generation);

        debug!(
            turns = transcript.turns.len(),
            persona = transcript.system.is_some(),
            "Sending Gemini request"
        );

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChatError::RemoteUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| ChatError::RemoteUnavailable(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            let excerpt: String = raw.chars().take(ERROR_BODY_EXCERPT).collect();
            return Err(ChatError::RemoteUnavailable(format!(
                "status {status}: {excerpt}"
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&raw)
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;

        Ok(into_completion(parsed))
    }
}
