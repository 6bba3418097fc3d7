mod data_stream;
mod sse;
mod stream;

use std::time::Duration;

use anyhow::{anyhow, bail};
use axum::body::Bytes;
use futures_util::{stream::BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::{config::Config, db::Role};

pub use data_stream::{DataStreamDecoder, FinishReason, Frame};
pub(crate) use stream::chat;

pub const SYSTEM_PROMPT: &str = "\
You are an AI assistant that helps people learn English. When the user asks for \
English expressions, answer according to these rules:
1. Always give three different English expressions.
2. Each expression must be practical and usable in the situation that was asked about.
3. Mix difficulty levels so that beginners and advanced learners can both use them.
4. Answer in English.
5. Give only the sentences, without extra explanation.
Example, when asked for \"phrases for meetings\":
1. \"Let's move on to the next agenda item.\"
2. \"I'd like to table this discussion for now.\"
3. \"Could we circle back to this later?\"
";

/// One turn of the conversation sent to the model.
#[derive(Debug, Clone, Deserialize)]
pub struct Turn {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

/// Client for Gemini's `streamGenerateContent` endpoint.
#[derive(Clone)]
pub struct Gemini {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    idle_timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

impl<'a> GenerateRequest<'a> {
    fn new(turns: &'a [Turn], temperature: f32, max_output_tokens: u32) -> Self {
        GenerateRequest {
            system_instruction: Content { role: None, parts: [Part { text: SYSTEM_PROMPT }] },
            contents: turns.iter()
                .map(|turn| Content {
                    role: Some(match turn.role {
                        Role::User => "user",
                        Role::Ai => "model",
                    }),
                    parts: [Part { text: &turn.content }],
                })
                .collect(),
            generation_config: GenerationConfig { temperature, max_output_tokens },
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

impl Gemini {
    pub fn from_config(config: &Config) -> anyhow::Result<Gemini> {
        let http_client = reqwest::ClientBuilder::new()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Gemini {
            http_client,
            base_url: config.gemini_base_url.trim_end_matches('/').to_owned(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
        })
    }

    /// How long a reply may go without a new chunk before it is given up on.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Starts generating a reply and hands back the raw SSE body. Fails when
    /// the model refuses the request before anything is streamed.
    pub async fn stream(&self, turns: &[Turn]) -> anyhow::Result<BoxStream<'static, reqwest::Result<Bytes>>> {
        let request = GenerateRequest::new(turns, self.temperature, self.max_tokens);

        let response = self.http_client
            .post(format!("{}/v1beta/models/{}:streamGenerateContent", self.base_url, self.model))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("gemini answered {status}: {body}");
        }

        tracing::debug!(model = %self.model, turns = turns.len(), "streaming reply");
        Ok(response.bytes_stream().boxed())
    }
}

/// Text carried by one SSE event of the model's response.
pub(crate) fn event_text(data: &str) -> anyhow::Result<String> {
    let response: GenerateResponse = serde_json::from_str(data)?;
    if let Some(ApiError { message }) = response.error {
        return Err(anyhow!(message));
    }

    Ok(
        response.candidates
            .into_iter()
            .flat_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect()
    )
}
