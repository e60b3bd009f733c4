//! Chat-completion adapter used to play the customer, score transcripts and
//! write coaching narratives.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoachingError, CoachingResult};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the model for a single JSON object.
    pub json: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            messages,
            temperature,
            max_tokens: None,
            json: false,
        }
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> CoachingResult<String>;
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str) -> CoachingResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|err| CoachingError::Llm(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> CoachingResult<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(model = %self.model, messages = request.messages.len(), "chat completion request");

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| CoachingError::Llm(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, "chat completion failed");
            return Err(CoachingError::Llm(format!(
                "OpenAI API error ({status}): {error_text}"
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| CoachingError::Llm(err.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| CoachingError::Llm("empty response from OpenAI".to_string()))
    }
}

/// Stand-in when no API key is configured; every call fails so callers use
/// their fallbacks.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    async fn complete(&self, _request: &ChatRequest) -> CoachingResult<String> {
        Err(CoachingError::Llm("no OpenAI API key configured".to_string()))
    }
}

/// Parses a JSON reply, tolerating a surrounding markdown code fence.
pub fn parse_json_reply<T: serde::de::DeserializeOwned>(reply: &str) -> CoachingResult<T> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    Ok(serde_json::from_str(body.trim())?)
}

#[cfg(test)]
pub mod scripted {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays canned replies in order and records every request.
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<CoachingResult<String>>>,
        pub requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedModel {
        pub fn with_replies(replies: Vec<&str>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: &ChatRequest) -> CoachingResult<String> {
            // lets concurrent callers interleave like a real network call
            tokio::task::yield_now().await;
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CoachingError::Llm("script exhausted".to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Reply {
        goal: String,
    }

    #[test]
    fn parses_fenced_json() {
        let reply: Reply = parse_json_reply("```json\n{\"goal\": \"listen\"}\n```").unwrap();
        assert_eq!(reply.goal, "listen");
        let reply: Reply = parse_json_reply(" {\"goal\": \"plain\"} ").unwrap();
        assert_eq!(reply.goal, "plain");
    }

    #[test]
    fn rejects_prose() {
        let result: CoachingResult<Reply> = parse_json_reply("Sure! Here is your plan.");
        assert!(matches!(result, Err(CoachingError::Serialization(_))));
    }

    #[tokio::test]
    async fn disabled_model_always_fails() {
        let request = ChatRequest::new(vec![ChatMessage::user("hi")], 0.0);
        assert!(matches!(
            DisabledModel.complete(&request).await,
            Err(CoachingError::Llm(_))
        ));
    }
}
