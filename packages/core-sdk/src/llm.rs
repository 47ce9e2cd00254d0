use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{RelayError, Result};
use crate::models::{ExtraFields, Message, Model, Provider};

/** \brief Upper bound for one upstream round trip. */
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/** \brief Token budget for one-off requests such as validation. */
pub const SIMPLE_MAX_TOKENS: u32 = 100;

/**
 * \brief Provider-agnostic chat-completions request.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_tokens: u32,
    pub stream: bool,
    /** \brief Merged over the core fields when the body is built. */
    #[serde(skip)]
    pub extra_fields: ExtraFields,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl ChatRequest {
    /**
     * \brief Serialized body; an extra field wins when its key collides with a core field.
     */
    pub fn to_body(&self) -> Result<Value> {
        let mut body = serde_json::to_value(self).map_err(|source| RelayError::Decode {
            context: "chat request".to_string(),
            source,
            body: None,
        })?;
        if let Value::Object(map) = &mut body {
            for (key, value) in &self.extra_fields {
                map.insert(key.clone(), value.clone());
            }
        }
        Ok(body)
    }
}

/**
 * \brief Upstream response; explicit `null`s decode to empty values.
 */
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<Choice>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage: Usage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_tokens: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completion_tokens: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tokens: u32,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/**
 * \brief Normalized result of one chat turn.
 */
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub message: String,
    pub finish_reason: Option<String>,
    pub usage: Usage,
    pub duration: Duration,
}

impl ChatReply {
    pub fn total_tokens(&self) -> u32 {
        self.usage.total_tokens
    }
}

/**
 * \brief One synchronous request/response unit shared by the CLI, the relay and validation.
 */
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /**
     * \brief Build a request from the model id, sampling parameters and transcript.
     */
    pub fn assemble_request(
        &self,
        model_id: &str,
        temperature: f64,
        max_tokens: u32,
        messages: Vec<Message>,
        extra_fields: Option<&ExtraFields>,
    ) -> ChatRequest {
        if let Some(extra) = extra_fields.filter(|e| !e.is_empty()) {
            let fields = Value::Object(extra.clone());
            debug!(fields = %fields, "sending extra fields");
        }
        ChatRequest {
            model: model_id.to_string(),
            messages,
            temperature,
            max_tokens,
            stream: false,
            extra_fields: extra_fields.cloned().unwrap_or_default(),
        }
    }

    /**
     * \brief POST the request to the provider endpoint and normalize the first choice.
     */
    pub async fn send(
        &self,
        request: &ChatRequest,
        provider: &Provider,
        api_key: &str,
    ) -> Result<ChatReply> {
        let started = Instant::now();
        let body = request.to_body()?;

        let resp = self
            .http
            .post(&provider.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(RelayError::Provider {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|source| RelayError::Decode {
                context: "chat response".to_string(),
                source,
                body: Some(text.clone()),
            })?;
        let duration = started.elapsed();

        let Some(first) = parsed.choices.into_iter().next() else {
            return Err(RelayError::EmptyResponse);
        };

        let finish_reason = first.finish_reason;
        let stopped = finish_reason
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case("stop"))
            .unwrap_or(false);
        if !stopped {
            warn!(
                provider = %provider.id,
                finish_reason = finish_reason.as_deref().unwrap_or(""),
                response = %pretty_body(&text),
                "response did not finish with stop"
            );
        }

        Ok(ChatReply {
            message: first.message.content,
            finish_reason,
            usage: parsed.usage,
            duration,
        })
    }

    /**
     * \brief Send a single user message with the model defaults.
     */
    pub async fn simple_chat(
        &self,
        provider: &Provider,
        model: &Model,
        api_key: &str,
        text: &str,
    ) -> Result<ChatReply> {
        let request = self.assemble_request(
            &model.id,
            model.default_temperature,
            SIMPLE_MAX_TOKENS,
            vec![Message::user(text)],
            model.extra_fields.as_ref(),
        );
        self.send(&request, provider, api_key).await
    }
}

fn pretty_body(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| text.to_string())
}
