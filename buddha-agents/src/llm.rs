//! OpenAI-compatible chat-completions client with tool-call support.
//!
//! One client per configured model; per-call overrides go through
//! [`ChatOptions`]. Streaming responses are read as server-sent events and
//! forwarded delta by delta over an mpsc channel.

use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::LlmError;

/// A message in a chat-completions conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::text("system", content)
    }

    pub fn user(content: &str) -> Self {
        Self::text("user", content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::text("assistant", content)
    }

    /// Result of a tool call, answered back to the model.
    pub fn tool(tool_call_id: &str, content: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            ..Self::text("tool", content)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    /// Parse the arguments; an empty string is an empty object.
    pub fn input(&self) -> Result<Value, serde_json::Error> {
        if self.function.arguments.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&self.function.arguments)
    }
}

/// A function tool the model may call.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDef {
    fn to_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": &self.name,
                "description": &self.description,
                "parameters": &self.parameters,
            }
        })
    }
}

/// Per-call settings. Unset fields fall back to the client's model and the
/// provider's defaults.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub tools: Vec<ToolDef>,
}

impl ChatOptions {
    pub fn new(temperature: f64, max_tokens: u32) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl ChatResponse {
    /// The first choice's message.
    pub fn into_message(self) -> Result<ChatMessage, LlmError> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or(LlmError::EmptyResponse)
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Chat-completions client.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: &str) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: "gpt-4o-mini".to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The model a call with `opts` is sent to.
    fn model_for<'a>(&'a self, opts: &'a ChatOptions) -> &'a str {
        opts.model.as_deref().unwrap_or(&self.model)
    }

    fn body(&self, messages: &[ChatMessage], opts: &ChatOptions, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model_for(opts),
            "messages": messages,
        });
        if let Some(t) = opts.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(n) = opts.max_tokens {
            body["max_tokens"] = json!(n);
        }
        if !opts.tools.is_empty() {
            body["tools"] = Value::Array(opts.tools.iter().map(ToolDef::to_json).collect());
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn post(&self, model: &str, body: &Value) -> Result<reqwest::Response, LlmError> {
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %model, "LLM request failed");
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    /// Send a conversation and get the full response.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let resp = self
            .post(self.model_for(opts), &self.body(messages, opts, false))
            .await?;
        let parsed: ChatResponse = serde_json::from_slice(&resp.bytes().await?)?;
        if let Some(ref usage) = parsed.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "LLM usage"
            );
        }
        Ok(parsed)
    }

    /// Single-turn completion without tools.
    pub async fn complete(
        &self,
        system: &str,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
        let msg = self
            .chat(&messages, &ChatOptions::new(temperature, max_tokens))
            .await?
            .into_message()?;
        Ok(msg.content.unwrap_or_default())
    }

    /// Stream a response. Every content delta is sent on `tx`; the full text
    /// is returned once the stream ends. A dropped receiver does not stop the
    /// read, so the caller still gets the complete answer.
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let resp = self
            .post(self.model_for(opts), &self.body(messages, opts, true))
            .await?;
        // Events are framed on raw bytes, so a code point split across
        // network chunks is reassembled before decoding.
        let mut events = resp.bytes_stream().eventsource();
        let mut full = String::new();

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| LlmError::Stream(e.to_string()))?;
            match parse_event_data(&event.data)? {
                SseData::Done => break,
                SseData::Delta(text) => {
                    full.push_str(&text);
                    if tx.send(text).await.is_err() {
                        tracing::debug!("Stream receiver dropped");
                    }
                }
                SseData::Skip => {}
            }
        }
        Ok(full)
    }
}

#[derive(Debug, PartialEq)]
enum SseData {
    Delta(String),
    Done,
    Skip,
}

/// Interpret the `data` field of one event.
fn parse_event_data(data: &str) -> Result<SseData, LlmError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseData::Done);
    }
    if data.is_empty() {
        return Ok(SseData::Skip);
    }
    let chunk: StreamChunk = serde_json::from_str(data)?;
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    if text.is_empty() {
        Ok(SseData::Skip)
    } else {
        Ok(SseData::Delta(text))
    }
}
