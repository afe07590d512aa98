use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

use super::sse::{LineBuffer, SseEvent, parse_sse_line};
use crate::config::{AgentConfig, ModelParams, ProviderKind};
use crate::error::{AgentError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Everything the backend needs for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub params: ModelParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

pub type StreamResult = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Single non-streaming completion
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Streaming completion. The request is sent before this returns;
    /// fragments arrive as the stream is polled.
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<StreamResult>;
}

pub fn create_provider(config: &AgentConfig) -> Arc<dyn LLMProvider> {
    let base_url = config.base_url();
    let api_key = config.api_key.clone().filter(|k| !k.is_empty());

    match config.provider {
        ProviderKind::OpenAI => Arc::new(OpenAIProvider::new(&base_url, api_key)),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(&base_url, api_key)),
    }
}

fn format_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect()
}

fn with_auth(builder: RequestBuilder, api_key: Option<&str>) -> RequestBuilder {
    match api_key {
        Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
        None => builder,
    }
}

/// Turn a non-2xx response into a backend error carrying the body.
async fn check_status(provider: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AgentError::backend(
        provider,
        format!("HTTP {}: {}", status, body.trim()),
    ))
}

// OpenAI-compatible Provider
pub struct OpenAIProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAIProvider {
    const NAME: &'static str = "openai";

    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let params = &request.params;
        let mut body = json!({
            "model": request.model,
            "messages": format_messages(&request.messages),
            "stream": stream,
            "temperature": params.temperature,
            "max_completion_tokens": params.max_tokens,
        });

        for (key, value) in [
            ("top_p", params.top_p),
            ("frequency_penalty", params.frequency_penalty),
            ("presence_penalty", params.presence_penalty),
        ] {
            if let Some(v) = value {
                body[key] = json!(v);
            }
        }

        body
    }

    async fn send(&self, body: &Value) -> Result<Response> {
        let builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(body);

        let response = with_auth(builder, self.api_key.as_deref()).send().await?;
        check_status(Self::NAME, response).await
    }
}

/// Outcome of one streamed OpenAI chunk
fn parse_openai_chunk(data: &str) -> Result<StreamChunk> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| AgentError::backend(OpenAIProvider::NAME, format!("bad stream event: {}", e)))?;

    if let Some(error) = value.get("error") {
        return Err(AgentError::backend(OpenAIProvider::NAME, error.to_string()));
    }

    let choice = &value["choices"][0];
    if choice["finish_reason"].as_str() == Some("stop") {
        return Ok(StreamChunk {
            delta: String::new(),
            done: true,
        });
    }

    Ok(StreamChunk {
        delta: choice["delta"]["content"].as_str().unwrap_or("").to_string(),
        done: false,
    })
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = self.build_body(request, false);
        debug!("OpenAI request: {}", serde_json::to_string_pretty(&body)?);

        let response_body: Value = self.send(&body).await?.json().await?;
        debug!(
            "OpenAI response: {}",
            serde_json::to_string_pretty(&response_body)?
        );

        if let Some(error) = response_body.get("error") {
            return Err(AgentError::backend(Self::NAME, error.to_string()));
        }

        let choice = response_body["choices"]
            .get(0)
            .ok_or_else(|| AgentError::backend(Self::NAME, "no choices in response"))?;

        Ok(choice["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string())
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<StreamResult> {
        let body = self.build_body(request, true);
        debug!(
            "OpenAI streaming request: {}",
            serde_json::to_string_pretty(&body)?
        );

        let response = self.send(&body).await?;

        let stream = async_stream::stream! {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::new();

            'read: while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(AgentError::backend(Self::NAME, format!("stream error: {}", e)));
                        break;
                    }
                };

                for line in lines.feed(&bytes) {
                    match parse_sse_line(&line) {
                        Some(SseEvent::Done) => break 'read,
                        Some(SseEvent::Data(data)) => match parse_openai_chunk(&data) {
                            Ok(chunk) if chunk.done => break 'read,
                            Ok(chunk) => {
                                if !chunk.delta.is_empty() {
                                    yield Ok(chunk);
                                }
                            }
                            Err(e) => {
                                yield Err(e);
                                break 'read;
                            }
                        },
                        None => {}
                    }
                }
            }

            yield Ok(StreamChunk { delta: String::new(), done: true });
        };

        Ok(Box::pin(stream))
    }
}

// Ollama Provider (native API)
pub struct OllamaProvider {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl OllamaProvider {
    const NAME: &'static str = "ollama";

    pub fn new(endpoint: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let params = &request.params;
        let mut options = Map::new();
        options.insert("temperature".into(), json!(params.temperature));
        options.insert("num_predict".into(), json!(params.max_tokens));
        for (key, value) in [
            ("top_p", params.top_p),
            ("frequency_penalty", params.frequency_penalty),
            ("presence_penalty", params.presence_penalty),
        ] {
            if let Some(v) = value {
                options.insert(key.into(), json!(v));
            }
        }

        json!({
            "model": request.model,
            "messages": format_messages(&request.messages),
            "stream": stream,
            "options": options,
        })
    }

    async fn send(&self, body: &Value) -> Result<Response> {
        let builder = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .header("Content-Type", "application/json")
            .json(body);

        let response = with_auth(builder, self.api_key.as_deref()).send().await?;
        check_status(Self::NAME, response).await
    }
}

fn parse_ollama_line(line: &str) -> Result<StreamChunk> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| AgentError::backend(OllamaProvider::NAME, format!("bad stream line: {}", e)))?;

    if let Some(error) = value.get("error") {
        return Err(AgentError::backend(OllamaProvider::NAME, error.to_string()));
    }

    Ok(StreamChunk {
        delta: value["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        done: value["done"].as_bool().unwrap_or(false),
    })
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = self.build_body(request, false);
        debug!("Ollama request: {}", serde_json::to_string_pretty(&body)?);

        let response_body: Value = self.send(&body).await?.json().await?;
        debug!(
            "Ollama response: {}",
            serde_json::to_string_pretty(&response_body)?
        );

        if let Some(error) = response_body.get("error") {
            return Err(AgentError::backend(Self::NAME, error.to_string()));
        }

        Ok(response_body["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string())
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<StreamResult> {
        let body = self.build_body(request, true);
        debug!(
            "Ollama streaming request: {}",
            serde_json::to_string_pretty(&body)?
        );

        let response = self.send(&body).await?;

        // Ollama streams newline-delimited JSON
        let stream = async_stream::stream! {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::new();
            let mut finished = false;

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(AgentError::backend(Self::NAME, format!("stream error: {}", e)));
                        finished = true;
                        break;
                    }
                };

                for line in lines.feed(&bytes) {
                    match parse_ollama_line(&line) {
                        Ok(chunk) => {
                            let done = chunk.done;
                            yield Ok(chunk);
                            if done {
                                finished = true;
                                break;
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            finished = true;
                            break;
                        }
                    }
                }
                if finished {
                    break;
                }
            }

            if !finished {
                match lines.flush().map(|line| parse_ollama_line(&line)) {
                    Some(Ok(chunk)) => yield Ok(chunk),
                    Some(Err(e)) => yield Err(e),
                    None => yield Ok(StreamChunk { delta: String::new(), done: true }),
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
