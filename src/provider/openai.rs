//! OpenAI-compatible Chat Completions transport.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::MeshError;
use crate::types::*;

use super::http::{
    bearer_headers, event_stream_headers, parse_sse_line, shared_client, SseLine, SseLineBuffer,
};
use super::{ChatEventStream, ChatRequest, ChatResponse, ChatTransport};

/// Transport for any endpoint speaking the `/chat/completions` wire format.
///
/// `endpoint` is the full URL, e.g. `https://api.openai.com/v1/chat/completions`.
pub struct OpenAiChatTransport {
    endpoint: String,
    api_key: String,
}

impl OpenAiChatTransport {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let messages = request
            .messages
            .iter()
            .map(message_to_openai)
            .collect::<Vec<_>>();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": stream,
        });

        let Some(obj) = body.as_object_mut() else {
            return body;
        };

        if stream {
            obj.insert(
                "stream_options".into(),
                serde_json::json!({ "include_usage": true }),
            );
        }

        if !request.tools.is_empty() {
            let tool_defs: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            obj.insert("tools".into(), tool_defs.into());
        }
        if let Some(choice) = request.tool_choice {
            obj.insert("tool_choice".into(), serde_json::to_value(choice).unwrap_or_default());
        }

        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        stream: bool,
    ) -> Result<reqwest::Response, MeshError> {
        let headers = if stream {
            event_stream_headers(&self.api_key)
        } else {
            bearer_headers(&self.api_key)
        };
        let resp = shared_client()
            .post(&self.endpoint)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(super::http::status_to_error(status, &body_text));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatTransport for OpenAiChatTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, MeshError> {
        let body = self.build_request_body(request, false);
        debug!(model = %request.model, endpoint = %self.endpoint, "chat complete");

        let data: OpenAiChatResponse = self.post(&body, false).await?.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| MeshError::api(200, "No choices in chat completion response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRecord {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: data.usage.map(Usage::from),
        })
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChatEventStream, MeshError> {
        let body = self.build_request_body(request, true);
        debug!(model = %request.model, endpoint = %self.endpoint, "chat stream");

        let byte_stream = self.post(&body, true).await?.bytes_stream();

        let stream = async_stream::stream! {
            let mut lines = SseLineBuffer::new();
            futures::pin_mut!(byte_stream);

            'read: while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(MeshError::Network(e));
                        break;
                    }
                };

                for line in lines.push(&chunk) {
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    match parse_sse_line(&line) {
                        Some(SseLine::Done) => {
                            yield Ok(StreamEvent::Done);
                            break 'read;
                        }
                        Some(SseLine::Data(data)) => {
                            match serde_json::from_str::<OpenAiStreamChunk>(data) {
                                Ok(chunk) => {
                                    for event in chunk_events(chunk) {
                                        yield Ok(event);
                                    }
                                }
                                Err(e) => {
                                    debug!(error = %e, data = %data, "skipping unparseable SSE chunk");
                                }
                            }
                        }
                        None => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn chunk_events(chunk: OpenAiStreamChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    if let Some(choice) = chunk.choices.into_iter().next() {
        for call in choice.delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match call.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            events.push(StreamEvent::ToolCallDelta(ToolCallFragment {
                index: call.index,
                id: call.id,
                name,
                arguments,
            }));
        }
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::TextDelta { text });
        }
    }
    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(usage.into()));
    }
    events
}

fn message_to_openai(msg: &ModelMessage) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    if msg.role == Role::Tool {
        return serde_json::json!({
            "role": role,
            "tool_call_id": msg.tool_call_id,
            "name": msg.name,
            "content": msg.text(),
        });
    }

    if !msg.tool_calls.is_empty() {
        let tc_json: Vec<serde_json::Value> = msg
            .tool_calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": tc.arguments,
                    }
                })
            })
            .collect();
        let text = msg.text();
        return serde_json::json!({
            "role": role,
            "content": if text.is_empty() { serde_json::Value::Null } else { serde_json::Value::String(text) },
            "tool_calls": tc_json,
        });
    }

    let only_text = msg
        .content
        .iter()
        .all(|part| matches!(part, ContentPart::Text { .. }));
    if only_text {
        return serde_json::json!({ "role": role, "content": msg.text() });
    }

    let parts: Vec<serde_json::Value> = msg
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => serde_json::json!({
                "type": "text",
                "text": text,
            }),
            ContentPart::Image(img) => serde_json::json!({
                "type": "image_url",
                "image_url": { "url": img.url }
            }),
        })
        .collect();

    serde_json::json!({ "role": role, "content": parts })
}

// Chat Completions wire types (internal)

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<OpenAiUsage> for Usage {
    fn from(u: OpenAiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize, Default)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Deserialize)]
struct OpenAiToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Deserialize)]
struct OpenAiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
