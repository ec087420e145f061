use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, DeltaStream, LlmError, ModelCallConfig, ModelClient};
use crate::config::AppConfig;

/// Streaming client for an OpenAI-compatible `/chat/completions` endpoint
/// (OpenRouter by default).
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenRouterClient {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str, temperature: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            temperature,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.base_url,
            config.api_key.clone(),
            &config.model,
            config.temperature,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_model(&self) -> &str {
        &self.model
    }
}

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

/// One streamed `data:` payload.
#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    message: String,
}

impl ModelClient for OpenRouterClient {
    fn stream_chat(&self, messages: Vec<ChatMessage>, config: ModelCallConfig) -> DeltaStream {
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let api_key = self.api_key.clone();
        let body = ChatCompletionRequest {
            model: config.model.unwrap_or_else(|| self.model.clone()),
            messages,
            temperature: config.temperature.unwrap_or(self.temperature),
            stream: true,
        };

        Box::pin(async_stream::try_stream! {
            let api_key = api_key.ok_or(LlmError::MissingApiKey)?;
            tracing::debug!(model = %body.model, messages = body.messages.len(), "Model streaming request");

            let response = client
                .post(format!("{base_url}/chat/completions"))
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() {
                        LlmError::Connection(base_url.clone())
                    } else {
                        LlmError::Stream(e.to_string())
                    }
                })?;

            let response = check_status(response).await?;

            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut finished = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| LlmError::Stream(e.to_string()))?;
                for event in decoder.push(&chunk) {
                    match event? {
                        SseEvent::Delta(text) => {
                            yield text;
                        }
                        SseEvent::Done => finished = true,
                    }
                }
                if finished {
                    break;
                }
            }

            if !finished {
                for event in decoder.finish() {
                    if let SseEvent::Delta(text) = event? {
                        yield text;
                    }
                }
            }
        })
    }
}

/// Pass a 2xx response through; anything else becomes `Upstream` with the body text.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = status.as_u16(), "Model service rejected request");
    Err(LlmError::Upstream {
        status: status.as_u16(),
        body,
    })
}

// ═══════════════════════════════════════════════════════════
// Server-sent event decoding
// ═══════════════════════════════════════════════════════════

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// Splits a byte stream into `data:` lines. Lines may span network chunks,
/// so bytes are buffered until a newline arrives.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<SseEvent, LlmError>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = decode_line(&line) {
                let done = matches!(event, Ok(SseEvent::Done));
                events.push(event);
                if done {
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }

    /// Decode whatever is left once the body ends without a newline.
    fn finish(&mut self) -> Vec<Result<SseEvent, LlmError>> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        decode_line(&line).into_iter().collect()
    }
}

fn decode_line(line: &str) -> Option<Result<SseEvent, LlmError>> {
    let line = line.trim();
    // Blank separators and `:` keep-alive comments.
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(Ok(SseEvent::Done));
    }

    let payload: StreamPayload = match serde_json::from_str(data) {
        Ok(p) => p,
        Err(e) => return Some(Err(LlmError::Parse(e.to_string()))),
    };
    if let Some(error) = payload.error {
        return Some(Err(LlmError::Stream(error.message)));
    }

    payload
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|text| !text.is_empty())
        .map(|text| Ok(SseEvent::Delta(text)))
}
