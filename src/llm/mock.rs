//! Scripted model clients for tests and offline runs.

use std::sync::Mutex;

use futures_util::stream;
use tokio::sync::mpsc;

use super::{ChatMessage, DeltaStream, LlmError, ModelCallConfig, ModelClient};

/// Replays a fixed delta sequence, optionally ending in an error.
pub struct MockModelClient {
    script: Vec<Result<String, LlmError>>,
    calls: Mutex<Vec<(Vec<ChatMessage>, ModelCallConfig)>>,
}

impl MockModelClient {
    pub fn new(deltas: &[&str]) -> Self {
        Self {
            script: deltas.iter().map(|d| Ok(d.to_string())).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Yield `deltas`, then fail with `error`.
    pub fn failing_after(deltas: &[&str], error: LlmError) -> Self {
        let mut client = Self::new(deltas);
        client.script.push(Err(error));
        client
    }

    /// Every transcript and config passed to `stream_chat`, in call order.
    pub fn calls(&self) -> Vec<(Vec<ChatMessage>, ModelCallConfig)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ModelClient for MockModelClient {
    fn stream_chat(&self, messages: Vec<ChatMessage>, config: ModelCallConfig) -> DeltaStream {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((messages, config));
        }
        Box::pin(stream::iter(self.script.clone()))
    }
}

/// Hands out deltas as a test pushes them, so tests control timing.
///
/// Only the first `stream_chat` call receives the channel; later calls get
/// an empty stream.
pub struct ChannelModelClient {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<String, LlmError>>>>,
}

impl ChannelModelClient {
    pub fn channel() -> (Self, mpsc::UnboundedSender<Result<String, LlmError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

impl ModelClient for ChannelModelClient {
    fn stream_chat(&self, _messages: Vec<ChatMessage>, _config: ModelCallConfig) -> DeltaStream {
        let rx = self.rx.lock().ok().and_then(|mut slot| slot.take());
        let Some(mut rx) = rx else {
            return Box::pin(stream::empty());
        };
        Box::pin(async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        })
    }
}
