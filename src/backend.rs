use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::app::ChatMessage;
use crate::config::{Endpoint, API_PATH_VAR, API_URL_VAR};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat endpoint not configured (CHAT_API_URL / CHAT_API_PATH)")]
    ConfigurationMissing,
    #[error("chat request failed with status {0}")]
    RequestFailed(u16),
    #[error("chat stream failed: {0}")]
    StreamFailed(String),
}

/// Events emitted over the lifetime of one exchange. The final event on the
/// channel is always `Done` or `Failed`.
#[derive(Debug)]
pub enum StreamEvent {
    Chunk(String),
    Done,
    Failed(ChatError),
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
}

impl ChatClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Dispatch one exchange. The full conversation so far (newest user
    /// message included) is posted as JSON; reply text arrives on the
    /// returned receiver chunk by chunk. The endpoint is resolved from the
    /// environment here, before any network activity.
    pub fn stream_chat(&self, history: Vec<ChatMessage>) -> mpsc::UnboundedReceiver<StreamEvent> {
        match Endpoint::from_env() {
            Some(endpoint) => self.spawn_stream(endpoint, history),
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                tracing::error!(
                    "{} and {} must both be set to reach the chat backend",
                    API_URL_VAR,
                    API_PATH_VAR
                );
                let _ = tx.send(StreamEvent::Failed(ChatError::ConfigurationMissing));
                rx
            }
        }
    }

    fn spawn_stream(
        &self,
        endpoint: Endpoint,
        history: Vec<ChatMessage>,
    ) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();

        tokio::spawn(async move {
            match run_stream(client, endpoint, history, &tx).await {
                Ok(()) => {
                    let _ = tx.send(StreamEvent::Done);
                }
                Err(err) => {
                    tracing::error!(error = %err, "chat exchange failed");
                    let _ = tx.send(StreamEvent::Failed(err));
                }
            }
        });

        rx
    }
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_stream(
    client: Client,
    endpoint: Endpoint,
    history: Vec<ChatMessage>,
    tx: &mpsc::UnboundedSender<StreamEvent>,
) -> Result<(), ChatError> {
    let response = client
        .post(endpoint.url())
        .json(&ChatRequest { messages: &history })
        .send()
        .await
        .map_err(|err| ChatError::StreamFailed(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ChatError::RequestFailed(status.as_u16()));
    }

    let mut stream = response.bytes_stream();
    let mut decoder = StreamDecoder::new();

    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|err| ChatError::StreamFailed(err.to_string()))?;
        let text = decoder.feed(&bytes);
        if !text.is_empty() && tx.send(StreamEvent::Chunk(text)).is_err() {
            // Receiver dropped, the session was torn down mid-stream.
            return Ok(());
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        let _ = tx.send(StreamEvent::Chunk(tail));
    }

    Ok(())
}

/// Incremental UTF-8 decoder for streamed response bodies. Multi-byte
/// characters may split across chunk boundaries, so an incomplete trailing
/// sequence is held back until the next chunk instead of being decoded
/// lossily per chunk.
pub struct StreamDecoder {
    pending: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Decode as much of the buffered input as possible, returning the
    /// newly decoded text. Invalid sequences become U+FFFD.
    pub fn feed(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid_len = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid_len]));
                    match err.error_len() {
                        Some(invalid_len) => {
                            out.push('\u{FFFD}');
                            self.pending.drain(..valid_len + invalid_len);
                        }
                        None => {
                            // Incomplete trailing sequence, wait for more bytes.
                            self.pending.drain(..valid_len);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush any bytes still pending at end of stream. A truncated trailing
    /// sequence decodes to a single replacement character.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            "\u{FFFD}".to_string()
        }
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}
