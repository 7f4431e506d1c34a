//! Server-sent-events decoding for streamed command output.
//!
//! The service frames each event as
//!
//! ```text
//! event: output
//! data: {"stdout":"hello\n"}
//!
//! ```
//!
//! Only the minimal subset needed by this protocol is supported: one `event`
//! line and one single-line `data` payload per block. `id:`, `retry:` and
//! comment lines are ignored. Lines are decoded lossily, so stray invalid
//! UTF-8 never aborts the stream. Payloads are not validated here; the
//! executor parses them per event type.

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::io::StreamReader;

/// One decoded `(event, data)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name from the `event:` line.
    pub event: String,
    /// Raw payload from the `data:` line.
    pub data: String,
}

impl SseEvent {
    /// Parse the payload as JSON.
    pub fn parse<'a, T: Deserialize<'a>>(&'a self) -> serde_json::Result<T> {
        serde_json::from_str(&self.data)
    }
}

/// Reader over an HTTP response body.
pub type ResponseReader = StreamReader<BoxStream<'static, std::io::Result<Bytes>>, Bytes>;

/// Incremental decoder turning a byte stream into [`SseEvent`]s.
///
/// Single pass and not restartable: once [`next_event`](Self::next_event)
/// returns `Ok(None)` the underlying stream is exhausted.
pub struct SseDecoder<R> {
    reader: R,
    line: Vec<u8>,
    event: String,
    data: String,
}

impl<R: AsyncBufRead + Unpin> SseDecoder<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            event: String::new(),
            data: String::new(),
        }
    }

    /// Read until the next complete event, or `None` at end of stream.
    ///
    /// A block is emitted only when both an event name and a non-empty
    /// payload were seen before the blank line that closes it. A trailing
    /// block without a closing blank line is dropped.
    pub async fn next_event(&mut self) -> std::io::Result<Option<SseEvent>> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
                return Ok(None);
            }

            let raw = trim_line_end(&self.line);
            if raw.is_empty() {
                let event = std::mem::take(&mut self.event);
                let data = std::mem::take(&mut self.data);
                if !event.is_empty() && !data.is_empty() {
                    tracing::trace!(event = %event, data_len = data.len(), "SSE event decoded");
                    return Ok(Some(SseEvent { event, data }));
                }
                continue;
            }

            let line = String::from_utf8_lossy(raw);
            if let Some(value) = field_value(&line, "event") {
                self.event = value.to_string();
            } else if let Some(value) = field_value(&line, "data") {
                self.data = value.to_string();
            }
        }
    }

    /// Turn the decoder into a lazy stream of events.
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<SseEvent>>
    where
        R: Send + 'static,
    {
        futures::stream::unfold(self, |mut decoder| async move {
            match decoder.next_event().await {
                Ok(Some(event)) => Some((Ok(event), decoder)),
                Ok(None) => None,
                Err(e) => Some((Err(e), decoder)),
            }
        })
    }
}

impl SseDecoder<ResponseReader> {
    /// Decode the body of a streaming HTTP response.
    pub fn from_response(response: reqwest::Response) -> Self {
        let body = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();
        Self::new(StreamReader::new(body))
    }
}

/// Strip the `\n` or `\r\n` terminator.
fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Value of `name: value` (the single space after the colon is optional).
fn field_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Payload of a `start` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StartData {
    #[serde(alias = "id")]
    pub command_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Payload of an `output` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputData {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
}

/// Payload of a `status` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

/// Payload of an `end` event.
#[derive(Debug, Clone, Deserialize)]
pub struct EndData {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

/// Payload of an `error` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub error: Option<String>,
}
