//! Command execution: submit a command to a box and follow it to a
//! terminal state.
//!
//! Two modes share one contract:
//!
//! - **Polling**: queue the command, then fetch its full state at a fixed
//!   cadence. Each fetch carries the accumulated output; new bytes are found
//!   by comparing against what this call has already seen.
//! - **Streaming**: queue the command with `stream: true` and read the
//!   response as an event stream (`start`, `output`, `status`, `end`,
//!   `error`, `timeout`).
//!
//! [`ExecMode::Auto`] picks streaming when an output callback is set and
//! polling otherwise. All per-call state lives on the stack of
//! [`Executor::run`], so one box handle can run several commands at once.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::{Command, CommandResult, CommandStatus, IdResponse, QueueCommandRequest};
use crate::poller::{cancellable, cancelled, sleep};
use crate::sse::{EndData, ErrorData, OutputData, SseDecoder, SseEvent, StartData, StatusData};
use crate::transport::HttpTransport;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Extra HTTP budget for a streaming request beyond the command deadline.
const STREAM_GRACE: Duration = Duration::from_secs(30);

/// Callback receiving one line of output, without its trailing newline.
pub type LineCallback<'a> = Box<dyn FnMut(&str) + Send + 'a>;

/// How a command is followed to completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecMode {
    /// Stream if an output callback is set, poll otherwise.
    #[default]
    Auto,
    /// Always poll, even with callbacks set.
    Polling,
    /// Always stream, even without callbacks.
    Streaming,
}

/// Per-call options for [`BoxHandle::run`](crate::BoxHandle::run).
///
/// Unset durations fall back to the client configuration.
#[derive(Default)]
pub struct CommandOptions<'a> {
    /// Client-side deadline for the whole command.
    pub timeout: Option<Duration>,
    /// Fetch cadence in polling mode. Ignored when streaming.
    pub poll_interval: Option<Duration>,
    pub on_stdout: Option<LineCallback<'a>>,
    pub on_stderr: Option<LineCallback<'a>>,
    pub cancel: Option<CancellationToken>,
    pub mode: ExecMode,
    /// Server-side execution limit, sent as `timeout_ms`.
    pub remote_timeout: Option<Duration>,
}

impl<'a> CommandOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Receive stdout line by line.
    pub fn on_stdout(mut self, f: impl FnMut(&str) + Send + 'a) -> Self {
        self.on_stdout = Some(Box::new(f));
        self
    }

    /// Receive stderr line by line.
    pub fn on_stderr(mut self, f: impl FnMut(&str) + Send + 'a) -> Self {
        self.on_stderr = Some(Box::new(f));
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = Some(timeout);
        self
    }

    fn has_callbacks(&self) -> bool {
        self.on_stdout.is_some() || self.on_stderr.is_some()
    }
}

impl fmt::Debug for CommandOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandOptions")
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .field("cancel", &self.cancel.is_some())
            .field("mode", &self.mode)
            .field("remote_timeout", &self.remote_timeout)
            .finish()
    }
}

/// Runs commands against one box.
pub(crate) struct Executor<'a> {
    transport: &'a HttpTransport,
    config: &'a ClientConfig,
    box_id: &'a str,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(transport: &'a HttpTransport, config: &'a ClientConfig, box_id: &'a str) -> Self {
        Self {
            transport,
            config,
            box_id,
        }
    }

    /// Run `command` to a terminal state.
    pub(crate) async fn run(&self, command: &str, mut opts: CommandOptions<'_>) -> Result<CommandResult> {
        let timeout = opts.timeout.unwrap_or(self.config.command_timeout);
        let streaming = match opts.mode {
            ExecMode::Auto => opts.has_callbacks(),
            ExecMode::Polling => false,
            ExecMode::Streaming => true,
        };

        tracing::debug!(
            box_id = %self.box_id,
            command = %command,
            streaming,
            timeout_ms = timeout.as_millis() as u64,
            "Running command"
        );

        if streaming {
            self.run_streaming(command, timeout, &mut opts).await
        } else {
            self.run_polling(command, timeout, &mut opts).await
        }
    }

    async fn run_polling(
        &self,
        command: &str,
        timeout: Duration,
        opts: &mut CommandOptions<'_>,
    ) -> Result<CommandResult> {
        let cancel = opts.cancel.clone();
        let cancel = cancel.as_ref();
        let interval = opts.poll_interval.unwrap_or(self.config.poll_interval);

        let request = QueueCommandRequest {
            command,
            stream: false,
            timeout_ms: opts.remote_timeout.map(|d| d.as_millis() as u64),
        };
        let queued: IdResponse = cancellable(
            cancel,
            self.transport.post(&format!("/boxes/{}", self.box_id), &request),
        )
        .await?;
        let command_id = queued.id;
        tracing::debug!(box_id = %self.box_id, command_id = %command_id, "Command queued");

        let path = format!("/boxes/{}/commands/{}", self.box_id, command_id);
        let start = Instant::now();
        let deadline = start + timeout;
        let mut stdout = LineBuffer::default();
        let mut stderr = LineBuffer::default();

        loop {
            let cmd: Command = cancellable(cancel, self.transport.get(&path)).await?;
            stdout.feed(&cmd.stdout, &mut opts.on_stdout);
            stderr.feed(&cmd.stderr, &mut opts.on_stderr);

            if cmd.status.is_terminal() {
                stdout.flush(&mut opts.on_stdout);
                stderr.flush(&mut opts.on_stderr);
                tracing::debug!(
                    command_id = %command_id,
                    status = %cmd.status,
                    exit_code = ?cmd.exit_code,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Command finished"
                );
                return Ok(self.finish(cmd, command));
            }

            if Instant::now() > deadline {
                tracing::debug!(command_id = %command_id, status = %cmd.status, "Command deadline exceeded");
                return Err(Error::CommandTimeout {
                    command_id,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            sleep(cancel, interval).await?;
        }
    }

    async fn run_streaming(
        &self,
        command: &str,
        timeout: Duration,
        opts: &mut CommandOptions<'_>,
    ) -> Result<CommandResult> {
        let cancel = opts.cancel.clone();
        let cancel = cancel.as_ref();

        let request = QueueCommandRequest {
            command,
            stream: true,
            timeout_ms: opts.remote_timeout.map(|d| d.as_millis() as u64),
        };
        let response = cancellable(
            cancel,
            self.transport.open_stream(
                &format!("/boxes/{}", self.box_id),
                &request,
                timeout + STREAM_GRACE,
            ),
        )
        .await?;

        let start = Instant::now();
        let deadline = start + timeout;
        let mut events = SseDecoder::from_response(response);
        let mut run = StreamRun::new(self.box_id, command, timeout);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel) => return Err(Error::Cancelled),
                event = events.next_event() => event,
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::debug!(command_id = %run.command_id, "Command deadline exceeded while streaming");
                    return Err(run.timeout_error());
                }
            };

            let event = match next {
                Ok(Some(event)) => event,
                Ok(None) => {
                    tracing::warn!(
                        box_id = %self.box_id,
                        command_id = %run.command_id,
                        "Event stream closed before a terminal event, returning partial result"
                    );
                    return Ok(run.into_result());
                }
                // A broken body after the stream opened is treated like a close.
                Err(e) => {
                    tracing::warn!(
                        box_id = %self.box_id,
                        command_id = %run.command_id,
                        error = %e,
                        "Event stream failed before a terminal event, returning partial result"
                    );
                    return Ok(run.into_result());
                }
            };

            if Instant::now() > deadline {
                return Err(run.timeout_error());
            }

            if let Step::Finished(result) = run.handle(&event, opts)? {
                tracing::debug!(
                    command_id = %result.id,
                    status = %result.status,
                    exit_code = ?result.exit_code,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Command finished"
                );
                return Ok(result);
            }
        }
    }

    fn finish(&self, cmd: Command, command: &str) -> CommandResult {
        let mut result = CommandResult::from(cmd);
        if result.box_id.is_empty() {
            result.box_id = self.box_id.to_string();
        }
        if result.cmd.is_empty() {
            result.cmd = command.to_string();
        }
        result
    }
}

/// Tracks how much of an accumulated output buffer one call has delivered.
///
/// Only newly appended bytes are split into lines; an incomplete trailing
/// line waits for the next fetch or for [`flush`](Self::flush).
#[derive(Debug, Default)]
struct LineBuffer {
    seen: usize,
    partial: String,
}

impl LineBuffer {
    fn feed(&mut self, total: &str, sink: &mut Option<LineCallback<'_>>) {
        let Some(cb) = sink.as_mut() else {
            return;
        };
        if total.len() <= self.seen {
            return;
        }
        let Some(delta) = total.get(self.seen..) else {
            tracing::warn!(seen = self.seen, len = total.len(), "Output prefix changed between fetches");
            self.seen = total.len();
            return;
        };
        self.seen = total.len();
        self.partial.push_str(delta);

        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            cb(&line[..line.len() - 1]);
        }
    }

    fn flush(&mut self, sink: &mut Option<LineCallback<'_>>) {
        if let Some(cb) = sink.as_mut() {
            if !self.partial.is_empty() {
                cb(&self.partial);
            }
        }
        self.partial.clear();
    }
}

/// Deliver one streamed fragment line by line.
///
/// Each `\n`-separated piece fires once, except an empty final piece, so
/// `"A\nB"` delivers `A` and `B` and `"C\n"` delivers only `C`.
fn dispatch_fragment(fragment: &str, sink: &mut Option<LineCallback<'_>>) {
    let Some(cb) = sink.as_mut() else {
        return;
    };
    let mut pieces = fragment.split('\n').peekable();
    while let Some(piece) = pieces.next() {
        if pieces.peek().is_some() || !piece.is_empty() {
            cb(piece);
        }
    }
}

enum Step {
    Continue,
    Finished(CommandResult),
}

/// State accumulated from one command's event stream.
struct StreamRun {
    box_id: String,
    cmd: String,
    command_id: String,
    status: CommandStatus,
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    timeout_ms: u64,
}

impl StreamRun {
    fn new(box_id: &str, cmd: &str, timeout: Duration) -> Self {
        Self {
            box_id: box_id.to_string(),
            cmd: cmd.to_string(),
            command_id: String::new(),
            status: CommandStatus::Queued,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    fn handle(&mut self, event: &SseEvent, opts: &mut CommandOptions<'_>) -> Result<Step> {
        match event.event.as_str() {
            "start" => {
                if let Some(data) = decode::<StartData>(event) {
                    tracing::debug!(command_id = %data.command_id, "Command started");
                    self.command_id = data.command_id;
                    if let Some(status) = data.status {
                        self.status = CommandStatus::parse(&status);
                    }
                }
            }
            "output" => {
                if let Some(data) = decode::<OutputData>(event) {
                    if let Some(s) = data.stdout.filter(|s| !s.is_empty()) {
                        self.stdout.push_str(&s);
                        dispatch_fragment(&s, &mut opts.on_stdout);
                    }
                    if let Some(s) = data.stderr.filter(|s| !s.is_empty()) {
                        self.stderr.push_str(&s);
                        dispatch_fragment(&s, &mut opts.on_stderr);
                    }
                }
            }
            "status" => {
                if let Some(data) = decode::<StatusData>(event) {
                    if let Some(status) = data.status {
                        self.status = CommandStatus::parse(&status);
                    }
                    if data.exit_code.is_some() {
                        self.exit_code = data.exit_code;
                    }
                }
            }
            "end" => {
                let data = decode::<EndData>(event);
                if let Some(data) = data {
                    match data.status.as_deref() {
                        Some("timeout") => return Err(self.timeout_error()),
                        Some(status) => self.status = CommandStatus::parse(status),
                        None => {}
                    }
                    if data.exit_code.is_some() {
                        self.exit_code = data.exit_code;
                    }
                }
                return Ok(Step::Finished(self.snapshot()));
            }
            "error" => {
                let message = decode::<ErrorData>(event)
                    .and_then(|d| d.error)
                    .unwrap_or_else(|| "unknown error".to_string());
                return Err(Error::CommandFailed {
                    command_id: self.command_id.clone(),
                    message,
                });
            }
            "timeout" => return Err(self.timeout_error()),
            other => tracing::trace!(event = %other, "Ignoring unknown event"),
        }
        Ok(Step::Continue)
    }

    fn timeout_error(&self) -> Error {
        Error::CommandTimeout {
            command_id: self.command_id.clone(),
            timeout_ms: self.timeout_ms,
        }
    }

    fn snapshot(&self) -> CommandResult {
        CommandResult {
            id: self.command_id.clone(),
            box_id: self.box_id.clone(),
            cmd: self.cmd.clone(),
            status: self.status,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            exit_code: self.exit_code,
        }
    }

    /// Partial result for a stream that closed without a terminal event.
    fn into_result(self) -> CommandResult {
        CommandResult {
            id: self.command_id,
            box_id: self.box_id,
            cmd: self.cmd,
            status: self.status,
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code: self.exit_code,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &SseEvent) -> Option<T> {
    match serde_json::from_str(&event.data) {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::warn!(event = %event.event, error = %e, "Malformed event payload");
            None
        }
    }
}
