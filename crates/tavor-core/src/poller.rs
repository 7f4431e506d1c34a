//! Generic "poll until terminal state or deadline" loop.
//!
//! Box readiness and snapshot readiness are both instances of [`poll_until`]:
//! the caller supplies a probe that fetches the resource once and classifies
//! it, and the loop owns deadline accounting, poll cadence and cancellation.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline, cadence and cancellation for a readiness wait.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Overall deadline, measured from the first probe.
    pub timeout: Duration,
    /// Pause between probes.
    pub poll_interval: Duration,
    /// Aborts the wait with [`Error::Cancelled`] when fired.
    pub cancel: Option<CancellationToken>,
}

impl WaitOptions {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            cancel: None,
        }
    }

    /// Set the overall deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the pause between probes.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Attach a cancellation token.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Outcome of one probe.
#[derive(Debug)]
pub enum Probe<T> {
    /// The resource reached its ready state.
    Ready(T),
    /// Not there yet; poll again.
    Pending,
    /// Terminal failure; returned immediately regardless of the deadline.
    Failed(Error),
}

/// Drive `probe` until it reports ready or failed, or the deadline passes.
///
/// The terminal check runs before the deadline check, so a probe that
/// observes readiness at exactly the deadline still succeeds. Only a
/// non-terminal probe made strictly after the deadline produces the error
/// built by `on_timeout`.
pub async fn poll_until<T, F, Fut, E>(opts: &WaitOptions, on_timeout: E, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>>>,
    E: FnOnce() -> Error,
{
    let start = Instant::now();
    let deadline = start + opts.timeout;
    let cancel = opts.cancel.as_ref();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match cancellable(cancel, probe()).await? {
            Probe::Ready(value) => {
                tracing::debug!(
                    attempt,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Resource ready"
                );
                return Ok(value);
            }
            Probe::Failed(e) => {
                tracing::debug!(attempt, error = %e, "Resource reached a failed state");
                return Err(e);
            }
            Probe::Pending => {}
        }

        if Instant::now() > deadline {
            tracing::debug!(
                attempt,
                timeout_ms = opts.timeout.as_millis() as u64,
                "Readiness deadline exceeded"
            );
            return Err(on_timeout());
        }

        tracing::trace!(attempt, "Resource not ready, sleeping");
        sleep(cancel, opts.poll_interval).await?;
    }
}

/// Await `fut`, returning [`Error::Cancelled`] as soon as `cancel` fires.
///
/// Cancellation wins when both are ready at the same poll.
pub async fn cancellable<T, F>(cancel: Option<&CancellationToken>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            result = fut => result,
        },
        None => fut.await,
    }
}

/// Resolves when `cancel` fires; never resolves without a token.
pub(crate) async fn cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Cancellable sleep.
pub(crate) async fn sleep(cancel: Option<&CancellationToken>, duration: Duration) -> Result<()> {
    cancellable(cancel, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}
