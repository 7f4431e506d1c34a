//! Handle to one remote box.

use crate::client::Shared;
use crate::error::{Error, ResourceKind, Result};
use crate::executor::{CommandOptions, Executor};
use crate::models::{
    BoxInfo, BoxStatus, CommandResult, CreateSnapshotRequest, DataEnvelope, ExposePortRequest,
    ExposedPort, RestoreSnapshotRequest, Snapshot, SnapshotStatus,
};
use crate::poller::{poll_until, Probe, WaitOptions};
use std::collections::HashMap;
use std::sync::Arc;

/// A box on the service, with the state from its last refresh.
///
/// Cloning is cheap; clones share the client but each keeps its own copy of
/// the box state. Commands run through `&self`, so one handle can drive
/// several commands concurrently.
#[derive(Clone)]
pub struct BoxHandle {
    shared: Arc<Shared>,
    info: BoxInfo,
}

impl std::fmt::Debug for BoxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxHandle").field("info", &self.info).finish()
    }
}

impl BoxHandle {
    pub(crate) fn new(shared: Arc<Shared>, info: BoxInfo) -> Self {
        Self { shared, info }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Status as of the last refresh.
    pub fn status(&self) -> BoxStatus {
        self.info.status
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.info.metadata
    }

    pub fn hostname(&self) -> Option<&str> {
        self.info.hostname.as_deref()
    }

    /// Full state as of the last refresh.
    pub fn info(&self) -> &BoxInfo {
        &self.info
    }

    fn path(&self, suffix: &str) -> String {
        format!("/boxes/{}{}", self.info.id, suffix)
    }

    /// Replace the cached state with the service's current view.
    pub async fn refresh(&mut self) -> Result<()> {
        let resp: DataEnvelope<BoxInfo> = self.shared.transport.get(&self.path("")).await?;
        tracing::trace!(box_id = %self.info.id, status = %resp.data.status, "Box refreshed");
        self.info = resp.data;
        Ok(())
    }

    /// Default deadline and cadence for readiness waits, from the client config.
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new(
            self.shared.config.box_ready_timeout,
            self.shared.config.poll_interval,
        )
    }

    /// Wait for the box to reach `running` with the configured defaults.
    pub async fn wait_until_ready(&mut self) -> Result<()> {
        let opts = self.wait_options();
        self.wait_until_ready_with(opts).await
    }

    /// Wait for the box to reach `running`.
    ///
    /// `failed` and `terminated` end the wait at once with
    /// [`Error::ResourceFailed`]; any other status keeps polling until the
    /// deadline, then fails with [`Error::ResourceTimeout`].
    pub async fn wait_until_ready_with(&mut self, opts: WaitOptions) -> Result<()> {
        let transport = &self.shared.transport;
        let path = self.path("");
        let path = path.as_str();
        let box_id = self.info.id.clone();
        tracing::debug!(box_id = %box_id, timeout_secs = opts.timeout.as_secs(), "Waiting for box");

        let info = poll_until(
            &opts,
            || Error::ResourceTimeout {
                kind: ResourceKind::Box,
                resource_id: box_id.clone(),
                timeout_secs: opts.timeout.as_secs(),
            },
            move || async move {
                let resp: DataEnvelope<BoxInfo> = transport.get(path).await?;
                let info = resp.data;
                Ok(match info.status {
                    BoxStatus::Running => Probe::Ready(info),
                    status if status.is_failed() => Probe::Failed(Error::resource_failed(
                        ResourceKind::Box,
                        &info.id,
                        status.to_string(),
                        info.details.as_deref(),
                    )),
                    _ => Probe::Pending,
                })
            },
        )
        .await?;

        tracing::info!(box_id = %info.id, hostname = ?info.hostname, "Box ready");
        self.info = info;
        Ok(())
    }

    /// Run a shell command to completion.
    ///
    /// See [`CommandOptions`] for mode selection, callbacks and deadlines.
    pub async fn run(&self, command: &str, opts: CommandOptions<'_>) -> Result<CommandResult> {
        Executor::new(&self.shared.transport, &self.shared.config, &self.info.id)
            .run(command, opts)
            .await
    }

    /// Stop the box. The service tears it down asynchronously.
    pub async fn stop(&self) -> Result<()> {
        tracing::info!(box_id = %self.info.id, "Stopping box");
        self.shared.transport.delete_empty(&self.path("")).await
    }

    /// Suspend a running box.
    pub async fn pause(&self) -> Result<()> {
        tracing::debug!(box_id = %self.info.id, "Pausing box");
        self.shared
            .transport
            .post_empty(&self.path("/pause"), &serde_json::json!({}))
            .await
    }

    /// Resume a paused box.
    pub async fn resume(&self) -> Result<()> {
        tracing::debug!(box_id = %self.info.id, "Resuming box");
        self.shared
            .transport
            .post_empty(&self.path("/resume"), &serde_json::json!({}))
            .await
    }

    /// Public web URL for `port`, e.g. `https://8080-<hostname>`.
    ///
    /// Fails with [`Error::MissingHostname`] until the box has a hostname.
    pub fn public_url(&self, port: u16) -> Result<String> {
        match self.info.hostname.as_deref() {
            Some(host) if !host.is_empty() => Ok(format!("https://{port}-{host}")),
            _ => Err(Error::MissingHostname {
                box_id: self.info.id.clone(),
            }),
        }
    }

    /// Map `target_port` inside the box to a temporary port on the proxy.
    ///
    /// A box that is not running is rejected by the service with a 409,
    /// see [`Error::is_conflict`].
    pub async fn expose_port(&self, target_port: u16) -> Result<ExposedPort> {
        let resp: DataEnvelope<ExposedPort> = self
            .shared
            .transport
            .post(
                &self.path("/expose_port"),
                &ExposePortRequest { port: target_port },
            )
            .await?;
        tracing::debug!(
            box_id = %self.info.id,
            target_port,
            proxy_port = resp.data.proxy_port,
            expires_at = %resp.data.expires_at,
            "Port exposed"
        );
        Ok(resp.data)
    }

    pub async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let resp: DataEnvelope<Vec<Snapshot>> =
            self.shared.transport.get(&self.path("/snapshots")).await?;
        Ok(resp.data)
    }

    pub async fn get_snapshot(&self, snapshot_id: &str) -> Result<Snapshot> {
        let resp: DataEnvelope<Snapshot> = self
            .shared
            .transport
            .get(&self.path(&format!("/snapshots/{snapshot_id}")))
            .await?;
        Ok(resp.data)
    }

    /// Start a snapshot of the box's disk. Empty label or description are
    /// not sent.
    pub async fn create_snapshot(
        &self,
        label: Option<&str>,
        description: Option<&str>,
    ) -> Result<Snapshot> {
        let request = CreateSnapshotRequest {
            label: label.filter(|s| !s.is_empty()),
            description: description.filter(|s| !s.is_empty()),
        };
        let resp: DataEnvelope<Snapshot> = self
            .shared
            .transport
            .post(&self.path("/snapshots"), &request)
            .await?;
        tracing::info!(box_id = %self.info.id, snapshot_id = %resp.data.id, "Snapshot requested");
        Ok(resp.data)
    }

    /// Restore the box's disk from a snapshot.
    pub async fn restore_snapshot(&self, snapshot_id: &str) -> Result<Snapshot> {
        let resp: DataEnvelope<Snapshot> = self
            .shared
            .transport
            .post(&self.path("/restore"), &RestoreSnapshotRequest { snapshot_id })
            .await?;
        tracing::info!(box_id = %self.info.id, snapshot_id, "Snapshot restore requested");
        Ok(resp.data)
    }

    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<Snapshot> {
        let resp: DataEnvelope<Snapshot> = self
            .shared
            .transport
            .delete(&self.path(&format!("/snapshots/{snapshot_id}")))
            .await?;
        Ok(resp.data)
    }

    /// Wait for a snapshot to reach `ready`.
    ///
    /// `error` and `deleted` fail at once. Running out of time yields
    /// [`Error::CommandTimeout`] carrying the snapshot id and the deadline in
    /// milliseconds.
    pub async fn wait_snapshot_ready(&self, snapshot_id: &str, opts: WaitOptions) -> Result<Snapshot> {
        let transport = &self.shared.transport;
        let path = self.path(&format!("/snapshots/{snapshot_id}"));
        let path = path.as_str();
        tracing::debug!(box_id = %self.info.id, snapshot_id, "Waiting for snapshot");

        poll_until(
            &opts,
            || Error::CommandTimeout {
                command_id: snapshot_id.to_string(),
                timeout_ms: opts.timeout.as_millis() as u64,
            },
            move || async move {
                let resp: DataEnvelope<Snapshot> = transport.get(path).await?;
                let snapshot = resp.data;
                Ok(match snapshot.status {
                    SnapshotStatus::Ready => Probe::Ready(snapshot),
                    status if status.is_failed() => Probe::Failed(Error::resource_failed(
                        ResourceKind::Snapshot,
                        &snapshot.id,
                        status.to_string(),
                        None,
                    )),
                    _ => Probe::Pending,
                })
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::config::ClientConfig;

    fn handle(hostname: Option<&str>) -> BoxHandle {
        let config = ClientConfig::builder()
            .api_key("test-key")
            .base_url("http://localhost:1")
            .build()
            .unwrap();
        let client = Client::new(config).unwrap();
        let mut info = BoxInfo::queued("box-1");
        info.hostname = hostname.map(String::from);
        BoxHandle::new(client.shared(), info)
    }

    #[test]
    fn test_public_url() {
        let h = handle(Some("box-1.tavor.app"));
        assert_eq!(h.public_url(8080).unwrap(), "https://8080-box-1.tavor.app");
    }

    #[test]
    fn test_public_url_requires_hostname() {
        for host in [None, Some("")] {
            let err = handle(host).public_url(3000).unwrap_err();
            assert!(matches!(err, Error::MissingHostname { .. }));
            assert!(err.to_string().contains("box-1"));
        }
    }

    #[test]
    fn test_accessors_reflect_cached_state() {
        let h = handle(None);
        assert_eq!(h.id(), "box-1");
        assert_eq!(h.status(), BoxStatus::Queued);
        assert!(h.metadata().is_empty());
        assert!(h.hostname().is_none());
    }
}
