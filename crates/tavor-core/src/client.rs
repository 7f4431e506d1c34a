//! Entry point for talking to the sandbox service.

use crate::config::{BoxConfig, ClientConfig};
use crate::domains::{CreateDomainRequest, DomainResponse, DomainsResponse, UpdateDomainRequest};
use crate::error::{Error, Result};
use crate::handle::BoxHandle;
use crate::models::{BoxInfo, CreateBoxRequest, DataEnvelope, IdResponse};
use crate::transport::HttpTransport;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Time allowed for the cleanup stop in [`Client::with_sandbox`].
const SANDBOX_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// State shared by a client and every handle it hands out.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) transport: HttpTransport,
    pub(crate) config: ClientConfig,
}

/// Client for the sandbox service.
///
/// Cheap to clone; clones share one connection pool.
///
/// # Example
///
/// ```ignore
/// use tavor_core::{BoxConfig, Client, ClientConfig, CommandOptions};
///
/// # async fn example() -> tavor_core::Result<()> {
/// let client = Client::new(ClientConfig::from_env())?;
///
/// let output = client
///     .with_sandbox(BoxConfig::default(), |sandbox| async move {
///         let result = sandbox.run("echo hello", CommandOptions::new()).await?;
///         Ok(result.stdout)
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Build a client from a resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] without an API key and
    /// [`Error::Config`] for an unusable base URL or poll interval.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        tracing::debug!(base_url = %config.base_url, "Client created");
        Ok(Self {
            shared: Arc::new(Shared { transport, config }),
        })
    }

    /// Build a client from `TAVOR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub(crate) fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    /// Request a new box.
    ///
    /// Returns as soon as the service accepts the request; the handle starts
    /// out `queued`. Use [`BoxHandle::wait_until_ready`] before running
    /// commands.
    pub async fn create_box(&self, config: BoxConfig) -> Result<BoxHandle> {
        config.validate()?;
        let request = CreateBoxRequest {
            cpu: config.cpu,
            mib_ram: config.mib_ram,
            timeout: config.timeout,
            metadata: &config.metadata,
        };
        let created: IdResponse = self.shared.transport.post("/boxes", &request).await?;
        tracing::info!(box_id = %created.id, cpu = ?config.cpu, mib_ram = ?config.mib_ram, "Box created");

        let mut info = BoxInfo::queued(created.id);
        info.metadata = config.metadata;
        Ok(BoxHandle::new(self.shared(), info))
    }

    pub async fn list_boxes(&self) -> Result<Vec<BoxInfo>> {
        let resp: DataEnvelope<Vec<BoxInfo>> = self.shared.transport.get("/boxes").await?;
        tracing::debug!(count = resp.data.len(), "Listed boxes");
        Ok(resp.data)
    }

    /// Fetch an existing box.
    pub async fn get_box(&self, box_id: &str) -> Result<BoxHandle> {
        let resp: DataEnvelope<BoxInfo> = self
            .shared
            .transport
            .get(&format!("/boxes/{box_id}"))
            .await?;
        Ok(BoxHandle::new(self.shared(), resp.data))
    }

    /// Create a box, wait for it, run `f` against it and stop it.
    ///
    /// The box is stopped whether `f` succeeds or fails, and also when the
    /// readiness wait fails. A failed stop is logged, not returned; the
    /// result of `f` (or of the wait) wins. Dropping the returned future
    /// before it completes skips the stop.
    pub async fn with_sandbox<F, Fut, R>(&self, config: BoxConfig, f: F) -> Result<R>
    where
        F: FnOnce(BoxHandle) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let mut sandbox = self.create_box(config).await?;
        tracing::debug!(box_id = %sandbox.id(), "Created box for scoped use");

        let outcome = match sandbox.wait_until_ready().await {
            Ok(()) => f(sandbox.clone()).await,
            Err(e) => Err(e),
        };

        match tokio::time::timeout(SANDBOX_STOP_TIMEOUT, sandbox.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(box_id = %sandbox.id(), error = %e, "Failed to stop box");
            }
            Err(_) => {
                tracing::error!(
                    box_id = %sandbox.id(),
                    timeout_secs = SANDBOX_STOP_TIMEOUT.as_secs(),
                    "Timed out stopping box"
                );
            }
        }

        outcome
    }

    pub async fn list_domains(&self) -> Result<DomainsResponse> {
        self.shared.transport.get("/domains").await
    }

    pub async fn get_domain(&self, domain_id: &str) -> Result<DomainResponse> {
        self.shared
            .transport
            .get(&format!("/domains/{domain_id}"))
            .await
    }

    pub async fn create_domain(&self, request: &CreateDomainRequest) -> Result<DomainResponse> {
        let resp: DomainResponse = self.shared.transport.post("/domains", request).await?;
        tracing::info!(domain_id = %resp.data.id, hostname = %resp.data.hostname, "Domain created");
        Ok(resp)
    }

    /// Partially update a domain. Only fields that are not
    /// [`UpdateField::Unset`](crate::UpdateField::Unset) are sent.
    pub async fn update_domain(
        &self,
        domain_id: &str,
        request: &UpdateDomainRequest,
    ) -> Result<DomainResponse> {
        if request.status.is_unset() && request.target_port.is_unset() && request.box_id.is_unset() {
            return Err(Error::Validation {
                field: String::new(),
                message: "update request has no fields set".into(),
            });
        }
        self.shared
            .transport
            .patch(&format!("/domains/{domain_id}"), request)
            .await
    }

    pub async fn delete_domain(&self, domain_id: &str) -> Result<()> {
        self.shared
            .transport
            .delete_empty(&format!("/domains/{domain_id}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_missing_key() {
        let config = ClientConfig {
            api_key: String::new(),
            ..Default::default()
        };
        let err = Client::new(config).unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_update_domain_requires_a_field() {
        let config = ClientConfig::builder()
            .api_key("k")
            .base_url("http://localhost:1")
            .build()
            .unwrap();
        let client = Client::new(config).unwrap();
        let err = client
            .update_domain("dom_1", &UpdateDomainRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_clones_share_state() {
        let config = ClientConfig::builder()
            .api_key("k")
            .base_url("http://localhost:1")
            .build()
            .unwrap();
        let client = Client::new(config).unwrap();
        let other = client.clone();
        assert!(Arc::ptr_eq(&client.shared, &other.shared));
        assert_eq!(other.config().api_key, "k");
    }
}
