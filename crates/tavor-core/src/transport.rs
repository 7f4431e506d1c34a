//! REST transport for the sandbox service.
//!
//! Builds URLs, injects headers, marshals JSON and maps every non-2xx
//! response through the error classifier. Connection-level failures are
//! returned as [`Error::Transport`] without reinterpretation.

use crate::config::ClientConfig;
use crate::error::{classify_raw, Error, Result};
use reqwest::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};

/// API version prefix prepended to every path.
pub(crate) const API_PREFIX: &str = "/api/v2";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-api-key";

/// HTTP client bound to one service root and API key.
pub(crate) struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    user_agent: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build a transport from an already-validated config.
    pub(crate) fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
    }

    /// `GET` a path and decode the JSON response.
    pub(crate) async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.send_json(self.request(Method::GET, path), "GET", path)
            .await
    }

    /// `POST` a JSON body and decode the JSON response.
    pub(crate) async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        tracing::trace!(path = %path, body = %serde_json::to_string(body).unwrap_or_default(), "Request body");
        self.send_json(self.request(Method::POST, path).json(body), "POST", path)
            .await
    }

    /// `POST` a JSON body, ignoring whatever the service returns.
    pub(crate) async fn post_empty<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.send_empty(self.request(Method::POST, path).json(body), "POST", path)
            .await
    }

    /// `PATCH` a JSON body and decode the JSON response.
    pub(crate) async fn patch<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        tracing::trace!(path = %path, body = %serde_json::to_string(body).unwrap_or_default(), "Request body");
        self.send_json(self.request(Method::PATCH, path).json(body), "PATCH", path)
            .await
    }

    /// `DELETE` a path and decode the JSON response.
    pub(crate) async fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.send_json(self.request(Method::DELETE, path), "DELETE", path)
            .await
    }

    /// `DELETE` a path, accepting an empty or ignored body (e.g. 204).
    pub(crate) async fn delete_empty(&self, path: &str) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, path), "DELETE", path)
            .await
    }

    /// `POST` a JSON body and hand back the still-open response.
    ///
    /// Used for event-stream responses: the body is read incrementally by the
    /// caller. `timeout` replaces the client-wide request timeout so that a
    /// long-running stream is not cut off mid-command.
    pub(crate) async fn open_stream<B>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        tracing::debug!(path = %path, "Opening event stream");
        let response = self
            .request(Method::POST, path)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    async fn send_json<R: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        method: &str,
        path: &str,
    ) -> Result<R> {
        let start = Instant::now();
        tracing::debug!(method, path = %path, "Sending request");

        let response = check_status(builder.send().await?).await?;
        let bytes = response.bytes().await?;

        tracing::debug!(
            method,
            path = %path,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        tracing::trace!(body = %String::from_utf8_lossy(&bytes), "Response body");

        serde_json::from_slice(&bytes).map_err(Error::from)
    }

    async fn send_empty(&self, builder: RequestBuilder, method: &str, path: &str) -> Result<()> {
        tracing::debug!(method, path = %path, "Sending request");
        check_status(builder.send().await?).await?;
        Ok(())
    }
}

/// Pass a 2xx response through; classify anything else.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let raw = match response.text().await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(status = status.as_u16(), error = %e, "Failed to read error body");
            return Err(Error::Api {
                status: status.as_u16(),
                message: "Failed to read error response".into(),
                code: None,
            });
        }
    };

    tracing::debug!(status = status.as_u16(), body = %raw, "API error response");
    Err(classify_raw(status.as_u16(), &raw, retry_after))
}
