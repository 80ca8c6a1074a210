//! HTTP client for the DP5 remote REST API.
//!
//! Owns the endpoint configuration and the reqwest transport. Every action
//! builds a fresh request, sends it once, and checks the status before any
//! body is decoded.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use dp5_core::config::ServerConfig;
use dp5_core::constants;
use dp5_core::error::{Dp5Error, Dp5Result};

use crate::request::{ActionRequest, ActionRequestBuilder, QueryParams, VerbTimeouts};
use crate::response::{self, Document};

/// Action-level client for a DP5 server.
///
/// Configuration is read-only while requests are in flight: the setters take
/// `&mut self`, so a shared client cannot be reconfigured mid-call.
#[derive(Clone)]
pub struct RemoteClient {
    inner: Client,
    config: ServerConfig,
}

impl RemoteClient {
    /// Create a new RemoteClient from server configuration.
    pub fn new(config: &ServerConfig) -> Dp5Result<Self> {
        let inner = Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| Dp5Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Client for a server on `localhost:8777` with default timeouts.
    pub fn localhost() -> Dp5Result<Self> {
        Self::new(&ServerConfig::default())
    }

    /// Replace the HTTP transport.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.inner = client;
        self
    }

    pub fn set_http_client(&mut self, client: Client) {
        self.inner = client;
    }

    pub fn http_client(&self) -> &Client {
        &self.inner
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.config.host = host.into();
        debug!("server host set to {}", self.config.host);
    }

    pub fn set_port(&mut self, port: u16) {
        self.config.port = port;
        debug!("server port set to {port}");
    }

    /// GET timeout in whole seconds. Zero is rejected.
    pub fn set_get_timeout(&mut self, secs: u64) -> Dp5Result<()> {
        self.config.get_timeout_secs = checked_timeout("GET", secs)?;
        Ok(())
    }

    pub fn set_post_timeout(&mut self, secs: u64) -> Dp5Result<()> {
        self.config.post_timeout_secs = checked_timeout("POST", secs)?;
        Ok(())
    }

    pub fn set_put_timeout(&mut self, secs: u64) -> Dp5Result<()> {
        self.config.put_timeout_secs = checked_timeout("PUT", secs)?;
        Ok(())
    }

    pub fn set_delete_timeout(&mut self, secs: u64) -> Dp5Result<()> {
        self.config.delete_timeout_secs = checked_timeout("DELETE", secs)?;
        Ok(())
    }

    /// Base URL every action path is appended to.
    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    /// A request builder carrying the current per-verb timeouts.
    pub fn request_builder(&self) -> ActionRequestBuilder {
        ActionRequestBuilder::new(VerbTimeouts::from_config(&self.config))
    }

    /// Send a built request and return the body of a 200 response.
    ///
    /// Transport failures become `Transport`; any other status becomes
    /// `RemoteAction` carrying the raw body, which is never decoded.
    pub async fn execute(&self, request: ActionRequest) -> Dp5Result<String> {
        let method = request.method().clone();
        let path = request.path().to_string();
        debug!("{} {}", method, path);

        let response = request
            .into_reqwest(&self.inner)
            .send()
            .await
            .map_err(Self::classify_error)?;

        let status = response.status();
        if status.as_u16() != constants::SUCCESS_STATUS {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!("{} {}: failed to read error body: {e}", method, path);
                    String::new()
                }
            };
            warn!("{} {} returned status {}", method, path, status.as_u16());
            return Err(Dp5Error::RemoteAction {
                status: status.as_u16(),
                body,
            });
        }

        response.text().await.map_err(Self::classify_error)
    }

    // --- Verb helpers ---

    pub(crate) async fn get(&self, action: &str, params: Option<&QueryParams>) -> Dp5Result<String> {
        let request = self
            .request_builder()
            .build_get(action, &self.base_url(), params)?;
        self.execute(request).await
    }

    pub(crate) async fn post(&self, action: &str, params: Option<&QueryParams>) -> Dp5Result<String> {
        let request = self
            .request_builder()
            .build_post(action, &self.base_url(), params)?;
        self.execute(request).await
    }

    pub(crate) async fn put(&self, action: &str) -> Dp5Result<String> {
        let request = self.request_builder().build_put(action, &self.base_url())?;
        self.execute(request).await
    }

    pub(crate) async fn delete(&self, action: &str) -> Dp5Result<String> {
        let request = self
            .request_builder()
            .build_delete(action, &self.base_url())?;
        self.execute(request).await
    }

    // --- Decoding helpers ---

    /// GET an action and return one string field of its object body.
    pub(crate) async fn get_string_field(&self, action: &str, field: &str) -> Dp5Result<String> {
        let body = self.get(action, None).await?;
        response::parse_string_field(&body, field)
    }

    /// GET an action and return its object body.
    pub(crate) async fn get_document(&self, action: &str) -> Dp5Result<Document> {
        let body = self.get(action, None).await?;
        response::parse_object(&body)
    }

    /// Classify a reqwest error into a transport error.
    fn classify_error(e: reqwest::Error) -> Dp5Error {
        if e.is_timeout() {
            Dp5Error::Transport {
                message: format!("request timed out: {e}"),
                timed_out: true,
            }
        } else if e.is_connect() {
            Dp5Error::transport(format!("connection failed: {e}"))
        } else {
            Dp5Error::transport(e.to_string())
        }
    }
}

fn checked_timeout(verb: &str, secs: u64) -> Dp5Result<u64> {
    if secs == 0 {
        return Err(Dp5Error::Config(format!("{verb} timeout must be at least 1s")));
    }
    debug!("{verb} timeout set to {secs}s");
    Ok(secs)
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("base_url", &self.base_url())
            .finish()
    }
}
