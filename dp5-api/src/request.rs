//! Construction of verb-specific action requests.
//!
//! A request is a plain value: method, fully resolved URL, timeout and body.
//! It is built fresh for every call and handed straight to the transport.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Method, Url};

use dp5_core::config::ServerConfig;
use dp5_core::error::{Dp5Error, Dp5Result};

/// Query parameters for GET and POST actions, iterated in key order.
pub type QueryParams = BTreeMap<String, String>;

/// Per-verb request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerbTimeouts {
    pub get: Duration,
    pub post: Duration,
    pub put: Duration,
    pub delete: Duration,
}

impl VerbTimeouts {
    /// Read the four timeouts from a server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            get: Duration::from_secs(config.get_timeout_secs),
            post: Duration::from_secs(config.post_timeout_secs),
            put: Duration::from_secs(config.put_timeout_secs),
            delete: Duration::from_secs(config.delete_timeout_secs),
        }
    }
}

impl Default for VerbTimeouts {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// A fully specified outbound request for one remote action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    method: Method,
    url: Url,
    timeout: Duration,
    body: Option<String>,
}

impl ActionRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL path, including the remote stub prefix.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Raw query string, if parameters were attached.
    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request body. POST and PUT carry an empty string; GET and DELETE carry none.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Turn this value into a reqwest request on the given client.
    pub(crate) fn into_reqwest(self, client: &Client) -> reqwest::RequestBuilder {
        let builder = client.request(self.method, self.url).timeout(self.timeout);
        match self.body {
            Some(body) => builder.body(body),
            None => builder,
        }
    }
}

/// Builds [`ActionRequest`]s against a base URL with per-verb timeouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionRequestBuilder {
    timeouts: VerbTimeouts,
}

impl ActionRequestBuilder {
    pub fn new(timeouts: VerbTimeouts) -> Self {
        Self { timeouts }
    }

    pub fn timeouts(&self) -> VerbTimeouts {
        self.timeouts
    }

    /// GET `{base_url}{action}` with optional query parameters.
    pub fn build_get(
        &self,
        action: &str,
        base_url: &str,
        params: Option<&QueryParams>,
    ) -> Dp5Result<ActionRequest> {
        Ok(ActionRequest {
            method: Method::GET,
            url: resolve_url(action, base_url, params)?,
            timeout: self.timeouts.get,
            body: None,
        })
    }

    /// POST `{base_url}{action}`. Parameters travel in the query string only;
    /// the body is always an empty string.
    pub fn build_post(
        &self,
        action: &str,
        base_url: &str,
        params: Option<&QueryParams>,
    ) -> Dp5Result<ActionRequest> {
        Ok(ActionRequest {
            method: Method::POST,
            url: resolve_url(action, base_url, params)?,
            timeout: self.timeouts.post,
            body: Some(String::new()),
        })
    }

    /// PUT `{base_url}{action}` with an empty body.
    pub fn build_put(&self, action: &str, base_url: &str) -> Dp5Result<ActionRequest> {
        Ok(ActionRequest {
            method: Method::PUT,
            url: resolve_url(action, base_url, None)?,
            timeout: self.timeouts.put,
            body: Some(String::new()),
        })
    }

    /// DELETE `{base_url}{action}`.
    pub fn build_delete(&self, action: &str, base_url: &str) -> Dp5Result<ActionRequest> {
        Ok(ActionRequest {
            method: Method::DELETE,
            url: resolve_url(action, base_url, None)?,
            timeout: self.timeouts.delete,
            body: None,
        })
    }
}

/// Serialize parameters as `key=value&` for every entry.
///
/// The separator after the last pair is kept; the server tolerates it.
/// `%`, `+` and spaces are escaped so a decoder recovers the exact text.
pub fn encode_query(params: &QueryParams) -> Dp5Result<String> {
    let mut query = String::new();
    for (key, value) in params {
        validate_param(key, value)?;
        push_escaped(&mut query, key);
        query.push('=');
        push_escaped(&mut query, value);
        query.push('&');
    }
    Ok(query)
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '%' => out.push_str("%25"),
            '+' => out.push_str("%2B"),
            ' ' => out.push_str("%20"),
            other => out.push(other),
        }
    }
}

fn resolve_url(action: &str, base_url: &str, params: Option<&QueryParams>) -> Dp5Result<Url> {
    validate_action(action)?;

    let raw = format!("{base_url}{action}");
    let mut url =
        Url::parse(&raw).map_err(|e| Dp5Error::MalformedRequest(format!("{raw}: {e}")))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(Dp5Error::MalformedRequest(format!("{raw}: not a hierarchical URL")));
    }

    if let Some(params) = params.filter(|p| !p.is_empty()) {
        let query = encode_query(params)?;
        url.set_query(Some(&query));
    }
    Ok(url)
}

fn validate_action(action: &str) -> Dp5Result<()> {
    if !action.starts_with('/') {
        return Err(Dp5Error::MalformedRequest(format!(
            "action path must start with '/': {action:?}"
        )));
    }
    if let Some(c) = action
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '?' | '#'))
    {
        return Err(Dp5Error::MalformedRequest(format!(
            "illegal character {c:?} in action path {action:?}"
        )));
    }
    Ok(())
}

fn validate_param(key: &str, value: &str) -> Dp5Result<()> {
    if key.is_empty() {
        return Err(Dp5Error::MalformedRequest("empty query parameter name".into()));
    }
    if key.chars().any(|c| c.is_control() || matches!(c, '=' | '&' | '#')) {
        return Err(Dp5Error::MalformedRequest(format!(
            "illegal query parameter name {key:?}"
        )));
    }
    if value.chars().any(|c| c.is_control() || matches!(c, '&' | '#')) {
        return Err(Dp5Error::MalformedRequest(format!(
            "illegal value for query parameter {key:?}: {value:?}"
        )));
    }
    Ok(())
}
