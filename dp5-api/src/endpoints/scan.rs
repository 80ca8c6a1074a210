//! Rack scan endpoint.

use serde::{Deserialize, Serialize};

use dp5_core::constants::{actions, scan_params};
use dp5_core::error::Dp5Result;

use crate::client::RemoteClient;
use crate::request::QueryParams;
use crate::response::{self, Document};

/// Typed options for `/scan`, converted into query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Container definition to decode the rack against.
    pub container_uid: Option<String>,
    /// Whether the server should keep the raw image with the result.
    pub raw_image: Option<bool>,
}

impl ScanOptions {
    pub fn for_container(uid: impl Into<String>) -> Self {
        Self {
            container_uid: Some(uid.into()),
            raw_image: None,
        }
    }

    pub fn with_raw_image(mut self, raw_image: bool) -> Self {
        self.raw_image = Some(raw_image);
        self
    }

    /// Query parameters for the options that are set.
    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        if let Some(uid) = &self.container_uid {
            params.insert(scan_params::CONTAINER_UID.to_string(), uid.clone());
        }
        if let Some(raw) = self.raw_image {
            params.insert(scan_params::RAW_IMAGE.to_string(), raw.to_string());
        }
        params
    }
}

impl RemoteClient {
    /// Scan a rack. Parameters go in the query string; the result is returned
    /// as an opaque document.
    pub async fn scan(&self, params: &QueryParams) -> Dp5Result<Document> {
        let body = self.post(actions::SCAN, Some(params)).await?;
        response::parse_object(&body)
    }

    /// Scan a rack using typed options.
    pub async fn scan_with(&self, options: &ScanOptions) -> Dp5Result<Document> {
        self.scan(&options.to_params()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_to_params() {
        let params = ScanOptions::for_container("mirage48sbsnew")
            .with_raw_image(true)
            .to_params();
        assert_eq!(params.get("container_uid").unwrap(), "mirage48sbsnew");
        assert_eq!(params.get("raw_image").unwrap(), "true");
    }

    #[test]
    fn test_empty_options_produce_no_params() {
        assert!(ScanOptions::default().to_params().is_empty());
    }

    #[test]
    fn test_scan_request_shape() {
        let client = RemoteClient::localhost().unwrap();
        let params = ScanOptions::for_container("mirage48sbsnew")
            .with_raw_image(true)
            .to_params();
        let req = client
            .request_builder()
            .build_post(actions::SCAN, &client.base_url(), Some(&params))
            .unwrap();

        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(req.path(), "/dp5/remote/v1/scan");
        assert_eq!(
            req.query(),
            Some("container_uid=mirage48sbsnew&raw_image=true&")
        );
        assert_eq!(req.body(), Some(""));
    }
}
