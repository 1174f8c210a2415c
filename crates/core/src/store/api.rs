//! API record store
//!
//! Implements RecordStore over the destination repository's REST API.
//! Requests go to `<base_url>/<branding>/<portal>/...` with a bearer key.
//!
//! ## Security
//!
//! Record ids and types are validated before being placed in a URL path and
//! are percent-encoded.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{RecordStore, StoreError, validate_oid};

/// Page size used when listing records
const PAGE_SIZE: usize = 10;

/// API record store
pub struct ApiRecordStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ApiRecordStore {
    /// Create a new API record store
    ///
    /// # Arguments
    ///
    /// * `base_url` - Server URL (e.g., "https://redbox.example.edu.au")
    /// * `branding` - Branding segment of the portal path
    /// * `portal` - Portal segment of the portal path
    /// * `api_key` - Optional bearer key for authentication
    ///
    /// # Example
    ///
    /// ```rust
    /// use crosswalk_core::store::ApiRecordStore;
    ///
    /// let store = ApiRecordStore::new(
    ///     "https://redbox.example.edu.au/",
    ///     "default",
    ///     "rdmp",
    ///     Some("api_key_here".to_string()),
    /// );
    /// assert_eq!(store.base_url(), "https://redbox.example.edu.au/default/rdmp");
    /// ```
    pub fn new(
        base_url: impl Into<String>,
        branding: &str,
        portal: &str,
        api_key: Option<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: format!("{}/{}/{}", base_url.trim_end_matches('/'), branding, portal),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Portal URL requests are made against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with authentication headers
    fn build_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.client.request(method, &url);

        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        request
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response, StoreError> {
        request
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(format!("Failed to {}: {}", what, e)))
    }

    async fn parse(response: reqwest::Response, what: &str) -> Result<Value, StoreError> {
        if !response.status().is_success() {
            return Err(StoreError::BackendError(format!(
                "{} request failed: {}",
                what,
                response.status()
            )));
        }
        response.json().await.map_err(|e| {
            StoreError::SerializationError(format!("Failed to parse {} response: {}", what, e))
        })
    }

    /// Fetch one page of record ids and the total number found
    async fn list_page(
        &self,
        record_type: &str,
        start: usize,
    ) -> Result<(Vec<String>, usize), StoreError> {
        let start = start.to_string();
        let rows = PAGE_SIZE.to_string();
        let request = self
            .build_request(reqwest::Method::GET, "api/listRecords")
            .query(&[
                ("recordType", record_type),
                ("start", start.as_str()),
                ("rows", rows.as_str()),
            ]);
        let body = Self::parse(self.send(request, "list records").await?, "list records").await?;
        let response = &body["response"];
        let found = response["numFound"].as_u64().unwrap_or(0) as usize;
        let ids = response["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok((ids, found))
    }
}

#[async_trait(?Send)]
impl RecordStore for ApiRecordStore {
    async fn list(&self, record_type: &str) -> Result<Vec<String>, StoreError> {
        validate_oid(record_type)?;
        let mut oids = Vec::new();
        loop {
            let (page, found) = self.list_page(record_type, oids.len()).await?;
            let fetched = page.len();
            oids.extend(page);
            debug!(record_type, fetched = oids.len(), found, "Listed record page");
            if fetched == 0 || oids.len() >= found {
                break;
            }
        }
        Ok(oids)
    }

    async fn get_record(&self, oid: &str) -> Result<Option<Value>, StoreError> {
        validate_oid(oid)?;
        let path = format!("api/records/metadata/{}", urlencoding::encode(oid));
        let response = self
            .send(self.build_request(reqwest::Method::GET, &path), "get record")
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse(response, "get record").await.map(Some)
    }

    async fn create_record(
        &self,
        record: &Value,
        record_type: &str,
    ) -> Result<String, StoreError> {
        validate_oid(record_type)?;
        let path = format!("api/records/metadata/{}", urlencoding::encode(record_type));
        let request = self.build_request(reqwest::Method::POST, &path).json(record);
        let body = Self::parse(self.send(request, "create record").await?, "create record").await?;
        body["oid"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| StoreError::BackendError("create response carried no oid".to_string()))
    }

    async fn update_record_metadata(
        &self,
        oid: &str,
        record: &Value,
    ) -> Result<Value, StoreError> {
        validate_oid(oid)?;
        let path = format!("api/records/metadata/{}", urlencoding::encode(oid));
        let request = self.build_request(reqwest::Method::PUT, &path).json(record);
        Self::parse(self.send(request, "update record").await?, "update record").await
    }
}
