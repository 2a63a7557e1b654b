//! HttpObjectStore -- concrete [`ObjectStore`] implementation over an
//! S3-compatible gateway.
//!
//! Objects are uploaded with `PUT {endpoint}/{bucket}/{key}`. The access key
//! ID travels in a request header and the secret access key as the bearer
//! credential; the secret is wrapped in [`secrecy::SecretString`] and never
//! appears in Debug output or logs.

use std::time::Duration;

use lamel_core::flow::runner::ObjectStore;
use lamel_types::error::StoreError;
use secrecy::{ExposeSecret, SecretString};

/// Header carrying the access key ID.
const ACCESS_KEY_HEADER: &str = "x-access-key-id";

/// HTTP client for the object store gateway.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    access_key_id: String,
    secret_access_key: SecretString,
}

impl HttpObjectStore {
    /// Create a new object store client for one bucket.
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: SecretString,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| StoreError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            access_key_id: access_key_id.into(),
            secret_access_key,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    /// The location string recorded in step outputs and run logs.
    fn location(&self, key: &str) -> String {
        format!("{}/{}", self.bucket, key)
    }
}

impl ObjectStore for HttpObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<String, StoreError> {
        let url = self.object_url(key);
        tracing::debug!(url = url.as_str(), bytes = body.len(), "uploading object");

        let response = self
            .client
            .put(&url)
            .header(ACCESS_KEY_HEADER, &self.access_key_id)
            .bearer_auth(self.secret_access_key.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                key: key.to_string(),
            });
        }

        Ok(self.location(key))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HttpObjectStore {
        HttpObjectStore::new(
            "http://127.0.0.1:9000/",
            "sales-data",
            "AKIA123",
            SecretString::from("store-secret".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_object_url_shape() {
        assert_eq!(
            store().object_url("transformed_data/customers.csv"),
            "http://127.0.0.1:9000/sales-data/transformed_data/customers.csv"
        );
    }

    #[test]
    fn test_location_is_bucket_relative() {
        assert_eq!(
            store().location("raw_data/raw_sales.csv"),
            "sales-data/raw_data/raw_sales.csv"
        );
    }
}
