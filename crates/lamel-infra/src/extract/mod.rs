//! HttpExtractor -- concrete [`Extractor`] implementation for the data feed.
//!
//! Fetches a CSV batch from `{base_url}/{source}?key={api_key}&count={n}` and
//! decodes it into raw sales records. The API key is wrapped in
//! [`secrecy::SecretString`] and is never logged; request URLs are logged
//! without the query string.

use std::time::Duration;

use lamel_core::flow::runner::Extractor;
use lamel_core::pipeline::codec;
use lamel_types::error::ExtractError;
use lamel_types::sales::RawSalesRecord;
use secrecy::{ExposeSecret, SecretString};

/// HTTP client for the synthetic sales data feed.
pub struct HttpExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpExtractor {
    /// Create a new feed client.
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ExtractError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// URL without credentials, safe for logs.
    fn display_url(&self, source: &str) -> String {
        format!("{}/{}", self.base_url, source)
    }

    fn request_url(&self, source: &str, count: u32) -> String {
        format!(
            "{}/{}?key={}&count={}",
            self.base_url,
            source,
            self.api_key.expose_secret(),
            count
        )
    }
}

impl Extractor for HttpExtractor {
    async fn fetch(&self, source: &str, count: u32) -> Result<Vec<RawSalesRecord>, ExtractError> {
        tracing::debug!(url = self.display_url(source).as_str(), count, "fetching feed batch");

        let response = self
            .client
            .get(self.request_url(source, count))
            .send()
            .await
            .map_err(|e| ExtractError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ExtractError::Http(e.to_string()))?;

        let records =
            codec::parse_raw_csv(&body).map_err(|e| ExtractError::Decode(e.to_string()))?;

        tracing::debug!(rows = records.len(), source, "feed batch decoded");
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> HttpExtractor {
        HttpExtractor::new(
            "https://feed.example.com/api/",
            SecretString::from("feed-key".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_request_url_shape() {
        let url = extractor().request_url("sales", 500);
        assert_eq!(
            url,
            "https://feed.example.com/api/sales?key=feed-key&count=500"
        );
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let url = extractor().display_url("sales");
        assert_eq!(url, "https://feed.example.com/api/sales");
    }

    #[test]
    fn test_display_url_has_no_key() {
        let url = extractor().display_url("sales");
        assert!(!url.contains("feed-key"));
    }
}
