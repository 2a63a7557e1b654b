//! HttpFunctionInvoker -- concrete [`FunctionInvoker`] implementation for the
//! loader function gateway.
//!
//! Invokes `POST {endpoint}/functions/{name}/invocations` with a JSON payload
//! and waits for the response. A function that ran but failed internally is
//! signalled by the `x-function-error` response header; that maps to
//! [`InvokeError::Function`] so the flow records the function's own error
//! message rather than a generic HTTP failure.

use std::time::Duration;

use lamel_core::flow::runner::FunctionInvoker;
use lamel_types::error::InvokeError;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

/// Header signalling an in-function execution error.
const FUNCTION_ERROR_HEADER: &str = "x-function-error";

/// Header carrying the access key ID.
const ACCESS_KEY_HEADER: &str = "x-access-key-id";

/// HTTP client for the function gateway.
pub struct HttpFunctionInvoker {
    client: reqwest::Client,
    endpoint: String,
    access_key_id: String,
    secret_access_key: SecretString,
}

impl HttpFunctionInvoker {
    /// Create a new function gateway client.
    pub fn new(
        endpoint: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: SecretString,
    ) -> Result<Self, InvokeError> {
        let client = reqwest::Client::builder()
            // Loader runs synchronously against the warehouse; allow for a
            // long response.
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| InvokeError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            access_key_id: access_key_id.into(),
            secret_access_key,
        })
    }

    fn invocation_url(&self, function: &str) -> String {
        format!("{}/functions/{}/invocations", self.endpoint, function)
    }
}

impl FunctionInvoker for HttpFunctionInvoker {
    async fn invoke(&self, function: &str, payload: &Value) -> Result<Value, InvokeError> {
        let url = self.invocation_url(function);
        tracing::debug!(url = url.as_str(), function, "invoking function");

        let response = self
            .client
            .post(&url)
            .header(ACCESS_KEY_HEADER, &self.access_key_id)
            .bearer_auth(self.secret_access_key.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|e| InvokeError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InvokeError::Status {
                status: status.as_u16(),
            });
        }

        let function_errored = response.headers().contains_key(FUNCTION_ERROR_HEADER);

        let body = response
            .text()
            .await
            .map_err(|e| InvokeError::Http(e.to_string()))?;

        if function_errored {
            return Err(InvokeError::Function(body));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| InvokeError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn invoker() -> HttpFunctionInvoker {
        HttpFunctionInvoker::new(
            "http://127.0.0.1:9100/",
            "AKIA123",
            SecretString::from("store-secret".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_invocation_url_shape() {
        assert_eq!(
            invoker().invocation_url("store-to-warehouse"),
            "http://127.0.0.1:9100/functions/store-to-warehouse/invocations"
        );
    }
}
