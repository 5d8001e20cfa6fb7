//! HTTP client for the external research provider.
//!
//! Deliberately thin: classification into the error taxonomy happens here,
//! and everything else (rate limiting, retries, circuit breaking, caching)
//! is layered on by the invocation shell.

use analytica_core::{AnalyticalError, ErrorCode, Result};
use serde_json::{json, Value};
use std::time::Duration;

const SEARCH_ENDPOINT: &str = "search";

pub struct ResearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl ResearchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Runs a search query. The caller supplies the API key selected by the
    /// rate-limit manager.
    pub async fn search(&self, api_key: &str, query: &str, num_results: u64) -> Result<Value> {
        let url = format!("{}/{SEARCH_ENDPOINT}", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .json(&json!({"query": query, "numResults": num_results}))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalyticalError::from_http_status(
                status.as_u16(),
                SEARCH_ENDPOINT,
            ));
        }
        response.json::<Value>().await.map_err(|err| {
            AnalyticalError::api(
                ErrorCode::ApiInvalidResponse,
                format!("provider returned a non-JSON body: {err}"),
            )
            .with_endpoint(SEARCH_ENDPOINT)
        })
    }
}

fn classify_transport_error(err: reqwest::Error) -> AnalyticalError {
    let code = if err.is_timeout() {
        ErrorCode::ApiTimeout
    } else {
        ErrorCode::ApiRequestFailed
    };
    AnalyticalError::api(code, format!("request failed: {err}")).with_endpoint(SEARCH_ENDPOINT)
}
