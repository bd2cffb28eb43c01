use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::broker::{CompileRequest, NormalizedResult, Status};
use crate::config::RemoteConfig;

use super::{Provider, ProviderError};

/// Marker placed in the `error` field when a reply body is not JSON
pub const INVALID_JSON_RESPONSE: &str = "Invalid JSON response";

/// Request and reply shapes of one third-party compiler API
pub trait RemoteApi: Send + Sync {
    fn name(&self) -> &'static str;

    fn endpoint(&self) -> &str;

    fn build_request(&self, source_code: &str, stdin: &str) -> Value;

    /// Must not fail: anything unusable becomes an `ApiError` result
    fn parse_response(&self, raw: Value) -> NormalizedResult;
}

/// Posts the API's payload as JSON under a bounded timeout
pub struct RemoteProvider<A> {
    api: A,
    client: Client,
    time_limit: Duration,
    user_agent: String,
}

impl<A: RemoteApi> RemoteProvider<A> {
    pub fn new(api: A, client: Client, config: &RemoteConfig) -> Self {
        Self {
            api,
            client,
            time_limit: config.time_limit.as_duration(),
            user_agent: config.user_agent.clone(),
        }
    }
}

#[async_trait]
impl<A: RemoteApi> Provider for RemoteProvider<A> {
    fn name(&self) -> &str {
        self.api.name()
    }

    fn deadline(&self) -> Duration {
        self.time_limit
    }

    async fn invoke(&self, request: &CompileRequest) -> Result<NormalizedResult, ProviderError> {
        let payload = self
            .api
            .build_request(request.source_code(), request.stdin());

        let response = self
            .client
            .post(self.api.endpoint())
            .timeout(self.time_limit)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        log::debug!("{} replied with HTTP {status}", self.api.name());

        Ok(self.api.parse_response(parse_body(&body)))
    }
}

/// Decodes a reply body, wrapping non-JSON bodies into an error object
pub fn parse_body(body: &str) -> Value {
    serde_json::from_str(body)
        .unwrap_or_else(|_| json!({ "error": INVALID_JSON_RESPONSE, "raw": body }))
}

/// Decodes `raw` into an API's reply shape, or the `ApiError` result to return
pub(super) fn decode_reply<T: DeserializeOwned>(
    provider: &str,
    raw: Value,
) -> Result<T, NormalizedResult> {
    if raw.get("error").and_then(Value::as_str) == Some(INVALID_JSON_RESPONSE)
        && raw.get("raw").is_some()
    {
        return Err(NormalizedResult::failure(
            Status::ApiError,
            format!("{provider}: {INVALID_JSON_RESPONSE}"),
        ));
    }

    serde_json::from_value(raw).map_err(|e| {
        NormalizedResult::failure(
            Status::ApiError,
            format!("{provider}: unexpected response ({e})"),
        )
    })
}

/// JavaScript-style truthiness for optional reply strings
pub(super) fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}
