use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::wire::ApiError;

pub(crate) const USER_AGENT: &str = concat!("backporter/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")
}

/// Attach an `Authorization` header when a credential is present.
pub(crate) fn authorize(request: RequestBuilder, header: Option<&str>) -> RequestBuilder {
    match header {
        Some(value) => request.header(reqwest::header::AUTHORIZATION, value),
        None => request,
    }
}

/// Require a 2xx status and decode the body.
pub(crate) fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        bail!("{what} failed ({status}): {}", error_message(&body));
    }
    response
        .json()
        .with_context(|| format!("failed to parse {what} response"))
}

/// The forge's `message` field, or the raw body when it is not JSON.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<ApiError>(body)
        && !err.message.is_empty()
    {
        return err.message;
    }
    let trimmed = body.trim();
    match trimmed.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
