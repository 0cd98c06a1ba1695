//! Shared HTTP plumbing for the remote providers.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Default request timeout for provider calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub(crate) enum HttpError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("API returned {code}: {detail}")]
    Status { code: u16, detail: String },

    #[error("failed to parse response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Both Gemini and OpenAI wrap failures as `{"error": {"message": ...}}`.
#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

pub(crate) fn build_client(timeout: Duration, headers: HeaderMap) -> Result<Client, HttpError> {
    Client::builder().timeout(timeout).default_headers(headers).build().map_err(HttpError::Client)
}

/// Turn a non-success status into an [`HttpError::Status`], preferring the
/// API's own error message over the raw body.
#[tracing::instrument(skip_all, err)]
async fn check_response(response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    Err(HttpError::Status { code: status.as_u16(), detail })
}

/// Send a prepared request and decode its JSON response.
#[tracing::instrument(skip_all, fields(request.url = %url))]
pub(crate) async fn send_json<Res: DeserializeOwned>(
    url: &str,
    request: RequestBuilder,
) -> Result<Res, HttpError> {
    let response = request.send().await.map_err(HttpError::Request)?;
    tracing::debug!("response received");
    let response = check_response(response).await?;
    response.json().await.map_err(HttpError::Decode)
}
