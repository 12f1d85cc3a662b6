// GitHub API HTTP client.
// Handles authentication, rate limiting, conditional requests, and
// request/response processing.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, IF_NONE_MATCH, USER_AGENT},
};

use crate::error::{RelwatchError, Result};

use super::types::RateLimit;

pub(crate) const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Outcome of a conditional GET.
pub enum Conditional {
    /// Content changed (or no etag was sent); carries the response.
    Modified(Response),
    /// Upstream reported 304; cached content is still current.
    NotModified,
}

/// GitHub API client with optional authentication and rate limit tracking.
pub struct GitHubClient {
    client: Client,
    base: String,
    rate_limit: Mutex<RateLimit>,
}

impl GitHubClient {
    /// Create a new GitHub client. An unauthenticated client works but gets
    /// a much lower rate limit quota.
    pub fn new(token: Option<&str>) -> Result<Self> {
        Self::with_base_url(token, GITHUB_API_BASE)
    }

    /// Create a client against a specific API base URL.
    pub fn with_base_url(token: Option<&str>, base: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();

        if let Some(token) = token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| RelwatchError::Other(e.to_string()))?,
            );
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("relwatch"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(RelwatchError::Api)?;

        Ok(Self {
            client,
            base: base.into(),
            rate_limit: Mutex::new(RateLimit::default()),
        })
    }

    /// Get the last observed rate limit snapshot.
    pub fn rate_limit(&self) -> RateLimit {
        *self.rate_limit.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make a GET request to the GitHub API.
    pub async fn get(&self, endpoint: &str) -> Result<Response> {
        let url = format!("{}{}", self.base, endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(RelwatchError::Api)?;

        self.update_rate_limit(&response);
        check_response(response).await
    }

    /// Make a conditional GET request with query parameters. When an etag is
    /// given it is sent as `If-None-Match`; a 304 comes back as
    /// [`Conditional::NotModified`] instead of an error.
    pub async fn get_conditional<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &T,
        etag: Option<&str>,
    ) -> Result<Conditional> {
        let url = format!("{}{}", self.base, endpoint);
        let mut request = self.client.get(&url).query(params);
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        let response = request.send().await.map_err(RelwatchError::Api)?;

        self.update_rate_limit(&response);
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(Conditional::NotModified);
        }
        Ok(Conditional::Modified(check_response(response).await?))
    }

    /// Make a POST request with a JSON body.
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base, endpoint);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(RelwatchError::Api)?;

        self.update_rate_limit(&response);
        check_response(response).await
    }

    /// Update the rate limit snapshot from response headers.
    fn update_rate_limit(&self, response: &Response) {
        let mut rate_limit = self.rate_limit.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(limit) = header_u64(response, "x-ratelimit-limit") {
            rate_limit.limit = limit;
        }
        if let Some(remaining) = header_u64(response, "x-ratelimit-remaining") {
            rate_limit.remaining = remaining;
        }
        if let Some(reset) = header_u64(response, "x-ratelimit-reset") {
            rate_limit.reset = reset;
        }
    }
}

/// Parse a numeric response header.
fn header_u64(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Check response status and convert errors. Rate-limit exhaustion is
/// classified from the headers of this specific response, so concurrent
/// requests cannot misattribute it.
async fn check_response(response: Response) -> Result<Response> {
    match response.status() {
        StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => Ok(response),
        StatusCode::UNAUTHORIZED => Err(RelwatchError::Unauthorized),
        StatusCode::NOT_FOUND => {
            let url = response.url().to_string();
            Err(RelwatchError::NotFound(url))
        }
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            if header_u64(&response, "x-ratelimit-remaining") == Some(0) {
                let reset_at = header_u64(&response, "x-ratelimit-reset")
                    .and_then(|reset| DateTime::from_timestamp(reset as i64, 0))
                    .unwrap_or_else(Utc::now);
                Err(RelwatchError::RateLimited { reset_at })
            } else {
                Err(RelwatchError::Other(format!(
                    "Forbidden: {}",
                    response.text().await.unwrap_or_default()
                )))
            }
        }
        status => Err(RelwatchError::Other(format!(
            "HTTP {}: {}",
            status,
            response.text().await.unwrap_or_default()
        ))),
    }
}
