// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Async HTTP client wrapping reqwest.
//!
//! One request per call: retry and backoff belong to the router, so this
//! client only classifies what happened into an [`ExtractionError`].

use crate::error::ExtractionError;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/128.0.0.0 Safari/537.36";

/// Response from an HTTP GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers (selected subset).
    pub headers: Vec<(String, String)>,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP client shared by the HTTP-based strategies.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client for sites that reject HTTP/2.
    h1_client: reqwest::Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Create a client with a desktop Chrome user agent. Per-request
    /// timeouts are passed to [`HttpClient::get`].
    pub fn new() -> Self {
        let build = |h1_only: bool| {
            let mut builder = reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::limited(5))
                .user_agent(USER_AGENT);
            if h1_only {
                builder = builder.http1_only();
            }
            builder.build().unwrap_or_default()
        };
        Self {
            client: build(false),
            h1_client: build(true),
        }
    }

    /// GET `url` once, turning transport failures and error statuses into
    /// classified errors.
    ///
    /// Falls back to HTTP/1.1 on protocol errors (some CDNs reject HTTP/2).
    pub async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, ExtractionError> {
        let response = match self.send(&self.client, url, headers, timeout).await {
            Err(e) if is_protocol_error(&e) => {
                self.send(&self.h1_client, url, headers, timeout).await
            }
            other => other,
        }
        .map_err(|e| classify_transport(&e, url, timeout))?;

        if let Some(err) = classify_status(response.status, url, response.header("retry-after")) {
            return Err(err);
        }
        Ok(response)
    }

    async fn send(
        &self,
        client: &reqwest::Client,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, reqwest::Error> {
        let mut request = client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let r = request.send().await?;

        let status = r.status().as_u16();
        let final_url = r.url().to_string();
        let kept: Vec<(String, String)> = r
            .headers()
            .iter()
            .filter(|(k, _)| {
                matches!(
                    k.as_str(),
                    "content-type" | "content-language" | "retry-after" | "x-robots-tag"
                )
            })
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = r.text().await?;

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            headers: kept,
            body,
        })
    }
}

fn is_protocol_error(e: &reqwest::Error) -> bool {
    let text = format!("{e:?}");
    !e.is_timeout() && (text.contains("http2") || text.contains("protocol"))
}

/// Map a transport failure onto the error taxonomy.
pub fn classify_transport(e: &reqwest::Error, url: &str, timeout: Duration) -> ExtractionError {
    let err = if e.is_timeout() {
        ExtractionError::timeout(format!("request timed out after {}ms", timeout.as_millis()))
    } else if e.is_decode() || e.is_body() {
        ExtractionError::parse(format!("failed to read response body: {e}"))
    } else {
        ExtractionError::network(format!("request failed: {e}"))
    };
    err.with_url(url)
}

/// Map an HTTP status onto the error taxonomy. `None` for success.
pub fn classify_status(status: u16, url: &str, retry_after: Option<&str>) -> Option<ExtractionError> {
    let err = match status {
        200..=399 => return None,
        404 | 410 => ExtractionError::not_found(format!("listing returned HTTP {status}")),
        429 => {
            let hint = retry_after
                .map(|s| format!(" (retry after {s}s)"))
                .unwrap_or_default();
            ExtractionError::rate_limited(format!("upstream rate limited{hint}"))
        }
        408 | 504 => ExtractionError::timeout(format!("upstream timed out with HTTP {status}")),
        500..=599 => ExtractionError::network(format!("upstream error HTTP {status}")),
        401 | 403 => ExtractionError::disabled(format!("access denied with HTTP {status}")),
        _ => ExtractionError::invalid_schema(format!("unexpected HTTP {status}")),
    };
    Some(err.with_url(url).with_status(status))
}
