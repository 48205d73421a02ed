// src/services/client.rs

//! Authenticated fetch client for the publisher content API.
//!
//! Every request first waits on the shared rate limiter, then carries the
//! API-key header and default query parameters. Throttling responses update
//! the limiter and retry within a bounded budget; transient server errors
//! retry with exponential backoff; other client errors fail immediately.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, ContentFormat};
use crate::services::rate_limit::{RateLimitSnapshot, RateLimiter, ResponseSignal};

/// How a response status should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Throttled,
    Transient,
    Permanent,
}

/// Classify an HTTP status by retry policy.
pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        StatusClass::Throttled
    } else if status.is_server_error() {
        StatusClass::Transient
    } else {
        StatusClass::Permanent
    }
}

/// Detect API errors indicating the requested view is unsupported by the
/// caller's entitlements.
pub fn is_invalid_view_error(headers: &HeaderMap, body: &str) -> bool {
    if let Some(status) = headers.get("X-ELS-Status").and_then(|v| v.to_str().ok()) {
        let status = status.to_lowercase();
        if status.contains("view") && status.contains("invalid") {
            return true;
        }
    }
    let body = body.to_lowercase();
    body.contains("view") && body.contains("not valid")
}

/// Raw bytes plus response context from a successful fetch.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub snapshot: RateLimitSnapshot,
}

/// Thin wrapper around reqwest with publisher API defaults.
pub struct FetchClient {
    http: reqwest::Client,
    base_url: Url,
    limiter: Arc<RateLimiter>,
    max_retries: usize,
    backoff_base: Duration,
}

impl FetchClient {
    /// Build a client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            "X-ELS-APIKey",
            HeaderValue::from_str(&config.api.api_key)
                .map_err(|e| AppError::config(format!("invalid api key: {e}")))?,
        );
        if let Some(token) = &config.api.insttoken {
            default_headers.insert(
                "X-ELS-Insttoken",
                HeaderValue::from_str(token)
                    .map_err(|e| AppError::config(format!("invalid insttoken: {e}")))?,
            );
        }

        let http = reqwest::Client::builder()
            .user_agent(&config.api.user_agent)
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .default_headers(default_headers)
            .build()?;

        // Base must end in a slash so relative paths join below it.
        let mut base = config.api.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            http,
            base_url: Url::parse(&base)?,
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            max_retries: config.api.max_retries,
            backoff_base: Duration::from_millis(500),
        })
    }

    /// Shared rate limiter for this API scope.
    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// GET a JSON document.
    pub async fn get_json(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value> {
        let response = self.execute(path, params, "application/json").await?;
        serde_json::from_slice(&response.bytes)
            .map_err(|e| AppError::permanent(200, format!("malformed JSON body: {e}")))
    }

    /// GET raw bytes in the requested full-text format.
    ///
    /// Adds the API's default query parameters (`httpAccept`, `view=FULL`)
    /// before any caller-supplied ones.
    pub async fn get_raw(
        &self,
        path: &str,
        params: &[(&str, &str)],
        format: ContentFormat,
    ) -> Result<RawResponse> {
        let mut merged: Vec<(&str, &str)> =
            vec![("httpAccept", format.http_accept_param()), ("view", "FULL")];
        merged.extend_from_slice(params);
        self.execute(path, &merged, format.accept_header()).await
    }

    async fn execute(
        &self,
        path: &str,
        params: &[(&str, &str)],
        accept: &str,
    ) -> Result<RawResponse> {
        let url = self.base_url.join(path.trim_start_matches('/'))?;

        let mut throttle_attempts = 0usize;
        let mut transient_attempts = 0usize;

        loop {
            self.limiter.acquire().await;

            let sent = self
                .http
                .get(url.clone())
                .query(params)
                .header(header::ACCEPT, accept)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    transient_attempts += 1;
                    if transient_attempts > self.max_retries {
                        return Err(AppError::transient(transient_attempts, e));
                    }
                    log::warn!(
                        "Request to {} failed ({}), retry {}/{}",
                        url,
                        e,
                        transient_attempts,
                        self.max_retries
                    );
                    tokio::time::sleep(self.backoff(transient_attempts)).await;
                    continue;
                }
                Err(e) => return Err(AppError::Http(e)),
            };

            let status = response.status();
            let headers = response.headers().clone();
            let signal = ResponseSignal::from_response(status.as_u16(), &headers);
            self.limiter.observe(&signal);

            match classify_status(status) {
                StatusClass::Success => {
                    let content_type = headers
                        .get(header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let snapshot = RateLimitSnapshot::from_headers(&headers);
                    // A body cut off mid-transfer is as transient as a 5xx.
                    match response.bytes().await {
                        Ok(bytes) => {
                            return Ok(RawResponse {
                                bytes: bytes.to_vec(),
                                content_type,
                                snapshot,
                            });
                        }
                        Err(e) => {
                            transient_attempts += 1;
                            if transient_attempts > self.max_retries {
                                return Err(AppError::transient(transient_attempts, e));
                            }
                            log::warn!(
                                "Body read from {} failed ({}), retry {}/{}",
                                url,
                                e,
                                transient_attempts,
                                self.max_retries
                            );
                            tokio::time::sleep(self.backoff(transient_attempts)).await;
                            continue;
                        }
                    }
                }
                StatusClass::Throttled => {
                    throttle_attempts += 1;
                    if throttle_attempts > self.max_retries {
                        let detail = match self.limiter.last_server_delay() {
                            Some(delay) => {
                                format!("{url} (last advertised delay {}s)", delay.as_secs())
                            }
                            None => url.to_string(),
                        };
                        return Err(AppError::rate_limit_exceeded(throttle_attempts, detail));
                    }
                    log::warn!(
                        "Throttled by {} ({}), retry {}/{}",
                        url,
                        status,
                        throttle_attempts,
                        self.max_retries
                    );
                    // The limiter already absorbed the advertised delay; the
                    // next acquire() waits it out.
                    continue;
                }
                StatusClass::Transient => {
                    transient_attempts += 1;
                    if transient_attempts > self.max_retries {
                        return Err(AppError::transient(
                            transient_attempts,
                            format!("{status} from {url}"),
                        ));
                    }
                    log::warn!(
                        "Server error {} from {}, retry {}/{}",
                        status,
                        url,
                        transient_attempts,
                        self.max_retries
                    );
                    tokio::time::sleep(self.backoff(transient_attempts)).await;
                    continue;
                }
                StatusClass::Permanent => {
                    let body = response.text().await.unwrap_or_default();
                    if status == StatusCode::BAD_REQUEST && is_invalid_view_error(&headers, &body) {
                        return Err(AppError::permanent(
                            status.as_u16(),
                            format!(
                                "API rejected FULL view for {url}; \
                                 ensure your credentials grant full-text access"
                            ),
                        ));
                    }
                    let snippet: String = body.chars().take(200).collect();
                    return Err(AppError::permanent(
                        status.as_u16(),
                        format!("{url}: {snippet}"),
                    ));
                }
            }
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        // Exponential: base * 2^(attempt-1)
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1) as u32)
    }
}

/// Identifier families the content API can resolve directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Doi,
    Pmid,
    Pii,
}

/// One concrete identifier to try against the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiIdentifier {
    pub kind: IdentifierKind,
    pub value: String,
}

impl ApiIdentifier {
    /// All identifiers a study offers, in doi > pmid > pii endpoint order.
    pub fn candidates(study: &crate::models::StudyMetadata) -> Vec<ApiIdentifier> {
        let pairs = [
            (IdentifierKind::Doi, &study.doi),
            (IdentifierKind::Pmid, &study.pmid),
            (IdentifierKind::Pii, &study.pii),
        ];
        pairs
            .into_iter()
            .filter_map(|(kind, value)| {
                let value = value.as_deref()?.trim();
                if value.is_empty() {
                    None
                } else {
                    Some(ApiIdentifier {
                        kind,
                        value: value.to_string(),
                    })
                }
            })
            .collect()
    }

    /// API endpoint path for this identifier.
    pub fn path(&self) -> String {
        match self.kind {
            IdentifierKind::Doi => format!("article/doi/{}", self.value),
            IdentifierKind::Pmid => format!("article/pubmed_id/{}", self.value),
            IdentifierKind::Pii => format!("article/pii/{}", self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(StatusCode::OK), StatusClass::Success);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            StatusClass::Throttled
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            StatusClass::Transient
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            StatusClass::Transient
        );
        assert_eq!(classify_status(StatusCode::NOT_FOUND), StatusClass::Permanent);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), StatusClass::Permanent);
    }

    #[test]
    fn invalid_view_detected_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-ELS-Status", HeaderValue::from_static("VIEW parameter is INVALID"));
        assert!(is_invalid_view_error(&headers, ""));
    }

    #[test]
    fn invalid_view_detected_from_body() {
        let headers = HeaderMap::new();
        assert!(is_invalid_view_error(
            &headers,
            "The requested view is not valid for this resource"
        ));
        assert!(!is_invalid_view_error(&headers, "some other error"));
    }

    #[tokio::test]
    async fn truncated_success_body_consumes_the_transient_budget() {
        use std::io::{Read, Write};
        use std::sync::atomic::{AtomicUsize, Ordering};

        // Serves a 200 whose body is cut off short of Content-Length.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let server_hits = Arc::clone(&hits);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                server_hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\nshort",
                );
            }
        });

        let mut config = Config::default();
        config.api.base_url = format!("http://{addr}");
        config.api.max_retries = 2;
        config.api.timeout_secs = 5;
        config.rate_limit.min_interval_ms = 1;
        let client = FetchClient::new(&config).unwrap();

        let err = client
            .get_raw("article/doi/10.1/x", &[], ContentFormat::Xml)
            .await
            .unwrap_err();
        match err {
            AppError::TransientFetch { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected transient failure, got {other}"),
        }
        // Initial attempt plus the full retry budget.
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn article_paths() {
        let doi = ApiIdentifier {
            kind: IdentifierKind::Doi,
            value: "10.1016/j.x.1".into(),
        };
        assert_eq!(doi.path(), "article/doi/10.1016/j.x.1");
        let pmid = ApiIdentifier {
            kind: IdentifierKind::Pmid,
            value: "12345".into(),
        };
        assert_eq!(pmid.path(), "article/pubmed_id/12345");
    }

    #[test]
    fn candidate_order_is_doi_pmid_pii() {
        let study = crate::models::StudyMetadata {
            doi: Some("10.1/a".into()),
            pmid: Some("99".into()),
            pii: Some("S0".into()),
            ..Default::default()
        };
        let candidates = ApiIdentifier::candidates(&study);
        let kinds: Vec<_> = candidates.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![IdentifierKind::Doi, IdentifierKind::Pmid, IdentifierKind::Pii]
        );
    }
}
