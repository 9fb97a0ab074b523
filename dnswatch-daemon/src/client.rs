//! HTTP adapter for the remote scoring service.
//!
//! [`HttpScoringClient`] implements [`ScoringClient`] on top of `reqwest`.
//! The pipeline crates only see the trait; authentication, the wire
//! encoding and HTTP status handling live here.
//!
//! # Endpoints
//!
//! - `POST {host}/v1/queries` with `{"data": [[ts, ip, type, fqdn], ...]}`
//! - `GET {host}/v1/events?follow={cursor}` returning `{"follow": ..., "events": [...]}`
//!
//! The API key is sent as the basic-auth user name with an empty password.

use std::time::Duration;

use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::{Deserialize, Serialize};

use dnswatch_core::client::ScoringClient;
use dnswatch_core::config::ApiConfig;
use dnswatch_core::error::ClientError;
use dnswatch_core::types::{Cursor, EventPage, QueryBatch, ScoredEvent};

/// API version prefix for every endpoint.
pub const API_VERSION: &str = "v1";

/// `User-Agent` header value.
pub const USER_AGENT: &str = concat!("dnswatch/", env!("CARGO_PKG_VERSION"));

/// One query on the wire: `[timestamp, source ip, record type, fqdn]`.
type WireQuery = [String; 4];

#[derive(Debug, Serialize)]
struct QueriesRequest {
    data: Vec<WireQuery>,
}

impl QueriesRequest {
    fn from_batch(batch: &QueryBatch) -> Self {
        let data = batch
            .iter()
            .map(|q| {
                [
                    q.timestamp().to_rfc3339(),
                    q.source_ip().to_string(),
                    q.record_type().to_owned(),
                    q.fqdn().to_owned(),
                ]
            })
            .collect();
        Self { data }
    }
}

#[derive(Debug, Default, Deserialize)]
struct QueriesResponse {
    #[serde(default)]
    received: u64,
    #[serde(default)]
    accepted: u64,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    follow: String,
    #[serde(default)]
    events: Vec<ScoredEvent>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Scoring service client backed by `reqwest`.
///
/// `reqwest::Client` pools connections internally, so a single instance
/// is shared by the flusher and the event poller.
#[derive(Debug, Clone)]
pub struct HttpScoringClient {
    http: HttpClient,
    host: String,
    api_key: String,
    timeout: Duration,
}

impl HttpScoringClient {
    /// Build a client for `host` with the given key and per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the TLS backend cannot be initialized.
    pub fn new(
        host: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            host: host.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Build a client from the `[api]` configuration section.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ClientError> {
        Self::new(&config.host, &config.api_key, config.timeout())
    }

    /// Whether an API key is configured.
    pub fn has_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.host, API_VERSION, path)
    }

    fn require_key(&self) -> Result<(), ClientError> {
        if self.has_key() {
            Ok(())
        } else {
            Err(ClientError::NoApiKey)
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            ClientError::Transport(e.to_string())
        }
    }

    /// Turn a non-2xx response into [`ClientError::Status`], keeping the
    /// server's `message` when the body carries one.
    async fn check_status(&self, response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.message)
            .unwrap_or_else(|_| default_message(status, body));

        Err(ClientError::Status {
            code: status.as_u16(),
            message,
        })
    }
}

fn default_message(status: StatusCode, body: String) -> String {
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_owned()
    } else {
        body.to_owned()
    }
}

impl ScoringClient for HttpScoringClient {
    async fn send_queries(&self, batch: &QueryBatch) -> Result<(), ClientError> {
        self.require_key()?;

        let url = self.url("/queries");
        tracing::debug!(url = %url, queries = batch.len(), "POST queries");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.api_key, Some(""))
            .json(&QueriesRequest::from_batch(batch))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let response = self.check_status(response).await?;
        let result: QueriesResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        if result.accepted < result.received {
            tracing::debug!(
                received = result.received,
                accepted = result.accepted,
                "scoring service accepted only part of the batch"
            );
        }
        Ok(())
    }

    async fn poll_events(&self, cursor: &Cursor) -> Result<EventPage, ClientError> {
        self.require_key()?;

        let url = self.url("/events");
        tracing::debug!(url = %url, cursor = %cursor, "GET events");

        let mut request = self.http.get(&url).basic_auth(&self.api_key, Some(""));
        if !cursor.is_start() {
            request = request.query(&[("follow", cursor.as_str())]);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let response = self.check_status(response).await?;
        let page: EventsResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        // An empty follow token means "no new position": keep the caller's cursor.
        let next = if page.follow.is_empty() {
            cursor.clone()
        } else {
            Cursor::new(page.follow)
        };

        Ok(EventPage {
            events: page.events,
            cursor: next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dnswatch_core::types::Query;

    #[test]
    fn batch_is_encoded_as_four_field_rows() {
        let ts = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
        let batch = QueryBatch::new(vec![Query::new(
            ts,
            "10.0.0.1".parse().unwrap(),
            "A",
            "Example.NET.",
        )]);

        let json = serde_json::to_value(QueriesRequest::from_batch(&batch)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"data": [["2017-01-01T00:00:00+00:00", "10.0.0.1", "A", "example.net"]]})
        );
    }

    #[test]
    fn url_joins_host_and_version() {
        let client =
            HttpScoringClient::new("http://localhost:8080/", "key", Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.url("/queries"), "http://localhost:8080/v1/queries");
    }

    #[test]
    fn default_message_prefers_body_then_reason() {
        assert_eq!(
            default_message(StatusCode::BAD_GATEWAY, "  upstream down ".to_owned()),
            "upstream down"
        );
        assert_eq!(
            default_message(StatusCode::BAD_GATEWAY, String::new()),
            "Bad Gateway"
        );
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let client =
            HttpScoringClient::new("http://127.0.0.1:9", "", Duration::from_secs(1)).unwrap();
        assert!(!client.has_key());

        let err = client.send_queries(&QueryBatch::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::NoApiKey));

        let err = client.poll_events(&Cursor::start()).await.unwrap_err();
        assert!(matches!(err, ClientError::NoApiKey));
    }
}
