//! HTTP transport
//!
//! reqwest implementation of [`Transport`] and [`Monitoring`]. Each call is
//! one request; the response comes back as a [`RawResponse`] whatever its
//! status so that [`crate::response`] can classify it.

use super::encoder::{encode_query, encode_rule};
use super::{Monitoring, RawResponse, Transport, TransportError};
use crate::query::{Query, QueryBuilder, SelectionType};
use crate::rule::Rule;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method};
use serde_json::{json, Value};

/// HTTP transport for the platform's REST API
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL of the API (e.g., "https://example.backend.tempoiq.com")
    pub base_url: String,
    /// API key, sent as the basic auth user
    pub key: String,
    /// API secret, sent as the basic auth password
    pub secret: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            key: String::new(),
            secret: String::new(),
            request_timeout_ms: 30_000,
        }
    }
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("tempo-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Start a query for the given entity type
    pub fn query(&self, object_type: SelectionType) -> QueryBuilder<'_> {
        QueryBuilder::new(self, object_type)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn rule_url(&self, key: &str, suffix: &str) -> String {
        self.url(&format!(
            "/v2/monitoring/rules/{}{}",
            urlencoding::encode(key),
            suffix
        ))
    }

    /// Send one request and capture status, reason and body
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, TransportError> {
        tracing::debug!(%method, url, "Sending request");

        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.config.key, Some(&self.config.secret))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(TransportError::from_reqwest)?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let text = response.text().await.map_err(TransportError::from_reqwest)?;

        tracing::debug!(status = status.as_u16(), bytes = text.len(), "Received response");

        Ok(RawResponse {
            status_code: status.as_u16(),
            reason,
            text,
        })
    }
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl Transport for HttpClient {
    async fn read_sensors(&self, query: &Query) -> Result<RawResponse, TransportError> {
        let body = encode_query(query);
        self.send(Method::GET, &self.url("/v2/read"), Some(&body)).await
    }

    async fn search_devices(&self, query: &Query) -> Result<RawResponse, TransportError> {
        let body = encode_query(query);
        self.send(Method::GET, &self.url("/v2/devices/query"), Some(&body))
            .await
    }

    async fn single(&self, query: &Query) -> Result<RawResponse, TransportError> {
        let body = encode_query(query);
        self.send(Method::GET, &self.url("/v2/single"), Some(&body)).await
    }

    async fn delete_device(&self, query: &Query) -> Result<RawResponse, TransportError> {
        let body = encode_query(query);
        self.send(Method::DELETE, &self.url("/v2/devices"), Some(&body))
            .await
    }

    async fn delete_from_sensors(
        &self,
        device_key: &str,
        sensor_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RawResponse, TransportError> {
        let url = self.url(&format!(
            "/v2/devices/{}/sensors/{}/datapoints",
            urlencoding::encode(device_key),
            urlencoding::encode(sensor_key)
        ));
        let body = json!({ "start": timestamp(&start), "stop": timestamp(&end) });
        self.send(Method::DELETE, &url, Some(&body)).await
    }

    async fn monitor(&self, rule: &Rule) -> Result<RawResponse, TransportError> {
        let body = encode_rule(rule);
        self.send(Method::POST, &self.url("/v2/monitoring/rules"), Some(&body))
            .await
    }

    fn monitoring(&self) -> &dyn Monitoring {
        self
    }
}

#[async_trait]
impl Monitoring for HttpClient {
    async fn get_rule(&self, key: &str) -> Result<RawResponse, TransportError> {
        self.send(Method::GET, &self.rule_url(key, ""), None).await
    }

    async fn get_annotations(&self, key: &str) -> Result<RawResponse, TransportError> {
        self.send(Method::GET, &self.rule_url(key, "/annotations"), None)
            .await
    }

    async fn get_changelog(&self, key: &str) -> Result<RawResponse, TransportError> {
        self.send(Method::GET, &self.rule_url(key, "/changelog"), None)
            .await
    }

    async fn get_logs(&self, key: &str) -> Result<RawResponse, TransportError> {
        self.send(Method::GET, &self.rule_url(key, "/logs"), None).await
    }

    async fn get_usage(&self, key: &str) -> Result<RawResponse, TransportError> {
        self.send(Method::GET, &self.rule_url(key, "/usage"), None).await
    }

    async fn delete_rule(&self, key: &str) -> Result<RawResponse, TransportError> {
        self.send(Method::DELETE, &self.rule_url(key, ""), None).await
    }
}
