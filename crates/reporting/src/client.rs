//! Reporting API seam: the response wire types, the `ReportingApi` trait the
//! extraction code depends on, and its HTTP implementation.

use crate::request::RunReportRequest;
use async_trait::async_trait;
use insight_core::auth::{TokenProvider, ANALYTICS_READONLY_SCOPE};
use insight_core::config::Ga4Config;
use insight_core::{InsightError, InsightResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// ─── Response types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionHeader {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricHeader {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionValue {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricValue {
    #[serde(default)]
    pub value: String,
}

/// One result row; values align positionally with the response headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    #[serde(default)]
    pub dimension_values: Vec<DimensionValue>,
    #[serde(default)]
    pub metric_values: Vec<MetricValue>,
}

impl Row {
    pub fn new<D, M>(dimensions: D, metrics: M) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            dimension_values: dimensions
                .into_iter()
                .map(|v| DimensionValue { value: v.into() })
                .collect(),
            metric_values: metrics
                .into_iter()
                .map(|v| MetricValue { value: v.into() })
                .collect(),
        }
    }
}

/// The API omits `rows` entirely when a page is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportResponse {
    #[serde(default)]
    pub dimension_headers: Vec<DimensionHeader>,
    #[serde(default)]
    pub metric_headers: Vec<MetricHeader>,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl RunReportResponse {
    /// Headers echoing the request, handy for fakes.
    pub fn for_request(request: &RunReportRequest, rows: Vec<Row>) -> Self {
        Self {
            dimension_headers: request
                .dimensions
                .iter()
                .map(|d| DimensionHeader {
                    name: d.name.clone(),
                })
                .collect(),
            metric_headers: request
                .metrics
                .iter()
                .map(|m| MetricHeader {
                    name: m.name.clone(),
                    metric_type: None,
                })
                .collect(),
            rows,
            row_count: None,
        }
    }
}

// ─── Trait ──────────────────────────────────────────────────────────────────

/// Anything that can answer a report request.
#[async_trait]
pub trait ReportingApi: Send + Sync {
    async fn run_report(&self, request: &RunReportRequest) -> InsightResult<RunReportResponse>;
}

// ─── HTTP client ────────────────────────────────────────────────────────────

/// Data API client. Stateless apart from the token cache, so one instance
/// can be shared by every concurrent job.
pub struct Ga4Client {
    http: reqwest::Client,
    api_url: String,
    tokens: Arc<TokenProvider>,
}

impl Ga4Client {
    pub fn new(config: &Ga4Config) -> InsightResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("insight-etl/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InsightError::Config(format!("reporting HTTP client: {e}")))?;

        let tokens = TokenProvider::from_settings(
            config.access_token.as_deref(),
            config.credentials_path.as_deref(),
            &[ANALYTICS_READONLY_SCOPE],
            http.clone(),
        )?;

        Ok(Self::with_tokens(http, &config.api_url, Arc::new(tokens)))
    }

    pub fn with_tokens(http: reqwest::Client, api_url: &str, tokens: Arc<TokenProvider>) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// `{api_url}/properties/{id}:runReport`
    pub fn report_url(&self, property: &str) -> String {
        format!("{}/{}:runReport", self.api_url, property)
    }
}

#[async_trait]
impl ReportingApi for Ga4Client {
    async fn run_report(&self, request: &RunReportRequest) -> InsightResult<RunReportResponse> {
        let url = self.report_url(&request.property);
        let token = self.tokens.token().await?;

        debug!(
            url = %url,
            limit = ?request.limit,
            offset = ?request.offset,
            "Issuing runReport"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(InsightError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_url() {
        let client = Ga4Client::with_tokens(
            reqwest::Client::new(),
            "https://analyticsdata.googleapis.com/v1beta/",
            Arc::new(TokenProvider::fixed("t")),
        );
        assert_eq!(
            client.report_url("properties/42"),
            "https://analyticsdata.googleapis.com/v1beta/properties/42:runReport"
        );
    }

    #[test]
    fn test_response_without_rows() {
        let response: RunReportResponse = serde_json::from_str(
            r#"{
                "dimensionHeaders": [{"name": "date"}],
                "metricHeaders": [{"name": "activeUsers", "type": "TYPE_INTEGER"}],
                "kind": "analyticsData#runReport"
            }"#,
        )
        .unwrap();
        assert!(response.rows.is_empty());
        assert_eq!(response.metric_headers[0].metric_type.as_deref(), Some("TYPE_INTEGER"));
    }

    #[test]
    fn test_response_rows_parse() {
        let response: RunReportResponse = serde_json::from_str(
            r#"{
                "dimensionHeaders": [{"name": "date"}],
                "metricHeaders": [{"name": "activeUsers"}],
                "rows": [{"dimensionValues": [{"value": "20240827"}], "metricValues": [{"value": "42"}]}],
                "rowCount": 1
            }"#,
        )
        .unwrap();
        assert_eq!(response.rows, vec![Row::new(["20240827"], ["42"])]);
        assert_eq!(response.row_count, Some(1));
    }

    #[test]
    fn test_client_from_config_with_token() {
        let config = Ga4Config {
            property_id: "1".into(),
            access_token: Some("t".into()),
            ..Default::default()
        };
        assert!(Ga4Client::new(&config).is_ok());
    }
}
