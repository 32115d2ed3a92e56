//! GA4 Data API adapter (`properties.runReport`)

use super::MetricsSource;
use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::models::{Record, ReportingPlan};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info};

pub struct Ga4Source {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl Ga4Source {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.analytics_base_url.trim_end_matches('/').to_string(),
            access_token: settings.google_access_token.clone(),
        })
    }
}

#[async_trait]
impl MetricsSource for Ga4Source {
    async fn run(&self, account_id: &str, plan: &ReportingPlan) -> Result<Vec<Record>> {
        let token = self.access_token.as_deref().ok_or_else(|| {
            OrchestrationError::MetricsError("Analytics credentials not configured".to_string())
        })?;

        let property = account_id.trim().trim_start_matches("properties/");
        let url = format!("{}/properties/{}:runReport", self.base_url, property);
        let request = RunReportRequest::from_plan(plan);

        info!(
            "Running report for property {} ({} metrics, {} dimensions, {} days)",
            property,
            request.metrics.len(),
            request.dimensions.len(),
            plan.days_ago
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("runReport request failed: {}", e);
                OrchestrationError::MetricsError(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("runReport error response: {}", body);
            return Err(OrchestrationError::MetricsError(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let report: RunReportResponse = response.json().await.map_err(|e| {
            OrchestrationError::MetricsError(format!("Malformed runReport response: {}", e))
        })?;

        Ok(report.into_records())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReportRequest {
    date_ranges: Vec<DateRange>,
    dimensions: Vec<Named>,
    metrics: Vec<Named>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension_filter: Option<Value>,
}

impl RunReportRequest {
    fn from_plan(plan: &ReportingPlan) -> Self {
        Self {
            date_ranges: vec![DateRange {
                start_date: format!("{}daysAgo", plan.days_ago),
                end_date: "today".to_string(),
            }],
            dimensions: plan
                .dimensions
                .iter()
                .map(|d| Named { name: d.api_name().to_string() })
                .collect(),
            metrics: plan
                .metrics
                .iter()
                .map(|m| Named { name: m.api_name().to_string() })
                .collect(),
            dimension_filter: plan.filter_path.as_ref().map(|p| {
                json!({
                    "filter": {
                        "fieldName": "pagePath",
                        "stringFilter": {"matchType": "CONTAINS", "value": p}
                    }
                })
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DateRange {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunReportResponse {
    #[serde(default)]
    dimension_headers: Vec<Named>,
    #[serde(default)]
    metric_headers: Vec<Named>,
    #[serde(default)]
    rows: Vec<ReportRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportRow {
    #[serde(default)]
    dimension_values: Vec<CellValue>,
    #[serde(default)]
    metric_values: Vec<CellValue>,
}

#[derive(Debug, Deserialize)]
struct CellValue {
    #[serde(default)]
    value: String,
}

impl RunReportResponse {
    /// Dimension values stay text, metric values become numbers
    fn into_records(self) -> Vec<Record> {
        let RunReportResponse {
            dimension_headers,
            metric_headers,
            rows,
        } = self;

        rows.into_iter()
            .map(|row| {
                let mut record = Record::new();
                for (header, cell) in dimension_headers.iter().zip(row.dimension_values) {
                    record.insert(header.name.clone(), Value::String(cell.value));
                }
                for (header, cell) in metric_headers.iter().zip(row.metric_values) {
                    record.insert(header.name.clone(), metric_value(&cell.value));
                }
                record
            })
            .collect()
    }
}

fn metric_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dimension, Metric};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(base_url: &str, token: Option<&str>) -> Ga4Source {
        let settings = Settings {
            analytics_base_url: base_url.to_string(),
            google_access_token: token.map(String::from),
            ..Settings::default()
        };
        Ga4Source::new(&settings).unwrap()
    }

    fn plan() -> ReportingPlan {
        ReportingPlan {
            metrics: vec![Metric::ScreenPageViews, Metric::BounceRate],
            dimensions: vec![Dimension::PagePath],
            days_ago: 14,
            filter_path: Some("/pricing".to_string()),
        }
    }

    #[tokio::test]
    async fn test_run_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/properties/123:runReport"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "dimensionHeaders": [{"name": "pagePath"}],
                "metricHeaders": [{"name": "screenPageViews", "type": "TYPE_INTEGER"},
                                  {"name": "bounceRate", "type": "TYPE_FLOAT"}],
                "rows": [
                    {"dimensionValues": [{"value": "/pricing"}],
                     "metricValues": [{"value": "42"}, {"value": "0.35"}]}
                ],
                "rowCount": 1
            })))
            .mount(&server)
            .await;

        let rows = source(&server.uri(), Some("tok"))
            .run("properties/123", &plan())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["pagePath"], json!("/pricing"));
        assert_eq!(rows[0]["screenPageViews"], json!(42));
        assert_eq!(rows[0]["bounceRate"], json!(0.35));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["dateRanges"][0]["startDate"], "14daysAgo");
        assert_eq!(body["dateRanges"][0]["endDate"], "today");
        assert_eq!(body["metrics"], json!([{"name": "screenPageViews"}, {"name": "bounceRate"}]));
        assert_eq!(
            body["dimensionFilter"]["filter"]["stringFilter"]["value"],
            json!("/pricing")
        );
    }

    #[tokio::test]
    async fn test_empty_report_has_no_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "analyticsData#runReport"})))
            .mount(&server)
            .await;

        let rows = source(&server.uri(), Some("tok")).run("123", &plan()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_metrics_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let err = source(&server.uri(), Some("tok")).run("123", &plan()).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::MetricsError(ref m) if m.contains("403")));

        let err = source(&server.uri(), None).run("123", &plan()).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::MetricsError(_)));
    }
}
