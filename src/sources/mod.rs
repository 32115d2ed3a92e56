//! Data source traits and implementations
//!
//! Two read-only backends feed the orchestrator: a spreadsheet of site-audit
//! tabs and a web-analytics reporting API.

use crate::models::{Dimension, Metric, PlanDraft, Record, ReportingPlan};
use crate::table::Table;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

pub mod ga4;
pub mod memory;
pub mod sheets;

pub use ga4::Ga4Source;
pub use memory::{InMemoryTabularSource, StaticMetricsSource};
pub use sheets::SheetsSource;

pub const DEFAULT_DAYS_AGO: u32 = 7;
pub const MAX_DAYS_AGO: u32 = 365;
pub const FUSION_DAYS_AGO: u32 = 30;

/// Spreadsheet-like store of named tabs
#[async_trait]
pub trait TabularSource: Send + Sync {
    /// Every tab name; never fails (degrades to a default or empty list)
    async fn list_tabs(&self) -> Vec<String>;

    /// All rows of one tab. Failures name the tab and the reason.
    async fn fetch(&self, tab: &str) -> Result<Table>;
}

/// Web-analytics reporting backend
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn run(&self, account_id: &str, plan: &ReportingPlan) -> Result<Vec<Record>>;
}

/// Clamp a model-produced plan to the metric / dimension allow-lists.
///
/// Unknown names are dropped and duplicates collapse. An empty metric list
/// falls back to `activeUsers`. `days_ago` accepts a number or numeric
/// string, defaults to 7 and is clamped to 1..=365.
pub fn validate_plan(draft: &PlanDraft) -> ReportingPlan {
    let mut metrics: Vec<Metric> = Vec::new();
    for metric in draft.metrics.iter().filter_map(|m| Metric::from_api_name(m)) {
        if !metrics.contains(&metric) {
            metrics.push(metric);
        }
    }
    if metrics.is_empty() {
        metrics.push(Metric::ActiveUsers);
    }

    let mut dimensions: Vec<Dimension> = Vec::new();
    for dimension in draft.dimensions.iter().filter_map(|d| Dimension::from_api_name(d)) {
        if !dimensions.contains(&dimension) {
            dimensions.push(dimension);
        }
    }

    let days_ago = draft
        .days_ago
        .as_ref()
        .and_then(days_from_value)
        .map(|d| d.clamp(1, MAX_DAYS_AGO as i64) as u32)
        .unwrap_or(DEFAULT_DAYS_AGO);

    let filter_path = draft
        .filter_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    ReportingPlan {
        metrics,
        dimensions,
        days_ago,
        filter_path,
    }
}

fn days_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

/// Fixed page-level plan used when fusing metrics with audit data
pub fn fusion_plan() -> ReportingPlan {
    ReportingPlan {
        metrics: vec![Metric::ActiveUsers, Metric::ScreenPageViews],
        dimensions: vec![Dimension::PagePath],
        days_ago: FUSION_DAYS_AGO,
        filter_path: None,
    }
}
