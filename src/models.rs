//! Core data models for the orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;

/// One output row: column / metric name → value, in column order
pub type Record = serde_json::Map<String, serde_json::Value>;

//
// ================= Routing =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Intent {
    #[serde(rename = "SEO", alias = "seo")]
    Seo,
    #[serde(rename = "GA4", alias = "METRICS", alias = "ga4")]
    Metrics,
    #[serde(rename = "BOTH", alias = "both")]
    Both,
    Unknown,
}

impl Default for Intent {
    fn default() -> Self {
        Intent::Unknown
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Seo => "SEO",
            Intent::Metrics => "GA4",
            Intent::Both => "BOTH",
            Intent::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Routing decision produced by the classification prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntentDecision {
    #[serde(default, deserialize_with = "intent_or_unknown")]
    pub intent: Intent,
    #[serde(default)]
    pub selected_tab: Option<String>,
}

/// `null` or a non-string intent decodes as `Unknown` rather than failing
fn intent_or_unknown<'de, D>(deserializer: D) -> Result<Intent, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(Intent::Unknown))
}

//
// ================= Reporting Plan =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    ActiveUsers,
    NewUsers,
    Sessions,
    ScreenPageViews,
    AverageSessionDuration,
    BounceRate,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::ActiveUsers,
        Metric::NewUsers,
        Metric::Sessions,
        Metric::ScreenPageViews,
        Metric::AverageSessionDuration,
        Metric::BounceRate,
    ];

    pub fn api_name(&self) -> &'static str {
        match self {
            Metric::ActiveUsers => "activeUsers",
            Metric::NewUsers => "newUsers",
            Metric::Sessions => "sessions",
            Metric::ScreenPageViews => "screenPageViews",
            Metric::AverageSessionDuration => "averageSessionDuration",
            Metric::BounceRate => "bounceRate",
        }
    }

    pub fn from_api_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.api_name() == name.trim())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    Date,
    PagePath,
    City,
    SessionSource,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Date,
        Dimension::PagePath,
        Dimension::City,
        Dimension::SessionSource,
    ];

    pub fn api_name(&self) -> &'static str {
        match self {
            Dimension::Date => "date",
            Dimension::PagePath => "pagePath",
            Dimension::City => "city",
            Dimension::SessionSource => "sessionSource",
        }
    }

    pub fn from_api_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.api_name() == name.trim())
    }
}

/// Validated reporting request for the metrics backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportingPlan {
    pub metrics: Vec<Metric>,
    pub dimensions: Vec<Dimension>,
    pub days_ago: u32,
    pub filter_path: Option<String>,
}

/// Reporting plan exactly as the model returned it; untrusted until validated
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanDraft {
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub days_ago: Option<serde_json::Value>,
    #[serde(default)]
    pub filter_path: Option<String>,
}

//
// ================= Inbound API =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, rename = "propertyId")]
    pub property_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResponse {
    pub response: String,
}
