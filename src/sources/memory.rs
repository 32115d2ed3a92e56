//! In-memory backends for development & testing

use super::{MetricsSource, TabularSource};
use crate::error::OrchestrationError;
use crate::models::{Record, ReportingPlan};
use crate::table::Table;
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Fixed set of named tabs, listed in insertion order
#[derive(Default)]
pub struct InMemoryTabularSource {
    tabs: Vec<(String, Table)>,
    fetches: AtomicUsize,
}

impl InMemoryTabularSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tab(mut self, name: &str, table: Table) -> Self {
        self.tabs.retain(|(existing, _)| existing != name);
        self.tabs.push((name.to_string(), table));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TabularSource for InMemoryTabularSource {
    async fn list_tabs(&self) -> Vec<String> {
        self.tabs.iter().map(|(name, _)| name.clone()).collect()
    }

    async fn fetch(&self, tab: &str) -> Result<Table> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.tabs
            .iter()
            .find(|(name, _)| name == tab)
            .map(|(_, table)| table.clone())
            .ok_or_else(|| {
                OrchestrationError::TabularSourceError(format!(
                    "Error fetching tab '{}': tab not found",
                    tab
                ))
            })
    }
}

/// Returns the same rows (or error) for every request and remembers plans
pub struct StaticMetricsSource {
    result: std::result::Result<Vec<Record>, String>,
    plans: Mutex<Vec<(String, ReportingPlan)>>,
}

impl StaticMetricsSource {
    pub fn with_rows(rows: Vec<Record>) -> Self {
        Self {
            result: Ok(rows),
            plans: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            plans: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.plans.lock().map(|p| p.len()).unwrap_or_default()
    }

    /// Account id and plan of every call so far
    pub fn requests(&self) -> Vec<(String, ReportingPlan)> {
        self.plans.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MetricsSource for StaticMetricsSource {
    async fn run(&self, account_id: &str, plan: &ReportingPlan) -> Result<Vec<Record>> {
        if let Ok(mut plans) = self.plans.lock() {
            plans.push((account_id.to_string(), plan.clone()));
        }
        self.result
            .clone()
            .map_err(OrchestrationError::MetricsError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::fusion_plan;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_tabs() {
        let source = InMemoryTabularSource::new()
            .with_tab("internal_all", Table::new(vec!["Address".to_string()]))
            .with_tab("response_codes_all", Table::default());

        assert_eq!(source.list_tabs().await, vec!["internal_all", "response_codes_all"]);
        tokio_test::assert_ok!(source.fetch("internal_all").await);

        let err = source.fetch("missing").await.unwrap_err();
        assert_eq!(err.to_string(), "Error fetching tab 'missing': tab not found");
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_static_metrics_records_requests() {
        let row = json!({"pagePath": "/", "activeUsers": 3}).as_object().cloned().unwrap();
        let source = StaticMetricsSource::with_rows(vec![row]);

        let rows = source.run("123", &fusion_plan()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(source.call_count(), 1);
        assert_eq!(source.requests()[0].0, "123");

        let failing = StaticMetricsSource::failing("quota exceeded");
        let err = failing.run("123", &fusion_plan()).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::MetricsError(ref m) if m == "quota exceeded"));
    }
}
