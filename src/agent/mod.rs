//! Main orchestrator - routes a question to the audit tabs, the analytics
//! backend, or both
//!
//! CLASSIFY → DISPATCH (SEO | METRICS | FUSION) → SUMMARIZE

use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::fusion::{self, FusionError, FUSION_TAB};
use crate::llm::{error_message, ChatCompletionsClient, LanguageModel};
use crate::models::{Intent, IntentDecision, PlanDraft, QueryRequest, QueryResponse};
use crate::prompts::{filter_request, routing_prompt, ANALYTICS_SYSTEM_PROMPT, SEO_FILTER_PROMPT};
use crate::sources::sheets::DEFAULT_TAB;
use crate::sources::{fusion_plan, validate_plan, Ga4Source, MetricsSource, SheetsSource, TabularSource};
use crate::table::{format_counts, truncate_records, Table};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const EMPTY_QUERY_MESSAGE: &str = "Please provide a query.";
pub const UNROUTABLE_MESSAGE: &str =
    "Sorry, I couldn't process that request right now. Please try again in a moment.";
pub const NO_MATCH_MESSAGE: &str =
    "I'm not sure how to handle that. Try asking about 'page views' (GA4) or 'broken links' (SEO).";
pub const NEED_PROPERTY_MESSAGE: &str =
    "This looks like an analytics request, but I need a propertyId to proceed.";
pub const NEED_PROPERTY_FUSION_MESSAGE: &str =
    "To combine Analytics and SEO data, I need a propertyId.";
pub const NO_DATA_TO_MERGE_MESSAGE: &str = "GA4 returned no data to merge.";

/// Columns profiled with value counts in the SEO statistics
const PROFILE_COLUMNS: [&str; 3] = ["Indexability", "Status Code", "Content Type"];

/// Preferred display columns for SEO sample rows
const RELEVANT_COLUMNS: [&str; 6] = [
    "Address",
    "URL",
    "Title 1",
    "Status Code",
    "Indexability",
    "Content Type",
];

const SAMPLE_ROWS: usize = 5;
const TOP_VALUES: usize = 5;

const STATISTICS_NOTE: &str =
    "Use the 'statistics' field for counts and percentages. Do not count the sample rows manually.";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful analytics assistant.";
const NO_DATA_INSTRUCTION: &str = " The API returned no data. Explain that the connection works but no traffic was found for this specific request.";

/// Main orchestrator that coordinates classification, retrieval and summary
pub struct Orchestrator {
    llm: Arc<dyn LanguageModel>,
    tabular: Arc<dyn TabularSource>,
    metrics: Arc<dyn MetricsSource>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        tabular: Arc<dyn TabularSource>,
        metrics: Arc<dyn MetricsSource>,
    ) -> Self {
        Self {
            llm,
            tabular,
            metrics,
        }
    }

    /// Wire up the HTTP-backed gateway and data sources
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let llm = ChatCompletionsClient::new(&settings.llm, settings.retry.clone())?;
        let tabular = SheetsSource::new(settings)?;
        let metrics = Ga4Source::new(settings)?;

        Ok(Self::new(Arc::new(llm), Arc::new(tabular), Arc::new(metrics)))
    }

    /// Request boundary: never fails, every outcome is a response string
    pub async fn respond(&self, request: QueryRequest) -> QueryResponse {
        let query = request.query.trim();
        if query.is_empty() {
            return QueryResponse {
                response: EMPTY_QUERY_MESSAGE.to_string(),
            };
        }

        let account_id = request
            .property_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let span = info_span!("query", request_id = %Uuid::new_v4());
        let response = match self.handle_query(query, account_id).instrument(span).await {
            Ok(text) => text,
            Err(e) => {
                error!("Query failed: {}", e);
                format!("An internal error occurred: {}", e)
            }
        };

        QueryResponse { response }
    }

    /// Classify, dispatch and summarize one question
    pub async fn handle_query(&self, query: &str, account_id: Option<&str>) -> Result<String> {
        // === CLASSIFY ===
        let tabs = self.tabular.list_tabs().await;
        let reply = self
            .llm
            .structured_completion(&routing_prompt(&tabs), query)
            .await;

        let Some(decision) = decode_decision(reply) else {
            return Ok(UNROUTABLE_MESSAGE.to_string());
        };
        let selected_tab = decision.selected_tab.filter(|t| !t.trim().is_empty());

        info!(
            intent = %decision.intent,
            tab = ?selected_tab,
            has_account = account_id.is_some(),
            "Routing decision"
        );

        // === DISPATCH ===
        // SEO first, then BOTH (even with an account id), then metrics
        match (decision.intent, account_id) {
            (Intent::Seo, _) => self.seo_path(query, selected_tab).await,
            (Intent::Both, _) => self.fusion_path(query, account_id).await,
            (Intent::Metrics, _) | (_, Some(_)) => self.metrics_path(query, account_id).await,
            _ => Ok(NO_MATCH_MESSAGE.to_string()),
        }
    }

    async fn seo_path(&self, query: &str, tab: Option<String>) -> Result<String> {
        let tab = tab.unwrap_or_else(|| DEFAULT_TAB.to_string());

        let table = match self.tabular.fetch(&tab).await {
            Ok(table) if !table.is_empty() => table,
            Ok(_) => {
                warn!("Tab '{}' is empty", tab);
                return Ok(format!("Could not retrieve data from tab '{}'.", tab));
            }
            Err(e) => {
                warn!("{}", e);
                return Ok(format!("Could not retrieve data from tab '{}'.", tab));
            }
        };

        let reply = self
            .llm
            .structured_completion(SEO_FILTER_PROMPT, &filter_request(table.columns(), query))
            .await;
        let expression = filter_expression(&reply);

        match self.profile_tab(query, &table, &expression).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!("SEO path failed on '{}': {}", tab, e);
                Ok(format!(
                    "I found the data in '{}', but couldn't filter it. Error: {}",
                    tab, e
                ))
            }
        }
    }

    async fn profile_tab(&self, query: &str, table: &Table, expression: &str) -> Result<String> {
        let filtered = if expression.is_empty() {
            table.clone()
        } else {
            debug!("Applying filter: {}", expression);
            crate::filter::apply_filter(table, expression)?
        };

        let payload = seo_payload(&filtered, table.columns(), expression);
        self.summarize(query, &payload).await
    }

    async fn metrics_path(&self, query: &str, account_id: Option<&str>) -> Result<String> {
        let Some(account_id) = account_id else {
            return Ok(NEED_PROPERTY_MESSAGE.to_string());
        };

        let reply = self
            .llm
            .structured_completion(ANALYTICS_SYSTEM_PROMPT, query)
            .await;
        if let Some(message) = error_message(&reply) {
            return Ok(message.to_string());
        }

        let draft: PlanDraft = match serde_json::from_value(reply) {
            Ok(draft) => draft,
            Err(e) => return Ok(OrchestrationError::InvalidPlan(e.to_string()).to_string()),
        };
        let plan = validate_plan(&draft);

        info!(
            metrics = ?plan.metrics,
            dimensions = ?plan.dimensions,
            days_ago = plan.days_ago,
            "Running reporting plan"
        );

        let payload = match self.metrics.run(account_id, &plan).await {
            Ok(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
            Err(e) => {
                warn!("Metrics request failed: {}", e);
                Value::String(e.to_string())
            }
        };

        self.summarize(query, &payload).await
    }

    async fn fusion_path(&self, query: &str, account_id: Option<&str>) -> Result<String> {
        let Some(account_id) = account_id else {
            return Ok(NEED_PROPERTY_FUSION_MESSAGE.to_string());
        };

        info!("Starting fusion of metrics and audit data");

        let rows = match self.metrics.run(account_id, &fusion_plan()).await {
            Ok(rows) => rows,
            Err(e) => return Ok(format!("GA4 Failed: {}", e)),
        };
        let metrics = Table::from_records(&rows);
        if metrics.is_empty() {
            return Ok(NO_DATA_TO_MERGE_MESSAGE.to_string());
        }

        let audit = match self.tabular.fetch(FUSION_TAB).await {
            Ok(table) if !table.is_empty() => table,
            _ => {
                return Ok(format!(
                    "Got GA4 data, but failed to fetch SEO data from '{}'.",
                    FUSION_TAB
                ))
            }
        };

        let merged = match fusion::merge(&metrics, audit) {
            Ok(merged) => merged,
            Err(FusionError::NoUrlColumn) => return Ok(FusionError::NoUrlColumn.to_string()),
            Err(e) => return Ok(format!("Fusion failed during data merging. Error: {}", e)),
        };

        let mut records = merged.to_records();
        truncate_records(&mut records);
        let payload = Value::Array(records.into_iter().map(Value::Object).collect());

        match self.summarize(query, &payload).await {
            Ok(summary) => Ok(summary),
            Err(e) => Ok(format!("Fusion failed during data merging. Error: {}", e)),
        }
    }

    /// Free-text summary of whatever was retrieved; errors propagate
    async fn summarize(&self, query: &str, payload: &Value) -> Result<String> {
        let rendered = render_payload(payload)?;

        let mut system = SUMMARY_SYSTEM_PROMPT.to_string();
        if is_empty_payload(payload) || rendered.contains("No data found") {
            system.push_str(NO_DATA_INSTRUCTION);
        }

        let user = format!(
            "User Question: {}\nRetrieved Data: {}\n\nProvide a concise, professional summary.",
            query, rendered
        );

        self.llm.summarize(&system, &user).await
    }
}

fn decode_decision(reply: Value) -> Option<IntentDecision> {
    if let Some(message) = error_message(&reply) {
        warn!("Classification failed: {}", message);
        return None;
    }
    match serde_json::from_value(reply) {
        Ok(decision) => Some(decision),
        Err(e) => {
            warn!("Unreadable classification reply: {}", e);
            None
        }
    }
}

/// Filter string from the model reply; an error reply means "no filter"
fn filter_expression(reply: &Value) -> String {
    if let Some(message) = error_message(reply) {
        warn!("Filter generation failed, using the full tab: {}", message);
        return String::new();
    }
    ["filter", "pandas_query", "query"]
        .iter()
        .find_map(|key| reply.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Statistics text, a few display rows and a note for the summarizer
fn seo_payload(filtered: &Table, source_columns: &[String], expression: &str) -> Value {
    let mut statistics = format!("Total Rows: {}", filtered.len());
    for column in PROFILE_COLUMNS {
        if filtered.has_column(column) {
            let counts = filtered.value_counts(column, TOP_VALUES);
            statistics.push_str(&format!("\n   - {} Breakdown: {}", column, format_counts(&counts)));
        }
    }

    let mut wanted: Vec<String> = RELEVANT_COLUMNS.iter().map(|c| c.to_string()).collect();
    if !expression.is_empty() {
        wanted.extend(
            source_columns
                .iter()
                .filter(|c| expression.contains(c.as_str()))
                .cloned(),
        );
    }

    let mut selected: Vec<String> = Vec::new();
    for column in wanted {
        if filtered.has_column(&column) && !selected.contains(&column) {
            selected.push(column);
        }
    }
    if selected.is_empty() {
        selected = filtered.columns().iter().take(5).cloned().collect();
    }

    let mut sample = filtered.select(&selected).head(SAMPLE_ROWS).to_records();
    truncate_records(&mut sample);

    json!({
        "statistics": statistics,
        "sample_data": sample,
        "note": STATISTICS_NOTE,
    })
}

fn render_payload(payload: &Value) -> Result<String> {
    match payload {
        Value::String(s) => Ok(s.clone()),
        other => Ok(serde_json::to_string_pretty(other)?),
    }
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::models::Record;
    use crate::sources::{InMemoryTabularSource, StaticMetricsSource};

    const ROUTING: &str = "You are the Orchestrator";
    const FILTER: &str = "row filter expression";
    const PLAN: &str = "You are a GA4 Expert";

    fn grid(rows: &[&[&str]]) -> Table {
        Table::from_grid(
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    /// Ten pages, eight of them returning 200
    fn internal_tab() -> Table {
        let mut rows: Vec<Vec<String>> = vec![vec![
            "Address".to_string(),
            "Status Code".to_string(),
            "Indexability".to_string(),
            "Title 1".to_string(),
        ]];
        for i in 0..10 {
            let code = if i < 8 { "200" } else { "404" };
            let indexability = if i < 8 { "Indexable" } else { "Non-Indexable" };
            rows.push(vec![
                format!("https://example.com/page-{}", i),
                code.to_string(),
                indexability.to_string(),
                format!("Page {}", i),
            ]);
        }
        Table::from_grid(rows)
    }

    struct Harness {
        llm: Arc<ScriptedModel>,
        tabular: Arc<InMemoryTabularSource>,
        metrics: Arc<StaticMetricsSource>,
        orchestrator: Orchestrator,
    }

    fn harness(llm: ScriptedModel, tabular: InMemoryTabularSource, metrics: StaticMetricsSource) -> Harness {
        let llm = Arc::new(llm);
        let tabular = Arc::new(tabular);
        let metrics = Arc::new(metrics);
        let orchestrator = Orchestrator::new(llm.clone(), tabular.clone(), metrics.clone());
        Harness {
            llm,
            tabular,
            metrics,
            orchestrator,
        }
    }

    fn ask(query: &str, property_id: Option<&str>) -> QueryRequest {
        QueryRequest {
            query: query.to_string(),
            property_id: property_id.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_seo_statistics_for_default_tab() {
        let h = harness(
            ScriptedModel::new()
                .reply_when(ROUTING, json!({"intent": "SEO", "selected_tab": null}))
                .reply_when(FILTER, json!({"filter": ""})),
            InMemoryTabularSource::new().with_tab("Internal", internal_tab()),
            StaticMetricsSource::with_rows(vec![]),
        );

        let response = h.orchestrator.respond(ask("How healthy are my pages?", None)).await.response;

        assert!(response.contains("User Question: How healthy are my pages?"));
        assert!(response.contains("Total Rows: 10"));
        assert!(response.contains("Status Code Breakdown: {200: 8, 404: 2}"));
        assert!(response.contains("Do not count the sample rows manually."));

        let calls = h.llm.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].user_text.starts_with("Columns: ['Address', 'Status Code'"));
        assert!(!calls[2].structured);
        assert_eq!(calls[2].system_prompt, SUMMARY_SYSTEM_PROMPT);
        assert_eq!(h.metrics.call_count(), 0);
    }

    #[tokio::test]
    async fn test_seo_filter_narrows_rows() {
        let h = harness(
            ScriptedModel::new()
                .reply_when(ROUTING, json!({"intent": "SEO", "selected_tab": "internal_all"}))
                .reply_when(FILTER, json!({"filter": "`Status Code` == 404"})),
            InMemoryTabularSource::new().with_tab("internal_all", internal_tab()),
            StaticMetricsSource::with_rows(vec![]),
        );

        let response = h.orchestrator.respond(ask("Show broken pages", None)).await.response;
        assert!(response.contains("Total Rows: 2"));
        assert!(response.contains("Indexability Breakdown: {'Non-Indexable': 2}"));
        assert!(response.contains("https://example.com/page-8"));
        assert!(!response.contains("https://example.com/page-0"));
    }

    #[tokio::test]
    async fn test_seo_bad_filter_names_tab_and_cause() {
        let h = harness(
            ScriptedModel::new()
                .reply_when(ROUTING, json!({"intent": "SEO", "selected_tab": "internal_all"}))
                .reply_when(FILTER, json!({"pandas_query": "`Response Time` > 2"})),
            InMemoryTabularSource::new().with_tab("internal_all", internal_tab()),
            StaticMetricsSource::with_rows(vec![]),
        );

        let response = h.orchestrator.respond(ask("Slow pages?", None)).await.response;
        assert!(response.starts_with("I found the data in 'internal_all', but couldn't filter it. Error:"));
        assert!(response.contains("Response Time"));
    }

    #[tokio::test]
    async fn test_seo_deeply_nested_filter_is_reported() {
        let nested = format!("{}`Status Code` == 404{}", "(".repeat(5_000), ")".repeat(5_000));
        let h = harness(
            ScriptedModel::new()
                .reply_when(ROUTING, json!({"intent": "SEO", "selected_tab": "internal_all"}))
                .reply_when(FILTER, json!({"filter": nested})),
            InMemoryTabularSource::new().with_tab("internal_all", internal_tab()),
            StaticMetricsSource::with_rows(vec![]),
        );

        let response = h.orchestrator.respond(ask("Broken pages?", None)).await.response;
        assert_eq!(
            response,
            "I found the data in 'internal_all', but couldn't filter it. \
             Error: Filter error: Filter expression is nested too deeply"
        );
    }

    #[tokio::test]
    async fn test_seo_long_url_list_filter() {
        let urls = (0..2_000)
            .map(|i| format!("Address == 'https://example.com/page-{}'", i))
            .collect::<Vec<_>>()
            .join(" or ");
        let h = harness(
            ScriptedModel::new()
                .reply_when(ROUTING, json!({"intent": "SEO", "selected_tab": "internal_all"}))
                .reply_when(FILTER, json!({"filter": urls})),
            InMemoryTabularSource::new().with_tab("internal_all", internal_tab()),
            StaticMetricsSource::with_rows(vec![]),
        );

        let response = h.orchestrator.respond(ask("Summarize these pages", None)).await.response;
        assert!(response.contains("Total Rows: 10"));
    }

    #[tokio::test]
    async fn test_seo_missing_tab() {
        let h = harness(
            ScriptedModel::new().reply_when(ROUTING, json!({"intent": "SEO", "selected_tab": "nope"})),
            InMemoryTabularSource::new(),
            StaticMetricsSource::with_rows(vec![]),
        );

        let response = h.orchestrator.respond(ask("404s", None)).await.response;
        assert_eq!(response, "Could not retrieve data from tab 'nope'.");
    }

    #[tokio::test]
    async fn test_seo_summary_failure_is_reported_with_tab() {
        let h = harness(
            ScriptedModel::new()
                .reply_when(ROUTING, json!({"intent": "SEO", "selected_tab": "internal_all"}))
                .reply_when(FILTER, json!({"filter": ""}))
                .failing_summary("gateway down"),
            InMemoryTabularSource::new().with_tab("internal_all", internal_tab()),
            StaticMetricsSource::with_rows(vec![]),
        );

        let response = h.orchestrator.respond(ask("Titles?", None)).await.response;
        assert_eq!(
            response,
            "I found the data in 'internal_all', but couldn't filter it. Error: LLM error: gateway down"
        );
    }

    #[tokio::test]
    async fn test_metrics_without_account_skips_backend() {
        let h = harness(
            ScriptedModel::new().reply_when(ROUTING, json!({"intent": "GA4", "selected_tab": null})),
            InMemoryTabularSource::new(),
            StaticMetricsSource::with_rows(vec![]),
        );

        let response = h.orchestrator.respond(ask("Page views last week?", None)).await.response;
        assert_eq!(response, NEED_PROPERTY_MESSAGE);
        assert_eq!(h.metrics.call_count(), 0);
        assert_eq!(h.llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_account_id_activates_metrics_path() {
        let h = harness(
            ScriptedModel::new()
                .reply_when(ROUTING, json!({"intent": "UNKNOWN"}))
                .reply_when(
                    PLAN,
                    json!({"metrics": ["screenPageViews", "revenue"], "dimensions": ["date"], "days_ago": "14"}),
                ),
            InMemoryTabularSource::new(),
            StaticMetricsSource::with_rows(vec![record(json!({"date": "20240101", "screenPageViews": 120}))]),
        );

        let response = h.orchestrator.respond(ask("How are we doing?", Some("123"))).await.response;
        assert!(response.contains("\"screenPageViews\": 120"));

        let requests = h.metrics.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "123");
        assert_eq!(requests[0].1.days_ago, 14);
        assert_eq!(requests[0].1.metrics, vec![crate::models::Metric::ScreenPageViews]);
    }

    #[tokio::test]
    async fn test_plan_error_is_returned_verbatim() {
        let h = harness(
            ScriptedModel::new()
                .reply_when(ROUTING, json!({"intent": "GA4"}))
                .reply_when(PLAN, json!({"error": "Revenue is not an allowed metric."})),
            InMemoryTabularSource::new(),
            StaticMetricsSource::with_rows(vec![]),
        );

        let response = h.orchestrator.respond(ask("Revenue?", Some("123"))).await.response;
        assert_eq!(response, "Revenue is not an allowed metric.");
        assert_eq!(h.metrics.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_metrics_ask_for_no_data_explanation() {
        let h = harness(
            ScriptedModel::new()
                .reply_when(ROUTING, json!({"intent": "GA4"}))
                .reply_when(PLAN, json!({"metrics": ["activeUsers"]})),
            InMemoryTabularSource::new(),
            StaticMetricsSource::with_rows(vec![]),
        );

        h.orchestrator.respond(ask("Users yesterday?", Some("123"))).await;
        let calls = h.llm.calls();
        let summary = calls.last().unwrap();
        assert!(summary.system_prompt.ends_with(NO_DATA_INSTRUCTION));
        assert!(summary.user_text.contains("Retrieved Data: []"));
    }

    #[tokio::test]
    async fn test_metrics_summary_failure_reaches_boundary() {
        let h = harness(
            ScriptedModel::new()
                .reply_when(ROUTING, json!({"intent": "GA4"}))
                .reply_when(PLAN, json!({"metrics": ["sessions"]}))
                .failing_summary("gateway down"),
            InMemoryTabularSource::new(),
            StaticMetricsSource::with_rows(vec![]),
        );

        let response = h.orchestrator.respond(ask("Sessions?", Some("123"))).await.response;
        assert_eq!(response, "An internal error occurred: LLM error: gateway down");
    }

    #[tokio::test]
    async fn test_fusion_joins_on_normalized_path() {
        let audit = grid(&[
            &["Address", "Content Type", "Title 1", "Indexability"],
            &["https://example.com/blog/seo-tips", "text/html", "Ten SEO Tips", "Indexable"],
        ]);
        let h = harness(
            ScriptedModel::new()
                .reply_when(ROUTING, json!({"intent": "BOTH", "selected_tab": "response_codes_all"})),
            InMemoryTabularSource::new()
                .with_tab("internal_all", audit)
                .with_tab("response_codes_all", grid(&[&["Address"], &["x"]])),
            StaticMetricsSource::with_rows(vec![
                record(json!({"pagePath": "/blog/seo-tips/", "activeUsers": 7, "screenPageViews": 31})),
                record(json!({"pagePath": "/about", "activeUsers": 2, "screenPageViews": 3})),
            ]),
        );

        let response = h.orchestrator.respond(ask("Top pages and their titles", Some("123"))).await.response;
        assert!(response.contains("Ten SEO Tips"));
        assert!(response.contains("/about"));
        assert_eq!(h.tabular.fetch_count(), 1);

        let requests = h.metrics.requests();
        assert_eq!(requests[0].1, fusion_plan());
    }

    #[tokio::test]
    async fn test_fusion_guidance_messages() {
        let route_both = || ScriptedModel::new().reply_when(ROUTING, json!({"intent": "BOTH"}));

        let h = harness(route_both(), InMemoryTabularSource::new(), StaticMetricsSource::with_rows(vec![]));
        let response = h.orchestrator.respond(ask("Views and titles", None)).await.response;
        assert_eq!(response, NEED_PROPERTY_FUSION_MESSAGE);

        let h = harness(route_both(), InMemoryTabularSource::new(), StaticMetricsSource::failing("quota"));
        let response = h.orchestrator.respond(ask("Views and titles", Some("1"))).await.response;
        assert_eq!(response, "GA4 Failed: Metrics error: quota");

        let h = harness(route_both(), InMemoryTabularSource::new(), StaticMetricsSource::with_rows(vec![]));
        let response = h.orchestrator.respond(ask("Views and titles", Some("1"))).await.response;
        assert_eq!(response, NO_DATA_TO_MERGE_MESSAGE);

        let rows = vec![record(json!({"pagePath": "/", "activeUsers": 1, "screenPageViews": 1}))];
        let h = harness(route_both(), InMemoryTabularSource::new(), StaticMetricsSource::with_rows(rows.clone()));
        let response = h.orchestrator.respond(ask("Views and titles", Some("1"))).await.response;
        assert_eq!(response, "Got GA4 data, but failed to fetch SEO data from 'internal_all'.");

        let h = harness(
            route_both(),
            InMemoryTabularSource::new().with_tab("internal_all", grid(&[&["Page", "Title 1"], &["/", "Home"]])),
            StaticMetricsSource::with_rows(rows),
        );
        let response = h.orchestrator.respond(ask("Views and titles", Some("1"))).await.response;
        assert_eq!(response, "Could not find a URL column in SEO data to merge with.");
    }

    #[tokio::test]
    async fn test_empty_query_contacts_nothing() {
        let h = harness(
            ScriptedModel::new(),
            InMemoryTabularSource::new(),
            StaticMetricsSource::with_rows(vec![]),
        );

        let response = h.orchestrator.respond(ask("   ", Some("123"))).await.response;
        assert_eq!(response, EMPTY_QUERY_MESSAGE);
        assert!(h.llm.calls().is_empty());
        assert_eq!(h.tabular.fetch_count(), 0);
        assert_eq!(h.metrics.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_classification_and_no_match() {
        let h = harness(
            ScriptedModel::new(),
            InMemoryTabularSource::new(),
            StaticMetricsSource::with_rows(vec![]),
        );
        let response = h.orchestrator.respond(ask("Anything", None)).await.response;
        assert_eq!(response, UNROUTABLE_MESSAGE);

        let h = harness(
            ScriptedModel::new().reply_when(ROUTING, json!({"intent": "WEATHER"})),
            InMemoryTabularSource::new(),
            StaticMetricsSource::with_rows(vec![]),
        );
        let response = h.orchestrator.respond(ask("Will it rain?", None)).await.response;
        assert_eq!(response, NO_MATCH_MESSAGE);
    }

    #[test]
    fn test_filter_expression_keys() {
        assert_eq!(filter_expression(&json!({"filter": " a == 1 "})), "a == 1");
        assert_eq!(filter_expression(&json!({"pandas_query": "b == 2"})), "b == 2");
        assert_eq!(filter_expression(&json!({"error": "x", "filter": "c"})), "");
        assert_eq!(filter_expression(&json!({})), "");
    }

    #[test]
    fn test_seo_payload_falls_back_to_first_columns() {
        let table = grid(&[
            &["A", "B", "C", "D", "E", "F"],
            &["1", "2", "3", "4", "5", "6"],
        ]);
        let payload = seo_payload(&table, table.columns(), "");
        let sample = payload["sample_data"].as_array().unwrap();
        let keys: Vec<_> = sample[0].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(payload["statistics"], "Total Rows: 1");
    }

    #[test]
    fn test_seo_payload_truncates_long_text() {
        let long = "x".repeat(150);
        let table = grid(&[&["Address", "Word Count"], &[long.as_str(), "10"]]);
        let payload = seo_payload(&table, table.columns(), "`Word Count` > 5");
        let row = &payload["sample_data"][0];
        assert_eq!(row["Address"].as_str().unwrap().chars().count(), 103);
        assert_eq!(row["Word Count"], json!(10));
    }
}
