//! Google Sheets v4 adapter
//!
//! Reads site-audit exports where each crawl report lives in its own tab.

use super::TabularSource;
use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::table::Table;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Tab guessed when the store is not configured
pub const DEFAULT_TAB: &str = "Internal";

/// Cell window read from each tab
pub const MAX_RANGE: &str = "A1:Z1000";

pub struct SheetsSource {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: Option<String>,
}

impl SheetsSource {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        if !settings.sheets_configured() {
            warn!("Sheets not configured (need SEO_SPREADSHEET_ID and an access token)");
        }

        Ok(Self {
            client,
            base_url: settings.sheets_base_url.clone(),
            spreadsheet_id: settings.spreadsheet_id.clone(),
            access_token: settings
                .google_access_token
                .clone()
                .filter(|_| !settings.spreadsheet_id.is_empty()),
        })
    }

    fn endpoint(&self, extra: &[&str]) -> std::result::Result<Url, String> {
        let mut url = Url::parse(&self.base_url).map_err(|e| e.to_string())?;
        url.path_segments_mut()
            .map_err(|_| format!("{} cannot be a base URL", self.base_url))?
            .pop_if_empty()
            .push("spreadsheets")
            .push(&self.spreadsheet_id)
            .extend(extra);
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        token: &str,
    ) -> std::result::Result<T, String> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status.as_u16(), body.trim()));
        }

        response.json::<T>().await.map_err(|e| e.to_string())
    }

    async fn fetch_grid(&self, tab: &str) -> std::result::Result<Vec<Vec<String>>, String> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| "Sheets service not initialized".to_string())?;

        let range = format!("'{}'!{}", tab, MAX_RANGE);
        let url = self.endpoint(&["values", &range])?;
        let body: ValueRange = self.get_json(url, token).await?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }
}

#[async_trait]
impl TabularSource for SheetsSource {
    async fn list_tabs(&self) -> Vec<String> {
        let Some(token) = self.access_token.as_deref() else {
            return vec![DEFAULT_TAB.to_string()];
        };

        let result = match self.endpoint(&[]) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("fields", "sheets.properties.title");
                self.get_json::<SpreadsheetMeta>(url, token).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(meta) => meta.sheets.into_iter().map(|s| s.properties.title).collect(),
            Err(e) => {
                warn!("Error fetching sheet metadata: {}", e);
                Vec::new()
            }
        }
    }

    async fn fetch(&self, tab: &str) -> Result<Table> {
        let grid = self.fetch_grid(tab).await.map_err(|e| {
            OrchestrationError::TabularSourceError(format!("Error fetching tab '{}': {}", tab, e))
        })?;

        let table = Table::from_grid(grid);
        info!(
            "Loaded tab '{}' ({} rows, {} columns)",
            tab,
            table.len(),
            table.columns().len()
        );
        Ok(table)
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}
