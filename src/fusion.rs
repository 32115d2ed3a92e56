//! Joining page-level metrics with site-audit rows
//!
//! Both sides are keyed on a normalized path (the match key) so that
//! `/blog/seo-tips/` from the metrics backend lines up with
//! `https://example.com/blog/seo-tips` from the crawl export.

use crate::table::{Cell, Table};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Tab fused with metrics, regardless of what the classifier picked
pub const FUSION_TAB: &str = "internal_all";

pub const MATCH_KEY: &str = "match_key";

/// Lowercased names recognised as the URL column of an audit tab
pub const URL_COLUMN_ALIASES: [&str; 3] = ["address", "url", "destination"];

pub const PATH_COLUMN: &str = "pagePath";
pub const PAGE_VIEWS_COLUMN: &str = "screenPageViews";

/// Suffix for audit columns whose name is already taken on the metrics side
pub const CONFLICT_SUFFIX: &str = "_seo";

pub const USEFUL_COLUMNS: [&str; 7] = [
    "pagePath",
    "screenPageViews",
    "activeUsers",
    "Title 1",
    "Title",
    "Meta Description 1",
    "Indexability",
];

pub const MAX_FUSED_ROWS: usize = 10;

lazy_static! {
    static ref ORIGIN: Regex = Regex::new(r"^https?://[^/?#]+").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FusionError {
    #[error("Could not find a URL column in SEO data to merge with.")]
    NoUrlColumn,

    #[error("metrics rows carry no '{0}' column")]
    NoPathColumn(String),
}

/// Strip scheme and host, query string and fragment, and trailing slashes.
/// An empty result is the root path "/".
pub fn normalize_match_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let path = ORIGIN.replace(trimmed, "");
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// First column whose lowercased name is a known URL alias
pub fn find_url_column(table: &Table) -> Option<String> {
    table.find_column_ci(&URL_COLUMN_ALIASES).map(str::to_string)
}

/// Add the match key column derived from `source`; null cells get a null key
pub fn add_match_key(table: &mut Table, source: &str) {
    table.set_column(MATCH_KEY, |row| match row.get(source) {
        Some(Cell::Null) | None => Cell::Null,
        Some(cell) => Cell::Text(normalize_match_key(&cell.to_string())),
    });
}

/// Keep only HTML pages when the table has a content type column
pub fn restrict_to_html(table: &mut Table) {
    let Some(column) = table.find_column_ci(&["content type"]).map(str::to_string) else {
        return;
    };
    table.retain(|row| {
        row.get(&column)
            .and_then(Cell::as_str)
            .map(|ct| ct.to_lowercase().contains("text/html"))
            .unwrap_or(false)
    });
}

/// Column used to rank duplicate audit rows
pub fn title_column(table: &Table) -> Option<String> {
    ["Title 1", "Title"]
        .into_iter()
        .find(|c| table.has_column(c))
        .map(str::to_string)
        .or_else(|| {
            table
                .columns()
                .iter()
                .find(|c| c.to_lowercase().contains("title"))
                .cloned()
        })
}

/// One row per match key; the row with the longest title wins
pub fn dedupe_by_longest_title(table: &mut Table) {
    if let Some(title) = title_column(table) {
        table.sort_by_key_desc(|row| {
            row.get(&title)
                .map(|cell| match cell {
                    Cell::Null => 0,
                    other => other.to_string().chars().count(),
                })
                .unwrap_or(0)
        });
    }
    table.drop_duplicates(MATCH_KEY);
}

/// Left join on `key`: every left row is kept exactly once, unmatched right
/// cells are null. Right-side columns clashing with left names get
/// [`CONFLICT_SUFFIX`]; the right key column is not repeated.
pub fn left_join(left: &Table, right: &Table, key: &str) -> Table {
    let right_cols: Vec<(usize, String)> = right
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| name.as_str() != key)
        .map(|(idx, name)| {
            let out = if left.has_column(name) {
                format!("{}{}", name, CONFLICT_SUFFIX)
            } else {
                name.clone()
            };
            (idx, out)
        })
        .collect();

    let mut index: HashMap<String, usize> = HashMap::new();
    for (pos, row) in right.rows().enumerate() {
        if let Some(cell) = row.get(key).filter(|c| !matches!(c, Cell::Null)) {
            index.entry(cell.to_string()).or_insert(pos);
        }
    }
    let right_rows: Vec<_> = right.rows().collect();

    let mut columns = left.columns().to_vec();
    columns.extend(right_cols.iter().map(|(_, name)| name.clone()));
    let mut joined = Table::new(columns);

    for row in left.rows() {
        let mut cells = row.cells().to_vec();
        let matched = row
            .get(key)
            .filter(|c| !matches!(c, Cell::Null))
            .and_then(|c| index.get(&c.to_string()))
            .map(|&pos| right_rows[pos]);
        for (idx, _) in &right_cols {
            cells.push(matched.map(|r| r.cells()[*idx].clone()).unwrap_or(Cell::Null));
        }
        joined.push_row(cells);
    }

    joined
}

/// Useful columns first, then any title / description / h1 column
pub fn output_columns(table: &Table) -> Vec<String> {
    let mut out: Vec<String> = USEFUL_COLUMNS
        .iter()
        .filter(|c| table.has_column(c))
        .map(|c| c.to_string())
        .collect();

    for column in table.columns() {
        let lower = column.to_lowercase();
        let wanted = ["title", "description", "h1"].iter().any(|w| lower.contains(w));
        if wanted && !out.contains(column) {
            out.push(column.clone());
        }
    }
    out
}

/// Full fusion of a metrics table (grouped by page path) with an audit tab
pub fn merge(metrics: &Table, mut audit: Table) -> Result<Table, FusionError> {
    if !metrics.has_column(PATH_COLUMN) {
        return Err(FusionError::NoPathColumn(PATH_COLUMN.to_string()));
    }

    restrict_to_html(&mut audit);
    let url_column = find_url_column(&audit).ok_or(FusionError::NoUrlColumn)?;

    let mut metrics = metrics.clone();
    add_match_key(&mut metrics, PATH_COLUMN);
    add_match_key(&mut audit, &url_column);

    debug!(
        "Sample metrics keys: {:?}",
        sample_keys(&metrics)
    );
    debug!("Sample audit keys: {:?}", sample_keys(&audit));

    dedupe_by_longest_title(&mut audit);

    let mut joined = left_join(&metrics, &audit, MATCH_KEY);
    joined.sort_desc_by(PAGE_VIEWS_COLUMN);

    Ok(joined.select(&output_columns(&joined)).head(MAX_FUSED_ROWS))
}

fn sample_keys(table: &Table) -> Vec<String> {
    table
        .column_values(MATCH_KEY)
        .map(|values| values.take(3).map(|c| c.to_string()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grid(rows: &[&[&str]]) -> Table {
        Table::from_grid(
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    fn metrics(rows: &[(&str, i64)]) -> Table {
        let records: Vec<_> = rows
            .iter()
            .map(|(path, views)| {
                json!({"pagePath": path, "activeUsers": views / 2, "screenPageViews": views})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect();
        Table::from_records(&records)
    }

    #[test]
    fn test_normalize_match_key() {
        assert_eq!(normalize_match_key("https://example.com/blog/seo-tips"), "/blog/seo-tips");
        assert_eq!(normalize_match_key("/blog/seo-tips/"), "/blog/seo-tips");
        assert_eq!(normalize_match_key("http://example.com/a?utm=1#top"), "/a");
        assert_eq!(normalize_match_key("https://example.com"), "/");
        assert_eq!(normalize_match_key("https://example.com/"), "/");
        assert_eq!(normalize_match_key("/"), "/");
        assert_eq!(normalize_match_key(""), "/");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["https://a.com/x/y/", "/x//", "/", "http://b.org/?q=1", "/p?x#y"] {
            let once = normalize_match_key(raw);
            assert_eq!(normalize_match_key(&once), once);
        }
    }

    #[test]
    fn test_merge_joins_on_normalized_paths() {
        let audit = grid(&[
            &["Address", "Content Type", "Title 1", "Indexability"],
            &["https://example.com/blog/seo-tips", "text/html; charset=UTF-8", "SEO Tips", "Indexable"],
            &["https://example.com/", "text/html", "Home", "Indexable"],
            &["https://example.com/logo.png", "image/png", "", "Non-Indexable"],
        ]);
        let merged = merge(&metrics(&[("/", 40), ("/blog/seo-tips/", 90)]), audit).unwrap();

        assert_eq!(merged.len(), 2);
        let records = merged.to_records();
        assert_eq!(records[0]["pagePath"], json!("/blog/seo-tips/"));
        assert_eq!(records[0]["Title 1"], json!("SEO Tips"));
        assert_eq!(records[1]["Title 1"], json!("Home"));
        assert!(!merged.has_column(MATCH_KEY));
        assert!(!merged.has_column("Content Type"));
    }

    #[test]
    fn test_left_join_keeps_every_metrics_row() {
        let audit = grid(&[
            &["URL", "Title 1"],
            &["https://example.com/a", "A"],
        ]);
        let merged = merge(&metrics(&[("/a", 5), ("/b", 3), ("/c", 1)]), audit).unwrap();

        assert_eq!(merged.len(), 3);
        let records = merged.to_records();
        assert_eq!(records[0]["Title 1"], json!("A"));
        assert_eq!(records[1]["Title 1"], json!(null));
        assert_eq!(records[2]["Title 1"], json!(null));
    }

    #[test]
    fn test_dedupe_keeps_longest_title() {
        let audit = grid(&[
            &["Address", "Title 1"],
            &["https://example.com/a", "Short"],
            &["https://example.com/a/", "A much longer title"],
            &["https://example.com/a?page=2", "Mid title"],
        ]);
        let merged = merge(&metrics(&[("/a", 5)]), audit).unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.to_records()[0]["Title 1"], json!("A much longer title"));
    }

    #[test]
    fn test_non_html_rows_never_join() {
        let audit = grid(&[
            &["Address", "Content Type", "Title 1", "Indexability"],
            &["https://example.com/a?format=pdf", "application/pdf", "A much longer PDF title", "Non-Indexable"],
            &["https://example.com/a", "text/html", "Article A", "Indexable"],
        ]);
        let merged = merge(&metrics(&[("/a", 12)]), audit).unwrap();

        assert_eq!(merged.len(), 1);
        let records = merged.to_records();
        assert_eq!(records[0]["Title 1"], json!("Article A"));
        assert_eq!(records[0]["Indexability"], json!("Indexable"));
    }

    #[test]
    fn test_missing_url_column() {
        let audit = grid(&[&["Page", "Title 1"], &["/a", "A"]]);
        let err = merge(&metrics(&[("/a", 5)]), audit).unwrap_err();
        assert_eq!(err, FusionError::NoUrlColumn);
        assert_eq!(err.to_string(), "Could not find a URL column in SEO data to merge with.");
    }

    #[test]
    fn test_conflicting_columns_get_suffix() {
        let left = grid(&[&["match_key", "Indexability"], &["/a", "x"]]);
        let right = grid(&[&["match_key", "Indexability"], &["/a", "Indexable"]]);
        let joined = left_join(&left, &right, MATCH_KEY);
        assert_eq!(joined.columns(), &["match_key", "Indexability", "Indexability_seo"]);
    }

    #[test]
    fn test_output_columns_pick_up_descriptive_fields() {
        let table = grid(&[
            &["pagePath", "H1-1", "Meta Description 1", "Word Count", "screenPageViews"],
            &["/a", "Heading", "Desc", "10", "5"],
        ]);
        assert_eq!(
            output_columns(&table),
            vec!["pagePath", "screenPageViews", "Meta Description 1", "H1-1"]
        );
    }
}
