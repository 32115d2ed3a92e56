//! SEO & Analytics Orchestrator
//!
//! Answers natural-language questions about a website by:
//! - Classifying the question with a language model
//! - Filtering and profiling site-audit tabs stored in a spreadsheet
//! - Running GA4 reports for traffic questions
//! - Joining page metrics with audit rows on a normalized path
//! - Summarizing whatever was retrieved in plain prose
//!
//! FLOW:
//! CLASSIFY → DISPATCH (SEO | METRICS | FUSION) → SUMMARIZE

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod fusion;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod sources;
pub mod table;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::Orchestrator;
