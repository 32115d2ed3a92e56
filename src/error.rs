//! Error types for the SEO & analytics orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Message already names the tab and the reason
    #[error("{0}")]
    TabularSourceError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Filter error: {0}")]
    FilterError(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
