use seo_analytics_orchestrator::{agent::Orchestrator, api::start_server, config::Settings};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    info!("SEO & Analytics Orchestrator - API Server");
    info!("Port: {}", settings.port);
    if settings.llm.api_key.is_empty() {
        warn!("LITELLM_API_KEY not set in .env (see .env.example)");
    }

    let orchestrator = Arc::new(Orchestrator::from_settings(&settings)?);

    info!("Orchestrator initialized");

    start_server(orchestrator, settings.port).await?;

    Ok(())
}
