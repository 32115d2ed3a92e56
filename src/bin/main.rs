use seo_analytics_orchestrator::{agent::Orchestrator, config::Settings, QueryRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: orchestrator \"<query>\" [propertyId]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(query) = args.next() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let property_id = args.next();

    let settings = Settings::from_env()?;
    let orchestrator = Orchestrator::from_settings(&settings)?;

    info!(query = %query, property_id = ?property_id, "Running orchestrator");

    let response = orchestrator
        .respond(QueryRequest { query, property_id })
        .await;

    println!("{}", response.response);
    Ok(())
}
