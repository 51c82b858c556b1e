use conversational_bi::{
    agent::{profiles, DataAgent},
    api::{create_agent_router, start_server},
    config::{init_tracing, Settings},
    database::PgExecutor,
    llm::OpenAiClient,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();
    init_tracing();

    let agent_id = std::env::args().nth(1).ok_or("usage: data-agent <customers|orders|products>")?;
    let profile = profiles::find(&agent_id)
        .ok_or_else(|| format!("unknown data agent '{}'", agent_id))?;

    let settings = Settings::from_env()?;
    if settings.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY not set - every question will fail until it is configured");
    }

    let port = settings
        .agent_port(profile.id)
        .ok_or_else(|| format!("no port configured for '{}'", profile.id))?;

    info!(agent = profile.id, table = profile.table, port, "Starting data agent");

    let llm = Arc::new(OpenAiClient::from_settings(&settings)?);
    let executor = Arc::new(PgExecutor::from_settings(&settings)?);
    let agent = Arc::new(DataAgent::new(profile, settings.max_rows, llm, executor));

    info!(
        model = %settings.llm_model,
        max_rows = settings.max_rows,
        db_max_connections = settings.db_max_connections,
        "Data agent initialized"
    );

    let public_url = format!("http://localhost:{}/", port);
    start_server(create_agent_router(agent, public_url), port).await?;

    Ok(())
}
