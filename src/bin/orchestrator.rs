use conversational_bi::{
    api::{create_orchestrator_router, start_server},
    config::{init_tracing, Settings},
    llm::OpenAiClient,
    orchestrator::{client::HttpAgentClient, Orchestrator},
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();
    init_tracing();

    let settings = Settings::from_env()?;
    if settings.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY not set - routing and synthesis will fail until it is configured");
    }

    info!(
        port = settings.orchestrator_port,
        agents = ?settings.data_agent_urls,
        "Starting orchestrator"
    );

    let llm = Arc::new(OpenAiClient::from_settings(&settings)?);
    let transport = Arc::new(HttpAgentClient::from_settings(&settings)?);
    let orchestrator = Arc::new(Orchestrator::from_settings(&settings, transport, llm));

    // Discovery is lazy; agents started after the orchestrator are picked up
    // by the first question.
    start_server(
        create_orchestrator_router(orchestrator),
        settings.orchestrator_port,
    )
    .await?;

    Ok(())
}
