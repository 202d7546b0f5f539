mod error;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use niro_core::astro::{AstroGateway, Geocoder, VedicApiClient};
use niro_core::compose::ReplyComposer;
use niro_core::config::NiroConfig;
use niro_core::llm::LlmService;
use niro_core::orchestrator::Orchestrator;
use niro_core::session::InMemorySessionStore;

pub type NiroOrchestrator = Orchestrator<InMemorySessionStore, VedicApiClient, LlmService>;

pub struct AppState {
    pub orchestrator: NiroOrchestrator,
}

pub fn build_state(config: &NiroConfig) -> Result<AppState> {
    let astro_client =
        VedicApiClient::from_config(&config.astro).context("astro API client init failed")?;
    let gateway = AstroGateway::new(astro_client, &config.astro);
    let geocoder = Geocoder::from_config(&config.geo).context("geocoder init failed")?;

    let mut providers = Vec::new();
    for (name, llm_config) in [("llm", &config.llm), ("llm_fallback", &config.llm_fallback)] {
        if !llm_config.enabled {
            continue;
        }
        match LlmService::from_config(llm_config) {
            Ok(service) => providers.push(service),
            Err(e) => tracing::warn!(section = name, error = %e, "LLM provider unavailable"),
        }
    }
    if providers.is_empty() {
        tracing::warn!("no LLM providers configured, replies will use deterministic stubs");
    }

    let orchestrator = Orchestrator::new(
        InMemorySessionStore::new(),
        gateway,
        geocoder,
        ReplyComposer::new(providers),
        &config.session,
    );

    Ok(AppState { orchestrator })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "niro_server=info,niro_core=info".parse().unwrap()),
        )
        .init();

    // load() validates and warns about any out-of-range values
    let config = NiroConfig::load(None).unwrap_or_else(|_| NiroConfig::default_config());

    let state = Arc::new(build_state(&config)?);

    let app = routes::routes()
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.web.host, config.web.port);
    tracing::info!("niro-server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
