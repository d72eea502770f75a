//! Composition root: config in, ready-to-use router out.

use agentkit_agent::{Orchestrator, OrchestratorSettings, Router, RouterSettings};
use agentkit_config::{AppConfig, load_tool_catalog};
use agentkit_core::memory::TurnStore;
use agentkit_core::provider::Provider;
use agentkit_memory::{InMemoryTurnStore, PgTurnStore};
use agentkit_providers::OpenAiProvider;
use agentkit_tools::{PgQueryBackend, ToolDispatcher};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use crate::scripts;

pub async fn build_router(config: &AppConfig) -> anyhow::Result<Router> {
    let catalog = load_tool_catalog(&config.tools_path, |var| std::env::var(var).ok())
        .context("Failed to load tool catalog")?;
    info!(tools = catalog.len(), "Tool catalog ready");

    let provider: Arc<dyn Provider> =
        Arc::new(OpenAiProvider::from_config(config).context("Failed to build model provider")?);

    let store = open_store(config).await?;

    let dispatcher = ToolDispatcher::new(
        Arc::new(catalog),
        Arc::new(PgQueryBackend::new()),
        Arc::clone(&provider),
    )
    .with_scripts(scripts::builtin());

    let orchestrator = Orchestrator::new(
        provider,
        store,
        Arc::new(dispatcher),
        OrchestratorSettings::from_config(config),
    );

    Ok(Router::new(
        Arc::new(orchestrator),
        RouterSettings::from_config(config),
    ))
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn TurnStore>> {
    let memory = &config.memory;
    match &memory.database_url {
        Some(url) => {
            let store = PgTurnStore::shared(url, &memory.schema, memory.embedding_dim)
                .await
                .context("Failed to open the turn store")?;
            Ok(store)
        }
        None => {
            warn!("No database configured (PGSQL / DATABASE_URL); memory lasts for this run only");
            Ok(Arc::new(InMemoryTurnStore::new(memory.embedding_dim)))
        }
    }
}
