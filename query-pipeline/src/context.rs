use std::sync::Arc;

use common::{cache::QueryCache, error::AppError};
use retrieval_pipeline::Retriever;
use tracing::info;

use crate::{generator::AnswerGenerator, log_store::InteractionLogStore, orchestrator::QueryOrchestrator};

/// Owns every long-lived component and wires them into the orchestrator.
/// Built once at startup, torn down once at shutdown.
pub struct AppContext {
    pub cache: Arc<QueryCache>,
    pub log_store: Arc<InteractionLogStore>,
    pub retriever: Arc<Retriever>,
    pub generator: Arc<dyn AnswerGenerator>,
    pub orchestrator: QueryOrchestrator,
}

impl AppContext {
    pub fn new(
        cache: Arc<QueryCache>,
        log_store: Arc<InteractionLogStore>,
        retriever: Arc<Retriever>,
        generator: Arc<dyn AnswerGenerator>,
        top_k: usize,
    ) -> Self {
        let orchestrator = QueryOrchestrator::new(
            cache.clone(),
            log_store.clone(),
            retriever.clone(),
            generator.clone(),
            top_k,
        );
        Self {
            cache,
            log_store,
            retriever,
            generator,
            orchestrator,
        }
    }

    /// Brings the service to a ready state: the log schema first, then the
    /// corpus build. Either failure aborts startup.
    pub async fn initialize(&self) -> Result<(), AppError> {
        self.log_store.initialize().await?;
        self.retriever.initialize().await?;
        info!("application context initialized");
        Ok(())
    }

    /// Releases each component independently; a failed cache teardown must
    /// not stop the retriever or log store from being released.
    pub async fn cleanup(&self) {
        self.cache.cleanup().await;
        self.retriever.cleanup();
        self.log_store.cleanup();
        info!("all components cleaned up");
    }
}
