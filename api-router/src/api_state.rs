use std::sync::Arc;

use common::storage::db::SurrealDbClient;
use query_pipeline::orchestrator::QueryOrchestrator;
use retrieval_pipeline::Retriever;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub retriever: Arc<Retriever>,
    pub orchestrator: QueryOrchestrator,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        retriever: Arc<Retriever>,
        orchestrator: QueryOrchestrator,
    ) -> Self {
        Self {
            db,
            retriever,
            orchestrator,
        }
    }
}
