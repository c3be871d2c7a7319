use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{interaction_record::InteractionRecord, StoredObject},
    },
};
use tracing::{debug, info};

/// Append-only durable record of every completed interaction. Writes are
/// fire-and-forget from the orchestrator's perspective: the response has
/// already been returned by the time an append can fail.
pub struct InteractionLogStore {
    db: Arc<SurrealDbClient>,
}

impl InteractionLogStore {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    /// Idempotently ensures the log schema exists. Propagates failure: the
    /// audit guarantee is void without it, so startup must abort.
    pub async fn initialize(&self) -> Result<(), AppError> {
        self.db
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS unique_request_id ON TABLE {} FIELDS request_id UNIQUE",
                InteractionRecord::table_name()
            ))
            .await?;
        info!("interaction log schema ensured");
        Ok(())
    }

    /// Appends one record. The store rejects duplicate request ids; callers
    /// mint a fresh uuid per request so collisions indicate a bug upstream.
    pub async fn append(&self, record: InteractionRecord) -> Result<(), AppError> {
        let request_id = record.request_id.clone();
        self.db.store_item(record).await?;
        debug!(request_id, "interaction persisted");
        Ok(())
    }

    /// The database handle is shared with the retriever and owned by the
    /// application context, so there is nothing to tear down here.
    pub fn cleanup(&self) {
        info!("interaction log store released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn setup_store() -> InteractionLogStore {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        let store = InteractionLogStore::new(db);
        store.initialize().await.expect("initialize failed");
        store
    }

    fn record(request_id: &str) -> InteractionRecord {
        InteractionRecord::new(
            request_id.to_string(),
            "What is the capital of France?".to_string(),
            "Paris is the capital. [Source: geo_doc]".to_string(),
            &["geo_doc".to_string()],
            "rendered prompt".to_string(),
        )
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let store = setup_store().await;

        store.append(record("req-1")).await.expect("append failed");

        let rows: Vec<InteractionRecord> = store
            .db
            .get_all_stored_items()
            .await
            .expect("read failed");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].request_id, "req-1");
        assert_eq!(rows[0].sources, "geo_doc");
    }

    #[tokio::test]
    async fn test_duplicate_request_id_is_rejected() {
        let store = setup_store().await;

        store.append(record("req-1")).await.expect("append failed");
        let duplicate = store.append(record("req-1")).await;

        assert!(duplicate.is_err(), "unique index must reject the duplicate");
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = setup_store().await;

        store
            .initialize()
            .await
            .expect("re-initialize should not fail");
    }
}
