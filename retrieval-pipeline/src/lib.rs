pub mod corpus;

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::document_chunk::DocumentChunk, types::StoredObject},
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use tracing::{debug, info, instrument};

/// Holds the vector index over the chunked corpus. Built once at startup
/// and read-only afterwards; `retrieve` is safe for concurrent use.
pub struct Retriever {
    db: Arc<SurrealDbClient>,
    embedder: Arc<EmbeddingProvider>,
    corpus_dir: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    min_documents: usize,
    ready: AtomicBool,
}

impl Retriever {
    pub fn new(
        db: Arc<SurrealDbClient>,
        embedder: Arc<EmbeddingProvider>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            embedder,
            corpus_dir: PathBuf::from(&config.corpus_dir),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            min_documents: config.min_corpus_documents,
            ready: AtomicBool::new(false),
        }
    }

    /// Loads, chunks and embeds the corpus, then replaces the chunk table.
    /// Must complete before `retrieve` is callable.
    #[instrument(skip_all, fields(corpus_dir = %self.corpus_dir.display()))]
    pub async fn initialize(&self) -> Result<(), AppError> {
        let documents = corpus::read_documents(&self.corpus_dir, self.min_documents).await?;
        let chunks = corpus::chunk_documents(&documents, self.chunk_size, self.chunk_overlap)?;

        let embeddings = self
            .embedder
            .embed_batch(chunks.iter().map(|chunk| chunk.content.clone()).collect())
            .await?;

        // Drop chunks left over from a previous corpus build before inserting.
        self.db
            .query(format!("DELETE {}", DocumentChunk::table_name()))
            .await?;

        let chunk_count = chunks.len();
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            self.db
                .store_item(DocumentChunk::new(chunk.title, chunk.content, embedding))
                .await?;
        }

        self.ready.store(true, Ordering::Release);
        info!(chunk_count, "vector index initialized");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Returns up to `top_k` chunks nearest to the query, best match first.
    /// An empty result means nothing sufficiently relevant was indexed.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<DocumentChunk>, AppError> {
        if !self.is_ready() {
            return Err(AppError::NotReady(
                "retriever used before initialize".to_string(),
            ));
        }
        if query.trim().is_empty() {
            return Err(AppError::Validation(
                "query must be a non-empty string".to_string(),
            ));
        }

        let query_embedding = self.embedder.embed(query).await?;

        let knn_query = format!(
            "SELECT *, vector::distance::knn() AS distance FROM {} WHERE embedding <|{},40|> {:?} ORDER BY distance",
            DocumentChunk::table_name(),
            top_k,
            query_embedding
        );
        let chunks: Vec<DocumentChunk> = self.db.query(knn_query).await?.take(0)?;

        debug!(retrieved = chunks.len(), top_k, "similarity retrieval done");
        Ok(chunks)
    }

    /// Marks the retriever unusable; the shared database handle is owned by
    /// the application context and stays open.
    pub fn cleanup(&self) {
        self.ready.store(false, Ordering::Release);
        info!("retriever resources released");
    }
}
