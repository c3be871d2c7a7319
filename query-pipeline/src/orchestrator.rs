use std::sync::Arc;

use async_stream::stream;
use common::{
    cache::{CachedAnswer, QueryCache},
    error::AppError,
    storage::types::{document_chunk::DocumentChunk, interaction_record::InteractionRecord},
};
use futures::{stream::BoxStream, StreamExt};
use retrieval_pipeline::Retriever;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{generator::AnswerGenerator, log_store::InteractionLogStore};

/// Emitted in-band when generation fails after fragments have already been
/// sent; the transport response cannot be aborted at that point.
pub const GENERATION_FAILED_SENTINEL: &str = "An error occurred while generating the answer.";

/// The structured outcome of one non-streaming (or cached) request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub request_id: String,
}

/// Outcome of a streaming request. A cache hit short-circuits to the
/// structured response; only a miss produces a fragment stream.
pub enum StreamedAnswer {
    Cached(QueryResponse),
    Fragments(BoxStream<'static, String>),
}

/// The request-handling state machine:
/// mint id → cache check → retrieve → generate → persist → respond.
/// Stateless across requests; every collaborator is a shared handle.
#[derive(Clone)]
pub struct QueryOrchestrator {
    cache: Arc<QueryCache>,
    log_store: Arc<InteractionLogStore>,
    retriever: Arc<Retriever>,
    generator: Arc<dyn AnswerGenerator>,
    top_k: usize,
}

impl QueryOrchestrator {
    pub fn new(
        cache: Arc<QueryCache>,
        log_store: Arc<InteractionLogStore>,
        retriever: Arc<Retriever>,
        generator: Arc<dyn AnswerGenerator>,
        top_k: usize,
    ) -> Self {
        Self {
            cache,
            log_store,
            retriever,
            generator,
            top_k,
        }
    }

    /// Cache faults degrade to a miss; they never fail the request.
    async fn check_cache(&self, query: &str, request_id: &str) -> Option<QueryResponse> {
        match self.cache.get(query).await {
            Ok(Some(hit)) => {
                info!(request_id, "returning cached response");
                Some(QueryResponse {
                    answer: hit.answer,
                    sources: hit.sources,
                    request_id: request_id.to_owned(),
                })
            }
            Ok(None) => None,
            Err(e) => {
                warn!(request_id, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Zero retrieved chunks terminates the request as "not found" before
    /// any generation cost is paid or side effect is produced.
    async fn retrieve_context(
        &self,
        query: &str,
    ) -> Result<(Vec<DocumentChunk>, Vec<String>), AppError> {
        let chunks = self.retriever.retrieve(query, self.top_k).await?;
        if chunks.is_empty() {
            return Err(AppError::NotFound(
                "no relevant documents found".to_string(),
            ));
        }
        let sources = chunks.iter().map(|chunk| chunk.title.clone()).collect();
        Ok((chunks, sources))
    }

    /// Cache write and log append, in that order but independent: both are
    /// attempted, neither can fail the request, and both run only once the
    /// full answer is known.
    async fn persist(
        &self,
        request_id: &str,
        query: &str,
        answer: &str,
        sources: &[String],
        prompt: &str,
    ) {
        let entry = CachedAnswer {
            answer: answer.to_owned(),
            sources: sources.to_vec(),
        };
        if let Err(e) = self.cache.set(query, &entry).await {
            warn!(request_id, error = %e, "cache write failed");
        }

        let record = InteractionRecord::new(
            request_id.to_owned(),
            query.to_owned(),
            answer.to_owned(),
            sources,
            prompt.to_owned(),
        );
        if let Err(e) = self.log_store.append(record).await {
            error!(request_id, error = %e, "failed to persist interaction record");
        }
    }

    /// Blocking mode: the caller sees nothing until the answer is complete.
    /// A generation failure here produces no side effects at all.
    pub async fn answer(&self, query: &str) -> Result<QueryResponse, AppError> {
        let request_id = Uuid::new_v4().to_string();

        if let Some(hit) = self.check_cache(query, &request_id).await {
            return Ok(hit);
        }

        let (chunks, sources) = self.retrieve_context(query).await?;
        let generated = self.generator.generate(query, &chunks).await?;

        self.persist(
            &request_id,
            query,
            &generated.answer,
            &sources,
            &generated.prompt,
        )
        .await;

        info!(request_id, source_count = sources.len(), "answered query");
        Ok(QueryResponse {
            answer: generated.answer,
            sources,
            request_id,
        })
    }

    /// Streaming mode: fragments are forwarded to the caller as they are
    /// produced while the full answer accumulates in one pass. Persistence
    /// happens only after the fragment sequence is exhausted; a mid-stream
    /// failure yields the sentinel and suppresses persistence entirely.
    pub async fn answer_stream(&self, query: &str) -> Result<StreamedAnswer, AppError> {
        let request_id = Uuid::new_v4().to_string();

        if let Some(hit) = self.check_cache(query, &request_id).await {
            return Ok(StreamedAnswer::Cached(hit));
        }

        let (chunks, sources) = self.retrieve_context(query).await?;
        let generated = self.generator.generate_stream(query, &chunks).await?;

        let orchestrator = self.clone();
        let query = query.to_owned();
        let fragment_stream = stream! {
            let mut fragments = generated.fragments;
            let mut full_answer = String::new();

            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        full_answer.push_str(&fragment);
                        yield fragment;
                    }
                    Err(e) => {
                        error!(request_id = %request_id, error = %e, "generation failed mid-stream");
                        yield GENERATION_FAILED_SENTINEL.to_owned();
                        return;
                    }
                }
            }

            orchestrator
                .persist(&request_id, &query, &full_answer, &sources, &generated.prompt)
                .await;
            info!(request_id = %request_id, "streamed answer complete");
        };

        Ok(StreamedAnswer::Fragments(fragment_stream.boxed()))
    }
}
