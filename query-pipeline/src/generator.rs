use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use common::{error::AppError, storage::types::document_chunk::DocumentChunk};
use futures::{stream::BoxStream, StreamExt};

/// Instructions keeping the model grounded: answer only from the supplied
/// context, decline when it is insufficient, cite sources per claim.
pub const GROUNDING_SYSTEM_PROMPT: &str = r"You are a precise research assistant. Strictly use ONLY the provided context to answer the user's question.
If the answer cannot be found in the context, say 'I don't have enough information to answer that question.'

When answering:
- Be concise and factual
- Use bullet points when listing items
- Always cite sources like [Source: document_name] for each fact";

/// A completed generation together with the exact instruction text sent to
/// the model, retained so the orchestrator can persist it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub prompt: String,
}

/// An in-progress generation. A mid-stream failure arrives as a single
/// terminal `Err` item; the stream never panics past its boundary.
pub struct GeneratedStream {
    pub prompt: String,
    pub fragments: BoxStream<'static, Result<String, AppError>>,
}

fn render_context(chunks: &[DocumentChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("Document {}:\n{}", chunk.title, chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_user_message(query: &str, chunks: &[DocumentChunk]) -> String {
    format!(
        "Context:\n{}\n\nQuestion:\n{}",
        render_context(chunks),
        query
    )
}

/// The full instruction text for one generation, persisted alongside the
/// answer. Deterministic for identical inputs.
pub fn render_prompt(query: &str, chunks: &[DocumentChunk]) -> String {
    format!(
        "{GROUNDING_SYSTEM_PROMPT}\n\n{}",
        render_user_message(query, chunks)
    )
}

/// Seam between the orchestrator and the language model.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Produces the whole answer in one call. Failures here must leave no
    /// trace; the orchestrator neither caches nor logs on the error path.
    async fn generate(
        &self,
        query: &str,
        chunks: &[DocumentChunk],
    ) -> Result<GeneratedAnswer, AppError>;

    /// Produces the answer as ordered fragments that concatenate to exactly
    /// what `generate` would have returned for the same inputs.
    async fn generate_stream(
        &self,
        query: &str,
        chunks: &[DocumentChunk],
    ) -> Result<GeneratedStream, AppError>;
}

pub struct OpenAiGenerator {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }

    fn build_request(
        &self,
        query: &str,
        chunks: &[DocumentChunk],
    ) -> Result<CreateChatCompletionRequest, AppError> {
        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.1)
            .messages([
                ChatCompletionRequestSystemMessage::from(GROUNDING_SYSTEM_PROMPT).into(),
                ChatCompletionRequestUserMessage::from(render_user_message(query, chunks)).into(),
            ])
            .build()
            .map_err(AppError::from)
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        query: &str,
        chunks: &[DocumentChunk],
    ) -> Result<GeneratedAnswer, AppError> {
        let request = self.build_request(query, chunks)?;
        let response = self.client.chat().create(request).await?;

        let answer = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::Generation("no content in model response".to_string()))?;

        Ok(GeneratedAnswer {
            answer,
            prompt: render_prompt(query, chunks),
        })
    }

    async fn generate_stream(
        &self,
        query: &str,
        chunks: &[DocumentChunk],
    ) -> Result<GeneratedStream, AppError> {
        let request = self.build_request(query, chunks)?;
        let stream = self.client.chat().create_stream(request).await?;

        let fragments = stream
            .filter_map(|item| async move {
                match item {
                    Ok(response) => {
                        let content = response
                            .choices
                            .first()
                            .and_then(|choice| choice.delta.content.clone())
                            .unwrap_or_default();
                        (!content.is_empty()).then_some(Ok(content))
                    }
                    Err(e) => Some(Err(AppError::from(e))),
                }
            })
            // Terminate after the first error; consumers see exactly one.
            .scan(false, |failed, item| {
                if *failed {
                    return futures::future::ready(None);
                }
                *failed = item.is_err();
                futures::future::ready(Some(item))
            })
            .boxed();

        Ok(GeneratedStream {
            prompt: render_prompt(query, chunks),
            fragments,
        })
    }
}
