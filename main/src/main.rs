use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{
    cache::QueryCache,
    storage::db::SurrealDbClient,
    utils::{
        config::{get_config, CacheBackend},
        embedding::EmbeddingProvider,
    },
};
use query_pipeline::{
    context::AppContext, generator::OpenAiGenerator, log_store::InteractionLogStore,
};
use retrieval_pipeline::Retriever;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    // Create embedding provider based on config
    let embedding_provider =
        Arc::new(EmbeddingProvider::from_config(&config, Some(openai_client.clone())).await?);
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_dimension = embedding_provider.dimension(),
        "Embedding provider initialized"
    );

    // Ensure db indexes match the provider's dimensions
    db.ensure_initialized(embedding_provider.dimension()).await?;

    let cache = Arc::new(match config.cache_backend {
        CacheBackend::Redis => QueryCache::connect(&config.redis_url, config.cache_ttl_secs).await,
        CacheBackend::Memory => QueryCache::in_memory(config.cache_ttl_secs),
    });
    info!(
        cache_backend = cache.backend_label().await,
        "Cache initialized"
    );

    let log_store = Arc::new(InteractionLogStore::new(db.clone()));
    let retriever = Arc::new(Retriever::new(
        db.clone(),
        embedding_provider.clone(),
        &config,
    ));
    let generator = Arc::new(OpenAiGenerator::new(
        openai_client.clone(),
        config.query_model.clone(),
    ));

    let context = AppContext::new(
        cache,
        log_store,
        retriever.clone(),
        generator,
        config.retrieval_top_k,
    );
    context.initialize().await?;

    let api_state = ApiState::new(db.clone(), retriever, context.orchestrator.clone());

    // Create Axum router
    let app = Router::new()
        .nest("/api/v1", api_routes_v1())
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    context.cleanup().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use common::utils::config::AppConfig;
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;

    const TEST_DIMENSION: usize = 16;

    fn smoke_test_config(corpus_dir: &std::path::Path) -> AppConfig {
        AppConfig {
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: "test_ns".into(),
            surrealdb_database: format!("test_db_{}", Uuid::new_v4()),
            openai_api_key: "test-key".into(),
            openai_base_url: "https://example.com".into(),
            query_model: "test-model".into(),
            embedding_backend: "hashed".into(),
            embedding_model: None,
            embedding_dimensions: TEST_DIMENSION as u32,
            cache_backend: CacheBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".into(),
            cache_ttl_secs: 3600,
            corpus_dir: corpus_dir.to_string_lossy().into_owned(),
            chunk_size: 200,
            chunk_overlap: 40,
            min_corpus_documents: 1,
            retrieval_top_k: 3,
            http_port: 0,
        }
    }

    /// Full wiring against in-memory backends; the model endpoint is never
    /// reached because the empty corpus short-circuits every query.
    async fn smoke_test_app() -> (Router, tempfile::TempDir) {
        let corpus_dir = tempfile::tempdir().expect("failed to create tempdir");
        let config = smoke_test_config(corpus_dir.path());

        let db = Arc::new(
            SurrealDbClient::memory(
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await
            .expect("failed to start in-memory surrealdb"),
        );
        db.ensure_initialized(TEST_DIMENSION)
            .await
            .expect("failed to build indexes");

        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));
        let embedding_provider = Arc::new(EmbeddingProvider::new_hashed(TEST_DIMENSION));

        let cache = Arc::new(QueryCache::in_memory(config.cache_ttl_secs));
        let log_store = Arc::new(InteractionLogStore::new(db.clone()));
        let retriever = Arc::new(Retriever::new(
            db.clone(),
            embedding_provider,
            &config,
        ));
        let generator = Arc::new(OpenAiGenerator::new(
            openai_client,
            config.query_model.clone(),
        ));

        let context = AppContext::new(
            cache,
            log_store,
            retriever.clone(),
            generator,
            config.retrieval_top_k,
        );
        context.initialize().await.expect("context init failed");

        let api_state = ApiState::new(db, retriever, context.orchestrator.clone());
        let app = Router::new()
            .nest("/api/v1", api_routes_v1())
            .with_state(api_state);
        (app, corpus_dir)
    }

    fn query_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn smoke_startup_with_in_memory_backends() {
        let (app, _corpus_dir) = smoke_test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let ready_response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("ready response");
        assert_eq!(ready_response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn smoke_empty_query_is_bad_request() {
        let (app, _corpus_dir) = smoke_test_app().await;

        let response = app
            .oneshot(query_request(json!({ "query": "   " })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn smoke_empty_corpus_query_is_not_found() {
        let (app, _corpus_dir) = smoke_test_app().await;

        let response = app
            .oneshot(query_request(
                json!({ "query": "What is the capital of France?" }),
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
