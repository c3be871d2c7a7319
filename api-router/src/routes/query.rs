use std::convert::Infallible;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use query_pipeline::orchestrator::StreamedAnswer;
use serde::Deserialize;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub stream: bool,
}

/// Answers a question over the indexed corpus. With `stream: false` the
/// whole structured answer is returned as JSON; with `stream: true` the
/// answer arrives as plain-text fragments, unless a cache hit makes the
/// full JSON response available immediately.
pub async fn answer_query(
    State(state): State<ApiState>,
    Json(input): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    info!(
        query_bytes = input.query.len(),
        stream = input.stream,
        "received query request"
    );

    if !input.stream {
        let response = state.orchestrator.answer(&input.query).await?;
        return Ok(Json(response).into_response());
    }

    match state.orchestrator.answer_stream(&input.query).await? {
        StreamedAnswer::Cached(response) => Ok(Json(response).into_response()),
        StreamedAnswer::Fragments(fragments) => {
            let body =
                Body::from_stream(fragments.map(|fragment| {
                    Ok::<_, Infallible>(Bytes::from(fragment.into_bytes()))
                }));
            Ok((
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                body,
            )
                .into_response())
        }
    }
}
