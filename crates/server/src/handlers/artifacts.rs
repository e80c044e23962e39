//! Artifact download endpoint.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use axum::response::{IntoResponse, Response};
use depot_core::ContentHash;
use futures::StreamExt;

/// GET /v1/artifacts/{digest} - Stream a committed artifact.
#[tracing::instrument(skip(state), fields(digest = %digest))]
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(digest): Path<String>,
) -> ApiResult<Response> {
    let digest = ContentHash::from_hex(&digest)
        .map_err(|e| ApiError::BadRequest(format!("invalid digest: {e}")))?;

    let artifacts = state.uploads.artifacts();
    let artifact = artifacts
        .head(&digest)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("artifact not found: {digest}")))?;

    let stream = artifacts.get_stream(&digest).await?;
    let body_stream = stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/octet-stream".to_string()),
            (CONTENT_LENGTH, artifact.size.to_string()),
            (ETAG, format!("\"{}\"", digest.to_hex())),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}
