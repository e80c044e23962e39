//! Upload session handlers.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    ACTIVE_UPLOAD_SESSIONS, ARTIFACTS_DEDUPLICATED, BYTES_RECEIVED, CHUNK_WRITE_DURATION,
    CHUNKS_RETRANSMITTED, CHUNKS_WRITTEN, DIGEST_MISMATCHES, UPLOAD_COMMIT_DURATION,
    UPLOAD_SESSIONS_ABORTED, UPLOAD_SESSIONS_COMMITTED, UPLOAD_SESSIONS_CREATED,
    record_upload_error,
};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use depot_core::artifact::ArtifactResponse;
use depot_core::upload::{
    ChunkAckResponse, CommitUploadRequest, CreateUploadRequest, CreateUploadResponse,
    UploadStatusResponse,
};
use depot_core::{ContentHash, ContentRange, UploadId};
use depot_uploads::UploadError;
use std::time::Instant;

/// Header carrying the optional SHA-256 of a chunk body, hex encoded.
pub const CHUNK_SHA256_HEADER: &str = "x-chunk-sha256";

/// Slack allowed past the expected chunk length before the body read is
/// cut off. Bodies that fit are length-checked against the range exactly.
const CHUNK_UPLOAD_BUFFER: usize = 1024;

/// Maximum request body size for JSON requests (64 KiB).
const MAX_JSON_BODY_SIZE: usize = 64 * 1024;

/// Parse an upload id from a path segment.
fn parse_upload_id(raw: &str) -> ApiResult<UploadId> {
    UploadId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Read and deserialize a bounded JSON request body.
async fn read_json<T: serde::de::DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// Count a failed upload operation by kind.
fn observe_error(error: UploadError) -> ApiError {
    if matches!(error, UploadError::DigestMismatch { .. }) {
        DIGEST_MISMATCHES.inc();
    }
    record_upload_error(error.kind());
    ApiError::Upload(error)
}

/// POST /v1/uploads - Create a new upload session.
#[tracing::instrument(skip(state, req))]
pub async fn create_upload(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateUploadResponse>)> {
    let body: CreateUploadRequest = read_json(req).await?;

    let session = state
        .uploads
        .create_session(body.size)
        .map_err(observe_error)?;

    UPLOAD_SESSIONS_CREATED.inc();
    ACTIVE_UPLOAD_SESSIONS.set(state.uploads.active_sessions() as i64);

    Ok((
        StatusCode::CREATED,
        Json(CreateUploadResponse {
            upload_id: session.id.to_string(),
            size: session.declared_size,
            expires_at: session.expires_at,
        }),
    ))
}

/// GET /v1/uploads/{upload_id} - Query upload state.
#[tracing::instrument(skip(state), fields(upload_id = %upload_id))]
pub async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadStatusResponse>> {
    let upload_id = parse_upload_id(&upload_id)?;
    let session = state
        .uploads
        .status(upload_id)
        .await
        .map_err(observe_error)?;
    Ok(Json(session.status()))
}

/// PUT /v1/uploads/{upload_id} - Upload one chunk.
///
/// The chunk position comes from the `Content-Range` header (inclusive end).
/// An optional `X-Chunk-Sha256` header is verified before the chunk is stored.
#[tracing::instrument(skip(state, req), fields(upload_id = %upload_id, range))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ChunkAckResponse>> {
    let start_time = Instant::now();
    let upload_id = parse_upload_id(&upload_id)?;

    let content_range = parse_content_range(req.headers())?;
    let expected_hash = parse_chunk_hash(req.headers())?;
    let range = content_range
        .to_byte_range()
        .map_err(|e| observe_error(e.into()))?;
    tracing::Span::current().record("range", tracing::field::display(range));

    if let Some(total) = content_range.total {
        let session = state
            .uploads
            .status(upload_id)
            .await
            .map_err(observe_error)?;
        if total != session.declared_size {
            return Err(observe_error(UploadError::InvalidRange(format!(
                "Content-Range total {total} does not match declared size {}",
                session.declared_size
            ))));
        }
    }

    // A body past the range (or past the chunk cap) cannot be a valid chunk.
    let expected_len = range.len().min(state.config.uploads.max_chunk_size);
    let limit = usize::try_from(expected_len)
        .unwrap_or(usize::MAX)
        .saturating_add(CHUNK_UPLOAD_BUFFER);
    let body = axum::body::to_bytes(req.into_body(), limit)
        .await
        .map_err(|e| {
            observe_error(UploadError::InvalidRange(format!(
                "chunk body for {range} could not be read within {limit} bytes: {e}"
            )))
        })?;

    let ack = state
        .uploads
        .write_chunk(upload_id, range, body, expected_hash)
        .await
        .map_err(observe_error)?;

    if ack.duplicate {
        CHUNKS_RETRANSMITTED.inc();
    } else {
        CHUNKS_WRITTEN.inc();
        BYTES_RECEIVED.inc_by(range.len());
    }
    CHUNK_WRITE_DURATION.observe(start_time.elapsed().as_secs_f64());

    Ok(Json(ChunkAckResponse {
        upload_id: upload_id.to_string(),
        range: [ack.range.start(), ack.range.end()],
        bytes_received: ack.bytes_received,
        size: ack.declared_size,
        completed: ack.complete,
    }))
}

/// POST /v1/uploads/{upload_id}/commit - Verify and publish an upload.
#[tracing::instrument(skip(state, req), fields(upload_id = %upload_id))]
pub async fn commit_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    req: Request,
) -> ApiResult<(StatusCode, Json<ArtifactResponse>)> {
    let upload_id = parse_upload_id(&upload_id)?;
    let body: CommitUploadRequest = read_json(req).await?;
    let expected = ContentHash::from_hex(&body.sha256)
        .map_err(|e| ApiError::BadRequest(format!("invalid sha256: {e}")))?;

    let receipt = state
        .uploads
        .commit(upload_id, expected)
        .await
        .map_err(observe_error)?;

    UPLOAD_SESSIONS_COMMITTED.inc();
    if receipt.deduplicated {
        ARTIFACTS_DEDUPLICATED.inc();
    }
    UPLOAD_COMMIT_DURATION.observe(receipt.duration.as_secs_f64());
    ACTIVE_UPLOAD_SESSIONS.set(state.uploads.active_sessions() as i64);

    Ok((StatusCode::CREATED, Json(receipt.artifact.to_response())))
}

/// DELETE /v1/uploads/{upload_id} - Abandon an upload.
#[tracing::instrument(skip(state), fields(upload_id = %upload_id))]
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<StatusCode> {
    let upload_id = parse_upload_id(&upload_id)?;
    state.uploads.abort(upload_id).await.map_err(observe_error)?;

    UPLOAD_SESSIONS_ABORTED.inc();
    ACTIVE_UPLOAD_SESSIONS.set(state.uploads.active_sessions() as i64);
    Ok(StatusCode::NO_CONTENT)
}

fn parse_content_range(headers: &HeaderMap) -> ApiResult<ContentRange> {
    let value = headers
        .get(header::CONTENT_RANGE)
        .ok_or_else(|| ApiError::BadRequest("missing Content-Range header".to_string()))?
        .to_str()
        .map_err(|_| ApiError::BadRequest("Content-Range header is not ASCII".to_string()))?;
    value
        .parse::<ContentRange>()
        .map_err(|e| ApiError::Upload(e.into()))
}

fn parse_chunk_hash(headers: &HeaderMap) -> ApiResult<Option<ContentHash>> {
    let Some(value) = headers.get(CHUNK_SHA256_HEADER) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("{CHUNK_SHA256_HEADER} is not ASCII")))?;
    ContentHash::from_hex(value)
        .map(Some)
        .map_err(|e| ApiError::BadRequest(format!("invalid {CHUNK_SHA256_HEADER}: {e}")))
}
