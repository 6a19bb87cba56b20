//! Handlers for the five box-facing endpoints in spec.md §6, plus `/health`.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use serde::Deserialize;
use slicebox_core::ids::{OutgoingImageId, OutgoingTransactionId};
use slicebox_core::SliceboxError;
use slicebox_transfer::outgoing;
use std::sync::Arc;

pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

/// `GET /outgoing/poll`: 200 with the next work item, 204 if the queue is
/// idle, 401 for an unknown POLL-box token.
pub async fn outgoing_poll(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TokenQuery>,
) -> ApiResult<axum::response::Response> {
    let box_ = state
        .db
        .poll_box_by_token(&q.token)
        .await?
        .ok_or_else(|| SliceboxError::unauthorized("unknown poll-box token"))?;

    match outgoing::poll_next(&state.db, box_.id).await? {
        Some(item) => Ok(axum::Json(item).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct OutgoingBytesQuery {
    pub token: String,
    pub transactionid: OutgoingTransactionId,
    pub imageid: OutgoingImageId,
}

/// `GET /outgoing?transactionid&imageid`: anonymised bytes for one polled
/// work item.
pub async fn outgoing_bytes(
    State(state): State<Arc<AppState>>,
    Query(q): Query<OutgoingBytesQuery>,
) -> ApiResult<axum::response::Response> {
    state
        .db
        .poll_box_by_token(&q.token)
        .await?
        .ok_or_else(|| SliceboxError::unauthorized("unknown poll-box token"))?;

    let output =
        outgoing::bytes_for(&state.db, &state.storage, &state.parser, &state.anon, q.transactionid, q.imageid).await?;
    Ok(Bytes::from(output.storage_bytes).into_response())
}

#[derive(Debug, Deserialize)]
pub struct OutgoingDoneBody {
    pub token: String,
    pub transaction_id: OutgoingTransactionId,
    pub image_id: OutgoingImageId,
}

/// `POST /outgoing/done`: ack delivery of one polled image.
pub async fn outgoing_done(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<OutgoingDoneBody>,
) -> ApiResult<StatusCode> {
    state
        .db
        .poll_box_by_token(&body.token)
        .await?
        .ok_or_else(|| SliceboxError::unauthorized("unknown poll-box token"))?;
    outgoing::mark_done(&state.db, body.transaction_id, body.image_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct OutgoingFailedBody {
    pub token: String,
    pub transaction_id: OutgoingTransactionId,
}

/// `POST /outgoing/failed`: the polling peer could not accept the image.
pub async fn outgoing_failed(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<OutgoingFailedBody>,
) -> ApiResult<StatusCode> {
    state
        .db
        .poll_box_by_token(&body.token)
        .await?
        .ok_or_else(|| SliceboxError::unauthorized("unknown poll-box token"))?;
    outgoing::mark_failed(&state.db, body.transaction_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct IncomingQuery {
    pub token: String,
    pub transactionid: OutgoingTransactionId,
    pub sequencenumber: i32,
    pub totalimagecount: i32,
}

/// `POST /incoming?transactionid&sequencenumber&totalimagecount`: body is
/// the raw DICOM bytes for this one image.
pub async fn incoming(
    State(state): State<Arc<AppState>>,
    Query(q): Query<IncomingQuery>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    slicebox_transfer::handle_incoming(
        &state.db,
        &state.storage,
        &state.parser,
        &state.anon,
        &state.metadata,
        &state.events,
        &state.contexts,
        state.temp_cleanup_delay,
        &q.token,
        q.transactionid,
        q.sequencenumber,
        q.totalimagecount,
        body,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
