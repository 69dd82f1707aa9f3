use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use psar_types::api::{Claims, MessageResponse, SendMessageRequest};
use psar_types::models::Message;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `created_at` timestamp of the
    /// oldest message from the previous page to fetch older messages.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Persist a message, then fan it out to live room members.
///
/// The relay runs strictly after the insert commits and can never fail the
/// request: by the time fan-out starts, the sender already has a confirmed
/// write. Recipients without a live connection catch up on next fetch.
pub async fn send_message(
    State(state): State<crate::AppState>,
    Path(thread_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.body.trim().is_empty() || req.body.len() > 4000 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let message = Message {
        id: Uuid::new_v4(),
        thread_id,
        sender_id: claims.sub,
        body: req.body,
        read: false,
        created_at: chrono::Utc::now(),
    };

    // Run blocking DB insert off the async runtime
    let db = state.db.clone();
    let row = message.clone();
    tokio::task::spawn_blocking(move || {
        db.insert_message(
            &row.id.to_string(),
            &row.thread_id.to_string(),
            &row.sender_id.to_string(),
            &row.body,
            &row.created_at.to_rfc3339(),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    state.relay.relay(thread_id, &message).await;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message.id,
            thread_id: message.thread_id,
            sender_id: message.sender_id,
            body: message.body,
            read: false,
            created_at: message.created_at,
        }),
    ))
}

pub async fn get_messages(
    State(state): State<crate::AppState>,
    Path(thread_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let tid = thread_id.to_string();
    let limit = query.limit.min(200);
    let before = query.before;

    let rows = tokio::task::spawn_blocking(move || db.get_messages(&tid, limit, before.as_deref()))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .map(|row| MessageResponse {
            id: row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt message id '{}': {}", row.id, e);
                Uuid::default()
            }),
            thread_id: row.thread_id.parse().unwrap_or_else(|e| {
                warn!("Corrupt thread_id '{}' on message '{}': {}", row.thread_id, row.id, e);
                Uuid::default()
            }),
            sender_id: row.sender_id.parse().unwrap_or_else(|e| {
                warn!("Corrupt sender_id '{}' on message '{}': {}", row.sender_id, row.id, e);
                Uuid::default()
            }),
            body: row.body,
            read: row.read,
            created_at: row
                .created_at
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|e| {
                    warn!("Corrupt created_at '{}' on message '{}': {}", row.created_at, row.id, e);
                    chrono::DateTime::default()
                }),
        })
        .collect();

    Ok(Json(messages))
}

/// Flip the read flag on every counterpart message in the thread. Invoked
/// by clients when the thread is their active view.
pub async fn mark_read(
    State(state): State<crate::AppState>,
    Path(thread_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, StatusCode> {
    let db = state.db.clone();
    let tid = thread_id.to_string();
    let reader = claims.sub.to_string();

    tokio::task::spawn_blocking(move || db.mark_thread_read(&tid, &reader))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::NO_CONTENT)
}
