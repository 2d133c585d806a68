//! Webhook batch handler
//!
//! The upstream gateway retries on slow responses, so the handler
//! acknowledges immediately after parsing and runs admission (status watch,
//! dedup, enqueue) in a background task. Oversize and malformed bodies are
//! the only client-visible errors; everything downstream is internal.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::classify::RawBatch;
use crate::ingest::STATUS_OK;

use super::ApiState;

/// Webhook acknowledgement
#[derive(Serialize)]
pub struct SyncAck {
    pub success: bool,
    pub message: String,
}

fn ack(success: bool, message: &str) -> Json<SyncAck> {
    Json(SyncAck {
        success,
        message: message.to_string(),
    })
}

/// Handle one pushed message batch
///
/// Returns 200 with an ack before any message processing begins; admitted
/// messages are handed to the processing queue from a spawned task.
pub async fn handle_batch(
    State(state): State<Arc<ApiState>>,
    Path(account_id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> (StatusCode, Json<SyncAck>) {
    if account_id != state.account_id {
        tracing::warn!(account = %account_id, "batch for unknown account");
        return (StatusCode::NOT_FOUND, ack(false, "unknown account"));
    }

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "rejecting oversize or unreadable body");
            return (StatusCode::BAD_REQUEST, ack(false, "request body too large"));
        }
    };

    let batch: RawBatch = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting malformed batch body");
            return (StatusCode::BAD_REQUEST, ack(false, "malformed JSON body"));
        }
    };

    // ack first; admission happens outside the request lifecycle
    tokio::spawn(async move {
        admit_batch(&state, batch).await;
    });

    (StatusCode::OK, ack(true, "received"))
}

/// Run status watch, dedup, and enqueue for one batch
async fn admit_batch(state: &ApiState, batch: RawBatch) {
    state.login.observe(&batch.message).await;

    if batch.message != STATUS_OK {
        tracing::debug!(status = %batch.message, "batch carries no new messages");
        return;
    }

    let mut admitted = 0usize;
    let mut duplicates = 0usize;

    for entry in batch.data.add_msgs {
        let Some(message_id) = entry.msg_id else {
            continue;
        };

        if !state.dedup.admit(message_id) {
            duplicates += 1;
            tracing::debug!(message_id, "skipping duplicate message");
            continue;
        }

        if state.queue.push(entry) {
            admitted += 1;
        }
    }

    if admitted > 0 || duplicates > 0 {
        tracing::debug!(admitted, duplicates, "batch admitted");
    }
}
