use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::Identity,
    extract::{ApiJson, ApiPath},
    gateway::{ConnId, Hub, ServerEvent},
    models::Message,
    store::Store,
    AppError, AppResult, AppState,
};

pub const MAX_BODY_CHARS: usize = 4000;

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

pub(crate) fn validate_body(body: &str) -> AppResult<&str> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::validation_code("message body is empty", "empty_body"));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(AppError::validation_code(
            format!("message body is longer than {MAX_BODY_CHARS} characters"),
            "body_too_long",
        ));
    }
    Ok(body)
}

/// Persists a message and then fans it out to the room's group. Nothing is
/// published unless the insert succeeded. `origin` is skipped by the fan-out.
pub(crate) async fn send_msg(
    store: &Store,
    hub: &Hub,

    sender: &Identity,
    room_id: Uuid,
    body: &str,

    origin: Option<ConnId>,
) -> AppResult<Message> {
    let body = validate_body(body)?;
    store.require_member(room_id, sender.user_id).await?;

    let writer = hub.writer(room_id).await;
    let sent = async {
        let _guard = writer.lock().await;
        let message = store.insert_message(room_id, sender.user_id, body).await?;
        let reached = hub
            .publish(room_id, origin, ServerEvent::Message { message: message.clone() })
            .await;
        AppResult::Ok((message, reached))
    }
    .await;
    drop(writer);
    hub.release(room_id).await;

    let (message, reached) = sent?;

    tracing::debug!(%room_id, message_id = %message.id, reached, "message sent");
    Ok(message)
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_message(
    identity: Identity,
    State(store): State<Store>,
    State(hub): State<Hub>,
    ApiPath(room_id): ApiPath<Uuid>,
    ApiJson(SendMessageRequest { body }): ApiJson<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let message = send_msg(&store, &hub, &identity, room_id, &body, None).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
