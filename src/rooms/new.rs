use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth::Identity, extract::ApiJson, models::Room, store::Store, AppError, AppResult, AppState};

const MAX_NAME_CHARS: usize = 100;

#[derive(Debug, Serialize, Deserialize)]
pub struct NewRoomRequest {
    pub name: String,
    #[serde(default)]
    pub participants: Vec<Uuid>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_room(
    identity: Identity,
    State(store): State<Store>,
    ApiJson(NewRoomRequest { name, participants }): ApiJson<NewRoomRequest>,
) -> AppResult<(StatusCode, Json<Room>)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation_code("room name is required", "missing_name"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::validation_code(
            format!("room name is longer than {MAX_NAME_CHARS} characters"),
            "name_too_long",
        ));
    }
    if participants.is_empty() {
        return Err(AppError::validation_code("participants must not be empty", "missing_participants"));
    }

    let room = store.create_group_room(identity.user_id, name, &participants).await?;
    Ok((StatusCode::CREATED, Json(room)))
}
