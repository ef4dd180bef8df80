use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth::Identity, extract::ApiJson, models::Room, store::Store, AppResult, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct PrivateRoomRequest {
    pub user_id: Uuid,
}

#[debug_handler(state = AppState)]
pub(crate) async fn private_room(
    identity: Identity,
    State(store): State<Store>,
    ApiJson(PrivateRoomRequest { user_id }): ApiJson<PrivateRoomRequest>,
) -> AppResult<Json<Room>> {
    Ok(Json(store.private_room(identity.user_id, user_id).await?))
}
