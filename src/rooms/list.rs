use axum::{debug_handler, extract::State, Json};

use crate::{auth::Identity, models::Room, store::Store, AppResult, AppState};

#[debug_handler(state = AppState)]
pub(crate) async fn list_rooms(identity: Identity, State(store): State<Store>) -> AppResult<Json<Vec<Room>>> {
    Ok(Json(store.rooms_for(identity.user_id).await?))
}
