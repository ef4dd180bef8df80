use axum::{debug_handler, extract::State, Json};
use uuid::Uuid;

use crate::{auth::Identity, extract::ApiPath, models::User, store::Store, AppResult, AppState};

#[debug_handler(state = AppState)]
pub(crate) async fn participants(
    identity: Identity,
    State(store): State<Store>,
    ApiPath(room_id): ApiPath<Uuid>,
) -> AppResult<Json<Vec<User>>> {
    store.require_member(room_id, identity.user_id).await?;
    Ok(Json(store.participants(room_id).await?))
}
