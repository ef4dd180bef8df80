use axum::{debug_handler, extract::State, Json};
use uuid::Uuid;

use crate::{
    auth::Identity,
    extract::ApiPath,
    gateway::{Hub, ServerEvent},
    models::Room,
    store::Store,
    AppResult, AppState,
};

#[debug_handler(state = AppState)]
pub(crate) async fn join_room(
    identity: Identity,
    State(store): State<Store>,
    State(hub): State<Hub>,
    ApiPath(room_id): ApiPath<Uuid>,
) -> AppResult<Json<Room>> {
    let (room, joined) = store.join_room(room_id, identity.user_id).await?;

    if joined {
        tracing::info!(%room_id, user_id = %identity.user_id, "joined room");
        hub.publish(room_id, None, ServerEvent::MemberJoined { room_id, user_id: identity.user_id })
            .await;
    }

    Ok(Json(room))
}
