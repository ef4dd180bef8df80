use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::Identity,
    extract::{ApiPath, ApiQuery},
    models::Message,
    store::Store,
    AppResult, AppState,
};

pub const DEFAULT_PAGE: i64 = 50;
pub const MAX_PAGE: i64 = 200;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<i64>,
    before: Option<Uuid>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn room_messages(
    identity: Identity,
    State(store): State<Store>,
    ApiPath(room_id): ApiPath<Uuid>,
    ApiQuery(HistoryQuery { limit, before }): ApiQuery<HistoryQuery>,
) -> AppResult<Json<Vec<Message>>> {
    store.require_member(room_id, identity.user_id).await?;

    let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    Ok(Json(store.room_messages(room_id, limit, before).await?))
}
