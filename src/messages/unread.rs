use std::collections::BTreeMap;

use axum::{debug_handler, extract::State, Json};
use uuid::Uuid;

use crate::{auth::Identity, store::Store, AppResult, AppState};

#[debug_handler(state = AppState)]
pub(crate) async fn unread(
    identity: Identity,
    State(store): State<Store>,
) -> AppResult<Json<BTreeMap<Uuid, i64>>> {
    Ok(Json(store.unread_counts(identity.user_id).await?))
}
