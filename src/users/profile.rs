use axum::{debug_handler, extract::State, Json};
use uuid::Uuid;

use crate::{auth::Identity, extract::ApiPath, gateway::Hub, models::User, store::Store, AppResult, AppState};

#[debug_handler(state = AppState)]
pub(crate) async fn profile(
    _identity: Identity,
    State(store): State<Store>,
    State(hub): State<Hub>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> AppResult<Json<User>> {
    let user = store.user(user_id).await?;
    let online = hub.online_users().await.contains(&user.id);
    Ok(Json(User { online: Some(online), ..user }))
}
