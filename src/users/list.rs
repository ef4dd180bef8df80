use axum::{debug_handler, extract::State, Json};

use crate::{auth::Identity, gateway::Hub, models::User, store::Store, AppResult, AppState};

/// Everyone but the caller, flagged with whether they have a live connection.
#[debug_handler(state = AppState)]
pub(crate) async fn list_users(
    identity: Identity,
    State(store): State<Store>,
    State(hub): State<Hub>,
) -> AppResult<Json<Vec<User>>> {
    let online = hub.online_users().await;
    let users = store
        .list_users(identity.user_id)
        .await?
        .into_iter()
        .map(|user| User { online: Some(online.contains(&user.id)), ..user })
        .collect();
    Ok(Json(users))
}
