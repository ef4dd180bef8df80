use axum::{debug_handler, extract::State, Json};

use crate::{models::User, store::Store, AppError, AppResult, AppState};

use super::Identity;

#[debug_handler(state = AppState)]
pub(crate) async fn me(identity: Identity, State(store): State<Store>) -> AppResult<Json<User>> {
    match store.find_user(identity.user_id).await? {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::Auth("account no longer exists".to_owned())),
    }
}
