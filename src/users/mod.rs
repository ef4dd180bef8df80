mod list;
mod profile;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::list_users))
        .route("/{user_id}", get(profile::profile))
}
