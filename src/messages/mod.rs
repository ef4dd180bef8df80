mod history;
mod read;
mod send;
mod unread;

use axum::{routing::post, Router};

use crate::AppState;

pub(crate) use history::room_messages;
pub(crate) use read::mark_read;
pub use send::{SendMessageRequest, MAX_BODY_CHARS};
pub(crate) use send::{send_message, send_msg};
pub(crate) use unread::unread;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{message_id}/read", post(read::mark_message_read))
}
