mod join;
mod list;
mod new;
mod participants;
mod private;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{messages, AppState};

pub use new::NewRoomRequest;
pub use private::PrivateRoomRequest;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::list_rooms).post(new::new_room))
        .route("/private", post(private::private_room))
        .route("/{room_id}/join", post(join::join_room))
        .route("/{room_id}/participants", get(participants::participants))
        .route(
            "/{room_id}/messages",
            get(messages::room_messages).post(messages::send_message),
        )
}
