use axum::{debug_handler, extract::State, http::StatusCode};
use uuid::Uuid;

use crate::{
    auth::Identity,
    extract::ApiPath,
    gateway::{ConnId, Hub, ServerEvent},
    store::{ReadOutcome, Store},
    AppResult, AppState,
};

/// Marks a message read and, the first time only, tells the room.
pub(crate) async fn mark_read(
    store: &Store,
    hub: &Hub,
    reader: &Identity,
    message_id: Uuid,
    origin: Option<ConnId>,
) -> AppResult<ReadOutcome> {
    let outcome = store.mark_read(message_id, reader.user_id).await?;
    if outcome.newly_read {
        hub.publish(
            outcome.room_id,
            origin,
            ServerEvent::Read {
                room_id: outcome.room_id,
                message_id,
                user_id: reader.user_id,
            },
        )
        .await;
    }
    Ok(outcome)
}

#[debug_handler(state = AppState)]
pub(crate) async fn mark_message_read(
    identity: Identity,
    State(store): State<Store>,
    State(hub): State<Hub>,
    ApiPath(message_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    mark_read(&store, &hub, &identity, message_id, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::store::test_helpers::{test_store, test_user};

    use super::*;

    #[tokio::test]
    async fn receipt_is_published_once() {
        let store = test_store().await;
        let hub = Hub::new();
        let alice = test_user(&store, "alice").await;
        let bob = test_user(&store, "bob").await;
        let room = store.create_group_room(alice.id, "general", &[bob.id]).await.unwrap();
        let message = store.insert_message(room.id, alice.id, "hi").await.unwrap();
        let reader = Identity { user_id: bob.id, name: bob.display_name.clone() };

        let mut rx = hub.subscribe(room.id).await;
        mark_read(&store, &hub, &reader, message.id, None).await.unwrap();
        mark_read(&store, &hub, &reader, message.id, None).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap().event,
            ServerEvent::Read { room_id: room.id, message_id: message.id, user_id: bob.id }
        );
        assert!(rx.try_recv().is_err());
    }
}
