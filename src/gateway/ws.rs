use axum::{
    debug_handler,
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinSet,
};
use uuid::Uuid;

use crate::{
    auth::{bearer_token, Identity, TokenSigner},
    extract::{ApiQuery, ApiWs},
    messages,
    store::Store,
    AppError, AppResult, AppState,
};

use super::{
    hub::{ConnId, Envelope, Hub},
    protocol::{ClientEvent, ServerEvent},
};

const OUTBOUND_CAPACITY: usize = 128;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HandshakeQuery {
    token: Option<String>,
}

/// WebSocket entry point. The token (query `token` or bearer header) is
/// checked before upgrading; a bad one never reaches a room group.
#[debug_handler(state = AppState)]
pub(crate) async fn gateway_ws(
    ApiQuery(HandshakeQuery { token }): ApiQuery<HandshakeQuery>,
    headers: HeaderMap,
    State(store): State<Store>,
    State(hub): State<Hub>,
    State(tokens): State<TokenSigner>,
    ApiWs(ws): ApiWs,
) -> AppResult<Response> {
    let Some(token) = token.as_deref().or_else(|| bearer_token(&headers)) else {
        return Err(AppError::Auth("missing token".to_owned()));
    };
    let identity = Identity::from(tokens.verify(token)?);

    Ok(ws
        .on_upgrade(move |socket| async move {
            Connection::open(socket, store, hub, identity).await;
        })
        .into_response())
}

struct Connection {
    conn_id: ConnId,
    identity: Identity,
    store: Store,
    hub: Hub,
    tx: mpsc::Sender<ServerEvent>,
    forwarders: JoinSet<()>,
}

impl Connection {
    async fn open(socket: WebSocket, store: Store, hub: Hub, identity: Identity) {
        let conn_id = Uuid::now_v7();
        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_CAPACITY);

        let room_ids = match store.room_ids_for(identity.user_id).await {
            Ok(room_ids) => room_ids,
            Err(e) => {
                tracing::error!(user_id = %identity.user_id, "failed to load rooms for connection: {e:?}");
                let _ = sender.close().await;
                return;
            }
        };

        let mut conn = Connection { conn_id, identity, store, hub, tx, forwarders: JoinSet::new() };
        let first = conn.hub.register(conn_id, &conn.identity).await;
        for room_id in &room_ids {
            conn.subscribe(*room_id).await;
        }
        tracing::info!(
            %conn_id,
            user_id = %conn.identity.user_id,
            rooms = room_ids.len(),
            "gateway connection ready"
        );

        if first {
            conn.announce_presence(&room_ids, true).await;
        }
        conn.emit(ServerEvent::Ready { user_id: conn.identity.user_id, rooms: room_ids }).await;

        let mut send_task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("failed to serialize event: {e}");
                        continue;
                    }
                };
                if sender.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                incoming = receiver.next() => {
                    let Some(Ok(msg)) = incoming else {
                        break;
                    };
                    match msg {
                        WsMessage::Text(text) => conn.handle_text(text.as_str()).await,
                        WsMessage::Close(_) => break,
                        _ => {}
                    }
                }
                _ = &mut send_task => break,
            }
        }

        conn.close(send_task).await;
    }

    async fn close(mut self, send_task: tokio::task::JoinHandle<()>) {
        self.forwarders.shutdown().await;
        send_task.abort();

        if let Some((session, last)) = self.hub.unregister(self.conn_id).await {
            if last {
                let rooms: Vec<Uuid> = session.rooms.into_iter().collect();
                self.announce_presence(&rooms, false).await;
            }
        }
        tracing::info!(conn_id = %self.conn_id, user_id = %self.identity.user_id, "gateway connection closed");
    }

    async fn emit(&self, event: ServerEvent) {
        let _ = self.tx.send(event).await;
    }

    async fn emit_error(&self, message: impl Into<String>, client_ref: Option<String>) {
        self.emit(ServerEvent::Error { message: message.into(), client_ref }).await;
    }

    /// Joins the room's broadcast group and forwards its events, minus the
    /// ones this connection caused, into the outbound queue.
    async fn subscribe(&mut self, room_id: Uuid) {
        let mut rx = self.hub.subscribe(room_id).await;
        self.hub.record_join(self.conn_id, room_id).await;

        let conn_id = self.conn_id;
        let tx = self.tx.clone();
        self.forwarders.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(Envelope { origin, event }) => {
                        if origin == Some(conn_id) {
                            continue;
                        }
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(%conn_id, %room_id, "room broadcast lagged by {n} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    async fn announce_presence(&self, room_ids: &[Uuid], online: bool) {
        for room_id in room_ids {
            self.hub
                .publish(
                    *room_id,
                    Some(self.conn_id),
                    ServerEvent::Presence { user_id: self.identity.user_id, online },
                )
                .await;
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                self.emit_error(format!("malformed event: {e}"), None).await;
                return;
            }
        };

        match event {
            ClientEvent::SendMessage { room_id, body, client_ref } => {
                self.send_message(room_id, &body, client_ref).await
            }
            ClientEvent::MarkRead { message_id } => {
                if let Err(e) = messages::mark_read(&self.store, &self.hub, &self.identity, message_id, None).await {
                    self.log_failure("mark_read", &e);
                    self.emit_error(e.public_message(), None).await;
                }
            }
            ClientEvent::JoinRoom { room_id } => self.join_room(room_id).await,
            ClientEvent::Ping => self.emit(ServerEvent::Pong).await,
        }
    }

    async fn send_message(&mut self, room_id: Uuid, body: &str, client_ref: Option<String>) {
        if !self.hub.is_joined(self.conn_id, room_id).await {
            self.emit_error(format!("not joined to room {room_id}"), client_ref).await;
            return;
        }

        match messages::send_msg(&self.store, &self.hub, &self.identity, room_id, body, Some(self.conn_id)).await {
            Ok(message) => self.emit(ServerEvent::MessageAck { client_ref, message }).await,
            Err(e) => {
                self.log_failure("send_message", &e);
                self.emit_error(e.public_message(), client_ref).await;
            }
        }
    }

    /// Picks up a room joined or created after this connection was opened.
    async fn join_room(&mut self, room_id: Uuid) {
        if self.hub.is_joined(self.conn_id, room_id).await {
            return;
        }
        match self.store.is_member(room_id, self.identity.user_id).await {
            Ok(true) => self.subscribe(room_id).await,
            Ok(false) => self.emit_error(format!("not a member of room {room_id}"), None).await,
            Err(e) => {
                self.log_failure("join_room", &e);
                self.emit_error(e.public_message(), None).await;
            }
        }
    }

    fn log_failure(&self, action: &str, err: &AppError) {
        match err {
            AppError::Internal(e) => {
                tracing::error!(conn_id = %self.conn_id, action, "gateway action failed: {e:?}")
            }
            other => tracing::debug!(conn_id = %self.conn_id, action, "gateway action rejected: {other}"),
        }
    }
}
