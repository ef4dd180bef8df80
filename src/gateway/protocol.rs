//! Wire format of the real-time gateway. Every frame is a JSON text frame
//! tagged by `type`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Frames a client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage {
        room_id: Uuid,
        body: String,
        /// Echoed back in the ack or error so the client can match them up.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_ref: Option<String>,
    },
    MarkRead {
        message_id: Uuid,
    },
    JoinRoom {
        room_id: Uuid,
    },
    Ping,
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Ready {
        user_id: Uuid,
        rooms: Vec<Uuid>,
    },
    Message {
        message: Message,
    },
    MessageAck {
        #[serde(default)]
        client_ref: Option<String>,
        message: Message,
    },
    Read {
        room_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    },
    MemberJoined {
        room_id: Uuid,
        user_id: Uuid,
    },
    Presence {
        user_id: Uuid,
        online: bool,
    },
    Error {
        message: String,
        #[serde(default)]
        client_ref: Option<String>,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_are_type_tagged() {
        let room_id = Uuid::now_v7();
        let raw = format!(r#"{{"type":"send_message","room_id":"{room_id}","body":"hi"}}"#);
        let event: ClientEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage { room_id, body: "hi".into(), client_ref: None }
        );

        let ping: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, ClientEvent::Ping);
    }

    #[test]
    fn server_events_carry_their_tag() {
        let user_id = Uuid::now_v7();
        let json = serde_json::to_value(ServerEvent::Presence { user_id, online: true }).unwrap();
        assert_eq!(json["type"], "presence");
        assert_eq!(json["online"], true);

        let json = serde_json::to_value(ServerEvent::Pong).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "pong" }));
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"shout","body":"x"}"#).is_err());
    }
}
