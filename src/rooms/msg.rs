//! Wire format of the real-time channel: JSON text frames shaped
//! `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{RoomId, UserId};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinRoom(JoinRoom),
    #[serde(alias = "offer")]
    NegotiationOffer(Relayed),
    #[serde(alias = "answer")]
    NegotiationAnswer(Relayed),
    #[serde(alias = "ice-candidate")]
    NetworkCandidate(Relayed),
    ChatMessage(Relayed),
}

/// Both fields are optional on the wire so a half-filled join can be
/// reported back instead of failing to parse.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
}

/// A negotiation or chat message. Everything besides the routing fields
/// (`payload`, `message`, ...) rides along untouched in `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relayed {
    pub room_id: RoomId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemCode {
    ProtocolViolation,
    RoomFull,
    NotJoined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub code: ProblemCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    PeerJoined(Peer),
    PeerLeft(Peer),
    NegotiationOffer(Relayed),
    NegotiationAnswer(Relayed),
    NetworkCandidate(Relayed),
    ChatMessage(Relayed),
    Error(Problem),
}

impl ClientEvent {
    /// Splits a relayable event into its routing part and the event every
    /// other occupant receives. Joins return `None`.
    pub fn into_relay(self) -> Option<(Relayed, ServerEvent)> {
        use ClientEvent::*;
        let routing = match &self {
            JoinRoom(_) => return None,
            NegotiationOffer(r) | NegotiationAnswer(r) | NetworkCandidate(r) | ChatMessage(r) => r.clone(),
        };
        let event = match self {
            JoinRoom(_) => return None,
            NegotiationOffer(r) => ServerEvent::NegotiationOffer(r),
            NegotiationAnswer(r) => ServerEvent::NegotiationAnswer(r),
            NetworkCandidate(r) => ServerEvent::NetworkCandidate(r),
            ChatMessage(r) => ServerEvent::ChatMessage(r),
        };
        Some((routing, event))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_join() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "join-room",
            "data": { "userId": "u1", "roomId": "r1" }
        }))
        .unwrap();
        let ClientEvent::JoinRoom(join) = event else { panic!("not a join") };
        assert_eq!(join.user_id.as_deref(), Some("u1"));
        assert_eq!(join.room_id.as_deref(), Some("r1"));

        let half: ClientEvent =
            serde_json::from_value(json!({ "event": "join-room", "data": { "userId": "u1" } })).unwrap();
        assert!(matches!(half, ClientEvent::JoinRoom(JoinRoom { room_id: None, .. })));
    }

    #[test]
    fn test_short_event_names_are_accepted() {
        for (name, expect) in [
            ("offer", "negotiation-offer"),
            ("answer", "negotiation-answer"),
            ("ice-candidate", "network-candidate"),
            ("network-candidate", "network-candidate"),
        ] {
            let event: ClientEvent = serde_json::from_value(json!({
                "event": name,
                "data": { "roomId": "r1", "userId": "u1", "payload": { "sdp": "v=0" } }
            }))
            .unwrap();
            let (_, out) = event.into_relay().unwrap();
            assert_eq!(serde_json::to_value(&out).unwrap()["event"], expect);
        }
    }

    #[test]
    fn test_relay_keeps_extra_fields() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "chat-message",
            "data": { "roomId": "r1", "userId": "u1", "message": "hi", "sentAt": 12 }
        }))
        .unwrap();
        let (routing, out) = event.into_relay().unwrap();
        assert_eq!(routing.room_id, "r1");
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({
                "event": "chat-message",
                "data": { "roomId": "r1", "userId": "u1", "message": "hi", "sentAt": 12 }
            })
        );
    }

    #[test]
    fn test_relay_requires_routing_fields() {
        let missing_room = serde_json::from_value::<ClientEvent>(json!({
            "event": "chat-message",
            "data": { "userId": "u1", "message": "hi" }
        }));
        assert!(missing_room.is_err());
    }

    #[test]
    fn test_server_event_shapes() {
        let joined = serde_json::to_value(ServerEvent::PeerJoined(Peer { user_id: "u2".to_owned() })).unwrap();
        assert_eq!(joined, json!({ "event": "peer-joined", "data": { "userId": "u2" } }));

        let problem = serde_json::to_value(ServerEvent::Error(Problem {
            code: ProblemCode::RoomFull,
            message: "room r1 is full".to_owned(),
        }))
        .unwrap();
        assert_eq!(problem["data"]["code"], "room-full");
    }
}
