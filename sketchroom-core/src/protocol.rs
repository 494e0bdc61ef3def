//! JSON wire protocol.
//!
//! Every frame is a single WebSocket text message carrying one envelope:
//! ```text
//! { "event": "stroke:created", "data": { "roomId": "r1", "stroke": { … } } }
//! { "event": "board:clear" }                       (no payload)
//! ```
//!
//! Client → server and server → client events share names but not payloads,
//! so each direction has its own enum.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::shape::{Shape, ShapeError};

/// Server-assigned identity of one live connection.
pub type ConnectionId = Uuid;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("room id must not be empty")]
    EmptyRoomId,
    #[error("shape id must not be empty")]
    EmptyShapeId,
    #[error("invalid shape: {0}")]
    InvalidShape(#[from] ShapeError),
}

/// `join_room` payload.
///
/// Accepts both `{ "roomId": "r1", "nickname": "ann" }` and the bare
/// `"r1"` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "JoinPayload")]
pub struct JoinRoom {
    pub room_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl JoinRoom {
    pub fn new(room_id: impl Into<String>, nickname: Option<String>) -> Self {
        Self {
            room_id: room_id.into(),
            nickname,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JoinPayload {
    Bare(String),
    #[serde(rename_all = "camelCase")]
    Named {
        room_id: String,
        #[serde(default)]
        nickname: Option<String>,
    },
}

impl From<JoinPayload> for JoinRoom {
    fn from(payload: JoinPayload) -> Self {
        match payload {
            JoinPayload::Bare(room_id) => JoinRoom { room_id, nickname: None },
            JoinPayload::Named { room_id, nickname } => JoinRoom { room_id, nickname },
        }
    }
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    #[serde(rename = "join_room")]
    JoinRoom(JoinRoom),
    #[serde(rename = "stroke:created")]
    CreateShape { room_id: String, stroke: Shape },
    #[serde(rename = "shape:update")]
    UpdateShape { room_id: String, shape: Shape },
    #[serde(rename = "shape:delete")]
    DeleteShape { room_id: String, shape_id: String },
    #[serde(rename = "board:clear")]
    ClearBoard { room_id: String },
    /// Whole-document replace; only used to implement undo/redo.
    #[serde(rename = "board:snapshot")]
    SnapshotBoard { room_id: String, strokes: Vec<Shape> },
    #[serde(rename = "cursor:move")]
    MoveCursor { room_id: String, x: f64, y: f64 },
}

impl ClientEvent {
    /// Decode and validate one text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let event: ClientEvent = serde_json::from_str(text)?;
        event.validate()?;
        Ok(event)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The room this event targets.
    pub fn room_id(&self) -> &str {
        match self {
            ClientEvent::JoinRoom(join) => &join.room_id,
            ClientEvent::CreateShape { room_id, .. }
            | ClientEvent::UpdateShape { room_id, .. }
            | ClientEvent::DeleteShape { room_id, .. }
            | ClientEvent::ClearBoard { room_id }
            | ClientEvent::SnapshotBoard { room_id, .. }
            | ClientEvent::MoveCursor { room_id, .. } => room_id,
        }
    }

    /// Wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom(_) => "join_room",
            ClientEvent::CreateShape { .. } => "stroke:created",
            ClientEvent::UpdateShape { .. } => "shape:update",
            ClientEvent::DeleteShape { .. } => "shape:delete",
            ClientEvent::ClearBoard { .. } => "board:clear",
            ClientEvent::SnapshotBoard { .. } => "board:snapshot",
            ClientEvent::MoveCursor { .. } => "cursor:move",
        }
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.room_id().is_empty() {
            return Err(ProtocolError::EmptyRoomId);
        }
        match self {
            ClientEvent::CreateShape { stroke: shape, .. }
            | ClientEvent::UpdateShape { shape, .. } => shape.validate()?,
            ClientEvent::DeleteShape { shape_id, .. } if shape_id.is_empty() => {
                return Err(ProtocolError::EmptyShapeId);
            }
            ClientEvent::SnapshotBoard { strokes, .. } => {
                for shape in strokes {
                    shape.validate()?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// One member of a room roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub connection_id: ConnectionId,
    pub nickname: String,
    pub color: String,
}

/// A peer's cursor, merged with its display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdate {
    pub connection_id: ConnectionId,
    pub x: f64,
    pub y: f64,
    pub nickname: String,
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeft {
    pub connection_id: ConnectionId,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "stroke:created")]
    ShapeCreated(Shape),
    #[serde(rename = "shape:update")]
    ShapeUpdated(Shape),
    #[serde(rename = "shape:delete")]
    ShapeDeleted(String),
    #[serde(rename = "board:clear")]
    BoardCleared,
    /// Full document. Sent to a joining client as its initial state and
    /// relayed to peers on undo/redo.
    #[serde(rename = "board:snapshot")]
    BoardSnapshot(Vec<Shape>),
    #[serde(rename = "room:users")]
    RoomUsers(Vec<RosterEntry>),
    #[serde(rename = "cursor:move")]
    CursorMoved(CursorUpdate),
    #[serde(rename = "user:left")]
    UserLeft(UserLeft),
}

impl ServerEvent {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ShapeCreated(_) => "stroke:created",
            ServerEvent::ShapeUpdated(_) => "shape:update",
            ServerEvent::ShapeDeleted(_) => "shape:delete",
            ServerEvent::BoardCleared => "board:clear",
            ServerEvent::BoardSnapshot(_) => "board:snapshot",
            ServerEvent::RoomUsers(_) => "room:users",
            ServerEvent::CursorMoved(_) => "cursor:move",
            ServerEvent::UserLeft(_) => "user:left",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeKind;
    use serde_json::{json, Value};

    #[test]
    fn test_join_room_object_form() {
        let event = ClientEvent::decode(
            r#"{"event":"join_room","data":{"roomId":"r1","nickname":"ann"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom(JoinRoom::new("r1", Some("ann".into())))
        );
        assert_eq!(event.room_id(), "r1");
    }

    #[test]
    fn test_join_room_bare_string() {
        let event = ClientEvent::decode(r#"{"event":"join_room","data":"default-room"}"#).unwrap();
        assert_eq!(event, ClientEvent::JoinRoom(JoinRoom::new("default-room", None)));
    }

    #[test]
    fn test_stroke_created() {
        let text = json!({
            "event": "stroke:created",
            "data": {
                "roomId": "r1",
                "stroke": { "id": "s1", "tool": "rect", "x": 10, "y": 10, "width": 0, "height": 0 }
            }
        })
        .to_string();

        match ClientEvent::decode(&text).unwrap() {
            ClientEvent::CreateShape { room_id, stroke } => {
                assert_eq!(room_id, "r1");
                assert_eq!(stroke.id, "s1");
                assert_eq!(stroke.kind, ShapeKind::Rect { width: 0.0, height: 0.0 });
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_delete_and_cursor_payloads() {
        let delete = ClientEvent::decode(
            r#"{"event":"shape:delete","data":{"roomId":"r1","shapeId":"s9"}}"#,
        )
        .unwrap();
        assert_eq!(
            delete,
            ClientEvent::DeleteShape { room_id: "r1".into(), shape_id: "s9".into() }
        );

        let cursor = ClientEvent::decode(
            r#"{"event":"cursor:move","data":{"roomId":"r1","x":4.5,"y":-2}}"#,
        )
        .unwrap();
        assert_eq!(
            cursor,
            ClientEvent::MoveCursor { room_id: "r1".into(), x: 4.5, y: -2.0 }
        );
    }

    #[test]
    fn test_unknown_event_rejected() {
        let result = ClientEvent::decode(r#"{"event":"board:explode","data":{"roomId":"r1"}}"#);
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let result = ClientEvent::decode(
            r#"{"event":"stroke:created","data":{"roomId":"r1","stroke":{"id":"s","tool":"blob"}}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_errors() {
        let empty_room = ClientEvent::decode(r#"{"event":"board:clear","data":{"roomId":""}}"#);
        assert!(matches!(empty_room, Err(ProtocolError::EmptyRoomId)));

        let empty_shape = ClientEvent::decode(
            r#"{"event":"shape:delete","data":{"roomId":"r","shapeId":""}}"#,
        );
        assert!(matches!(empty_shape, Err(ProtocolError::EmptyShapeId)));

        let empty_id = ClientEvent::decode(
            r#"{"event":"board:snapshot","data":{"roomId":"r","strokes":[{"id":"","tool":"circle","radius":1}]}}"#,
        );
        assert!(matches!(empty_id, Err(ProtocolError::InvalidShape(_))));
    }

    #[test]
    fn test_board_clear_has_no_payload() {
        let text = ServerEvent::BoardCleared.encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({ "event": "board:clear" }));
        assert_eq!(ServerEvent::decode(&text).unwrap(), ServerEvent::BoardCleared);
    }

    #[test]
    fn test_server_event_shapes() {
        let id = Uuid::new_v4();

        let deleted: Value =
            serde_json::from_str(&ServerEvent::ShapeDeleted("s1".into()).encode().unwrap()).unwrap();
        assert_eq!(deleted, json!({ "event": "shape:delete", "data": "s1" }));

        let left: Value = serde_json::from_str(
            &ServerEvent::UserLeft(UserLeft { connection_id: id }).encode().unwrap(),
        )
        .unwrap();
        assert_eq!(left["data"]["connectionId"], id.to_string());

        let cursor = ServerEvent::CursorMoved(CursorUpdate {
            connection_id: id,
            x: 1.0,
            y: 2.0,
            nickname: "ann".into(),
            color: "#e11d48".into(),
        });
        let decoded = ServerEvent::decode(&cursor.encode().unwrap()).unwrap();
        assert_eq!(decoded, cursor);
        assert_eq!(decoded.name(), "cursor:move");
    }
}
