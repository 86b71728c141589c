//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON text frames.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::commands::{CommandError, ErrorKind};
use crate::game::events::GameEvent;
use crate::game::pickup::PickupId;
use crate::game::state::PlayerId;
use crate::game::teams::TeamId;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Enter the match, optionally asking for a team.
    Join {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        team: Option<TeamId>,
    },

    /// Report position and facing.
    Move { position: Vec2, direction: Vec2 },

    /// Take an enemy flag or return a dropped own flag.
    PickupFlag { flag_team: TeamId },

    /// Take the weapon at a spawn point.
    PickupWeapon { weapon_id: PickupId },

    /// Fire the held weapon.
    Shoot { direction: Vec2 },

    /// Activate the held boost.
    UseItem,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },

    /// Player is leaving the match.
    Leave,
}

impl ClientMessage {
    /// Name used in `ActionResult` replies.
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Move { .. } => "move",
            ClientMessage::PickupFlag { .. } => "pickupFlag",
            ClientMessage::PickupWeapon { .. } => "pickupWeapon",
            ClientMessage::Shoot { .. } => "shoot",
            ClientMessage::UseItem => "useItem",
            ClientMessage::Ping { .. } => "ping",
            ClientMessage::Leave => "leave",
        }
    }
}

/// `type` field of a raw frame, if it has one.
///
/// Used to tell a malformed `move` (dropped silently) from other
/// malformed frames (answered with an error).
pub fn message_type(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value.get("type")?.as_str().map(str::to_owned)
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent on connect.
    Welcome {
        player_id: PlayerId,
        server_version: String,
    },

    /// Game event notification.
    Event { tick: u64, event: GameEvent },

    /// Outcome of a command.
    ActionResult {
        action: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ServerError>,
    },

    /// Pong response. `server_time` is UTC milliseconds.
    Pong { timestamp: u64, server_time: i64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

impl ServerMessage {
    /// Successful command.
    pub fn ok(action: &str) -> Self {
        ServerMessage::ActionResult { action: action.to_string(), success: true, error: None }
    }

    /// Rejected command.
    pub fn rejected(action: &str, error: &CommandError) -> Self {
        ServerMessage::ActionResult {
            action: action.to_string(),
            success: false,
            error: Some(ServerError::from(error)),
        }
    }

    /// Pong stamped with the current wall clock.
    pub fn pong(timestamp: u64) -> Self {
        ServerMessage::Pong { timestamp, server_time: chrono::Utc::now().timestamp_millis() }
    }
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build from a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<&CommandError> for ServerError {
    fn from(error: &CommandError) -> Self {
        let code = match (error, error.kind()) {
            (CommandError::UnknownPlayer, _) => ErrorCode::NotInMatch,
            (_, ErrorKind::Validation) => ErrorCode::InvalidInput,
            (_, ErrorKind::Precondition) => ErrorCode::Precondition,
            (_, ErrorKind::Resource) => ErrorCode::Unavailable,
        };
        Self::new(code, error.to_string())
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or out-of-range input.
    InvalidInput,
    /// Wrong game state for the action.
    Precondition,
    /// Team slots or spawn points exhausted.
    Unavailable,
    /// Command before `join`.
    NotInMatch,
    /// Connection limit reached.
    ServerFull,
    /// The match session stopped underneath the connection.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::objective::ObjectiveError;

    #[test]
    fn test_parse_client_messages() {
        let join = ClientMessage::from_json(r#"{"type":"join","name":"ana"}"#).unwrap();
        assert_eq!(join, ClientMessage::Join { name: Some("ana".into()), team: None });

        let join = ClientMessage::from_json(r#"{"type":"join"}"#).unwrap();
        assert_eq!(join, ClientMessage::Join { name: None, team: None });

        let mv = ClientMessage::from_json(
            r#"{"type":"move","position":{"x":10,"y":20},"direction":{"x":1,"y":0}}"#,
        )
        .unwrap();
        assert_eq!(mv, ClientMessage::Move { position: Vec2::new(10.0, 20.0), direction: Vec2::RIGHT });

        let flag = ClientMessage::from_json(r#"{"type":"pickupFlag","flag_team":1}"#).unwrap();
        assert_eq!(flag, ClientMessage::PickupFlag { flag_team: TeamId::BLUE });

        let item = ClientMessage::from_json(r#"{"type":"useItem"}"#).unwrap();
        assert_eq!(item, ClientMessage::UseItem);
        assert_eq!(item.action(), "useItem");
    }

    #[test]
    fn test_malformed_move_is_recognisable() {
        let text = r#"{"type":"move","position":{"x":"left"}}"#;
        assert!(ClientMessage::from_json(text).is_err());
        assert_eq!(message_type(text).as_deref(), Some("move"));
        assert_eq!(message_type("not json"), None);
    }

    #[test]
    fn test_server_message_json_roundtrip() {
        let msg = ServerMessage::Event {
            tick: 42,
            event: GameEvent::FlagReturned { flag_team: TeamId::RED, by: None },
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"event""#));
        assert!(json.contains("flagReturned"));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_rejection_carries_reason_and_code() {
        let msg = ServerMessage::rejected("pickupFlag", &CommandError::Objective(ObjectiveError::TooFar));
        let ServerMessage::ActionResult { success, error: Some(error), .. } = msg else {
            panic!("expected action result");
        };
        assert!(!success);
        assert_eq!(error.code, ErrorCode::Precondition);
        assert_eq!(error.message, "too far away");
    }

    #[test]
    fn test_unknown_player_maps_to_not_in_match() {
        let error = ServerError::from(&CommandError::UnknownPlayer);
        assert_eq!(error.code, ErrorCode::NotInMatch);
        assert_eq!(serde_json::to_value(error.code).unwrap(), "not_in_match");
    }

    #[test]
    fn test_ok_omits_error() {
        let json = ServerMessage::ok("shoot").to_json().unwrap();
        assert!(!json.contains("error"));
        assert!(json.contains(r#""success":true"#));
    }

    #[test]
    fn test_pong_has_wall_clock() {
        let ServerMessage::Pong { timestamp, server_time } = ServerMessage::pong(7) else {
            panic!("expected pong");
        };
        assert_eq!(timestamp, 7);
        assert!(server_time > 0);
    }
}
