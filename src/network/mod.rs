//! Network Layer
//!
//! WebSocket transport around the match session.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ServerError, ErrorCode};
pub use session::{MatchSession, SessionConfig, SessionHandle, SessionError};
pub use server::{GameServer, ServerConfig, GameServerError};
