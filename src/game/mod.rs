//! Game Logic Module
//!
//! All match simulation code. Deterministic for a given seed, command
//! stream and sequence of tick deltas.
//!
//! ## Module Structure
//!
//! - `map`: Arena geometry and walls
//! - `collision`: Circle/rectangle tests
//! - `items`: Weapon and boost catalogue
//! - `teams`: Team roster and assignment
//! - `respawn`: Death timers and spawn point selection
//! - `pickup`: Item spawn points
//! - `effects`: Buffs and debuffs
//! - `projectile`: Projectile flight and hits
//! - `objective`: Flag state machine
//! - `events`: Outbound notifications
//! - `state`: Match state, player state
//! - `snapshot`: Serializable match view
//! - `commands`: Player actions
//! - `tick`: Authoritative simulation loop

pub mod map;
pub mod collision;
pub mod items;
pub mod teams;
pub mod respawn;
pub mod pickup;
pub mod effects;
pub mod projectile;
pub mod objective;
pub mod events;
pub mod state;
pub mod snapshot;
pub mod commands;
pub mod tick;

// Re-export key types
pub use state::{MatchState, Player, PlayerId, MatchPhase};
pub use commands::{CommandError, ErrorKind};
pub use events::{GameEvent, OutboundMessage, Recipient};
pub use tick::{tick, MatchConfig, TickResult};
