//! # Flag Arena Server
//!
//! Authoritative capture-the-flag simulation for small team matches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FLAG ARENA SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── vec2.rs     - 2D vector                                 │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  config.rs       - Arena description (JSON)                  │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── state.rs    - Match and player state                    │
//! │  ├── commands.rs - Player actions                            │
//! │  ├── tick.rs     - Authoritative simulation loop             │
//! │  ├── objective.rs- Flag state machine                        │
//! │  ├── projectile.rs - Projectile flight and hits              │
//! │  ├── effects.rs  - Buffs and debuffs                         │
//! │  ├── teams.rs    - Team roster                               │
//! │  ├── respawn.rs  - Death timers and spawn points             │
//! │  └── pickup.rs   - Item spawn points                         │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  └── session.rs  - Match session actor                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! The `core/` and `game/` modules never read the wall clock:
//! - Time is a simulated millisecond clock advanced by `tick(state, dt_ms)`
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - All randomness from seeded Xorshift128+
//!
//! Given the same seed, command stream and tick deltas, two runs produce
//! the same events and the same state hash.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod config;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::vec2::Vec2;
pub use core::rng::DeterministicRng;
pub use config::{ArenaConfig, ConfigError};
pub use game::state::{MatchState, Player, PlayerId};
pub use game::tick::{tick, MatchConfig, TickResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
