//! Game State Definitions
//!
//! The canonical match state and the mutations shared by commands and
//! the tick loop. Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::config::{ArenaConfig, ConfigError};
use crate::core::hash::{compute_state_hash, StateHash, StateHasher};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::Vec2;
use crate::game::effects::{BuffCategory, BuffConfig, BuffEvent, BuffKind, Effect, StatusEffects};
use crate::game::events::{DisconnectReason, GameEvent, OutboundMessage, Recipient, TeamScore};
use crate::game::items::{BoostKind, WeaponKind};
use crate::game::map::ArenaMap;
use crate::game::objective::{CaptureObjective, FlagStatus};
use crate::game::pickup::{PickupConfig, PickupEvent, PickupRegistry};
use crate::game::projectile::ProjectileSimulator;
use crate::game::respawn::RespawnScheduler;
use crate::game::snapshot::MatchSnapshot;
use crate::game::teams::{TeamId, TeamRoster, TeamSpec};
use crate::game::tick::MatchConfig;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering. Serializes as a
/// UUID string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random (v4) id.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// First four bytes in hex, for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerId({})", self.short())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid_string())
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.to_uuid_string()
    }
}

impl TryFrom<String> for PlayerId {
    type Error = uuid::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        uuid::Uuid::parse_str(&s).map(|u| Self(*u.as_bytes()))
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// State of a single player in the match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Unique player ID
    pub id: PlayerId,

    /// Display name
    pub name: String,

    /// Team
    pub team: TeamId,

    /// Current position
    pub position: Vec2,

    /// Facing direction (unit vector)
    pub facing: Vec2,

    /// Under a stun debuff
    pub stunned: bool,

    /// Dead, waiting for the respawn timer
    pub respawning: bool,

    /// Enemy flag being carried
    pub carrying_flag: Option<TeamId>,

    /// Held weapon
    pub weapon: Option<WeaponKind>,

    /// Shots left in the held weapon
    pub weapon_charges: u32,

    /// Boost waiting for `use_item`
    pub held_boost: Option<BoostKind>,

    /// Boost currently running
    pub active_boost: Option<BoostKind>,

    /// When the active boost ends
    pub boost_expires_at: Option<u64>,

    /// When the player comes back (while respawning)
    pub respawn_at: Option<u64>,

    /// Last accepted command
    pub last_activity: u64,

    /// Join time
    pub joined_at: u64,

    /// Eliminations scored
    pub kills: u32,

    /// Times eliminated
    pub deaths: u32,

    /// Flags captured
    pub captures: u32,
}

impl Player {
    /// Create a new player at a spawn position.
    pub fn new(id: PlayerId, name: String, team: TeamId, position: Vec2, now: u64) -> Self {
        Self {
            id,
            name,
            team,
            position,
            facing: Vec2::RIGHT,
            stunned: false,
            respawning: false,
            carrying_flag: None,
            weapon: None,
            weapon_charges: 0,
            held_boost: None,
            active_boost: None,
            boost_expires_at: None,
            respawn_at: None,
            last_activity: now,
            joined_at: now,
            kills: 0,
            deaths: 0,
            captures: 0,
        }
    }

    /// Not stunned and not respawning.
    #[inline]
    pub fn can_act(&self) -> bool {
        !self.stunned && !self.respawning
    }

    /// Drop weapon, charges and boosts.
    pub fn clear_loadout(&mut self) {
        self.weapon = None;
        self.weapon_charges = 0;
        self.held_boost = None;
        self.active_boost = None;
        self.boost_expires_at = None;
    }

    /// Hash this player's state for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_uuid(&self.id.0);
        hasher.update_u8(self.team.0);
        hasher.update_vec2(self.position);
        hasher.update_vec2(self.facing);
        hasher.update_bool(self.stunned);
        hasher.update_bool(self.respawning);
        hasher.update_u8(self.carrying_flag.map_or(u8::MAX, |t| t.0));
        hasher.update_u8(self.weapon.map_or(u8::MAX, |w| w as u8));
        hasher.update_u32(self.weapon_charges);
        hasher.update_u8(self.held_boost.map_or(u8::MAX, |b| b as u8));
        hasher.update_u8(self.active_boost.map_or(u8::MAX, |b| b as u8));
        hasher.update_opt_u64(self.boost_expires_at);
        hasher.update_opt_u64(self.respawn_at);
        hasher.update_u32(self.kills);
        hasher.update_u32(self.deaths);
        hasher.update_u32(self.captures);
    }
}

// =============================================================================
// MATCH PHASE
// =============================================================================

/// Current phase of the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Waiting for players
    #[default]
    Waiting,
    /// Active gameplay
    Playing,
    /// A team won; reset pending
    Ended,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPhase::Waiting => write!(f, "waiting"),
            MatchPhase::Playing => write!(f, "playing"),
            MatchPhase::Ended => write!(f, "ended"),
        }
    }
}

/// Stun debuff for a hit of `duration_ms`.
pub fn stun_buff(duration_ms: u64) -> BuffConfig {
    BuffConfig {
        kind: BuffKind::Stun,
        category: BuffCategory::Debuff,
        duration_ms,
        stackable: false,
        max_stacks: 1,
        effect: Effect::Stun,
    }
}

/// Random walkable point away from every base.
///
/// Gives up after `config.spawn_attempts` draws.
pub fn sample_open_position(
    rng: &mut DeterministicRng,
    map: &ArenaMap,
    bases: &BTreeMap<TeamId, Vec2>,
    config: &MatchConfig,
) -> Option<Vec2> {
    let margin = Vec2::new(config.player_radius, config.player_radius);
    let max = map.max() - margin;

    for _ in 0..config.spawn_attempts {
        let candidate = rng.random_point(margin, max);
        let clear_of_bases = bases
            .values()
            .all(|base| candidate.distance(*base) >= config.spawn_clearance);
        if clear_of_bases && map.is_walkable(candidate, config.player_radius) {
            return Some(candidate);
        }
    }
    None
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Complete state of a match.
///
/// Uses BTreeMap for deterministic iteration order.
#[derive(Clone, Debug)]
pub struct MatchState {
    /// Match identifier
    pub match_id: [u8; 16],

    /// RNG seed (for verification)
    pub rng_seed: u64,

    /// Deterministic RNG state
    pub rng: DeterministicRng,

    /// Simulated clock (ms)
    pub now_ms: u64,

    /// Ticks run so far
    pub tick: u64,

    /// Current match phase
    pub phase: MatchPhase,

    /// When the match ended (while `Ended`)
    pub ended_at: Option<u64>,

    /// Winning team (while `Ended`)
    pub winner: Option<TeamId>,

    /// Match rules
    pub config: MatchConfig,

    /// Static geometry
    pub map: ArenaMap,

    /// Base position per team
    pub bases: BTreeMap<TeamId, Vec2>,

    /// All players (BTreeMap for deterministic iteration)
    pub players: BTreeMap<PlayerId, Player>,

    /// Teams and scores
    pub roster: TeamRoster,

    /// Death timers and spawn groups
    pub respawns: RespawnScheduler,

    /// Weapon and boost spawn points
    pub pickups: PickupRegistry,

    /// Live projectiles
    pub projectiles: ProjectileSimulator,

    /// Buffs and debuffs
    pub effects: StatusEffects,

    /// Flags
    pub objective: CaptureObjective,

    /// Last status-tick pulse
    pub last_status_tick: u64,

    /// Notifications produced since the last drain
    outbound: Vec<OutboundMessage>,
}

impl MatchState {
    /// Build a match from an arena description.
    pub fn new(match_id: [u8; 16], rng_seed: u64, arena: &ArenaConfig) -> Result<Self, ConfigError> {
        arena.validate()?;

        let config = arena.rules.clone();
        let map = arena.map();
        let mut roster = TeamRoster::new();
        let mut respawns = RespawnScheduler::new(config.respawn_delay_ms);
        let mut objective = CaptureObjective::new(config.objective_rules(), map.max());
        let mut bases = BTreeMap::new();

        for team in &arena.teams {
            roster
                .create_team(TeamSpec { id: team.id, name: team.name.clone(), max_size: team.max_size })
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            respawns.add_group(team.id, team.spawn_points.clone(), config.respawn_selection);
            objective.add_flag(team.id, team.base);
            bases.insert(team.id, team.base);
        }

        let mut pickups = PickupRegistry::new();
        for item in &arena.items {
            pickups.register(PickupConfig::clone(item));
        }

        Ok(Self {
            match_id,
            rng_seed,
            rng: DeterministicRng::new(rng_seed),
            now_ms: 0,
            tick: 0,
            phase: MatchPhase::Waiting,
            ended_at: None,
            winner: None,
            config,
            map,
            bases,
            players: BTreeMap::new(),
            roster,
            respawns,
            pickups,
            projectiles: ProjectileSimulator::new(),
            effects: StatusEffects::new(),
            objective,
            last_status_tick: 0,
            outbound: Vec::new(),
        })
    }

    /// Get a player by ID.
    pub fn get_player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Get a player mutably by ID.
    pub fn get_player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// Base position of a team.
    pub fn base_of(&self, team: TeamId) -> Option<Vec2> {
        self.bases.get(&team).copied()
    }

    // -------------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------------

    /// Queue an event for `recipient`.
    pub fn emit(&mut self, recipient: Recipient, event: GameEvent) {
        self.outbound.push(OutboundMessage { tick: self.tick, recipient, event });
    }

    /// Queue an event for everyone.
    pub fn broadcast(&mut self, event: GameEvent) {
        self.emit(Recipient::All, event);
    }

    /// Take queued notifications (consumes them).
    pub fn take_outbound(&mut self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.outbound)
    }

    /// Queued notifications, oldest first.
    pub fn outbound(&self) -> &[OutboundMessage] {
        &self.outbound
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Change phase and announce it. No-op if unchanged.
    pub fn set_phase(&mut self, phase: MatchPhase) {
        if self.phase == phase {
            return;
        }
        info!(from = %self.phase, to = %phase, players = self.players.len(), "Match phase changed");
        self.phase = phase;
        self.broadcast(GameEvent::GameStatusChanged { phase, player_count: self.players.len() });
    }

    /// Enter `Playing` from `Waiting` once enough players are present,
    /// or fall back to `Waiting` below the threshold.
    pub fn refresh_phase(&mut self) {
        let enough = self.players.len() >= self.config.min_players;
        match self.phase {
            MatchPhase::Waiting if enough => self.set_phase(MatchPhase::Playing),
            MatchPhase::Playing if !enough => {
                self.projectiles.clear();
                self.set_phase(MatchPhase::Waiting);
            }
            _ => {}
        }
    }

    /// Finish the match with `winner`.
    pub fn end_match(&mut self, winner: TeamId) {
        self.winner = Some(winner);
        self.ended_at = Some(self.now_ms);
        self.projectiles.clear();

        let scores = self
            .roster
            .teams()
            .map(|t| TeamScore { team: t.id, score: t.score })
            .collect();
        info!(%winner, "Match ended");
        self.broadcast(GameEvent::MatchEnded { winner, scores });
        self.set_phase(MatchPhase::Ended);
    }

    /// Full reset after a finished match. Team membership persists.
    pub fn reset_match(&mut self) {
        let now = self.now_ms;

        self.roster.reset_scores();
        self.objective.reset();
        self.projectiles.clear();
        self.effects.clear();
        self.effects.take_events();
        self.pickups.reset();
        self.pickups.take_events();
        self.respawns.clear_pending();
        self.respawns.take_events();
        self.winner = None;
        self.ended_at = None;
        self.last_status_tick = now;

        self.broadcast(GameEvent::GameReset);

        let ids: Vec<PlayerId> = self.players.keys().copied().collect();
        for id in ids {
            let Some(team) = self.players.get(&id).map(|p| p.team) else {
                continue;
            };
            let spawn = self.respawns.select_point(team, &mut self.rng).ok();
            let Some(player) = self.players.get_mut(&id) else {
                continue;
            };
            player.clear_loadout();
            player.stunned = false;
            player.respawning = false;
            player.respawn_at = None;
            player.carrying_flag = None;
            player.last_activity = now;
            if let Some(position) = spawn {
                player.position = position;
            }
            let position = player.position;
            self.broadcast(GameEvent::PlayerRespawned { player: id, position });
        }

        info!(players = self.players.len(), "Match reset");
        self.phase = MatchPhase::Waiting;
        if self.players.len() >= self.config.min_players {
            self.set_phase(MatchPhase::Playing);
        } else {
            self.broadcast(GameEvent::GameStatusChanged {
                phase: MatchPhase::Waiting,
                player_count: self.players.len(),
            });
        }
    }

    // -------------------------------------------------------------------------
    // Player mutations shared by commands and the tick loop
    // -------------------------------------------------------------------------

    /// Drop whatever `id` is carrying at `position`.
    pub fn drop_carried_flag(&mut self, id: &PlayerId, position: Vec2) -> Option<TeamId> {
        let flag_team = self.objective.drop_flag(id, position, &mut self.rng, self.now_ms)?;
        if let Some(player) = self.players.get_mut(id) {
            player.carrying_flag = None;
        }
        let landed = self
            .objective
            .flag(flag_team)
            .map_or(position, |f| f.position);
        debug!(player = %id.short(), %flag_team, "Flag dropped");
        self.broadcast(GameEvent::FlagDropped { player: *id, flag_team, position: landed });
        Some(flag_team)
    }

    /// Eliminate `victim`: drop its flag, strip its loadout and buffs,
    /// and schedule its respawn.
    pub fn kill_player(&mut self, victim: &PlayerId, killer: Option<PlayerId>) {
        let Some(position) = self
            .players
            .get(victim)
            .filter(|p| !p.respawning)
            .map(|p| p.position)
        else {
            return;
        };

        self.drop_carried_flag(victim, position);
        self.effects.clear_target(victim, false);
        self.effects.take_events();
        let respawn_at = self.respawns.mark_dead(*victim, self.now_ms);

        if let Some(player) = self.players.get_mut(victim) {
            player.clear_loadout();
            player.stunned = false;
            player.respawning = true;
            player.respawn_at = Some(respawn_at);
            player.deaths += 1;
        }
        if let Some(killer) = killer.and_then(|k| self.players.get_mut(&k)) {
            killer.kills += 1;
        }

        debug!(victim = %victim.short(), "Player killed");
        self.broadcast(GameEvent::PlayerKilled { player: *victim, by: killer, position, respawn_at });
    }

    /// Stun `target` for `duration_ms`. A stunned carrier drops the flag.
    pub fn stun_player(&mut self, target: &PlayerId, by: PlayerId, duration_ms: u64) {
        let Some(position) = self
            .players
            .get(target)
            .filter(|p| !p.respawning)
            .map(|p| p.position)
        else {
            return;
        };

        let until = match self.effects.apply(*target, &stun_buff(duration_ms), self.now_ms) {
            Ok(id) => self.effects.get(id).and_then(|b| b.expires_at),
            Err(e) => {
                debug!(player = %target.short(), error = %e, "Stun not applied");
                return;
            }
        };

        if let Some(player) = self.players.get_mut(target) {
            player.stunned = true;
        }
        self.drop_carried_flag(target, position);
        self.broadcast(GameEvent::PlayerStunned { player: *target, by, until });
    }

    /// Bring a dead player back at one of its team's spawn points.
    pub fn respawn_player(&mut self, id: &PlayerId) {
        let Some(team) = self.players.get(id).map(|p| p.team) else {
            self.respawns.cancel(id);
            return;
        };

        match self.respawns.respawn(*id, team, &mut self.rng) {
            Ok(position) => {
                if let Some(player) = self.players.get_mut(id) {
                    player.position = position;
                    player.respawning = false;
                    player.respawn_at = None;
                    player.stunned = false;
                    player.clear_loadout();
                }
                self.broadcast(GameEvent::PlayerRespawned { player: *id, position });
            }
            Err(e) => warn!(player = %id.short(), error = %e, "Respawn failed"),
        }
    }

    /// Remove a player from the match, announcing `reason`.
    pub fn remove_player(&mut self, id: &PlayerId, reason: DisconnectReason) -> Option<Player> {
        let position = self.players.get(id)?.position;

        self.drop_carried_flag(id, position);
        self.effects.clear_target(id, false);
        self.effects.take_events();
        self.respawns.cancel(id);
        self.roster.remove_player(id);
        let player = self.players.remove(id)?;

        info!(player = %id.short(), ?reason, remaining = self.players.len(), "Player left");
        self.broadcast(GameEvent::PlayerDisconnected { player: *id, reason });
        self.refresh_phase();
        Some(player)
    }

    /// Translate buff engine events into player state and notifications.
    pub fn process_effect_events(&mut self) {
        for event in self.effects.take_events() {
            match event {
                BuffEvent::Expired { target, kind, run_hook: true, .. } => {
                    self.on_buff_expired(target, kind);
                }
                BuffEvent::Ticked { target, effect: Effect::ChargeRegen { per_pulse }, stacks, .. } => {
                    if let Some(player) = self.players.get_mut(&target) {
                        if let Some(weapon) = player.weapon {
                            let cap = weapon.stats().charges;
                            let restored = player.weapon_charges.saturating_add(per_pulse * stacks);
                            player.weapon_charges = restored.min(cap);
                        }
                    }
                }
                _other => {
                    #[cfg(feature = "debug-tracing")]
                    tracing::trace!(event = ?_other, "Buff event");
                }
            }
        }
    }

    fn on_buff_expired(&mut self, target: PlayerId, kind: BuffKind) {
        let Some(player) = self.players.get_mut(&target) else {
            return;
        };

        if kind == BuffKind::Stun {
            player.stunned = false;
            self.broadcast(GameEvent::PlayerRecovered { player: target });
            return;
        }

        if let Some(boost) = BoostKind::from_buff(kind) {
            if player.active_boost == Some(boost) {
                player.active_boost = None;
                player.boost_expires_at = None;
                self.broadcast(GameEvent::BoostExpired { player: target, boost });
            }
        }
    }

    /// Announce spawn points that came back this tick.
    pub fn process_pickup_events(&mut self) {
        for event in self.pickups.take_events() {
            if let PickupEvent::Respawned { pickup, kind, position } = event {
                self.broadcast(GameEvent::WeaponRespawned { pickup, item: kind, position });
            }
        }
    }

    // -------------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------------

    /// Serializable view of the whole match.
    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot::capture(self)
    }

    /// Compute state hash for verification.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.tick, self.rng_seed, |hasher| {
            hasher.update_u64(self.now_ms);
            hasher.update_u8(self.phase as u8);

            let rng_state = self.rng.state();
            hasher.update_u64(rng_state[0]);
            hasher.update_u64(rng_state[1]);

            hasher.update_u32(self.players.len() as u32);
            for player in self.players.values() {
                player.hash_into(hasher);
            }

            for team in self.roster.teams() {
                hasher.update_u8(team.id.0);
                hasher.update_u32(team.score);
            }

            for flag in self.objective.flags() {
                hasher.update_u8(flag.team.0);
                hasher.update_u8(flag_status_code(flag.status));
                hasher.update_vec2(flag.position);
                hasher.update_opt_u64(flag.dropped_at);
            }

            for pickup in self.pickups.iter() {
                hasher.update_u32(pickup.id);
                hasher.update_vec2(pickup.position);
                hasher.update_bool(pickup.available);
                hasher.update_opt_u64(pickup.respawn_at);
            }

            for projectile in self.projectiles.iter() {
                hasher.update_u32(projectile.id);
                hasher.update_vec2(projectile.position);
                hasher.update_vec2(projectile.velocity);
            }

            for buff in self.effects.iter() {
                hasher.update_u32(buff.id);
                hasher.update_uuid(&buff.target.0);
                hasher.update_u32(buff.stacks);
                hasher.update_opt_u64(buff.expires_at);
            }
        })
    }
}

fn flag_status_code(status: FlagStatus) -> u8 {
    match status {
        FlagStatus::AtBase => 0,
        FlagStatus::Carried => 1,
        FlagStatus::Dropped => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::commands;

    fn pid(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    fn state() -> MatchState {
        MatchState::new([7; 16], 12345, &ArenaConfig::default()).unwrap()
    }

    #[test]
    fn test_player_id_uuid_round_trip() {
        let id = PlayerId::random();
        let parsed = PlayerId::from_uuid_str(&id.to_uuid_string()).unwrap();
        assert_eq!(id, parsed);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        assert_eq!(serde_json::from_str::<PlayerId>(&json).unwrap(), id);
        assert!(serde_json::from_str::<PlayerId>("\"nope\"").is_err());
    }

    #[test]
    fn test_player_id_short() {
        assert_eq!(pid(0xab).short(), "abababab");
    }

    #[test]
    fn test_new_state_from_default_arena() {
        let state = state();
        assert_eq!(state.phase, MatchPhase::Waiting);
        assert_eq!(state.objective.flags().count(), 2);
        assert_eq!(state.roster.teams().count(), 2);
        assert!(!state.pickups.is_empty());
        for flag in state.objective.flags() {
            assert_eq!(flag.status, FlagStatus::AtBase);
        }
    }

    #[test]
    fn test_sample_open_position_respects_clearance() {
        let mut state = state();
        for _ in 0..50 {
            if let Some(p) = sample_open_position(&mut state.rng, &state.map, &state.bases, &state.config) {
                assert!(state.map.is_walkable(p, state.config.player_radius));
                for base in state.bases.values() {
                    assert!(p.distance(*base) >= state.config.spawn_clearance);
                }
            }
        }
    }

    #[test]
    fn test_sample_open_position_gives_up() {
        let mut state = state();
        let config = MatchConfig { spawn_clearance: 1.0e6, ..state.config.clone() };
        assert_eq!(sample_open_position(&mut state.rng, &state.map, &state.bases, &config), None);
    }

    #[test]
    fn test_kill_clears_loadout_and_schedules_respawn() {
        let mut state = state();
        commands::join(&mut state, pid(1), Some("a".into())).unwrap();
        commands::join(&mut state, pid(2), Some("b".into())).unwrap();
        {
            let p = state.get_player_mut(&pid(1)).unwrap();
            p.weapon = Some(WeaponKind::Blaster);
            p.weapon_charges = 3;
            p.held_boost = Some(BoostKind::Shield);
        }
        state.effects.apply(pid(1), &BoostKind::Speed.buff(), 0).unwrap();
        state.take_outbound();

        state.kill_player(&pid(1), Some(pid(2)));

        let p = state.get_player(&pid(1)).unwrap();
        assert!(p.respawning);
        assert_eq!(p.weapon, None);
        assert_eq!(p.weapon_charges, 0);
        assert_eq!(p.held_boost, None);
        assert_eq!(p.respawn_at, Some(state.config.respawn_delay_ms));
        assert_eq!(p.deaths, 1);
        assert_eq!(state.get_player(&pid(2)).unwrap().kills, 1);
        assert_eq!(state.effects.buffs_for(&pid(1)).count(), 0);

        // Dead players cannot die twice
        state.kill_player(&pid(1), Some(pid(2)));
        assert_eq!(state.get_player(&pid(1)).unwrap().deaths, 1);
    }

    #[test]
    fn test_stun_and_recover() {
        let mut state = state();
        commands::join(&mut state, pid(1), None).unwrap();
        state.take_outbound();

        state.stun_player(&pid(1), pid(2), 2_000);
        assert!(state.get_player(&pid(1)).unwrap().stunned);
        assert!(state.effects.is_stunned(&pid(1)));

        state.now_ms = 2_000;
        state.effects.update(state.now_ms);
        state.process_effect_events();

        assert!(!state.get_player(&pid(1)).unwrap().stunned);
        let events: Vec<&str> = state.take_outbound().iter().map(|m| m.event.name()).collect();
        assert_eq!(events, vec!["playerStunned", "playerRecovered"]);
    }

    #[test]
    fn test_overcharge_restores_charges_up_to_cap() {
        let mut state = state();
        commands::join(&mut state, pid(1), None).unwrap();
        {
            let p = state.get_player_mut(&pid(1)).unwrap();
            p.weapon = Some(WeaponKind::Scatter);
            p.weapon_charges = 2;
        }
        state.effects.apply(pid(1), &BoostKind::Overcharge.buff(), 0).unwrap();

        state.effects.status_tick(1_000);
        state.process_effect_events();
        assert_eq!(state.get_player(&pid(1)).unwrap().weapon_charges, 3);

        state.effects.status_tick(2_000);
        state.process_effect_events();
        assert_eq!(state.get_player(&pid(1)).unwrap().weapon_charges, 3);
    }

    #[test]
    fn test_hash_changes_with_state() {
        let mut state = state();
        let before = state.compute_hash();
        assert_eq!(before, state.compute_hash());

        commands::join(&mut state, pid(1), None).unwrap();
        assert_ne!(before, state.compute_hash());
    }
}
