//! Player Commands
//!
//! Inbound actions resolved against the match state. Each handler runs to
//! completion, either mutating state and queueing notifications or
//! returning an error with no state change.

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::vec2::Vec2;
use crate::game::effects::BuffError;
use crate::game::events::{DisconnectReason, GameEvent, Recipient};
use crate::game::items::{BoostKind, WeaponKind};
use crate::game::objective::{FlagPickup, FlagStatus, ObjectiveError};
use crate::game::pickup::{PickupError, PickupId};
use crate::game::projectile::{HitFilter, ProjectileId, ProjectileSpec};
use crate::game::respawn::RespawnError;
use crate::game::state::{MatchPhase, MatchState, Player, PlayerId};
use crate::game::teams::{AssignMode, TeamError, TeamId};

/// Failure class of a rejected command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or out-of-range input
    Validation,
    /// Wrong game state for the action
    Precondition,
    /// Something ran out (team slots, spawn points)
    Resource,
}

/// Command errors. `Display` is the user-facing reason.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// Player is not in the match.
    #[error("unknown player")]
    UnknownPlayer,

    /// Player joined twice.
    #[error("already joined")]
    AlreadyJoined,

    /// Payload field out of range.
    #[error("invalid {0}")]
    InvalidInput(&'static str),

    /// Target position collides with the world.
    #[error("position is blocked")]
    Blocked,

    /// Action needs a match in progress.
    #[error("match is not in progress")]
    NotPlaying,

    /// Player is stunned.
    #[error("cannot act while stunned")]
    Stunned,

    /// Player is dead.
    #[error("cannot act while respawning")]
    Respawning,

    /// `shoot` without a weapon.
    #[error("no weapon equipped")]
    NoWeapon,

    /// `shoot` with an empty weapon.
    #[error("weapon is out of charges")]
    NoCharges,

    /// `use_item` without a held boost.
    #[error("no item to use")]
    NoItem,

    /// `pickup_weapon` on a boost spawn.
    #[error("item {0} is not a weapon")]
    NotAWeapon(PickupId),

    /// Team assignment failed.
    #[error(transparent)]
    Team(#[from] TeamError),

    /// No spawn point.
    #[error(transparent)]
    Respawn(#[from] RespawnError),

    /// Item pickup failed.
    #[error(transparent)]
    Pickup(#[from] PickupError),

    /// Flag interaction failed.
    #[error(transparent)]
    Objective(#[from] ObjectiveError),

    /// Buff could not be applied.
    #[error(transparent)]
    Buff(#[from] BuffError),
}

impl CommandError {
    /// Failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::UnknownPlayer
            | CommandError::AlreadyJoined
            | CommandError::InvalidInput(_)
            | CommandError::Blocked
            | CommandError::NotAWeapon(_) => ErrorKind::Validation,

            CommandError::NotPlaying
            | CommandError::Stunned
            | CommandError::Respawning
            | CommandError::NoWeapon
            | CommandError::NoCharges
            | CommandError::NoItem
            | CommandError::Buff(BuffError::MaxStacksReached { .. }) => ErrorKind::Precondition,

            CommandError::Team(TeamError::TeamFull(_) | TeamError::NoTeamAvailable)
            | CommandError::Respawn(_)
            | CommandError::Pickup(PickupError::Unavailable(_)) => ErrorKind::Resource,

            CommandError::Team(_)
            | CommandError::Pickup(PickupError::UnknownPickup(_))
            | CommandError::Objective(ObjectiveError::UnknownFlag(_))
            | CommandError::Buff(BuffError::UnknownBuff(_)) => ErrorKind::Validation,

            CommandError::Pickup(PickupError::TooFar(_)) | CommandError::Objective(_) => {
                ErrorKind::Precondition
            }
        }
    }
}

/// Join with the configured assignment mode.
pub fn join(
    state: &mut MatchState,
    id: PlayerId,
    name: Option<String>,
) -> Result<Player, CommandError> {
    let mode = state.config.assign_mode;
    join_with_mode(state, id, name, mode)
}

/// Join, placing the player with `mode`.
///
/// Sends the joiner a full snapshot, tells everyone else, and starts the
/// match once enough players are present.
pub fn join_with_mode(
    state: &mut MatchState,
    id: PlayerId,
    name: Option<String>,
    mode: AssignMode,
) -> Result<Player, CommandError> {
    if state.players.contains_key(&id) {
        return Err(CommandError::AlreadyJoined);
    }

    let name = display_name(name, &id, state.config.max_name_len);
    let team = state.roster.assign_player(id, mode, &mut state.rng)?;
    let position = match state.respawns.select_point(team, &mut state.rng) {
        Ok(position) => position,
        Err(e) => {
            state.roster.remove_player(&id);
            return Err(e.into());
        }
    };

    let player = Player::new(id, name.clone(), team, position, state.now_ms);
    state.players.insert(id, player.clone());

    info!(player = %id.short(), %name, %team, players = state.players.len(), "Player joined");

    state.emit(
        Recipient::AllExcept(id),
        GameEvent::PlayerJoined { player: id, name, team, position },
    );
    let snapshot = Box::new(state.snapshot());
    state.emit(Recipient::Player(id), GameEvent::StateSnapshot { snapshot });
    state.refresh_phase();

    Ok(player)
}

fn display_name(name: Option<String>, id: &PlayerId, max_len: usize) -> String {
    let trimmed = name.as_deref().map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return format!("Player-{}", id.short());
    }
    trimmed.chars().take(max_len).collect()
}

/// Leave the match. Any carried flag drops where the player stood.
pub fn leave(
    state: &mut MatchState,
    id: &PlayerId,
    reason: DisconnectReason,
) -> Result<(), CommandError> {
    state
        .remove_player(id, reason)
        .map(|_| ())
        .ok_or(CommandError::UnknownPlayer)
}

/// Move to `position`, facing `direction`.
///
/// Allowed while waiting so players can roam. During play a move can
/// capture, return a dropped own flag, or collect a boost.
pub fn move_player(
    state: &mut MatchState,
    id: &PlayerId,
    position: Vec2,
    direction: Vec2,
) -> Result<(), CommandError> {
    if state.phase == MatchPhase::Ended {
        return Err(CommandError::NotPlaying);
    }
    if !position.is_finite() {
        return Err(CommandError::InvalidInput("position"));
    }
    if !direction.is_finite() {
        return Err(CommandError::InvalidInput("direction"));
    }

    let player = state.players.get(id).ok_or(CommandError::UnknownPlayer)?;
    check_can_act(player)?;
    if state.map.blocks_circle(position, state.config.player_radius) {
        return Err(CommandError::Blocked);
    }

    let now = state.now_ms;
    let facing = direction.normalize();
    if let Some(player) = state.players.get_mut(id) {
        player.position = position;
        if facing != Vec2::ZERO {
            player.facing = facing;
        }
        player.last_activity = now;
    }
    state.objective.move_carried(id, position);
    state.broadcast(GameEvent::PlayerMoved { player: *id, position, direction });

    if state.phase == MatchPhase::Playing {
        return_own_flag_by_touch(state, id, position);
        try_capture(state, id, position);
        collect_boost(state, id, position);
    }
    Ok(())
}

fn return_own_flag_by_touch(state: &mut MatchState, id: &PlayerId, position: Vec2) {
    let Some(team) = state.players.get(id).map(|p| p.team) else {
        return;
    };
    let dropped = state
        .objective
        .flag(team)
        .is_some_and(|f| f.status == FlagStatus::Dropped);
    if !dropped {
        return;
    }

    if let Ok(FlagPickup::Returned(flag_team)) = state.objective.attempt_pickup(*id, team, position, team) {
        debug!(player = %id.short(), %flag_team, "Flag returned by touch");
        state.broadcast(GameEvent::FlagReturned { flag_team, by: Some(*id) });
    }
}

fn try_capture(state: &mut MatchState, id: &PlayerId, position: Vec2) {
    let Some(team) = state.players.get(id).filter(|p| p.carrying_flag.is_some()).map(|p| p.team) else {
        return;
    };
    let Some(base) = state.base_of(team) else {
        return;
    };

    let limit = state.config.capture_limit;
    match state.objective.attempt_capture(id, team, position, base, limit, &mut state.roster) {
        Ok(outcome) => {
            if let Some(player) = state.players.get_mut(id) {
                player.carrying_flag = None;
                player.captures += 1;
            }
            info!(player = %id.short(), %team, score = outcome.score, "Flag captured");
            state.broadcast(GameEvent::FlagCaptured {
                player: *id,
                team,
                flag_team: outcome.captured_flag,
                score: outcome.score,
            });
            if outcome.won {
                state.end_match(team);
            }
        }
        Err(ObjectiveError::TooFar) => {}
        Err(e) => debug!(player = %id.short(), reason = %e, "Capture blocked"),
    }
}

fn collect_boost(state: &mut MatchState, id: &PlayerId, position: Vec2) {
    if state.players.get(id).is_none_or(|p| p.held_boost.is_some()) {
        return;
    }

    let now = state.now_ms;
    let mut taken = false;
    let collected = state.pickups.check_pickups(position, *id, now, |pickup| {
        if taken || pickup.kind.boost().is_none() {
            return false;
        }
        taken = true;
        true
    });

    for pickup in collected {
        let Some(boost) = state.pickups.get(pickup).and_then(|p| p.kind.boost()) else {
            continue;
        };
        if let Some(player) = state.players.get_mut(id) {
            player.held_boost = Some(boost);
        }
        state.broadcast(GameEvent::BoostPickedUp { player: *id, pickup, boost });
    }
    state.process_pickup_events();
}

/// Take or return a flag.
pub fn pickup_flag(
    state: &mut MatchState,
    id: &PlayerId,
    flag_team: TeamId,
) -> Result<FlagPickup, CommandError> {
    let (team, position) = require_actor(state, id)?;

    let result = state.objective.attempt_pickup(*id, team, position, flag_team)?;
    touch(state, id);

    match result {
        FlagPickup::Taken(flag_team) => {
            if let Some(player) = state.players.get_mut(id) {
                player.carrying_flag = Some(flag_team);
            }
            info!(player = %id.short(), %flag_team, "Flag taken");
            state.broadcast(GameEvent::FlagPickedUp { player: *id, flag_team });
        }
        FlagPickup::Returned(flag_team) => {
            state.broadcast(GameEvent::FlagReturned { flag_team, by: Some(*id) });
        }
    }
    Ok(result)
}

/// Pick up the weapon at spawn point `weapon_id`, replacing any held one.
pub fn pickup_weapon(
    state: &mut MatchState,
    id: &PlayerId,
    weapon_id: PickupId,
) -> Result<WeaponKind, CommandError> {
    let (_, position) = require_actor(state, id)?;

    let weapon = state
        .pickups
        .get(weapon_id)
        .ok_or(PickupError::UnknownPickup(weapon_id))?
        .kind
        .weapon()
        .ok_or(CommandError::NotAWeapon(weapon_id))?;

    let range = state.config.weapon_pickup_range;
    state.pickups.try_collect(weapon_id, *id, position, range, state.now_ms)?;
    state.process_pickup_events();

    let charges = weapon.stats().charges;
    if let Some(player) = state.players.get_mut(id) {
        player.weapon = Some(weapon);
        player.weapon_charges = charges;
    }
    touch(state, id);

    debug!(player = %id.short(), %weapon, "Weapon picked up");
    state.broadcast(GameEvent::WeaponPickedUp { player: *id, pickup: weapon_id, weapon, charges });
    Ok(weapon)
}

/// Fire the held weapon along `direction`. Spends one charge.
pub fn shoot(
    state: &mut MatchState,
    id: &PlayerId,
    direction: Vec2,
) -> Result<Vec<ProjectileId>, CommandError> {
    if !direction.is_finite() || direction.normalize() == Vec2::ZERO {
        return Err(CommandError::InvalidInput("direction"));
    }
    let (team, position) = require_actor(state, id)?;

    let player = state.players.get(id).ok_or(CommandError::UnknownPlayer)?;
    let weapon = player.weapon.ok_or(CommandError::NoWeapon)?;
    if player.weapon_charges == 0 {
        return Err(CommandError::NoCharges);
    }

    let stats = weapon.stats();
    let spec = ProjectileSpec {
        owner: *id,
        team,
        position,
        direction,
        speed: stats.speed,
        radius: stats.radius,
        ttl_ms: stats.ttl_ms,
        filter: HitFilter::ExcludeTeam,
        effect: stats.effect,
    };
    let ids = state.projectiles.fire_spread(&spec, stats.projectiles, stats.spread, state.now_ms);

    let now = state.now_ms;
    if let Some(player) = state.players.get_mut(id) {
        player.weapon_charges = player.weapon_charges.saturating_sub(1);
        if player.weapon_charges == 0 {
            player.weapon = None;
        }
        player.facing = direction.normalize();
        player.last_activity = now;
    }

    for projectile in &ids {
        if let Some(p) = state.projectiles.get(*projectile) {
            let event = GameEvent::ProjectileFired {
                projectile: p.id,
                owner: p.owner,
                position: p.position,
                velocity: p.velocity,
            };
            state.broadcast(event);
        }
    }
    Ok(ids)
}

/// Activate the held boost. Replaces any boost already running.
pub fn use_item(state: &mut MatchState, id: &PlayerId) -> Result<BoostKind, CommandError> {
    require_actor(state, id)?;

    let player = state.players.get(id).ok_or(CommandError::UnknownPlayer)?;
    let boost = player.held_boost.ok_or(CommandError::NoItem)?;
    let previous = player.active_boost;

    if let Some(old) = previous {
        let running = state.effects.find(id, old.buff().kind).map(|b| b.id);
        if let Some(buff) = running {
            state.effects.remove(buff, false)?;
        }
        state.broadcast(GameEvent::BoostExpired { player: *id, boost: old });
    }

    let buff = state.effects.apply(*id, &boost.buff(), state.now_ms)?;
    let expires_at = state.effects.get(buff).and_then(|b| b.expires_at);
    state.process_effect_events();

    let now = state.now_ms;
    if let Some(player) = state.players.get_mut(id) {
        player.held_boost = None;
        player.active_boost = Some(boost);
        player.boost_expires_at = expires_at;
        player.last_activity = now;
    }

    debug!(player = %id.short(), %boost, "Boost activated");
    state.broadcast(GameEvent::BoostActivated { player: *id, boost, expires_at });
    Ok(boost)
}

/// Refresh the inactivity timer without doing anything else.
pub fn touch(state: &mut MatchState, id: &PlayerId) {
    let now = state.now_ms;
    if let Some(player) = state.players.get_mut(id) {
        player.last_activity = now;
    }
}

fn check_can_act(player: &Player) -> Result<(), CommandError> {
    if player.respawning {
        return Err(CommandError::Respawning);
    }
    if player.stunned {
        return Err(CommandError::Stunned);
    }
    Ok(())
}

/// Match in progress, player present and able to act.
fn require_actor(state: &MatchState, id: &PlayerId) -> Result<(TeamId, Vec2), CommandError> {
    let player = state.players.get(id).ok_or(CommandError::UnknownPlayer)?;
    if state.phase != MatchPhase::Playing {
        return Err(CommandError::NotPlaying);
    }
    check_can_act(player)?;
    Ok((player.team, player.position))
}
