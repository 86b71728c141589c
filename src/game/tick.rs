//! Authoritative Simulation Tick
//!
//! The fixed-rate loop. Every timer in the match advances here, in one
//! order, on the simulated clock.

use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::game::events::{DisconnectReason, GameEvent};
use crate::game::objective::ObjectiveRules;
use crate::game::projectile::{HitEffect, Hittable, ProjectileOutcome};
use crate::game::respawn::SelectionMode;
use crate::game::state::{sample_open_position, MatchPhase, MatchState, PlayerId};
use crate::game::teams::AssignMode;

/// Result of a tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickResult {
    /// Tick number just run
    pub tick: u64,
    /// Simulated clock after the tick
    pub now_ms: u64,
    /// Projectile hits resolved
    pub hits: usize,
    /// Players brought back this tick
    pub respawned: Vec<PlayerId>,
    /// Players evicted for inactivity
    pub evicted: Vec<PlayerId>,
    /// Finished match was reset this tick
    pub match_reset: bool,
}

/// Match rules. Every field has a default so an arena file can override
/// only what it needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Flag pickup range
    pub flag_pickup_range: f32,
    /// Capture range around own base
    pub capture_range: f32,
    /// Dropped flag auto-return (ms)
    pub flag_auto_return_ms: u64,
    /// Minimum flag drop offset
    pub drop_offset_min: f32,
    /// Maximum flag drop offset
    pub drop_offset_max: f32,
    /// Death to respawn (ms)
    pub respawn_delay_ms: u64,
    /// Captures needed to win
    pub capture_limit: u32,
    /// Ended to reset (ms)
    pub reset_cooldown_ms: u64,
    /// Silence before eviction (ms)
    pub inactivity_timeout_ms: u64,
    /// Players needed to start
    pub min_players: usize,
    /// Player body radius
    pub player_radius: f32,
    /// Weapon pickup range
    pub weapon_pickup_range: f32,
    /// Status tick period (ms)
    pub status_tick_ms: u64,
    /// Draws before giving up on a random spawn spot
    pub spawn_attempts: u32,
    /// Random spawn spots keep this far from bases
    pub spawn_clearance: f32,
    /// Longest display name
    pub max_name_len: usize,
    /// Team assignment for joins
    pub assign_mode: AssignMode,
    /// Spawn point selection
    pub respawn_selection: SelectionMode,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            flag_pickup_range: 32.0,
            capture_range: 48.0,
            flag_auto_return_ms: 300_000, // 5 minutes
            drop_offset_min: 40.0,
            drop_offset_max: 60.0,
            respawn_delay_ms: 5_000,
            capture_limit: 3,
            reset_cooldown_ms: 10_000,
            inactivity_timeout_ms: 60_000,
            min_players: 2,
            player_radius: 16.0,
            weapon_pickup_range: 32.0,
            status_tick_ms: 1_000,
            spawn_attempts: 20,
            spawn_clearance: 96.0,
            max_name_len: 24,
            assign_mode: AssignMode::AutoBalance,
            respawn_selection: SelectionMode::RoundRobin,
        }
    }
}

impl MatchConfig {
    /// Objective tunables.
    pub fn objective_rules(&self) -> ObjectiveRules {
        ObjectiveRules {
            pickup_range: self.flag_pickup_range,
            capture_range: self.capture_range,
            auto_return_ms: self.flag_auto_return_ms,
            drop_offset_min: self.drop_offset_min,
            drop_offset_max: self.drop_offset_max,
        }
    }
}

/// Run one simulation tick, advancing the clock by `dt_ms`.
///
/// Order:
/// 1. Projectiles against this tick's hittable players
/// 2. Due respawns
/// 3. Spawn point restock
/// 4. Flag auto-return
/// 5. Buff expiry
/// 6. Status tick
/// 7. Inactivity eviction
///
/// A finished match only waits out its reset cooldown.
pub fn tick(state: &mut MatchState, dt_ms: u64) -> TickResult {
    state.now_ms = state.now_ms.saturating_add(dt_ms);
    state.tick += 1;

    let now = state.now_ms;
    let mut result = TickResult { tick: state.tick, now_ms: now, ..Default::default() };

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(tick = state.tick, now, dt_ms, phase = %state.phase, "Tick");

    if state.phase == MatchPhase::Ended {
        let due = state
            .ended_at
            .is_some_and(|at| now.saturating_sub(at) >= state.config.reset_cooldown_ms);
        if due {
            state.reset_match();
            result.match_reset = true;
        }
        return result;
    }

    // 1. Projectiles
    update_projectiles(state, dt_ms, &mut result);

    // 2. Respawns
    for id in state.respawns.due(now) {
        state.respawn_player(&id);
        result.respawned.push(id);
    }
    state.respawns.take_events();

    // 3. Spawn points
    restock_pickups(state);

    // 4. Flag auto-return
    for flag_team in state.objective.update(now) {
        state.broadcast(GameEvent::FlagReturned { flag_team, by: None });
    }

    // 5. Buff expiry
    state.effects.update(now);
    state.process_effect_events();

    // 6. Status tick
    if now.saturating_sub(state.last_status_tick) >= state.config.status_tick_ms {
        state.last_status_tick = now;
        state.effects.status_tick(now);
        state.process_effect_events();
    }

    // 7. Inactivity
    evict_inactive(state, &mut result);

    result
}

/// Hittable snapshot: present, not stunned, not respawning, not immune.
fn hittables(state: &MatchState) -> Vec<Hittable> {
    state
        .players
        .values()
        .filter(|p| p.can_act() && !state.effects.is_immune(&p.id))
        .map(|p| Hittable {
            id: p.id,
            team: p.team,
            position: p.position,
            radius: state.config.player_radius,
        })
        .collect()
}

fn update_projectiles(state: &mut MatchState, dt_ms: u64, result: &mut TickResult) {
    if state.projectiles.is_empty() {
        return;
    }

    let targets = hittables(state);
    let outcomes = state.projectiles.update(dt_ms, state.now_ms, &targets, &state.map);

    for outcome in outcomes {
        match outcome {
            ProjectileOutcome::Hit { owner, target, effect, .. } => {
                result.hits += 1;
                match effect {
                    HitEffect::Kill => state.kill_player(&target, Some(owner)),
                    HitEffect::Stun { duration_ms } => state.stun_player(&target, owner, duration_ms),
                }
            }
            ProjectileOutcome::HitWall { projectile, position } => {
                state.broadcast(GameEvent::ProjectileHitWall { projectile, position });
            }
            ProjectileOutcome::Expired { projectile } => {
                state.broadcast(GameEvent::ProjectileExpired { projectile });
            }
        }
    }
    state.process_effect_events();
}

fn restock_pickups(state: &mut MatchState) {
    let now = state.now_ms;
    let restored = state.pickups.update(now, |pickup| {
        sample_open_position(&mut state.rng, &state.map, &state.bases, &state.config)
            .unwrap_or(pickup.spawn_position)
    });
    if !restored.is_empty() {
        state.process_pickup_events();
    }
}

fn evict_inactive(state: &mut MatchState, result: &mut TickResult) {
    let now = state.now_ms;
    let timeout = state.config.inactivity_timeout_ms;
    let idle: Vec<PlayerId> = state
        .players
        .values()
        .filter(|p| now.saturating_sub(p.last_activity) >= timeout)
        .map(|p| p.id)
        .collect();

    for id in idle {
        warn!(player = %id.short(), "Evicting inactive player");
        state.remove_player(&id, DisconnectReason::Inactive);
        result.evicted.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArenaConfig;
    use crate::core::vec2::Vec2;
    use crate::game::commands;
    use crate::game::items::{BoostKind, WeaponKind};
    use crate::game::objective::FlagStatus;
    use crate::game::teams::TeamId;

    const DT: u64 = 16;

    fn pid(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    fn playing() -> MatchState {
        let mut state = MatchState::new([0; 16], 12345, &ArenaConfig::default()).unwrap();
        commands::join(&mut state, pid(1), Some("red".into())).unwrap();
        commands::join(&mut state, pid(2), Some("blue".into())).unwrap();
        state.take_outbound();
        state
    }

    /// Run ticks until the clock reaches `until`, keeping everyone active.
    fn run_until(state: &mut MatchState, until: u64) -> Vec<TickResult> {
        let mut results = Vec::new();
        while state.now_ms < until {
            let ids: Vec<PlayerId> = state.players.keys().copied().collect();
            for id in ids {
                commands::touch(state, &id);
            }
            results.push(tick(state, DT.min(until - state.now_ms)));
        }
        results
    }

    fn names(state: &mut MatchState) -> Vec<&'static str> {
        state.take_outbound().iter().map(|m| m.event.name()).collect()
    }

    #[test]
    fn test_tick_advances_clock() {
        let mut state = playing();
        let result = tick(&mut state, DT);
        assert_eq!(result.tick, 1);
        assert_eq!(result.now_ms, DT);
        assert_eq!(state.now_ms, DT);
    }

    #[test]
    fn test_tick_determinism() {
        let mut a = playing();
        let mut b = playing();

        for state in [&mut a, &mut b] {
            state.get_player_mut(&pid(1)).unwrap().weapon = Some(WeaponKind::Scatter);
            state.get_player_mut(&pid(1)).unwrap().weapon_charges = 3;
            commands::shoot(state, &pid(1), Vec2::RIGHT).unwrap();
            run_until(state, 2_000);
        }

        assert_eq!(a.tick, b.tick);
        assert_eq!(a.compute_hash(), b.compute_hash());
        assert_eq!(a.take_outbound(), b.take_outbound());
    }

    #[test]
    fn test_flag_carrier_killed_drops_and_respawns() {
        let mut state = playing();
        let blue_base = state.base_of(TeamId::BLUE).unwrap();

        // A (red) takes blue's flag and stands still
        state.get_player_mut(&pid(1)).unwrap().position = blue_base;
        commands::pickup_flag(&mut state, &pid(1), TeamId::BLUE).unwrap();
        let death_spot = state.get_player(&pid(1)).unwrap().position;
        {
            let a = state.get_player_mut(&pid(1)).unwrap();
            a.held_boost = Some(BoostKind::Speed);
            a.weapon = Some(WeaponKind::Stunner);
            a.weapon_charges = 2;
        }

        // B (blue) shoots from 100 units away
        {
            let b = state.get_player_mut(&pid(2)).unwrap();
            b.position = death_spot - Vec2::new(100.0, 0.0);
            b.weapon = Some(WeaponKind::Blaster);
            b.weapon_charges = 6;
        }
        commands::shoot(&mut state, &pid(2), Vec2::RIGHT).unwrap();
        state.take_outbound();

        let results = run_until(&mut state, 500);
        assert_eq!(results.iter().map(|r| r.hits).sum::<usize>(), 1);

        let flag = state.objective.flag(TeamId::BLUE).unwrap();
        assert_eq!(flag.status, FlagStatus::Dropped);
        let d = flag.position.distance(death_spot);
        assert!((39.99..=60.01).contains(&d), "drop offset {}", d);

        let a = state.get_player(&pid(1)).unwrap();
        assert_eq!(a.carrying_flag, None);
        assert!(a.respawning);
        let due = a.respawn_at.unwrap();

        let events = names(&mut state);
        assert!(events.contains(&"flagDropped"));
        assert!(events.contains(&"playerKilled"));

        run_until(&mut state, due);
        let a = state.get_player(&pid(1)).unwrap();
        assert!(!a.respawning);
        assert_eq!(a.weapon, None);
        assert_eq!(a.held_boost, None);
        assert_eq!(a.active_boost, None);
        assert_eq!(state.effects.buffs_for(&pid(1)).count(), 0);

        let red_spawns = &state.respawns.group(TeamId::RED).unwrap().points;
        assert!(red_spawns.contains(&a.position));
        assert!(names(&mut state).contains(&"playerRespawned"));
    }

    #[test]
    fn test_stun_hit_drops_flag_and_recovers() {
        let mut state = playing();
        let blue_base = state.base_of(TeamId::BLUE).unwrap();
        state.get_player_mut(&pid(1)).unwrap().position = blue_base;
        commands::pickup_flag(&mut state, &pid(1), TeamId::BLUE).unwrap();

        {
            let b = state.get_player_mut(&pid(2)).unwrap();
            b.position = blue_base - Vec2::new(100.0, 0.0);
            b.weapon = Some(WeaponKind::Stunner);
            b.weapon_charges = 4;
        }
        commands::shoot(&mut state, &pid(2), Vec2::RIGHT).unwrap();
        run_until(&mut state, 500);

        let a = state.get_player(&pid(1)).unwrap();
        assert!(a.stunned);
        assert!(!a.respawning);
        assert_eq!(a.carrying_flag, None);
        assert_eq!(state.objective.flag(TeamId::BLUE).unwrap().status, FlagStatus::Dropped);

        run_until(&mut state, 3_000);
        assert!(!state.get_player(&pid(1)).unwrap().stunned);
        assert!(names(&mut state).contains(&"playerRecovered"));
    }

    #[test]
    fn test_shield_makes_player_unhittable() {
        let mut state = playing();
        let a_pos = Vec2::new(400.0, 150.0);
        state.get_player_mut(&pid(1)).unwrap().position = a_pos;
        state.get_player_mut(&pid(1)).unwrap().held_boost = Some(BoostKind::Shield);
        commands::use_item(&mut state, &pid(1)).unwrap();

        {
            let b = state.get_player_mut(&pid(2)).unwrap();
            b.position = a_pos - Vec2::new(100.0, 0.0);
            b.weapon = Some(WeaponKind::Blaster);
            b.weapon_charges = 6;
        }
        commands::shoot(&mut state, &pid(2), Vec2::RIGHT).unwrap();
        let results = run_until(&mut state, 500);

        assert_eq!(results.iter().map(|r| r.hits).sum::<usize>(), 0);
        assert!(!state.get_player(&pid(1)).unwrap().respawning);
    }

    #[test]
    fn test_boost_expires() {
        let mut state = playing();
        state.get_player_mut(&pid(1)).unwrap().held_boost = Some(BoostKind::Speed);
        commands::use_item(&mut state, &pid(1)).unwrap();
        state.take_outbound();
        assert_eq!(state.snapshot().speed_multipliers[&pid(1)], 1.5);
        assert_eq!(state.snapshot().speed_multipliers[&pid(2)], 1.0);

        run_until(&mut state, 8_000);
        let a = state.get_player(&pid(1)).unwrap();
        assert_eq!(a.active_boost, None);
        assert_eq!(a.boost_expires_at, None);
        assert!(names(&mut state).contains(&"boostExpired"));
        assert_eq!(state.snapshot().speed_multipliers[&pid(1)], 1.0);
    }

    #[test]
    fn test_dropped_flag_auto_returns() {
        let mut state = playing();
        let blue_base = state.base_of(TeamId::BLUE).unwrap();
        state.get_player_mut(&pid(1)).unwrap().position = blue_base;
        commands::pickup_flag(&mut state, &pid(1), TeamId::BLUE).unwrap();
        state.drop_carried_flag(&pid(1), Vec2::new(800.0, 250.0));
        state.take_outbound();

        run_until(&mut state, 299_984);
        assert_eq!(state.objective.flag(TeamId::BLUE).unwrap().status, FlagStatus::Dropped);

        run_until(&mut state, 300_000);
        let flag = state.objective.flag(TeamId::BLUE).unwrap();
        assert_eq!(flag.status, FlagStatus::AtBase);
        assert_eq!(flag.position, blue_base);
        assert!(state
            .take_outbound()
            .iter()
            .any(|m| m.event == GameEvent::FlagReturned { flag_team: TeamId::BLUE, by: None }));
    }

    #[test]
    fn test_weapon_spawn_respawns() {
        let mut state = playing();
        let (weapon_id, spot, respawn_ms) = state
            .pickups
            .iter()
            .find(|p| p.kind.weapon().is_some())
            .map(|p| (p.id, p.position, p.respawn_ms))
            .unwrap();
        state.get_player_mut(&pid(1)).unwrap().position = spot;
        commands::pickup_weapon(&mut state, &pid(1), weapon_id).unwrap();
        state.take_outbound();

        run_until(&mut state, respawn_ms);
        let pickup = state.pickups.get(weapon_id).unwrap();
        assert!(pickup.available);
        assert!(state.map.is_walkable(pickup.position, state.config.player_radius)
            || pickup.position == pickup.spawn_position);
        assert!(names(&mut state).contains(&"weaponRespawned"));
    }

    #[test]
    fn test_inactive_player_evicted() {
        let mut state = playing();
        state.take_outbound();

        // Nobody touches anything for a minute
        let mut evicted = Vec::new();
        while state.now_ms < 60_000 {
            evicted.extend(tick(&mut state, 1_000).evicted);
        }

        assert_eq!(evicted, vec![pid(1), pid(2)]);
        assert!(state.players.is_empty());
        assert_eq!(state.phase, MatchPhase::Waiting);

        let reasons: Vec<DisconnectReason> = state
            .take_outbound()
            .into_iter()
            .filter_map(|m| match m.event {
                GameEvent::PlayerDisconnected { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, vec![DisconnectReason::Inactive; 2]);
    }

    #[test]
    fn test_win_then_reset() {
        let mut state = playing();
        let red_base = state.base_of(TeamId::RED).unwrap();
        let blue_base = state.base_of(TeamId::BLUE).unwrap();
        state.roster.add_score(TeamId::RED, 2);
        state.get_player_mut(&pid(1)).unwrap().weapon = Some(WeaponKind::Blaster);

        state.get_player_mut(&pid(1)).unwrap().position = blue_base;
        commands::pickup_flag(&mut state, &pid(1), TeamId::BLUE).unwrap();
        commands::move_player(&mut state, &pid(1), red_base, Vec2::RIGHT).unwrap();
        assert_eq!(state.phase, MatchPhase::Ended);
        let ended_at = state.now_ms;

        let results = run_until(&mut state, ended_at + 9_984);
        assert!(results.iter().all(|r| !r.match_reset));
        assert_eq!(state.phase, MatchPhase::Ended);

        let results = run_until(&mut state, ended_at + 10_000);
        assert!(results.iter().any(|r| r.match_reset));
        assert_eq!(state.phase, MatchPhase::Playing);
        assert_eq!(state.roster.score(TeamId::RED), 0);
        assert_eq!(state.roster.score(TeamId::BLUE), 0);
        for flag in state.objective.flags() {
            assert_eq!(flag.status, FlagStatus::AtBase);
            assert_eq!(flag.position, flag.base_position);
        }
        assert_eq!(state.get_player(&pid(1)).unwrap().weapon, None);
        assert_eq!(state.roster.team_of(&pid(1)), Some(TeamId::RED));
        assert!(state.pickups.iter().all(|p| p.available));
        assert!(names(&mut state).contains(&"gameReset"));
    }

    #[test]
    fn test_zero_dt_tick_changes_nothing() {
        let mut state = playing();
        run_until(&mut state, 5_000);
        state.take_outbound();

        let flags: Vec<_> = state.objective.flags().cloned().collect();
        let pickups: Vec<_> = state.pickups.iter().cloned().collect();
        let buffs: Vec<_> = state.effects.iter().cloned().collect();

        let result = tick(&mut state, 0);
        assert!(result.respawned.is_empty());
        assert!(result.evicted.is_empty());
        assert_eq!(state.objective.flags().cloned().collect::<Vec<_>>(), flags);
        assert_eq!(state.pickups.iter().cloned().collect::<Vec<_>>(), pickups);
        assert_eq!(state.effects.iter().cloned().collect::<Vec<_>>(), buffs);
        assert!(state.take_outbound().is_empty());
    }

    #[test]
    fn test_match_config_partial_json() {
        let config: MatchConfig = serde_json::from_str(r#"{"capture_limit": 5}"#).unwrap();
        assert_eq!(config.capture_limit, 5);
        assert_eq!(config.respawn_delay_ms, 5_000);
        assert_eq!(config.assign_mode, AssignMode::AutoBalance);
    }
}
