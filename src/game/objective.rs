//! Capture Objective State Machine
//!
//! One flag per team. A flag is `AtBase`, `Carried` by exactly one enemy
//! player, or `Dropped` somewhere in the world. Scoring requires the
//! capturer's own flag to be home.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::core::vec2::Vec2;
use crate::game::state::PlayerId;
use crate::game::teams::{TeamId, TeamRoster};

/// Where a flag is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagStatus {
    /// Sitting on its base
    AtBase,
    /// Held by an enemy player
    Carried,
    /// Lying in the world
    Dropped,
}

/// A team's flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    /// Owning team
    pub team: TeamId,
    /// Current status
    pub status: FlagStatus,
    /// Current position
    pub position: Vec2,
    /// Home position
    pub base_position: Vec2,
    /// Carrier (only when `Carried`)
    pub carrier: Option<PlayerId>,
    /// Drop time (only when `Dropped`)
    pub dropped_at: Option<u64>,
}

impl Flag {
    fn new(team: TeamId, base_position: Vec2) -> Self {
        Self {
            team,
            status: FlagStatus::AtBase,
            position: base_position,
            base_position,
            carrier: None,
            dropped_at: None,
        }
    }

    fn send_home(&mut self) {
        self.status = FlagStatus::AtBase;
        self.position = self.base_position;
        self.carrier = None;
        self.dropped_at = None;
    }
}

/// Result of a successful `attempt_pickup`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagPickup {
    /// Enemy flag is now carried.
    Taken(TeamId),
    /// Own dropped flag sent back to base.
    Returned(TeamId),
}

/// Result of a successful `attempt_capture`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Scoring team
    pub team: TeamId,
    /// Flag that was captured (now back at its base)
    pub captured_flag: TeamId,
    /// Team score after the capture
    pub score: u32,
    /// Score reached the capture limit
    pub won: bool,
}

/// Objective errors. Messages are shown to players.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectiveError {
    /// No flag for that team.
    #[error("no flag for team {0}")]
    UnknownFlag(TeamId),

    /// Out of range.
    #[error("too far away")]
    TooFar,

    /// Already holding a flag.
    #[error("already carrying a flag")]
    AlreadyCarrying,

    /// Flag is not in a state that allows this.
    #[error("flag cannot be picked up right now")]
    WrongState,

    /// Capture needs the team's own flag at home.
    #[error("your flag must be at base to capture")]
    OwnFlagNotAtBase,

    /// Capture without a flag.
    #[error("not carrying a flag")]
    NotCarrying,
}

/// Tunables for the objective.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectiveRules {
    /// Flag pickup range
    pub pickup_range: f32,
    /// Distance from own base that counts as a capture
    pub capture_range: f32,
    /// Dropped flags return home after this long (ms)
    pub auto_return_ms: u64,
    /// Minimum drop offset
    pub drop_offset_min: f32,
    /// Maximum drop offset
    pub drop_offset_max: f32,
}

impl Default for ObjectiveRules {
    fn default() -> Self {
        Self {
            pickup_range: 32.0,
            capture_range: 48.0,
            auto_return_ms: 300_000,
            drop_offset_min: 40.0,
            drop_offset_max: 60.0,
        }
    }
}

/// Capture-the-flag state machine.
#[derive(Clone, Debug)]
pub struct CaptureObjective {
    rules: ObjectiveRules,
    world_max: Vec2,
    flags: BTreeMap<TeamId, Flag>,
}

impl CaptureObjective {
    /// Create an objective for a world spanning `[0, world_max]`.
    pub fn new(rules: ObjectiveRules, world_max: Vec2) -> Self {
        Self { rules, world_max, flags: BTreeMap::new() }
    }

    /// Place a team's flag at its base.
    pub fn add_flag(&mut self, team: TeamId, base_position: Vec2) {
        self.flags.insert(team, Flag::new(team, base_position));
    }

    /// Look up a flag.
    pub fn flag(&self, team: TeamId) -> Option<&Flag> {
        self.flags.get(&team)
    }

    /// All flags, in team order.
    pub fn flags(&self) -> impl Iterator<Item = &Flag> {
        self.flags.values()
    }

    /// Flag carried by `player`, if any.
    pub fn carried_by(&self, player: &PlayerId) -> Option<TeamId> {
        self.flags
            .values()
            .find(|f| f.carrier.as_ref() == Some(player))
            .map(|f| f.team)
    }

    /// Try to pick up `flag_team`'s flag.
    ///
    /// Touching your own dropped flag returns it. An enemy flag can be
    /// taken from its base or from the ground.
    pub fn attempt_pickup(
        &mut self,
        player: PlayerId,
        player_team: TeamId,
        position: Vec2,
        flag_team: TeamId,
    ) -> Result<FlagPickup, ObjectiveError> {
        let range = self.rules.pickup_range;
        let already_carrying = self.carried_by(&player).is_some();
        let flag = self
            .flags
            .get_mut(&flag_team)
            .ok_or(ObjectiveError::UnknownFlag(flag_team))?;

        if flag_team == player_team {
            if flag.status != FlagStatus::Dropped {
                return Err(ObjectiveError::WrongState);
            }
            if !position.within(flag.position, range) {
                return Err(ObjectiveError::TooFar);
            }
            flag.send_home();
            return Ok(FlagPickup::Returned(flag_team));
        }

        if already_carrying {
            return Err(ObjectiveError::AlreadyCarrying);
        }
        if flag.status == FlagStatus::Carried {
            return Err(ObjectiveError::WrongState);
        }
        if !position.within(flag.position, range) {
            return Err(ObjectiveError::TooFar);
        }

        flag.status = FlagStatus::Carried;
        flag.carrier = Some(player);
        flag.position = position;
        flag.dropped_at = None;
        Ok(FlagPickup::Taken(flag_team))
    }

    /// Drop whatever `player` carries near `position`.
    ///
    /// The flag lands 40-60 units away at a random angle, clamped to the
    /// world. Walls are not checked. Returns the dropped flag's team.
    pub fn drop_flag(
        &mut self,
        player: &PlayerId,
        position: Vec2,
        rng: &mut DeterministicRng,
        now: u64,
    ) -> Option<TeamId> {
        let team = self.carried_by(player)?;
        let offset = rng.random_offset(self.rules.drop_offset_min, self.rules.drop_offset_max);
        let landing = (position + offset).clamp(Vec2::ZERO, self.world_max);

        let flag = self.flags.get_mut(&team)?;
        flag.status = FlagStatus::Dropped;
        flag.position = landing;
        flag.carrier = None;
        flag.dropped_at = Some(now);
        Some(team)
    }

    /// Try to score: carrying an enemy flag, near own base, own flag home.
    pub fn attempt_capture(
        &mut self,
        player: &PlayerId,
        team: TeamId,
        position: Vec2,
        base_position: Vec2,
        capture_limit: u32,
        roster: &mut TeamRoster,
    ) -> Result<CaptureOutcome, ObjectiveError> {
        let captured_flag = self.carried_by(player).ok_or(ObjectiveError::NotCarrying)?;

        if !position.within(base_position, self.rules.capture_range) {
            return Err(ObjectiveError::TooFar);
        }

        let own = self.flags.get(&team).ok_or(ObjectiveError::UnknownFlag(team))?;
        if own.status != FlagStatus::AtBase {
            return Err(ObjectiveError::OwnFlagNotAtBase);
        }

        let score = roster
            .add_score(team, 1)
            .ok_or(ObjectiveError::UnknownFlag(team))?;
        if let Some(flag) = self.flags.get_mut(&captured_flag) {
            flag.send_home();
        }

        Ok(CaptureOutcome {
            team,
            captured_flag,
            score,
            won: score >= capture_limit,
        })
    }

    /// Keep a carried flag on its carrier.
    pub fn move_carried(&mut self, player: &PlayerId, position: Vec2) {
        if let Some(flag) = self.flags.values_mut().find(|f| f.carrier.as_ref() == Some(player)) {
            flag.position = position;
        }
    }

    /// Send one flag home regardless of state.
    pub fn return_to_base(&mut self, team: TeamId) -> bool {
        match self.flags.get_mut(&team) {
            Some(flag) => {
                flag.send_home();
                true
            }
            None => false,
        }
    }

    /// Return dropped flags whose auto-return time has elapsed.
    pub fn update(&mut self, now: u64) -> Vec<TeamId> {
        let auto_return_ms = self.rules.auto_return_ms;
        let mut returned = Vec::new();

        for flag in self.flags.values_mut() {
            let Some(dropped_at) = flag.dropped_at else {
                continue;
            };
            if flag.status == FlagStatus::Dropped
                && now.saturating_sub(dropped_at) >= auto_return_ms
            {
                flag.send_home();
                returned.push(flag.team);
            }
        }
        returned
    }

    /// Every flag back to base.
    pub fn reset(&mut self) {
        for flag in self.flags.values_mut() {
            flag.send_home();
        }
    }
}
