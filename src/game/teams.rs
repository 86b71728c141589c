//! Team Roster
//!
//! Team creation, player assignment and friend/foe queries.
//! Scores live here too since a capture is a team event.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::state::PlayerId;

/// Team identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub u8);

impl TeamId {
    /// Red team
    pub const RED: TeamId = TeamId(0);
    /// Blue team
    pub const BLUE: TeamId = TeamId(1);
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TeamId::RED => write!(f, "red"),
            TeamId::BLUE => write!(f, "blue"),
            TeamId(n) => write!(f, "team-{}", n),
        }
    }
}

/// Parameters for `create_team`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamSpec {
    /// Team identifier
    pub id: TeamId,
    /// Display name
    pub name: String,
    /// Maximum members
    pub max_size: usize,
}

/// A team and its members.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Team {
    /// Team identifier
    pub id: TeamId,
    /// Display name
    pub name: String,
    /// Maximum members
    pub max_size: usize,
    /// Member ids (sorted)
    pub members: BTreeSet<PlayerId>,
    /// Capture count
    pub score: u32,
}

impl Team {
    /// Team has no free slot.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_size
    }

    /// Current member count.
    #[inline]
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// How a player should be placed on a team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "team", rename_all = "snake_case")]
pub enum AssignMode {
    /// Smallest non-full team; ties go to the lowest id.
    #[default]
    AutoBalance,
    /// Uniform over non-full teams.
    Random,
    /// Exactly this team, or an error.
    Manual(TeamId),
    /// This team if it has room, otherwise auto-balance.
    Preference(TeamId),
}

/// Team roster errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TeamError {
    /// Team does not exist.
    #[error("team {0} does not exist")]
    TeamNotFound(TeamId),

    /// Team exists but has no free slot.
    #[error("team {0} is full")]
    TeamFull(TeamId),

    /// Every team is full (or none exist).
    #[error("no team has a free slot")]
    NoTeamAvailable,

    /// Team id already registered.
    #[error("team {0} already exists")]
    DuplicateTeam(TeamId),

    /// Player already on a team.
    #[error("player is already on team {0}")]
    AlreadyAssigned(TeamId),
}

/// Team roster.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TeamRoster {
    teams: BTreeMap<TeamId, Team>,
    membership: BTreeMap<PlayerId, TeamId>,
}

impl TeamRoster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a team.
    pub fn create_team(&mut self, spec: TeamSpec) -> Result<(), TeamError> {
        if self.teams.contains_key(&spec.id) {
            return Err(TeamError::DuplicateTeam(spec.id));
        }
        self.teams.insert(spec.id, Team {
            id: spec.id,
            name: spec.name,
            max_size: spec.max_size,
            members: BTreeSet::new(),
            score: 0,
        });
        Ok(())
    }

    /// Place a player on a team according to `mode`.
    pub fn assign_player(
        &mut self,
        player: PlayerId,
        mode: AssignMode,
        rng: &mut DeterministicRng,
    ) -> Result<TeamId, TeamError> {
        if let Some(existing) = self.membership.get(&player) {
            return Err(TeamError::AlreadyAssigned(*existing));
        }

        let team_id = match mode {
            AssignMode::AutoBalance => self.smallest_open_team()?,
            AssignMode::Random => {
                let open: Vec<TeamId> = self.open_teams().collect();
                *rng.choose(&open).ok_or(TeamError::NoTeamAvailable)?
            }
            AssignMode::Manual(team_id) => {
                let team = self.teams.get(&team_id).ok_or(TeamError::TeamNotFound(team_id))?;
                if team.is_full() {
                    return Err(TeamError::TeamFull(team_id));
                }
                team_id
            }
            AssignMode::Preference(team_id) => match self.teams.get(&team_id) {
                Some(team) if !team.is_full() => team_id,
                _ => self.smallest_open_team()?,
            },
        };

        if let Some(team) = self.teams.get_mut(&team_id) {
            team.members.insert(player);
        }
        self.membership.insert(player, team_id);
        Ok(team_id)
    }

    /// Remove a player; returns the team they were on.
    pub fn remove_player(&mut self, player: &PlayerId) -> Option<TeamId> {
        let team_id = self.membership.remove(player)?;
        if let Some(team) = self.teams.get_mut(&team_id) {
            team.members.remove(player);
        }
        Some(team_id)
    }

    /// Team a player belongs to.
    #[inline]
    pub fn team_of(&self, player: &PlayerId) -> Option<TeamId> {
        self.membership.get(player).copied()
    }

    /// Same team. Unknown players are never friendly.
    pub fn is_friendly(&self, a: &PlayerId, b: &PlayerId) -> bool {
        match (self.team_of(a), self.team_of(b)) {
            (Some(ta), Some(tb)) => ta == tb,
            _ => false,
        }
    }

    /// Different teams. Unknown players are never enemies.
    pub fn is_enemy(&self, a: &PlayerId, b: &PlayerId) -> bool {
        match (self.team_of(a), self.team_of(b)) {
            (Some(ta), Some(tb)) => ta != tb,
            _ => false,
        }
    }

    /// Add to a team's score; returns the new score.
    ///
    /// Scores only move up here. `reset_scores` is the one way down.
    pub fn add_score(&mut self, team_id: TeamId, amount: u32) -> Option<u32> {
        let team = self.teams.get_mut(&team_id)?;
        team.score = team.score.saturating_add(amount);
        Some(team.score)
    }

    /// Current score of a team (0 for unknown teams).
    pub fn score(&self, team_id: TeamId) -> u32 {
        self.teams.get(&team_id).map(|t| t.score).unwrap_or(0)
    }

    /// Zero every score. Membership is untouched.
    pub fn reset_scores(&mut self) {
        for team in self.teams.values_mut() {
            team.score = 0;
        }
    }

    /// Look up a team.
    pub fn team(&self, team_id: TeamId) -> Option<&Team> {
        self.teams.get(&team_id)
    }

    /// All teams in id order.
    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    /// Number of assigned players.
    pub fn player_count(&self) -> usize {
        self.membership.len()
    }

    fn open_teams(&self) -> impl Iterator<Item = TeamId> + '_ {
        self.teams.values().filter(|t| !t.is_full()).map(|t| t.id)
    }

    fn smallest_open_team(&self) -> Result<TeamId, TeamError> {
        // min_by_key keeps the first minimum, i.e. the lowest id
        self.teams
            .values()
            .filter(|t| !t.is_full())
            .min_by_key(|t| t.size())
            .map(|t| t.id)
            .ok_or(TeamError::NoTeamAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn two_team_roster(max_size: usize) -> TeamRoster {
        let mut roster = TeamRoster::new();
        roster.create_team(TeamSpec { id: TeamId::RED, name: "Red".into(), max_size }).unwrap();
        roster.create_team(TeamSpec { id: TeamId::BLUE, name: "Blue".into(), max_size }).unwrap();
        roster
    }

    fn pid(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    #[test]
    fn test_create_duplicate_team() {
        let mut roster = two_team_roster(4);
        let err = roster
            .create_team(TeamSpec { id: TeamId::RED, name: "Again".into(), max_size: 4 })
            .unwrap_err();
        assert_eq!(err, TeamError::DuplicateTeam(TeamId::RED));
    }

    #[test]
    fn test_auto_balance_alternates() {
        let mut roster = two_team_roster(4);
        let mut rng = DeterministicRng::new(1);

        assert_eq!(roster.assign_player(pid(1), AssignMode::AutoBalance, &mut rng), Ok(TeamId::RED));
        assert_eq!(roster.assign_player(pid(2), AssignMode::AutoBalance, &mut rng), Ok(TeamId::BLUE));
        assert_eq!(roster.assign_player(pid(3), AssignMode::AutoBalance, &mut rng), Ok(TeamId::RED));
    }

    #[test]
    fn test_manual_assignment_errors() {
        let mut roster = two_team_roster(1);
        let mut rng = DeterministicRng::new(1);

        roster.assign_player(pid(1), AssignMode::Manual(TeamId::RED), &mut rng).unwrap();
        assert_eq!(
            roster.assign_player(pid(2), AssignMode::Manual(TeamId::RED), &mut rng),
            Err(TeamError::TeamFull(TeamId::RED))
        );
        assert_eq!(
            roster.assign_player(pid(2), AssignMode::Manual(TeamId(9)), &mut rng),
            Err(TeamError::TeamNotFound(TeamId(9)))
        );
    }

    #[test]
    fn test_preference_falls_back_to_balance() {
        let mut roster = two_team_roster(1);
        let mut rng = DeterministicRng::new(1);

        roster.assign_player(pid(1), AssignMode::Preference(TeamId::RED), &mut rng).unwrap();
        // Red is full, so the preference falls through to blue
        assert_eq!(
            roster.assign_player(pid(2), AssignMode::Preference(TeamId::RED), &mut rng),
            Ok(TeamId::BLUE)
        );
        // Nothing left at all
        assert_eq!(
            roster.assign_player(pid(3), AssignMode::Preference(TeamId::RED), &mut rng),
            Err(TeamError::NoTeamAvailable)
        );
    }

    #[test]
    fn test_random_assignment_only_open_teams() {
        let mut roster = two_team_roster(1);
        let mut rng = DeterministicRng::new(99);

        roster.assign_player(pid(1), AssignMode::Manual(TeamId::BLUE), &mut rng).unwrap();
        assert_eq!(roster.assign_player(pid(2), AssignMode::Random, &mut rng), Ok(TeamId::RED));
        assert_eq!(
            roster.assign_player(pid(3), AssignMode::Random, &mut rng),
            Err(TeamError::NoTeamAvailable)
        );
    }

    #[test]
    fn test_already_assigned() {
        let mut roster = two_team_roster(4);
        let mut rng = DeterministicRng::new(1);
        roster.assign_player(pid(1), AssignMode::AutoBalance, &mut rng).unwrap();
        assert_eq!(
            roster.assign_player(pid(1), AssignMode::AutoBalance, &mut rng),
            Err(TeamError::AlreadyAssigned(TeamId::RED))
        );
    }

    #[test]
    fn test_friend_foe_queries() {
        let mut roster = two_team_roster(4);
        let mut rng = DeterministicRng::new(1);
        roster.assign_player(pid(1), AssignMode::Manual(TeamId::RED), &mut rng).unwrap();
        roster.assign_player(pid(2), AssignMode::Manual(TeamId::RED), &mut rng).unwrap();
        roster.assign_player(pid(3), AssignMode::Manual(TeamId::BLUE), &mut rng).unwrap();

        assert!(roster.is_friendly(&pid(1), &pid(2)));
        assert!(!roster.is_enemy(&pid(1), &pid(2)));
        assert!(roster.is_enemy(&pid(1), &pid(3)));

        // Unknown players are neither
        assert!(!roster.is_friendly(&pid(1), &pid(42)));
        assert!(!roster.is_enemy(&pid(1), &pid(42)));
    }

    #[test]
    fn test_remove_player_frees_slot() {
        let mut roster = two_team_roster(1);
        let mut rng = DeterministicRng::new(1);
        roster.assign_player(pid(1), AssignMode::Manual(TeamId::RED), &mut rng).unwrap();

        assert_eq!(roster.remove_player(&pid(1)), Some(TeamId::RED));
        assert_eq!(roster.remove_player(&pid(1)), None);
        assert_eq!(roster.team_of(&pid(1)), None);
        assert!(roster.assign_player(pid(2), AssignMode::Manual(TeamId::RED), &mut rng).is_ok());
    }

    #[test]
    fn test_scores() {
        let mut roster = two_team_roster(4);
        assert_eq!(roster.add_score(TeamId::RED, 1), Some(1));
        assert_eq!(roster.add_score(TeamId::RED, 1), Some(2));
        assert_eq!(roster.add_score(TeamId(7), 1), None);
        assert_eq!(roster.score(TeamId::RED), 2);

        roster.reset_scores();
        assert_eq!(roster.score(TeamId::RED), 0);
    }

    proptest! {
        #[test]
        fn test_auto_balance_keeps_teams_within_one(count in 0usize..40) {
            let mut roster = two_team_roster(64);
            let mut rng = DeterministicRng::new(5);
            for n in 0..count {
                let mut bytes = [0u8; 16];
                bytes[..8].copy_from_slice(&(n as u64).to_le_bytes());
                roster.assign_player(PlayerId::new(bytes), AssignMode::AutoBalance, &mut rng).unwrap();
            }
            let red = roster.team(TeamId::RED).unwrap().size();
            let blue = roster.team(TeamId::BLUE).unwrap().size();
            prop_assert!(red.abs_diff(blue) <= 1);
            prop_assert_eq!(red + blue, count);
        }
    }
}
