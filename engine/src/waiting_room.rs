//! Waiting Room (§4.2): a team -> ordered queue of live connections, with
//! atomic allocation of the multiset a new game needs.
//!
//! The source protects a concurrent map of slices with a racy "replace the
//! slice in place" pattern; per §9's design note this keeps a single mutex
//! around a plain `HashMap<String, VecDeque<C>>` instead — simpler, and the
//! mutex already serializes every `take_*`/`add` against each other.

use std::collections::{HashMap, VecDeque};

use protocol::Role;
use rand::seq::SliceRandom;
use tokio::sync::Mutex;

use crate::error::WaitingRoomError;
use crate::match_optimizer::MatchWeight;

pub struct WaitingRoom<C> {
    connections: Mutex<HashMap<String, VecDeque<C>>>,
}

impl<C> Default for WaitingRoom<C> {
    fn default() -> Self {
        WaitingRoom {
            connections: Mutex::new(HashMap::new()),
        }
    }
}

impl<C> WaitingRoom<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append; never blocks on anything but the internal mutex.
    pub async fn add(&self, team: String, conn: C) {
        let mut guard = self.connections.lock().await;
        guard.entry(team).or_default().push_back(conn);
    }

    /// Every team currently holding at least one waiting connection.
    pub async fn teams_present(&self) -> Vec<String> {
        let guard = self.connections.lock().await;
        guard
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(team, _)| team.clone())
            .collect()
    }

    /// First team whose queue has >= `agent_count` connections yields its
    /// front `agent_count` connections, each paired with its team name.
    pub async fn take_self_match(&self, agent_count: usize) -> Result<Vec<(String, C)>, WaitingRoomError> {
        let mut guard = self.connections.lock().await;
        let team = guard
            .iter()
            .find(|(_, q)| q.len() >= agent_count)
            .map(|(team, _)| team.clone());
        let Some(team) = team else {
            return Err(WaitingRoomError::NotReady);
        };
        let queue = guard.get_mut(&team).expect("team just found above");
        let taken = (0..agent_count)
            .map(|_| (team.clone(), queue.pop_front().expect("checked length above")))
            .collect();
        Ok(taken)
    }

    /// Collect all non-empty teams; if at least `agent_count` exist, shuffle
    /// and take one connection from each of the first `agent_count`.
    pub async fn take_cross_team(&self, agent_count: usize) -> Result<Vec<(String, C)>, WaitingRoomError> {
        let mut guard = self.connections.lock().await;
        let mut candidate_teams: Vec<String> = guard
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(team, _)| team.clone())
            .collect();
        if candidate_teams.len() < agent_count {
            return Err(WaitingRoomError::NotReady);
        }
        candidate_teams.shuffle(&mut rand::rng());
        let mut taken = Vec::with_capacity(agent_count);
        for team in candidate_teams.into_iter().take(agent_count) {
            let queue = guard.get_mut(&team).expect("candidate teams are all present");
            let conn = queue.pop_front().expect("team was non-empty when selected");
            taken.push((team, conn));
        }
        Ok(taken)
    }

    /// Pick the first candidate match (already sorted by descending weight)
    /// whose every team index resolves to a non-empty queue, atomically
    /// removing one connection per team; return `role -> [connections]`.
    pub async fn take_from_schedule(
        &self,
        candidates: &[MatchWeight],
        idx_team_map: &HashMap<u32, String>,
    ) -> Result<HashMap<Role, Vec<(String, C)>>, WaitingRoomError> {
        let mut guard = self.connections.lock().await;
        for candidate in candidates {
            let mut team_names: HashMap<u32, &str> = HashMap::new();
            let mut fully_covered = true;
            'roles: for team_idxs in candidate.role_idxs.values() {
                for &team_idx in team_idxs {
                    let Some(team_name) = idx_team_map.get(&team_idx) else {
                        fully_covered = false;
                        break 'roles;
                    };
                    let has_conn = guard.get(team_name).is_some_and(|q| !q.is_empty());
                    if !has_conn {
                        fully_covered = false;
                        break 'roles;
                    }
                    team_names.insert(team_idx, team_name.as_str());
                }
            }
            if !fully_covered {
                continue;
            }

            let mut result: HashMap<Role, Vec<(String, C)>> = HashMap::new();
            for (role, team_idxs) in &candidate.role_idxs {
                let mut conns = Vec::with_capacity(team_idxs.len());
                for &team_idx in team_idxs {
                    let team_name = team_names[&team_idx].to_string();
                    let queue = guard.get_mut(&team_name).expect("verified non-empty above");
                    let conn = queue.pop_front().expect("verified non-empty above");
                    conns.push((team_name, conn));
                }
                result.insert(*role, conns);
            }
            return Ok(result);
        }
        Err(WaitingRoomError::NoEligibleMatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn self_match_advances_queue() {
        let room: WaitingRoom<u32> = WaitingRoom::new();
        room.add("TeamA".to_string(), 1).await;
        room.add("TeamA".to_string(), 2).await;
        room.add("TeamA".to_string(), 3).await;

        let taken = room.take_self_match(2).await.unwrap();
        assert_eq!(taken, vec![("TeamA".to_string(), 1), ("TeamA".to_string(), 2)]);

        let remaining = room.take_self_match(2).await;
        assert!(remaining.is_err());
    }

    #[tokio::test]
    async fn cross_team_requires_enough_distinct_teams() {
        let room: WaitingRoom<u32> = WaitingRoom::new();
        room.add("TeamA".to_string(), 1).await;
        room.add("TeamB".to_string(), 2).await;
        assert!(room.take_cross_team(3).await.is_err());

        room.add("TeamC".to_string(), 3).await;
        let taken = room.take_cross_team(3).await.unwrap();
        assert_eq!(taken.len(), 3);
    }
}
