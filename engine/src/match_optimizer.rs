//! Match Optimizer (§4.3): precomputes a balanced role-assignment schedule
//! across a fixed pool of teams, maintains `scheduled` vs `ended`, persists to
//! disk, supports re-weighting and optional infinite refill.
//!
//! `generate_candidate`'s combinatorial search has no surviving reference
//! implementation in the source this design was distilled from (the relevant
//! `CalcTheoretical`/`GenerateMatches` Go functions were not part of the
//! retained excerpt) — it is built directly from the prose in §4.3 and the
//! balance property in §8, not transcribed from anywhere.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use protocol::Role;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::MatchOptimizerError;

/// `role -> [team_idx, ...]` plus a dispatch weight. An entry with
/// `weight <= 0` is inactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchWeight {
    pub role_idxs: HashMap<Role, Vec<u32>>,
    pub weight: f64,
}

impl MatchWeight {
    /// Structural equality on `role_idxs`, ignoring `weight` and ignoring
    /// both map- and vec-iteration order (§9: `set_match_end` must not
    /// depend on map-iteration order of `role_idxs`).
    pub fn same_assignment(&self, other: &HashMap<Role, Vec<u32>>) -> bool {
        canonical(&self.role_idxs) == canonical(other)
    }
}

fn canonical(role_idxs: &HashMap<Role, Vec<u32>>) -> BTreeMap<Role, Vec<u32>> {
    role_idxs
        .iter()
        .map(|(role, idxs)| {
            let mut sorted = idxs.clone();
            sorted.sort_unstable();
            (*role, sorted)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedState {
    infinite_loop: bool,
    team_count: u32,
    game_count: u32,
    role_num_map: HashMap<String, u32>,
    idx_team_map: HashMap<String, String>,
    scheduled_matches: Vec<PersistedMatchWeight>,
    ended_matches: Vec<HashMap<String, Vec<u32>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedMatchWeight {
    role_idxs: HashMap<String, Vec<u32>>,
    weight: f64,
}

struct State {
    role_num_map: HashMap<Role, u32>,
    idx_team_map: HashMap<u32, String>,
    team_idx_map: HashMap<String, u32>,
    scheduled: Vec<MatchWeight>,
    ended: Vec<HashMap<Role, Vec<u32>>>,
}

pub struct MatchOptimizer {
    output_path: PathBuf,
    team_count: u32,
    game_count: u32,
    infinite_loop: bool,
    state: Mutex<State>,
}

impl MatchOptimizer {
    /// Reload persisted state from `output_path` if present and well-formed;
    /// otherwise initialize empty and generate an initial schedule.
    pub async fn new(
        output_path: PathBuf,
        team_count: u32,
        game_count: u32,
        role_num_map: HashMap<Role, u32>,
        infinite_loop: bool,
    ) -> Result<Self, MatchOptimizerError> {
        if let Ok(raw) = tokio::fs::read_to_string(&output_path).await
            && let Ok(persisted) = serde_json::from_str::<PersistedState>(&raw)
        {
            info!(path = %output_path.display(), "loaded persisted match optimizer state");
            return Ok(Self::from_persisted(output_path, persisted));
        }

        let optimizer = MatchOptimizer {
            output_path,
            team_count,
            game_count,
            infinite_loop,
            state: Mutex::new(State {
                role_num_map,
                idx_team_map: HashMap::new(),
                team_idx_map: HashMap::new(),
                scheduled: Vec::new(),
                ended: Vec::new(),
            }),
        };
        optimizer.append().await?;
        Ok(optimizer)
    }

    fn from_persisted(output_path: PathBuf, persisted: PersistedState) -> Self {
        let role_num_map = persisted
            .role_num_map
            .iter()
            .filter_map(|(name, count)| Role::from_name(name).map(|role| (role, *count)))
            .collect();
        let idx_team_map = persisted
            .idx_team_map
            .iter()
            .filter_map(|(idx, team)| idx.parse::<u32>().ok().map(|idx| (idx, team.clone())))
            .collect();
        let team_idx_map = persisted
            .idx_team_map
            .iter()
            .filter_map(|(idx, team)| idx.parse::<u32>().ok().map(|idx| (team.clone(), idx)))
            .collect();
        let scheduled = persisted
            .scheduled_matches
            .into_iter()
            .map(|m| MatchWeight {
                role_idxs: m
                    .role_idxs
                    .into_iter()
                    .filter_map(|(role, idxs)| Role::from_name(&role).map(|r| (r, idxs)))
                    .collect(),
                weight: m.weight,
            })
            .collect();
        let ended = persisted
            .ended_matches
            .into_iter()
            .map(|m| {
                m.into_iter()
                    .filter_map(|(role, idxs)| Role::from_name(&role).map(|r| (r, idxs)))
                    .collect()
            })
            .collect();

        MatchOptimizer {
            output_path,
            team_count: persisted.team_count,
            game_count: persisted.game_count,
            infinite_loop: persisted.infinite_loop,
            state: Mutex::new(State {
                role_num_map,
                idx_team_map,
                team_idx_map,
                scheduled,
                ended,
            }),
        }
    }

    /// If the team is already known, no-op; else assign the next free index.
    /// Refuses (logs and does nothing) once `team_count` indexes are in use.
    pub async fn update_team(&self, team: &str) {
        let mut state = self.state.lock().await;
        if state.team_idx_map.contains_key(team) {
            return;
        }
        let next_idx = state.team_idx_map.len() as u32;
        if next_idx >= self.team_count {
            warn!(team, "team pool is full, refusing to assign a new index");
            return;
        }
        state.team_idx_map.insert(team.to_string(), next_idx);
        state.idx_team_map.insert(next_idx, team.to_string());
    }

    /// Stable-sort scheduled by descending weight; resolve `idx -> team_name`.
    pub async fn get_matches(&self) -> Result<Vec<MatchWeight>, MatchOptimizerError> {
        {
            let state = self.state.lock().await;
            let any_active = state.scheduled.iter().any(|m| m.weight > 0.0);
            if !any_active && self.infinite_loop {
                drop(state);
                self.append().await?;
            }
        }
        let mut state = self.state.lock().await;
        state
            .scheduled
            .sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
        Ok(state.scheduled.clone())
    }

    /// Resolve a scheduled match's team indexes to team names.
    pub async fn resolve_team_names(&self, match_weight: &MatchWeight) -> HashMap<Role, Vec<String>> {
        let state = self.state.lock().await;
        match_weight
            .role_idxs
            .iter()
            .map(|(role, idxs)| {
                let names = idxs
                    .iter()
                    .filter_map(|idx| state.idx_team_map.get(idx).cloned())
                    .collect();
                (*role, names)
            })
            .collect()
    }

    /// A snapshot of `idx -> team_name`, for callers that need to resolve a
    /// candidate's team indexes against the waiting room themselves (e.g.
    /// [`crate::waiting_room::WaitingRoom::take_from_schedule`]).
    pub async fn idx_team_map(&self) -> HashMap<u32, String> {
        self.state.lock().await.idx_team_map.clone()
    }

    /// Generate the best candidate schedule and push it; persist.
    async fn append(&self) -> Result<(), MatchOptimizerError> {
        let (role_num_map, theoretical) = {
            let state = self.state.lock().await;
            let theoretical = theoretical_share(&state.role_num_map, self.game_count, self.team_count);
            (state.role_num_map.clone(), theoretical)
        };

        let attempts = (self.game_count as usize) * (self.team_count as usize) * 5;
        let best = generate_candidate(&role_num_map, self.team_count, self.game_count, &theoretical, attempts)
            .ok_or(MatchOptimizerError::ScheduleEmpty)?;

        let mut state = self.state.lock().await;
        state.scheduled.extend(best);
        drop(state);
        self.save().await
    }

    /// Locate the scheduled entry matching `assignment`, move it to `ended`.
    pub async fn set_match_end(&self, assignment: &HashMap<Role, Vec<u32>>) -> Result<(), MatchOptimizerError> {
        let mut state = self.state.lock().await;
        let position = state.scheduled.iter().position(|m| m.same_assignment(assignment));
        match position {
            Some(idx) => {
                let finished = state.scheduled.remove(idx);
                state.ended.push(finished.role_idxs);
            }
            None => warn!("set_match_end: no scheduled match matches the given assignment"),
        }
        drop(state);
        self.save().await
    }

    /// Locate the scheduled entry matching `assignment`, update its weight —
    /// used to zero out a match that aborted without a decisive winner.
    pub async fn set_match_weight(&self, assignment: &HashMap<Role, Vec<u32>>, weight: f64) -> Result<(), MatchOptimizerError> {
        let mut state = self.state.lock().await;
        match state.scheduled.iter_mut().find(|m| m.same_assignment(assignment)) {
            Some(found) => found.weight = weight,
            None => warn!("set_match_weight: no scheduled match matches the given assignment"),
        }
        drop(state);
        self.save().await
    }

    async fn save(&self) -> Result<(), MatchOptimizerError> {
        let state = self.state.lock().await;
        let persisted = PersistedState {
            infinite_loop: self.infinite_loop,
            team_count: self.team_count,
            game_count: self.game_count,
            role_num_map: state.role_num_map.iter().map(|(r, c)| (r.name().to_string(), *c)).collect(),
            idx_team_map: state.idx_team_map.iter().map(|(i, t)| (i.to_string(), t.clone())).collect(),
            scheduled_matches: state
                .scheduled
                .iter()
                .map(|m| PersistedMatchWeight {
                    role_idxs: m.role_idxs.iter().map(|(r, v)| (r.name().to_string(), v.clone())).collect(),
                    weight: m.weight,
                })
                .collect(),
            ended_matches: state
                .ended
                .iter()
                .map(|m| m.iter().map(|(r, v)| (r.name().to_string(), v.clone())).collect())
                .collect(),
        };
        drop(state);

        let encoded = serde_json::to_string_pretty(&persisted)?;
        if let Some(parent) = self.output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.output_path, encoded).await?;
        Ok(())
    }
}

fn theoretical_share(role_num_map: &HashMap<Role, u32>, game_count: u32, team_count: u32) -> HashMap<Role, f64> {
    role_num_map
        .iter()
        .map(|(role, count)| (*role, (*count as f64) * (game_count as f64) / (team_count as f64)))
        .collect()
}

/// Build `game_count` role-assignments `attempts` times; keep the whole
/// schedule whose aggregate per-team, per-role counts have the smallest
/// total squared deviation from `theoretical`. First strictly-smaller
/// candidate wins ties.
fn generate_candidate(
    role_num_map: &HashMap<Role, u32>,
    team_count: u32,
    game_count: u32,
    theoretical: &HashMap<Role, f64>,
    attempts: usize,
) -> Option<Vec<MatchWeight>> {
    if team_count == 0 || game_count == 0 {
        return None;
    }
    let total_roles: u32 = role_num_map.values().sum();
    if total_roles != team_count {
        return None;
    }

    let mut roles_ordered: Vec<Role> = role_num_map.keys().copied().collect();
    roles_ordered.sort();

    let mut rng = rand::rng();
    let mut best: Option<(Vec<MatchWeight>, f64)> = None;

    for _ in 0..attempts.max(1) {
        let mut schedule = Vec::with_capacity(game_count as usize);
        let mut per_team_role_counts: HashMap<u32, HashMap<Role, u32>> = HashMap::new();

        for _ in 0..game_count {
            let mut team_idxs: Vec<u32> = (0..team_count).collect();
            team_idxs.shuffle(&mut rng);

            let mut role_idxs: HashMap<Role, Vec<u32>> = HashMap::new();
            let mut cursor = 0usize;
            for &role in &roles_ordered {
                let count = role_num_map[&role] as usize;
                let slice = team_idxs[cursor..cursor + count].to_vec();
                for &team_idx in &slice {
                    *per_team_role_counts.entry(team_idx).or_default().entry(role).or_insert(0) += 1;
                }
                role_idxs.insert(role, slice);
                cursor += count;
            }
            schedule.push(MatchWeight { role_idxs, weight: 1.0 });
        }

        let deviation: f64 = per_team_role_counts
            .values()
            .flat_map(|role_counts| {
                theoretical.iter().map(move |(role, expected)| {
                    let actual = *role_counts.get(role).unwrap_or(&0) as f64;
                    (actual - expected).powi(2)
                })
            })
            .sum();

        let better = match &best {
            None => true,
            Some((_, best_deviation)) => deviation < *best_deviation,
        };
        if better {
            best = Some((schedule, deviation));
        }
    }

    best.map(|(schedule, _)| schedule)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn werewolf_role_map() -> HashMap<Role, u32> {
        let mut map = HashMap::new();
        map.insert(Role::Werewolf, 1);
        map.insert(Role::Seer, 1);
        map.insert(Role::Villager, 2);
        map
    }

    #[test]
    fn candidate_generation_covers_every_team_exactly_once_per_game() {
        let role_num_map = werewolf_role_map();
        let theoretical = theoretical_share(&role_num_map, 4, 4);
        let schedule = generate_candidate(&role_num_map, 4, 4, &theoretical, 20).unwrap();
        assert_eq!(schedule.len(), 4);
        for game in &schedule {
            let mut all_idxs: Vec<u32> = game.role_idxs.values().flatten().copied().collect();
            all_idxs.sort_unstable();
            assert_eq!(all_idxs, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn same_assignment_ignores_order() {
        let mut a = HashMap::new();
        a.insert(Role::Werewolf, vec![2, 1]);
        let weight = MatchWeight { role_idxs: a, weight: 1.0 };

        let mut b = HashMap::new();
        b.insert(Role::Werewolf, vec![1, 2]);
        assert!(weight.same_assignment(&b));
    }

    #[test]
    fn empty_role_pool_mismatch_yields_no_candidate() {
        let role_num_map = werewolf_role_map();
        let theoretical = theoretical_share(&role_num_map, 4, 4);
        // team_count doesn't match the sum of role counts (4 != 3).
        assert!(generate_candidate(&role_num_map, 3, 4, &theoretical, 5).is_none());
    }
}
