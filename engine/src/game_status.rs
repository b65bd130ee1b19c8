//! GameStatus (§3): one value per day, kept in memory for the whole game.

use std::collections::HashMap;

use protocol::{Guard, Judge, Talk, Vote};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Alive,
    Dead,
}

impl From<Status> for protocol::Status {
    fn from(value: Status) -> Self {
        match value {
            Status::Alive => protocol::Status::Alive,
            Status::Dead => protocol::Status::Dead,
        }
    }
}

/// Transient per-turn communication budgets, present only while a talk or
/// whisper phase is running. Indexed by agent `idx` rather than a typed
/// pointer (§9 design note: "replace typed pointers with (agent_id, day)
/// indexing" — avoids the aliasing hazard around the source's map pointers).
#[derive(Debug, Clone, Default)]
pub struct RemainMaps {
    pub count: HashMap<u32, i64>,
    pub length: HashMap<u32, i64>,
    pub skip: HashMap<u32, i64>,
}

#[derive(Debug, Clone)]
pub struct GameStatus {
    pub day: u32,
    pub status_map: HashMap<u32, Status>,
    pub votes: Vec<Vote>,
    pub attack_votes: Vec<Vote>,
    pub talks: Vec<Talk>,
    pub whispers: Vec<Talk>,
    pub medium_result: Option<Judge>,
    pub divine_result: Option<Judge>,
    pub executed_agent: Option<u32>,
    pub attacked_agent: Option<u32>,
    pub guard: Option<Guard>,
    pub remain: Option<RemainMaps>,
}

impl GameStatus {
    /// Day 0: every agent alive, everything else empty.
    pub fn initial(agent_idxs: impl Iterator<Item = u32>) -> Self {
        let status_map = agent_idxs.map(|idx| (idx, Status::Alive)).collect();
        GameStatus {
            day: 0,
            status_map,
            votes: Vec::new(),
            attack_votes: Vec::new(),
            talks: Vec::new(),
            whispers: Vec::new(),
            medium_result: None,
            divine_result: None,
            executed_agent: None,
            attacked_agent: None,
            guard: None,
            remain: None,
        }
    }

    /// Only `status_map` is copied forward; everything transient resets
    /// (§3 invariant: `NextDay()` produces a fresh status with only
    /// `status_map` copied forward).
    pub fn next_day(&self) -> Self {
        GameStatus {
            day: self.day + 1,
            status_map: self.status_map.clone(),
            votes: Vec::new(),
            attack_votes: Vec::new(),
            talks: Vec::new(),
            whispers: Vec::new(),
            medium_result: None,
            divine_result: None,
            executed_agent: None,
            attacked_agent: None,
            guard: None,
            remain: None,
        }
    }

    pub fn is_alive(&self, idx: u32) -> bool {
        matches!(self.status_map.get(&idx), Some(Status::Alive))
    }

    pub fn set_status(&mut self, idx: u32, status: Status) {
        self.status_map.insert(idx, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_day_only_carries_status_map() {
        let mut day0 = GameStatus::initial(1..=3);
        day0.executed_agent = Some(2);
        day0.set_status(2, Status::Dead);

        let day1 = day0.next_day();
        assert_eq!(day1.day, 1);
        assert_eq!(day1.status_map, day0.status_map);
        assert!(day1.executed_agent.is_none());
        assert!(day1.talks.is_empty());
    }
}
