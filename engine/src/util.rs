//! Small pure helpers shared across the engine: win-rule evaluation, vote
//! tallying, and text-length counting for the communication budgets.

use std::collections::HashMap;

use protocol::{Role, Species, Team};
use rand::seq::IndexedRandom;

use crate::game_status::{GameStatus, Status};

/// `calc_win_side` (§4.4.1, §8 property 8):
/// `wolves == 0` -> `Villager`; `humans <= wolves` -> `Werewolf`; else `None`.
/// The `<=` is a deliberate design choice: equal head-count favors wolves.
pub fn calc_win_side(status: &GameStatus, roles: &HashMap<u32, Role>) -> Team {
    let (humans, wolves) = count_alive_species(status, roles);
    if wolves == 0 {
        return Team::Villager;
    }
    if humans <= wolves {
        return Team::Werewolf;
    }
    Team::None
}

fn count_alive_species(status: &GameStatus, roles: &HashMap<u32, Role>) -> (u32, u32) {
    let mut humans = 0;
    let mut wolves = 0;
    for (idx, alive) in &status.status_map {
        if *alive != Status::Alive {
            continue;
        }
        match roles.get(idx).map(|r| r.species()) {
            Some(Species::Human) => humans += 1,
            Some(Species::Werewolf) => wolves += 1,
            None => {}
        }
    }
    (humans, wolves)
}

/// Ratio of `has_error` agents, for the `max_continue_error_ratio` check.
pub fn error_ratio(has_error_flags: &[bool]) -> f64 {
    if has_error_flags.is_empty() {
        return 0.0;
    }
    let errored = has_error_flags.iter().filter(|e| **e).count();
    errored as f64 / has_error_flags.len() as f64
}

/// All agents tied for the highest vote total among `tallies`. Empty if
/// `tallies` is empty.
pub fn max_count_candidates(tallies: &HashMap<u32, u32>) -> Vec<u32> {
    let Some(&max) = tallies.values().max() else {
        return Vec::new();
    };
    tallies.iter().filter(|(_, count)| **count == max).map(|(idx, _)| *idx).collect()
}

/// Uniform random pick among tied candidates.
pub fn select_random(candidates: &[u32]) -> Option<u32> {
    candidates.choose(&mut rand::rng()).copied()
}

/// Count a talk/whisper utterance's length under the three modes
/// (§4.4.5): whitespace-separated words, code points including whitespace,
/// code points excluding whitespace.
pub fn count_length(text: &str, count_in_word: bool, count_spaces: bool) -> usize {
    if count_in_word {
        text.split_whitespace().count()
    } else if count_spaces {
        text.chars().count()
    } else {
        text.chars().filter(|c| !c.is_whitespace()).count()
    }
}

/// Truncate `text` to `limit` code points, safely on character boundaries.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(pairs: &[(u32, Role)]) -> HashMap<u32, Role> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn win_rule_villager_when_no_wolves_alive() {
        let mut status = GameStatus::initial(1..=2);
        status.set_status(2, Status::Dead);
        let roles = roles(&[(1, Role::Villager), (2, Role::Werewolf)]);
        assert_eq!(calc_win_side(&status, &roles), Team::Villager);
    }

    #[test]
    fn win_rule_equal_headcount_favors_wolves() {
        let status = GameStatus::initial(1..=2);
        let roles = roles(&[(1, Role::Villager), (2, Role::Werewolf)]);
        assert_eq!(calc_win_side(&status, &roles), Team::Werewolf);
    }

    #[test]
    fn win_rule_none_when_humans_outnumber_wolves() {
        let status = GameStatus::initial(1..=3);
        let roles = roles(&[(1, Role::Villager), (2, Role::Villager), (3, Role::Werewolf)]);
        assert_eq!(calc_win_side(&status, &roles), Team::None);
    }

    #[test]
    fn count_length_modes() {
        assert_eq!(count_length("hello world", true, false), 2);
        assert_eq!(count_length("hello world", false, true), 11);
        assert_eq!(count_length("hello world", false, false), 10);
    }
}
