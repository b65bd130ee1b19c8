//! Execution and attack phases (§4.4.3): a day vote that kills one agent by
//! majority, a night werewolf vote that does the same unless guarded.

use std::collections::HashMap;

use protocol::{Judge, RequestKind, Role, Vote};
use tracing::warn;

use crate::game_status::Status;
use crate::util::{max_count_candidates, select_random};

use super::Game;

impl Game {
    pub(super) async fn do_execution(&mut self) {
        let participants = self.alive_agent_idxs();
        if participants.is_empty() {
            return;
        }
        let allow_self = self.config.game.vote.allow_self_vote;
        let max_count = self.config.game.vote.max_count;
        let (votes, candidates) = self.run_vote_rounds(RequestKind::Vote, &participants, allow_self, false, max_count).await;
        self.current_status_mut().votes = votes.iter().map(|&(voter, target)| self.vote_record(voter, target)).collect();

        let Some(target) = select_random(&candidates) else {
            return;
        };

        self.current_status_mut().executed_agent = Some(target);
        self.current_status_mut().set_status(target, Status::Dead);
        self.synthesize_medium_result(target);
        self.broadcast_event("execute", Some(target)).await;
    }

    pub(super) async fn do_attack(&mut self) {
        let participants = self.alive_werewolf_idxs();
        if participants.is_empty() {
            return;
        }
        let allow_self = self.config.game.attack_vote.allow_self_vote;
        let allow_no_target = self.config.game.attack_vote.allow_no_target;
        let max_count = self.config.game.attack_vote.max_count;
        let (votes, candidates) = self.run_vote_rounds(RequestKind::Attack, &participants, allow_self, allow_no_target, max_count).await;
        self.current_status_mut().attack_votes = votes.iter().map(|&(voter, target)| self.vote_record(voter, target)).collect();

        let Some(target) = select_random(&candidates) else {
            return;
        };

        self.current_status_mut().attacked_agent = Some(target);
        let guarded = self
            .current_status()
            .guard
            .as_ref()
            .and_then(|g| self.find_idx_by_name(&g.target))
            == Some(target);
        if !guarded {
            self.current_status_mut().set_status(target, Status::Dead);
        }
        self.broadcast_event("attack", Some(target)).await;
    }

    /// Re-votes up to `max_count` times (§4.4.3): each round's tally narrows
    /// the field to whoever is currently tied for the most votes, and once
    /// exactly one candidate remains voting stops early. Only when the
    /// rounds are exhausted without narrowing to a single candidate does the
    /// caller fall back to breaking the final tie at random.
    async fn run_vote_rounds(
        &mut self,
        kind: RequestKind,
        voters: &[u32],
        allow_self: bool,
        allow_no_target: bool,
        max_count: u32,
    ) -> (Vec<(u32, u32)>, Vec<u32>) {
        let rounds = max_count.max(1);
        let mut votes = Vec::new();
        let mut candidates = Vec::new();
        let mut restrict: Option<Vec<u32>> = None;
        for _ in 0..rounds {
            votes = self.collect_votes(kind, voters, allow_self, allow_no_target, restrict.as_deref()).await;
            candidates = max_count_candidates(&tally(&votes));
            if candidates.len() <= 1 {
                break;
            }
            restrict = Some(candidates.clone());
        }
        (votes, candidates)
    }

    /// Requests a target from every participant and maps each answer back to
    /// an agent index, discarding anything that can't be resolved: an
    /// unrecognized name, a disallowed self-vote, or a dead target. An
    /// abstaining response (`Skip`) is only accepted when `allow_no_target`
    /// permits it; otherwise it is also discarded. When `restrict` is set
    /// (a re-vote round), targets outside that set are discarded too.
    async fn collect_votes(
        &mut self,
        kind: RequestKind,
        voters: &[u32],
        allow_self: bool,
        allow_no_target: bool,
        restrict: Option<&[u32]>,
    ) -> Vec<(u32, u32)> {
        let mut votes = Vec::new();
        for &voter in voters {
            let Some(answer) = self.request(voter, kind).await else {
                continue;
            };
            if answer == protocol::SENTINEL_SKIP {
                if !allow_no_target {
                    warn!(voter = %self.agents[&voter].game_name, "abstained on a vote that disallows no-target");
                }
                continue;
            }
            let Some(target) = self.find_idx_by_name(&answer) else {
                continue;
            };
            if !allow_self && target == voter {
                continue;
            }
            if !self.is_alive(target) {
                continue;
            }
            if let Some(restrict) = restrict
                && !restrict.contains(&target)
            {
                continue;
            }
            votes.push((voter, target));
        }
        votes
    }

    pub(super) fn find_idx_by_name(&self, name: &str) -> Option<u32> {
        self.agents.values().find(|a| a.game_name == name).map(|a| a.idx)
    }

    fn vote_record(&self, voter: u32, target: u32) -> Vote {
        Vote {
            day: self.current_day,
            agent: self.agents[&voter].game_name.clone(),
            target: self.agents[&target].game_name.clone(),
        }
    }

    /// A Medium learns the species of whoever was executed that day, added
    /// to tomorrow's `DailyInitialize` info (§4.4.6).
    fn synthesize_medium_result(&mut self, executed: u32) {
        let Some(medium) = self.agents.values().find(|a| a.role == Role::Medium) else {
            return;
        };
        let species = self.agents[&executed].role.species();
        let judge = Judge {
            day: self.current_day,
            agent: medium.game_name.clone(),
            target: self.agents[&executed].game_name.clone(),
            result: species,
        };
        self.current_status_mut().medium_result = Some(judge);
    }

    pub(super) async fn broadcast_event(&mut self, event: &str, target: Option<u32>) {
        let day = self.current_day;
        let broadcast_idx = self.next_broadcast_idx();
        let packet = protocol::BroadcastPacket {
            id: self.id.clone(),
            idx: broadcast_idx,
            day,
            is_day: event != "attack",
            agents: self.broadcast_agents(),
            event: event.to_string(),
            message: None,
            from_idx: None,
            to_idx: target.map(|t| t as i64),
            bubble_idx: None,
        };
        self.sinks.broadcast(&packet).await;
        if let Some(target) = target {
            let target_name = self.agents[&target].game_name.clone();
            self.sinks.append_log(&self.id, &format!("{day},{event},{target_name}")).await;
        }
    }
}

fn tally(votes: &[(u32, u32)]) -> HashMap<u32, u32> {
    let mut tallies = HashMap::new();
    for &(_voter, target) in votes {
        *tallies.entry(target).or_insert(0) += 1;
    }
    tallies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_targets_not_voters() {
        let votes = vec![(1, 3), (2, 3), (4, 1)];
        let counts = tally(&votes);
        assert_eq!(counts.get(&3), Some(&2));
        assert_eq!(counts.get(&1), Some(&1));
    }
}
