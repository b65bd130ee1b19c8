//! `buildInfo` (§4.4.6): the per-recipient redacted view of game state.
//!
//! Every field here is gated by who is asking: dead-or-alive status is
//! public, roles are self-only (except a werewolf's teammates, since a
//! werewolf already knows its own side), and judge/guard results are
//! visible only to the role that produced them.

use std::collections::BTreeMap;

use protocol::{Info, RequestKind, Role, Team};

use super::Game;

impl Game {
    pub(super) fn build_info(&self, idx: u32, kind: RequestKind) -> Info {
        let status = self.current_status();
        let agent = &self.agents[&idx];

        let status_map: BTreeMap<String, protocol::Status> = self
            .agents
            .values()
            .map(|a| (a.game_name.clone(), status.status_map.get(&a.idx).copied().unwrap_or(crate::game_status::Status::Alive).into()))
            .collect();

        let role_map: BTreeMap<String, Role> = self
            .agents
            .values()
            .filter(|a| a.idx == idx || (agent.role.team() == Team::Werewolf && a.role.team() == Team::Werewolf))
            .map(|a| (a.game_name.clone(), a.role))
            .collect();

        // `DailyInitialize`/`DailyFinish` report on the day/night cycle that
        // just concluded, not on the fresh (mostly-empty) status `next_day`
        // just started: pull those fields from yesterday's status instead.
        let outcome_status = if matches!(kind, RequestKind::DailyInitialize | RequestKind::DailyFinish) {
            self.yesterday_status().unwrap_or(status)
        } else {
            status
        };

        let medium_result = (agent.role == Role::Medium).then(|| outcome_status.medium_result.clone()).flatten();
        let divine_result = (agent.role == Role::Seer).then(|| outcome_status.divine_result.clone()).flatten();
        let executed_agent = outcome_status.executed_agent.and_then(|i| self.agents.get(&i)).map(|a| a.game_name.clone());
        let attacked_agent = outcome_status.attacked_agent.and_then(|i| self.agents.get(&i)).map(|a| a.game_name.clone());

        let vote_list = (self.config.game.vote_visibility && matches!(kind, RequestKind::Vote | RequestKind::DailyFinish))
            .then(|| outcome_status.votes.clone())
            .filter(|v| !v.is_empty());

        let attack_vote_list = (agent.role.team() == Team::Werewolf && matches!(kind, RequestKind::Attack | RequestKind::DailyFinish))
            .then(|| outcome_status.attack_votes.clone())
            .filter(|v| !v.is_empty());

        let (remain_count, remain_length, remain_skip) = status
            .remain
            .as_ref()
            .map(|r| (r.count.get(&idx).copied(), r.length.get(&idx).copied(), r.skip.get(&idx).copied()))
            .unwrap_or((None, None, None));

        Info {
            game_id: self.id.clone(),
            day: self.current_day,
            agent: agent.game_name.clone(),
            status_map,
            role_map,
            medium_result,
            divine_result,
            executed_agent,
            attacked_agent,
            vote_list,
            attack_vote_list,
            remain_count,
            remain_length,
            remain_skip,
        }
    }
}
