//! Divine and guard phases (§4.4.4): a Seer learns one target's species
//! each night; a Bodyguard names one target to protect from the attack.

use protocol::{Judge, RequestKind, Role};

use super::Game;

impl Game {
    pub(super) async fn do_divine(&mut self) {
        let seers: Vec<u32> = self.alive_agent_idxs().into_iter().filter(|idx| self.agents[idx].role == Role::Seer).collect();
        for seer in seers {
            let Some(answer) = self.request(seer, RequestKind::Divine).await else {
                continue;
            };
            let Some(target) = self.find_idx_by_name(&answer) else {
                continue;
            };
            if target == seer {
                continue;
            }
            if !self.is_alive(target) {
                continue;
            }
            let species = self.agents[&target].role.species();
            let judge = Judge {
                day: self.current_day,
                agent: self.agents[&seer].game_name.clone(),
                target: self.agents[&target].game_name.clone(),
                result: species,
            };
            self.current_status_mut().divine_result = Some(judge);
            self.broadcast_event("divine", Some(target)).await;
        }
    }

    pub(super) async fn do_guard(&mut self) {
        let guards: Vec<u32> = self.alive_agent_idxs().into_iter().filter(|idx| self.agents[idx].role == Role::Bodyguard).collect();
        for guard in guards {
            let Some(answer) = self.request(guard, RequestKind::Guard).await else {
                continue;
            };
            let Some(target) = self.find_idx_by_name(&answer) else {
                continue;
            };
            if target == guard {
                continue;
            }
            if !self.is_alive(target) {
                continue;
            }
            let record = protocol::Guard {
                day: self.current_day,
                agent: self.agents[&guard].game_name.clone(),
                target: self.agents[&target].game_name.clone(),
            };
            self.current_status_mut().guard = Some(record);
            self.broadcast_event("guard", Some(target)).await;
        }
    }
}
