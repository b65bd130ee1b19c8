//! Talk and whisper phases (§4.4.5): free-form communication rounds bounded
//! by per-day count, per-agent count, message length, and skip budgets.
//!
//! Resolves the remain-count bookkeeping Open Question (§12-1): the budget
//! is decremented *before* the request goes out, so an agent that never
//! answers still spends its turn rather than getting it back for free.

use std::collections::HashSet;

use protocol::{RequestKind, Talk as TalkRecord, SENTINEL_FORCE_SKIP, SENTINEL_OVER, SENTINEL_SKIP};

use crate::config::TalkConfig;
use crate::game_status::RemainMaps;
use crate::util::{count_length, truncate_chars};

use super::Game;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Channel {
    Talk,
    Whisper,
}

impl Game {
    pub(super) async fn do_talk(&mut self) {
        self.run_communication(Channel::Talk).await;
    }

    pub(super) async fn do_whisper(&mut self) {
        self.run_communication(Channel::Whisper).await;
    }

    async fn run_communication(&mut self, channel: Channel) {
        let participants = match channel {
            Channel::Talk => self.alive_agent_idxs(),
            Channel::Whisper => self.alive_werewolf_idxs(),
        };
        if participants.is_empty() {
            return;
        }
        let cfg = match channel {
            Channel::Talk => self.config.game.talk.clone(),
            Channel::Whisper => self.config.game.whisper.clone(),
        };
        self.init_remain_maps(&participants, &cfg);

        let per_day_limit = cfg.max_count.per_day as usize;
        let mut done: HashSet<u32> = HashSet::new();
        let mut turn: u32 = 0;

        'rounds: loop {
            if done.len() == participants.len() {
                break;
            }
            if per_day_limit > 0 && turn as usize >= per_day_limit {
                break;
            }
            for &idx in &participants {
                if done.contains(&idx) {
                    continue;
                }
                if per_day_limit > 0 && turn as usize >= per_day_limit {
                    break 'rounds;
                }

                if self.remain_count(idx) == Some(0) {
                    done.insert(idx);
                    self.record_utterance(channel, idx, turn, SENTINEL_SKIP.to_string()).await;
                    continue;
                }
                self.decrement_remain_count(idx);

                let kind = match channel {
                    Channel::Talk => RequestKind::Talk,
                    Channel::Whisper => RequestKind::Whisper,
                };
                let text = self.request(idx, kind).await.unwrap_or_else(|| SENTINEL_SKIP.to_string());
                let text = self.apply_length_cap(idx, &cfg, text);

                if text == SENTINEL_OVER {
                    done.insert(idx);
                    if let Some(remain) = self.current_status_mut().remain.as_mut() {
                        remain.count.insert(idx, 0);
                    }
                    self.record_utterance(channel, idx, turn, text).await;
                    continue;
                }
                if text == SENTINEL_SKIP || text == SENTINEL_FORCE_SKIP {
                    if !self.decrement_remain_skip(idx, &cfg) {
                        done.insert(idx);
                    }
                }
                self.record_utterance(channel, idx, turn, text).await;
            }
            turn += 1;
        }

        self.current_status_mut().remain = None;
    }

    fn remain_count(&self, idx: u32) -> Option<i64> {
        self.current_status().remain.as_ref().and_then(|r| r.count.get(&idx).copied())
    }

    fn init_remain_maps(&mut self, participants: &[u32], cfg: &TalkConfig) {
        let status = self.current_status_mut();
        let remain = status.remain.get_or_insert_with(RemainMaps::default);
        for &idx in participants {
            remain.count.entry(idx).or_insert(cfg.max_count.per_agent);
            remain.length.entry(idx).or_insert(cfg.max_length.per_agent.unwrap_or(i64::MAX));
            remain.skip.entry(idx).or_insert(cfg.max_skip);
        }
    }

    fn decrement_remain_count(&mut self, idx: u32) {
        if let Some(remain) = self.current_status_mut().remain.as_mut()
            && let Some(count) = remain.count.get_mut(&idx)
        {
            *count -= 1;
        }
    }

    /// Returns `false` once `idx`'s skip budget is exhausted: the caller
    /// should stop offering this agent further turns for the rest of the day.
    fn decrement_remain_skip(&mut self, idx: u32, cfg: &TalkConfig) -> bool {
        if cfg.max_skip < 0 {
            return true;
        }
        let Some(remain) = self.current_status_mut().remain.as_mut() else {
            return true;
        };
        let Some(budget) = remain.skip.get_mut(&idx) else {
            return true;
        };
        if *budget <= 0 {
            return false;
        }
        *budget -= 1;
        true
    }

    /// Enforces the per-message cap (`per_talk`, defaulting to `base_length`)
    /// and the cumulative per-agent budget, in whichever counting mode the
    /// setting selects (§4.4.5, §12-3).
    fn apply_length_cap(&mut self, idx: u32, cfg: &TalkConfig, text: String) -> String {
        if text == SENTINEL_SKIP || text == SENTINEL_OVER || text == SENTINEL_FORCE_SKIP {
            return text;
        }
        let per_message_cap = cfg.max_length.per_talk.unwrap_or(cfg.max_length.base_length.max(0) as usize);
        let mut truncated = if count_length(&text, cfg.max_length.count_in_word, cfg.max_length.count_spaces) > per_message_cap {
            truncate_chars(&text, per_message_cap)
        } else {
            text
        };

        if let Some(remain) = self.current_status_mut().remain.as_mut()
            && let Some(budget) = remain.length.get_mut(&idx)
            && *budget != i64::MAX
        {
            let spent = count_length(&truncated, cfg.max_length.count_in_word, cfg.max_length.count_spaces) as i64;
            if spent > *budget {
                truncated = truncate_chars(&truncated, (*budget).max(0) as usize);
            }
            *budget -= spent.min(*budget);
        }
        truncated
    }

    async fn record_utterance(&mut self, channel: Channel, idx: u32, turn: u32, text: String) {
        let day = self.current_day;
        let agent_name = self.agents[&idx].game_name.clone();
        let record = TalkRecord {
            idx: self.history_len(channel),
            day,
            turn,
            agent: agent_name.clone(),
            text: text.clone(),
        };

        let status = self.current_status_mut();
        match channel {
            Channel::Talk => status.talks.push(record),
            Channel::Whisper => status.whispers.push(record),
        }

        let event = match channel {
            Channel::Talk => "talk",
            Channel::Whisper => "whisper",
        };
        self.sinks.append_log(&self.id, &format!("{day},{event},{agent_name},{text}")).await;
        let broadcast_idx = self.next_broadcast_idx();
        let packet = protocol::BroadcastPacket {
            id: self.id.clone(),
            idx: broadcast_idx,
            day,
            is_day: true,
            agents: self.broadcast_agents(),
            event: event.to_string(),
            message: Some(text),
            from_idx: Some(idx as i64),
            to_idx: None,
            bubble_idx: None,
        };
        self.sinks.broadcast(&packet).await;
    }

    fn history_len(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Talk => self.current_status().talks.len() as u32,
            Channel::Whisper => self.current_status().whispers.len() as u32,
        }
    }

    pub(super) fn broadcast_agents(&self) -> Vec<protocol::BroadcastAgent> {
        let status = self.current_status();
        let mut agents: Vec<protocol::BroadcastAgent> = self
            .agents
            .values()
            .map(|a| protocol::BroadcastAgent {
                idx: a.idx,
                team: a.team_name.clone(),
                name: a.game_name.clone(),
                is_alive: status.is_alive(a.idx),
            })
            .collect();
        agents.sort_by_key(|a| a.idx);
        agents
    }

    /// Per-agent watermark slice of talks not yet delivered to `idx`
    /// (§4.4.6 "minimize" history mechanism): only new lines since the last
    /// request are sent, not the whole day's transcript every time.
    pub(super) fn minimize_talks(&mut self, idx: u32) -> Vec<TalkRecord> {
        let all = self.current_status().talks.clone();
        let watermark = self.last_talk_idx.entry(idx).or_insert(0);
        let slice = all[(*watermark).min(all.len())..].to_vec();
        *watermark = all.len();
        slice
    }

    pub(super) fn minimize_whispers(&mut self, idx: u32) -> Vec<TalkRecord> {
        let all = self.current_status().whispers.clone();
        let watermark = self.last_whisper_idx.entry(idx).or_insert(0);
        let slice = all[(*watermark).min(all.len())..].to_vec();
        *watermark = all.len();
        slice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MaxCountConfig, MaxLengthConfig};

    fn cfg(per_talk: usize) -> TalkConfig {
        TalkConfig {
            max_count: MaxCountConfig { per_agent: 5, per_day: 10 },
            max_length: MaxLengthConfig {
                per_talk: Some(per_talk),
                per_agent: None,
                base_length: per_talk as i64,
                count_in_word: false,
                count_spaces: false,
            },
            max_skip: 3,
        }
    }

    #[test]
    fn length_cap_truncates_without_panicking_on_multibyte() {
        let truncated = truncate_chars("héllo wörld", 3);
        assert_eq!(truncated.chars().count(), 3);
    }

    #[test]
    fn per_talk_cap_is_used_when_present() {
        let c = cfg(5);
        assert_eq!(c.max_length.per_talk, Some(5));
    }
}
