//! Game Engine (§4.4): the per-game phase/turn state machine.
//!
//! Each live game runs in one task; phases execute sequentially so the
//! day/night state machine is single-threaded per game (§5) — every field
//! below is touched only by the task driving `start()`.

mod communication;
mod divine_guard;
mod info;
mod voting;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use protocol::{Packet, RequestKind, Role, Team};
use tracing::{info, warn};

use crate::agent::{Agent, IdentifiedConnection};
use crate::config::Config;
use crate::game_status::GameStatus;
use crate::sinks::SinkRegistry;
use crate::transport::Timeouts;
use crate::util::{calc_win_side, error_ratio};

pub struct Game {
    id: String,
    agents: HashMap<u32, Agent>,
    config: Arc<Config>,
    setting: protocol::Setting,
    sinks: SinkRegistry,
    current_day: u32,
    game_statuses: BTreeMap<u32, GameStatus>,
    last_talk_idx: HashMap<u32, usize>,
    last_whisper_idx: HashMap<u32, usize>,
    broadcast_idx: u64,
}

impl Game {
    fn timeouts(&self) -> Timeouts {
        Timeouts {
            action: std::time::Duration::from_millis(self.config.server.timeout.action_ms),
            response: std::time::Duration::from_millis(self.config.server.timeout.response_ms),
            acceptable: std::time::Duration::from_millis(self.config.server.timeout.acceptable_ms),
        }
    }

    /// Construct a game whose roles are already fixed by the Match Optimizer
    /// (each role's seats already filled by the selected teams).
    pub fn new_with_role(
        id: String,
        by_role: HashMap<Role, Vec<(String, IdentifiedConnection)>>,
        config: Arc<Config>,
        sinks: SinkRegistry,
    ) -> Self {
        let mut agents = HashMap::new();
        let mut idx = 1u32;
        for (role, conns) in by_role {
            for (team_name, conn) in conns {
                agents.insert(idx, build_agent(idx, team_name, role, conn, &config));
                idx += 1;
            }
        }
        Self::from_agents(id, agents, config, sinks)
    }

    /// Construct a game that assigns roles itself by draining
    /// `logic.roles[agent_count]`, defaulting to `VILLAGER` if the pool runs
    /// out before the agents do (§3, §11 villager-fallback).
    pub fn new(
        id: String,
        connections: Vec<(String, IdentifiedConnection)>,
        config: Arc<Config>,
        sinks: SinkRegistry,
    ) -> Self {
        let agent_count = connections.len() as u32;
        let mut remaining = config
            .logic
            .roles
            .get(&agent_count)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(|(name, count)| Role::from_name(name).map(|r| (r, *count)))
                    .collect::<HashMap<Role, u32>>()
            })
            .unwrap_or_default();

        let mut agents = HashMap::new();
        for (idx, (team_name, conn)) in connections.into_iter().enumerate() {
            let idx = idx as u32 + 1;
            let role = assign_role(&mut remaining);
            agents.insert(idx, build_agent(idx, team_name, role, conn, &config));
        }
        Self::from_agents(id, agents, config, sinks)
    }

    fn from_agents(id: String, agents: HashMap<u32, Agent>, config: Arc<Config>, sinks: SinkRegistry) -> Self {
        let setting = build_setting(&config, &agents);
        let mut game_statuses = BTreeMap::new();
        game_statuses.insert(0, GameStatus::initial(agents.keys().copied()));
        Game {
            id,
            agents,
            config,
            setting,
            sinks,
            current_day: 0,
            game_statuses,
            last_talk_idx: HashMap::new(),
            last_whisper_idx: HashMap::new(),
            broadcast_idx: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `role -> [team_name]` for every agent, used to report the match
    /// outcome back to the Match Optimizer.
    pub fn role_team_map(&self) -> HashMap<Role, Vec<String>> {
        let mut map: HashMap<Role, Vec<String>> = HashMap::new();
        for agent in self.agents.values() {
            map.entry(agent.role).or_default().push(agent.team_name.clone());
        }
        map
    }

    fn current_status(&self) -> &GameStatus {
        self.game_statuses.get(&self.current_day).expect("current day always has a status")
    }

    fn current_status_mut(&mut self) -> &mut GameStatus {
        self.game_statuses.get_mut(&self.current_day).expect("current day always has a status")
    }

    fn yesterday_status(&self) -> Option<&GameStatus> {
        self.current_day.checked_sub(1).and_then(|d| self.game_statuses.get(&d))
    }

    fn alive_agent_idxs(&self) -> Vec<u32> {
        let status = self.current_status();
        self.agents.keys().copied().filter(|idx| status.is_alive(*idx)).collect()
    }

    fn alive_werewolf_idxs(&self) -> Vec<u32> {
        self.alive_agent_idxs()
            .into_iter()
            .filter(|idx| self.agents[idx].role == Role::Werewolf)
            .collect()
    }

    fn is_alive(&self, idx: u32) -> bool {
        self.current_status().is_alive(idx)
    }

    fn next_broadcast_idx(&mut self) -> u64 {
        let idx = self.broadcast_idx;
        self.broadcast_idx += 1;
        idx
    }

    /// `shouldFinish` (§4.4.1): excessive-error abort, then the win rule.
    fn should_finish(&self) -> Team {
        let flags: Vec<bool> = self.agents.values().map(|a| a.has_error).collect();
        if error_ratio(&flags) >= self.config.server.max_continue_error_ratio {
            return Team::None;
        }
        let roles: HashMap<u32, Role> = self.agents.iter().map(|(idx, a)| (*idx, a.role)).collect();
        calc_win_side(self.current_status(), &roles)
    }

    /// Top-level lifecycle (§4.4.1). Returns the winning team (`None` if the
    /// game aborted without a decisive winner).
    pub async fn start(&mut self) -> Team {
        info!(game_id = %self.id, "starting game");
        self.sinks.track_start_game(&self.id).await;

        let initialize_idxs: Vec<u32> = self.agents.keys().copied().collect();
        for idx in initialize_idxs {
            self.request(idx, RequestKind::Initialize).await;
        }

        let winner = loop {
            self.progress_day().await;
            if let winner @ (Team::Villager | Team::Werewolf) = self.should_finish() {
                break winner;
            }
            self.progress_night().await;

            let next_status = self.current_status().next_day();
            self.game_statuses.insert(self.current_day + 1, next_status);
            self.current_day += 1;

            if let Some(max_day) = self.config.game.max_day
                && self.current_day > max_day
            {
                break Team::None;
            }
            match self.should_finish() {
                winner @ (Team::Villager | Team::Werewolf) => break winner,
                Team::None => continue,
            }
        };

        let finish_idxs: Vec<u32> = self.agents.keys().copied().collect();
        for idx in finish_idxs {
            self.request(idx, RequestKind::Finish).await;
        }
        self.close_all_agents().await;

        self.sinks.track_end_game(&self.id, winner).await;
        info!(game_id = %self.id, ?winner, "game finished");
        winner
    }

    async fn close_all_agents(&mut self) {
        for agent in self.agents.values_mut() {
            agent.close().await;
        }
    }

    async fn progress_day(&mut self) {
        if self.current_day > 0 {
            let daily_initialize_idxs: Vec<u32> = self.agents.keys().copied().collect();
            for idx in daily_initialize_idxs {
                self.request(idx, RequestKind::DailyInitialize).await;
            }
        }

        let phases = self.config.logic.day_phases.clone();
        for phase in &phases {
            if !phase.applies_on(self.current_day) {
                continue;
            }
            self.execute_phase(&phase.actions).await;
            if !matches!(self.should_finish(), Team::None) {
                return;
            }
        }
    }

    async fn progress_night(&mut self) {
        let daily_finish_idxs: Vec<u32> = self.agents.keys().copied().collect();
        for idx in daily_finish_idxs {
            self.request(idx, RequestKind::DailyFinish).await;
        }

        let phases = self.config.logic.night_phases.clone();
        for phase in &phases {
            if !phase.applies_on(self.current_day) {
                continue;
            }
            self.execute_phase(&phase.actions).await;
            if !matches!(self.should_finish(), Team::None) {
                return;
            }
        }
    }

    async fn execute_phase(&mut self, actions: &[crate::config::ActionKind]) {
        use crate::config::ActionKind;
        for action in actions {
            match action {
                ActionKind::Talk => self.do_talk().await,
                ActionKind::Whisper => self.do_whisper().await,
                ActionKind::Execution => self.do_execution().await,
                ActionKind::Divine => self.do_divine().await,
                ActionKind::Guard => self.do_guard().await,
                ActionKind::Attack => self.do_attack().await,
            }
        }
    }

    /// `requestToAgent` (§4.1, §4.4.6): builds the packet, dispatches it, and
    /// reports the round trip to every sink. Transport errors are swallowed
    /// here — callers that care (votes, talk/whisper) inspect `None`.
    async fn request(&mut self, idx: u32, kind: RequestKind) -> Option<String> {
        let Some(packet) = self.build_packet(idx, kind) else {
            return None;
        };
        let agent_name = self.agents[&idx].game_name.clone();
        self.sinks.track_start_request(&self.id, &agent_name, kind).await;

        let timeouts = self.timeouts();
        let agent = self.agents.get_mut(&idx).expect("idx always valid");
        let result = if kind.requires_response() {
            agent.send(&packet, timeouts).await.ok().flatten()
        } else {
            agent.notify(&packet, timeouts).await;
            None
        };

        self.sinks.track_end_request(&self.id, &agent_name, kind).await;
        result
    }

    fn build_packet(&mut self, idx: u32, kind: RequestKind) -> Option<Packet> {
        if !self.agents.contains_key(&idx) {
            return None;
        }
        if self.agents[&idx].has_error && kind != RequestKind::Name {
            return None;
        }

        Some(match kind {
            RequestKind::Name => Packet::bare(RequestKind::Name),
            RequestKind::Initialize | RequestKind::DailyInitialize => {
                self.last_talk_idx.insert(idx, 0);
                self.last_whisper_idx.insert(idx, 0);
                Packet {
                    request: kind,
                    info: Some(self.build_info(idx, kind)),
                    setting: Some(self.setting.clone()),
                    talk_history: None,
                    whisper_history: None,
                }
            }
            RequestKind::Vote | RequestKind::Divine | RequestKind::Guard => Packet {
                request: kind,
                info: Some(self.build_info(idx, kind)),
                setting: None,
                talk_history: None,
                whisper_history: None,
            },
            RequestKind::DailyFinish | RequestKind::Talk | RequestKind::Whisper | RequestKind::Attack => {
                let info = self.build_info(idx, kind);
                let is_werewolf = self.agents[&idx].role == Role::Werewolf;
                let talk_history = matches!(kind, RequestKind::Talk | RequestKind::DailyFinish)
                    .then(|| self.minimize_talks(idx));
                let whisper_history = (matches!(kind, RequestKind::Whisper | RequestKind::Attack)
                    || (kind == RequestKind::DailyFinish && is_werewolf))
                    .then(|| self.minimize_whispers(idx));
                Packet {
                    request: kind,
                    info: Some(info),
                    setting: None,
                    talk_history,
                    whisper_history,
                }
            }
            RequestKind::Finish => Packet {
                request: kind,
                info: Some(self.build_info(idx, kind)),
                setting: None,
                talk_history: None,
                whisper_history: None,
            },
        })
    }
}

fn build_agent(idx: u32, team_name: String, role: Role, conn: IdentifiedConnection, config: &Config) -> Agent {
    if config.game.custom_profile.enable
        && let Some(profile) = &conn.profile
    {
        Agent::with_profile(idx, team_name, conn.original_name, role, conn.transport, profile)
    } else {
        Agent::new(idx, team_name, conn.original_name, role, conn.transport)
    }
}

/// `assignRole` (§3, §11): pop one count from the role pool; default to
/// `VILLAGER` once the pool is exhausted (a caller bug, not a normal path).
fn assign_role(remaining: &mut HashMap<Role, u32>) -> Role {
    for role in Role::ALL {
        if let Some(count) = remaining.get_mut(&role)
            && *count > 0
        {
            *count -= 1;
            return role;
        }
    }
    warn!("role pool exhausted before agents; defaulting to VILLAGER");
    Role::Villager
}

fn build_setting(config: &Config, agents: &HashMap<u32, Agent>) -> protocol::Setting {
    let mut role_num_map: BTreeMap<Role, u32> = BTreeMap::new();
    for agent in agents.values() {
        *role_num_map.entry(agent.role).or_insert(0) += 1;
    }

    protocol::Setting {
        agent_count: agents.len() as u32,
        max_day: config.game.max_day,
        role_num_map,
        vote_visibility: config.game.vote_visibility,
        talk: talk_setting(&config.game.talk),
        whisper: talk_setting(&config.game.whisper),
        vote: protocol::VoteSetting {
            max_count: config.game.vote.max_count,
            allow_self_vote: config.game.vote.allow_self_vote,
        },
        attack_vote: protocol::AttackVoteSetting {
            max_count: config.game.attack_vote.max_count,
            allow_self_vote: config.game.attack_vote.allow_self_vote,
            allow_no_target: config.game.attack_vote.allow_no_target,
        },
    }
}

fn talk_setting(cfg: &crate::config::TalkConfig) -> protocol::TalkSetting {
    protocol::TalkSetting {
        max_count: protocol::MaxCount {
            per_agent: cfg.max_count.per_agent,
            per_day: cfg.max_count.per_day,
        },
        max_length: protocol::MaxLength {
            per_talk: cfg.max_length.per_talk,
            per_agent: cfg.max_length.per_agent,
            base_length: cfg.max_length.base_length,
            count_in_word: cfg.max_length.count_in_word,
            count_spaces: cfg.max_length.count_spaces,
        },
        max_skip: cfg.max_skip,
    }
}
