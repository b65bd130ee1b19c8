//! Shared application state (§4.2, §4.3, §6.4): the waiting room, the match
//! optimizer, the sink template new games are spawned with, and the registry
//! of currently-running games used by the introspection routes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use engine::agent::IdentifiedConnection;
use engine::config::Config;
use engine::match_optimizer::MatchOptimizer;
use engine::sinks::{GameLogSink, RealtimeBroadcasterSink, SinkRegistry, TracingSink, TtsSink};
use engine::waiting_room::WaitingRoom;
use protocol::Role;
use tokio::sync::RwLock;

use crate::registry::GameRegistry;

pub struct AppState {
    /// Swapped out wholesale by the `/reload` route (§4.5); readers clone the
    /// `Arc` out from under the lock rather than holding it across an await.
    config: RwLock<Arc<Config>>,
    pub waiting_room: WaitingRoom<IdentifiedConnection>,
    pub match_optimizer: MatchOptimizer,
    tracing_sink: Option<Arc<TracingSink>>,
    game_log_sink: Option<Arc<GameLogSink>>,
    pub realtime_broadcaster: Option<Arc<RealtimeBroadcasterSink>>,
    tts_sink: Option<Arc<TtsSink>>,
    pub registry: GameRegistry,
    /// Monotone one-shot (§5): once cleared, `/ws` rejects new upgrades.
    accepting: AtomicBool,
}

impl AppState {
    pub async fn new(config: Arc<Config>) -> Self {
        let role_num_map = config
            .logic
            .roles
            .get(&config.game.agent_count)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(|(name, count)| Role::from_name(name).map(|r| (r, *count)))
                    .collect::<std::collections::HashMap<Role, u32>>()
            })
            .unwrap_or_default();

        let match_optimizer = MatchOptimizer::new(
            config.matching.output_path.clone().into(),
            config.matching.team_count,
            config.matching.game_count,
            role_num_map,
            config.matching.infinite_loop,
        )
        .await
        .expect("match optimizer state must load or generate cleanly at startup");

        let tracing_sink = config.json_logger.enable.then(|| Arc::new(TracingSink));
        let game_log_sink = Some(Arc::new(GameLogSink::new(
            config.game_log.output_dir.clone().into(),
            config.game_log.filename_template.clone(),
        )));
        let realtime_broadcaster = config.realtime_broadcaster.enable.then(|| Arc::new(RealtimeBroadcasterSink::new(256)));
        let tts_sink = config.tts_broadcaster.enable.then(|| {
            Arc::new(TtsSink {
                voice_id: config.tts_broadcaster.voice_id.clone(),
            })
        });

        AppState {
            config: RwLock::new(config),
            waiting_room: WaitingRoom::new(),
            match_optimizer,
            tracing_sink,
            game_log_sink,
            realtime_broadcaster,
            tts_sink,
            registry: GameRegistry::new(),
            accepting: AtomicBool::new(true),
        }
    }

    /// A snapshot of the live config, cheap to clone out from under the lock.
    pub async fn config(&self) -> Arc<Config> {
        self.config.read().await.clone()
    }

    /// Re-reads `path` and, if it parses, swaps it in wholesale (§4.5
    /// `/reload`). The socket/auth/timeout/matching groups are fixed at
    /// startup (the match optimizer and sinks are already constructed from
    /// them); this only affects config readers that ask for a fresh snapshot
    /// afterward, i.e. the game/logic rules applied to newly-spawned games.
    pub async fn reload_config(&self, path: &str) -> Result<(), engine::error::ConfigError> {
        let fresh = Config::load_from_path(path).await?;
        *self.config.write().await = Arc::new(fresh);
        Ok(())
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    /// Builds a fresh sink registry from the configured toggles (§4.6) for one
    /// spawned game, fanning out to the same underlying sinks every other
    /// game shares.
    pub fn build_sinks(&self) -> SinkRegistry {
        let mut sinks = SinkRegistry::new();
        if let Some(sink) = &self.tracing_sink {
            sinks.attach(sink.clone());
        }
        if let Some(sink) = &self.game_log_sink {
            sinks.attach(sink.clone());
        }
        if let Some(sink) = &self.realtime_broadcaster {
            sinks.attach(sink.clone());
        }
        if let Some(sink) = &self.tts_sink {
            sinks.attach(sink.clone());
        }
        sinks
    }
}
