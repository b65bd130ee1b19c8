mod auth;
mod handshake;
mod registry;
mod socket;
mod state;

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use engine::config::Config;
use engine::game::Game;
use protocol::{Role, Team};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::socket::AxumSocket;
use crate::state::AppState;

const CONFIG_PATH: &str = "config.yaml";

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let config = Config::load_from_path(CONFIG_PATH)
        .await
        .unwrap_or_else(|e| panic!("failed to load {CONFIG_PATH}: {e}"));
    let host = config.server.socket.host.clone();
    let port = config.server.socket.port;
    let app_state = Arc::new(AppState::new(Arc::new(config)).await);

    let shutdown_state = app_state.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, no longer accepting new connections");
        shutdown_state.stop_accepting();
        shutdown_state.registry.wait_until_drained().await;
        tracing::info!("every tracked game finished, exiting");
        std::process::exit(0);
    });

    let app = Router::new()
        .route("/enlist", get(enlist_handler))
        .route("/reload", get(reload_handler))
        .route("/ws", get(websocket_handler))
        .with_state(app_state)
        .fallback_service(ServeDir::new(".").not_found_service(ServeFile::new("index.html")));

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await.unwrap();
    tracing::info!(host, port, "listening");
    axum::serve(listener, app).await.unwrap();
}

/// Lists every currently-tracked game and its status (§4.5, §11).
async fn enlist_handler(State(state): State<Arc<AppState>>) -> String {
    state.registry.render().await
}

/// Re-reads the recognized config groups without a restart (§4.5, §6.4).
async fn reload_handler(State(state): State<Arc<AppState>>) -> String {
    match state.reload_config(CONFIG_PATH).await {
        Ok(()) => "config reloaded".to_string(),
        Err(e) => format!("config reload failed: {e}"),
    }
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if !state.is_accepting() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down, no new connections accepted").into_response();
    }
    let token = params.get("token").cloned();
    ws.on_upgrade(move |socket| handle_connection(socket, token, state)).into_response()
}

/// Runs the `Name` handshake, parks the connection in the waiting room under
/// its derived team (§4.2, §4.5), then attempts to assemble a game exactly
/// once for this new connection — draining every match that becomes fully
/// covered as a result, since one arrival can complete more than one.
async fn handle_connection(socket: axum::extract::ws::WebSocket, token: Option<String>, state: Arc<AppState>) {
    let boxed: Box<dyn engine::transport::AgentSocket> = Box::new(AxumSocket::new(socket));
    let Some(outcome) = handshake::perform(boxed, token, &state).await else {
        return;
    };

    state.match_optimizer.update_team(&outcome.team_name).await;
    state.waiting_room.add(outcome.team_name, outcome.connection).await;

    while let Some(spawned) = try_start_game(&state).await {
        let game_state = state.clone();
        tokio::spawn(async move { run_game(game_state, spawned).await });
    }
}

struct SpawnedGame {
    game: Game,
    /// `None` for self-match/cross-team games, which have no Match Optimizer
    /// schedule entry to report back to.
    assignment: Option<HashMap<Role, Vec<u32>>>,
}

/// Picks the matching policy configured in `matching.is_optimize` (§4.5):
/// schedule-driven role assignment when enabled, otherwise the plain
/// self-match-or-cross-team waiting room draw with roles assigned in-game.
async fn try_start_game(state: &Arc<AppState>) -> Option<SpawnedGame> {
    let config = state.config().await;

    if config.matching.is_optimize {
        return try_start_scheduled_game(state, &config).await;
    }

    let agent_count = config.game.agent_count as usize;
    let taken = if config.matching.self_match {
        state.waiting_room.take_self_match(agent_count).await.ok()?
    } else {
        state.waiting_room.take_cross_team(agent_count).await.ok()?
    };

    let game_id = uuid::Uuid::now_v7().to_string();
    state.registry.register(game_id.clone(), agent_count as u32).await;
    let game = Game::new(game_id, taken, config, state.build_sinks());
    Some(SpawnedGame { game, assignment: None })
}

async fn try_start_scheduled_game(state: &Arc<AppState>, config: &Arc<Config>) -> Option<SpawnedGame> {
    let candidates = state.match_optimizer.get_matches().await.ok()?;
    if candidates.is_empty() {
        return None;
    }
    let idx_team_map = state.match_optimizer.idx_team_map().await;
    let by_role = state.waiting_room.take_from_schedule(&candidates, &idx_team_map).await.ok()?;

    let name_to_idx: HashMap<&str, u32> = idx_team_map.iter().map(|(idx, name)| (name.as_str(), *idx)).collect();
    let assignment: HashMap<Role, Vec<u32>> = by_role
        .iter()
        .map(|(role, conns)| {
            let idxs = conns.iter().filter_map(|(team, _)| name_to_idx.get(team.as_str()).copied()).collect();
            (*role, idxs)
        })
        .collect();

    let game_id = uuid::Uuid::now_v7().to_string();
    state.registry.register(game_id.clone(), config.game.agent_count).await;
    let game = Game::new_with_role(game_id, by_role, config.clone(), state.build_sinks());
    Some(SpawnedGame { game, assignment: Some(assignment) })
}

/// Drives one game to completion and reports the outcome back to the Match
/// Optimizer (§4.3): a decisive winner ends the schedule entry, an abort
/// zeroes its weight instead of deleting it.
async fn run_game(state: Arc<AppState>, mut spawned: SpawnedGame) {
    let game_id = spawned.game.id().to_string();
    let winner = spawned.game.start().await;
    state.registry.mark_finished(&game_id, winner).await;

    let Some(assignment) = spawned.assignment else {
        return;
    };
    let result = match winner {
        Team::Villager | Team::Werewolf => state.match_optimizer.set_match_end(&assignment).await,
        Team::None => state.match_optimizer.set_match_weight(&assignment, 0.0).await,
    };
    if let Err(e) = result {
        tracing::warn!(game_id, error = %e, "failed to report match outcome to the match optimizer");
    }
}
