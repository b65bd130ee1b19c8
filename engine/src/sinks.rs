//! Event Sinks (§4.6): a narrow push interface the engine calls at every
//! observable transition. The engine is oblivious to which sinks are
//! attached and never lets a sink failure abort a game.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use protocol::{BroadcastPacket, RequestKind};
use tokio::sync::Mutex;
use tracing::{info_span, warn};

/// Implemented by every concrete sink. Every method has a no-op default so a
/// sink only needs to override what it actually tracks.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn track_start_game(&self, _game_id: &str) {}
    async fn track_end_game(&self, _game_id: &str, _winner: protocol::Team) {}
    async fn track_start_request(&self, _game_id: &str, _agent: &str, _request: RequestKind) {}
    async fn track_end_request(&self, _game_id: &str, _agent: &str, _request: RequestKind) {}
    async fn append_log(&self, _game_id: &str, _line: &str) {}
    async fn broadcast(&self, _packet: &BroadcastPacket) {}
}

/// Calls every attached sink, swallowing nothing but never propagating a
/// sink failure into the game task (there is nothing to propagate: every
/// sink method is infallible by construction).
#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        SinkRegistry { sinks: Vec::new() }
    }

    pub fn attach(&mut self, sink: std::sync::Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub async fn track_start_game(&self, game_id: &str) {
        for sink in &self.sinks {
            sink.track_start_game(game_id).await;
        }
    }

    pub async fn track_end_game(&self, game_id: &str, winner: protocol::Team) {
        for sink in &self.sinks {
            sink.track_end_game(game_id, winner).await;
        }
    }

    pub async fn track_start_request(&self, game_id: &str, agent: &str, request: RequestKind) {
        for sink in &self.sinks {
            sink.track_start_request(game_id, agent, request).await;
        }
    }

    pub async fn track_end_request(&self, game_id: &str, agent: &str, request: RequestKind) {
        for sink in &self.sinks {
            sink.track_end_request(game_id, agent, request).await;
        }
    }

    pub async fn append_log(&self, game_id: &str, line: &str) {
        for sink in &self.sinks {
            sink.append_log(game_id, line).await;
        }
    }

    pub async fn broadcast(&self, packet: &BroadcastPacket) {
        for sink in &self.sinks {
            sink.broadcast(packet).await;
        }
    }
}

/// Request tracer sink: emits `tracing` spans rather than writing a file.
/// Not a bulk structured logger in the Non-goal sense (§1) — just the
/// ambient observability the design requires of every request round trip.
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn track_start_request(&self, game_id: &str, agent: &str, request: RequestKind) {
        let _span = info_span!("agent_request", game_id, agent, ?request).entered();
        tracing::debug!("request started");
    }

    async fn track_end_request(&self, game_id: &str, agent: &str, request: RequestKind) {
        tracing::debug!(game_id, agent, ?request, "request finished");
    }
}

/// CSV-line game log: buffers lines per game in memory, rewrites the whole
/// file on every append and at `track_end_game` — the source's naive
/// "rewrite the whole buffer" behavior, acceptable at this scale (§11).
pub struct GameLogSink {
    output_dir: PathBuf,
    filename_template: String,
    buffers: Mutex<HashMap<String, Vec<String>>>,
}

impl GameLogSink {
    pub fn new(output_dir: PathBuf, filename_template: String) -> Self {
        GameLogSink {
            output_dir,
            filename_template,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    fn filename_for(&self, game_id: &str) -> PathBuf {
        let name = self.filename_template.replace("{game_id}", game_id);
        self.output_dir.join(format!("{name}.csv"))
    }

    async fn flush(&self, game_id: &str, lines: &[String]) {
        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            warn!(game_id, error = %e, "failed to create game log output directory");
            return;
        }
        let path = self.filename_for(game_id);
        if let Err(e) = tokio::fs::write(&path, lines.join("\n")).await {
            warn!(game_id, path = %path.display(), error = %e, "failed to write game log");
        }
    }
}

#[async_trait]
impl EventSink for GameLogSink {
    async fn append_log(&self, game_id: &str, line: &str) {
        let mut buffers = self.buffers.lock().await;
        let entry = buffers.entry(game_id.to_string()).or_default();
        entry.push(line.to_string());
        let snapshot = entry.clone();
        drop(buffers);
        self.flush(game_id, &snapshot).await;
    }

    async fn track_end_game(&self, game_id: &str, _winner: protocol::Team) {
        let mut buffers = self.buffers.lock().await;
        if let Some(lines) = buffers.remove(game_id) {
            drop(buffers);
            self.flush(game_id, &lines).await;
        }
    }
}

/// Spectator event broadcaster: fans out [`BroadcastPacket`]s to any
/// listener. A real spectator transport is out of scope (§1); this is the
/// push interface the engine calls.
pub struct RealtimeBroadcasterSink {
    sender: tokio::sync::broadcast::Sender<BroadcastPacket>,
}

impl RealtimeBroadcasterSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = tokio::sync::broadcast::channel(capacity);
        RealtimeBroadcasterSink { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BroadcastPacket> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for RealtimeBroadcasterSink {
    async fn broadcast(&self, packet: &BroadcastPacket) {
        let _ = self.sender.send(packet.clone());
    }
}

/// TTS sink: consumes `(game_id, text, voice_id)` — audio rendering itself
/// is out of scope (§1); this is a logging stub standing in for it.
pub struct TtsSink {
    pub voice_id: String,
}

#[async_trait]
impl EventSink for TtsSink {
    async fn append_log(&self, game_id: &str, line: &str) {
        tracing::trace!(game_id, voice_id = %self.voice_id, line, "tts sink received text (rendering is out of scope)");
    }
}
