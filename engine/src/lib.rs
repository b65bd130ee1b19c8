//! The werewolf dialog-game engine: phase state machine, agent transport,
//! waiting-room matchmaking, and the event-sink push interface.
//!
//! Socket-agnostic by design: the concrete [`transport::AgentSocket`]
//! implementation (a real websocket, or an in-memory pair for tests) lives
//! outside this crate.

pub mod agent;
pub mod config;
pub mod error;
pub mod game;
pub mod game_status;
pub mod match_optimizer;
pub mod sinks;
pub mod transport;
pub mod util;
pub mod waiting_room;

pub use game::Game;
