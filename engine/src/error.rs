//! Error kinds for the three crate seams: transport, waiting room, match optimizer.
//!
//! Every kind here maps to one row of the error table in the design: some are
//! fatal to a single agent (`has_error` gets set), one is explicitly non-fatal
//! (`ResponseTimeout`), and the rest are local to the component that raises them.
//! Nothing here ever unwinds across a game boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("write to agent socket failed: {0}")]
    TransportWrite(String),
    #[error("agent socket closed")]
    TransportClosed,
    /// Not fatal: the original request was lost but the liveness probe
    /// confirmed the agent is still alive.
    #[error("response timed out, but agent answered the liveness probe")]
    ResponseTimeout,
    #[error("liveness probe timed out")]
    LivenessTimeout,
    #[error("liveness probe returned an unexpected name")]
    ProtocolViolation,
    #[error("agent is disabled after a prior transport failure")]
    AgentDisabled,
}

impl TransportError {
    /// Whether this outcome should set the agent's sticky `has_error` flag.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::ResponseTimeout | TransportError::AgentDisabled)
    }
}

#[derive(Debug, Error)]
pub enum WaitingRoomError {
    #[error("no candidate match is fully covered by the waiting room")]
    NoEligibleMatch,
    #[error("not enough connections waiting to start a game")]
    NotReady,
}

#[derive(Debug, Error)]
pub enum MatchOptimizerError {
    #[error("no candidate schedule could be generated")]
    ScheduleEmpty,
    #[error("failed to persist match optimizer state: {0}")]
    Persist(#[from] std::io::Error),
    #[error("failed to (de)serialize match optimizer state: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}
