//! Wire types shared between the game engine and the agent-facing socket layer.
//!
//! One text message is one JSON document; framing and newline-stripping are
//! the transport's job, not this crate's. Everything here is plain data: no
//! connection handles, no timeouts, no I/O.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod role;

pub use role::{Role, Species, Team};

/// A request kind the server can issue to an agent. Exactly the seven
/// response-bearing kinds in [`RequestKind::requires_response`] expect a
/// textual reply; the rest are fire-and-forget notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Name,
    Initialize,
    DailyInitialize,
    DailyFinish,
    Vote,
    Talk,
    Whisper,
    Attack,
    Divine,
    Guard,
    Finish,
}

impl RequestKind {
    /// Whether the agent is expected to answer with a single line of text.
    pub fn requires_response(self) -> bool {
        matches!(
            self,
            RequestKind::Name
                | RequestKind::Vote
                | RequestKind::Talk
                | RequestKind::Whisper
                | RequestKind::Attack
                | RequestKind::Divine
                | RequestKind::Guard
        )
    }
}

/// Alive/dead status of an agent within a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Alive,
    Dead,
}

/// A single talk or whisper utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Talk {
    pub idx: u32,
    pub day: u32,
    pub turn: u32,
    pub agent: String,
    pub text: String,
}

/// A vote, attack-vote, or any other `(day, agent, target)` action record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub day: u32,
    pub agent: String,
    pub target: String,
}

/// A divination or medium result: `(day, agent, target, species)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judge {
    pub day: u32,
    pub agent: String,
    pub target: String,
    pub result: Species,
}

/// A bodyguard's nightly protection assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    pub day: u32,
    pub agent: String,
    pub target: String,
}

/// Per-recipient, redacted view of game state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    pub game_id: String,
    pub day: u32,
    pub agent: String,
    pub status_map: BTreeMap<String, Status>,
    pub role_map: BTreeMap<String, Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium_result: Option<Judge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divine_result: Option<Judge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attacked_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_list: Option<Vec<Vote>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_vote_list: Option<Vec<Vote>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remain_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remain_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remain_skip: Option<i64>,
}

/// The client-visible subset of the server's configuration, sent on
/// `Initialize`/`DailyInitialize` so agents know the rules they're playing under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub agent_count: u32,
    pub max_day: Option<u32>,
    pub role_num_map: BTreeMap<Role, u32>,
    pub vote_visibility: bool,
    pub talk: TalkSetting,
    pub whisper: TalkSetting,
    pub vote: VoteSetting,
    pub attack_vote: AttackVoteSetting,
}

/// The length/count/skip budgets for one communication phase (talk or whisper).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkSetting {
    pub max_count: MaxCount,
    pub max_length: MaxLength,
    pub max_skip: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxCount {
    pub per_agent: i64,
    pub per_day: u32,
}

/// At most one of `count_in_word` / `count_spaces` may be set; both false
/// selects the third mode (code points, whitespace included).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxLength {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_talk: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_agent: Option<i64>,
    pub base_length: i64,
    pub count_in_word: bool,
    pub count_spaces: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteSetting {
    pub max_count: u32,
    pub allow_self_vote: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackVoteSetting {
    pub max_count: u32,
    pub allow_self_vote: bool,
    pub allow_no_target: bool,
}

/// Server -> agent envelope. Exactly the fields relevant to `request` are
/// populated; everything else is omitted from the wire representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub request: RequestKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Info>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setting: Option<Setting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talk_history: Option<Vec<Talk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whisper_history: Option<Vec<Talk>>,
}

impl Packet {
    /// A bare request with no payload, e.g. the `Name` probe.
    pub fn bare(request: RequestKind) -> Self {
        Packet {
            request,
            info: None,
            setting: None,
            talk_history: None,
            whisper_history: None,
        }
    }
}

/// The three sentinel utterances a talk/whisper response may carry.
pub const SENTINEL_SKIP: &str = "Skip";
pub const SENTINEL_OVER: &str = "Over";
pub const SENTINEL_FORCE_SKIP: &str = "ForceSkip";

/// A realtime spectator event, pushed by the engine to the broadcaster sink.
/// The shape and the `idx` counter discipline are specified; an actual
/// spectator transport is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastPacket {
    pub id: String,
    pub idx: u64,
    pub day: u32,
    pub is_day: bool,
    pub agents: Vec<BroadcastAgent>,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_idx: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_idx: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bubble_idx: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastAgent {
    pub idx: u32,
    pub team: String,
    pub name: String,
    pub is_alive: bool,
}
