//! Agent (§3): one seat in a game, bound 1:1 to a live socket for its lifetime.

use protocol::{Packet, RequestKind, Role};

use crate::error::TransportError;
use crate::transport::{AgentTransport, Timeouts};

/// An optional per-agent descriptor replacing the default zero-padded display
/// name (§3, §11 "custom agent profiles"). Gated by `game.custom_profile.enable`.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub voice_id: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub personality: Option<String>,
}

impl Profile {
    /// A newline-joined `"field: value"` rendering of every non-empty field,
    /// delivered to the agent itself and never to opponents.
    fn description(&self) -> String {
        let mut lines = Vec::new();
        if let Some(v) = &self.avatar_url {
            lines.push(format!("avatar_url: {v}"));
        }
        if let Some(v) = &self.voice_id {
            lines.push(format!("voice_id: {v}"));
        }
        if let Some(v) = &self.age {
            lines.push(format!("age: {v}"));
        }
        if let Some(v) = &self.gender {
            lines.push(format!("gender: {v}"));
        }
        if let Some(v) = &self.personality {
            lines.push(format!("personality: {v}"));
        }
        lines.join("\n")
    }
}

pub struct Agent {
    pub idx: u32,
    pub team_name: String,
    pub original_name: String,
    pub game_name: String,
    pub profile_description: Option<String>,
    pub role: Role,
    pub has_error: bool,
    transport: AgentTransport,
}

impl Agent {
    pub fn new(idx: u32, team_name: String, original_name: String, role: Role, transport: AgentTransport) -> Self {
        Agent {
            idx,
            team_name,
            original_name,
            game_name: format!("Agent[{idx:02}]"),
            profile_description: None,
            role,
            has_error: false,
            transport,
        }
    }

    pub fn with_profile(
        idx: u32,
        team_name: String,
        original_name: String,
        role: Role,
        transport: AgentTransport,
        profile: &Profile,
    ) -> Self {
        let game_name = profile
            .name
            .clone()
            .unwrap_or_else(|| format!("Agent[{idx:02}]"));
        let profile_description = Some(profile.description()).filter(|d| !d.is_empty());
        Agent {
            idx,
            team_name,
            original_name,
            game_name,
            profile_description,
            role,
            has_error: false,
            transport,
        }
    }

    /// Delivers `packet`, returning the response if one is required. See
    /// [`AgentTransport::send`] for the full timeout/probe state machine.
    pub async fn send(&mut self, packet: &Packet, timeouts: Timeouts) -> Result<Option<String>, TransportError> {
        self.transport
            .send(packet, &self.original_name, &mut self.has_error, timeouts)
            .await
    }

    /// Fire-and-forget variant for requests that never expect a response
    /// (`Initialize`, `DailyInitialize`, `DailyFinish`, `Finish`). Transport
    /// failures only mark `has_error`; nothing propagates.
    pub async fn notify(&mut self, packet: &Packet, timeouts: Timeouts) {
        debug_assert!(!packet.request.requires_response());
        let _ = self.send(packet, timeouts).await;
    }

    /// Closed exactly once at game end (§3 lifecycle).
    pub async fn close(&mut self) {
        self.transport.close().await;
    }

    pub fn is_alive(&self, status: crate::game_status::Status) -> bool {
        status == crate::game_status::Status::Alive
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.game_name)
    }
}

/// Derive a team name from an agent's self-reported `Name` response by
/// stripping trailing ASCII digits (§4.5, Glossary).
pub fn derive_team_name(original_name: &str) -> String {
    original_name.trim_end_matches(|c: char| c.is_ascii_digit()).to_string()
}

/// Issues the `Name` handshake request used both at connection time and as
/// the liveness probe.
pub fn name_request() -> Packet {
    Packet::bare(RequestKind::Name)
}

/// A socket that has already completed the `Name` handshake (§4.5) and is
/// sitting in a [`crate::waiting_room::WaitingRoom`] queue, waiting to be
/// claimed by a game. Team name is tracked separately by the waiting room
/// queue it sits in, not stored redundantly here.
pub struct IdentifiedConnection {
    pub original_name: String,
    pub profile: Option<Profile>,
    pub transport: AgentTransport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_digits() {
        assert_eq!(derive_team_name("TeamAlpha1"), "TeamAlpha");
        assert_eq!(derive_team_name("TeamAlpha"), "TeamAlpha");
        assert_eq!(derive_team_name("Bot42"), "Bot");
    }

    #[test]
    fn profile_description_omits_empty_fields() {
        let profile = Profile {
            name: Some("Aria".to_string()),
            personality: Some("calm".to_string()),
            ..Default::default()
        };
        assert_eq!(profile.description(), "personality: calm");
    }
}
