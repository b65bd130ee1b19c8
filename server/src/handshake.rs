//! The `Name` handshake (§4.5): a fresh connection announces its name before
//! it can be queued, and the name's trailing digits are stripped to recover
//! the team it belongs to.

use std::time::Duration;

use engine::agent::{IdentifiedConnection, derive_team_name, name_request};
use engine::transport::AgentSocket;
use tracing::warn;

use crate::auth::verify_player_token;
use crate::state::AppState;

pub struct HandshakeOutcome {
    pub team_name: String,
    pub connection: IdentifiedConnection,
}

/// Runs the `Name` round trip directly on the raw socket (there is no
/// [`engine::agent::Agent`] yet to own a `has_error` flag) and, if
/// authentication is enabled, validates the caller's token against the
/// derived team name.
pub async fn perform(mut socket: Box<dyn AgentSocket>, token: Option<String>, state: &AppState) -> Option<HandshakeOutcome> {
    let config = state.config().await;

    let request = name_request();
    let encoded = serde_json::to_string(&request).expect("bare packet always serializes");
    if let Err(e) = socket.send_line(encoded).await {
        warn!(error = %e, "failed to send Name request during handshake");
        return None;
    }

    let response = tokio::time::timeout(Duration::from_millis(config.server.timeout.action_ms), socket.recv_line()).await;
    let original_name = match response {
        Ok(Some(line)) => line.trim_end_matches(['\n', '\r']).to_string(),
        Ok(None) => {
            warn!("socket closed before Name handshake completed");
            return None;
        }
        Err(_) => {
            warn!("Name handshake timed out");
            return None;
        }
    };
    if original_name.is_empty() {
        warn!("empty name offered during handshake");
        return None;
    }

    let team_name = derive_team_name(&original_name);

    if config.server.authentication.enable {
        let Some(token) = token else {
            warn!(team = team_name, "authentication required but no token supplied");
            return None;
        };
        if let Err(e) = verify_player_token(&token, &config.server.authentication.secret_key, &team_name) {
            warn!(team = team_name, error = %e, "token rejected");
            return None;
        }
    }

    let transport = engine::transport::AgentTransport::new(socket);
    Some(HandshakeOutcome {
        team_name,
        connection: IdentifiedConnection {
            original_name,
            profile: None,
            transport,
        },
    })
}
