//! Optional PLAYER-token authentication (§4.5, §6.4 `server.authentication`).
//!
//! Disabled by default. When enabled, the `Name` handshake is followed by an
//! HMAC-signed token whose `team_name` claim must match the team derived
//! from the agent's self-reported name, and whose `role` claim must be
//! `PLAYER`.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Claims {
    pub team_name: String,
    pub role: String,
    #[allow(dead_code)]
    pub exp: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token is malformed or its signature does not verify: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("token does not authorize team {expected:?} (claims team {actual:?})")]
    TeamMismatch { expected: String, actual: String },
    #[error("token role {0:?} is not PLAYER")]
    WrongRole(String),
}

/// Verifies `token` against `secret_key` and that its claims authorize
/// `expected_team` as a PLAYER.
pub fn verify_player_token(token: &str, secret_key: &str, expected_team: &str) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret_key.as_bytes()), &Validation::default())?;
    let claims = data.claims;
    if claims.role != "PLAYER" {
        return Err(AuthError::WrongRole(claims.role));
    }
    if claims.team_name != expected_team {
        return Err(AuthError::TeamMismatch {
            expected: expected_team.to_string(),
            actual: claims.team_name,
        });
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token_for(team_name: &str, role: &str, secret: &str) -> String {
        let claims = serde_json::json!({
            "team_name": team_name,
            "role": role,
            "exp": 9_999_999_999_u64,
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn matching_team_and_role_verifies() {
        let token = token_for("TeamAlpha", "PLAYER", "secret");
        assert!(verify_player_token(&token, "secret", "TeamAlpha").is_ok());
    }

    #[test]
    fn mismatched_team_is_rejected() {
        let token = token_for("TeamAlpha", "PLAYER", "secret");
        assert!(matches!(verify_player_token(&token, "secret", "TeamBeta"), Err(AuthError::TeamMismatch { .. })));
    }

    #[test]
    fn wrong_role_is_rejected() {
        let token = token_for("TeamAlpha", "RECEIVER", "secret");
        assert!(matches!(verify_player_token(&token, "secret", "TeamAlpha"), Err(AuthError::WrongRole(_))));
    }
}
