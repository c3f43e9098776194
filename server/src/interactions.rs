//! Discord interactions endpoint.
//!
//! Discord signs every interaction with the application's Ed25519 key;
//! requests that fail verification get a 401 so Discord's endpoint
//! validation passes. Pings are echoed back, and the `accuse` slash
//! command stages a pending case for the channel so the next courtroom
//! connection opens it.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ed25519_dalek::{Signature, VerifyingKey};
use log::{info, warn};
use serde_json::{json, Value};

use shared::{Accused, PendingCase, UNKNOWN_USERNAME};

use crate::network::AppState;

const INTERACTION_PING: u64 = 1;
const INTERACTION_APPLICATION_COMMAND: u64 = 2;

const RESPONSE_PONG: u64 = 1;
const RESPONSE_CHANNEL_MESSAGE: u64 = 4;

/// Checks a detached Ed25519 signature over `timestamp || body`.
pub fn verify_signature(
    public_key_hex: &str,
    signature_hex: &str,
    timestamp: &str,
    body: &[u8],
) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };

    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);
    key.verify_strict(&message, &signature).is_ok()
}

pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get("x-signature-ed25519")
        .and_then(|v| v.to_str().ok());
    let timestamp = headers
        .get("x-signature-timestamp")
        .and_then(|v| v.to_str().ok());
    let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
        return unauthorized();
    };
    if !verify_signature(&state.config.public_key, signature, timestamp, &body) {
        return unauthorized();
    }

    let interaction: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!("Unparseable interaction payload: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match interaction["type"].as_u64() {
        Some(INTERACTION_PING) => Json(json!({ "type": RESPONSE_PONG })).into_response(),
        Some(INTERACTION_APPLICATION_COMMAND) => handle_command(&state, &interaction).await,
        other => {
            warn!("Unsupported interaction type {:?}", other);
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn handle_command(state: &AppState, interaction: &Value) -> Response {
    let name = interaction["data"]["name"].as_str().unwrap_or_default();
    if name != "accuse" {
        warn!("Unknown command {:?}", name);
        return StatusCode::BAD_REQUEST.into_response();
    }

    let Some(case) = parse_accusation(&interaction["data"]) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(channel_id) = interaction["channel_id"].as_str() else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    info!(
        "Slash command: {} accused in channel {}",
        case.accused.username, channel_id
    );
    let accused = case.accused.username.clone();
    let crime = case.crime.clone();
    state.registry.stage_case(channel_id, case).await;

    Json(json!({
        "type": RESPONSE_CHANNEL_MESSAGE,
        "data": {
            "embeds": [{
                "title": "CASE FILED",
                "description": format!("**{}** stands accused of: {}", accused, crime),
                "color": 0xFF0000,
                "footer": { "text": "Launch Karma Court to begin the trial." }
            }]
        }
    }))
    .into_response()
}

/// Pulls the accused user and charge out of the command options,
/// resolving the username and avatar when Discord provides them.
fn parse_accusation(data: &Value) -> Option<PendingCase> {
    let options = data["options"].as_array()?;
    let mut user_id = None;
    let mut reason = None;
    for option in options {
        match option["name"].as_str() {
            Some("user") => user_id = option["value"].as_str(),
            Some("reason") => reason = option["value"].as_str(),
            _ => {}
        }
    }
    let user_id = user_id?;
    let crime = reason.unwrap_or("Unspecified Crimes").to_string();

    let resolved = &data["resolved"]["users"][user_id];
    let username = resolved["username"]
        .as_str()
        .unwrap_or(UNKNOWN_USERNAME)
        .to_string();
    let avatar = resolved["avatar"].as_str().map(|hash| {
        format!("https://cdn.discordapp.com/avatars/{}/{}.png", user_id, hash)
    });

    Some(PendingCase {
        accused: Accused {
            id: Some(user_id.to_string()),
            username,
            avatar,
        },
        crime,
    })
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "invalid request signature").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn test_key() -> (SigningKey, String) {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let public_hex = hex::encode(signing.verifying_key().to_bytes());
        (signing, public_hex)
    }

    fn sign(signing: &SigningKey, timestamp: &str, body: &[u8]) -> String {
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body);
        hex::encode(signing.sign(&message).to_bytes())
    }

    #[test]
    fn valid_signature_verifies() {
        let (signing, public_hex) = test_key();
        let body = br#"{"type":1}"#;
        let signature = sign(&signing, "1700000000", body);
        assert!(verify_signature(&public_hex, &signature, "1700000000", body));
    }

    #[test]
    fn tampered_timestamp_fails() {
        let (signing, public_hex) = test_key();
        let body = br#"{"type":1}"#;
        let signature = sign(&signing, "1700000000", body);
        assert!(!verify_signature(&public_hex, &signature, "1700000001", body));
    }

    #[test]
    fn malformed_inputs_fail_closed() {
        let (_, public_hex) = test_key();
        assert!(!verify_signature("not hex", "aa", "0", b""));
        assert!(!verify_signature(&public_hex, "not hex", "0", b""));
        assert!(!verify_signature("aabb", "aa", "0", b""));
    }

    #[test]
    fn accusation_resolves_user_and_avatar() {
        let data = json!({
            "name": "accuse",
            "options": [
                { "name": "user", "value": "42" },
                { "name": "reason", "value": "Eating the last slice" }
            ],
            "resolved": {
                "users": {
                    "42": { "username": "Bob", "avatar": "abc123" }
                }
            }
        });

        let case = parse_accusation(&data).unwrap();
        assert_eq!(case.accused.id.as_deref(), Some("42"));
        assert_eq!(case.accused.username, "Bob");
        assert_eq!(
            case.accused.avatar.as_deref(),
            Some("https://cdn.discordapp.com/avatars/42/abc123.png")
        );
        assert_eq!(case.crime, "Eating the last slice");
    }

    #[test]
    fn accusation_defaults_for_unresolved_user() {
        let data = json!({
            "name": "accuse",
            "options": [{ "name": "user", "value": "42" }]
        });

        let case = parse_accusation(&data).unwrap();
        assert_eq!(case.accused.username, UNKNOWN_USERNAME);
        assert!(case.accused.avatar.is_none());
        assert_eq!(case.crime, "Unspecified Crimes");
    }

    #[test]
    fn accusation_without_user_is_rejected() {
        let data = json!({
            "name": "accuse",
            "options": [{ "name": "reason", "value": "vibes" }]
        });
        assert!(parse_accusation(&data).is_none());
    }
}
