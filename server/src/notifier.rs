//! Outbound courtroom notifications to a Discord channel.
//!
//! Every send is fire-and-forget: the room never waits on, and never
//! observes a failure from, the notifier. Failures are logged and
//! dropped. The room talks to the [`Notifier`] trait so tests can swap
//! in a recording double.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde_json::json;
use shared::{Evidence, RoomState, Verdict};

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_AVATAR_URL: &str = "https://cdn.discordapp.com/embed/avatars/0.png";

/// Courtroom events pushed out to the room's channel.
pub trait Notifier: Send + Sync {
    fn case_started(&self, channel_id: &str, state: &RoomState);
    fn witness_called(&self, channel_id: &str, state: &RoomState);
    fn objection(&self, channel_id: &str, username: &str);
    fn verdict_reached(&self, channel_id: &str, state: &RoomState);
    fn evidence_submitted(&self, channel_id: &str, item: &Evidence);
}

/// Posts rich embeds to Discord channel message endpoints.
pub struct DiscordNotifier {
    bot_token: Option<String>,
    http: reqwest::Client,
    base_url: String,
}

impl DiscordNotifier {
    pub fn new(bot_token: Option<String>) -> Self {
        Self {
            bot_token,
            http: reqwest::Client::new(),
            base_url: DISCORD_API_BASE.to_string(),
        }
    }

    /// Pseudo-random docket number derived from the clock.
    fn case_number() -> String {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!("CASE-{:04}", secs % 10_000)
    }

    /// Queues one embed for delivery on a background task.
    fn post_embed(&self, channel_id: &str, embed: serde_json::Value) {
        let Some(token) = self.bot_token.clone() else {
            debug!("Notifier disabled (no bot token); dropping embed");
            return;
        };

        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let http = self.http.clone();
        let channel = channel_id.to_string();

        tokio::spawn(async move {
            let result = http
                .post(&url)
                .header("Authorization", format!("Bot {}", token))
                .json(&json!({ "embeds": [embed] }))
                .send()
                .await;

            match result {
                Ok(resp) if !resp.status().is_success() => {
                    warn!(
                        "Embed rejected by channel {}: HTTP {}",
                        channel,
                        resp.status()
                    );
                }
                Ok(_) => debug!("Embed delivered to channel {}", channel),
                Err(e) => warn!("Failed to deliver embed to channel {}: {}", channel, e),
            }
        });
    }
}

impl Notifier for DiscordNotifier {
    fn case_started(&self, channel_id: &str, state: &RoomState) {
        let avatar = state
            .accused
            .avatar
            .as_deref()
            .unwrap_or(DEFAULT_AVATAR_URL);
        let crime = if state.crime.is_empty() {
            "Unspecified Crimes"
        } else {
            &state.crime
        };

        self.post_embed(
            channel_id,
            json!({
                "title": "THE HIGH COURT IS IN SESSION",
                "description": format!(
                    "The court will now hear the case of **{}**.",
                    state.accused.username
                ),
                "color": 0xFF00FF,
                "fields": [
                    { "name": "The Accused", "value": state.accused.username, "inline": true },
                    { "name": "Case Number", "value": Self::case_number(), "inline": true },
                    { "name": "The Charge", "value": crime, "inline": false },
                ],
                "thumbnail": { "url": avatar },
                "footer": { "text": "Karma Court \u{2022} Justice In Real-Time" },
            }),
        );
    }

    fn witness_called(&self, channel_id: &str, state: &RoomState) {
        let witness = state.witness.username.as_deref().unwrap_or("Unknown");
        self.post_embed(
            channel_id,
            json!({
                "title": "A WITNESS TAKES THE STAND",
                "description": format!("**{}** has been called to testify.", witness),
                "color": 0x00AAFF,
                "footer": { "text": "Karma Court \u{2022} Justice In Real-Time" },
            }),
        );
    }

    fn objection(&self, channel_id: &str, username: &str) {
        self.post_embed(
            channel_id,
            json!({
                "title": "OBJECTION!",
                "description": format!("**{}** objects to these proceedings!", username),
                "color": 0xFF0000,
                "footer": { "text": "Karma Court \u{2022} Justice In Real-Time" },
            }),
        );
    }

    fn verdict_reached(&self, channel_id: &str, state: &RoomState) {
        let (title, color) = match state.verdict {
            Some(Verdict::Guilty) => ("VERDICT: GUILTY", 0xFF0000),
            Some(Verdict::Innocent) => ("VERDICT: INNOCENT", 0x00FF00),
            None => ("VERDICT PENDING", 0xAAAAAA),
        };

        let mut fields = vec![json!({
            "name": "The Accused",
            "value": state.accused.username,
            "inline": true
        })];
        if let Some(sentence) = &state.sentence {
            fields.push(json!({ "name": "Sentence", "value": sentence, "inline": false }));
        }

        self.post_embed(
            channel_id,
            json!({
                "title": title,
                "color": color,
                "fields": fields,
                "footer": { "text": "Karma Court \u{2022} Justice In Real-Time" },
            }),
        );
    }

    fn evidence_submitted(&self, channel_id: &str, item: &Evidence) {
        self.post_embed(
            channel_id,
            json!({
                "title": "NEW EVIDENCE SUBMITTED",
                "description": item.text,
                "color": 0xFFAA00,
                "fields": [
                    { "name": "Submitted by", "value": item.author, "inline": true },
                    { "name": "Exhibit", "value": format!("#{}", item.id), "inline": true },
                ],
                "footer": { "text": "Karma Court \u{2022} Justice In Real-Time" },
            }),
        );
    }
}

/// Drops every notification. Useful where no channel is wired up.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn case_started(&self, _: &str, _: &RoomState) {}
    fn witness_called(&self, _: &str, _: &RoomState) {}
    fn objection(&self, _: &str, _: &str) {}
    fn verdict_reached(&self, _: &str, _: &RoomState) {}
    fn evidence_submitted(&self, _: &str, _: &Evidence) {}
}

/// One recorded notification, for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    CaseStarted { channel: String, accused: String },
    WitnessCalled { channel: String },
    Objection { channel: String, username: String },
    VerdictReached { channel: String, verdict: Option<Verdict> },
    EvidenceSubmitted { channel: String, id: u32 },
}

/// Records every notification instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifyEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().expect("notifier event lock").clone()
    }

    fn record(&self, event: NotifyEvent) {
        self.events.lock().expect("notifier event lock").push(event);
    }
}

impl Notifier for RecordingNotifier {
    fn case_started(&self, channel_id: &str, state: &RoomState) {
        self.record(NotifyEvent::CaseStarted {
            channel: channel_id.to_string(),
            accused: state.accused.username.clone(),
        });
    }

    fn witness_called(&self, channel_id: &str, _state: &RoomState) {
        self.record(NotifyEvent::WitnessCalled {
            channel: channel_id.to_string(),
        });
    }

    fn objection(&self, channel_id: &str, username: &str) {
        self.record(NotifyEvent::Objection {
            channel: channel_id.to_string(),
            username: username.to_string(),
        });
    }

    fn verdict_reached(&self, channel_id: &str, state: &RoomState) {
        self.record(NotifyEvent::VerdictReached {
            channel: channel_id.to_string(),
            verdict: state.verdict,
        });
    }

    fn evidence_submitted(&self, channel_id: &str, item: &Evidence) {
        self.record(NotifyEvent::EvidenceSubmitted {
            channel: channel_id.to_string(),
            id: item.id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_number_is_four_digits() {
        let id = DiscordNotifier::case_number();
        assert!(id.starts_with("CASE-"));
        assert_eq!(id.len(), "CASE-0000".len());
    }

    #[test]
    fn recording_notifier_captures_order() {
        let notifier = RecordingNotifier::new();
        let state = RoomState::new();

        notifier.case_started("chan-1", &state);
        notifier.objection("chan-1", "Maya");

        let events = notifier.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], NotifyEvent::CaseStarted { .. }));
        assert_eq!(
            events[1],
            NotifyEvent::Objection {
                channel: "chan-1".to_string(),
                username: "Maya".to_string()
            }
        );
    }
}
