//! Shared protocol and state model for the Karma Court server.
//!
//! Everything that crosses the WebSocket boundary is defined here so the
//! server, its unit tests, and the workspace integration tests all agree
//! on one wire format. Inbound and outbound messages are internally
//! tagged unions (`{"type": "...", ...}`) decoded exactly once at the
//! gateway; the server never inspects raw JSON dictionaries.

use serde::{Deserialize, Serialize};

/// Seconds on the case countdown when a trial opens.
pub const CASE_TIMER_SECS: u32 = 60;
/// Maximum entries kept in the live activity log (oldest evicted first).
pub const MAX_LOG_ENTRIES: usize = 50;
/// Maximum length, in characters, of crime and evidence text.
pub const MAX_TEXT_LEN: usize = 100;
/// Room-wide cooldown between objections, in seconds.
pub const OBJECTION_COOLDOWN_SECS: u64 = 10;
/// Per-identity cooldown between accepted evidence submissions, in seconds.
pub const EVIDENCE_COOLDOWN_SECS: u64 = 3;

/// Username sentinel meaning "no accusation pending".
pub const UNKNOWN_USERNAME: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Guilty,
    Innocent,
}

/// A juror's ballot. Distinct from [`Verdict`] so a vote can never carry
/// an out-of-range value past the decode boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Guilty,
    Innocent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub guilty: u32,
    pub innocent: u32,
}

impl VoteTally {
    pub fn record(&mut self, choice: VoteChoice) {
        match choice {
            VoteChoice::Guilty => self.guilty += 1,
            VoteChoice::Innocent => self.innocent += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.guilty + self.innocent
    }

    /// Ties favor the accused: guilty requires a strict majority.
    pub fn outcome(&self) -> Verdict {
        if self.guilty > self.innocent {
            Verdict::Guilty
        } else {
            Verdict::Innocent
        }
    }
}

/// A participant reference as supplied by the client or the slash
/// command: identity, display name, avatar hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accused {
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl Default for Accused {
    fn default() -> Self {
        Self {
            id: None,
            username: UNKNOWN_USERNAME.to_string(),
            avatar: None,
        }
    }
}

impl Accused {
    /// True while no accusation is pending.
    pub fn is_unknown(&self) -> bool {
        self.username == UNKNOWN_USERNAME
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub username: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: u32,
    pub text: String,
    pub author: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    System,
    Info,
    Alert,
    Verdict,
    Objection,
    Evidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
}

/// The full authoritative state of one courtroom. This is what every
/// `update` broadcast carries; clients re-render from it wholesale and
/// never predict locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomState {
    pub votes: VoteTally,
    pub crime: String,
    pub verdict: Option<Verdict>,
    pub judge_id: Option<String>,
    pub accused: Accused,
    pub witness: Witness,
    pub voters: Vec<String>,
    pub evidence: Vec<Evidence>,
    pub logs: Vec<LogEntry>,
    pub timer: u32,
    pub sentence: Option<String>,
}

impl RoomState {
    pub fn new() -> Self {
        Self {
            timer: CASE_TIMER_SECS,
            ..Self::default()
        }
    }

    /// Appends an activity-log entry, evicting the oldest once the cap
    /// is reached.
    pub fn push_log(&mut self, message: impl Into<String>, kind: LogKind) {
        self.logs.push(LogEntry {
            message: message.into(),
            kind,
        });
        if self.logs.len() > MAX_LOG_ENTRIES {
            let excess = self.logs.len() - MAX_LOG_ENTRIES;
            self.logs.drain(..excess);
        }
    }

    /// Clears the ballot for a fresh case: votes, voters, verdict.
    pub fn reset_ballot(&mut self) {
        self.votes = VoteTally::default();
        self.voters.clear();
        self.verdict = None;
    }

    /// Opens a new case against `accused`: fresh ballot, no sentence,
    /// no evidence, no witness. The crime text is left to the caller.
    pub fn open_case(&mut self, accused: Accused) {
        self.accused = accused;
        self.reset_ballot();
        self.sentence = None;
        self.evidence.clear();
        self.witness = Witness::default();
    }

    /// Full docket reset after `next_case`: everything back to empty
    /// defaults, countdown rewound.
    pub fn close_case(&mut self) {
        self.open_case(Accused::default());
        self.crime.clear();
        self.timer = CASE_TIMER_SECS;
    }

    pub fn has_voted(&self, user_id: &str) -> bool {
        self.voters.iter().any(|v| v == user_id)
    }
}

/// Truncates text to [`MAX_TEXT_LEN`] characters without splitting a
/// code point.
pub fn truncate_text(text: &str) -> String {
    text.chars().take(MAX_TEXT_LEN).collect()
}

/// A trial staged by the `/accuse` slash command before any client has
/// connected, consumed by the first connection to its room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCase {
    pub accused: Accused,
    pub crime: String,
}

fn default_username() -> String {
    UNKNOWN_USERNAME.to_string()
}

/// Inbound message envelope, one variant per `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Vote {
        vote: VoteChoice,
    },
    UpdateCrime {
        crime: String,
    },
    GenerateCrime,
    AccuseUser {
        user: Accused,
    },
    CallWitness {
        user: Accused,
    },
    CallVerdict,
    PassSentence,
    NextCase,
    Objection {
        #[serde(default = "default_username")]
        username: String,
    },
    AddEvidence {
        text: String,
        #[serde(default = "default_username")]
        username: String,
    },
    DeleteEvidence {
        id: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundCue {
    Gavel,
    Vote,
    Objection,
    Evidence,
}

/// Outbound message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Update { data: RoomState },
    Sound { sound: SoundCue },
    ObjectionEvent { user_id: String, username: String },
    Error { message: String },
}
