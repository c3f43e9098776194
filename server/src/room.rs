//! The per-room trial state machine.
//!
//! One [`Room`] owns everything about a single courtroom: the
//! authoritative [`RoomState`], the roster of live connections, the case
//! countdown, and the rate limits. All mutation funnels through
//! [`Room::admit`], [`Room::remove`] and [`Room::dispatch`], each of
//! which holds the room lock for its full duration — so admits, message
//! handling, timer ticks and disconnects can never interleave within a
//! room, while separate rooms run fully independently.
//!
//! Clients stay in sync through one primitive only: after every handled
//! message the room broadcasts the complete state snapshot to every
//! connection. Nobody predicts locally; everyone re-renders the latest
//! authoritative view.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

use shared::{
    truncate_text, Accused, ClientMessage, Evidence, LogKind, PendingCase, RoomState,
    ServerMessage, SoundCue, Verdict, VoteChoice, Witness, CASE_TIMER_SECS,
    EVIDENCE_COOLDOWN_SECS, OBJECTION_COOLDOWN_SECS,
};

use crate::banks;
use crate::filter::ContentFilter;
use crate::notifier::Notifier;

/// Connection identifier, allocated by the registry.
pub type ConnId = u64;

/// Outbound channel carrying pre-serialized JSON frames. Unbounded so a
/// broadcast never awaits under the room lock; the gateway's writer task
/// drains it.
pub type OutboundSender = mpsc::UnboundedSender<String>;

pub type SharedRoom = Arc<Mutex<Room>>;

/// A live connection and the identity behind it. One identity may hold
/// several connections; they are tracked separately and in join order.
struct Member {
    conn: ConnId,
    user_id: String,
    sender: OutboundSender,
}

pub struct Room {
    state: RoomState,
    /// Channel the notifier posts to, learned from the first connection
    /// that supplies one.
    channel_id: Option<String>,
    members: Vec<Member>,
    timer_task: Option<JoinHandle<()>>,
    /// Bumped on every timer cancel/start. A countdown task that wakes
    /// up to a mismatched epoch has been superseded and must exit
    /// without side effects.
    timer_epoch: u64,
    last_objection: Option<Instant>,
    evidence_cooldowns: HashMap<String, Instant>,
    next_evidence_id: u32,
    filter: Arc<ContentFilter>,
    notifier: Arc<dyn Notifier>,
}

impl Room {
    pub fn new(filter: Arc<ContentFilter>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            state: RoomState::new(),
            channel_id: None,
            members: Vec::new(),
            timer_task: None,
            timer_epoch: 0,
            last_objection: None,
            evidence_cooldowns: HashMap::new(),
            next_evidence_id: 1,
            filter,
            notifier,
        }
    }

    pub fn shared(filter: Arc<ContentFilter>, notifier: Arc<dyn Notifier>) -> SharedRoom {
        Arc::new(Mutex::new(Self::new(filter, notifier)))
    }

    /// Registers a connection with the room.
    ///
    /// Consumes a staged pending case if one was handed over, seats the
    /// first identity to arrive as judge, and sends the full current
    /// state to this connection only.
    pub async fn admit(
        room: &SharedRoom,
        conn: ConnId,
        user_id: String,
        sender: OutboundSender,
        channel_id: Option<String>,
        pending: Option<PendingCase>,
    ) {
        let mut r = room.lock().await;

        info!("Connection {} admitted for user {}", conn, user_id);
        r.members.push(Member {
            conn,
            user_id: user_id.clone(),
            sender,
        });

        if channel_id.is_some() {
            r.channel_id = channel_id;
        }

        if let Some(case) = pending {
            r.state.open_case(case.accused);
            r.state.crime = truncate_text(&case.crime);
            r.next_evidence_id = 1;
            r.state.push_log("OPENING PENDING CASE FILE...", LogKind::System);
            let accused = r.state.accused.username.clone();
            r.state
                .push_log(format!("ACCUSED: {}", accused), LogKind::Alert);
            r.start_timer(room);
        }

        if r.state.judge_id.is_none() {
            r.state.judge_id = Some(user_id.clone());
            r.state
                .push_log("The court is now in session. Judge assigned.", LogKind::System);
            info!("User {} seated as judge", user_id);
        }

        if let Some(member) = r.members.last() {
            r.send_to(member, &ServerMessage::Update {
                data: r.state.clone(),
            });
        }
    }

    /// Unregisters a connection, reassigning the bench and punishing a
    /// fleeing accused, then broadcasts the resulting state to whoever
    /// remains.
    pub async fn remove(room: &SharedRoom, conn: ConnId) {
        let mut r = room.lock().await;

        let Some(index) = r.members.iter().position(|m| m.conn == conn) else {
            return;
        };
        let member = r.members.remove(index);
        let user_id = member.user_id;
        info!("Connection {} removed (user {})", conn, user_id);

        if r.state.judge_id.as_deref() == Some(user_id.as_str()) {
            if let Some(successor) = r.members.first() {
                let new_judge = successor.user_id.clone();
                r.state
                    .push_log(format!("Judge disconnected. New Judge is {}.", new_judge), LogKind::System);
                info!("Judge {} left; promoting {}", user_id, new_judge);
                r.state.judge_id = Some(new_judge);
            } else {
                r.state.judge_id = None;
                r.cancel_timer();
                r.state
                    .push_log("Judge disconnected. Court adjourned.", LogKind::System);
                info!("Judge {} left an empty courtroom; adjourned", user_id);
            }
        }

        // Contempt of court: the accused fled before a verdict. Can only
        // fire once per case since it sets the verdict itself.
        if r.state.accused.id.as_deref() == Some(user_id.as_str()) && r.state.verdict.is_none() {
            r.state.verdict = Some(Verdict::Guilty);
            let punishment = banks::pick(banks::SEVERE_SENTENCES);
            r.state.sentence = Some(punishment.to_string());
            r.cancel_timer();
            let accused = r.state.accused.username.clone();
            r.state.push_log(
                format!("CONTEMPT OF COURT! {} fled. AUTOMATIC GUILTY.", accused),
                LogKind::Alert,
            );
            r.state
                .push_log(format!("SEVERE SENTENCE: {}", punishment), LogKind::Alert);
            r.broadcast(&ServerMessage::Sound {
                sound: SoundCue::Gavel,
            });
            if let Some(channel) = r.channel_id.clone() {
                r.notifier.verdict_reached(&channel, &r.state);
            }
        }

        if r.members.is_empty() {
            r.cancel_timer();
        } else {
            r.broadcast_state();
        }
    }

    /// Handles one decoded client message on behalf of `user_id`.
    ///
    /// Unauthorized or precondition-failing messages are ignored without
    /// an error (except evidence rejection, which is surfaced to
    /// everyone); every message still ends in a full-state broadcast.
    pub async fn dispatch(room: &SharedRoom, user_id: &str, msg: ClientMessage) {
        let mut r = room.lock().await;

        match msg {
            ClientMessage::Vote { vote } => r.handle_vote(user_id, vote),
            ClientMessage::UpdateCrime { crime } => r.handle_update_crime(user_id, &crime),
            ClientMessage::GenerateCrime => r.handle_generate_crime(user_id),
            ClientMessage::AccuseUser { user } => r.handle_accuse(room, user_id, user),
            ClientMessage::CallWitness { user } => r.handle_call_witness(user_id, user),
            ClientMessage::CallVerdict => {
                if r.is_judge(user_id) {
                    r.resolve_verdict(false);
                }
            }
            ClientMessage::PassSentence => r.handle_pass_sentence(user_id),
            ClientMessage::NextCase => r.handle_next_case(user_id),
            ClientMessage::Objection { username } => r.handle_objection(user_id, &username),
            ClientMessage::AddEvidence { text, username } => {
                r.handle_add_evidence(user_id, &text, &username)
            }
            ClientMessage::DeleteEvidence { id } => r.handle_delete_evidence(user_id, id),
        }

        r.broadcast_state();
    }

    fn handle_vote(&mut self, user_id: &str, vote: VoteChoice) {
        if self.state.accused.is_unknown() {
            return;
        }
        if self.state.has_voted(user_id) || self.state.verdict.is_some() {
            return;
        }
        self.state.votes.record(vote);
        self.state.voters.push(user_id.to_string());
        self.broadcast(&ServerMessage::Sound {
            sound: SoundCue::Vote,
        });
    }

    fn handle_update_crime(&mut self, user_id: &str, crime: &str) {
        if !self.is_judge(user_id) {
            return;
        }
        let text = truncate_text(crime);
        if self.filter.is_clean(&text) {
            self.state.crime = self.filter.sanitize(&text);
        }
    }

    fn handle_generate_crime(&mut self, user_id: &str) {
        if !self.is_judge(user_id) {
            return;
        }
        self.state.crime = banks::pick(banks::CRIMES).to_string();
        self.state
            .push_log("AI Protocol generated a new accusation.", LogKind::System);
        // Audible feedback for the generated charge.
        self.broadcast(&ServerMessage::Sound {
            sound: SoundCue::Vote,
        });
    }

    fn handle_accuse(&mut self, room: &SharedRoom, user_id: &str, accused: Accused) {
        if !self.is_judge(user_id) {
            return;
        }
        info!(
            "Judge {} accuses {} (channel {:?})",
            user_id, accused.username, self.channel_id
        );
        self.state.open_case(accused);
        self.state.crime = truncate_text(&self.state.crime);
        self.next_evidence_id = 1;
        let accused = self.state.accused.username.clone();
        self.state
            .push_log(format!("Judge accused {}!", accused), LogKind::Alert);
        self.start_timer(room);
        if let Some(channel) = self.channel_id.clone() {
            self.notifier.case_started(&channel, &self.state);
        }
    }

    fn handle_call_witness(&mut self, user_id: &str, user: Accused) {
        if !self.is_judge(user_id) {
            return;
        }
        self.state.witness = Witness {
            username: Some(user.username),
            avatar: user.avatar,
        };
        let witness = self.state.witness.username.clone().unwrap_or_default();
        self.state.push_log(
            format!("Judge called witness {} to the stand.", witness),
            LogKind::Info,
        );
        if let Some(channel) = self.channel_id.clone() {
            self.notifier.witness_called(&channel, &self.state);
        }
    }

    fn handle_pass_sentence(&mut self, user_id: &str) {
        if !self.is_judge(user_id) || self.state.verdict != Some(Verdict::Guilty) {
            return;
        }
        let sentence = banks::pick(banks::SENTENCES);
        self.state.sentence = Some(sentence.to_string());
        self.state
            .push_log(format!("SENTENCE PASSED: {}", sentence), LogKind::Alert);
        self.broadcast(&ServerMessage::Sound {
            sound: SoundCue::Gavel,
        });
        if let Some(channel) = self.channel_id.clone() {
            self.notifier.verdict_reached(&channel, &self.state);
        }
    }

    fn handle_next_case(&mut self, user_id: &str) {
        if !self.is_judge(user_id) {
            return;
        }
        self.cancel_timer();
        self.state.close_case();
        self.next_evidence_id = 1;
        self.state
            .push_log("Case closed. Preparing next case...", LogKind::Info);
    }

    fn handle_objection(&mut self, user_id: &str, username: &str) {
        let now = Instant::now();
        if let Some(last) = self.last_objection {
            if now.duration_since(last) < Duration::from_secs(OBJECTION_COOLDOWN_SECS) {
                return;
            }
        }
        self.last_objection = Some(now);
        self.broadcast(&ServerMessage::ObjectionEvent {
            user_id: user_id.to_string(),
            username: username.to_string(),
        });
        self.broadcast(&ServerMessage::Sound {
            sound: SoundCue::Objection,
        });
        self.state
            .push_log(format!("OBJECTION! by {}", username), LogKind::Objection);
        if let Some(channel) = self.channel_id.clone() {
            self.notifier.objection(&channel, username);
        }
    }

    fn handle_add_evidence(&mut self, user_id: &str, text: &str, username: &str) {
        let now = Instant::now();
        if let Some(last) = self.evidence_cooldowns.get(user_id) {
            if now.duration_since(*last) < Duration::from_secs(EVIDENCE_COOLDOWN_SECS) {
                return;
            }
        }

        let text = truncate_text(text);
        if !self.filter.is_clean(&text) {
            self.broadcast(&ServerMessage::Error {
                message: "Evidence rejected: Inappropriate content.".to_string(),
            });
            return;
        }

        // The cooldown clock only restarts on accepted submissions.
        self.evidence_cooldowns.insert(user_id.to_string(), now);

        let item = Evidence {
            id: self.next_evidence_id,
            text: self.filter.sanitize(&text),
            author: username.to_string(),
        };
        self.next_evidence_id += 1;
        self.state.evidence.push(item.clone());
        self.broadcast(&ServerMessage::Sound {
            sound: SoundCue::Evidence,
        });
        self.state
            .push_log(format!("Evidence submitted by {}", username), LogKind::Evidence);
        if let Some(channel) = self.channel_id.clone() {
            self.notifier.evidence_submitted(&channel, &item);
        }
    }

    fn handle_delete_evidence(&mut self, user_id: &str, id: u32) {
        if !self.is_judge(user_id) {
            return;
        }
        self.state.evidence.retain(|e| e.id != id);
        self.state
            .push_log("Evidence removed by Judge moderation.", LogKind::System);
    }

    /// Delivers the verdict: cancels the countdown, counts the ballots
    /// (ties acquit), and announces the result. Innocent verdicts notify
    /// the channel immediately; guilty verdicts wait for sentencing.
    fn resolve_verdict(&mut self, timed_out: bool) {
        self.cancel_timer();
        let verdict = self.state.votes.outcome();
        self.state.verdict = Some(verdict);
        self.broadcast(&ServerMessage::Sound {
            sound: SoundCue::Gavel,
        });

        let mut message = format!(
            "Verdict delivered: {}",
            match verdict {
                Verdict::Guilty => "GUILTY",
                Verdict::Innocent => "INNOCENT",
            }
        );
        if timed_out {
            message.push_str(" (Time Expired)");
        }
        self.state.push_log(message, LogKind::Verdict);
        self.broadcast_state();

        if verdict == Verdict::Innocent {
            if let Some(channel) = self.channel_id.clone() {
                self.notifier.verdict_reached(&channel, &self.state);
            }
        }
    }

    /// Starts (or restarts) the case countdown. The previous countdown,
    /// if any, is superseded first so a room never runs two timers.
    fn start_timer(&mut self, room: &SharedRoom) {
        self.cancel_timer();
        self.state.timer = CASE_TIMER_SECS;
        let epoch = self.timer_epoch;
        let room = Arc::clone(room);
        self.timer_task = Some(tokio::spawn(async move {
            Room::run_countdown(room, epoch).await;
        }));
    }

    /// Stops the countdown. Idempotent; the epoch bump also fences off a
    /// task that is already past its abort point.
    fn cancel_timer(&mut self) {
        self.timer_epoch += 1;
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
    }

    async fn run_countdown(room: SharedRoom, epoch: u64) {
        loop {
            sleep(Duration::from_secs(1)).await;
            let mut r = room.lock().await;
            if r.timer_epoch != epoch {
                return;
            }
            r.state.timer = r.state.timer.saturating_sub(1);
            r.broadcast_state();
            if r.state.timer == 0 {
                r.timer_task = None;
                r.resolve_verdict(true);
                return;
            }
        }
    }

    pub fn is_judge(&self, user_id: &str) -> bool {
        self.state.judge_id.as_deref() == Some(user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.members.len()
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    /// True while a countdown task exists and has not finished.
    pub fn timer_active(&self) -> bool {
        self.timer_task
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    fn send_to(&self, member: &Member, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => {
                if member.sender.send(json).is_err() {
                    warn!("Connection {} closed before send", member.conn);
                }
            }
            Err(e) => warn!("Failed to serialize outbound message: {}", e),
        }
    }

    /// Sends `msg` to every connection. A failed send is logged and
    /// skipped; it never interrupts delivery to the rest of the room.
    fn broadcast(&self, msg: &ServerMessage) {
        if self.members.is_empty() {
            return;
        }
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize broadcast: {}", e);
                return;
            }
        };
        for member in &self.members {
            if member.sender.send(json.clone()).is_err() {
                warn!(
                    "Broadcast to connection {} failed (receiver gone)",
                    member.conn
                );
            }
        }
    }

    fn broadcast_state(&self) {
        self.broadcast(&ServerMessage::Update {
            data: self.state.clone(),
        });
    }
}
