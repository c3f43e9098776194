//! End-to-end tests driving full trials through the public room,
//! registry and protocol surfaces together.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use server::banks;
use server::filter::ContentFilter;
use server::notifier::{NotifyEvent, RecordingNotifier};
use server::registry::RoomRegistry;
use server::room::{Room, SharedRoom};
use shared::{
    Accused, ClientMessage, PendingCase, RoomState, ServerMessage, Verdict, VoteChoice,
    CASE_TIMER_SECS,
};

fn new_room() -> (SharedRoom, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let room = Room::shared(Arc::new(ContentFilter::new()), notifier.clone());
    (room, notifier)
}

async fn join(
    room: &SharedRoom,
    conn: u64,
    user: &str,
    channel: Option<&str>,
) -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    Room::admit(
        room,
        conn,
        user.to_string(),
        tx,
        channel.map(str::to_string),
        None,
    )
    .await;
    rx
}

fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(json) = rx.try_recv() {
        out.push(serde_json::from_str(&json).unwrap());
    }
    out
}

fn bob() -> Accused {
    Accused {
        id: Some("bob-id".to_string()),
        username: "Bob".to_string(),
        avatar: None,
    }
}

async fn state_of(room: &SharedRoom) -> RoomState {
    room.lock().await.state().clone()
}

mod trial_flow_tests {
    use super::*;

    #[tokio::test]
    async fn full_trial_from_accusation_to_sentence() {
        let (room, notifier) = new_room();
        let mut judge_rx = join(&room, 1, "judge", Some("chan-1")).await;
        let _a = join(&room, 2, "juror-a", None).await;
        let _b = join(&room, 3, "juror-b", None).await;

        Room::dispatch(
            &room,
            "judge",
            ClientMessage::AccuseUser { user: bob() },
        )
        .await;
        Room::dispatch(
            &room,
            "judge",
            ClientMessage::UpdateCrime {
                crime: "Leaving the group chat on read".to_string(),
            },
        )
        .await;

        for (user, vote) in [
            ("judge", VoteChoice::Guilty),
            ("juror-a", VoteChoice::Guilty),
            ("juror-b", VoteChoice::Innocent),
        ] {
            Room::dispatch(&room, user, ClientMessage::Vote { vote }).await;
        }

        Room::dispatch(&room, "judge", ClientMessage::CallVerdict).await;
        let state = state_of(&room).await;
        assert_eq!(state.verdict, Some(Verdict::Guilty));
        assert_eq!(state.votes.guilty, 2);
        assert_eq!(state.votes.innocent, 1);

        Room::dispatch(&room, "judge", ClientMessage::PassSentence).await;
        let state = state_of(&room).await;
        let sentence = state.sentence.as_deref().expect("sentence passed");
        assert!(banks::SENTENCES.contains(&sentence));

        // Guilty verdicts notify the channel once, at sentencing.
        let verdicts = notifier
            .events()
            .into_iter()
            .filter(|e| matches!(e, NotifyEvent::VerdictReached { .. }))
            .count();
        assert_eq!(verdicts, 1);

        // Everyone received the final snapshot.
        let last_update = drain(&mut judge_rx)
            .into_iter()
            .rev()
            .find_map(|m| match m {
                ServerMessage::Update { data } => Some(data),
                _ => None,
            })
            .expect("state broadcast");
        assert_eq!(last_update.verdict, Some(Verdict::Guilty));
        assert!(last_update.sentence.is_some());
    }

    #[tokio::test]
    async fn next_case_resets_everything_but_the_bench() {
        let (room, _) = new_room();
        let _judge = join(&room, 1, "judge", None).await;

        Room::dispatch(&room, "judge", ClientMessage::AccuseUser { user: bob() }).await;
        Room::dispatch(
            &room,
            "judge",
            ClientMessage::Vote {
                vote: VoteChoice::Guilty,
            },
        )
        .await;
        Room::dispatch(&room, "judge", ClientMessage::CallVerdict).await;
        Room::dispatch(&room, "judge", ClientMessage::NextCase).await;

        let state = state_of(&room).await;
        assert_eq!(state.judge_id.as_deref(), Some("judge"));
        assert!(state.accused.is_unknown());
        assert!(state.crime.is_empty());
        assert!(state.verdict.is_none());
        assert!(state.sentence.is_none());
        assert_eq!(state.votes.total(), 0);
        assert!(state.voters.is_empty());
        assert!(state.evidence.is_empty());
    }

    #[tokio::test]
    async fn staged_case_opens_for_the_first_connection() {
        let registry = RoomRegistry::new(
            Arc::new(ContentFilter::new()),
            Arc::new(RecordingNotifier::new()),
        );
        registry
            .stage_case(
                "chan-7",
                PendingCase {
                    accused: bob(),
                    crime: "Aggressively mid takes".to_string(),
                },
            )
            .await;

        let room = registry.get_or_create("instance-7").await;
        let pending = registry.take_pending("chan-7").await;
        assert!(pending.is_some());

        let (tx, _rx) = mpsc::unbounded_channel();
        Room::admit(
            &room,
            registry.next_conn_id(),
            "judge".to_string(),
            tx,
            Some("chan-7".to_string()),
            pending,
        )
        .await;

        let state = state_of(&room).await;
        assert_eq!(state.accused.username, "Bob");
        assert_eq!(state.crime, "Aggressively mid takes");
        assert_eq!(state.timer, CASE_TIMER_SECS);

        // The case was consumed; a second join gets nothing.
        assert!(registry.take_pending("chan-7").await.is_none());
    }
}

mod countdown_tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    #[tokio::test(start_paused = true)]
    async fn expiry_resolves_the_standing_votes() {
        let (room, _) = new_room();
        let _judge = join(&room, 1, "judge", None).await;
        let _a = join(&room, 2, "juror-a", None).await;

        Room::dispatch(&room, "judge", ClientMessage::AccuseUser { user: bob() }).await;
        Room::dispatch(
            &room,
            "juror-a",
            ClientMessage::Vote {
                vote: VoteChoice::Guilty,
            },
        )
        .await;

        sleep(Duration::from_secs(CASE_TIMER_SECS as u64 + 2)).await;

        let state = state_of(&room).await;
        assert_eq!(state.timer, 0);
        assert_eq!(state.verdict, Some(Verdict::Guilty));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_with_no_votes_acquits() {
        let (room, _) = new_room();
        let _judge = join(&room, 1, "judge", None).await;
        Room::dispatch(&room, "judge", ClientMessage::AccuseUser { user: bob() }).await;

        sleep(Duration::from_secs(CASE_TIMER_SECS as u64 + 2)).await;

        assert_eq!(state_of(&room).await.verdict, Some(Verdict::Innocent));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_are_broadcast() {
        let (room, _) = new_room();
        let mut judge_rx = join(&room, 1, "judge", None).await;
        Room::dispatch(&room, "judge", ClientMessage::AccuseUser { user: bob() }).await;
        drain(&mut judge_rx);

        sleep(Duration::from_millis(3500)).await;

        let timers: Vec<u32> = drain(&mut judge_rx)
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::Update { data } => Some(data.timer),
                _ => None,
            })
            .collect();
        assert_eq!(timers, vec![CASE_TIMER_SECS - 1, CASE_TIMER_SECS - 2, CASE_TIMER_SECS - 3]);
    }
}

mod protocol_tests {
    use super::*;

    #[test]
    fn client_messages_decode_from_tagged_json() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"vote","vote":"guilty"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Vote {
                vote: VoteChoice::Guilty
            }
        );

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"add_evidence","text":"exhibit a","username":"Maya"}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::AddEvidence { .. }));
    }

    #[test]
    fn update_envelope_carries_full_state() {
        let msg = ServerMessage::Update {
            data: RoomState::new(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(value["type"], "update");
        assert_eq!(value["data"]["timer"], CASE_TIMER_SECS);
        assert!(value["data"]["votes"]["guilty"].is_number());
    }

    #[test]
    fn unknown_message_types_fail_to_decode() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"bribe_judge"}"#);
        assert!(result.is_err());
    }
}
