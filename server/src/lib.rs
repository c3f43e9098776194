//! Karma Court game server.
//!
//! An authoritative server for a courtroom party game: players in a
//! voice channel hold mock trials with a judge, jurors, accusations,
//! evidence and verdicts. Every room's state lives here; clients send
//! intents over WebSocket and re-render the snapshots the server
//! broadcasts back.
//!
//! Module layout:
//! - [`room`]: the per-room trial state machine and countdown timer
//! - [`registry`]: lazy room lifecycle and staged pending cases
//! - [`network`]: axum WebSocket/HTTP gateway and OAuth token broker
//! - [`interactions`]: signed Discord slash-command endpoint
//! - [`notifier`]: channel notifications for courtroom milestones
//! - [`filter`]: profanity and markup scrubbing for player text
//! - [`banks`]: crime and sentence text tables

pub mod banks;
pub mod filter;
pub mod interactions;
pub mod network;
pub mod notifier;
pub mod registry;
pub mod room;
