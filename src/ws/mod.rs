//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` streams live cause progress to clients
//! that subscribe with `{"command":"subscribe","cause_ids":[...]}`.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
