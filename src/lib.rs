//! # donation-ledger
//!
//! Donation payment lifecycle service: records donations, opens MyFatoorah
//! invoices, and reconciles the three unordered, possibly duplicated
//! outcome signals (verify, browser callback, webhook) into exactly-once
//! ledger transitions. A cause's raised total moves only through
//! storage-level additive updates gated by a conditional status update,
//! and achievement awards and progress broadcasts fire only on the first
//! completion.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)      MyFatoorah (callback, webhook)
//!     │                                │
//!     ├── REST Handlers (api/) ◄───────┘
//!     ├── WS Handler (ws/)
//!     │
//!     ├── DonationService, ReconciliationEngine (service/)
//!     │       ├── AchievementEvaluator
//!     │       └── ProgressBroadcaster ──► push/ (EventBus, Centrifugo)
//!     │
//!     ├── PaymentGateway (gateway/) ──► MyFatoorah API
//!     │
//!     └── LedgerStore (persistence/) ──► PostgreSQL or in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod persistence;
pub mod push;
pub mod service;
pub mod ws;
