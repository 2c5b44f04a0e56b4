//! Домовой: Telegram front-end for a personal home-automation hub.
//!
//! The bot is a conversational layer over three backends: a Transmission
//! torrent daemon, wake-on-LAN device control and the hub's scenario API.
//! Conversation flow is state-driven and persisted per user; everything the
//! bot sends goes through a single dispatch protocol that decides between
//! editing a message in place and sending a new one.

/// Telegram-facing layer: handlers, dispatch protocol, views
pub mod bot;
/// External service clients: Transmission, wake-on-LAN, scenarios
pub mod clients;
/// Configuration and settings management
pub mod config;
/// Error taxonomy
pub mod error;
/// Per-user conversation state with ordered persistence
pub mod storage;
/// Cancellable, time-bounded async primitives
pub mod tasks;
/// Small shared helpers
pub mod utils;
