//! Client library for the external creative-production pipeline.
//!
//! Provides job submission and cancellation over HTTP, a WebSocket
//! progress channel with bounded reconnection, a fixed-interval polling
//! fallback, and the per-session generation tracker that ties them to
//! the state machine in `adstudio-core`.

pub mod api;
pub mod channel;
pub mod config;
pub mod events;
pub mod messages;
pub mod poller;
pub mod reconnect;
pub mod tracker;
