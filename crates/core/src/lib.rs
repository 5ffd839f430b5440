//! Pure domain logic for the ad-production studio.
//!
//! Workflow step ordering and gating, project artifact types, job
//! observation types, and the per-session generation state machine.
//! This crate performs no I/O; all network concerns live in
//! `adstudio-pipeline`.

pub mod artifacts;
pub mod error;
pub mod generation;
pub mod job;
pub mod types;
pub mod workflow;
