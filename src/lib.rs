//! Pose-based repetition counting and scoring for up to two players.
//!
//! The core ([`engine::DetectionEngine`]) is synchronous and deterministic:
//! feed it joint frames with a session time and read back
//! [`types::SessionSnapshot`]s. [`pipeline`] wraps it with camera capture,
//! pose inference and overlay drawing on background threads.

pub mod assign;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
#[cfg(feature = "backend-ort")]
pub mod model_download;
pub mod pipeline;
pub mod pose;
pub mod profile;
pub mod repetition;
pub mod replay;
pub mod rhythm;
pub mod scoring;
pub mod types;
