//! Media Archiver Library
//!
//! Watches chat messages for shareable media links, resolves them to concrete
//! files and saves them into a per-channel archive, applying channel policy
//! along the way.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`extract`] - Candidate link extraction from messages
//! - [`resolver`] - Host aliasing and the ordered provider chain
//! - [`dedup`] - Pre-download and perceptual duplicate suppression
//! - [`download`] - Retrying per-link download coordinator
//! - [`policy`] - Ordered allow/deny filters
//! - [`placement`] - Destination folder composition
//! - [`report`] - Outcome side effects (notices, reactions, relays, link logs)
//! - [`pipeline`] - Per-message orchestration
//! - [`config`] - Settings file and per-channel policy merge
//! - [`db`] / [`store`] - SQLite download records
//! - [`platform`] - Chat platform seam
//! - [`setup`] - First-run prompt

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod dedup;
pub mod download;
pub mod extract;
pub mod message;
pub mod pipeline;
pub mod placement;
pub mod platform;
pub mod policy;
pub mod report;
pub mod resolver;
pub mod setup;
pub mod store;

// Re-export commonly used types
pub use config::{ChannelPolicy, Settings, Toggle};
pub use db::{Database, DbError};
pub use dedup::DuplicateDetector;
pub use download::{
    DownloadCoordinator, DownloadOutcome, DownloadRequest, DownloadStatus, HttpClient,
    RetryDecision, RetryPolicy, Tier,
};
pub use message::Message;
pub use pipeline::{MessagePipeline, PipelineStats, Trigger};
pub use platform::{ChatPlatform, OfflinePlatform};
pub use resolver::{ResolvedLink, Resolver, ResolverRegistry};
pub use store::{DownloadRecord, DownloadStore, SqliteDownloadStore};
