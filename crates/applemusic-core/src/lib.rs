//! Apple Music track resolution and playlist mutation
//!
//! Resolves free-text queries and catalog, library or Music.app identifiers
//! to one another, caches the correlations with stable per-track fields, and
//! applies verified playlist edits on top.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod ids;
pub mod matching;
pub mod orchestrator;
pub mod selector;
pub mod service;
pub mod sources;
pub mod track;

pub use bridge::{Bridge, ResolvedTrack};
pub use cache::{CacheStats, TrackCache};
pub use config::Config;
pub use error::{MusicError, Result};
pub use ids::{IdKind, TrackId, TrackRef};
pub use matching::{MatchQuery, MatchTier, SearchSource};
pub use orchestrator::{
    BatchResult, ItemOutcome, MutationAction, PlaylistMutationRequest, PlaylistTarget,
};
pub use selector::{BatchSelector, TrackSelector};
pub use service::{Backend, MusicService, RatingAction};
