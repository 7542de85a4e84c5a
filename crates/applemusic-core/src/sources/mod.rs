//! External collaborators: the Apple Music REST API and Music.app automation
//!
//! The core only talks to these traits. [`remote::AppleMusicClient`] and
//! [`applescript::AppleScriptLibrary`] are the production implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{MusicError, Result};
use crate::track::TrackSummary;

pub mod applescript;
pub mod remote;

#[cfg(test)]
pub mod fake;

/// A playlist as listed by either source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub name: String,
    /// Remote playlists are only editable through the API if created by it
    pub can_edit: bool,
}

/// Love/dislike preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    Love,
    Dislike,
}

impl Preference {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "love" => Some(Preference::Love),
            "dislike" => Some(Preference::Dislike),
            _ => None,
        }
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preference::Love => f.write_str("love"),
            Preference::Dislike => f.write_str("dislike"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackAction {
    Play,
    Pause,
    Toggle,
    Next,
    Previous,
    Stop,
}

impl PlaybackAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "play" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "toggle" | "playpause" => Some(Self::Toggle),
            "next" | "skip" => Some(Self::Next),
            "previous" | "prev" | "back" => Some(Self::Previous),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Current player state from Music.app
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub state: String,
    pub track: Option<TrackSummary>,
    pub position_secs: Option<f64>,
    pub duration_secs: Option<f64>,
}

/// Catalog attributes beyond what a listing carries
#[derive(Debug, Clone, PartialEq)]
pub struct SongDetails {
    pub track: TrackSummary,
    pub genres: Vec<String>,
    pub duration_ms: Option<u64>,
    /// `YYYY-MM-DD` as the catalog reports it
    pub release_date: Option<String>,
}

/// The remote catalog and the user's remote library
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn search_library(&self, term: &str, limit: usize) -> Result<Vec<TrackSummary>>;
    async fn search_catalog(&self, term: &str, limit: usize) -> Result<Vec<TrackSummary>>;
    /// Direct translation; `None` when the song is not in the library
    async fn library_id_for_catalog_id(&self, catalog_id: &str) -> Result<Option<String>>;
    async fn catalog_id_for_library_id(&self, library_id: &str) -> Result<Option<String>>;
    async fn catalog_song(&self, catalog_id: &str) -> Result<Option<TrackSummary>>;
    async fn library_song(&self, library_id: &str) -> Result<Option<TrackSummary>>;
    async fn song_details(&self, catalog_id: &str) -> Result<Option<SongDetails>>;
    async fn add_to_library(&self, catalog_ids: &[String]) -> Result<()>;
    async fn add_to_playlist(&self, playlist_id: &str, library_ids: &[String]) -> Result<()>;
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<TrackSummary>>;
    async fn list_playlists(&self) -> Result<Vec<PlaylistInfo>>;
    async fn create_playlist(&self, name: &str, description: &str) -> Result<PlaylistInfo>;
    async fn rate_song(&self, catalog_id: &str, preference: Preference) -> Result<()>;
}

/// The local Music.app library (macOS only)
#[async_trait]
pub trait LocalSource: Send + Sync {
    async fn list_library_tracks(&self) -> Result<Vec<TrackSummary>>;
    /// Music.app's native search over the library
    async fn search_library(&self, term: &str) -> Result<Vec<TrackSummary>>;
    async fn track_by_persistent_id(&self, persistent_id: &str) -> Result<Option<TrackSummary>>;
    async fn playlist_tracks(&self, playlist: &str) -> Result<Vec<TrackSummary>>;
    async fn add_to_playlist(&self, playlist: &str, persistent_id: &str) -> Result<()>;
    async fn remove_from_playlist(&self, playlist: &str, persistent_id: &str) -> Result<()>;
    async fn list_playlists(&self) -> Result<Vec<PlaylistInfo>>;
    async fn create_playlist(&self, name: &str, description: &str) -> Result<PlaylistInfo>;
    async fn set_preference(&self, persistent_id: &str, preference: Preference) -> Result<()>;
    /// Star rating on Music.app's 0–100 scale
    async fn rating(&self, persistent_id: &str) -> Result<u8>;
    async fn set_rating(&self, persistent_id: &str, rating: u8) -> Result<()>;
    async fn playback(&self, action: PlaybackAction) -> Result<()>;
    async fn now_playing(&self) -> Result<NowPlaying>;
    async fn play_track(&self, persistent_id: &str) -> Result<()>;
    async fn play_playlist(&self, playlist: &str, shuffle: bool) -> Result<()>;
    /// Delete a track from the library and every playlist holding it
    async fn delete_track(&self, persistent_id: &str) -> Result<()>;
    async fn delete_playlist(&self, playlist: &str) -> Result<()>;
}

/// Runs one automation script and returns its text output
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, script: &str) -> anyhow::Result<String>;
}

/// The sources available in this process
#[derive(Clone, Default)]
pub struct Sources {
    pub remote: Option<Arc<dyn RemoteSource>>,
    pub local: Option<Arc<dyn LocalSource>>,
}

impl Sources {
    pub fn new(remote: Option<Arc<dyn RemoteSource>>, local: Option<Arc<dyn LocalSource>>) -> Self {
        Self { remote, local }
    }

    pub fn remote(&self) -> Result<&dyn RemoteSource> {
        self.remote.as_deref().ok_or_else(|| {
            MusicError::Unsupported(
                "Apple Music API is not configured (developer and user tokens required)".into(),
            )
        })
    }

    pub fn local(&self) -> Result<&dyn LocalSource> {
        self.local
            .as_deref()
            .ok_or_else(|| MusicError::Unsupported("Music.app automation requires macOS".into()))
    }
}
