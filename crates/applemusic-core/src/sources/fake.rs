//! In-memory sources for tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::{
    LocalSource, NowPlaying, PlaybackAction, PlaylistInfo, Preference, RemoteSource, ScriptRunner,
    SongDetails,
};
use crate::error::{MusicError, Result};
use crate::ids::{IdKind, TrackRef};
use crate::track::{StableMetadata, TrackSummary};

pub fn catalog_song(id: &str, name: &str, artist: &str) -> TrackSummary {
    let mut ids = TrackRef::default();
    ids.set(IdKind::Catalog, id.to_string());
    TrackSummary::new(ids, name, artist)
}

pub fn library_song(id: &str, catalog_id: Option<&str>, name: &str, artist: &str) -> TrackSummary {
    let mut ids = TrackRef::default();
    ids.set(IdKind::Library, id.to_string());
    if let Some(c) = catalog_id {
        ids.set(IdKind::Catalog, c.to_string());
    }
    TrackSummary::new(ids, name, artist)
}

pub fn local_track(persistent_id: &str, name: &str, artist: &str) -> TrackSummary {
    let mut ids = TrackRef::default();
    ids.set(IdKind::LocalPersistent, persistent_id.to_string());
    TrackSummary::new(ids, name, artist)
}

pub fn explicit(isrc: &str) -> StableMetadata {
    StableMetadata {
        explicit: Some(true),
        isrc: Some(isrc.to_string()),
    }
}

fn matches_term(track: &TrackSummary, term: &str) -> bool {
    let haystack = format!("{} {} {}", track.name, track.artist, track.album).to_lowercase();
    term.to_lowercase()
        .split_whitespace()
        .all(|word| haystack.contains(word))
}

fn is_mutation(call: &str) -> bool {
    ["add_to_playlist", "remove_from_playlist", "add_to_library"]
        .iter()
        .any(|m| call.starts_with(m))
}

#[derive(Default)]
pub struct RemoteState {
    pub catalog: Vec<TrackSummary>,
    pub library: Vec<TrackSummary>,
    pub playlists: Vec<(PlaylistInfo, Vec<String>)>,
    pub calls: Vec<String>,
    /// Playlist reads that still hide a freshly added library ID
    pub hidden: HashMap<String, u32>,
    /// Each applied add is hidden from this many subsequent reads
    pub read_lag: u32,
    /// Adds that report success without changing the playlist
    pub drop_adds: u32,
    /// Translation lookups that miss after a library add
    pub library_sync_lag: u32,
    pub sync_remaining: u32,
    pub unavailable: bool,
    /// Catalog ID to genre names
    pub genres: HashMap<String, Vec<String>>,
}

/// Remote catalog plus remote library
#[derive(Default)]
pub struct FakeRemote {
    pub state: Mutex<RemoteState>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(self, track: TrackSummary) -> Self {
        self.state.lock().unwrap().catalog.push(track);
        self
    }

    pub fn with_library(self, track: TrackSummary) -> Self {
        self.state.lock().unwrap().library.push(track);
        self
    }

    pub fn with_playlist(self, id: &str, name: &str, library_ids: &[&str]) -> Self {
        self.state.lock().unwrap().playlists.push((
            PlaylistInfo {
                id: id.to_string(),
                name: name.to_string(),
                can_edit: true,
            },
            library_ids.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn configure(self, f: impl FnOnce(&mut RemoteState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls().iter().filter(|c| is_mutation(c)).count()
    }

    pub fn playlist(&self, id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .playlists
            .iter()
            .find(|(p, _)| p.id == id)
            .map(|(_, ids)| ids.clone())
            .unwrap_or_default()
    }

    fn enter(&self, call: String) -> Result<std::sync::MutexGuard<'_, RemoteState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.unavailable {
            return Err(MusicError::remote("service unavailable"));
        }
        Ok(state)
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn search_library(&self, term: &str, limit: usize) -> Result<Vec<TrackSummary>> {
        let state = self.enter(format!("search_library {term}"))?;
        Ok(state
            .library
            .iter()
            .filter(|t| matches_term(t, term))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn search_catalog(&self, term: &str, limit: usize) -> Result<Vec<TrackSummary>> {
        let state = self.enter(format!("search_catalog {term}"))?;
        Ok(state
            .catalog
            .iter()
            .filter(|t| matches_term(t, term))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn library_id_for_catalog_id(&self, catalog_id: &str) -> Result<Option<String>> {
        let mut state = self.enter(format!("library_id_for_catalog_id {catalog_id}"))?;
        if state.sync_remaining > 0 {
            state.sync_remaining -= 1;
            return Ok(None);
        }
        Ok(state
            .library
            .iter()
            .find(|t| t.ids.catalog_id.as_deref() == Some(catalog_id))
            .and_then(|t| t.ids.library_id.clone()))
    }

    async fn catalog_id_for_library_id(&self, library_id: &str) -> Result<Option<String>> {
        let state = self.enter(format!("catalog_id_for_library_id {library_id}"))?;
        Ok(state
            .library
            .iter()
            .find(|t| t.ids.library_id.as_deref() == Some(library_id))
            .and_then(|t| t.ids.catalog_id.clone()))
    }

    async fn catalog_song(&self, catalog_id: &str) -> Result<Option<TrackSummary>> {
        let state = self.enter(format!("catalog_song {catalog_id}"))?;
        Ok(state
            .catalog
            .iter()
            .find(|t| t.ids.catalog_id.as_deref() == Some(catalog_id))
            .cloned())
    }

    async fn library_song(&self, library_id: &str) -> Result<Option<TrackSummary>> {
        let state = self.enter(format!("library_song {library_id}"))?;
        Ok(state
            .library
            .iter()
            .find(|t| t.ids.library_id.as_deref() == Some(library_id))
            .cloned())
    }

    async fn song_details(&self, catalog_id: &str) -> Result<Option<SongDetails>> {
        let state = self.enter(format!("song_details {catalog_id}"))?;
        Ok(state
            .catalog
            .iter()
            .find(|t| t.ids.catalog_id.as_deref() == Some(catalog_id))
            .map(|t| SongDetails {
                track: t.clone(),
                genres: state.genres.get(catalog_id).cloned().unwrap_or_default(),
                duration_ms: Some(240_000),
                release_date: None,
            }))
    }

    async fn add_to_library(&self, catalog_ids: &[String]) -> Result<()> {
        let mut state = self.enter(format!("add_to_library {}", catalog_ids.join(",")))?;
        for id in catalog_ids {
            let exists = state
                .library
                .iter()
                .any(|t| t.ids.catalog_id.as_deref() == Some(id.as_str()));
            if exists {
                continue;
            }
            let Some(song) = state
                .catalog
                .iter()
                .find(|t| t.ids.catalog_id.as_deref() == Some(id.as_str()))
                .cloned()
            else {
                return Err(MusicError::remote(format!("unknown catalog ID {id}")));
            };
            let mut added = song;
            added.ids.set(IdKind::Library, format!("i.{id}"));
            state.library.push(added);
        }
        state.sync_remaining = state.library_sync_lag;
        Ok(())
    }

    async fn add_to_playlist(&self, playlist_id: &str, library_ids: &[String]) -> Result<()> {
        let mut state = self.enter(format!(
            "add_to_playlist {playlist_id} {}",
            library_ids.join(",")
        ))?;
        if state.drop_adds > 0 {
            state.drop_adds -= 1;
            return Ok(());
        }
        let lag = state.read_lag;
        let Some((_, tracks)) = state.playlists.iter_mut().find(|(p, _)| p.id == playlist_id)
        else {
            return Err(MusicError::remote(format!("no playlist {playlist_id}")));
        };
        tracks.extend(library_ids.iter().cloned());
        if lag > 0 {
            for id in library_ids {
                state.hidden.insert(id.clone(), lag);
            }
        }
        Ok(())
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<TrackSummary>> {
        let mut state = self.enter(format!("playlist_tracks {playlist_id}"))?;
        let ids = state
            .playlists
            .iter()
            .find(|(p, _)| p.id == playlist_id)
            .map(|(_, ids)| ids.clone())
            .unwrap_or_default();
        let mut visible = Vec::new();
        for id in ids {
            if let Some(remaining) = state.hidden.get_mut(&id)
                && *remaining > 0
            {
                *remaining -= 1;
                continue;
            }
            let track = state
                .library
                .iter()
                .find(|t| t.ids.library_id.as_deref() == Some(id.as_str()))
                .cloned()
                .unwrap_or_else(|| library_song(&id, None, "", ""));
            visible.push(track);
        }
        Ok(visible)
    }

    async fn list_playlists(&self) -> Result<Vec<PlaylistInfo>> {
        let state = self.enter("list_playlists".to_string())?;
        Ok(state.playlists.iter().map(|(p, _)| p.clone()).collect())
    }

    async fn create_playlist(&self, name: &str, _description: &str) -> Result<PlaylistInfo> {
        let mut state = self.enter(format!("create_playlist {name}"))?;
        let info = PlaylistInfo {
            id: format!("p.{}", state.playlists.len() + 1),
            name: name.to_string(),
            can_edit: true,
        };
        state.playlists.push((info.clone(), Vec::new()));
        Ok(info)
    }

    async fn rate_song(&self, catalog_id: &str, preference: Preference) -> Result<()> {
        let _guard = self.enter(format!("rate_song {catalog_id} {preference}"))?;
        Ok(())
    }
}

#[derive(Default)]
pub struct LocalState {
    pub tracks: Vec<TrackSummary>,
    pub playlists: Vec<(PlaylistInfo, Vec<String>)>,
    pub calls: Vec<String>,
    pub ratings: HashMap<String, u8>,
    pub preferences: HashMap<String, Preference>,
    pub playback: Vec<PlaybackAction>,
    /// Adds that report success without changing the playlist
    pub drop_adds: u32,
    /// Native search finds nothing, forcing the full-listing fallback
    pub search_blind: bool,
    /// Tracks that join the library once `sync_after` library reads have passed
    pub syncing: Vec<TrackSummary>,
    pub sync_after: u32,
    library_reads: u32,
}

impl LocalState {
    /// Count a library read and release synced tracks
    fn read_library(&mut self) {
        self.library_reads += 1;
        if self.library_reads > self.sync_after && !self.syncing.is_empty() {
            let arrived = std::mem::take(&mut self.syncing);
            self.tracks.extend(arrived);
        }
    }
}

/// Local Music.app library
#[derive(Default)]
pub struct FakeLocal {
    pub state: Mutex<LocalState>,
}

impl FakeLocal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(self, track: TrackSummary) -> Self {
        self.state.lock().unwrap().tracks.push(track);
        self
    }

    pub fn with_playlist(self, name: &str, persistent_ids: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = format!("PL{:014}", state.playlists.len() + 1);
            state.playlists.push((
                PlaylistInfo {
                    id,
                    name: name.to_string(),
                    can_edit: true,
                },
                persistent_ids.iter().map(|s| s.to_string()).collect(),
            ));
        }
        self
    }

    pub fn configure(self, f: impl FnOnce(&mut LocalState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls().iter().filter(|c| is_mutation(c)).count()
    }

    pub fn playlist(&self, name: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .playlists
            .iter()
            .find(|(p, _)| p.name == name)
            .map(|(_, ids)| ids.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, LocalState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

fn local_playlist<'a>(
    state: &'a mut LocalState,
    name: &str,
) -> Result<&'a mut (PlaylistInfo, Vec<String>)> {
    state
        .playlists
        .iter_mut()
        .find(|(p, _)| p.name == name)
        .ok_or_else(|| MusicError::InvalidQuery(format!("playlist \"{name}\" not found")))
}

fn track_exists(state: &LocalState, persistent_id: &str) -> Result<()> {
    if state
        .tracks
        .iter()
        .any(|t| t.ids.local_persistent_id.as_deref() == Some(persistent_id))
    {
        Ok(())
    } else {
        Err(MusicError::TrackNotFound(format!(
            "Track not found: {persistent_id}"
        )))
    }
}

#[async_trait]
impl LocalSource for FakeLocal {
    async fn list_library_tracks(&self) -> Result<Vec<TrackSummary>> {
        let mut state = self.record("list_library_tracks".to_string());
        state.read_library();
        Ok(state.tracks.clone())
    }

    async fn search_library(&self, term: &str) -> Result<Vec<TrackSummary>> {
        let mut state = self.record(format!("search_library {term}"));
        state.read_library();
        if state.search_blind {
            return Ok(Vec::new());
        }
        Ok(state
            .tracks
            .iter()
            .filter(|t| matches_term(t, term))
            .cloned()
            .collect())
    }

    async fn track_by_persistent_id(&self, persistent_id: &str) -> Result<Option<TrackSummary>> {
        let state = self.record(format!("track_by_persistent_id {persistent_id}"));
        Ok(state
            .tracks
            .iter()
            .find(|t| t.ids.local_persistent_id.as_deref() == Some(persistent_id))
            .cloned())
    }

    async fn playlist_tracks(&self, playlist: &str) -> Result<Vec<TrackSummary>> {
        let mut state = self.record(format!("playlist_tracks {playlist}"));
        let ids = local_playlist(&mut state, playlist)?.1.clone();
        Ok(ids
            .iter()
            .map(|id| {
                state
                    .tracks
                    .iter()
                    .find(|t| t.ids.local_persistent_id.as_deref() == Some(id.as_str()))
                    .cloned()
                    .unwrap_or_else(|| local_track(id, "", ""))
            })
            .collect())
    }

    async fn add_to_playlist(&self, playlist: &str, persistent_id: &str) -> Result<()> {
        let mut state = self.record(format!("add_to_playlist {playlist} {persistent_id}"));
        track_exists(&state, persistent_id)?;
        if state.drop_adds > 0 {
            state.drop_adds -= 1;
            local_playlist(&mut state, playlist)?;
            return Ok(());
        }
        local_playlist(&mut state, playlist)?
            .1
            .push(persistent_id.to_string());
        Ok(())
    }

    async fn remove_from_playlist(&self, playlist: &str, persistent_id: &str) -> Result<()> {
        let mut state = self.record(format!("remove_from_playlist {playlist} {persistent_id}"));
        let (_, ids) = local_playlist(&mut state, playlist)?;
        match ids.iter().position(|id| id == persistent_id) {
            Some(pos) => {
                ids.remove(pos);
                Ok(())
            }
            None => Err(MusicError::TrackNotFound(format!(
                "Track not in playlist: {persistent_id}"
            ))),
        }
    }

    async fn list_playlists(&self) -> Result<Vec<PlaylistInfo>> {
        let state = self.record("list_playlists".to_string());
        Ok(state.playlists.iter().map(|(p, _)| p.clone()).collect())
    }

    async fn create_playlist(&self, name: &str, _description: &str) -> Result<PlaylistInfo> {
        let mut state = self.record(format!("create_playlist {name}"));
        let info = PlaylistInfo {
            id: format!("PL{:014}", state.playlists.len() + 1),
            name: name.to_string(),
            can_edit: true,
        };
        state.playlists.push((info.clone(), Vec::new()));
        Ok(info)
    }

    async fn set_preference(&self, persistent_id: &str, preference: Preference) -> Result<()> {
        let mut state = self.record(format!("set_preference {persistent_id} {preference}"));
        track_exists(&state, persistent_id)?;
        state
            .preferences
            .insert(persistent_id.to_string(), preference);
        Ok(())
    }

    async fn rating(&self, persistent_id: &str) -> Result<u8> {
        let state = self.record(format!("rating {persistent_id}"));
        track_exists(&state, persistent_id)?;
        Ok(state.ratings.get(persistent_id).copied().unwrap_or(0))
    }

    async fn set_rating(&self, persistent_id: &str, rating: u8) -> Result<()> {
        let mut state = self.record(format!("set_rating {persistent_id} {rating}"));
        track_exists(&state, persistent_id)?;
        state.ratings.insert(persistent_id.to_string(), rating);
        Ok(())
    }

    async fn playback(&self, action: PlaybackAction) -> Result<()> {
        let mut state = self.record(format!("playback {action:?}"));
        state.playback.push(action);
        Ok(())
    }

    async fn now_playing(&self) -> Result<NowPlaying> {
        let state = self.record("now_playing".to_string());
        Ok(NowPlaying {
            state: if state.tracks.is_empty() { "stopped" } else { "playing" }.to_string(),
            track: state.tracks.first().cloned(),
            position_secs: Some(0.0),
            duration_secs: None,
        })
    }

    async fn play_track(&self, persistent_id: &str) -> Result<()> {
        let state = self.record(format!("play_track {persistent_id}"));
        track_exists(&state, persistent_id)
    }

    async fn play_playlist(&self, playlist: &str, shuffle: bool) -> Result<()> {
        let mut state = self.record(format!("play_playlist {playlist} {shuffle}"));
        local_playlist(&mut state, playlist)?;
        Ok(())
    }

    async fn delete_track(&self, persistent_id: &str) -> Result<()> {
        let mut state = self.record(format!("delete_track {persistent_id}"));
        track_exists(&state, persistent_id)?;
        state
            .tracks
            .retain(|t| t.ids.local_persistent_id.as_deref() != Some(persistent_id));
        for (_, ids) in &mut state.playlists {
            ids.retain(|id| id != persistent_id);
        }
        Ok(())
    }

    async fn delete_playlist(&self, playlist: &str) -> Result<()> {
        let mut state = self.record(format!("delete_playlist {playlist}"));
        local_playlist(&mut state, playlist)?;
        state.playlists.retain(|(p, _)| p.name != playlist);
        Ok(())
    }
}

/// Replays canned outputs and records every script it was given
#[derive(Clone, Default)]
pub struct RecordingRunner {
    responses: Arc<Mutex<VecDeque<std::result::Result<String, String>>>>,
    scripts: Arc<Mutex<Vec<String>>>,
}

impl RecordingRunner {
    pub fn new(responses: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            scripts: Arc::default(),
        }
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptRunner for RecordingRunner {
    async fn run(&self, script: &str) -> anyhow::Result<String> {
        self.scripts.lock().unwrap().push(script.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(out)) => Ok(out),
            Some(Err(e)) => Err(anyhow::anyhow!(e)),
            None => Ok(String::new()),
        }
    }
}
