//! Small in-memory sources for tool tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use applemusic_core::config::Preferences;
use applemusic_core::error::{MusicError, Result};
use applemusic_core::orchestrator::Timing;
use applemusic_core::sources::{
    LocalSource, NowPlaying, PlaybackAction, PlaylistInfo, Preference, RemoteSource, SongDetails,
    Sources,
};
use applemusic_core::track::TrackSummary;
use applemusic_core::{IdKind, MusicService, TrackCache, TrackRef};

fn track(kind: IdKind, id: &str, name: &str, artist: &str) -> TrackSummary {
    let mut ids = TrackRef::default();
    ids.set(kind, id.to_string());
    TrackSummary::new(ids, name, artist)
}

fn matches(t: &TrackSummary, term: &str) -> bool {
    let hay = format!("{} {}", t.name, t.artist).to_lowercase();
    term.to_lowercase().split_whitespace().all(|w| hay.contains(w))
}

fn playlist(id: &str, name: &str) -> PlaylistInfo {
    PlaylistInfo {
        id: id.to_string(),
        name: name.to_string(),
        can_edit: true,
    }
}

pub struct StubRemote {
    catalog: Vec<TrackSummary>,
    library: Mutex<Vec<TrackSummary>>,
    playlists: Mutex<Vec<(PlaylistInfo, Vec<String>)>>,
}

impl StubRemote {
    pub fn new() -> Self {
        let mut hey_jude = track(IdKind::Library, "i.HJ", "Hey Jude", "The Beatles");
        hey_jude.ids.set(IdKind::Catalog, "100".into());
        Self {
            catalog: vec![
                track(IdKind::Catalog, "100", "Hey Jude", "The Beatles"),
                track(IdKind::Catalog, "300", "Uptown Funk", "Mark Ronson"),
            ],
            library: Mutex::new(vec![hey_jude]),
            playlists: Mutex::new(vec![(playlist("p.1", "Mix"), Vec::new())]),
        }
    }
}

#[async_trait]
impl RemoteSource for StubRemote {
    async fn search_library(&self, term: &str, limit: usize) -> Result<Vec<TrackSummary>> {
        let library = self.library.lock().unwrap();
        Ok(library.iter().filter(|t| matches(t, term)).take(limit).cloned().collect())
    }

    async fn search_catalog(&self, term: &str, limit: usize) -> Result<Vec<TrackSummary>> {
        Ok(self.catalog.iter().filter(|t| matches(t, term)).take(limit).cloned().collect())
    }

    async fn library_id_for_catalog_id(&self, catalog_id: &str) -> Result<Option<String>> {
        let library = self.library.lock().unwrap();
        Ok(library
            .iter()
            .find(|t| t.ids.catalog_id.as_deref() == Some(catalog_id))
            .and_then(|t| t.ids.library_id.clone()))
    }

    async fn catalog_id_for_library_id(&self, library_id: &str) -> Result<Option<String>> {
        let library = self.library.lock().unwrap();
        Ok(library
            .iter()
            .find(|t| t.ids.library_id.as_deref() == Some(library_id))
            .and_then(|t| t.ids.catalog_id.clone()))
    }

    async fn catalog_song(&self, catalog_id: &str) -> Result<Option<TrackSummary>> {
        Ok(self
            .catalog
            .iter()
            .find(|t| t.ids.catalog_id.as_deref() == Some(catalog_id))
            .cloned())
    }

    async fn library_song(&self, library_id: &str) -> Result<Option<TrackSummary>> {
        let library = self.library.lock().unwrap();
        Ok(library
            .iter()
            .find(|t| t.ids.library_id.as_deref() == Some(library_id))
            .cloned())
    }

    async fn song_details(&self, catalog_id: &str) -> Result<Option<SongDetails>> {
        Ok(self
            .catalog
            .iter()
            .find(|t| t.ids.catalog_id.as_deref() == Some(catalog_id))
            .map(|t| SongDetails {
                track: t.clone(),
                genres: vec!["Rock".to_string()],
                duration_ms: Some(431_000),
                release_date: Some("1968-08-26".to_string()),
            }))
    }

    async fn add_to_library(&self, catalog_ids: &[String]) -> Result<()> {
        let mut library = self.library.lock().unwrap();
        for id in catalog_ids {
            if library.iter().any(|t| t.ids.catalog_id.as_deref() == Some(id.as_str())) {
                continue;
            }
            let mut song = self
                .catalog
                .iter()
                .find(|t| t.ids.catalog_id.as_deref() == Some(id.as_str()))
                .cloned()
                .ok_or_else(|| MusicError::remote(format!("unknown catalog ID {id}")))?;
            song.ids.set(IdKind::Library, format!("i.{id}"));
            library.push(song);
        }
        Ok(())
    }

    async fn add_to_playlist(&self, playlist_id: &str, library_ids: &[String]) -> Result<()> {
        let mut playlists = self.playlists.lock().unwrap();
        let (_, ids) = playlists
            .iter_mut()
            .find(|(p, _)| p.id == playlist_id)
            .ok_or_else(|| MusicError::remote("no such playlist"))?;
        ids.extend(library_ids.iter().cloned());
        Ok(())
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<TrackSummary>> {
        let playlists = self.playlists.lock().unwrap();
        let library = self.library.lock().unwrap();
        let ids = playlists
            .iter()
            .find(|(p, _)| p.id == playlist_id)
            .map(|(_, ids)| ids.clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| library.iter().find(|t| t.ids.library_id.as_deref() == Some(id.as_str())))
            .cloned()
            .collect())
    }

    async fn list_playlists(&self) -> Result<Vec<PlaylistInfo>> {
        Ok(self.playlists.lock().unwrap().iter().map(|(p, _)| p.clone()).collect())
    }

    async fn create_playlist(&self, name: &str, _description: &str) -> Result<PlaylistInfo> {
        let mut playlists = self.playlists.lock().unwrap();
        let info = playlist(&format!("p.{}", playlists.len() + 1), name);
        playlists.push((info.clone(), Vec::new()));
        Ok(info)
    }

    async fn rate_song(&self, _catalog_id: &str, _preference: Preference) -> Result<()> {
        Ok(())
    }
}

pub struct StubLocal {
    tracks: Mutex<Vec<TrackSummary>>,
    playlists: Mutex<Vec<(PlaylistInfo, Vec<String>)>>,
    ratings: Mutex<HashMap<String, u8>>,
    pub actions: Mutex<Vec<PlaybackAction>>,
}

impl StubLocal {
    pub fn new() -> Self {
        Self {
            tracks: Mutex::new(vec![
                track(IdKind::LocalPersistent, "AAAA000000000001", "Hey Jude", "The Beatles"),
                track(IdKind::LocalPersistent, "AAAA000000000002", "Let It Be", "The Beatles"),
            ]),
            playlists: Mutex::new(vec![(
                playlist("PL00000000000001", "Road Trip"),
                vec!["AAAA000000000002".to_string()],
            )]),
            ratings: Mutex::new(HashMap::new()),
            actions: Mutex::new(Vec::new()),
        }
    }

    fn find_track(&self, persistent_id: &str) -> Option<TrackSummary> {
        self.tracks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.ids.local_persistent_id.as_deref() == Some(persistent_id))
            .cloned()
    }

    fn with_playlist<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Vec<String>) -> Result<T>,
    ) -> Result<T> {
        let mut playlists = self.playlists.lock().unwrap();
        let (_, ids) = playlists
            .iter_mut()
            .find(|(p, _)| p.name == name)
            .ok_or_else(|| MusicError::InvalidQuery(format!("playlist \"{name}\" not found")))?;
        f(ids)
    }
}

#[async_trait]
impl LocalSource for StubLocal {
    async fn list_library_tracks(&self) -> Result<Vec<TrackSummary>> {
        Ok(self.tracks.lock().unwrap().clone())
    }

    async fn search_library(&self, term: &str) -> Result<Vec<TrackSummary>> {
        let tracks = self.tracks.lock().unwrap();
        Ok(tracks.iter().filter(|t| matches(t, term)).cloned().collect())
    }

    async fn track_by_persistent_id(&self, persistent_id: &str) -> Result<Option<TrackSummary>> {
        Ok(self.find_track(persistent_id))
    }

    async fn playlist_tracks(&self, playlist: &str) -> Result<Vec<TrackSummary>> {
        let ids = self.with_playlist(playlist, |ids| Ok(ids.clone()))?;
        Ok(ids.iter().filter_map(|id| self.find_track(id)).collect())
    }

    async fn add_to_playlist(&self, playlist: &str, persistent_id: &str) -> Result<()> {
        self.with_playlist(playlist, |ids| {
            ids.push(persistent_id.to_string());
            Ok(())
        })
    }

    async fn remove_from_playlist(&self, playlist: &str, persistent_id: &str) -> Result<()> {
        self.with_playlist(playlist, |ids| match ids.iter().position(|id| id == persistent_id) {
            Some(pos) => {
                ids.remove(pos);
                Ok(())
            }
            None => Err(MusicError::TrackNotFound(persistent_id.to_string())),
        })
    }

    async fn list_playlists(&self) -> Result<Vec<PlaylistInfo>> {
        Ok(self.playlists.lock().unwrap().iter().map(|(p, _)| p.clone()).collect())
    }

    async fn create_playlist(&self, name: &str, _description: &str) -> Result<PlaylistInfo> {
        let mut playlists = self.playlists.lock().unwrap();
        let info = playlist(&format!("PL{:014}", playlists.len() + 1), name);
        playlists.push((info.clone(), Vec::new()));
        Ok(info)
    }

    async fn set_preference(&self, _persistent_id: &str, _preference: Preference) -> Result<()> {
        Ok(())
    }

    async fn rating(&self, persistent_id: &str) -> Result<u8> {
        Ok(self.ratings.lock().unwrap().get(persistent_id).copied().unwrap_or(0))
    }

    async fn set_rating(&self, persistent_id: &str, rating: u8) -> Result<()> {
        self.ratings.lock().unwrap().insert(persistent_id.to_string(), rating);
        Ok(())
    }

    async fn playback(&self, action: PlaybackAction) -> Result<()> {
        self.actions.lock().unwrap().push(action);
        Ok(())
    }

    async fn now_playing(&self) -> Result<NowPlaying> {
        Ok(NowPlaying {
            state: "playing".to_string(),
            track: self.tracks.lock().unwrap().first().cloned(),
            position_secs: Some(61.0),
            duration_secs: Some(431.0),
        })
    }

    async fn play_track(&self, persistent_id: &str) -> Result<()> {
        self.find_track(persistent_id)
            .map(|_| ())
            .ok_or_else(|| MusicError::TrackNotFound(persistent_id.to_string()))
    }

    async fn play_playlist(&self, playlist: &str, _shuffle: bool) -> Result<()> {
        self.with_playlist(playlist, |_| Ok(()))
    }

    async fn delete_track(&self, persistent_id: &str) -> Result<()> {
        self.tracks
            .lock()
            .unwrap()
            .retain(|t| t.ids.local_persistent_id.as_deref() != Some(persistent_id));
        for (_, ids) in self.playlists.lock().unwrap().iter_mut() {
            ids.retain(|id| id != persistent_id);
        }
        Ok(())
    }

    async fn delete_playlist(&self, playlist: &str) -> Result<()> {
        self.with_playlist(playlist, |_| Ok(()))?;
        self.playlists.lock().unwrap().retain(|(p, _)| p.name != playlist);
        Ok(())
    }
}

fn service(remote: Option<Arc<dyn RemoteSource>>, local: Option<Arc<dyn LocalSource>>) -> Arc<MusicService> {
    Arc::new(MusicService::with_timing(
        Sources::new(remote, local),
        Arc::new(TrackCache::in_memory()),
        Preferences::default(),
        Timing::immediate(),
    ))
}

pub fn stub_service() -> Arc<MusicService> {
    service(Some(Arc::new(StubRemote::new())), Some(Arc::new(StubLocal::new())))
}

pub fn stub_service_local_only() -> Arc<MusicService> {
    service(None, Some(Arc::new(StubLocal::new())))
}
