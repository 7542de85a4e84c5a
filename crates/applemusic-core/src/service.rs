//! Operations exposed to tool handlers
//!
//! [`MusicService`] owns the cache, the configured sources and the
//! orchestrator, and offers every library, playlist, rating and playback
//! operation in terms of typed results. Rendering is left to the caller.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, ResolvedTrack};
use crate::cache::{CacheStats, TrackCache};
use crate::config::{Config, Preferences};
use crate::error::{MusicError, Result};
use crate::ids::{IdKind, TrackId};
use crate::matching::{MatchCandidate, MatchQuery, MatchTier, SearchSource, normalize};
use crate::orchestrator::{
    BatchResult, MutationAction, MutationOptions, Orchestrator, PlaylistMutationRequest,
    PlaylistTarget, Timing,
};
use crate::selector::TrackSelector;
use crate::sources::applescript::AppleScriptLibrary;
use crate::sources::remote::AppleMusicClient;
use crate::sources::{
    LocalSource, NowPlaying, PlaybackAction, PlaylistInfo, Preference, RemoteSource, SongDetails,
    Sources,
};
use crate::track::TrackSummary;

/// Which store a playlist operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Remote,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingAction {
    Preference(Preference),
    Get,
    /// 0 to 5 stars
    Set(u8),
}

impl RatingAction {
    pub fn parse(action: &str, stars: Option<u8>) -> Result<Self> {
        if let Some(p) = Preference::parse(action) {
            return Ok(RatingAction::Preference(p));
        }
        match action.trim().to_lowercase().as_str() {
            "get" => Ok(RatingAction::Get),
            "set" => match stars {
                Some(s) if s <= 5 => Ok(RatingAction::Set(s)),
                Some(s) => Err(MusicError::InvalidQuery(format!(
                    "stars must be between 0 and 5, got {s}"
                ))),
                None => Err(MusicError::InvalidQuery("set needs stars (0-5)".into())),
            },
            other => Err(MusicError::InvalidQuery(format!(
                "unknown rating action '{other}'; use love, dislike, get or set"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RatingOutcome {
    pub track: ResolvedTrack,
    pub backend: Backend,
    /// Stars after a get or set
    pub stars: Option<u8>,
}

/// One catalog ID passed to [`MusicService::add_to_library`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryAddition {
    pub catalog_id: String,
    /// `None` when the library had not caught up within the poll budget
    pub library_id: Option<String>,
}

/// Result of [`MusicService::copy_playlist`]
#[derive(Debug, Clone)]
pub struct PlaylistCopy {
    pub created: PlaylistInfo,
    pub source_tracks: usize,
    pub result: BatchResult,
}

pub struct MusicService {
    bridge: Arc<Bridge>,
    orchestrator: Orchestrator,
    preferences: Preferences,
    timing: Timing,
}

impl MusicService {
    pub fn new(sources: Sources, cache: Arc<TrackCache>, preferences: Preferences) -> Self {
        let timing = Timing::from_preferences(&preferences);
        Self::with_timing(sources, cache, preferences, timing)
    }

    pub fn with_timing(
        sources: Sources,
        cache: Arc<TrackCache>,
        preferences: Preferences,
        timing: Timing,
    ) -> Self {
        let bridge = Arc::new(Bridge::new(cache, sources));
        Self {
            orchestrator: Orchestrator::new(bridge.clone(), timing),
            bridge,
            preferences,
            timing,
        }
    }

    /// Build the sources this process can reach: the REST API when both
    /// tokens are configured, Music.app on macOS
    pub fn from_config(config: &Config) -> Self {
        let remote: Option<Arc<dyn RemoteSource>> = if config.has_remote_credentials() {
            match AppleMusicClient::from_config(config) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("Apple Music API disabled: {}", e);
                    None
                }
            }
        } else {
            info!("No Apple Music tokens configured; API tools disabled");
            None
        };

        let local: Option<Arc<dyn LocalSource>> = if cfg!(target_os = "macos") {
            Some(Arc::new(AppleScriptLibrary::osascript(
                config.applescript.timeout_secs,
            )))
        } else {
            None
        };

        let cache = Arc::new(TrackCache::open_file(config.cache_path()));
        info!(
            remote = remote.is_some(),
            local = local.is_some(),
            cache = %config.cache_path().display(),
            "Music service ready"
        );
        Self::new(Sources::new(remote, local), cache, config.preferences.clone())
    }

    pub fn sources(&self) -> &Sources {
        self.bridge.sources()
    }

    pub fn cache(&self) -> &TrackCache {
        self.bridge.cache()
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn mutation_options(&self) -> MutationOptions {
        MutationOptions::from_preferences(&self.preferences)
    }

    /// Remote API when configured, otherwise Music.app
    pub fn default_backend(&self) -> Result<Backend> {
        let sources = self.sources();
        if sources.remote.is_some() {
            Ok(Backend::Remote)
        } else if sources.local.is_some() {
            Ok(Backend::Local)
        } else {
            Err(MusicError::Unsupported(
                "no Apple Music API tokens are configured and Music.app is unavailable".into(),
            ))
        }
    }

    /// Search order for name selectors: the local library, the remote
    /// library, then the catalog, skipping sources that are not configured
    pub fn search_order(&self) -> Vec<SearchSource> {
        let sources = self.sources();
        let mut order = Vec::with_capacity(3);
        if sources.local.is_some() {
            order.push(SearchSource::Local);
        }
        if sources.remote.is_some() {
            order.extend([SearchSource::Library, SearchSource::Catalog]);
        }
        order
    }

    /// Search order for names that must end up with an API identifier
    fn remote_order(&self) -> Vec<SearchSource> {
        self.search_order()
            .into_iter()
            .filter(|s| *s != SearchSource::Local)
            .collect()
    }

    /// Ranked candidates from one source. Correlated identifiers and stable
    /// fields seen in the results are cached.
    pub async fn search(
        &self,
        source: SearchSource,
        query: &MatchQuery,
        limit: usize,
    ) -> Result<Vec<MatchCandidate>> {
        let found = self
            .bridge
            .resolver()
            .find_limited(source, query, limit)
            .await?;
        for candidate in &found {
            let track = &candidate.track;
            if track.ids.ids().len() > 1 || !track.metadata.is_empty() {
                self.bridge.learn(&track.ids, &track.metadata);
            }
        }
        Ok(found)
    }

    /// Add catalog songs to the remote library and wait for their library IDs
    pub async fn add_to_library(&self, catalog_ids: &[String]) -> Result<Vec<LibraryAddition>> {
        let ids: Vec<String> = catalog_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(MusicError::InvalidQuery("no catalog IDs given".into()));
        }
        if let Some(bad) = ids.iter().find(|id| IdKind::infer(id) != Some(IdKind::Catalog)) {
            return Err(MusicError::InvalidQuery(format!(
                "'{bad}' is not a catalog ID; catalog IDs are numeric"
            )));
        }

        self.sources().remote()?.add_to_library(&ids).await?;
        info!(count = ids.len(), "Added songs to library");

        let mut additions = Vec::with_capacity(ids.len());
        for catalog_id in ids {
            let library_id = self
                .bridge
                .await_library_id(
                    &catalog_id,
                    self.timing.library_sync_polls,
                    self.timing.library_sync_interval,
                )
                .await?;
            additions.push(LibraryAddition {
                catalog_id,
                library_id,
            });
        }
        Ok(additions)
    }

    pub async fn mutate_playlist(&self, request: &PlaylistMutationRequest) -> BatchResult {
        self.orchestrator.apply(request).await
    }

    pub async fn list_playlists(&self, backend: Backend) -> Result<Vec<PlaylistInfo>> {
        match backend {
            Backend::Remote => self.sources().remote()?.list_playlists().await,
            Backend::Local => self.sources().local()?.list_playlists().await,
        }
    }

    /// Tracks of a playlist; identifier pairs seen in the listing are cached
    pub async fn playlist_tracks(&self, target: &PlaylistTarget) -> Result<Vec<TrackSummary>> {
        let tracks = match target {
            PlaylistTarget::Remote { playlist_id } => {
                self.sources().remote()?.playlist_tracks(playlist_id).await?
            }
            PlaylistTarget::Local { playlist_name } => {
                self.sources().local()?.playlist_tracks(playlist_name).await?
            }
        };
        for track in &tracks {
            if track.ids.ids().len() > 1 {
                self.bridge.learn(&track.ids, &track.metadata);
            }
        }
        Ok(tracks)
    }

    /// Create `new_name` in the same store as `source` and add every source
    /// track to it in order, duplicates included. Each track is verified and
    /// reported like any other batch item.
    pub async fn copy_playlist(&self, source: &PlaylistTarget, new_name: &str) -> Result<PlaylistCopy> {
        let tracks = self.playlist_tracks(source).await?;
        let backend = match source {
            PlaylistTarget::Remote { .. } => Backend::Remote,
            PlaylistTarget::Local { .. } => Backend::Local,
        };
        let created = self.create_playlist(backend, new_name, "").await?;
        let target = match backend {
            Backend::Remote => PlaylistTarget::Remote {
                playlist_id: created.id.clone(),
            },
            Backend::Local => PlaylistTarget::Local {
                playlist_name: created.name.clone(),
            },
        };
        let kind = target.id_kind();
        let selectors: Vec<TrackSelector> = tracks
            .iter()
            .filter_map(|t| match t.ids.get(kind) {
                Some(id) => Some(TrackSelector::Id(TrackId::new(kind, id))),
                None if !t.name.is_empty() => Some(TrackSelector::Name(
                    MatchQuery::new(t.name.clone()).with_artist(Some(t.artist.clone())),
                )),
                None => None,
            })
            .collect();
        info!(
            from = %source,
            to = %target,
            tracks = selectors.len(),
            "Copying playlist"
        );
        let request = PlaylistMutationRequest {
            target,
            action: MutationAction::Add,
            selectors,
            options: MutationOptions {
                skip_duplicates: false,
                auto_search_catalog: false,
                verify: self.preferences.verify,
            },
        };
        let result = self.orchestrator.apply(&request).await;
        Ok(PlaylistCopy {
            created,
            source_tracks: tracks.len(),
            result,
        })
    }

    /// Delete a Music.app playlist by exact name
    pub async fn delete_playlist(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MusicError::InvalidQuery("playlist name must not be empty".into()));
        }
        self.sources().local()?.delete_playlist(name).await?;
        info!("Deleted playlist {}", name);
        Ok(())
    }

    /// Playlist members whose name or artist contains `search`
    pub async fn check_playlist(
        &self,
        target: &PlaylistTarget,
        search: &str,
    ) -> Result<Vec<TrackSummary>> {
        let needle = normalize(search);
        if needle.is_empty() {
            return Err(MusicError::InvalidQuery("search must not be empty".into()));
        }
        let tracks = self.playlist_tracks(target).await?;
        Ok(tracks
            .into_iter()
            .filter(|t| normalize(&t.name).contains(&needle) || normalize(&t.artist).contains(&needle))
            .collect())
    }

    pub async fn create_playlist(
        &self,
        backend: Backend,
        name: &str,
        description: &str,
    ) -> Result<PlaylistInfo> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MusicError::InvalidQuery("playlist name must not be empty".into()));
        }
        let created = match backend {
            Backend::Remote => {
                self.sources()
                    .remote()?
                    .create_playlist(name, description)
                    .await?
            }
            Backend::Local => {
                self.sources()
                    .local()?
                    .create_playlist(name, description)
                    .await?
            }
        };
        info!(id = %created.id, "Created playlist {}", created.name);
        Ok(created)
    }

    /// Love or dislike through Music.app when the track is in the local
    /// library, otherwise through the ratings API. Stars are Music.app only
    /// and are verified by reading them back.
    pub async fn rate(&self, selector: &TrackSelector, action: RatingAction) -> Result<RatingOutcome> {
        match action {
            RatingAction::Preference(preference) => {
                if self.prefers_local(selector) {
                    match self.resolve_local(selector).await {
                        Ok((track, pid)) => {
                            self.sources()
                                .local()?
                                .set_preference(&pid, preference)
                                .await?;
                            return Ok(RatingOutcome {
                                track,
                                backend: Backend::Local,
                                stars: None,
                            });
                        }
                        Err(MusicError::NotFound { .. }) if self.sources().remote.is_some() => {
                            debug!(selector = %selector, "Not in local library, rating through the API");
                        }
                        Err(e) => return Err(e),
                    }
                }
                let track = self
                    .bridge
                    .resolve(selector, IdKind::Catalog, &self.remote_order())
                    .await?;
                let Some(catalog_id) = track.ids.catalog_id.clone() else {
                    return Err(MusicError::not_found(selector.to_string()));
                };
                self.sources()
                    .remote()?
                    .rate_song(&catalog_id, preference)
                    .await?;
                Ok(RatingOutcome {
                    track,
                    backend: Backend::Remote,
                    stars: None,
                })
            }
            RatingAction::Get => {
                let (track, pid) = self.resolve_local(selector).await?;
                let rating = self.sources().local()?.rating(&pid).await?;
                Ok(RatingOutcome {
                    track,
                    backend: Backend::Local,
                    stars: Some(rating / 20),
                })
            }
            RatingAction::Set(stars) => {
                let stars = stars.min(5);
                let (track, pid) = self.resolve_local(selector).await?;
                let local = self.sources().local()?;
                local.set_rating(&pid, stars * 20).await?;
                let stored = local.rating(&pid).await?;
                if stored != stars * 20 {
                    return Err(MusicError::VerificationFailed(format!(
                        "{} reads back as {}/100 after setting {}/100",
                        track.display(),
                        stored,
                        stars * 20
                    )));
                }
                Ok(RatingOutcome {
                    track,
                    backend: Backend::Local,
                    stars: Some(stars),
                })
            }
        }
    }

    fn prefers_local(&self, selector: &TrackSelector) -> bool {
        self.sources().local.is_some()
            && match selector {
                TrackSelector::Name(_) => true,
                TrackSelector::Id(id) => id.kind == IdKind::LocalPersistent,
            }
    }

    async fn resolve_local(&self, selector: &TrackSelector) -> Result<(ResolvedTrack, String)> {
        self.sources().local()?;
        let track = self
            .bridge
            .resolve(selector, IdKind::LocalPersistent, &[SearchSource::Local])
            .await?;
        match track.ids.local_persistent_id.clone() {
            Some(pid) => Ok((track, pid)),
            None => Err(MusicError::not_found(selector.to_string())),
        }
    }

    pub async fn playback(&self, action: PlaybackAction) -> Result<()> {
        debug!(?action, "Playback control");
        self.sources().local()?.playback(action).await
    }

    pub async fn now_playing(&self) -> Result<NowPlaying> {
        let playing = self.sources().local()?.now_playing().await?;
        if let Some(track) = &playing.track
            && track.ids.ids().len() > 1
        {
            self.bridge.learn(&track.ids, &track.metadata);
        }
        Ok(playing)
    }

    /// Play a track from the Music.app library
    pub async fn play_track(&self, selector: &TrackSelector) -> Result<ResolvedTrack> {
        let (track, pid) = self.resolve_local(selector).await?;
        self.sources().local()?.play_track(&pid).await?;
        info!("Playing {}", track.display());
        Ok(track)
    }

    pub async fn play_playlist(&self, name: &str, shuffle: bool) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MusicError::InvalidQuery("playlist name must not be empty".into()));
        }
        self.sources().local()?.play_playlist(name, shuffle).await
    }

    /// Delete a track from the Music.app library. Names must match exactly;
    /// the deleted persistent ID is dropped from the cache.
    pub async fn remove_from_library(&self, selector: &TrackSelector) -> Result<ResolvedTrack> {
        let local = self.sources().local()?;
        let (track, pid) = match selector {
            TrackSelector::Name(query) => {
                let exact = self
                    .bridge
                    .resolver()
                    .find(SearchSource::Local, query)
                    .await?
                    .into_iter()
                    .find(|c| c.tier == MatchTier::Exact)
                    .ok_or_else(|| {
                        MusicError::not_found(format!("{selector} (removal needs an exact name match)"))
                    })?;
                let track = ResolvedTrack::from_summary(exact.track);
                match track.ids.local_persistent_id.clone() {
                    Some(pid) => (track, pid),
                    None => return Err(MusicError::not_found(selector.to_string())),
                }
            }
            TrackSelector::Id(_) => self.resolve_local(selector).await?,
        };
        local.delete_track(&pid).await?;
        self.cache().forget(&TrackId::local(pid.as_str()));
        info!("Removed {} from library", track.display());
        Ok(track)
    }

    /// Catalog details for a track; stable fields are cached on the way
    pub async fn song_details(&self, selector: &TrackSelector) -> Result<SongDetails> {
        let remote = self.sources().remote()?;
        let track = self
            .bridge
            .resolve(selector, IdKind::Catalog, &self.remote_order())
            .await?;
        let Some(catalog_id) = track.ids.catalog_id.clone() else {
            return Err(MusicError::not_found(selector.to_string()));
        };
        let mut details = remote
            .song_details(&catalog_id)
            .await?
            .ok_or_else(|| MusicError::not_found(format!("catalog ID {catalog_id}")))?;
        details.track.ids.absorb(&track.ids);
        details.track.metadata = self.bridge.learn(&details.track.ids, &details.track.metadata);
        Ok(details)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    pub fn clear_cache(&self) {
        info!("Clearing track cache");
        self.cache().clear();
    }

    /// Every identifier and stable field that can be learned for `selector`
    pub async fn resolve_track(&self, selector: &TrackSelector) -> Result<ResolvedTrack> {
        let order = self.search_order();
        if order.is_empty() {
            // Only the cache can answer
            if let TrackSelector::Id(id) = selector
                && let Some(hit) = self.cache().lookup(id)
            {
                return Ok(ResolvedTrack {
                    ids: hit.ids,
                    metadata: hit.metadata,
                    summary: None,
                });
            }
            return Err(MusicError::not_found(selector.to_string()));
        }
        self.bridge.resolve_all(selector, &order).await
    }

}
