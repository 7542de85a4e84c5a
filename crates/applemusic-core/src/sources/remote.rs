//! Apple Music REST API client

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{PlaylistInfo, Preference, RemoteSource, SongDetails};
use crate::config::Config;
use crate::error::{MusicError, Result};
use crate::ids::{IdKind, TrackRef};
use crate::track::{StableMetadata, TrackSummary};

const PAGE_SIZE: usize = 100;
const MAX_SEARCH_LIMIT: usize = 25;

/// Client for the catalog and `/me/library` endpoints
#[derive(Clone)]
pub struct AppleMusicClient {
    client: Client,
    base_url: String,
    storefront: String,
    developer_token: String,
    user_token: String,
}

impl std::fmt::Debug for AppleMusicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppleMusicClient")
            .field("base_url", &self.base_url)
            .field("storefront", &self.storefront)
            .field("developer_token", &"[REDACTED]")
            .field("user_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResourceList {
    #[serde(default)]
    data: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    attributes: Option<Attributes>,
    #[serde(default)]
    relationships: Option<Relationships>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attributes {
    #[serde(default)]
    name: String,
    #[serde(default)]
    artist_name: String,
    #[serde(default)]
    album_name: String,
    #[serde(default)]
    content_rating: Option<String>,
    #[serde(default)]
    isrc: Option<String>,
    #[serde(default)]
    play_params: Option<PlayParams>,
    #[serde(default)]
    can_edit: Option<bool>,
    #[serde(default)]
    genre_names: Vec<String>,
    #[serde(default)]
    duration_in_millis: Option<u64>,
    #[serde(default)]
    release_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayParams {
    #[serde(default)]
    catalog_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Relationships {
    #[serde(default)]
    library: Option<ResourceList>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: SearchResults,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResults {
    #[serde(rename = "library-songs", default)]
    library_songs: Option<ResourceList>,
    #[serde(default)]
    songs: Option<ResourceList>,
}

impl Resource {
    /// Song resources only; other resource types yield `None`
    fn into_summary(self) -> Option<TrackSummary> {
        let attrs = self.attributes.unwrap_or_default();
        let mut ids = TrackRef::default();
        match self.kind.as_str() {
            "library-songs" | "library-music-videos" => {
                ids.set(IdKind::Library, self.id);
                if let Some(catalog_id) = attrs.play_params.and_then(|p| p.catalog_id) {
                    ids.set(IdKind::Catalog, catalog_id);
                }
            }
            "songs" | "music-videos" => ids.set(IdKind::Catalog, self.id),
            _ => return None,
        }
        let metadata = StableMetadata {
            explicit: attrs.content_rating.map(|r| r.eq_ignore_ascii_case("explicit")),
            isrc: attrs.isrc.filter(|i| !i.is_empty()),
        };
        Some(
            TrackSummary::new(ids, attrs.name, attrs.artist_name)
                .with_album(attrs.album_name)
                .with_metadata(metadata),
        )
    }

    fn into_details(mut self) -> Option<SongDetails> {
        let attrs = self.attributes.get_or_insert_with(Attributes::default);
        let genres = std::mem::take(&mut attrs.genre_names);
        let duration_ms = attrs.duration_in_millis;
        let release_date = attrs.release_date.take().filter(|d| !d.is_empty());
        Some(SongDetails {
            track: self.into_summary()?,
            genres,
            duration_ms,
            release_date,
        })
    }

    fn into_playlist(self) -> PlaylistInfo {
        let attrs = self.attributes.unwrap_or_default();
        PlaylistInfo {
            id: self.id,
            name: attrs.name,
            can_edit: attrs.can_edit.unwrap_or(false),
        }
    }
}

fn summaries(list: Option<ResourceList>) -> Vec<TrackSummary> {
    list.unwrap_or_default()
        .data
        .into_iter()
        .filter_map(Resource::into_summary)
        .collect()
}

/// An Apple Music resource ID checked safe to place in a URL path
fn path_id(id: &str) -> Result<&str> {
    let valid = id.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
        && id.chars().any(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(id)
    } else {
        Err(MusicError::InvalidQuery(format!("'{id}' is not a valid Apple Music ID")))
    }
}

fn remote_err(e: anyhow::Error) -> MusicError {
    MusicError::remote(format!("{e:#}"))
}

impl AppleMusicClient {
    /// Build a client from config; fails without both tokens
    pub fn from_config(config: &Config) -> Result<Self> {
        let developer_token = config
            .tokens
            .developer_token
            .clone()
            .ok_or_else(|| MusicError::Config("developer token not configured".into()))?;
        let user_token = config
            .tokens
            .music_user_token
            .clone()
            .ok_or_else(|| MusicError::Config("music user token not configured".into()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| MusicError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            storefront: config.storefront.clone(),
            developer_token,
            user_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.developer_token)
            .header("Music-User-Token", &self.user_token)
    }

    /// GET returning `None` on 404
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<Option<T>> {
        debug!(path = path, "Apple Music GET");
        let response = self
            .authorized(self.client.get(self.url(path)))
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {path}"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GET {path} failed with status {status}: {body}");
        }
        let parsed = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {path}"))?;
        Ok(Some(parsed))
    }

    async fn paged(&self, path: &str) -> anyhow::Result<Vec<Resource>> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page: Option<ResourceList> = self
                .get_json(
                    path,
                    &[("limit", PAGE_SIZE.to_string()), ("offset", offset.to_string())],
                )
                .await?;
            let Some(page) = page else { break };
            let count = page.data.len();
            all.extend(page.data);
            if count < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(all)
    }

    fn catalog_path(&self, rest: &str) -> String {
        format!("catalog/{}/{}", self.storefront, rest)
    }
}

#[async_trait]
impl RemoteSource for AppleMusicClient {
    async fn search_library(&self, term: &str, limit: usize) -> Result<Vec<TrackSummary>> {
        let response: Option<SearchResponse> = self
            .get_json(
                "me/library/search",
                &[
                    ("term", term.to_string()),
                    ("types", "library-songs".to_string()),
                    ("limit", limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
                ],
            )
            .await
            .map_err(remote_err)?;
        Ok(summaries(response.unwrap_or_default().results.library_songs))
    }

    async fn search_catalog(&self, term: &str, limit: usize) -> Result<Vec<TrackSummary>> {
        let response: Option<SearchResponse> = self
            .get_json(
                &self.catalog_path("search"),
                &[
                    ("term", term.to_string()),
                    ("types", "songs".to_string()),
                    ("limit", limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
                ],
            )
            .await
            .map_err(remote_err)?;
        Ok(summaries(response.unwrap_or_default().results.songs))
    }

    async fn library_id_for_catalog_id(&self, catalog_id: &str) -> Result<Option<String>> {
        let catalog_id = path_id(catalog_id)?;
        let response: Option<ResourceList> = self
            .get_json(
                &self.catalog_path(&format!("songs/{catalog_id}")),
                &[("relate", "library".to_string())],
            )
            .await
            .map_err(remote_err)?;
        Ok(response
            .and_then(|r| r.data.into_iter().next())
            .and_then(|song| song.relationships)
            .and_then(|rel| rel.library)
            .and_then(|lib| lib.data.into_iter().next())
            .map(|lib| lib.id))
    }

    async fn catalog_id_for_library_id(&self, library_id: &str) -> Result<Option<String>> {
        let library_id = path_id(library_id)?;
        let response: Option<ResourceList> = self
            .get_json(&format!("me/library/songs/{library_id}/catalog"), &[])
            .await
            .map_err(remote_err)?;
        Ok(response.and_then(|r| r.data.into_iter().next()).map(|song| song.id))
    }

    async fn catalog_song(&self, catalog_id: &str) -> Result<Option<TrackSummary>> {
        let catalog_id = path_id(catalog_id)?;
        let response: Option<ResourceList> = self
            .get_json(&self.catalog_path(&format!("songs/{catalog_id}")), &[])
            .await
            .map_err(remote_err)?;
        Ok(summaries(response).into_iter().next())
    }

    async fn library_song(&self, library_id: &str) -> Result<Option<TrackSummary>> {
        let library_id = path_id(library_id)?;
        let response: Option<ResourceList> = self
            .get_json(&format!("me/library/songs/{library_id}"), &[])
            .await
            .map_err(remote_err)?;
        Ok(summaries(response).into_iter().next())
    }

    async fn song_details(&self, catalog_id: &str) -> Result<Option<SongDetails>> {
        let catalog_id = path_id(catalog_id)?;
        let response: Option<ResourceList> = self
            .get_json(&self.catalog_path(&format!("songs/{catalog_id}")), &[])
            .await
            .map_err(remote_err)?;
        Ok(response
            .and_then(|r| r.data.into_iter().next())
            .and_then(Resource::into_details))
    }

    async fn add_to_library(&self, catalog_ids: &[String]) -> Result<()> {
        if catalog_ids.is_empty() {
            return Err(MusicError::InvalidQuery("no catalog IDs provided".into()));
        }
        for id in catalog_ids {
            path_id(id)?;
        }
        debug!(count = catalog_ids.len(), "Adding songs to library");
        let response = self
            .authorized(self.client.post(self.url("me/library")))
            .query(&[("ids[songs]", catalog_ids.join(","))])
            .send()
            .await
            .map_err(MusicError::remote)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MusicError::remote(format!(
                "library add failed with status {status}: {body}"
            )));
        }
        Ok(())
    }

    async fn add_to_playlist(&self, playlist_id: &str, library_ids: &[String]) -> Result<()> {
        let playlist_id = path_id(playlist_id)?;
        let data: Vec<serde_json::Value> = library_ids
            .iter()
            .map(|id| serde_json::json!({ "id": id, "type": "library-songs" }))
            .collect();
        let response = self
            .authorized(
                self.client
                    .post(self.url(&format!("me/library/playlists/{playlist_id}/tracks"))),
            )
            .json(&serde_json::json!({ "data": data }))
            .send()
            .await
            .map_err(MusicError::remote)?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::FORBIDDEN | StatusCode::INTERNAL_SERVER_ERROR => {
                Err(MusicError::Unsupported(format!(
                    "playlist {playlist_id} cannot be edited through the API (not created by it); use the playlist name on macOS"
                )))
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(MusicError::remote(format!(
                    "playlist add failed with status {s}: {body}"
                )))
            }
        }
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<TrackSummary>> {
        let playlist_id = path_id(playlist_id)?;
        let resources = self
            .paged(&format!("me/library/playlists/{playlist_id}/tracks"))
            .await
            .map_err(remote_err)?;
        Ok(resources.into_iter().filter_map(Resource::into_summary).collect())
    }

    async fn list_playlists(&self) -> Result<Vec<PlaylistInfo>> {
        let resources = self.paged("me/library/playlists").await.map_err(remote_err)?;
        Ok(resources.into_iter().map(Resource::into_playlist).collect())
    }

    async fn create_playlist(&self, name: &str, description: &str) -> Result<PlaylistInfo> {
        let body = serde_json::json!({
            "attributes": { "name": name, "description": description }
        });
        let response = self
            .authorized(self.client.post(self.url("me/library/playlists")))
            .json(&body)
            .send()
            .await
            .map_err(MusicError::remote)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MusicError::remote(format!(
                "playlist create failed with status {status}: {body}"
            )));
        }
        let created: ResourceList = response.json().await.map_err(MusicError::remote)?;
        created
            .data
            .into_iter()
            .next()
            .map(Resource::into_playlist)
            .ok_or_else(|| MusicError::remote("playlist create returned no playlist"))
    }

    async fn rate_song(&self, catalog_id: &str, preference: Preference) -> Result<()> {
        let catalog_id = path_id(catalog_id)?;
        let value = match preference {
            Preference::Love => 1,
            Preference::Dislike => -1,
        };
        let body = serde_json::json!({ "type": "rating", "attributes": { "value": value } });
        let response = self
            .authorized(
                self.client
                    .put(self.url(&format!("me/ratings/songs/{catalog_id}"))),
            )
            .json(&body)
            .send()
            .await
            .map_err(MusicError::remote)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MusicError::remote(format!("rating failed with status {status}")));
        }
        Ok(())
    }
}
