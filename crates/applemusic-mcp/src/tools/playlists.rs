//! Playlist listing, lookup, creation, copy, deletion and batch add/remove

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use applemusic_core::orchestrator::{MutationAction, MutationOptions, PlaylistMutationRequest};
use applemusic_core::{BatchSelector, MusicService};

use super::{
    ToolHandler, backend_arg, backend_property, bool_arg, format, json_schema, merge_properties,
    playlist_target, playlist_target_properties, required_str, selector_properties, str_arg,
    u64_arg,
};

const MAX_LISTED: usize = 10;

pub struct GetLibraryPlaylistsTool {
    service: Arc<MusicService>,
}

impl GetLibraryPlaylistsTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for GetLibraryPlaylistsTool {
    fn name(&self) -> &str {
        "get_library_playlists"
    }

    fn description(&self) -> &str {
        "List your playlists with their IDs. Only playlists created through the \
         API can be edited through it; edit the others by name through Music.app."
    }

    fn input_schema(&self) -> Value {
        json_schema(serde_json::json!({ "backend": backend_property() }), vec![])
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let backend = backend_arg(&input, &self.service)?;
        let playlists = self.service.list_playlists(backend).await?;
        if playlists.is_empty() {
            return Ok("No playlists found".to_string());
        }
        Ok(format!(
            "{} playlists:\n{}",
            playlists.len(),
            format::playlists(&playlists)
        ))
    }
}

pub struct GetPlaylistTracksTool {
    service: Arc<MusicService>,
}

impl GetPlaylistTracksTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for GetPlaylistTracksTool {
    fn name(&self) -> &str {
        "get_playlist_tracks"
    }

    fn description(&self) -> &str {
        "List the tracks of a playlist, by playlist_id (API) or playlist_name (Music.app)."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            merge_properties(
                playlist_target_properties(),
                serde_json::json!({
                    "limit": {
                        "type": "number",
                        "description": "Maximum tracks to list (default: all)"
                    }
                }),
            ),
            vec![],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let target = playlist_target(&input)?;
        let tracks = self.service.playlist_tracks(&target).await?;
        if tracks.is_empty() {
            return Ok(format!("{target} is empty"));
        }
        let total = tracks.len();
        let shown = u64_arg(&input, "limit").map_or(total, |l| (l as usize).min(total));
        let mut out = format!(
            "{target} has {total} tracks:\n{}",
            format::tracks(&tracks[..shown])
        );
        if shown < total {
            out.push_str(&format!("\n...and {} more", total - shown));
        }
        Ok(out)
    }
}

pub struct CheckPlaylistTool {
    service: Arc<MusicService>,
}

impl CheckPlaylistTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for CheckPlaylistTool {
    fn name(&self) -> &str {
        "check_playlist"
    }

    fn description(&self) -> &str {
        "Quickly check whether a song or artist is in a playlist."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            merge_properties(
                serde_json::json!({
                    "search": {
                        "type": "string",
                        "description": "Song name or artist to look for"
                    }
                }),
                playlist_target_properties(),
            ),
            vec!["search"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let search = required_str(&input, "search")?;
        let target = playlist_target(&input)?;
        let matches = self.service.check_playlist(&target, search).await?;
        let lines: Vec<String> = matches
            .iter()
            .map(|t| format!("{} by {}", t.name, t.artist))
            .collect();
        Ok(match lines.as_slice() {
            [] => format!("No matches for '{search}' in {target}"),
            [only] => format!("Found: {only}"),
            many => {
                let mut out = format!("Found {} matches:", many.len());
                for line in many.iter().take(MAX_LISTED) {
                    out.push_str(&format!("\n  - {line}"));
                }
                if many.len() > MAX_LISTED {
                    out.push_str(&format!("\n  ...and {} more", many.len() - MAX_LISTED));
                }
                out
            }
        })
    }
}

pub struct CreatePlaylistTool {
    service: Arc<MusicService>,
}

impl CreatePlaylistTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for CreatePlaylistTool {
    fn name(&self) -> &str {
        "create_playlist"
    }

    fn description(&self) -> &str {
        "Create a new playlist. Playlists created through the API stay editable through it."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "name": {"type": "string", "description": "Name for the new playlist"},
                "description": {"type": "string", "description": "Optional description"},
                "backend": backend_property()
            }),
            vec!["name"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let name = required_str(&input, "name")?;
        let description = str_arg(&input, "description").unwrap_or("");
        let backend = backend_arg(&input, &self.service)?;
        let created = self
            .service
            .create_playlist(backend, name, description)
            .await?;
        Ok(format!("Created playlist '{}' (ID: {})", created.name, created.id))
    }
}

pub struct CopyPlaylistTool {
    service: Arc<MusicService>,
}

impl CopyPlaylistTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for CopyPlaylistTool {
    fn name(&self) -> &str {
        "copy_playlist"
    }

    fn description(&self) -> &str {
        "Copy a playlist into a new one in the same place: playlist_id copies \
         through the API (useful for making a read-only playlist editable), \
         playlist_name copies in Music.app. Every track is reported."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            merge_properties(
                playlist_target_properties(),
                serde_json::json!({
                    "new_name": {"type": "string", "description": "Name for the copy"},
                    "verbose": {
                        "type": "boolean",
                        "description": "Include every step taken per track"
                    }
                }),
            ),
            vec!["new_name"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let source = playlist_target(&input)?;
        let new_name = required_str(&input, "new_name")?;
        let copy = self.service.copy_playlist(&source, new_name).await?;
        let mut out = format!(
            "Created playlist '{}' (ID: {}) from {source}\n{}",
            copy.created.name,
            copy.created.id,
            format::batch(&copy.result, bool_arg(&input, "verbose").unwrap_or(false))
        );
        let unidentified = copy.source_tracks.saturating_sub(copy.result.items.len());
        if unidentified > 0 {
            out.push_str(&format!(
                "\n{unidentified} source tracks had no ID or name and were not copied"
            ));
        }
        Ok(out)
    }
}

pub struct DeletePlaylistTool {
    service: Arc<MusicService>,
}

impl DeletePlaylistTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for DeletePlaylistTool {
    fn name(&self) -> &str {
        "delete_playlist"
    }

    fn description(&self) -> &str {
        "Delete a playlist through Music.app (macOS only). The name must match exactly."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "playlist_name": {"type": "string", "description": "Exact playlist name"}
            }),
            vec!["playlist_name"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let name = required_str(&input, "playlist_name")?;
        self.service.delete_playlist(name).await?;
        Ok(format!("Deleted playlist '{name}'"))
    }
}

fn mutation_properties(extra: Value) -> Value {
    merge_properties(
        merge_properties(playlist_target_properties(), selector_properties()),
        merge_properties(
            serde_json::json!({
                "verify": {
                    "type": "boolean",
                    "description": "Re-read the playlist to confirm the change (default from config)"
                },
                "verbose": {
                    "type": "boolean",
                    "description": "Include every step taken per track"
                }
            }),
            extra,
        ),
    )
}

fn request_from(
    input: &Value,
    action: MutationAction,
    defaults: MutationOptions,
) -> Result<PlaylistMutationRequest> {
    let target = playlist_target(input)?;
    let selectors = BatchSelector::from_args(input)?.flatten()?;
    let options = MutationOptions {
        skip_duplicates: bool_arg(input, "allow_duplicates")
            .map_or(defaults.skip_duplicates, |allow| !allow),
        auto_search_catalog: bool_arg(input, "auto_search").unwrap_or(defaults.auto_search_catalog),
        verify: bool_arg(input, "verify").unwrap_or(defaults.verify),
    };
    Ok(PlaylistMutationRequest {
        target,
        action,
        selectors,
        options,
    })
}

pub struct AddToPlaylistTool {
    service: Arc<MusicService>,
}

impl AddToPlaylistTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for AddToPlaylistTool {
    fn name(&self) -> &str {
        "add_to_playlist"
    }

    fn description(&self) -> &str {
        "Add one or more tracks to a playlist. Tracks may be given by name, by any \
         ID, or as a list of {name, artist, id} objects. Catalog songs are added to \
         the library first, duplicates are skipped and each add is verified. Every \
         track is reported separately."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            mutation_properties(serde_json::json!({
                "allow_duplicates": {
                    "type": "boolean",
                    "description": "Add even when the track is already in the playlist"
                },
                "auto_search": {
                    "type": "boolean",
                    "description": "Search the catalog and add to library when a name is not in the library"
                }
            })),
            vec![],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let request = request_from(&input, MutationAction::Add, self.service.mutation_options())?;
        info!(target = %request.target, items = request.selectors.len(), "add_to_playlist");
        let result = self.service.mutate_playlist(&request).await;
        Ok(format::batch(&result, bool_arg(&input, "verbose").unwrap_or(false)))
    }
}

pub struct RemoveFromPlaylistTool {
    service: Arc<MusicService>,
}

impl RemoveFromPlaylistTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for RemoveFromPlaylistTool {
    fn name(&self) -> &str {
        "remove_from_playlist"
    }

    fn description(&self) -> &str {
        "Remove tracks from a playlist by name through Music.app (macOS only; the \
         Apple Music API cannot remove playlist tracks)."
    }

    fn input_schema(&self) -> Value {
        json_schema(mutation_properties(serde_json::json!({})), vec![])
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let request = request_from(&input, MutationAction::Remove, self.service.mutation_options())?;
        info!(target = %request.target, items = request.selectors.len(), "remove_from_playlist");
        let result = self.service.mutate_playlist(&request).await;
        Ok(format::batch(&result, bool_arg(&input, "verbose").unwrap_or(false)))
    }
}
