//! Tool registry and the Apple Music tool handlers

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use applemusic_core::orchestrator::PlaylistTarget;
use applemusic_core::service::Backend;
use applemusic_core::{BatchSelector, MusicService, TrackSelector};

pub mod cache;
pub mod format;
pub mod library;
pub mod playback;
pub mod playlists;
pub mod rating;

#[cfg(test)]
pub(crate) mod stub;

/// Name, description and input schema of one tool
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Individual tool handler
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<String>;
}

/// Registry of available tools
pub struct ToolRegistry {
    tools: HashMap<Arc<str>, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name: Arc<str> = Arc::from(handler.name());
        debug!("Registering tool: {}", name);
        self.tools.insert(name, handler);
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        debug!("Executing tool: {} with input: {:?}", tool_name, input);

        let handler = self
            .tools
            .get(tool_name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", tool_name))?;

        match handler.execute(input).await {
            Ok(result) => {
                debug!("Tool {} succeeded", tool_name);
                Ok(result)
            }
            Err(e) => {
                warn!("Tool {} failed: {}", tool_name, e);
                Err(e)
            }
        }
    }

    /// Definitions sorted by name
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|handler| ToolDefinition {
                name: handler.name().to_string(),
                description: handler.description().to_string(),
                input_schema: handler.input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register every tool the configured sources can serve
pub fn register_all(registry: &mut ToolRegistry, service: Arc<MusicService>) {
    let has_remote = service.sources().remote.is_some();
    let has_local = service.sources().local.is_some();

    registry.register(Arc::new(library::SearchLibraryTool::new(service.clone())));
    registry.register(Arc::new(library::ResolveTrackTool::new(service.clone())));
    registry.register(Arc::new(playlists::GetLibraryPlaylistsTool::new(service.clone())));
    registry.register(Arc::new(playlists::GetPlaylistTracksTool::new(service.clone())));
    registry.register(Arc::new(playlists::CheckPlaylistTool::new(service.clone())));
    registry.register(Arc::new(playlists::CreatePlaylistTool::new(service.clone())));
    registry.register(Arc::new(playlists::AddToPlaylistTool::new(service.clone())));
    registry.register(Arc::new(playlists::CopyPlaylistTool::new(service.clone())));
    registry.register(Arc::new(rating::RatingTool::new(service.clone())));
    registry.register(Arc::new(cache::TrackCacheTool::new(service.clone())));

    if has_remote {
        registry.register(Arc::new(library::SearchCatalogTool::new(service.clone())));
        registry.register(Arc::new(library::AddToLibraryTool::new(service.clone())));
        registry.register(Arc::new(library::GetSongDetailsTool::new(service.clone())));
    }
    if has_local {
        registry.register(Arc::new(playlists::RemoveFromPlaylistTool::new(service.clone())));
        registry.register(Arc::new(playlists::DeletePlaylistTool::new(service.clone())));
        registry.register(Arc::new(library::RemoveFromLibraryTool::new(service.clone())));
        registry.register(Arc::new(playback::PlayTrackTool::new(service.clone())));
        registry.register(Arc::new(playback::PlayPlaylistTool::new(service.clone())));
        registry.register(Arc::new(playback::PlaybackControlTool::new(service.clone())));
        registry.register(Arc::new(playback::NowPlayingTool::new(service)));
    }
}

/// Helper function to create a JSON schema for tool input
pub fn json_schema(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Schema properties shared by every tool that takes track selectors
pub fn selector_properties() -> Value {
    serde_json::json!({
        "track_name": {
            "description": "Track name, or an array of names",
            "anyOf": [
                {"type": "string"},
                {"type": "array", "items": {"type": "string"}}
            ]
        },
        "artist": {
            "description": "Artist to narrow name matches; one for all names, or an array with one per name",
            "anyOf": [
                {"type": "string"},
                {"type": "array", "items": {"type": "string"}}
            ]
        },
        "album": {
            "type": "string",
            "description": "Album to narrow a single name match"
        },
        "track_ids": {
            "description": "Track IDs as a comma-separated string or an array. 16 hex digits are Music.app persistent IDs, i. prefixed IDs are library IDs, other numeric IDs are catalog IDs",
            "anyOf": [
                {"type": "string"},
                {"type": "array", "items": {"type": "string"}}
            ]
        },
        "id_kind": {
            "type": "string",
            "enum": ["catalog", "library", "local"],
            "description": "Override the inferred kind of track_ids"
        },
        "tracks": {
            "description": "Array of {name, artist, album, id, id_kind} objects, or a JSON string holding one",
            "anyOf": [
                {"type": "string"},
                {"type": "array", "items": {"type": "object"}}
            ]
        }
    })
}

/// Merge two `properties` objects
pub fn merge_properties(mut base: Value, extra: Value) -> Value {
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

/// A non-blank string argument
pub fn str_arg<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str> {
    str_arg(input, key).ok_or_else(|| anyhow!("Missing '{}' parameter", key))
}

pub fn bool_arg(input: &Value, key: &str) -> Option<bool> {
    input.get(key).and_then(Value::as_bool)
}

pub fn u64_arg(input: &Value, key: &str) -> Option<u64> {
    input.get(key).and_then(Value::as_u64)
}

/// `playlist_id` targets the API, `playlist_name` targets Music.app
pub fn playlist_target(input: &Value) -> Result<PlaylistTarget> {
    match (str_arg(input, "playlist_id"), str_arg(input, "playlist_name")) {
        (Some(_), Some(_)) => bail!("Provide either playlist_id or playlist_name, not both"),
        (Some(id), None) => Ok(PlaylistTarget::Remote {
            playlist_id: id.to_string(),
        }),
        (None, Some(name)) => Ok(PlaylistTarget::Local {
            playlist_name: name.to_string(),
        }),
        (None, None) => bail!("Provide playlist_id or playlist_name"),
    }
}

pub fn playlist_target_properties() -> Value {
    serde_json::json!({
        "playlist_id": {
            "type": "string",
            "description": "Library playlist ID (from get_library_playlists); edits through the Apple Music API"
        },
        "playlist_name": {
            "type": "string",
            "description": "Playlist name; edits through Music.app (macOS only)"
        }
    })
}

/// `backend` argument, defaulting to the API when it is configured
pub fn backend_arg(input: &Value, service: &MusicService) -> Result<Backend> {
    match str_arg(input, "backend") {
        None => Ok(service.default_backend()?),
        Some(b) => match b.to_lowercase().as_str() {
            "api" | "remote" => Ok(Backend::Remote),
            "local" | "music_app" | "applescript" => Ok(Backend::Local),
            other => bail!("Unknown backend '{}'; use api or local", other),
        },
    }
}

pub fn backend_property() -> Value {
    serde_json::json!({
        "type": "string",
        "enum": ["api", "local"],
        "description": "api (Apple Music API) or local (Music.app); defaults to api when configured"
    })
}

/// Exactly one track selector from the selector arguments
pub fn single_selector(input: &Value) -> Result<TrackSelector> {
    let mut selectors = BatchSelector::from_args(input)?.flatten()?;
    if selectors.len() != 1 {
        bail!("This tool takes a single track, got {}", selectors.len());
    }
    selectors
        .pop()
        .ok_or_else(|| anyhow!("Provide track_name or track_ids"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stub::{stub_service, stub_service_local_only};

    /// Echoes `track_name`, failing when it is absent
    struct EchoTrackTool;

    #[async_trait]
    impl ToolHandler for EchoTrackTool {
        fn name(&self) -> &str {
            "echo_track"
        }

        fn description(&self) -> &str {
            "Repeat the track name"
        }

        fn input_schema(&self) -> Value {
            json_schema(selector_properties(), vec![])
        }

        async fn execute(&self, input: Value) -> Result<String> {
            Ok(required_str(&input, "track_name")?.to_string())
        }
    }

    fn tool_names(registry: &ToolRegistry) -> Vec<String> {
        registry.list_tools().into_iter().map(|d| d.name).collect()
    }

    #[tokio::test]
    async fn test_registry_dispatch() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(EchoTrackTool));
        assert_eq!(registry.len(), 1);
        let out = registry
            .execute("echo_track", serde_json::json!({"track_name": "Hey Jude"}))
            .await
            .unwrap();
        assert_eq!(out, "Hey Jude");
        assert!(registry.execute("echo_track", serde_json::json!({})).await.is_err());
        let err = registry
            .execute("missing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown tool: missing"));
    }

    #[test]
    fn test_all_tools_have_unique_names_and_object_schemas() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry, stub_service());
        let defs = registry.list_tools();
        assert_eq!(defs.len(), registry.len());
        assert_eq!(defs.len(), 20);
        let mut names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        names.dedup();
        assert_eq!(names.len(), defs.len());
        for def in &defs {
            assert_eq!(def.input_schema["type"], "object", "{}", def.name);
            assert!(def.input_schema["properties"].is_object(), "{}", def.name);
            assert!(!def.description.is_empty(), "{}", def.name);
        }
    }

    #[test]
    fn test_remote_tools_need_credentials() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry, stub_service_local_only());
        let names = tool_names(&registry);
        assert!(!names.iter().any(|n| n == "search_catalog"));
        assert!(!names.iter().any(|n| n == "add_to_library"));
        assert!(!names.iter().any(|n| n == "get_song_details"));
        for local in ["playback_control", "play_track", "remove_from_library", "delete_playlist"] {
            assert!(names.iter().any(|n| n == local), "{local}");
        }
        assert!(names.iter().any(|n| n == "copy_playlist"));
    }

    #[test]
    fn test_playlist_target_requires_exactly_one() {
        assert!(playlist_target(&serde_json::json!({})).is_err());
        assert!(
            playlist_target(&serde_json::json!({"playlist_id": "p.1", "playlist_name": "Mix"}))
                .is_err()
        );
        assert_eq!(
            playlist_target(&serde_json::json!({"playlist_name": " Mix "})).unwrap(),
            PlaylistTarget::Local {
                playlist_name: "Mix".into()
            }
        );
    }

    #[test]
    fn test_single_selector_rejects_lists() {
        let err = single_selector(&serde_json::json!({"track_ids": "1,2"})).unwrap_err();
        assert!(err.to_string().contains("single track"));
        assert!(single_selector(&serde_json::json!({"track_name": "Hey Jude"})).is_ok());
    }
}
