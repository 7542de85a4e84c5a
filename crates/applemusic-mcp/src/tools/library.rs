//! Library and catalog search, library adds and identifier lookups

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use applemusic_core::{MatchQuery, MusicService, SearchSource};

use super::{
    ToolHandler, format, json_schema, merge_properties, required_str, selector_properties,
    single_selector, str_arg, u64_arg,
};

const MAX_LIMIT: u64 = 100;

fn query_from(input: &Value) -> Result<MatchQuery> {
    let query = required_str(input, "query")?;
    Ok(MatchQuery::new(query)
        .with_artist(str_arg(input, "artist"))
        .with_album(str_arg(input, "album")))
}

fn limit_from(input: &Value, default: u64) -> usize {
    u64_arg(input, "limit").unwrap_or(default).clamp(1, MAX_LIMIT) as usize
}

fn search_properties(default_limit: u64) -> Value {
    serde_json::json!({
        "query": {
            "type": "string",
            "description": "Track name to search for"
        },
        "artist": {
            "type": "string",
            "description": "Artist to narrow the results"
        },
        "album": {
            "type": "string",
            "description": "Album to narrow the results"
        },
        "limit": {
            "type": "number",
            "description": format!("Maximum results (default: {default_limit})")
        }
    })
}

pub struct SearchLibraryTool {
    service: Arc<MusicService>,
}

impl SearchLibraryTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for SearchLibraryTool {
    fn name(&self) -> &str {
        "search_library"
    }

    fn description(&self) -> &str {
        "Search your music library by track name. Uses Music.app on macOS and the \
         Apple Music API elsewhere. Results carry IDs usable with add_to_playlist; \
         entries marked ~ are partial matches."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            merge_properties(
                search_properties(25),
                serde_json::json!({
                    "source": {
                        "type": "string",
                        "enum": ["local", "library"],
                        "description": "local (Music.app) or library (Apple Music API)"
                    }
                }),
            ),
            vec!["query"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let query = query_from(&input)?;
        let source = match str_arg(&input, "source") {
            Some(s) => match SearchSource::parse(s) {
                Some(SearchSource::Catalog) | None => {
                    bail!("Unknown source '{}'; use local or library", s)
                }
                Some(source) => source,
            },
            None if self.service.sources().local.is_some() => SearchSource::Local,
            None => SearchSource::Library,
        };
        debug!(source = %source, "Searching library for {}", query);
        let found = self
            .service
            .search(source, &query, limit_from(&input, 25))
            .await?;
        if found.is_empty() {
            return Ok(format!("No results for {query} in your {source} library"));
        }
        Ok(format!(
            "Found {} in your {source} library:\n{}",
            found.len(),
            format::candidates(&found)
        ))
    }
}

pub struct SearchCatalogTool {
    service: Arc<MusicService>,
}

impl SearchCatalogTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for SearchCatalogTool {
    fn name(&self) -> &str {
        "search_catalog"
    }

    fn description(&self) -> &str {
        "Search the Apple Music catalog for songs. Returns catalog IDs; use \
         add_to_library or add_to_playlist with them."
    }

    fn input_schema(&self) -> Value {
        json_schema(search_properties(15), vec!["query"])
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let query = query_from(&input)?;
        let found = self
            .service
            .search(SearchSource::Catalog, &query, limit_from(&input, 15))
            .await?;
        if found.is_empty() {
            return Ok(format!("No catalog results for {query}"));
        }
        Ok(format!(
            "Found {} in the catalog:\n{}",
            found.len(),
            format::candidates(&found)
        ))
    }
}

pub struct AddToLibraryTool {
    service: Arc<MusicService>,
}

impl AddToLibraryTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for AddToLibraryTool {
    fn name(&self) -> &str {
        "add_to_library"
    }

    fn description(&self) -> &str {
        "Add catalog songs to your library and report their new library IDs."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "catalog_ids": {
                    "description": "Catalog IDs, comma-separated or as an array",
                    "anyOf": [
                        {"type": "string"},
                        {"type": "array", "items": {"type": "string"}}
                    ]
                }
            }),
            vec!["catalog_ids"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let ids: Vec<String> = match input.get("catalog_ids") {
            Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => bail!("Missing 'catalog_ids' parameter"),
        };
        let added = self.service.add_to_library(&ids).await?;
        let mut lines = vec![format!("Added {} to your library:", added.len())];
        for a in &added {
            match &a.library_id {
                Some(library_id) => lines.push(format!("  {} -> library ID {}", a.catalog_id, library_id)),
                None => lines.push(format!(
                    "  {} -> library ID not available yet; try again shortly",
                    a.catalog_id
                )),
            }
        }
        Ok(lines.join("\n"))
    }
}

pub struct ResolveTrackTool {
    service: Arc<MusicService>,
}

impl ResolveTrackTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for ResolveTrackTool {
    fn name(&self) -> &str {
        "resolve_track"
    }

    fn description(&self) -> &str {
        "Look up one track by name or any ID and report every identifier \
         (catalog, library, Music.app persistent) and stable field known for it."
    }

    fn input_schema(&self) -> Value {
        json_schema(selector_properties(), vec![])
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let selector = single_selector(&input)?;
        let resolved = self.service.resolve_track(&selector).await?;
        Ok(format::resolved(&resolved))
    }
}

pub struct GetSongDetailsTool {
    service: Arc<MusicService>,
}

impl GetSongDetailsTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for GetSongDetailsTool {
    fn name(&self) -> &str {
        "get_song_details"
    }

    fn description(&self) -> &str {
        "Catalog details for one song: album, genre, duration, release date, \
         explicit flag and ISRC."
    }

    fn input_schema(&self) -> Value {
        json_schema(selector_properties(), vec![])
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let selector = single_selector(&input)?;
        let details = self.service.song_details(&selector).await?;
        Ok(format::song_details(&details))
    }
}

pub struct RemoveFromLibraryTool {
    service: Arc<MusicService>,
}

impl RemoveFromLibraryTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for RemoveFromLibraryTool {
    fn name(&self) -> &str {
        "remove_from_library"
    }

    fn description(&self) -> &str {
        "Delete one track from your library through Music.app (macOS only). It \
         also leaves every playlist. Names must match the track exactly; use \
         track_ids with a persistent ID to be certain."
    }

    fn input_schema(&self) -> Value {
        json_schema(selector_properties(), vec![])
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let selector = single_selector(&input)?;
        let removed = self.service.remove_from_library(&selector).await?;
        Ok(format!("Removed from library: {}", removed.display()))
    }
}
