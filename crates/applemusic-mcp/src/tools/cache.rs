use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use applemusic_core::MusicService;

use super::{ToolHandler, format, json_schema, str_arg};

pub struct TrackCacheTool {
    service: Arc<MusicService>,
}

impl TrackCacheTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for TrackCacheTool {
    fn name(&self) -> &str {
        "track_cache"
    }

    fn description(&self) -> &str {
        "Inspect or clear the local cache of track identifiers and stable metadata."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "action": {
                    "type": "string",
                    "enum": ["info", "clear"],
                    "description": "info (default) or clear"
                }
            }),
            vec![],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        match str_arg(&input, "action").unwrap_or("info") {
            "info" => Ok(format::cache_stats(&self.service.cache_stats())),
            "clear" => {
                let before = self.service.cache_stats().distinct_tracks;
                self.service.clear_cache();
                Ok(format!("Cleared {before} cached tracks"))
            }
            other => bail!("Unknown action '{}'; use info or clear", other),
        }
    }
}
