//! Music.app playback (macOS only)

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use applemusic_core::MusicService;
use applemusic_core::sources::PlaybackAction;

use super::{
    ToolHandler, bool_arg, format, json_schema, required_str, selector_properties, single_selector,
};

pub struct PlaybackControlTool {
    service: Arc<MusicService>,
}

impl PlaybackControlTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for PlaybackControlTool {
    fn name(&self) -> &str {
        "playback_control"
    }

    fn description(&self) -> &str {
        "Control Music.app playback: play, pause, toggle, next, previous or stop."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "action": {
                    "type": "string",
                    "enum": ["play", "pause", "toggle", "next", "previous", "stop"],
                    "description": "Playback action"
                }
            }),
            vec!["action"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let raw = required_str(&input, "action")?;
        let action = PlaybackAction::parse(raw).ok_or_else(|| {
            anyhow!("Unknown action '{}'; use play, pause, toggle, next, previous or stop", raw)
        })?;
        self.service.playback(action).await?;
        let playing = self.service.now_playing().await.ok();
        Ok(match playing {
            Some(p) if p.track.is_some() => format!("Done. {}", format::now_playing(&p)),
            _ => "Done".to_string(),
        })
    }
}

pub struct NowPlayingTool {
    service: Arc<MusicService>,
}

impl NowPlayingTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for NowPlayingTool {
    fn name(&self) -> &str {
        "get_now_playing"
    }

    fn description(&self) -> &str {
        "Show the track Music.app is playing and the playback position."
    }

    fn input_schema(&self) -> Value {
        json_schema(serde_json::json!({}), vec![])
    }

    async fn execute(&self, _input: Value) -> Result<String> {
        let playing = self.service.now_playing().await?;
        Ok(format::now_playing(&playing))
    }
}

pub struct PlayTrackTool {
    service: Arc<MusicService>,
}

impl PlayTrackTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for PlayTrackTool {
    fn name(&self) -> &str {
        "play_track"
    }

    fn description(&self) -> &str {
        "Play a track from your library in Music.app. Catalog songs must be \
         added with add_to_library first."
    }

    fn input_schema(&self) -> Value {
        json_schema(selector_properties(), vec![])
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let selector = single_selector(&input)?;
        let track = self.service.play_track(&selector).await?;
        Ok(format!("Now playing: {}", track.display()))
    }
}

pub struct PlayPlaylistTool {
    service: Arc<MusicService>,
}

impl PlayPlaylistTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for PlayPlaylistTool {
    fn name(&self) -> &str {
        "play_playlist"
    }

    fn description(&self) -> &str {
        "Start playing a playlist in Music.app, optionally shuffled."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "playlist_name": {"type": "string", "description": "Playlist to play"},
                "shuffle": {"type": "boolean", "description": "Shuffle the playlist (default: false)"}
            }),
            vec!["playlist_name"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let name = required_str(&input, "playlist_name")?;
        let shuffle = bool_arg(&input, "shuffle").unwrap_or(false);
        self.service.play_playlist(name, shuffle).await?;
        Ok(if shuffle {
            format!("Playing playlist '{name}' (shuffled)")
        } else {
            format!("Playing playlist '{name}'")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::stub::stub_service;

    #[tokio::test]
    async fn test_playback_reports_current_track() {
        let tool = PlaybackControlTool::new(stub_service());
        let out = tool
            .execute(serde_json::json!({"action": "next"}))
            .await
            .unwrap();
        assert!(out.starts_with("Done. Playing: Hey Jude - The Beatles"));
        assert!(tool.execute(serde_json::json!({"action": "rewind"})).await.is_err());
    }

    #[tokio::test]
    async fn test_play_track_by_persistent_id() {
        let tool = PlayTrackTool::new(stub_service());
        let out = tool
            .execute(serde_json::json!({"track_ids": "AAAA000000000002"}))
            .await
            .unwrap();
        assert_eq!(out, "Now playing: Let It Be - The Beatles");
        assert!(
            tool.execute(serde_json::json!({"track_name": "Bohemian Rhapsody"}))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_play_playlist_shuffled() {
        let tool = PlayPlaylistTool::new(stub_service());
        let out = tool
            .execute(serde_json::json!({"playlist_name": "Road Trip", "shuffle": true}))
            .await
            .unwrap();
        assert_eq!(out, "Playing playlist 'Road Trip' (shuffled)");
        assert!(
            tool.execute(serde_json::json!({"playlist_name": "Nope"}))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_now_playing() {
        let tool = NowPlayingTool::new(stub_service());
        let out = tool.execute(serde_json::json!({})).await.unwrap();
        assert!(out.ends_with("1:01 / 7:11"));
    }
}
