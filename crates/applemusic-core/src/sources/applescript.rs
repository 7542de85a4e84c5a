//! Music.app automation via `osascript`

use anyhow::anyhow;
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{LocalSource, NowPlaying, PlaybackAction, PlaylistInfo, Preference, ScriptRunner};
use crate::error::{MusicError, Result};
use crate::ids::{IdKind, TrackRef};
use crate::track::TrackSummary;

const FIELD_SEP: &str = "|||";
const ERROR_PREFIX: &str = "ERROR:";
const MAX_SEARCH_RESULTS: usize = 100;

/// Escape a string for use inside an AppleScript string literal
pub fn escape_applescript(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\n', '\r'], " ")
        .chars()
        .filter(|&c| c >= ' ' || c == '\t')
        .collect()
}

/// Runs scripts with `osascript -e`, bounded by a timeout
#[derive(Debug, Clone)]
pub struct OsascriptRunner {
    timeout: Duration,
}

impl OsascriptRunner {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl ScriptRunner for OsascriptRunner {
    async fn run(&self, script: &str) -> anyhow::Result<String> {
        match tokio::time::timeout(
            self.timeout,
            Command::new("osascript").arg("-e").arg(script).output(),
        )
        .await
        {
            Ok(Ok(output)) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
            }
            Ok(Ok(output)) => {
                let error = String::from_utf8_lossy(&output.stderr).trim().to_string();
                warn!("AppleScript failed: {}", error);
                Err(anyhow!("AppleScript failed: {}", error))
            }
            Ok(Err(e)) => Err(anyhow!("Failed to execute osascript: {}", e)),
            Err(_) => Err(anyhow!(
                "AppleScript execution timed out after {} seconds",
                self.timeout.as_secs()
            )),
        }
    }
}

/// Sets `targetPlaylist`, exact name first, then the first name containing it
fn find_playlist(name: &str) -> String {
    let safe = escape_applescript(name);
    format!(
        r#"
    try
        set targetPlaylist to first user playlist whose name is "{safe}"
    on error
        try
            set targetPlaylist to first user playlist whose name contains "{safe}"
        on error
            return "ERROR:Playlist not found"
        end try
    end try"#
    )
}

/// Sets `targetTrack` to the library track with the given persistent ID
fn find_library_track(persistent_id: &str) -> String {
    let safe = escape_applescript(persistent_id);
    format!(
        r#"
    try
        set targetTrack to first track of library playlist 1 whose persistent ID is "{safe}"
    on error
        return "ERROR:Track not found"
    end try"#
    )
}

/// Emits one `name|||artist|||album|||duration|||persistentID` line per track
fn track_rows(list_expr: &str, limit: Option<usize>) -> String {
    let limit_clause = limit
        .map(|n| format!("if resultCount >= {n} then exit repeat"))
        .unwrap_or_default();
    format!(
        r#"
    set output to ""
    set resultCount to 0
    repeat with t in {list_expr}
        {limit_clause}
        set output to output & (name of t) & "|||" & (artist of t) & "|||" & (album of t) & "|||" & (duration of t) & "|||" & (persistent ID of t) & "\n"
        set resultCount to resultCount + 1
    end repeat
    return output"#
    )
}

fn tell_music(body: &str) -> String {
    format!("tell application \"Music\"{body}\nend tell")
}

fn parse_track_rows(output: &str) -> Vec<TrackSummary> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(FIELD_SEP).collect();
            if parts.len() < 5 {
                return None;
            }
            let mut ids = TrackRef::default();
            ids.set(IdKind::LocalPersistent, parts[4].trim().to_string());
            if ids.is_empty() {
                return None;
            }
            Some(TrackSummary::new(ids, parts[0], parts[1]).with_album(parts[2]))
        })
        .collect()
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse().ok()
}

/// Map an `ERROR:` reply to a typed error
fn script_error(message: &str, subject: &str) -> MusicError {
    match message {
        "Playlist not found" => MusicError::InvalidQuery(format!("playlist \"{subject}\" not found")),
        "Track not found" | "Track not in playlist" => {
            MusicError::TrackNotFound(format!("{message}: {subject}"))
        }
        _ => MusicError::local(message),
    }
}

/// The local Music.app library, driven through a [`ScriptRunner`]
pub struct AppleScriptLibrary<R: ScriptRunner> {
    runner: R,
}

impl<R: ScriptRunner> AppleScriptLibrary<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Run a script, turning `ERROR:` replies into errors about `subject`
    async fn run(&self, script: &str, subject: &str) -> Result<String> {
        let output = self
            .runner
            .run(script)
            .await
            .map_err(|e| MusicError::local(format!("{e:#}")))?;
        match output.strip_prefix(ERROR_PREFIX) {
            Some(message) => Err(script_error(message.trim(), subject)),
            None => Ok(output),
        }
    }
}

impl AppleScriptLibrary<OsascriptRunner> {
    pub fn osascript(timeout_secs: u64) -> Self {
        Self::new(OsascriptRunner::new(timeout_secs))
    }
}

#[async_trait]
impl<R: ScriptRunner> LocalSource for AppleScriptLibrary<R> {
    async fn list_library_tracks(&self) -> Result<Vec<TrackSummary>> {
        let script = tell_music(&track_rows("tracks of library playlist 1", None));
        let output = self.run(&script, "library").await?;
        Ok(parse_track_rows(&output))
    }

    async fn search_library(&self, term: &str) -> Result<Vec<TrackSummary>> {
        let safe = escape_applescript(term);
        let body = format!(
            "\n    set searchResults to search library playlist 1 for \"{safe}\" only songs{}",
            track_rows("searchResults", Some(MAX_SEARCH_RESULTS))
        );
        let output = self.run(&tell_music(&body), term).await?;
        let tracks = parse_track_rows(&output);
        debug!(term = term, count = tracks.len(), "Local library search");
        Ok(tracks)
    }

    async fn track_by_persistent_id(&self, persistent_id: &str) -> Result<Option<TrackSummary>> {
        let safe = escape_applescript(persistent_id);
        let list = format!(r#"(every track of library playlist 1 whose persistent ID is "{safe}")"#);
        let output = self.run(&tell_music(&track_rows(&list, Some(1))), persistent_id).await?;
        Ok(parse_track_rows(&output).into_iter().next())
    }

    async fn playlist_tracks(&self, playlist: &str) -> Result<Vec<TrackSummary>> {
        let body = format!(
            "{}{}",
            find_playlist(playlist),
            track_rows("tracks of targetPlaylist", None)
        );
        let output = self.run(&tell_music(&body), playlist).await?;
        Ok(parse_track_rows(&output))
    }

    async fn add_to_playlist(&self, playlist: &str, persistent_id: &str) -> Result<()> {
        let body = format!(
            "{}{}\n    duplicate targetTrack to targetPlaylist\n    return \"OK\"",
            find_playlist(playlist),
            find_library_track(persistent_id)
        );
        self.run(&tell_music(&body), persistent_id).await?;
        Ok(())
    }

    async fn remove_from_playlist(&self, playlist: &str, persistent_id: &str) -> Result<()> {
        let safe = escape_applescript(persistent_id);
        let body = format!(
            r#"{}
    try
        set targetTrack to first track of targetPlaylist whose persistent ID is "{safe}"
    on error
        return "ERROR:Track not in playlist"
    end try
    delete targetTrack
    return "OK""#,
            find_playlist(playlist)
        );
        self.run(&tell_music(&body), persistent_id).await?;
        Ok(())
    }

    async fn list_playlists(&self) -> Result<Vec<PlaylistInfo>> {
        let body = r#"
    set output to ""
    repeat with p in user playlists
        set output to output & (name of p) & "|||" & (persistent ID of p) & "|||" & (smart of p) & "\n"
    end repeat
    return output"#;
        let output = self.run(&tell_music(body), "playlists").await?;
        Ok(output
            .lines()
            .filter_map(|line| {
                let parts: Vec<&str> = line.split(FIELD_SEP).collect();
                (parts.len() >= 3).then(|| PlaylistInfo {
                    id: parts[1].trim().to_string(),
                    name: parts[0].to_string(),
                    can_edit: !parts[2].trim().eq_ignore_ascii_case("true"),
                })
            })
            .collect())
    }

    async fn create_playlist(&self, name: &str, description: &str) -> Result<PlaylistInfo> {
        let body = format!(
            "\n    set newPlaylist to make new user playlist with properties {{name:\"{}\", description:\"{}\"}}\n    return persistent ID of newPlaylist",
            escape_applescript(name),
            escape_applescript(description)
        );
        let id = self.run(&tell_music(&body), name).await?;
        Ok(PlaylistInfo {
            id: id.trim().to_string(),
            name: name.to_string(),
            can_edit: true,
        })
    }

    async fn set_preference(&self, persistent_id: &str, preference: Preference) -> Result<()> {
        let (loved, disliked) = match preference {
            Preference::Love => (true, false),
            Preference::Dislike => (false, true),
        };
        let body = format!(
            "{}\n    set loved of targetTrack to {loved}\n    set disliked of targetTrack to {disliked}\n    return \"OK\"",
            find_library_track(persistent_id)
        );
        self.run(&tell_music(&body), persistent_id).await?;
        Ok(())
    }

    async fn rating(&self, persistent_id: &str) -> Result<u8> {
        let body = format!(
            "{}\n    return rating of targetTrack as integer",
            find_library_track(persistent_id)
        );
        let output = self.run(&tell_music(&body), persistent_id).await?;
        output
            .trim()
            .parse::<u8>()
            .map_err(|_| MusicError::local(format!("invalid rating value: {output}")))
    }

    async fn set_rating(&self, persistent_id: &str, rating: u8) -> Result<()> {
        let rating = rating.min(100);
        let body = format!(
            "{}\n    set rating of targetTrack to {rating}\n    return \"OK\"",
            find_library_track(persistent_id)
        );
        self.run(&tell_music(&body), persistent_id).await?;
        Ok(())
    }

    async fn playback(&self, action: PlaybackAction) -> Result<()> {
        let command = match action {
            PlaybackAction::Play => "play",
            PlaybackAction::Pause => "pause",
            PlaybackAction::Toggle => "playpause",
            PlaybackAction::Next => "next track",
            PlaybackAction::Previous => "previous track",
            PlaybackAction::Stop => "stop",
        };
        self.run(&format!("tell application \"Music\" to {command}"), command)
            .await?;
        Ok(())
    }

    async fn now_playing(&self) -> Result<NowPlaying> {
        let body = r#"
    if player state is stopped then
        return "stopped"
    end if
    set t to current track
    return (player state as string) & "|||" & (name of t) & "|||" & (artist of t) & "|||" & (album of t) & "|||" & (duration of t) & "|||" & (player position) & "|||" & (persistent ID of t)"#;
        let output = self.run(&tell_music(body), "player").await?;
        Ok(parse_now_playing(&output))
    }

    async fn play_track(&self, persistent_id: &str) -> Result<()> {
        let body = format!(
            "{}\n    play targetTrack\n    return \"OK\"",
            find_library_track(persistent_id)
        );
        self.run(&tell_music(&body), persistent_id).await?;
        Ok(())
    }

    async fn play_playlist(&self, playlist: &str, shuffle: bool) -> Result<()> {
        let body = format!(
            "{}\n    set shuffle enabled to {shuffle}\n    play targetPlaylist\n    return \"OK\"",
            find_playlist(playlist)
        );
        self.run(&tell_music(&body), playlist).await?;
        Ok(())
    }

    async fn delete_track(&self, persistent_id: &str) -> Result<()> {
        let body = format!(
            "{}\n    delete targetTrack\n    return \"OK\"",
            find_library_track(persistent_id)
        );
        self.run(&tell_music(&body), persistent_id).await?;
        Ok(())
    }

    async fn delete_playlist(&self, playlist: &str) -> Result<()> {
        // Exact name only; a partial match must never pick what gets deleted
        let body = format!(
            r#"
    try
        set targetPlaylist to first user playlist whose name is "{}"
    on error
        return "ERROR:Playlist not found"
    end try
    delete targetPlaylist
    return "OK""#,
            escape_applescript(playlist)
        );
        self.run(&tell_music(&body), playlist).await?;
        Ok(())
    }
}

fn parse_now_playing(output: &str) -> NowPlaying {
    let parts: Vec<&str> = output.trim().split(FIELD_SEP).collect();
    if parts.len() < 7 {
        return NowPlaying {
            state: parts[0].trim().to_string(),
            track: None,
            position_secs: None,
            duration_secs: None,
        };
    }
    let mut ids = TrackRef::default();
    ids.set(IdKind::LocalPersistent, parts[6].trim().to_string());
    NowPlaying {
        state: parts[0].trim().to_string(),
        track: Some(TrackSummary::new(ids, parts[1], parts[2]).with_album(parts[3])),
        duration_secs: parse_number(parts[4]),
        position_secs: parse_number(parts[5]),
    }
}
