//! Plain-text rendering of core results for tool output

use std::fmt::Write;

use applemusic_core::cache::CacheStats;
use applemusic_core::matching::{MatchCandidate, MatchTier};
use applemusic_core::orchestrator::{BatchResult, ItemOutcome, MutationAction};
use applemusic_core::sources::{NowPlaying, PlaylistInfo, SongDetails};
use applemusic_core::track::TrackSummary;
use applemusic_core::{ResolvedTrack, TrackRef};

/// "catalog ID 123, library ID i.abc"
pub fn ids(ids: &TrackRef) -> String {
    ids.ids()
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn track_line(track: &TrackSummary) -> String {
    let mut line = track.display();
    if !track.album.is_empty() {
        let _ = write!(line, " [{}]", track.album);
    }
    if track.metadata.explicit == Some(true) {
        line.push_str(" (explicit)");
    }
    if !track.ids.is_empty() {
        let _ = write!(line, " ({})", ids(&track.ids));
    }
    line
}

pub fn tracks(tracks: &[TrackSummary]) -> String {
    tracks
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {}", i + 1, track_line(t)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn candidates(found: &[MatchCandidate]) -> String {
    found
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let tier = match c.tier {
                MatchTier::Exact => "",
                MatchTier::Partial => " ~",
            };
            format!("{}.{} {}", i + 1, tier, track_line(&c.track))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn playlists(playlists: &[PlaylistInfo]) -> String {
    playlists
        .iter()
        .map(|p| {
            let lock = if p.can_edit { "" } else { " (read-only)" };
            format!("- {} (ID: {}){}", p.name, p.id, lock)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn batch(result: &BatchResult, verbose: bool) -> String {
    let verb = match result.action {
        MutationAction::Add => "Added",
        MutationAction::Remove => "Removed",
    };
    let prep = match result.action {
        MutationAction::Add => "to",
        MutationAction::Remove => "from",
    };
    let mut out = format!(
        "{verb} {} {} {prep} {}",
        result.succeeded(),
        if result.succeeded() == 1 { "track" } else { "tracks" },
        result.target
    );
    if result.skipped() > 0 {
        let _ = write!(out, ", {} skipped", result.skipped());
    }
    if result.failed() > 0 {
        let _ = write!(out, ", {} failed", result.failed());
    }

    for item in &result.items {
        let label = item.track.as_deref().unwrap_or(&item.selector);
        match &item.outcome {
            ItemOutcome::Success { .. } => {
                let _ = write!(out, "\n  OK   {label}");
            }
            ItemOutcome::Skipped { reason, .. } => {
                let _ = write!(out, "\n  SKIP {label}: {reason}");
            }
            ItemOutcome::Failure {
                reason,
                message,
                stage,
            } => {
                let _ = write!(out, "\n  FAIL {label}: {reason} while {stage}: {message}");
            }
        }
        if verbose {
            for step in &item.steps {
                let _ = write!(out, "\n       {step}");
            }
        }
    }
    out
}

pub fn resolved(track: &ResolvedTrack) -> String {
    let mut out = track.display();
    for id in track.ids.ids() {
        let _ = write!(out, "\n  {}: {}", id.kind, id.value);
    }
    if let Some(explicit) = track.metadata.explicit {
        let _ = write!(out, "\n  explicit: {}", if explicit { "yes" } else { "no" });
    }
    if let Some(isrc) = &track.metadata.isrc {
        let _ = write!(out, "\n  ISRC: {isrc}");
    }
    out
}

pub fn stars(stars: u8) -> String {
    let stars = stars.min(5) as usize;
    format!("{}{}", "★".repeat(stars), "☆".repeat(5 - stars))
}

fn clock(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn now_playing(playing: &NowPlaying) -> String {
    let Some(track) = &playing.track else {
        return format!("Player is {}", playing.state);
    };
    let mut out = format!("{}: {}", capitalize(&playing.state), track_line(track));
    if let (Some(pos), Some(dur)) = (playing.position_secs, playing.duration_secs) {
        let _ = write!(out, "\n  {} / {}", clock(pos), clock(dur));
    }
    out
}

pub fn song_details(details: &SongDetails) -> String {
    let track = &details.track;
    let mut out = track.display();
    if !track.album.is_empty() {
        let _ = write!(out, "\n  Album: {}", track.album);
    }
    if !details.genres.is_empty() {
        let _ = write!(out, "\n  Genre: {}", details.genres.join(", "));
    }
    if let Some(ms) = details.duration_ms {
        let _ = write!(out, "\n  Duration: {}", clock(ms as f64 / 1000.0));
    }
    if let Some(date) = &details.release_date {
        let _ = write!(out, "\n  Released: {date}");
    }
    if let Some(explicit) = track.metadata.explicit {
        let _ = write!(out, "\n  Explicit: {}", if explicit { "yes" } else { "no" });
    }
    if let Some(isrc) = &track.metadata.isrc {
        let _ = write!(out, "\n  ISRC: {isrc}");
    }
    let _ = write!(out, "\n  IDs: {}", ids(&track.ids));
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn human_duration(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

fn human_bytes(bytes: u64) -> String {
    match bytes {
        b if b < 1024 => format!("{b} B"),
        b if b < 1024 * 1024 => format!("{:.1} KB", b as f64 / 1024.0),
        b => format!("{:.1} MB", b as f64 / (1024.0 * 1024.0)),
    }
}

pub fn cache_stats(stats: &CacheStats) -> String {
    let mut out = format!(
        "Track cache: {} tracks, {} identifiers\n  Location: {}",
        stats.distinct_tracks, stats.entry_count, stats.location
    );
    if let Some(size) = stats.size_on_disk {
        let _ = write!(out, "\n  Size: {}", human_bytes(size));
    }
    if let Some(age) = stats.oldest_entry_age {
        let _ = write!(out, "\n  Oldest entry: {} ago", human_duration(age));
    }
    if let Some(age) = stats.newest_access_age {
        let _ = write!(out, "\n  Last used: {} ago", human_duration(age));
    }
    out
}
