//! Name/artist matching against one source
//!
//! Candidates are split into an exact tier (name equality, plus artist
//! equality when an artist is given) and a partial tier (containment in the
//! candidate's "name artist" text, which also catches featured artists).
//! Exact candidates always come first; within a tier the source's own order
//! is kept.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{MusicError, Result};
use crate::sources::Sources;
use crate::track::TrackSummary;

/// Server-side result cap for remote searches
pub const REMOTE_SEARCH_LIMIT: usize = 25;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchQuery {
    pub name: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
}

impl MatchQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Attach an artist; blank values are dropped
    pub fn with_artist(mut self, artist: Option<impl Into<String>>) -> Self {
        self.artist = artist.map(Into::into).filter(|a: &String| !a.trim().is_empty());
        self
    }

    pub fn with_album(mut self, album: Option<impl Into<String>>) -> Self {
        self.album = album.map(Into::into).filter(|a: &String| !a.trim().is_empty());
        self
    }

    /// Term sent to sources with server-side search
    pub fn search_term(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} {}", self.name.trim(), artist.trim()),
            None => self.name.trim().to_string(),
        }
    }
}

impl fmt::Display for MatchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.name)?;
        if let Some(artist) = &self.artist {
            write!(f, " by {artist}")?;
        }
        if let Some(album) = &self.album {
            write!(f, " on {album}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Partial,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub track: TrackSummary,
    pub tier: MatchTier,
}

/// Where a name search runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    /// Music.app library via automation
    Local,
    /// The user's remote library
    Library,
    /// The global remote catalog
    Catalog,
}

impl SearchSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "applescript" => Some(Self::Local),
            "library" => Some(Self::Library),
            "catalog" => Some(Self::Catalog),
            _ => None,
        }
    }
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchSource::Local => "local library",
            SearchSource::Library => "library",
            SearchSource::Catalog => "catalog",
        })
    }
}

/// Lowercase, collapse whitespace and fold typographic quotes
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
}

/// Tier of one candidate, or `None` when it does not match at all
pub fn classify(query: &MatchQuery, track: &TrackSummary) -> Option<MatchTier> {
    let name = normalize(&query.name);
    let artist = query.artist.as_deref().map(normalize);

    if let Some(album) = query.album.as_deref().map(normalize)
        && !normalize(&track.album).contains(&album)
    {
        return None;
    }

    let cand_name = normalize(&track.name);
    let cand_artist = normalize(&track.artist);

    if cand_name == name && artist.as_ref().is_none_or(|a| *a == cand_artist) {
        return Some(MatchTier::Exact);
    }

    let combined = format!("{cand_name} {cand_artist}");
    if combined.contains(&name) && artist.as_ref().is_none_or(|a| combined.contains(a.as_str())) {
        return Some(MatchTier::Partial);
    }
    None
}

/// Rank candidates: exact tier first, source order kept within each tier
pub fn rank_candidates(query: &MatchQuery, candidates: Vec<TrackSummary>) -> Vec<MatchCandidate> {
    let mut ranked: Vec<MatchCandidate> = candidates
        .into_iter()
        .filter_map(|track| classify(query, &track).map(|tier| MatchCandidate { track, tier }))
        .collect();
    // sort_by_key is stable
    ranked.sort_by_key(|c| c.tier);
    ranked
}

/// Runs [`MatchQuery`]s against the configured sources
#[derive(Clone)]
pub struct Resolver {
    sources: Sources,
}

impl Resolver {
    pub fn new(sources: Sources) -> Self {
        Self { sources }
    }

    pub async fn find(&self, source: SearchSource, query: &MatchQuery) -> Result<Vec<MatchCandidate>> {
        if query.name.trim().is_empty() {
            return Err(MusicError::InvalidQuery("track name must not be empty".into()));
        }
        let term = query.search_term();

        let fetched = match source {
            SearchSource::Local => {
                let local = self.sources.local()?;
                let found = local.search_library(&term).await?;
                if found.is_empty() {
                    debug!(term = %term, "Native search empty, scanning full local library");
                    local.list_library_tracks().await?
                } else {
                    found
                }
            }
            SearchSource::Library => {
                self.sources
                    .remote()?
                    .search_library(&term, REMOTE_SEARCH_LIMIT)
                    .await?
            }
            SearchSource::Catalog => {
                self.sources
                    .remote()?
                    .search_catalog(&term, REMOTE_SEARCH_LIMIT)
                    .await?
            }
        };

        let fetched_count = fetched.len();
        let ranked = rank_candidates(query, fetched);
        debug!(
            source = %source,
            query = %query,
            fetched = fetched_count,
            matched = ranked.len(),
            "Resolved candidates"
        );
        Ok(ranked)
    }

    /// [`Resolver::find`] truncated to `limit` candidates after ranking
    pub async fn find_limited(
        &self,
        source: SearchSource,
        query: &MatchQuery,
        limit: usize,
    ) -> Result<Vec<MatchCandidate>> {
        let mut ranked = self.find(source, query).await?;
        ranked.truncate(limit);
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::fake::{FakeLocal, FakeRemote, catalog_song, local_track};
    use std::sync::Arc;

    fn song(name: &str, artist: &str) -> TrackSummary {
        catalog_song("1", name, artist)
    }

    #[test]
    fn test_partial_name_containment() {
        let q = MatchQuery::new("Give Up the Funk");
        let t = song("Give up the Funk (Tear the Roof Off the Sucker)", "Parliament");
        assert_eq!(classify(&q, &t), Some(MatchTier::Partial));
    }

    #[test]
    fn test_featured_artist_is_partial() {
        let q = MatchQuery::new("Bruno Mars");
        let t = song("Uptown Funk", "Mark Ronson feat. Bruno Mars");
        assert_eq!(classify(&q, &t), Some(MatchTier::Partial));

        let q = MatchQuery::new("Uptown Funk").with_artist(Some("Bruno Mars"));
        assert_eq!(classify(&q, &t), Some(MatchTier::Partial));
    }

    #[test]
    fn test_exact_is_case_insensitive() {
        let q = MatchQuery::new("hey jude").with_artist(Some("the beatles"));
        assert_eq!(
            classify(&q, &song("Hey Jude", "The Beatles")),
            Some(MatchTier::Exact)
        );
        assert_eq!(classify(&q, &song("Hey Jude", "Wilson Pickett")), None);
    }

    #[test]
    fn test_typographic_apostrophe_folds() {
        let q = MatchQuery::new("Don't Stop Me Now");
        assert_eq!(
            classify(&q, &song("Don\u{2019}t Stop Me Now", "Queen")),
            Some(MatchTier::Exact)
        );
    }

    #[test]
    fn test_album_narrows() {
        let q = MatchQuery::new("Yesterday").with_album(Some("Help!"));
        let mut on_help = song("Yesterday", "The Beatles");
        on_help.album = "Help! (Remastered)".into();
        let mut on_anthology = song("Yesterday", "The Beatles");
        on_anthology.album = "Anthology 2".into();
        assert_eq!(classify(&q, &on_help), Some(MatchTier::Exact));
        assert_eq!(classify(&q, &on_anthology), None);
    }

    #[test]
    fn test_exact_precedes_partial_with_interleaved_input() {
        let q = MatchQuery::new("Funk");
        let input = vec![
            catalog_song("1", "Uptown Funk", "Mark Ronson"),
            catalog_song("2", "Funk", "A"),
            catalog_song("3", "Give Up the Funk", "Parliament"),
            catalog_song("4", "funk", "B"),
            catalog_song("5", "Unrelated", "C"),
        ];
        let ranked = rank_candidates(&q, input);
        let ids: Vec<_> = ranked
            .iter()
            .map(|c| c.track.ids.catalog_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["2", "4", "1", "3"]);
        let first_partial = ranked.iter().position(|c| c.tier == MatchTier::Partial).unwrap();
        assert!(ranked[..first_partial].iter().all(|c| c.tier == MatchTier::Exact));
        assert!(ranked[first_partial..].iter().all(|c| c.tier == MatchTier::Partial));
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let ranked = rank_candidates(&MatchQuery::new("zzz"), vec![song("Hey Jude", "The Beatles")]);
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_empty_name_rejected_before_source_call() {
        let remote = Arc::new(FakeRemote::new());
        let resolver = Resolver::new(Sources::new(Some(remote.clone()), None));
        let err = resolver
            .find(SearchSource::Catalog, &MatchQuery::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::InvalidQuery(_)));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_local_falls_back_to_full_listing() {
        let local = Arc::new(
            FakeLocal::new()
                .with_track(local_track("AAAA000000000001", "Hey Jude", "The Beatles"))
                .configure(|s| s.search_blind = true),
        );
        let resolver = Resolver::new(Sources::new(None, Some(local.clone())));
        let found = resolver
            .find(SearchSource::Local, &MatchQuery::new("hey jude"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tier, MatchTier::Exact);
        assert!(local.calls().iter().any(|c| c == "list_library_tracks"));
    }

    #[tokio::test]
    async fn test_catalog_search_ranks_results() {
        let remote = Arc::new(
            FakeRemote::new()
                .with_catalog(catalog_song("10", "Uptown Funk (feat. Bruno Mars)", "Mark Ronson"))
                .with_catalog(catalog_song("11", "Uptown Funk", "Mark Ronson")),
        );
        let resolver = Resolver::new(Sources::new(Some(remote), None));
        let found = resolver
            .find_limited(SearchSource::Catalog, &MatchQuery::new("Uptown Funk"), 1)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].track.ids.catalog_id.as_deref(), Some("11"));
    }

    #[tokio::test]
    async fn test_missing_source_is_unsupported() {
        let resolver = Resolver::new(Sources::default());
        let err = resolver
            .find(SearchSource::Library, &MatchQuery::new("Hey Jude"))
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::Unsupported(_)));
    }
}
