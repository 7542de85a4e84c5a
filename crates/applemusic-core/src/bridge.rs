//! Cross-source identifier resolution
//!
//! Every translation between identifier kinds goes through [`Bridge`]. The
//! cache is consulted first; on a miss, direct ID-to-ID translation requests
//! are preferred, and name-based correlation across sources only accepts an
//! exact-tier match whose identifiers do not contradict what is known.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::TrackCache;
use crate::error::{MusicError, Result};
use crate::ids::{IdKind, TrackId, TrackRef};
use crate::matching::{MatchQuery, MatchTier, Resolver, SearchSource};
use crate::selector::TrackSelector;
use crate::sources::Sources;
use crate::track::{StableMetadata, TrackSummary};

/// Identifiers and stable fields resolved for one selector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedTrack {
    pub ids: TrackRef,
    pub metadata: StableMetadata,
    /// Display fields, when a source was consulted
    pub summary: Option<TrackSummary>,
}

impl ResolvedTrack {
    pub fn from_summary(summary: TrackSummary) -> Self {
        Self {
            ids: summary.ids.clone(),
            metadata: summary.metadata.clone(),
            summary: Some(summary),
        }
    }

    /// Fold in what another observation of the same track reported
    fn absorb(&mut self, summary: &TrackSummary) {
        self.ids.absorb(&summary.ids);
        self.metadata.merge_from(&summary.metadata);
        if self.summary.is_none() {
            self.summary = Some(summary.clone());
        }
    }

    /// "Name - Artist" when known, otherwise the identifiers
    pub fn display(&self) -> String {
        match &self.summary {
            Some(s) if !s.name.is_empty() => s.display(),
            _ => self.ids.to_string(),
        }
    }
}

/// Two refs contradict when they hold different values for the same kind
fn contradicts(a: &TrackRef, b: &TrackRef) -> bool {
    IdKind::ALL
        .iter()
        .any(|&k| matches!((a.get(k), b.get(k)), (Some(x), Some(y)) if x != y))
}

pub struct Bridge {
    cache: Arc<TrackCache>,
    sources: Sources,
    resolver: Resolver,
}

impl Bridge {
    pub fn new(cache: Arc<TrackCache>, sources: Sources) -> Self {
        Self {
            resolver: Resolver::new(sources.clone()),
            cache,
            sources,
        }
    }

    pub fn cache(&self) -> &TrackCache {
        &self.cache
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Resolve `selector` to a track that carries an identifier of kind `want`.
    ///
    /// `order` is the preferred search order for name selectors. Fails with
    /// `NotFound` when no source yields the wanted identifier.
    pub async fn resolve(
        &self,
        selector: &TrackSelector,
        want: IdKind,
        order: &[SearchSource],
    ) -> Result<ResolvedTrack> {
        let mut resolved = match selector {
            TrackSelector::Id(id) => {
                if let Some(hit) = self.cache.lookup(id) {
                    if hit.ids.has(want) {
                        debug!(id = %id, "Cache hit");
                        return Ok(ResolvedTrack {
                            ids: hit.ids,
                            metadata: hit.metadata,
                            summary: None,
                        });
                    }
                    ResolvedTrack {
                        ids: hit.ids,
                        metadata: hit.metadata,
                        summary: None,
                    }
                } else if id.kind == want {
                    // Confirm the identifier exists and learn its stable fields
                    let summary = self
                        .fetch_summary(id)
                        .await?
                        .ok_or_else(|| MusicError::not_found(selector.to_string()))?;
                    let mut resolved = ResolvedTrack::from_summary(summary);
                    resolved.ids.set(id.kind, id.value.clone());
                    resolved
                } else {
                    ResolvedTrack {
                        ids: TrackRef::from_id(id),
                        ..Default::default()
                    }
                }
            }
            TrackSelector::Name(query) => {
                let summary = self
                    .search_first(query, order)
                    .await?
                    .ok_or_else(|| MusicError::not_found(selector.to_string()))?;
                let mut resolved = ResolvedTrack::from_summary(summary);
                self.absorb_cached(&mut resolved);
                resolved
            }
        };

        if !resolved.ids.has(want) {
            self.translate(&mut resolved, want).await?;
        }
        if !resolved.ids.has(want) {
            return Err(MusicError::not_found(selector.to_string()));
        }
        self.remember(&mut resolved);
        Ok(resolved)
    }

    /// Resolve without requiring a particular kind; used for reporting.
    /// Tries to learn every identifier kind a configured source can supply.
    pub async fn resolve_all(
        &self,
        selector: &TrackSelector,
        order: &[SearchSource],
    ) -> Result<ResolvedTrack> {
        let first_kind = match selector {
            TrackSelector::Id(id) => id.kind,
            TrackSelector::Name(_) => match order.first() {
                Some(SearchSource::Local) => IdKind::LocalPersistent,
                Some(SearchSource::Library) => IdKind::Library,
                _ => IdKind::Catalog,
            },
        };
        let mut resolved = self.resolve(selector, first_kind, order).await?;
        for kind in IdKind::ALL {
            if resolved.ids.has(kind) || !self.can_supply(kind) {
                continue;
            }
            if let Err(e) = self.translate(&mut resolved, kind).await {
                debug!(kind = %kind, "Could not learn identifier: {}", e);
            }
        }
        self.remember(&mut resolved);
        Ok(resolved)
    }

    /// Write correlated identifiers and stable fields into the cache and
    /// return the stored record
    pub fn learn(&self, ids: &TrackRef, metadata: &StableMetadata) -> StableMetadata {
        let mut resolved = ResolvedTrack {
            ids: ids.clone(),
            metadata: metadata.clone(),
            summary: None,
        };
        self.remember(&mut resolved);
        resolved.metadata
    }

    /// Poll for the library ID of a catalog song just added to the library
    pub async fn await_library_id(
        &self,
        catalog_id: &str,
        polls: u32,
        interval: Duration,
    ) -> Result<Option<String>> {
        let remote = self.sources.remote()?;
        for attempt in 0..polls.max(1) {
            if attempt > 0 {
                tokio::time::sleep(interval).await;
            }
            if let Some(library_id) = remote.library_id_for_catalog_id(catalog_id).await? {
                debug!(catalog_id, library_id = %library_id, attempt, "Library ID available");
                let mut ids = TrackRef::from_id(&TrackId::catalog(catalog_id));
                ids.set(IdKind::Library, library_id.clone());
                self.learn(&ids, &StableMetadata::default());
                return Ok(Some(library_id));
            }
        }
        Ok(None)
    }

    fn can_supply(&self, kind: IdKind) -> bool {
        match kind {
            IdKind::Catalog | IdKind::Library => self.sources.remote.is_some(),
            IdKind::LocalPersistent => self.sources.local.is_some(),
        }
    }

    /// Top candidate from the first source in `order` that yields one.
    /// A failing source falls through to the next; if every source failed,
    /// the last error is returned.
    async fn search_first(
        &self,
        query: &MatchQuery,
        order: &[SearchSource],
    ) -> Result<Option<TrackSummary>> {
        let mut last_err = None;
        let mut any_ok = false;
        for &source in order {
            match self.resolver.find(source, query).await {
                Ok(candidates) => {
                    any_ok = true;
                    if let Some(top) = candidates.into_iter().next() {
                        debug!(source = %source, tier = ?top.tier, "Resolved {}", query);
                        return Ok(Some(top.track));
                    }
                }
                Err(e @ MusicError::InvalidQuery(_)) => return Err(e),
                Err(e) => {
                    debug!(source = %source, "Search failed: {}", e);
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if !any_ok => Err(e),
            _ => Ok(None),
        }
    }

    /// Exact-tier candidate in `source` that matches `summary` without
    /// contradicting known identifiers
    async fn correlate_by_name(
        &self,
        resolved: &ResolvedTrack,
        source: SearchSource,
    ) -> Result<Option<TrackSummary>> {
        let Some(summary) = resolved.summary.as_ref().filter(|s| !s.name.is_empty()) else {
            return Ok(None);
        };
        let query = MatchQuery::new(summary.name.clone())
            .with_artist(Some(summary.artist.clone()));
        let candidates = self.resolver.find(source, &query).await?;
        Ok(candidates
            .into_iter()
            .filter(|c| c.tier == MatchTier::Exact)
            .map(|c| c.track)
            .find(|t| !contradicts(&resolved.ids, &t.ids)))
    }

    async fn fetch_summary(&self, id: &TrackId) -> Result<Option<TrackSummary>> {
        match id.kind {
            IdKind::Catalog => self.sources.remote()?.catalog_song(&id.value).await,
            IdKind::Library => self.sources.remote()?.library_song(&id.value).await,
            IdKind::LocalPersistent => {
                self.sources
                    .local()?
                    .track_by_persistent_id(&id.value)
                    .await
            }
        }
    }

    /// Load display fields from whichever known identifier's home source
    /// can supply them, preferring kinds other than `avoid`
    pub(crate) async fn ensure_summary(&self, resolved: &mut ResolvedTrack, avoid: IdKind) -> Result<()> {
        if resolved.summary.as_ref().is_some_and(|s| !s.name.is_empty()) {
            return Ok(());
        }
        let mut ids = resolved.ids.ids();
        ids.sort_by_key(|id| id.kind == avoid);
        for id in ids {
            if !self.can_supply(id.kind) {
                continue;
            }
            if let Some(summary) = self.fetch_summary(&id).await? {
                resolved.absorb(&summary);
                resolved.summary = Some(summary);
                return Ok(());
            }
        }
        Ok(())
    }

    fn absorb_cached(&self, resolved: &mut ResolvedTrack) {
        for id in resolved.ids.ids() {
            if let Some(hit) = self.cache.lookup(&id) {
                if !contradicts(&resolved.ids, &hit.ids) {
                    resolved.ids.absorb(&hit.ids);
                }
                let mut stored = hit.metadata;
                stored.merge_from(&resolved.metadata);
                resolved.metadata = stored;
            }
        }
    }

    /// Learn an identifier of kind `want` from what `resolved` already knows
    async fn translate(&self, resolved: &mut ResolvedTrack, want: IdKind) -> Result<()> {
        self.absorb_cached(resolved);
        if resolved.ids.has(want) {
            return Ok(());
        }

        match want {
            IdKind::Library => {
                if resolved.ids.catalog_id.is_none() && resolved.ids.local_persistent_id.is_some() {
                    self.ensure_summary(resolved, IdKind::LocalPersistent).await?;
                    if let Some(found) = self.correlate_by_name(resolved, SearchSource::Library).await? {
                        resolved.ids.absorb(&found.ids);
                        resolved.metadata.merge_from(&found.metadata);
                    }
                }
                if !resolved.ids.has(IdKind::Library)
                    && let Some(catalog_id) = resolved.ids.catalog_id.clone()
                    && let Some(library_id) = self
                        .sources
                        .remote()?
                        .library_id_for_catalog_id(&catalog_id)
                        .await?
                {
                    debug!(catalog_id = %catalog_id, library_id = %library_id, "Translated catalog to library");
                    resolved.ids.set(IdKind::Library, library_id);
                }
            }
            IdKind::Catalog => {
                if let Some(library_id) = resolved.ids.library_id.clone()
                    && let Some(catalog_id) = self
                        .sources
                        .remote()?
                        .catalog_id_for_library_id(&library_id)
                        .await?
                {
                    debug!(library_id = %library_id, catalog_id = %catalog_id, "Translated library to catalog");
                    resolved.ids.set(IdKind::Catalog, catalog_id);
                }
                if !resolved.ids.has(IdKind::Catalog) && resolved.ids.local_persistent_id.is_some() {
                    self.ensure_summary(resolved, IdKind::Catalog).await?;
                    for source in [SearchSource::Library, SearchSource::Catalog] {
                        if let Some(found) = self.correlate_by_name(resolved, source).await? {
                            resolved.ids.absorb(&found.ids);
                            resolved.metadata.merge_from(&found.metadata);
                        }
                        if resolved.ids.has(IdKind::Catalog) {
                            break;
                        }
                    }
                }
            }
            IdKind::LocalPersistent => {
                self.ensure_summary(resolved, IdKind::LocalPersistent).await?;
                if let Some(found) = self.correlate_by_name(resolved, SearchSource::Local).await? {
                    resolved.ids.absorb(&found.ids);
                }
            }
        }

        if resolved.ids.has(want) {
            info!("Correlated {} ({})", resolved.display(), resolved.ids);
        }
        Ok(())
    }

    /// Cache the union of identifiers once two kinds are correlated, or
    /// whenever stable fields are known
    fn remember(&self, resolved: &mut ResolvedTrack) {
        let ids = resolved.ids.ids();
        if ids.len() < 2 && resolved.metadata.is_empty() {
            return;
        }
        self.cache.put(&ids, &resolved.metadata);
        if let Some(hit) = ids.first().and_then(|id| self.cache.lookup(id)) {
            resolved.ids.absorb(&hit.ids);
            resolved.metadata = hit.metadata;
        }
    }
}
