//! Persistent cache of stable track metadata
//!
//! A record is stored once and indexed under every identifier known for the
//! track, so a lookup by catalog, library or persistent ID lands on the same
//! record once the IDs have been correlated. Entries never expire; the user
//! clears the cache explicitly.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::ids::{IdKind, TrackId, TrackRef};
use crate::track::{FieldConflict, StableMetadata};

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk form of the cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    #[serde(default)]
    pub tracks: Vec<CachedTrack>,
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            tracks: Vec::new(),
        }
    }
}

/// One logical track: its aliased identifiers and stable fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTrack {
    pub ids: Vec<TrackId>,
    pub metadata: StableMetadata,
    pub inserted_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

/// Durable storage behind [`TrackCache`]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet
    fn load(&self) -> Result<Option<CacheSnapshot>>;
    fn save(&self, snapshot: &CacheSnapshot) -> Result<()>;
    fn size_on_disk(&self) -> Option<u64>;
    fn describe(&self) -> String;
}

/// JSON file replaced atomically on every save
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self) -> Result<Option<CacheSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt cache file {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &CacheSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize cache")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn size_on_disk(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|m| m.len())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory stand-in for the cache file
#[derive(Default)]
pub struct MemoryStore {
    contents: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from raw file contents, e.g. to simulate corruption
    pub fn with_contents(raw: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(raw.into())),
        }
    }

    fn contents(&self) -> MutexGuard<'_, Option<String>> {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<Option<CacheSnapshot>> {
        match self.contents().as_deref() {
            Some(raw) => Ok(Some(serde_json::from_str(raw).context("Corrupt cache contents")?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &CacheSnapshot) -> Result<()> {
        *self.contents() = Some(serde_json::to_string(snapshot)?);
        Ok(())
    }

    fn size_on_disk(&self) -> Option<u64> {
        self.contents().as_ref().map(|c| c.len() as u64)
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

/// What a lookup found: every identifier aliased to the record, and the record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub ids: TrackRef,
    pub metadata: StableMetadata,
}

/// Result of [`TrackCache::put`]
#[derive(Debug, Clone, Default)]
pub struct PutOutcome {
    /// Number of previously separate records folded into one
    pub merged: usize,
    pub conflicts: Vec<FieldConflict>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Identifier entries in the index
    pub entry_count: usize,
    pub distinct_tracks: usize,
    pub oldest_entry_age: Option<Duration>,
    pub newest_access_age: Option<Duration>,
    pub size_on_disk: Option<u64>,
    pub location: String,
}

#[derive(Default)]
struct CacheState {
    tracks: HashMap<u64, CachedTrack>,
    index: HashMap<TrackId, u64>,
    next_key: u64,
}

impl CacheState {
    fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        let mut state = Self::default();
        for track in snapshot.tracks {
            let key = state.next_key;
            state.next_key += 1;
            for id in &track.ids {
                state.index.insert(id.clone(), key);
            }
            state.tracks.insert(key, track);
        }
        state
    }

    fn snapshot(&self) -> CacheSnapshot {
        let mut keys: Vec<&u64> = self.tracks.keys().collect();
        keys.sort();
        CacheSnapshot {
            version: SNAPSHOT_VERSION,
            tracks: keys.into_iter().map(|k| self.tracks[k].clone()).collect(),
        }
    }
}

/// Stable-field cache keyed by any identifier kind
pub struct TrackCache {
    state: Mutex<CacheState>,
    store: Box<dyn CacheStore>,
}

impl TrackCache {
    /// Load from `store`; a missing or unreadable store starts empty
    pub fn open(store: Box<dyn CacheStore>) -> Self {
        let state = match store.load() {
            Ok(Some(snapshot)) if snapshot.version == SNAPSHOT_VERSION => {
                let state = CacheState::from_snapshot(snapshot);
                debug!(
                    tracks = state.tracks.len(),
                    "Loaded track cache from {}",
                    store.describe()
                );
                state
            }
            Ok(Some(snapshot)) => {
                warn!(
                    "Track cache {} has version {}, expected {}; starting empty",
                    store.describe(),
                    snapshot.version,
                    SNAPSHOT_VERSION
                );
                CacheState::default()
            }
            Ok(None) => CacheState::default(),
            Err(e) => {
                warn!("Track cache unavailable, starting empty: {:#}", e);
                CacheState::default()
            }
        };
        Self {
            state: Mutex::new(state),
            store,
        }
    }

    pub fn open_file(path: impl Into<PathBuf>) -> Self {
        Self::open(Box::new(JsonFileStore::new(path)))
    }

    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryStore::new()))
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stable fields for a track by any of its identifiers
    pub fn get(&self, kind: IdKind, value: &str) -> Option<StableMetadata> {
        self.lookup(&TrackId::new(kind, value)).map(|hit| hit.metadata)
    }

    /// Record plus every identifier aliased to it
    pub fn lookup(&self, id: &TrackId) -> Option<CacheHit> {
        let value = id.value.trim();
        if value.is_empty() {
            return None;
        }
        let mut state = self.state();
        let key = *state.index.get(&TrackId::new(id.kind, value))?;
        let track = state.tracks.get_mut(&key)?;
        track.last_access = Utc::now();

        let mut ids = TrackRef::default();
        for alias in &track.ids {
            if !ids.has(alias.kind) {
                ids.set(alias.kind, alias.value.clone());
            }
        }
        Some(CacheHit {
            ids,
            metadata: track.metadata.clone(),
        })
    }

    /// Store `record` once and index it under every identifier in `ids`.
    ///
    /// Records already reachable from any of `ids` are merged into one and
    /// re-indexed under the union of identifiers. Stored fields are never
    /// replaced; disagreements come back as conflicts.
    pub fn put(&self, ids: &[TrackId], record: &StableMetadata) -> PutOutcome {
        let ids: Vec<TrackId> = ids
            .iter()
            .filter(|id| !id.value.trim().is_empty())
            .map(|id| TrackId::new(id.kind, id.value.trim()))
            .collect();
        if ids.is_empty() {
            return PutOutcome::default();
        }

        let mut outcome = PutOutcome::default();
        let snapshot = {
            let mut state = self.state();
            let now = Utc::now();

            let mut existing: Vec<u64> = ids.iter().filter_map(|id| state.index.get(id).copied()).collect();
            existing.sort_unstable();
            existing.dedup();

            let key = match existing.first() {
                Some(&k) => k,
                None => {
                    let k = state.next_key;
                    state.next_key += 1;
                    k
                }
            };
            let mut target = state.tracks.remove(&key).unwrap_or_else(|| CachedTrack {
                ids: Vec::new(),
                metadata: StableMetadata::default(),
                inserted_at: now,
                last_access: now,
            });

            // Fold any other records reachable from these ids into `target`
            for other in existing.iter().skip(1) {
                if let Some(absorbed) = state.tracks.remove(other) {
                    outcome.merged += 1;
                    outcome.conflicts.extend(target.metadata.merge_from(&absorbed.metadata));
                    target.inserted_at = target.inserted_at.min(absorbed.inserted_at);
                    for id in absorbed.ids {
                        if !target.ids.contains(&id) {
                            target.ids.push(id);
                        }
                    }
                }
            }

            outcome.conflicts.extend(target.metadata.merge_from(record));
            for id in &ids {
                if !target.ids.contains(id) {
                    target.ids.push(id.clone());
                }
            }
            target.last_access = now;
            for id in &target.ids {
                state.index.insert(id.clone(), key);
            }
            state.tracks.insert(key, target);

            state.snapshot()
        };

        for conflict in &outcome.conflicts {
            warn!(
                field = conflict.field,
                stored = %conflict.stored,
                observed = %conflict.observed,
                "Cached stable field disagrees with fresh data; keeping stored value"
            );
        }
        self.persist(&snapshot);
        outcome
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        let now = Utc::now();
        CacheStats {
            entry_count: state.index.len(),
            distinct_tracks: state.tracks.len(),
            oldest_entry_age: state.tracks.values().map(|t| t.inserted_at).min().map(|t| now - t),
            newest_access_age: state.tracks.values().map(|t| t.last_access).max().map(|t| now - t),
            size_on_disk: self.store.size_on_disk(),
            location: self.store.describe(),
        }
    }

    /// Drop one identifier that no longer names a track. The record goes
    /// with it once no other identifier reaches it.
    pub fn forget(&self, id: &TrackId) -> bool {
        let id = TrackId::new(id.kind, id.value.trim());
        let snapshot = {
            let mut state = self.state();
            let Some(key) = state.index.remove(&id) else {
                return false;
            };
            let orphaned = match state.tracks.get_mut(&key) {
                Some(track) => {
                    track.ids.retain(|alias| *alias != id);
                    track.ids.is_empty()
                }
                None => false,
            };
            if orphaned {
                state.tracks.remove(&key);
            }
            state.snapshot()
        };
        self.persist(&snapshot);
        true
    }

    /// Remove every entry and persist the empty cache
    pub fn clear(&self) {
        let snapshot = {
            let mut state = self.state();
            *state = CacheState::default();
            state.snapshot()
        };
        self.persist(&snapshot);
    }

    fn persist(&self, snapshot: &CacheSnapshot) {
        if let Err(e) = self.store.save(snapshot) {
            warn!("Failed to persist track cache to {}: {:#}", self.store.describe(), e);
        }
    }
}
