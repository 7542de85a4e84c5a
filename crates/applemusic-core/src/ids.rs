//! Identifier model for a logical track
//!
//! A song can be known by up to three unrelated identifiers: its catalog ID,
//! its ID in the user's remote library, and the persistent ID Music.app
//! assigns locally. None can be computed from another; translating between
//! them always goes through [`crate::bridge::Bridge`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which identifier space a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Catalog,
    Library,
    LocalPersistent,
}

impl IdKind {
    pub const ALL: [IdKind; 3] = [IdKind::Catalog, IdKind::Library, IdKind::LocalPersistent];

    /// Classify a user-supplied identifier by its format.
    ///
    /// Local persistent IDs are exactly 16 hex digits, library song IDs
    /// carry the `i.` prefix and catalog IDs are all digits. A 16-digit
    /// numeric value reads as a persistent ID, since catalog IDs are much
    /// shorter; callers can override with an explicit kind. Other `x.`
    /// prefixes (`p.` playlists, `l.` albums) are not tracks. Only used to
    /// read tool arguments; it says nothing about the same track's other IDs.
    pub fn infer(value: &str) -> Option<IdKind> {
        let value = value.trim();
        if value.len() == 16 && value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(IdKind::LocalPersistent);
        }
        if value.strip_prefix("i.").is_some_and(|rest| !rest.is_empty()) {
            return Some(IdKind::Library);
        }
        if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
            return Some(IdKind::Catalog);
        }
        None
    }

    /// Parse an explicit kind name as accepted by tool arguments
    pub fn parse(name: &str) -> Option<IdKind> {
        match name.trim().to_lowercase().replace('-', "_").as_str() {
            "catalog" => Some(IdKind::Catalog),
            "library" => Some(IdKind::Library),
            "local" | "persistent" | "local_persistent" => Some(IdKind::LocalPersistent),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IdKind::Catalog => "catalog",
            IdKind::Library => "library",
            IdKind::LocalPersistent => "persistent",
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An identifier value tagged with its kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId {
    pub kind: IdKind,
    pub value: String,
}

impl TrackId {
    pub fn new(kind: IdKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn catalog(value: impl Into<String>) -> Self {
        Self::new(IdKind::Catalog, value)
    }

    pub fn library(value: impl Into<String>) -> Self {
        Self::new(IdKind::Library, value)
    }

    pub fn local(value: impl Into<String>) -> Self {
        Self::new(IdKind::LocalPersistent, value)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ID {}", self.kind, self.value)
    }
}

/// The identifiers known for one logical track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_persistent_id: Option<String>,
}

impl TrackRef {
    pub fn from_id(id: &TrackId) -> Self {
        let mut r = Self::default();
        r.set(id.kind, id.value.clone());
        r
    }

    pub fn get(&self, kind: IdKind) -> Option<&str> {
        match kind {
            IdKind::Catalog => self.catalog_id.as_deref(),
            IdKind::Library => self.library_id.as_deref(),
            IdKind::LocalPersistent => self.local_persistent_id.as_deref(),
        }
    }

    /// Set an identifier; empty values are ignored
    pub fn set(&mut self, kind: IdKind, value: String) {
        if value.trim().is_empty() {
            return;
        }
        let slot = match kind {
            IdKind::Catalog => &mut self.catalog_id,
            IdKind::Library => &mut self.library_id,
            IdKind::LocalPersistent => &mut self.local_persistent_id,
        };
        *slot = Some(value);
    }

    pub fn has(&self, kind: IdKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    /// All present identifiers, in catalog/library/local order
    pub fn ids(&self) -> Vec<TrackId> {
        IdKind::ALL
            .iter()
            .filter_map(|&kind| self.get(kind).map(|v| TrackId::new(kind, v)))
            .collect()
    }

    /// Fill identifiers missing here from `other`; existing values win
    pub fn absorb(&mut self, other: &TrackRef) {
        for id in other.ids() {
            if !self.has(id.kind) {
                self.set(id.kind, id.value);
            }
        }
    }

    /// True when both refs share at least one identifier
    pub fn overlaps(&self, other: &TrackRef) -> bool {
        IdKind::ALL
            .iter()
            .any(|&k| matches!((self.get(k), other.get(k)), (Some(a), Some(b)) if a == b))
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.ids().iter().map(|id| id.to_string()).collect();
        if parts.is_empty() {
            f.write_str("no identifiers")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}
