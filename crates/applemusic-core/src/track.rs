//! Track summaries returned by sources and the stable fields we cache

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::TrackRef;

/// Per-track fields that never change once observed (explicit flag, ISRC)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isrc: Option<String>,
}

/// A stored stable field disagreed with a freshly observed value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConflict {
    pub field: &'static str,
    pub stored: String,
    pub observed: String,
}

impl StableMetadata {
    pub fn is_empty(&self) -> bool {
        self.explicit.is_none() && self.isrc.is_none()
    }

    /// Fill absent fields from `other`.
    ///
    /// Stored values are write-once: a differing observation is returned as
    /// a conflict and the stored value is kept.
    pub fn merge_from(&mut self, other: &StableMetadata) -> Vec<FieldConflict> {
        let mut conflicts = Vec::new();

        match (self.explicit, other.explicit) {
            (None, Some(v)) => self.explicit = Some(v),
            (Some(a), Some(b)) if a != b => conflicts.push(FieldConflict {
                field: "explicit",
                stored: a.to_string(),
                observed: b.to_string(),
            }),
            _ => {}
        }

        match (&self.isrc, &other.isrc) {
            (None, Some(v)) => self.isrc = Some(v.clone()),
            (Some(a), Some(b)) if !a.eq_ignore_ascii_case(b) => conflicts.push(FieldConflict {
                field: "isrc",
                stored: a.clone(),
                observed: b.clone(),
            }),
            _ => {}
        }

        conflicts
    }
}

impl fmt::Display for StableMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let explicit = match self.explicit {
            Some(true) => "explicit",
            Some(false) => "clean",
            None => "rating unknown",
        };
        match &self.isrc {
            Some(isrc) => write!(f, "{explicit}, ISRC {isrc}"),
            None => f.write_str(explicit),
        }
    }
}

/// One track as reported by a remote or local source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub ids: TrackRef,
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub metadata: StableMetadata,
}

impl TrackSummary {
    pub fn new(ids: TrackRef, name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            ids,
            name: name.into(),
            artist: artist.into(),
            ..Default::default()
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into();
        self
    }

    pub fn with_metadata(mut self, metadata: StableMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// "Name - Artist" for messages
    pub fn display(&self) -> String {
        if self.artist.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.name, self.artist)
        }
    }
}
