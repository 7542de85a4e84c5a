//! Track selectors accepted by batch operations
//!
//! Tool arguments arrive as a single name, a single ID, a list of names, a
//! list of IDs or a structured list of `{name, artist, id}` objects. They are
//! turned into a uniform `Vec<TrackSelector>` once, before any item is
//! processed.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::error::{MusicError, Result};
use crate::ids::{IdKind, TrackId};
use crate::matching::MatchQuery;

/// One track to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSelector {
    Name(MatchQuery),
    Id(TrackId),
}

impl fmt::Display for TrackSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSelector::Name(q) => fmt::Display::fmt(q, f),
            TrackSelector::Id(id) => fmt::Display::fmt(id, f),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StructuredItem {
    #[serde(default, alias = "track_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default, alias = "track_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub id_kind: Option<String>,
}

/// A selector as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSelector {
    SingleName(MatchQuery),
    SingleId(TrackId),
    /// Artists are empty, a single artist for every name, or one per name
    NameList {
        names: Vec<String>,
        artists: Vec<String>,
    },
    IdList(Vec<TrackId>),
    StructuredList(Vec<StructuredItem>),
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_id(value: &str, kind: Option<IdKind>) -> Result<TrackId> {
    let value = value.trim();
    let kind = kind.or_else(|| IdKind::infer(value)).ok_or_else(|| {
        MusicError::AmbiguousSelector(format!(
            "cannot tell what kind of identifier '{value}' is; pass id_kind"
        ))
    })?;
    Ok(TrackId::new(kind, value))
}

fn parse_kind(name: Option<&str>) -> Result<Option<IdKind>> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        None => Ok(None),
        Some(n) => IdKind::parse(n)
            .map(Some)
            .ok_or_else(|| MusicError::InvalidQuery(format!("unknown id_kind '{n}'"))),
    }
}

impl BatchSelector {
    /// Expand into per-item selectors, preserving input order
    pub fn flatten(self) -> Result<Vec<TrackSelector>> {
        match self {
            BatchSelector::SingleName(q) => Ok(vec![TrackSelector::Name(q)]),
            BatchSelector::SingleId(id) => Ok(vec![TrackSelector::Id(id)]),
            BatchSelector::NameList { names, artists } => {
                if names.is_empty() {
                    return Err(MusicError::AmbiguousSelector("empty name list".into()));
                }
                let artist_for = |i: usize| -> Result<Option<String>> {
                    match artists.len() {
                        0 => Ok(None),
                        1 => Ok(Some(artists[0].clone())),
                        n if n == names.len() => Ok(Some(artists[i].clone())),
                        n => Err(MusicError::AmbiguousSelector(format!(
                            "{} names but {n} artists; give one artist, or one per name",
                            names.len()
                        ))),
                    }
                };
                names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        Ok(TrackSelector::Name(
                            MatchQuery::new(name.trim()).with_artist(artist_for(i)?),
                        ))
                    })
                    .collect()
            }
            BatchSelector::IdList(ids) => {
                if ids.is_empty() {
                    return Err(MusicError::AmbiguousSelector("empty ID list".into()));
                }
                Ok(ids.into_iter().map(TrackSelector::Id).collect())
            }
            BatchSelector::StructuredList(items) => {
                if items.is_empty() {
                    return Err(MusicError::AmbiguousSelector("empty track list".into()));
                }
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let kind = parse_kind(item.id_kind.as_deref())?;
                        if let Some(id) = non_blank(item.id) {
                            return Ok(TrackSelector::Id(parse_id(&id, kind)?));
                        }
                        match non_blank(item.name) {
                            Some(name) => Ok(TrackSelector::Name(
                                MatchQuery::new(name)
                                    .with_artist(non_blank(item.artist))
                                    .with_album(non_blank(item.album)),
                            )),
                            None => Err(MusicError::AmbiguousSelector(format!(
                                "track {} has neither a name nor an id",
                                i + 1
                            ))),
                        }
                    })
                    .collect()
            }
        }
    }

    /// Read a selector from tool arguments.
    ///
    /// Exactly one of `track_name` (string or array), `track_ids`
    /// (comma-separated string or array) or `tracks` (array of objects, or a
    /// string holding one) must be present. `artist`, `album` and `id_kind`
    /// qualify the first two forms.
    pub fn from_args(args: &Value) -> Result<Self> {
        let present = |key: &str| {
            args.get(key).is_some_and(|v| match v {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                Value::Array(a) => !a.is_empty(),
                _ => true,
            })
        };
        let given: Vec<&str> = ["track_name", "track_ids", "tracks"]
            .into_iter()
            .filter(|k| present(*k))
            .collect();
        match given.as_slice() {
            [] => Err(MusicError::InvalidQuery(
                "provide track_name, track_ids or tracks".into(),
            )),
            ["track_name"] => Self::names_from_args(args),
            ["track_ids"] => Self::ids_from_args(args),
            ["tracks"] => Self::structured_from_args(&args["tracks"]),
            _ => Err(MusicError::AmbiguousSelector(format!(
                "give only one of {}",
                given.join(", ")
            ))),
        }
    }

    fn names_from_args(args: &Value) -> Result<Self> {
        let artists = string_list(args.get("artist"), false)?;
        match &args["track_name"] {
            Value::String(name) => {
                if artists.len() > 1 {
                    return Err(MusicError::AmbiguousSelector(
                        "one track name but several artists".into(),
                    ));
                }
                let album = args.get("album").and_then(Value::as_str).map(str::to_string);
                Ok(BatchSelector::SingleName(
                    MatchQuery::new(name.trim())
                        .with_artist(artists.into_iter().next())
                        .with_album(album),
                ))
            }
            other => Ok(BatchSelector::NameList {
                names: string_list(Some(other), false)?,
                artists,
            }),
        }
    }

    fn ids_from_args(args: &Value) -> Result<Self> {
        let kind = parse_kind(args.get("id_kind").and_then(Value::as_str))?;
        let raw = &args["track_ids"];
        let mut ids = string_list(Some(raw), true)?
            .iter()
            .map(|v| parse_id(v, kind))
            .collect::<Result<Vec<_>>>()?;
        if matches!(raw, Value::String(_))
            && ids.len() == 1
            && let Some(id) = ids.pop()
        {
            return Ok(BatchSelector::SingleId(id));
        }
        Ok(BatchSelector::IdList(ids))
    }

    fn structured_from_args(raw: &Value) -> Result<Self> {
        let parsed: std::result::Result<Vec<StructuredItem>, _> = match raw {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        };
        parsed
            .map(BatchSelector::StructuredList)
            .map_err(|e| {
                MusicError::AmbiguousSelector(format!("tracks must be a JSON array of objects: {e}"))
            })
    }
}

/// A string or an array of strings; blank entries are dropped.
/// With `split_commas`, a single string is split on commas.
fn string_list(value: Option<&Value>, split_commas: bool) -> Result<Vec<String>> {
    let items: Vec<String> = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) if split_commas => s.split(',').map(str::to_string).collect(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(MusicError::AmbiguousSelector(format!(
                    "expected a string, got {other}"
                ))),
            })
            .collect::<Result<_>>()?,
        Some(other) => {
            return Err(MusicError::AmbiguousSelector(format!(
                "expected a string or array, got {other}"
            )));
        }
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_name_with_artist() {
        let sel = BatchSelector::from_args(&json!({"track_name": "Hey Jude", "artist": "The Beatles"}))
            .unwrap();
        let items = sel.flatten().unwrap();
        assert_eq!(
            items,
            vec![TrackSelector::Name(
                MatchQuery::new("Hey Jude").with_artist(Some("The Beatles"))
            )]
        );
    }

    #[test]
    fn test_single_id_is_inferred() {
        let sel = BatchSelector::from_args(&json!({"track_ids": "1440783617"})).unwrap();
        assert_eq!(sel, BatchSelector::SingleId(TrackId::catalog("1440783617")));
    }

    #[test]
    fn test_comma_separated_ids() {
        let sel = BatchSelector::from_args(&json!({"track_ids": "1440783617, i.XYZ789"})).unwrap();
        let items = sel.flatten().unwrap();
        assert_eq!(
            items,
            vec![
                TrackSelector::Id(TrackId::catalog("1440783617")),
                TrackSelector::Id(TrackId::library("i.XYZ789")),
            ]
        );
    }

    #[test]
    fn test_explicit_kind_overrides_inference() {
        let sel = BatchSelector::from_args(&json!({"track_ids": ["123"], "id_kind": "library"}))
            .unwrap();
        assert_eq!(sel, BatchSelector::IdList(vec![TrackId::library("123")]));
    }

    #[test]
    fn test_unclassifiable_id_is_ambiguous() {
        let err = BatchSelector::from_args(&json!({"track_ids": "not an id"})).unwrap_err();
        assert!(matches!(err, MusicError::AmbiguousSelector(_)));
    }

    #[test]
    fn test_name_list_with_shared_artist() {
        let sel = BatchSelector::from_args(
            &json!({"track_name": ["Help!", "Yesterday"], "artist": "The Beatles"}),
        )
        .unwrap();
        let items = sel.flatten().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|s| matches!(
            s,
            TrackSelector::Name(q) if q.artist.as_deref() == Some("The Beatles")
        )));
    }

    #[test]
    fn test_name_list_mismatched_artists() {
        let sel = BatchSelector::NameList {
            names: vec!["a".into(), "b".into(), "c".into()],
            artists: vec!["x".into(), "y".into()],
        };
        assert!(matches!(sel.flatten(), Err(MusicError::AmbiguousSelector(_))));
    }

    #[test]
    fn test_structured_list_from_string() {
        let raw = r#"[{"name": "Uptown Funk", "artist": "Mark Ronson"}, {"id": "i.ABC"}]"#;
        let sel = BatchSelector::from_args(&json!({ "tracks": raw })).unwrap();
        let items = sel.flatten().unwrap();
        assert_eq!(items[1], TrackSelector::Id(TrackId::library("i.ABC")));
        assert!(matches!(&items[0], TrackSelector::Name(q) if q.name == "Uptown Funk"));
    }

    #[test]
    fn test_structured_item_needs_name_or_id() {
        let sel = BatchSelector::from_args(&json!({"tracks": [{"artist": "Queen"}]})).unwrap();
        let err = sel.flatten().unwrap_err();
        assert!(err.to_string().contains("track 1"));
    }

    #[test]
    fn test_structured_list_malformed() {
        let err = BatchSelector::from_args(&json!({"tracks": "not json"})).unwrap_err();
        assert!(matches!(err, MusicError::AmbiguousSelector(_)));
    }

    #[test]
    fn test_exactly_one_form_required() {
        assert!(matches!(
            BatchSelector::from_args(&json!({})),
            Err(MusicError::InvalidQuery(_))
        ));
        assert!(matches!(
            BatchSelector::from_args(&json!({"track_name": "a", "track_ids": "1"})),
            Err(MusicError::AmbiguousSelector(_))
        ));
    }

    #[test]
    fn test_selector_display() {
        let s = TrackSelector::Name(MatchQuery::new("Hey Jude").with_artist(Some("The Beatles")));
        assert_eq!(s.to_string(), "\"Hey Jude\" by The Beatles");
        let s = TrackSelector::Id(TrackId::library("i.X"));
        assert_eq!(s.to_string(), "library ID i.X");
    }
}
