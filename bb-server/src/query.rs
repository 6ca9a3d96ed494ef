//! Image query parameters and mode classification
//!
//! The same parameter set arrives as a query string, a form body or a JSON
//! body. Every field is therefore read as a loose JSON value (form values
//! are plain strings) and normalized here, before any database access.

use bb_common::db::{Atom, JsonMap};
use bb_common::{time, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::images::ImageMetadata;

/// Raw image query as received
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageQuery {
    #[serde(default)]
    pub lab: Option<String>,
    /// Comma-joined string or array of image names
    #[serde(default)]
    pub names: Option<Value>,
    /// Comma-joined string or array of ISO-8601 capture times
    #[serde(default)]
    pub created: Option<Value>,
    #[serde(default)]
    pub start_datetime: Option<String>,
    #[serde(default)]
    pub end_datetime: Option<String>,
    #[serde(default)]
    pub force_match: Option<Value>,

    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub filepath: Option<String>,
    #[serde(default)]
    pub tags: Option<Value>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub total_atoms: Option<Value>,
    #[serde(default)]
    pub odpath: Option<String>,
    #[serde(default)]
    pub atomsperpixel: Option<String>,
    #[serde(default)]
    pub cropi: Option<Value>,
    #[serde(default)]
    pub settings: Option<Value>,
    #[serde(default)]
    pub pixel_size: Option<Value>,
    #[serde(default)]
    pub atom: Option<String>,
    #[serde(default)]
    pub bad_shot: Option<Value>,
}

/// Query mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    Quick,
    DateTimeRange,
    Names,
    NamesCreated,
}

/// A validated image query
#[derive(Debug, Clone)]
pub enum ImageRequest {
    /// Every image of the lab
    Quick { lab: String },
    /// Lab images created inside an inclusive range
    DateTimeRange {
        lab: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Existing images looked up by name only
    Names { lab: String, names: Vec<String> },
    /// Find-or-create by `(name, created)` pairs, then link runs
    NamesCreated {
        lab: String,
        names: Vec<String>,
        created: Vec<DateTime<Utc>>,
        force_match: bool,
        metadata: ImageMetadata,
    },
}

impl ImageRequest {
    pub fn mode(&self) -> QueryMode {
        match self {
            ImageRequest::Quick { .. } => QueryMode::Quick,
            ImageRequest::DateTimeRange { .. } => QueryMode::DateTimeRange,
            ImageRequest::Names { .. } => QueryMode::Names,
            ImageRequest::NamesCreated { .. } => QueryMode::NamesCreated,
        }
    }

    pub fn lab(&self) -> &str {
        match self {
            ImageRequest::Quick { lab }
            | ImageRequest::DateTimeRange { lab, .. }
            | ImageRequest::Names { lab, .. }
            | ImageRequest::NamesCreated { lab, .. } => lab,
        }
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidInput(msg.into())
}

/// Blank strings count as absent
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Split a list field; a blank field is absent, a blank element is an error
fn parse_list(field: &str, value: &Option<Value>) -> Result<Option<Vec<String>>> {
    let items: Vec<String> = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.split(',').map(|item| item.trim().to_string()).collect(),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.trim().to_string()),
                other => Err(invalid(format!("{} must contain strings, found {}", field, other))),
            })
            .collect::<Result<_>>()?,
        Some(other) => {
            return Err(invalid(format!(
                "{} must be a comma-separated string or a list, found {}",
                field, other
            )))
        }
    };

    if items.iter().any(String::is_empty) {
        return Err(invalid(format!("{} contains an empty element", field)));
    }
    Ok(Some(items))
}

/// Interpret a boolean flag (`true/false/1/0/yes/no`, case-insensitive)
pub fn parse_flag(field: &str, value: &Option<Value>) -> Result<Option<bool>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(1) => Ok(Some(true)),
            Some(0) => Ok(Some(false)),
            _ => Err(invalid(format!("{} must be a boolean, found {}", field, n))),
        },
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(invalid(format!("{} must be a boolean, found '{}'", field, s))),
        },
        Some(other) => Err(invalid(format!("{} must be a boolean, found {}", field, other))),
    }
}

/// A JSON object, given inline or as JSON text
fn parse_map(field: &str, value: &Option<Value>) -> Result<JsonMap> {
    match value {
        None | Some(Value::Null) => Ok(JsonMap::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(JsonMap::new()),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(invalid(format!("{} must be a JSON object", field))),
        },
        Some(_) => Err(invalid(format!("{} must be a JSON object", field))),
    }
}

fn parse_number(field: &str, value: &Option<Value>) -> Result<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(format!("{} must be a number, found '{}'", field, s))),
        Some(other) => Err(invalid(format!("{} must be a number, found {}", field, other))),
    }
}

impl ImageQuery {
    /// Metadata applied to images created by this query
    pub fn metadata(&self) -> Result<ImageMetadata> {
        let mut tags = parse_map("tags", &self.tags)?;
        if let Some(bad_shot) = parse_flag("bad_shot", &self.bad_shot)? {
            tags.insert("bad_shot".to_string(), Value::Bool(bad_shot));
        }
        let atom = match present(&self.atom) {
            Some(code) => code.parse::<Atom>()?,
            None => Atom::default(),
        };

        Ok(ImageMetadata {
            notes: self.notes.clone(),
            filepath: self.filepath.clone(),
            tags,
            thumbnail: self.thumbnail.clone(),
            total_atoms: parse_number("total_atoms", &self.total_atoms)?,
            odpath: self.odpath.clone(),
            atomsperpixel: self.atomsperpixel.clone(),
            cropi: parse_map("cropi", &self.cropi)?,
            settings: parse_map("settings", &self.settings)?,
            pixel_size: parse_number("pixel_size", &self.pixel_size)?,
            atom,
        })
    }

    /// Validate the parameters and decide the query mode
    pub fn classify(&self) -> Result<ImageRequest> {
        let lab = present(&self.lab)
            .ok_or_else(|| invalid("lab is required"))?
            .to_string();

        let names = parse_list("names", &self.names)?;
        let created = match parse_list("created", &self.created)? {
            Some(items) => Some(
                items
                    .iter()
                    .map(|s| time::parse_timestamp(s))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        let start = present(&self.start_datetime)
            .map(time::parse_timestamp)
            .transpose()?;
        let end = present(&self.end_datetime)
            .map(time::parse_timestamp)
            .transpose()?;
        let force_match = parse_flag("force_match", &self.force_match)?;
        let metadata = self.metadata()?;

        if created.is_some() && names.is_none() {
            return Err(invalid("created requires names"));
        }
        if let (Some(names), Some(created)) = (&names, &created) {
            if names.len() != created.len() {
                return Err(invalid(format!(
                    "names and created must have the same length ({} != {})",
                    names.len(),
                    created.len()
                )));
            }
        }
        if start.is_some() != end.is_some() {
            return Err(invalid(
                "start_datetime and end_datetime must be given together",
            ));
        }
        if names.is_some() && start.is_some() {
            return Err(invalid("names cannot be combined with a datetime range"));
        }
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(invalid("start_datetime must not be after end_datetime"));
            }
        }
        if force_match == Some(true) && created.is_none() {
            return Err(invalid("force_match requires created"));
        }

        Ok(match (names, created, start, end) {
            (Some(names), Some(created), _, _) => ImageRequest::NamesCreated {
                lab,
                names,
                created,
                force_match: force_match.unwrap_or(false),
                metadata,
            },
            (Some(names), None, _, _) => ImageRequest::Names { lab, names },
            (None, _, Some(start), Some(end)) => ImageRequest::DateTimeRange { lab, start, end },
            _ => ImageRequest::Quick { lab },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(value: Value) -> ImageQuery {
        serde_json::from_value(value).unwrap()
    }

    fn rejected(value: Value) -> String {
        match query(value).classify() {
            Err(Error::InvalidInput(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_quick_mode() {
        let req = query(json!({"lab": "bec1"})).classify().unwrap();
        assert_eq!(req.mode(), QueryMode::Quick);
        assert_eq!(req.lab(), "bec1");
    }

    #[test]
    fn test_datetime_range_mode() {
        let req = query(json!({
            "lab": "bec1",
            "start_datetime": "2019-03-04T15:00:00Z",
            "end_datetime": "2019-03-04T16:00:00Z"
        }))
        .classify()
        .unwrap();
        assert_eq!(req.mode(), QueryMode::DateTimeRange);
    }

    #[test]
    fn test_names_mode() {
        match query(json!({"lab": "bec1", "names": "shot_A, shot_B"})).classify().unwrap() {
            ImageRequest::Names { names, .. } => assert_eq!(names, vec!["shot_A", "shot_B"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_names_created_mode_from_form_strings() {
        let req = query(json!({
            "lab": "bec1",
            "names": "shot_A,shot_B",
            "created": "2019-03-04T15:10:06Z,2019-03-04T15:10:30Z",
            "force_match": "True"
        }))
        .classify()
        .unwrap();
        match req {
            ImageRequest::NamesCreated { names, created, force_match, .. } => {
                assert_eq!(names.len(), 2);
                assert_eq!(created.len(), 2);
                assert!(force_match);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_names_created_accepts_json_arrays() {
        let req = query(json!({
            "lab": "bec1",
            "names": ["shot_A"],
            "created": ["2019-03-04 15:10:06"],
            "force_match": false
        }))
        .classify()
        .unwrap();
        assert_eq!(req.mode(), QueryMode::NamesCreated);
    }

    #[test]
    fn test_missing_lab_rejected() {
        assert!(rejected(json!({"names": "a"})).contains("lab"));
        assert!(rejected(json!({"lab": "  "})).contains("lab"));
    }

    #[test]
    fn test_unequal_lengths_rejected() {
        let msg = rejected(json!({
            "lab": "bec1",
            "names": "a,b",
            "created": "2019-03-04T15:10:06Z"
        }));
        assert!(msg.contains("same length"));
    }

    #[test]
    fn test_created_without_names_rejected() {
        let msg = rejected(json!({"lab": "bec1", "created": "2019-03-04T15:10:06Z"}));
        assert!(msg.contains("requires names"));
    }

    #[test]
    fn test_half_range_rejected() {
        let msg = rejected(json!({"lab": "bec1", "start_datetime": "2019-03-04T15:10:06Z"}));
        assert!(msg.contains("together"));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let msg = rejected(json!({
            "lab": "bec1",
            "start_datetime": "2019-03-05T00:00:00Z",
            "end_datetime": "2019-03-04T00:00:00Z"
        }));
        assert!(msg.contains("after"));
    }

    #[test]
    fn test_names_with_range_rejected() {
        let msg = rejected(json!({
            "lab": "bec1",
            "names": "a",
            "start_datetime": "2019-03-04T00:00:00Z",
            "end_datetime": "2019-03-05T00:00:00Z"
        }));
        assert!(msg.contains("datetime range"));
    }

    #[test]
    fn test_force_match_without_created_rejected() {
        let msg = rejected(json!({"lab": "bec1", "names": "a", "force_match": "yes"}));
        assert!(msg.contains("force_match"));
    }

    #[test]
    fn test_bad_elements_rejected() {
        assert!(rejected(json!({"lab": "bec1", "names": "a,,b"})).contains("empty"));
        assert!(rejected(json!({
            "lab": "bec1",
            "names": "a",
            "created": "yesterday"
        }))
        .contains("timestamp"));
        assert!(rejected(json!({"lab": "bec1", "force_match": "maybe"})).contains("boolean"));
        assert!(rejected(json!({"lab": "bec1", "tags": "[1, 2]"})).contains("JSON object"));
    }

    #[test]
    fn test_metadata_collects_bad_shot_into_tags() {
        let meta = query(json!({
            "lab": "bec1",
            "tags": "{\"cloud\": \"hot\"}",
            "bad_shot": "yes",
            "total_atoms": "1.5e6",
            "atom": "Na"
        }))
        .metadata()
        .unwrap();
        assert_eq!(meta.tags["cloud"], "hot");
        assert_eq!(meta.tags["bad_shot"], true);
        assert_eq!(meta.total_atoms, Some(1.5e6));
        assert_eq!(meta.atom, Atom::Sodium);
        assert_eq!(meta.pixel_size(), 1.0);
    }
}
