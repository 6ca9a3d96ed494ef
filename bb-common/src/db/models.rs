//! Database models
//!
//! Row decoding is done by hand (`from_row`) so that JSON map columns and
//! fixed-width timestamp text are validated in one place.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;
use std::str::FromStr;

use crate::time;
use crate::{Error, Result};

/// Free-form metadata map (tags, run parameters, crop info, settings)
pub type JsonMap = Map<String, Value>;

/// Decode a JSON object column; NULL and empty text decode to an empty map
pub fn decode_map(raw: Option<String>) -> Result<JsonMap> {
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("null") => Ok(JsonMap::new()),
        Some(text) => match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Internal(format!(
                "expected JSON object in map column, found {}",
                other
            ))),
        },
    }
}

/// Encode a JSON map for storage
pub fn encode_map(map: &JsonMap) -> String {
    Value::Object(map.clone()).to_string()
}

fn decode_ts(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    time::from_db(&raw)
}

/// Atom species used in the imaging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Atom {
    #[default]
    #[serde(rename = "Li")]
    Lithium,
    #[serde(rename = "Na")]
    Sodium,
    #[serde(rename = "K")]
    Potassium,
}

impl Atom {
    /// Short code stored in the database
    pub fn code(self) -> &'static str {
        match self {
            Atom::Lithium => "Li",
            Atom::Sodium => "Na",
            Atom::Potassium => "K",
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Atom {
    type Err = Error;

    /// Accepts the short code or the full species name, case-insensitively
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "li" | "lithium" => Ok(Atom::Lithium),
            "na" | "sodium" => Ok(Atom::Sodium),
            "k" | "potassium" => Ok(Atom::Potassium),
            other => Err(Error::InvalidInput(format!(
                "unknown atom species '{}' (expected Li, Na or K)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lab {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub info: Option<String>,
    pub photo: Option<String>,
}

impl Lab {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created: decode_ts(row, "created")?,
            info: row.try_get("info")?,
            photo: row.try_get("photo")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub notes: String,
    pub lab_id: Option<i64>,
}

impl Project {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created: decode_ts(row, "created")?,
            notes: row.try_get("notes")?,
            lab_id: row.try_get("lab_id")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub notes: String,
    pub flag: String,
    pub tags: JsonMap,
    pub project_id: Option<i64>,
    pub lab_id: Option<i64>,
}

impl Dataset {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created: decode_ts(row, "created")?,
            notes: row.try_get("notes")?,
            flag: row.try_get("flag")?,
            tags: decode_map(row.try_get("tags")?)?,
            project_id: row.try_get("project_id")?,
            lab_id: row.try_get("lab_id")?,
        })
    }
}

/// One experimental cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub created: DateTime<Utc>,
    /// Nominal time the cycle ran; images are matched against this
    pub runtime: DateTime<Utc>,
    /// Lab work date (often overflows past midnight)
    pub workday: NaiveDate,
    pub parameters: JsonMap,
    pub bad_shot: bool,
    pub notes: String,
    pub lab_id: Option<i64>,
    pub dataset_id: Option<i64>,
}

impl Run {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let workday: String = row.try_get("workday")?;
        Ok(Self {
            id: row.try_get("id")?,
            created: decode_ts(row, "created")?,
            runtime: decode_ts(row, "runtime")?,
            workday: time::parse_date(&workday)?,
            parameters: decode_map(row.try_get("parameters")?)?,
            bad_shot: row.try_get("bad_shot")?,
            notes: row.try_get("notes")?,
            lab_id: row.try_get("lab_id")?,
            dataset_id: row.try_get("dataset_id")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub id: i64,
    pub name: String,
    pub sdk_id: Option<String>,
    pub created: DateTime<Utc>,
    pub magnification: Option<f64>,
    pub axis: Option<String>,
    pub pixel_size: Option<f64>,
    pub double_imaging: bool,
    pub active: bool,
    pub calibration_dataset_id: Option<i64>,
    pub lab_id: Option<i64>,
}

impl Camera {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            sdk_id: row.try_get("sdk_id")?,
            created: decode_ts(row, "created")?,
            magnification: row.try_get("magnification")?,
            axis: row.try_get("axis")?,
            pixel_size: row.try_get("pixel_size")?,
            double_imaging: row.try_get("double_imaging")?,
            active: row.try_get("active")?,
            calibration_dataset_id: row.try_get("calibration_dataset_id")?,
            lab_id: row.try_get("lab_id")?,
        })
    }
}

/// One captured frame and its analysis artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub notes: Option<String>,
    pub filepath: Option<String>,
    pub tags: JsonMap,
    pub thumbnail: Option<String>,
    pub total_atoms: Option<f64>,
    pub odpath: Option<String>,
    pub atomsperpixel: Option<String>,
    pub cropi: JsonMap,
    pub settings: JsonMap,
    pub pixel_size: Option<f64>,
    pub atom: Atom,
    pub run_id: Option<i64>,
    pub lab_id: Option<i64>,
}

impl Image {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let atom: String = row.try_get("atom")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created: decode_ts(row, "created")?,
            notes: row.try_get("notes")?,
            filepath: row.try_get("filepath")?,
            tags: decode_map(row.try_get("tags")?)?,
            thumbnail: row.try_get("thumbnail")?,
            total_atoms: row.try_get("total_atoms")?,
            odpath: row.try_get("odpath")?,
            atomsperpixel: row.try_get("atomsperpixel")?,
            cropi: decode_map(row.try_get("cropi")?)?,
            settings: decode_map(row.try_get("settings")?)?,
            pixel_size: row.try_get("pixel_size")?,
            atom: atom.parse()?,
            run_id: row.try_get("run_id")?,
            lab_id: row.try_get("lab_id")?,
        })
    }
}

/// Per-user information (which lab a user works in)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub lab_id: Option<i64>,
    pub description: Option<String>,
}

impl UserProfile {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            lab_id: row.try_get("lab_id")?,
            description: row.try_get("description")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_atom_parse_accepts_codes_and_names() {
        assert_eq!("Li".parse::<Atom>().unwrap(), Atom::Lithium);
        assert_eq!("sodium".parse::<Atom>().unwrap(), Atom::Sodium);
        assert_eq!(" K ".parse::<Atom>().unwrap(), Atom::Potassium);
        assert!("Rb".parse::<Atom>().is_err());
    }

    #[test]
    fn test_atom_serializes_as_code() {
        assert_eq!(serde_json::to_value(Atom::Sodium).unwrap(), json!("Na"));
        assert_eq!(Atom::default(), Atom::Lithium);
    }

    #[test]
    fn test_decode_map_handles_null_and_empty() {
        assert!(decode_map(None).unwrap().is_empty());
        assert!(decode_map(Some(String::new())).unwrap().is_empty());
        assert!(decode_map(Some("null".to_string())).unwrap().is_empty());
    }

    #[test]
    fn test_decode_map_rejects_non_object() {
        assert!(decode_map(Some("[1,2]".to_string())).is_err());
    }

    #[test]
    fn test_map_encoding_preserves_values() {
        let mut map = JsonMap::new();
        map.insert("TOF".to_string(), json!(0));
        map.insert("evap".to_string(), json!(90.5));
        let decoded = decode_map(Some(encode_map(&map))).unwrap();
        assert_eq!(decoded, map);
    }
}
