//! Names-only image lookup
//!
//! Without capture times a name is only a hint, so the lookup is strict:
//! each requested name must resolve to exactly one image of the lab.

use bb_common::db::Image;
use bb_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::BTreeSet;

use crate::db::{images, labs};

pub async fn images_by_name(pool: &SqlitePool, lab: &str, names: &[String]) -> Result<Vec<Image>> {
    let lab = labs::require_by_name(pool, lab).await?;
    let requested: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    let unique: Vec<String> = requested.iter().map(|s| s.to_string()).collect();
    let found = images::find_by_names(pool, lab.id, &unique).await?;
    check_one_to_one(&requested, found)
}

/// Every requested name matched exactly once
fn check_one_to_one(requested: &BTreeSet<&str>, found: Vec<Image>) -> Result<Vec<Image>> {
    let present: BTreeSet<&str> = found.iter().map(|image| image.name.as_str()).collect();
    let missing: Vec<&str> = requested.difference(&present).copied().collect();

    if found.len() < requested.len() {
        return Err(Error::NotFound(format!("no image named {}", missing.join(", "))));
    }
    if found.len() > requested.len() || !missing.is_empty() {
        return Err(Error::Ambiguous(format!(
            "{} images match {} names; refine the query with created times",
            found.len(),
            requested.len()
        )));
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_common::db::{Atom, JsonMap};
    use chrono::Utc;

    fn image(id: i64, name: &str) -> Image {
        Image {
            id,
            name: name.to_string(),
            created: Utc::now(),
            notes: None,
            filepath: None,
            tags: JsonMap::new(),
            thumbnail: None,
            total_atoms: None,
            odpath: None,
            atomsperpixel: None,
            cropi: JsonMap::new(),
            settings: JsonMap::new(),
            pixel_size: None,
            atom: Atom::Lithium,
            run_id: None,
            lab_id: Some(1),
        }
    }

    #[test]
    fn test_exact_match_passes() {
        let requested: BTreeSet<&str> = ["a", "b"].into_iter().collect();
        let found = check_one_to_one(&requested, vec![image(1, "a"), image(2, "b")]).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_missing_name_is_not_found() {
        let requested: BTreeSet<&str> = ["a", "b"].into_iter().collect();
        match check_one_to_one(&requested, vec![image(1, "a")]) {
            Err(Error::NotFound(msg)) => assert!(msg.contains('b')),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_name_is_ambiguous() {
        let requested: BTreeSet<&str> = ["a"].into_iter().collect();
        let result = check_one_to_one(&requested, vec![image(1, "a"), image(2, "a")]);
        assert!(matches!(result, Err(Error::Ambiguous(_))));
    }

    #[test]
    fn test_duplicate_hiding_a_missing_name_is_ambiguous() {
        let requested: BTreeSet<&str> = ["a", "b"].into_iter().collect();
        let result = check_one_to_one(&requested, vec![image(1, "a"), image(2, "a")]);
        assert!(matches!(result, Err(Error::Ambiguous(_))));
    }
}
