//! Entity repositories
//!
//! One module per table. Functions take the pool explicitly and return
//! `bb_common::Result`; writes classify constraint failures through
//! [`bb_common::Error::from_write`].

pub mod cameras;
pub mod datasets;
pub mod images;
pub mod labs;
pub mod profiles;
pub mod projects;
pub mod runs;

use bb_common::{Error, Result};

/// Turn a missing row into [`Error::NotFound`]
pub(crate) fn require<T>(row: Option<T>, what: &str, id: i64) -> Result<T> {
    row.ok_or_else(|| Error::NotFound(format!("{} {} does not exist", what, id)))
}
