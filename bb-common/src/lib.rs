//! # Breadboard Common Library
//!
//! Shared code for the Breadboard lab catalog including:
//! - Database schema, initialization and migrations
//! - Entity model types (labs, runs, images, ...)
//! - Event types and the in-process event bus
//! - Bootstrap configuration loading
//! - Timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
