//! # Shelf Common Library
//!
//! Shared code for the shelf-scanning services including:
//! - Error and result types
//! - TOML configuration loading and root folder resolution
//! - Event types (ShelfEvent enum) and the broadcast event bus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
