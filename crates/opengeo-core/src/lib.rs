//! OpenGeo Core - Domain models, catalog registry, and configuration
//!
//! This crate contains the domain types and port definitions shared by the
//! STAC adapters and the ImageCollection engine.

pub mod catalogs;
pub mod config;
pub mod error;
pub mod models;
pub mod ports;

pub use error::{OpengeoError, Result};
