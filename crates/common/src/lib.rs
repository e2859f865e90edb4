//! Common types and utilities shared across the premiums components

pub mod config;
pub mod error;
pub mod symbols;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
