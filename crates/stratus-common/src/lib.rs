//! Common types for stratus: errors, retry, tags, configuration and telemetry

#![deny(missing_docs)]

pub mod codes;
pub mod config;
pub mod error;
pub mod events;
pub mod retry;
pub mod tags;
pub mod telemetry;

pub use config::{Credentials, EngineConfig};
pub use error::{Error, ResultExt};
pub use tags::Tag;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
