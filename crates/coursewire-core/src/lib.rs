//! # coursewire-core
//!
//! Core types, traits, and abstractions for the coursewire sync layer.
//!
//! This crate provides the domain models, storage traits, and CRM transport
//! traits that the other coursewire crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use defaults::SyncConfig;
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
