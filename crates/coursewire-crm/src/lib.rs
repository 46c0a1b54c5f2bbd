//! # coursewire-crm
//!
//! CRM transport client for coursewire.
//!
//! This crate provides:
//! - The reqwest-based HTTP implementation of the transport traits
//! - Helpers for remote field names and query string building
//! - A scriptable mock transport for tests

pub mod client;
pub mod mock;
pub mod wire;

// Re-export core types
pub use coursewire_core::{CrmConnection, CrmConnector, QueryPage, SaveResult, WireRecord};

pub use client::{HttpCrmConnection, HttpCrmConnector};
pub use mock::MockCrmConnector;
