//! archforge-common - Shared types and constants
//!
//! This crate holds the vocabulary shared by the orchestrator and its test
//! helpers, without any AWS SDK dependencies to keep it lightweight.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`resource_kind`]: Kinds of cloud resources the pipelines manage
//! - [`tags`]: AWS resource tag constants for discovery and lifecycle tracking

pub mod defaults;
pub mod resource_kind;
pub mod tags;

pub use resource_kind::{NameSource, ResourceKind};
