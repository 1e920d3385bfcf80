//! Shared test utilities for archforge
//!
//! This crate provides common test helpers that can be used across
//! multiple test modules without circular dependencies.
//!
//! ## Modules
//!
//! - [`aws`]: AWS region detection and unique stack names
//! - [`vars`]: Complete sample variables documents

pub mod aws;
pub mod vars;

// Re-export commonly used items
pub use aws::{get_test_region, test_stack_name};
pub use vars::{SAMPLE_VARS_YAML, sample_vars_with_prefix};
