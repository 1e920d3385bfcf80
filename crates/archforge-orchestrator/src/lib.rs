//! archforge-orchestrator - Provision and tear down a scalable AWS web architecture
//!
//! This crate provides the `archforge` binary and the library behind it:
//! the variables-file configuration, the provider client interface and its
//! AWS implementation, and the create and delete pipelines.

pub mod aws;
pub mod config;
pub mod error;
pub mod locator;
pub mod menu;
pub mod pipeline;
pub mod provider;
pub mod provisioner;
pub mod report;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod wait;
