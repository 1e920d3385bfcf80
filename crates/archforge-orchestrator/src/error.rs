//! Orchestration error taxonomy
//!
//! Every error aborts the running pipeline; nothing here is retried.

use crate::pipeline::{Direction, Stage};
use crate::provider::ProviderError;
use archforge_common::ResourceKind;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single locate, provision or wait step
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The locator found no live resource under the name
    #[error("No {kind} named '{name}' was found")]
    NotFound { kind: ResourceKind, name: String },

    /// The locator found several live resources under the name
    #[error("{} {kind} resources match '{name}' ({}); refusing to pick one", .ids.len(), .ids.join(", "))]
    AmbiguousResult {
        kind: ResourceKind,
        name: String,
        ids: Vec<String>,
    },

    /// The provider rejected a call
    #[error("Failed to {action} {kind} '{name}'")]
    Provision {
        action: &'static str,
        kind: ResourceKind,
        name: String,
        #[source]
        source: ProviderError,
    },

    /// The readiness waiter ran out of time
    #[error(
        "Timed out after {elapsed:?} waiting for {kind} '{name}' ({polls} polls, last status: {})",
        .last_status.as_deref().unwrap_or("none")
    )]
    WaiterTimeout {
        kind: ResourceKind,
        name: String,
        elapsed: Duration,
        polls: u32,
        last_status: Option<String>,
    },

    /// The resource reached a terminal failure status
    #[error("{kind} '{name}' reached failure status '{status}'")]
    WaiterFailed {
        kind: ResourceKind,
        name: String,
        status: String,
    },

    /// The operator cancelled the run
    #[error("Cancelled")]
    Cancelled,

    /// A stage read an output that no earlier stage produced
    #[error("Stage {stage} needs the output of {dependency}, which has not run")]
    MissingDependency { stage: Stage, dependency: Stage },
}

impl OrchestrationError {
    /// The underlying provider error, if this failure came from one
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            OrchestrationError::Provision { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A pipeline halted at a stage
///
/// Carries enough context for an operator to find the resource and
/// intervene by hand; there is no rollback and no resumption point.
#[derive(Debug, Error)]
#[error("{direction} pipeline halted at stage '{stage}' ({resource}) after {completed} completed stages")]
pub struct PipelineError {
    pub direction: Direction,
    pub stage: Stage,
    /// Logical name of the resource the stage was working on
    pub resource: String,
    /// Number of stages that completed before the failure
    pub completed: usize,
    #[source]
    pub source: OrchestrationError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_message_lists_ids() {
        let err = OrchestrationError::AmbiguousResult {
            kind: ResourceKind::Subnet,
            name: "public-1".to_string(),
            ids: vec!["subnet-a".to_string(), "subnet-b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "2 subnet resources match 'public-1' (subnet-a, subnet-b); refusing to pick one"
        );
    }

    #[test]
    fn test_pipeline_error_names_stage_and_resource() {
        let err = PipelineError {
            direction: Direction::Delete,
            stage: Stage::NatGateway,
            resource: "web-nat".to_string(),
            completed: 20,
            source: OrchestrationError::NotFound {
                kind: ResourceKind::NatGateway,
                name: "web-nat".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "delete pipeline halted at stage 'nat-gateway' (web-nat) after 20 completed stages"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_timeout_message_without_status() {
        let err = OrchestrationError::WaiterTimeout {
            kind: ResourceKind::DbInstance,
            name: "web-db".to_string(),
            elapsed: Duration::from_secs(30),
            polls: 7,
            last_status: None,
        };
        assert!(err.to_string().ends_with("(7 polls, last status: none)"));
    }
}
