//! Progress reporting for pipeline runs
//!
//! The sequencer reports each stage transition through [`PipelineReporter`],
//! so the same pipeline can drive the interactive menu, the one-shot CLI
//! commands and the tests.

use super::{Direction, Stage};
use crate::error::OrchestrationError;
use crate::locator::ResourceRef;
use std::sync::Mutex;
use tracing::{error, info};

/// Trait for reporting pipeline progress
pub trait PipelineReporter: Send + Sync {
    /// A stage is about to run
    fn stage_started(&self, direction: Direction, stage: Stage, resource: &str);

    /// A stage finished; `reference` is its primary resource, if it has one
    fn stage_completed(&self, direction: Direction, stage: Stage, reference: Option<&ResourceRef>);

    /// A stage failed and the pipeline is halting
    fn stage_failed(&self, direction: Direction, stage: Stage, resource: &str, error: &OrchestrationError);
}

/// Progress reporter that logs via tracing and prints completed stages
pub struct LogReporter {
    print: bool,
}

impl LogReporter {
    /// Create a reporter that also prints one line per completed stage
    pub fn new() -> Self {
        Self { print: true }
    }

    /// Create a reporter that only logs
    pub fn quiet() -> Self {
        Self { print: false }
    }
}

impl Default for LogReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineReporter for LogReporter {
    fn stage_started(&self, direction: Direction, stage: Stage, resource: &str) {
        info!(%direction, %stage, %resource, "Stage started");
    }

    fn stage_completed(&self, direction: Direction, stage: Stage, reference: Option<&ResourceRef>) {
        info!(%direction, %stage, id = reference.map(|r| r.id.as_str()), "Stage completed");
        if self.print {
            match (direction, reference) {
                (Direction::Create, Some(r)) => println!("  created {stage}: {} ({})", r.name, r.id),
                (Direction::Delete, Some(r)) => println!("  deleted {stage}: {} ({})", r.name, r.id),
                (_, None) => println!("  {direction}d {stage}"),
            }
        }
    }

    fn stage_failed(&self, direction: Direction, stage: Stage, resource: &str, error: &OrchestrationError) {
        error!(%direction, %stage, %resource, error = %error, "Stage failed");
    }
}

/// One observed stage transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Started(Direction, Stage),
    Completed(Direction, Stage, Option<String>),
    Failed(Direction, Stage),
}

/// Reporter that records every transition, for tests and summaries
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<StageEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Stages that completed, in order
    pub fn completed(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StageEvent::Completed(_, stage, _) => Some(stage),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: StageEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl PipelineReporter for RecordingReporter {
    fn stage_started(&self, direction: Direction, stage: Stage, _resource: &str) {
        self.push(StageEvent::Started(direction, stage));
    }

    fn stage_completed(&self, direction: Direction, stage: Stage, reference: Option<&ResourceRef>) {
        self.push(StageEvent::Completed(
            direction,
            stage,
            reference.map(|r| r.id.clone()),
        ));
    }

    fn stage_failed(&self, direction: Direction, stage: Stage, _resource: &str, _error: &OrchestrationError) {
        self.push(StageEvent::Failed(direction, stage));
    }
}
