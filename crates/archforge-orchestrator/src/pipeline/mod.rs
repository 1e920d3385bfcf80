//! Create and delete pipelines for the scalable web architecture
//!
//! The [`Sequencer`] runs the fixed stage lists from [`stage`] strictly one
//! after another. A failing stage halts the run with a [`PipelineError`]
//! naming the stage and resource; nothing is rolled back or retried.

mod create;
mod delete;
pub mod progress;
mod refs;
pub mod stage;

pub use create::{DEFAULT_ROUTE, INSTANCE_IDS_FIELD, StageOutput, target_group_attributes};
pub use delete::PENDING_SUBSCRIPTION;
pub use progress::{LogReporter, PipelineReporter, RecordingReporter, StageEvent};
pub use refs::ResolvedRefs;
pub use stage::{CREATE_PIPELINE, DELETE_PIPELINE, Direction, OrderingViolation, Stage, validate_ordering};

use crate::config::ArchitectureConfig;
use crate::error::{OrchestrationError, PipelineError};
use crate::locator::{Locator, ResourceRef};
use crate::provider::CloudProvider;
use crate::provisioner::Provisioner;
use crate::wait::ReadinessWaiter;
use create::Creator;
use delete::Deleter;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Outcome of a completed pipeline run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub direction: Direction,
    pub run_id: String,
    /// Primary resource of each stage, in execution order
    pub stages: Vec<(Stage, Option<ResourceRef>)>,
    pub elapsed: std::time::Duration,
}

/// Drives the create and delete pipelines against one provider
pub struct Sequencer<'a, P> {
    config: &'a ArchitectureConfig,
    provider: &'a P,
    reporter: &'a dyn PipelineReporter,
    cancel: CancellationToken,
    run_id: String,
}

impl<'a, P: CloudProvider> Sequencer<'a, P> {
    pub fn new(
        config: &'a ArchitectureConfig,
        provider: &'a P,
        reporter: &'a dyn PipelineReporter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            provider,
            reporter,
            cancel,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Use a fixed run ID instead of a generated one
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn provisioner(&self) -> Provisioner<'a, P> {
        Provisioner::new(self.provider, self.config.stack_name.clone(), self.run_id.clone())
    }

    fn waiter(&self) -> ReadinessWaiter<'a, P> {
        ReadinessWaiter::new(self.provider, &self.config.waiter, self.cancel.clone())
    }

    /// Provision every stage of the architecture in dependency order.
    #[instrument(skip_all, fields(stack = %self.config.stack_name, run_id = %self.run_id))]
    pub async fn create(&self) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let mut creator = Creator::new(self.config, self.provisioner(), self.waiter());
        let mut stages = Vec::with_capacity(CREATE_PIPELINE.len());

        info!(stages = CREATE_PIPELINE.len(), "Starting create pipeline");
        for &stage in CREATE_PIPELINE {
            let resource = stage.resource_name(self.config);
            self.check_cancelled(Direction::Create, stage, &resource, stages.len())?;
            self.reporter.stage_started(Direction::Create, stage, &resource);

            let result = match creator.run(stage).await {
                Ok(output) => self.activate(&creator, &output).await.map(|()| output),
                Err(e) => Err(e),
            };
            let output = result.map_err(|e| self.fail(Direction::Create, stage, resource, stages.len(), e))?;

            self.reporter
                .stage_completed(Direction::Create, stage, output.primary.as_ref());
            stages.push((stage, output.primary));
        }

        info!(elapsed_secs = started.elapsed().as_secs(), "Create pipeline finished");
        Ok(RunSummary {
            direction: Direction::Create,
            run_id: self.run_id.clone(),
            stages,
            elapsed: started.elapsed(),
        })
    }

    /// Tear the architecture down in reverse dependency order.
    #[instrument(skip_all, fields(stack = %self.config.stack_name, run_id = %self.run_id))]
    pub async fn delete(&self) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let deleter = Deleter::new(
            self.config,
            Locator::new(self.provider),
            self.provisioner(),
            self.waiter(),
        );
        let mut stages = Vec::with_capacity(DELETE_PIPELINE.len());

        info!(stages = DELETE_PIPELINE.len(), "Starting delete pipeline");
        deleter.check_vpc_unique().await.map_err(|e| {
            let resource = Stage::Vpc.resource_name(self.config);
            self.fail(Direction::Delete, Stage::Vpc, resource, 0, e)
        })?;
        for &stage in DELETE_PIPELINE {
            let resource = stage.resource_name(self.config);
            self.check_cancelled(Direction::Delete, stage, &resource, stages.len())?;
            self.reporter.stage_started(Direction::Delete, stage, &resource);

            let removed = deleter
                .run(stage)
                .await
                .map_err(|e| self.fail(Direction::Delete, stage, resource, stages.len(), e))?;

            self.reporter
                .stage_completed(Direction::Delete, stage, removed.as_ref());
            stages.push((stage, removed));
        }

        info!(elapsed_secs = started.elapsed().as_secs(), "Delete pipeline finished");
        Ok(RunSummary {
            direction: Direction::Delete,
            run_id: self.run_id.clone(),
            stages,
            elapsed: started.elapsed(),
        })
    }

    /// Flip every resource the stage created to `active`.
    async fn activate(&self, creator: &Creator<'a, P>, output: &StageOutput) -> Result<(), OrchestrationError> {
        for reference in &output.created {
            creator.provisioner().activate(reference).await?;
        }
        Ok(())
    }

    fn check_cancelled(
        &self,
        direction: Direction,
        stage: Stage,
        resource: &str,
        completed: usize,
    ) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(self.fail(
                direction,
                stage,
                resource.to_string(),
                completed,
                OrchestrationError::Cancelled,
            ));
        }
        Ok(())
    }

    fn fail(
        &self,
        direction: Direction,
        stage: Stage,
        resource: String,
        completed: usize,
        source: OrchestrationError,
    ) -> PipelineError {
        self.reporter.stage_failed(direction, stage, &resource, &source);
        PipelineError {
            direction,
            stage,
            resource,
            completed,
            source,
        }
    }
}
