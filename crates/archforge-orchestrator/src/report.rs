//! Status and plan reports
//!
//! `status` locates the resource of every stage by its configured name and
//! shows which ones exist; `plan` lists both pipelines without calling the
//! provider.

use crate::config::ArchitectureConfig;
use crate::error::OrchestrationError;
use crate::locator::Locator;
use crate::pipeline::{Direction, Stage};
use crate::provider::{CloudProvider, LookupFilter, compound_id};
use archforge_common::{NameSource, ResourceKind};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;
use std::collections::HashMap;

/// What the locator reported for one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LocateState {
    Found { ids: Vec<String> },
    Missing,
    Ambiguous { ids: Vec<String> },
    /// The stage has no single named resource, or its parent is missing
    Skipped { reason: String },
    Failed { error: String },
}

impl LocateState {
    fn label(&self) -> &'static str {
        match self {
            LocateState::Found { .. } => "found",
            LocateState::Missing => "missing",
            LocateState::Ambiguous { .. } => "ambiguous",
            LocateState::Skipped { .. } => "skipped",
            LocateState::Failed { .. } => "error",
        }
    }

    fn detail(&self) -> String {
        match self {
            LocateState::Found { ids } | LocateState::Ambiguous { ids } => ids.join(", "),
            LocateState::Missing => String::new(),
            LocateState::Skipped { reason } => reason.clone(),
            LocateState::Failed { error } => error.clone(),
        }
    }

    fn single_id(&self) -> Option<&str> {
        match self {
            LocateState::Found { ids } if ids.len() == 1 => Some(ids[0].as_str()),
            _ => None,
        }
    }
}

/// One row of the status report
#[derive(Debug, Clone, Serialize)]
pub struct StatusRow {
    pub stage: Stage,
    pub kind: Option<ResourceKind>,
    pub name: String,
    #[serde(flatten)]
    pub state: LocateState,
}

impl From<Result<Vec<String>, OrchestrationError>> for LocateState {
    fn from(result: Result<Vec<String>, OrchestrationError>) -> Self {
        match result {
            Ok(ids) if ids.is_empty() => LocateState::Missing,
            Ok(ids) => LocateState::Found { ids },
            Err(OrchestrationError::NotFound { .. }) => LocateState::Missing,
            Err(OrchestrationError::AmbiguousResult { ids, .. }) => LocateState::Ambiguous { ids },
            Err(e) => LocateState::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Locate every stage's resource, in creation order.
pub async fn collect_status<P: CloudProvider>(
    config: &ArchitectureConfig,
    provider: &P,
) -> Vec<StatusRow> {
    let locator = Locator::new(provider);
    let mut rows: Vec<StatusRow> = Vec::new();
    let mut found: HashMap<Stage, String> = HashMap::new();

    for &stage in Stage::pipeline(Direction::Create) {
        let name = stage.resource_name(config);
        let kind = stage.primary_kind();
        let state = match kind {
            None => LocateState::Skipped {
                reason: "rules are listed per security group".to_string(),
            },
            Some(kind) => locate_stage(&locator, stage, kind, &name, &found).await,
        };
        if let Some(id) = state.single_id() {
            found.insert(stage, id.to_string());
        }
        rows.push(StatusRow {
            stage,
            kind,
            name,
            state,
        });
    }
    rows
}

async fn locate_stage<P: CloudProvider>(
    locator: &Locator<'_, P>,
    stage: Stage,
    kind: ResourceKind,
    name: &str,
    found: &HashMap<Stage, String>,
) -> LocateState {
    let single = |result: Result<crate::locator::ResourceRef, OrchestrationError>| {
        LocateState::from(result.map(|r| vec![r.id]))
    };
    let parent = |dependency: Stage| found.get(&dependency).cloned();

    match kind.name_source() {
        NameSource::NameTag if stage == Stage::WebServers => {
            let filter = LookupFilter::NameTag(name.to_string());
            LocateState::from(
                locator
                    .locate_all(kind, name, &filter)
                    .await
                    .map(|refs| refs.into_iter().map(|r| r.id).collect()),
            )
        }
        NameSource::NameTag | NameSource::NativeName => single(locator.locate(kind, name).await),
        NameSource::Parent | NameSource::IdOnly => {
            let (dependency, filter) = match stage {
                Stage::Listener => (
                    Stage::LoadBalancer,
                    parent(Stage::LoadBalancer).map(LookupFilter::Parent),
                ),
                Stage::ListenerRule => (Stage::Listener, parent(Stage::Listener).map(LookupFilter::Parent)),
                Stage::ScaleUpSubscription => (
                    Stage::ScaleUpTopic,
                    parent(Stage::ScaleUpTopic).map(LookupFilter::Parent),
                ),
                Stage::ScaleDownSubscription => (
                    Stage::ScaleDownTopic,
                    parent(Stage::ScaleDownTopic).map(LookupFilter::Parent),
                ),
                Stage::ScaleUpNotification | Stage::ScaleDownNotification => {
                    let topic = if stage == Stage::ScaleUpNotification {
                        Stage::ScaleUpTopic
                    } else {
                        Stage::ScaleDownTopic
                    };
                    let filter = parent(Stage::AutoScalingGroup)
                        .zip(parent(topic))
                        .map(|(group, topic)| LookupFilter::Id(compound_id(&[group.as_str(), topic.as_str()])));
                    (topic, filter)
                }
                _ => (stage, None),
            };
            let Some(filter) = filter else {
                return LocateState::Skipped {
                    reason: format!("{dependency} was not found"),
                };
            };
            if matches!(kind, ResourceKind::Subscription) {
                LocateState::from(
                    locator
                        .locate_all(kind, name, &filter)
                        .await
                        .map(|refs| refs.into_iter().map(|r| r.id).collect()),
                )
            } else {
                single(locator.locate_by(kind, name, &filter).await)
            }
        }
    }
}

/// Render the status report as a table
pub fn status_table(rows: &[StatusRow]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Stage"),
            Cell::new("Kind"),
            Cell::new("Name"),
            Cell::new("State"),
            Cell::new("ID / Detail"),
        ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(row.stage.to_string()),
            Cell::new(row.kind.map(|k| k.as_str()).unwrap_or("-")),
            Cell::new(&row.name),
            Cell::new(row.state.label()),
            Cell::new(row.state.detail()),
        ]);
    }
    table
}

/// One row of a pipeline plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanRow {
    pub position: usize,
    pub stage: Stage,
    pub name: String,
    pub depends_on: Vec<Stage>,
}

/// The stages `direction` runs, with the resource each one touches.
pub fn plan(config: &ArchitectureConfig, direction: Direction) -> Vec<PlanRow> {
    Stage::pipeline(direction)
        .iter()
        .enumerate()
        .map(|(index, stage)| PlanRow {
            position: index + 1,
            stage: *stage,
            name: stage.resource_name(config),
            depends_on: stage.dependencies().to_vec(),
        })
        .collect()
}

/// Render a pipeline plan as a table
pub fn plan_table(rows: &[PlanRow]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#"),
            Cell::new("Stage"),
            Cell::new("Resource"),
            Cell::new("Depends on"),
        ]);

    for row in rows {
        let depends_on: Vec<String> = row.depends_on.iter().map(Stage::to_string).collect();
        table.add_row(vec![
            Cell::new(row.position),
            Cell::new(row.stage.to_string()),
            Cell::new(&row.name),
            Cell::new(depends_on.join(", ")),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{LogReporter, Sequencer};
    use crate::testing::FakeProvider;
    use archforge_test_utils::SAMPLE_VARS_YAML;
    use tokio_util::sync::CancellationToken;

    fn config() -> ArchitectureConfig {
        ArchitectureConfig::from_yaml(SAMPLE_VARS_YAML).unwrap()
    }

    #[test]
    fn test_plan_lists_every_stage() {
        let rows = plan(&config(), Direction::Delete);
        assert_eq!(rows.len(), 35);
        assert_eq!(rows[0].stage, Stage::ScaleDownNotification);
        assert_eq!(rows[34].name, "scalable-web-vpc");

        let rendered = plan_table(&rows).to_string();
        assert!(rendered.contains("scalable-web-nat"));
    }

    #[tokio::test]
    async fn test_status_of_empty_account_is_all_missing() {
        let provider = FakeProvider::new();
        let rows = collect_status(&config(), &provider).await;
        assert_eq!(rows.len(), 35);
        assert_eq!(rows[0].state, LocateState::Missing);
        let listener = rows.iter().find(|r| r.stage == Stage::Listener).unwrap();
        assert!(matches!(listener.state, LocateState::Skipped { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_after_create_finds_everything() {
        let config = config();
        let provider = FakeProvider::new();
        let reporter = LogReporter::quiet();
        Sequencer::new(&config, &provider, &reporter, CancellationToken::new())
            .create()
            .await
            .unwrap();

        let rows = collect_status(&config, &provider).await;
        for row in rows.iter().filter(|r| r.kind.is_some()) {
            assert!(
                matches!(row.state, LocateState::Found { .. }),
                "{} not found: {:?}",
                row.stage,
                row.state
            );
        }
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["state"], "found");
        assert_eq!(json["stage"], "vpc");
    }
}
