//! Pipeline tests against the in-memory provider
//!
//! These run the full create and delete pipelines over the sample variables
//! file, with time paused so readiness waits complete instantly.

use archforge_common::ResourceKind;
use archforge_common::tags::{TAG_STATUS, status};
use archforge_orchestrator::config::ArchitectureConfig;
use archforge_orchestrator::error::{OrchestrationError, PipelineError};
use archforge_orchestrator::pipeline::{
    CREATE_PIPELINE, DELETE_PIPELINE, RecordingReporter, RunSummary, Sequencer, Stage,
};
use archforge_orchestrator::provider::{CloudProvider, CreateRequest, ProviderError, ResourceTags};
use archforge_orchestrator::testing::{Call, FakeProvider};
use archforge_test_utils::SAMPLE_VARS_YAML;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

fn config() -> ArchitectureConfig {
    ArchitectureConfig::from_yaml(SAMPLE_VARS_YAML).unwrap()
}

async fn create(
    config: &ArchitectureConfig,
    provider: &FakeProvider,
    reporter: &RecordingReporter,
) -> Result<RunSummary, PipelineError> {
    Sequencer::new(config, provider, reporter, CancellationToken::new())
        .create()
        .await
}

async fn delete(
    config: &ArchitectureConfig,
    provider: &FakeProvider,
    reporter: &RecordingReporter,
) -> Result<RunSummary, PipelineError> {
    Sequencer::new(config, provider, reporter, CancellationToken::new())
        .delete()
        .await
}

fn created_kinds(provider: &FakeProvider) -> Vec<ResourceKind> {
    provider
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Create(kind, _) => Some(kind),
            _ => None,
        })
        .collect()
}

fn stage_ids(summary: &RunSummary) -> HashMap<Stage, String> {
    summary
        .stages
        .iter()
        .filter_map(|(stage, r)| r.as_ref().map(|r| (*stage, r.id.clone())))
        .collect()
}

fn deleted(provider: &FakeProvider) -> Vec<(ResourceKind, String)> {
    provider
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Delete(kind, id) => Some((kind, id)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_create_then_delete_leaves_nothing_behind() {
    let config = config();
    let provider = FakeProvider::new();
    let reporter = RecordingReporter::new();

    let created = create(&config, &provider, &reporter).await.unwrap();
    assert_eq!(created.stages.len(), CREATE_PIPELINE.len());
    assert!(!provider.live().is_empty());

    let removed = delete(&config, &provider, &reporter).await.unwrap();
    assert_eq!(removed.stages.len(), DELETE_PIPELINE.len());
    assert!(
        provider.live().is_empty(),
        "left behind: {:?}",
        provider.live()
    );
}

#[tokio::test(start_paused = true)]
async fn test_delete_removes_what_create_made_in_reverse_order() {
    let config = config();
    let provider = FakeProvider::new();

    let create_reporter = RecordingReporter::new();
    let created = create(&config, &provider, &create_reporter).await.unwrap();
    assert_eq!(create_reporter.completed(), CREATE_PIPELINE.to_vec());

    let delete_reporter = RecordingReporter::new();
    let removed = delete(&config, &provider, &delete_reporter).await.unwrap();
    assert_eq!(delete_reporter.completed(), DELETE_PIPELINE.to_vec());

    let created_ids = stage_ids(&created);
    for (stage, reference) in &removed.stages {
        if let Some(reference) = reference {
            assert_eq!(
                created_ids.get(stage),
                Some(&reference.id),
                "{stage} deleted a resource it did not create"
            );
        }
    }

    assert_eq!(created_kinds(&provider).first(), Some(&ResourceKind::Vpc));
    let deletions = deleted(&provider);
    assert_eq!(deletions.last().map(|(kind, _)| *kind), Some(ResourceKind::Vpc));

    let position = |kind: ResourceKind| deletions.iter().position(|(k, _)| *k == kind);
    assert!(position(ResourceKind::LoadBalancer) < position(ResourceKind::TargetGroup));
    assert!(position(ResourceKind::GatewayAttachment) < position(ResourceKind::InternetGateway));
    assert!(position(ResourceKind::RouteTableAssociation) < position(ResourceKind::Subnet));
    assert!(position(ResourceKind::IngressRule) < position(ResourceKind::SecurityGroup));
}

#[tokio::test(start_paused = true)]
async fn test_create_issues_one_call_per_resource_in_order() {
    use ResourceKind::*;

    let config = config();
    let provider = FakeProvider::new();
    create(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap();

    let mut expected = vec![Vpc, InternetGateway, GatewayAttachment, ElasticIp];
    expected.extend([RouteTable, Route]);
    expected.extend([Subnet, RouteTableAssociation, Subnet, RouteTableAssociation]);
    expected.push(NatGateway);
    expected.extend([RouteTable, Route]);
    expected.extend([Subnet, RouteTableAssociation, Subnet, RouteTableAssociation]);
    expected.extend([SecurityGroup, SecurityGroup, SecurityGroup]);
    // HTTP, HTTPS, one SSH rule per operator CIDR, then the app and database tiers
    expected.extend([IngressRule; 2]);
    expected.extend(vec![IngressRule; config.security.ssh_cidr_blocks.len()]);
    expected.extend([IngressRule; 3]);
    expected.extend([DbSubnetGroup, DbInstance, Instance]);
    expected.extend([LoadBalancer, TargetGroup, Listener, ListenerRule]);
    expected.extend([LaunchTemplate, AutoScalingGroup]);
    expected.extend([ScalingPolicy; 4]);
    expected.extend([Alarm, Alarm, Topic, Topic, Subscription, Subscription]);
    expected.extend([NotificationConfiguration, NotificationConfiguration]);

    assert_eq!(config.security.ssh_cidr_blocks.len(), 2);
    assert_eq!(created_kinds(&provider), expected);
}

#[tokio::test(start_paused = true)]
async fn test_dependent_requests_carry_ids_from_earlier_stages() {
    let config = config();
    let provider = FakeProvider::new();
    let summary = create(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap();
    let ids = stage_ids(&summary);
    let refs_of = |stage: Stage| provider.find(&ids[&stage]).unwrap().refs;

    assert_eq!(
        refs_of(Stage::NatGateway),
        vec![ids[&Stage::PublicSubnet1].clone(), ids[&Stage::ElasticIp].clone()]
    );
    assert_eq!(
        refs_of(Stage::Listener),
        vec![ids[&Stage::LoadBalancer].clone(), ids[&Stage::TargetGroup].clone()]
    );
    assert_eq!(
        refs_of(Stage::AutoScalingGroup),
        vec![
            ids[&Stage::LaunchTemplate].clone(),
            ids[&Stage::TargetGroup].clone(),
            ids[&Stage::PrivateSubnet1].clone(),
            ids[&Stage::PrivateSubnet2].clone(),
        ]
    );

    // The private route sends traffic through the NAT gateway just created
    let private_table = &ids[&Stage::PrivateRouteTable];
    let private_route = provider
        .resources()
        .into_iter()
        .find(|r| r.kind == ResourceKind::Route && r.refs.first() == Some(private_table))
        .unwrap();
    assert_eq!(private_route.refs[1], ids[&Stage::NatGateway]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_vpc_name_halts_delete_before_any_removal() {
    let config = config();
    let provider = FakeProvider::new();
    create(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap();

    let vpc_name = Stage::Vpc.resource_name(&config);
    let stray = provider
        .create(
            &CreateRequest::Vpc {
                cidr_block: "10.99.0.0/16".to_string(),
            },
            &ResourceTags {
                name: vpc_name.clone(),
                stack: config.stack_name.clone(),
                run_id: "another-run".to_string(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
            },
        )
        .await
        .unwrap();

    let reporter = RecordingReporter::new();
    let err = delete(&config, &provider, &reporter).await.unwrap_err();

    assert_eq!(err.stage, Stage::Vpc);
    assert_eq!(err.completed, 0);
    match &err.source {
        OrchestrationError::AmbiguousResult { kind, name, ids } => {
            assert_eq!(*kind, ResourceKind::Vpc);
            assert_eq!(*name, vpc_name);
            assert_eq!(ids.len(), 2);
            assert!(ids.contains(&stray.id));
        }
        other => panic!("expected an ambiguous VPC lookup, got {other:?}"),
    }
    assert!(reporter.completed().is_empty());
    assert!(deleted(&provider).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_created_resources_are_marked_active() {
    let config = config();
    let provider = FakeProvider::new();
    create(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap();

    for resource in provider.live().iter().filter(|r| r.kind.supports_tags()) {
        assert_eq!(
            resource.tags.get(TAG_STATUS).map(String::as_str),
            Some(status::ACTIVE),
            "{} {} still tagged {:?}",
            resource.kind,
            resource.id,
            resource.tags.get(TAG_STATUS)
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_resource_halts_delete() {
    let config = config();
    let provider = FakeProvider::new();
    create(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap();
    assert!(provider.remove_named(ResourceKind::NatGateway, "scalable-web-nat"));

    let reporter = RecordingReporter::new();
    let err = delete(&config, &provider, &reporter).await.unwrap_err();

    assert_eq!(err.stage, Stage::NatGateway);
    assert!(matches!(
        err.source,
        OrchestrationError::NotFound {
            kind: ResourceKind::NatGateway,
            ..
        }
    ));
    let halted_at = DELETE_PIPELINE
        .iter()
        .position(|s| *s == Stage::NatGateway)
        .unwrap();
    assert_eq!(err.completed, halted_at);
    assert_eq!(reporter.completed().len(), halted_at);

    // Nothing past the failed stage was touched
    assert!(provider.live().iter().any(|r| r.kind == ResourceKind::Vpc));
    assert!(!deleted(&provider).iter().any(|(kind, _)| *kind == ResourceKind::ElasticIp));
}

#[tokio::test]
async fn test_delete_of_empty_account_halts_at_first_stage() {
    let config = config();
    let provider = FakeProvider::new();

    let err = delete(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap_err();
    assert_eq!(err.stage, DELETE_PIPELINE[0]);
    assert_eq!(err.completed, 0);
    assert!(matches!(err.source, OrchestrationError::NotFound { .. }));
    assert!(deleted(&provider).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_nat_gateway_that_never_becomes_available_times_out() {
    let config = config().with_waiter_timeout(Some(60)).unwrap();
    let provider = FakeProvider::new();
    provider.script_status(ResourceKind::NatGateway, &["pending"]);

    let err = create(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::NatGateway);
    match &err.source {
        OrchestrationError::WaiterTimeout {
            kind, last_status, ..
        } => {
            assert_eq!(*kind, ResourceKind::NatGateway);
            assert_eq!(last_status.as_deref(), Some("pending"));
        }
        other => panic!("expected a waiter timeout, got {other:?}"),
    }
    // The private route table is never attempted
    let route_tables = created_kinds(&provider)
        .into_iter()
        .filter(|k| *k == ResourceKind::RouteTable)
        .count();
    assert_eq!(route_tables, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_database_halts_create() {
    let config = config();
    let provider = FakeProvider::new();
    provider.script_status(ResourceKind::DbInstance, &["creating", "failed"]);

    let err = create(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Database);
    assert!(matches!(
        &err.source,
        OrchestrationError::WaiterFailed { status, .. } if status == "failed"
    ));
    assert!(!created_kinds(&provider).contains(&ResourceKind::Instance));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_create_is_not_retried() {
    let config = config();
    let provider = FakeProvider::new();
    provider.fail_creates(ResourceKind::LoadBalancer);

    let err = create(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::LoadBalancer);
    assert!(matches!(
        err.source.provider_error(),
        Some(ProviderError::Sdk { .. })
    ));
    let kinds = created_kinds(&provider);
    assert!(!kinds.contains(&ResourceKind::LoadBalancer));
    assert!(!kinds.contains(&ResourceKind::TargetGroup));
}

#[tokio::test(start_paused = true)]
async fn test_second_create_collides_on_native_names() {
    let config = config();
    let provider = FakeProvider::new();
    create(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap();

    let err = create(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::AppSecurityGroup);
    assert!(matches!(
        err.source.provider_error(),
        Some(ProviderError::AlreadyExists { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_subscriptions_go_with_their_topic() {
    let config = config();
    let provider = FakeProvider::new();
    provider.hold_subscriptions_pending();

    create(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap();
    delete(&config, &provider, &RecordingReporter::new())
        .await
        .unwrap();

    assert!(
        !deleted(&provider)
            .iter()
            .any(|(kind, _)| *kind == ResourceKind::Subscription)
    );
    assert!(provider.live().is_empty());
}

#[tokio::test]
async fn test_cancelled_run_stops_before_first_stage() {
    let config = config();
    let provider = FakeProvider::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Sequencer::new(&config, &provider, &RecordingReporter::new(), cancel)
        .create()
        .await
        .unwrap_err();

    assert_eq!(err.stage, CREATE_PIPELINE[0]);
    assert!(matches!(err.source, OrchestrationError::Cancelled));
    assert!(provider.calls().is_empty());
}
