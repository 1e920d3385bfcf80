//! AWS integration tests - actually call AWS APIs
//!
//! These tests are marked `#[ignore]` and only run with:
//! ```
//! AWS_PROFILE=your_profile cargo test --test aws_integration -- --ignored
//! ```
//!
//! The round trip creates a NAT gateway, a load balancer and an RDS
//! instance, so it takes tens of minutes and incurs charges.

use archforge_orchestrator::aws::{AwsContext, AwsProvider, Ec2Client, caller_identity};
use archforge_orchestrator::config::ArchitectureConfig;
use archforge_orchestrator::pipeline::{LogReporter, Sequencer};
use archforge_orchestrator::provider::{CloudProvider, LookupFilter};
use archforge_orchestrator::report::{LocateState, collect_status};
use archforge_common::ResourceKind;
use archforge_test_utils::{get_test_region, sample_vars_with_prefix, test_stack_name};
use tokio_util::sync::CancellationToken;

fn test_config(stack: &str) -> ArchitectureConfig {
    ArchitectureConfig::from_yaml(&sample_vars_with_prefix(stack))
        .expect("sample variables should parse")
        .with_region(Some(get_test_region()))
        .expect("test region should be valid")
}

/// Credentials resolve to an account
#[tokio::test]
#[ignore]
async fn test_account_lookup() {
    let aws = AwsContext::new(&get_test_region()).await;
    let caller = caller_identity(&aws)
        .await
        .expect("AWS credentials required - set AWS_PROFILE or AWS_ACCESS_KEY_ID");
    assert_eq!(caller.account.len(), 12);
    assert!(caller.arn.starts_with("arn:"), "unexpected caller ARN: {}", caller.arn);
}

/// VPC create/describe/delete through the provider
#[tokio::test]
#[ignore]
async fn test_vpc_lifecycle() {
    let stack = test_stack_name();
    let config = test_config(&stack);
    let aws = AwsContext::new(&config.region).await;
    let ec2 = Ec2Client::from_context(&aws);

    let tags = archforge_orchestrator::provider::ResourceTags {
        name: format!("{stack}-vpc"),
        stack: stack.clone(),
        run_id: "integration".to_string(),
        created_at: archforge_common::tags::format_created_at(chrono::Utc::now()),
    };
    let vpc = ec2
        .create_vpc("10.99.0.0/16", &tags)
        .await
        .expect("Should create VPC");
    println!("Created VPC: {}", vpc.id);

    let found = ec2
        .describe_vpcs(&LookupFilter::NameTag(tags.name.clone()))
        .await
        .expect("Should describe VPC");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, vpc.id);

    ec2.delete_vpc(&vpc.id).await.expect("Should delete VPC");

    let provider = AwsProvider::from_context(&aws);
    let gone = provider
        .describe(ResourceKind::Vpc, &LookupFilter::Id(vpc.id.clone()))
        .await
        .expect("Describing a deleted VPC should not fail");
    assert!(gone.is_empty());
}

/// Full architecture round trip
#[tokio::test]
#[ignore]
async fn test_architecture_round_trip() {
    let stack = test_stack_name();
    let config = test_config(&stack);
    let aws = AwsContext::new(&config.region).await;
    let provider = AwsProvider::from_context(&aws);
    let reporter = LogReporter::new();

    let created = Sequencer::new(&config, &provider, &reporter, CancellationToken::new())
        .create()
        .await;

    // Tear down whatever was created, even when creation failed midway
    let status = collect_status(&config, &provider).await;
    let deleted = Sequencer::new(&config, &provider, &reporter, CancellationToken::new())
        .delete()
        .await;

    let created = created.expect("create pipeline should succeed");
    println!("Created {} stages in {:?}", created.stages.len(), created.elapsed);
    assert!(
        status
            .iter()
            .filter(|row| row.kind.is_some())
            .all(|row| matches!(row.state, LocateState::Found { .. })),
        "every stage should be found after create"
    );
    deleted.expect("delete pipeline should succeed");
}
