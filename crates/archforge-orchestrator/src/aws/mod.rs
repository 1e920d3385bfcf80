//! AWS client modules for the orchestrator
//!
//! This module provides wrappers around AWS SDK clients for:
//! - EC2: VPC networking, security groups, instances and launch templates
//! - ELBv2: Application load balancer, target group, listener and rules
//! - Auto Scaling: Group, scaling policies and notifications
//! - CloudWatch: Alarms driving the scaling policies
//! - SNS: Notification topics and subscriptions
//! - RDS: Database subnet group and instance
//! - STS: Account ID lookup
//!
//! [`AwsProvider`] ties them together behind [`crate::provider::CloudProvider`].

pub mod account;
pub mod autoscaling;
pub mod cloudwatch;
pub mod context;
pub mod ec2;
pub mod elb;
pub mod error;
pub mod provider;
pub mod rds;
pub mod sns;

pub use account::{AccountId, CallerIdentity, caller_identity};
pub use autoscaling::AutoScalingClient;
pub use cloudwatch::CloudWatchClient;
pub use context::AwsContext;
pub use ec2::Ec2Client;
pub use elb::ElbClient;
pub use error::{classify_aws_error, classify_sdk_error};
pub use provider::AwsProvider;
pub use rds::RdsClient;
pub use sns::SnsClient;
