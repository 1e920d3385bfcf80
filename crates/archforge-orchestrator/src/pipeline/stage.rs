//! The fixed create and delete pipelines
//!
//! Both pipelines are static lists of [`Stage`]s. Each stage declares the
//! stages whose outputs it consumes; [`validate_ordering`] checks that the
//! create pipeline runs every dependency first and the delete pipeline runs
//! it last.

use crate::config::ArchitectureConfig;
use archforge_common::ResourceKind;
use serde::Serialize;
use std::collections::HashMap;

/// Which pipeline is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Create,
    Delete,
}

/// One step of the create or delete pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    Vpc,
    InternetGateway,
    ElasticIp,
    PublicRouteTable,
    PublicSubnet1,
    PublicSubnet2,
    NatGateway,
    PrivateRouteTable,
    PrivateSubnet1,
    PrivateSubnet2,
    AppSecurityGroup,
    AlbSecurityGroup,
    RdsSecurityGroup,
    SecurityGroupRules,
    DbSubnetGroup,
    Database,
    WebServers,
    LoadBalancer,
    TargetGroup,
    Listener,
    ListenerRule,
    LaunchTemplate,
    AutoScalingGroup,
    ScaleOutStatusCheckPolicy,
    ScaleInStatusCheckPolicy,
    ScaleOutCpuPolicy,
    ScaleInCpuPolicy,
    StatusCheckAlarm,
    CpuAlarm,
    ScaleUpTopic,
    ScaleDownTopic,
    ScaleUpSubscription,
    ScaleDownSubscription,
    ScaleUpNotification,
    ScaleDownNotification,
}

/// Stages in creation order
pub const CREATE_PIPELINE: &[Stage] = &[
    Stage::Vpc,
    Stage::InternetGateway,
    Stage::ElasticIp,
    Stage::PublicRouteTable,
    Stage::PublicSubnet1,
    Stage::PublicSubnet2,
    Stage::NatGateway,
    Stage::PrivateRouteTable,
    Stage::PrivateSubnet1,
    Stage::PrivateSubnet2,
    Stage::AppSecurityGroup,
    Stage::AlbSecurityGroup,
    Stage::RdsSecurityGroup,
    Stage::SecurityGroupRules,
    Stage::DbSubnetGroup,
    Stage::Database,
    Stage::WebServers,
    Stage::LoadBalancer,
    Stage::TargetGroup,
    Stage::Listener,
    Stage::ListenerRule,
    Stage::LaunchTemplate,
    Stage::AutoScalingGroup,
    Stage::ScaleOutStatusCheckPolicy,
    Stage::ScaleInStatusCheckPolicy,
    Stage::ScaleOutCpuPolicy,
    Stage::ScaleInCpuPolicy,
    Stage::StatusCheckAlarm,
    Stage::CpuAlarm,
    Stage::ScaleUpTopic,
    Stage::ScaleDownTopic,
    Stage::ScaleUpSubscription,
    Stage::ScaleDownSubscription,
    Stage::ScaleUpNotification,
    Stage::ScaleDownNotification,
];

/// Stages in teardown order
///
/// The reverse of [`CREATE_PIPELINE`], except that the load balancer goes
/// before its (independent) target group.
pub const DELETE_PIPELINE: &[Stage] = &[
    Stage::ScaleDownNotification,
    Stage::ScaleUpNotification,
    Stage::ScaleDownSubscription,
    Stage::ScaleUpSubscription,
    Stage::ScaleDownTopic,
    Stage::ScaleUpTopic,
    Stage::CpuAlarm,
    Stage::StatusCheckAlarm,
    Stage::ScaleInCpuPolicy,
    Stage::ScaleOutCpuPolicy,
    Stage::ScaleInStatusCheckPolicy,
    Stage::ScaleOutStatusCheckPolicy,
    Stage::AutoScalingGroup,
    Stage::LaunchTemplate,
    Stage::ListenerRule,
    Stage::Listener,
    Stage::LoadBalancer,
    Stage::TargetGroup,
    Stage::WebServers,
    Stage::Database,
    Stage::DbSubnetGroup,
    Stage::SecurityGroupRules,
    Stage::RdsSecurityGroup,
    Stage::AlbSecurityGroup,
    Stage::AppSecurityGroup,
    Stage::PrivateSubnet2,
    Stage::PrivateSubnet1,
    Stage::PrivateRouteTable,
    Stage::NatGateway,
    Stage::PublicSubnet2,
    Stage::PublicSubnet1,
    Stage::PublicRouteTable,
    Stage::ElasticIp,
    Stage::InternetGateway,
    Stage::Vpc,
];

impl Stage {
    pub fn pipeline(direction: Direction) -> &'static [Stage] {
        match direction {
            Direction::Create => CREATE_PIPELINE,
            Direction::Delete => DELETE_PIPELINE,
        }
    }

    /// Stages whose outputs this stage consumes when creating
    pub fn dependencies(self) -> &'static [Stage] {
        use Stage::*;
        match self {
            Vpc | ElasticIp | ScaleUpTopic | ScaleDownTopic => &[],
            InternetGateway => &[Vpc],
            PublicRouteTable => &[Vpc, InternetGateway],
            PublicSubnet1 | PublicSubnet2 => &[Vpc, PublicRouteTable],
            NatGateway => &[ElasticIp, PublicSubnet1],
            PrivateRouteTable => &[Vpc, NatGateway],
            PrivateSubnet1 | PrivateSubnet2 => &[Vpc, PrivateRouteTable],
            AppSecurityGroup | AlbSecurityGroup | RdsSecurityGroup => &[Vpc],
            SecurityGroupRules => &[AppSecurityGroup, AlbSecurityGroup, RdsSecurityGroup],
            DbSubnetGroup => &[PrivateSubnet1, PrivateSubnet2],
            Database => &[DbSubnetGroup, RdsSecurityGroup],
            WebServers => &[AlbSecurityGroup, PublicSubnet1],
            LoadBalancer => &[PublicSubnet1, PublicSubnet2, AlbSecurityGroup],
            TargetGroup => &[Vpc],
            Listener => &[LoadBalancer, TargetGroup],
            ListenerRule => &[Listener, TargetGroup],
            LaunchTemplate => &[AppSecurityGroup],
            AutoScalingGroup => &[LaunchTemplate, TargetGroup, PrivateSubnet1, PrivateSubnet2],
            ScaleOutStatusCheckPolicy
            | ScaleInStatusCheckPolicy
            | ScaleOutCpuPolicy
            | ScaleInCpuPolicy => &[AutoScalingGroup],
            StatusCheckAlarm => &[
                AutoScalingGroup,
                ScaleOutStatusCheckPolicy,
                ScaleInStatusCheckPolicy,
            ],
            CpuAlarm => &[AutoScalingGroup, ScaleOutCpuPolicy, ScaleInCpuPolicy],
            ScaleUpSubscription => &[ScaleUpTopic],
            ScaleDownSubscription => &[ScaleDownTopic],
            ScaleUpNotification => &[ScaleUpTopic, AutoScalingGroup],
            ScaleDownNotification => &[ScaleDownTopic, AutoScalingGroup],
        }
    }

    /// Kind of the resource the stage produces, if it produces one
    pub fn primary_kind(self) -> Option<ResourceKind> {
        use Stage::*;
        Some(match self {
            Vpc => ResourceKind::Vpc,
            InternetGateway => ResourceKind::InternetGateway,
            ElasticIp => ResourceKind::ElasticIp,
            PublicRouteTable | PrivateRouteTable => ResourceKind::RouteTable,
            PublicSubnet1 | PublicSubnet2 | PrivateSubnet1 | PrivateSubnet2 => {
                ResourceKind::Subnet
            }
            NatGateway => ResourceKind::NatGateway,
            AppSecurityGroup | AlbSecurityGroup | RdsSecurityGroup => ResourceKind::SecurityGroup,
            SecurityGroupRules => return None,
            DbSubnetGroup => ResourceKind::DbSubnetGroup,
            Database => ResourceKind::DbInstance,
            WebServers => ResourceKind::Instance,
            LoadBalancer => ResourceKind::LoadBalancer,
            TargetGroup => ResourceKind::TargetGroup,
            Listener => ResourceKind::Listener,
            ListenerRule => ResourceKind::ListenerRule,
            LaunchTemplate => ResourceKind::LaunchTemplate,
            AutoScalingGroup => ResourceKind::AutoScalingGroup,
            ScaleOutStatusCheckPolicy
            | ScaleInStatusCheckPolicy
            | ScaleOutCpuPolicy
            | ScaleInCpuPolicy => ResourceKind::ScalingPolicy,
            StatusCheckAlarm | CpuAlarm => ResourceKind::Alarm,
            ScaleUpTopic | ScaleDownTopic => ResourceKind::Topic,
            ScaleUpSubscription | ScaleDownSubscription => ResourceKind::Subscription,
            ScaleUpNotification | ScaleDownNotification => {
                ResourceKind::NotificationConfiguration
            }
        })
    }

    /// Logical name of the resource the stage works on
    pub fn resource_name(self, config: &ArchitectureConfig) -> String {
        use Stage::*;
        let network = &config.network;
        let security = &config.security;
        let policies = &config.auto_scaling.policies;
        let notifications = &config.notifications;
        match self {
            Vpc => network.vpc.name.clone(),
            InternetGateway => network.internet_gateway_name.clone(),
            ElasticIp => network.elastic_ip_name.clone(),
            PublicRouteTable => network.public_route_table_name.clone(),
            PublicSubnet1 => network.public_subnets[0].name.clone(),
            PublicSubnet2 => network.public_subnets[1].name.clone(),
            NatGateway => network.nat_gateway_name.clone(),
            PrivateRouteTable => network.private_route_table_name.clone(),
            PrivateSubnet1 => network.private_subnets[0].name.clone(),
            PrivateSubnet2 => network.private_subnets[1].name.clone(),
            AppSecurityGroup => security.application.name.clone(),
            AlbSecurityGroup => security.load_balancer.name.clone(),
            RdsSecurityGroup => security.database.name.clone(),
            SecurityGroupRules => format!(
                "ingress rules of {}, {} and {}",
                security.load_balancer.name, security.application.name, security.database.name
            ),
            DbSubnetGroup => config.database.subnet_group_name.clone(),
            Database => config.database.identifier.clone(),
            WebServers => config.compute.name.clone(),
            LoadBalancer => config.load_balancer.name.clone(),
            TargetGroup => config.load_balancer.target_group.name.clone(),
            Listener => format!("listener of {}", config.load_balancer.name),
            ListenerRule => format!("rule of listener of {}", config.load_balancer.name),
            LaunchTemplate => config.auto_scaling.launch_template.name.clone(),
            AutoScalingGroup => config.auto_scaling.group_name.clone(),
            ScaleOutStatusCheckPolicy => policies.status_check_scale_out.clone(),
            ScaleInStatusCheckPolicy => policies.status_check_scale_in.clone(),
            ScaleOutCpuPolicy => policies.cpu_scale_out.clone(),
            ScaleInCpuPolicy => policies.cpu_scale_in.clone(),
            StatusCheckAlarm => config.monitoring.status_check_alarm.name.clone(),
            CpuAlarm => config.monitoring.cpu_alarm.name.clone(),
            ScaleUpTopic => notifications.scale_up_topic.name.clone(),
            ScaleDownTopic => notifications.scale_down_topic.name.clone(),
            ScaleUpSubscription => format!(
                "{} subscription to {}",
                notifications.endpoint, notifications.scale_up_topic.name
            ),
            ScaleDownSubscription => format!(
                "{} subscription to {}",
                notifications.endpoint, notifications.scale_down_topic.name
            ),
            ScaleUpNotification => format!(
                "{} notifications to {}",
                config.auto_scaling.group_name, notifications.scale_up_topic.name
            ),
            ScaleDownNotification => format!(
                "{} notifications to {}",
                config.auto_scaling.group_name, notifications.scale_down_topic.name
            ),
        }
    }
}

/// A dependency edge that one of the pipelines runs in the wrong order
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderingViolation {
    #[error("{direction} pipeline lists {stage} {count} times")]
    Count {
        direction: Direction,
        stage: Stage,
        count: usize,
    },
    #[error("{direction} pipeline runs {stage} on the wrong side of its dependency {dependency}")]
    Edge {
        direction: Direction,
        stage: Stage,
        dependency: Stage,
    },
}

/// Check both pipelines against the declared dependency edges.
///
/// Every stage must appear exactly once in each pipeline; each dependency
/// must precede its dependent when creating and follow it when deleting.
pub fn validate_ordering() -> Result<(), Vec<OrderingViolation>> {
    let mut violations = Vec::new();

    for direction in [Direction::Create, Direction::Delete] {
        let pipeline = Stage::pipeline(direction);
        let mut positions: HashMap<Stage, usize> = HashMap::new();
        let mut counts: HashMap<Stage, usize> = HashMap::new();
        for (position, stage) in pipeline.iter().enumerate() {
            positions.insert(*stage, position);
            *counts.entry(*stage).or_default() += 1;
        }

        for stage in CREATE_PIPELINE.iter().chain(DELETE_PIPELINE) {
            let count = counts.get(stage).copied().unwrap_or(0);
            if count != 1 {
                let violation = OrderingViolation::Count {
                    direction,
                    stage: *stage,
                    count,
                };
                if !violations.contains(&violation) {
                    violations.push(violation);
                }
            }
        }

        for (stage, position) in &positions {
            for dependency in stage.dependencies() {
                let Some(dep_position) = positions.get(dependency) else {
                    continue;
                };
                let in_order = match direction {
                    Direction::Create => dep_position < position,
                    Direction::Delete => dep_position > position,
                };
                if !in_order {
                    violations.push(OrderingViolation::Edge {
                        direction,
                        stage: *stage,
                        dependency: *dependency,
                    });
                }
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
