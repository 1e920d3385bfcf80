//! Per-stage creation logic
//!
//! Each stage builds its requests from the configuration and the outputs of
//! the stages it depends on, submits them in order, and waits where the
//! next stage needs the resource to be usable.

use super::{ResolvedRefs, Stage};
use crate::config::ArchitectureConfig;
use crate::error::OrchestrationError;
use crate::locator::ResourceRef;
use crate::provider::{
    AlarmRequest, AutoScalingGroupRequest, CloudProvider, CreateRequest, DbInstanceRequest,
    IngressRuleRequest, InstancesRequest, LaunchTemplateRequest, ListenerRequest,
    ListenerRuleRequest, LoadBalancerRequest, NotificationRequest, RouteTarget, RuleSource,
    ScalingPolicyRequest, SubnetRequest, SubscriptionRequest, TargetGroupRequest, TopicRequest,
};
use crate::provisioner::{Provisioned, Provisioner};
use crate::wait::{ReadinessWaiter, WaitTarget};
use archforge_common::ResourceKind;

/// Destination of the default route in both route tables
pub const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// Record field listing every instance a launch request started
pub const INSTANCE_IDS_FIELD: &str = "instance_ids";

/// What one stage produced
#[derive(Debug, Default)]
pub struct StageOutput {
    /// The resource later stages consume
    pub primary: Option<ResourceRef>,
    /// Everything the stage created, in creation order
    pub created: Vec<ResourceRef>,
}

impl StageOutput {
    fn single(provisioned: Provisioned) -> Self {
        Self {
            primary: Some(provisioned.reference.clone()),
            created: vec![provisioned.reference],
        }
    }

    fn with_link(primary: Provisioned, link: Provisioned) -> Self {
        Self {
            primary: Some(primary.reference.clone()),
            created: vec![primary.reference, link.reference],
        }
    }
}

pub(super) struct Creator<'a, P> {
    config: &'a ArchitectureConfig,
    provisioner: Provisioner<'a, P>,
    waiter: ReadinessWaiter<'a, P>,
    refs: ResolvedRefs,
}

impl<'a, P: CloudProvider> Creator<'a, P> {
    pub fn new(
        config: &'a ArchitectureConfig,
        provisioner: Provisioner<'a, P>,
        waiter: ReadinessWaiter<'a, P>,
    ) -> Self {
        Self {
            config,
            provisioner,
            waiter,
            refs: ResolvedRefs::new(),
        }
    }

    pub fn provisioner(&self) -> &Provisioner<'a, P> {
        &self.provisioner
    }

    /// Run one create stage and remember its primary output.
    pub async fn run(&mut self, stage: Stage) -> Result<StageOutput, OrchestrationError> {
        let output = self.create(stage).await?;
        if let Some(primary) = &output.primary {
            self.refs.insert(stage, primary.clone());
        }
        Ok(output)
    }

    async fn create(&self, stage: Stage) -> Result<StageOutput, OrchestrationError> {
        let config = self.config;
        let network = &config.network;
        let name = stage.resource_name(config);

        match stage {
            Stage::Vpc => {
                let vpc = self
                    .provisioner
                    .provision(
                        &name,
                        CreateRequest::Vpc {
                            cidr_block: network.vpc.cidr_block.clone(),
                        },
                    )
                    .await?;
                self.wait(&vpc, WaitTarget::VPC_AVAILABLE).await?;
                Ok(StageOutput::single(vpc))
            }

            Stage::InternetGateway => {
                let vpc_id = self.refs.id(stage, Stage::Vpc)?;
                let igw = self
                    .provisioner
                    .provision(&name, CreateRequest::InternetGateway)
                    .await?;
                let attachment = self
                    .provisioner
                    .provision(
                        &name,
                        CreateRequest::GatewayAttachment {
                            internet_gateway_id: igw.reference.id.clone(),
                            vpc_id,
                        },
                    )
                    .await?;
                Ok(StageOutput::with_link(igw, attachment))
            }

            Stage::ElasticIp => {
                let eip = self.provisioner.provision(&name, CreateRequest::ElasticIp).await?;
                Ok(StageOutput::single(eip))
            }

            Stage::PublicRouteTable => {
                let igw_id = self.refs.id(stage, Stage::InternetGateway)?;
                self.route_table(stage, &name, RouteTarget::InternetGateway(igw_id))
                    .await
            }

            Stage::PrivateRouteTable => {
                let nat_id = self.refs.id(stage, Stage::NatGateway)?;
                self.route_table(stage, &name, RouteTarget::NatGateway(nat_id))
                    .await
            }

            Stage::PublicSubnet1 | Stage::PublicSubnet2 => {
                let index = usize::from(stage == Stage::PublicSubnet2);
                let route_table_id = self.refs.id(stage, Stage::PublicRouteTable)?;
                self.subnet(stage, &network.public_subnets[index], route_table_id, true)
                    .await
            }

            Stage::PrivateSubnet1 | Stage::PrivateSubnet2 => {
                let index = usize::from(stage == Stage::PrivateSubnet2);
                let route_table_id = self.refs.id(stage, Stage::PrivateRouteTable)?;
                self.subnet(stage, &network.private_subnets[index], route_table_id, false)
                    .await
            }

            Stage::NatGateway => {
                let request = CreateRequest::NatGateway {
                    subnet_id: self.refs.id(stage, Stage::PublicSubnet1)?,
                    allocation_id: self.refs.id(stage, Stage::ElasticIp)?,
                };
                let nat = self.provisioner.provision(&name, request).await?;
                self.wait(&nat, WaitTarget::NAT_GATEWAY_AVAILABLE).await?;
                Ok(StageOutput::single(nat))
            }

            Stage::AppSecurityGroup | Stage::AlbSecurityGroup | Stage::RdsSecurityGroup => {
                let group = match stage {
                    Stage::AppSecurityGroup => &config.security.application,
                    Stage::AlbSecurityGroup => &config.security.load_balancer,
                    _ => &config.security.database,
                };
                let request = CreateRequest::SecurityGroup {
                    vpc_id: self.refs.id(stage, Stage::Vpc)?,
                    group_name: group.group_name.clone(),
                    description: group.description.clone(),
                };
                let sg = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(sg))
            }

            Stage::SecurityGroupRules => {
                let mut output = StageOutput::default();
                for (label, rule) in self.ingress_rules(stage)? {
                    let created = self
                        .provisioner
                        .provision(&label, CreateRequest::IngressRule(rule))
                        .await?;
                    output.created.push(created.reference);
                }
                Ok(output)
            }

            Stage::DbSubnetGroup => {
                let db = &config.database;
                let request = CreateRequest::DbSubnetGroup {
                    name: db.subnet_group_name.clone(),
                    description: db.subnet_group_description.clone(),
                    subnet_ids: vec![
                        self.refs.id(stage, Stage::PrivateSubnet1)?,
                        self.refs.id(stage, Stage::PrivateSubnet2)?,
                    ],
                };
                let group = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(group))
            }

            Stage::Database => {
                let db = &config.database;
                let request = CreateRequest::DbInstance(DbInstanceRequest {
                    identifier: db.identifier.clone(),
                    db_name: db.db_name.clone(),
                    engine: db.engine.clone(),
                    storage_type: db.storage_type.clone(),
                    allocated_storage: db.allocated_storage,
                    instance_class: db.instance_class.clone(),
                    multi_az: db.multi_az,
                    master_username: db.master_username.clone(),
                    master_password: db.master_password.clone(),
                    subnet_group_name: self.refs.id(stage, Stage::DbSubnetGroup)?,
                    security_group_id: self.refs.id(stage, Stage::RdsSecurityGroup)?,
                });
                let instance = self.provisioner.provision(&name, request).await?;
                self.wait(&instance, WaitTarget::DB_INSTANCE_AVAILABLE).await?;
                Ok(StageOutput::single(instance))
            }

            Stage::WebServers => {
                let compute = &config.compute;
                let request = CreateRequest::Instances(InstancesRequest {
                    ami_id: compute.ami_id.clone(),
                    instance_type: compute.instance_type.clone(),
                    key_pair_name: compute.key_pair_name.clone(),
                    count: compute.count,
                    security_group_id: self.refs.id(stage, Stage::AlbSecurityGroup)?,
                    subnet_id: self.refs.id(stage, Stage::PublicSubnet1)?,
                });
                let launched = self.provisioner.provision(&name, request).await?;
                let created: Vec<ResourceRef> = match launched.record.field(INSTANCE_IDS_FIELD) {
                    Some(ids) => ids
                        .split(',')
                        .filter(|id| !id.is_empty())
                        .map(|id| ResourceRef::new(ResourceKind::Instance, &name, id))
                        .collect(),
                    None => vec![launched.reference.clone()],
                };
                Ok(StageOutput {
                    primary: Some(launched.reference),
                    created,
                })
            }

            Stage::LoadBalancer => {
                let lb = &config.load_balancer;
                let request = CreateRequest::LoadBalancer(LoadBalancerRequest {
                    name: lb.name.clone(),
                    subnet_ids: vec![
                        self.refs.id(stage, Stage::PublicSubnet1)?,
                        self.refs.id(stage, Stage::PublicSubnet2)?,
                    ],
                    security_group_id: self.refs.id(stage, Stage::AlbSecurityGroup)?,
                    scheme: lb.scheme.clone(),
                    lb_type: lb.lb_type.clone(),
                    ip_address_type: lb.ip_address_type.clone(),
                });
                let alb = self.provisioner.provision(&name, request).await?;
                self.wait(&alb, WaitTarget::LOAD_BALANCER_ACTIVE).await?;
                Ok(StageOutput::single(alb))
            }

            Stage::TargetGroup => {
                let tg = &config.load_balancer.target_group;
                let health = &tg.health_check;
                let request = CreateRequest::TargetGroup(TargetGroupRequest {
                    name: tg.name.clone(),
                    vpc_id: self.refs.id(stage, Stage::Vpc)?,
                    protocol: tg.protocol.clone(),
                    port: tg.port,
                    target_type: tg.target_type.clone(),
                    health_check_protocol: health.protocol.clone(),
                    health_check_port: health.port.clone(),
                    health_check_path: health.path.clone(),
                    health_check_interval_seconds: health.interval_seconds,
                    health_check_timeout_seconds: health.timeout_seconds,
                    healthy_threshold: health.healthy_threshold,
                    unhealthy_threshold: health.unhealthy_threshold,
                    matcher_http_code: health.http_code.clone(),
                    attributes: target_group_attributes(config),
                });
                let group = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(group))
            }

            Stage::Listener => {
                let listener = &config.load_balancer.listener;
                let request = CreateRequest::Listener(ListenerRequest {
                    load_balancer_arn: self.refs.id(stage, Stage::LoadBalancer)?,
                    target_group_arn: self.refs.id(stage, Stage::TargetGroup)?,
                    protocol: listener.protocol.clone(),
                    port: listener.port,
                });
                let created = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(created))
            }

            Stage::ListenerRule => {
                let rule = &config.load_balancer.listener.rule;
                let request = CreateRequest::ListenerRule(ListenerRuleRequest {
                    listener_arn: self.refs.id(stage, Stage::Listener)?,
                    target_group_arn: self.refs.id(stage, Stage::TargetGroup)?,
                    priority: rule.priority,
                    path_pattern: rule.path_pattern.clone(),
                });
                let created = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(created))
            }

            Stage::LaunchTemplate => {
                let template = &config.auto_scaling.launch_template;
                let request = CreateRequest::LaunchTemplate(LaunchTemplateRequest {
                    name: template.name.clone(),
                    ami_id: template.ami_id.clone(),
                    instance_type: template.instance_type.clone(),
                    key_pair_name: template.key_pair_name.clone(),
                    security_group_id: self.refs.id(stage, Stage::AppSecurityGroup)?,
                    detailed_monitoring: template.detailed_monitoring,
                    user_data: template.user_data.clone(),
                });
                let created = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(created))
            }

            Stage::AutoScalingGroup => {
                let asg = &config.auto_scaling;
                let request = CreateRequest::AutoScalingGroup(AutoScalingGroupRequest {
                    name: asg.group_name.clone(),
                    launch_template_id: self.refs.id(stage, Stage::LaunchTemplate)?,
                    target_group_arn: self.refs.id(stage, Stage::TargetGroup)?,
                    subnet_ids: vec![
                        self.refs.id(stage, Stage::PrivateSubnet1)?,
                        self.refs.id(stage, Stage::PrivateSubnet2)?,
                    ],
                    instance_name: asg.instance_name.clone(),
                    min_size: asg.min_size,
                    max_size: asg.max_size,
                    desired_capacity: asg.desired_capacity,
                    default_cooldown: asg.default_cooldown,
                    health_check_type: asg.health_check_type.clone(),
                    health_check_grace_period: asg.health_check_grace_period,
                    termination_policies: asg.termination_policies.clone(),
                    protect_from_scale_in: asg.protect_from_scale_in,
                    metrics_granularity: asg.metrics_granularity.clone(),
                    metrics: asg.metrics.clone(),
                });
                let created = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(created))
            }

            Stage::ScaleOutStatusCheckPolicy
            | Stage::ScaleInStatusCheckPolicy
            | Stage::ScaleOutCpuPolicy
            | Stage::ScaleInCpuPolicy => {
                let policies = &config.auto_scaling.policies;
                let adjustment = match stage {
                    Stage::ScaleOutStatusCheckPolicy | Stage::ScaleOutCpuPolicy => {
                        policies.scale_out_adjustment
                    }
                    _ => policies.scale_in_adjustment,
                };
                let request = CreateRequest::ScalingPolicy(ScalingPolicyRequest {
                    name: name.clone(),
                    auto_scaling_group_name: self.refs.id(stage, Stage::AutoScalingGroup)?,
                    policy_type: policies.policy_type.clone(),
                    adjustment_type: policies.adjustment_type.clone(),
                    scaling_adjustment: adjustment,
                    cooldown: policies.cooldown,
                });
                let created = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(created))
            }

            Stage::StatusCheckAlarm | Stage::CpuAlarm => {
                let monitoring = &config.monitoring;
                let (alarm, scale_out, scale_in) = if stage == Stage::StatusCheckAlarm {
                    (
                        &monitoring.status_check_alarm,
                        Stage::ScaleOutStatusCheckPolicy,
                        Stage::ScaleInStatusCheckPolicy,
                    )
                } else {
                    (
                        &monitoring.cpu_alarm,
                        Stage::ScaleOutCpuPolicy,
                        Stage::ScaleInCpuPolicy,
                    )
                };
                let request = CreateRequest::Alarm(AlarmRequest {
                    name: alarm.name.clone(),
                    description: alarm.description.clone(),
                    namespace: monitoring.namespace.clone(),
                    metric_name: alarm.metric_name.clone(),
                    statistic: alarm.statistic.clone(),
                    unit: alarm.unit.clone(),
                    comparison_operator: monitoring.comparison_operator.clone(),
                    threshold: alarm.threshold,
                    evaluation_periods: monitoring.evaluation_periods,
                    period: monitoring.period,
                    auto_scaling_group_name: self.refs.id(stage, Stage::AutoScalingGroup)?,
                    alarm_action_arn: self.refs.id(stage, scale_out)?,
                    ok_action_arn: self.refs.id(stage, scale_in)?,
                });
                let created = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(created))
            }

            Stage::ScaleUpTopic | Stage::ScaleDownTopic => {
                let topic = if stage == Stage::ScaleUpTopic {
                    &config.notifications.scale_up_topic
                } else {
                    &config.notifications.scale_down_topic
                };
                let request = CreateRequest::Topic(TopicRequest {
                    name: topic.name.clone(),
                    display_name: topic.display_name.clone(),
                });
                let created = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(created))
            }

            Stage::ScaleUpSubscription | Stage::ScaleDownSubscription => {
                let topic_stage = if stage == Stage::ScaleUpSubscription {
                    Stage::ScaleUpTopic
                } else {
                    Stage::ScaleDownTopic
                };
                let request = CreateRequest::Subscription(SubscriptionRequest {
                    topic_arn: self.refs.id(stage, topic_stage)?,
                    protocol: config.notifications.protocol.clone(),
                    endpoint: config.notifications.endpoint.clone(),
                });
                let created = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(created))
            }

            Stage::ScaleUpNotification | Stage::ScaleDownNotification => {
                let (topic, topic_stage) = if stage == Stage::ScaleUpNotification {
                    (&config.notifications.scale_up_topic, Stage::ScaleUpTopic)
                } else {
                    (&config.notifications.scale_down_topic, Stage::ScaleDownTopic)
                };
                let request = CreateRequest::NotificationConfiguration(NotificationRequest {
                    auto_scaling_group_name: self.refs.id(stage, Stage::AutoScalingGroup)?,
                    topic_arn: self.refs.id(stage, topic_stage)?,
                    notification_types: vec![topic.notification_type.clone()],
                });
                let created = self.provisioner.provision(&name, request).await?;
                Ok(StageOutput::single(created))
            }
        }
    }

    async fn wait(&self, created: &Provisioned, target: WaitTarget) -> Result<(), OrchestrationError> {
        let reference = &created.reference;
        self.waiter
            .wait(reference.kind, &reference.name, &reference.id, target)
            .await
    }

    async fn route_table(
        &self,
        stage: Stage,
        name: &str,
        target: RouteTarget,
    ) -> Result<StageOutput, OrchestrationError> {
        let vpc_id = self.refs.id(stage, Stage::Vpc)?;
        let table = self
            .provisioner
            .provision(name, CreateRequest::RouteTable { vpc_id })
            .await?;
        let route = self
            .provisioner
            .provision(
                name,
                CreateRequest::Route {
                    route_table_id: table.reference.id.clone(),
                    destination_cidr: DEFAULT_ROUTE.to_string(),
                    target,
                },
            )
            .await?;
        Ok(StageOutput::with_link(table, route))
    }

    async fn subnet(
        &self,
        stage: Stage,
        subnet: &crate::config::SubnetConfig,
        route_table_id: String,
        public: bool,
    ) -> Result<StageOutput, OrchestrationError> {
        let request = CreateRequest::Subnet(SubnetRequest {
            vpc_id: self.refs.id(stage, Stage::Vpc)?,
            cidr_block: subnet.cidr_block.clone(),
            availability_zone: subnet.availability_zone.clone(),
            map_public_ip_on_launch: public,
        });
        let created = self.provisioner.provision(&subnet.name, request).await?;
        let association = self
            .provisioner
            .provision(
                &subnet.name,
                CreateRequest::RouteTableAssociation {
                    route_table_id,
                    subnet_id: created.reference.id.clone(),
                },
            )
            .await?;
        Ok(StageOutput::with_link(created, association))
    }

    /// Ingress rules for the three tiers, each with a label for logging
    fn ingress_rules(&self, stage: Stage) -> Result<Vec<(String, IngressRuleRequest)>, OrchestrationError> {
        let security = &self.config.security;
        let alb_sg = self.refs.id(stage, Stage::AlbSecurityGroup)?;
        let app_sg = self.refs.id(stage, Stage::AppSecurityGroup)?;
        let rds_sg = self.refs.id(stage, Stage::RdsSecurityGroup)?;

        let tcp = |group_id: &str, port: i32, source: RuleSource, description: &str| {
            IngressRuleRequest {
                group_id: group_id.to_string(),
                protocol: "tcp".to_string(),
                from_port: port,
                to_port: port,
                source,
                description: description.to_string(),
            }
        };

        let alb = &security.load_balancer.name;
        let app = &security.application.name;
        let rds = &security.database.name;
        let mut rules = vec![
            (
                format!("{alb} http"),
                tcp(&alb_sg, 80, RuleSource::Cidr(DEFAULT_ROUTE.to_string()), "HTTP from anywhere"),
            ),
            (
                format!("{alb} https"),
                tcp(&alb_sg, 443, RuleSource::Cidr(DEFAULT_ROUTE.to_string()), "HTTPS from anywhere"),
            ),
        ];
        for cidr in &security.ssh_cidr_blocks {
            rules.push((
                format!("{alb} ssh from {cidr}"),
                tcp(&alb_sg, 22, RuleSource::Cidr(cidr.clone()), "SSH from operators"),
            ));
        }
        rules.push((
            format!("{app} http"),
            tcp(&app_sg, 80, RuleSource::SecurityGroup(alb_sg.clone()), "HTTP from the load balancer"),
        ));
        rules.push((
            format!("{app} ssh"),
            tcp(&app_sg, 22, RuleSource::SecurityGroup(alb_sg), "SSH through the public tier"),
        ));
        rules.push((
            format!("{rds} database"),
            tcp(
                &rds_sg,
                i32::from(security.database_port),
                RuleSource::SecurityGroup(app_sg),
                "Database from the application tier",
            ),
        ));
        Ok(rules)
    }
}

/// Target group attributes applied right after creation
pub fn target_group_attributes(config: &ArchitectureConfig) -> Vec<(String, String)> {
    let tg = &config.load_balancer.target_group;
    vec![
        (
            "stickiness.enabled".to_string(),
            tg.stickiness.enabled.to_string(),
        ),
        (
            "stickiness.type".to_string(),
            tg.stickiness.stickiness_type.clone(),
        ),
        (
            "stickiness.lb_cookie.duration_seconds".to_string(),
            tg.stickiness.duration_seconds.to_string(),
        ),
        (
            "deregistration_delay.timeout_seconds".to_string(),
            tg.deregistration_delay_seconds.to_string(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use archforge_test_utils::SAMPLE_VARS_YAML;

    #[test]
    fn test_target_group_attributes_from_config() {
        let config = ArchitectureConfig::from_yaml(SAMPLE_VARS_YAML).unwrap();
        let attributes = target_group_attributes(&config);
        assert!(attributes.contains(&("stickiness.enabled".to_string(), "true".to_string())));
        assert!(attributes.contains(&(
            "deregistration_delay.timeout_seconds".to_string(),
            "300".to_string()
        )));
    }
}
