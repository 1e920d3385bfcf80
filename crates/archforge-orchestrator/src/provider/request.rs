//! Typed creation requests, one per resource kind

use crate::config::Secret;
use archforge_common::ResourceKind;

/// What a route sends its traffic to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    InternetGateway(String),
    NatGateway(String),
}

/// Where an ingress rule admits traffic from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    Cidr(String),
    SecurityGroup(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetRequest {
    pub vpc_id: String,
    pub cidr_block: String,
    pub availability_zone: String,
    pub map_public_ip_on_launch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRuleRequest {
    pub group_id: String,
    pub protocol: String,
    pub from_port: i32,
    pub to_port: i32,
    pub source: RuleSource,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbInstanceRequest {
    pub identifier: String,
    pub db_name: String,
    pub engine: String,
    pub storage_type: String,
    pub allocated_storage: i32,
    pub instance_class: String,
    pub multi_az: bool,
    pub master_username: String,
    pub master_password: Secret,
    pub subnet_group_name: String,
    pub security_group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancesRequest {
    pub ami_id: String,
    pub instance_type: String,
    pub key_pair_name: String,
    pub count: i32,
    pub security_group_id: String,
    pub subnet_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerRequest {
    pub name: String,
    pub subnet_ids: Vec<String>,
    pub security_group_id: String,
    pub scheme: String,
    pub lb_type: String,
    pub ip_address_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroupRequest {
    pub name: String,
    pub vpc_id: String,
    pub protocol: String,
    pub port: i32,
    pub target_type: String,
    pub health_check_protocol: String,
    pub health_check_port: String,
    pub health_check_path: String,
    pub health_check_interval_seconds: i32,
    pub health_check_timeout_seconds: i32,
    pub healthy_threshold: i32,
    pub unhealthy_threshold: i32,
    pub matcher_http_code: String,
    /// Target group attributes applied right after creation
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRequest {
    pub load_balancer_arn: String,
    pub target_group_arn: String,
    pub protocol: String,
    pub port: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRuleRequest {
    pub listener_arn: String,
    pub target_group_arn: String,
    pub priority: i32,
    pub path_pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTemplateRequest {
    pub name: String,
    pub ami_id: String,
    pub instance_type: String,
    pub key_pair_name: String,
    pub security_group_id: String,
    pub detailed_monitoring: bool,
    /// Plain-text user data; the provider encodes it as it requires
    pub user_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoScalingGroupRequest {
    pub name: String,
    pub launch_template_id: String,
    pub target_group_arn: String,
    pub subnet_ids: Vec<String>,
    pub instance_name: String,
    pub min_size: i32,
    pub max_size: i32,
    pub desired_capacity: i32,
    pub default_cooldown: i32,
    pub health_check_type: String,
    pub health_check_grace_period: i32,
    pub termination_policies: Vec<String>,
    pub protect_from_scale_in: bool,
    pub metrics_granularity: String,
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingPolicyRequest {
    pub name: String,
    pub auto_scaling_group_name: String,
    pub policy_type: String,
    pub adjustment_type: String,
    pub scaling_adjustment: i32,
    pub cooldown: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmRequest {
    pub name: String,
    pub description: String,
    pub namespace: String,
    pub metric_name: String,
    pub statistic: String,
    pub unit: String,
    pub comparison_operator: String,
    pub threshold: f64,
    pub evaluation_periods: i32,
    pub period: i32,
    pub auto_scaling_group_name: String,
    /// Policy invoked when the alarm fires
    pub alarm_action_arn: String,
    /// Policy invoked when the alarm returns to OK
    pub ok_action_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRequest {
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub topic_arn: String,
    pub protocol: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub auto_scaling_group_name: String,
    pub topic_arn: String,
    pub notification_types: Vec<String>,
}

/// One creation call against the provider
#[derive(Debug, Clone, PartialEq)]
pub enum CreateRequest {
    Vpc {
        cidr_block: String,
    },
    InternetGateway,
    GatewayAttachment {
        internet_gateway_id: String,
        vpc_id: String,
    },
    ElasticIp,
    RouteTable {
        vpc_id: String,
    },
    Route {
        route_table_id: String,
        destination_cidr: String,
        target: RouteTarget,
    },
    RouteTableAssociation {
        route_table_id: String,
        subnet_id: String,
    },
    Subnet(SubnetRequest),
    NatGateway {
        subnet_id: String,
        allocation_id: String,
    },
    SecurityGroup {
        vpc_id: String,
        group_name: String,
        description: String,
    },
    IngressRule(IngressRuleRequest),
    DbSubnetGroup {
        name: String,
        description: String,
        subnet_ids: Vec<String>,
    },
    DbInstance(DbInstanceRequest),
    Instances(InstancesRequest),
    LoadBalancer(LoadBalancerRequest),
    TargetGroup(TargetGroupRequest),
    Listener(ListenerRequest),
    ListenerRule(ListenerRuleRequest),
    LaunchTemplate(LaunchTemplateRequest),
    AutoScalingGroup(AutoScalingGroupRequest),
    ScalingPolicy(ScalingPolicyRequest),
    Alarm(AlarmRequest),
    Topic(TopicRequest),
    Subscription(SubscriptionRequest),
    NotificationConfiguration(NotificationRequest),
}

impl CreateRequest {
    /// Kind of the resource this request creates
    pub fn kind(&self) -> ResourceKind {
        match self {
            CreateRequest::Vpc { .. } => ResourceKind::Vpc,
            CreateRequest::InternetGateway => ResourceKind::InternetGateway,
            CreateRequest::GatewayAttachment { .. } => ResourceKind::GatewayAttachment,
            CreateRequest::ElasticIp => ResourceKind::ElasticIp,
            CreateRequest::RouteTable { .. } => ResourceKind::RouteTable,
            CreateRequest::Route { .. } => ResourceKind::Route,
            CreateRequest::RouteTableAssociation { .. } => ResourceKind::RouteTableAssociation,
            CreateRequest::Subnet(_) => ResourceKind::Subnet,
            CreateRequest::NatGateway { .. } => ResourceKind::NatGateway,
            CreateRequest::SecurityGroup { .. } => ResourceKind::SecurityGroup,
            CreateRequest::IngressRule(_) => ResourceKind::IngressRule,
            CreateRequest::DbSubnetGroup { .. } => ResourceKind::DbSubnetGroup,
            CreateRequest::DbInstance(_) => ResourceKind::DbInstance,
            CreateRequest::Instances(_) => ResourceKind::Instance,
            CreateRequest::LoadBalancer(_) => ResourceKind::LoadBalancer,
            CreateRequest::TargetGroup(_) => ResourceKind::TargetGroup,
            CreateRequest::Listener(_) => ResourceKind::Listener,
            CreateRequest::ListenerRule(_) => ResourceKind::ListenerRule,
            CreateRequest::LaunchTemplate(_) => ResourceKind::LaunchTemplate,
            CreateRequest::AutoScalingGroup(_) => ResourceKind::AutoScalingGroup,
            CreateRequest::ScalingPolicy(_) => ResourceKind::ScalingPolicy,
            CreateRequest::Alarm(_) => ResourceKind::Alarm,
            CreateRequest::Topic(_) => ResourceKind::Topic,
            CreateRequest::Subscription(_) => ResourceKind::Subscription,
            CreateRequest::NotificationConfiguration(_) => {
                ResourceKind::NotificationConfiguration
            }
        }
    }

    /// Provider-native unique name carried by the request, if the kind has one
    pub fn native_name(&self) -> Option<&str> {
        match self {
            CreateRequest::SecurityGroup { group_name, .. } => Some(group_name.as_str()),
            CreateRequest::DbSubnetGroup { name, .. } => Some(name.as_str()),
            CreateRequest::DbInstance(r) => Some(r.identifier.as_str()),
            CreateRequest::LoadBalancer(r) => Some(r.name.as_str()),
            CreateRequest::TargetGroup(r) => Some(r.name.as_str()),
            CreateRequest::LaunchTemplate(r) => Some(r.name.as_str()),
            CreateRequest::AutoScalingGroup(r) => Some(r.name.as_str()),
            CreateRequest::ScalingPolicy(r) => Some(r.name.as_str()),
            CreateRequest::Alarm(r) => Some(r.name.as_str()),
            CreateRequest::Topic(r) => Some(r.name.as_str()),
            _ => None,
        }
    }

    /// Identifier of the resource that owns the created one, if any
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            CreateRequest::GatewayAttachment {
                internet_gateway_id,
                ..
            } => Some(internet_gateway_id.as_str()),
            CreateRequest::Route { route_table_id, .. } => Some(route_table_id.as_str()),
            CreateRequest::RouteTableAssociation { subnet_id, .. } => Some(subnet_id.as_str()),
            CreateRequest::IngressRule(r) => Some(r.group_id.as_str()),
            CreateRequest::Listener(r) => Some(r.load_balancer_arn.as_str()),
            CreateRequest::ListenerRule(r) => Some(r.listener_arn.as_str()),
            CreateRequest::ScalingPolicy(r) => Some(r.auto_scaling_group_name.as_str()),
            CreateRequest::Subscription(r) => Some(r.topic_arn.as_str()),
            CreateRequest::NotificationConfiguration(r) => Some(r.auto_scaling_group_name.as_str()),
            _ => None,
        }
    }

    /// Every existing resource identifier this request consumes
    pub fn referenced_ids(&self) -> Vec<&str> {
        match self {
            CreateRequest::Vpc { .. }
            | CreateRequest::InternetGateway
            | CreateRequest::ElasticIp
            | CreateRequest::Topic(_) => vec![],
            CreateRequest::GatewayAttachment {
                internet_gateway_id,
                vpc_id,
            } => vec![internet_gateway_id.as_str(), vpc_id.as_str()],
            CreateRequest::RouteTable { vpc_id } => vec![vpc_id.as_str()],
            CreateRequest::Route {
                route_table_id,
                target,
                ..
            } => match target {
                RouteTarget::InternetGateway(id) | RouteTarget::NatGateway(id) => {
                    vec![route_table_id.as_str(), id.as_str()]
                }
            },
            CreateRequest::RouteTableAssociation {
                route_table_id,
                subnet_id,
            } => vec![route_table_id.as_str(), subnet_id.as_str()],
            CreateRequest::Subnet(r) => vec![r.vpc_id.as_str()],
            CreateRequest::NatGateway {
                subnet_id,
                allocation_id,
            } => vec![subnet_id.as_str(), allocation_id.as_str()],
            CreateRequest::SecurityGroup { vpc_id, .. } => vec![vpc_id.as_str()],
            CreateRequest::IngressRule(r) => match &r.source {
                RuleSource::Cidr(_) => vec![r.group_id.as_str()],
                RuleSource::SecurityGroup(source) => vec![r.group_id.as_str(), source.as_str()],
            },
            CreateRequest::DbSubnetGroup { subnet_ids, .. } => {
                subnet_ids.iter().map(String::as_str).collect()
            }
            CreateRequest::DbInstance(r) => vec![r.subnet_group_name.as_str(), r.security_group_id.as_str()],
            CreateRequest::Instances(r) => vec![r.security_group_id.as_str(), r.subnet_id.as_str()],
            CreateRequest::LoadBalancer(r) => {
                let mut ids: Vec<&str> = r.subnet_ids.iter().map(String::as_str).collect();
                ids.push(&r.security_group_id);
                ids
            }
            CreateRequest::TargetGroup(r) => vec![r.vpc_id.as_str()],
            CreateRequest::Listener(r) => vec![r.load_balancer_arn.as_str(), r.target_group_arn.as_str()],
            CreateRequest::ListenerRule(r) => vec![r.listener_arn.as_str(), r.target_group_arn.as_str()],
            CreateRequest::LaunchTemplate(r) => vec![r.security_group_id.as_str()],
            CreateRequest::AutoScalingGroup(r) => {
                let mut ids = vec![r.launch_template_id.as_str(), r.target_group_arn.as_str()];
                ids.extend(r.subnet_ids.iter().map(String::as_str));
                ids
            }
            CreateRequest::ScalingPolicy(r) => vec![r.auto_scaling_group_name.as_str()],
            CreateRequest::Alarm(r) => vec![r.auto_scaling_group_name.as_str(), r.alarm_action_arn.as_str(), r.ok_action_arn.as_str()],
            CreateRequest::Subscription(r) => vec![r.topic_arn.as_str()],
            CreateRequest::NotificationConfiguration(r) => {
                vec![r.auto_scaling_group_name.as_str(), r.topic_arn.as_str()]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_references_table_and_target() {
        let request = CreateRequest::Route {
            route_table_id: "rtb-1".to_string(),
            destination_cidr: "0.0.0.0/0".to_string(),
            target: RouteTarget::NatGateway("nat-1".to_string()),
        };
        assert_eq!(request.kind(), ResourceKind::Route);
        assert_eq!(request.parent_id(), Some("rtb-1"));
        assert_eq!(request.referenced_ids(), vec!["rtb-1", "nat-1"]);
    }

    #[test]
    fn test_cidr_rule_references_only_its_group() {
        let request = CreateRequest::IngressRule(IngressRuleRequest {
            group_id: "sg-1".to_string(),
            protocol: "tcp".to_string(),
            from_port: 443,
            to_port: 443,
            source: RuleSource::Cidr("0.0.0.0/0".to_string()),
            description: "HTTPS".to_string(),
        });
        assert_eq!(request.referenced_ids(), vec!["sg-1"]);
    }

    #[test]
    fn test_native_names() {
        let topic = CreateRequest::Topic(TopicRequest {
            name: "scale-up".to_string(),
            display_name: "Up".to_string(),
        });
        assert_eq!(topic.native_name(), Some("scale-up"));
        assert_eq!(CreateRequest::ElasticIp.native_name(), None);
    }
}
