//! Kinds of cloud resources managed by archforge
//!
//! Each kind knows how the locator finds it again after creation and whether
//! the provider accepts tags on it.

use serde::Serialize;

/// Types of AWS resources managed by archforge
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ResourceKind {
    Vpc,
    InternetGateway,
    /// Link between an internet gateway and a VPC (`igw|vpc`)
    GatewayAttachment,
    ElasticIp,
    RouteTable,
    /// Single route inside a route table (`rtb|destination`)
    Route,
    RouteTableAssociation,
    Subnet,
    NatGateway,
    SecurityGroup,
    /// Single ingress rule (`sg|sgr`)
    IngressRule,
    DbSubnetGroup,
    DbInstance,
    Instance,
    LoadBalancer,
    TargetGroup,
    Listener,
    ListenerRule,
    LaunchTemplate,
    AutoScalingGroup,
    ScalingPolicy,
    Alarm,
    Topic,
    Subscription,
    /// Auto-scaling notification wiring for one topic (`asg|topic`)
    NotificationConfiguration,
}

/// How a resource of a given kind is found again by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    /// Searched through its `Name` tag
    NameTag,
    /// Searched through a provider-native unique name
    NativeName,
    /// Has no name of its own; found through its parent resource
    Parent,
    /// Only addressable by its (compound) identifier
    IdOnly,
}

impl ResourceKind {
    /// How the locator resolves a logical name for this kind
    pub fn name_source(self) -> NameSource {
        match self {
            ResourceKind::Vpc
            | ResourceKind::InternetGateway
            | ResourceKind::ElasticIp
            | ResourceKind::RouteTable
            | ResourceKind::Subnet
            | ResourceKind::NatGateway
            | ResourceKind::SecurityGroup
            | ResourceKind::Instance => NameSource::NameTag,

            ResourceKind::DbSubnetGroup
            | ResourceKind::DbInstance
            | ResourceKind::LoadBalancer
            | ResourceKind::TargetGroup
            | ResourceKind::LaunchTemplate
            | ResourceKind::AutoScalingGroup
            | ResourceKind::ScalingPolicy
            | ResourceKind::Alarm
            | ResourceKind::Topic => NameSource::NativeName,

            ResourceKind::RouteTableAssociation
            | ResourceKind::IngressRule
            | ResourceKind::Listener
            | ResourceKind::ListenerRule
            | ResourceKind::Subscription => NameSource::Parent,

            ResourceKind::GatewayAttachment
            | ResourceKind::Route
            | ResourceKind::NotificationConfiguration => NameSource::IdOnly,
        }
    }

    /// Whether the provider accepts the archforge tag set on this kind
    pub fn supports_tags(self) -> bool {
        matches!(
            self,
            ResourceKind::Vpc
                | ResourceKind::InternetGateway
                | ResourceKind::ElasticIp
                | ResourceKind::RouteTable
                | ResourceKind::Subnet
                | ResourceKind::NatGateway
                | ResourceKind::SecurityGroup
                | ResourceKind::DbSubnetGroup
                | ResourceKind::DbInstance
                | ResourceKind::Instance
                | ResourceKind::LoadBalancer
                | ResourceKind::TargetGroup
                | ResourceKind::Listener
                | ResourceKind::ListenerRule
                | ResourceKind::LaunchTemplate
                | ResourceKind::AutoScalingGroup
                | ResourceKind::Topic
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kebab_case_names() {
        for (kind, name) in [
            (ResourceKind::Vpc, "vpc"),
            (ResourceKind::NatGateway, "nat-gateway"),
            (ResourceKind::DbSubnetGroup, "db-subnet-group"),
            (ResourceKind::NotificationConfiguration, "notification-configuration"),
        ] {
            assert_eq!(kind.to_string(), name);
            assert_eq!(kind.as_ref(), name);
        }
    }

    #[test]
    fn test_name_tagged_kinds_accept_tags() {
        // The locator searches these kinds by their Name tag, so creating
        // them without tags would make them unfindable.
        for kind in [
            ResourceKind::Vpc,
            ResourceKind::Subnet,
            ResourceKind::SecurityGroup,
            ResourceKind::Instance,
        ] {
            assert_eq!(kind.name_source(), NameSource::NameTag);
            assert!(kind.supports_tags(), "{kind} must accept tags");
        }
    }

    #[test]
    fn test_link_kinds_are_untagged() {
        assert!(!ResourceKind::GatewayAttachment.supports_tags());
        assert!(!ResourceKind::Route.supports_tags());
        assert!(!ResourceKind::NotificationConfiguration.supports_tags());
        assert_eq!(ResourceKind::Route.name_source(), NameSource::IdOnly);
    }
}
