//! Up-front validation of the configuration bundle
//!
//! Everything here runs before the first provider call, so a typo in the
//! variables file never leaves a half-built stack behind.

use super::ArchitectureConfig;
use archforge_common::ResourceKind;
use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while loading or validating a variables file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read variables file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse variables file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{field} must not be empty")]
    EmptyField { field: String },

    #[error("{field} must be greater than zero")]
    NotPositive { field: String },

    #[error("{field}: '{value}' is not a valid IPv4 CIDR block")]
    InvalidCidr { field: String, value: String },

    #[error("Subnet {subnet} ({cidr}) lies outside the VPC block {vpc}")]
    SubnetOutsideVpc {
        subnet: String,
        cidr: Ipv4Cidr,
        vpc: Ipv4Cidr,
    },

    #[error("Subnets {first} and {second} overlap")]
    OverlappingSubnets { first: String, second: String },

    #[error("{kind} name '{name}' is used more than once")]
    DuplicateName { kind: ResourceKind, name: String },

    #[error("Auto-scaling sizes must satisfy min <= desired <= max (got {min}/{desired}/{max})")]
    InvalidCapacity { min: i32, desired: i32, max: i32 },
}

/// An IPv4 network in CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    fn mask(self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    /// Whether `other` lies entirely inside this block
    pub fn contains(self, other: Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && other.network & self.mask() == self.network
    }

    pub fn overlaps(self, other: Ipv4Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s.split_once('/').ok_or(())?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| ())?;
        let prefix: u8 = prefix.parse().map_err(|_| ())?;
        if prefix > 32 {
            return Err(());
        }
        let cidr = Ipv4Cidr {
            network: u32::from(addr),
            prefix,
        };
        // Host bits must be zero, as the provider rejects e.g. 10.0.1.5/24
        if cidr.network & !cidr.mask() != 0 {
            return Err(());
        }
        Ok(cidr)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.network), self.prefix)
    }
}

fn parse_cidr(field: &str, value: &str) -> Result<Ipv4Cidr, ConfigError> {
    value.parse().map_err(|()| ConfigError::InvalidCidr {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyField {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Values past `i64::MAX` are still positive; clamp rather than wrap.
fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn require_positive(field: &str, value: i64) -> Result<(), ConfigError> {
    if value <= 0 {
        return Err(ConfigError::NotPositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

impl ArchitectureConfig {
    /// Check every invariant the pipelines rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_names()?;
        self.validate_network()?;

        for (i, cidr) in self.security.ssh_cidr_blocks.iter().enumerate() {
            parse_cidr(&format!("security.sshCidrBlocks[{i}]"), cidr)?;
        }

        require_positive("compute.count", self.compute.count.into())?;
        require_positive(
            "database.allocatedStorage",
            self.database.allocated_storage.into(),
        )?;
        require_positive(
            "waiter.pollIntervalSecs",
            saturating_i64(self.waiter.poll_interval_secs),
        )?;
        require_positive("waiter.timeoutSecs", saturating_i64(self.waiter.timeout_secs))?;

        let asg = &self.auto_scaling;
        if asg.min_size < 0 || asg.min_size > asg.desired_capacity || asg.desired_capacity > asg.max_size
        {
            return Err(ConfigError::InvalidCapacity {
                min: asg.min_size,
                desired: asg.desired_capacity,
                max: asg.max_size,
            });
        }
        require_positive("autoScaling.maxSize", asg.max_size.into())?;

        Ok(())
    }

    /// Every name the locator will later search on, grouped by the kind it is searched under
    fn named_resources(&self) -> Vec<(&'static str, ResourceKind, &str)> {
        let net = &self.network;
        let sec = &self.security;
        let db = &self.database;
        let lb = &self.load_balancer;
        let asg = &self.auto_scaling;
        let mon = &self.monitoring;
        let sns = &self.notifications;
        vec![
            ("network.vpc.name", ResourceKind::Vpc, net.vpc.name.as_str()),
            ("network.internetGatewayName", ResourceKind::InternetGateway, net.internet_gateway_name.as_str()),
            ("network.elasticIpName", ResourceKind::ElasticIp, net.elastic_ip_name.as_str()),
            ("network.natGatewayName", ResourceKind::NatGateway, net.nat_gateway_name.as_str()),
            ("network.publicRouteTableName", ResourceKind::RouteTable, net.public_route_table_name.as_str()),
            ("network.privateRouteTableName", ResourceKind::RouteTable, net.private_route_table_name.as_str()),
            ("network.publicSubnets[0].name", ResourceKind::Subnet, net.public_subnets[0].name.as_str()),
            ("network.publicSubnets[1].name", ResourceKind::Subnet, net.public_subnets[1].name.as_str()),
            ("network.privateSubnets[0].name", ResourceKind::Subnet, net.private_subnets[0].name.as_str()),
            ("network.privateSubnets[1].name", ResourceKind::Subnet, net.private_subnets[1].name.as_str()),
            ("security.application.name", ResourceKind::SecurityGroup, sec.application.name.as_str()),
            ("security.loadBalancer.name", ResourceKind::SecurityGroup, sec.load_balancer.name.as_str()),
            ("security.database.name", ResourceKind::SecurityGroup, sec.database.name.as_str()),
            ("database.subnetGroupName", ResourceKind::DbSubnetGroup, db.subnet_group_name.as_str()),
            ("database.identifier", ResourceKind::DbInstance, db.identifier.as_str()),
            ("compute.name", ResourceKind::Instance, self.compute.name.as_str()),
            ("autoScaling.instanceName", ResourceKind::Instance, asg.instance_name.as_str()),
            ("loadBalancer.name", ResourceKind::LoadBalancer, lb.name.as_str()),
            ("loadBalancer.targetGroup.name", ResourceKind::TargetGroup, lb.target_group.name.as_str()),
            ("autoScaling.launchTemplate.name", ResourceKind::LaunchTemplate, asg.launch_template.name.as_str()),
            ("autoScaling.groupName", ResourceKind::AutoScalingGroup, asg.group_name.as_str()),
            ("autoScaling.policies.statusCheckScaleOut", ResourceKind::ScalingPolicy, asg.policies.status_check_scale_out.as_str()),
            ("autoScaling.policies.statusCheckScaleIn", ResourceKind::ScalingPolicy, asg.policies.status_check_scale_in.as_str()),
            ("autoScaling.policies.cpuScaleOut", ResourceKind::ScalingPolicy, asg.policies.cpu_scale_out.as_str()),
            ("autoScaling.policies.cpuScaleIn", ResourceKind::ScalingPolicy, asg.policies.cpu_scale_in.as_str()),
            ("monitoring.statusCheckAlarm.name", ResourceKind::Alarm, mon.status_check_alarm.name.as_str()),
            ("monitoring.cpuAlarm.name", ResourceKind::Alarm, mon.cpu_alarm.name.as_str()),
            ("notifications.scaleUpTopic.name", ResourceKind::Topic, sns.scale_up_topic.name.as_str()),
            ("notifications.scaleDownTopic.name", ResourceKind::Topic, sns.scale_down_topic.name.as_str()),
        ]
    }

    fn validate_names(&self) -> Result<(), ConfigError> {
        require_non_empty("stackName", &self.stack_name)?;
        require_non_empty("region", &self.region)?;

        let mut seen = HashSet::new();
        for (field, kind, name) in self.named_resources() {
            require_non_empty(field, name)?;
            if !seen.insert((kind, name)) {
                return Err(ConfigError::DuplicateName {
                    kind,
                    name: name.to_string(),
                });
            }
        }

        let sec = &self.security;
        let mut group_names = HashSet::new();
        for (field, group) in [
            ("security.application.groupName", &sec.application),
            ("security.loadBalancer.groupName", &sec.load_balancer),
            ("security.database.groupName", &sec.database),
        ] {
            require_non_empty(field, &group.group_name)?;
            if !group_names.insert(group.group_name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: ResourceKind::SecurityGroup,
                    name: group.group_name.clone(),
                });
            }
        }

        require_non_empty("database.masterUsername", &self.database.master_username)?;
        require_non_empty(
            "database.masterPassword",
            self.database.master_password.expose(),
        )?;
        require_non_empty("notifications.endpoint", &self.notifications.endpoint)?;
        Ok(())
    }

    fn validate_network(&self) -> Result<(), ConfigError> {
        let net = &self.network;
        let vpc = parse_cidr("network.vpc.cidrBlock", &net.vpc.cidr_block)?;

        let mut subnets: Vec<(&str, Ipv4Cidr)> = Vec::with_capacity(4);
        for (tier, list) in [("publicSubnets", &net.public_subnets), ("privateSubnets", &net.private_subnets)] {
            for (i, subnet) in list.iter().enumerate() {
                let field = format!("network.{tier}[{i}].cidrBlock");
                let cidr = parse_cidr(&field, &subnet.cidr_block)?;
                require_non_empty(
                    &format!("network.{tier}[{i}].availabilityZone"),
                    &subnet.availability_zone,
                )?;
                if !vpc.contains(cidr) {
                    return Err(ConfigError::SubnetOutsideVpc {
                        subnet: subnet.name.clone(),
                        cidr,
                        vpc,
                    });
                }
                subnets.push((subnet.name.as_str(), cidr));
            }
        }

        for (i, (first, a)) in subnets.iter().enumerate() {
            for (second, b) in &subnets[i + 1..] {
                if a.overlaps(*b) {
                    return Err(ConfigError::OverlappingSubnets {
                        first: first.to_string(),
                        second: second.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archforge_test_utils::SAMPLE_VARS_YAML;

    fn sample() -> ArchitectureConfig {
        ArchitectureConfig::from_yaml(SAMPLE_VARS_YAML).unwrap()
    }

    #[test]
    fn test_cidr_parse() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.1.5/24".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.300.0/24".parse::<Ipv4Cidr>().is_err());
        assert!("0.0.0.0/0".parse::<Ipv4Cidr>().is_ok());
    }

    #[test]
    fn test_cidr_containment() {
        let vpc: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        let inside: Ipv4Cidr = "10.0.3.0/24".parse().unwrap();
        let outside: Ipv4Cidr = "10.1.0.0/24".parse().unwrap();
        assert!(vpc.contains(inside));
        assert!(!vpc.contains(outside));
        assert!(!inside.contains(vpc));
        assert!(vpc.overlaps(inside));
        assert!(!inside.overlaps(outside));
    }

    #[test]
    fn test_sample_is_valid() {
        sample().validate().unwrap();
    }

    #[test]
    fn test_subnet_outside_vpc() {
        let mut config = sample();
        config.network.private_subnets[1].cidr_block = "192.168.4.0/24".to_string();
        let err = config.validate().unwrap_err();
        assert!(
            matches!(&err, ConfigError::SubnetOutsideVpc { subnet, .. } if subnet == "scalable-web-private-2"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_overlapping_subnets() {
        let mut config = sample();
        config.network.public_subnets[1].cidr_block = "10.0.0.0/22".to_string();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::OverlappingSubnets { .. }
        ));
    }

    #[test]
    fn test_duplicate_name_within_kind() {
        let mut config = sample();
        config.network.private_subnets[0].name = config.network.public_subnets[0].name.clone();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateName {
                kind: ResourceKind::Subnet,
                ..
            }
        ));
    }

    #[test]
    fn test_same_name_across_kinds_allowed() {
        let mut config = sample();
        config.load_balancer.target_group.name = config.load_balancer.name.clone();
        config.validate().unwrap();
    }

    #[test]
    fn test_duplicate_group_name() {
        let mut config = sample();
        config.security.database.group_name = config.security.application.group_name.clone();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::DuplicateName {
                kind: ResourceKind::SecurityGroup,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_name() {
        let mut config = sample();
        config.network.nat_gateway_name = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "network.natGatewayName must not be empty");
    }

    #[test]
    fn test_capacity_inversion() {
        let mut config = sample();
        config.auto_scaling.desired_capacity = 9;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidCapacity {
                min: 2,
                desired: 9,
                max: 4
            }
        ));
    }

    #[test]
    fn test_bad_ssh_cidr() {
        let mut config = sample();
        config.security.ssh_cidr_blocks.push("office".to_string());
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidCidr { .. }
        ));
    }

    #[test]
    fn test_zero_poll_interval() {
        let mut config = sample();
        config.waiter.poll_interval_secs = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::NotPositive { .. }
        ));
    }

    #[test]
    fn test_huge_timeout_is_positive() {
        let mut config = sample();
        config.waiter.timeout_secs = u64::MAX;
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_region() {
        let mut config = sample();
        config.region = " ".to_string();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::EmptyField { ref field } if field == "region"
        ));
    }
}
