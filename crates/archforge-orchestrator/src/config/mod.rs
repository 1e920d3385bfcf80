//! Configuration bundle for an architecture run
//!
//! Loaded once from the YAML variables file, validated, then shared
//! read-only by every pipeline stage.

mod validate;

pub use validate::{ConfigError, Ipv4Cidr};

use archforge_common::defaults;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// A value that must never reach logs or error messages
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the plaintext value for handing to the provider
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Complete description of the architecture to build or tear down
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArchitectureConfig {
    /// AWS region
    #[serde(default = "defaults::default_region")]
    pub region: String,
    /// Stack name recorded on every tagged resource
    pub stack_name: String,
    pub network: NetworkConfig,
    pub security: SecurityConfig,
    pub database: DatabaseConfig,
    pub compute: ComputeConfig,
    pub load_balancer: LoadBalancerConfig,
    pub auto_scaling: AutoScalingConfig,
    pub monitoring: MonitoringConfig,
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub waiter: WaiterConfig,
}

/// VPC, gateways, route tables and subnets
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkConfig {
    pub vpc: VpcConfig,
    pub internet_gateway_name: String,
    pub elastic_ip_name: String,
    pub nat_gateway_name: String,
    pub public_route_table_name: String,
    pub private_route_table_name: String,
    /// Exactly two public subnets; the first hosts the NAT gateway
    pub public_subnets: [SubnetConfig; 2],
    /// Exactly two private subnets for the auto-scaling group and database
    pub private_subnets: [SubnetConfig; 2],
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VpcConfig {
    pub name: String,
    pub cidr_block: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubnetConfig {
    pub name: String,
    pub cidr_block: String,
    pub availability_zone: String,
}

/// Security groups for the three tiers plus the SSH allow-list
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecurityConfig {
    pub application: SecurityGroupConfig,
    pub load_balancer: SecurityGroupConfig,
    pub database: SecurityGroupConfig,
    /// CIDR blocks allowed to SSH to the load-balancer tier
    #[serde(default)]
    pub ssh_cidr_blocks: Vec<String>,
    #[serde(default = "defaults::default_database_port")]
    pub database_port: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecurityGroupConfig {
    /// Value of the Name tag
    pub name: String,
    /// Provider-native group name
    pub group_name: String,
    pub description: String,
}

/// RDS subnet group and instance
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatabaseConfig {
    pub subnet_group_name: String,
    pub subnet_group_description: String,
    pub identifier: String,
    pub db_name: String,
    pub engine: String,
    pub storage_type: String,
    pub allocated_storage: i32,
    pub instance_class: String,
    #[serde(default)]
    pub multi_az: bool,
    pub master_username: String,
    pub master_password: Secret,
}

/// Stand-alone web servers launched into the first public subnet
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComputeConfig {
    /// Name tag shared by every launched server
    pub name: String,
    pub ami_id: String,
    pub instance_type: String,
    pub key_pair_name: String,
    pub count: i32,
}

/// Application load balancer with its target group and listener
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoadBalancerConfig {
    pub name: String,
    pub scheme: String,
    #[serde(rename = "type")]
    pub lb_type: String,
    pub ip_address_type: String,
    pub target_group: TargetGroupConfig,
    pub listener: ListenerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetGroupConfig {
    pub name: String,
    pub protocol: String,
    pub port: i32,
    pub target_type: String,
    pub health_check: HealthCheckConfig,
    pub stickiness: StickinessConfig,
    pub deregistration_delay_seconds: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HealthCheckConfig {
    pub protocol: String,
    pub port: String,
    pub path: String,
    pub interval_seconds: i32,
    pub timeout_seconds: i32,
    pub healthy_threshold: i32,
    pub unhealthy_threshold: i32,
    pub http_code: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StickinessConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub stickiness_type: String,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListenerConfig {
    pub protocol: String,
    pub port: i32,
    pub rule: ListenerRuleConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListenerRuleConfig {
    pub priority: i32,
    pub path_pattern: String,
}

/// Launch template, auto-scaling group and its scaling policies
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AutoScalingConfig {
    pub launch_template: LaunchTemplateConfig,
    pub group_name: String,
    /// Name tag propagated to instances the group launches
    pub instance_name: String,
    pub min_size: i32,
    pub max_size: i32,
    pub desired_capacity: i32,
    pub default_cooldown: i32,
    pub health_check_type: String,
    pub health_check_grace_period: i32,
    #[serde(default)]
    pub termination_policies: Vec<String>,
    #[serde(default)]
    pub protect_from_scale_in: bool,
    #[serde(default = "defaults::default_metrics_granularity")]
    pub metrics_granularity: String,
    #[serde(default = "defaults::default_group_metrics")]
    pub metrics: Vec<String>,
    pub policies: ScalingPoliciesConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LaunchTemplateConfig {
    pub name: String,
    pub ami_id: String,
    pub instance_type: String,
    pub key_pair_name: String,
    #[serde(default)]
    pub detailed_monitoring: bool,
    #[serde(default)]
    pub user_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScalingPoliciesConfig {
    pub policy_type: String,
    pub adjustment_type: String,
    pub cooldown: i32,
    pub scale_out_adjustment: i32,
    pub scale_in_adjustment: i32,
    pub status_check_scale_out: String,
    pub status_check_scale_in: String,
    pub cpu_scale_out: String,
    pub cpu_scale_in: String,
}

/// CloudWatch alarms driving the scaling policies
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MonitoringConfig {
    pub namespace: String,
    pub comparison_operator: String,
    pub evaluation_periods: i32,
    pub period: i32,
    pub status_check_alarm: AlarmConfig,
    pub cpu_alarm: AlarmConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AlarmConfig {
    pub name: String,
    pub description: String,
    pub metric_name: String,
    pub statistic: String,
    pub threshold: f64,
    pub unit: String,
}

/// SNS topics notified on scale-up and scale-down
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NotificationsConfig {
    pub protocol: String,
    pub endpoint: String,
    pub scale_up_topic: TopicConfig,
    pub scale_down_topic: TopicConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TopicConfig {
    pub name: String,
    pub display_name: String,
    /// Auto-scaling event published to this topic
    pub notification_type: String,
}

/// Readiness waiter bounds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WaiterConfig {
    #[serde(default = "defaults::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "defaults::default_waiter_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::DEFAULT_POLL_INTERVAL_SECS,
            timeout_secs: defaults::DEFAULT_WAITER_TIMEOUT_SECS,
        }
    }
}

impl WaiterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ArchitectureConfig {
    /// Read, parse and validate a variables file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a variables document held in memory.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: "<inline>".into(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Return a copy targeting another region, as requested on the command line.
    ///
    /// The result is validated again, so an override cannot bypass the
    /// checks the variables file went through.
    pub fn with_region(mut self, region: Option<String>) -> Result<Self, ConfigError> {
        if let Some(region) = region {
            self.region = region;
        }
        self.validate()?;
        Ok(self)
    }

    /// Return a copy with a different waiter timeout, validated again.
    pub fn with_waiter_timeout(mut self, timeout_secs: Option<u64>) -> Result<Self, ConfigError> {
        if let Some(timeout_secs) = timeout_secs {
            self.waiter.timeout_secs = timeout_secs;
        }
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archforge_test_utils::SAMPLE_VARS_YAML;
    use std::io::Write;

    #[test]
    fn test_sample_vars_parse() {
        let config = ArchitectureConfig::from_yaml(SAMPLE_VARS_YAML).unwrap();
        assert_eq!(config.stack_name, "scalable-web");
        assert_eq!(config.network.vpc.cidr_block, "10.0.0.0/16");
        assert_eq!(config.network.public_subnets[1].cidr_block, "10.0.2.0/24");
        assert_eq!(config.network.private_subnets[0].cidr_block, "10.0.3.0/24");
        assert_eq!(config.load_balancer.lb_type, "application");
        assert_eq!(config.auto_scaling.metrics.len(), 6);
        assert_eq!(config.waiter.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_VARS_YAML.as_bytes()).unwrap();

        let config = ArchitectureConfig::load(file.path()).unwrap();
        assert_eq!(config.region, "eu-west-1");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArchitectureConfig::load(dir.path().join("absent.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let yaml = SAMPLE_VARS_YAML.replace("stackName:", "stackNmae:");
        let err = ArchitectureConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_third_public_subnet_rejected() {
        let yaml = SAMPLE_VARS_YAML.replace(
            "  privateSubnets:\n",
            "    - name: extra\n      cidrBlock: 10.0.9.0/24\n      availabilityZone: eu-west-1c\n  privateSubnets:\n",
        );
        assert!(ArchitectureConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_waiter_defaults_when_omitted() {
        let yaml = SAMPLE_VARS_YAML
            .replace("waiter:\n  pollIntervalSecs: 5\n  timeoutSecs: 1800\n", "");
        let config = ArchitectureConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.waiter, WaiterConfig::default());
    }

    #[test]
    fn test_password_redacted_in_debug() {
        let config = ArchitectureConfig::from_yaml(SAMPLE_VARS_YAML).unwrap();
        let debug = format!("{:?}", config.database);
        assert!(!debug.contains("change-me-before-use"));
        assert!(debug.contains("Secret(***)"));
        assert_eq!(config.database.master_password.expose(), "change-me-before-use");
    }

    #[test]
    fn test_cli_overrides() {
        let config = ArchitectureConfig::from_yaml(SAMPLE_VARS_YAML)
            .unwrap()
            .with_region(Some("us-east-2".to_string()))
            .unwrap()
            .with_waiter_timeout(Some(60))
            .unwrap();
        assert_eq!(config.region, "us-east-2");
        assert_eq!(config.waiter.timeout(), Duration::from_secs(60));

        let unchanged = config
            .clone()
            .with_region(None)
            .unwrap()
            .with_waiter_timeout(None)
            .unwrap();
        assert_eq!(unchanged, config);
    }

    #[test]
    fn test_cli_overrides_are_validated() {
        let config = ArchitectureConfig::from_yaml(SAMPLE_VARS_YAML).unwrap();

        let err = config.clone().with_waiter_timeout(Some(0)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NotPositive { ref field } if field == "waiter.timeoutSecs"
        ));

        let err = config.with_region(Some(String::new())).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyField { .. }));
    }
}
