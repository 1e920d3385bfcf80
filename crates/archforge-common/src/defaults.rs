//! Default configuration values shared across archforge components

/// Default AWS region when neither the variables file nor the CLI names one
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Default path of the YAML variables file
pub const DEFAULT_VARS_PATH: &str = "awsVariables.yml";

/// Fixed interval between readiness polls, in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Upper bound on a single readiness wait, in seconds (30 minutes).
///
/// Multi-AZ database instances routinely take 15-20 minutes to become
/// available, so the bound sits comfortably above that.
pub const DEFAULT_WAITER_TIMEOUT_SECS: u64 = 1800;

/// Default MySQL port opened from the application tier to the database tier
pub const DEFAULT_DATABASE_PORT: u16 = 3306;

/// Granularity for auto-scaling group metrics collection
pub const DEFAULT_METRICS_GRANULARITY: &str = "1Minute";

/// Group metrics enabled on the auto-scaling group
pub const DEFAULT_GROUP_METRICS: &[&str] = &[
    "GroupMinSize",
    "GroupMaxSize",
    "GroupDesiredCapacity",
    "GroupInServiceInstances",
    "GroupPendingInstances",
    "GroupTerminatingInstances",
];

// Serde default functions for struct field defaults

/// Returns the default region
pub fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// Returns the default poll interval
pub fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// Returns the default waiter timeout
pub fn default_waiter_timeout_secs() -> u64 {
    DEFAULT_WAITER_TIMEOUT_SECS
}

/// Returns the default database port
pub fn default_database_port() -> u16 {
    DEFAULT_DATABASE_PORT
}

/// Returns the default metrics granularity
pub fn default_metrics_granularity() -> String {
    DEFAULT_METRICS_GRANULARITY.to_string()
}

/// Returns the default group metrics
pub fn default_group_metrics() -> Vec<String> {
    DEFAULT_GROUP_METRICS.iter().map(|m| m.to_string()).collect()
}
