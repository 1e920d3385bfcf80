//! Sample variables documents
//!
//! The example variables file shipped at the repository root is the single
//! source of truth; tests load it verbatim or with every resource name
//! re-prefixed so concurrent runs never collide.

/// The example variables file, as shipped
pub const SAMPLE_VARS_YAML: &str = include_str!("../../../awsVariables.example.yml");

/// Prefix shared by every resource name in [`SAMPLE_VARS_YAML`]
const SAMPLE_PREFIX: &str = "scalable-web";

/// Return the sample document with every resource name re-prefixed.
///
/// Also replaces the stack name, so tags carry the new prefix too.
pub fn sample_vars_with_prefix(prefix: &str) -> String {
    SAMPLE_VARS_YAML.replace(SAMPLE_PREFIX, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_replaces_every_name() {
        let vars = sample_vars_with_prefix("aftest-1234");
        assert!(!vars.contains(SAMPLE_PREFIX));
        assert!(vars.contains("stackName: aftest-1234"));
        assert!(vars.contains("name: aftest-1234-vpc"));
    }
}
