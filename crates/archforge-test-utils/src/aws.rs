//! AWS test utilities
//!
//! Provides region detection and unique stack names for AWS integration tests.

/// Get the AWS region for tests.
///
/// Checks environment variables in order:
/// 1. AWS_REGION
/// 2. AWS_DEFAULT_REGION
/// 3. Falls back to eu-west-1
pub fn get_test_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| "eu-west-1".to_string())
}

/// Generate a unique stack name for test resources.
///
/// Format: `aftest-{8 hex chars}`. Short enough that derived names stay
/// inside the 32-character limit on load balancer and target group names.
///
/// # Example
///
/// ```
/// use archforge_test_utils::aws::test_stack_name;
///
/// let stack = test_stack_name();
/// assert!(stack.starts_with("aftest-"));
/// ```
pub fn test_stack_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("aftest-{}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_name_format() {
        let stack = test_stack_name();
        let suffix = stack.strip_prefix("aftest-").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_stack_name_unique() {
        assert_ne!(test_stack_name(), test_stack_name());
    }
}
