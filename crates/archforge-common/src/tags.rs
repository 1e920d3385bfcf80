//! AWS resource tag constants for archforge
//!
//! Every taggable resource archforge creates carries these tags alongside
//! its `Name` tag, so a stack can be recognised in the console and its
//! lifecycle state inspected after a failed run.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `Name` | Configured logical name, the key the locator searches on |
//! | `archforge:tool` | Static identifier ("archforge") |
//! | `archforge:stack` | Stack name from the variables file |
//! | `archforge:run-id` | Unique identifier of the create run (UUID) |
//! | `archforge:created-at` | RFC 3339 creation timestamp |
//! | `archforge:status` | Lifecycle status (creating/active) |

/// Tag key holding the configured logical name
pub const TAG_NAME: &str = "Name";

/// Tag key for tool identification - all archforge resources have this
pub const TAG_TOOL: &str = "archforge:tool";

/// Tag value for tool identification
pub const TAG_TOOL_VALUE: &str = "archforge";

/// Tag key for the stack the resource belongs to
pub const TAG_STACK: &str = "archforge:stack";

/// Tag key for run ID - unique identifier per create run
pub const TAG_RUN_ID: &str = "archforge:run-id";

/// Tag key for creation timestamp (RFC 3339 format)
pub const TAG_CREATED_AT: &str = "archforge:created-at";

/// Tag key for resource lifecycle status
pub const TAG_STATUS: &str = "archforge:status";

/// Resource lifecycle status values
pub mod status {
    /// Resource has been requested but its stage has not finished
    pub const CREATING: &str = "creating";

    /// Resource finished provisioning, including any readiness wait
    pub const ACTIVE: &str = "active";
}

/// Helper to format creation timestamp for tags
pub fn format_created_at(time: chrono::DateTime<chrono::Utc>) -> String {
    time.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_created_at_is_rfc3339() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(format_created_at(time), "2024-03-01T12:30:00+00:00");
    }

    #[test]
    fn test_tool_keys_share_prefix() {
        for key in [TAG_TOOL, TAG_STACK, TAG_RUN_ID, TAG_CREATED_AT, TAG_STATUS] {
            assert!(key.starts_with("archforge:"), "{key} lacks the archforge prefix");
        }
    }
}
