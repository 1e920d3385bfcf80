//! Cloud provider client interface
//!
//! Every create, lookup, delete and tagging call the pipelines make goes
//! through [`CloudProvider`]. The production implementation lives in
//! [`crate::aws`]; tests use the in-memory provider in `crate::testing`.

mod request;

pub use request::*;

use archforge_common::ResourceKind;
use archforge_common::tags::{self, status};
use std::collections::BTreeMap;
use thiserror::Error;

/// Separator joining the parts of a compound identifier (e.g. `igw-1|vpc-2`)
pub const COMPOUND_ID_SEPARATOR: char = '|';

/// Join the parts of a link resource's identifier
pub fn compound_id(parts: &[&str]) -> String {
    parts.join(&COMPOUND_ID_SEPARATOR.to_string())
}

/// Split a compound identifier into exactly `N` parts
pub fn split_compound_id<const N: usize>(id: &str) -> Option<[&str; N]> {
    let parts: Vec<&str> = id.split(COMPOUND_ID_SEPARATOR).collect();
    parts.try_into().ok()
}

/// A resource as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceRecord {
    /// Provider-assigned identifier (ID, ARN, or native name)
    pub id: String,
    /// Lifecycle status, when the provider reports one
    pub status: Option<String>,
    /// Additional attributes (ARNs, DNS names, parent IDs)
    pub fields: BTreeMap<String, String>,
}

impl ResourceRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// How a describe call narrows its results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFilter {
    /// Resources whose `Name` tag equals the value
    NameTag(String),
    /// Resources whose provider-native name equals the value
    NativeName(String),
    /// Resources owned by the given parent identifier
    Parent(String),
    /// The resource with exactly this identifier, including lingering deleted states
    Id(String),
}

impl std::fmt::Display for LookupFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupFilter::NameTag(name) => write!(f, "tag:Name={name}"),
            LookupFilter::NativeName(name) => write!(f, "name={name}"),
            LookupFilter::Parent(parent) => write!(f, "parent={parent}"),
            LookupFilter::Id(id) => write!(f, "id={id}"),
        }
    }
}

/// Tags applied to a resource at creation time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTags {
    pub name: String,
    pub stack: String,
    pub run_id: String,
    pub created_at: String,
}

impl ResourceTags {
    /// Full tag set, with the lifecycle status still `creating`
    pub fn pairs(&self) -> Vec<(String, String)> {
        vec![
            (tags::TAG_NAME.to_string(), self.name.clone()),
            (tags::TAG_TOOL.to_string(), tags::TAG_TOOL_VALUE.to_string()),
            (tags::TAG_STACK.to_string(), self.stack.clone()),
            (tags::TAG_RUN_ID.to_string(), self.run_id.clone()),
            (tags::TAG_CREATED_AT.to_string(), self.created_at.clone()),
            (tags::TAG_STATUS.to_string(), status::CREATING.to_string()),
        ]
    }

    /// The single tag flipped once the owning stage completes
    pub fn active_status() -> Vec<(String, String)> {
        vec![(tags::TAG_STATUS.to_string(), status::ACTIVE.to_string())]
    }
}

/// Errors reported by a cloud provider call
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The addressed resource does not exist
    #[error("{operation}: resource not found: {message}")]
    NotFound {
        operation: &'static str,
        message: String,
    },

    /// A resource with the same name already exists
    #[error("{operation}: resource already exists: {message}")]
    AlreadyExists {
        operation: &'static str,
        message: String,
    },

    /// Rate limit exceeded
    #[error("{operation}: rate limit exceeded")]
    Throttled { operation: &'static str },

    /// The resource still has dependent objects
    #[error("{operation}: resource has dependent objects: {message}")]
    DependencyViolation {
        operation: &'static str,
        message: String,
    },

    /// A response lacked an attribute the caller needs
    #[error("{operation}: response is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    /// A request could not be assembled from the configuration
    #[error("{operation}: invalid request: {message}")]
    InvalidRequest {
        operation: &'static str,
        message: String,
    },

    /// The provider has no such operation for this kind
    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        operation: &'static str,
        kind: ResourceKind,
    },

    /// Any other provider error, with its code when one was reported
    #[error("{operation}: {message}{}", .code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Sdk {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }

    pub fn is_dependency_violation(&self) -> bool {
        matches!(self, ProviderError::DependencyViolation { .. })
    }

    /// Get a user-friendly suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ProviderError::AlreadyExists { .. } => Some(
                "A resource with this name already exists. Run the delete pipeline or rename it in the variables file.",
            ),
            ProviderError::DependencyViolation { .. } => Some(
                "Another resource still references this one. Check the console for resources created outside archforge.",
            ),
            ProviderError::Throttled { .. } => {
                Some("The API rate limit was hit. Wait a minute and re-run.")
            }
            ProviderError::Sdk {
                code: Some(code), ..
            } => suggestion_for_code(code),
            _ => None,
        }
    }
}

fn suggestion_for_code(code: &str) -> Option<&'static str> {
    match code {
        "UnauthorizedOperation" | "AccessDenied" | "AccessDeniedException" => Some(
            "Your credentials lack permission for this call. Check the IAM policy of the active profile.",
        ),
        "VpcLimitExceeded" | "AddressLimitExceeded" | "NatGatewayLimitExceeded" => Some(
            "An account quota is exhausted. Release unused resources or request a limit increase.",
        ),
        "InvalidKeyPair.NotFound" => {
            Some("The key pair named in the variables file does not exist in this region.")
        }
        "InvalidAMIID.NotFound" | "InvalidAMIID.Malformed" => {
            Some("The AMI named in the variables file does not exist in this region.")
        }
        "InvalidSubnet.Conflict" => {
            Some("A subnet CIDR conflicts with an existing subnet in the VPC.")
        }
        _ => None,
    }
}

/// The client interface every pipeline stage talks to.
///
/// One method per verb; the resource kind selects the provider API.
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait CloudProvider {
    /// Issue exactly one creation call and return what the provider reported.
    async fn create(
        &self,
        request: &CreateRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError>;

    /// List live resources of `kind` matching `filter`.
    async fn describe(
        &self,
        kind: ResourceKind,
        filter: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError>;

    /// Request deletion of a resource. Slow deletions complete asynchronously.
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ProviderError>;

    /// Add or overwrite tags on an existing resource.
    async fn tag(
        &self,
        kind: ResourceKind,
        id: &str,
        tags: &[(String, String)],
    ) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_id_round_trip() {
        let id = compound_id(&["igw-1", "vpc-2"]);
        assert_eq!(id, "igw-1|vpc-2");
        assert_eq!(split_compound_id::<2>(&id), Some(["igw-1", "vpc-2"]));
        assert_eq!(split_compound_id::<3>(&id), None);
    }

    #[test]
    fn test_creation_tags() {
        let tags = ResourceTags {
            name: "web-vpc".to_string(),
            stack: "web".to_string(),
            run_id: "run-1".to_string(),
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
        };
        let pairs = tags.pairs();
        assert!(pairs.contains(&("Name".to_string(), "web-vpc".to_string())));
        assert!(pairs.contains(&("archforge:status".to_string(), "creating".to_string())));
        assert_eq!(
            ResourceTags::active_status(),
            vec![("archforge:status".to_string(), "active".to_string())]
        );
    }

    #[test]
    fn test_sdk_error_display_includes_code() {
        let err = ProviderError::Sdk {
            operation: "CreateVpc",
            code: Some("VpcLimitExceeded".to_string()),
            message: "The maximum number of VPCs has been reached.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "CreateVpc: The maximum number of VPCs has been reached. (VpcLimitExceeded)"
        );
        assert!(err.suggestion().is_some());
    }
}
