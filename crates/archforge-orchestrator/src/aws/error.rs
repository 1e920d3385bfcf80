//! AWS error classification
//!
//! Maps SDK errors onto [`ProviderError`] using the `.code()` reported by
//! the service instead of string matching on the Debug format.

use crate::provider::ProviderError;
use archforge_common::ResourceKind;
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    // EC2
    "InvalidVpcID.NotFound",
    "InvalidSubnetID.NotFound",
    "InvalidInternetGatewayID.NotFound",
    "InvalidRouteTableID.NotFound",
    "InvalidRoute.NotFound",
    "InvalidAssociationID.NotFound",
    "InvalidAllocationID.NotFound",
    "NatGatewayNotFound",
    "InvalidGroup.NotFound",
    "InvalidPermission.NotFound",
    "InvalidSecurityGroupRuleId.NotFound",
    "InvalidInstanceID.NotFound",
    "InvalidLaunchTemplateId.NotFound",
    "InvalidLaunchTemplateName.NotFoundException",
    // Elastic Load Balancing
    "LoadBalancerNotFound",
    "TargetGroupNotFound",
    "ListenerNotFound",
    "RuleNotFound",
    // RDS
    "DBInstanceNotFound",
    "DBInstanceNotFoundFault",
    "DBSubnetGroupNotFoundFault",
    // SNS and CloudWatch
    "NotFound",
    "ResourceNotFound",
];

/// Known AWS error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &[
    "InvalidGroup.Duplicate",
    "InvalidPermission.Duplicate",
    "RouteAlreadyExists",
    "Resource.AlreadyAssociated",
    "InvalidLaunchTemplateName.AlreadyExistsException",
    "DuplicateLoadBalancerName",
    "DuplicateTargetGroupName",
    "DuplicateListener",
    "PriorityInUse",
    "AlreadyExists",
    "DBInstanceAlreadyExists",
    "DBSubnetGroupAlreadyExists",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "Throttled",
];

/// Known AWS error codes for dependency violations (resource still in use)
const DEPENDENCY_CODES: &[&str] = &[
    "DependencyViolation",
    "ResourceInUse",
    "InvalidDBSubnetGroupStateFault",
    "InvalidDBInstanceState",
];

/// Classify an AWS error from its code and message.
pub fn classify_aws_error(
    operation: &'static str,
    code: Option<&str>,
    message: Option<&str>,
) -> ProviderError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => ProviderError::NotFound { operation, message },
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => {
            ProviderError::AlreadyExists { operation, message }
        }
        Some(c) if THROTTLING_CODES.contains(&c) => ProviderError::Throttled { operation },
        Some(c) if DEPENDENCY_CODES.contains(&c) => {
            ProviderError::DependencyViolation { operation, message }
        }
        // Auto Scaling reports a missing group as a validation error
        Some("ValidationError") if message.contains("not found") => {
            ProviderError::NotFound { operation, message }
        }
        _ => ProviderError::Sdk {
            operation,
            code: code.map(str::to_string),
            message,
        },
    }
}

/// Classify any SDK error through its error metadata.
///
/// Errors without a service code (dispatch, timeouts, credentials) keep the
/// full source chain in their message.
pub fn classify_sdk_error<E>(operation: &'static str, error: E) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let meta = ProvideErrorMetadata::meta(&error);
    match meta.code() {
        Some(code) => classify_aws_error(operation, Some(code), meta.message()),
        None => ProviderError::Sdk {
            operation,
            code: None,
            message: DisplayErrorContext(&error).to_string(),
        },
    }
}

/// Adapter for `map_err` at SDK call sites.
pub(crate) fn sdk_error<E>(operation: &'static str) -> impl FnOnce(E) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    move |error| classify_sdk_error(operation, error)
}

/// Adapter for `map_err` on fallible SDK type builders.
pub(crate) fn build_error<E: std::fmt::Display>(
    operation: &'static str,
) -> impl FnOnce(E) -> ProviderError {
    move |error| ProviderError::InvalidRequest {
        operation,
        message: error.to_string(),
    }
}

/// Unwrap a response attribute the caller cannot do without.
pub(crate) fn required<T>(
    value: Option<T>,
    operation: &'static str,
    field: &'static str,
) -> Result<T, ProviderError> {
    value.ok_or(ProviderError::MissingField { operation, field })
}

/// Error for a lookup filter the kind cannot be searched by.
pub(crate) fn unsupported(kind: ResourceKind) -> ProviderError {
    ProviderError::Unsupported {
        operation: "describe with this filter",
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes() {
        for code in NOT_FOUND_CODES {
            let err = classify_aws_error("Describe", Some(code), Some("gone"));
            assert!(err.is_not_found(), "Expected NotFound for code: {code}");
        }
    }

    #[test]
    fn already_exists_codes() {
        for code in ALREADY_EXISTS_CODES {
            let err = classify_aws_error("Create", Some(code), Some("dup"));
            assert!(
                matches!(err, ProviderError::AlreadyExists { .. }),
                "Expected AlreadyExists for code: {code}"
            );
        }
    }

    #[test]
    fn throttling_codes() {
        for code in THROTTLING_CODES {
            let err = classify_aws_error("Create", Some(code), None);
            assert!(matches!(err, ProviderError::Throttled { operation: "Create" }));
        }
    }

    #[test]
    fn dependency_violation() {
        let err = classify_aws_error(
            "DeleteVpc",
            Some("DependencyViolation"),
            Some("The vpc has dependencies and cannot be deleted."),
        );
        assert!(err.is_dependency_violation());
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn missing_auto_scaling_group() {
        let err = classify_aws_error(
            "DeleteAutoScalingGroup",
            Some("ValidationError"),
            Some("AutoScalingGroup name not found - web-asg"),
        );
        assert!(err.is_not_found());

        let err = classify_aws_error(
            "CreateAutoScalingGroup",
            Some("ValidationError"),
            Some("Max bound, 1, must be greater than or equal to min bound, 2"),
        );
        assert!(matches!(err, ProviderError::Sdk { code: Some(_), .. }));
    }

    #[test]
    fn unknown_and_missing_codes() {
        let err = classify_aws_error("RunInstances", Some("SomeNewError"), Some("details"));
        assert!(matches!(err, ProviderError::Sdk { .. }));

        let err = classify_aws_error("RunInstances", None, None);
        assert_eq!(err.to_string(), "RunInstances: Unknown error");
    }

    #[test]
    fn missing_response_field() {
        let err = required::<&str>(None, "CreateVpc", "vpc_id").unwrap_err();
        assert_eq!(err.to_string(), "CreateVpc: response is missing vpc_id");
        assert_eq!(required(Some(3), "CreateVpc", "vpc_id").unwrap(), 3);
    }
}
