//! Resolve logical names to live provider identifiers

use crate::error::OrchestrationError;
use crate::provider::{CloudProvider, LookupFilter, ResourceRecord};
use archforge_common::{NameSource, ResourceKind};
use std::fmt;
use tracing::debug;

/// A logical name paired with the identifier the provider assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    /// Logical name from the configuration bundle
    pub name: String,
    /// Provider-assigned identifier
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.name, self.id)
    }
}

/// Read-only resolver over a [`CloudProvider`]
pub struct Locator<'a, P> {
    provider: &'a P,
}

impl<'a, P: CloudProvider> Locator<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Resolve `name` to exactly one live resource of `kind`.
    ///
    /// Uses the `Name` tag or the provider-native name, whichever the kind
    /// is searched by.
    pub async fn locate(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<ResourceRef, OrchestrationError> {
        let filter = match kind.name_source() {
            NameSource::NameTag => LookupFilter::NameTag(name.to_string()),
            NameSource::NativeName => LookupFilter::NativeName(name.to_string()),
            NameSource::Parent | NameSource::IdOnly => LookupFilter::Id(name.to_string()),
        };
        self.locate_by(kind, name, &filter).await
    }

    /// Resolve the single resource of `kind` owned by `parent_id`.
    ///
    /// `name` is the logical label used in errors and logs.
    pub async fn locate_child(
        &self,
        kind: ResourceKind,
        name: &str,
        parent_id: &str,
    ) -> Result<ResourceRef, OrchestrationError> {
        self.locate_by(kind, name, &LookupFilter::Parent(parent_id.to_string()))
            .await
    }

    /// Resolve a filter to exactly one record.
    pub async fn locate_by(
        &self,
        kind: ResourceKind,
        name: &str,
        filter: &LookupFilter,
    ) -> Result<ResourceRef, OrchestrationError> {
        let record = self.locate_record(kind, name, filter).await?;
        Ok(ResourceRef::new(kind, name, record.id))
    }

    /// Resolve a filter to exactly one record, keeping its status and fields.
    pub async fn locate_record(
        &self,
        kind: ResourceKind,
        name: &str,
        filter: &LookupFilter,
    ) -> Result<ResourceRecord, OrchestrationError> {
        let mut records = self.describe(kind, name, filter).await?;
        match records.len() {
            0 => Err(OrchestrationError::NotFound {
                kind,
                name: name.to_string(),
            }),
            1 => {
                let record = records.remove(0);
                debug!(kind = %kind, name = %name, id = %record.id, "Located resource");
                Ok(record)
            }
            _ => Err(OrchestrationError::AmbiguousResult {
                kind,
                name: name.to_string(),
                ids: records.into_iter().map(|r| r.id).collect(),
            }),
        }
    }

    /// Resolve a filter to every matching record, possibly none.
    ///
    /// For resources that legitimately exist in multiples under one name,
    /// such as a fleet of web servers or the rules of a security group.
    pub async fn locate_all(
        &self,
        kind: ResourceKind,
        name: &str,
        filter: &LookupFilter,
    ) -> Result<Vec<ResourceRef>, OrchestrationError> {
        let records = self.describe(kind, name, filter).await?;
        debug!(kind = %kind, name = %name, count = records.len(), "Located resources");
        Ok(records
            .into_iter()
            .map(|r| ResourceRef::new(kind, name, r.id))
            .collect())
    }

    async fn describe(
        &self,
        kind: ResourceKind,
        name: &str,
        filter: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, OrchestrationError> {
        self.provider
            .describe(kind, filter)
            .await
            .map_err(|source| OrchestrationError::Provision {
                action: "describe",
                kind,
                name: name.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockCloudProvider, ProviderError};
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_locate_single_match() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_describe()
            .with(
                eq(ResourceKind::Subnet),
                eq(LookupFilter::NameTag("public-1".to_string())),
            )
            .times(1)
            .returning(|_, _| Ok(vec![ResourceRecord::new("subnet-0a1")]));

        let found = Locator::new(&provider)
            .locate(ResourceKind::Subnet, "public-1")
            .await
            .unwrap();
        assert_eq!(found, ResourceRef::new(ResourceKind::Subnet, "public-1", "subnet-0a1"));
    }

    #[tokio::test]
    async fn test_native_name_kinds_use_native_filter() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_describe()
            .with(
                eq(ResourceKind::LoadBalancer),
                eq(LookupFilter::NativeName("web-alb".to_string())),
            )
            .returning(|_, _| Ok(vec![ResourceRecord::new("arn:aws:lb/web-alb")]));

        let found = Locator::new(&provider)
            .locate(ResourceKind::LoadBalancer, "web-alb")
            .await
            .unwrap();
        assert_eq!(found.id, "arn:aws:lb/web-alb");
    }

    #[tokio::test]
    async fn test_zero_matches_is_not_found() {
        let mut provider = MockCloudProvider::new();
        provider.expect_describe().returning(|_, _| Ok(vec![]));

        let err = Locator::new(&provider)
            .locate(ResourceKind::Vpc, "web-vpc")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::NotFound { kind: ResourceKind::Vpc, ref name } if name == "web-vpc"
        ));
    }

    #[tokio::test]
    async fn test_multiple_matches_is_ambiguous() {
        let mut provider = MockCloudProvider::new();
        provider.expect_describe().returning(|_, _| {
            Ok(vec![
                ResourceRecord::new("sg-1"),
                ResourceRecord::new("sg-2"),
            ])
        });

        let err = Locator::new(&provider)
            .locate(ResourceKind::SecurityGroup, "web-alb-sg")
            .await
            .unwrap_err();
        match err {
            OrchestrationError::AmbiguousResult { ids, .. } => {
                assert_eq!(ids, vec!["sg-1".to_string(), "sg-2".to_string()]);
            }
            other => panic!("expected AmbiguousResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_describe_failure_is_provision_error() {
        let mut provider = MockCloudProvider::new();
        provider.expect_describe().returning(|_, _| {
            Err(ProviderError::Throttled {
                operation: "DescribeVpcs",
            })
        });

        let err = Locator::new(&provider)
            .locate(ResourceKind::Vpc, "web-vpc")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Provision {
                action: "describe",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_locate_child_and_all() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_describe()
            .with(
                eq(ResourceKind::IngressRule),
                eq(LookupFilter::Parent("sg-1".to_string())),
            )
            .returning(|_, _| {
                Ok(vec![
                    ResourceRecord::new("sg-1|sgr-1"),
                    ResourceRecord::new("sg-1|sgr-2"),
                ])
            });

        let locator = Locator::new(&provider);
        let rules = locator
            .locate_all(
                ResourceKind::IngressRule,
                "rules of web-app-sg",
                &LookupFilter::Parent("sg-1".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(rules.len(), 2);

        let err = locator
            .locate_child(ResourceKind::IngressRule, "rules of web-app-sg", "sg-1")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::AmbiguousResult { .. }));
    }
}
