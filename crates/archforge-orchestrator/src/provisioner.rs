//! Create, tag and delete resources through the provider
//!
//! Each call maps to exactly one provider request. Failures are surfaced
//! as [`OrchestrationError::Provision`] and never retried, since repeating
//! a create call against a non-idempotent API risks duplicate resources.

use crate::error::OrchestrationError;
use crate::locator::ResourceRef;
use crate::provider::{CloudProvider, CreateRequest, ResourceRecord, ResourceTags};
use archforge_common::tags::format_created_at;
use tracing::{debug, info};

/// A freshly created resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub reference: ResourceRef,
    /// Everything the provider reported back from the create call
    pub record: ResourceRecord,
}

pub struct Provisioner<'a, P> {
    provider: &'a P,
    stack: String,
    run_id: String,
}

impl<'a, P: CloudProvider> Provisioner<'a, P> {
    pub fn new(provider: &'a P, stack: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            provider,
            stack: stack.into(),
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Submit one creation request, tagged with `name` and the run's tag set.
    pub async fn provision(
        &self,
        name: &str,
        request: CreateRequest,
    ) -> Result<Provisioned, OrchestrationError> {
        let kind = request.kind();
        let tags = ResourceTags {
            name: name.to_string(),
            stack: self.stack.clone(),
            run_id: self.run_id.clone(),
            created_at: format_created_at(chrono::Utc::now()),
        };

        info!(kind = %kind, name = %name, "Creating resource");
        let record = self
            .provider
            .create(&request, &tags)
            .await
            .map_err(|source| OrchestrationError::Provision {
                action: "create",
                kind,
                name: name.to_string(),
                source,
            })?;
        info!(kind = %kind, name = %name, id = %record.id, "Created resource");

        Ok(Provisioned {
            reference: ResourceRef::new(kind, name, record.id.clone()),
            record,
        })
    }

    /// Flip the lifecycle tag to `active` once the owning stage has finished.
    ///
    /// No-op for kinds that do not carry tags.
    pub async fn activate(&self, reference: &ResourceRef) -> Result<(), OrchestrationError> {
        if !reference.kind.supports_tags() {
            return Ok(());
        }
        self.provider
            .tag(reference.kind, &reference.id, &ResourceTags::active_status())
            .await
            .map_err(|source| OrchestrationError::Provision {
                action: "tag",
                kind: reference.kind,
                name: reference.name.clone(),
                source,
            })?;
        debug!(resource = %reference, "Marked resource active");
        Ok(())
    }

    /// Request deletion of a located resource.
    pub async fn delete(&self, reference: &ResourceRef) -> Result<(), OrchestrationError> {
        info!(resource = %reference, "Deleting resource");
        self.provider
            .delete(reference.kind, &reference.id)
            .await
            .map_err(|source| OrchestrationError::Provision {
                action: "delete",
                kind: reference.kind,
                name: reference.name.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockCloudProvider, ProviderError};
    use archforge_common::ResourceKind;

    #[tokio::test]
    async fn test_provision_tags_and_returns_reference() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_create()
            .withf(|request, tags| {
                request == &CreateRequest::ElasticIp
                    && tags.name == "web-eip"
                    && tags.stack == "web"
                    && tags.run_id == "run-1"
            })
            .times(1)
            .returning(|_, _| Ok(ResourceRecord::new("eipalloc-1")));

        let provisioner = Provisioner::new(&provider, "web", "run-1");
        let created = provisioner
            .provision("web-eip", CreateRequest::ElasticIp)
            .await
            .unwrap();
        assert_eq!(
            created.reference,
            ResourceRef::new(ResourceKind::ElasticIp, "web-eip", "eipalloc-1")
        );
    }

    #[tokio::test]
    async fn test_create_failure_is_not_retried() {
        let mut provider = MockCloudProvider::new();
        provider.expect_create().times(1).returning(|_, _| {
            Err(ProviderError::Sdk {
                operation: "AllocateAddress",
                code: Some("AddressLimitExceeded".to_string()),
                message: "limit".to_string(),
            })
        });

        let err = Provisioner::new(&provider, "web", "run-1")
            .provision("web-eip", CreateRequest::ElasticIp)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Provision {
                action: "create",
                kind: ResourceKind::ElasticIp,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_activate_skips_untagged_kinds() {
        let mut provider = MockCloudProvider::new();
        provider.expect_tag().never();

        let provisioner = Provisioner::new(&provider, "web", "run-1");
        let policy = ResourceRef::new(ResourceKind::ScalingPolicy, "cpu-out", "arn:policy");
        provisioner.activate(&policy).await.unwrap();
    }

    #[tokio::test]
    async fn test_activate_flips_status_tag() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_tag()
            .withf(|kind, id, tags| {
                *kind == ResourceKind::Vpc
                    && id == "vpc-1"
                    && tags == ResourceTags::active_status().as_slice()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let provisioner = Provisioner::new(&provider, "web", "run-1");
        provisioner
            .activate(&ResourceRef::new(ResourceKind::Vpc, "web-vpc", "vpc-1"))
            .await
            .unwrap();
    }
}
