//! EC2 resources: network, security groups and instances

mod instance;
mod network;
mod security_group;

use crate::aws::context::AwsContext;
use crate::provider::{ProviderError, ResourceTags};
use archforge_common::tags::TAG_NAME;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{Filter, ResourceType, Tag, TagSpecification};
use tracing::debug;

use super::error::sdk_error;

/// EC2 client for the network, security group and compute stages
pub struct Ec2Client {
    pub(crate) client: Client,
}

impl Ec2Client {
    /// Create an EC2 client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
        }
    }

    /// Add or overwrite tags on any EC2 resource
    pub async fn tag_resource(
        &self,
        resource_id: &str,
        tags: &[(String, String)],
    ) -> Result<(), ProviderError> {
        self.client
            .create_tags()
            .resources(resource_id)
            .set_tags(Some(ec2_tags(tags)))
            .send()
            .await
            .map_err(sdk_error("CreateTags"))?;
        debug!(resource_id = %resource_id, count = tags.len(), "Tagged EC2 resource");
        Ok(())
    }
}

fn ec2_tags(tags: &[(String, String)]) -> Vec<Tag> {
    tags.iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect()
}

/// Build an EC2 TagSpecification carrying the full archforge tag set.
pub(crate) fn ec2_tag_spec(resource_type: ResourceType, tags: &ResourceTags) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(resource_type)
        .set_tags(Some(ec2_tags(&tags.pairs())))
        .build()
}

/// Filter matching resources whose `Name` tag equals `name`
pub(crate) fn name_filter(name: &str) -> Filter {
    Filter::builder()
        .name(format!("tag:{TAG_NAME}"))
        .values(name)
        .build()
}

pub(crate) fn filter(name: &str, value: &str) -> Filter {
    Filter::builder().name(name).values(value).build()
}

/// Value of the `Name` tag, if present
pub(crate) fn name_tag(tags: &[Tag]) -> Option<&str> {
    tags.iter()
        .find(|t| t.key() == Some(TAG_NAME))
        .and_then(|t| t.value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_spec_carries_name_and_status() {
        let tags = ResourceTags {
            name: "web-vpc".to_string(),
            stack: "web".to_string(),
            run_id: "run-1".to_string(),
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
        };
        let spec = ec2_tag_spec(ResourceType::Vpc, &tags);
        assert_eq!(spec.resource_type(), Some(&ResourceType::Vpc));
        assert_eq!(name_tag(spec.tags()), Some("web-vpc"));
        assert!(
            spec.tags()
                .iter()
                .any(|t| t.key() == Some("archforge:status") && t.value() == Some("creating"))
        );
    }

    #[test]
    fn test_name_filter() {
        let f = name_filter("web-nat");
        assert_eq!(f.name(), Some("tag:Name"));
        assert_eq!(f.values(), ["web-nat".to_string()]);
    }
}
