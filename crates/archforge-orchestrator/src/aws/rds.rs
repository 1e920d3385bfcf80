//! RDS subnet group and database instance

use crate::aws::context::AwsContext;
use crate::aws::error::{required, sdk_error, unsupported};
use crate::provider::{DbInstanceRequest, LookupFilter, ProviderError, ResourceRecord, ResourceTags};
use archforge_common::ResourceKind;
use aws_sdk_rds::Client;
use aws_sdk_rds::types::{DbInstance, Tag};
use tracing::{debug, info};

/// RDS client
pub struct RdsClient {
    client: Client,
}

fn rds_tags(tags: &[(String, String)]) -> Vec<Tag> {
    tags.iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect()
}

fn instance_record(instance: &DbInstance) -> Option<ResourceRecord> {
    let mut record = ResourceRecord::new(instance.db_instance_identifier()?);
    if let Some(status) = instance.db_instance_status() {
        record = record.with_status(status);
    }
    if let Some(arn) = instance.db_instance_arn() {
        record = record.with_field("arn", arn);
    }
    if let Some(address) = instance.endpoint().and_then(|e| e.address()) {
        record = record.with_field("endpoint", address);
    }
    Some(record)
}

impl RdsClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.rds_client(),
        }
    }

    /// Create a DB subnet group; subnet groups are identified by name
    pub async fn create_subnet_group(
        &self,
        name: &str,
        description: &str,
        subnet_ids: &[String],
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        const OP: &str = "CreateDBSubnetGroup";
        let response = self
            .client
            .create_db_subnet_group()
            .db_subnet_group_name(name)
            .db_subnet_group_description(description)
            .set_subnet_ids(Some(subnet_ids.to_vec()))
            .set_tags(Some(rds_tags(&tags.pairs())))
            .send()
            .await
            .map_err(sdk_error(OP))?;

        let group = required(response.db_subnet_group(), OP, "db_subnet_group")?;
        info!(name = %name, subnets = subnet_ids.len(), "Created DB subnet group");

        let mut record = ResourceRecord::new(name);
        if let Some(status) = group.subnet_group_status() {
            record = record.with_status(status);
        }
        if let Some(arn) = group.db_subnet_group_arn() {
            record = record.with_field("arn", arn);
        }
        Ok(record)
    }

    pub async fn describe_subnet_groups(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let name = match by {
            LookupFilter::NativeName(name) | LookupFilter::Id(name) => name,
            _ => return Err(unsupported(ResourceKind::DbSubnetGroup)),
        };
        let response = self
            .client
            .describe_db_subnet_groups()
            .db_subnet_group_name(name)
            .send()
            .await
            .map_err(sdk_error("DescribeDBSubnetGroups"))?;

        Ok(response
            .db_subnet_groups()
            .iter()
            .filter_map(|group| {
                let mut record = ResourceRecord::new(group.db_subnet_group_name()?);
                if let Some(status) = group.subnet_group_status() {
                    record = record.with_status(status);
                }
                if let Some(arn) = group.db_subnet_group_arn() {
                    record = record.with_field("arn", arn);
                }
                Some(record)
            })
            .collect())
    }

    pub async fn delete_subnet_group(&self, name: &str) -> Result<(), ProviderError> {
        self.client
            .delete_db_subnet_group()
            .db_subnet_group_name(name)
            .send()
            .await
            .map_err(sdk_error("DeleteDBSubnetGroup"))?;
        info!(name = %name, "Deleted DB subnet group");
        Ok(())
    }

    /// Create the database; instances are identified by their identifier
    pub async fn create_instance(
        &self,
        request: &DbInstanceRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        const OP: &str = "CreateDBInstance";
        info!(
            identifier = %request.identifier,
            engine = %request.engine,
            class = %request.instance_class,
            multi_az = request.multi_az,
            "Creating database instance"
        );
        let response = self
            .client
            .create_db_instance()
            .db_instance_identifier(&request.identifier)
            .db_name(&request.db_name)
            .engine(&request.engine)
            .storage_type(&request.storage_type)
            .allocated_storage(request.allocated_storage)
            .db_instance_class(&request.instance_class)
            .multi_az(request.multi_az)
            .master_username(&request.master_username)
            .master_user_password(request.master_password.expose())
            .db_subnet_group_name(&request.subnet_group_name)
            .vpc_security_group_ids(&request.security_group_id)
            .set_tags(Some(rds_tags(&tags.pairs())))
            .send()
            .await
            .map_err(sdk_error(OP))?;

        let instance = required(response.db_instance(), OP, "db_instance")?;
        required(instance_record(instance), OP, "db_instance_identifier")
    }

    pub async fn describe_instances(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let identifier = match by {
            LookupFilter::NativeName(name) | LookupFilter::Id(name) => name,
            _ => return Err(unsupported(ResourceKind::DbInstance)),
        };
        let response = self
            .client
            .describe_db_instances()
            .db_instance_identifier(identifier)
            .send()
            .await
            .map_err(sdk_error("DescribeDBInstances"))?;

        Ok(response
            .db_instances()
            .iter()
            .filter_map(instance_record)
            .collect())
    }

    /// Delete the database without a final snapshot
    pub async fn delete_instance(&self, identifier: &str) -> Result<(), ProviderError> {
        self.client
            .delete_db_instance()
            .db_instance_identifier(identifier)
            .skip_final_snapshot(true)
            .delete_automated_backups(true)
            .send()
            .await
            .map_err(sdk_error("DeleteDBInstance"))?;
        info!(identifier = %identifier, "Requested database deletion");
        Ok(())
    }

    /// Tag a subnet group or instance, resolving its ARN first
    pub async fn tag(
        &self,
        kind: ResourceKind,
        name: &str,
        tags: &[(String, String)],
    ) -> Result<(), ProviderError> {
        const OP: &str = "AddTagsToResource";
        let filter = LookupFilter::Id(name.to_string());
        let records = match kind {
            ResourceKind::DbSubnetGroup => self.describe_subnet_groups(&filter).await?,
            _ => self.describe_instances(&filter).await?,
        };
        let arn = records.first().and_then(|r| r.field("arn"));
        let arn = required(arn, OP, "arn")?;

        self.client
            .add_tags_to_resource()
            .resource_name(arn)
            .set_tags(Some(rds_tags(tags)))
            .send()
            .await
            .map_err(sdk_error(OP))?;
        debug!(arn = %arn, "Tagged RDS resource");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_rds::types::Endpoint;

    #[test]
    fn test_instance_record() {
        let instance = DbInstance::builder()
            .db_instance_identifier("web-db")
            .db_instance_status("backing-up")
            .db_instance_arn("arn:aws:rds:us-east-1:123456789012:db:web-db")
            .endpoint(Endpoint::builder().address("web-db.abc.us-east-1.rds.amazonaws.com").build())
            .build();
        let record = instance_record(&instance).unwrap();
        assert_eq!(record.id, "web-db");
        assert_eq!(record.status.as_deref(), Some("backing-up"));
        assert!(record.field("arn").is_some());
        assert!(record.field("endpoint").unwrap().starts_with("web-db."));
    }
}
