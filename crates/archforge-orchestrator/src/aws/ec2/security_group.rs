//! Security groups and their ingress rules

use super::{Ec2Client, ec2_tag_spec, filter, name_filter};
use crate::aws::error::{required, sdk_error, unsupported};
use crate::provider::{
    IngressRuleRequest, LookupFilter, ProviderError, ResourceRecord, ResourceTags, RuleSource,
    compound_id, split_compound_id,
};
use archforge_common::ResourceKind;
use aws_sdk_ec2::types::{IpPermission, IpRange, ResourceType, SecurityGroupRule, UserIdGroupPair};
use tracing::{debug, info};

impl Ec2Client {
    pub async fn create_security_group(
        &self,
        vpc_id: &str,
        group_name: &str,
        description: &str,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        info!(name = %group_name, vpc_id = %vpc_id, "Creating security group");
        let response = self
            .client
            .create_security_group()
            .group_name(group_name)
            .description(description)
            .vpc_id(vpc_id)
            .tag_specifications(ec2_tag_spec(ResourceType::SecurityGroup, tags))
            .send()
            .await
            .map_err(sdk_error("CreateSecurityGroup"))?;

        let sg_id = required(response.group_id(), "CreateSecurityGroup", "group_id")?;
        info!(sg_id = %sg_id, "Created security group");
        Ok(ResourceRecord::new(sg_id)
            .with_field("group_name", group_name)
            .with_field("vpc_id", vpc_id))
    }

    pub async fn describe_security_groups(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_security_groups();
        let request = match by {
            LookupFilter::NameTag(name) => request.filters(name_filter(name)),
            LookupFilter::NativeName(name) => request.filters(filter("group-name", name)),
            LookupFilter::Id(id) => request.group_ids(id),
            LookupFilter::Parent(_) => return Err(unsupported(ResourceKind::SecurityGroup)),
        };
        let response = request
            .send()
            .await
            .map_err(sdk_error("DescribeSecurityGroups"))?;

        Ok(response
            .security_groups()
            .iter()
            .filter_map(|sg| {
                let mut record = ResourceRecord::new(sg.group_id()?);
                if let Some(name) = sg.group_name() {
                    record = record.with_field("group_name", name);
                }
                if let Some(vpc_id) = sg.vpc_id() {
                    record = record.with_field("vpc_id", vpc_id);
                }
                Some(record)
            })
            .collect())
    }

    pub async fn delete_security_group(&self, sg_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete_security_group()
            .group_id(sg_id)
            .send()
            .await
            .map_err(sdk_error("DeleteSecurityGroup"))?;
        info!(sg_id = %sg_id, "Deleted security group");
        Ok(())
    }

    /// Authorize one ingress rule; rules are identified as `sg|sgr`
    pub async fn authorize_ingress(
        &self,
        request: &IngressRuleRequest,
    ) -> Result<ResourceRecord, ProviderError> {
        let permission = IpPermission::builder()
            .ip_protocol(&request.protocol)
            .from_port(request.from_port)
            .to_port(request.to_port);
        let permission = match &request.source {
            RuleSource::Cidr(cidr) => permission.ip_ranges(
                IpRange::builder()
                    .cidr_ip(cidr)
                    .description(&request.description)
                    .build(),
            ),
            RuleSource::SecurityGroup(source_id) => permission.user_id_group_pairs(
                UserIdGroupPair::builder()
                    .group_id(source_id)
                    .description(&request.description)
                    .build(),
            ),
        };

        let response = self
            .client
            .authorize_security_group_ingress()
            .group_id(&request.group_id)
            .ip_permissions(permission.build())
            .send()
            .await
            .map_err(sdk_error("AuthorizeSecurityGroupIngress"))?;

        let rule_id = response
            .security_group_rules()
            .first()
            .and_then(|rule| rule.security_group_rule_id());
        let rule_id = required(rule_id, "AuthorizeSecurityGroupIngress", "security_group_rule_id")?;

        info!(
            sg_id = %request.group_id,
            rule_id = %rule_id,
            port = request.from_port,
            source = ?request.source,
            "Authorized ingress rule"
        );
        Ok(ResourceRecord::new(compound_id(&[request.group_id.as_str(), rule_id])))
    }

    /// Ingress rules of a group (by group ID), or one rule by `sg|sgr`
    pub async fn describe_ingress_rules(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_security_group_rules();
        let request = match by {
            LookupFilter::Parent(sg_id) => request.filters(filter("group-id", sg_id)),
            LookupFilter::Id(id) => {
                let [_, rule_id] = rule_parts("DescribeSecurityGroupRules", id)?;
                request.security_group_rule_ids(rule_id)
            }
            _ => return Err(unsupported(ResourceKind::IngressRule)),
        };
        let response = request
            .send()
            .await
            .map_err(sdk_error("DescribeSecurityGroupRules"))?;

        let rules: Vec<ResourceRecord> = response
            .security_group_rules()
            .iter()
            .filter(|rule| rule.is_egress() != Some(true))
            .filter_map(rule_record)
            .collect();
        debug!(filter = %by, count = rules.len(), "Described ingress rules");
        Ok(rules)
    }

    pub async fn revoke_ingress(&self, id: &str) -> Result<(), ProviderError> {
        let [sg_id, rule_id] = rule_parts("RevokeSecurityGroupIngress", id)?;
        self.client
            .revoke_security_group_ingress()
            .group_id(sg_id)
            .security_group_rule_ids(rule_id)
            .send()
            .await
            .map_err(sdk_error("RevokeSecurityGroupIngress"))?;
        info!(sg_id = %sg_id, rule_id = %rule_id, "Revoked ingress rule");
        Ok(())
    }
}

fn rule_record(rule: &SecurityGroupRule) -> Option<ResourceRecord> {
    let id = compound_id(&[rule.group_id()?, rule.security_group_rule_id()?]);
    let mut record = ResourceRecord::new(id);
    if let Some(port) = rule.from_port() {
        record = record.with_field("from_port", port.to_string());
    }
    if let Some(cidr) = rule.cidr_ipv4() {
        record = record.with_field("source", cidr);
    } else if let Some(group) = rule.referenced_group_info().and_then(|g| g.group_id()) {
        record = record.with_field("source", group);
    }
    Some(record)
}

fn rule_parts<'a>(operation: &'static str, id: &'a str) -> Result<[&'a str; 2], ProviderError> {
    split_compound_id::<2>(id).ok_or_else(|| ProviderError::InvalidRequest {
        operation,
        message: format!("'{id}' is not a group|rule identifier"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_record_uses_compound_id() {
        let rule = SecurityGroupRule::builder()
            .group_id("sg-1")
            .security_group_rule_id("sgr-9")
            .from_port(443)
            .cidr_ipv4("0.0.0.0/0")
            .is_egress(false)
            .build();
        let record = rule_record(&rule).unwrap();
        assert_eq!(record.id, "sg-1|sgr-9");
        assert_eq!(record.field("from_port"), Some("443"));
        assert_eq!(record.field("source"), Some("0.0.0.0/0"));
    }

    #[test]
    fn test_rule_without_id_is_skipped() {
        let rule = SecurityGroupRule::builder().group_id("sg-1").build();
        assert!(rule_record(&rule).is_none());
    }
}
