//! Auto-scaling group, scaling policies and notification wiring

use crate::aws::context::AwsContext;
use crate::aws::error::{build_error, required, sdk_error, unsupported};
use crate::provider::{
    AutoScalingGroupRequest, LookupFilter, NotificationRequest, ProviderError, ResourceRecord,
    ResourceTags, ScalingPolicyRequest, compound_id, split_compound_id,
};
use archforge_common::ResourceKind;
use archforge_common::tags::TAG_NAME;
use aws_sdk_autoscaling::Client;
use aws_sdk_autoscaling::types::{LaunchTemplateSpecification, ScalingPolicy, Tag};
use tracing::{debug, info};

/// Tag resource type for auto-scaling groups
const GROUP_RESOURCE_TYPE: &str = "auto-scaling-group";

/// Launch template version every new instance uses
const LATEST_VERSION: &str = "$Latest";

/// Auto Scaling client
pub struct AutoScalingClient {
    client: Client,
}

/// Build the group's tags; only `Name` is propagated to instances.
fn group_tags(
    operation: &'static str,
    group_name: &str,
    tags: &[(String, String)],
    propagate_name: bool,
) -> Result<Vec<Tag>, ProviderError> {
    tags.iter()
        .map(|(k, v)| {
            Tag::builder()
                .resource_id(group_name)
                .resource_type(GROUP_RESOURCE_TYPE)
                .key(k)
                .value(v)
                .propagate_at_launch(propagate_name && k == TAG_NAME)
                .build()
                .map_err(build_error(operation))
        })
        .collect()
}

/// Group and policy names embedded in a scaling policy ARN
///
/// `arn:aws:autoscaling:<region>:<account>:scalingPolicy:<uuid>:autoScalingGroupName/<group>:policyName/<policy>`
pub fn parse_policy_arn(arn: &str) -> Option<(&str, &str)> {
    let (rest, policy) = arn.rsplit_once(":policyName/")?;
    let (_, group) = rest.rsplit_once(":autoScalingGroupName/")?;
    Some((group, policy))
}

fn policy_record(policy: &ScalingPolicy) -> Option<ResourceRecord> {
    let mut record = ResourceRecord::new(policy.policy_arn()?);
    if let Some(name) = policy.policy_name() {
        record = record.with_field("name", name);
    }
    if let Some(group) = policy.auto_scaling_group_name() {
        record = record.with_field("auto_scaling_group_name", group);
    }
    Some(record)
}

impl AutoScalingClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.autoscaling_client(),
        }
    }

    /// Create the group from the launch template and turn on group metrics.
    ///
    /// The group is identified by its name. Instances it launches are
    /// tagged with the request's instance name.
    pub async fn create_group(
        &self,
        request: &AutoScalingGroupRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        const OP: &str = "CreateAutoScalingGroup";
        let mut pairs = tags.pairs();
        if let Some(name) = pairs.iter_mut().find(|(k, _)| k == TAG_NAME) {
            name.1 = request.instance_name.clone();
        }

        self.client
            .create_auto_scaling_group()
            .auto_scaling_group_name(&request.name)
            .launch_template(
                LaunchTemplateSpecification::builder()
                    .launch_template_id(&request.launch_template_id)
                    .version(LATEST_VERSION)
                    .build(),
            )
            .min_size(request.min_size)
            .max_size(request.max_size)
            .desired_capacity(request.desired_capacity)
            .default_cooldown(request.default_cooldown)
            .target_group_arns(&request.target_group_arn)
            .health_check_type(&request.health_check_type)
            .health_check_grace_period(request.health_check_grace_period)
            .vpc_zone_identifier(request.subnet_ids.join(","))
            .set_termination_policies(Some(request.termination_policies.clone()))
            .new_instances_protected_from_scale_in(request.protect_from_scale_in)
            .set_tags(Some(group_tags(OP, &request.name, &pairs, true)?))
            .send()
            .await
            .map_err(sdk_error(OP))?;
        info!(name = %request.name, min = request.min_size, max = request.max_size, "Created auto-scaling group");

        self.client
            .enable_metrics_collection()
            .auto_scaling_group_name(&request.name)
            .granularity(&request.metrics_granularity)
            .set_metrics(Some(request.metrics.clone()))
            .send()
            .await
            .map_err(sdk_error("EnableMetricsCollection"))?;
        debug!(name = %request.name, metrics = request.metrics.len(), "Enabled group metrics collection");

        Ok(ResourceRecord::new(&request.name))
    }

    pub async fn describe_groups(&self, by: &LookupFilter) -> Result<Vec<ResourceRecord>, ProviderError> {
        let name = match by {
            LookupFilter::NativeName(name) | LookupFilter::Id(name) => name,
            _ => return Err(unsupported(ResourceKind::AutoScalingGroup)),
        };
        let response = self
            .client
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(name)
            .send()
            .await
            .map_err(sdk_error("DescribeAutoScalingGroups"))?;

        Ok(response
            .auto_scaling_groups()
            .iter()
            .filter_map(|group| {
                let mut record = ResourceRecord::new(group.auto_scaling_group_name()?);
                // Only set while the group is being deleted
                if let Some(status) = group.status() {
                    record = record.with_status(status);
                }
                if let Some(desired) = group.desired_capacity() {
                    record = record.with_field("desired_capacity", desired.to_string());
                }
                Some(record.with_field("instances", group.instances().len().to_string()))
            })
            .collect())
    }

    /// Delete the group along with any instances it still runs
    pub async fn delete_group(&self, name: &str) -> Result<(), ProviderError> {
        self.client
            .delete_auto_scaling_group()
            .auto_scaling_group_name(name)
            .force_delete(true)
            .send()
            .await
            .map_err(sdk_error("DeleteAutoScalingGroup"))?;
        info!(name = %name, "Requested auto-scaling group deletion");
        Ok(())
    }

    pub async fn tag_group(&self, name: &str, tags: &[(String, String)]) -> Result<(), ProviderError> {
        const OP: &str = "CreateOrUpdateTags";
        self.client
            .create_or_update_tags()
            .set_tags(Some(group_tags(OP, name, tags, false)?))
            .send()
            .await
            .map_err(sdk_error(OP))?;
        Ok(())
    }

    /// Create a simple scaling policy; policies are identified by ARN
    pub async fn put_policy(&self, request: &ScalingPolicyRequest) -> Result<ResourceRecord, ProviderError> {
        const OP: &str = "PutScalingPolicy";
        let response = self
            .client
            .put_scaling_policy()
            .auto_scaling_group_name(&request.auto_scaling_group_name)
            .policy_name(&request.name)
            .policy_type(&request.policy_type)
            .adjustment_type(&request.adjustment_type)
            .scaling_adjustment(request.scaling_adjustment)
            .cooldown(request.cooldown)
            .send()
            .await
            .map_err(sdk_error(OP))?;

        let arn = required(response.policy_arn(), OP, "policy_arn")?;
        info!(
            name = %request.name,
            group = %request.auto_scaling_group_name,
            adjustment = request.scaling_adjustment,
            "Created scaling policy"
        );
        Ok(ResourceRecord::new(arn)
            .with_field("name", &request.name)
            .with_field("auto_scaling_group_name", &request.auto_scaling_group_name))
    }

    pub async fn describe_policies(&self, by: &LookupFilter) -> Result<Vec<ResourceRecord>, ProviderError> {
        const OP: &str = "DescribePolicies";
        let request = self.client.describe_policies();
        let request = match by {
            LookupFilter::NativeName(name) => request.policy_names(name),
            LookupFilter::Parent(group) => request.auto_scaling_group_name(group),
            LookupFilter::Id(arn) => {
                let (group, policy) = parse_policy_arn(arn).ok_or_else(|| ProviderError::InvalidRequest {
                    operation: OP,
                    message: format!("'{arn}' is not a scaling policy ARN"),
                })?;
                request.auto_scaling_group_name(group).policy_names(policy)
            }
            LookupFilter::NameTag(_) => return Err(unsupported(ResourceKind::ScalingPolicy)),
        };
        let response = request.send().await.map_err(sdk_error(OP))?;

        Ok(response
            .scaling_policies()
            .iter()
            .filter_map(policy_record)
            .collect())
    }

    pub async fn delete_policy(&self, arn: &str) -> Result<(), ProviderError> {
        // DeletePolicy accepts the policy ARN in place of its name
        self.client
            .delete_policy()
            .policy_name(arn)
            .send()
            .await
            .map_err(sdk_error("DeletePolicy"))?;
        info!(arn = %arn, "Deleted scaling policy");
        Ok(())
    }

    /// Send the group's scaling events to a topic; identified as `group|topic`
    pub async fn put_notification(&self, request: &NotificationRequest) -> Result<ResourceRecord, ProviderError> {
        self.client
            .put_notification_configuration()
            .auto_scaling_group_name(&request.auto_scaling_group_name)
            .topic_arn(&request.topic_arn)
            .set_notification_types(Some(request.notification_types.clone()))
            .send()
            .await
            .map_err(sdk_error("PutNotificationConfiguration"))?;

        info!(
            group = %request.auto_scaling_group_name,
            topic = %request.topic_arn,
            types = request.notification_types.len(),
            "Configured auto-scaling notifications"
        );
        Ok(ResourceRecord::new(compound_id(&[
            request.auto_scaling_group_name.as_str(),
            request.topic_arn.as_str(),
        ])))
    }

    /// Notification wiring of a group (by group name), or one `group|topic` pair
    pub async fn describe_notifications(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        const OP: &str = "DescribeNotificationConfigurations";
        let (group, topic) = match by {
            LookupFilter::Parent(group) => (group.as_str(), None),
            LookupFilter::Id(id) => {
                let [group, topic] = split_compound_id::<2>(id).ok_or_else(|| ProviderError::InvalidRequest {
                    operation: OP,
                    message: format!("'{id}' is not a group|topic identifier"),
                })?;
                (group, Some(topic))
            }
            _ => return Err(unsupported(ResourceKind::NotificationConfiguration)),
        };

        let response = self
            .client
            .describe_notification_configurations()
            .auto_scaling_group_names(group)
            .send()
            .await
            .map_err(sdk_error(OP))?;

        let mut records: Vec<ResourceRecord> = Vec::new();
        for configuration in response.notification_configurations() {
            let Some(topic_arn) = configuration.topic_arn() else {
                continue;
            };
            if topic.is_some_and(|t| t != topic_arn) {
                continue;
            }
            let id = compound_id(&[group, topic_arn]);
            // One configuration entry is reported per notification type
            match records.iter_mut().find(|r| r.id == id) {
                Some(record) => {
                    if let Some(kind) = configuration.notification_type() {
                        let types = record.fields.entry("notification_types".to_string()).or_default();
                        types.push(',');
                        types.push_str(kind);
                    }
                }
                None => {
                    let mut record = ResourceRecord::new(id);
                    if let Some(kind) = configuration.notification_type() {
                        record = record.with_field("notification_types", kind);
                    }
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    pub async fn delete_notification(&self, id: &str) -> Result<(), ProviderError> {
        const OP: &str = "DeleteNotificationConfiguration";
        let [group, topic] = split_compound_id::<2>(id).ok_or_else(|| ProviderError::InvalidRequest {
            operation: OP,
            message: format!("'{id}' is not a group|topic identifier"),
        })?;
        self.client
            .delete_notification_configuration()
            .auto_scaling_group_name(group)
            .topic_arn(topic)
            .send()
            .await
            .map_err(sdk_error(OP))?;
        info!(group = %group, topic = %topic, "Removed auto-scaling notifications");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy_arn() {
        let arn = "arn:aws:autoscaling:us-east-1:123456789012:scalingPolicy:\
                   c322761b-3172-4d56-9a21-0ed9d6161d67:autoScalingGroupName/web-asg:\
                   policyName/web-cpu-scale-out";
        assert_eq!(parse_policy_arn(arn), Some(("web-asg", "web-cpu-scale-out")));
        assert_eq!(parse_policy_arn("web-cpu-scale-out"), None);
    }

    #[test]
    fn test_only_name_tag_propagates() {
        let pairs = vec![
            ("Name".to_string(), "web-server".to_string()),
            ("archforge:stack".to_string(), "web".to_string()),
        ];
        let tags = group_tags("CreateAutoScalingGroup", "web-asg", &pairs, true).unwrap();
        assert_eq!(tags[0].propagate_at_launch(), Some(true));
        assert_eq!(tags[1].propagate_at_launch(), Some(false));
        assert_eq!(tags[1].resource_id(), Some("web-asg"));

        let updates = group_tags("CreateOrUpdateTags", "web-asg", &pairs, false).unwrap();
        assert!(updates.iter().all(|t| t.propagate_at_launch() == Some(false)));
    }
}
