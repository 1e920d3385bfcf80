//! Web server instances and the auto-scaling launch template

use super::{Ec2Client, ec2_tag_spec, filter, name_filter};
use crate::aws::error::{required, sdk_error, unsupported};
use crate::pipeline::INSTANCE_IDS_FIELD;
use crate::provider::{
    InstancesRequest, LaunchTemplateRequest, LookupFilter, ProviderError, ResourceRecord,
    ResourceTags,
};
use archforge_common::ResourceKind;
use aws_sdk_ec2::types::{
    Filter, Instance, InstanceType, LaunchTemplatesMonitoringRequest, RequestLaunchTemplateData,
    ResourceType,
};
use tracing::info;

/// Instance states still worth finding by name
const LIVE_INSTANCE_STATES: &[&str] = &["pending", "running", "stopping", "stopped", "shutting-down"];

fn instance_record(instance: &Instance) -> Option<ResourceRecord> {
    let mut record = ResourceRecord::new(instance.instance_id()?);
    if let Some(state) = instance.state().and_then(|s| s.name()) {
        record = record.with_status(state.as_str());
    }
    if let Some(ip) = instance.public_ip_address() {
        record = record.with_field("public_ip", ip);
    }
    if let Some(ip) = instance.private_ip_address() {
        record = record.with_field("private_ip", ip);
    }
    Some(record)
}

impl Ec2Client {
    /// Launch `count` identical web servers in one request.
    ///
    /// The returned record is the first instance; every launched ID is
    /// listed in its `instance_ids` field.
    pub async fn run_instances(
        &self,
        request: &InstancesRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        info!(
            count = request.count,
            instance_type = %request.instance_type,
            ami = %request.ami_id,
            "Launching web servers"
        );
        let response = self
            .client
            .run_instances()
            .image_id(&request.ami_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .key_name(&request.key_pair_name)
            .min_count(request.count)
            .max_count(request.count)
            .security_group_ids(&request.security_group_id)
            .subnet_id(&request.subnet_id)
            .tag_specifications(ec2_tag_spec(ResourceType::Instance, tags))
            .send()
            .await
            .map_err(sdk_error("RunInstances"))?;

        let ids: Vec<&str> = response
            .instances()
            .iter()
            .filter_map(|i| i.instance_id())
            .collect();
        let first = required(response.instances().first(), "RunInstances", "instances")?;
        let mut record = required(instance_record(first), "RunInstances", "instance_id")?
            .with_field(INSTANCE_IDS_FIELD, ids.join(","));
        if let Some(reservation) = response.reservation_id() {
            record = record.with_field("reservation_id", reservation);
        }

        info!(instance_ids = ?ids, "Launched web servers");
        Ok(record)
    }

    /// Name lookups skip terminated instances; ID lookups report them so a
    /// termination wait can observe `terminated`.
    pub async fn describe_instances(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_instances();
        let request = match by {
            LookupFilter::NameTag(name) => request.filters(name_filter(name)).filters(
                Filter::builder()
                    .name("instance-state-name")
                    .set_values(Some(
                        LIVE_INSTANCE_STATES.iter().map(|s| s.to_string()).collect(),
                    ))
                    .build(),
            ),
            LookupFilter::Id(id) => request.instance_ids(id),
            _ => return Err(unsupported(ResourceKind::Instance)),
        };
        let response = request
            .send()
            .await
            .map_err(sdk_error("DescribeInstances"))?;

        Ok(response
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter_map(instance_record)
            .collect())
    }

    pub async fn terminate_instance(&self, instance_id: &str) -> Result<(), ProviderError> {
        self.client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(sdk_error("TerminateInstances"))?;
        info!(instance_id = %instance_id, "Requested instance termination");
        Ok(())
    }

    pub async fn create_launch_template(
        &self,
        request: &LaunchTemplateRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        let mut data = RequestLaunchTemplateData::builder()
            .image_id(&request.ami_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .key_name(&request.key_pair_name)
            .security_group_ids(&request.security_group_id)
            .monitoring(
                LaunchTemplatesMonitoringRequest::builder()
                    .enabled(request.detailed_monitoring)
                    .build(),
            );
        if let Some(script) = &request.user_data {
            data = data.user_data(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                script,
            ));
        }

        let response = self
            .client
            .create_launch_template()
            .launch_template_name(&request.name)
            .launch_template_data(data.build())
            .tag_specifications(ec2_tag_spec(ResourceType::LaunchTemplate, tags))
            .send()
            .await
            .map_err(sdk_error("CreateLaunchTemplate"))?;

        let template = required(response.launch_template(), "CreateLaunchTemplate", "launch_template")?;
        let template_id = required(
            template.launch_template_id(),
            "CreateLaunchTemplate",
            "launch_template_id",
        )?;
        info!(template_id = %template_id, name = %request.name, "Created launch template");
        Ok(ResourceRecord::new(template_id).with_field("name", &request.name))
    }

    pub async fn describe_launch_templates(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_launch_templates();
        let request = match by {
            LookupFilter::NativeName(name) => request.filters(filter("launch-template-name", name)),
            LookupFilter::NameTag(name) => request.filters(name_filter(name)),
            LookupFilter::Id(id) => request.launch_template_ids(id),
            LookupFilter::Parent(_) => return Err(unsupported(ResourceKind::LaunchTemplate)),
        };
        let response = request
            .send()
            .await
            .map_err(sdk_error("DescribeLaunchTemplates"))?;

        Ok(response
            .launch_templates()
            .iter()
            .filter_map(|template| {
                let mut record = ResourceRecord::new(template.launch_template_id()?);
                if let Some(name) = template.launch_template_name() {
                    record = record.with_field("name", name);
                }
                if let Some(version) = template.latest_version_number() {
                    record = record.with_field("latest_version", version.to_string());
                }
                Some(record)
            })
            .collect())
    }

    pub async fn delete_launch_template(&self, template_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete_launch_template()
            .launch_template_id(template_id)
            .send()
            .await
            .map_err(sdk_error("DeleteLaunchTemplate"))?;
        info!(template_id = %template_id, "Deleted launch template");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::{InstanceState, InstanceStateName};

    #[test]
    fn test_instance_record_reports_state() {
        let instance = Instance::builder()
            .instance_id("i-0abc")
            .state(InstanceState::builder().name(InstanceStateName::ShuttingDown).build())
            .public_ip_address("203.0.113.7")
            .build();
        let record = instance_record(&instance).unwrap();
        assert_eq!(record.id, "i-0abc");
        assert_eq!(record.status.as_deref(), Some("shutting-down"));
        assert_eq!(record.field("public_ip"), Some("203.0.113.7"));
    }

    #[test]
    fn test_terminated_is_not_a_live_state() {
        assert!(!LIVE_INSTANCE_STATES.contains(&"terminated"));
        assert!(LIVE_INSTANCE_STATES.contains(&InstanceStateName::Running.as_str()));
    }
}
