//! Application load balancer, target group, listener and listener rule

use crate::aws::context::AwsContext;
use crate::aws::error::{build_error, required, sdk_error, unsupported};
use crate::provider::{
    ListenerRequest, ListenerRuleRequest, LoadBalancerRequest, LookupFilter, ProviderError,
    ResourceRecord, ResourceTags, TargetGroupRequest,
};
use archforge_common::ResourceKind;
use aws_sdk_elasticloadbalancingv2::Client;
use aws_sdk_elasticloadbalancingv2::types::{
    Action, ActionTypeEnum, IpAddressType, LoadBalancer, LoadBalancerSchemeEnum,
    LoadBalancerTypeEnum, Matcher, ProtocolEnum, RuleCondition, Tag, TargetGroupAttribute,
    TargetTypeEnum,
};
use tracing::{debug, info};

/// Condition field matched by the listener rule
const PATH_PATTERN_FIELD: &str = "path-pattern";

/// Elastic Load Balancing (v2) client
pub struct ElbClient {
    client: Client,
}

fn elb_tags(operation: &'static str, tags: &[(String, String)]) -> Result<Vec<Tag>, ProviderError> {
    tags.iter()
        .map(|(k, v)| {
            Tag::builder()
                .key(k)
                .value(v)
                .build()
                .map_err(build_error(operation))
        })
        .collect()
}

fn forward_to(operation: &'static str, target_group_arn: &str) -> Result<Action, ProviderError> {
    Action::builder()
        .r#type(ActionTypeEnum::Forward)
        .target_group_arn(target_group_arn)
        .build()
        .map_err(build_error(operation))
}

fn load_balancer_record(lb: &LoadBalancer) -> Option<ResourceRecord> {
    let mut record = ResourceRecord::new(lb.load_balancer_arn()?);
    if let Some(code) = lb.state().and_then(|s| s.code()) {
        record = record.with_status(code.as_str());
    }
    if let Some(dns) = lb.dns_name() {
        record = record.with_field("dns_name", dns);
    }
    if let Some(name) = lb.load_balancer_name() {
        record = record.with_field("name", name);
    }
    Some(record)
}

impl ElbClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.elb_client(),
        }
    }

    pub async fn create_load_balancer(
        &self,
        request: &LoadBalancerRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        const OP: &str = "CreateLoadBalancer";
        let response = self
            .client
            .create_load_balancer()
            .name(&request.name)
            .set_subnets(Some(request.subnet_ids.clone()))
            .security_groups(&request.security_group_id)
            .scheme(LoadBalancerSchemeEnum::from(request.scheme.as_str()))
            .r#type(LoadBalancerTypeEnum::from(request.lb_type.as_str()))
            .ip_address_type(IpAddressType::from(request.ip_address_type.as_str()))
            .set_tags(Some(elb_tags(OP, &tags.pairs())?))
            .send()
            .await
            .map_err(sdk_error(OP))?;

        let lb = required(response.load_balancers().first(), OP, "load_balancers")?;
        let record = required(load_balancer_record(lb), OP, "load_balancer_arn")?;
        info!(
            name = %request.name,
            arn = %record.id,
            dns = ?record.field("dns_name"),
            "Created load balancer"
        );
        Ok(record)
    }

    pub async fn describe_load_balancers(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_load_balancers();
        let request = match by {
            LookupFilter::NativeName(name) => request.names(name),
            LookupFilter::Id(arn) => request.load_balancer_arns(arn),
            _ => return Err(unsupported(ResourceKind::LoadBalancer)),
        };
        let response = request
            .send()
            .await
            .map_err(sdk_error("DescribeLoadBalancers"))?;

        Ok(response
            .load_balancers()
            .iter()
            .filter_map(load_balancer_record)
            .collect())
    }

    pub async fn delete_load_balancer(&self, arn: &str) -> Result<(), ProviderError> {
        self.client
            .delete_load_balancer()
            .load_balancer_arn(arn)
            .send()
            .await
            .map_err(sdk_error("DeleteLoadBalancer"))?;
        info!(arn = %arn, "Requested load balancer deletion");
        Ok(())
    }

    /// Create a target group and apply its attributes
    pub async fn create_target_group(
        &self,
        request: &TargetGroupRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        const OP: &str = "CreateTargetGroup";
        let response = self
            .client
            .create_target_group()
            .name(&request.name)
            .protocol(ProtocolEnum::from(request.protocol.as_str()))
            .port(request.port)
            .vpc_id(&request.vpc_id)
            .target_type(TargetTypeEnum::from(request.target_type.as_str()))
            .health_check_protocol(ProtocolEnum::from(request.health_check_protocol.as_str()))
            .health_check_port(&request.health_check_port)
            .health_check_path(&request.health_check_path)
            .health_check_interval_seconds(request.health_check_interval_seconds)
            .health_check_timeout_seconds(request.health_check_timeout_seconds)
            .healthy_threshold_count(request.healthy_threshold)
            .unhealthy_threshold_count(request.unhealthy_threshold)
            .matcher(Matcher::builder().http_code(&request.matcher_http_code).build())
            .set_tags(Some(elb_tags(OP, &tags.pairs())?))
            .send()
            .await
            .map_err(sdk_error(OP))?;

        let arn = response
            .target_groups()
            .first()
            .and_then(|tg| tg.target_group_arn());
        let arn = required(arn, OP, "target_group_arn")?;
        info!(name = %request.name, arn = %arn, "Created target group");

        if !request.attributes.is_empty() {
            let attributes = request
                .attributes
                .iter()
                .map(|(k, v)| TargetGroupAttribute::builder().key(k).value(v).build())
                .collect();
            self.client
                .modify_target_group_attributes()
                .target_group_arn(arn)
                .set_attributes(Some(attributes))
                .send()
                .await
                .map_err(sdk_error("ModifyTargetGroupAttributes"))?;
            debug!(arn = %arn, count = request.attributes.len(), "Applied target group attributes");
        }

        Ok(ResourceRecord::new(arn).with_field("name", &request.name))
    }

    pub async fn describe_target_groups(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_target_groups();
        let request = match by {
            LookupFilter::NativeName(name) => request.names(name),
            LookupFilter::Id(arn) => request.target_group_arns(arn),
            LookupFilter::Parent(lb_arn) => request.load_balancer_arn(lb_arn),
            LookupFilter::NameTag(_) => return Err(unsupported(ResourceKind::TargetGroup)),
        };
        let response = request
            .send()
            .await
            .map_err(sdk_error("DescribeTargetGroups"))?;

        Ok(response
            .target_groups()
            .iter()
            .filter_map(|tg| {
                let mut record = ResourceRecord::new(tg.target_group_arn()?);
                if let Some(name) = tg.target_group_name() {
                    record = record.with_field("name", name);
                }
                Some(record)
            })
            .collect())
    }

    pub async fn delete_target_group(&self, arn: &str) -> Result<(), ProviderError> {
        self.client
            .delete_target_group()
            .target_group_arn(arn)
            .send()
            .await
            .map_err(sdk_error("DeleteTargetGroup"))?;
        info!(arn = %arn, "Deleted target group");
        Ok(())
    }

    /// Create a listener whose default action forwards to the target group
    pub async fn create_listener(
        &self,
        request: &ListenerRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        const OP: &str = "CreateListener";
        let response = self
            .client
            .create_listener()
            .load_balancer_arn(&request.load_balancer_arn)
            .protocol(ProtocolEnum::from(request.protocol.as_str()))
            .port(request.port)
            .default_actions(forward_to(OP, &request.target_group_arn)?)
            .set_tags(Some(elb_tags(OP, &tags.pairs())?))
            .send()
            .await
            .map_err(sdk_error(OP))?;

        let arn = response.listeners().first().and_then(|l| l.listener_arn());
        let arn = required(arn, OP, "listener_arn")?;
        info!(arn = %arn, port = request.port, "Created listener");
        Ok(ResourceRecord::new(arn).with_field("load_balancer_arn", &request.load_balancer_arn))
    }

    pub async fn describe_listeners(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_listeners();
        let request = match by {
            LookupFilter::Parent(lb_arn) => request.load_balancer_arn(lb_arn),
            LookupFilter::Id(arn) => request.listener_arns(arn),
            _ => return Err(unsupported(ResourceKind::Listener)),
        };
        let response = request
            .send()
            .await
            .map_err(sdk_error("DescribeListeners"))?;

        Ok(response
            .listeners()
            .iter()
            .filter_map(|listener| {
                let mut record = ResourceRecord::new(listener.listener_arn()?);
                if let Some(port) = listener.port() {
                    record = record.with_field("port", port.to_string());
                }
                Some(record)
            })
            .collect())
    }

    pub async fn delete_listener(&self, arn: &str) -> Result<(), ProviderError> {
        self.client
            .delete_listener()
            .listener_arn(arn)
            .send()
            .await
            .map_err(sdk_error("DeleteListener"))?;
        info!(arn = %arn, "Deleted listener");
        Ok(())
    }

    /// Create a path-pattern rule forwarding to the target group
    pub async fn create_rule(
        &self,
        request: &ListenerRuleRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        const OP: &str = "CreateRule";
        let response = self
            .client
            .create_rule()
            .listener_arn(&request.listener_arn)
            .priority(request.priority)
            .conditions(
                RuleCondition::builder()
                    .field(PATH_PATTERN_FIELD)
                    .values(&request.path_pattern)
                    .build(),
            )
            .actions(forward_to(OP, &request.target_group_arn)?)
            .set_tags(Some(elb_tags(OP, &tags.pairs())?))
            .send()
            .await
            .map_err(sdk_error(OP))?;

        let arn = response.rules().first().and_then(|r| r.rule_arn());
        let arn = required(arn, OP, "rule_arn")?;
        info!(arn = %arn, priority = request.priority, path = %request.path_pattern, "Created listener rule");
        Ok(ResourceRecord::new(arn).with_field("listener_arn", &request.listener_arn))
    }

    /// Non-default rules of a listener, or one rule by ARN
    pub async fn describe_rules(&self, by: &LookupFilter) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_rules();
        let request = match by {
            LookupFilter::Parent(listener_arn) => request.listener_arn(listener_arn),
            LookupFilter::Id(arn) => request.rule_arns(arn),
            _ => return Err(unsupported(ResourceKind::ListenerRule)),
        };
        let response = request.send().await.map_err(sdk_error("DescribeRules"))?;

        Ok(response
            .rules()
            .iter()
            .filter(|rule| rule.is_default() != Some(true))
            .filter_map(|rule| {
                let mut record = ResourceRecord::new(rule.rule_arn()?);
                if let Some(priority) = rule.priority() {
                    record = record.with_field("priority", priority);
                }
                Some(record)
            })
            .collect())
    }

    pub async fn delete_rule(&self, arn: &str) -> Result<(), ProviderError> {
        self.client
            .delete_rule()
            .rule_arn(arn)
            .send()
            .await
            .map_err(sdk_error("DeleteRule"))?;
        info!(arn = %arn, "Deleted listener rule");
        Ok(())
    }

    pub async fn add_tags(&self, arn: &str, tags: &[(String, String)]) -> Result<(), ProviderError> {
        const OP: &str = "AddTags";
        self.client
            .add_tags()
            .resource_arns(arn)
            .set_tags(Some(elb_tags(OP, tags)?))
            .send()
            .await
            .map_err(sdk_error(OP))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_elasticloadbalancingv2::types::{LoadBalancerState, LoadBalancerStateEnum};

    #[test]
    fn test_load_balancer_record() {
        let lb = LoadBalancer::builder()
            .load_balancer_arn("arn:aws:elasticloadbalancing:us-east-1:123456789012:loadbalancer/app/web/abc")
            .load_balancer_name("web")
            .dns_name("web-1.us-east-1.elb.amazonaws.com")
            .state(LoadBalancerState::builder().code(LoadBalancerStateEnum::Provisioning).build())
            .build();
        let record = load_balancer_record(&lb).unwrap();
        assert_eq!(record.status.as_deref(), Some("provisioning"));
        assert_eq!(record.field("name"), Some("web"));
    }

    #[test]
    fn test_forward_action() {
        let action = forward_to("CreateListener", "arn:tg").unwrap();
        assert_eq!(action.r#type(), &ActionTypeEnum::Forward);
        assert_eq!(action.target_group_arn(), Some("arn:tg"));
    }

    #[test]
    fn test_tags_convert() {
        let tags = elb_tags("AddTags", &[("Name".to_string(), "web".to_string())]).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].key(), "Name");
    }
}
