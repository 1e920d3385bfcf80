//! [`CloudProvider`] backed by the AWS SDK clients

use super::autoscaling::AutoScalingClient;
use super::cloudwatch::CloudWatchClient;
use super::context::AwsContext;
use super::ec2::Ec2Client;
use super::elb::ElbClient;
use super::rds::RdsClient;
use super::sns::SnsClient;
use crate::provider::{
    CloudProvider, CreateRequest, LookupFilter, ProviderError, ResourceRecord, ResourceTags,
};
use archforge_common::ResourceKind;
use tracing::debug;

/// Routes each provider verb to the service that owns the resource kind
pub struct AwsProvider {
    ec2: Ec2Client,
    elb: ElbClient,
    autoscaling: AutoScalingClient,
    rds: RdsClient,
    cloudwatch: CloudWatchClient,
    sns: SnsClient,
}

impl AwsProvider {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            ec2: Ec2Client::from_context(ctx),
            elb: ElbClient::from_context(ctx),
            autoscaling: AutoScalingClient::from_context(ctx),
            rds: RdsClient::from_context(ctx),
            cloudwatch: CloudWatchClient::from_context(ctx),
            sns: SnsClient::from_context(ctx),
        }
    }

    async fn describe_kind(
        &self,
        kind: ResourceKind,
        filter: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        match kind {
            ResourceKind::Vpc => self.ec2.describe_vpcs(filter).await,
            ResourceKind::InternetGateway => self.ec2.describe_internet_gateways(filter).await,
            ResourceKind::GatewayAttachment => self.ec2.describe_gateway_attachments(filter).await,
            ResourceKind::ElasticIp => self.ec2.describe_addresses(filter).await,
            ResourceKind::RouteTable => self.ec2.describe_route_tables(filter).await,
            ResourceKind::Route => self.ec2.describe_routes(filter).await,
            ResourceKind::RouteTableAssociation => {
                self.ec2.describe_route_table_associations(filter).await
            }
            ResourceKind::Subnet => self.ec2.describe_subnets(filter).await,
            ResourceKind::NatGateway => self.ec2.describe_nat_gateways(filter).await,
            ResourceKind::SecurityGroup => self.ec2.describe_security_groups(filter).await,
            ResourceKind::IngressRule => self.ec2.describe_ingress_rules(filter).await,
            ResourceKind::Instance => self.ec2.describe_instances(filter).await,
            ResourceKind::LaunchTemplate => self.ec2.describe_launch_templates(filter).await,
            ResourceKind::DbSubnetGroup => self.rds.describe_subnet_groups(filter).await,
            ResourceKind::DbInstance => self.rds.describe_instances(filter).await,
            ResourceKind::LoadBalancer => self.elb.describe_load_balancers(filter).await,
            ResourceKind::TargetGroup => self.elb.describe_target_groups(filter).await,
            ResourceKind::Listener => self.elb.describe_listeners(filter).await,
            ResourceKind::ListenerRule => self.elb.describe_rules(filter).await,
            ResourceKind::AutoScalingGroup => self.autoscaling.describe_groups(filter).await,
            ResourceKind::ScalingPolicy => self.autoscaling.describe_policies(filter).await,
            ResourceKind::NotificationConfiguration => {
                self.autoscaling.describe_notifications(filter).await
            }
            ResourceKind::Alarm => self.cloudwatch.describe_alarms(filter).await,
            ResourceKind::Topic => self.sns.describe_topics(filter).await,
            ResourceKind::Subscription => self.sns.describe_subscriptions(filter).await,
        }
    }
}

impl CloudProvider for AwsProvider {
    async fn create(
        &self,
        request: &CreateRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        match request {
            CreateRequest::Vpc { cidr_block } => self.ec2.create_vpc(cidr_block, tags).await,
            CreateRequest::InternetGateway => self.ec2.create_internet_gateway(tags).await,
            CreateRequest::GatewayAttachment {
                internet_gateway_id,
                vpc_id,
            } => {
                self.ec2
                    .attach_internet_gateway(internet_gateway_id, vpc_id)
                    .await
            }
            CreateRequest::ElasticIp => self.ec2.allocate_address(tags).await,
            CreateRequest::RouteTable { vpc_id } => self.ec2.create_route_table(vpc_id, tags).await,
            CreateRequest::Route {
                route_table_id,
                destination_cidr,
                target,
            } => {
                self.ec2
                    .create_route(route_table_id, destination_cidr, target)
                    .await
            }
            CreateRequest::RouteTableAssociation {
                route_table_id,
                subnet_id,
            } => self.ec2.associate_route_table(route_table_id, subnet_id).await,
            CreateRequest::Subnet(r) => self.ec2.create_subnet(r, tags).await,
            CreateRequest::NatGateway {
                subnet_id,
                allocation_id,
            } => {
                self.ec2
                    .create_nat_gateway(subnet_id, allocation_id, tags)
                    .await
            }
            CreateRequest::SecurityGroup {
                vpc_id,
                group_name,
                description,
            } => {
                self.ec2
                    .create_security_group(vpc_id, group_name, description, tags)
                    .await
            }
            CreateRequest::IngressRule(r) => self.ec2.authorize_ingress(r).await,
            CreateRequest::DbSubnetGroup {
                name,
                description,
                subnet_ids,
            } => {
                self.rds
                    .create_subnet_group(name, description, subnet_ids, tags)
                    .await
            }
            CreateRequest::DbInstance(r) => self.rds.create_instance(r, tags).await,
            CreateRequest::Instances(r) => self.ec2.run_instances(r, tags).await,
            CreateRequest::LoadBalancer(r) => self.elb.create_load_balancer(r, tags).await,
            CreateRequest::TargetGroup(r) => self.elb.create_target_group(r, tags).await,
            CreateRequest::Listener(r) => self.elb.create_listener(r, tags).await,
            CreateRequest::ListenerRule(r) => self.elb.create_rule(r, tags).await,
            CreateRequest::LaunchTemplate(r) => self.ec2.create_launch_template(r, tags).await,
            CreateRequest::AutoScalingGroup(r) => self.autoscaling.create_group(r, tags).await,
            CreateRequest::ScalingPolicy(r) => self.autoscaling.put_policy(r).await,
            CreateRequest::Alarm(r) => self.cloudwatch.put_alarm(r).await,
            CreateRequest::Topic(r) => self.sns.create_topic(r, tags).await,
            CreateRequest::Subscription(r) => self.sns.subscribe(r).await,
            CreateRequest::NotificationConfiguration(r) => self.autoscaling.put_notification(r).await,
        }
    }

    async fn describe(
        &self,
        kind: ResourceKind,
        filter: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        // Several describe APIs fail instead of returning an empty list when
        // an identifier no longer exists.
        match self.describe_kind(kind, filter).await {
            Err(e) if e.is_not_found() => {
                debug!(kind = %kind, filter = %filter, "Describe reported not found");
                Ok(vec![])
            }
            other => other,
        }
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ProviderError> {
        match kind {
            ResourceKind::Vpc => self.ec2.delete_vpc(id).await,
            ResourceKind::InternetGateway => self.ec2.delete_internet_gateway(id).await,
            ResourceKind::GatewayAttachment => self.ec2.detach_internet_gateway(id).await,
            ResourceKind::ElasticIp => self.ec2.release_address(id).await,
            ResourceKind::RouteTable => self.ec2.delete_route_table(id).await,
            ResourceKind::Route => self.ec2.delete_route(id).await,
            ResourceKind::RouteTableAssociation => self.ec2.disassociate_route_table(id).await,
            ResourceKind::Subnet => self.ec2.delete_subnet(id).await,
            ResourceKind::NatGateway => self.ec2.delete_nat_gateway(id).await,
            ResourceKind::SecurityGroup => self.ec2.delete_security_group(id).await,
            ResourceKind::IngressRule => self.ec2.revoke_ingress(id).await,
            ResourceKind::Instance => self.ec2.terminate_instance(id).await,
            ResourceKind::LaunchTemplate => self.ec2.delete_launch_template(id).await,
            ResourceKind::DbSubnetGroup => self.rds.delete_subnet_group(id).await,
            ResourceKind::DbInstance => self.rds.delete_instance(id).await,
            ResourceKind::LoadBalancer => self.elb.delete_load_balancer(id).await,
            ResourceKind::TargetGroup => self.elb.delete_target_group(id).await,
            ResourceKind::Listener => self.elb.delete_listener(id).await,
            ResourceKind::ListenerRule => self.elb.delete_rule(id).await,
            ResourceKind::AutoScalingGroup => self.autoscaling.delete_group(id).await,
            ResourceKind::ScalingPolicy => self.autoscaling.delete_policy(id).await,
            ResourceKind::NotificationConfiguration => {
                self.autoscaling.delete_notification(id).await
            }
            ResourceKind::Alarm => self.cloudwatch.delete_alarm(id).await,
            ResourceKind::Topic => self.sns.delete_topic(id).await,
            ResourceKind::Subscription => self.sns.unsubscribe(id).await,
        }
    }

    async fn tag(
        &self,
        kind: ResourceKind,
        id: &str,
        tags: &[(String, String)],
    ) -> Result<(), ProviderError> {
        match kind {
            ResourceKind::Vpc
            | ResourceKind::InternetGateway
            | ResourceKind::ElasticIp
            | ResourceKind::RouteTable
            | ResourceKind::Subnet
            | ResourceKind::NatGateway
            | ResourceKind::SecurityGroup
            | ResourceKind::Instance
            | ResourceKind::LaunchTemplate => self.ec2.tag_resource(id, tags).await,
            ResourceKind::LoadBalancer
            | ResourceKind::TargetGroup
            | ResourceKind::Listener
            | ResourceKind::ListenerRule => self.elb.add_tags(id, tags).await,
            ResourceKind::AutoScalingGroup => self.autoscaling.tag_group(id, tags).await,
            ResourceKind::DbSubnetGroup | ResourceKind::DbInstance => {
                self.rds.tag(kind, id, tags).await
            }
            ResourceKind::Topic => self.sns.tag_topic(id, tags).await,
            _ => Err(ProviderError::Unsupported {
                operation: "tag",
                kind,
            }),
        }
    }
}
