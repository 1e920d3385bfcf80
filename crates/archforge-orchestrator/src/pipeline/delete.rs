//! Per-stage teardown logic
//!
//! Teardown never trusts state from a previous run: every stage locates its
//! resources by their configured names, removes the links that pin them,
//! deletes them, and waits out slow deletions before the next stage runs.

use super::Stage;
use crate::config::ArchitectureConfig;
use crate::error::OrchestrationError;
use crate::locator::{Locator, ResourceRef};
use crate::provider::{CloudProvider, LookupFilter, compound_id};
use crate::provisioner::Provisioner;
use crate::wait::{ReadinessWaiter, WaitTarget};
use archforge_common::ResourceKind;
use tracing::{debug, info};

/// Subscription identifier reported until the endpoint confirms it
pub const PENDING_SUBSCRIPTION: &str = "PendingConfirmation";

pub(super) struct Deleter<'a, P> {
    config: &'a ArchitectureConfig,
    locator: Locator<'a, P>,
    provisioner: Provisioner<'a, P>,
    waiter: ReadinessWaiter<'a, P>,
}

impl<'a, P: CloudProvider> Deleter<'a, P> {
    pub fn new(
        config: &'a ArchitectureConfig,
        locator: Locator<'a, P>,
        provisioner: Provisioner<'a, P>,
        waiter: ReadinessWaiter<'a, P>,
    ) -> Self {
        Self {
            config,
            locator,
            provisioner,
            waiter,
        }
    }

    /// Run one delete stage, returning the primary resource it removed.
    pub async fn run(&self, stage: Stage) -> Result<Option<ResourceRef>, OrchestrationError> {
        let config = self.config;
        let name = stage.resource_name(config);

        match stage {
            Stage::ScaleUpNotification | Stage::ScaleDownNotification => {
                let topic_stage = if stage == Stage::ScaleUpNotification {
                    Stage::ScaleUpTopic
                } else {
                    Stage::ScaleDownTopic
                };
                let topic = self.locate_stage(topic_stage).await?;
                let group = self.locate_stage(Stage::AutoScalingGroup).await?;
                let id = compound_id(&[group.id.as_str(), topic.id.as_str()]);
                let notification = self
                    .locator
                    .locate_by(
                        ResourceKind::NotificationConfiguration,
                        &name,
                        &LookupFilter::Id(id),
                    )
                    .await?;
                self.provisioner.delete(&notification).await?;
                Ok(Some(notification))
            }

            Stage::ScaleUpSubscription | Stage::ScaleDownSubscription => {
                let topic_stage = if stage == Stage::ScaleUpSubscription {
                    Stage::ScaleUpTopic
                } else {
                    Stage::ScaleDownTopic
                };
                let topic = self.locate_stage(topic_stage).await?;
                let subscriptions = self
                    .locator
                    .locate_all(
                        ResourceKind::Subscription,
                        &name,
                        &LookupFilter::Parent(topic.id.clone()),
                    )
                    .await?;
                let mut removed = None;
                for subscription in subscriptions {
                    if subscription.id == PENDING_SUBSCRIPTION {
                        info!(topic = %topic.name, "Skipping unconfirmed subscription; it is removed with its topic");
                        continue;
                    }
                    self.provisioner.delete(&subscription).await?;
                    removed = Some(subscription);
                }
                Ok(removed)
            }

            Stage::AutoScalingGroup => {
                let group = self.locate_stage(stage).await?;
                self.provisioner.delete(&group).await?;
                self.wait_gone(&group, WaitTarget::GONE).await?;
                Ok(Some(group))
            }

            Stage::Listener => {
                let alb = self.locate_stage(Stage::LoadBalancer).await?;
                let listener = self
                    .locator
                    .locate_child(ResourceKind::Listener, &name, &alb.id)
                    .await?;
                self.provisioner.delete(&listener).await?;
                Ok(Some(listener))
            }

            Stage::ListenerRule => {
                let alb = self.locate_stage(Stage::LoadBalancer).await?;
                let listener = self
                    .locator
                    .locate_child(
                        ResourceKind::Listener,
                        &Stage::Listener.resource_name(config),
                        &alb.id,
                    )
                    .await?;
                let rule = self
                    .locator
                    .locate_child(ResourceKind::ListenerRule, &name, &listener.id)
                    .await?;
                self.provisioner.delete(&rule).await?;
                Ok(Some(rule))
            }

            Stage::LoadBalancer => {
                let alb = self.locate_stage(stage).await?;
                self.provisioner.delete(&alb).await?;
                self.wait_gone(&alb, WaitTarget::GONE).await?;
                Ok(Some(alb))
            }

            Stage::WebServers => {
                let instances = self
                    .locator
                    .locate_all(
                        ResourceKind::Instance,
                        &name,
                        &LookupFilter::NameTag(name.clone()),
                    )
                    .await?;
                if instances.is_empty() {
                    return Err(OrchestrationError::NotFound {
                        kind: ResourceKind::Instance,
                        name,
                    });
                }
                for instance in &instances {
                    self.provisioner.delete(instance).await?;
                }
                for instance in &instances {
                    self.wait_gone(instance, WaitTarget::INSTANCE_TERMINATED)
                        .await?;
                }
                Ok(instances.into_iter().next())
            }

            Stage::Database => {
                let database = self.locate_stage(stage).await?;
                self.provisioner.delete(&database).await?;
                self.wait_gone(&database, WaitTarget::GONE).await?;
                Ok(Some(database))
            }

            Stage::SecurityGroupRules => {
                for group_stage in [
                    Stage::AlbSecurityGroup,
                    Stage::AppSecurityGroup,
                    Stage::RdsSecurityGroup,
                ] {
                    let group = self.locate_stage(group_stage).await?;
                    let rules = self
                        .locator
                        .locate_all(
                            ResourceKind::IngressRule,
                            &format!("ingress rules of {}", group.name),
                            &LookupFilter::Parent(group.id.clone()),
                        )
                        .await?;
                    debug!(group = %group, count = rules.len(), "Revoking ingress rules");
                    for rule in &rules {
                        self.provisioner.delete(rule).await?;
                    }
                }
                Ok(None)
            }

            Stage::PublicSubnet1
            | Stage::PublicSubnet2
            | Stage::PrivateSubnet1
            | Stage::PrivateSubnet2 => {
                let subnet = self.locate_stage(stage).await?;
                let associations = self
                    .locator
                    .locate_all(
                        ResourceKind::RouteTableAssociation,
                        &name,
                        &LookupFilter::Parent(subnet.id.clone()),
                    )
                    .await?;
                for association in &associations {
                    self.provisioner.delete(association).await?;
                }
                self.provisioner.delete(&subnet).await?;
                Ok(Some(subnet))
            }

            Stage::NatGateway => {
                let nat = self.locate_stage(stage).await?;
                self.provisioner.delete(&nat).await?;
                self.wait_gone(&nat, WaitTarget::NAT_GATEWAY_DELETED).await?;
                Ok(Some(nat))
            }

            Stage::InternetGateway => {
                let igw = self.locate_stage(stage).await?;
                let attachments = self
                    .locator
                    .locate_all(
                        ResourceKind::GatewayAttachment,
                        &name,
                        &LookupFilter::Parent(igw.id.clone()),
                    )
                    .await?;
                for attachment in &attachments {
                    self.provisioner.delete(attachment).await?;
                }
                self.provisioner.delete(&igw).await?;
                Ok(Some(igw))
            }

            Stage::Vpc
            | Stage::ElasticIp
            | Stage::PublicRouteTable
            | Stage::PrivateRouteTable
            | Stage::AppSecurityGroup
            | Stage::AlbSecurityGroup
            | Stage::RdsSecurityGroup
            | Stage::DbSubnetGroup
            | Stage::TargetGroup
            | Stage::LaunchTemplate
            | Stage::ScaleOutStatusCheckPolicy
            | Stage::ScaleInStatusCheckPolicy
            | Stage::ScaleOutCpuPolicy
            | Stage::ScaleInCpuPolicy
            | Stage::StatusCheckAlarm
            | Stage::CpuAlarm
            | Stage::ScaleUpTopic
            | Stage::ScaleDownTopic => {
                let resource = self.locate_stage(stage).await?;
                self.provisioner.delete(&resource).await?;
                Ok(Some(resource))
            }
        }
    }

    /// Fail before anything is removed when the VPC name matches several VPCs.
    ///
    /// A missing VPC is not an error here; its own stage reports it.
    pub async fn check_vpc_unique(&self) -> Result<(), OrchestrationError> {
        match self.locate_stage(Stage::Vpc).await {
            Ok(_) | Err(OrchestrationError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Locate the primary resource of `stage` by its configured name.
    async fn locate_stage(&self, stage: Stage) -> Result<ResourceRef, OrchestrationError> {
        let name = stage.resource_name(self.config);
        match stage.primary_kind() {
            Some(kind) => self.locator.locate(kind, &name).await,
            None => Err(OrchestrationError::NotFound {
                kind: ResourceKind::IngressRule,
                name,
            }),
        }
    }

    async fn wait_gone(&self, reference: &ResourceRef, target: WaitTarget) -> Result<(), OrchestrationError> {
        self.waiter
            .wait(reference.kind, &reference.name, &reference.id, target)
            .await
    }
}
