//! In-memory cloud provider for tests
//!
//! [`FakeProvider`] keeps every resource in a list, records every call, and
//! enforces the dependency constraints a real provider would: a resource
//! still referenced by a live resource cannot be deleted. Status sequences
//! and failures can be scripted per resource kind.

use crate::pipeline::INSTANCE_IDS_FIELD;
use crate::provider::{
    CloudProvider, CreateRequest, LookupFilter, ProviderError, ResourceRecord, ResourceTags,
    compound_id,
};
use archforge_common::ResourceKind;
use archforge_common::tags::TAG_NAME;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Statuses after which a resource no longer counts as live
const GONE_STATUSES: &[&str] = &["deleted", "terminated"];

/// One call made against the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(ResourceKind, String),
    Describe(ResourceKind, LookupFilter),
    Delete(ResourceKind, String),
    Tag(ResourceKind, String),
}

/// A resource held by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeResource {
    pub kind: ResourceKind,
    pub id: String,
    pub status: Option<String>,
    pub native_name: Option<String>,
    pub parent: Option<String>,
    /// Identifiers of the resources this one depends on
    pub refs: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, String>,
}

impl FakeResource {
    pub fn is_live(&self) -> bool {
        !self
            .status
            .as_deref()
            .is_some_and(|s| GONE_STATUSES.contains(&s))
    }

    pub fn name_tag(&self) -> Option<&str> {
        self.tags.get(TAG_NAME).map(String::as_str)
    }

    fn record(&self) -> ResourceRecord {
        ResourceRecord {
            id: self.id.clone(),
            status: self.status.clone(),
            fields: self.fields.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    resources: Vec<FakeResource>,
    next_id: u64,
    calls: Vec<Call>,
    scripts: HashMap<ResourceKind, VecDeque<String>>,
    failing_creates: HashSet<ResourceKind>,
    failing_deletes: HashSet<ResourceKind>,
    pending_subscriptions: bool,
}

/// In-memory [`CloudProvider`]
#[derive(Debug, Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses reported by successive id lookups of resources of `kind`.
    ///
    /// The last status repeats forever.
    pub fn script_status(&self, kind: ResourceKind, statuses: &[&str]) {
        self.with_state(|state| {
            state
                .scripts
                .insert(kind, statuses.iter().map(|s| s.to_string()).collect());
        });
    }

    /// Make every create call for `kind` fail
    pub fn fail_creates(&self, kind: ResourceKind) {
        self.with_state(|state| {
            state.failing_creates.insert(kind);
        });
    }

    /// Make every delete call for `kind` fail
    pub fn fail_deletes(&self, kind: ResourceKind) {
        self.with_state(|state| {
            state.failing_deletes.insert(kind);
        });
    }

    /// Report new subscriptions as awaiting confirmation
    pub fn hold_subscriptions_pending(&self) {
        self.with_state(|state| state.pending_subscriptions = true);
    }

    /// Remove a resource behind the pipeline's back, as an operator might
    pub fn remove_named(&self, kind: ResourceKind, name: &str) -> bool {
        self.with_state(|state| {
            let before = state.resources.len();
            state.resources.retain(|r| {
                !(r.kind == kind
                    && (r.name_tag() == Some(name) || r.native_name.as_deref() == Some(name)))
            });
            state.resources.len() != before
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn resources(&self) -> Vec<FakeResource> {
        self.with_state(|state| state.resources.clone())
    }

    /// Live resources, excluding terminated instances and deleted gateways
    pub fn live(&self) -> Vec<FakeResource> {
        self.resources().into_iter().filter(FakeResource::is_live).collect()
    }

    pub fn find(&self, id: &str) -> Option<FakeResource> {
        self.with_state(|state| state.resources.iter().find(|r| r.id == id).cloned())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }
}

impl FakeState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn live_by_id(&self, id: &str) -> bool {
        self.resources.iter().any(|r| r.id == id && r.is_live())
    }

    fn new_id(&mut self, request: &CreateRequest) -> String {
        let n = self.next();
        match request {
            CreateRequest::Vpc { .. } => format!("vpc-{n:04}"),
            CreateRequest::InternetGateway => format!("igw-{n:04}"),
            CreateRequest::GatewayAttachment {
                internet_gateway_id,
                vpc_id,
            } => compound_id(&[internet_gateway_id.as_str(), vpc_id.as_str()]),
            CreateRequest::ElasticIp => format!("eipalloc-{n:04}"),
            CreateRequest::RouteTable { .. } => format!("rtb-{n:04}"),
            CreateRequest::Route {
                route_table_id,
                destination_cidr,
                ..
            } => compound_id(&[route_table_id.as_str(), destination_cidr.as_str()]),
            CreateRequest::RouteTableAssociation { .. } => format!("rtbassoc-{n:04}"),
            CreateRequest::Subnet(_) => format!("subnet-{n:04}"),
            CreateRequest::NatGateway { .. } => format!("nat-{n:04}"),
            CreateRequest::SecurityGroup { .. } => format!("sg-{n:04}"),
            CreateRequest::IngressRule(r) => {
                compound_id(&[r.group_id.as_str(), &format!("sgr-{n:04}")])
            }
            CreateRequest::DbSubnetGroup { name, .. } => name.clone(),
            CreateRequest::DbInstance(r) => r.identifier.clone(),
            CreateRequest::Instances(_) => format!("r-{n:04}"),
            CreateRequest::LoadBalancer(r) => {
                format!("arn:aws:elasticloadbalancing:eu-west-1:000000000000:loadbalancer/app/{}/{n:04}", r.name)
            }
            CreateRequest::TargetGroup(r) => {
                format!("arn:aws:elasticloadbalancing:eu-west-1:000000000000:targetgroup/{}/{n:04}", r.name)
            }
            CreateRequest::Listener(r) => format!("{}/listener/{n:04}", r.load_balancer_arn),
            CreateRequest::ListenerRule(r) => format!("{}/rule/{n:04}", r.listener_arn),
            CreateRequest::LaunchTemplate(_) => format!("lt-{n:04}"),
            CreateRequest::AutoScalingGroup(r) => r.name.clone(),
            CreateRequest::ScalingPolicy(r) => format!(
                "arn:aws:autoscaling:eu-west-1:000000000000:scalingPolicy:{n:04}:autoScalingGroupName/{}:policyName/{}",
                r.auto_scaling_group_name, r.name
            ),
            CreateRequest::Alarm(r) => r.name.clone(),
            CreateRequest::Topic(r) => format!("arn:aws:sns:eu-west-1:000000000000:{}", r.name),
            CreateRequest::Subscription(r) => format!("{}:{n:04}", r.topic_arn),
            CreateRequest::NotificationConfiguration(r) => {
                compound_id(&[r.auto_scaling_group_name.as_str(), r.topic_arn.as_str()])
            }
        }
    }

    fn next_scripted_status(&mut self, kind: ResourceKind) -> Option<String> {
        let script = self.scripts.get_mut(&kind)?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

fn initial_status(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::Vpc | ResourceKind::NatGateway | ResourceKind::DbInstance => Some("available"),
        ResourceKind::LoadBalancer => Some("active"),
        ResourceKind::Instance => Some("running"),
        _ => None,
    }
}

impl CloudProvider for FakeProvider {
    async fn create(
        &self,
        request: &CreateRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        let kind = request.kind();
        self.with_state(|state| {
            if state.failing_creates.contains(&kind) {
                return Err(ProviderError::Sdk {
                    operation: "create",
                    code: Some("InjectedFailure".to_string()),
                    message: format!("scripted failure creating {kind}"),
                });
            }
            if let Some(missing) = request
                .referenced_ids()
                .into_iter()
                .find(|id| !state.live_by_id(id))
            {
                return Err(ProviderError::NotFound {
                    operation: "create",
                    message: format!("{missing} does not exist"),
                });
            }
            if let Some(native) = request.native_name() {
                let taken = state.resources.iter().any(|r| {
                    r.kind == kind && r.is_live() && r.native_name.as_deref() == Some(native)
                });
                if taken {
                    return Err(ProviderError::AlreadyExists {
                        operation: "create",
                        message: format!("{kind} {native} already exists"),
                    });
                }
            }

            let resource_tags: BTreeMap<String, String> = if kind.supports_tags() {
                tags.pairs().into_iter().collect()
            } else {
                BTreeMap::new()
            };
            let id = state.new_id(request);
            let template = FakeResource {
                kind,
                id: id.clone(),
                status: initial_status(kind).map(str::to_string),
                native_name: request.native_name().map(str::to_string),
                parent: request.parent_id().map(str::to_string),
                refs: request
                    .referenced_ids()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                tags: resource_tags,
                fields: BTreeMap::new(),
            };

            let record = match request {
                CreateRequest::Instances(launch) => {
                    let mut instance_ids = Vec::new();
                    for _ in 0..launch.count.max(1) {
                        let instance_id = format!("i-{:04}", state.next());
                        let mut instance = template.clone();
                        instance.id = instance_id.clone();
                        instance.fields.insert("reservation_id".to_string(), id.clone());
                        state.resources.push(instance);
                        instance_ids.push(instance_id);
                    }
                    ResourceRecord::new(instance_ids[0].clone())
                        .with_status("running")
                        .with_field(INSTANCE_IDS_FIELD, instance_ids.join(","))
                        .with_field("reservation_id", id.clone())
                }
                CreateRequest::Subscription(_) if state.pending_subscriptions => {
                    let mut subscription = template;
                    subscription.id = crate::pipeline::PENDING_SUBSCRIPTION.to_string();
                    let record = subscription.record();
                    state.resources.push(subscription);
                    record
                }
                _ => {
                    let record = template.record();
                    state.resources.push(template);
                    record
                }
            };
            state.calls.push(Call::Create(kind, record.id.clone()));
            Ok(record)
        })
    }

    async fn describe(
        &self,
        kind: ResourceKind,
        filter: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        self.with_state(|state| {
            state.calls.push(Call::Describe(kind, filter.clone()));
            if let LookupFilter::Id(id) = filter {
                let scripted = state.next_scripted_status(kind);
                let mut found = Vec::new();
                for resource in state.resources.iter_mut().filter(|r| r.kind == kind && &r.id == id) {
                    if let Some(status) = scripted.as_ref().filter(|_| resource.is_live()) {
                        resource.status = Some(status.clone());
                    }
                    found.push(resource.record());
                }
                return Ok(found);
            }

            Ok(state
                .resources
                .iter()
                .filter(|r| r.kind == kind && r.is_live())
                .filter(|r| match filter {
                    LookupFilter::NameTag(name) => r.name_tag() == Some(name.as_str()),
                    LookupFilter::NativeName(name) => r.native_name.as_deref() == Some(name.as_str()),
                    LookupFilter::Parent(parent) => r.parent.as_deref() == Some(parent.as_str()),
                    LookupFilter::Id(_) => false,
                })
                .map(FakeResource::record)
                .collect())
        })
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ProviderError> {
        self.with_state(|state| {
            state.calls.push(Call::Delete(kind, id.to_string()));
            if state.failing_deletes.contains(&kind) {
                return Err(ProviderError::Sdk {
                    operation: "delete",
                    code: Some("InjectedFailure".to_string()),
                    message: format!("scripted failure deleting {kind}"),
                });
            }
            if !state
                .resources
                .iter()
                .any(|r| r.kind == kind && r.id == id && r.is_live())
            {
                return Err(ProviderError::NotFound {
                    operation: "delete",
                    message: format!("{kind} {id} does not exist"),
                });
            }

            // Owned children the provider removes along with their parent
            let cascades: &[ResourceKind] = match kind {
                ResourceKind::RouteTable => &[ResourceKind::Route],
                ResourceKind::Topic => &[ResourceKind::Subscription],
                _ => &[],
            };
            let cascaded =
                |r: &FakeResource| cascades.contains(&r.kind) && r.parent.as_deref() == Some(id);

            // A rejected delete leaves the parent and its children untouched
            if let Some(dependent) = state.resources.iter().find(|r| {
                r.is_live() && r.id != id && !cascaded(r) && r.refs.iter().any(|d| d == id)
            }) {
                return Err(ProviderError::DependencyViolation {
                    operation: "delete",
                    message: format!("{kind} {id} is still used by {} {}", dependent.kind, dependent.id),
                });
            }

            state.resources.retain(|r| !cascaded(r));
            let Some(position) = state
                .resources
                .iter()
                .position(|r| r.kind == kind && r.id == id && r.is_live())
            else {
                return Err(ProviderError::NotFound {
                    operation: "delete",
                    message: format!("{kind} {id} does not exist"),
                });
            };
            match kind {
                ResourceKind::Instance => {
                    state.resources[position].status = Some("terminated".to_string());
                }
                ResourceKind::NatGateway => {
                    state.resources[position].status = Some("deleted".to_string());
                }
                _ => {
                    state.resources.remove(position);
                }
            }
            Ok(())
        })
    }

    async fn tag(
        &self,
        kind: ResourceKind,
        id: &str,
        tags: &[(String, String)],
    ) -> Result<(), ProviderError> {
        self.with_state(|state| {
            state.calls.push(Call::Tag(kind, id.to_string()));
            if !kind.supports_tags() {
                return Err(ProviderError::Unsupported {
                    operation: "tag",
                    kind,
                });
            }
            let Some(resource) = state
                .resources
                .iter_mut()
                .find(|r| r.kind == kind && r.id == id)
            else {
                return Err(ProviderError::NotFound {
                    operation: "tag",
                    message: format!("{kind} {id} does not exist"),
                });
            };
            resource.tags.extend(tags.iter().cloned());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archforge_common::tags::{TAG_STATUS, status};

    fn tags(name: &str) -> ResourceTags {
        ResourceTags {
            name: name.to_string(),
            stack: "web".to_string(),
            run_id: "run-1".to_string(),
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_referenced_resource_cannot_be_deleted() {
        let fake = FakeProvider::new();
        let vpc = fake
            .create(&CreateRequest::Vpc { cidr_block: "10.0.0.0/16".to_string() }, &tags("vpc"))
            .await
            .unwrap();
        fake.create(&CreateRequest::RouteTable { vpc_id: vpc.id.clone() }, &tags("rt"))
            .await
            .unwrap();

        let err = fake.delete(ResourceKind::Vpc, &vpc.id).await.unwrap_err();
        assert!(err.is_dependency_violation());
    }

    #[tokio::test]
    async fn test_rejected_delete_keeps_owned_children() {
        let fake = FakeProvider::new();
        let vpc = fake
            .create(&CreateRequest::Vpc { cidr_block: "10.0.0.0/16".to_string() }, &tags("vpc"))
            .await
            .unwrap();
        let igw = fake.create(&CreateRequest::InternetGateway, &tags("igw")).await.unwrap();
        let rtb = fake
            .create(&CreateRequest::RouteTable { vpc_id: vpc.id.clone() }, &tags("rt"))
            .await
            .unwrap();
        let route = fake
            .create(
                &CreateRequest::Route {
                    route_table_id: rtb.id.clone(),
                    destination_cidr: "0.0.0.0/0".to_string(),
                    target: crate::provider::RouteTarget::InternetGateway(igw.id.clone()),
                },
                &tags("route"),
            )
            .await
            .unwrap();
        let subnet = fake
            .create(
                &CreateRequest::Subnet(crate::provider::SubnetRequest {
                    vpc_id: vpc.id.clone(),
                    cidr_block: "10.0.1.0/24".to_string(),
                    availability_zone: "eu-west-1a".to_string(),
                    map_public_ip_on_launch: true,
                }),
                &tags("public-1"),
            )
            .await
            .unwrap();
        let association = fake
            .create(
                &CreateRequest::RouteTableAssociation {
                    route_table_id: rtb.id.clone(),
                    subnet_id: subnet.id.clone(),
                },
                &tags("assoc"),
            )
            .await
            .unwrap();

        let err = fake.delete(ResourceKind::RouteTable, &rtb.id).await.unwrap_err();
        assert!(err.is_dependency_violation());
        assert!(fake.find(&route.id).is_some(), "route vanished with a rejected delete");
        assert!(fake.find(&rtb.id).is_some());

        fake.delete(ResourceKind::RouteTableAssociation, &association.id)
            .await
            .unwrap();
        fake.delete(ResourceKind::RouteTable, &rtb.id).await.unwrap();
        assert!(fake.find(&route.id).is_none());
    }

    #[tokio::test]
    async fn test_creation_tags_and_lookup_by_name() {
        let fake = FakeProvider::new();
        let igw = fake
            .create(&CreateRequest::InternetGateway, &tags("web-igw"))
            .await
            .unwrap();
        let found = fake
            .describe(ResourceKind::InternetGateway, &LookupFilter::NameTag("web-igw".to_string()))
            .await
            .unwrap();
        assert_eq!(found, vec![igw.clone()]);
        assert_eq!(
            fake.find(&igw.id).unwrap().tags.get(TAG_STATUS).map(String::as_str),
            Some(status::CREATING)
        );
    }

    #[tokio::test]
    async fn test_scripted_status_repeats_last() {
        let fake = FakeProvider::new();
        fake.script_status(ResourceKind::Vpc, &["pending", "available"]);
        let vpc = fake
            .create(&CreateRequest::Vpc { cidr_block: "10.0.0.0/16".to_string() }, &tags("vpc"))
            .await
            .unwrap();
        let filter = LookupFilter::Id(vpc.id.clone());
        let mut statuses = Vec::new();
        for _ in 0..3 {
            let found = fake.describe(ResourceKind::Vpc, &filter).await.unwrap();
            statuses.push(found[0].status.clone());
        }
        assert_eq!(
            statuses,
            vec![
                Some("pending".to_string()),
                Some("available".to_string()),
                Some("available".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_terminated_instances_leave_name_lookups() {
        let fake = FakeProvider::new();
        let vpc = fake
            .create(&CreateRequest::Vpc { cidr_block: "10.0.0.0/16".to_string() }, &tags("vpc"))
            .await
            .unwrap();
        let nat_subnet = fake
            .create(
                &CreateRequest::Subnet(crate::provider::SubnetRequest {
                    vpc_id: vpc.id.clone(),
                    cidr_block: "10.0.1.0/24".to_string(),
                    availability_zone: "eu-west-1a".to_string(),
                    map_public_ip_on_launch: true,
                }),
                &tags("public-1"),
            )
            .await
            .unwrap();
        let eip = fake.create(&CreateRequest::ElasticIp, &tags("eip")).await.unwrap();
        let nat = fake
            .create(
                &CreateRequest::NatGateway {
                    subnet_id: nat_subnet.id.clone(),
                    allocation_id: eip.id.clone(),
                },
                &tags("nat"),
            )
            .await
            .unwrap();

        fake.delete(ResourceKind::NatGateway, &nat.id).await.unwrap();
        let by_name = fake
            .describe(ResourceKind::NatGateway, &LookupFilter::NameTag("nat".to_string()))
            .await
            .unwrap();
        assert!(by_name.is_empty());
        let by_id = fake
            .describe(ResourceKind::NatGateway, &LookupFilter::Id(nat.id.clone()))
            .await
            .unwrap();
        assert_eq!(by_id[0].status.as_deref(), Some("deleted"));

        // The gateway is gone, so its address can be released
        fake.delete(ResourceKind::ElasticIp, &eip.id).await.unwrap();
    }
}
