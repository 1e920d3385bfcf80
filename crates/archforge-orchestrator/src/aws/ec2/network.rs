//! VPC, gateways, elastic IPs, route tables and subnets

use super::{Ec2Client, ec2_tag_spec, filter, name_filter};
use crate::aws::error::{required, sdk_error, unsupported};
use crate::provider::{
    LookupFilter, ProviderError, ResourceRecord, ResourceTags, RouteTarget, SubnetRequest, compound_id,
    split_compound_id,
};
use aws_sdk_ec2::types::{
    AttributeBooleanValue, DomainType, Filter, NatGatewayState, ResourceType,
    RouteTable as Ec2RouteTable,
};
use archforge_common::ResourceKind;
use tracing::{debug, info};

/// NAT gateway states no longer worth finding by name
const GONE_NAT_STATES: &[NatGatewayState] = &[NatGatewayState::Deleted, NatGatewayState::Failed];

fn enabled() -> AttributeBooleanValue {
    AttributeBooleanValue::builder().value(true).build()
}

impl Ec2Client {
    /// Create a VPC with DNS support and DNS hostnames turned on
    pub async fn create_vpc(
        &self,
        cidr_block: &str,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        let response = self
            .client
            .create_vpc()
            .cidr_block(cidr_block)
            .tag_specifications(ec2_tag_spec(ResourceType::Vpc, tags))
            .send()
            .await
            .map_err(sdk_error("CreateVpc"))?;

        let vpc = required(response.vpc(), "CreateVpc", "vpc")?;
        let vpc_id = required(vpc.vpc_id(), "CreateVpc", "vpc_id")?;

        // Only one attribute may be modified per call
        self.client
            .modify_vpc_attribute()
            .vpc_id(vpc_id)
            .enable_dns_support(enabled())
            .send()
            .await
            .map_err(sdk_error("ModifyVpcAttribute"))?;
        self.client
            .modify_vpc_attribute()
            .vpc_id(vpc_id)
            .enable_dns_hostnames(enabled())
            .send()
            .await
            .map_err(sdk_error("ModifyVpcAttribute"))?;

        info!(vpc_id = %vpc_id, cidr = %cidr_block, "Created VPC");
        let mut record = ResourceRecord::new(vpc_id);
        if let Some(state) = vpc.state() {
            record = record.with_status(state.as_str());
        }
        Ok(record)
    }

    pub async fn describe_vpcs(&self, by: &LookupFilter) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_vpcs();
        let request = match by {
            LookupFilter::NameTag(name) => request.filters(name_filter(name)),
            LookupFilter::Id(id) => request.vpc_ids(id),
            _ => return Err(unsupported(ResourceKind::Vpc)),
        };
        let response = request.send().await.map_err(sdk_error("DescribeVpcs"))?;

        Ok(response
            .vpcs()
            .iter()
            .filter_map(|vpc| {
                let record = ResourceRecord::new(vpc.vpc_id()?);
                Some(match vpc.state() {
                    Some(state) => record.with_status(state.as_str()),
                    None => record,
                })
            })
            .collect())
    }

    pub async fn delete_vpc(&self, vpc_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete_vpc()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(sdk_error("DeleteVpc"))?;
        info!(vpc_id = %vpc_id, "Deleted VPC");
        Ok(())
    }

    pub async fn create_internet_gateway(
        &self,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        let response = self
            .client
            .create_internet_gateway()
            .tag_specifications(ec2_tag_spec(ResourceType::InternetGateway, tags))
            .send()
            .await
            .map_err(sdk_error("CreateInternetGateway"))?;

        let igw_id = response
            .internet_gateway()
            .and_then(|igw| igw.internet_gateway_id());
        let igw_id = required(igw_id, "CreateInternetGateway", "internet_gateway_id")?;
        info!(igw_id = %igw_id, "Created internet gateway");
        Ok(ResourceRecord::new(igw_id))
    }

    pub async fn describe_internet_gateways(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_internet_gateways();
        let request = match by {
            LookupFilter::NameTag(name) => request.filters(name_filter(name)),
            LookupFilter::Id(id) => request.internet_gateway_ids(id),
            _ => return Err(unsupported(ResourceKind::InternetGateway)),
        };
        let response = request
            .send()
            .await
            .map_err(sdk_error("DescribeInternetGateways"))?;

        Ok(response
            .internet_gateways()
            .iter()
            .filter_map(|igw| {
                let mut record = ResourceRecord::new(igw.internet_gateway_id()?);
                if let Some(vpc_id) = igw.attachments().first().and_then(|a| a.vpc_id()) {
                    record = record.with_field("vpc_id", vpc_id);
                }
                Some(record)
            })
            .collect())
    }

    pub async fn delete_internet_gateway(&self, igw_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete_internet_gateway()
            .internet_gateway_id(igw_id)
            .send()
            .await
            .map_err(sdk_error("DeleteInternetGateway"))?;
        info!(igw_id = %igw_id, "Deleted internet gateway");
        Ok(())
    }

    /// Attach a gateway to a VPC; the attachment is identified as `igw|vpc`
    pub async fn attach_internet_gateway(
        &self,
        igw_id: &str,
        vpc_id: &str,
    ) -> Result<ResourceRecord, ProviderError> {
        self.client
            .attach_internet_gateway()
            .internet_gateway_id(igw_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(sdk_error("AttachInternetGateway"))?;
        info!(igw_id = %igw_id, vpc_id = %vpc_id, "Attached internet gateway");
        Ok(ResourceRecord::new(compound_id(&[igw_id, vpc_id])).with_status("attached"))
    }

    /// List the VPC attachments of a gateway, or check a single `igw|vpc` pair
    pub async fn describe_gateway_attachments(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let (igw_id, vpc_id) = match by {
            LookupFilter::Parent(igw_id) => (igw_id.as_str(), None),
            LookupFilter::Id(id) => {
                let [igw_id, vpc_id] = attachment_parts("DescribeInternetGateways", id)?;
                (igw_id, Some(vpc_id))
            }
            _ => return Err(unsupported(ResourceKind::GatewayAttachment)),
        };

        let gateways = self
            .describe_internet_gateway_attachments(igw_id)
            .await?;
        Ok(gateways
            .into_iter()
            .filter(|(attached_vpc, _)| vpc_id.is_none_or(|v| v == attached_vpc))
            .map(|(attached_vpc, state)| {
                let record = ResourceRecord::new(compound_id(&[igw_id, attached_vpc.as_str()]));
                match state {
                    Some(state) => record.with_status(state),
                    None => record,
                }
            })
            .collect())
    }

    async fn describe_internet_gateway_attachments(
        &self,
        igw_id: &str,
    ) -> Result<Vec<(String, Option<String>)>, ProviderError> {
        let response = self
            .client
            .describe_internet_gateways()
            .internet_gateway_ids(igw_id)
            .send()
            .await
            .map_err(sdk_error("DescribeInternetGateways"))?;

        Ok(response
            .internet_gateways()
            .iter()
            .flat_map(|igw| igw.attachments())
            .filter_map(|attachment| {
                Some((
                    attachment.vpc_id()?.to_string(),
                    attachment.state().map(|s| s.as_str().to_string()),
                ))
            })
            .collect())
    }

    pub async fn detach_internet_gateway(&self, attachment_id: &str) -> Result<(), ProviderError> {
        let [igw_id, vpc_id] = attachment_parts("DetachInternetGateway", attachment_id)?;
        self.client
            .detach_internet_gateway()
            .internet_gateway_id(igw_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(sdk_error("DetachInternetGateway"))?;
        info!(igw_id = %igw_id, vpc_id = %vpc_id, "Detached internet gateway");
        Ok(())
    }

    pub async fn allocate_address(&self, tags: &ResourceTags) -> Result<ResourceRecord, ProviderError> {
        let response = self
            .client
            .allocate_address()
            .domain(DomainType::Vpc)
            .tag_specifications(ec2_tag_spec(ResourceType::ElasticIp, tags))
            .send()
            .await
            .map_err(sdk_error("AllocateAddress"))?;

        let allocation_id = required(response.allocation_id(), "AllocateAddress", "allocation_id")?;
        info!(allocation_id = %allocation_id, public_ip = ?response.public_ip(), "Allocated elastic IP");

        let mut record = ResourceRecord::new(allocation_id);
        if let Some(ip) = response.public_ip() {
            record = record.with_field("public_ip", ip);
        }
        Ok(record)
    }

    pub async fn describe_addresses(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_addresses();
        let request = match by {
            LookupFilter::NameTag(name) => request.filters(name_filter(name)),
            LookupFilter::Id(id) => request.allocation_ids(id),
            _ => return Err(unsupported(ResourceKind::ElasticIp)),
        };
        let response = request.send().await.map_err(sdk_error("DescribeAddresses"))?;

        Ok(response
            .addresses()
            .iter()
            .filter_map(|address| {
                let mut record = ResourceRecord::new(address.allocation_id()?);
                if let Some(ip) = address.public_ip() {
                    record = record.with_field("public_ip", ip);
                }
                if let Some(association) = address.association_id() {
                    record = record.with_field("association_id", association);
                }
                Some(record)
            })
            .collect())
    }

    pub async fn release_address(&self, allocation_id: &str) -> Result<(), ProviderError> {
        self.client
            .release_address()
            .allocation_id(allocation_id)
            .send()
            .await
            .map_err(sdk_error("ReleaseAddress"))?;
        info!(allocation_id = %allocation_id, "Released elastic IP");
        Ok(())
    }

    pub async fn create_route_table(
        &self,
        vpc_id: &str,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        let response = self
            .client
            .create_route_table()
            .vpc_id(vpc_id)
            .tag_specifications(ec2_tag_spec(ResourceType::RouteTable, tags))
            .send()
            .await
            .map_err(sdk_error("CreateRouteTable"))?;

        let rtb_id = response.route_table().and_then(|rt| rt.route_table_id());
        let rtb_id = required(rtb_id, "CreateRouteTable", "route_table_id")?;
        info!(rtb_id = %rtb_id, vpc_id = %vpc_id, "Created route table");
        Ok(ResourceRecord::new(rtb_id).with_field("vpc_id", vpc_id))
    }

    async fn route_tables(&self, filters: Vec<Filter>, ids: Vec<String>) -> Result<Vec<Ec2RouteTable>, ProviderError> {
        let response = self
            .client
            .describe_route_tables()
            .set_filters(Some(filters).filter(|f| !f.is_empty()))
            .set_route_table_ids(Some(ids).filter(|i| !i.is_empty()))
            .send()
            .await
            .map_err(sdk_error("DescribeRouteTables"))?;
        Ok(response.route_tables().to_vec())
    }

    pub async fn describe_route_tables(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let tables = match by {
            LookupFilter::NameTag(name) => self.route_tables(vec![name_filter(name)], vec![]).await?,
            LookupFilter::Id(id) => self.route_tables(vec![], vec![id.clone()]).await?,
            _ => return Err(unsupported(ResourceKind::RouteTable)),
        };
        Ok(tables
            .iter()
            .filter_map(|rt| {
                let mut record = ResourceRecord::new(rt.route_table_id()?);
                if let Some(vpc_id) = rt.vpc_id() {
                    record = record.with_field("vpc_id", vpc_id);
                }
                Some(record)
            })
            .collect())
    }

    pub async fn delete_route_table(&self, rtb_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete_route_table()
            .route_table_id(rtb_id)
            .send()
            .await
            .map_err(sdk_error("DeleteRouteTable"))?;
        info!(rtb_id = %rtb_id, "Deleted route table");
        Ok(())
    }

    /// Add a route; routes are identified as `rtb|destination`
    pub async fn create_route(
        &self,
        rtb_id: &str,
        destination_cidr: &str,
        target: &RouteTarget,
    ) -> Result<ResourceRecord, ProviderError> {
        let request = self
            .client
            .create_route()
            .route_table_id(rtb_id)
            .destination_cidr_block(destination_cidr);
        let request = match target {
            RouteTarget::InternetGateway(igw_id) => request.gateway_id(igw_id),
            RouteTarget::NatGateway(nat_id) => request.nat_gateway_id(nat_id),
        };
        request.send().await.map_err(sdk_error("CreateRoute"))?;

        info!(rtb_id = %rtb_id, destination = %destination_cidr, target = ?target, "Created route");
        Ok(ResourceRecord::new(compound_id(&[rtb_id, destination_cidr])).with_status("active"))
    }

    /// Routes added to a table (the implicit `local` route is skipped)
    pub async fn describe_routes(&self, by: &LookupFilter) -> Result<Vec<ResourceRecord>, ProviderError> {
        let (rtb_id, destination) = match by {
            LookupFilter::Parent(rtb_id) => (rtb_id.as_str(), None),
            LookupFilter::Id(id) => {
                let [rtb_id, destination] = route_parts("DescribeRouteTables", id)?;
                (rtb_id, Some(destination))
            }
            _ => return Err(unsupported(ResourceKind::Route)),
        };

        let tables = self.route_tables(vec![], vec![rtb_id.to_string()]).await?;
        Ok(tables
            .iter()
            .flat_map(|rt| rt.routes())
            .filter(|route| route.gateway_id() != Some("local"))
            .filter_map(|route| {
                let cidr = route.destination_cidr_block()?;
                if destination.is_some_and(|d| d != cidr) {
                    return None;
                }
                let record = ResourceRecord::new(compound_id(&[rtb_id, cidr]));
                Some(match route.state() {
                    Some(state) => record.with_status(state.as_str()),
                    None => record,
                })
            })
            .collect())
    }

    pub async fn delete_route(&self, route_id: &str) -> Result<(), ProviderError> {
        let [rtb_id, destination] = route_parts("DeleteRoute", route_id)?;
        self.client
            .delete_route()
            .route_table_id(rtb_id)
            .destination_cidr_block(destination)
            .send()
            .await
            .map_err(sdk_error("DeleteRoute"))?;
        info!(rtb_id = %rtb_id, destination = %destination, "Deleted route");
        Ok(())
    }

    pub async fn associate_route_table(
        &self,
        rtb_id: &str,
        subnet_id: &str,
    ) -> Result<ResourceRecord, ProviderError> {
        let response = self
            .client
            .associate_route_table()
            .route_table_id(rtb_id)
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(sdk_error("AssociateRouteTable"))?;

        let association_id = required(response.association_id(), "AssociateRouteTable", "association_id")?;
        info!(rtb_id = %rtb_id, subnet_id = %subnet_id, association_id = %association_id, "Associated route table");
        Ok(ResourceRecord::new(association_id)
            .with_field("route_table_id", rtb_id)
            .with_field("subnet_id", subnet_id))
    }

    /// Route table associations of a subnet (by subnet ID), or one association by ID
    pub async fn describe_route_table_associations(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let (filter_name, value) = match by {
            LookupFilter::Parent(subnet_id) => ("association.subnet-id", subnet_id.as_str()),
            LookupFilter::Id(id) => ("association.route-table-association-id", id.as_str()),
            _ => return Err(unsupported(ResourceKind::RouteTableAssociation)),
        };
        let tables = self.route_tables(vec![filter(filter_name, value)], vec![]).await?;

        Ok(tables
            .iter()
            .flat_map(|rt| rt.associations())
            .filter(|a| a.main() != Some(true))
            .filter(|a| match by {
                LookupFilter::Id(_) => a.route_table_association_id() == Some(value),
                _ => a.subnet_id() == Some(value),
            })
            .filter_map(|a| {
                let mut record = ResourceRecord::new(a.route_table_association_id()?);
                if let Some(state) = a.association_state().and_then(|s| s.state()) {
                    record = record.with_status(state.as_str());
                }
                if let Some(rtb_id) = a.route_table_id() {
                    record = record.with_field("route_table_id", rtb_id);
                }
                Some(record)
            })
            .collect())
    }

    pub async fn disassociate_route_table(&self, association_id: &str) -> Result<(), ProviderError> {
        self.client
            .disassociate_route_table()
            .association_id(association_id)
            .send()
            .await
            .map_err(sdk_error("DisassociateRouteTable"))?;
        info!(association_id = %association_id, "Disassociated route table");
        Ok(())
    }

    pub async fn create_subnet(
        &self,
        request: &SubnetRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        let response = self
            .client
            .create_subnet()
            .vpc_id(&request.vpc_id)
            .cidr_block(&request.cidr_block)
            .availability_zone(&request.availability_zone)
            .tag_specifications(ec2_tag_spec(ResourceType::Subnet, tags))
            .send()
            .await
            .map_err(sdk_error("CreateSubnet"))?;

        let subnet = required(response.subnet(), "CreateSubnet", "subnet")?;
        let subnet_id = required(subnet.subnet_id(), "CreateSubnet", "subnet_id")?;

        if request.map_public_ip_on_launch {
            self.client
                .modify_subnet_attribute()
                .subnet_id(subnet_id)
                .map_public_ip_on_launch(enabled())
                .send()
                .await
                .map_err(sdk_error("ModifySubnetAttribute"))?;
            debug!(subnet_id = %subnet_id, "Enabled public IP mapping");
        }

        info!(
            subnet_id = %subnet_id,
            cidr = %request.cidr_block,
            az = %request.availability_zone,
            "Created subnet"
        );
        let mut record = ResourceRecord::new(subnet_id).with_field("vpc_id", &request.vpc_id);
        if let Some(state) = subnet.state() {
            record = record.with_status(state.as_str());
        }
        Ok(record)
    }

    pub async fn describe_subnets(&self, by: &LookupFilter) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_subnets();
        let request = match by {
            LookupFilter::NameTag(name) => request.filters(name_filter(name)),
            LookupFilter::Id(id) => request.subnet_ids(id),
            _ => return Err(unsupported(ResourceKind::Subnet)),
        };
        let response = request.send().await.map_err(sdk_error("DescribeSubnets"))?;

        Ok(response
            .subnets()
            .iter()
            .filter_map(|subnet| {
                let mut record = ResourceRecord::new(subnet.subnet_id()?);
                if let Some(state) = subnet.state() {
                    record = record.with_status(state.as_str());
                }
                if let Some(az) = subnet.availability_zone() {
                    record = record.with_field("availability_zone", az);
                }
                Some(record)
            })
            .collect())
    }

    pub async fn delete_subnet(&self, subnet_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(sdk_error("DeleteSubnet"))?;
        info!(subnet_id = %subnet_id, "Deleted subnet");
        Ok(())
    }

    pub async fn create_nat_gateway(
        &self,
        subnet_id: &str,
        allocation_id: &str,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        let response = self
            .client
            .create_nat_gateway()
            .subnet_id(subnet_id)
            .allocation_id(allocation_id)
            .tag_specifications(ec2_tag_spec(ResourceType::Natgateway, tags))
            .send()
            .await
            .map_err(sdk_error("CreateNatGateway"))?;

        let nat = required(response.nat_gateway(), "CreateNatGateway", "nat_gateway")?;
        let nat_id = required(nat.nat_gateway_id(), "CreateNatGateway", "nat_gateway_id")?;
        info!(nat_id = %nat_id, subnet_id = %subnet_id, "Created NAT gateway");

        let mut record = ResourceRecord::new(nat_id);
        if let Some(state) = nat.state() {
            record = record.with_status(state.as_str());
        }
        Ok(record)
    }

    /// Name lookups skip gateways that are already deleted or failed;
    /// ID lookups report them so a deletion wait can observe `deleted`.
    pub async fn describe_nat_gateways(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let request = self.client.describe_nat_gateways();
        let request = match by {
            LookupFilter::NameTag(name) => request.filter(name_filter(name)),
            LookupFilter::Id(id) => request.nat_gateway_ids(id),
            _ => return Err(unsupported(ResourceKind::NatGateway)),
        };
        let response = request
            .send()
            .await
            .map_err(sdk_error("DescribeNatGateways"))?;

        Ok(response
            .nat_gateways()
            .iter()
            .filter(|nat| {
                matches!(by, LookupFilter::Id(_))
                    || !nat.state().is_some_and(|s| GONE_NAT_STATES.contains(s))
            })
            .filter_map(|nat| {
                let mut record = ResourceRecord::new(nat.nat_gateway_id()?);
                if let Some(state) = nat.state() {
                    record = record.with_status(state.as_str());
                }
                if let Some(subnet_id) = nat.subnet_id() {
                    record = record.with_field("subnet_id", subnet_id);
                }
                Some(record)
            })
            .collect())
    }

    pub async fn delete_nat_gateway(&self, nat_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete_nat_gateway()
            .nat_gateway_id(nat_id)
            .send()
            .await
            .map_err(sdk_error("DeleteNatGateway"))?;
        info!(nat_id = %nat_id, "Requested NAT gateway deletion");
        Ok(())
    }
}

fn attachment_parts<'a>(operation: &'static str, id: &'a str) -> Result<[&'a str; 2], ProviderError> {
    split_compound_id::<2>(id).ok_or_else(|| ProviderError::InvalidRequest {
        operation,
        message: format!("'{id}' is not an igw|vpc attachment identifier"),
    })
}

fn route_parts<'a>(operation: &'static str, id: &'a str) -> Result<[&'a str; 2], ProviderError> {
    split_compound_id::<2>(id).ok_or_else(|| ProviderError::InvalidRequest {
        operation,
        message: format!("'{id}' is not a route-table|destination route identifier"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_parts() {
        assert_eq!(
            route_parts("DeleteRoute", "rtb-1|0.0.0.0/0").unwrap(),
            ["rtb-1", "0.0.0.0/0"]
        );
        let err = route_parts("DeleteRoute", "rtb-1").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest { operation: "DeleteRoute", .. }));
    }

    #[test]
    fn test_attachment_parts() {
        assert_eq!(
            attachment_parts("DetachInternetGateway", "igw-1|vpc-2").unwrap(),
            ["igw-1", "vpc-2"]
        );
        assert!(attachment_parts("DetachInternetGateway", "igw-1|vpc-2|x").is_err());
    }
}
