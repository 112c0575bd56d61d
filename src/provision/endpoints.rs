//! Discovery of interface VPC endpoints for a profile.
use async_trait::async_trait;
use rusoto_core::{credential::ProfileProvider, region::Region, HttpClient};
use rusoto_ec2::{DescribeVpcEndpointsRequest, DescribeVpcEndpointsResult, Ec2, Ec2Client};

use super::profiles::ProfileSpec;
use crate::types::UtilResult;

/// Endpoint type of the endpoints which expose a DNS name per service.
pub const INTERFACE: &str = "Interface";

/// A VPC endpoint, reduced to the fields needed to build overrides.
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointRecord {
    pub endpoint_type: String,
    pub service_name: String,
    pub dns_names: Vec<String>,
}

/// Source of the VPC endpoints provisioned for a profile.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    /// Lists every VPC endpoint visible to the profile, in API order.
    async fn endpoints(&self, profile: &ProfileSpec) -> UtilResult<Vec<EndpointRecord>>;
}

/// `EndpointSource` calling EC2 with each profile's own credentials.
pub struct Ec2Endpoints;

#[async_trait]
impl EndpointSource for Ec2Endpoints {
    async fn endpoints(&self, profile: &ProfileSpec) -> UtilResult<Vec<EndpointRecord>> {
        // static keys or credential_process only, see README
        let mut credentials = ProfileProvider::new()?;
        credentials.set_profile(profile.name.as_str());

        let region: Region = profile.region.parse()?;
        let ec2 = Ec2Client::new_with(HttpClient::new()?, credentials, region);

        let mut records = Vec::new();
        let mut token = None;

        loop {
            let request = DescribeVpcEndpointsRequest {
                next_token: token.take(),
                ..DescribeVpcEndpointsRequest::default()
            };

            let response = ec2.describe_vpc_endpoints(request).await?;

            token = collect_records(response, &mut records);
            if token.is_none() {
                return Ok(records);
            }
        }
    }
}

/// Reduces a page of `DescribeVpcEndpoints` output into records.
///
/// Returns the token of the next page, if there is one.
fn collect_records(
    page: DescribeVpcEndpointsResult,
    records: &mut Vec<EndpointRecord>,
) -> Option<String> {
    for endpoint in page.vpc_endpoints.unwrap_or_default() {
        let dns_names = endpoint
            .dns_entries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| entry.dns_name)
            .collect();

        records.push(EndpointRecord {
            endpoint_type: endpoint.vpc_endpoint_type.unwrap_or_default(),
            service_name: endpoint.service_name.unwrap_or_default(),
            dns_names,
        });
    }

    // an empty token is the last page too
    page.next_token.filter(|token| !token.is_empty())
}

/// Maps each service identifier to the hostname of its endpoint.
///
/// An endpoint serves a service when it's an interface endpoint with a
/// service name containing the identifier. When several endpoints match,
/// the first one (in enumeration order) with a DNS name wins. Services
/// without a match are left out; the result follows `services` order.
pub fn match_services(endpoints: &[EndpointRecord], services: &[String]) -> Vec<(String, String)> {
    services
        .iter()
        .filter_map(|service| {
            endpoints
                .iter()
                .filter(|endpoint| endpoint.endpoint_type == INTERFACE)
                .filter(|endpoint| endpoint.service_name.contains(service.as_str()))
                .find_map(|endpoint| endpoint.dns_names.first())
                .map(|host| (service.clone(), host.clone()))
        })
        .collect()
}
