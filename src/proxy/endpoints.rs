//! Service resolution: mapping a request `Host` to signing metadata.
//!
//! The [`EndpointTable`] is an immutable host → [`ResolvedEndpoint`] map
//! built once at startup from embedded partition metadata and injected
//! into the [`ServiceResolver`]. Pattern-based rules (API Gateway and
//! managed search hosts) always win over table entries, followed by an
//! exact lookup and a dotted-suffix fallback that covers virtual-hosted
//! object storage buckets.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Signing metadata for one endpoint host. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub url: String,
    /// `"v4"`, `"s3v4"` (header signing) or `"s3"` (presigned URL).
    pub signing_method: String,
    pub signing_region: String,
    pub signing_name: String,
    pub partition_id: String,
    /// True when the signing name was derived from the service id rather
    /// than modeled explicitly in the partition metadata.
    pub signing_name_derived: bool,
}

static API_GATEWAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_-]+\.execute-api\.([a-zA-Z0-9_-]+)\.amazonaws\.com$")
        .expect("static regex is valid")
});

static MANAGED_SEARCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_-]+\.([a-zA-Z0-9_-]+)\.es\.amazonaws\.com$")
        .expect("static regex is valid")
});

const PARTITION_DATA: &str = include_str!("partitions.json");

const DEFAULT_HOST_TEMPLATE: &str = "{service}.{region}.{dnsSuffix}";

fn default_true() -> bool {
    true
}

fn default_signing_method() -> String {
    "v4".to_string()
}

#[derive(Debug, Deserialize)]
struct PartitionSet {
    partitions: Vec<Partition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Partition {
    id: String,
    dns_suffix: String,
    regions: Vec<String>,
    services: Vec<ServiceSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ServiceSpec {
    id: String,

    #[serde(default)]
    signing_name: Option<String>,

    #[serde(default = "default_signing_method")]
    signing_method: String,

    /// Host templates; defaults to `{service}.{region}.{dnsSuffix}`.
    #[serde(default)]
    hosts: Vec<String>,

    /// When false the service has no per-region endpoints, only globals.
    #[serde(default = "default_true")]
    regional: bool,

    /// Fixed hosts mapped to the region requests to them are signed for.
    #[serde(default)]
    global_hosts: HashMap<String, String>,
}

fn expand(template: &str, service: &str, region: &str, dns_suffix: &str) -> String {
    template
        .replace("{service}", service)
        .replace("{region}", region)
        .replace("{dnsSuffix}", dns_suffix)
}

/// Read-only host → endpoint mapping, safe for unsynchronized concurrent
/// reads once constructed.
#[derive(Debug, Default)]
pub struct EndpointTable {
    hosts: HashMap<String, ResolvedEndpoint>,
}

impl EndpointTable {
    /// Build the table from the embedded partition metadata: every
    /// partition/service/endpoint triple, including the synthesized
    /// per-region `execute-api` and search/observability entries.
    #[must_use]
    pub fn builtin() -> Self {
        let doc: PartitionSet =
            serde_json::from_str(PARTITION_DATA).expect("embedded partition metadata is valid");
        Self::from_document(&doc)
    }

    /// Build a table from explicit entries. Tests use this to substitute
    /// a minimal topology.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, ResolvedEndpoint)>,
    {
        Self {
            hosts: entries.into_iter().collect(),
        }
    }

    fn from_document(doc: &PartitionSet) -> Self {
        let mut hosts = HashMap::new();

        for partition in &doc.partitions {
            for service in &partition.services {
                let signing_name = service
                    .signing_name
                    .clone()
                    .unwrap_or_else(|| service.id.clone());
                let derived = service.signing_name.is_none();

                let endpoint = |host: String, region: &str| ResolvedEndpoint {
                    url: format!("https://{host}"),
                    signing_method: service.signing_method.clone(),
                    signing_region: region.to_string(),
                    signing_name: signing_name.clone(),
                    partition_id: partition.id.clone(),
                    signing_name_derived: derived,
                };

                if service.regional {
                    let default_template = [DEFAULT_HOST_TEMPLATE.to_string()];
                    let templates: &[String] = if service.hosts.is_empty() {
                        &default_template
                    } else {
                        &service.hosts
                    };
                    for region in &partition.regions {
                        for template in templates {
                            let host =
                                expand(template, &service.id, region, &partition.dns_suffix);
                            hosts.insert(host.clone(), endpoint(host, region));
                        }
                    }
                }

                for (template, region) in &service.global_hosts {
                    let host = expand(template, &service.id, region, &partition.dns_suffix);
                    hosts.insert(host.clone(), endpoint(host, region));
                }
            }
        }

        Self { hosts }
    }

    #[must_use]
    pub fn get(&self, host: &str) -> Option<&ResolvedEndpoint> {
        self.hosts.get(host)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Maps a request's target host to signing metadata. Pure lookup over the
/// injected [`EndpointTable`]; no locking, no I/O.
#[derive(Debug)]
pub struct ServiceResolver {
    table: EndpointTable,
}

impl ServiceResolver {
    #[must_use]
    pub fn new(table: EndpointTable) -> Self {
        Self { table }
    }

    /// Resolve `host` to its signing endpoint. First match wins:
    /// API Gateway pattern, managed search pattern, exact table entry,
    /// dotted-suffix fallback.
    #[must_use]
    pub fn resolve(&self, host: &str) -> Option<ResolvedEndpoint> {
        if let Some(caps) = API_GATEWAY.captures(host) {
            return Some(ResolvedEndpoint {
                url: format!("https://{host}"),
                signing_method: "v4".to_string(),
                signing_region: caps[1].to_string(),
                signing_name: "execute-api".to_string(),
                partition_id: "aws".to_string(),
                signing_name_derived: false,
            });
        }

        if let Some(caps) = MANAGED_SEARCH.captures(host) {
            return Some(ResolvedEndpoint {
                url: format!("https://{host}"),
                signing_method: "v4".to_string(),
                signing_region: caps[1].to_string(),
                signing_name: "es".to_string(),
                partition_id: "aws".to_string(),
                signing_name_derived: false,
            });
        }

        if let Some(endpoint) = self.table.get(host) {
            return Some(endpoint.clone());
        }

        self.suffix_match(host).cloned()
    }

    /// Longest table key `k` such that `host` ends with `"." + k`. Covers
    /// wildcard sub-resource hosts, e.g. virtual-hosted bucket names in
    /// front of an object storage endpoint.
    fn suffix_match(&self, host: &str) -> Option<&ResolvedEndpoint> {
        self.table
            .hosts
            .iter()
            .filter(|(key, _)| {
                !key.is_empty()
                    && host
                        .strip_suffix(key.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .max_by_key(|(key, _)| key.len())
            .map(|(_, endpoint)| endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(method: &str, region: &str, name: &str) -> ResolvedEndpoint {
        ResolvedEndpoint {
            url: String::new(),
            signing_method: method.to_string(),
            signing_region: region.to_string(),
            signing_name: name.to_string(),
            partition_id: "aws".to_string(),
            signing_name_derived: true,
        }
    }

    #[test]
    fn api_gateway_pattern_resolves() {
        let resolver = ServiceResolver::new(EndpointTable::default());
        let endpoint = resolver
            .resolve("a1b2c3.execute-api.eu-west-2.amazonaws.com")
            .unwrap();
        assert_eq!(endpoint.signing_name, "execute-api");
        assert_eq!(endpoint.signing_method, "v4");
        assert_eq!(endpoint.signing_region, "eu-west-2");
        assert_eq!(endpoint.partition_id, "aws");
    }

    #[test]
    fn managed_search_pattern_resolves() {
        let resolver = ServiceResolver::new(EndpointTable::default());
        let endpoint = resolver
            .resolve("my-domain.us-east-1.es.amazonaws.com")
            .unwrap();
        assert_eq!(endpoint.signing_name, "es");
        assert_eq!(endpoint.signing_region, "us-east-1");
    }

    #[test]
    fn pattern_wins_over_table_entry() {
        let host = "abc123.execute-api.us-west-2.amazonaws.com";
        let table = EndpointTable::from_entries([(
            host.to_string(),
            entry("s3", "eu-central-1", "wrong-service"),
        )]);
        let resolver = ServiceResolver::new(table);

        let endpoint = resolver.resolve(host).unwrap();
        assert_eq!(endpoint.signing_name, "execute-api");
        assert_eq!(endpoint.signing_region, "us-west-2");
    }

    #[test]
    fn exact_table_lookup() {
        let table = EndpointTable::from_entries([(
            "sqs.us-east-2.amazonaws.com".to_string(),
            entry("v4", "us-east-2", "sqs"),
        )]);
        let resolver = ServiceResolver::new(table);

        let endpoint = resolver.resolve("sqs.us-east-2.amazonaws.com").unwrap();
        assert_eq!(endpoint.signing_name, "sqs");
    }

    #[test]
    fn suffix_fallback_matches_virtual_hosted_bucket() {
        let table = EndpointTable::from_entries([(
            "s3.amazonaws.com".to_string(),
            entry("s3", "us-east-1", "s3"),
        )]);
        let resolver = ServiceResolver::new(table);

        let endpoint = resolver.resolve("my-bucket.s3.amazonaws.com").unwrap();
        assert_eq!(endpoint.signing_name, "s3");
        assert_eq!(endpoint.signing_method, "s3");
    }

    #[test]
    fn suffix_fallback_requires_dot_boundary() {
        let table = EndpointTable::from_entries([(
            "s3.amazonaws.com".to_string(),
            entry("s3", "us-east-1", "s3"),
        )]);
        let resolver = ServiceResolver::new(table);

        // "xs3.amazonaws.com" ends with the key but not on a label boundary.
        assert!(resolver.resolve("xs3.amazonaws.com").is_none());
    }

    #[test]
    fn unknown_host_returns_none() {
        let resolver = ServiceResolver::new(EndpointTable::default());
        assert!(resolver.resolve("badservice.host").is_none());
    }

    #[test]
    fn builtin_table_has_legacy_global_s3() {
        let resolver = ServiceResolver::new(EndpointTable::builtin());
        let endpoint = resolver.resolve("s3.amazonaws.com").unwrap();
        assert_eq!(endpoint.signing_method, "s3");
        assert_eq!(endpoint.signing_region, "us-east-1");
        assert_eq!(endpoint.signing_name, "s3");
    }

    #[test]
    fn builtin_table_has_regional_and_global_entries() {
        let table = EndpointTable::builtin();
        assert!(table.get("dynamodb.eu-west-1.amazonaws.com").is_some());
        assert!(table.get("iam.amazonaws.com").is_some());
        assert!(table.get("api.ecr.us-east-1.amazonaws.com").is_some());
        assert!(table.get("s3.dualstack.ap-south-1.amazonaws.com").is_some());
        assert!(table.get("s3.cn-north-1.amazonaws.com.cn").is_some());
        assert!(table.get("sts.us-gov-west-1.amazonaws.com").is_some());

        // Synthesized per-region entries for API Gateway and search hosts.
        assert!(table.get("execute-api.us-east-1.amazonaws.com").is_some());
        assert!(table.get("es.us-east-1.amazonaws.com").is_some());
        assert!(table.get("aoss.us-east-1.amazonaws.com").is_some());
    }

    #[test]
    fn builtin_regional_services_sign_with_v4() {
        let table = EndpointTable::builtin();
        let endpoint = table.get("lambda.ap-northeast-1.amazonaws.com").unwrap();
        assert_eq!(endpoint.signing_method, "v4");
        assert_eq!(endpoint.signing_region, "ap-northeast-1");
        assert!(endpoint.signing_name_derived);
    }
}
