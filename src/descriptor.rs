use std::collections::{BTreeMap, HashMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Well-known output keys produced by provisioning.
pub mod outputs {
    pub const DATABASE_ENDPOINT: &str = "databaseEndpoint";
    pub const IDENTITY_CLIENT_ID: &str = "identityClientId";
    pub const IDENTITY_PRINCIPAL_ID: &str = "identityPrincipalId";
    pub const IDENTITY_RESOURCE_ID: &str = "identityResourceId";
    pub const DATABASE_ACCOUNT_ID: &str = "databaseAccountId";
    pub const CLUSTER_OIDC_ISSUER: &str = "clusterOidcIssuer";
    pub const REGISTRY_SERVER: &str = "registryServer";
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("descriptor {descriptor} depends on {reference}, which is not declared")]
    DanglingReference {
        descriptor: String,
        reference: String,
    },

    #[error("dependency cycle involving {0}")]
    Cycle(String),

    #[error("duplicate descriptor name {0}")]
    DuplicateName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Registry,
    Identity,
    DatabaseAccount,
    Database,
    Container,
    ComputeHost,
}

/// Network exposure is always declared explicitly on a descriptor.
/// The default is fully private; widening access is an opt-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkExposure {
    Private,
    Public { ip_allow_list: Vec<String> },
}

impl Default for NetworkExposure {
    fn default() -> Self {
        NetworkExposure::Private
    }
}

/// Declarative specification of one cloud resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    pub kind: ResourceKind,
    pub region: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub network: NetworkExposure,
}

impl ResourceDescriptor {
    pub fn new(name: &str, kind: ResourceKind, region: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            region: region.to_string(),
            depends_on: Vec::new(),
            properties: BTreeMap::new(),
            network: NetworkExposure::Private,
        }
    }

    pub fn depends_on(mut self, name: &str) -> Self {
        self.depends_on.push(name.to_string());
        self
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn network(mut self, exposure: NetworkExposure) -> Self {
        self.network = exposure;
        self
    }
}

/// Resolved values (endpoints, IDs) keyed by output name.
/// Written once per key by the provisioner, read-only downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outputs(BTreeMap<String, String>);

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }

    pub fn merge(&mut self, other: BTreeMap<String, String>) {
        self.0.extend(other);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Order descriptors so that every dependency comes before its dependents.
///
/// Returns indexes into the input slice. Ties are broken by declaration
/// order, so the result is deterministic. Cycles and references to
/// undeclared descriptors are rejected before any index is returned.
pub fn topo_order(descriptors: &[ResourceDescriptor]) -> Result<Vec<usize>, Error> {
    let mut index_of = HashMap::with_capacity(descriptors.len());
    for (i, d) in descriptors.iter().enumerate() {
        if index_of.insert(d.name.as_str(), i).is_some() {
            return Err(Error::DuplicateName(d.name.clone()));
        }
    }

    let mut in_degree = vec![0usize; descriptors.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); descriptors.len()];
    for (i, d) in descriptors.iter().enumerate() {
        for dep in &d.depends_on {
            let Some(&j) = index_of.get(dep.as_str()) else {
                return Err(Error::DanglingReference {
                    descriptor: d.name.clone(),
                    reference: dep.clone(),
                });
            };
            in_degree[i] += 1;
            dependents[j].push(i);
        }
    }

    // Kahn's algorithm; the ready list is kept sorted so that siblings
    // come out in declaration order.
    let mut ready: Vec<usize> = (0..descriptors.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(descriptors.len());

    while let Some(&i) = ready.first() {
        ready.remove(0);
        order.push(i);
        for &dep in &dependents[i] {
            in_degree[dep] -= 1;
            if in_degree[dep] == 0 {
                let pos = ready.partition_point(|&r| r < dep);
                ready.insert(pos, dep);
            }
        }
    }

    if order.len() != descriptors.len() {
        let stuck = (0..descriptors.len())
            .find(|&i| in_degree[i] > 0)
            .map(|i| descriptors[i].name.clone())
            .unwrap_or_default();
        return Err(Error::Cycle(stuck));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(name: &str, deps: &[&str]) -> ResourceDescriptor {
        let mut desc = ResourceDescriptor::new(name, ResourceKind::Database, "westeurope");
        for dep in deps {
            desc = desc.depends_on(dep);
        }
        desc
    }

    #[test]
    fn dependencies_come_before_dependents() {
        let descriptors = vec![
            d("container", &["database"]),
            d("database", &["account"]),
            d("account", &[]),
        ];
        let order = topo_order(&descriptors).unwrap();
        let names: Vec<&str> = order.iter().map(|&i| descriptors[i].name.as_str()).collect();
        assert_eq!(names, vec!["account", "database", "container"]);
    }

    #[test]
    fn independent_descriptors_keep_declaration_order() {
        let descriptors = vec![
            d("identity", &[]),
            d("account", &[]),
            d("database", &["account"]),
            d("container", &["database"]),
            d("compute", &[]),
        ];
        let order = topo_order(&descriptors).unwrap();
        let names: Vec<&str> = order.iter().map(|&i| descriptors[i].name.as_str()).collect();
        let pos = |n: &str| names.iter().position(|&x| x == n).unwrap();
        assert!(pos("account") < pos("database"));
        assert!(pos("database") < pos("container"));
        // No mutual dependency between identity and compute; both orders
        // are legal, declaration order is what we promise.
        assert_eq!(names[0], "identity");
        assert!(names.contains(&"compute"));
    }

    #[test]
    fn cycle_is_rejected() {
        let descriptors = vec![d("a", &["b"]), d("b", &["a"])];
        assert!(matches!(topo_order(&descriptors), Err(Error::Cycle(_))));
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let descriptors = vec![d("a", &["ghost"])];
        assert!(matches!(
            topo_order(&descriptors),
            Err(Error::DanglingReference { .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let descriptors = vec![d("a", &[]), d("a", &[])];
        assert!(matches!(topo_order(&descriptors), Err(Error::DuplicateName(_))));
    }

    #[test]
    fn network_exposure_defaults_to_private() {
        let desc = ResourceDescriptor::new("db", ResourceKind::DatabaseAccount, "westeurope");
        assert_eq!(desc.network, NetworkExposure::Private);
    }
}
