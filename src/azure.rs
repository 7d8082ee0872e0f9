//! Azure control plane driven through the `az` CLI.
//!
//! Authentication rides on the ambient `az` session; there is no token
//! handling here. Every wrapper shells out, captures JSON on stdout and
//! maps the exit status into the calling module's error type.

use std::process::{Command, Output, Stdio};
use log::{debug, info};

use crate::bind::{self, IdentityBinding, RoleGrant, RoleKind};
use crate::deploy;
use crate::descriptor::{outputs, NetworkExposure, ResourceDescriptor, ResourceKind};
use crate::manifest::Manifest;
use crate::provision::{self, ControlPlane, EnsureOutcome};

pub struct AzCli {
    pub resource_group: String,
}

impl AzCli {
    pub fn new(resource_group: &str) -> Self {
        Self {
            resource_group: resource_group.to_string(),
        }
    }

    pub(crate) fn run(&self, args: &[&str]) -> Result<serde_json::Value, AzFailure> {
        debug!("az {}", args.join(" "));
        let output = Command::new("az")
            .args(args)
            .args(["--output", "json"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| AzFailure {
                transient: false,
                conflict: false,
                detail: format!("spawn az: {err}"),
            })?;
        classify(&output)
    }
}

/// Raw failure from one `az` invocation, before it is mapped into a
/// module error. Throttling and gateway errors count as transient;
/// conflicts mark a resource that exists with different properties.
#[derive(Debug)]
pub struct AzFailure {
    pub transient: bool,
    pub conflict: bool,
    pub detail: String,
}

fn classify(output: &Output) -> Result<serde_json::Value, AzFailure> {
    if output.status.success() {
        if output.stdout.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        return serde_json::from_slice(&output.stdout).map_err(|err| AzFailure {
            transient: false,
            conflict: false,
            detail: format!("unparseable az output: {err}"),
        });
    }
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let transient = ["TooManyRequests", "429", "GatewayTimeout", "ServiceUnavailable"]
        .iter()
        .any(|marker| stderr.contains(marker));
    Err(AzFailure {
        transient,
        conflict: stderr.contains("Conflict"),
        detail: stderr,
    })
}

fn is_not_found(detail: &str) -> bool {
    ["ResourceNotFound", "NotFound", "does not exist", "not found"]
        .iter()
        .any(|marker| detail.contains(marker))
}

fn string_at<'v>(value: &'v serde_json::Value, pointer: &str) -> Option<&'v str> {
    value.pointer(pointer).and_then(serde_json::Value::as_str)
}

impl AzCli {
    /// Verify there is a logged-in `az` session before any work starts.
    pub fn check_session(&self) -> Result<String, AzFailure> {
        let account = self.run(&["account", "show"])?;
        let subscription = string_at(&account, "/id").unwrap_or("unknown").to_string();
        info!("using az session for subscription {subscription}");
        Ok(subscription)
    }

    fn public_network_args(network: &NetworkExposure) -> Vec<String> {
        match network {
            NetworkExposure::Private => {
                vec!["--public-network-access".into(), "Disabled".into()]
            }
            NetworkExposure::Public { ip_allow_list } if ip_allow_list.is_empty() => {
                vec!["--public-network-access".into(), "Enabled".into()]
            }
            NetworkExposure::Public { ip_allow_list } => vec![
                "--public-network-access".into(),
                "Enabled".into(),
                "--ip-range-filter".into(),
                ip_allow_list.join(","),
            ],
        }
    }

    /// Show-and-compare, then create only when absent: an existing
    /// resource with matching properties costs one read and zero
    /// mutating calls, a property mismatch is a conflict before any
    /// mutation is attempted.
    fn ensure_inner(&self, d: &ResourceDescriptor) -> Result<EnsureOutcome, AzFailure> {
        if let Some(existing) = self.show(d)? {
            verify_unchanged(d, &existing)?;
            return Ok(EnsureOutcome {
                created: false,
                outputs: harvest(d, &existing),
            });
        }
        let v = self.create(d)?;
        Ok(EnsureOutcome {
            created: true,
            outputs: harvest(d, &v),
        })
    }

    fn create(&self, d: &ResourceDescriptor) -> Result<serde_json::Value, AzFailure> {
        let rg = self.resource_group.as_str();
        match d.kind {
            ResourceKind::Registry => self.run(&[
                "acr", "create", "--name", &d.name, "--resource-group", rg,
                "--location", &d.region, "--sku",
                d.properties.get("sku").map(String::as_str).unwrap_or("Basic"),
            ]),
            ResourceKind::Identity => self.run(&[
                "identity", "create", "--name", &d.name, "--resource-group", rg,
                "--location", &d.region,
            ]),
            ResourceKind::DatabaseAccount => {
                let network = Self::public_network_args(&d.network);
                let mut args: Vec<&str> = vec![
                    "cosmosdb", "create", "--name", &d.name, "--resource-group", rg,
                    "--locations", // regionName=<region> is the az syntax
                ];
                let locations = format!("regionName={}", d.region);
                args.push(&locations);
                let network_refs: Vec<&str> = network.iter().map(String::as_str).collect();
                args.extend(network_refs);
                self.run(&args)
            }
            ResourceKind::Database => {
                let account = d.properties.get("account").map(String::as_str).unwrap_or_default();
                self.run(&[
                    "cosmosdb", "sql", "database", "create", "--name", &d.name,
                    "--account-name", account, "--resource-group", rg,
                ])
            }
            ResourceKind::Container => {
                let account = d.properties.get("account").map(String::as_str).unwrap_or_default();
                let database = d.properties.get("database").map(String::as_str).unwrap_or_default();
                let pk = d
                    .properties
                    .get("partitionKeyPath")
                    .map(String::as_str)
                    .unwrap_or("/id");
                self.run(&[
                    "cosmosdb", "sql", "container", "create", "--name", &d.name,
                    "--account-name", account, "--database-name", database,
                    "--resource-group", rg, "--partition-key-path", pk,
                ])
            }
            ResourceKind::ComputeHost => match host_kind(d) {
                "aks" => self.run(&[
                    "aks", "create", "--name", &d.name, "--resource-group", rg,
                    "--location", &d.region, "--enable-oidc-issuer",
                    "--enable-workload-identity", "--node-count",
                    d.properties.get("nodeCount").map(String::as_str).unwrap_or("1"),
                ]),
                "appservice" => self.run(&[
                    "appservice", "plan", "create", "--name", &d.name,
                    "--resource-group", rg, "--location", &d.region, "--is-linux",
                    "--sku",
                    d.properties.get("sku").map(String::as_str).unwrap_or("B1"),
                ]),
                "functions" => {
                    let storage =
                        d.properties.get("storage").map(String::as_str).unwrap_or_default();
                    self.run(&[
                        "functionapp", "create", "--name", &d.name, "--resource-group", rg,
                        "--storage-account", storage, "--consumption-plan-location",
                        &d.region, "--functions-version", "4",
                    ])
                }
                // Container groups are created per workload by the
                // runtime, not as a provisioned host.
                _ => Ok(serde_json::Value::Null),
            },
        }
    }

    fn show(&self, d: &ResourceDescriptor) -> Result<Option<serde_json::Value>, AzFailure> {
        let Some(args) = show_args(d) else {
            return Ok(None);
        };
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let mut full: Vec<&str> = refs;
        full.push("--resource-group");
        full.push(&self.resource_group);
        match self.run(&full) {
            Ok(v) => Ok(Some(v)),
            Err(f) if is_not_found(&f.detail) => Ok(None),
            Err(f) => Err(f),
        }
    }
}

fn host_kind(d: &ResourceDescriptor) -> &str {
    d.properties.get("hostKind").map(String::as_str).unwrap_or("aks")
}

/// The `az ... show` invocation for a descriptor, without the trailing
/// resource-group pair. `None` means the kind has nothing to show.
fn show_args(d: &ResourceDescriptor) -> Option<Vec<String>> {
    let name = d.name.clone();
    let args: Vec<String> = match d.kind {
        ResourceKind::Registry => vec!["acr".into(), "show".into(), "--name".into(), name],
        ResourceKind::Identity => vec!["identity".into(), "show".into(), "--name".into(), name],
        ResourceKind::DatabaseAccount => {
            vec!["cosmosdb".into(), "show".into(), "--name".into(), name]
        }
        ResourceKind::Database => vec![
            "cosmosdb".into(), "sql".into(), "database".into(), "show".into(),
            "--name".into(), name,
            "--account-name".into(),
            d.properties.get("account").cloned().unwrap_or_default(),
        ],
        ResourceKind::Container => vec![
            "cosmosdb".into(), "sql".into(), "container".into(), "show".into(),
            "--name".into(), name,
            "--account-name".into(),
            d.properties.get("account").cloned().unwrap_or_default(),
            "--database-name".into(),
            d.properties.get("database").cloned().unwrap_or_default(),
        ],
        ResourceKind::ComputeHost => match host_kind(d) {
            "aks" => vec!["aks".into(), "show".into(), "--name".into(), name],
            "appservice" => vec![
                "appservice".into(), "plan".into(), "show".into(), "--name".into(), name,
            ],
            "functions" => vec!["functionapp".into(), "show".into(), "--name".into(), name],
            _ => return None,
        },
    };
    Some(args)
}

/// Pull the descriptor's well-known outputs out of a create or show
/// response. Pointers that the response lacks are simply skipped.
fn harvest(
    d: &ResourceDescriptor,
    v: &serde_json::Value,
) -> std::collections::BTreeMap<String, String> {
    let mut out = std::collections::BTreeMap::new();
    let mut put = |key: &str, pointer: &str| {
        if let Some(value) = string_at(v, pointer) {
            out.insert(key.to_string(), value.to_string());
        }
    };
    match d.kind {
        ResourceKind::Registry => put(outputs::REGISTRY_SERVER, "/loginServer"),
        ResourceKind::Identity => {
            put(outputs::IDENTITY_CLIENT_ID, "/clientId");
            put(outputs::IDENTITY_PRINCIPAL_ID, "/principalId");
            put(outputs::IDENTITY_RESOURCE_ID, "/id");
        }
        ResourceKind::DatabaseAccount => {
            put(outputs::DATABASE_ENDPOINT, "/documentEndpoint");
            put(outputs::DATABASE_ACCOUNT_ID, "/id");
        }
        ResourceKind::Database | ResourceKind::Container => {}
        ResourceKind::ComputeHost => {
            put(outputs::CLUSTER_OIDC_ISSUER, "/oidcIssuerProfile/issuerUrl");
        }
    }
    out
}

/// Compare an existing resource against the descriptor's declared
/// properties; a mismatch is a conflict, never an in-place overwrite.
fn verify_unchanged(d: &ResourceDescriptor, v: &serde_json::Value) -> Result<(), AzFailure> {
    if let Some(location) = string_at(v, "/location") {
        if !location.eq_ignore_ascii_case(&d.region) {
            return Err(AzFailure {
                transient: false,
                conflict: true,
                detail: format!(
                    "{} already exists in {location}, descriptor declares {}",
                    d.name, d.region
                ),
            });
        }
    }
    if d.kind == ResourceKind::Container {
        if let (Some(declared), Some(actual)) = (
            d.properties.get("partitionKeyPath"),
            string_at(v, "/resource/partitionKey/paths/0"),
        ) {
            if declared != actual {
                return Err(AzFailure {
                    transient: false,
                    conflict: true,
                    detail: format!(
                        "{} partition key is {actual}, descriptor declares {declared}",
                        d.name
                    ),
                });
            }
        }
    }
    Ok(())
}

impl ControlPlane for AzCli {
    fn ensure(&mut self, d: &ResourceDescriptor) -> Result<EnsureOutcome, provision::Error> {
        self.ensure_inner(d).map_err(|f| {
            if f.transient {
                provision::Error::TransientUnavailable {
                    name: d.name.clone(),
                    detail: f.detail,
                }
            } else if f.conflict {
                provision::Error::ResourceConflict {
                    name: d.name.clone(),
                    detail: f.detail,
                }
            } else {
                provision::Error::Rejected {
                    name: d.name.clone(),
                    detail: f.detail,
                }
            }
        })
    }
}

fn grant_failure(grant: &RoleGrant, f: AzFailure) -> bind::Error {
    if f.detail.contains("AuthorizationFailed") || f.detail.contains("Forbidden") {
        bind::Error::InsufficientPermission {
            role: grant.role.definition.clone(),
            scope: grant.scope.clone(),
            detail: f.detail,
        }
    } else {
        bind::Error::ControlPlane(f.detail)
    }
}

impl AzCli {
    /// Apply a role grant. Control-plane grants go through RBAC role
    /// assignments; data-plane grants go through the Cosmos DB account's
    /// own SQL role assignment API. The deterministic grant name makes
    /// a repeat apply a no-op instead of a duplicate.
    pub fn apply_role_grant(&self, grant: &RoleGrant) -> Result<(), bind::Error> {
        let result = match grant.role.kind {
            RoleKind::ControlPlane => self.run(&[
                "role", "assignment", "create",
                "--assignee-object-id", &grant.principal_id,
                "--assignee-principal-type", "ServicePrincipal",
                "--role", &grant.role.definition,
                "--scope", &grant.scope,
            ]),
            RoleKind::DataPlane => self.run(&[
                "cosmosdb", "sql", "role", "assignment", "create",
                "--resource-group", &self.resource_group,
                "--account-name", &grant.scope,
                "--role-assignment-id", &grant.name,
                "--role-definition-id", &grant.role.definition,
                "--principal-id", &grant.principal_id,
                "--scope", "/",
            ]),
        };
        match result {
            Ok(_) => Ok(()),
            // Same (principal, role, scope): the grant already exists.
            Err(f) if f.detail.contains("RoleAssignmentExists") => Ok(()),
            Err(f) => Err(grant_failure(grant, f)),
        }
    }

    /// Record the federation between the workload identity and its
    /// runtime principal on the identity resource.
    pub fn apply_federation(&self, binding: &IdentityBinding) -> Result<(), bind::Error> {
        self.run(&[
            "identity", "federated-credential", "create",
            "--name", &format!("fed-{}", binding.identity),
            "--identity-name", &binding.identity,
            "--resource-group", &self.resource_group,
            "--issuer", &binding.issuer,
            "--subject", &binding.subject,
            "--audiences", &binding.audience,
        ])
        .map(|_| ())
        .map_err(|f| bind::Error::ControlPlane(f.detail))
    }
}

/// Which serverless compute carries the workloads when the target is
/// not an orchestrated cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadHost {
    ContainerGroup,
    AppHost,
    Functions,
}

/// Runtime for the non-cluster targets. Rendered manifests for these
/// targets are JSON workload specs rather than Kubernetes YAML; the
/// runtime translates them into the matching `az` create/show calls.
pub struct AzWorkloadRuntime {
    az: AzCli,
    host: WorkloadHost,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkloadSpec {
    name: String,
    image: String,
    #[serde(default)]
    environment: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    identity: Option<String>,
    #[serde(default)]
    plan: Option<String>,
}

impl AzWorkloadRuntime {
    pub fn new(resource_group: &str, host: WorkloadHost) -> Self {
        Self {
            az: AzCli::new(resource_group),
            host,
        }
    }

    fn spec(manifest: &Manifest) -> Result<WorkloadSpec, deploy::Error> {
        serde_json::from_str(manifest.body()).map_err(|err| deploy::Error::ApplyRejected {
            manifest: manifest.name.clone(),
            detail: format!("workload spec: {err}"),
        })
    }

    fn env_args(spec: &WorkloadSpec) -> Vec<String> {
        spec.environment
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect()
    }
}

impl deploy::Runtime for AzWorkloadRuntime {
    fn apply(&mut self, manifest: &Manifest) -> Result<deploy::DeployHandle, deploy::Error> {
        let spec = Self::spec(manifest)?;
        let rg = self.az.resource_group.clone();
        let env = Self::env_args(&spec);

        let mut args: Vec<String> = match self.host {
            WorkloadHost::ContainerGroup => {
                let mut a: Vec<String> = vec![
                    "container".into(), "create".into(),
                    "--name".into(), spec.name.clone(),
                    "--resource-group".into(), rg.clone(),
                    "--image".into(), spec.image.clone(),
                    "--ip-address".into(), "Public".into(),
                    "--dns-name-label".into(), spec.name.clone(),
                    "--ports".into(), "80".into(),
                ];
                if !env.is_empty() {
                    a.push("--environment-variables".into());
                    a.extend(env);
                }
                a
            }
            WorkloadHost::AppHost => vec![
                "webapp".into(), "create".into(),
                "--name".into(), spec.name.clone(),
                "--resource-group".into(), rg.clone(),
                "--plan".into(), spec.plan.clone().unwrap_or_default(),
                "--deployment-container-image-name".into(), spec.image.clone(),
            ],
            WorkloadHost::Functions => vec![
                "functionapp".into(), "config".into(), "container".into(), "set".into(),
                "--name".into(), spec.name.clone(),
                "--resource-group".into(), rg.clone(),
                "--image".into(), spec.image.clone(),
            ],
        };
        if let Some(identity) = &spec.identity {
            args.push("--assign-identity".into());
            args.push(identity.clone());
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.az.run(&arg_refs).map_err(|f| deploy::Error::ApplyRejected {
            manifest: manifest.name.clone(),
            detail: f.detail,
        })?;

        // App settings are a separate call on the app hosts.
        if !matches!(self.host, WorkloadHost::ContainerGroup) && !spec.environment.is_empty() {
            let subcommand = match self.host {
                WorkloadHost::AppHost => "webapp",
                WorkloadHost::Functions => "functionapp",
                WorkloadHost::ContainerGroup => unreachable!(),
            };
            let mut settings_args: Vec<String> = vec![
                subcommand.into(), "config".into(), "appsettings".into(), "set".into(),
                "--name".into(), spec.name.clone(),
                "--resource-group".into(), rg.clone(),
                "--settings".into(),
            ];
            settings_args.extend(Self::env_args(&spec));
            let refs: Vec<&str> = settings_args.iter().map(String::as_str).collect();
            self.az.run(&refs).map_err(|f| deploy::Error::ApplyRejected {
                manifest: manifest.name.clone(),
                detail: f.detail,
            })?;
        }

        Ok(deploy::DeployHandle {
            workload: spec.name,
        })
    }

    fn probe(&mut self, handle: &deploy::DeployHandle) -> Result<deploy::Probe, deploy::Error> {
        let rg = self.az.resource_group.as_str();
        let (args, address_ptr, state_ptr, ready_state): (Vec<&str>, &str, &str, &str) =
            match self.host {
                WorkloadHost::ContainerGroup => (
                    vec!["container", "show", "--name", &handle.workload, "--resource-group", rg],
                    "/ipAddress/ip",
                    "/instanceView/state",
                    "Running",
                ),
                WorkloadHost::AppHost => (
                    vec!["webapp", "show", "--name", &handle.workload, "--resource-group", rg],
                    "/defaultHostName",
                    "/state",
                    "Running",
                ),
                WorkloadHost::Functions => (
                    vec!["functionapp", "show", "--name", &handle.workload, "--resource-group", rg],
                    "/defaultHostName",
                    "/state",
                    "Running",
                ),
            };
        let v = self.az.run(&args).map_err(|f| deploy::Error::ProbeFailed {
            workload: handle.workload.clone(),
            detail: f.detail,
        })?;
        Ok(deploy::Probe {
            address: string_at(&v, address_ptr).map(str::to_string),
            ready: string_at(&v, state_ptr) == Some(ready_state),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: i32, stdout: &str, stderr: &str) -> Output {
        use std::os::unix::process::ExitStatusExt;
        Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn success_parses_json() {
        let v = classify(&output(0, r#"{"loginServer":"x.azurecr.io"}"#, "")).unwrap();
        assert_eq!(string_at(&v, "/loginServer"), Some("x.azurecr.io"));
    }

    #[test]
    fn throttling_is_transient() {
        let f = classify(&output(1, "", "ERROR: TooManyRequests")).unwrap_err();
        assert!(f.transient);
    }

    #[test]
    fn other_failures_are_not_transient() {
        let f = classify(&output(1, "", "ERROR: InvalidTemplate")).unwrap_err();
        assert!(!f.transient);
    }

    #[test]
    fn conflicts_are_flagged_for_the_provisioner() {
        let f = classify(&output(1, "", "ERROR: Conflict: exists with other properties"))
            .unwrap_err();
        assert!(f.conflict);
        assert!(!f.transient);
    }

    fn descriptor(kind: ResourceKind, name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(name, kind, "westeurope")
    }

    #[test]
    fn show_follows_the_host_kind() {
        let aks = descriptor(ResourceKind::ComputeHost, "evtmgmt-aks");
        assert_eq!(show_args(&aks).unwrap()[0], "aks");

        let plan = descriptor(ResourceKind::ComputeHost, "evtmgmt-plan")
            .property("hostKind", "appservice");
        assert_eq!(show_args(&plan).unwrap()[..3], ["appservice", "plan", "show"]);

        let func = descriptor(ResourceKind::ComputeHost, "evtmgmt-func")
            .property("hostKind", "functions");
        assert_eq!(show_args(&func).unwrap()[0], "functionapp");

        let group = descriptor(ResourceKind::ComputeHost, "evtmgmt-aci")
            .property("hostKind", "container-group");
        assert!(show_args(&group).is_none());
    }

    #[test]
    fn show_response_yields_the_same_outputs_as_create() {
        let d = descriptor(ResourceKind::Identity, "evtmgmt-identity");
        let v: serde_json::Value = serde_json::json!({
            "clientId": "client-1",
            "principalId": "principal-1",
            "id": "/subscriptions/s/resourceGroups/rg/providers/x/evtmgmt-identity",
        });
        let out = harvest(&d, &v);
        assert_eq!(out.get(outputs::IDENTITY_CLIENT_ID).unwrap(), "client-1");
        assert_eq!(out.get(outputs::IDENTITY_PRINCIPAL_ID).unwrap(), "principal-1");
        assert!(out.get(outputs::IDENTITY_RESOURCE_ID).unwrap().ends_with("evtmgmt-identity"));
    }

    #[test]
    fn existing_resource_in_another_region_is_a_conflict() {
        let d = descriptor(ResourceKind::Registry, "evtmgmtacr");
        let v = serde_json::json!({ "location": "northeurope" });
        let f = verify_unchanged(&d, &v).unwrap_err();
        assert!(f.conflict);
    }

    #[test]
    fn matching_existing_resource_passes_verification() {
        let d = descriptor(ResourceKind::Registry, "evtmgmtacr");
        let v = serde_json::json!({ "location": "WestEurope" });
        assert!(verify_unchanged(&d, &v).is_ok());
    }

    #[test]
    fn container_partition_key_mismatch_is_a_conflict() {
        let d = descriptor(ResourceKind::Container, "Events").property("partitionKeyPath", "/id");
        let v = serde_json::json!({ "resource": { "partitionKey": { "paths": ["/tenant"] } } });
        assert!(verify_unchanged(&d, &v).unwrap_err().conflict);
    }

    #[test]
    fn private_network_maps_to_disabled_access() {
        let args = AzCli::public_network_args(&NetworkExposure::Private);
        assert_eq!(args, vec!["--public-network-access", "Disabled"]);
    }

    #[test]
    fn workload_spec_carries_the_user_assigned_identity() {
        let spec: WorkloadSpec = serde_json::from_str(
            r#"{
                "name": "backend",
                "image": "x.azurecr.io/backend:latest",
                "identity": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.ManagedIdentity/userAssignedIdentities/evtmgmt-identity",
                "environment": { "AZURE_CLIENT_ID": "client-1" }
            }"#,
        )
        .unwrap();
        assert!(spec.identity.as_deref().unwrap().ends_with("evtmgmt-identity"));
    }

    #[test]
    fn allow_list_is_joined_into_a_filter() {
        let args = AzCli::public_network_args(&NetworkExposure::Public {
            ip_allow_list: vec!["1.2.3.4".into(), "5.6.7.0/24".into()],
        });
        assert_eq!(args[3], "1.2.3.4,5.6.7.0/24");
    }
}
