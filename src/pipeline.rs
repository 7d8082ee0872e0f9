//! One deployment run, start to finish: provision the resource graph,
//! bind credentials, render and deploy the backend, then render the
//! frontend against the backend's resolved address and deploy it.
//!
//! The run is strictly sequential; the readiness polls are the only
//! suspension points and all of them honor the run's cancellation token.

use std::time::Duration;
use clap::ValueEnum;
use log::{info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::azure::{AzCli, AzWorkloadRuntime, WorkloadHost};
use crate::bind::{self, RoleRef};
use crate::config;
use crate::deploy::{self, PollPolicy, ReadinessRecord, Runtime, WorkloadState};
use crate::descriptor::{
    outputs, NetworkExposure, Outputs, ResourceDescriptor, ResourceKind,
};
use crate::kubectl::Kubectl;
use crate::manifest::{self, render, tokens, Bindings, Template};
use crate::provision;

/// Cosmos DB built-in data contributor, the minimum grant the
/// application needs. The control-plane reader role is optional and
/// off by default.
const COSMOS_DATA_CONTRIBUTOR: &str = "00000000-0000-0000-0000-000000000002";
const COSMOS_ACCOUNT_READER: &str = "Cosmos DB Account Reader Role";

const FEDERATION_AUDIENCE: &str = "api://AzureADTokenExchange";
const SERVICE_ACCOUNT_NAMESPACE: &str = "default";
const SERVICE_ACCOUNT_NAME: &str = "eventmgmt-backend";

const DEFAULT_BACKEND_YAML: &str = include_str!("../deploy/backend.yaml");
const DEFAULT_FRONTEND_YAML: &str = include_str!("../deploy/frontend.yaml");
const BACKEND_SPEC_JSON: &str = include_str!("../deploy/backend.json");
const FRONTEND_SPEC_JSON: &str = include_str!("../deploy/frontend.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// Orchestrated Kubernetes cluster with workload identity.
    Cluster,
    /// Azure container instances, one group per workload.
    ContainerGroup,
    /// Managed app host (App Service).
    AppHost,
    /// Serverless functions host.
    Functions,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("az session: {0}")]
    Preflight(String),

    #[error("provisioning: {0}")]
    Provision(#[from] provision::Failure),

    #[error("output {key} was not resolved by provisioning")]
    MissingOutput { key: &'static str },

    #[error("credential binding: {0}")]
    Bind(#[from] bind::Error),

    #[error("rendering: {0}")]
    Render(#[from] manifest::Error),

    #[error("deployment: {0}")]
    Deploy(#[from] deploy::Error),
}

pub struct Params {
    pub target: Target,
    pub resource_group: String,
    pub region: String,
    pub config: config::File,
}

/// The resource graph for one target environment. Order of declaration
/// is the tie-break order; dependencies are explicit.
pub fn descriptors(params: &Params) -> Vec<ResourceDescriptor> {
    let prefix = params.config.name_prefix.as_str();
    let region = params.region.as_str();
    let account = format!("{prefix}-cosmos");

    let mut graph = vec![
        ResourceDescriptor::new(&format!("{prefix}acr"), ResourceKind::Registry, region),
        ResourceDescriptor::new(&format!("{prefix}-identity"), ResourceKind::Identity, region),
        // The application containers connect over the public endpoint;
        // widening access is the explicit opt-in here.
        ResourceDescriptor::new(&account, ResourceKind::DatabaseAccount, region).network(
            NetworkExposure::Public {
                ip_allow_list: Vec::new(),
            },
        ),
        ResourceDescriptor::new(&params.config.database.name, ResourceKind::Database, region)
            .depends_on(&account)
            .property("account", &account),
        ResourceDescriptor::new(&params.config.database.container, ResourceKind::Container, region)
            .depends_on(&params.config.database.name)
            .property("account", &account)
            .property("database", &params.config.database.name)
            .property("partitionKeyPath", &params.config.database.partition_key_path),
    ];

    match params.target {
        Target::Cluster => graph.push(
            ResourceDescriptor::new(&format!("{prefix}-aks"), ResourceKind::ComputeHost, region)
                .property("hostKind", "aks"),
        ),
        Target::AppHost => graph.push(
            ResourceDescriptor::new(&format!("{prefix}-plan"), ResourceKind::ComputeHost, region)
                .property("hostKind", "appservice"),
        ),
        Target::Functions => graph.push(
            ResourceDescriptor::new(&format!("{prefix}-func"), ResourceKind::ComputeHost, region)
                .property("hostKind", "functions")
                .property("storage", &format!("{prefix}store")),
        ),
        // Container groups are created per workload at deploy time;
        // there is no host to provision up front.
        Target::ContainerGroup => {}
    }

    graph
}

fn backend_template(params: &Params) -> Result<Template, manifest::Error> {
    match params.target {
        Target::Cluster => template_or_default("backend", &params.config.templates.backend, DEFAULT_BACKEND_YAML),
        _ => Ok(Template::new("backend", BACKEND_SPEC_JSON)),
    }
}

fn frontend_template(params: &Params) -> Result<Template, manifest::Error> {
    match params.target {
        Target::Cluster => template_or_default("frontend", &params.config.templates.frontend, DEFAULT_FRONTEND_YAML),
        _ => Ok(Template::new("frontend", FRONTEND_SPEC_JSON)),
    }
}

fn template_or_default(name: &str, path: &str, fallback: &str) -> Result<Template, manifest::Error> {
    if std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false) {
        Template::from_file(name, path)
    } else {
        Ok(Template::new(name, fallback))
    }
}

fn required_output<'a>(resolved: &'a Outputs, key: &'static str) -> Result<&'a str, Error> {
    resolved.get(key).ok_or(Error::MissingOutput { key })
}

/// Bindings for the first render pass. The backend needs exactly the
/// database endpoint, the identity client reference and its image; an
/// output the provisioner never resolved fails here rather than binding
/// an empty value into the manifest. The serverless hosts additionally
/// attach the user-assigned identity by its resource id; on the cluster
/// the federated service account carries it instead.
pub fn backend_bindings(params: &Params, resolved: &Outputs) -> Result<Bindings, Error> {
    let mut bindings = Bindings::new()
        .set(tokens::REGISTRY_NAME, required_output(resolved, outputs::REGISTRY_SERVER)?)
        .set(tokens::IMAGE, &params.config.images.backend)
        .set(tokens::DB_ENDPOINT, required_output(resolved, outputs::DATABASE_ENDPOINT)?)
        .set(
            tokens::IDENTITY_CLIENT_ID,
            required_output(resolved, outputs::IDENTITY_CLIENT_ID)?,
        );
    if params.target != Target::Cluster {
        bindings = bindings.set(
            tokens::IDENTITY_RESOURCE_ID,
            required_output(resolved, outputs::IDENTITY_RESOURCE_ID)?,
        );
    }
    Ok(bindings)
}

/// Bindings for the second render pass. The frontend gets the raw
/// resolved backend address injected at render time; service-name DNS
/// is not available on every target, so no name indirection here.
pub fn frontend_bindings(
    params: &Params,
    resolved: &Outputs,
    backend: &ReadinessRecord,
) -> Result<Bindings, Error> {
    Ok(Bindings::new()
        .set(tokens::REGISTRY_NAME, required_output(resolved, outputs::REGISTRY_SERVER)?)
        .set(tokens::IMAGE, &params.config.images.frontend)
        .set(tokens::BACKEND_ADDRESS, &backend.address))
}

fn poll_policy(params: &Params) -> PollPolicy {
    PollPolicy {
        interval: Duration::from_secs(params.config.readiness.poll_interval_seconds),
        max_attempts: params.config.readiness.max_attempts,
    }
}

fn runtime_for(params: &Params) -> Box<dyn Runtime> {
    match params.target {
        Target::Cluster => Box::new(Kubectl::new(SERVICE_ACCOUNT_NAMESPACE)),
        Target::ContainerGroup => Box::new(AzWorkloadRuntime::new(
            &params.resource_group,
            WorkloadHost::ContainerGroup,
        )),
        Target::AppHost => Box::new(AzWorkloadRuntime::new(&params.resource_group, WorkloadHost::AppHost)),
        Target::Functions => Box::new(AzWorkloadRuntime::new(
            &params.resource_group,
            WorkloadHost::Functions,
        )),
    }
}

/// Print what a run would do, without touching the cloud: the ordered
/// resource graph and the tokens each workload template expects.
pub fn plan(params: &Params) -> Result<(), Error> {
    let graph = descriptors(params);
    let order = crate::descriptor::topo_order(&graph).map_err(|err| {
        Error::Provision(provision::Failure {
            descriptor: String::new(),
            partial: Outputs::new(),
            error: provision::Error::CyclicDependency(err),
        })
    })?;

    println!("resource graph ({:?} target, region {}):", params.target, params.region);
    for &i in &order {
        let d = &graph[i];
        if d.depends_on.is_empty() {
            println!("  {} ({:?})", d.name, d.kind);
        } else {
            println!("  {} ({:?}) after {}", d.name, d.kind, d.depends_on.join(", "));
        }
    }

    for template in [backend_template(params)?, frontend_template(params)?] {
        let wanted: Vec<String> = template.tokens().into_iter().collect();
        println!("{} template tokens: {}", template.name, wanted.join(", "));
    }
    Ok(())
}

/// The full run. Every stage logs its completion so a failed run
/// reports the last completed stage along with the outputs resolved so
/// far, which is what a resume needs.
pub async fn up(params: &Params, cancel: &CancellationToken) -> Result<(), Error> {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    info!("deployment run {stamp} ({:?} -> {})", params.target, params.resource_group);

    let mut az = AzCli::new(&params.resource_group);
    az.check_session().map_err(|f| Error::Preflight(f.detail))?;

    let graph = descriptors(params);
    let resolved = match provision::provision(&mut az, &graph, cancel).await {
        Ok(resolved) => resolved,
        Err(failure) => {
            report_outputs(&failure.partial);
            return Err(failure.into());
        }
    };
    info!("stage complete: provision ({} outputs)", resolved.len());
    report_outputs(&resolved);

    bind_credentials(params, &az, &resolved)?;
    info!("stage complete: bind");

    let mut runtime = runtime_for(params);
    let policy = poll_policy(params);

    // On the serverless hosts the control plane reports Running before
    // the app answers, so readiness there also gates on an HTTP 2xx
    // from the workload address. Inside the cluster the service address
    // is not reachable from here; the deployment's ready condition is
    // the gate.
    let http_ok = match params.target {
        Target::Cluster => None,
        _ => Some(
            reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .map_err(|err| Error::Preflight(format!("http client: {err}")))?,
        ),
    };

    let backend = render(&backend_template(params)?, &backend_bindings(params, &resolved)?)?;
    let backend_ready =
        deploy_workload(runtime.as_mut(), &backend, policy, http_ok.as_ref(), cancel).await?;
    info!("stage complete: backend at {}", backend_ready.address);

    let frontend = render(
        &frontend_template(params)?,
        &frontend_bindings(params, &resolved, &backend_ready)?,
    )?;
    let frontend_ready =
        deploy_workload(runtime.as_mut(), &frontend, policy, http_ok.as_ref(), cancel).await?;
    info!("stage complete: frontend at {}", frontend_ready.address);

    info!("deployment run {stamp} finished");
    Ok(())
}

/// Apply one workload and poll it to readiness, walking the attempt
/// through its states. A failed apply or an exhausted poll is terminal
/// for this attempt; the caller retries by running again.
async fn deploy_workload(
    runtime: &mut dyn Runtime,
    manifest: &crate::manifest::Manifest,
    policy: PollPolicy,
    http_ok: Option<&reqwest::Client>,
    cancel: &CancellationToken,
) -> Result<ReadinessRecord, deploy::Error> {
    let mut state = WorkloadState::Pending;
    info!("{}: {state:?}", manifest.name);

    let handle = match runtime.apply(manifest) {
        Ok(handle) => {
            state = WorkloadState::Provisioning;
            info!("{}: {state:?}", manifest.name);
            handle
        }
        Err(err) => {
            state = WorkloadState::Failed;
            warn!("{}: {state:?}, apply rejected", manifest.name);
            return Err(err);
        }
    };

    match deploy::wait_for_ready(runtime, &handle, policy, http_ok, cancel).await {
        Ok(record) => {
            state = WorkloadState::Ready;
            debug_assert!(state.is_terminal());
            info!("{}: {state:?}", handle.workload);
            Ok(record)
        }
        Err(err @ deploy::Error::Timeout { .. }) => {
            state = WorkloadState::TimedOut;
            warn!("{}: {state:?}, readiness bound exhausted", handle.workload);
            Err(err)
        }
        Err(err) => Err(err),
    }
}

fn bind_credentials(params: &Params, az: &AzCli, resolved: &Outputs) -> Result<(), bind::Error> {
    let identity = format!("{}-identity", params.config.name_prefix);
    let principal = resolved
        .get(outputs::IDENTITY_PRINCIPAL_ID)
        .ok_or_else(|| bind::Error::PrincipalNotResolved(identity.clone()))?;

    // Data-plane access to the database is the one grant the
    // application actually needs.
    let account = format!("{}-cosmos", params.config.name_prefix);
    let data_role = RoleRef::data_plane(COSMOS_DATA_CONTRIBUTOR);
    az.apply_role_grant(&bind::grant_role(principal, &data_role, &account))?;

    if params.config.grant_reader_role {
        let scope = resolved.get(outputs::DATABASE_ACCOUNT_ID).ok_or_else(|| {
            bind::Error::ControlPlane("databaseAccountId output not resolved".into())
        })?;
        let reader = RoleRef::control_plane(COSMOS_ACCOUNT_READER);
        az.apply_role_grant(&bind::grant_role(principal, &reader, scope))?;
    }

    // Federation only exists on the cluster target; the other hosts
    // carry the user-assigned identity directly.
    if params.target == Target::Cluster {
        let binding = bind::bind(
            &identity,
            resolved,
            SERVICE_ACCOUNT_NAMESPACE,
            SERVICE_ACCOUNT_NAME,
            FEDERATION_AUDIENCE,
        )?;
        az.apply_federation(&binding)?;
    }

    Ok(())
}

fn report_outputs(resolved: &Outputs) {
    for (key, value) in resolved.iter() {
        info!("output {key} = {value}");
    }
}
