use std::collections::BTreeMap;
use std::time::Duration;
use log::{debug, info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::descriptor::{self, Outputs, ResourceDescriptor};

/// Transient failures are retried this many times per descriptor,
/// with a doubling delay in between.
const TRANSIENT_ATTEMPTS: u32 = 3;
const TRANSIENT_BASE_DELAY: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum Error {
    #[error("dependency graph: {0}")]
    CyclicDependency(#[from] descriptor::Error),

    #[error("resource {name} already exists with conflicting properties: {detail}")]
    ResourceConflict { name: String, detail: String },

    #[error("transient failure on {name}: {detail}")]
    TransientUnavailable { name: String, detail: String },

    #[error("control plane rejected {name}: {detail}")]
    Rejected { name: String, detail: String },

    #[error("provisioning cancelled")]
    Cancelled,
}

/// Failure of a provisioning run. Descriptors before `descriptor` remain
/// provisioned and their outputs are in `partial`, so a rerun resumes
/// from the failed descriptor rather than starting over.
#[derive(Error, Debug)]
#[error("provisioning stopped at {descriptor}: {error}")]
pub struct Failure {
    pub descriptor: String,
    pub partial: Outputs,
    #[source]
    pub error: Error,
}

/// Result of applying one descriptor against the control plane.
#[derive(Debug, Clone)]
pub struct EnsureOutcome {
    /// False when the resource already existed with matching properties.
    pub created: bool,
    pub outputs: BTreeMap<String, String>,
}

/// The cloud control plane, as narrow as the provisioner needs it.
/// `ensure` must be idempotent: an existing resource with matching
/// properties is a no-op, a mismatch is [`Error::ResourceConflict`].
pub trait ControlPlane {
    fn ensure(&mut self, descriptor: &ResourceDescriptor) -> Result<EnsureOutcome, Error>;
}

/// Apply descriptors in dependency order, collecting their outputs.
///
/// The dependency graph is validated up front; a cycle fails before any
/// control-plane call is made. Transient failures are retried locally
/// with bounded backoff. On a non-transient failure the run halts and
/// the partial output set is handed back for resumption. There is no
/// rollback.
pub async fn provision(
    plane: &mut dyn ControlPlane,
    descriptors: &[ResourceDescriptor],
    cancel: &CancellationToken,
) -> Result<Outputs, Failure> {
    let order = descriptor::topo_order(descriptors).map_err(|err| Failure {
        descriptor: String::new(),
        partial: Outputs::new(),
        error: Error::CyclicDependency(err),
    })?;

    let mut outputs = Outputs::new();

    for &i in &order {
        let d = &descriptors[i];
        if cancel.is_cancelled() {
            return Err(fail(d, &outputs, Error::Cancelled));
        }

        debug!("ensuring {} ({:?})", d.name, d.kind);
        match ensure_with_retry(plane, d, cancel).await {
            Ok(outcome) => {
                if outcome.created {
                    info!("provisioned {}", d.name);
                } else {
                    info!("{} already up to date", d.name);
                }
                outputs.merge(outcome.outputs);
            }
            Err(error) => return Err(fail(d, &outputs, error)),
        }
    }

    Ok(outputs)
}

fn fail(d: &ResourceDescriptor, outputs: &Outputs, error: Error) -> Failure {
    Failure {
        descriptor: d.name.clone(),
        partial: outputs.clone(),
        error,
    }
}

async fn ensure_with_retry(
    plane: &mut dyn ControlPlane,
    descriptor: &ResourceDescriptor,
    cancel: &CancellationToken,
) -> Result<EnsureOutcome, Error> {
    let mut delay = TRANSIENT_BASE_DELAY;
    let mut attempt = 1;
    loop {
        match plane.ensure(descriptor) {
            Err(Error::TransientUnavailable { name, detail }) if attempt < TRANSIENT_ATTEMPTS => {
                warn!(
                    "transient failure on {name} (attempt {attempt}/{TRANSIENT_ATTEMPTS}): {detail}"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                delay *= 2;
                attempt += 1;
            }
            other => return other,
        }
    }
}
