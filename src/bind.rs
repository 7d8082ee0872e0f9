use log::{debug, info};
use thiserror::Error;

use crate::descriptor::{outputs, Outputs};

#[derive(Error, Debug)]
pub enum Error {
    #[error("federation issuer for {host} is not resolved yet")]
    IssuerNotReady { host: String },

    #[error("insufficient permission to grant {role} on {scope}: {detail}")]
    InsufficientPermission {
        role: String,
        scope: String,
        detail: String,
    },

    #[error("identity {0} has no resolved principal id")]
    PrincipalNotResolved(String),

    #[error("control plane: {0}")]
    ControlPlane(String),
}

/// Federation of a workload identity to a runtime principal.
/// Created once after both the identity and the compute host exist;
/// never mutated, deleted only on teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityBinding {
    pub identity: String,
    pub issuer: String,
    pub subject: String,
    pub audience: String,
}

/// Control-plane grants give management-API access; data-plane grants are
/// scoped to the database account's own authorization system. The two use
/// different scope resolution and are never conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    ControlPlane,
    DataPlane,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRef {
    pub kind: RoleKind,
    /// Role definition id or name, e.g. the Cosmos DB built-in
    /// data contributor "00000000-0000-0000-0000-000000000002".
    pub definition: String,
}

impl RoleRef {
    pub fn data_plane(definition: &str) -> Self {
        Self {
            kind: RoleKind::DataPlane,
            definition: definition.to_string(),
        }
    }

    pub fn control_plane(definition: &str) -> Self {
        Self {
            kind: RoleKind::ControlPlane,
            definition: definition.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub name: String,
    pub principal_id: String,
    pub role: RoleRef,
    pub scope: String,
}

/// Deterministic grant name for a (principal, role, scope) triple.
/// Re-granting with the same inputs always produces the same name, which
/// is what makes repeated grants a no-op on the control plane.
pub fn grant_name(principal_id: &str, role: &RoleRef, scope: &str) -> String {
    let kind = match role.kind {
        RoleKind::ControlPlane => "control",
        RoleKind::DataPlane => "data",
    };
    let digest = sha256::digest(format!("{principal_id}|{kind}|{}|{scope}", role.definition));
    // Grant names only need to be unique within the scope; a truncated
    // digest in UUID-ish grouping keeps them readable in the portal.
    format!(
        "{}-{}-{}",
        &digest[..8],
        &digest[8..12],
        &digest[12..20]
    )
}

/// Bind a workload identity to a runtime principal through the host's
/// federation issuer. The issuer URL must already be resolved in the
/// output set; binding before the host exists is an error, not a retry.
pub fn bind(
    identity: &str,
    resolved: &Outputs,
    principal_namespace: &str,
    principal_name: &str,
    audience: &str,
) -> Result<IdentityBinding, Error> {
    let issuer = resolved
        .get(outputs::CLUSTER_OIDC_ISSUER)
        .ok_or_else(|| Error::IssuerNotReady {
            host: identity.to_string(),
        })?;

    let binding = IdentityBinding {
        identity: identity.to_string(),
        issuer: issuer.to_string(),
        subject: format!("system:serviceaccount:{principal_namespace}:{principal_name}"),
        audience: audience.to_string(),
    };
    debug!("federation subject {}", binding.subject);
    Ok(binding)
}

/// Construct the grant for a principal at a scope. The caller hands the
/// result to the control plane; because the name is deterministic the
/// apply is idempotent.
pub fn grant_role(principal_id: &str, role: &RoleRef, scope: &str) -> RoleGrant {
    let name = grant_name(principal_id, role, scope);
    info!(
        "role grant {name}: {:?} {} at {scope}",
        role.kind, role.definition
    );
    RoleGrant {
        name,
        principal_id: principal_id.to_string(),
        role: role.clone(),
        scope: scope.to_string(),
    }
}
