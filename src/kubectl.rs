use std::io::Write;
use std::process::{Command, Stdio};
use log::debug;

use crate::deploy::{DeployHandle, Error, Probe, Runtime};
use crate::manifest::Manifest;

/// Cluster runtime backed by `kubectl`. Rendered manifests are written
/// to a temporary file and applied server-side; `kubectl apply` updates
/// in place for a known logical name, which gives us idempotent applies
/// for free.
pub struct Kubectl {
    pub namespace: String,
}

impl Kubectl {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
        }
    }

    fn get_json(&self, kind: &str, name: &str) -> Result<serde_json::Value, Error> {
        let output = Command::new("kubectl")
            .args([
                "get", kind, name, "--namespace", &self.namespace, "--output", "json",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| Error::ProbeFailed {
                workload: name.to_string(),
                detail: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(Error::ProbeFailed {
                workload: name.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        serde_json::from_slice(&output.stdout).map_err(|err| Error::ProbeFailed {
            workload: name.to_string(),
            detail: format!("unparseable kubectl output: {err}"),
        })
    }
}

impl Runtime for Kubectl {
    fn apply(&mut self, manifest: &Manifest) -> Result<DeployHandle, Error> {
        let workload = manifest.metadata_name().unwrap_or_else(|| manifest.name.clone());

        let mut file = tempfile::NamedTempFile::new().map_err(|err| Error::ApplyRejected {
            manifest: manifest.name.clone(),
            detail: err.to_string(),
        })?;
        file.write_all(manifest.body().as_bytes())
            .map_err(|err| Error::ApplyRejected {
                manifest: manifest.name.clone(),
                detail: err.to_string(),
            })?;

        debug!("kubectl apply {} as {workload}", manifest.name);
        let status = Command::new("kubectl")
            .arg("apply")
            .arg("--namespace")
            .arg(&self.namespace)
            .arg("--filename")
            .arg(file.path())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| Error::ApplyRejected {
                manifest: manifest.name.clone(),
                detail: err.to_string(),
            })?;

        if status.success() {
            Ok(DeployHandle { workload })
        } else {
            Err(Error::ApplyRejected {
                manifest: manifest.name.clone(),
                detail: format!("kubectl apply exited with {status}"),
            })
        }
    }

    fn probe(&mut self, handle: &DeployHandle) -> Result<Probe, Error> {
        let service = self.get_json("service", &handle.workload)?;
        let address = service
            .pointer("/status/loadBalancer/ingress/0/ip")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        let deployment = self.get_json("deployment", &handle.workload)?;
        let wanted = deployment
            .pointer("/spec/replicas")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(1);
        let ready = deployment
            .pointer("/status/readyReplicas")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);

        Ok(Probe {
            address,
            ready: ready >= wanted,
        })
    }
}
