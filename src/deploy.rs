use std::time::Duration;
use log::{debug, info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::manifest::Manifest;

#[derive(Error, Debug)]
pub enum Error {
    #[error("runtime rejected manifest {manifest}: {detail}")]
    ApplyRejected { manifest: String, detail: String },

    #[error("workload {workload} not ready after {attempts} attempts (last: {last})")]
    Timeout {
        workload: String,
        attempts: u32,
        last: Probe,
    },

    #[error("probe of {workload} failed: {detail}")]
    ProbeFailed { workload: String, detail: String },

    #[error("deployment cancelled")]
    Cancelled,
}

/// Handle to an applied workload, used for readiness probes.
#[derive(Debug, Clone)]
pub struct DeployHandle {
    /// Logical workload name; re-applying under the same name replaces
    /// the workload in place rather than creating a duplicate.
    pub workload: String,
}

/// One observation of a deployed workload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Probe {
    pub address: Option<String>,
    pub ready: bool,
}

impl std::fmt::Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "address={} ready={}",
            self.address.as_deref().unwrap_or("<none>"),
            self.ready
        )
    }
}

/// Last observed state of a workload that reached readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessRecord {
    pub workload: String,
    pub address: String,
    pub ready: bool,
}

/// Lifecycle of one deployment attempt. `Failed` and `TimedOut` are
/// terminal for the attempt; retrying means calling `apply` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadState {
    Pending,
    Provisioning,
    Ready,
    Failed,
    TimedOut,
}

impl WorkloadState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkloadState::Ready | WorkloadState::Failed | WorkloadState::TimedOut
        )
    }
}

/// A target runtime: an orchestrated cluster, a container group, or a
/// managed app host. `apply` must be idempotent per logical name.
pub trait Runtime {
    fn apply(&mut self, manifest: &Manifest) -> Result<DeployHandle, Error>;
    fn probe(&mut self, handle: &DeployHandle) -> Result<Probe, Error>;
}

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 30,
        }
    }
}

/// Poll the runtime at a fixed interval until the workload reports both
/// an externally reachable address and a ready condition, or the attempt
/// bound is exhausted. When an HTTP client is supplied, readiness also
/// requires the address to answer a GET with a 2xx; hosts whose control
/// plane reports Running before the app serves traffic stay in the same
/// bounded poll loop until they do. The last observed partial state is
/// surfaced on timeout. Cancellation aborts between polls without
/// leaking a poller.
pub async fn wait_for_ready(
    runtime: &mut dyn Runtime,
    handle: &DeployHandle,
    policy: PollPolicy,
    http_ok: Option<&reqwest::Client>,
    cancel: &CancellationToken,
) -> Result<ReadinessRecord, Error> {
    let mut last = Probe::default();

    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }

        last = runtime.probe(handle)?;
        debug!(
            "poll {attempt}/{} for {}: {last}",
            policy.max_attempts, handle.workload
        );

        if let (Some(address), true) = (&last.address, last.ready) {
            if let Some(client) = http_ok {
                if !http_answers(client, address).await {
                    continue;
                }
            }
            info!("{} ready at {address}", handle.workload);
            return Ok(ReadinessRecord {
                workload: handle.workload.clone(),
                address: address.clone(),
                ready: true,
            });
        }
    }

    warn!("{} never became ready, last state: {last}", handle.workload);
    Err(Error::Timeout {
        workload: handle.workload.clone(),
        attempts: policy.max_attempts,
        last,
    })
}

fn probe_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}/")
    }
}

async fn http_answers(client: &reqwest::Client, address: &str) -> bool {
    let url = probe_url(address);
    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            debug!("{url} answered {}", response.status());
            false
        }
        Err(err) => {
            debug!("{url} not answering yet: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{render, Bindings, Template};
    use std::collections::HashMap;
    use tokio::time::Instant;

    /// In-memory runtime; each workload name maps to a queue of probe
    /// results, the last of which repeats forever.
    #[derive(Default)]
    struct FakeRuntime {
        applied: Vec<String>,
        probes: HashMap<String, Vec<Probe>>,
    }

    impl Runtime for FakeRuntime {
        fn apply(&mut self, manifest: &Manifest) -> Result<DeployHandle, Error> {
            self.applied.push(manifest.name.clone());
            Ok(DeployHandle {
                workload: manifest.name.clone(),
            })
        }

        fn probe(&mut self, handle: &DeployHandle) -> Result<Probe, Error> {
            let queue = self.probes.get_mut(&handle.workload).ok_or_else(|| {
                Error::ProbeFailed {
                    workload: handle.workload.clone(),
                    detail: "unknown workload".into(),
                }
            })?;
            Ok(if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue[0].clone()
            })
        }
    }

    fn manifest(name: &str) -> Manifest {
        render(&Template::new(name, "kind: Deployment"), &Bindings::new()).unwrap()
    }

    fn ready_at(address: &str) -> Probe {
        Probe {
            address: Some(address.into()),
            ready: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_as_soon_as_address_and_readiness_coincide() {
        let mut runtime = FakeRuntime::default();
        runtime.probes.insert(
            "backend".into(),
            vec![
                Probe::default(),
                Probe {
                    address: Some("10.0.0.5".into()),
                    ready: false,
                },
                ready_at("10.0.0.5"),
            ],
        );
        let handle = runtime.apply(&manifest("backend")).unwrap();
        let policy = PollPolicy {
            interval: Duration::from_secs(10),
            max_attempts: 5,
        };
        let started = Instant::now();
        let record = wait_for_ready(&mut runtime, &handle, policy, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.address, "10.0.0.5");
        // Ready on the third poll, thirty paused seconds in.
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_the_attempt_bound_not_earlier() {
        let mut runtime = FakeRuntime::default();
        runtime
            .probes
            .insert("backend".into(), vec![Probe::default()]);
        let handle = runtime.apply(&manifest("backend")).unwrap();
        let policy = PollPolicy {
            interval: Duration::from_secs(10),
            max_attempts: 3,
        };
        let started = Instant::now();
        let err = wait_for_ready(&mut runtime, &handle, policy, None, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            Error::Timeout { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(last, Probe::default());
            }
            other => panic!("unexpected error: {other}"),
        }
        // Three 10s intervals elapse, then the bound trips: 30s on the
        // paused clock, not earlier, not indefinitely.
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn address_without_readiness_is_not_enough() {
        let mut runtime = FakeRuntime::default();
        runtime.probes.insert(
            "backend".into(),
            vec![Probe {
                address: Some("10.0.0.5".into()),
                ready: false,
            }],
        );
        let handle = runtime.apply(&manifest("backend")).unwrap();
        let policy = PollPolicy {
            interval: Duration::from_secs(1),
            max_attempts: 2,
        };
        let err = wait_for_ready(&mut runtime, &handle, policy, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_between_polls() {
        let mut runtime = FakeRuntime::default();
        runtime
            .probes
            .insert("backend".into(), vec![Probe::default()]);
        let handle = runtime.apply(&manifest("backend")).unwrap();
        let policy = PollPolicy {
            interval: Duration::from_secs(10),
            max_attempts: 100,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for_ready(&mut runtime, &handle, policy, None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn repeated_apply_reuses_the_logical_name() {
        let mut runtime = FakeRuntime::default();
        let first = runtime.apply(&manifest("backend")).unwrap();
        let second = runtime.apply(&manifest("backend")).unwrap();
        assert_eq!(first.workload, second.workload);
        assert_eq!(runtime.applied, vec!["backend", "backend"]);
    }

    #[test]
    fn probe_url_prefixes_bare_addresses() {
        assert_eq!(probe_url("10.0.0.5"), "http://10.0.0.5/");
        assert_eq!(probe_url("app.azurewebsites.net"), "http://app.azurewebsites.net/");
        assert_eq!(probe_url("https://app.azurewebsites.net"), "https://app.azurewebsites.net");
    }

    // Real clock: the refused connection on port 1 fails each attempt
    // immediately, so the short intervals keep this fast.
    #[tokio::test]
    async fn http_gate_holds_readiness_until_the_endpoint_answers() {
        let mut runtime = FakeRuntime::default();
        runtime
            .probes
            .insert("backend".into(), vec![ready_at("127.0.0.1:1")]);
        let handle = runtime.apply(&manifest("backend")).unwrap();
        let policy = PollPolicy {
            interval: Duration::from_millis(10),
            max_attempts: 3,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let err = wait_for_ready(
            &mut runtime,
            &handle,
            policy,
            Some(&client),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        // The runtime reported ready on every poll, yet the run still
        // exhausts the bound because nothing answers on the address.
        match err {
            Error::Timeout { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(last, ready_at("127.0.0.1:1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn terminal_states() {
        assert!(WorkloadState::Ready.is_terminal());
        assert!(WorkloadState::Failed.is_terminal());
        assert!(WorkloadState::TimedOut.is_terminal());
        assert!(!WorkloadState::Pending.is_terminal());
        assert!(!WorkloadState::Provisioning.is_terminal());
    }
}
