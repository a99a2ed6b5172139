use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use warden_core::{ClientConfig, CoordinationClient, RetryPolicy, SessionId};
use warden_failover::{ControllerState, FailoverConfig, FailoverController, FailoverResult};
use warden_memory::{InMemoryClient, InMemoryCoordinator};

use crate::fault_injection::{inject, SessionFault};

/// Client settings used by harness instances: short backoff so suspended
/// operations fail fast.
pub fn test_client_config() -> ClientConfig {
    ClientConfig::default()
        .with_session_timeout(Duration::from_secs(5))
        .with_connection_timeout(Duration::from_millis(200))
        .with_retry(RetryPolicy::exponential_backoff(Duration::from_millis(10), 3))
}

pub struct Instance {
    pub label: String,
    pub client: Arc<InMemoryClient>,
    pub controller: FailoverController,
}

impl Instance {
    pub fn session(&self) -> Option<SessionId> {
        self.client.session_id().ok()
    }
}

/// N failover controllers of one project sharing one in-memory service.
pub struct FailoverHarness {
    service: InMemoryCoordinator,
    project: String,
    instances: Vec<Instance>,
}

impl FailoverHarness {
    pub fn new(count: usize, project: &str) -> FailoverResult<Self> {
        Self::with_service(InMemoryCoordinator::new(), count, project)
    }

    pub fn with_service(
        service: InMemoryCoordinator,
        count: usize,
        project: &str,
    ) -> FailoverResult<Self> {
        let mut instances = Vec::with_capacity(count);
        for i in 0..count {
            let label = format!("{}-{}", project, i);
            let client = Arc::new(service.connect(test_client_config()));
            let controller =
                FailoverController::new(client.clone(), FailoverConfig::new(project, &label))?;
            instances.push(Instance {
                label,
                client,
                controller,
            });
        }
        Ok(Self {
            service,
            project: project.to_string(),
            instances,
        })
    }

    pub fn service(&self) -> &InMemoryCoordinator {
        &self.service
    }

    pub fn instance(&self, index: usize) -> &Instance {
        &self.instances[index]
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn candidate_path(&self) -> String {
        FailoverConfig::new(&self.project, "harness").candidate_path()
    }

    /// Register every instance concurrently.
    pub async fn register_all(&self) -> FailoverResult<()> {
        let results = join_all(
            self.instances
                .iter()
                .map(|instance| instance.controller.register()),
        )
        .await;
        results.into_iter().collect::<FailoverResult<Vec<()>>>()?;
        info!(project = %self.project, instances = self.len(), "all instances registered");
        Ok(())
    }

    /// Indices of instances currently in OWNER state.
    pub fn owners(&self) -> Vec<usize> {
        self.instances
            .iter()
            .enumerate()
            .filter(|(_, instance)| instance.controller.is_owner())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn states(&self) -> Vec<ControllerState> {
        self.instances
            .iter()
            .map(|instance| instance.controller.state())
            .collect()
    }

    /// Wait until exactly one instance is OWNER and its session owns the
    /// candidate node. Fails as soon as two owners are observed.
    pub async fn wait_for_owner(&self, timeout: Duration) -> anyhow::Result<usize> {
        let deadline = Instant::now() + timeout;
        let candidate = self.candidate_path();
        loop {
            let owners = self.owners();
            if owners.len() > 1 {
                anyhow::bail!("split brain: instances {:?} are all owners", owners);
            }
            if let &[owner] = owners.as_slice() {
                let holder = self.service.ephemeral_owner(&candidate);
                if holder.is_some() && holder == self.instances[owner].session() {
                    return Ok(owner);
                }
            }
            if Instant::now() >= deadline {
                anyhow::bail!(
                    "no single owner after {:?}, states {:?}",
                    timeout,
                    self.states()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Apply a fault to the session of one instance.
    pub fn inject(&self, index: usize, fault: SessionFault) -> bool {
        match self.instances[index].session() {
            Some(session) => inject(&self.service, session, fault),
            None => {
                warn!(instance = %self.instances[index].label, "instance has no session");
                false
            }
        }
    }

    pub async fn shutdown_all(&self) {
        for instance in &self.instances {
            if let Err(e) = instance.controller.shutdown().await {
                warn!(instance = %instance.label, error = %e, "shutdown failed");
            }
        }
    }
}
