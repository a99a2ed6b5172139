use crate::coordinator::{InMemoryCoordinator, SessionStatus};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use warden_core::{
    ChildrenWatch, ClientConfig, ConnectionState, CoordinationClient, CoordinationError,
    CreateMode, NodeMetadata, Result, SessionId, WatchId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Latent,
    Started(SessionId),
    Closed,
}

/// Client of an [`InMemoryCoordinator`].
///
/// Each client owns at most one session, opened by `start()` and ended by
/// `close()` or by the service expiring it. While the session is suspended,
/// operations wait for reconnection following the configured
/// [`RetryPolicy`](warden_core::RetryPolicy), bounded by the connection
/// timeout.
#[derive(Debug)]
pub struct InMemoryClient {
    service: InMemoryCoordinator,
    config: ClientConfig,
    lifecycle: RwLock<Lifecycle>,
}

impl InMemoryClient {
    pub(crate) fn new(service: InMemoryCoordinator, config: ClientConfig) -> Self {
        Self {
            service,
            config,
            lifecycle: RwLock::new(Lifecycle::Latent),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The service this client is bound to.
    pub fn service(&self) -> &InMemoryCoordinator {
        &self.service
    }

    fn current_session(&self) -> Result<SessionId> {
        match *self.lifecycle.read() {
            Lifecycle::Latent => Err(CoordinationError::NotStarted),
            Lifecycle::Started(session) => Ok(session),
            Lifecycle::Closed => Err(CoordinationError::Closed),
        }
    }

    /// Resolve the session to use for an operation, waiting out a suspension
    /// according to the retry policy.
    async fn connected_session(&self) -> Result<SessionId> {
        let session = self.current_session()?;
        let deadline = Instant::now() + self.config.connection_timeout;
        let mut attempt = 0;

        loop {
            match self.service.session_status(session) {
                Some(SessionStatus::Connected) => return Ok(session),
                None => return Err(CoordinationError::SessionExpired { session_id: session }),
                Some(SessionStatus::Suspended) => {
                    let now = Instant::now();
                    let sleep = match self.config.retry.sleep_for(attempt) {
                        Some(sleep) if now < deadline => sleep.min(deadline - now),
                        _ => {
                            return Err(CoordinationError::connection_loss(format!(
                                "session {} still disconnected after {} retries",
                                session, attempt
                            )))
                        }
                    };
                    debug!(session = %session, attempt, ?sleep, "waiting for reconnection");
                    tokio::time::sleep(sleep).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl CoordinationClient for InMemoryClient {
    async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write();
        match *lifecycle {
            Lifecycle::Started(_) => Ok(()),
            Lifecycle::Closed => Err(CoordinationError::Closed),
            Lifecycle::Latent => {
                self.config.validate()?;
                let session = self.service.open_session(self.config.session_timeout);
                *lifecycle = Lifecycle::Started(session);
                info!(
                    session = %session,
                    connect_string = %self.config.connect_string,
                    "client started"
                );
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.lifecycle.write(), Lifecycle::Closed);
        if let Lifecycle::Started(session) = previous {
            self.service.close_session(session);
            info!(session = %session, "client closed");
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        matches!(*self.lifecycle.read(), Lifecycle::Started(_))
    }

    fn state(&self) -> ConnectionState {
        match *self.lifecycle.read() {
            Lifecycle::Latent => ConnectionState::Latent,
            Lifecycle::Closed => ConnectionState::Closed,
            Lifecycle::Started(session) => match self.service.session_status(session) {
                Some(SessionStatus::Connected) => ConnectionState::Connected,
                Some(SessionStatus::Suspended) => ConnectionState::Suspended,
                None => ConnectionState::Lost,
            },
        }
    }

    fn session_id(&self) -> Result<SessionId> {
        self.current_session()
    }

    async fn exists(&self, path: &str) -> Result<Option<NodeMetadata>> {
        let session = self.connected_session().await?;
        self.service.exists(session, path)
    }

    async fn create(
        &self,
        path: &str,
        payload: &[u8],
        mode: CreateMode,
        create_parents: bool,
    ) -> Result<String> {
        let session = self.connected_session().await?;
        self.service
            .create(session, path, payload, mode, create_parents)
    }

    async fn get_data(&self, path: &str) -> Result<(Bytes, NodeMetadata)> {
        let session = self.connected_session().await?;
        self.service.get_data(session, path)
    }

    async fn set_data(&self, path: &str, payload: &[u8]) -> Result<NodeMetadata> {
        let session = self.connected_session().await?;
        self.service.set_data(session, path, payload)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let session = self.connected_session().await?;
        self.service.delete(session, path)
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        let session = self.connected_session().await?;
        self.service.get_children(session, path)
    }

    async fn watch_children(&self, path: &str, initial_sync: bool) -> Result<ChildrenWatch> {
        let session = self.connected_session().await?;
        self.service.watch_children(session, path, initial_sync)
    }

    async fn rebuild_watch(&self, watch: &WatchId) -> Result<()> {
        let session = self.connected_session().await?;
        self.service.rebuild_watch(session, watch).map(|_| ())
    }

    async fn unwatch(&self, watch: &WatchId) -> Result<()> {
        let session = self.current_session()?;
        self.service.unwatch(session, watch)
    }

    async fn acquire_mutex(&self, path: &str, timeout: Duration) -> Result<bool> {
        warden_core::path::validate_path(path)?;
        let deadline = Instant::now() + timeout;
        let notify = self.service.mutex_notifier(path);

        loop {
            let session = self.connected_session().await?;
            let released = notify.notified();
            tokio::pin!(released);
            // Register interest before checking so a release in between is
            // not missed
            released.as_mut().enable();

            if self.service.try_lock(session, path)? {
                debug!(session = %session, path = %path, "mutex acquired");
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(session = %session, path = %path, ?timeout, "mutex acquisition timed out");
                return Ok(false);
            }
            // A timeout here loops back to the final check above
            let _ = tokio::time::timeout(deadline - now, released).await;
        }
    }

    async fn release_mutex(&self, path: &str) -> Result<()> {
        let session = self.current_session()?;
        self.service.unlock(session, path)?;
        debug!(session = %session, path = %path, "mutex released");
        Ok(())
    }
}
