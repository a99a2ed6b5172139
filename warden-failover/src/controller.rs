//! Failover controller for one project instance.

use crate::decision::{decide, owns_candidate, Action, ControllerState};
use crate::{FailoverConfig, FailoverError, FailoverResult};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_core::{ChildEvent, ChildrenWatch, CoordinationClient, CreateMode, WatchId};

/// Statistics about failover activity of one controller
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FailoverStats {
    pub events_received: u64,
    pub ownership_checks: u64,
    pub ownership_grants: u64,
    pub recreate_attempts: u64,
    pub recreate_races_lost: u64,
    pub watch_rebuilds: u64,
    pub suspensions: u64,
}

struct Inner {
    client: Arc<dyn CoordinationClient>,
    config: FailoverConfig,
    candidate_path: String,
    state_tx: watch::Sender<ControllerState>,
    stats: RwLock<FailoverStats>,
    watch_id: Mutex<Option<WatchId>>,
    shutdown_tx: watch::Sender<bool>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

/// Elects a single owner per project among cooperating instances.
///
/// Each instance races to create the project's ephemeral candidate node and
/// watches the namespace holding it. An instance is OWNER while the
/// candidate that currently exists was created by its own session. When the
/// owner's session ends the node disappears, every surviving instance races
/// to recreate it, and the winner promotes itself.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use warden_core::ClientConfig;
/// use warden_failover::{FailoverConfig, FailoverController};
/// use warden_memory::InMemoryCoordinator;
///
/// # tokio_test::block_on(async {
/// let service = InMemoryCoordinator::new();
/// let client = Arc::new(service.connect(ClientConfig::default()));
/// let controller =
///     FailoverController::new(client, FailoverConfig::new("billing", "host-a")).unwrap();
///
/// controller.init().await.unwrap();
/// assert!(controller.is_owner());
/// controller.shutdown().await.unwrap();
/// # });
/// ```
#[derive(Clone)]
pub struct FailoverController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FailoverController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverController")
            .field("project", &self.inner.config.project)
            .field("instance", &self.inner.config.instance_label)
            .field("state", &self.state())
            .finish()
    }
}

impl FailoverController {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        config: FailoverConfig,
    ) -> FailoverResult<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(ControllerState::Unregistered);
        let (shutdown_tx, _) = watch::channel(false);
        let candidate_path = config.candidate_path();

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                candidate_path,
                state_tx,
                stats: RwLock::new(FailoverStats::default()),
                watch_id: Mutex::new(None),
                shutdown_tx,
                event_loop: Mutex::new(None),
            }),
        })
    }

    /// Create a controller with its own client of an in-process service.
    #[cfg(feature = "in-memory")]
    pub fn connect(
        service: &warden_memory::InMemoryCoordinator,
        client_config: warden_core::ClientConfig,
        config: FailoverConfig,
    ) -> FailoverResult<Self> {
        Self::new(Arc::new(service.connect(client_config)), config)
    }

    /// Register and block until this instance owns the project slot.
    ///
    /// Never returns while another live instance owns the slot.
    pub async fn init(&self) -> FailoverResult<()> {
        self.register().await?;
        match self.wait_for_ownership().await {
            Err(e) if e.is_terminal() => {
                warn!(
                    project = %self.inner.config.project,
                    instance = %self.inner.config.instance_label,
                    error = %e,
                    "init returned without ownership"
                );
                Err(e)
            }
            other => other,
        }
    }

    /// Start the client, attempt to create the candidate node and start
    /// watching the project namespace.
    ///
    /// Only the first call on a controller (or any of its clones) proceeds;
    /// later and concurrent calls fail with
    /// [`FailoverError::AlreadyRegistered`].
    pub async fn register(&self) -> FailoverResult<()> {
        let inner = &self.inner;
        if !inner.transition(ControllerState::Unregistered, ControllerState::Watching) {
            return Err(FailoverError::AlreadyRegistered {
                project: inner.config.project.clone(),
            });
        }

        match self.start_watching().await {
            Ok(()) => Ok(()),
            Err(e) => {
                inner.transition(ControllerState::Watching, ControllerState::Unregistered);
                warn!(
                    project = %inner.config.project,
                    instance = %inner.config.instance_label,
                    error = %e,
                    "registration failed"
                );
                Err(e)
            }
        }
    }

    async fn start_watching(&self) -> FailoverResult<()> {
        let inner = &self.inner;
        if !inner.client.is_started() {
            inner.client.start().await?;
        }
        let session = inner.client.session_id()?;

        if inner.client.exists(&inner.candidate_path).await?.is_none() {
            match inner.create_candidate().await {
                Ok(()) => info!(
                    project = %inner.config.project,
                    instance = %inner.config.instance_label,
                    session = %session,
                    "candidate registered"
                ),
                Err(e) if e.is_node_exists() => info!(
                    project = %inner.config.project,
                    instance = %inner.config.instance_label,
                    "candidate registered concurrently by a sibling"
                ),
                Err(e) => error!(
                    project = %inner.config.project,
                    instance = %inner.config.instance_label,
                    error = %e,
                    "failed to register candidate"
                ),
            }
        } else {
            debug!(
                project = %inner.config.project,
                instance = %inner.config.instance_label,
                "candidate already present"
            );
        }

        let watch = inner
            .client
            .watch_children(&inner.config.root, true)
            .await?;
        *inner.watch_id.lock() = Some(watch.id);
        info!(
            project = %inner.config.project,
            instance = %inner.config.instance_label,
            root = %inner.config.root,
            "watching project namespace"
        );

        let handle = tokio::spawn(run_event_loop(
            Arc::clone(inner),
            watch,
            inner.shutdown_tx.subscribe(),
        ));
        *inner.event_loop.lock() = Some(handle);
        Ok(())
    }

    /// Wait until this instance is OWNER.
    ///
    /// Returns immediately if it already is. Fails with
    /// [`FailoverError::Suspended`] when the connection is lost first and
    /// with [`FailoverError::Interrupted`] when the controller is shut down.
    pub async fn wait_for_ownership(&self) -> FailoverResult<()> {
        let project = &self.inner.config.project;
        let mut rx = self.inner.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ControllerState::Owner => return Ok(()),
                ControllerState::Watching => {}
                ControllerState::Unregistered => {
                    return Err(FailoverError::NotRegistered {
                        project: project.clone(),
                    })
                }
                ControllerState::Suspended => {
                    return Err(FailoverError::Suspended {
                        project: project.clone(),
                    })
                }
                ControllerState::Stopped => {
                    return Err(FailoverError::Interrupted {
                        project: project.clone(),
                    })
                }
            }
            if rx.changed().await.is_err() {
                return Err(FailoverError::Interrupted {
                    project: project.clone(),
                });
            }
        }
    }

    /// Like [`wait_for_ownership`](Self::wait_for_ownership), returning
    /// `Ok(false)` if ownership is not granted within `timeout`.
    pub async fn wait_for_ownership_timeout(&self, timeout: Duration) -> FailoverResult<bool> {
        match tokio::time::timeout(timeout, self.wait_for_ownership()).await {
            Ok(result) => result.map(|_| true),
            Err(_) => Ok(false),
        }
    }

    /// Stop reacting to events, remove the watch and close the client.
    ///
    /// The candidate node, if owned, disappears with the session so a
    /// sibling can take over.
    pub async fn shutdown(&self) -> FailoverResult<()> {
        let inner = &self.inner;
        let _ = inner.shutdown_tx.send(true);
        inner.state_tx.send_replace(ControllerState::Stopped);

        let handle = inner.event_loop.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(project = %inner.config.project, error = %e, "event loop ended abnormally");
            }
        }

        let watch_id = inner.watch_id.lock().take();
        if let Some(id) = watch_id {
            if let Err(e) = inner.client.unwatch(&id).await {
                debug!(project = %inner.config.project, error = %e, "unwatch during shutdown failed");
            }
        }
        inner.client.close().await?;
        info!(
            project = %inner.config.project,
            instance = %inner.config.instance_label,
            "controller shut down"
        );
        Ok(())
    }

    pub fn state(&self) -> ControllerState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_owner(&self) -> bool {
        self.state() == ControllerState::Owner
    }

    /// Receiver observing every state change.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.inner.state_tx.subscribe()
    }

    pub fn stats(&self) -> FailoverStats {
        self.inner.stats.read().clone()
    }

    pub fn config(&self) -> &FailoverConfig {
        &self.inner.config
    }

    pub fn candidate_path(&self) -> &str {
        &self.inner.candidate_path
    }

    /// Apply one watch event as the event loop would.
    #[cfg(test)]
    pub(crate) async fn handle_event(&self, event: ChildEvent) -> Option<ChildrenWatch> {
        self.inner.handle_event(event).await
    }
}

async fn run_event_loop(
    inner: Arc<Inner>,
    mut watch: ChildrenWatch,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = watch.next_event() => {
                let Some(event) = event else {
                    // The session ended without a connection event, e.g. the
                    // client was closed underneath the controller
                    inner.suspend("watch stream ended").await;
                    break;
                };
                if let Some(replacement) = inner.handle_event(event).await {
                    watch = replacement;
                }
                if inner.state_tx.borrow().is_terminal() {
                    break;
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    debug!(
        project = %inner.config.project,
        instance = %inner.config.instance_label,
        "event loop stopped"
    );
}

impl Inner {
    async fn handle_event(&self, event: ChildEvent) -> Option<ChildrenWatch> {
        self.stats.write().events_received += 1;
        let state = *self.state_tx.borrow();
        let action = decide(state, &event, &self.candidate_path);
        debug!(
            project = %self.config.project,
            instance = %self.config.instance_label,
            event = %event.kind,
            path = event.path().unwrap_or("-"),
            %state,
            ?action,
            "watch event"
        );

        match action {
            Action::Ignore => {}
            Action::Observe => info!(
                project = %self.config.project,
                path = %self.candidate_path,
                "candidate updated"
            ),
            Action::CheckOwnership => self.check_ownership().await,
            Action::Recreate => self.recreate_candidate().await,
            Action::DemoteAndRecreate => {
                self.transition(ControllerState::Owner, ControllerState::Watching);
                warn!(
                    project = %self.config.project,
                    instance = %self.config.instance_label,
                    "owned candidate removed, stepping down"
                );
                self.recreate_candidate().await;
            }
            Action::Suspend => self.suspend(&event.kind.to_string()).await,
            Action::RebuildWatch => return self.rebuild_watch().await,
        }
        None
    }

    async fn create_candidate(&self) -> warden_core::Result<()> {
        self.client
            .create(
                &self.candidate_path,
                self.config.instance_label.as_bytes(),
                CreateMode::Ephemeral,
                true,
            )
            .await
            .map(|_| ())
    }

    async fn check_ownership(&self) {
        self.stats.write().ownership_checks += 1;
        let session = match self.client.session_id() {
            Ok(session) => session,
            Err(e) => {
                error!(project = %self.config.project, error = %e, "no session for ownership check");
                return;
            }
        };
        match self.client.exists(&self.candidate_path).await {
            Ok(Some(metadata)) if owns_candidate(&metadata, session) => {
                if self.transition(ControllerState::Watching, ControllerState::Owner) {
                    self.stats.write().ownership_grants += 1;
                    info!(
                        project = %self.config.project,
                        instance = %self.config.instance_label,
                        session = %session,
                        "ownership granted"
                    );
                }
            }
            Ok(Some(metadata)) => debug!(
                project = %self.config.project,
                instance = %self.config.instance_label,
                owner = ?metadata.ephemeral_owner,
                "candidate owned by another session"
            ),
            Ok(None) => debug!(project = %self.config.project, "candidate absent"),
            Err(e) => error!(
                project = %self.config.project,
                instance = %self.config.instance_label,
                error = %e,
                "ownership check failed"
            ),
        }
    }

    async fn recreate_candidate(&self) {
        self.stats.write().recreate_attempts += 1;
        match self.create_candidate().await {
            Ok(()) => info!(
                project = %self.config.project,
                instance = %self.config.instance_label,
                "candidate recreated"
            ),
            Err(e) if e.is_node_exists() => {
                self.stats.write().recreate_races_lost += 1;
                info!(
                    project = %self.config.project,
                    instance = %self.config.instance_label,
                    "lost recreate race to a sibling"
                );
            }
            Err(e) => error!(
                project = %self.config.project,
                instance = %self.config.instance_label,
                error = %e,
                "failed to recreate candidate"
            ),
        }
    }

    /// Leave OWNER/WATCHING for SUSPENDED and close the client.
    async fn suspend(&self, cause: &str) {
        let changed = self.state_tx.send_if_modified(|state| {
            if state.is_live() {
                *state = ControllerState::Suspended;
                true
            } else {
                false
            }
        });
        if !changed {
            return;
        }
        self.stats.write().suspensions += 1;
        warn!(
            project = %self.config.project,
            instance = %self.config.instance_label,
            cause,
            "connection degraded, closing client"
        );
        self.watch_id.lock().take();
        if let Err(e) = self.client.close().await {
            error!(project = %self.config.project, error = %e, "failed to close client");
        }
    }

    async fn rebuild_watch(&self) -> Option<ChildrenWatch> {
        self.stats.write().watch_rebuilds += 1;
        let current = *self.watch_id.lock();
        if let Some(id) = current {
            match self.client.rebuild_watch(&id).await {
                Ok(()) => {
                    info!(project = %self.config.project, watch = %id, "watch rebuilt after reconnect");
                    return None;
                }
                Err(e) => warn!(
                    project = %self.config.project,
                    watch = %id,
                    error = %e,
                    "watch rebuild failed, re-subscribing"
                ),
            }
        }

        match self.client.watch_children(&self.config.root, true).await {
            Ok(watch) => {
                *self.watch_id.lock() = Some(watch.id);
                info!(project = %self.config.project, watch = %watch.id, "watch re-subscribed");
                if let Some(previous) = current {
                    if let Err(e) = self.client.unwatch(&previous).await {
                        debug!(
                            project = %self.config.project,
                            watch = %previous,
                            error = %e,
                            "failed to drop replaced watch"
                        );
                    }
                }
                Some(watch)
            }
            Err(e) => {
                error!(project = %self.config.project, error = %e, "failed to re-subscribe watch");
                self.suspend("watch lost").await;
                None
            }
        }
    }

    /// Move from `from` to `to`; false if the state was not `from`.
    fn transition(&self, from: ControllerState, to: ControllerState) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use warden_core::{
        ChildEventKind, ClientConfig, ConnectionState, CoordinationError, NodeMetadata, SessionId,
    };
    use warden_memory::{InMemoryClient, InMemoryCoordinator};

    fn controller(
        service: &InMemoryCoordinator,
        label: &str,
    ) -> (FailoverController, Arc<InMemoryClient>) {
        let client = Arc::new(service.connect(ClientConfig::default()));
        let controller =
            FailoverController::new(client.clone(), FailoverConfig::new("billing", label)).unwrap();
        (controller, client)
    }

    /// In-memory client whose watch calls and startup can be disturbed.
    struct FlakyClient {
        inner: InMemoryClient,
        fail_rebuild: AtomicBool,
        fail_watch: AtomicBool,
        slow_start: AtomicBool,
    }

    impl FlakyClient {
        fn new(service: &InMemoryCoordinator) -> Self {
            Self {
                inner: service.connect(ClientConfig::default()),
                fail_rebuild: AtomicBool::new(false),
                fail_watch: AtomicBool::new(false),
                slow_start: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl CoordinationClient for FlakyClient {
        async fn start(&self) -> warden_core::Result<()> {
            if self.slow_start.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            self.inner.start().await
        }

        async fn close(&self) -> warden_core::Result<()> {
            self.inner.close().await
        }

        fn is_started(&self) -> bool {
            self.inner.is_started()
        }

        fn state(&self) -> ConnectionState {
            self.inner.state()
        }

        fn session_id(&self) -> warden_core::Result<SessionId> {
            self.inner.session_id()
        }

        async fn exists(&self, path: &str) -> warden_core::Result<Option<NodeMetadata>> {
            self.inner.exists(path).await
        }

        async fn create(
            &self,
            path: &str,
            payload: &[u8],
            mode: CreateMode,
            create_parents: bool,
        ) -> warden_core::Result<String> {
            self.inner.create(path, payload, mode, create_parents).await
        }

        async fn get_data(&self, path: &str) -> warden_core::Result<(Bytes, NodeMetadata)> {
            self.inner.get_data(path).await
        }

        async fn set_data(&self, path: &str, payload: &[u8]) -> warden_core::Result<NodeMetadata> {
            self.inner.set_data(path, payload).await
        }

        async fn delete(&self, path: &str) -> warden_core::Result<()> {
            self.inner.delete(path).await
        }

        async fn get_children(&self, path: &str) -> warden_core::Result<Vec<String>> {
            self.inner.get_children(path).await
        }

        async fn watch_children(
            &self,
            path: &str,
            initial_sync: bool,
        ) -> warden_core::Result<ChildrenWatch> {
            if self.fail_watch.load(Ordering::SeqCst) {
                return Err(CoordinationError::connection_loss("watch refused"));
            }
            self.inner.watch_children(path, initial_sync).await
        }

        async fn rebuild_watch(&self, watch: &WatchId) -> warden_core::Result<()> {
            if self.fail_rebuild.load(Ordering::SeqCst) {
                return Err(CoordinationError::connection_loss("rebuild refused"));
            }
            self.inner.rebuild_watch(watch).await
        }

        async fn unwatch(&self, watch: &WatchId) -> warden_core::Result<()> {
            self.inner.unwatch(watch).await
        }

        async fn acquire_mutex(&self, path: &str, timeout: Duration) -> warden_core::Result<bool> {
            self.inner.acquire_mutex(path, timeout).await
        }

        async fn release_mutex(&self, path: &str) -> warden_core::Result<()> {
            self.inner.release_mutex(path).await
        }
    }

    fn flaky_controller(
        service: &InMemoryCoordinator,
        label: &str,
    ) -> (FailoverController, Arc<FlakyClient>) {
        let client = Arc::new(FlakyClient::new(service));
        let controller =
            FailoverController::new(client.clone(), FailoverConfig::new("billing", label)).unwrap();
        (controller, client)
    }

    /// Stop the background loop so the test alone feeds events.
    fn stop_event_loop(controller: &FailoverController) {
        if let Some(handle) = controller.inner.event_loop.lock().take() {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_first_instance_becomes_owner() {
        let service = InMemoryCoordinator::new();
        let (a, client) = controller(&service, "a");

        assert_eq!(a.state(), ControllerState::Unregistered);
        assert!(matches!(
            a.wait_for_ownership().await,
            Err(FailoverError::NotRegistered { .. })
        ));

        a.init().await.unwrap();
        assert!(a.is_owner());
        assert_eq!(
            service.ephemeral_owner(a.candidate_path()),
            Some(client.session_id().unwrap())
        );
        assert_eq!(&service.data(a.candidate_path()).unwrap()[..], b"a");
        assert_eq!(a.stats().ownership_grants, 1);
        assert!(matches!(
            a.register().await,
            Err(FailoverError::AlreadyRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_instance_waits_then_takes_over() {
        let service = InMemoryCoordinator::new();
        let (a, _) = controller(&service, "a");
        let (b, b_client) = controller(&service, "b");

        a.init().await.unwrap();
        b.register().await.unwrap();
        assert!(!b
            .wait_for_ownership_timeout(Duration::from_millis(50))
            .await
            .unwrap());
        assert_eq!(b.state(), ControllerState::Watching);

        a.shutdown().await.unwrap();
        assert!(b
            .wait_for_ownership_timeout(Duration::from_secs(2))
            .await
            .unwrap());
        assert_eq!(
            service.ephemeral_owner(b.candidate_path()),
            Some(b_client.session_id().unwrap())
        );
        assert_eq!(b.stats().recreate_attempts, 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_waiters() {
        let service = InMemoryCoordinator::new();
        let (a, _) = controller(&service, "a");
        let (b, _) = controller(&service, "b");
        a.init().await.unwrap();
        b.register().await.unwrap();

        let waiter = {
            let b = b.clone();
            tokio::spawn(async move { b.wait_for_ownership().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        b.shutdown().await.unwrap();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(FailoverError::Interrupted { .. })
        ));
        assert_eq!(b.state(), ControllerState::Stopped);
        assert!(a.is_owner());
    }

    #[tokio::test]
    async fn test_suspension_closes_client() {
        let service = InMemoryCoordinator::new();
        let (a, client) = controller(&service, "a");
        a.init().await.unwrap();

        let mut states = a.subscribe();
        service.suspend_session(client.session_id().unwrap());
        tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(|s| *s == ControllerState::Suspended),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(matches!(
            a.wait_for_ownership().await,
            Err(FailoverError::Suspended { .. })
        ));
        assert_eq!(a.stats().suspensions, 1);
        assert_eq!(client.state(), warden_core::ConnectionState::Closed);
        assert_eq!(service.ephemeral_owner(a.candidate_path()), None);
    }

    #[tokio::test]
    async fn test_owner_demoted_when_candidate_deleted() {
        let service = InMemoryCoordinator::new();
        let (a, a_client) = controller(&service, "a");
        a.init().await.unwrap();

        let admin = service.connect(ClientConfig::default());
        admin.start().await.unwrap();
        admin.delete(a.candidate_path()).await.unwrap();

        // Only instance left, so it wins the recreate race and is promoted again
        let mut states = a.subscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            while a.stats().ownership_grants < 2 {
                states.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert!(a.is_owner());
        assert_eq!(
            service.ephemeral_owner(a.candidate_path()),
            Some(a_client.session_id().unwrap())
        );
    }

    #[tokio::test]
    async fn test_reconnect_rebuilds_or_resubscribes() {
        let service = InMemoryCoordinator::new();
        let (a, _) = controller(&service, "a");
        let (b, b_client) = flaky_controller(&service, "b");
        a.init().await.unwrap();
        b.register().await.unwrap();
        stop_event_loop(&b);

        let reconnected = ChildEvent::connection(ChildEventKind::ConnectionReconnected);
        assert!(b.handle_event(reconnected.clone()).await.is_none());
        assert_eq!(b.stats().watch_rebuilds, 1);

        let watches = service.watch_count();
        let old = (*b.inner.watch_id.lock()).unwrap();
        b_client.fail_rebuild.store(true, Ordering::SeqCst);
        let replacement = b.handle_event(reconnected).await;
        let mut replacement = replacement.expect("re-subscribed watch");
        assert_ne!(replacement.id, old);
        assert_eq!(*b.inner.watch_id.lock(), Some(replacement.id));
        assert_eq!(b.stats().watch_rebuilds, 2);
        // the replaced watch is dropped, not leaked
        assert_eq!(service.watch_count(), watches);

        let first = replacement.next_event().await.unwrap();
        assert_eq!(first.kind, ChildEventKind::ChildAdded);
        assert_eq!(first.path(), Some(b.candidate_path()));
        assert_eq!(b.state(), ControllerState::Watching);
    }

    #[tokio::test]
    async fn test_unrecoverable_watch_suspends() {
        let service = InMemoryCoordinator::new();
        let (a, _) = controller(&service, "a");
        let (b, b_client) = flaky_controller(&service, "b");
        a.init().await.unwrap();
        b.register().await.unwrap();
        stop_event_loop(&b);

        let waiter = {
            let b = b.clone();
            tokio::spawn(async move { b.wait_for_ownership().await })
        };
        b_client.fail_rebuild.store(true, Ordering::SeqCst);
        b_client.fail_watch.store(true, Ordering::SeqCst);

        let reconnected = ChildEvent::connection(ChildEventKind::ConnectionReconnected);
        assert!(b.handle_event(reconnected).await.is_none());
        assert_eq!(b.state(), ControllerState::Suspended);
        assert_eq!(b.stats().watch_rebuilds, 1);
        assert_eq!(b.stats().suspensions, 1);
        assert_eq!(b_client.state(), ConnectionState::Closed);
        assert!(matches!(
            waiter.await.unwrap(),
            Err(FailoverError::Suspended { .. })
        ));
        assert!(a.is_owner());
    }

    #[tokio::test]
    async fn test_client_closed_underneath_owner() {
        let service = InMemoryCoordinator::new();
        let (a, a_client) = controller(&service, "a");
        let (b, _) = controller(&service, "b");
        a.init().await.unwrap();
        b.register().await.unwrap();

        let mut states = a.subscribe();
        a_client.close().await.unwrap();
        tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(|s| *s == ControllerState::Suspended),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(!a.is_owner());
        assert!(matches!(
            a.wait_for_ownership().await,
            Err(FailoverError::Suspended { .. })
        ));
        assert_eq!(a.stats().suspensions, 1);
        assert!(b
            .wait_for_ownership_timeout(Duration::from_secs(2))
            .await
            .unwrap());
        assert!(!(a.is_owner() && b.is_owner()));
    }

    #[tokio::test]
    async fn test_concurrent_register_proceeds_once() {
        let service = InMemoryCoordinator::new();
        let (a, client) = flaky_controller(&service, "a");
        client.slow_start.store(true, Ordering::SeqCst);
        let twin = a.clone();

        let (first, second) = tokio::join!(a.register(), twin.register());
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(FailoverError::AlreadyRegistered { .. }))));

        assert!(a
            .wait_for_ownership_timeout(Duration::from_secs(2))
            .await
            .unwrap());
        assert_eq!(a.stats().recreate_attempts, 0);
        assert_eq!(service.watch_count(), 1);
        a.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_register_can_be_retried() {
        let service = InMemoryCoordinator::new();
        let (a, client) = flaky_controller(&service, "a");
        client.fail_watch.store(true, Ordering::SeqCst);

        assert!(matches!(
            a.register().await,
            Err(FailoverError::Coordination(CoordinationError::ConnectionLoss { .. }))
        ));
        assert_eq!(a.state(), ControllerState::Unregistered);

        client.fail_watch.store(false, Ordering::SeqCst);
        a.init().await.unwrap();
        assert!(a.is_owner());
    }

    #[tokio::test]
    async fn test_sibling_project_does_not_interfere() {
        let service = InMemoryCoordinator::new();
        let (a, _) = controller(&service, "a");
        let client = Arc::new(service.connect(ClientConfig::default()));
        let payroll =
            FailoverController::new(client, FailoverConfig::new("payroll", "p")).unwrap();

        a.init().await.unwrap();
        payroll.init().await.unwrap();
        assert!(a.is_owner());
        assert!(payroll.is_owner());

        payroll.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(a.is_owner());
        assert_eq!(a.stats().recreate_attempts, 0);
    }
}
