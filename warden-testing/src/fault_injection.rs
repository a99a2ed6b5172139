use rand::seq::SliceRandom;
use tracing::info;
use warden_core::SessionId;
use warden_memory::InMemoryCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFault {
    /// End the session as the service does after a session timeout
    Expire,
    /// Drop the connection without ending the session
    Suspend,
    /// Restore a suspended connection
    Reconnect,
}

/// Apply a fault to one session. Returns false if the session is unknown.
pub fn inject(service: &InMemoryCoordinator, session: SessionId, fault: SessionFault) -> bool {
    info!(session = %session, ?fault, "injecting session fault");
    match fault {
        SessionFault::Expire => service.expire_session(session),
        SessionFault::Suspend => service.suspend_session(session),
        SessionFault::Reconnect => service.reconnect_session(session),
    }
}

/// Pick a random session among `sessions`.
pub fn pick_victim(sessions: &[SessionId]) -> Option<SessionId> {
    sessions.choose(&mut rand::thread_rng()).copied()
}
