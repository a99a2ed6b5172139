//! Pure failover state transition functions.
//!
//! Everything in this module is deterministic and side-effect free. The
//! controller feeds every watch event through [`decide`] and then performs
//! the returned [`Action`].
//!
//! ```text
//! UNREGISTERED --register()--------------------------> WATCHING
//! WATCHING     --own candidate observed--------------> OWNER
//! WATCHING     --candidate removed (recreate)--------> WATCHING
//! OWNER        --candidate removed (recreate)--------> WATCHING
//! any live     --connection lost / suspended---------> SUSPENDED
//! WATCHING     --reconnected (rebuild watch)---------> WATCHING
//! ```

use std::fmt;
use warden_core::{ChildEvent, ChildEventKind, NodeMetadata, SessionId};

/// Lifecycle state of one controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    /// Created, `register()` not called yet
    Unregistered,
    /// Candidate registration attempted, watching the project namespace
    Watching,
    /// This instance's session owns the candidate node
    Owner,
    /// Connection lost or suspended; the client has been closed
    Suspended,
    /// Shut down by the caller
    Stopped,
}

impl ControllerState {
    /// Whether events can still change this state.
    pub fn is_live(&self) -> bool {
        matches!(self, ControllerState::Watching | ControllerState::Owner)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ControllerState::Suspended | ControllerState::Stopped)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Unregistered => "UNREGISTERED",
            ControllerState::Watching => "WATCHING",
            ControllerState::Owner => "OWNER",
            ControllerState::Suspended => "SUSPENDED",
            ControllerState::Stopped => "STOPPED",
        };
        write!(f, "{}", name)
    }
}

/// Side effect requested by [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do
    Ignore,
    /// Candidate data changed; observe only
    Observe,
    /// Fetch the candidate's metadata and compare its owner with our session
    CheckOwnership,
    /// Race to recreate the vacated candidate node
    Recreate,
    /// Step down from OWNER, then race to recreate the candidate node
    DemoteAndRecreate,
    /// Close the client and stop reacting to events
    Suspend,
    /// Resynchronize the children watch after a reconnect
    RebuildWatch,
}

/// Whether the candidate described by `metadata` is owned by `session`.
///
/// ```rust
/// use warden_core::{NodeMetadata, SessionId};
/// use warden_failover::owns_candidate;
///
/// let metadata = NodeMetadata {
///     creation_id: 1,
///     version: 0,
///     ephemeral_owner: Some(SessionId(7)),
///     created_at: 0,
///     modified_at: 0,
///     data_length: 0,
///     num_children: 0,
/// };
/// assert!(owns_candidate(&metadata, SessionId(7)));
/// assert!(!owns_candidate(&metadata, SessionId(8)));
/// ```
#[inline]
pub fn owns_candidate(metadata: &NodeMetadata, session: SessionId) -> bool {
    metadata.is_owned_by(session)
}

/// Compute the action for one watch event.
///
/// Child events about nodes other than `candidate_path` (sibling projects
/// sharing the root) are ignored. Connection events apply regardless of the
/// event's path.
pub fn decide(state: ControllerState, event: &ChildEvent, candidate_path: &str) -> Action {
    if !state.is_live() {
        return Action::Ignore;
    }

    match event.kind {
        ChildEventKind::ConnectionLost | ChildEventKind::ConnectionSuspended => Action::Suspend,
        ChildEventKind::ConnectionReconnected => Action::RebuildWatch,
        ChildEventKind::Initialized => match state {
            ControllerState::Watching => Action::CheckOwnership,
            _ => Action::Ignore,
        },
        kind => {
            if event.path() != Some(candidate_path) {
                return Action::Ignore;
            }
            match (kind, state) {
                (ChildEventKind::ChildAdded, ControllerState::Watching) => Action::CheckOwnership,
                (ChildEventKind::ChildRemoved, ControllerState::Watching) => Action::Recreate,
                (ChildEventKind::ChildRemoved, ControllerState::Owner) => {
                    Action::DemoteAndRecreate
                }
                (ChildEventKind::ChildUpdated, _) => Action::Observe,
                _ => Action::Ignore,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;
    use warden_core::ChildData;

    const CANDIDATE: &str = "/utils/autoswitch/billing";

    fn child_event(kind: ChildEventKind, path: &str) -> ChildEvent {
        ChildEvent::child(
            kind,
            ChildData {
                path: path.to_string(),
                payload: Bytes::new(),
                metadata: NodeMetadata {
                    creation_id: 1,
                    version: 0,
                    ephemeral_owner: Some(SessionId(1)),
                    created_at: 0,
                    modified_at: 0,
                    data_length: 0,
                    num_children: 0,
                },
            },
        )
    }

    #[test]
    fn test_watching_transitions() {
        let state = ControllerState::Watching;
        assert_eq!(
            decide(state, &ChildEvent::initialized(), CANDIDATE),
            Action::CheckOwnership
        );
        assert_eq!(
            decide(state, &child_event(ChildEventKind::ChildAdded, CANDIDATE), CANDIDATE),
            Action::CheckOwnership
        );
        assert_eq!(
            decide(state, &child_event(ChildEventKind::ChildRemoved, CANDIDATE), CANDIDATE),
            Action::Recreate
        );
        assert_eq!(
            decide(state, &child_event(ChildEventKind::ChildUpdated, CANDIDATE), CANDIDATE),
            Action::Observe
        );
        assert_eq!(
            decide(
                state,
                &ChildEvent::connection(ChildEventKind::ConnectionReconnected),
                CANDIDATE
            ),
            Action::RebuildWatch
        );
    }

    #[test]
    fn test_owner_transitions() {
        let state = ControllerState::Owner;
        assert_eq!(
            decide(state, &child_event(ChildEventKind::ChildAdded, CANDIDATE), CANDIDATE),
            Action::Ignore
        );
        assert_eq!(
            decide(state, &ChildEvent::initialized(), CANDIDATE),
            Action::Ignore
        );
        assert_eq!(
            decide(state, &child_event(ChildEventKind::ChildRemoved, CANDIDATE), CANDIDATE),
            Action::DemoteAndRecreate
        );
        assert_eq!(
            decide(
                state,
                &ChildEvent::connection(ChildEventKind::ConnectionSuspended),
                CANDIDATE
            ),
            Action::Suspend
        );
    }

    #[test]
    fn test_sibling_projects_are_ignored() {
        for kind in [
            ChildEventKind::ChildAdded,
            ChildEventKind::ChildRemoved,
            ChildEventKind::ChildUpdated,
        ] {
            assert_eq!(
                decide(
                    ControllerState::Watching,
                    &child_event(kind, "/utils/autoswitch/payroll"),
                    CANDIDATE
                ),
                Action::Ignore
            );
        }
    }

    #[test]
    fn test_terminal_states_ignore_everything() {
        for state in [
            ControllerState::Unregistered,
            ControllerState::Suspended,
            ControllerState::Stopped,
        ] {
            assert_eq!(
                decide(state, &child_event(ChildEventKind::ChildRemoved, CANDIDATE), CANDIDATE),
                Action::Ignore
            );
            assert_eq!(
                decide(state, &ChildEvent::connection(ChildEventKind::ConnectionLost), CANDIDATE),
                Action::Ignore
            );
        }
    }

    fn live_state() -> impl Strategy<Value = ControllerState> {
        prop_oneof![Just(ControllerState::Watching), Just(ControllerState::Owner)]
    }

    fn child_kind() -> impl Strategy<Value = ChildEventKind> {
        prop_oneof![
            Just(ChildEventKind::ChildAdded),
            Just(ChildEventKind::ChildRemoved),
            Just(ChildEventKind::ChildUpdated),
        ]
    }

    proptest! {
        #[test]
        fn prop_other_paths_never_act(
            state in live_state(),
            kind in child_kind(),
            name in "[a-z]{1,12}",
        ) {
            prop_assume!(name != "billing");
            let event = child_event(kind, &format!("/utils/autoswitch/{}", name));
            prop_assert_eq!(decide(state, &event, CANDIDATE), Action::Ignore);
        }

        #[test]
        fn prop_owner_never_rechecks(kind in child_kind()) {
            let action = decide(ControllerState::Owner, &child_event(kind, CANDIDATE), CANDIDATE);
            prop_assert_ne!(action, Action::CheckOwnership);
        }
    }
}
