//! Download round state machine of the block syncer.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No sync peer is downloading.
    ///
    /// Initial state, and the state after a round failed because the sync
    /// peer went away.
    #[default]
    Idle,

    /// A sync peer was elected and is fetching hashes and merkle blocks.
    Syncing,

    /// The last sync peer had nothing more to give.
    ///
    /// New inventory or a fresh peer starts another round.
    Synced,
}

impl SyncState {
    pub fn can_transition_to(&self, target: SyncState) -> bool {
        match self {
            SyncState::Idle => matches!(target, SyncState::Syncing),
            SyncState::Syncing => matches!(target, SyncState::Synced | SyncState::Idle),
            SyncState::Synced => matches!(target, SyncState::Syncing | SyncState::Idle),
        }
    }
}
