use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use relay_core::ids::SessionId;
use relay_core::turns::Turn;

/// One generation in flight for a session.
struct ActiveRun {
    cancel: CancellationToken,
}

#[derive(Debug, thiserror::Error)]
#[error("session {0} already has a generation in flight")]
pub struct SessionBusy(pub SessionId);

/// Cross-session bookkeeping for the gateway. Enforces the single-writer
/// invariant: at most one generation per session, a second request is
/// rejected rather than queued. The gateway itself never mutates a live
/// transcript; it only stores the snapshot handed back when a run ends.
pub struct SessionStore {
    active: DashMap<SessionId, ActiveRun>,
    transcripts: DashMap<SessionId, Vec<Turn>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
            transcripts: DashMap::new(),
        }
    }

    /// Claim the session for one generation; the returned token cancels it.
    pub fn begin(&self, id: &SessionId) -> Result<CancellationToken, SessionBusy> {
        match self.active.entry(id.clone()) {
            Entry::Occupied(_) => Err(SessionBusy(id.clone())),
            Entry::Vacant(slot) => {
                let cancel = CancellationToken::new();
                slot.insert(ActiveRun {
                    cancel: cancel.clone(),
                });
                Ok(cancel)
            }
        }
    }

    /// Release the session and store the finalized transcript snapshot.
    pub fn finish(&self, id: &SessionId, snapshot: Vec<Turn>) {
        self.active.remove(id);
        self.transcripts.insert(id.clone(), snapshot);
    }

    /// Cancel a generation in flight. The session stays claimed until the
    /// run winds down and calls `finish`.
    pub fn abort(&self, id: &SessionId) -> bool {
        match self.active.get(id) {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn abort_all(&self) -> usize {
        let mut count = 0;
        for entry in self.active.iter() {
            entry.value().cancel.cancel();
            count += 1;
        }
        count
    }

    pub fn is_generating(&self, id: &SessionId) -> bool {
        self.active.contains_key(id)
    }

    pub fn known(&self, id: &SessionId) -> bool {
        self.active.contains_key(id) || self.transcripts.contains_key(id)
    }

    /// Read-only copy of a session's finalized transcript.
    pub fn snapshot(&self, id: &SessionId) -> Option<Vec<Turn>> {
        self.transcripts.get(id).map(|t| t.value().clone())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
