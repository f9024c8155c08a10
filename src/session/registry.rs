use crate::session::entry::SessionEntry;
use crate::validation::params::AnnounceEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lifecycle of one infohash inside the proxy
///
/// `Absent -> Bootstrapping -> Cached -> Stopped`. The claim on the
/// `Absent -> Bootstrapping` edge happens under the slot lock, and the
/// lock is held across the upstream fetch, so concurrent first-contact
/// announces for the same infohash wait on the winner instead of
/// issuing a second fetch.
#[derive(Debug)]
pub enum SessionState {
    Absent,
    Bootstrapping,
    Cached(SessionEntry),
    Stopped(SessionEntry),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Absent => "absent",
            SessionState::Bootstrapping => "bootstrapping",
            SessionState::Cached(_) => "cached",
            SessionState::Stopped(_) => "stopped",
        }
    }

    pub fn entry(&self) -> Option<&SessionEntry> {
        match self {
            SessionState::Cached(entry) | SessionState::Stopped(entry) => Some(entry),
            _ => None,
        }
    }

    /// Answer an announce from an existing session, applying transitions
    ///
    /// Returns the cached response bytes, or `None` when no session
    /// exists yet and the caller must bootstrap. A "stopped" event
    /// freezes the counters; a later "started" resumes them unchanged.
    /// Any other event against a cached entry advances the synthetic
    /// progress by one tick.
    pub fn serve(&mut self, event: Option<AnnounceEvent>, base_rate: u64) -> Option<Vec<u8>> {
        let state = std::mem::replace(self, SessionState::Absent);

        let (next, served) = match state {
            SessionState::Cached(mut entry) => match event {
                Some(AnnounceEvent::Stopped) => {
                    let bytes = entry.cached_peers.clone();
                    (SessionState::Stopped(entry), Some(bytes))
                }
                _ => {
                    entry.advance(base_rate);
                    let bytes = entry.cached_peers.clone();
                    (SessionState::Cached(entry), Some(bytes))
                }
            },
            SessionState::Stopped(entry) => {
                let bytes = entry.cached_peers.clone();
                match event {
                    Some(AnnounceEvent::Started) => (SessionState::Cached(entry), Some(bytes)),
                    // Repeated stops (and anything else) are answered
                    // idempotently without touching the counters
                    _ => (SessionState::Stopped(entry), Some(bytes)),
                }
            }
            other => (other, None),
        };

        *self = next;
        served
    }
}

/// Shared per-torrent session store
///
/// One slot per infohash, each guarded by its own async mutex so state
/// transitions serialize per torrent while unrelated torrents never
/// contend. Entries are never evicted for the life of the process.
pub struct SessionRegistry {
    slots: DashMap<[u8; 20], Arc<Mutex<SessionState>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Fetch the slot for an infohash, creating an absent one on first sight
    pub fn slot(&self, info_hash: [u8; 20]) -> Arc<Mutex<SessionState>> {
        self.slots
            .entry(info_hash)
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::Absent)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
