// Application state (AppState)

use crate::core::config::Config;
use crate::session::identity::ProcessSession;
use crate::session::registry::SessionRegistry;
use crate::upstream::fetcher::BootstrapFetcher;
use std::sync::Arc;

/// Shared application state
///
/// Everything request handlers touch, wrapped in Arc for cheap cloning
/// across tasks. The registry and identity are explicitly owned here
/// and threaded into handlers, never ambient globals.
#[derive(Clone)]
pub struct AppState {
    /// Per-torrent session store
    pub registry: Arc<SessionRegistry>,

    /// One-time upstream announce client
    pub fetcher: Arc<BootstrapFetcher>,

    /// Process-wide peer id and session key
    pub identity: Arc<ProcessSession>,

    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, fetcher: BootstrapFetcher, identity: ProcessSession) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            fetcher: Arc::new(fetcher),
            identity: Arc::new(identity),
            config: Arc::new(config),
        }
    }
}
