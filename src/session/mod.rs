pub mod entry;
pub mod identity;
pub mod registry;

pub use entry::SessionEntry;
pub use identity::ProcessSession;
pub use registry::{SessionRegistry, SessionState};
