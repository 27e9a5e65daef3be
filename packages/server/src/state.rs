//! Server state and connection identity bookkeeping.

use std::sync::Arc;

use rehearsal_shared::time::Clock;

use crate::directory::RoomDirectory;

/// Shared application state
pub struct AppState {
    /// Room membership and connection registry
    pub directory: RoomDirectory,
    /// Clock used for pong timestamps
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            directory: RoomDirectory::new(),
            clock,
        }
    }
}

/// Identity a connection acquires on its first successful `join`.
///
/// Recorded once so later messages from the same socket need not resupply
/// room or user, and so close-time cleanup knows which entry to drop.
#[derive(Debug, Clone, Default)]
pub struct ConnIdentity {
    pub room_id: Option<String>,
    pub user_id: Option<String>,
    pub nickname: Option<String>,
}
