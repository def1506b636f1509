use super::types::Status;
use std::sync::{Arc, PoisonError, RwLock};

/// Read-only view of the manager's [`Status`].
///
/// Each snapshot is one complete status; a new status replaces the old one
/// as a whole, so readers never see fields of two different applies.
#[derive(Clone, Default)]
pub struct StatusHandle {
    current: Arc<RwLock<Arc<Status>>>,
}

impl StatusHandle {
    pub fn snapshot(&self) -> Arc<Status> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(super) fn publish(&self, status: Status) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(status);
    }

    /// Stores a fresh neighbor count, unless the AP it was measured on is no
    /// longer the active one.
    pub(super) fn publish_connected(&self, ap_interface: &str, connected_ips: usize) -> bool {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if !current.active || current.ap_interface != ap_interface {
            return false;
        }

        let mut next = Status::clone(&current);
        next.connected_ips = connected_ips;
        *current = Arc::new(next);
        true
    }
}
