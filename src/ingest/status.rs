//! Upstream session status watch
//!
//! Every batch carries a status message; this tracks a two-state
//! online/offline flag and emits a notification only on transitions.

use std::sync::Mutex;

use crate::notify::Notifier;

use super::STATUS_MAYBE_OFFLINE;

/// Two-state session flag fed from batch status messages
#[derive(Debug)]
pub struct LoginWatch {
    online: Mutex<Option<bool>>,
    notifier: Notifier,
}

impl LoginWatch {
    #[must_use]
    pub fn new(notifier: Notifier) -> Self {
        Self {
            online: Mutex::new(None),
            notifier,
        }
    }

    /// Feed one batch status message, notifying on state transitions
    pub async fn observe(&self, status_message: &str) {
        let now_online = status_message != STATUS_MAYBE_OFFLINE;

        let transition = {
            let mut online = self.online.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let changed = *online != Some(now_online);
            *online = Some(now_online);
            changed
        };

        if !transition {
            return;
        }

        if now_online {
            tracing::info!("upstream session online");
            self.notifier.send("account back online").await;
        } else {
            tracing::warn!("upstream session may be offline");
            self.notifier.send("account offline").await;
        }
    }

    /// Current flag; `None` until the first batch arrives
    #[must_use]
    pub fn is_online(&self) -> Option<bool> {
        *self.online.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
