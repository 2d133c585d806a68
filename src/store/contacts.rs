//! Keyed contact mapping backed by a JSON file
//!
//! The file is maintained by an external tool; the bridge only reads it, for
//! display names and delivery eligibility. The file is reloaded when its
//! modification time changes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// One saved contact mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    #[serde(rename = "name", default)]
    pub name: String,

    #[serde(rename = "wxId")]
    pub id: String,

    /// Downstream conversation id; the unset marker is a large negative
    /// sentinel written by the external tool
    #[serde(rename = "chatId", default)]
    pub conversation_id: i64,

    #[serde(rename = "isGroup", default)]
    pub is_group: bool,

    /// Whether messages from this contact should be delivered downstream
    #[serde(rename = "isReceive", default)]
    pub receive: bool,

    #[serde(rename = "alias", default)]
    pub alias: String,

    #[serde(rename = "avatarLink", default)]
    pub avatar: String,
}

#[derive(Debug, Default)]
struct ContactCache {
    by_id: HashMap<String, ContactRecord>,
    loaded_mtime: Option<SystemTime>,
}

/// Read-side view of the contact mapping file
#[derive(Debug)]
pub struct ContactStore {
    path: PathBuf,
    cache: Mutex<ContactCache>,
}

impl ContactStore {
    /// Open a store over the given file; a missing file is an empty store
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        let store = Self {
            path,
            cache: Mutex::new(ContactCache::default()),
        };
        store.reload_if_changed();
        store
    }

    /// Look up a contact by id, reloading the file first if it changed
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ContactRecord> {
        self.reload_if_changed();
        let cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        cache.by_id.get(id).cloned()
    }

    /// Number of loaded contacts
    #[must_use]
    pub fn len(&self) -> usize {
        let cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        cache.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reload_if_changed(&self) {
        let mtime = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(_) => return, // missing file keeps the current (possibly empty) cache
        };

        let mut cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if cache.loaded_mtime == Some(mtime) {
            return;
        }

        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<Vec<ContactRecord>>(&raw) {
                Ok(records) => {
                    cache.by_id = records.into_iter().map(|r| (r.id.clone(), r)).collect();
                    cache.loaded_mtime = Some(mtime);
                    tracing::debug!(
                        path = %self.path.display(),
                        count = cache.by_id.len(),
                        "contact mapping reloaded"
                    );
                }
                Err(e) => {
                    tracing::error!(path = %self.path.display(), error = %e, "contact mapping unreadable");
                }
            },
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "contact mapping read failed");
            }
        }
    }
}
