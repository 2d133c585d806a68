//! Per-group member directory with lazy gateway refresh
//!
//! Maps group id to its member roster. An unknown group triggers one roster
//! fetch from the gateway; the result is cached in memory and persisted
//! best-effort to the directory file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::gateway::{GatewayClient, Operation};
use crate::{Error, Result};

/// One group member entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub nickname: String,

    #[serde(default)]
    pub displayname: String,
}

impl GroupMember {
    /// Preferred display name: per-group display name, else nickname
    #[must_use]
    pub fn preferred_name(&self) -> &str {
        if self.displayname.is_empty() {
            &self.nickname
        } else {
            &self.displayname
        }
    }
}

/// Member directory keyed by group id
#[derive(Debug)]
pub struct GroupDirectory {
    path: PathBuf,
    gateway: Arc<GatewayClient>,
    account_id: String,
    groups: Mutex<HashMap<String, Vec<GroupMember>>>,
}

impl GroupDirectory {
    /// Open the directory, seeding from the file when present
    #[must_use]
    pub fn new(path: PathBuf, gateway: Arc<GatewayClient>, account_id: String) -> Self {
        let groups = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        Self {
            path,
            gateway,
            account_id,
            groups: Mutex::new(groups),
        }
    }

    /// Display name of a member within a group
    ///
    /// An uncached group is fetched from the gateway first. Returns an empty
    /// string when the member (or the roster) cannot be resolved.
    pub async fn display_name(&self, group_id: &str, member_id: &str) -> String {
        if !self.is_cached(group_id) {
            if let Err(e) = self.refresh(group_id).await {
                tracing::warn!(group = group_id, error = %e, "group roster fetch failed");
            }
        }

        let groups = self.groups.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        groups
            .get(group_id)
            .and_then(|members| members.iter().find(|m| m.username == member_id))
            .map(|m| m.preferred_name().to_string())
            .unwrap_or_default()
    }

    /// Fetch a group's roster from the gateway and cache it
    ///
    /// # Errors
    ///
    /// Returns error if the gateway call fails or the response shape is
    /// unexpected
    pub async fn refresh(&self, group_id: &str) -> Result<()> {
        let body = json!({
            "QID": group_id,
            "Wxid": self.account_id,
        });

        let response = self.gateway.call(Operation::GetGroupMemberDetail, &body).await?;
        let (name, members) = extract_members(&response)?;

        tracing::info!(group = %name, count = members.len(), "group roster updated");

        {
            let mut groups = self.groups.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            groups.insert(name, members);
        }

        self.persist();
        Ok(())
    }

    fn is_cached(&self, group_id: &str) -> bool {
        let groups = self.groups.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        groups.contains_key(group_id)
    }

    /// Best-effort write-back of the directory file
    fn persist(&self) {
        let serialized = {
            let groups = self.groups.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            serde_json::to_string_pretty(&*groups)
        };

        match serialized {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&self.path, raw) {
                    tracing::warn!(path = %self.path.display(), error = %e, "group directory write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "group directory serialize failed"),
        }
    }
}

/// Pull the roster out of a `GetChatRoomMemberDetail` response
fn extract_members(response: &Value) -> Result<(String, Vec<GroupMember>)> {
    let data = response
        .get("Data")
        .ok_or_else(|| Error::Payload("group roster response missing Data".into()))?;

    let name = data
        .get("ChatroomUserName")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let raw_members = data
        .get("NewChatroomData")
        .and_then(|d| d.get("ChatRoomMember"))
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Payload("group roster response missing member list".into()))?;

    let members = raw_members
        .iter()
        .filter(|m| !m.is_null())
        .map(|m| GroupMember {
            username: str_field(m, "UserName"),
            nickname: str_field(m, "NickName"),
            displayname: str_field(m, "DisplayName"),
        })
        .collect();

    Ok((name, members))
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
