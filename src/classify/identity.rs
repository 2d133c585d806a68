//! Display identity resolution
//!
//! Resolves the conversation peer's display name (saved contact first, then a
//! gateway lookup, then push-preview recovery for synthesized placeholders)
//! and the author's display name (contact map first, then the per-group
//! member directory).

use serde_json::Value;

use super::markup::tree_text;
use super::types::CanonicalMessage;
use crate::gateway::{contacts, GatewayClient};
use crate::store::{ContactStore, GroupDirectory};

/// Synthetic identity substituted for application service accounts
const SERVICE_NOTIFICATION_ID: &str = "service_notification";

/// Prefixes of names synthesized when no real profile was available
const PLACEHOLDER_PREFIXES: [&str; 2] = ["微信_", "企微_"];

/// Fallback shown when a group author cannot be resolved at all
const UNKNOWN_SENDER: &str = "unknown";

/// Resolve contact and sender display names in place
pub async fn resolve_names(
    msg: &mut CanonicalMessage,
    account_id: &str,
    gateway: &GatewayClient,
    contacts_store: &ContactStore,
    groups: &GroupDirectory,
) {
    let (contact_name, avatar_url) =
        resolve_contact(msg, account_id, gateway, contacts_store).await;

    msg.sender_name = resolve_sender(msg, &contact_name, contacts_store, groups).await;
    msg.contact_name = contact_name;
    msg.avatar_url = avatar_url;
}

/// Resolve the conversation peer's display name and avatar
async fn resolve_contact(
    msg: &CanonicalMessage,
    account_id: &str,
    gateway: &GatewayClient,
    contacts_store: &ContactStore,
) -> (String, String) {
    let (mut name, avatar) = if let Some(saved) = contacts_store.get(&msg.from_id) {
        (saved.name, saved.avatar)
    } else {
        match contacts::contact_info(gateway, account_id, &msg.from_id).await {
            Ok(info) => (info.name, info.avatar_url),
            Err(e) => {
                tracing::debug!(from = %msg.from_id, error = %e, "contact lookup failed");
                (format!("微信_{}", msg.from_id), String::new())
            }
        }
    };

    // a synthesized placeholder can often be improved from the push preview
    if is_placeholder(&name) && !msg.push_preview.is_empty() {
        if let Some(preview) = preview_name(&msg.push_preview) {
            name = preview.to_string();
        }
    }

    if msg.from_id == SERVICE_NOTIFICATION_ID {
        if let Some(app_name) = msg.body.as_tree().and_then(service_source_name) {
            name = app_name.to_string();
        }
    }

    (name, avatar)
}

/// Resolve the author's display name
async fn resolve_sender(
    msg: &CanonicalMessage,
    contact_name: &str,
    contacts_store: &ContactStore,
    groups: &GroupDirectory,
) -> String {
    // 1:1 conversation: the author is the peer
    if msg.sender_id == msg.from_id {
        return contact_name.to_string();
    }

    if let Some(saved) = contacts_store.get(&msg.sender_id) {
        return saved.name;
    }

    let name = groups.display_name(&msg.from_id, &msg.sender_id).await;
    if name.is_empty() {
        UNKNOWN_SENDER.to_string()
    } else {
        name
    }
}

fn is_placeholder(name: &str) -> bool {
    PLACEHOLDER_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Leading name segment of a push preview
///
/// Previews vary by locale: `name : text` or `nameさん...`.
pub(crate) fn preview_name(preview: &str) -> Option<&str> {
    let name = preview.split(" : ").next()?.split("さん").next()?;
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Name for a service-notification pseudo-sender, read from the nested
/// application payload: app name, then publisher, category, and source names
fn service_source_name(tree: &Value) -> Option<&str> {
    const PATHS: [&[&str]; 4] = [
        &["msg", "appinfo", "appname"],
        &["msg", "appmsg", "mmreader", "publisher", "nickname"],
        &["msg", "appmsg", "mmreader", "category", "name"],
        &["msg", "appmsg", "mmreader", "category", "item", "sources", "source", "name"],
    ];

    PATHS
        .iter()
        .find_map(|path| tree_text(tree, path).filter(|s| !s.is_empty()))
}
