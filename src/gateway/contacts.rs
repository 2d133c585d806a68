//! Contact detail lookup against the gateway

use serde_json::{json, Value};

use super::{GatewayClient, Operation};
use crate::{Error, Result};

/// WeCom (enterprise) account suffix; these ids carry no gateway profile
const WECOM_SUFFIX: &str = "@openim";

/// Resolved display information for one contact
#[derive(Debug, Clone)]
pub struct ContactInfo {
    pub name: String,
    pub avatar_url: String,
}

/// Look up display info for a single contact id
///
/// WeCom ids are answered locally with a synthesized `企微_` name since the
/// gateway has no profile for them. Everything else goes through one
/// `GetContactDetail` call; the name falls back through remark, then nickname,
/// then a synthesized `微信_` placeholder.
///
/// # Errors
///
/// Returns error if the gateway call fails or reports an unsuccessful result
pub async fn contact_info(
    client: &GatewayClient,
    account_id: &str,
    target_id: &str,
) -> Result<ContactInfo> {
    if let Some(wecom_id) = target_id.strip_suffix(WECOM_SUFFIX) {
        return Ok(ContactInfo {
            name: format!("企微_{wecom_id}"),
            avatar_url: String::new(),
        });
    }

    let body = json!({
        "Wxid": account_id,
        "ChatRoom": "",
        "Towxids": target_id,
    });

    let response = client.call(Operation::GetContactDetail, &body).await?;

    if !response
        .get("Success")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        let message = response
            .get("Message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(Error::Gateway(format!(
            "contact lookup for {target_id} failed: {message}"
        )));
    }

    let contact = response
        .get("Data")
        .and_then(|d| d.get("ContactList"))
        .and_then(|l| l.get(0))
        .ok_or_else(|| Error::Payload(format!("contact lookup for {target_id}: empty list")))?;

    let name = wrapped_str(contact, "Remark")
        .or_else(|| wrapped_str(contact, "NickName"))
        .map_or_else(|| format!("微信_{target_id}"), ToString::to_string);

    let avatar_url = contact
        .get("BigHeadImgUrl")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| contact.get("SmallHeadImgUrl").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    Ok(ContactInfo { name, avatar_url })
}

/// Read a `{ "string": "..." }` wrapped field, treating empty as absent
fn wrapped_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.get("string"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
