//! Red-packet claim call

use serde_json::json;

use super::{GatewayClient, Operation};
use crate::Result;

/// Claim a red packet using the raw event markup
///
/// The gateway expects the untouched XML from the triggering message.
///
/// # Errors
///
/// Returns error if the gateway call fails
pub async fn claim_red_packet(
    client: &GatewayClient,
    account_id: &str,
    sender_id: &str,
    raw_xml: &str,
) -> Result<()> {
    let body = json!({
        "Wxid": account_id,
        "Xml": raw_xml,
        "SendUserName": sender_id,
    });

    let response = client.call(Operation::ClaimRedPacket, &body).await?;
    tracing::debug!(sender = sender_id, ?response, "red packet claim result");
    Ok(())
}
