//! Upstream gateway REST client
//!
//! All outbound calls to the WeChat gateway go through [`GatewayClient::call`]:
//! one named operation, one JSON body, a fixed per-call timeout. Failures are
//! surfaced to the caller and never retried here.

pub mod contacts;
pub mod tenpay;

use std::time::Duration;

use serde_json::Value;

use crate::{Error, Result};

pub use contacts::ContactInfo;

/// Per-call timeout for gateway requests
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Named operations on the upstream gateway REST surface
///
/// The operation set is closed: every path the bridge may hit is enumerated
/// here, and [`Operation::from_name`] fails fast on anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Contact detail lookup
    GetContactDetail,
    /// Group member roster fetch
    GetGroupMemberDetail,
    /// Direct CDN image download (fast path)
    CdnDownloadImage,
    /// Segmented image chunk fetch
    DownloadImage,
    /// Segmented file chunk fetch
    DownloadFile,
    /// Red-packet auto claim
    ClaimRedPacket,
    /// Plain text send
    SendText,
}

impl Operation {
    /// Every known operation, in declaration order
    pub const ALL: [Self; 7] = [
        Self::GetContactDetail,
        Self::GetGroupMemberDetail,
        Self::CdnDownloadImage,
        Self::DownloadImage,
        Self::DownloadFile,
        Self::ClaimRedPacket,
        Self::SendText,
    ];

    /// REST path for this operation
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::GetContactDetail => "/Friend/GetContractDetail",
            Self::GetGroupMemberDetail => "/Group/GetChatRoomMemberDetail",
            Self::CdnDownloadImage => "/Tools/CdnDownloadImage",
            Self::DownloadImage => "/Tools/DownloadImg",
            Self::DownloadFile => "/Tools/DownloadFile",
            Self::ClaimRedPacket => "/Tools/AutoHongBao",
            Self::SendText => "/Msg/SendTxt",
        }
    }

    /// Stable name of this operation
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetContactDetail => "get_contact_detail",
            Self::GetGroupMemberDetail => "get_group_member_detail",
            Self::CdnDownloadImage => "cdn_download_image",
            Self::DownloadImage => "download_image",
            Self::DownloadFile => "download_file",
            Self::ClaimRedPacket => "claim_red_packet",
            Self::SendText => "send_text",
        }
    }

    /// Resolve an operation from its stable name
    ///
    /// # Errors
    ///
    /// Returns error listing every valid name when `name` is unknown
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|op| op.name()).collect();
                Error::Config(format!(
                    "unknown gateway operation '{name}', valid operations: {valid:?}"
                ))
            })
    }
}

/// Upstream gateway REST client
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: String,
    client: reqwest::Client,
}

impl GatewayClient {
    /// Create a client against the given gateway base URL
    ///
    /// # Errors
    ///
    /// Returns error if the underlying HTTP client cannot be built
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| Error::Gateway(format!("client build failed: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Call a named gateway operation with a JSON body
    ///
    /// # Errors
    ///
    /// Returns error on timeout, connection failure, non-success status, or
    /// an unparseable response body
    pub async fn call(&self, op: Operation, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, op.path());

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Gateway(format!("{} request failed: {e}", op.name())))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Gateway(format!(
                "{} returned {status}: {text}",
                op.name()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Gateway(format!("{} response parse failed: {e}", op.name())))
    }
}
