//! The processing pipeline behind the hand-off queue
//!
//! One entry at a time: classify, resolve display identity, run the
//! special-cased side effects (red-packet claim, idiom side task), check
//! delivery eligibility, and retrieve referenced media. Failures are logged
//! and never crash the loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

use crate::classify::{self, identity, CanonicalMessage, MessageBody, Outcome, RawMessageEntry};
use crate::gateway::{tenpay, GatewayClient};
use crate::media::{MediaKind, MediaOutput, MediaRetriever};
use crate::notify::Notifier;
use crate::store::{ContactStore, GroupDirectory};

/// Suffix of group conversation ids
const GROUP_SUFFIX: &str = "@chatroom";

/// Idiom-learning side task seam
///
/// The learner itself lives outside this crate; the default implementation
/// drops everything.
#[async_trait]
pub trait IdiomLearner: Send + Sync {
    async fn on_text(&self, content: &str);
    async fn on_image(&self, message_id: i64, from_id: &str, payload: &Value);
}

/// Learner that ignores all events
#[derive(Debug, Default)]
pub struct NoopIdiomLearner;

#[async_trait]
impl IdiomLearner for NoopIdiomLearner {
    async fn on_text(&self, _content: &str) {}
    async fn on_image(&self, _message_id: i64, _from_id: &str, _payload: &Value) {}
}

/// Serial message processor
pub struct Processor {
    account_id: String,
    gateway: Arc<GatewayClient>,
    contacts: Arc<ContactStore>,
    groups: Arc<GroupDirectory>,
    media: MediaRetriever,
    notifier: Notifier,
    idiom: Arc<dyn IdiomLearner>,
    idiom_senders: HashSet<String>,
}

impl Processor {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        account_id: String,
        gateway: Arc<GatewayClient>,
        contacts: Arc<ContactStore>,
        groups: Arc<GroupDirectory>,
        media: MediaRetriever,
        notifier: Notifier,
        idiom: Arc<dyn IdiomLearner>,
        idiom_senders: HashSet<String>,
    ) -> Self {
        Self {
            account_id,
            gateway,
            contacts,
            groups,
            media,
            notifier,
            idiom,
            idiom_senders,
        }
    }

    /// Process one dequeued entry end to end
    ///
    /// Never returns an error; every failure is logged so the loop survives
    /// malformed payloads and gateway outages.
    pub async fn handle(&self, entry: RawMessageEntry) {
        let mut msg = match classify::classify(&entry, &self.account_id) {
            Ok(Outcome::Message(msg)) => *msg,
            Ok(Outcome::Dropped(reason)) => {
                tracing::debug!(message_id = ?entry.msg_id, reason, "message dropped");
                return;
            }
            Err(e) => {
                tracing::warn!(message_id = ?entry.msg_id, error = %e, "classification failed");
                return;
            }
        };

        identity::resolve_names(
            &mut msg,
            &self.account_id,
            &self.gateway,
            &self.contacts,
            &self.groups,
        )
        .await;

        tracing::info!(
            kind = %msg.kind,
            from = %msg.from_id,
            contact = %msg.contact_name,
            sender = %msg.sender_name,
            "message classified"
        );

        if msg.kind.is_red_packet() && msg.from_id.ends_with(GROUP_SUFFIX) {
            self.claim_red_packet(&msg, entry.content.as_str()).await;
        }

        self.run_idiom_task(&msg).await;

        // delivery eligibility: a saved contact can opt out of forwarding
        if let Some(saved) = self.contacts.get(&msg.from_id) {
            if !saved.receive {
                tracing::debug!(from = %msg.from_id, "contact opted out, skipping delivery");
                return;
            }
        }

        self.retrieve_media(&msg).await;
    }

    /// Notify and auto-claim a group red packet
    ///
    /// The claim is delayed by a randomized 3-5s so the account is not the
    /// first claimant every time.
    async fn claim_red_packet(&self, msg: &CanonicalMessage, raw_xml: &str) {
        self.notifier
            .send(&format!(
                "red packet in [{}] from [{}]",
                msg.contact_name, msg.sender_name
            ))
            .await;

        let delay = {
            let mut rng = rand::thread_rng();
            Duration::from_secs(rng.gen_range(3..=5))
        };
        tokio::time::sleep(delay).await;

        if let Err(e) =
            tenpay::claim_red_packet(&self.gateway, &self.account_id, &msg.from_id, raw_xml).await
        {
            tracing::warn!(from = %msg.from_id, error = %e, "red packet claim failed");
        }
    }

    /// Feed watched senders' text and image messages to the idiom learner
    async fn run_idiom_task(&self, msg: &CanonicalMessage) {
        if !self.idiom_senders.contains(&msg.sender_id) {
            return;
        }

        if msg.kind.is_text() {
            if let Some(text) = msg.body.as_text() {
                self.idiom.on_text(text).await;
            }
        } else if msg.kind.is_image() {
            if let Some(tree) = msg.body.as_tree() {
                self.idiom.on_image(msg.message_id, &msg.from_id, tree).await;
            }
        }
    }

    /// Retrieve the attachment referenced by an image or file message
    async fn retrieve_media(&self, msg: &CanonicalMessage) {
        let kind = if msg.kind.is_image() {
            MediaKind::Image
        } else if msg.kind.is_file() {
            MediaKind::File
        } else {
            return;
        };

        let MessageBody::Tree(payload) = &msg.body else {
            return;
        };

        match self
            .media
            .fetch(kind, msg.message_id, &msg.from_id, payload)
            .await
        {
            Ok(fetched) => match fetched.output {
                MediaOutput::Saved(path) => {
                    tracing::info!(name = %fetched.filename, path = %path.display(), "attachment retrieved");
                }
                MediaOutput::Bytes(bytes) => {
                    tracing::info!(name = %fetched.filename, bytes = bytes.len(), "attachment retrieved");
                }
            },
            Err(e) => {
                tracing::error!(
                    message_id = msg.message_id,
                    kind = %msg.kind,
                    error = %e,
                    "attachment retrieval failed"
                );
            }
        }
    }
}
