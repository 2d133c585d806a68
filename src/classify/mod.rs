//! Message classification and normalization
//!
//! Turns a raw wire entry into a [`CanonicalMessage`]: envelope extraction,
//! sender/conversation identity rules, taxonomy resolution (including nested
//! application/call/system sub-types), and the early drop list.

pub mod identity;
pub mod markup;
pub mod types;

pub use types::{CanonicalMessage, MessageBody, MessageKind, RawBatch, RawMessageEntry};

use markup::{markup_to_tree, node_text, tree_get};

use crate::{Error, Result};

/// Identity of the platform's own broadcast account
const SYSTEM_BROADCASTER: &str = "weixin";

/// Fixed system-notification channel id
const NOTIFICATION_CHANNEL: &str = "notification_messages";

/// Suffix of application service accounts
const APP_SUFFIX: &str = "@app";

/// Synthetic identity substituted for application service accounts
const SERVICE_NOTIFICATION_ID: &str = "service_notification";

/// Suffix of group conversation ids
const GROUP_SUFFIX: &str = "@chatroom";

/// Suffix of folded-group placeholder conversations
const FOLD_GROUP_SUFFIX: &str = "@placeholder_foldgroup";

/// Outcome of classifying one raw entry
#[derive(Debug)]
pub enum Outcome {
    /// Normalized message, display names not yet resolved
    Message(Box<CanonicalMessage>),
    /// Intentionally ignored; the reason is for debug logging only
    Dropped(&'static str),
}

/// Classify a raw wire entry
///
/// Display identity (steps handled by [`identity`]) is resolved afterwards by
/// the processing loop; the record returned here carries empty names.
///
/// # Errors
///
/// Returns error when a structured payload body cannot be parsed; the caller
/// drops the message and keeps the loop alive
pub fn classify(entry: &RawMessageEntry, account_id: &str) -> Result<Outcome> {
    let Some(message_id) = entry.msg_id else {
        return Ok(Outcome::Dropped("missing message id"));
    };

    let mut from_id = entry.from.as_str().to_string();
    let to_id = entry.to.as_str().to_string();
    let mut content = entry.content.as_str().to_string();

    if from_id == SYSTEM_BROADCASTER {
        return Ok(Outcome::Dropped("system broadcaster"));
    }

    if from_id.ends_with(APP_SUFFIX) {
        from_id = SERVICE_NOTIFICATION_ID.to_string();
    }

    // group messages prefix the body with the author id
    let sender_id = if from_id.ends_with(GROUP_SUFFIX) {
        if content.contains(":\n") {
            let (sender, body) = match content.split_once('\n') {
                Some((sender_part, body_part)) => (
                    sender_part.trim_end_matches(':').to_string(),
                    body_part.to_string(),
                ),
                None => (String::new(), content.clone()),
            };
            content = body;
            sender
        } else if entry.from.as_str() == account_id {
            account_id.to_string()
        } else {
            String::new()
        }
    } else {
        from_id.clone()
    };

    let mut kind = if entry.msg_type == 51 {
        MessageKind::open_chat()
    } else {
        MessageKind::Code(entry.msg_type)
    };

    // non-text, non-system-prompt payloads carry an embedded markup document;
    // application, call, and system messages name their real type inside it
    let body = if kind.is_text() || kind.is_system_prompt() {
        MessageBody::Text(content)
    } else {
        let tree = markup_to_tree(&content)?;
        kind = refine_kind(kind, &tree)?;
        MessageBody::Tree(tree)
    };

    if from_id.ends_with(FOLD_GROUP_SUFFIX) {
        return Ok(Outcome::Dropped("folded group placeholder"));
    }
    if from_id == NOTIFICATION_CHANNEL {
        return Ok(Outcome::Dropped("system notification channel"));
    }
    if kind.is_ignored() {
        return Ok(Outcome::Dropped("ignored message category"));
    }
    if sender_id == account_id && kind.is_revoke() {
        return Ok(Outcome::Dropped("own revoked message"));
    }

    Ok(Outcome::Message(Box::new(CanonicalMessage {
        message_id,
        secondary_id: entry.new_msg_id.unwrap_or_default(),
        from_id,
        to_id,
        sender_id,
        kind,
        body,
        push_preview: entry.push_content.clone(),
        created_at: entry.create_time,
        contact_name: String::new(),
        sender_name: String::new(),
        avatar_url: String::new(),
    })))
}

/// Descend into a parsed payload to read the inner type code
///
/// Application messages (49) carry a numeric sub-type, call messages (50) and
/// system messages (10002) a symbolic one. Everything else keeps its coarse
/// code.
fn refine_kind(kind: MessageKind, tree: &serde_json::Value) -> Result<MessageKind> {
    let MessageKind::Code(code) = kind else {
        return Ok(kind);
    };

    match code {
        49 => {
            let inner = tree_get(tree, &["msg", "appmsg", "type"])
                .and_then(node_text)
                .ok_or_else(|| Error::Payload("application payload missing type".into()))?;
            let inner: i64 = inner
                .parse()
                .map_err(|_| Error::Payload(format!("application type not numeric: {inner}")))?;
            Ok(MessageKind::Code(inner))
        }
        50 => tree_get(tree, &["voipmsg", "type"])
            .and_then(node_text)
            .map(|t| MessageKind::Label(t.to_string()))
            .ok_or_else(|| Error::Payload("call payload missing type".into())),
        10002 => tree_get(tree, &["sysmsg", "type"])
            .and_then(node_text)
            .map(|t| MessageKind::Label(t.to_string()))
            .ok_or_else(|| Error::Payload("system payload missing type".into())),
        _ => Ok(MessageKind::Code(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(msg_type: i64, from: &str, content: &str) -> RawMessageEntry {
        RawMessageEntry {
            msg_id: Some(1001),
            new_msg_id: Some(900_001),
            from: types::WrappedString { string: from.to_string() },
            to: types::WrappedString { string: "wxid_local".to_string() },
            msg_type,
            content: types::WrappedString { string: content.to_string() },
            push_content: String::new(),
            create_time: 1_700_000_000,
        }
    }

    fn expect_message(outcome: Outcome) -> CanonicalMessage {
        match outcome {
            Outcome::Message(m) => *m,
            Outcome::Dropped(reason) => panic!("unexpected drop: {reason}"),
        }
    }

    // -- envelope and sender resolution ---------------------------------------

    #[test]
    fn plain_text_private_message() {
        let outcome = classify(&entry(1, "wxid_peer", "hi"), "wxid_local").unwrap();
        let msg = expect_message(outcome);
        assert_eq!(msg.message_id, 1001);
        assert_eq!(msg.sender_id, "wxid_peer");
        assert!(msg.kind.is_text());
        assert_eq!(msg.body.as_text(), Some("hi"));
    }

    #[test]
    fn group_sender_is_split_from_content() {
        let outcome = classify(
            &entry(1, "123@chatroom", "wxid_abc:\nhello"),
            "wxid_local",
        )
        .unwrap();
        let msg = expect_message(outcome);
        assert_eq!(msg.sender_id, "wxid_abc");
        assert_eq!(msg.body.as_text(), Some("hello"));
    }

    #[test]
    fn undelimited_group_content_from_unknown_sender() {
        let outcome = classify(&entry(1, "123@chatroom", "hello"), "wxid_local").unwrap();
        let msg = expect_message(outcome);
        assert_eq!(msg.sender_id, "");
        assert_eq!(msg.body.as_text(), Some("hello"));
    }

    #[test]
    fn app_account_becomes_service_notification() {
        let outcome = classify(&entry(1, "news@app", "update"), "wxid_local").unwrap();
        let msg = expect_message(outcome);
        assert_eq!(msg.from_id, "service_notification");
    }

    // -- taxonomy -------------------------------------------------------------

    #[test]
    fn application_subtype_is_read_from_payload() {
        let content = "<msg><appmsg><type>6</type><title>report.pdf</title></appmsg></msg>";
        let outcome = classify(&entry(49, "wxid_peer", content), "wxid_local").unwrap();
        let msg = expect_message(outcome);
        assert!(msg.kind.is_file());
        assert!(msg.body.as_tree().is_some());
    }

    #[test]
    fn call_subtype_is_symbolic() {
        let content = r#"<voipmsg type="VoIPBubbleMsg"><text>missed</text></voipmsg>"#;
        let outcome = classify(&entry(50, "wxid_peer", content), "wxid_local").unwrap();
        let msg = expect_message(outcome);
        assert_eq!(msg.kind, MessageKind::Label("VoIPBubbleMsg".to_string()));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(classify(&entry(49, "wxid_peer", "<msg><appmsg>"), "wxid_local").is_err());
    }

    // -- drop rules -----------------------------------------------------------

    #[test]
    fn missing_message_id_is_dropped() {
        let mut e = entry(1, "wxid_peer", "hi");
        e.msg_id = None;
        assert!(matches!(
            classify(&e, "wxid_local").unwrap(),
            Outcome::Dropped(_)
        ));
    }

    #[test]
    fn system_broadcaster_is_dropped() {
        assert!(matches!(
            classify(&entry(1, "weixin", "notice"), "wxid_local").unwrap(),
            Outcome::Dropped(_)
        ));
    }

    #[test]
    fn folded_group_placeholder_is_dropped() {
        assert!(matches!(
            classify(&entry(1, "42@placeholder_foldgroup", "x"), "wxid_local").unwrap(),
            Outcome::Dropped(_)
        ));
    }

    #[test]
    fn notification_channel_is_dropped() {
        assert!(matches!(
            classify(&entry(1, "notification_messages", "x"), "wxid_local").unwrap(),
            Outcome::Dropped(_)
        ));
    }

    #[test]
    fn open_chat_activation_is_dropped() {
        let content = "<msg><appinfo><appname>finder</appname></appinfo></msg>";
        assert!(matches!(
            classify(&entry(51, "wxid_peer", content), "wxid_local").unwrap(),
            Outcome::Dropped(_)
        ));
    }

    #[test]
    fn legacy_type_74_is_dropped() {
        let content = "<msg><dummy/></msg>";
        assert!(matches!(
            classify(&entry(74, "wxid_peer", content), "wxid_local").unwrap(),
            Outcome::Dropped(_)
        ));
    }

    #[test]
    fn own_revoke_is_dropped() {
        let content = r#"<sysmsg type="revokemsg"><revokemsg/></sysmsg>"#;
        assert!(matches!(
            classify(&entry(10002, "wxid_local", content), "wxid_local").unwrap(),
            Outcome::Dropped(_)
        ));
    }

    #[test]
    fn peer_revoke_is_kept() {
        let content = r#"<sysmsg type="revokemsg"><revokemsg/></sysmsg>"#;
        let outcome = classify(&entry(10002, "wxid_peer", content), "wxid_local").unwrap();
        let msg = expect_message(outcome);
        assert!(msg.kind.is_revoke());
    }

    #[test]
    fn red_packet_subtype_is_recognized() {
        let content = "<msg><appmsg><type>2001</type></appmsg></msg>";
        let outcome = classify(
            &entry(49, "123@chatroom", &format!("wxid_abc:\n{content}")),
            "wxid_local",
        )
        .unwrap();
        let msg = expect_message(outcome);
        assert!(msg.kind.is_red_packet());
        assert_eq!(msg.sender_id, "wxid_abc");
    }
}
