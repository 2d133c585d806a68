//! Chunked media retrieval
//!
//! Fetches image and file attachments that are not inlined in the webhook
//! payload. Images first try a direct CDN download; everything falls back to
//! a segmented range-request protocol that reassembles fixed-size chunks.
//! A single length-discovery probe can recover the true attachment size when
//! the first chunk request comes back without data; any later malformed
//! chunk fails the fetch permanently.

use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use crate::classify::markup::{node_text, tree_get, tree_text};
use crate::gateway::{GatewayClient, Operation};
use crate::{Error, Result};

/// Fixed segment size (256 * 256 bytes)
pub const CHUNK_SIZE: u64 = 65536;

/// Kind of attachment to retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    File,
}

impl MediaKind {
    /// Payload element holding this kind's metadata
    const fn payload_key(self) -> &'static str {
        match self {
            Self::Image => "img",
            Self::File => "appmsg",
        }
    }

    /// Fallback file extension when the payload declares no title
    const fn extension(self) -> &'static str {
        match self {
            Self::Image => "png",
            Self::File => "",
        }
    }

    const fn download_op(self) -> Operation {
        match self {
            Self::Image => Operation::DownloadImage,
            Self::File => Operation::DownloadFile,
        }
    }
}

/// Where the fetched bytes ended up
#[derive(Debug)]
pub enum MediaOutput {
    /// In-memory buffer (no save directory configured)
    Bytes(Vec<u8>),
    /// Written to (or already present at) this path
    Saved(PathBuf),
}

/// Result of one attachment fetch
#[derive(Debug)]
pub struct FetchedMedia {
    pub output: MediaOutput,
    pub filename: String,
}

/// Transient state of one segmented download
#[derive(Debug)]
struct DownloadSession {
    total_len: u64,
    offset: u64,
    chunk_index: u64,
    buffer: Vec<u8>,
    probe_attempted: bool,
}

/// Attachment retriever over the gateway's download operations
#[derive(Debug)]
pub struct MediaRetriever {
    gateway: Arc<GatewayClient>,
    account_id: String,
    image_dir: Option<PathBuf>,
    file_dir: Option<PathBuf>,
}

impl MediaRetriever {
    #[must_use]
    pub fn new(
        gateway: Arc<GatewayClient>,
        account_id: String,
        image_dir: Option<PathBuf>,
        file_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            account_id,
            image_dir,
            file_dir,
        }
    }

    /// Fetch one attachment referenced by a classified message
    ///
    /// Two concurrent fetches of the same attachment run independently; the
    /// only cross-request reuse is the by-filename cache on disk.
    ///
    /// # Errors
    ///
    /// Returns error when the payload lacks the required metadata or the
    /// download fails permanently
    pub async fn fetch(
        &self,
        kind: MediaKind,
        message_id: i64,
        from_id: &str,
        payload: &Value,
    ) -> Result<FetchedMedia> {
        let info = tree_get(payload, &["msg", kind.payload_key()]).ok_or_else(|| {
            Error::Payload(format!("payload missing msg.{}", kind.payload_key()))
        })?;

        let filename = resolve_filename(info, kind.extension());
        let save_dir = match kind {
            MediaKind::Image => self.image_dir.as_deref(),
            MediaKind::File => self.file_dir.as_deref(),
        };

        // cache-by-name: an existing file of the resolved name wins outright
        if let Some(dir) = save_dir {
            let path = dir.join(&filename);
            if path.exists() {
                tracing::debug!(path = %path.display(), "attachment already on disk");
                return Ok(FetchedMedia {
                    output: MediaOutput::Saved(path),
                    filename,
                });
            }
        }

        let mut buffer = Vec::new();

        let cdn_done = if kind == MediaKind::Image {
            match self.try_cdn(info).await {
                Ok(Some(bytes)) => {
                    buffer = bytes;
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    // the CDN path is an optimization, never a hard dependency
                    tracing::debug!(message_id, error = %e, "CDN fast path failed, using segmented download");
                    false
                }
            }
        } else {
            false
        };

        if !cdn_done {
            buffer = self.segmented_download(kind, message_id, from_id, info).await?;
        }

        if let Some(dir) = save_dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(&filename);
            std::fs::write(&path, &buffer)?;
            tracing::info!(path = %path.display(), bytes = buffer.len(), "attachment saved");
            return Ok(FetchedMedia {
                output: MediaOutput::Saved(path),
                filename,
            });
        }

        Ok(FetchedMedia {
            output: MediaOutput::Bytes(buffer),
            filename,
        })
    }

    /// CDN fast path: one call carrying the content key and the best URL
    ///
    /// Returns `Ok(None)` when the payload lacks the key or any CDN URL.
    async fn try_cdn(&self, info: &Value) -> Result<Option<Vec<u8>>> {
        let Some(aes_key) = tree_text(info, &["aeskey"]).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        // prefer full-size, then medium, then thumbnail
        let cdn_url = ["cdnbigimgurl", "cdnmidimgurl", "cdnthumburl"]
            .into_iter()
            .find_map(|key| tree_text(info, &[key]).filter(|s| !s.is_empty()));
        let Some(cdn_url) = cdn_url else {
            return Ok(None);
        };

        let body = json!({
            "FileAesKey": aes_key,
            "FileNo": cdn_url,
            "Wxid": self.account_id,
        });

        let response = self.gateway.call(Operation::CdnDownloadImage, &body).await?;

        let image = response
            .get("Data")
            .and_then(|d| d.get("Image"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Payload("CDN response missing Data.Image".into()))?;

        let bytes = BASE64
            .decode(strip_data_uri(image))
            .map_err(|e| Error::Payload(format!("CDN image decode failed: {e}")))?;

        Ok(Some(bytes))
    }

    /// Segmented range-request download with one-shot length discovery
    async fn segmented_download(
        &self,
        kind: MediaKind,
        message_id: i64,
        from_id: &str,
        info: &Value,
    ) -> Result<Vec<u8>> {
        let declared_len = declared_length(kind, info)?;

        let mut session = DownloadSession {
            total_len: declared_len,
            offset: 0,
            chunk_index: 0,
            buffer: Vec::new(),
            probe_attempted: false,
        };

        loop {
            let want = CHUNK_SIZE.min(session.total_len.saturating_sub(session.offset));
            let total_chunks = chunk_count(session.total_len);

            tracing::debug!(
                chunk = session.chunk_index + 1,
                of = total_chunks,
                offset = session.offset,
                len = want,
                "requesting segment"
            );

            let body = self.chunk_body(
                kind,
                message_id,
                from_id,
                info,
                Some(session.total_len),
                session.offset,
                want,
            )?;
            let response = self.gateway.call(kind.download_op(), &body).await?;

            match chunk_buffer(&response) {
                Some(encoded) => {
                    let bytes = BASE64
                        .decode(strip_data_uri(encoded))
                        .map_err(|e| Error::Download(format!("segment decode failed: {e}")))?;
                    session.buffer.extend_from_slice(&bytes);
                    session.chunk_index += 1;
                    session.offset += want;
                    if session.offset >= session.total_len {
                        break;
                    }
                }
                None if session.chunk_index == 0 && !session.probe_attempted => {
                    // one probe with the declared length omitted may reveal
                    // the true size; adopt it and restart from offset zero
                    session.probe_attempted = true;
                    let total = self.probe_length(kind, message_id, from_id, info).await?;
                    tracing::warn!(message_id, total, "adopted probed attachment length");
                    session.total_len = total;
                    session.offset = 0;
                }
                None if session.chunk_index == 0 => {
                    return Err(Error::Download(
                        "first segment returned no data after length probe".into(),
                    ));
                }
                None => {
                    return Err(Error::Download(format!(
                        "segment {} response missing Data.data.buffer",
                        session.chunk_index + 1
                    )));
                }
            }
        }

        if (session.buffer.len() as u64) < session.total_len {
            return Err(Error::Download(format!(
                "reassembled {} bytes, expected {}",
                session.buffer.len(),
                session.total_len
            )));
        }

        Ok(session.buffer)
    }

    /// One-shot length discovery request (declared length omitted)
    async fn probe_length(
        &self,
        kind: MediaKind,
        message_id: i64,
        from_id: &str,
        info: &Value,
    ) -> Result<u64> {
        let body = self.chunk_body(kind, message_id, from_id, info, None, 0, CHUNK_SIZE)?;
        let response = self.gateway.call(kind.download_op(), &body).await?;

        response
            .get("Data")
            .and_then(|d| d.get("totalLen"))
            .and_then(Value::as_u64)
            .filter(|t| *t > 0)
            .ok_or_else(|| Error::Download("length probe reported no total length".into()))
    }

    /// Request body for one segment
    #[allow(clippy::too_many_arguments)]
    fn chunk_body(
        &self,
        kind: MediaKind,
        message_id: i64,
        from_id: &str,
        info: &Value,
        declared_len: Option<u64>,
        offset: u64,
        len: u64,
    ) -> Result<Value> {
        let section = json!({ "DataLen": len, "StartPos": offset });

        let mut body = match kind {
            MediaKind::Image => json!({
                "CompressType": 0,
                "MsgId": message_id,
                "Section": section,
                "Wxid": self.account_id,
                "ToWxid": from_id,
            }),
            MediaKind::File => {
                let app_id = tree_text(info, &["appid"]).unwrap_or_default();
                let attach_id = tree_text(info, &["appattach", "attachid"]).ok_or_else(|| {
                    Error::Payload("file payload missing appattach.attachid".into())
                })?;
                json!({
                    "AppID": app_id,
                    "AttachId": attach_id,
                    "Section": section,
                    "UserName": "",
                    "Wxid": self.account_id,
                })
            }
        };

        if let (Some(total), Some(map)) = (declared_len, body.as_object_mut()) {
            map.insert("DataLen".to_string(), json!(total));
        }

        Ok(body)
    }
}

/// Number of segments needed for a payload of `total_len` bytes
#[must_use]
pub const fn chunk_count(total_len: u64) -> u64 {
    total_len.div_ceil(CHUNK_SIZE)
}

/// Declared payload length: `length` on images, `appattach.totallen` on files
fn declared_length(kind: MediaKind, info: &Value) -> Result<u64> {
    let raw = match kind {
        MediaKind::Image => tree_text(info, &["length"]),
        MediaKind::File => tree_text(info, &["appattach", "totallen"]),
    };

    let raw = raw.ok_or_else(|| Error::Payload("payload missing declared length".into()))?;
    raw.parse()
        .map_err(|_| Error::Payload(format!("declared length not numeric: {raw}")))
}

/// Resolve the target file name
///
/// The payload's declared title wins; otherwise the content checksum, or a
/// second-resolution timestamp when even that is absent.
fn resolve_filename(info: &Value, extension: &str) -> String {
    if let Some(title) = tree_get(info, &["title"]).and_then(node_text) {
        if !title.is_empty() {
            return title.to_string();
        }
    }

    let base = tree_text(info, &["md5"])
        .filter(|s| !s.is_empty())
        .map_or_else(
            || chrono::Local::now().format("%Y%m%d%H%M%S").to_string(),
            ToString::to_string,
        );

    if extension.is_empty() {
        base
    } else {
        format!("{base}.{extension}")
    }
}

/// Strip a `data:...;base64,` style prefix if present
fn strip_data_uri(encoded: &str) -> &str {
    encoded
        .split_once(',')
        .map_or(encoded, |(_, payload)| payload)
}

/// Read the base64 segment buffer out of a chunk response
fn chunk_buffer(response: &Value) -> Option<&str> {
    response
        .get("Data")
        .and_then(|d| d.get("data"))
        .and_then(|d| d.get("buffer"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::markup::markup_to_tree;

    // -- segment arithmetic ---------------------------------------------------

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(0), 0);
        assert_eq!(chunk_count(1), 1);
        assert_eq!(chunk_count(65536), 1);
        assert_eq!(chunk_count(65537), 2);
        assert_eq!(chunk_count(700_000), 11);
    }

    #[test]
    fn last_chunk_length() {
        let total: u64 = 700_000;
        let last_offset = CHUNK_SIZE * (chunk_count(total) - 1);
        assert_eq!(total - last_offset, 44640);
    }

    // -- helpers --------------------------------------------------------------

    #[test]
    fn strips_data_uri_prefix() {
        assert_eq!(strip_data_uri("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_uri("QUJD"), "QUJD");
    }

    #[test]
    fn filename_prefers_title() {
        let tree = markup_to_tree(
            "<msg><appmsg><title>report.pdf</title><appattach><totallen>5</totallen></appattach></appmsg></msg>",
        )
        .unwrap();
        let info = tree_get(&tree, &["msg", "appmsg"]).unwrap();
        assert_eq!(resolve_filename(info, ""), "report.pdf");
    }

    #[test]
    fn filename_falls_back_to_checksum() {
        let tree = markup_to_tree(r#"<msg><img md5="abc123" length="7"/></msg>"#).unwrap();
        let info = tree_get(&tree, &["msg", "img"]).unwrap();
        assert_eq!(resolve_filename(info, "png"), "abc123.png");
    }

    #[test]
    fn filename_without_checksum_uses_timestamp() {
        let tree = markup_to_tree(r#"<msg><img length="7"/></msg>"#).unwrap();
        let info = tree_get(&tree, &["msg", "img"]).unwrap();
        let name = resolve_filename(info, "png");
        assert!(name.ends_with(".png"));
        // 14-digit second-resolution stamp
        assert_eq!(name.len(), 14 + 4);
    }

    #[test]
    fn declared_length_parses_per_kind() {
        let img = markup_to_tree(r#"<msg><img length="700000"/></msg>"#).unwrap();
        let info = tree_get(&img, &["msg", "img"]).unwrap();
        assert_eq!(declared_length(MediaKind::Image, info).unwrap(), 700_000);

        let file = markup_to_tree(
            "<msg><appmsg><appattach><totallen>42</totallen></appattach></appmsg></msg>",
        )
        .unwrap();
        let info = tree_get(&file, &["msg", "appmsg"]).unwrap();
        assert_eq!(declared_length(MediaKind::File, info).unwrap(), 42);
    }

    #[test]
    fn missing_length_is_payload_error() {
        let img = markup_to_tree(r#"<msg><img md5="x"/></msg>"#).unwrap();
        let info = tree_get(&img, &["msg", "img"]).unwrap();
        assert!(declared_length(MediaKind::Image, info).is_err());
    }
}
