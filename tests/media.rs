//! Chunked media retrieval integration tests
//!
//! Drives the retriever against a mock gateway: CDN fast path, fallback to
//! segmented download, the one-shot length-discovery probe, and the
//! by-filename cache.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mockito::Matcher;
use serde_json::json;

use wx_bridge::classify::markup::markup_to_tree;
use wx_bridge::gateway::GatewayClient;
use wx_bridge::media::{MediaKind, MediaOutput, MediaRetriever, CHUNK_SIZE};

const ACCOUNT: &str = "wxid_local";

fn retriever(server: &mockito::Server) -> MediaRetriever {
    let gateway = Arc::new(GatewayClient::new(&server.url()).unwrap());
    MediaRetriever::new(gateway, ACCOUNT.to_string(), None, None)
}

fn chunk_response(bytes: &[u8]) -> String {
    json!({ "Data": { "data": { "buffer": BASE64.encode(bytes) } } }).to_string()
}

fn image_payload(length: u64, with_cdn: bool) -> serde_json::Value {
    let cdn_attrs = if with_cdn {
        r#" aeskey="k0" cdnthumburl="cdn://thumb""#
    } else {
        ""
    };
    markup_to_tree(&format!(
        r#"<msg><img md5="abc123" length="{length}"{cdn_attrs}/></msg>"#
    ))
    .unwrap()
}

fn fetched_bytes(output: MediaOutput) -> Vec<u8> {
    match output {
        MediaOutput::Bytes(bytes) => bytes,
        MediaOutput::Saved(path) => panic!("unexpected save to {}", path.display()),
    }
}

#[tokio::test]
async fn cdn_fast_path_returns_decoded_image() {
    let mut server = mockito::Server::new_async().await;
    let image = vec![0xABu8; 4096];

    let cdn = server
        .mock("POST", "/Tools/CdnDownloadImage")
        .match_body(Matcher::PartialJson(json!({
            "FileAesKey": "k0",
            "FileNo": "cdn://thumb",
            "Wxid": ACCOUNT,
        })))
        .with_body(
            json!({ "Data": { "Image": format!("data:image/png;base64,{}", BASE64.encode(&image)) } })
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let payload = image_payload(4096, true);
    let fetched = retriever(&server)
        .fetch(MediaKind::Image, 7001, "wxid_peer", &payload)
        .await
        .unwrap();

    assert_eq!(fetched_bytes(fetched.output), image);
    assert_eq!(fetched.filename, "abc123.png");
    cdn.assert_async().await;
}

#[tokio::test]
async fn cdn_failure_falls_back_to_segmented_download() {
    let mut server = mockito::Server::new_async().await;
    let total: u64 = 100_000;
    let first: Vec<u8> = (0..CHUNK_SIZE).map(|i| (i % 251) as u8).collect();
    let second: Vec<u8> = (0..(total - CHUNK_SIZE)).map(|i| (i % 241) as u8).collect();

    // CDN responds with an unexpected shape; the retriever must swallow it
    let cdn = server
        .mock("POST", "/Tools/CdnDownloadImage")
        .with_body(json!({ "Data": {} }).to_string())
        .expect(1)
        .create_async()
        .await;

    let chunk0 = server
        .mock("POST", "/Tools/DownloadImg")
        .match_body(Matcher::PartialJson(json!({
            "DataLen": total,
            "Section": { "DataLen": CHUNK_SIZE, "StartPos": 0 },
        })))
        .with_body(chunk_response(&first))
        .expect(1)
        .create_async()
        .await;

    let chunk1 = server
        .mock("POST", "/Tools/DownloadImg")
        .match_body(Matcher::PartialJson(json!({
            "Section": { "DataLen": total - CHUNK_SIZE, "StartPos": CHUNK_SIZE },
        })))
        .with_body(chunk_response(&second))
        .expect(1)
        .create_async()
        .await;

    let payload = image_payload(total, true);
    let fetched = retriever(&server)
        .fetch(MediaKind::Image, 7002, "wxid_peer", &payload)
        .await
        .unwrap();

    let bytes = fetched_bytes(fetched.output);
    assert_eq!(bytes.len() as u64, total);
    assert_eq!(&bytes[..first.len()], &first[..]);
    assert_eq!(&bytes[first.len()..], &second[..]);

    cdn.assert_async().await;
    chunk0.assert_async().await;
    chunk1.assert_async().await;
}

#[tokio::test]
async fn length_probe_recovers_true_size() {
    let mut server = mockito::Server::new_async().await;
    let adopted: u64 = 131_072;
    let first = vec![0x11u8; CHUNK_SIZE as usize];
    let second = vec![0x22u8; CHUNK_SIZE as usize];

    // the probe omits the declared length entirely; with sorted JSON keys,
    // MsgId directly follows CompressType only in the probe body
    let probe = server
        .mock("POST", "/Tools/DownloadImg")
        .match_body(Matcher::Regex(r#""CompressType":0,"MsgId""#.to_string()))
        .with_body(json!({ "Data": { "totalLen": adopted } }).to_string())
        .expect(1)
        .create_async()
        .await;

    // first regular request carries the junk declared length and gets no data
    let failed_first = server
        .mock("POST", "/Tools/DownloadImg")
        .match_body(Matcher::PartialJson(json!({ "DataLen": 7 })))
        .with_body(json!({ "Data": {} }).to_string())
        .expect(1)
        .create_async()
        .await;

    let chunk0 = server
        .mock("POST", "/Tools/DownloadImg")
        .match_body(Matcher::PartialJson(json!({
            "DataLen": adopted,
            "Section": { "DataLen": CHUNK_SIZE, "StartPos": 0 },
        })))
        .with_body(chunk_response(&first))
        .expect(1)
        .create_async()
        .await;

    let chunk1 = server
        .mock("POST", "/Tools/DownloadImg")
        .match_body(Matcher::PartialJson(json!({
            "Section": { "StartPos": CHUNK_SIZE },
        })))
        .with_body(chunk_response(&second))
        .expect(1)
        .create_async()
        .await;

    // no aeskey: the CDN fast path is skipped outright
    let payload = image_payload(7, false);
    let fetched = retriever(&server)
        .fetch(MediaKind::Image, 7003, "wxid_peer", &payload)
        .await
        .unwrap();

    let bytes = fetched_bytes(fetched.output);
    assert_eq!(bytes.len() as u64, adopted);

    failed_first.assert_async().await;
    probe.assert_async().await;
    chunk0.assert_async().await;
    chunk1.assert_async().await;
}

#[tokio::test]
async fn failed_probe_is_permanent_failure() {
    let mut server = mockito::Server::new_async().await;

    // neither the first request nor the probe yields anything useful
    let any = server
        .mock("POST", "/Tools/DownloadImg")
        .with_body(json!({ "Data": {} }).to_string())
        .expect(2)
        .create_async()
        .await;

    let payload = image_payload(7, false);
    let err = retriever(&server)
        .fetch(MediaKind::Image, 7004, "wxid_peer", &payload)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("probe"));
    any.assert_async().await;
}

#[tokio::test]
async fn later_chunk_failure_is_permanent() {
    let mut server = mockito::Server::new_async().await;
    let total: u64 = 100_000;
    let first = vec![0x33u8; CHUNK_SIZE as usize];

    server
        .mock("POST", "/Tools/DownloadImg")
        .match_body(Matcher::PartialJson(json!({
            "Section": { "StartPos": 0 },
        })))
        .with_body(chunk_response(&first))
        .create_async()
        .await;

    let bad_second = server
        .mock("POST", "/Tools/DownloadImg")
        .match_body(Matcher::PartialJson(json!({
            "Section": { "StartPos": CHUNK_SIZE },
        })))
        .with_body(json!({ "Data": {} }).to_string())
        .expect(1)
        .create_async()
        .await;

    let payload = image_payload(total, false);
    let err = retriever(&server)
        .fetch(MediaKind::Image, 7005, "wxid_peer", &payload)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("segment 2"));
    bad_second.assert_async().await;
}

#[tokio::test]
async fn file_download_uses_attachment_identity() {
    let mut server = mockito::Server::new_async().await;
    let content = b"file payload bytes".to_vec();

    let chunk = server
        .mock("POST", "/Tools/DownloadFile")
        .match_body(Matcher::PartialJson(json!({
            "AppID": "app7",
            "AttachId": "attach9",
            "UserName": "",
            "Wxid": ACCOUNT,
            "DataLen": content.len() as u64,
        })))
        .with_body(chunk_response(&content))
        .expect(1)
        .create_async()
        .await;

    let payload = markup_to_tree(&format!(
        "<msg><appmsg><title>notes.txt</title><appid>app7</appid>\
         <appattach><attachid>attach9</attachid><totallen>{}</totallen></appattach>\
         </appmsg></msg>",
        content.len()
    ))
    .unwrap();

    let fetched = retriever(&server)
        .fetch(MediaKind::File, 7006, "wxid_peer", &payload)
        .await
        .unwrap();

    assert_eq!(fetched.filename, "notes.txt");
    assert_eq!(fetched_bytes(fetched.output), content);
    chunk.assert_async().await;
}

#[tokio::test]
async fn existing_file_short_circuits_fetch() {
    let server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("abc123.png"), b"cached bytes").unwrap();

    let gateway = Arc::new(GatewayClient::new(&server.url()).unwrap());
    let retriever = MediaRetriever::new(
        gateway,
        ACCOUNT.to_string(),
        Some(dir.path().to_path_buf()),
        None,
    );

    let payload = image_payload(999, true);

    // both calls succeed without the mock server holding any download mocks
    for _ in 0..2 {
        let fetched = retriever
            .fetch(MediaKind::Image, 7007, "wxid_peer", &payload)
            .await
            .unwrap();
        match fetched.output {
            MediaOutput::Saved(path) => {
                assert_eq!(std::fs::read(path).unwrap(), b"cached bytes");
            }
            MediaOutput::Bytes(_) => panic!("expected cache hit"),
        }
    }
}

#[tokio::test]
async fn segmented_result_is_written_to_save_dir() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let content = b"fresh image".to_vec();

    server
        .mock("POST", "/Tools/DownloadImg")
        .with_body(chunk_response(&content))
        .create_async()
        .await;

    let gateway = Arc::new(GatewayClient::new(&server.url()).unwrap());
    let retriever = MediaRetriever::new(
        gateway,
        ACCOUNT.to_string(),
        Some(dir.path().join("nested")),
        None,
    );

    let payload = image_payload(content.len() as u64, false);
    let fetched = retriever
        .fetch(MediaKind::Image, 7008, "wxid_peer", &payload)
        .await
        .unwrap();

    match fetched.output {
        MediaOutput::Saved(path) => {
            assert_eq!(std::fs::read(&path).unwrap(), content);
            assert!(path.ends_with("nested/abc123.png"));
        }
        MediaOutput::Bytes(_) => panic!("expected saved file"),
    }
}
