//! DriveRemoteStore against a mock Drive API

use bytes::Bytes;
use cloudmirror_core::domain::errors::{RemoteError, RemoteErrorKind};
use cloudmirror_core::domain::newtypes::RemoteId;
use cloudmirror_core::domain::node::NodeKind;
use cloudmirror_core::ports::remote_store::IRemoteStore;
use cloudmirror_gdrive::store::{DriveRemoteStore, FOLDER_MIME_TYPE};
use serde_json::json;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, header_regex, method, path, query_param,
    query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn id(s: &str) -> RemoteId {
    RemoteId::new(s).unwrap()
}

// ============================================================================
// Lookups
// ============================================================================

#[tokio::test]
async fn test_find_child_sends_escaped_query() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param(
            "q",
            r"name = 'John\'s notes' and 'root' in parents and trashed = false",
        ))
        .and(header("authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [common::folder_json("folder-1", "John's notes")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let node = store
        .find_child(&id("root"), "John's notes")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node.id, id("folder-1"));
    assert_eq!(node.kind, NodeKind::Folder);
}

#[tokio::test]
async fn test_find_child_none_when_no_match() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .mount(&server)
        .await;

    assert!(store.find_child(&id("root"), "a.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_child_requires_exact_name() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [common::file_json("file-1", "NOTES.txt", 3)]
        })))
        .mount(&server)
        .await;

    assert!(store
        .find_child(&id("root"), "notes.txt")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_list_children_follows_page_tokens() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("q", "'parent-1' in parents and trashed = false"))
        .and(query_param("pageSize", "100"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                common::folder_json("folder-1", "docs"),
                common::file_json("file-1", "a.txt", 1),
            ],
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [common::file_json("file-2", "b.txt", 22)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let children = store.list_children(&id("parent-1")).await.unwrap();
    let names: Vec<&str> = children.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["docs", "a.txt", "b.txt"]);
    assert!(children[0].is_folder());
    assert_eq!(children[2].size, Some(22));
}

#[tokio::test]
async fn test_list_children_uses_configured_page_size() {
    let (server, client) = common::setup_client().await;
    let store = cloudmirror_gdrive::store::DriveRemoteStore::new(client).with_page_size(7);

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageSize", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(store.list_children(&id("root")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_listing_is_an_error() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = store.list_children(&id("root")).await.unwrap_err();
    assert!(err.to_string().contains("Invalid response"), "{err}");
}

// ============================================================================
// Mutations
// ============================================================================

#[tokio::test]
async fn test_create_folder_posts_metadata() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .and(body_partial_json(json!({
            "name": "Photos",
            "mimeType": FOLDER_MIME_TYPE,
            "parents": ["root"]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::folder_json("folder-9", "Photos")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let node = store.create_folder(&id("root"), "Photos").await.unwrap();
    assert_eq!(node.id, id("folder-9"));
    assert!(node.is_folder());
}

#[tokio::test]
async fn test_create_file_uses_multipart_upload() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(header_regex("content-type", "^multipart/related; boundary=cloudmirror-"))
        .and(body_string_contains(r#""parents":["folder-1"]"#))
        .and(body_string_contains("Content-Type: text/plain"))
        .and(body_string_contains("hello world"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::file_json("file-7", "a.txt", 11)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let node = store
        .create_file(&id("folder-1"), "a.txt", "text/plain", Bytes::from_static(b"hello world"))
        .await
        .unwrap();
    assert_eq!(node.id, id("file-7"));
    assert_eq!(node.size, Some(11));
    assert_eq!(node.content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn test_update_file_patches_content_and_parent() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/file-7"))
        .and(query_param("uploadType", "multipart"))
        .and(query_param("addParents", "folder-1"))
        .and(body_string_contains("new content"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::file_json("file-7", "a.txt", 11)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let node = store
        .update_file(&id("file-7"), &id("folder-1"), "text/plain", Bytes::from_static(b"new content"))
        .await
        .unwrap();
    assert_eq!(node.id, id("file-7"));
}

#[tokio::test]
async fn test_delete_node() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/file-7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store.delete_node(&id("file-7")).await.unwrap();
}

#[tokio::test]
async fn test_delete_missing_node_reports_not_found() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "File not found: gone." }
        })))
        .mount(&server)
        .await;

    let err = store.delete_node(&id("gone")).await.unwrap_err();
    assert_eq!(err.to_string(), "HTTP 404 Not Found: File not found: gone.");
    assert_eq!(RemoteError::kind_of(&err), Some(RemoteErrorKind::Permanent));
}

#[tokio::test]
async fn test_errors_carry_their_kind() {
    let (server, client) = common::setup_client().await;
    let store = DriveRemoteStore::new(client.with_max_retries(0));

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "0"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .mount(&server)
        .await;

    let err = store.list_children(&id("root")).await.unwrap_err();
    assert_eq!(RemoteError::kind_of(&err), Some(RemoteErrorKind::Transient));

    let err = store.create_folder(&id("root"), "docs").await.unwrap_err();
    assert_eq!(RemoteError::kind_of(&err), Some(RemoteErrorKind::RateLimited));
}

// ============================================================================
// Resumable uploads
// ============================================================================

const SESSION_PATH: &str = "/upload/session/abc";

/// Store that switches to resumable uploads above 4 bytes, in 8-byte chunks
async fn setup_chunked_store() -> (MockServer, DriveRemoteStore) {
    let (server, client) = common::setup_client().await;
    let store = DriveRemoteStore::new(client)
        .with_resumable_threshold(4)
        .with_chunk_size(8);
    (server, store)
}

fn session_created(server: &MockServer) -> ResponseTemplate {
    ResponseTemplate::new(200).insert_header("Location", format!("{}{SESSION_PATH}", server.uri()))
}

async fn mount_chunk(server: &MockServer, range: &str, response: ResponseTemplate) {
    Mock::given(method("PUT"))
        .and(path(SESSION_PATH))
        .and(header("content-range", range))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

fn resume_incomplete(last_byte: u64) -> ResponseTemplate {
    ResponseTemplate::new(308).insert_header("Range", format!("bytes=0-{last_byte}"))
}

#[tokio::test]
async fn test_create_large_file_uses_resumable_session() {
    let (server, store) = setup_chunked_store().await;
    let content = Bytes::from_static(b"0123456789abcdefghij");

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "resumable"))
        .and(header("x-upload-content-type", "text/plain"))
        .and(header("x-upload-content-length", "20"))
        .and(body_partial_json(json!({
            "name": "big.txt",
            "mimeType": "text/plain",
            "parents": ["folder-1"]
        })))
        .respond_with(session_created(&server))
        .expect(1)
        .mount(&server)
        .await;
    mount_chunk(&server, "bytes 0-7/20", resume_incomplete(7)).await;
    mount_chunk(&server, "bytes 8-15/20", resume_incomplete(15)).await;
    mount_chunk(
        &server,
        "bytes 16-19/20",
        ResponseTemplate::new(200).set_body_json(common::file_json("file-big", "big.txt", 20)),
    )
    .await;

    let node = store
        .create_file(&id("folder-1"), "big.txt", "text/plain", content.clone())
        .await
        .unwrap();
    assert_eq!(node.id, id("file-big"));
    assert_eq!(node.size, Some(20));

    let uploaded: Vec<u8> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "PUT")
        .flat_map(|r| r.body)
        .collect();
    assert_eq!(uploaded, content);
}

#[tokio::test]
async fn test_update_large_file_patches_through_session() {
    let (server, store) = setup_chunked_store().await;

    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/file-7"))
        .and(query_param("uploadType", "resumable"))
        .and(query_param("addParents", "folder-1"))
        .and(body_partial_json(json!({ "mimeType": "text/plain" })))
        .respond_with(session_created(&server))
        .expect(1)
        .mount(&server)
        .await;
    mount_chunk(&server, "bytes 0-7/10", resume_incomplete(7)).await;
    mount_chunk(
        &server,
        "bytes 8-9/10",
        ResponseTemplate::new(200).set_body_json(common::file_json("file-7", "a.txt", 10)),
    )
    .await;

    let node = store
        .update_file(
            &id("file-7"),
            &id("folder-1"),
            "text/plain",
            Bytes::from_static(b"0123456789"),
        )
        .await
        .unwrap();
    assert_eq!(node.size, Some(10));
}

#[tokio::test]
async fn test_resumable_upload_resends_what_server_did_not_keep() {
    let (server, store) = setup_chunked_store().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "resumable"))
        .respond_with(session_created(&server))
        .mount(&server)
        .await;
    mount_chunk(&server, "bytes 0-7/12", resume_incomplete(3)).await;
    mount_chunk(
        &server,
        "bytes 4-11/12",
        ResponseTemplate::new(201).set_body_json(common::file_json("file-1", "a.bin", 12)),
    )
    .await;

    let node = store
        .create_file(&id("root"), "a.bin", "text/plain", Bytes::from_static(b"abcdefghijkl"))
        .await
        .unwrap();
    assert_eq!(node.id, id("file-1"));
}

#[tokio::test]
async fn test_resumable_upload_without_progress_fails() {
    let (server, store) = setup_chunked_store().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(session_created(&server))
        .mount(&server)
        .await;
    mount_chunk(&server, "bytes 0-7/9", ResponseTemplate::new(308)).await;

    let err = store
        .create_file(&id("root"), "a.bin", "text/plain", Bytes::from_static(b"123456789"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("stalled at byte 0 of 9"), "{err}");
    assert_eq!(RemoteError::kind_of(&err), Some(RemoteErrorKind::Permanent));
}

#[tokio::test]
async fn test_rejected_chunk_is_classified() {
    let (server, store) = setup_chunked_store().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(session_created(&server))
        .mount(&server)
        .await;
    mount_chunk(
        &server,
        "bytes 0-7/9",
        ResponseTemplate::new(503).set_body_json(json!({
            "error": { "code": 503, "message": "Backend Error" }
        })),
    )
    .await;

    let err = store
        .create_file(&id("root"), "a.bin", "text/plain", Bytes::from_static(b"123456789"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "HTTP 503 server error: Backend Error");
    assert_eq!(RemoteError::kind_of(&err), Some(RemoteErrorKind::Transient));
}

#[tokio::test]
async fn test_session_without_location_is_invalid() {
    let (server, store) = setup_chunked_store().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = store
        .create_file(&id("root"), "a.bin", "text/plain", Bytes::from_static(b"123456789"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("without Location"), "{err}");
}

#[tokio::test]
async fn test_content_at_threshold_stays_multipart() {
    let (server, store) = setup_chunked_store().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(body_string_contains("abcd"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::file_json("file-1", "a.txt", 4)),
        )
        .expect(1)
        .mount(&server)
        .await;

    store
        .create_file(&id("root"), "a.txt", "text/plain", Bytes::from_static(b"abcd"))
        .await
        .unwrap();
}
