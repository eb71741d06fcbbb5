//! Upload operations for the Drive v3 files API
//!
//! - [`upload_multipart`] - Metadata and content in one `multipart/related` request
//! - [`upload_resumable`] - Resumable session for large files, sent in chunks
//! - [`create_upload_session`] - Starts a resumable session
//! - [`upload_chunk`] - Sends one chunk within a session
//!
//! ## Drive API references
//!
//! - [Upload file data](https://developers.google.com/drive/api/guides/manage-uploads)

use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::client::{error_from_response, DriveClient};
use crate::DriveError;

/// Chunk size for resumable uploads: 8 MiB
///
/// Drive requires every chunk but the last to be a multiple of 256 KiB.
/// 8 MiB = 256 KiB * 32.
pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Content larger than this goes through a resumable session: 5 MiB
pub const RESUMABLE_THRESHOLD: usize = 5 * 1024 * 1024;

/// Where an upload is sent
#[derive(Debug, Clone)]
pub struct UploadTarget<'a> {
    /// `POST` to create, `PATCH` to replace content
    pub method: Method,
    /// Path below the client's base URL, e.g. `/upload/drive/v3/files`
    pub path: &'a str,
    /// Query parameters besides `uploadType` and `fields`
    pub extra_query: &'a [(&'a str, &'a str)],
    /// `fields` selector for the returned file resource
    pub fields: &'a str,
}

/// Result of sending one chunk
#[derive(Debug)]
pub enum ChunkOutcome<T> {
    /// The server kept the first `persisted` bytes and wants the rest
    Incomplete { persisted: u64 },
    /// The last chunk was accepted; carries the file resource
    Complete(T),
}

// ============================================================================
// upload_multipart
// ============================================================================

/// Uploads metadata and content in a single `uploadType=multipart` request
///
/// The body is built once; throttled attempts resend the same buffer.
pub async fn upload_multipart<T: DeserializeOwned>(
    client: &DriveClient,
    target: &UploadTarget<'_>,
    metadata: &serde_json::Value,
    content_type: &str,
    content: &[u8],
) -> Result<T, DriveError> {
    let boundary = boundary();
    let body = multipart_related(&boundary, metadata, content_type, content);
    let header = format!("multipart/related; boundary={boundary}");
    debug!(path = target.path, size = content.len(), "Multipart upload");

    client
        .execute_json(target.method.clone(), target.path, |req| {
            req.query(&[("uploadType", "multipart"), ("fields", target.fields)])
                .query(target.extra_query)
                .header(CONTENT_TYPE, header.as_str())
                .body(body.clone())
        })
        .await
}

// ============================================================================
// create_upload_session
// ============================================================================

/// Starts a resumable upload session
///
/// Sends the metadata with `uploadType=resumable` and announces the content
/// type and length. The session URI comes back in the `Location` header and
/// is absolute.
///
/// # Errors
/// The classified status of the request, or
/// [`DriveError::InvalidResponse`] when `Location` is missing.
pub async fn create_upload_session(
    client: &DriveClient,
    target: &UploadTarget<'_>,
    metadata: &serde_json::Value,
    content_type: &str,
    total: u64,
) -> Result<String, DriveError> {
    let length = total.to_string();
    let response = client
        .execute(target.method.clone(), target.path, |req| {
            req.query(&[("uploadType", "resumable"), ("fields", target.fields)])
                .query(target.extra_query)
                .header("X-Upload-Content-Type", content_type)
                .header("X-Upload-Content-Length", length.as_str())
                .json(metadata)
        })
        .await?;

    let session = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            DriveError::InvalidResponse(format!("{}: upload session without Location", target.path))
        })?;
    debug!(path = target.path, total, "Upload session created");
    Ok(session.to_string())
}

// ============================================================================
// upload_chunk
// ============================================================================

/// Sends `chunk`, which starts at byte `offset` of `total`, to a session
///
/// Drive answers intermediate chunks with `308 Resume Incomplete` and a
/// `Range: bytes=0-N` header naming what it kept; no `Range` means nothing
/// was kept. The final chunk is answered with the file resource.
pub async fn upload_chunk<T: DeserializeOwned>(
    client: &DriveClient,
    session_url: &str,
    chunk: Bytes,
    offset: u64,
    total: u64,
) -> Result<ChunkOutcome<T>, DriveError> {
    let len = chunk.len() as u64;
    let content_range = format!("bytes {}-{}/{}", offset, offset + len - 1, total);
    debug!(content_range = %content_range, "Uploading chunk");

    let response = client
        .request_url(Method::PUT, session_url)
        .header(CONTENT_RANGE, content_range.as_str())
        .body(chunk)
        .send()
        .await?;
    let status = response.status();

    if status == StatusCode::PERMANENT_REDIRECT {
        let persisted = response
            .headers()
            .get(RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(range_end)
            .map_or(0, |end| end + 1);
        return Ok(ChunkOutcome::Incomplete { persisted });
    }
    if !status.is_success() {
        return Err(error_from_response(response).await);
    }

    let body = response.bytes().await?;
    let file = serde_json::from_slice(&body)
        .map_err(|e| DriveError::InvalidResponse(format!("upload session: {e}")))?;
    Ok(ChunkOutcome::Complete(file))
}

// ============================================================================
// upload_resumable
// ============================================================================

/// Uploads `content` through a resumable session in `chunk_size` pieces
///
/// Each chunk is a slice of `content` and shares its buffer. After a
/// `308` the next chunk starts where the server says it stopped.
///
/// # Errors
/// Fails on the first rejected request, or with
/// [`DriveError::InvalidResponse`] when the server stops making progress.
pub async fn upload_resumable<T: DeserializeOwned>(
    client: &DriveClient,
    target: &UploadTarget<'_>,
    metadata: &serde_json::Value,
    content_type: &str,
    content: &Bytes,
    chunk_size: usize,
) -> Result<T, DriveError> {
    let total = content.len() as u64;
    let chunk_size = chunk_size.max(1) as u64;
    info!(
        path = target.path,
        size = total,
        chunks = total.div_ceil(chunk_size),
        "Starting resumable upload"
    );

    let session = create_upload_session(client, target, metadata, content_type, total).await?;

    let mut offset = 0u64;
    loop {
        let end = (offset + chunk_size).min(total);
        let chunk = content.slice(offset as usize..end as usize);
        match upload_chunk(client, &session, chunk, offset, total).await? {
            ChunkOutcome::Complete(file) => {
                info!(path = target.path, size = total, "Resumable upload completed");
                return Ok(file);
            }
            ChunkOutcome::Incomplete { persisted } => {
                if persisted <= offset || persisted >= total {
                    return Err(DriveError::InvalidResponse(format!(
                        "upload session stalled at byte {persisted} of {total}"
                    )));
                }
                offset = persisted;
            }
        }
    }
}

/// Last byte index of a `Range: bytes=0-N` header
fn range_end(value: &str) -> Option<u64> {
    let (_, end) = value.trim().strip_prefix("bytes=")?.split_once('-')?;
    end.parse().ok()
}

// ============================================================================
// multipart/related
// ============================================================================

/// Boundary unlikely to occur in uploaded content
fn boundary() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("cloudmirror-{nanos:x}")
}

/// Builds a two-part `multipart/related` body: JSON metadata, then media
fn multipart_related(
    boundary: &str,
    metadata: &serde_json::Value,
    content_type: &str,
    content: &[u8],
) -> Bytes {
    let mut body = BytesMut::with_capacity(content.len() + 256);
    body.put_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n")
            .as_bytes(),
    );
    body.put_slice(format!("--{boundary}\r\nContent-Type: {content_type}\r\n\r\n").as_bytes());
    body.put_slice(content);
    body.put_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body.freeze()
}
