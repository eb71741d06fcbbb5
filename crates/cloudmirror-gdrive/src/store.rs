//! DriveRemoteStore - IRemoteStore implementation for Google Drive v3
//!
//! Lookups go through the `files.list` search endpoint. Uploads up to the
//! resumable threshold are one `multipart/related` request carrying JSON
//! metadata and content; larger ones go through a resumable session in
//! chunks (see [`crate::upload`]).
//!
//! Every error leaves the store tagged with its
//! [`RemoteErrorKind`](cloudmirror_core::domain::errors::RemoteErrorKind)
//! so the engine does not have to parse messages.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use cloudmirror_core::domain::errors::RemoteError;
use cloudmirror_core::domain::newtypes::RemoteId;
use cloudmirror_core::domain::node::RemoteNode;
use cloudmirror_core::ports::remote_store::IRemoteStore;

use crate::client::DriveClient;
use crate::query;
use crate::upload::{self, UploadTarget, CHUNK_SIZE, RESUMABLE_THRESHOLD};
use crate::DriveError;

/// MIME type Drive uses to mark folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const FILES_PATH: &str = "/drive/v3/files";
const UPLOAD_PATH: &str = "/upload/drive/v3/files";

/// Fields requested for a single file resource
const FILE_FIELDS: &str = "id, name, mimeType, size, modifiedTime";

/// Fields requested for a `files.list` page
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, size, modifiedTime)";

/// Default `pageSize` for listings
pub const DEFAULT_PAGE_SIZE: u32 = 100;

// ============================================================================
// Drive API response types
// ============================================================================

/// A Drive file resource, restricted to [`FILE_FIELDS`]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: Option<String>,
    /// int64 fields are encoded as JSON strings
    size: Option<String>,
    modified_time: Option<DateTime<Utc>>,
}

impl DriveFile {
    fn into_node(self) -> Result<RemoteNode, DriveError> {
        let id = RemoteId::new(self.id)
            .map_err(|e| DriveError::InvalidResponse(format!("file id: {e}")))?;
        let size = self.size.as_deref().and_then(|s| s.parse().ok());

        if self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE) {
            return Ok(RemoteNode::folder(id, self.name).with_metadata(None, self.modified_time));
        }
        let mut node = RemoteNode::file(id, self.name).with_metadata(size, self.modified_time);
        node.content_type = self.mime_type;
        Ok(node)
    }
}

/// One page of a `files.list` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

// ============================================================================
// DriveRemoteStore
// ============================================================================

/// Remote store backed by the Drive v3 API
pub struct DriveRemoteStore {
    client: DriveClient,
    page_size: u32,
    resumable_threshold: usize,
    chunk_size: usize,
}

impl DriveRemoteStore {
    pub fn new(client: DriveClient) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
            resumable_threshold: RESUMABLE_THRESHOLD,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Sets the `pageSize` used for listings (Drive caps it at 1000)
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Content longer than `bytes` is sent through a resumable session
    pub fn with_resumable_threshold(mut self, bytes: usize) -> Self {
        self.resumable_threshold = bytes;
        self
    }

    /// Sets the resumable chunk size
    ///
    /// Drive rejects chunks, other than the last, that are not a multiple
    /// of 256 KiB.
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    async fn upload(
        &self,
        target: UploadTarget<'_>,
        metadata: serde_json::Value,
        content_type: &str,
        content: Bytes,
    ) -> Result<RemoteNode, DriveError> {
        let file: DriveFile = if content.len() > self.resumable_threshold {
            upload::upload_resumable(
                &self.client,
                &target,
                &metadata,
                content_type,
                &content,
                self.chunk_size,
            )
            .await?
        } else {
            upload::upload_multipart(&self.client, &target, &metadata, content_type, &content)
                .await?
        };
        file.into_node()
    }

    async fn find_child_node(
        &self,
        parent: &RemoteId,
        name: &str,
    ) -> Result<Option<RemoteNode>, DriveError> {
        let q = query::child_named(parent.as_str(), name);
        debug!(query = %q, "Searching child");

        let list: FileList = self
            .client
            .execute_json(Method::GET, FILES_PATH, |req| {
                req.query(&[("q", q.as_str()), ("fields", LIST_FIELDS)])
            })
            .await?;

        // The search may match case-insensitively; keep exact names only.
        list.files
            .into_iter()
            .find(|file| file.name == name)
            .map(DriveFile::into_node)
            .transpose()
    }

    async fn list_child_nodes(&self, parent: &RemoteId) -> Result<Vec<RemoteNode>, DriveError> {
        let q = query::children_of(parent.as_str());
        let page_size = self.page_size.to_string();
        let mut page_token: Option<String> = None;
        let mut nodes = Vec::new();
        let mut pages = 0;

        loop {
            let page: FileList = self
                .client
                .execute_json(Method::GET, FILES_PATH, |req| {
                    let req = req.query(&[
                        ("q", q.as_str()),
                        ("fields", LIST_FIELDS),
                        ("pageSize", page_size.as_str()),
                    ]);
                    match page_token.as_deref() {
                        Some(token) => req.query(&[("pageToken", token)]),
                        None => req,
                    }
                })
                .await?;
            pages += 1;

            for file in page.files {
                nodes.push(file.into_node()?);
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(parent = %parent, children = nodes.len(), pages, "Listed children");
        Ok(nodes)
    }

    async fn create_folder_node(
        &self,
        parent: &RemoteId,
        name: &str,
    ) -> Result<RemoteNode, DriveError> {
        let metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent.as_str()],
        });
        let file: DriveFile = self
            .client
            .execute_json(Method::POST, FILES_PATH, |req| {
                req.query(&[("fields", FILE_FIELDS)]).json(&metadata)
            })
            .await?;
        file.into_node()
    }
}

#[async_trait::async_trait]
impl IRemoteStore for DriveRemoteStore {
    async fn find_child(
        &self,
        parent: &RemoteId,
        name: &str,
    ) -> anyhow::Result<Option<RemoteNode>> {
        Ok(self.find_child_node(parent, name).await.map_err(RemoteError::from)?)
    }

    async fn list_children(&self, parent: &RemoteId) -> anyhow::Result<Vec<RemoteNode>> {
        Ok(self.list_child_nodes(parent).await.map_err(RemoteError::from)?)
    }

    async fn create_folder(&self, parent: &RemoteId, name: &str) -> anyhow::Result<RemoteNode> {
        Ok(self
            .create_folder_node(parent, name)
            .await
            .map_err(RemoteError::from)?)
    }

    async fn create_file(
        &self,
        parent: &RemoteId,
        name: &str,
        content_type: &str,
        content: Bytes,
    ) -> anyhow::Result<RemoteNode> {
        let target = UploadTarget {
            method: Method::POST,
            path: UPLOAD_PATH,
            extra_query: &[],
            fields: FILE_FIELDS,
        };
        let metadata = json!({
            "name": name,
            "mimeType": content_type,
            "parents": [parent.as_str()],
        });
        let node = self
            .upload(target, metadata, content_type, content)
            .await
            .map_err(RemoteError::from)?;
        Ok(node)
    }

    async fn update_file(
        &self,
        node: &RemoteId,
        parent: &RemoteId,
        content_type: &str,
        content: Bytes,
    ) -> anyhow::Result<RemoteNode> {
        let path = format!("{UPLOAD_PATH}/{node}");
        let extra_query = [("addParents", parent.as_str())];
        let target = UploadTarget {
            method: Method::PATCH,
            path: &path,
            extra_query: &extra_query,
            fields: FILE_FIELDS,
        };
        let updated = self
            .upload(target, json!({ "mimeType": content_type }), content_type, content)
            .await
            .map_err(RemoteError::from)?;
        Ok(updated)
    }

    async fn delete_node(&self, node: &RemoteId) -> anyhow::Result<()> {
        let path = format!("{FILES_PATH}/{node}");
        self.client
            .execute(Method::DELETE, &path, |req| req)
            .await
            .map_err(RemoteError::from)?;
        Ok(())
    }
}
