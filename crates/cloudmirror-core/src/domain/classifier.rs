//! Node classifier
//!
//! Derives the remote representation of a local entry: its name, whether it
//! becomes a folder or a file, and the content type sent with file uploads.

use std::path::Path;

use serde::Serialize;

use super::node::NodeKind;

/// Content type used when the extension is missing or unknown
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Remote metadata derived from a local entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalEntryInfo {
    /// Base name of the entry, used as the remote node name
    pub name: String,
    /// Folder for directories, file otherwise
    pub kind: NodeKind,
    /// Content type for files; `None` for folders
    pub content_type: Option<String>,
}

/// Classify a local entry
///
/// Pure and infallible. A path without a final component (such as `/`)
/// yields an empty name; callers reject those roots before classifying.
pub fn classify(path: &Path, is_dir: bool) -> LocalEntryInfo {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if is_dir {
        LocalEntryInfo {
            name,
            kind: NodeKind::Folder,
            content_type: None,
        }
    } else {
        LocalEntryInfo {
            name,
            kind: NodeKind::File,
            content_type: Some(content_type_for(path).to_string()),
        }
    }
}

/// Look up the content type for a path by its final extension
///
/// Extensions are matched case-insensitively. The first registered type
/// wins when an extension has several.
pub fn content_type_for(path: &Path) -> &'static str {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
