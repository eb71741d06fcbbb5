//! Run policies selected by configuration

use serde::{Deserialize, Serialize};

/// How a file that already exists remotely is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetection {
    /// Every matched file is re-uploaded on every run
    #[default]
    Always,
    /// Skip the upload when the remote size equals the local size and the
    /// remote copy is not older than the local file
    SizeAndModified,
}

/// What happens to the run when one mapping fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingErrorPolicy {
    /// The first failing mapping aborts the whole run
    #[default]
    #[serde(rename = "fail_fast")]
    FailFast,
    /// Failing mappings are recorded and the remaining ones still run
    #[serde(rename = "continue")]
    ContinueAndReport,
}
