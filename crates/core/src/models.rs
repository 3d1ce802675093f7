use serde::{Deserialize, Serialize};

/// Canonical representation of a Sentry error event, extracted from the
/// webhook envelope. Everything downstream of the normalizer sees only this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedError {
    pub issue_id: String,
    pub project_slug: String,
    pub title: String,
    pub error_type: String,
    pub error_message: String,
    pub level: String,
    pub platform: String,
    pub culprit: String,
    pub permalink: String,
    /// Stack frames in the order they appeared in the event (outermost first).
    pub frames: Vec<Frame>,
}

/// A single stack frame. Missing fields in the source payload are left at
/// their zero value rather than failing the parse.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Frame {
    pub filename: String,
    pub abs_path: String,
    pub module: String,
    pub function: String,
    pub line_no: u32,
    pub col_no: u32,
    /// Whether the frame is application code, as opposed to dependency code.
    pub in_app: bool,
    pub pre_context: Vec<String>,
    pub post_context: Vec<String>,
}

/// Maps a Sentry project slug to a GitHub repository. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMapping {
    pub project: String,
    pub owner: String,
    pub repo: String,
}

impl RepoMapping {
    /// Clone URL handed to the fix-generation tool.
    pub fn repo_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.repo)
    }
}
