pub mod pipeline;
pub mod tool;

use anyhow::Result;
use async_trait::async_trait;
use autofix_core::models::Frame;
use serde::{Deserialize, Serialize};

/// Everything the fix-generation collaborator needs: the canonical error
/// record plus the repository coordinates and credential.
#[derive(Debug, Clone)]
pub struct FixRequest {
    pub issue_id: String,
    pub title: String,
    pub error_type: String,
    pub error_message: String,
    pub level: String,
    pub platform: String,
    pub culprit: String,
    pub permalink: String,
    pub stacktrace: Vec<Frame>,
    pub repo_url: String,
    pub repo_token: String,
}

/// One proposed file edit: the new full content for a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixFile {
    pub path: String,
    pub content: String,
}

/// A successful fix proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixResult {
    pub description: String,
    pub files: Vec<FixFile>,
}

/// The external fix-generation step. The concrete implementation shells out
/// to the Claude Code CLI; tests substitute their own.
#[async_trait]
pub trait FixGenerator: Send + Sync {
    async fn generate_fix(&self, request: &FixRequest) -> Result<FixResult>;
}
