use anyhow::{Context, Result, ensure};
use autofix_core::models::ParsedError;
use autofix_github::{FileChange, GitProvider, PRRequest, PRResponse};

use crate::FixResult;

/// Branch targeted for a given issue. Deterministic, so repeated runs for the
/// same issue land on the same branch instead of piling up new ones.
pub fn branch_name(issue_id: &str) -> String { format!("autofix/issue-{issue_id}") }

/// Turn a fix proposal into a branch, a commit, and a pull request.
///
/// Sequence: resolve default branch, resolve its head, create the issue
/// branch (idempotent), commit the proposed file changes, open the PR. Any
/// stage failure aborts the remainder for this job.
pub async fn open_fix_pull_request(
    provider: &dyn GitProvider,
    error: &ParsedError,
    fix: &FixResult,
) -> Result<PRResponse> {
    ensure!(!fix.files.is_empty(), "fix contains no file changes");

    let base = provider.default_branch().await.context("Failed to resolve default branch")?;
    let base_sha = provider
        .branch_head(&base)
        .await
        .with_context(|| format!("Failed to resolve head of {base}"))?;
    let head = branch_name(&error.issue_id);
    provider.create_branch(&head, &base_sha).await?;

    let files = fix
        .files
        .iter()
        .map(|f| FileChange::new(f.path.as_str(), f.content.as_str()))
        .collect::<Vec<_>>();
    let message = format!("fix: {} (Sentry issue {})", error.title, error.issue_id);
    let commit_sha = provider.commit_files(&head, &files, &message).await?;
    tracing::info!("Committed {} file(s) to {} ({})", files.len(), head, commit_sha);

    provider
        .create_pull_request(&PRRequest {
            title: format!("Fix: {}", error.title),
            body: pr_body(error, fix),
            head,
            base,
            draft: false,
            labels: vec!["autofix".to_string()],
            assignees: Vec::new(),
        })
        .await
}

fn pr_body(error: &ParsedError, fix: &FixResult) -> String {
    let mut body = String::new();
    body.push_str("## Automated fix\n\n");
    if !fix.description.is_empty() {
        body.push_str(&fix.description);
        body.push_str("\n\n");
    }
    body.push_str("### Error\n\n");
    body.push_str(&format!("- **Issue**: [{}]({})\n", error.issue_id, error.permalink));
    body.push_str(&format!("- **Type**: {}: {}\n", error.error_type, error.error_message));
    body.push_str(&format!("- **Level**: {}\n", error.level));
    if !error.culprit.is_empty() {
        body.push_str(&format!("- **Culprit**: {}\n", error.culprit));
    }
    body.push_str(
        "\nThis pull request was generated automatically from a Sentry error report. \
         Review carefully before merging.\n",
    );
    body
}
