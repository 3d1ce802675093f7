mod github;

use anyhow::Result;
use async_trait::async_trait;
pub use github::GitHubProvider;

/// Mode for a regular, non-executable file.
pub const DEFAULT_FILE_MODE: &str = "100644";

/// One blob replacement in a commit. The content fully replaces whatever is
/// at `path`; files not mentioned are inherited unchanged from the base tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub content: String,
    /// Git file mode ("100644" regular, "100755" executable).
    pub mode: String,
}

impl FileChange {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self { path: path.into(), content: content.into(), mode: DEFAULT_FILE_MODE.to_string() }
    }
}

/// Outbound pull request intent.
#[derive(Debug, Clone, Default)]
pub struct PRRequest {
    pub title: String,
    pub body: String,
    /// Source branch.
    pub head: String,
    /// Target branch (e.g. "main").
    pub base: String,
    pub draft: bool,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
}

/// The provider's created-PR result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PRResponse {
    pub number: u64,
    pub url: String,
    pub html_url: String,
}

/// Remote repository operations, scoped to a single owner/repo pair.
///
/// Implementations mutate shared, externally-visible state, so every write
/// must tolerate being re-applied: `create_branch` treats an existing
/// reference as success, and `commit_files` recomputes from the branch's
/// current head on each invocation. No operation retries internally; a
/// failure is wrapped with context and propagated as terminal for the job.
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// The repository's primary branch name.
    async fn default_branch(&self) -> Result<String>;

    /// The commit sha at the tip of a named branch.
    async fn branch_head(&self, branch: &str) -> Result<String>;

    /// Create a branch pointing at a base commit. An already-existing
    /// reference is success, not an error.
    async fn create_branch(&self, name: &str, base_sha: &str) -> Result<()>;

    /// Commit file changes onto a branch and advance its reference.
    /// Returns the new commit sha. Not atomic across remote calls: a failure
    /// before the reference update leaves an orphaned, unreferenced commit;
    /// the branch reference alone decides whether the commit landed.
    async fn commit_files(
        &self,
        branch: &str,
        files: &[FileChange],
        message: &str,
    ) -> Result<String>;

    /// Create a pull request. Labels and assignees are applied after
    /// creation as independent, non-fatal side effects.
    async fn create_pull_request(&self, req: &PRRequest) -> Result<PRResponse>;

    fn owner(&self) -> &str;

    fn repo(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicU64, Ordering},
        },
    };

    use anyhow::{Context, bail};

    use super::*;

    /// In-memory provider mirroring the remote protocol semantics, used to
    /// exercise the `GitProvider` contract without a network.
    struct InMemoryProvider {
        state: Mutex<RepoState>,
        next_sha: AtomicU64,
        fail_labels: bool,
        labels_applied: Mutex<Vec<String>>,
    }

    #[derive(Default)]
    struct RepoState {
        branches: HashMap<String, String>,
        commits: HashMap<String, CommitNode>,
    }

    #[derive(Clone, Default)]
    struct CommitNode {
        parent: Option<String>,
        tree: HashMap<String, String>,
    }

    impl InMemoryProvider {
        fn new() -> Self {
            let provider = Self {
                state: Mutex::new(RepoState::default()),
                next_sha: AtomicU64::new(1),
                fail_labels: false,
                labels_applied: Mutex::new(Vec::new()),
            };
            let root = provider.mint_sha();
            let mut state = provider.state.lock().unwrap();
            state.commits.insert(root.clone(), CommitNode {
                parent: None,
                tree: HashMap::from([("README.md".to_string(), "hello".to_string())]),
            });
            state.branches.insert("main".to_string(), root);
            drop(state);
            provider
        }

        fn mint_sha(&self) -> String {
            format!("sha{:04}", self.next_sha.fetch_add(1, Ordering::SeqCst))
        }

        fn file_at_head(&self, branch: &str, path: &str) -> Option<String> {
            let state = self.state.lock().unwrap();
            let head = state.branches.get(branch)?;
            state.commits.get(head)?.tree.get(path).cloned()
        }
    }

    #[async_trait]
    impl GitProvider for InMemoryProvider {
        async fn default_branch(&self) -> Result<String> { Ok("main".to_string()) }

        async fn branch_head(&self, branch: &str) -> Result<String> {
            let state = self.state.lock().unwrap();
            state.branches.get(branch).cloned().with_context(|| format!("no branch {branch}"))
        }

        async fn create_branch(&self, name: &str, base_sha: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.branches.contains_key(name) {
                // Reference already exists: success
                return Ok(());
            }
            if !state.commits.contains_key(base_sha) {
                bail!("unknown base sha {base_sha}");
            }
            state.branches.insert(name.to_string(), base_sha.to_string());
            Ok(())
        }

        async fn commit_files(
            &self,
            branch: &str,
            files: &[FileChange],
            _message: &str,
        ) -> Result<String> {
            let sha = self.mint_sha();
            let mut state = self.state.lock().unwrap();
            let parent = state
                .branches
                .get(branch)
                .cloned()
                .with_context(|| format!("no branch {branch}"))?;
            let mut tree = state.commits.get(&parent).map(|c| c.tree.clone()).unwrap_or_default();
            for file in files {
                tree.insert(file.path.clone(), file.content.clone());
            }
            state.commits.insert(sha.clone(), CommitNode { parent: Some(parent), tree });
            state.branches.insert(branch.to_string(), sha.clone());
            Ok(sha)
        }

        async fn create_pull_request(&self, req: &PRRequest) -> Result<PRResponse> {
            let response = PRResponse {
                number: 1,
                url: "https://api.github.com/repos/acme/web/pulls/1".to_string(),
                html_url: "https://github.com/acme/web/pull/1".to_string(),
            };
            // Labels are a non-fatal side effect of an already-created PR
            if self.fail_labels {
                tracing::warn!("Failed to add labels to PR #{}", response.number);
            } else {
                self.labels_applied.lock().unwrap().extend(req.labels.iter().cloned());
            }
            Ok(response)
        }

        fn owner(&self) -> &str { "acme" }

        fn repo(&self) -> &str { "web" }
    }

    #[tokio::test]
    async fn test_create_branch_idempotent() {
        let provider = InMemoryProvider::new();
        let base = provider.branch_head("main").await.unwrap();
        provider.create_branch("autofix/issue-1", &base).await.unwrap();
        // A second create with the same name and base is success, not an error
        provider.create_branch("autofix/issue-1", &base).await.unwrap();
        assert_eq!(provider.branch_head("autofix/issue-1").await.unwrap(), base);
    }

    #[tokio::test]
    async fn test_commit_files_overlays_base_tree() {
        let provider = InMemoryProvider::new();
        let base = provider.branch_head("main").await.unwrap();
        provider.create_branch("fix", &base).await.unwrap();
        let sha = provider
            .commit_files("fix", &[FileChange::new("src/app.js", "fixed")], "fix")
            .await
            .unwrap();
        assert_eq!(provider.branch_head("fix").await.unwrap(), sha);
        assert_eq!(provider.file_at_head("fix", "src/app.js").as_deref(), Some("fixed"));
        // Files not mentioned are inherited from the base tree
        assert_eq!(provider.file_at_head("fix", "README.md").as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_commit_files_rerun_is_safe() {
        let provider = InMemoryProvider::new();
        let base = provider.branch_head("main").await.unwrap();
        provider.create_branch("fix", &base).await.unwrap();
        let files = [FileChange::new("src/app.js", "fixed")];
        let first = provider.commit_files("fix", &files, "fix").await.unwrap();
        let second = provider.commit_files("fix", &files, "fix").await.unwrap();
        // Two valid commits; the second's parent is the first, because the
        // sequence recomputes from the branch's current head each run
        assert_ne!(first, second);
        assert_eq!(provider.branch_head("fix").await.unwrap(), second);
        let state = provider.state.lock().unwrap();
        assert_eq!(state.commits[&second].parent.as_deref(), Some(first.as_str()));
        assert_eq!(state.commits[&second].tree["src/app.js"], "fixed");
    }

    #[tokio::test]
    async fn test_label_failure_does_not_fail_pr() {
        let mut provider = InMemoryProvider::new();
        provider.fail_labels = true;
        let response = provider
            .create_pull_request(&PRRequest {
                title: "Fix".to_string(),
                head: "fix".to_string(),
                base: "main".to_string(),
                labels: vec!["autofix".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(response.number, 1);
        assert!(!response.html_url.is_empty());
        assert!(provider.labels_applied.lock().unwrap().is_empty());
    }
}
