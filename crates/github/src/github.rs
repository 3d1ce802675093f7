use anyhow::{Context, Result};
use async_trait::async_trait;
use http::StatusCode;
use octocrab::{GitHubError, Octocrab};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_FILE_MODE, FileChange, GitProvider, PRRequest, PRResponse};

/// GitHub binding for [`GitProvider`], scoped to one owner/repo pair and
/// authenticated by a personal token.
#[derive(Clone)]
pub struct GitHubProvider {
    client: Octocrab,
    owner: String,
    repo: String,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Serialize)]
struct CreateRef<'a> {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRef<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    tree: CreatedObject,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    sha: String,
}

#[derive(Serialize)]
struct CreateTree<'a> {
    base_tree: &'a str,
    tree: Vec<TreeEntry<'a>>,
}

#[derive(Serialize)]
struct TreeEntry<'a> {
    path: &'a str,
    mode: &'a str,
    #[serde(rename = "type")]
    entry_type: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateCommit<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

impl GitHubProvider {
    pub fn new(token: &str, owner: &str, repo: &str) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .context("Failed to create GitHub client")?;
        Ok(Self { client, owner: owner.to_string(), repo: repo.to_string() })
    }

    fn route(&self, suffix: impl AsRef<str>) -> String {
        format!("/repos/{}/{}/{}", self.owner, self.repo, suffix.as_ref())
    }

    async fn get_ref(&self, branch: &str) -> Result<GitRef> {
        self.client
            .get(self.route(format!("git/ref/heads/{branch}")), None::<&()>)
            .await
            .with_context(|| format!("Failed to get ref for branch {branch}"))
    }
}

#[async_trait]
impl GitProvider for GitHubProvider {
    async fn default_branch(&self) -> Result<String> {
        let repo = self
            .client
            .repos(&self.owner, &self.repo)
            .get()
            .await
            .with_context(|| format!("Failed to get repository {}/{}", self.owner, self.repo))?;
        Ok(repo.default_branch.unwrap_or_else(|| "main".to_string()))
    }

    async fn branch_head(&self, branch: &str) -> Result<String> {
        Ok(self.get_ref(branch).await?.object.sha)
    }

    async fn create_branch(&self, name: &str, base_sha: &str) -> Result<()> {
        let result: Result<GitRef, octocrab::Error> = self
            .client
            .post(
                self.route("git/refs"),
                Some(&CreateRef { ref_name: format!("refs/heads/{name}"), sha: base_sha }),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            // A prior partial run may have already created the reference
            Err(octocrab::Error::GitHub { source, .. })
                if matches!(*source, GitHubError {
                    status_code: StatusCode::UNPROCESSABLE_ENTITY,
                    ..
                }) && source.message.contains("already exists") =>
            {
                tracing::info!("Branch {} already exists, reusing it", name);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to create branch {name}")),
        }
    }

    async fn commit_files(
        &self,
        branch: &str,
        files: &[FileChange],
        message: &str,
    ) -> Result<String> {
        // Resolve the branch's current head; a re-run recomputes from here
        let parent_sha = self.get_ref(branch).await?.object.sha;
        let parent_commit: GitCommit = self
            .client
            .get(self.route(format!("git/commits/{parent_sha}")), None::<&()>)
            .await
            .with_context(|| format!("Failed to get parent commit {parent_sha}"))?;

        let entries = files
            .iter()
            .map(|file| TreeEntry {
                path: &file.path,
                mode: if file.mode.is_empty() { DEFAULT_FILE_MODE } else { &file.mode },
                entry_type: "blob",
                content: &file.content,
            })
            .collect::<Vec<_>>();
        let tree: CreatedObject = self
            .client
            .post(
                self.route("git/trees"),
                Some(&CreateTree { base_tree: &parent_commit.tree.sha, tree: entries }),
            )
            .await
            .with_context(|| format!("Failed to create tree on branch {branch}"))?;

        let commit: CreatedObject = self
            .client
            .post(
                self.route("git/commits"),
                Some(&CreateCommit { message, tree: &tree.sha, parents: vec![&parent_sha] }),
            )
            .await
            .with_context(|| format!("Failed to create commit on branch {branch}"))?;

        // The reference update is the single source of truth for "did the
        // commit land"; a failure before this point leaves only an orphaned,
        // unreferenced commit behind.
        let _: GitRef = self
            .client
            .patch(
                self.route(format!("git/refs/heads/{branch}")),
                Some(&UpdateRef { sha: &commit.sha, force: false }),
            )
            .await
            .with_context(|| format!("Failed to update ref for branch {branch}"))?;

        Ok(commit.sha)
    }

    async fn create_pull_request(&self, req: &PRRequest) -> Result<PRResponse> {
        let created = self
            .client
            .pulls(&self.owner, &self.repo)
            .create(&req.title, &req.head, &req.base)
            .body(&req.body)
            .draft(req.draft)
            .send()
            .await
            .with_context(|| {
                format!("Failed to create pull request {} -> {}", req.head, req.base)
            })?;
        let response = PRResponse {
            number: created.number,
            url: created.url,
            html_url: created.html_url.map(|u| u.to_string()).unwrap_or_default(),
        };

        // Labels and assignees are non-fatal: the PR is already created
        if !req.labels.is_empty() {
            if let Err(e) = self
                .client
                .issues(&self.owner, &self.repo)
                .add_labels(response.number, &req.labels)
                .await
            {
                tracing::warn!("Failed to add labels to PR #{}: {e}", response.number);
            }
        }
        if !req.assignees.is_empty() {
            let assignees = req.assignees.iter().map(String::as_str).collect::<Vec<_>>();
            if let Err(e) = self
                .client
                .issues(&self.owner, &self.repo)
                .add_assignees(response.number, &assignees)
                .await
            {
                tracing::warn!("Failed to add assignees to PR #{}: {e}", response.number);
            }
        }

        Ok(response)
    }

    fn owner(&self) -> &str { &self.owner }

    fn repo(&self) -> &str { &self.repo }
}
