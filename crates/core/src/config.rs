use anyhow::{Context, Result, bail};

use crate::models::RepoMapping;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub github: GitHubConfig,
    pub agent: AgentConfig,
    pub mappings: Vec<RepoMapping>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Fix-generation CLI binary, resolved via PATH.
    pub command: String,
    /// Passed through to the CLI as ANTHROPIC_API_KEY when set. When unset,
    /// the CLI falls back to its own stored credentials.
    pub api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables. Any missing required
    /// value is a fatal startup error.
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(value) => value.parse::<u16>().context("PORT must be a valid port number")?,
            Err(_) => 8080,
        };
        let secret = require_env("SENTRY_WEBHOOK_SECRET")?;
        let token = require_env("GITHUB_TOKEN")?;
        let mappings = parse_repo_mappings(&require_env("REPO_MAPPINGS")?)?;
        Ok(Self {
            server: ServerConfig { port },
            webhook: WebhookConfig { secret },
            github: GitHubConfig { token },
            agent: AgentConfig {
                command: std::env::var("CLAUDE_COMMAND").unwrap_or_else(|_| "claude".to_string()),
                api_key: std::env::var("ANTHROPIC_API_KEY").ok().filter(|s| !s.is_empty()),
            },
            mappings,
        })
    }

    /// Look up the repository mapped to a Sentry project slug.
    pub fn repo_mapping(&self, project: &str) -> Option<&RepoMapping> {
        self.mappings.iter().find(|m| m.project == project)
    }
}

fn require_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => bail!("{key} is required"),
    }
}

/// Parse the `REPO_MAPPINGS` environment variable.
/// Format: `project1:owner1/repo1,project2:owner2/repo2`
pub fn parse_repo_mappings(s: &str) -> Result<Vec<RepoMapping>> {
    let mut mappings = Vec::new();
    for pair in s.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (project, repo_path) = pair
            .split_once(':')
            .with_context(|| format!("invalid repo mapping {pair:?} (expected project:owner/repo)"))?;
        let (owner, repo) = repo_path
            .split_once('/')
            .with_context(|| format!("invalid repo path {repo_path:?} (expected owner/repo)"))?;
        let (project, owner, repo) = (project.trim(), owner.trim(), repo.trim());
        if project.is_empty() || owner.is_empty() || repo.is_empty() {
            bail!("invalid repo mapping {pair:?} (expected project:owner/repo)");
        }
        mappings.push(RepoMapping {
            project: project.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        });
    }
    if mappings.is_empty() {
        bail!("REPO_MAPPINGS must contain at least one mapping");
    }
    Ok(mappings)
}
