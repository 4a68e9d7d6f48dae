//! Webhook providers.
//!
//! A request is attributed to a [`Provider`], authenticated, and its JSON
//! payload handed to the [`Normalizer`] registered for the provider's event
//! name. Normalizers emit the same canonical events as the post-receive hook.

pub mod auth;
pub mod enrich;
mod github;
mod gitlab;
pub mod payload;
mod travis;

use axum::http::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::error::{EventcError, Result};
use crate::event::{Author, EventBase, Pusher};
use crate::notify::Notifier;
use crate::push::PushedCommit;
use crate::repo::Commit;
use enrich::ApiLookup;
use payload::PayloadExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    GitHub,
    GitLab,
    Travis,
}

impl Provider {
    /// Identifies the sender from its `User-Agent` or provider headers.
    pub fn detect(headers: &HeaderMap) -> Option<Self> {
        let user_agent = headers
            .get("User-Agent")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        if user_agent.starts_with("GitHub-Hookshot/") {
            Some(Provider::GitHub)
        } else if user_agent.starts_with("Travis CI ") {
            Some(Provider::Travis)
        } else if headers.contains_key("X-Gitlab-Event") {
            Some(Provider::GitLab)
        } else {
            None
        }
    }

    /// Event name the request announces. Travis CI only sends builds.
    pub fn event_name(&self, headers: &HeaderMap) -> Option<String> {
        let header = match self {
            Provider::GitHub => "X-GitHub-Event",
            Provider::GitLab => "X-Gitlab-Event",
            Provider::Travis => return Some(travis::BUILD_EVENT.to_string()),
        };
        headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(String::from)
    }

    /// Delivery id the provider assigned, when it sends one.
    pub fn delivery_id(&self, headers: &HeaderMap) -> Option<String> {
        let header = match self {
            Provider::GitHub => "X-GitHub-Delivery",
            Provider::GitLab => "X-Gitlab-Event-UUID",
            Provider::Travis => return None,
        };
        headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(String::from)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::GitHub => "GitHub",
            Provider::GitLab => "GitLab",
            Provider::Travis => "Travis CI",
        };
        f.write_str(name)
    }
}

/// `/<group>[/<project>]` request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPath {
    pub group: String,
    pub project: Option<String>,
}

impl ProjectPath {
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.trim_start_matches('/');
        let (group, project) = match path.split_once('/') {
            Some((group, project)) => (group, Some(project)),
            None => (path, None),
        };
        if group.is_empty() {
            return None;
        }
        Some(Self {
            group: group.to_string(),
            project: project
                .map(|p| p.trim_end_matches('/'))
                .filter(|p| !p.is_empty())
                .map(String::from),
        })
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(project) => write!(f, "{}/{}", self.group, project),
            None => f.write_str(&self.group),
        }
    }
}

/// What a normalizer needs besides the payload.
#[derive(Clone)]
pub struct WebhookContext {
    pub notifier: Notifier,
    pub api: ApiLookup,
    pub project: ProjectPath,
    pub merge_threshold: usize,
}

impl WebhookContext {
    pub fn base(&self, repository: &Value, url_field: &str, pusher: Pusher) -> Result<EventBase> {
        let name = repository.req_str("name")?;
        if name.is_empty() {
            return Err(EventcError::MalformedInput("empty repository name".to_string()));
        }
        if pusher.name.is_empty() {
            return Err(EventcError::MalformedInput("empty pusher name".to_string()));
        }
        Ok(EventBase::new(name, pusher)
            .with_repository_url(repository.opt_str(url_field).map(String::from))
            .with_project(Some(self.project.group.clone()), self.project.project.clone()))
    }
}

/// Commit of a push payload. GitHub and GitLab share this layout.
fn pushed_commit(value: &Value) -> Result<PushedCommit> {
    let author = value.req_object("author")?;
    let changed_paths = ["added", "modified", "removed"]
        .iter()
        .flat_map(|field| value.strings(field))
        .collect();

    Ok(PushedCommit {
        commit: Commit {
            id: value.req_str("id")?.to_string(),
            parents: Vec::new(),
            author: Author {
                name: author.req_str("name")?.to_string(),
                email: author.opt_str("email").map(String::from),
                username: author.opt_str("username").map(String::from),
            },
            message: value.req_str("message")?.to_string(),
            changed_paths,
        },
        url: value.opt_str("url").map(String::from),
    })
}

/// Well-formed commits of a payload array; others are skipped.
fn pushed_commits(commits: &[Value]) -> Vec<PushedCommit> {
    commits
        .iter()
        .filter_map(|value| match pushed_commit(value) {
            Ok(commit) => Some(commit),
            Err(e) => {
                warn!("Skipping payload commit: {}", e);
                None
            }
        })
        .collect()
}

/// Turns one kind of provider payload into events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalizer {
    GithubPing,
    GithubPush,
    GithubIssues,
    GithubPullRequest,
    GitlabPush,
    GitlabTagPush,
    GitlabIssue,
    GitlabMergeRequest,
    TravisBuild,
}

impl Normalizer {
    pub fn provider(&self) -> Provider {
        match self {
            Normalizer::GithubPing
            | Normalizer::GithubPush
            | Normalizer::GithubIssues
            | Normalizer::GithubPullRequest => Provider::GitHub,
            Normalizer::GitlabPush
            | Normalizer::GitlabTagPush
            | Normalizer::GitlabIssue
            | Normalizer::GitlabMergeRequest => Provider::GitLab,
            Normalizer::TravisBuild => Provider::Travis,
        }
    }

    /// Whether the event produces notifications at all.
    pub fn emits(&self) -> bool {
        !matches!(self, Normalizer::GithubPing)
    }

    pub async fn normalize(&self, ctx: &WebhookContext, payload: &Value) -> Result<()> {
        match self {
            Normalizer::GithubPing => Ok(()),
            Normalizer::GithubPush => github::push(ctx, payload).await,
            Normalizer::GithubIssues => github::issues(ctx, payload).await,
            Normalizer::GithubPullRequest => github::pull_request(ctx, payload).await,
            Normalizer::GitlabPush => gitlab::push(ctx, payload).await,
            Normalizer::GitlabTagPush => gitlab::tag_push(ctx, payload).await,
            Normalizer::GitlabIssue => gitlab::issue(ctx, payload).await,
            Normalizer::GitlabMergeRequest => gitlab::merge_request(ctx, payload).await,
            Normalizer::TravisBuild => travis::build(ctx, payload).await,
        }
    }
}

/// Normalizers by provider and event name.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    normalizers: HashMap<(Provider, String), Normalizer>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Provider, event: &str, normalizer: Normalizer) -> Result<()> {
        if normalizer.provider() != provider {
            return Err(EventcError::ConfigError(format!(
                "{:?} can't handle {} events",
                normalizer, provider
            )));
        }
        let key = (provider, event.to_string());
        if self.normalizers.contains_key(&key) {
            return Err(EventcError::ConfigError(format!(
                "{} event '{}' registered twice",
                provider, event
            )));
        }
        self.normalizers.insert(key, normalizer);
        Ok(())
    }

    /// Every event the server understands.
    pub fn standard() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Provider::GitHub, "ping", Normalizer::GithubPing)?;
        registry.register(Provider::GitHub, "push", Normalizer::GithubPush)?;
        registry.register(Provider::GitHub, "issues", Normalizer::GithubIssues)?;
        registry.register(Provider::GitHub, "pull_request", Normalizer::GithubPullRequest)?;
        registry.register(Provider::GitLab, "Push Hook", Normalizer::GitlabPush)?;
        registry.register(Provider::GitLab, "Tag Push Hook", Normalizer::GitlabTagPush)?;
        registry.register(Provider::GitLab, "Issue Hook", Normalizer::GitlabIssue)?;
        registry.register(Provider::GitLab, "Merge Request Hook", Normalizer::GitlabMergeRequest)?;
        registry.register(Provider::Travis, travis::BUILD_EVENT, Normalizer::TravisBuild)?;
        Ok(registry)
    }

    pub fn lookup(&self, provider: Provider, event: &str) -> Option<Normalizer> {
        self.normalizers
            .get(&(provider, event.to_string()))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn detects_provider() {
        let mut headers = HeaderMap::new();
        assert_eq!(Provider::detect(&headers), None);

        headers.insert("User-Agent", HeaderValue::from_static("GitHub-Hookshot/abc123"));
        assert_eq!(Provider::detect(&headers), Some(Provider::GitHub));

        headers.insert("User-Agent", HeaderValue::from_static("Travis CI Notifications"));
        assert_eq!(Provider::detect(&headers), Some(Provider::Travis));

        headers.insert("User-Agent", HeaderValue::from_static("curl/8.0"));
        headers.insert("X-Gitlab-Event", HeaderValue::from_static("Push Hook"));
        assert_eq!(Provider::detect(&headers), Some(Provider::GitLab));
        assert_eq!(
            Provider::GitLab.event_name(&headers).as_deref(),
            Some("Push Hook")
        );
        assert_eq!(Provider::Travis.event_name(&headers).as_deref(), Some("build"));
    }

    #[test]
    fn parses_project_path() {
        assert_eq!(
            ProjectPath::parse("/group/project"),
            Some(ProjectPath {
                group: "group".into(),
                project: Some("project".into())
            })
        );
        assert_eq!(
            ProjectPath::parse("/group"),
            Some(ProjectPath {
                group: "group".into(),
                project: None
            })
        );
        assert_eq!(
            ProjectPath::parse("/group/sub/project").unwrap().project.as_deref(),
            Some("sub/project")
        );
        assert_eq!(ProjectPath::parse("/group/").unwrap().project, None);
        assert_eq!(ProjectPath::parse("/"), None);
        assert_eq!(ProjectPath::parse(""), None);
    }

    #[test]
    fn registry_lookup_and_conflicts() {
        let mut registry = Registry::standard().unwrap();
        assert_eq!(
            registry.lookup(Provider::GitHub, "push"),
            Some(Normalizer::GithubPush)
        );
        assert_eq!(registry.lookup(Provider::GitHub, "Push Hook"), None);
        assert_eq!(registry.lookup(Provider::GitHub, "star"), None);

        assert!(
            registry
                .register(Provider::GitHub, "push", Normalizer::GithubPush)
                .is_err()
        );
        assert!(
            registry
                .register(Provider::GitLab, "Pipeline Hook", Normalizer::GithubPush)
                .is_err()
        );
    }

    #[test]
    fn reads_payload_commits() {
        let commits = vec![
            json!({
                "id": "abc",
                "message": "Add things",
                "url": "https://example.com/c/abc",
                "author": {"name": "Alice", "email": "a@example.com", "username": "alice"},
                "added": ["src/new.rs"],
                "modified": ["src/lib.rs"],
                "removed": []
            }),
            json!({"id": "broken"}),
        ];

        let pushed = pushed_commits(&commits);
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].commit.changed_paths, vec!["src/new.rs", "src/lib.rs"]);
        assert_eq!(pushed[0].commit.author.username.as_deref(), Some("alice"));
        assert_eq!(pushed[0].url.as_deref(), Some("https://example.com/c/abc"));
    }
}
