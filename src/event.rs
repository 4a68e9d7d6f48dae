//! Canonical notification events.
//!
//! Every provider and the local hook reduce their input to these types. An
//! [`Event`] is an [`EventBase`] (who pushed where) plus an [`EventKind`]
//! carrying the fields specific to that kind of notification.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// The person or bot that triggered the notification.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Pusher {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Pusher {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            username: None,
            email: None,
        }
    }

    /// Display name in the `Name (login)` form, or whichever of the two is
    /// known. Both empty gives an empty name.
    pub fn from_identity(name: Option<&str>, login: &str, email: Option<&str>) -> Self {
        let name = name.filter(|n| !n.is_empty());
        let login = Some(login).filter(|l| !l.is_empty());
        let display = match (name, login) {
            (Some(name), Some(login)) => format!("{} ({})", name, login),
            (Some(name), None) => name.to_string(),
            (None, Some(login)) => login.to_string(),
            (None, None) => String::new(),
        };
        Self {
            name: display,
            username: login.map(String::from),
            email: email.map(String::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Fields shared by every event emitted for one push or webhook.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventBase {
    pub repository_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_group: Option<String>,
    pub project_name: String,
    pub pusher: Pusher,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_data: BTreeMap<String, String>,
}

impl EventBase {
    pub fn new(repository_name: impl Into<String>, pusher: Pusher) -> Self {
        let repository_name = repository_name.into();
        Self {
            project_name: repository_name.clone(),
            repository_name,
            repository_url: None,
            project_group: None,
            pusher,
            url: None,
            extra_data: BTreeMap::new(),
        }
    }

    pub fn with_repository_url(mut self, url: Option<String>) -> Self {
        self.repository_url = url;
        self
    }

    /// Sets the project; the name keeps falling back to the repository name.
    pub fn with_project(mut self, group: Option<String>, name: Option<String>) -> Self {
        self.project_group = group;
        if let Some(name) = name {
            self.project_name = name;
        }
        self
    }

    pub fn with_extra_data(mut self, extra_data: BTreeMap<String, String>) -> Self {
        self.extra_data = extra_data;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BugReportAction {
    Opening,
    Closing,
    Reopening,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MergeRequestAction {
    Opening,
    Closing,
    Reopening,
    Merging,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CiBuildAction {
    Success,
    Failure,
    Error,
}

/// Pull request a CI build ran for.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuildPullRequest {
    pub id: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum EventKind {
    BranchCreation {
        branch: String,
    },
    BranchDeletion {
        branch: String,
    },
    TagCreation {
        tag: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_tag: Option<String>,
    },
    TagDeletion {
        tag: String,
    },
    Commit {
        id: String,
        subject: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        author: Author,
        branch: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        files: Option<String>,
    },
    CommitGroup {
        size: usize,
        branch: String,
    },
    Push {
        #[serde(skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    BugReport {
        action: BugReportAction,
        id: u64,
        title: String,
        author: Author,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    },
    MergeRequest {
        action: MergeRequestAction,
        id: u64,
        title: String,
        author: Author,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
        branch: String,
    },
    CiBuild {
        action: CiBuildAction,
        id: u64,
        branch: String,
        duration: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        pull_request: Option<BuildPullRequest>,
    },
}

impl EventKind {
    /// Wire name of the event, e.g. `commit-group`.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::BranchCreation { .. } => "branch-creation",
            EventKind::BranchDeletion { .. } => "branch-deletion",
            EventKind::TagCreation { .. } => "tag-creation",
            EventKind::TagDeletion { .. } => "tag-deletion",
            EventKind::Commit { .. } => "commit",
            EventKind::CommitGroup { .. } => "commit-group",
            EventKind::Push { .. } => "push",
            EventKind::BugReport { .. } => "bug-report",
            EventKind::MergeRequest { .. } => "merge-request",
            EventKind::CiBuild { .. } => "ci-build",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Event {
    #[serde(flatten)]
    pub base: EventBase,
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(base: EventBase, kind: EventKind) -> Self {
        Self {
            base,
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}
