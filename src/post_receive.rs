//! Post-receive hook processing.
//!
//! Git feeds the hook one `<old> <new> <ref>` line per updated ref. Every line
//! is turned into events, in order: lifecycle event, commits (or one
//! commit-group), then the push event.

use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::{debug, info, warn};

use crate::config::HookConfig;
use crate::error::Result;
use crate::event::{EventBase, EventKind, Pusher};
use crate::notify::Notifier;
use crate::push::{PushedCommit, emit_commits};
use crate::refs::{RefChange, RefKind, RefUpdate};
use crate::repo::{CommitRange, DiffOptions, RangeWalker, Repository, previous_tag};

const CONFIG_SECTION: &str = "git-eventc";
const DEFAULT_PUSHER: &str = "Jane Doe";

/// Replaces `{name}` placeholders in a URL template.
pub fn expand_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |url, (name, value)| {
            url.replace(&format!("{{{}}}", name), value)
        })
}

/// Everything the hook needs to know about the repository it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSettings {
    pub repository_name: String,
    pub repository_url: Option<String>,
    pub project_group: Option<String>,
    pub project_name: Option<String>,
    pub pusher: String,
    pub commit_url: Option<String>,
    pub diff_url: Option<String>,
    pub branch_url: Option<String>,
    pub tag_url: Option<String>,
    pub extra_data: BTreeMap<String, String>,
}

fn guess_repository_name(repo: &dyn Repository) -> String {
    let name = repo
        .path()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = if repo.is_bare() {
        name.strip_suffix(".git").map(String::from).unwrap_or(name)
    } else {
        name
    };
    if name.is_empty() {
        "repository".to_string()
    } else {
        name
    }
}

impl HookSettings {
    /// Resolves settings from the gitolite environment, the repository
    /// configuration and the configuration file, in that order.
    pub fn resolve(
        config: &HookConfig,
        repo: &dyn Repository,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let lookup = |key: &str, file_value: &Option<String>| {
            repo.config_value(&format!("{}.{}", CONFIG_SECTION, key))
                .or_else(|| file_value.clone())
                .filter(|value| !value.is_empty())
        };

        let repository_name = env("GL_REPO")
            .filter(|name| !name.is_empty())
            .or_else(|| lookup("repository", &config.repository_name))
            .unwrap_or_else(|| guess_repository_name(repo));

        let pusher = env("GL_USER")
            .filter(|name| !name.is_empty())
            .or_else(|| lookup("pusher", &config.pusher))
            .unwrap_or_else(|| DEFAULT_PUSHER.to_string());

        Self {
            repository_name,
            repository_url: lookup("repository-url", &config.repository_url),
            project_group: lookup("project-group", &config.project_group),
            project_name: lookup("project", &config.project_name),
            pusher,
            commit_url: lookup("commit-url", &config.commit_url),
            diff_url: lookup("diff-url", &config.diff_url),
            branch_url: lookup("branch-url", &config.branch_url),
            tag_url: lookup("tag-url", &config.tag_url),
            extra_data: config.extra_data.clone(),
        }
    }

    pub fn event_base(&self) -> EventBase {
        EventBase::new(&self.repository_name, Pusher::named(&self.pusher))
            .with_repository_url(self.repository_url.clone())
            .with_project(self.project_group.clone(), self.project_name.clone())
            .with_extra_data(self.extra_data.clone())
    }

    fn url(&self, template: &Option<String>, values: &[(&str, &str)]) -> Option<String> {
        let mut all = vec![("repository", self.repository_name.as_str())];
        all.extend_from_slice(values);
        template
            .as_deref()
            .map(|template| expand_template(template, &all))
    }
}

pub struct PostReceive<'a> {
    repo: &'a dyn Repository,
    settings: HookSettings,
    notifier: Notifier,
    merge_threshold: usize,
    diff: DiffOptions,
}

impl<'a> PostReceive<'a> {
    pub fn new(
        repo: &'a dyn Repository,
        settings: HookSettings,
        notifier: Notifier,
        merge_threshold: usize,
        diff: DiffOptions,
    ) -> Self {
        Self {
            repo,
            settings,
            notifier,
            merge_threshold,
            diff,
        }
    }

    /// Processes every line of hook input. Malformed lines are skipped; a
    /// failing ref does not prevent the following ones from being processed.
    /// The last failure is returned.
    pub async fn process_input(&self, input: impl BufRead) -> Result<()> {
        let mut result = Ok(());
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let update = match RefUpdate::parse_line(&line) {
                Ok(update) => update,
                Err(e) => {
                    warn!("Skipping hook input: {}", e);
                    continue;
                }
            };
            if let Err(e) = self.process(&update).await {
                warn!("Couldn't process {}: {}", update.ref_name, e);
                result = Err(e);
            }
        }
        result
    }

    pub async fn process(&self, update: &RefUpdate) -> Result<()> {
        let Some(change) = update.change() else {
            debug!("Ignoring {}: both ids are zero", update.ref_name);
            return Ok(());
        };

        match update.kind() {
            RefKind::Branch(branch) => self.process_branch(update, &branch, change).await,
            RefKind::Tag(tag) => self.process_tag(update, &tag, change).await,
            RefKind::Other => {
                debug!("Ignoring {}", update.ref_name);
                Ok(())
            }
        }
    }

    async fn process_branch(&self, update: &RefUpdate, branch: &str, change: RefChange) -> Result<()> {
        let base = self.settings.event_base();
        let branch_url = self.settings.url(&self.settings.branch_url, &[("branch", branch)]);
        let push_kind = EventKind::Push {
            branch: Some(branch.to_string()),
        };

        match change {
            RefChange::Delete => {
                let kind = EventKind::BranchDeletion {
                    branch: branch.to_string(),
                };
                self.notifier.send(&base, None, kind).await;
                self.notifier.send(&base, None, push_kind).await;
                return Ok(());
            }
            RefChange::Create => {
                let kind = EventKind::BranchCreation {
                    branch: branch.to_string(),
                };
                self.notifier.send(&base, branch_url, kind).await;
            }
            RefChange::Update => {}
        }

        let new_id = self.repo.resolve_commit(&update.new_id)?;
        let walker = RangeWalker::new(
            self.repo,
            CommitRange {
                new: new_id,
                exclude: update.exclude_id().map(String::from),
            },
        );
        let count = walker.count()?;
        info!("{} commit(s) pushed to {}", count, branch);

        let diff_url = self.settings.url(
            &self.settings.diff_url,
            &[
                ("before", update.old_id.as_str()),
                ("after", update.new_id.as_str()),
            ],
        );
        emit_commits(
            &self.notifier,
            &base,
            branch,
            count,
            self.merge_threshold,
            diff_url.clone(),
            || {
                walker
                    .commits(self.diff)
                    .map_err(|e| warn!("Couldn't walk {}: {}", branch, e))
                    .ok()
                    .into_iter()
                    .flatten()
                    .map(|commit| PushedCommit {
                        url: self.settings.url(&self.settings.commit_url, &[("id", commit.id.as_str())]),
                        commit,
                    })
            },
        )
        .await;

        self.notifier.send(&base, diff_url, push_kind).await;
        Ok(())
    }

    async fn process_tag(&self, update: &RefUpdate, tag: &str, change: RefChange) -> Result<()> {
        let base = self.settings.event_base();
        let push_kind = EventKind::Push { branch: None };

        if matches!(change, RefChange::Delete | RefChange::Update) {
            let kind = EventKind::TagDeletion {
                tag: tag.to_string(),
            };
            self.notifier.send(&base, None, kind).await;
        }

        if matches!(change, RefChange::Create | RefChange::Update) {
            let commit = self.repo.resolve_commit(&update.new_id)?;
            let kind = EventKind::TagCreation {
                tag: tag.to_string(),
                previous_tag: previous_tag(self.repo, tag, &commit),
            };
            let tag_url = self.settings.url(&self.settings.tag_url, &[("tag", tag)]);
            self.notifier.send(&base, tag_url, kind).await;
        }

        self.notifier.send(&base, None, push_kind).await;
        Ok(())
    }
}
