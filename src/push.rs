//! Commit emission shared by the post-receive hook and the webhook providers.

use crate::event::{EventBase, EventKind};
use crate::message::split_message;
use crate::notify::Notifier;
use crate::paths::summarize_paths;
use crate::repo::Commit;

/// A push of `count` commits is reported as one commit-group event when this
/// holds, and commit by commit otherwise.
pub fn is_group(count: usize, threshold: usize) -> bool {
    count >= threshold
}

/// A commit about to be emitted, with its web URL when one is known.
#[derive(Debug, Clone)]
pub struct PushedCommit {
    pub commit: Commit,
    pub url: Option<String>,
}

pub async fn emit_commit(notifier: &Notifier, base: &EventBase, branch: &str, pushed: PushedCommit) {
    let PushedCommit { commit, url } = pushed;
    let (subject, body) = split_message(&commit.message);
    let kind = EventKind::Commit {
        id: notifier.commit_id(&commit.id),
        subject: subject.to_string(),
        body: body.map(String::from),
        author: commit.author.clone(),
        branch: branch.to_string(),
        files: summarize_paths(&commit.changed_paths),
    };
    notifier.send(base, url, kind).await;
}

/// Emits either one commit-group event or one commit event per commit.
///
/// `commits` is only called when commits are emitted individually, so large
/// pushes never load commit details.
pub async fn emit_commits<F, I>(
    notifier: &Notifier,
    base: &EventBase,
    branch: &str,
    count: usize,
    threshold: usize,
    group_url: Option<String>,
    commits: F,
) where
    F: FnOnce() -> I,
    I: Iterator<Item = PushedCommit>,
{
    if count == 0 {
        return;
    }

    if is_group(count, threshold) {
        let kind = EventKind::CommitGroup {
            size: count,
            branch: branch.to_string(),
        };
        notifier.send(base, group_url, kind).await;
        return;
    }

    for pushed in commits() {
        emit_commit(notifier, base, branch, pushed).await;
    }
}
