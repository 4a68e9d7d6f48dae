//! GitHub `push`, `issues` and `pull_request` events.

use serde_json::Value;
use tracing::debug;

use super::payload::PayloadExt;
use super::{pushed_commits, WebhookContext};
use crate::error::Result;
use crate::event::{Author, BugReportAction, EventKind, MergeRequestAction, Pusher};
use crate::push::emit_commits;

const BRANCH_PREFIX: &str = "refs/heads/";
const TAG_PREFIX: &str = "refs/tags/";

/// Sender of the event, with the real name from its profile when available.
async fn pusher(ctx: &WebhookContext, payload: &Value) -> Result<Pusher> {
    let sender = ctx.api.user(payload.req_object("sender")?).await;
    Ok(Pusher::from_identity(
        sender.opt_str("name"),
        sender.req_str("login")?,
        sender.opt_str("email"),
    ))
}

async fn author(ctx: &WebhookContext, user: &Value) -> Result<Author> {
    let profile = ctx.api.user(user).await;
    let login = profile.req_str("login")?;
    Ok(Author {
        name: profile
            .opt_str("name")
            .filter(|name| !name.is_empty())
            .unwrap_or(login)
            .to_string(),
        email: profile.opt_str("email").map(String::from),
        username: Some(login.to_string()),
    })
}

fn label_names(labels: &[Value]) -> Vec<String> {
    labels
        .iter()
        .filter_map(|label| label.opt_str("name"))
        .map(String::from)
        .collect()
}

pub async fn push(ctx: &WebhookContext, payload: &Value) -> Result<()> {
    let reference = payload.req_str("ref")?;
    if let Some(branch) = reference.strip_prefix(BRANCH_PREFIX) {
        push_branch(ctx, payload, branch).await
    } else if let Some(tag) = reference.strip_prefix(TAG_PREFIX) {
        push_tag(ctx, payload, tag).await
    } else {
        debug!("Ignoring push to {}", reference);
        Ok(())
    }
}

async fn push_branch(ctx: &WebhookContext, payload: &Value, branch: &str) -> Result<()> {
    let repository = payload.req_object("repository")?;
    let base = ctx.base(repository, "url", pusher(ctx, payload).await?)?;
    let repository_url = repository.opt_str("url");
    let diff_url = payload.opt_str("compare").map(String::from);
    let notifier = &ctx.notifier;

    if payload.flag("created") {
        let url = repository_url.map(|url| format!("{}/tree/{}", url, branch));
        let kind = EventKind::BranchCreation {
            branch: branch.to_string(),
        };
        notifier.send(&base, url, kind).await;
    } else if payload.flag("deleted") {
        let kind = EventKind::BranchDeletion {
            branch: branch.to_string(),
        };
        notifier.send(&base, None, kind).await;
        let kind = EventKind::Push {
            branch: Some(branch.to_string()),
        };
        notifier.send(&base, diff_url, kind).await;
        return Ok(());
    }

    let commits = payload.array("commits");
    emit_commits(
        notifier,
        &base,
        branch,
        commits.len(),
        ctx.merge_threshold,
        diff_url.clone(),
        || pushed_commits(commits).into_iter(),
    )
    .await;

    let kind = EventKind::Push {
        branch: Some(branch.to_string()),
    };
    notifier.send(&base, diff_url, kind).await;
    Ok(())
}

async fn push_tag(ctx: &WebhookContext, payload: &Value, tag: &str) -> Result<()> {
    let repository = payload.req_object("repository")?;
    let base = ctx.base(repository, "url", pusher(ctx, payload).await?)?;
    let notifier = &ctx.notifier;

    if !payload.flag("created") {
        let kind = EventKind::TagDeletion {
            tag: tag.to_string(),
        };
        notifier.send(&base, None, kind).await;
    }

    if !payload.flag("deleted") {
        let url = repository
            .opt_str("url")
            .map(|url| format!("{}/releases/tag/{}", url, tag));
        let kind = EventKind::TagCreation {
            tag: tag.to_string(),
            previous_tag: ctx.api.previous_tag(repository).await,
        };
        notifier.send(&base, url, kind).await;
    }

    let url = payload.opt_str("compare").map(String::from);
    notifier.send(&base, url, EventKind::Push { branch: None }).await;
    Ok(())
}

pub async fn issues(ctx: &WebhookContext, payload: &Value) -> Result<()> {
    let action = match payload.req_str("action")? {
        "opened" => BugReportAction::Opening,
        "closed" => BugReportAction::Closing,
        "reopened" => BugReportAction::Reopening,
        other => {
            debug!("Ignoring issue action {}", other);
            return Ok(());
        }
    };

    let repository = payload.req_object("repository")?;
    let issue = payload.req_object("issue")?;
    let base = ctx.base(repository, "url", pusher(ctx, payload).await?)?;

    let kind = EventKind::BugReport {
        action,
        id: issue.req_u64("number")?,
        title: issue.req_str("title")?.to_string(),
        author: author(ctx, issue.req_object("user")?).await?,
        tags: label_names(issue.array("labels")),
    };
    let url = issue.opt_str("html_url").map(String::from);
    ctx.notifier.send(&base, url, kind).await;
    Ok(())
}

pub async fn pull_request(ctx: &WebhookContext, payload: &Value) -> Result<()> {
    let pull_request = payload.req_object("pull_request")?;
    let action = match payload.req_str("action")? {
        "opened" => MergeRequestAction::Opening,
        "closed" if pull_request.flag("merged") => MergeRequestAction::Merging,
        "closed" => MergeRequestAction::Closing,
        "reopened" => MergeRequestAction::Reopening,
        other => {
            debug!("Ignoring pull request action {}", other);
            return Ok(());
        }
    };

    let repository = payload.req_object("repository")?;
    let base = ctx.base(repository, "url", pusher(ctx, payload).await?)?;

    let kind = EventKind::MergeRequest {
        action,
        id: pull_request.req_u64("number")?,
        title: pull_request.req_str("title")?.to_string(),
        author: author(ctx, pull_request.req_object("user")?).await?,
        tags: label_names(pull_request.array("labels")),
        branch: pull_request
            .req_object("base")?
            .req_str("ref")?
            .to_string(),
    };
    let url = pull_request.opt_str("html_url").map(String::from);
    ctx.notifier.send(&base, url, kind).await;
    Ok(())
}
