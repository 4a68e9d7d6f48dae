//! GitLab push, tag push, issue and merge request hooks.

use serde_json::Value;
use tracing::debug;

use super::payload::PayloadExt;
use super::{pushed_commits, WebhookContext};
use crate::error::{EventcError, Result};
use crate::event::{Author, BugReportAction, EventKind, MergeRequestAction, Pusher};
use crate::push::emit_commits;
use crate::refs::is_zero_id;

const BRANCH_PREFIX: &str = "refs/heads/";
const TAG_PREFIX: &str = "refs/tags/";

/// Push hooks carry the user as flat `user_*` fields.
fn push_pusher(payload: &Value) -> Result<Pusher> {
    Ok(Pusher::from_identity(
        payload.opt_str("user_name"),
        payload.req_str("user_username")?,
        payload.opt_str("user_email"),
    ))
}

/// Issue and merge request hooks carry a `user` object.
fn user_pusher(user: &Value) -> Result<Pusher> {
    Ok(Pusher::from_identity(
        user.opt_str("name"),
        user.req_str("username")?,
        user.opt_str("email"),
    ))
}

fn user_author(user: &Value) -> Result<Author> {
    let username = user.req_str("username")?;
    Ok(Author {
        name: user.opt_str("name").unwrap_or(username).to_string(),
        email: user.opt_str("email").map(String::from),
        username: Some(username.to_string()),
    })
}

fn label_titles(payload: &Value) -> Vec<String> {
    payload
        .array("labels")
        .iter()
        .filter_map(|label| label.opt_str("title"))
        .map(String::from)
        .collect()
}

fn stripped<'a>(reference: &'a str, prefix: &str) -> Result<&'a str> {
    reference
        .strip_prefix(prefix)
        .ok_or_else(|| EventcError::MalformedInput(format!("unexpected ref {}", reference)))
}

pub async fn push(ctx: &WebhookContext, payload: &Value) -> Result<()> {
    let branch = stripped(payload.req_str("ref")?, BRANCH_PREFIX)?;
    let project = payload.req_object("project")?;
    let base = ctx.base(project, "git_http_url", push_pusher(payload)?)?;
    let web_url = project.opt_str("web_url");
    let before = payload.req_str("before")?;
    let after = payload.req_str("after")?;
    let diff_url = web_url.map(|url| format!("{}/compare/{}...{}", url, before, after));
    let notifier = &ctx.notifier;

    if is_zero_id(before) {
        let url = web_url.map(|url| format!("{}/tree/{}", url, branch));
        let kind = EventKind::BranchCreation {
            branch: branch.to_string(),
        };
        notifier.send(&base, url, kind).await;
    } else if is_zero_id(after) {
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

    // The commits array is capped at 20 entries; the real size is separate.
    let commits = payload.array("commits");
    let count = payload
        .opt_u64("total_commits_count")
        .map(|count| count as usize)
        .unwrap_or(commits.len());
    emit_commits(
        notifier,
        &base,
        branch,
        count,
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

pub async fn tag_push(ctx: &WebhookContext, payload: &Value) -> Result<()> {
    let tag = stripped(payload.req_str("ref")?, TAG_PREFIX)?;
    let project = payload.req_object("project")?;
    let base = ctx.base(project, "git_http_url", push_pusher(payload)?)?;
    let web_url = project.opt_str("web_url");
    let notifier = &ctx.notifier;

    if !is_zero_id(payload.req_str("before")?) {
        let kind = EventKind::TagDeletion {
            tag: tag.to_string(),
        };
        notifier.send(&base, None, kind).await;
    }
    if !is_zero_id(payload.req_str("after")?) {
        let url = web_url.map(|url| format!("{}/-/tags/{}", url, tag));
        let kind = EventKind::TagCreation {
            tag: tag.to_string(),
            previous_tag: None,
        };
        notifier.send(&base, url, kind).await;
    }

    let url = web_url.map(|url| format!("{}/-/tags", url));
    notifier.send(&base, url, EventKind::Push { branch: None }).await;
    Ok(())
}

pub async fn issue(ctx: &WebhookContext, payload: &Value) -> Result<()> {
    let attributes = payload.req_object("object_attributes")?;
    let action = match attributes.opt_str("action").unwrap_or_default() {
        "open" => BugReportAction::Opening,
        "close" => BugReportAction::Closing,
        "reopen" => BugReportAction::Reopening,
        other => {
            debug!("Ignoring issue action '{}'", other);
            return Ok(());
        }
    };

    let user = payload.req_object("user")?;
    let project = payload.req_object("project")?;
    let base = ctx.base(project, "git_http_url", user_pusher(user)?)?;

    let kind = EventKind::BugReport {
        action,
        id: attributes.req_u64("iid")?,
        title: attributes.req_str("title")?.to_string(),
        author: user_author(user)?,
        tags: label_titles(payload),
    };
    let url = attributes.opt_str("url").map(String::from);
    ctx.notifier.send(&base, url, kind).await;
    Ok(())
}

pub async fn merge_request(ctx: &WebhookContext, payload: &Value) -> Result<()> {
    let attributes = payload.req_object("object_attributes")?;
    let action = match attributes.opt_str("action").unwrap_or_default() {
        "open" => MergeRequestAction::Opening,
        "close" => MergeRequestAction::Closing,
        "reopen" => MergeRequestAction::Reopening,
        "merge" => MergeRequestAction::Merging,
        other => {
            debug!("Ignoring merge request action '{}'", other);
            return Ok(());
        }
    };

    let user = payload.req_object("user")?;
    let project = payload.req_object("project")?;
    let base = ctx.base(project, "git_http_url", user_pusher(user)?)?;

    let kind = EventKind::MergeRequest {
        action,
        id: attributes.req_u64("iid")?,
        title: attributes.req_str("title")?.to_string(),
        author: user_author(user)?,
        tags: label_titles(payload),
        branch: attributes.req_str("target_branch")?.to_string(),
    };
    let url = attributes.opt_str("url").map(String::from);
    ctx.notifier.send(&base, url, kind).await;
    Ok(())
}
