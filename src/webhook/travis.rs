//! Travis CI build notifications.

use serde_json::Value;
use tracing::{debug, warn};

use super::payload::PayloadExt;
use super::WebhookContext;
use crate::error::Result;
use crate::event::{BuildPullRequest, CiBuildAction, EventKind, Pusher};

/// Travis CI only notifies about builds and sends no event header.
pub const BUILD_EVENT: &str = "build";

const DEFAULT_PUSHER: &str = "Travis CI";

pub fn build_action(state: &str) -> Option<CiBuildAction> {
    match state.to_ascii_lowercase().as_str() {
        "passed" | "fixed" => Some(CiBuildAction::Success),
        "failed" | "broken" | "still failing" => Some(CiBuildAction::Failure),
        "errored" | "canceled" => Some(CiBuildAction::Error),
        _ => None,
    }
}

/// Build number, sent as a decimal string.
fn build_number(payload: &Value) -> Option<u64> {
    match payload.field("number")? {
        Value::String(number) => number.parse().ok(),
        other => other.as_u64(),
    }
}

pub async fn build(ctx: &WebhookContext, payload: &Value) -> Result<()> {
    // `status_message` carries the transition ("Fixed", "Still Failing"),
    // `state` only the raw outcome.
    let state = payload
        .opt_str("status_message")
        .or_else(|| payload.opt_str("state"))
        .unwrap_or_default();
    let Some(action) = build_action(state) else {
        debug!("Ignoring build in state '{}'", state);
        return Ok(());
    };
    let Some(id) = build_number(payload) else {
        warn!("Ignoring build without a valid number");
        return Ok(());
    };

    let pusher = payload
        .opt_str("committer_name")
        .or_else(|| payload.opt_str("author_name"))
        .unwrap_or(DEFAULT_PUSHER);
    let repository = payload.req_object("repository")?;
    let base = ctx.base(repository, "url", Pusher::named(pusher))?;

    let pull_request = if payload.flag("pull_request") {
        Some(BuildPullRequest {
            id: payload.req_u64("pull_request_number")?,
            title: payload.req_str("pull_request_title")?.to_string(),
            url: payload.opt_str("compare_url").map(String::from),
        })
    } else {
        None
    };

    let kind = EventKind::CiBuild {
        action,
        id,
        branch: payload.req_str("branch")?.to_string(),
        duration: payload.opt_u64("duration").unwrap_or(0),
        pull_request,
    };
    let url = payload.opt_str("build_url").map(String::from);
    ctx.notifier.send(&base, url, kind).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::MemoryEmitter;
    use crate::test_utils::{notifier_with, FakeHttp};
    use crate::webhook::enrich::ApiLookup;
    use crate::webhook::ProjectPath;
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> (WebhookContext, MemoryEmitter) {
        let (notifier, emitter) = notifier_with(7);
        let ctx = WebhookContext {
            notifier,
            api: ApiLookup::new(Arc::new(FakeHttp::new()), Vec::new()),
            project: ProjectPath {
                group: "ci".into(),
                project: None,
            },
            merge_threshold: 5,
        };
        (ctx, emitter)
    }

    fn payload() -> Value {
        json!({
            "number": "912",
            "state": "passed",
            "status_message": "Passed",
            "branch": "master",
            "duration": 115,
            "build_url": "https://travis-ci.org/svenfuchs/minimal/builds/1",
            "committer_name": "Sven Fuchs",
            "pull_request": false,
            "repository": {
                "name": "minimal",
                "url": "https://github.com/svenfuchs/minimal"
            }
        })
    }

    #[test]
    fn maps_build_states() {
        assert_eq!(build_action("Fixed"), Some(CiBuildAction::Success));
        assert_eq!(build_action("Still Failing"), Some(CiBuildAction::Failure));
        assert_eq!(build_action("canceled"), Some(CiBuildAction::Error));
        assert_eq!(build_action("started"), None);
        assert_eq!(build_action("Pending"), None);
    }

    #[tokio::test]
    async fn passed_build() {
        let (ctx, emitter) = context();
        build(&ctx, &payload()).await.unwrap();

        let events = emitter.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            EventKind::CiBuild {
                action: CiBuildAction::Success,
                id: 912,
                branch: "master".into(),
                duration: 115,
                pull_request: None,
            }
        );
        assert_eq!(events[0].base.pusher.name, "Sven Fuchs");
        assert_eq!(
            events[0].base.url.as_deref(),
            Some("https://travis-ci.org/svenfuchs/minimal/builds/1")
        );
    }

    #[tokio::test]
    async fn pull_request_build() {
        let (ctx, emitter) = context();
        let mut payload = payload();
        payload["pull_request"] = json!(true);
        payload["pull_request_number"] = json!(3);
        payload["pull_request_title"] = json!("Update README");
        payload["compare_url"] = json!("https://github.com/svenfuchs/minimal/pull/3");
        payload["status_message"] = json!("Broken");

        build(&ctx, &payload).await.unwrap();

        let EventKind::CiBuild {
            action,
            pull_request,
            ..
        } = &emitter.events()[0].kind
        else {
            panic!("expected a ci build event");
        };
        assert_eq!(*action, CiBuildAction::Failure);
        assert_eq!(
            pull_request,
            &Some(BuildPullRequest {
                id: 3,
                title: "Update README".into(),
                url: Some("https://github.com/svenfuchs/minimal/pull/3".into()),
            })
        );
    }

    #[tokio::test]
    async fn invalid_number_or_state_is_skipped() {
        let (ctx, emitter) = context();
        let mut bad_number = payload();
        bad_number["number"] = json!("12a");
        build(&ctx, &bad_number).await.unwrap();

        let mut pending = payload();
        pending["status_message"] = json!("Pending");
        pending["state"] = json!("started");
        build(&ctx, &pending).await.unwrap();

        assert!(emitter.events().is_empty());
    }
}
