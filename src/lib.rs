//! Turns git activity into notification events.
//!
//! Two front ends share one event pipeline: the `git-eventc-post-receive`
//! hook walks pushed ref ranges in a local repository, and the
//! `git-eventc-webhook` server normalizes GitHub, GitLab and Travis CI
//! payloads. Both emit [`event::Event`]s through a [`notify::Notifier`].

pub mod config;
pub mod emitter;
pub mod error;
pub mod event;
pub mod http;
pub mod logging;
pub mod message;
pub mod notify;
pub mod paths;
pub mod post_receive;
pub mod push;
pub mod refs;
pub mod repo;
pub mod server;
pub mod shortener;
pub mod webhook;

#[cfg(test)]
mod test_utils;

pub use config::EventcConfig;
pub use error::{EventcError, Result};
pub use server::{AppState, SharedState};
