//! Provider API lookups that complete a payload.
//!
//! Every lookup is best effort: failures are logged and the caller falls back
//! to what the payload already carries.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::payload::PayloadExt;
use crate::http::HttpClient;

#[derive(Clone)]
pub struct ApiLookup {
    client: Arc<dyn HttpClient>,
    headers: Vec<(String, String)>,
}

impl ApiLookup {
    pub fn new(client: Arc<dyn HttpClient>, headers: Vec<(String, String)>) -> Self {
        Self { client, headers }
    }

    pub async fn get_json(&self, url: &str) -> Option<Value> {
        let response = match self.client.get(url, &self.headers).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Couldn't get {}: {}", url, e);
                return None;
            }
        };
        if response.status != 200 {
            warn!("Couldn't get {}: status {}", url, response.status);
            return None;
        }
        match serde_json::from_str(&response.body) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Couldn't parse answer to {}: {}", url, e);
                None
            }
        }
    }

    /// Full profile of `user` fetched from its `url`, or `user` itself.
    pub async fn user(&self, user: &Value) -> Value {
        let Some(url) = user.opt_str("url") else {
            return user.clone();
        };
        match self.get_json(url).await {
            Some(profile) if profile.is_object() => profile,
            _ => user.clone(),
        }
    }

    /// Tag listed right after the newest one in the repository tag list.
    pub async fn previous_tag(&self, repository: &Value) -> Option<String> {
        let url = repository.opt_str("tags_url")?;
        let tags = self.get_json(url).await?;
        let previous = tags
            .as_array()
            .and_then(|tags| tags.get(1))
            .and_then(|tag| tag.opt_str("name"))
            .map(String::from);
        debug!("Previous tag from {}: {:?}", url, previous);
        previous
    }
}
