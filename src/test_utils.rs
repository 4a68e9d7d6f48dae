//! Shared fakes for unit tests.

use async_trait::async_trait;
use std::cell::Cell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::ShortenerConfig;
use crate::emitter::MemoryEmitter;
use crate::error::{EventcError, Result};
use crate::event::Author;
use crate::http::{HttpClient, HttpMethod, HttpResponse};
use crate::notify::Notifier;
use crate::repo::{Commit, CommitIds, CommitRange, DiffOptions, Repository, WalkOrder};
use crate::shortener::UrlShortener;

/// A notifier that records events, with shortening disabled.
pub fn notifier_with(commit_id_size: usize) -> (Notifier, MemoryEmitter) {
    let emitter = MemoryEmitter::new();
    let shortener = UrlShortener::new(
        &ShortenerConfig {
            enabled: false,
            ..ShortenerConfig::default()
        },
        Arc::new(FakeHttp::new()),
    );
    let notifier = Notifier::new(Arc::new(emitter.clone()), shortener, commit_id_size);
    (notifier, emitter)
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
}

/// Canned responses keyed by URL. Unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct FakeHttp {
    responses: Mutex<HashMap<String, HttpResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.respond_with(
            url,
            HttpResponse {
                status,
                headers: HashMap::new(),
                body: body.to_string(),
            },
        );
    }

    pub fn respond_json(&self, url: &str, body: &serde_json::Value) {
        self.respond(url, 200, &body.to_string());
    }

    pub fn respond_with(&self, url: &str, response: HttpResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn answer(&self, request: RecordedRequest) -> Result<HttpResponse> {
        let response = self.responses.lock().unwrap().get(&request.url).cloned();
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        response.ok_or_else(|| EventcError::Http(format!("no route to {}", url)))
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        self.answer(RecordedRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: headers.to_vec(),
            form: Vec::new(),
        })
    }

    async fn send_form(
        &self,
        method: HttpMethod,
        url: &str,
        form: &[(String, String)],
    ) -> Result<HttpResponse> {
        self.answer(RecordedRequest {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            form: form.to_vec(),
        })
    }
}

/// In-memory commit graph.
pub struct FakeRepository {
    path: PathBuf,
    commits: HashMap<String, Commit>,
    paths: HashMap<String, Vec<String>>,
    tags: HashMap<String, Vec<String>>,
    config: HashMap<String, String>,
    fail_on: Option<String>,
    walks: Cell<usize>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("/srv/git/project.git"),
            commits: HashMap::new(),
            paths: HashMap::new(),
            tags: HashMap::new(),
            config: HashMap::new(),
            fail_on: None,
            walks: Cell::new(0),
        }
    }

    /// Commits `c1` (root) to `cN`, each touching `file<i>.txt`.
    pub fn linear(n: usize) -> Self {
        let mut repo = Self::new();
        for i in 1..=n {
            let parents = if i == 1 {
                vec![]
            } else {
                vec![format!("c{}", i - 1)]
            };
            repo.add_commit(
                &format!("c{}", i),
                parents,
                &format!("Commit {}\n\nBody of commit {}\n\nSigned-off-by: Dev <dev@example.com>\n", i, i),
                vec![format!("file{}.txt", i)],
            );
        }
        repo
    }

    pub fn add_commit(&mut self, id: &str, parents: Vec<String>, message: &str, paths: Vec<String>) {
        self.commits.insert(
            id.to_string(),
            Commit {
                id: id.to_string(),
                parents,
                author: Author {
                    name: "Dev".to_string(),
                    email: Some("dev@example.com".to_string()),
                    username: None,
                },
                message: message.to_string(),
                changed_paths: Vec::new(),
            },
        );
        self.paths.insert(id.to_string(), paths);
    }

    pub fn tag(&mut self, name: &str, id: &str) {
        self.tags
            .entry(id.to_string())
            .or_default()
            .push(name.to_string());
    }

    pub fn set_config(&mut self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    pub fn set_path(&mut self, path: &str) {
        self.path = PathBuf::from(path);
    }

    /// Makes walks fail when they reach `id`.
    pub fn fail_on(&mut self, id: &str) {
        self.fail_on = Some(id.to_string());
    }

    pub fn walk_count(&self) -> usize {
        self.walks.get()
    }

    fn ancestors(&self, start: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&id) {
                queue.extend(commit.parents.iter().cloned());
                order.push(id);
            }
        }
        order
    }
}

impl Repository for FakeRepository {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_bare(&self) -> bool {
        self.path.extension().is_some_and(|ext| ext == "git")
    }

    fn config_value(&self, key: &str) -> Option<String> {
        self.config.get(key).cloned()
    }

    fn resolve_commit(&self, rev: &str) -> Result<String> {
        if self.commits.contains_key(rev) {
            Ok(rev.to_string())
        } else {
            Err(EventcError::ObjectNotFound(rev.to_string()))
        }
    }

    fn rev_walk(&self, range: &CommitRange, order: WalkOrder) -> Result<CommitIds<'_>> {
        self.walks.set(self.walks.get() + 1);
        if !self.commits.contains_key(&range.new) {
            return Err(EventcError::ObjectNotFound(range.new.clone()));
        }

        let excluded: HashSet<String> = range
            .exclude
            .as_deref()
            .map(|id| self.ancestors(id).into_iter().collect())
            .unwrap_or_default();
        let mut ids: Vec<String> = self
            .ancestors(&range.new)
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .collect();
        if order == WalkOrder::Reverse {
            ids.reverse();
        }

        let fail_on = self.fail_on.clone();
        let items = ids
            .into_iter()
            .map(move |id| {
                if fail_on.as_deref() == Some(id.as_str()) {
                    Err(EventcError::ObjectNotFound(id))
                } else {
                    Ok(id)
                }
            })
            .scan(false, |failed, item| {
                if *failed {
                    return None;
                }
                *failed = item.is_err();
                Some(item)
            });
        Ok(Box::new(items))
    }

    fn commit(&self, id: &str) -> Result<Commit> {
        self.commits
            .get(id)
            .cloned()
            .ok_or_else(|| EventcError::ObjectNotFound(id.to_string()))
    }

    fn changed_paths(&self, commit: &Commit, _options: &DiffOptions) -> Result<Vec<String>> {
        Ok(self.paths.get(&commit.id).cloned().unwrap_or_default())
    }

    fn tag_targets(&self) -> Result<HashMap<String, Vec<String>>> {
        Ok(self.tags.clone())
    }
}
