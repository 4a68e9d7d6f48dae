use git_eventc::config::{HookConfig, ShortenerConfig};
use git_eventc::emitter::MemoryEmitter;
use git_eventc::error::{EventcError, Result};
use git_eventc::event::EventKind;
use git_eventc::http::{HttpClient, HttpMethod, HttpResponse};
use git_eventc::notify::Notifier;
use git_eventc::post_receive::{HookSettings, PostReceive};
use git_eventc::refs::ZERO_ID;
use git_eventc::repo::{CommitRange, DiffOptions, GitRepository, RangeWalker, Repository, previous_tag};
use git_eventc::shortener::UrlShortener;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tempfile::TempDir;

struct NoHttp;

#[async_trait::async_trait]
impl HttpClient for NoHttp {
    async fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<HttpResponse> {
        Err(EventcError::Http(url.to_string()))
    }

    async fn send_form(
        &self,
        _method: HttpMethod,
        url: &str,
        _form: &[(String, String)],
    ) -> Result<HttpResponse> {
        Err(EventcError::Http(url.to_string()))
    }
}

fn check_git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Runs git in `dir` isolated from the user's configuration.
fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=Test User", "-c", "user.email=test@example.com"])
        .args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_TERMINAL_PROMPT", "0")
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_file(dir: &Path, path: &str, content: &str, message: &str) -> String {
    let file = dir.join(path);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(file, content).unwrap();
    git(dir, &["add", path]);
    git(dir, &["commit", "-q", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

fn setup_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init", "-q", "-b", "main"]);
    dir
}

fn notifier(commit_id_size: usize) -> (Notifier, MemoryEmitter) {
    let emitter = MemoryEmitter::new();
    let shortener = UrlShortener::new(
        &ShortenerConfig {
            enabled: false,
            ..ShortenerConfig::default()
        },
        Arc::new(NoHttp),
    );
    (
        Notifier::new(Arc::new(emitter.clone()), shortener, commit_id_size),
        emitter,
    )
}

#[test]
fn opens_work_tree_and_bare_repositories() {
    if !check_git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let dir = setup_repo();
    let repo = GitRepository::open(dir.path()).unwrap();
    assert!(!repo.is_bare());
    assert_eq!(
        repo.path().canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );

    let bare = TempDir::new().unwrap();
    git(bare.path(), &["init", "-q", "--bare"]);
    let repo = GitRepository::open(bare.path()).unwrap();
    assert!(repo.is_bare());

    let not_a_repo = TempDir::new().unwrap();
    assert!(GitRepository::open(not_a_repo.path()).is_err());
}

#[test]
fn reads_commits_and_changed_paths() {
    if !check_git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let dir = setup_repo();
    let root = commit_file(
        dir.path(),
        "src/lib.rs",
        "pub fn answer() -> u32 {\n    42\n}\n",
        "Initial commit",
    );
    git(dir.path(), &["mv", "src/lib.rs", "src/main.rs"]);
    git(
        dir.path(),
        &["commit", "-q", "-m", "Rename library\n\nIt is a binary now.\n\nSigned-off-by: Test User <test@example.com>"],
    );
    let renamed = git(dir.path(), &["rev-parse", "HEAD"]);
    let third = commit_file(dir.path(), "docs/guide.md", "# Guide\n", "Add guide");

    let repo = GitRepository::open(dir.path()).unwrap();
    let options = DiffOptions {
        rename_threshold: Some(50),
        copy_threshold: Some(50),
    };

    let commit = repo.commit(&renamed).unwrap();
    assert_eq!(commit.parents, vec![root.clone()]);
    assert_eq!(commit.author.name, "Test User");
    assert_eq!(commit.author.email.as_deref(), Some("test@example.com"));
    assert!(commit.message.starts_with("Rename library\n"));
    assert_eq!(
        repo.changed_paths(&commit, &options).unwrap(),
        vec!["src/{lib.rs => main.rs}"]
    );

    let root_commit = repo.commit(&root).unwrap();
    assert_eq!(root_commit.parent_count(), 0);
    assert_eq!(
        repo.changed_paths(&root_commit, &options).unwrap(),
        vec!["src/lib.rs"]
    );

    let walker = RangeWalker::new(
        &repo,
        CommitRange {
            new: third.clone(),
            exclude: Some(root.clone()),
        },
    );
    assert_eq!(walker.count().unwrap(), 2);
    let ids: Vec<String> = walker.commits(options).unwrap().map(|c| c.id).collect();
    assert_eq!(ids, vec![renamed, third]);

    assert!(repo.resolve_commit("no-such-branch").is_err());
}

#[test]
fn finds_previous_annotated_tag() {
    if !check_git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let dir = setup_repo();
    let first = commit_file(dir.path(), "a.txt", "a\n", "First");
    git(dir.path(), &["tag", "-a", "v0.1", "-m", "Version 0.1"]);
    commit_file(dir.path(), "b.txt", "b\n", "Second");
    let third = commit_file(dir.path(), "c.txt", "c\n", "Third");
    git(dir.path(), &["tag", "v0.2"]);

    let repo = GitRepository::open(dir.path()).unwrap();
    assert_eq!(repo.resolve_commit("v0.1").unwrap(), first);
    let targets = repo.tag_targets().unwrap();
    assert_eq!(targets.get(&first), Some(&vec!["v0.1".to_string()]));

    assert_eq!(previous_tag(&repo, "v0.2", &third).as_deref(), Some("v0.1"));
    assert_eq!(previous_tag(&repo, "v0.1", &first), None);
}

#[tokio::test]
async fn hook_reports_a_push() {
    if !check_git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let dir = setup_repo();
    let base = commit_file(dir.path(), "README.md", "hello\n", "Initial commit");
    commit_file(dir.path(), "src/a.rs", "// a\n", "Add a");
    let head = commit_file(
        dir.path(),
        "src/b.rs",
        "// b\n",
        "Add b\n\nWith a body.\n\nReviewed-by: Someone <someone@example.com>",
    );
    git(dir.path(), &["config", "git-eventc.repository", "sandbox"]);
    git(dir.path(), &["config", "git-eventc.pusher", "alice"]);

    let repo = GitRepository::open(dir.path()).unwrap();
    let mut config = HookConfig::default();
    config.commit_url = Some("https://git.example.com/{repository}/commit/{id}".into());
    let settings = HookSettings::resolve(&config, &repo, |_| None);
    assert_eq!(settings.repository_name, "sandbox");
    assert_eq!(settings.pusher, "alice");

    let (notifier, emitter) = notifier(7);
    let hook = PostReceive::new(&repo, settings, notifier, 5, DiffOptions::default());
    let input = format!(
        "{} {} refs/heads/main\nnot a valid line\n{} {} refs/heads/topic\n",
        base, head, ZERO_ID, base
    );
    hook.process_input(input.as_bytes()).await.unwrap();

    assert_eq!(
        emitter.names(),
        vec!["commit", "commit", "push", "branch-creation", "commit", "push"]
    );
    let events = emitter.events();
    let EventKind::Commit {
        id,
        subject,
        body,
        files,
        ..
    } = &events[1].kind
    else {
        panic!("expected a commit event");
    };
    assert_eq!(id, &head[..7]);
    assert_eq!(subject, "Add b");
    assert_eq!(body.as_deref(), Some("With a body."));
    assert_eq!(files.as_deref(), Some("src/b.rs"));
    assert_eq!(
        events[1].base.url.as_deref(),
        Some(format!("https://git.example.com/sandbox/commit/{}", head).as_str())
    );
    assert_eq!(events[1].base.pusher.name, "alice");
}
