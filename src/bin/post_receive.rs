//! `post-receive` hook: reads `<old> <new> <ref>` lines on stdin and sends
//! the matching events for the repository it runs in.

use git_eventc::config::{EventcConfig, load_from_env};
use git_eventc::emitter::{EventEmitter, LogEmitter, TcpEmitter};
use git_eventc::http::ReqwestClient;
use git_eventc::logging::setup_logging;
use git_eventc::notify::Notifier;
use git_eventc::post_receive::{HookSettings, PostReceive};
use git_eventc::repo::GitRepository;
use git_eventc::shortener::UrlShortener;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const EXIT_INIT: i32 = 1;
const EXIT_REPOSITORY: i32 = 2;
const EXIT_TRANSPORT: i32 = 3;

fn repository_path() -> PathBuf {
    std::env::var_os("GIT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

async fn run(config: EventcConfig, repo: GitRepository) -> i32 {
    let (transport, transport_handle) = match &config.notify.host {
        Some(host) => {
            let timeout = Duration::from_secs(config.notify.connect_timeout_secs);
            match TcpEmitter::connect(host, timeout).await {
                Ok((emitter, handle)) => (Arc::new(emitter) as Arc<dyn EventEmitter>, Some(handle)),
                Err(e) => {
                    error!("{}", e);
                    return EXIT_TRANSPORT;
                }
            }
        }
        None => (Arc::new(LogEmitter) as Arc<dyn EventEmitter>, None),
    };

    let client = match ReqwestClient::new(Duration::from_secs(config.shortener.timeout_secs)) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return EXIT_INIT;
        }
    };
    let shortener = UrlShortener::new(&config.shortener, Arc::new(client));
    let notifier = Notifier::new(transport, shortener, config.commit_id_size);

    let settings = HookSettings::resolve(&config.hook, &repo, |key| std::env::var(key).ok());
    info!(
        "Processing push to {} by {}",
        settings.repository_name, settings.pusher
    );

    let hook = PostReceive::new(
        &repo,
        settings,
        notifier,
        config.merge_threshold,
        config.diff.options(),
    );
    let result = hook.process_input(std::io::stdin().lock()).await;
    drop(hook);

    if let Some(handle) = transport_handle {
        handle.finish().await;
    }

    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            EXIT_REPOSITORY
        }
    }
}

fn main() {
    dotenv::dotenv().ok();

    let config = match load_from_env(|key| std::env::var(key).ok()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            exit(EXIT_INIT);
        }
    };

    let log_guard = match setup_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging error: {}", e);
            exit(EXIT_INIT);
        }
    };

    let path = repository_path();
    let repo = match GitRepository::open(&path) {
        Ok(repo) => repo,
        Err(e) => {
            error!("Couldn't open repository {}: {}", path.display(), e);
            exit(EXIT_REPOSITORY);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            exit(EXIT_INIT);
        }
    };

    let code = runtime.block_on(run(config, repo));
    drop(runtime);
    // exit() skips destructors; flush file logs first
    drop(log_guard);
    exit(code);
}
