use git_eventc::config::load_from_env;
use git_eventc::emitter::{BroadcastEmitter, EventEmitter, FanoutEmitter, LogEmitter, TcpEmitter};
use git_eventc::http::{HttpClient, ReqwestClient};
use git_eventc::logging::setup_logging;
use git_eventc::notify::Notifier;
use git_eventc::server::{AppState, router};
use git_eventc::shortener::UrlShortener;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const EXIT_CONFIG: i32 = 1;
const EXIT_TRANSPORT: i32 = 2;
const EXIT_LISTENER: i32 = 3;

const EVENT_STREAM_CAPACITY: usize = 256;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm => {}
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config = match load_from_env(|key| std::env::var(key).ok()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            exit(EXIT_CONFIG);
        }
    };

    let _log_guard = match setup_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging error: {}", e);
            exit(EXIT_CONFIG);
        }
    };

    let clients = ReqwestClient::new(Duration::from_secs(config.webhook.api_timeout_secs))
        .and_then(|api| {
            ReqwestClient::new(Duration::from_secs(config.shortener.timeout_secs))
                .map(|shortener| (api, shortener))
        });
    let (api_client, shortener_client) = match clients {
        Ok(clients) => clients,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            exit(EXIT_CONFIG);
        }
    };
    let api_client: Arc<dyn HttpClient> = Arc::new(api_client);

    let (transport, transport_handle) = match &config.notify.host {
        Some(host) => {
            let timeout = Duration::from_secs(config.notify.connect_timeout_secs);
            match TcpEmitter::connect(host, timeout).await {
                Ok((emitter, handle)) => (Arc::new(emitter) as Arc<dyn EventEmitter>, Some(handle)),
                Err(e) => {
                    error!("{}", e);
                    exit(EXIT_TRANSPORT);
                }
            }
        }
        None => {
            info!("No notification host configured, logging events only");
            (Arc::new(LogEmitter) as Arc<dyn EventEmitter>, None)
        }
    };

    let events = Arc::new(BroadcastEmitter::new(EVENT_STREAM_CAPACITY));
    let stream: Arc<dyn EventEmitter> = events.clone();
    let emitter = Arc::new(FanoutEmitter::new(vec![transport, stream]));
    let shortener = UrlShortener::new(&config.shortener, Arc::new(shortener_client));
    let notifier = Notifier::new(emitter, shortener, config.commit_id_size);

    let bind_address = config.webhook.bind_address.clone();
    let state = match AppState::new(config, notifier, events, api_client) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("{}", e);
            exit(EXIT_CONFIG);
        }
    };

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_address, e);
            exit(EXIT_LISTENER);
        }
    };

    info!("Listening on {}", bind_address);
    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        exit(EXIT_LISTENER);
    }

    // Deliveries still being processed hold the last notifier clones
    if let Some(handle) = transport_handle {
        if tokio::time::timeout(DRAIN_TIMEOUT, handle.finish()).await.is_err() {
            warn!("Gave up waiting for queued events");
        }
    }
    info!("Shut down");
}
