//! Webhook HTTP server.
//!
//! Requests are checked synchronously (method, content type, project path,
//! provider, authentication, payload and event name) and answered right away.
//! Accepted payloads are normalized in a background task; tasks run one at a
//! time so events of consecutive deliveries never interleave.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State as AxumState},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{any, get},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{Instrument, Span, debug, error, field, info, instrument, warn};
use uuid::Uuid;

use crate::config::EventcConfig;
use crate::emitter::BroadcastEmitter;
use crate::error::Result;
use crate::http::HttpClient;
use crate::notify::Notifier;
use crate::webhook::auth::authenticate;
use crate::webhook::enrich::ApiLookup;
use crate::webhook::payload::parse_payload;
use crate::webhook::{ProjectPath, Provider, Registry, WebhookContext};

pub struct AppState {
    pub config: EventcConfig,
    /// Held while a delivery is being normalized.
    pub processing_lock: Mutex<()>,
    pub notifier: Notifier,
    /// Feeds the SSE stream; the notifier's emitter must include it.
    pub events: Arc<BroadcastEmitter>,
    pub http: Arc<dyn HttpClient>,
    pub registry: Registry,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: EventcConfig,
        notifier: Notifier,
        events: Arc<BroadcastEmitter>,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        Ok(Self {
            config,
            processing_lock: Mutex::new(()),
            notifier,
            events,
            http,
            registry: Registry::standard()?,
            start_time: Instant::now(),
            started_at: Utc::now(),
        })
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/stream/events", get(stream_events))
        .route("/", any(handle_webhook))
        .route("/{*path}", any(handle_webhook))
        .with_state(state)
}

/// Handles a webhook delivery for `/<group>[/<project>]`.
#[instrument(
    name = "webhook",
    skip_all,
    fields(request_id = %Uuid::now_v7(), path = %uri.path(), provider = field::Empty, delivery = field::Empty)
)]
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    method: Method,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if method != Method::POST {
        debug!("Rejecting {} request", method);
        return StatusCode::NOT_IMPLEMENTED;
    }

    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        info!("Request without a content type");
        return StatusCode::BAD_REQUEST;
    };

    let Some(project) = ProjectPath::parse(uri.path()) else {
        info!("Request without a project group");
        return StatusCode::BAD_REQUEST;
    };

    let Some(provider) = Provider::detect(&headers) else {
        info!("Couldn't identify the webhook provider");
        return StatusCode::BAD_REQUEST;
    };
    let span = Span::current();
    span.record("provider", field::display(provider));
    if let Some(delivery) = provider.delivery_id(&headers) {
        span.record("delivery", field::display(delivery));
    }

    if authenticate(
        state.config.webhook.secrets.as_ref(),
        provider,
        &project,
        &headers,
        &params,
        &body,
    )
    .is_err()
    {
        return StatusCode::UNAUTHORIZED;
    }

    let payload = match parse_payload(content_type, &body) {
        Ok(payload) => payload,
        Err(e) => {
            info!("Rejecting payload: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    let Some(event) = provider.event_name(&headers) else {
        info!("{} request without an event name", provider);
        return StatusCode::NOT_IMPLEMENTED;
    };
    let Some(normalizer) = state.registry.lookup(provider, &event) else {
        info!("Unsupported {} event '{}'", provider, event);
        return StatusCode::NOT_IMPLEMENTED;
    };
    if !normalizer.emits() {
        info!("{} '{}' event for {}", provider, event, project);
        return StatusCode::OK;
    }

    let ctx = WebhookContext {
        notifier: state.notifier.clone(),
        api: ApiLookup::new(
            state.http.clone(),
            state
                .config
                .webhook
                .api_headers_for(&project.group, project.project.as_deref()),
        ),
        project,
        merge_threshold: state.config.merge_threshold,
    };

    let shared_state = state.clone();
    tokio::spawn(
        async move {
            let _guard = shared_state.processing_lock.lock().await;
            match normalizer.normalize(&ctx, &payload).await {
                Ok(()) => info!("Processed {} '{}' event for {}", provider, event, ctx.project),
                Err(e) => error!("Failed to process {} '{}' event: {}", provider, event, e),
            }
        }
        .instrument(span),
    );

    StatusCode::OK
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub stream_subscribers: usize,
}

/// GET /api/status
pub async fn status(AxumState(state): AxumState<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        started_at: state.started_at.to_rfc3339(),
        stream_subscribers: state.events.receiver_count(),
    })
}

/// GET /api/stream/events - SSE stream of emitted events
pub async fn stream_events(
    AxumState(state): AxumState<SharedState>,
) -> Sse<impl tokio_stream::Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let stream = BroadcastStream::new(state.events.subscribe());

    let event_stream = stream.filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(SseEvent::default().event(event.name()).data(data)))
        }
        Err(e) => {
            warn!("Event stream subscriber lagging: {}", e);
            None
        }
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}
