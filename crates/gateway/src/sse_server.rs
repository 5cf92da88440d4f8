//! HTTP server: snapshot endpoint, Server-Sent Events stream, health.

use crate::client::{ClientRegistry, ClientState, Payload, CLIENT_CHANNEL_BUFFER_SIZE};
use crate::error::GatewayError;
use crate::protocol::{HealthResponse, StreamMessage};
use crate::store::SnapshotStore;
use axum::{
    extract::State,
    http::{header::CACHE_CONTROL, HeaderName},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Json, Router,
};
use futures::Stream;
use std::future::Future;
use metrics::{counter, gauge};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{
    compression::{CompressionLayer, DefaultPredicate},
    cors::CorsLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Snapshot endpoint path.
pub const SNAPSHOT_PATH: &str = "/api/telemetry/snapshot";
/// Stream endpoint path.
pub const STREAM_PATH: &str = "/api/telemetry/stream";

/// Interval between SSE keep-alive comments.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Shared application state.
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub registry: Arc<ClientRegistry>,
}

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // The default predicate skips text/event-stream; a compressed event
    // stream would be buffered instead of pushed.
    let compression = CompressionLayer::new().compress_when(DefaultPredicate::new());

    Router::new()
        .route(SNAPSHOT_PATH, get(snapshot_handler))
        .route(STREAM_PATH, get(stream_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(compression)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` resolves, then drain.
///
/// Open event streams only end when their channel closes, so every client is
/// released from the registry before the server waits on in-flight responses.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let registry = state.registry.clone();
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let released = registry.close_all();
            gauge!("gateway_active_streams").set(0.0);
            info!("Draining server, released {} streams", released);
        })
        .await
}

/// Health check handler.
/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        clients: state.registry.client_count(),
        ticks: state.store.tick_count(),
    })
}

/// Current snapshot for first paint.
/// GET /api/telemetry/snapshot
async fn snapshot_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    counter!("gateway_snapshot_requests_total").increment(1);
    let snapshot = state.store.current();
    ([(CACHE_CONTROL, "no-store")], Json((*snapshot).clone()))
}

/// Live event stream.
/// GET /api/telemetry/stream
async fn stream_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, GatewayError> {
    let (stream, client_id) = open_stream(&state)?;
    info!("Stream client {} connected", client_id);

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    );

    Ok((
        [(CACHE_CONTROL, "no-cache"), (X_ACCEL_BUFFERING, "no")],
        sse,
    ))
}

/// Removes the client from the registry when its stream is dropped.
///
/// Axum drops the response body as soon as the connection closes, so this is
/// where a disconnected client stops receiving ticks.
struct StreamGuard {
    registry: Arc<ClientRegistry>,
    client_id: crate::client::ClientId,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.client_id);
        counter!("gateway_stream_disconnections_total").increment(1);
        gauge!("gateway_active_streams").set(self.registry.client_count() as f64);
        info!("Stream client {} disconnected", self.client_id);
    }
}

fn open_stream(
    state: &AppState,
) -> Result<
    (
        impl Stream<Item = Result<Event, Infallible>>,
        crate::client::ClientId,
    ),
    GatewayError,
> {
    let (tx, mut rx) = mpsc::channel::<Payload>(CLIENT_CHANNEL_BUFFER_SIZE);
    let client = Arc::new(ClientState::new(tx));

    // Register before reading the store: a tick landing in between is then
    // delivered twice (harmless) instead of lost.
    let client_id = state.registry.register(client);
    let guard = StreamGuard {
        registry: state.registry.clone(),
        client_id,
    };

    let initial = state.store.current();
    let initial: Payload = StreamMessage::Snapshot(&initial).to_json()?.into();

    counter!("gateway_stream_connections_total").increment(1);
    gauge!("gateway_active_streams").set(state.registry.client_count() as f64);

    let stream = async_stream::stream! {
        let _guard = guard;

        yield Ok::<_, Infallible>(Event::default().data(&*initial));

        while let Some(payload) = rx.recv().await {
            yield Ok(Event::default().data(&*payload));
        }

        warn!("Stream client {} channel closed", client_id);
    };

    Ok((stream, client_id))
}
