//! Server-Sent Events subscriber with reconnection, suspension, and a live
//! indicator.
//!
//! The manager owns exactly one [`Connection`] and executes the actions it
//! returns. Everything is driven from a single `select!` loop: transport
//! events, the retry timer, the staleness timer, and control commands.

use crate::connection::{Action, Backoff, Connection, ConnectionEvent};
use crate::error::{Error, Result};
use crate::handler::StreamHandler;
use crate::live::{LiveIndicator, DEFAULT_STALE_AFTER};
use crate::messages::ControlCommand;
use crate::sse::{parse_state, SseDecoder};
use bytes::Bytes;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use metrics::counter;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Default gateway base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
/// Stream endpoint path on the gateway.
pub const STREAM_PATH: &str = "/api/telemetry/stream";
/// Snapshot endpoint path on the gateway.
pub const SNAPSHOT_PATH: &str = "/api/telemetry/snapshot";

/// Configuration for the SSE manager.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Gateway base URL.
    pub base_url: Url,
    /// Reconnect delay bounds.
    pub backoff: Backoff,
    /// Staleness window for the live indicator. Must be below the backoff ceiling.
    pub stale_after: Duration,
    /// Minimum spacing between message log lines.
    pub log_interval: Duration,
    /// TCP connect timeout per attempt.
    pub connect_timeout: Duration,
}

impl SubscriberConfig {
    /// Default configuration against `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            backoff: Backoff::default(),
            stale_after: DEFAULT_STALE_AFTER,
            log_interval: Duration::from_secs(4),
            connect_timeout: Duration::from_secs(5),
        })
    }

    /// Check the timing invariants.
    pub fn validate(&self) -> Result<()> {
        if self.backoff.floor.is_zero() {
            return Err(Error::InvalidConfig("backoff floor must be positive".to_string()));
        }
        if self.backoff.floor > self.backoff.ceiling {
            return Err(Error::InvalidConfig(format!(
                "backoff floor {:?} exceeds ceiling {:?}",
                self.backoff.floor, self.backoff.ceiling
            )));
        }
        if self.stale_after >= self.backoff.ceiling {
            return Err(Error::InvalidConfig(format!(
                "stale window {:?} must be shorter than backoff ceiling {:?}",
                self.stale_after, self.backoff.ceiling
            )));
        }
        Ok(())
    }

    pub fn stream_url(&self) -> Result<Url> {
        Ok(self.base_url.join(STREAM_PATH)?)
    }

    pub fn snapshot_url(&self) -> Result<Url> {
        Ok(self.base_url.join(SNAPSHOT_PATH)?)
    }
}

/// One physical stream attempt. Dropping it closes the connection.
enum Transport {
    Pending(BoxFuture<'static, reqwest::Result<reqwest::Response>>),
    Streaming {
        body: BoxStream<'static, reqwest::Result<Bytes>>,
        decoder: SseDecoder,
    },
}

enum TransportEvent {
    Opened,
    Data(String),
    Failed(Error),
}

impl Transport {
    fn open(client: &reqwest::Client, url: Url) -> Self {
        let request = client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send();
        Transport::Pending(request.boxed())
    }

    /// Next event from this transport. Cancel safe.
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self {
                Transport::Pending(request) => {
                    let response = match request.await {
                        Ok(response) => response,
                        Err(e) => return TransportEvent::Failed(e.into()),
                    };
                    if !response.status().is_success() {
                        return TransportEvent::Failed(Error::Status(response.status()));
                    }
                    *self = Transport::Streaming {
                        body: response.bytes_stream().boxed(),
                        decoder: SseDecoder::new(),
                    };
                    return TransportEvent::Opened;
                }
                Transport::Streaming { body, decoder } => {
                    if let Some(data) = decoder.next_data() {
                        return TransportEvent::Data(data);
                    }
                    match body.next().await {
                        Some(Ok(chunk)) => decoder.push(&chunk),
                        Some(Err(e)) => return TransportEvent::Failed(e.into()),
                        None => return TransportEvent::Failed(Error::ConnectionClosed),
                    }
                }
            }
        }
    }
}

async fn next_transport_event(transport: &mut Option<Transport>) -> TransportEvent {
    match transport {
        Some(transport) => transport.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// SSE connection manager.
/// Handles connection lifecycle, reconnection, suspension, and liveness.
pub struct SseManager<H: StreamHandler> {
    handler: Arc<H>,
    config: SubscriberConfig,
    client: reqwest::Client,
    stream_url: Url,
    command_rx: mpsc::Receiver<ControlCommand>,
}

impl<H: StreamHandler> SseManager<H> {
    /// Create a new SSE manager. Fails if the configuration is invalid.
    pub fn new(
        handler: Arc<H>,
        config: SubscriberConfig,
        command_rx: mpsc::Receiver<ControlCommand>,
    ) -> Result<Self> {
        config.validate()?;
        let stream_url = config.stream_url()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            handler,
            config,
            client,
            stream_url,
            command_rx,
        })
    }

    /// Run until a shutdown command arrives or the command channel closes.
    pub async fn run(mut self) -> Result<()> {
        info!("Subscribing to {}", self.stream_url);

        let mut connection = Connection::new(self.config.backoff);
        let mut live = LiveIndicator::new(self.config.stale_after);
        let mut transport: Option<Transport> = None;
        let mut retry_at: Option<Instant> = None;
        let mut last_log: Option<Instant> = None;

        let actions = connection.handle(ConnectionEvent::Start, now_ms());
        self.apply(actions, &mut transport, &mut retry_at).await;

        loop {
            let stale_at = live.deadline();

            let event = tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(ControlCommand::Hidden) => {
                        debug!("View hidden, suspending stream");
                        Some(ConnectionEvent::Hidden)
                    }
                    Some(ControlCommand::Visible) => {
                        debug!("View visible, resuming stream");
                        Some(ConnectionEvent::Visible)
                    }
                    Some(ControlCommand::Shutdown) | None => {
                        info!("Subscriber received shutdown");
                        let actions = connection.handle(ConnectionEvent::Shutdown, now_ms());
                        self.apply(actions, &mut transport, &mut retry_at).await;
                        break;
                    }
                },

                event = next_transport_event(&mut transport) => match event {
                    TransportEvent::Opened => {
                        info!("Stream connected");
                        self.handler.on_open().await;
                        Some(ConnectionEvent::Opened)
                    }
                    TransportEvent::Data(data) => {
                        self.on_data(&data, &mut live, &mut last_log).await;
                        None
                    }
                    TransportEvent::Failed(e) => {
                        counter!("subscriber_transport_errors_total").increment(1);
                        warn!(
                            "Stream transport error: {}, retrying in {:?}",
                            e,
                            connection.backoff()
                        );
                        Some(ConnectionEvent::TransportError)
                    }
                },

                _ = sleep_until_opt(retry_at) => {
                    retry_at = None;
                    counter!("subscriber_reconnects_total").increment(1);
                    Some(ConnectionEvent::RetryFired)
                }

                _ = sleep_until_opt(stale_at) => {
                    if live.expire(Instant::now()) {
                        debug!("No stream message for {:?}", self.config.stale_after);
                        self.handler.on_live_change(false).await;
                    }
                    None
                }
            };

            if let Some(event) = event {
                let actions = connection.handle(event, now_ms());
                self.apply(actions, &mut transport, &mut retry_at).await;
            }
        }

        info!("Subscriber stopped");
        Ok(())
    }

    async fn apply(
        &self,
        actions: Vec<Action>,
        transport: &mut Option<Transport>,
        retry_at: &mut Option<Instant>,
    ) {
        for action in actions {
            match action {
                Action::OpenTransport => {
                    debug!("Opening stream {}", self.stream_url);
                    *transport = Some(Transport::open(&self.client, self.stream_url.clone()));
                }
                Action::CloseTransport => {
                    *transport = None;
                }
                Action::ScheduleRetry(delay) => {
                    *retry_at = Some(Instant::now() + delay);
                }
                Action::CancelRetry => {
                    *retry_at = None;
                }
                Action::SetErrorIndicator(is_error) => {
                    self.handler.on_error(is_error).await;
                }
            }
        }
    }

    async fn on_data(&self, data: &str, live: &mut LiveIndicator, last_log: &mut Option<Instant>) {
        counter!("subscriber_messages_total").increment(1);

        let now = Instant::now();
        if last_log.map_or(true, |at| now.duration_since(at) >= self.config.log_interval) {
            let preview: String = data.chars().take(100).collect();
            info!("Stream message: {}…", preview);
            *last_log = Some(now);
        }

        let Some(state) = parse_state(data) else {
            debug!("Ignoring stream message without state");
            return;
        };

        let snapshot = normalizer::normalize(Some(&state));
        if live.mark(now) {
            self.handler.on_live_change(true).await;
        }
        self.handler.on_snapshot(snapshot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::{http::header::CONTENT_TYPE, routing::get, Router};
    use normalizer::Snapshot;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    #[derive(Debug)]
    enum Recorded {
        Open,
        Error(bool),
        Live(bool),
        Snapshot(Snapshot),
    }

    struct RecordingHandler {
        tx: mpsc::UnboundedSender<Recorded>,
    }

    #[async_trait]
    impl StreamHandler for RecordingHandler {
        async fn on_snapshot(&self, snapshot: Snapshot) {
            let _ = self.tx.send(Recorded::Snapshot(snapshot));
        }

        async fn on_error(&self, is_error: bool) {
            let _ = self.tx.send(Recorded::Error(is_error));
        }

        async fn on_live_change(&self, live: bool) {
            let _ = self.tx.send(Recorded::Live(live));
        }

        async fn on_open(&self) {
            let _ = self.tx.send(Recorded::Open);
        }
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}")
    }

    fn start(
        base_url: &str,
    ) -> (
        mpsc::Sender<ControlCommand>,
        mpsc::UnboundedReceiver<Recorded>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(4);
        let config = SubscriberConfig::new(base_url).unwrap();
        let manager =
            SseManager::new(Arc::new(RecordingHandler { tx: event_tx }), config, command_rx)
                .unwrap();
        (command_tx, event_rx, tokio::spawn(manager.run()))
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Recorded>) -> Recorded {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for handler event")
            .expect("handler channel closed")
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[derive(Default)]
    struct ConnectionCounts {
        live: AtomicUsize,
        total: AtomicUsize,
    }

    impl ConnectionCounts {
        fn get(&self) -> (usize, usize) {
            (
                self.live.load(Ordering::SeqCst),
                self.total.load(Ordering::SeqCst),
            )
        }
    }

    struct LiveGuard(Arc<ConnectionCounts>);

    impl Drop for LiveGuard {
        fn drop(&mut self) {
            self.0.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// A stream endpoint that sends one snapshot and then stays open.
    fn endless_stream(counts: Arc<ConnectionCounts>) -> Router {
        Router::new().route(
            STREAM_PATH,
            get(move || {
                let counts = counts.clone();
                async move {
                    counts.live.fetch_add(1, Ordering::SeqCst);
                    counts.total.fetch_add(1, Ordering::SeqCst);
                    let guard = LiveGuard(counts);
                    let first =
                        Bytes::from_static(b"data: {\"type\":\"snapshot\",\"state\":{}}\n\n");
                    let body = futures::stream::once(async move { Ok::<_, Infallible>(first) })
                        .chain(futures::stream::pending())
                        .map(move |chunk| {
                            let _ = &guard;
                            chunk
                        });
                    ([(CONTENT_TYPE, "text/event-stream")], Body::from_stream(body))
                }
            }),
        )
    }

    #[test]
    fn test_config_validation() {
        let mut config = SubscriberConfig::new(DEFAULT_BASE_URL).unwrap();
        assert!(config.validate().is_ok());

        config.stale_after = Duration::from_secs(15);
        assert!(config.validate().is_err());

        let mut config = SubscriberConfig::new(DEFAULT_BASE_URL).unwrap();
        config.backoff.floor = Duration::from_secs(20);
        assert!(config.validate().is_err());

        assert!(SubscriberConfig::new("not a url").is_err());
    }

    #[test]
    fn test_endpoint_urls() {
        let config = SubscriberConfig::new("http://gateway:8080/").unwrap();
        assert_eq!(
            config.stream_url().unwrap().as_str(),
            "http://gateway:8080/api/telemetry/stream"
        );
        assert_eq!(
            config.snapshot_url().unwrap().as_str(),
            "http://gateway:8080/api/telemetry/snapshot"
        );
    }

    #[tokio::test]
    async fn test_delivers_normalized_snapshots() {
        let router = Router::new().route(
            STREAM_PATH,
            get(|| async {
                (
                    [(CONTENT_TYPE, "text/event-stream")],
                    concat!(
                        ":keep-alive\n\n",
                        "data: {\"type\":\"snapshot\",\"state\":{\"kpi\":{\"reductionPct\":61}}}\n\n",
                        "data: {\"type\":\"tick\"}\n\n",
                    ),
                )
            }),
        );
        let base_url = serve(router).await;
        let (command_tx, mut events, handle) = start(&base_url);

        assert!(matches!(next(&mut events).await, Recorded::Open));
        assert!(matches!(next(&mut events).await, Recorded::Error(false)));
        assert!(matches!(next(&mut events).await, Recorded::Live(true)));
        match next(&mut events).await {
            Recorded::Snapshot(snapshot) => {
                assert_eq!(snapshot.kpi.reduction_pct, 61);
                assert_eq!(snapshot.weekday_series.len(), 5);
                assert!(snapshot.is_well_shaped(normalizer::DEFAULT_SERIES_RETENTION));
            }
            other => panic!("expected snapshot, got {other:?}"),
        }

        // The body ends after the stateless tick, which counts as a transport error.
        assert!(matches!(next(&mut events).await, Recorded::Error(true)));

        command_tx.send(ControlCommand::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_gateway_raises_error_indicator() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (command_tx, mut events, handle) = start(&format!("http://{addr}"));
        assert!(matches!(next(&mut events).await, Recorded::Error(true)));

        command_tx.send(ControlCommand::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_hidden_then_visible_reopens_exactly_once() {
        let counts = Arc::new(ConnectionCounts::default());
        let base_url = serve(endless_stream(counts.clone())).await;
        let (command_tx, mut events, handle) = start(&base_url);

        assert!(matches!(next(&mut events).await, Recorded::Open));
        assert!(matches!(next(&mut events).await, Recorded::Error(false)));
        assert!(matches!(next(&mut events).await, Recorded::Live(true)));
        assert!(matches!(next(&mut events).await, Recorded::Snapshot(_)));
        assert_eq!(counts.get(), (1, 1));

        command_tx.send(ControlCommand::Hidden).await.unwrap();
        command_tx.send(ControlCommand::Hidden).await.unwrap();
        wait_for(|| counts.get() == (0, 1)).await;

        command_tx.send(ControlCommand::Visible).await.unwrap();
        command_tx.send(ControlCommand::Visible).await.unwrap();
        assert!(matches!(next(&mut events).await, Recorded::Open));
        wait_for(|| counts.get() == (1, 2)).await;

        // No further attempts while the stream stays open.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counts.get(), (1, 2));

        command_tx.send(ControlCommand::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();
        wait_for(|| counts.get() == (0, 2)).await;
    }

    #[tokio::test]
    async fn test_failing_gateway_is_redialed_with_backoff() {
        let arrivals = Arc::new(Mutex::new(Vec::<std::time::Instant>::new()));
        let router = Router::new().route(
            STREAM_PATH,
            get({
                let arrivals = arrivals.clone();
                move || {
                    arrivals.lock().unwrap().push(std::time::Instant::now());
                    async { StatusCode::SERVICE_UNAVAILABLE }
                }
            }),
        );
        let base_url = serve(router).await;
        let (command_tx, mut events, handle) = start(&base_url);

        for _ in 0..3 {
            assert!(matches!(next(&mut events).await, Recorded::Error(true)));
        }

        command_tx.send(ControlCommand::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();

        let arrivals = arrivals.lock().unwrap().clone();
        assert_eq!(arrivals.len(), 3);
        let first_gap = arrivals[1] - arrivals[0];
        let second_gap = arrivals[2] - arrivals[1];
        assert!(
            first_gap >= Duration::from_millis(950) && first_gap < Duration::from_millis(1_900),
            "first retry after {first_gap:?}"
        );
        assert!(
            second_gap >= Duration::from_millis(1_950) && second_gap < Duration::from_millis(3_500),
            "second retry after {second_gap:?}"
        );
    }
}
