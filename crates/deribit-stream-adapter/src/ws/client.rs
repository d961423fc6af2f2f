/*
[INPUT]:  WebSocket URL, optional client credentials, channel handlers
[OUTPUT]: Authenticated session, channel pushes routed to handlers, latency samples
[POS]:    WebSocket layer - connection manager and I/O thread
[UPDATE]: When changing lifecycle transitions, routing rules or shutdown semantics
*/

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::WsConfig;
use super::correlator::{Correlator, RequestIntent, RequestOutcome};
use super::dispatch::{DispatchTable, HandlerResult};
use super::message::{Envelope, Inbound, RequestId, RpcRequest, subscription_method};
use super::state::ConnectionState;
use crate::auth::{AuthResult, TokenStore};
use crate::error::{DeribitError, Result};
use crate::latency::{LatencyCategory, LatencyRecorder};
use crate::types::ChannelsParams;

const IO_THREAD_NAME: &str = "deribit-ws-io";
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);
const PUSH_SAMPLE_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, WsMessage>;
type WsRead = SplitStream<WsStream>;

/// Invoked with `true` on open and `false` on every close or failure
pub type ConnectivityCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Invoked once per tracked request when it completes, fails or times out
pub type RequestObserver = Arc<dyn Fn(&RequestIntent, &RequestOutcome) + Send + Sync>;

/// State shared between the owning client and its I/O thread
struct Shared {
    config: WsConfig,
    state: Mutex<ConnectionState>,
    state_changed: Condvar,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    correlator: Correlator,
    dispatch: DispatchTable,
    tokens: TokenStore,
    latency: Arc<LatencyRecorder>,
    connectivity: Mutex<Option<ConnectivityCallback>>,
    observer: Mutex<Option<RequestObserver>>,
    push_samples: AtomicUsize,
}

struct IoThread {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

/// JSON-RPC streaming client for the Deribit WebSocket API.
///
/// One dedicated thread owns the socket for the lifetime of a connection and
/// runs every handler. Data-plane calls (`subscribe`, `unsubscribe`, handler
/// registration) are safe from any thread; `connect` and `disconnect` must be
/// serialized by the owner.
pub struct DeribitWebSocket {
    shared: Arc<Shared>,
    io: Mutex<Option<IoThread>>,
}

impl DeribitWebSocket {
    pub fn new(config: WsConfig) -> Self {
        Self::with_shared(config, TokenStore::new(), Arc::new(LatencyRecorder::new()))
    }

    /// Build a client that writes into an existing token store and recorder.
    pub fn with_shared(config: WsConfig, tokens: TokenStore, latency: Arc<LatencyRecorder>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                state_changed: Condvar::new(),
                outbound: Mutex::new(None),
                correlator: Correlator::new(),
                dispatch: DispatchTable::new(),
                tokens,
                latency,
                connectivity: Mutex::new(None),
                observer: Mutex::new(None),
                push_samples: AtomicUsize::new(0),
            }),
            io: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WsConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Token negotiated by `public/auth`, if any
    pub fn access_token(&self) -> Option<String> {
        self.shared.tokens.access_token()
    }

    pub fn token_store(&self) -> TokenStore {
        self.shared.tokens.clone()
    }

    pub fn latency(&self) -> Arc<LatencyRecorder> {
        self.shared.latency.clone()
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.len()
    }

    pub fn set_connection_callback<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        *self.shared.connectivity.lock() = Some(Arc::new(callback));
    }

    pub fn set_request_observer<F>(&self, observer: F)
    where
        F: Fn(&RequestIntent, &RequestOutcome) + Send + Sync + 'static,
    {
        *self.shared.observer.lock() = Some(Arc::new(observer));
    }

    /// Route pushes on `channel` to `handler`. Replaces any earlier handler.
    ///
    /// Registrations are independent of the connection and survive reconnects.
    pub fn register_handler<F>(&self, channel: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.shared.dispatch.register(channel, handler);
    }

    pub fn unregister_handler(&self, channel: &str) -> bool {
        self.shared.dispatch.unregister(channel)
    }

    pub fn registered_channels(&self) -> Vec<String> {
        self.shared.dispatch.channels()
    }

    /// Start the I/O thread. A no-op while a connection is already active.
    ///
    /// A connection still `Closing` is joined first, so two I/O threads never
    /// share the client state.
    pub fn connect(&self) -> Result<()> {
        self.shared.config.validate()?;

        let previous = {
            let mut io = self.io.lock();
            let state = self.shared.state();
            if state.is_active() {
                info!(%state, "WebSocket client is already running");
                return Ok(());
            }
            match io.take() {
                Some(previous) if previous.handle.thread().id() == thread::current().id() => {
                    *io = Some(previous);
                    return Err(DeribitError::Config(
                        "connect() cannot be called from the WebSocket I/O thread".to_string(),
                    ));
                }
                previous => previous,
            }
        };

        // Reap the thread of a connection that ended or is still closing.
        if let Some(previous) = previous {
            previous.shutdown.cancel();
            if previous.handle.join().is_err() {
                error!("previous WebSocket I/O thread panicked");
                self.shared.finish_connection();
            }
        }

        self.shared.set_state(ConnectionState::Connecting);

        let shutdown = CancellationToken::new();
        let shared = self.shared.clone();
        let token = shutdown.clone();
        let spawned = thread::Builder::new()
            .name(IO_THREAD_NAME.to_string())
            .spawn(move || run_io_thread(shared, token));

        match spawned {
            Ok(handle) => {
                *self.io.lock() = Some(IoThread { handle, shutdown });
                Ok(())
            }
            Err(err) => {
                self.shared.set_state(ConnectionState::Disconnected);
                self.shared.notify_connectivity(false);
                Err(DeribitError::Transport(format!(
                    "failed to spawn WebSocket I/O thread: {err}"
                )))
            }
        }
    }

    /// Close the connection and wait for the I/O thread to exit.
    ///
    /// Every pending request resolves as `ConnectionLost`; no handler or
    /// connectivity callback runs after this returns.
    ///
    /// Called from a handler it only signals the I/O thread; the handle stays
    /// so a later `disconnect` or `connect` from the owner still joins it.
    pub fn disconnect(&self) {
        let mut slot = self.io.lock();
        let Some(io) = slot.take() else {
            return;
        };

        io.shutdown.cancel();

        if io.handle.thread().id() == thread::current().id() {
            debug!("disconnect() called from the WebSocket I/O thread; not joining");
            *slot = Some(io);
            return;
        }
        drop(slot);

        if io.handle.join().is_err() {
            error!("WebSocket I/O thread panicked");
            self.shared.finish_connection();
        }
    }

    /// Send a subscribe request for `channel`.
    ///
    /// `Ok` means the request was sent; confirmation arrives asynchronously.
    pub fn subscribe(&self, channel: &str) -> Result<RequestId> {
        self.ensure_ready()?;
        let id = self.shared.send_request(
            RequestIntent::Subscribe(channel.to_string()),
            subscription_method(channel, true),
            ChannelsParams::single(channel),
        )?;
        info!(%channel, id, "subscription request sent");
        Ok(id)
    }

    /// Send an unsubscribe request and drop the channel's handler right away.
    pub fn unsubscribe(&self, channel: &str) -> Result<RequestId> {
        self.ensure_ready()?;
        let id = self.shared.send_request(
            RequestIntent::Unsubscribe(channel.to_string()),
            subscription_method(channel, false),
            ChannelsParams::single(channel),
        )?;
        self.shared.dispatch.unregister(channel);
        info!(%channel, id, "unsubscribe request sent");
        Ok(id)
    }

    /// Block until the client is `Ready`. Returns false on timeout.
    pub fn wait_for_ready(&self, timeout: Duration) -> bool {
        self.wait_for_state(timeout, |state| state == ConnectionState::Ready)
    }

    /// Block until `done(state)` holds. Returns false on timeout.
    pub fn wait_for_state<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(ConnectionState) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !done(*state) {
            if self
                .shared
                .state_changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return done(*state);
            }
        }
        true
    }

    fn ensure_ready(&self) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Ready {
            warn!(%state, "not connected to WebSocket server");
            return Err(DeribitError::NotReady { state });
        }
        Ok(())
    }
}

impl Drop for DeribitWebSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for DeribitWebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeribitWebSocket")
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .field("channels", &self.registered_channels())
            .finish()
    }
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous != next {
            debug!(from = %previous, to = %next, "connection state changed");
        }
        self.state_changed.notify_all();
    }

    /// Move to `next` only from one of `from`.
    fn advance(&self, from: &[ConnectionState], next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if !from.contains(&*state) {
            return false;
        }
        let previous = *state;
        *state = next;
        debug!(from = %previous, to = %next, "connection state changed");
        drop(state);
        self.state_changed.notify_all();
        true
    }

    fn notify_connectivity(&self, connected: bool) {
        let callback = self.connectivity.lock().clone();
        if let Some(callback) = callback {
            guarded("connectivity callback", || callback(connected));
        }
    }

    fn observe(&self, intent: &RequestIntent, outcome: &RequestOutcome) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            guarded("request observer", || observer(intent, outcome));
        }
    }

    /// Track `intent`, serialize the request and queue it for the I/O thread.
    fn send_request<P: Serialize>(
        &self,
        intent: RequestIntent,
        method: &str,
        params: P,
    ) -> Result<RequestId> {
        // Held across track + send so teardown cannot drain the correlator in between.
        let outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return Err(DeribitError::NotReady {
                state: self.state(),
            });
        };

        let id = self.correlator.track(intent);
        let text = match serde_json::to_string(&RpcRequest::new(id, method, params)) {
            Ok(text) => text,
            Err(err) => {
                self.correlator.resolve(id);
                return Err(err.into());
            }
        };

        if tx.send(WsMessage::Text(text.into())).is_err() {
            self.correlator.resolve(id);
            return Err(DeribitError::ConnectionLost);
        }
        debug!(id, method, "request queued");
        Ok(id)
    }

    fn on_open(&self) {
        match self.config.auth_credentials() {
            Some(credentials) => {
                self.set_state(ConnectionState::Authenticating);
                match self.send_request(
                    RequestIntent::Authenticate,
                    "public/auth",
                    credentials.auth_params(),
                ) {
                    Ok(id) => info!(id, client_id = %credentials.client_id, "authentication request sent"),
                    Err(err) => warn!(error = %err, "failed to send authentication request"),
                }
            }
            None => {
                info!("client credentials not provided, skipping authentication");
                self.become_ready();
            }
        }
    }

    fn become_ready(&self) {
        if !self.advance(
            &[ConnectionState::Connected, ConnectionState::Authenticating],
            ConnectionState::Ready,
        ) {
            return;
        }
        info!("WebSocket session ready");

        if let Some(interval) = self.config.heartbeat_interval {
            let params = json!({ "interval": interval.as_secs() });
            if let Err(err) = self.send_request(RequestIntent::SetHeartbeat, "public/set_heartbeat", params) {
                warn!(error = %err, "failed to enable heartbeat");
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let started = Instant::now();
        match Envelope::parse(text) {
            Ok(envelope) => self.route(envelope, text),
            Err(err) => {
                warn!(
                    error = %err,
                    bytes = text.len(),
                    message = %truncate_for_log(text, RAW_LOG_MAX_BYTES),
                    "ws message parse failed"
                );
            }
        }
        self.latency.record_since(LatencyCategory::Streaming, started);
    }

    fn route(&self, envelope: Envelope, raw: &str) {
        let us_diff = envelope.us_diff;
        match envelope.classify() {
            Inbound::Reply { id, outcome } => match self.correlator.resolve(id) {
                Some(pending) => {
                    let round_trip_us = u64::try_from(pending.sent_at.elapsed().as_micros()).unwrap_or(u64::MAX);
                    self.latency
                        .record(LatencyCategory::StreamingRoundTrip, round_trip_us);
                    debug!(
                        id,
                        intent = %pending.intent,
                        round_trip_us,
                        venue_us = ?us_diff,
                        "reply matched"
                    );
                    let outcome = outcome.map_or_else(RequestOutcome::Rejected, RequestOutcome::Confirmed);
                    self.complete(pending.intent, outcome);
                }
                None => debug!(id, "reply without pending request dropped"),
            },
            Inbound::Push { channel, data } => {
                self.log_push_sample(&channel);
                self.dispatch.dispatch(&channel, &data);
            }
            Inbound::Heartbeat { test_request } => {
                if test_request
                    && let Err(err) = self.send_request(RequestIntent::HeartbeatTest, "public/test", json!({}))
                {
                    warn!(error = %err, "failed to answer heartbeat");
                }
            }
            Inbound::Unrecognized => {
                debug!(
                    bytes = raw.len(),
                    message = %truncate_for_log(raw, RAW_LOG_MAX_BYTES),
                    "ws message shape unrecognized"
                );
            }
        }
    }

    fn complete(&self, intent: RequestIntent, outcome: RequestOutcome) {
        match (&intent, &outcome) {
            (RequestIntent::Authenticate, RequestOutcome::Confirmed(result)) => {
                match serde_json::from_value::<AuthResult>(result.clone()) {
                    Ok(auth) => {
                        info!(expires_in = auth.expires_in, "successfully authenticated with Deribit");
                        self.tokens.store(auth);
                    }
                    Err(err) => warn!(error = %err, "authentication reply without access token"),
                }
                self.become_ready();
            }
            (RequestIntent::Authenticate, RequestOutcome::Rejected(err)) => {
                warn!(code = err.code, message = %err.message, "authentication rejected; continuing with public access");
                self.become_ready();
            }
            (RequestIntent::Authenticate, RequestOutcome::TimedOut) => {
                warn!("authentication timed out; continuing with public access");
                self.become_ready();
            }
            (RequestIntent::Subscribe(channel), RequestOutcome::Confirmed(result)) => {
                let confirmed = result
                    .as_array()
                    .is_none_or(|channels| channels.iter().any(|c| c.as_str() == Some(channel.as_str())));
                if confirmed {
                    info!(%channel, "subscription successful");
                } else {
                    warn!(%channel, %result, "subscription reply does not include channel");
                }
            }
            (RequestIntent::Unsubscribe(channel), RequestOutcome::Confirmed(_)) => {
                debug!(%channel, "unsubscribe confirmed");
            }
            (_, RequestOutcome::Rejected(err)) => {
                warn!(%intent, code = err.code, message = %err.message, "request rejected");
            }
            (_, RequestOutcome::TimedOut) => warn!(%intent, "request timed out"),
            _ => {}
        }
        self.observe(&intent, &outcome);
    }

    fn expire_requests(&self) {
        let Some(deadline) = self.config.request_timeout else {
            return;
        };
        for (_, pending) in self.correlator.expire(deadline, Instant::now()) {
            self.complete(pending.intent, RequestOutcome::TimedOut);
        }
    }

    /// Teardown: runs on every exit path of the I/O thread.
    fn finish_connection(&self) {
        self.outbound.lock().take();
        self.set_state(ConnectionState::Disconnected);

        for (id, pending) in self.correlator.fail_all() {
            debug!(id, intent = %pending.intent, "pending request failed: connection lost");
            self.observe(&pending.intent, &RequestOutcome::ConnectionLost);
        }

        self.notify_connectivity(false);
    }

    fn log_push_sample(&self, channel: &str) {
        let count = self.push_samples.fetch_add(1, Ordering::Relaxed);
        if count < PUSH_SAMPLE_LIMIT {
            info!(
                sample_index = count + 1,
                sample_limit = PUSH_SAMPLE_LIMIT,
                channel,
                "ws message sample"
            );
        }
    }
}

fn run_io_thread(shared: Arc<Shared>, shutdown: CancellationToken) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build();

    match runtime {
        Ok(runtime) => {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                runtime.block_on(io_loop(&shared, &shutdown));
            }));
            if result.is_err() {
                error!("WebSocket event loop panicked");
            }
        }
        Err(err) => error!(error = %err, "failed to build WebSocket runtime"),
    }

    shared.finish_connection();
}

async fn io_loop(shared: &Shared, shutdown: &CancellationToken) {
    let url = shared.config.url.as_str();
    info!(%url, "connecting to Deribit WebSocket");

    let connected = tokio::select! {
        _ = shutdown.cancelled() => {
            info!("connect aborted by disconnect");
            return;
        }
        result = connect_async(url) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _response)) => ws_stream,
        Err(err) => {
            warn!(%url, error = %err, "WebSocket connection failed");
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    *shared.outbound.lock() = Some(outbound_tx);

    shared.set_state(ConnectionState::Connected);
    info!("WebSocket connection established");
    shared.notify_connectivity(true);
    shared.on_open();

    let sweeping = shared.config.request_timeout.is_some();
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                shared.set_state(ConnectionState::Closing);
                close_gracefully(&mut write, &mut read, shared.config.close_timeout).await;
                info!("WebSocket connection closed");
                return;
            }
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else {
                    return;
                };
                if let Err(err) = write.send(message).await {
                    warn!(error = %err, "WebSocket send failed");
                    return;
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => shared.handle_text(text.as_str()),
                    Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => shared.handle_text(text),
                        Err(_) => warn!(bytes = bytes.len(), "non-utf8 binary frame dropped"),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "WebSocket connection closed by venue");
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "WebSocket read failed");
                        return;
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        return;
                    }
                }
            }
            _ = sweep.tick(), if sweeping => shared.expire_requests(),
        }
    }
}

async fn close_gracefully(write: &mut WsWrite, read: &mut WsRead, wait: Duration) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "Client disconnecting".into(),
    };
    if let Err(err) = write.send(WsMessage::Close(Some(frame))).await {
        debug!(error = %err, "close frame not sent");
        return;
    }

    // Pushes arriving while closing are not dispatched.
    let drained = tokio::time::timeout(wait, async {
        while let Some(message) = read.next().await {
            if matches!(message, Ok(WsMessage::Close(_)) | Err(_)) {
                break;
            }
        }
    })
    .await;

    if drained.is_err() {
        debug!(wait_ms = wait.as_millis() as u64, "close handshake timed out");
    }
}

fn guarded(what: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback = what, "callback panicked");
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
