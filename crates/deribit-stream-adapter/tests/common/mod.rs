/*
[INPUT]:  Test configuration and mock venue requirements
[OUTPUT]: Shared test utilities: scripted JSON-RPC WebSocket venue, polling helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for deribit-stream-adapter tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wiremock::MockServer;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// How the mock venue answers requests
#[derive(Debug, Clone, Default)]
pub struct VenueScript {
    /// Answer `public/auth` with an `invalid_credentials` error
    pub reject_auth: bool,
    /// Methods that never get a reply
    pub silent: HashSet<String>,
    /// Pushed on every subscribed channel right after the subscribe reply
    pub push_on_subscribe: Option<Value>,
    /// Never answer the client's close frame; hold the socket until dropped
    pub ignore_close: bool,
}

impl VenueScript {
    pub fn silent(mut self, method: &str) -> Self {
        self.silent.insert(method.to_string());
        self
    }

    pub fn reject_auth(mut self) -> Self {
        self.reject_auth = true;
        self
    }

    pub fn ignore_close(mut self) -> Self {
        self.ignore_close = true;
        self
    }

    pub fn push_on_subscribe(mut self, data: Value) -> Self {
        self.push_on_subscribe = Some(data);
        self
    }

    fn respond(&self, request: &Value) -> Vec<Value> {
        let id = request["id"].clone();
        let method = request["method"].as_str().unwrap_or_default();
        if self.silent.contains(method) {
            return Vec::new();
        }

        let reply = |result: Value| json!({"jsonrpc": "2.0", "id": id, "result": result, "usDiff": 12});
        let error = |code: i64, message: &str| {
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
        };

        match method {
            "public/auth" if self.reject_auth => vec![error(13004, "invalid_credentials")],
            "public/auth" => vec![reply(json!({
                "access_token": "T",
                "expires_in": 900,
                "refresh_token": "R",
                "scope": "connection mainaccount",
                "token_type": "bearer"
            }))],
            "public/subscribe" | "private/subscribe" => {
                let channels = request["params"]["channels"].clone();
                let mut out = vec![reply(channels.clone())];
                if let Some(data) = &self.push_on_subscribe {
                    for channel in channels.as_array().into_iter().flatten() {
                        out.push(push_message(channel.as_str().unwrap_or_default(), data.clone()));
                    }
                }
                out
            }
            "public/unsubscribe" | "private/unsubscribe" => {
                vec![reply(request["params"]["channels"].clone())]
            }
            "public/set_heartbeat" => vec![reply(json!("ok"))],
            "public/test" => vec![reply(json!({"version": "1.2.26"}))],
            _ => vec![error(-32601, "Method not found")],
        }
    }
}

pub fn push_message(channel: &str, data: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "subscription",
        "params": {"channel": channel, "data": data}
    })
}

#[derive(Debug, Clone)]
enum VenueCommand {
    Send(String),
    DropConnections,
}

/// Scripted JSON-RPC WebSocket server on 127.0.0.1, running on its own thread.
pub struct MockVenue {
    url: String,
    requests: Arc<Mutex<Vec<Value>>>,
    connections: Arc<Mutex<usize>>,
    commands: broadcast::Sender<VenueCommand>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MockVenue {
    pub fn start() -> Self {
        Self::with_script(VenueScript::default())
    }

    pub fn with_script(script: VenueScript) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));
        let (commands, _) = broadcast::channel(64);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();

        let script = Arc::new(script);
        let thread_requests = requests.clone();
        let thread_connections = connections.clone();
        let thread_commands = commands.clone();

        let thread = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("venue runtime");
            runtime.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind venue");
                addr_tx
                    .send(listener.local_addr().expect("venue addr"))
                    .expect("report venue addr");

                let accept_loop = async {
                    loop {
                        let Ok((stream, _)) = listener.accept().await else {
                            continue;
                        };
                        *thread_connections.lock() += 1;
                        tokio::spawn(serve(
                            stream,
                            script.clone(),
                            thread_requests.clone(),
                            thread_commands.subscribe(),
                        ));
                    }
                };

                tokio::select! {
                    _ = accept_loop => {}
                    _ = shutdown_rx => {}
                }
            });
        });

        let addr = addr_rx.recv_timeout(TEST_TIMEOUT).expect("venue start");
        Self {
            url: format!("ws://{addr}/ws/api/v2"),
            requests,
            connections,
            commands,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connections(&self) -> usize {
        *self.connections.lock()
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    pub fn requests_for(&self, method: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|request| request["method"] == method)
            .collect()
    }

    /// Wait until `count` requests for `method` have been received.
    pub fn wait_for_requests(&self, method: &str, count: usize) -> bool {
        wait_until(TEST_TIMEOUT, || self.requests_for(method).len() >= count)
    }

    pub fn push(&self, channel: &str, data: Value) {
        self.send_raw(&push_message(channel, data).to_string());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.commands.send(VenueCommand::Send(text.to_string()));
    }

    /// Drop every open socket without a close handshake.
    pub fn drop_connections(&self) {
        let _ = self.commands.send(VenueCommand::DropConnections);
    }
}

impl Drop for MockVenue {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn serve(
    stream: TcpStream,
    script: Arc<VenueScript>,
    requests: Arc<Mutex<Vec<Value>>>,
    mut commands: broadcast::Receiver<VenueCommand>,
) {
    let Ok(ws_stream) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    requests.lock().push(request.clone());
                    for reply in script.respond(&request) {
                        if write.send(Message::Text(reply.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) if script.ignore_close => {
                    // Stop polling the socket so no close reply is flushed.
                    hold_open(&mut commands).await;
                    return;
                }
                Some(Ok(Message::Close(_))) => {
                    let _ = write.close().await;
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return,
            },
            command = commands.recv() => match command {
                Ok(VenueCommand::Send(text)) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Ok(VenueCommand::DropConnections) | Err(broadcast::error::RecvError::Closed) => return,
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            },
        }
    }
}

async fn hold_open(commands: &mut broadcast::Receiver<VenueCommand>) {
    loop {
        match commands.recv().await {
            Ok(VenueCommand::DropConnections) | Err(broadcast::error::RecvError::Closed) => return,
            Ok(VenueCommand::Send(_)) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
    }
}
