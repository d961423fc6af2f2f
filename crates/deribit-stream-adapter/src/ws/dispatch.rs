/*
[INPUT]:  Channel names, caller-supplied handlers, decoded push payloads
[OUTPUT]: Handler invocations keyed by channel
[POS]:    WebSocket layer - channel dispatch table
[UPDATE]: When changing handler signature or failure isolation
*/

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, warn};

/// Error a handler may return; logged with the channel and then dropped
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Callback for one channel's decoded `params.data`
pub type ChannelHandler = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

/// Result of a single dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Handled,
    NoHandler,
    HandlerFailed,
}

/// Channel name -> handler.
///
/// The lock is released before a handler runs, so handlers may register or
/// unregister channels themselves.
#[derive(Default)]
pub struct DispatchTable {
    handlers: Mutex<HashMap<String, ChannelHandler>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `channel`, replacing any previous one.
    pub fn register<F>(&self, channel: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        let channel = channel.into();
        if self
            .handlers
            .lock()
            .insert(channel.clone(), Arc::new(handler))
            .is_some()
        {
            debug!(%channel, "channel handler replaced");
        }
    }

    /// Returns true if a handler was removed.
    pub fn unregister(&self, channel: &str) -> bool {
        self.handlers.lock().remove(channel).is_some()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.handlers.lock().contains_key(channel)
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<_> = self.handlers.lock().keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke the handler for `channel`. Errors and panics stay inside.
    pub fn dispatch(&self, channel: &str, payload: &Value) -> Dispatched {
        let handler = self.handlers.lock().get(channel).cloned();
        let Some(handler) = handler else {
            debug!(%channel, "push for unregistered channel dropped");
            return Dispatched::NoHandler;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
            Ok(Ok(())) => Dispatched::Handled,
            Ok(Err(err)) => {
                warn!(%channel, error = %err, "channel handler returned error");
                Dispatched::HandlerFailed
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%channel, panic = %message, "channel handler panicked");
                Dispatched::HandlerFailed
            }
        }
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("channels", &self.channels())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
