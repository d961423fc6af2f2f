/*
[INPUT]:  Outgoing request intents and inbound reply identifiers
[OUTPUT]: Intent of the request a reply belongs to
[POS]:    WebSocket layer - request/response correlation
[UPDATE]: When adding request kinds or changing id allocation
*/

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use super::message::{RequestId, RpcError};

/// What a reply means once it arrives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestIntent {
    Authenticate,
    Subscribe(String),
    Unsubscribe(String),
    SetHeartbeat,
    HeartbeatTest,
}

impl fmt::Display for RequestIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIntent::Authenticate => f.write_str("authenticate"),
            RequestIntent::Subscribe(channel) => write!(f, "subscribe {channel}"),
            RequestIntent::Unsubscribe(channel) => write!(f, "unsubscribe {channel}"),
            RequestIntent::SetHeartbeat => f.write_str("set_heartbeat"),
            RequestIntent::HeartbeatTest => f.write_str("heartbeat test"),
        }
    }
}

/// How a tracked request ended
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Confirmed(Value),
    Rejected(RpcError),
    ConnectionLost,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub intent: RequestIntent,
    pub sent_at: Instant,
}

#[derive(Debug)]
struct Inner {
    next_id: RequestId,
    pending: HashMap<RequestId, PendingRequest>,
}

/// Maps outstanding request ids to their intent.
///
/// Allocation, registration and resolution share one mutex, so requests may
/// originate from any thread while replies are resolved on the I/O thread.
#[derive(Debug)]
pub struct Correlator {
    inner: Mutex<Inner>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                pending: HashMap::new(),
            }),
        }
    }

    /// Allocate a fresh id and register `intent` under it.
    pub fn track(&self, intent: RequestIntent) -> RequestId {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.pending.insert(
            id,
            PendingRequest {
                intent,
                sent_at: Instant::now(),
            },
        );
        id
    }

    /// Register under a caller-chosen id. Returns false if the id is already pending.
    pub fn register(&self, id: RequestId, intent: RequestIntent) -> bool {
        let mut inner = self.inner.lock();
        if inner.pending.contains_key(&id) {
            return false;
        }
        inner.next_id = inner.next_id.max(id + 1);
        inner.pending.insert(
            id,
            PendingRequest {
                intent,
                sent_at: Instant::now(),
            },
        );
        true
    }

    /// Remove and return the pending entry for `id`.
    pub fn resolve(&self, id: RequestId) -> Option<PendingRequest> {
        self.inner.lock().pending.remove(&id)
    }

    /// Drain every pending entry (connection teardown).
    pub fn fail_all(&self) -> Vec<(RequestId, PendingRequest)> {
        let mut drained: Vec<_> = self.inner.lock().pending.drain().collect();
        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    /// Drain entries sent more than `deadline` before `now`.
    pub fn expire(&self, deadline: Duration, now: Instant) -> Vec<(RequestId, PendingRequest)> {
        let mut inner = self.inner.lock();
        let expired: Vec<RequestId> = inner
            .pending
            .iter()
            .filter(|(_, pending)| now.saturating_duration_since(pending.sent_at) >= deadline)
            .map(|(id, _)| *id)
            .collect();

        let mut drained: Vec<_> = expired
            .into_iter()
            .filter_map(|id| inner.pending.remove(&id).map(|pending| (id, pending)))
            .collect();
        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_ids_are_unique_per_request() {
        let correlator = Correlator::new();
        let a = correlator.track(RequestIntent::Subscribe("c".to_string()));
        let b = correlator.track(RequestIntent::Subscribe("c".to_string()));
        assert_ne!(a, b);
        assert_eq!(correlator.len(), 2);
    }

    #[test]
    fn test_resolve_removes_entry() {
        let correlator = Correlator::new();
        let id = correlator.track(RequestIntent::Authenticate);

        let pending = correlator.resolve(id).expect("pending");
        assert_eq!(pending.intent, RequestIntent::Authenticate);
        assert!(correlator.resolve(id).is_none());
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_register_rejects_duplicate_and_advances_counter() {
        let correlator = Correlator::new();
        assert!(correlator.register(9929, RequestIntent::Authenticate));
        assert!(!correlator.register(9929, RequestIntent::SetHeartbeat));
        assert_eq!(correlator.track(RequestIntent::SetHeartbeat), 9930);
    }

    #[test]
    fn test_fail_all_drains_in_id_order() {
        let correlator = Correlator::new();
        correlator.track(RequestIntent::Authenticate);
        correlator.track(RequestIntent::Subscribe("a".to_string()));
        correlator.track(RequestIntent::Unsubscribe("b".to_string()));

        let drained = correlator.fail_all();
        let ids: Vec<_> = drained.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_expire_only_takes_old_entries() {
        let correlator = Correlator::new();
        let old = correlator.track(RequestIntent::Subscribe("old".to_string()));
        let later = Instant::now() + Duration::from_secs(10);

        let expired = correlator.expire(Duration::from_secs(5), later);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, old);

        let fresh = correlator.track(RequestIntent::Subscribe("fresh".to_string()));
        assert!(correlator.expire(Duration::from_secs(5), Instant::now()).is_empty());
        assert!(correlator.resolve(fresh).is_some());
    }

    #[test]
    fn test_concurrent_tracking_never_reuses_ids() {
        let correlator = Arc::new(Correlator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let correlator = correlator.clone();
                thread::spawn(move || {
                    (0..250)
                        .map(|_| correlator.track(RequestIntent::Subscribe("c".to_string())))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 1000);
        assert_eq!(correlator.len(), 1000);
    }
}
