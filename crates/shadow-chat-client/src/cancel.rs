//! Registry of in-flight chat requests.
//!
//! Every send registers a cancellation token under its request ID and
//! resolves it when the request finishes, however it finishes. "Stop" cancels
//! everything still registered.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use shadow_chat_core::RequestId;

/// Set of cancellation handles for pending requests, newest first.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    pending: Mutex<VecDeque<(RequestId, CancellationToken)>>,
}

impl CancellationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request to the front of the pending set.
    pub fn register(&self, request_id: RequestId, token: CancellationToken) {
        self.pending.lock().push_front((request_id, token));
        tracing::debug!(request_id = %request_id, "Request registered");
    }

    /// Create, register and return a fresh token for `request_id`.
    pub fn issue(&self, request_id: RequestId) -> CancellationToken {
        let token = CancellationToken::new();
        self.register(request_id, token.clone());
        token
    }

    /// Remove a request from the pending set.
    ///
    /// Returns `false` if it was not registered.
    pub fn resolve(&self, request_id: RequestId) -> bool {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|(id, _)| *id != request_id);
        before != pending.len()
    }

    /// Cancel every pending request and return how many were signalled.
    ///
    /// Entries stay registered until their own request resolves them. Calling
    /// this with nothing pending is a no-op.
    pub fn abort_all(&self) -> usize {
        let pending = self.pending.lock();
        for (request_id, token) in pending.iter() {
            tracing::debug!(request_id = %request_id, "Cancelling request");
            token.cancel();
        }
        pending.len()
    }

    /// Check whether a request is still pending.
    #[must_use]
    pub fn contains(&self, request_id: RequestId) -> bool {
        self.pending.lock().iter().any(|(id, _)| *id == request_id)
    }

    /// Pending request IDs, newest first.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<RequestId> {
        self.pending.lock().iter().map(|(id, _)| *id).collect()
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_adds_to_front() {
        let registry = CancellationRegistry::new();
        let first = RequestId::generate();
        let second = RequestId::generate();

        registry.issue(first);
        registry.issue(second);

        assert_eq!(registry.pending_ids(), vec![second, first]);
    }

    #[test]
    fn resolve_removes_only_that_request() {
        let registry = CancellationRegistry::new();
        let first = RequestId::generate();
        let second = RequestId::generate();
        registry.issue(first);
        registry.issue(second);

        assert!(registry.resolve(first));
        assert!(!registry.contains(first));
        assert!(registry.contains(second));
        assert!(!registry.resolve(first));
    }

    #[test]
    fn abort_all_cancels_every_token() {
        let registry = CancellationRegistry::new();
        let a = registry.issue(RequestId::generate());
        let b = registry.issue(RequestId::generate());

        assert_eq!(registry.abort_all(), 2);
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn abort_all_on_empty_is_noop() {
        let registry = CancellationRegistry::new();
        assert_eq!(registry.abort_all(), 0);
        assert_eq!(registry.abort_all(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn resolved_request_not_cancelled_later() {
        let registry = CancellationRegistry::new();
        let id = RequestId::generate();
        let token = registry.issue(id);
        registry.resolve(id);

        registry.abort_all();
        assert!(!token.is_cancelled());
    }
}
