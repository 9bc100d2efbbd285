//! Outbound requests waiting for the peer's reply.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::CallError;
use crate::rpc::method::OutgoingMethod;

/// How long the peer has to answer an outbound request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(5_000);

pub type Completion = oneshot::Sender<Result<Value, CallError>>;

#[derive(Debug)]
pub struct PendingRequest {
    method: Arc<OutgoingMethod>,
    completion: Completion,
    deadline: Instant,
}

impl PendingRequest {
    pub fn new(method: Arc<OutgoingMethod>, completion: Completion, deadline: Instant) -> Self {
        Self {
            method,
            completion,
            deadline,
        }
    }

    pub fn method(&self) -> &OutgoingMethod {
        &self.method
    }

    /// Resolves the caller's future. The caller may have given up already.
    pub fn complete(self, outcome: Result<Value, CallError>) {
        let _ = self.completion.send(outcome);
    }
}

#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: HashMap<u64, PendingRequest>,
}

impl PendingRequests {
    pub fn insert(&mut self, id: u64, request: PendingRequest) {
        self.requests.insert(id, request);
    }

    pub fn take(&mut self, id: u64) -> Option<PendingRequest> {
        self.requests.remove(&id)
    }

    /// Removes every request whose deadline is at or before `now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<(u64, PendingRequest)> {
        let expired: Vec<u64> = self
            .requests
            .iter()
            .filter(|(_, request)| request.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.requests.remove(&id).map(|request| (id, request)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Drops every request; their callers observe a closed connection.
    pub fn abandon_all(&mut self) {
        self.requests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::method::{OutgoingMethodAttributes, RequestMethod};

    static ASK: RequestMethod<(), bool> = RequestMethod::new("test/ask", "answer");

    fn pending(deadline: Instant) -> (PendingRequest, oneshot::Receiver<Result<Value, CallError>>) {
        let method = Arc::new(ASK.describe("Ask", OutgoingMethodAttributes::default()));
        let (completion, receiver) = oneshot::channel();
        (PendingRequest::new(method, completion, deadline), receiver)
    }

    #[test]
    fn take_expired_only_removes_elapsed_requests() {
        let now = Instant::now();
        let mut requests = PendingRequests::default();
        let (early, _early_rx) = pending(now);
        let (late, _late_rx) = pending(now + REQUEST_TIMEOUT);
        requests.insert(1, early);
        requests.insert(2, late);

        let expired = requests.take_expired(now + Duration::from_millis(1));

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, 1);
        assert_eq!(requests.len(), 1);
        assert!(requests.take(2).is_some());
        assert!(requests.is_empty());
    }

    #[test]
    fn abandoned_request_reports_closed_channel() {
        let mut requests = PendingRequests::default();
        let (request, mut receiver) = pending(Instant::now());
        requests.insert(1, request);

        requests.abandon_all();

        assert!(receiver.try_recv().is_err());
    }
}
