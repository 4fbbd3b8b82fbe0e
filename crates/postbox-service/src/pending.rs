//! Requests waiting for their correlated reply.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use postbox_protocol::{ConnectionError, CorrelationToken, Message};
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// What a waiting request eventually receives.
pub type ReplyOutcome = Result<Message, ConnectionError>;

/// Table of in-flight requests keyed by correlation token.
#[derive(Debug, Default)]
pub struct PendingReplies {
    waiting: Mutex<HashMap<CorrelationToken, oneshot::Sender<ReplyOutcome>>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    fn waiting(&self) -> MutexGuard<'_, HashMap<CorrelationToken, oneshot::Sender<ReplyOutcome>>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a request under `token` and returns the receiving half.
    ///
    /// Registering the same token twice replaces the earlier waiter, whose
    /// receiver then sees a closed channel.
    pub fn register(&self, token: CorrelationToken) -> oneshot::Receiver<ReplyOutcome> {
        let (tx, rx) = oneshot::channel();
        trace!(token = %token, "awaiting reply");
        self.waiting().insert(token, tx);
        rx
    }

    /// Hands `reply` to the request it answers.
    ///
    /// Returns the reply back if no request is waiting for its token.
    pub fn complete(&self, reply: Message) -> Result<(), Message> {
        let Some(token) = reply.correlation() else {
            return Err(reply);
        };
        let Some(tx) = self.waiting().remove(token) else {
            return Err(reply);
        };
        // Requester may have timed out already.
        let _ = tx.send(Ok(reply));
        Ok(())
    }

    /// Forgets the request registered under `token`.
    pub fn cancel(&self, token: &CorrelationToken) -> bool {
        self.waiting().remove(token).is_some()
    }

    /// Fails every waiting request with `error`. Returns how many were failed.
    pub fn fail_all(&self, error: ConnectionError) -> usize {
        let drained: Vec<_> = self.waiting().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(error));
        }
        if count > 0 {
            debug!(count, error = %error, "failed pending requests");
        }
        count
    }

    pub fn contains(&self, token: &CorrelationToken) -> bool {
        self.waiting().contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.waiting().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_routes_reply_to_waiter() {
        let pending = PendingReplies::new();
        let request = Message::from_pair("q", "ping");
        let rx = pending.register(request.reply_token());
        assert_eq!(pending.len(), 1);

        let mut reply = Message::reply_to(&request);
        reply.set("a", "pong");
        pending.complete(reply).unwrap();

        let reply = rx.await.unwrap().unwrap();
        assert_eq!(reply.get_string("a"), "pong");
        assert!(pending.is_empty());
    }

    #[test]
    fn unmatched_reply_is_returned() {
        let pending = PendingReplies::new();
        let stray = Message::reply_to(&Message::new());
        let back = pending.complete(stray.clone()).unwrap_err();
        assert_eq!(back, stray);

        let plain = Message::from_pair("k", 1i64);
        assert!(pending.complete(plain).is_err());
    }

    #[tokio::test]
    async fn fail_all_drains_with_error() {
        let pending = PendingReplies::new();
        let first = pending.register(CorrelationToken::from("a"));
        let second = pending.register(CorrelationToken::from("b"));

        assert_eq!(pending.fail_all(ConnectionError::Interrupted), 2);
        assert!(pending.is_empty());
        assert_eq!(first.await.unwrap(), Err(ConnectionError::Interrupted));
        assert_eq!(second.await.unwrap(), Err(ConnectionError::Interrupted));

        assert_eq!(pending.fail_all(ConnectionError::Invalid), 0);
    }

    #[tokio::test]
    async fn cancel_closes_receiver() {
        let pending = PendingReplies::new();
        let token = CorrelationToken::from("t");
        let rx = pending.register(token.clone());

        assert!(pending.contains(&token));
        assert!(pending.cancel(&token));
        assert!(!pending.cancel(&token));
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn reregistering_replaces_waiter() {
        let pending = PendingReplies::new();
        let token = CorrelationToken::from("dup");
        let stale = pending.register(token.clone());
        let _fresh = pending.register(token);

        assert_eq!(pending.len(), 1);
        assert!(stale.await.is_err());
    }
}
