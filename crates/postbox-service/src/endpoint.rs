//! One side of a message link.
//!
//! An [`Endpoint`] owns a [`Transport`] and routes everything that arrives
//! on it:
//!
//! ```text
//! incoming message
//!   ├─ reply to one of our requests  → completes that request
//!   ├─ carries an invocation         → InvocationHandler → reply sent back
//!   └─ anything else                 → inbox (Endpoint::next_message)
//! ```
//!
//! A reply nobody is waiting for, e.g. one that arrives after its request
//! timed out, is dropped. A full inbox blocks the transport's receive
//! callback, so the transport queue fills and the peer's `send` starts failing
//! instead of messages vanishing.
//!
//! Link faults fail every outstanding request with the transport's error.

use std::sync::{Arc, Weak};

use postbox_protocol::{ConnectionError, Dispatcher, Message, MethodId, TargetRef, Value};
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, trace, warn};

use crate::config::EndpointConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::handler::InvocationHandler;
use crate::pending::PendingReplies;
use crate::transport::Transport;

/// A running endpoint over transport `T`.
pub struct Endpoint<T: Transport> {
    config: EndpointConfig,
    transport: Arc<T>,
    pending: Arc<PendingReplies>,
    inbox: Mutex<mpsc::Receiver<Message>>,
}

impl<T: Transport> Endpoint<T> {
    /// Starts routing messages arriving on `transport`.
    ///
    /// Invocations are answered through `dispatcher`. Must be called from
    /// within a tokio runtime, which is used to run those invocations.
    pub fn start(
        config: EndpointConfig,
        transport: T,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> ServiceResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current()?;

        let transport = Arc::new(transport);
        let pending = Arc::new(PendingReplies::new());
        let (inbox_tx, inbox_rx) = mpsc::channel(config.channel_capacity);

        let router = Router {
            name: config.name.clone(),
            transport: Arc::downgrade(&transport),
            pending: Arc::clone(&pending),
            handler: InvocationHandler::new(dispatcher, config.invoke_timeout()),
            inbox: inbox_tx,
            runtime,
        };
        transport.on_receive(Box::new(move |message| router.route(message)));

        let on_fault = Arc::clone(&pending);
        let name = config.name.clone();
        transport.on_connection_error(Arc::new(move |error| {
            // Replies may still arrive from a peer that is shutting down.
            if error == ConnectionError::TerminationImminent {
                info!(endpoint = %name, "Peer announced termination");
                return;
            }
            notify_connection_error(&name, &on_fault, error);
        }));

        info!(endpoint = %config.name, "Endpoint started");

        Ok(Self {
            config,
            transport,
            pending,
            inbox: Mutex::new(inbox_rx),
        })
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Sends `message` without waiting for anything back.
    pub fn send(&self, message: Message) -> ServiceResult<()> {
        trace!(endpoint = %self.config.name, message_id = %message.id(), "sending");
        self.transport.send(message)?;
        Ok(())
    }

    /// Sends `message` and waits for the reply correlated with it.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Connection`] if the send fails or the link faults
    ///   while waiting
    /// - [`ServiceError::Timeout`] if no reply arrives within the request timeout
    /// - [`ServiceError::Remote`] if the peer answered with an error reply
    pub async fn request(&self, message: Message) -> ServiceResult<Message> {
        let token = message.reply_token();
        let reply_rx = self.pending.register(token.clone());

        if let Err(err) = self.transport.send(message) {
            self.pending.cancel(&token);
            return Err(err.into());
        }

        let reply = match tokio::time::timeout(self.config.request_timeout(), reply_rx).await {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(_)) => return Err(ServiceError::ChannelClosed),
            Err(_) => {
                self.pending.cancel(&token);
                return Err(ServiceError::timeout(format!("awaiting reply {token}")));
            }
        };

        match reply.remote_error() {
            Some(remote) => Err(ServiceError::Remote(remote)),
            None => Ok(reply),
        }
    }

    /// Asks the peer to run `method` on `target` and returns the call's result.
    pub async fn invoke_remote(
        &self,
        target: impl Into<TargetRef>,
        method: impl Into<MethodId>,
        argument: Option<Value>,
    ) -> ServiceResult<Option<Value>> {
        let reply = self
            .request(Message::with_invocation(target, method, argument))
            .await?;
        Ok(reply.result().cloned())
    }

    /// Waits for the next message that is neither a reply nor an invocation.
    ///
    /// While the inbox is full, delivery from the transport stalls, replies
    /// included, until this is called. Returns `None` once the transport can
    /// deliver nothing more.
    pub async fn next_message(&self) -> Option<Message> {
        self.inbox.lock().await.recv().await
    }

    /// Fails every outstanding request with `error`.
    pub fn notify_connection_error(&self, error: ConnectionError) -> usize {
        notify_connection_error(&self.config.name, &self.pending, error)
    }
}

fn notify_connection_error(name: &str, pending: &PendingReplies, error: ConnectionError) -> usize {
    let failed = pending.fail_all(error);
    warn!(
        endpoint = %name,
        code = error.code(),
        error = %error,
        failed,
        "Connection error"
    );
    failed
}

impl<T: Transport> std::fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Receive-side state captured by the transport callback.
struct Router<T: Transport> {
    name: String,
    transport: Weak<T>,
    pending: Arc<PendingReplies>,
    handler: InvocationHandler,
    inbox: mpsc::Sender<Message>,
    runtime: Handle,
}

impl<T: Transport> Router<T> {
    fn route(&self, message: Message) {
        let message = if message.is_reply() {
            match self.pending.complete(message) {
                Ok(()) => return,
                Err(stale) if stale.invocation().is_none() => {
                    debug!(
                        endpoint = %self.name,
                        message_id = %stale.id(),
                        "Dropping reply nobody awaits"
                    );
                    return;
                }
                Err(unmatched) => unmatched,
            }
        } else {
            message
        };

        if message.invocation().is_some() {
            self.answer(message);
        } else if let Err(e) = self.inbox.blocking_send(message) {
            warn!(endpoint = %self.name, message_id = %e.0.id(), "Inbox closed, message dropped");
        }
    }

    fn answer(&self, request: Message) {
        let handler = self.handler.clone();
        let transport = self.transport.clone();
        let name = self.name.clone();

        self.runtime.spawn(async move {
            let reply = handler.handle(request).await;
            let Some(transport) = transport.upgrade() else {
                debug!(endpoint = %name, "Endpoint gone, reply discarded");
                return;
            };
            if let Err(e) = transport.send(reply) {
                warn!(endpoint = %name, error = %e, "Failed to send reply");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalTransport;
    use postbox_protocol::{CapabilityTable, ErrorCode, RESULT_KEY};
    use std::time::Duration;

    fn capabilities() -> Arc<dyn Dispatcher> {
        let mut table = CapabilityTable::new();
        table
            .register("targetA", "ping", |_| Ok(Some(Value::from("pong"))))
            .register("math", "double", |arg| {
                let n = arg.and_then(Value::as_integer).ok_or("expected an integer")?;
                Ok(Some(Value::Integer(n * 2)))
            })
            .register("math", "stall", |_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(None)
            });
        Arc::new(table)
    }

    fn config(name: &str) -> EndpointConfig {
        EndpointConfig::new(name)
            .with_request_timeout(Duration::from_secs(5))
            .with_invoke_timeout(Duration::from_secs(5))
    }

    fn connected() -> (Endpoint<LocalTransport>, Endpoint<LocalTransport>) {
        let (left, right) = LocalTransport::named_pair("client", "service", 16);
        let client = Endpoint::start(config("client"), left, capabilities()).unwrap();
        let service = Endpoint::start(config("service"), right, capabilities()).unwrap();
        (client, service)
    }

    #[tokio::test]
    async fn request_gets_correlated_reply() {
        let (client, _service) = connected();
        let request = Message::with_invocation("targetA", "ping", None);
        let token = request.reply_token();

        let reply = client.request(request).await.unwrap();
        assert_eq!(reply.get_string(RESULT_KEY), "pong");
        assert_eq!(reply.correlation(), Some(&token));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn invoke_remote_returns_result() {
        let (client, service) = connected();

        let doubled = client
            .invoke_remote("math", "double", Some(Value::Integer(21)))
            .await
            .unwrap();
        assert_eq!(doubled, Some(Value::Integer(42)));

        // Either side can call the other.
        let pong = service.invoke_remote("targetA", "ping", None).await.unwrap();
        assert_eq!(pong, Some(Value::from("pong")));
    }

    #[tokio::test]
    async fn remote_errors_surface_with_codes() {
        let (client, _service) = connected();

        let err = client
            .invoke_remote("targetB", "ping", None)
            .await
            .unwrap_err();
        match err {
            ServiceError::Remote(remote) => assert_eq!(remote.code, ErrorCode::UnresolvedTarget),
            other => panic!("unexpected error: {other}"),
        }

        let err = client
            .invoke_remote("math", "double", Some(Value::from("x")))
            .await
            .unwrap_err();
        match err {
            ServiceError::Remote(remote) => {
                assert_eq!(remote.code, ErrorCode::InvocationFault);
                assert!(remote.message.contains("expected an integer"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_invocation_reports_fault() {
        let (left, right) = LocalTransport::pair(16);
        let client = Endpoint::start(config("client"), left, capabilities()).unwrap();
        let _service = Endpoint::start(
            config("service").with_invoke_timeout(Duration::from_millis(20)),
            right,
            capabilities(),
        )
        .unwrap();

        let err = client.invoke_remote("math", "stall", None).await.unwrap_err();
        match err {
            ServiceError::Remote(remote) => assert_eq!(remote.code, ErrorCode::InvocationFault),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn plain_messages_reach_inbox() {
        let (client, service) = connected();

        let mut note = Message::new();
        note.set_string("status", "ready");
        note.set_integer("count", 3);
        client.send(note.clone()).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), service.next_message())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, note);
    }

    #[tokio::test]
    async fn full_inbox_holds_messages_back() {
        let (left, right) = LocalTransport::pair(16);
        let small = |name| config(name).with_channel_capacity(2);
        let client = Endpoint::start(small("client"), left, capabilities()).unwrap();
        let service = Endpoint::start(small("service"), right, capabilities()).unwrap();

        for n in 0..5i64 {
            client.send(Message::from_pair("n", n)).unwrap();
        }

        let mut delivered = Vec::new();
        for _ in 0..5 {
            let message = tokio::time::timeout(Duration::from_secs(5), service.next_message())
                .await
                .unwrap()
                .unwrap();
            delivered.push(message.get_integer("n"));
        }
        assert_eq!(delivered, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn stray_reply_skips_inbox() {
        let (left, raw_peer) = LocalTransport::pair(16);
        let client = Endpoint::start(config("client"), left, capabilities()).unwrap();

        let mut late = Message::reply_to(&Message::new());
        late.set(RESULT_KEY, "too late");
        raw_peer.send(late).unwrap();
        raw_peer.send(Message::from_pair("seq", 1i64)).unwrap();

        let next = tokio::time::timeout(Duration::from_secs(5), client.next_message())
            .await
            .unwrap()
            .unwrap();
        assert!(!next.is_reply());
        assert_eq!(next.get_integer("seq"), 1);
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let (left, _silent) = LocalTransport::pair(16);
        let client = Endpoint::start(
            config("client").with_request_timeout(Duration::from_millis(50)),
            left,
            capabilities(),
        )
        .unwrap();

        let err = client
            .request(Message::with_invocation("targetA", "ping", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Timeout { .. }));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn link_fault_fails_outstanding_requests() {
        let (left, silent) = LocalTransport::pair(16);
        let client = Arc::new(Endpoint::start(config("client"), left, capabilities()).unwrap());

        let waiting = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .request(Message::with_invocation("targetA", "ping", None))
                    .await
            })
        };

        while client.pending_requests() == 0 {
            tokio::task::yield_now().await;
        }
        silent.interrupt();

        let err = waiting.await.unwrap().unwrap_err();
        assert_eq!(err.connection_error(), Some(ConnectionError::Interrupted));

        let err = client.send(Message::new()).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Connection(ConnectionError::Interrupted)
        ));
    }

    #[tokio::test]
    async fn termination_notice_keeps_requests_waiting() {
        let (left, silent) = LocalTransport::pair(16);
        let client = Arc::new(Endpoint::start(config("client"), left, capabilities()).unwrap());

        let _waiting = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .request(Message::with_invocation("targetA", "ping", None))
                    .await
            })
        };

        while client.pending_requests() == 0 {
            tokio::task::yield_now().await;
        }
        silent.announce_termination();

        assert_eq!(client.pending_requests(), 1);
        assert_eq!(client.notify_connection_error(ConnectionError::Invalid), 1);
    }

    #[tokio::test]
    async fn notify_connection_error_reports_count() {
        let (client, _service) = connected();
        assert_eq!(client.notify_connection_error(ConnectionError::Invalid), 0);
    }

    #[test]
    fn start_requires_runtime() {
        let (left, _right) = LocalTransport::pair(4);
        let err = Endpoint::start(config("client"), left, capabilities()).unwrap_err();
        assert!(matches!(err, ServiceError::Runtime(_)));
    }

    #[tokio::test]
    async fn invalid_config_rejected() {
        let (left, _right) = LocalTransport::pair(4);
        let err = Endpoint::start(
            config("client").with_channel_capacity(0),
            left,
            capabilities(),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Config { .. }));
    }
}
