//! Invocation handling for incoming requests.
//!
//! Every incoming message that carries an invocation goes through
//! [`InvocationHandler::handle`], which always produces a reply: either the
//! call's result or an error reply describing why it failed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use postbox_protocol::{Dispatcher, Message, MessageError, MessageResult, MethodId};
use tracing::{debug, warn};

/// Runs invocations against a shared dispatcher.
#[derive(Clone)]
pub struct InvocationHandler {
    dispatcher: Arc<dyn Dispatcher>,
    invoke_timeout: Duration,
}

impl InvocationHandler {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, invoke_timeout: Duration) -> Self {
        Self {
            dispatcher,
            invoke_timeout,
        }
    }

    pub fn invoke_timeout(&self) -> Duration {
        self.invoke_timeout
    }

    /// Handles `request` and returns the reply to send back.
    pub async fn handle(&self, request: Message) -> Message {
        let start = Instant::now();

        let reply = match self.invoke(&request).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(
                    message_id = %request.id(),
                    code = %err.code().as_str(),
                    error = %err,
                    "Invocation failed"
                );
                Message::error_reply(&request, &err)
            }
        };

        debug!(
            message_id = %request.id(),
            duration_ms = start.elapsed().as_millis(),
            "Invocation handled"
        );
        reply
    }

    /// Invokes `request` on the blocking pool, bounded by the invoke timeout.
    ///
    /// A capability that panics or overruns the timeout is reported as an
    /// [`MessageError::InvocationFault`]. An overrunning call is not
    /// cancelled; its eventual result is discarded.
    pub async fn invoke(&self, request: &Message) -> MessageResult<Message> {
        let method = request
            .invocation()
            .filter(|_| request.is_invocable())
            .map(|spec| spec.method.clone())
            .ok_or(MessageError::NotInvocable)?;

        let dispatcher = Arc::clone(&self.dispatcher);
        let message = request.clone();
        let task = tokio::task::spawn_blocking(move || message.invoke(&dispatcher));

        match tokio::time::timeout(self.invoke_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(MessageError::invocation_fault(method, join_error)),
            Err(elapsed) => Err(fault_with_timeout(method, elapsed)),
        }
    }
}

fn fault_with_timeout(method: MethodId, elapsed: tokio::time::error::Elapsed) -> MessageError {
    warn!(method = %method, "Invocation timed out");
    MessageError::invocation_fault(method, elapsed)
}

impl std::fmt::Debug for InvocationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationHandler")
            .field("invoke_timeout", &self.invoke_timeout)
            .finish_non_exhaustive()
    }
}
