//! Transport abstraction.
//!
//! An [`crate::Endpoint`] only needs a way to push messages to its peer and
//! a way to be told about incoming ones and about faults on the link.

use std::sync::Arc;

use postbox_protocol::{ConnectionError, Message};

/// Called for every message that arrives from the peer.
pub type ReceiveCallback = Box<dyn Fn(Message) + Send + Sync + 'static>;

/// Called when the link reports a fault.
pub type ErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync + 'static>;

/// A bidirectional link to exactly one peer.
pub trait Transport: Send + Sync + 'static {
    /// Queues `message` for delivery to the peer.
    fn send(&self, message: Message) -> Result<(), ConnectionError>;

    /// Installs the callback that receives incoming messages.
    ///
    /// Callbacks run outside any async context and may block while the
    /// receiver applies backpressure. Messages are delivered in order.
    fn on_receive(&self, callback: ReceiveCallback);

    /// Installs a callback for link faults. Transports that never fault can
    /// keep the default, which drops the callback.
    fn on_connection_error(&self, callback: ErrorCallback) {
        drop(callback);
    }
}
