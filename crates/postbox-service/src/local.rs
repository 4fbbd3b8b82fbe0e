//! In-process transport over bounded tokio channels.
//!
//! [`LocalTransport::pair`] returns two connected ends. Each end delivers
//! incoming messages on its own receive thread once a callback is installed.
//! Both ends share one link state, so a fault raised on either side is seen
//! by both.
//!
//! | Condition                    | `send` result                       |
//! |------------------------------|-------------------------------------|
//! | peer queue full              | `Err(Interrupted)`, link unaffected |
//! | link interrupted             | `Err(Interrupted)`                  |
//! | peer dropped or invalidated  | `Err(Invalid)`                      |
//! | peer announced termination   | delivered                           |

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use postbox_protocol::{ConnectionError, Message};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::transport::{ErrorCallback, ReceiveCallback, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by both ends of a pair.
#[derive(Default)]
struct Link {
    fault: Mutex<Option<ConnectionError>>,
    error_callbacks: Mutex<Vec<ErrorCallback>>,
}

impl Link {
    fn fault(&self) -> Option<ConnectionError> {
        *lock(&self.fault)
    }

    /// Records `error` and notifies every error callback.
    ///
    /// `Invalid` is final. Raising the current fault again is a no-op.
    fn raise(&self, error: ConnectionError) {
        {
            let mut fault = lock(&self.fault);
            if matches!(*fault, Some(ConnectionError::Invalid)) || *fault == Some(error) {
                return;
            }
            *fault = Some(error);
        }

        info!(code = error.code(), error = %error, "link fault");
        let callbacks = lock(&self.error_callbacks).clone();
        for callback in callbacks {
            callback(error);
        }
    }

    fn clear(&self) -> bool {
        let mut fault = lock(&self.fault);
        match *fault {
            Some(ConnectionError::Invalid) => false,
            _ => {
                *fault = None;
                true
            }
        }
    }
}

/// One end of an in-process message link.
pub struct LocalTransport {
    name: String,
    outgoing: mpsc::Sender<Message>,
    incoming: Mutex<Option<mpsc::Receiver<Message>>>,
    link: Arc<Link>,
}

impl LocalTransport {
    /// Creates two connected ends whose queues each hold `capacity` messages.
    pub fn pair(capacity: usize) -> (Self, Self) {
        Self::named_pair("left", "right", capacity)
    }

    /// Same as [`LocalTransport::pair`], with names used in log output.
    pub fn named_pair(
        left: impl Into<String>,
        right: impl Into<String>,
        capacity: usize,
    ) -> (Self, Self) {
        let capacity = capacity.max(1);
        let (to_left, left_rx) = mpsc::channel(capacity);
        let (to_right, right_rx) = mpsc::channel(capacity);
        let link = Arc::new(Link::default());

        let left = Self {
            name: left.into(),
            outgoing: to_right,
            incoming: Mutex::new(Some(left_rx)),
            link: Arc::clone(&link),
        };
        let right = Self {
            name: right.into(),
            outgoing: to_left,
            incoming: Mutex::new(Some(right_rx)),
            link,
        };
        (left, right)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current link fault, `None` while connected.
    pub fn fault(&self) -> Option<ConnectionError> {
        self.link.fault()
    }

    pub fn is_connected(&self) -> bool {
        self.link.fault().is_none()
    }

    /// Marks the link interrupted. Sends fail until [`LocalTransport::reconnect`].
    pub fn interrupt(&self) {
        self.link.raise(ConnectionError::Interrupted);
    }

    /// Tells both ends that this side is about to go away.
    pub fn announce_termination(&self) {
        self.link.raise(ConnectionError::TerminationImminent);
    }

    /// Permanently closes the link.
    pub fn invalidate(&self) {
        self.link.raise(ConnectionError::Invalid);
    }

    /// Clears a transient fault. Returns false if the link is invalid.
    pub fn reconnect(&self) -> bool {
        let cleared = self.link.clear();
        if cleared {
            debug!(transport = %self.name, "link restored");
        }
        cleared
    }
}

impl Transport for LocalTransport {
    fn send(&self, message: Message) -> Result<(), ConnectionError> {
        if let Some(fault @ (ConnectionError::Interrupted | ConnectionError::Invalid)) =
            self.link.fault()
        {
            return Err(fault);
        }

        match self.outgoing.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                warn!(
                    transport = %self.name,
                    message_id = %message.id(),
                    "peer queue full, message not sent"
                );
                Err(ConnectionError::Interrupted)
            }
            Err(TrySendError::Closed(_)) => {
                self.link.raise(ConnectionError::Invalid);
                Err(ConnectionError::Invalid)
            }
        }
    }

    fn on_receive(&self, callback: ReceiveCallback) {
        let Some(mut incoming) = lock(&self.incoming).take() else {
            warn!(transport = %self.name, "receive callback already installed");
            return;
        };

        let link = Arc::clone(&self.link);
        let name = self.name.clone();
        let spawned = thread::Builder::new()
            .name(format!("postbox-{}", self.name))
            .spawn(move || {
                while let Some(message) = incoming.blocking_recv() {
                    callback(message);
                }
                debug!(transport = %name, "peer hung up");
                link.raise(ConnectionError::Invalid);
            });

        if let Err(e) = spawned {
            error!(transport = %self.name, error = %e, "failed to start receive thread");
        }
    }

    fn on_connection_error(&self, callback: ErrorCallback) {
        lock(&self.link.error_callbacks).push(callback);
    }
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("name", &self.name)
            .field("fault", &self.link.fault())
            .finish_non_exhaustive()
    }
}
