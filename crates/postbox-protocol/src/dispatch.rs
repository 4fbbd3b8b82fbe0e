//! Invocation dispatch through a registered capability table.
//!
//! Messages name their target and method as plain identifiers. Nothing is
//! looked up reflectively: a [`CapabilityTable`] is filled ahead of time with
//! closures, and dispatch is a pair of map lookups.
//!
//! ```text
//! Message { invocation: ("clock", "now", None) }
//!   ↓
//! message.invoke(&table)
//!   ↓
//! table.dispatch("clock", "now", None)
//!   ↓  lookup targets["clock"]["now"]
//! closure(None) -> Ok(Some(Value::Integer(..)))
//!   ↓
//! reply { result: .. }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use postbox_core::Value;
use thiserror::Error;
use tracing::debug;

use crate::error::BoxError;
use crate::invocation::{MethodId, TargetRef};

/// Result type returned by dispatchers and capabilities.
pub type DispatchResult = Result<Option<Value>, DispatchError>;

/// Why a dispatch did not produce a value.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No capability is registered under the target/method pair.
    #[error("no capability '{method}' registered for '{target}'")]
    NotFound { target: TargetRef, method: MethodId },

    /// The capability ran and failed.
    #[error("capability fault: {0}")]
    Fault(#[source] BoxError),
}

impl DispatchError {
    pub fn not_found(target: impl Into<TargetRef>, method: impl Into<MethodId>) -> Self {
        Self::NotFound {
            target: target.into(),
            method: method.into(),
        }
    }

    pub fn fault(cause: impl Into<BoxError>) -> Self {
        Self::Fault(cause.into())
    }
}

/// Performs a named call against a resolved target.
///
/// Implementations block until the call completes. Running calls off the
/// caller's thread, timeouts, and cancellation are the implementor's business.
pub trait Dispatcher: Send + Sync {
    fn dispatch(
        &self,
        target: &TargetRef,
        method: &MethodId,
        argument: Option<&Value>,
    ) -> DispatchResult;
}

impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    fn dispatch(
        &self,
        target: &TargetRef,
        method: &MethodId,
        argument: Option<&Value>,
    ) -> DispatchResult {
        (**self).dispatch(target, method, argument)
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for &D {
    fn dispatch(
        &self,
        target: &TargetRef,
        method: &MethodId,
        argument: Option<&Value>,
    ) -> DispatchResult {
        (**self).dispatch(target, method, argument)
    }
}

/// Type-erased capability closure.
type CapabilityFn = Box<dyn Fn(Option<&Value>) -> Result<Option<Value>, BoxError> + Send + Sync>;

/// Dispatcher backed by a table of registered closures.
#[derive(Default)]
pub struct CapabilityTable {
    targets: HashMap<TargetRef, HashMap<MethodId, CapabilityFn>>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `capability` under `target`/`method`, replacing any previous entry.
    ///
    /// ```rust
    /// use postbox_protocol::{CapabilityTable, Message, RESULT_KEY};
    ///
    /// let mut table = CapabilityTable::new();
    /// table.register("echo", "say", |arg| Ok(arg.cloned()));
    ///
    /// let request = Message::with_invocation("echo", "say", Some("hi".into()));
    /// let reply = request.invoke(&table).unwrap();
    /// assert_eq!(reply.get_string(RESULT_KEY), "hi");
    /// ```
    pub fn register<F>(
        &mut self,
        target: impl Into<TargetRef>,
        method: impl Into<MethodId>,
        capability: F,
    ) -> &mut Self
    where
        F: Fn(Option<&Value>) -> Result<Option<Value>, BoxError> + Send + Sync + 'static,
    {
        let target = target.into();
        let method = method.into();
        debug!(target_ref = %target, method = %method, "registering capability");
        self.targets
            .entry(target)
            .or_default()
            .insert(method, Box::new(capability));
        self
    }

    /// Removes every capability registered for `target`.
    pub fn unregister_target(&mut self, target: &str) -> bool {
        self.targets.remove(target).is_some()
    }

    pub fn has_capability(&self, target: &str, method: &str) -> bool {
        self.targets
            .get(target)
            .is_some_and(|methods| methods.contains_key(method))
    }

    /// Total number of registered target/method pairs.
    pub fn capability_count(&self) -> usize {
        self.targets.values().map(HashMap::len).sum()
    }
}

impl Dispatcher for CapabilityTable {
    fn dispatch(
        &self,
        target: &TargetRef,
        method: &MethodId,
        argument: Option<&Value>,
    ) -> DispatchResult {
        let capability = self
            .targets
            .get(target)
            .and_then(|methods| methods.get(method))
            .ok_or_else(|| DispatchError::not_found(target.clone(), method.clone()))?;

        capability(argument).map_err(DispatchError::Fault)
    }
}

impl fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (target, methods) in &self.targets {
            let names: Vec<&str> = methods.keys().map(MethodId::as_str).collect();
            map.entry(&target.as_str(), &names);
        }
        map.finish()
    }
}
