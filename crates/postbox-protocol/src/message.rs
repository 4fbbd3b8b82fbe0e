//! The message envelope.
//!
//! A [`Message`] wraps a [`Dictionary`] payload with typed accessors, an
//! optional correlation token linking replies to requests, and an optional
//! [`InvocationSpec`] describing a call the message can perform.
//!
//! # Accessor contract
//!
//! The `get_*` accessors never fail. An absent key or a value of another
//! variant yields the type's zero value:
//!
//! | accessor         | zero value        |
//! |------------------|-------------------|
//! | `get_string`     | `""`              |
//! | `get_bool`       | `false`           |
//! | `get_integer`    | `0`               |
//! | `get_double`     | `0.0`             |
//! | `get_float`      | `0.0`             |
//! | `get_url`        | `None`            |
//! | `get_bytes`      | `&[]`             |
//! | `get_array`      | `&[]`             |
//! | `get_dictionary` | empty dictionary  |
//! | `get_nested`     | `None`            |
//!
//! Numeric variants are not coerced into each other: `get_double` on a
//! [`Value::Float`] returns `0.0`. Use [`Message::try_get`] to tell a missing
//! or mistyped key apart from a genuine zero.

use std::fmt;

use postbox_core::{Dictionary, Url, Value, ValueKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatch::{DispatchError, Dispatcher};
use crate::error::{MessageError, MessageResult};
use crate::invocation::{InvocationSpec, MethodId, TargetRef};
use crate::types::{CorrelationToken, MessageId, RemoteError};
use crate::{ARGUMENT_KEY, ERROR_KEY, METHOD_KEY, RESULT_KEY, TARGET_KEY};

static EMPTY_DICTIONARY: Dictionary = Dictionary::new();

/// Typed message envelope.
///
/// Equality compares payload, correlation token and invocation; the
/// per-instance [`MessageId`] is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation: Option<CorrelationToken>,
    #[serde(default)]
    payload: Dictionary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation: Option<InvocationSpec>,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
            && self.correlation == other.correlation
            && self.invocation == other.invocation
    }
}

impl Message {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self::from_dictionary(Dictionary::new())
    }

    /// Wraps an already-built dictionary.
    pub fn from_dictionary(payload: Dictionary) -> Self {
        Self {
            id: MessageId::new(),
            correlation: None,
            payload,
            invocation: None,
        }
    }

    /// Wraps a decoded payload received from a transport.
    ///
    /// Raw payloads are data only: keys named like invocation fields do not
    /// make the message invocable.
    pub fn from_raw(raw: Value) -> MessageResult<Self> {
        raw.into_dictionary()
            .map(Self::from_dictionary)
            .map_err(|other| MessageError::Decode {
                found: other.kind(),
            })
    }

    /// Zips keys and values positionally.
    ///
    /// Fails with [`MessageError::ArityMismatch`] before inserting anything if
    /// the sequences differ in length. A repeated key keeps the last value.
    pub fn from_pairs<K, V>(
        keys: impl IntoIterator<Item = K>,
        values: impl IntoIterator<Item = V>,
    ) -> MessageResult<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let keys: Vec<K> = keys.into_iter().collect();
        let values: Vec<V> = values.into_iter().collect();
        if keys.len() != values.len() {
            return Err(MessageError::ArityMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        Ok(Self::from_dictionary(keys.into_iter().zip(values).collect()))
    }

    /// Creates a single-entry message.
    pub fn from_pair(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut message = Self::new();
        message.set(key, value);
        message
    }

    /// Builds a message from `key, value, key, value, ..., SENTINEL`.
    ///
    /// The list ends at the first [`crate::SENTINEL`] (or at the end of input);
    /// anything after the sentinel is ignored. Keys must be strings.
    ///
    /// Since the sentinel is [`Value::Null`], a null value cannot appear in the
    /// list: it ends the list early and its key is reported as dangling. Build
    /// such messages with [`Message::set`] or [`Message::from_pairs`] instead.
    pub fn from_variadic_pairs(items: impl IntoIterator<Item = Value>) -> MessageResult<Self> {
        let mut items = items.into_iter().take_while(|item| !item.is_null());
        let mut payload = Dictionary::new();
        let mut position = 0usize;

        while let Some(item) = items.next() {
            let key = match item {
                Value::String(key) => key,
                other => {
                    return Err(MessageError::malformed_list(format!(
                        "item {position} is {} where a string key was expected",
                        other.kind()
                    )));
                }
            };
            let Some(value) = items.next() else {
                return Err(MessageError::malformed_list(format!(
                    "key '{key}' at item {position} has no value (null ends the list)"
                )));
            };
            payload.insert(key, value);
            position += 2;
        }

        Ok(Self::from_dictionary(payload))
    }

    /// Creates an empty reply routed back to whoever awaits `origin`.
    pub fn reply_to(origin: &Message) -> Self {
        Self {
            id: MessageId::new(),
            correlation: Some(origin.reply_token()),
            payload: Dictionary::new(),
            invocation: None,
        }
    }

    /// Creates a reply carrying `error` under [`ERROR_KEY`].
    pub fn error_reply(origin: &Message, error: &MessageError) -> Self {
        let mut reply = Self::reply_to(origin);
        reply.set(ERROR_KEY, RemoteError::from(error).to_dictionary());
        reply
    }

    /// Creates a message describing a call of `method` on `target`.
    ///
    /// The triple is stored both as the invocation spec and, for peers that
    /// only look at payloads, under the `target`, `method` and `argument` keys.
    pub fn with_invocation(
        target: impl Into<TargetRef>,
        method: impl Into<MethodId>,
        argument: Option<Value>,
    ) -> Self {
        let spec = InvocationSpec::new(target, method, argument);
        let mut message = Self::new();
        message.set(TARGET_KEY, spec.target.as_str());
        message.set(METHOD_KEY, spec.method.as_str());
        if let Some(ref argument) = spec.argument {
            message.set(ARGUMENT_KEY, argument.clone());
        }
        message.invocation = Some(spec);
        message
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Token copied from the origin, if this message is a reply.
    pub fn correlation(&self) -> Option<&CorrelationToken> {
        self.correlation.as_ref()
    }

    /// Token a reply to this message will carry.
    pub fn reply_token(&self) -> CorrelationToken {
        self.correlation
            .clone()
            .unwrap_or_else(|| CorrelationToken::from(self.id))
    }

    pub fn is_reply(&self) -> bool {
        self.correlation.is_some()
    }

    pub fn invocation(&self) -> Option<&InvocationSpec> {
        self.invocation.as_ref()
    }

    pub fn payload(&self) -> &Dictionary {
        &self.payload
    }

    pub fn into_payload(self) -> Dictionary {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.payload.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.payload.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.payload.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Strict accessor: fails on a missing key or a variant mismatch.
    ///
    /// ```rust
    /// use postbox_protocol::{Message, MessageError};
    ///
    /// let message = Message::from_pair("count", 3);
    /// assert_eq!(message.try_get::<i64>("count").unwrap(), 3);
    /// assert!(matches!(
    ///     message.try_get::<bool>("count"),
    ///     Err(MessageError::TypeMismatch { .. })
    /// ));
    /// ```
    pub fn try_get<'a, T: FromValue<'a>>(&'a self, key: &str) -> MessageResult<T> {
        let value = self.get(key).ok_or_else(|| MessageError::MissingKey {
            key: key.to_string(),
        })?;
        T::from_value(value).ok_or_else(|| MessageError::TypeMismatch {
            key: key.to_string(),
            expected: T::KIND,
            found: value.kind(),
        })
    }

    fn lookup<'a, T: FromValue<'a>>(&'a self, key: &str) -> Option<T> {
        self.get(key).and_then(T::from_value)
    }

    pub fn get_string(&self, key: &str) -> &str {
        self.lookup(key).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.lookup(key).unwrap_or_default()
    }

    pub fn get_integer(&self, key: &str) -> i64 {
        self.lookup(key).unwrap_or_default()
    }

    pub fn get_double(&self, key: &str) -> f64 {
        self.lookup(key).unwrap_or_default()
    }

    pub fn get_float(&self, key: &str) -> f32 {
        self.lookup(key).unwrap_or_default()
    }

    pub fn get_url(&self, key: &str) -> Option<&Url> {
        self.lookup(key)
    }

    pub fn get_bytes(&self, key: &str) -> &[u8] {
        self.lookup(key).unwrap_or_default()
    }

    pub fn get_array(&self, key: &str) -> &[Value] {
        self.lookup(key).unwrap_or_default()
    }

    pub fn get_dictionary(&self, key: &str) -> &Dictionary {
        self.lookup(key).unwrap_or(&EMPTY_DICTIONARY)
    }

    /// Returns a nested dictionary as a standalone message.
    ///
    /// The nested message gets its own identity and carries no correlation
    /// or invocation.
    pub fn get_nested(&self, key: &str) -> Option<Message> {
        self.lookup::<&Dictionary>(key)
            .map(|dict| Self::from_dictionary(dict.clone()))
    }

    /// Value stored under [`RESULT_KEY`] by [`Message::invoke`].
    pub fn result(&self) -> Option<&Value> {
        self.get(RESULT_KEY)
    }

    /// Error stored under [`ERROR_KEY`] by [`Message::error_reply`].
    pub fn remote_error(&self) -> Option<RemoteError> {
        self.get(ERROR_KEY)
            .and_then(Value::as_dictionary)
            .and_then(RemoteError::from_dictionary)
    }

    /// Inserts or overwrites `key`.
    ///
    /// Writing the `target`/`method`/`argument` keys does not change the
    /// invocation spec.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.payload.insert(key, value);
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, Value::Bool(value));
    }

    pub fn set_integer(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, Value::Integer(value));
    }

    pub fn set_double(&mut self, key: impl Into<String>, value: f64) {
        self.set(key, Value::Double(value));
    }

    pub fn set_float(&mut self, key: impl Into<String>, value: f32) {
        self.set(key, Value::Float(value));
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, Value::String(value.into()));
    }

    pub fn set_url(&mut self, key: impl Into<String>, value: Url) {
        self.set(key, Value::Url(value));
    }

    pub fn set_bytes(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.set(key, Value::Bytes(value.into()));
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.payload.remove(key)
    }

    /// True when the message carries an invocation with a non-empty target
    /// and method.
    pub fn is_invocable(&self) -> bool {
        self.invocation
            .as_ref()
            .is_some_and(InvocationSpec::is_resolvable)
    }

    /// Performs the embedded call through `dispatcher` and returns the reply.
    ///
    /// Blocks until the dispatcher returns. The reply is correlated with
    /// `self` and holds the call's result, if any, under [`RESULT_KEY`].
    /// `self` is left untouched, so invoking again dispatches again.
    ///
    /// # Errors
    ///
    /// - [`MessageError::NotInvocable`] without calling the dispatcher
    /// - [`MessageError::UnresolvedTarget`] if the dispatcher has no such capability
    /// - [`MessageError::InvocationFault`] if the call failed, with its cause
    pub fn invoke<D: Dispatcher + ?Sized>(&self, dispatcher: &D) -> MessageResult<Message> {
        let spec = self
            .invocation
            .as_ref()
            .filter(|spec| spec.is_resolvable())
            .ok_or(MessageError::NotInvocable)?;

        debug!(
            message_id = %self.id,
            target_ref = %spec.target,
            method = %spec.method,
            "dispatching invocation"
        );

        let result = dispatcher
            .dispatch(&spec.target, &spec.method, spec.argument.as_ref())
            .map_err(|err| match err {
                DispatchError::NotFound { .. } => {
                    warn!(target_ref = %spec.target, method = %spec.method, "unresolved invocation");
                    MessageError::UnresolvedTarget {
                        target: spec.target.clone(),
                        method: spec.method.clone(),
                    }
                }
                DispatchError::Fault(source) => MessageError::InvocationFault {
                    method: spec.method.clone(),
                    source,
                },
            })?;

        let mut reply = Self::reply_to(self);
        if let Some(value) = result {
            reply.set(RESULT_KEY, value);
        }
        Ok(reply)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<message {}", self.id)?;
        if let Some(ref token) = self.correlation {
            write!(f, " reply-to={token}")?;
        }
        if let Some(ref spec) = self.invocation {
            write!(f, " invoke={}.{}", spec.target, spec.method)?;
        }
        write!(f, "> {}", self.payload)
    }
}

/// Variant extraction used by [`Message::try_get`] and the `get_*` accessors.
pub trait FromValue<'a>: Sized {
    /// Variant this type is read from.
    const KIND: ValueKind;

    fn from_value(value: &'a Value) -> Option<Self>;
}

macro_rules! from_value {
    ($lt:lifetime, $ty:ty, $kind:ident, $accessor:ident) => {
        impl<$lt> FromValue<$lt> for $ty {
            const KIND: ValueKind = ValueKind::$kind;

            fn from_value(value: &$lt Value) -> Option<Self> {
                value.$accessor()
            }
        }
    };
}

from_value!('a, bool, Bool, as_bool);
from_value!('a, i64, Integer, as_integer);
from_value!('a, f64, Double, as_double);
from_value!('a, f32, Float, as_float);
from_value!('a, &'a str, String, as_str);
from_value!('a, &'a Url, Url, as_url);
from_value!('a, &'a [u8], Bytes, as_bytes);
from_value!('a, &'a [Value], Array, as_array);
from_value!('a, &'a Dictionary, Dictionary, as_dictionary);

/// Builds a [`Message`] from `key => value` pairs.
///
/// ```rust
/// use postbox_protocol::message;
///
/// let msg = message! { "name" => "disk0", "size" => 512i64 };
/// assert_eq!(msg.get_integer("size"), 512);
/// ```
#[macro_export]
macro_rules! message {
    () => {
        $crate::Message::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut message = $crate::Message::new();
        $( message.set($key, $value); )+
        message
    }};
}
