//! Invocation payloads: the (target, method, argument) triple a message may carry.

use std::borrow::Borrow;
use std::fmt;

use postbox_core::Value;
use serde::{Deserialize, Serialize};

/// Opaque identity of the object an invocation is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetRef(String);

/// Name of the capability to call on a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodId(String);

macro_rules! string_identifier {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Empty identifiers never resolve.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_identifier!(TargetRef);
string_identifier!(MethodId);

/// A deferred call embedded in a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationSpec {
    pub target: TargetRef,
    pub method: MethodId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<Value>,
}

impl InvocationSpec {
    pub fn new(
        target: impl Into<TargetRef>,
        method: impl Into<MethodId>,
        argument: Option<Value>,
    ) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            argument,
        }
    }

    /// Returns true when both target and method are non-empty.
    pub fn is_resolvable(&self) -> bool {
        !self.target.is_empty() && !self.method.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolvable_requires_target_and_method() {
        assert!(InvocationSpec::new("clock", "now", None).is_resolvable());
        assert!(!InvocationSpec::new("", "now", None).is_resolvable());
        assert!(!InvocationSpec::new("clock", "", None).is_resolvable());
    }

    #[test]
    fn argument_is_optional_on_the_wire() {
        let spec = InvocationSpec::new("clock", "now", None);
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, r#"{"target":"clock","method":"now"}"#);

        let parsed: InvocationSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, spec);
    }

    #[test]
    fn identifiers_borrow_as_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(MethodId::from("ping"), 1);
        assert_eq!(map.get("ping"), Some(&1));
    }
}
