//! Newtype string identifiers shared across the kernel crates.

use std::fmt;

/// Generates a newtype wrapper around `String` with the constructors and
/// conversions every typed ID in this crate needs.
macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Build a new identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the identifier as a plain string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(
    /// Opaque ID threading causally related events through the bus.
    CorrelationId
);

typed_id!(
    /// Identifier for a bus subscription handle.
    SubscriptionId
);

typed_id!(
    /// Identifier for a single tool invocation within a stream.
    ToolCallId
);

typed_id!(
    /// Identifier for one orchestrated stream run, stable across checkpoint/resume.
    StreamRunId
);
