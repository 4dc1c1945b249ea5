use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// String-keyed identifiers. The backend assigns character and sub-record ids,
/// so no particular format is assumed.
macro_rules! define_key {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Server-assigned aggregate id
define_key!(CharacterId);

// Sub-record ids: client-generated and server-assigned
define_key!(LocalId);
define_key!(RemoteId);

impl LocalId {
    /// Builds a client-side id from a millisecond timestamp and a random suffix.
    ///
    /// The zero-padded hex timestamp keeps ids roughly creation-ordered; the
    /// suffix separates ids minted within the same millisecond.
    pub fn generate(now: DateTime<Utc>, suffix: u32) -> Self {
        let millis = now.timestamp_millis().max(0);
        Self(format!("{millis:011x}-{suffix:08x}"))
    }
}
