//! Identifier newtypes with a strict, validated charset.
//!
//! Store ids are opaque upstream tokens; source names identify target
//! providers in the provenance preference order. Both are validated on
//! construction and on deserialization so invalid ids never reach a stage.

use core::fmt;
use core::str::FromStr;

use serde::de::{Error as DeError, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::CoreError;

/// Printable, no control characters, no leading/trailing whitespace, 1..=`max_len` bytes.
fn is_token(s: &str, max_len: usize) -> bool {
    let len = s.len();
    if !(1..=max_len).contains(&len) {
        return false;
    }
    if s.trim() != s {
        return false;
    }
    !s.chars().any(|c| c.is_control())
}

macro_rules! def_token {
    ($name:ident, $max_len:expr, $expect:expr) => {
        #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Build from a compile-time literal (defaults, tests).
            pub fn from_static(s: &'static str) -> Self {
                debug_assert!(is_token(s, $max_len), "invalid static token: {s:?}");
                Self(s.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.trim().is_empty() {
                    Err(CoreError::EmptyToken)
                } else if is_token(s, $max_len) {
                    Ok(Self(s.to_string()))
                } else {
                    Err(CoreError::InvalidToken)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                if is_token(&s, $max_len) {
                    Ok($name(s))
                } else {
                    Err(D::Error::invalid_value(Unexpected::Str(&s), &$expect))
                }
            }
        }
    };
}

// Store ids are opaque upstream keys: no length cap.
def_token!(StoreId, usize::MAX, "store id: printable, trimmed, non-empty");
def_token!(SourceName, 128, "source name: printable, trimmed, 1..=128 bytes");
