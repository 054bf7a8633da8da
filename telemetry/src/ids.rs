//! Trace and span identifiers.
//!
//! Identifiers are random, never zero, and render as lowercase hex
//! (32 characters for a trace id, 16 for a span id).

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an identifier from hex fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdParseError {
    /// The input has the wrong number of hex characters.
    #[error("expected {expected} hex characters, got {actual}")]
    InvalidLength {
        /// Expected number of characters.
        expected: usize,
        /// Actual number of characters.
        actual: usize,
    },

    /// The input contains non-hex characters.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The all-zero identifier is reserved as invalid.
    #[error("identifier cannot be all zeros")]
    Zero,
}

/// A 16-byte trace identifier shared by every span of one trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// Generates a new random, non-zero trace id.
    #[must_use]
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let value: u128 = rng.gen();
            if value != 0 {
                return Self(value);
            }
        }
    }

    /// Creates a trace id from its integer representation.
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// Returns the big-endian byte representation.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Returns the low 64 bits, used for ratio-based sampling.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn low_u64(self) -> u64 {
        self.0 as u64
    }
}

/// An 8-byte span identifier, unique within a trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// Generates a new random, non-zero span id.
    #[must_use]
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let value: u64 = rng.gen();
            if value != 0 {
                return Self(value);
            }
        }
    }

    /// Creates a span id from its integer representation.
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Returns the big-endian byte representation.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

macro_rules! hex_id_impls {
    ($ty:ident, $int:ty, $len:expr) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.to_bytes()))
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({self})", stringify!($ty))
            }
        }

        impl FromStr for $ty {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.len() != $len {
                    return Err(IdParseError::InvalidLength {
                        expected: $len,
                        actual: s.len(),
                    });
                }
                let mut bytes = [0u8; $len / 2];
                hex::decode_to_slice(s, &mut bytes)?;
                let value = <$int>::from_be_bytes(bytes);
                if value == 0 {
                    return Err(IdParseError::Zero);
                }
                Ok(Self(value))
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_id_impls!(TraceId, u128, 32);
hex_id_impls!(SpanId, u64, 16);
