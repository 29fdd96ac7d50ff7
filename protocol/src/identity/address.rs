//! # Valocracy Addresses
//!
//! An [`Address`] names a principal on the ledger: an administrator, a
//! certificate holder, or a deployed contract. It is a plain 32-byte value;
//! the human-facing form is Bech32 with the `val` prefix:
//!
//! ```text
//! label / key material
//!     -> BLAKE3(bytes) -> 32 bytes
//!     -> Bech32("val", bytes) -> val1qy352euf...
//! ```
//!
//! The all-zero address is the null identity. Certificates "transferred" to
//! it are burned, and no ledger accepts it as a recipient.

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The human-readable prefix for all Valocracy addresses.
pub const ADDRESS_HRP: &str = "val";

const HRP: Hrp = Hrp::parse_unchecked(ADDRESS_HRP);

/// Length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing an address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The Bech32 string could not be decoded.
    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    /// The decoded address has an unexpected human-readable prefix.
    #[error("invalid HRP: expected '{expected}', got '{got}'")]
    InvalidHrp {
        /// The expected HRP.
        expected: String,
        /// The HRP that was actually found.
        got: String,
    },

    /// The decoded payload is not 32 bytes long.
    #[error("invalid address length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },

    /// The hex form could not be decoded.
    #[error("invalid hex address: {0}")]
    InvalidHex(String),
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 32-byte principal identity.
///
/// # Examples
///
/// ```
/// use valocracy_protocol::identity::Address;
///
/// let alice = Address::derive("alice");
/// let encoded = alice.to_string();
/// assert!(encoded.starts_with("val1"));
/// assert_eq!(Address::parse(&encoded).unwrap(), alice);
/// assert!(!alice.is_null());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The null identity.
    pub const NULL: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Derives a deterministic address from a label via BLAKE3.
    ///
    /// Used for well-known principals: deployed contracts, and the
    /// `@name` shorthand accepted by the node CLI.
    pub fn derive(label: &str) -> Self {
        Self(*blake3::hash(label.as_bytes()).as_bytes())
    }

    /// Returns `true` for the null identity.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Encodes the address as a Bech32 string.
    pub fn to_bech32(&self) -> String {
        bech32::encode::<Bech32>(HRP, &self.0).expect("encoding a 32-byte payload never fails")
    }

    /// Hex encoding of the raw bytes, without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses either the Bech32 form (`val1...`) or 64 hex characters,
    /// optionally prefixed with `0x`.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        if s.starts_with(ADDRESS_HRP) && s.contains('1') {
            return Self::from_bech32(s);
        }
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    fn from_bech32(s: &str) -> Result<Self, AddressError> {
        let (hrp, data) =
            bech32::decode(s).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;

        if hrp != HRP {
            return Err(AddressError::InvalidHrp {
                expected: ADDRESS_HRP.to_string(),
                got: hrp.to_string(),
            });
        }
        Self::from_slice(&data)
    }

    fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let raw: [u8; ADDRESS_LENGTH] =
            bytes.try_into().map_err(|_| AddressError::InvalidLength {
                expected: ADDRESS_LENGTH,
                got: bytes.len(),
            })?;
        Ok(Self(raw))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bech32())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Address(null)")
        } else {
            write!(f, "Address({})", self.to_bech32())
        }
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_bech32())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Address::parse(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            Address::from_slice(&bytes).map_err(serde::de::Error::custom)
        }
    }
}
