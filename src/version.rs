//! Version identifiers
//!
//! A version is the base-36 rendering of the millisecond timestamp at which
//! its migration was created. Versions order by length first and then
//! byte-wise, which matches numeric order for canonical base-36 tokens
//! without ever parsing them back into numbers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// The version recorded for a database that has no migrations applied.
pub const ZERO: &str = "0";

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque, totally ordered migration version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    /// The sentinel "nothing applied" version.
    pub fn zero() -> Self {
        Self(ZERO.to_string())
    }

    /// Parse a token, accepting only canonical lowercase base-36 digits.
    ///
    /// Leading zeros are rejected (other than the sentinel `"0"` itself)
    /// because they would break the length-first ordering.
    pub fn parse(token: &str) -> Option<Self> {
        let bytes = token.as_bytes();
        let canonical = match bytes {
            [] => false,
            [b'0'] => true,
            [b'0', ..] => false,
            _ => bytes
                .iter()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()),
        };
        canonical.then(|| Self(token.to_string()))
    }

    /// Encode a millisecond epoch timestamp.
    pub fn encode(millis: u64) -> Self {
        if millis == 0 {
            return Self::zero();
        }
        let mut n = millis;
        let mut buf = Vec::new();
        while n > 0 {
            buf.push(DIGITS[(n % 36) as usize]);
            n /= 36;
        }
        buf.reverse();
        Self(buf.into_iter().map(char::from).collect())
    }

    /// Version for `stamp`. Instants at or before the epoch map to `1`,
    /// the smallest version a migration may carry.
    pub fn from_datetime(stamp: DateTime<Utc>) -> Self {
        u64::try_from(stamp.timestamp_millis())
            .ok()
            .filter(|millis| *millis > 0)
            .map_or_else(|| Self::zero().successor(), Self::encode)
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// The next version in order, computed on the digits directly.
    pub fn successor(&self) -> Self {
        let mut digits = self.0.as_bytes().to_vec();
        for digit in digits.iter_mut().rev() {
            if *digit == b'z' {
                *digit = b'0';
                continue;
            }
            *digit = if *digit == b'9' { b'a' } else { *digit + 1 };
            return Self(digits.into_iter().map(char::from).collect());
        }
        // Every digit carried.
        let mut carried = String::with_capacity(digits.len() + 1);
        carried.push('1');
        carried.extend(digits.into_iter().map(char::from));
        Self(carried)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == ZERO
    }

    pub fn is_newer_than(&self, other: &VersionId) -> bool {
        self > other
    }

    pub fn is_older_than(&self, other: &VersionId) -> bool {
        self < other
    }
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
