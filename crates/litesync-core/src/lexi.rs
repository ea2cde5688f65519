//! Lexicographically sortable versions.
//!
//! A version is encoded in base 36 and prefixed with a single base-36 digit
//! holding `len - 1`, so that string order matches numeric order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A version string whose lexicographic order matches its numeric order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LexiVersion(String);

impl LexiVersion {
    /// Encode a numeric version.
    pub fn from_version(version: u64) -> Self {
        let digits = to_base36(version);
        let mut out = String::with_capacity(digits.len() + 1);
        out.push(char::from(DIGITS[digits.len() - 1]));
        out.push_str(&digits);
        LexiVersion(out)
    }

    /// Derive the watermark for a replication slot's consistent point.
    pub fn from_lsn(lsn: u64) -> Self {
        Self::from_version(lsn)
    }

    /// Parse and validate an encoded version.
    pub fn parse(s: &str) -> Result<Self> {
        Self::decode(s)?;
        Ok(LexiVersion(s.to_string()))
    }

    /// The numeric version this string encodes.
    pub fn version(&self) -> u64 {
        // Constructed only through validated paths.
        Self::decode(&self.0).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn decode(s: &str) -> Result<u64> {
        let invalid = || Error::InvalidLexiVersion(s.to_string());
        let bytes = s.as_bytes();
        let (&prefix, digits) = bytes.split_first().ok_or_else(invalid)?;
        let expected_len = digit_value(prefix).ok_or_else(invalid)? as usize + 1;
        if digits.len() != expected_len || (digits.len() > 1 && digits[0] == b'0') {
            return Err(invalid());
        }
        let mut value: u64 = 0;
        for &d in digits {
            let d = digit_value(d).ok_or_else(invalid)?;
            value = value
                .checked_mul(36)
                .and_then(|v| v.checked_add(d))
                .ok_or_else(invalid)?;
        }
        Ok(value)
    }
}

impl fmt::Display for LexiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LexiVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(13);
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.iter().rev().map(|&d| char::from(d)).collect()
}

fn digit_value(d: u8) -> Option<u64> {
    match d {
        b'0'..=b'9' => Some((d - b'0') as u64),
        b'a'..=b'z' => Some((d - b'a') as u64 + 10),
        _ => None,
    }
}
