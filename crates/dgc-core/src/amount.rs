//! Fixed-point gram amounts.
//!
//! Canonical amounts are decimal strings matching `^\d+(\.\d{1,4})?$`,
//! interpreted as integers scaled by 10 000. All arithmetic happens on the
//! scaled integer; formatting always pads to four fractional digits so that
//! `parse ∘ format` is the identity on any canonical amount.
//!
//! Floats never appear anywhere in this module. Conservation checks (e.g. the
//! certificate split invariant) compare scaled integers exactly.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Scaling factor between gram strings and the internal integer.
pub const SCALE: i64 = 10_000;

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d{1,4})?$").expect("amount regex is valid"));

static PURITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3}\.\d$").expect("purity regex is valid"));

/// Errors produced by amount parsing and arithmetic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// The input does not match the canonical amount grammar.
    #[error("invalid amount: '{input}' does not match ^\\d+(\\.\\d{{1,4}})?$")]
    InvalidFormat {
        /// The rejected input string.
        input: String,
    },

    /// The amount does not fit in the scaled 64-bit representation.
    #[error("amount out of range: '{input}'")]
    OutOfRange {
        /// The rejected input string.
        input: String,
    },

    /// The purity string does not match `^\d{3}\.\d$`.
    #[error("invalid purity: '{input}' does not match ^\\d{{3}}\\.\\d$")]
    InvalidPurity {
        /// The rejected input string.
        input: String,
    },
}

/// A gram amount held as an integer scaled by [`SCALE`].
///
/// Serializes as the canonical four-fractional-digit decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    /// Zero grams.
    pub const ZERO: Self = Self(0);

    /// Parses a canonical amount string.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::InvalidFormat`] when the input does not match
    /// the canonical grammar, and [`AmountError::OutOfRange`] when the scaled
    /// value overflows an `i64`.
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        if !AMOUNT_RE.is_match(input) {
            return Err(AmountError::InvalidFormat {
                input: input.to_string(),
            });
        }

        let (whole, frac) = match input.split_once('.') {
            Some((w, f)) => (w, f),
            None => (input, ""),
        };

        let whole: i64 = whole.parse().map_err(|_| AmountError::OutOfRange {
            input: input.to_string(),
        })?;

        // Right-pad the fraction to four digits: "25" -> 2500.
        let mut frac_scaled: i64 = 0;
        if !frac.is_empty() {
            let padded = format!("{frac:0<4}");
            frac_scaled = padded.parse().map_err(|_| AmountError::OutOfRange {
                input: input.to_string(),
            })?;
        }

        whole
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac_scaled))
            .map(Self)
            .ok_or_else(|| AmountError::OutOfRange {
                input: input.to_string(),
            })
    }

    /// Wraps an already-scaled integer.
    #[must_use]
    pub const fn from_scaled(scaled: i64) -> Self {
        Self(scaled)
    }

    /// Returns the scaled integer representation.
    #[must_use]
    pub const fn scaled(self) -> i64 {
        self.0
    }

    /// True when the amount is strictly greater than zero.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Checked addition on the scaled representation.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction on the scaled representation.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Display for Amount {
    /// Formats with exactly four fractional digits, e.g. `1.2500`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = (self.0 % SCALE).abs();
        write!(f, "{whole}.{frac:04}")
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

/// Validates a purity string such as `999.9`.
///
/// # Errors
///
/// Returns [`AmountError::InvalidPurity`] when the input does not match
/// `^\d{3}\.\d$`.
pub fn validate_purity(input: &str) -> Result<(), AmountError> {
    if PURITY_RE.is_match(input) {
        Ok(())
    } else {
        Err(AmountError::InvalidPurity {
            input: input.to_string(),
        })
    }
}

/// Converts a purity string to basis points for the chain encoding,
/// e.g. `999.9` becomes `9999`.
///
/// # Errors
///
/// Returns [`AmountError::InvalidPurity`] on malformed input.
pub fn purity_basis_points(input: &str) -> Result<u32, AmountError> {
    validate_purity(input)?;
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    digits.parse().map_err(|_| AmountError::InvalidPurity {
        input: input.to_string(),
    })
}
