//! Boundary input sanitization
//!
//! Newtypes for the caller-supplied identifiers that end up in cache keys.
//! Each performs one explicit normalization step (case folding plus a charset
//! check) so malformed input fails before any reference-data access and no
//! unvetted string ever reaches the cache.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Maximum accepted length for a discount code.
pub const MAX_DISCOUNT_CODE_LEN: usize = 64;

/// Maximum accepted length for a gateway selector.
pub const MAX_GATEWAY_SELECTOR_LEN: usize = 32;

/// Errors raised while sanitizing boundary inputs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    /// Currency codes must be exactly three ASCII letters.
    #[error("malformed currency code {0:?}; expected three ASCII letters")]
    MalformedCurrency(String),

    /// Discount codes are restricted to a safe charset.
    #[error("malformed discount code {0:?}; expected 1-64 characters from [A-Za-z0-9_-]")]
    MalformedDiscountCode(String),

    /// Gateway selectors are restricted to a safe charset.
    #[error("malformed gateway selector {0:?}; expected 1-32 characters from [a-z0-9_]")]
    MalformedGateway(String),
}

/// An ISO-4217-like currency code, normalized to three uppercase letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// The normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = InputError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();

        if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(InputError::MalformedCurrency(raw.to_string()))
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A discount code, matched case-insensitively by normalizing to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscountCode(String);

impl DiscountCode {
    /// The normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DiscountCode {
    type Err = InputError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();

        let valid = !trimmed.is_empty()
            && trimmed.len() <= MAX_DISCOUNT_CODE_LEN
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(InputError::MalformedDiscountCode(raw.to_string()))
        }
    }
}

impl fmt::Display for DiscountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A payment-gateway selector (e.g. `stripe`), normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatewaySelector(String);

impl GatewaySelector {
    /// The normalized selector.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for GatewaySelector {
    type Err = InputError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();

        let valid = !normalized.is_empty()
            && normalized.len() <= MAX_GATEWAY_SELECTOR_LEN
            && normalized
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if valid {
            Ok(Self(normalized))
        } else {
            Err(InputError::MalformedGateway(raw.to_string()))
        }
    }
}

impl fmt::Display for GatewaySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
