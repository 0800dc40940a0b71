use std::fmt;

use crate::models::{ChainLocation, OptionSide};

#[derive(Debug, Clone, PartialEq)]
pub enum ChainError {
    /// Missing side group or empty strike entry. Aborts the whole capture.
    MalformedChain {
        side: OptionSide,
        expiration: Option<String>,
        strike: Option<String>,
        reason: String,
    },
    /// Composite symbol does not have the `<underlying>_<MMDDYY>...` shape.
    KeyDerivation {
        symbol: String,
        location: ChainLocation,
        reason: String,
    },
    /// Two contracts of one capture derived the same key.
    DuplicatePrimaryKey {
        key: String,
        location: ChainLocation,
    },
}

impl ChainError {
    pub fn missing_group(side: OptionSide) -> Self {
        ChainError::MalformedChain {
            side,
            expiration: None,
            strike: None,
            reason: format!("missing {} group", side.group_name()),
        }
    }

    pub fn empty_strike(side: OptionSide, expiration: &str, strike: &str) -> Self {
        ChainError::MalformedChain {
            side,
            expiration: Some(expiration.to_string()),
            strike: Some(strike.to_string()),
            reason: "strike has no contract entries".to_string(),
        }
    }

    pub fn non_object_detail(side: OptionSide, expiration: &str, strike: &str) -> Self {
        ChainError::MalformedChain {
            side,
            expiration: Some(expiration.to_string()),
            strike: Some(strike.to_string()),
            reason: "first contract entry is not an object".to_string(),
        }
    }

    /// Fatal errors abort the capture; everything else is scoped to one record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::MalformedChain { .. })
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::MalformedChain { side, expiration, strike, reason } => {
                write!(f, "Malformed chain ({}", side)?;
                if let Some(exp) = expiration {
                    write!(f, " exp={}", exp)?;
                }
                if let Some(strike) = strike {
                    write!(f, " strike={}", strike)?;
                }
                write!(f, "): {}", reason)
            }
            ChainError::KeyDerivation { symbol, location, reason } => {
                write!(f, "Key derivation failed for '{}' ({}): {}", symbol, location, reason)
            }
            ChainError::DuplicatePrimaryKey { key, location } => {
                write!(f, "Duplicate primary key '{}' ({})", key, location)
            }
        }
    }
}

impl std::error::Error for ChainError {}
