//! Transaction-type filter keys.
//!
//! The key space is `All` plus every non-empty subset of the four
//! classifications: `1 + (2^4 - 1) = 16` keys. Every key gets its own
//! projection, so adding a fifth classification doubles the projection count.

use crate::domain::{Classification, TransactionLeg};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const FILTER_KEY_SPACE: usize = 1 + ((1 << Classification::ALL.len()) - 1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKey {
    #[default]
    All,
    /// Non-empty bitmask over `Classification::ALL`.
    Types(u8),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("unknown transaction type: {0}")]
    UnknownType(String),
    #[error("empty transaction type filter")]
    Empty,
}

fn bit(classification: Classification) -> u8 {
    match classification {
        Classification::Income => 1,
        Classification::Expense => 1 << 1,
        Classification::Swap => 1 << 2,
        Classification::Gas => 1 << 3,
    }
}

impl FilterKey {
    pub fn single(classification: Classification) -> Self {
        FilterKey::Types(bit(classification))
    }

    pub fn of(classifications: &[Classification]) -> Self {
        let mask = classifications.iter().fold(0u8, |acc, c| acc | bit(*c));
        if mask == 0 {
            FilterKey::All
        } else {
            FilterKey::Types(mask)
        }
    }

    /// Every key in the space, `All` first.
    pub fn all_keys() -> Vec<FilterKey> {
        let masks = 1u8..(1 << Classification::ALL.len());
        std::iter::once(FilterKey::All)
            .chain(masks.map(FilterKey::Types))
            .collect()
    }

    pub fn matches(&self, leg: &TransactionLeg) -> bool {
        match self {
            FilterKey::All => true,
            FilterKey::Types(mask) => mask & bit(leg.classification) != 0,
        }
    }

    pub fn classifications(&self) -> Vec<Classification> {
        match self {
            FilterKey::All => Classification::ALL.to_vec(),
            FilterKey::Types(mask) => Classification::ALL
                .iter()
                .copied()
                .filter(|c| mask & bit(*c) != 0)
                .collect(),
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKey::All => f.write_str("all"),
            FilterKey::Types(_) => {
                let names: Vec<&str> = self.classifications().iter().map(|c| c.as_str()).collect();
                f.write_str(&names.join("+"))
            }
        }
    }
}

impl FromStr for FilterKey {
    type Err = FilterParseError;

    /// Accepts `all`, a single type, or types joined by `+` or `,`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FilterParseError::Empty);
        }
        if s.eq_ignore_ascii_case("all") {
            return Ok(FilterKey::All);
        }

        let mut types = Vec::new();
        for part in s.split(|c| c == '+' || c == ',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let classification = Classification::parse(part)
                .ok_or_else(|| FilterParseError::UnknownType(part.to_string()))?;
            types.push(classification);
        }
        if types.is_empty() {
            return Err(FilterParseError::Empty);
        }
        Ok(FilterKey::of(&types))
    }
}

impl Serialize for FilterKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
