use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ReplayError;

/// Transaction index reserved for the synthetic state transitions that
/// precede or follow the real transactions of a block (rewards, withdrawals,
/// genesis allocations). Indices at or above it carry no snapshot.
pub const PSEUDO_TX: u32 = 99_999;

/// One unit of replay input: a payload addressed by block and transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<T> {
    pub block: u64,
    pub transaction: u32,
    pub data: T,
}

impl<T> WorkItem<T> {
    pub fn new(block: u64, transaction: u32, data: T) -> Self {
        Self {
            block,
            transaction,
            data,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.transaction >= PSEUDO_TX
    }

    pub fn cursor(&self) -> Cursor<'_, T> {
        Cursor {
            block: self.block,
            transaction: self.transaction,
            data: Some(&self.data),
        }
    }
}

/// Position of the executor handed to every extension hook. Run and block
/// level hooks carry no payload.
#[derive(Debug)]
pub struct Cursor<'a, T> {
    pub block: u64,
    pub transaction: u32,
    pub data: Option<&'a T>,
}

impl<T> Clone for Cursor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cursor<'_, T> {}

impl<T> Cursor<'_, T> {
    pub fn at(block: u64, transaction: u32) -> Self {
        Self {
            block,
            transaction,
            data: None,
        }
    }
}

/// Unit of parallel work when more than one worker is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    /// Work items are dispatched one by one.
    #[default]
    #[serde(rename = "transaction")]
    TransactionLevel,
    /// All items of a block are dispatched together.
    #[serde(rename = "block")]
    BlockLevel,
}

impl FromStr for Granularity {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transaction" | "tx" => Ok(Granularity::TransactionLevel),
            "block" => Ok(Granularity::BlockLevel),
            other => Err(ReplayError::InvalidGranularity(other.to_string())),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::TransactionLevel => write!(f, "transaction"),
            Granularity::BlockLevel => write!(f, "block"),
        }
    }
}

/// Outcome of the most recently processed item, recorded by processors for
/// the benefit of metric extensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub gas_used: u64,
    pub failed: bool,
}
