//! The declared operation set of the engine.
//!
//! Every engine call is one of these operations. Each read operation has a
//! write counterpart over the same record variant, and admissibility
//! (is there a handler that can serve this operation?) is checked against
//! this set before anything touches a backend.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::RecordKind;

/// Direction of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Fetches records from a source handler.
    Read,
    /// Persists records through a sink handler.
    Write,
}

/// A declared engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Read a price series.
    ReadPrices,
    /// Write price records.
    WritePrices,
    /// Read an OHLCV bar series.
    ReadOhlcv,
    /// Write OHLCV bar records.
    WriteOhlcv,
    /// Read an analytics series.
    ReadAnalytics,
    /// Write analytics records.
    WriteAnalytics,
    /// Read a top-of-book series.
    ReadTopOfBook,
    /// Write top-of-book records.
    WriteTopOfBook,
}

impl Operation {
    /// Direction of this operation.
    #[must_use]
    pub const fn kind(self) -> OperationKind {
        match self {
            Self::ReadPrices | Self::ReadOhlcv | Self::ReadAnalytics | Self::ReadTopOfBook => {
                OperationKind::Read
            }
            Self::WritePrices | Self::WriteOhlcv | Self::WriteAnalytics | Self::WriteTopOfBook => {
                OperationKind::Write
            }
        }
    }

    /// Record variant this operation moves.
    #[must_use]
    pub const fn record(self) -> RecordKind {
        match self {
            Self::ReadPrices | Self::WritePrices => RecordKind::Price,
            Self::ReadOhlcv | Self::WriteOhlcv => RecordKind::Ohlcv,
            Self::ReadAnalytics | Self::WriteAnalytics => RecordKind::Analytics,
            Self::ReadTopOfBook | Self::WriteTopOfBook => RecordKind::TopOfBook,
        }
    }

    /// The counterpart operation over the same variant
    /// (read for a write, write for a read).
    #[must_use]
    pub const fn paired(self) -> Self {
        match self {
            Self::ReadPrices => Self::WritePrices,
            Self::WritePrices => Self::ReadPrices,
            Self::ReadOhlcv => Self::WriteOhlcv,
            Self::WriteOhlcv => Self::ReadOhlcv,
            Self::ReadAnalytics => Self::WriteAnalytics,
            Self::WriteAnalytics => Self::ReadAnalytics,
            Self::ReadTopOfBook => Self::WriteTopOfBook,
            Self::WriteTopOfBook => Self::ReadTopOfBook,
        }
    }

    /// Stable lowercase name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadPrices => "read_prices",
            Self::WritePrices => "write_prices",
            Self::ReadOhlcv => "read_ohlcv",
            Self::WriteOhlcv => "write_ohlcv",
            Self::ReadAnalytics => "read_analytics",
            Self::WriteAnalytics => "write_analytics",
            Self::ReadTopOfBook => "read_top_of_book",
            Self::WriteTopOfBook => "write_top_of_book",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
