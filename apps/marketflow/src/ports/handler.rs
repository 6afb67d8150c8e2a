//! Handler Ports (Driven Ports)
//!
//! Interfaces a backend implements to serve the engine's operations.
//! A source handler answers read operations; a sink handler accepts write
//! operations. The engine never knows what sits behind them.
//!
//! [`HandlerError`] is the structured failure surface the resilience layer
//! classifies. Handlers should prefer the structured variants (status code,
//! backend code) over free-form messages; classification falls back to
//! message inspection only when nothing structured is available.

use async_trait::async_trait;

use crate::domain::query::SeriesQuery;
use crate::domain::record::{
    MarketAnalyticsRecord, OhlcvRecord, PriceRecord, TopOfBookRecord,
};

/// Failure reported by a handler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    /// Backend asked us to slow down.
    #[error("Rate limited by backend")]
    RateLimited {
        /// Server-supplied wait, when the backend sent one.
        retry_after_secs: Option<u64>,
    },

    /// Call did not complete in time.
    #[error("Handler call timed out")]
    Timeout,

    /// Connection-level failure (refused, reset, DNS).
    #[error("Handler connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// Protocol status returned by the backend.
    #[error("Handler returned status {code}: {message}")]
    Status {
        /// HTTP-style status code.
        code: u16,
        /// Error details.
        message: String,
    },

    /// Backend-specific failure, optionally with a structured code.
    #[error("Backend error: {message}")]
    Backend {
        /// Structured backend code (e.g. "UNAVAILABLE"), when sent.
        code: Option<String>,
        /// Error details.
        message: String,
    },

    /// Handler is misconfigured (bad credentials, unknown endpoint).
    #[error("Handler misconfigured: {message}")]
    Misconfigured {
        /// Error details.
        message: String,
    },

    /// Response could not be decoded.
    #[error("Handler response decode error: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

/// Port serving read operations.
///
/// One method per record variant; the variant's
/// [`fetch_from`](crate::domain::record::SeriesRecord::fetch_from) hook
/// dispatches to the matching method.
#[async_trait]
pub trait SourcePort: Send + Sync {
    /// Fetch a price series.
    async fn fetch_prices(&self, query: &SeriesQuery) -> Result<Vec<PriceRecord>, HandlerError>;

    /// Fetch an OHLCV bar series.
    async fn fetch_ohlcv(&self, query: &SeriesQuery) -> Result<Vec<OhlcvRecord>, HandlerError>;

    /// Fetch an analytics series.
    async fn fetch_analytics(
        &self,
        query: &SeriesQuery,
    ) -> Result<Vec<MarketAnalyticsRecord>, HandlerError>;

    /// Fetch a top-of-book series.
    async fn fetch_top_of_book(
        &self,
        query: &SeriesQuery,
    ) -> Result<Vec<TopOfBookRecord>, HandlerError>;
}

/// Port serving write operations.
#[async_trait]
pub trait SinkPort: Send + Sync {
    /// Persist one price record.
    async fn store_price(&self, record: &PriceRecord) -> Result<(), HandlerError>;

    /// Persist one OHLCV bar.
    async fn store_ohlcv(&self, record: &OhlcvRecord) -> Result<(), HandlerError>;

    /// Persist one analytics record.
    async fn store_analytics(&self, record: &MarketAnalyticsRecord) -> Result<(), HandlerError>;

    /// Persist one top-of-book record.
    async fn store_top_of_book(&self, record: &TopOfBookRecord) -> Result<(), HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_messages() {
        let err = HandlerError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(format!("{err}"), "Rate limited by backend");

        let err = HandlerError::Status {
            code: 503,
            message: "service unavailable".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Handler returned status 503: service unavailable"
        );
    }

    #[test]
    fn handler_error_is_cloneable_for_reports() {
        let err = HandlerError::Backend {
            code: Some("UNAVAILABLE".to_string()),
            message: "node down".to_string(),
        };
        let cloned = err.clone();
        assert_eq!(format!("{err}"), format!("{cloned}"));
    }
}
