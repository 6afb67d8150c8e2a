//! Record variants of the market time-series data model.
//!
//! Every variant carries the same mandatory axes: instrument, venue,
//! observation time, producing source, and attribution. A record without a
//! venue or attribution is structurally invalid, not merely incomplete.
//!
//! [`SeriesRecord`] binds a variant to the rest of the engine: its paired
//! read/write operations, its structural validator, its schema descriptor,
//! and the handler methods that move it.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifiers::{InstrumentId, SourceTag, Timestamp, Venue};
use super::operation::Operation;
use super::query::SeriesQuery;
use super::validation::{
    ValidationReport, require_non_empty, require_non_negative, require_positive,
};
use crate::ports::handler::{HandlerError, SinkPort, SourcePort};
use crate::schema::{AccessPattern, FieldDef, FieldType, VariantDescriptor};

/// Tag identifying one record variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Individual trade or price observation.
    Price,
    /// Aggregated OHLCV bar.
    Ohlcv,
    /// Windowed analytics (VWAP and friends).
    Analytics,
    /// Best bid and ask snapshot.
    TopOfBook,
}

impl RecordKind {
    /// Stable lowercase name used in schemas, logs, and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Ohlcv => "ohlcv",
            Self::Analytics => "analytics",
            Self::TopOfBook => "top_of_book",
        }
    }

    /// All variants, in declaration order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Price, Self::Ohlcv, Self::Analytics, Self::TopOfBook]
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Variants
// ============================================================================

/// A single price observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Logical series identifier.
    pub instrument: InstrumentId,
    /// Venue the observation was made on.
    pub venue: Venue,
    /// Observation time (the temporal key).
    pub observed_at: Timestamp,
    /// Backend that produced the record.
    pub source: SourceTag,
    /// Data attribution.
    pub attribution: String,
    /// Observed price.
    pub price: Decimal,
    /// Trade size, when the observation is a trade.
    pub volume: Option<Decimal>,
}

/// An aggregated OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OhlcvRecord {
    /// Logical series identifier.
    pub instrument: InstrumentId,
    /// Venue the observation was made on.
    pub venue: Venue,
    /// Bar open time (the temporal key).
    pub observed_at: Timestamp,
    /// Backend that produced the record.
    pub source: SourceTag,
    /// Data attribution.
    pub attribution: String,
    /// Opening price.
    pub open: Decimal,
    /// Highest price in the bar.
    pub high: Decimal,
    /// Lowest price in the bar.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Total volume in the bar.
    pub volume: Decimal,
    /// Bar length in seconds.
    pub interval_secs: u32,
}

/// Windowed market analytics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketAnalyticsRecord {
    /// Logical series identifier.
    pub instrument: InstrumentId,
    /// Venue the observation was made on.
    pub venue: Venue,
    /// Window end time (the temporal key).
    pub observed_at: Timestamp,
    /// Backend that produced the record.
    pub source: SourceTag,
    /// Data attribution.
    pub attribution: String,
    /// Volume-weighted average price over the window.
    pub vwap: Decimal,
    /// Highest price in the window.
    pub high: Decimal,
    /// Lowest price in the window.
    pub low: Decimal,
    /// Total volume in the window.
    pub volume: Decimal,
    /// Number of trades in the window.
    pub trade_count: i64,
    /// Window length in seconds.
    pub window_secs: u32,
}

/// Best bid and ask at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopOfBookRecord {
    /// Logical series identifier.
    pub instrument: InstrumentId,
    /// Venue the observation was made on.
    pub venue: Venue,
    /// Quote time (the temporal key).
    pub observed_at: Timestamp,
    /// Backend that produced the record.
    pub source: SourceTag,
    /// Data attribution.
    pub attribution: String,
    /// Best bid price.
    pub bid: Decimal,
    /// Bid size.
    pub bid_size: Decimal,
    /// Best ask price.
    pub ask: Decimal,
    /// Ask size.
    pub ask_size: Decimal,
}

impl TopOfBookRecord {
    /// Get the mid price.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }

    /// Get the spread.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

// ============================================================================
// SeriesRecord
// ============================================================================

/// Behavior every record variant implements.
///
/// The engine is generic over this trait: one workflow implementation
/// serves all variants, and the operation pairing guarantees a record
/// read as variant `R` can only be written back as variant `R`.
#[async_trait]
pub trait SeriesRecord: Clone + Send + Sync + 'static {
    /// Variant tag.
    const KIND: RecordKind;
    /// Operation a read of this variant runs as.
    const READ_OP: Operation;
    /// Operation a write of this variant runs as.
    const WRITE_OP: Operation;

    /// Logical series identifier.
    fn instrument(&self) -> &InstrumentId;
    /// Venue the observation was made on.
    fn venue(&self) -> &Venue;
    /// Observation time (the temporal key).
    fn observed_at(&self) -> Timestamp;
    /// Backend that produced the record.
    fn source(&self) -> &SourceTag;
    /// Data attribution.
    fn attribution(&self) -> &str;

    /// Structural validation; reports every violated rule.
    fn validate(&self) -> ValidationReport;

    /// Schema-facing description of this variant.
    fn descriptor() -> VariantDescriptor;

    /// Fetch a series of this variant through a source handler.
    async fn fetch_from(
        source: &dyn SourcePort,
        query: &SeriesQuery,
    ) -> Result<Vec<Self>, HandlerError>;

    /// Persist this record through a sink handler.
    async fn store_to(&self, sink: &dyn SinkPort) -> Result<(), HandlerError>;
}

fn shared_checks(
    instrument: &InstrumentId,
    venue: &Venue,
    source: &SourceTag,
    attribution: &str,
) -> ValidationReport {
    let mut report = ValidationReport::ok();
    require_non_empty(&mut report, "instrument", instrument.as_str());
    require_non_empty(&mut report, "venue", venue.as_str());
    require_non_empty(&mut report, "source", source.as_str());
    require_non_empty(&mut report, "attribution", attribution);
    report
}

#[async_trait]
impl SeriesRecord for PriceRecord {
    const KIND: RecordKind = RecordKind::Price;
    const READ_OP: Operation = Operation::ReadPrices;
    const WRITE_OP: Operation = Operation::WritePrices;

    fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    fn venue(&self) -> &Venue {
        &self.venue
    }

    fn observed_at(&self) -> Timestamp {
        self.observed_at
    }

    fn source(&self) -> &SourceTag {
        &self.source
    }

    fn attribution(&self) -> &str {
        &self.attribution
    }

    fn validate(&self) -> ValidationReport {
        let mut report = shared_checks(&self.instrument, &self.venue, &self.source, &self.attribution);
        require_positive(&mut report, "price", self.price);
        if let Some(volume) = self.volume {
            require_non_negative(&mut report, "volume", volume);
        }
        report
    }

    fn descriptor() -> VariantDescriptor {
        VariantDescriptor::new(
            Self::KIND,
            AccessPattern::HighFrequency,
            vec![
                FieldDef::required("price", FieldType::Decimal),
                FieldDef::nullable("volume", FieldType::Decimal),
            ],
        )
    }

    async fn fetch_from(
        source: &dyn SourcePort,
        query: &SeriesQuery,
    ) -> Result<Vec<Self>, HandlerError> {
        source.fetch_prices(query).await
    }

    async fn store_to(&self, sink: &dyn SinkPort) -> Result<(), HandlerError> {
        sink.store_price(self).await
    }
}

#[async_trait]
impl SeriesRecord for OhlcvRecord {
    const KIND: RecordKind = RecordKind::Ohlcv;
    const READ_OP: Operation = Operation::ReadOhlcv;
    const WRITE_OP: Operation = Operation::WriteOhlcv;

    fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    fn venue(&self) -> &Venue {
        &self.venue
    }

    fn observed_at(&self) -> Timestamp {
        self.observed_at
    }

    fn source(&self) -> &SourceTag {
        &self.source
    }

    fn attribution(&self) -> &str {
        &self.attribution
    }

    fn validate(&self) -> ValidationReport {
        let mut report = shared_checks(&self.instrument, &self.venue, &self.source, &self.attribution);
        require_positive(&mut report, "open", self.open);
        require_positive(&mut report, "high", self.high);
        require_positive(&mut report, "low", self.low);
        require_positive(&mut report, "close", self.close);
        if self.low > self.high {
            report.push("low", "must not exceed high");
        }
        if self.open < self.low || self.open > self.high {
            report.push("open", "must lie within the low/high range");
        }
        if self.close < self.low || self.close > self.high {
            report.push("close", "must lie within the low/high range");
        }
        require_non_negative(&mut report, "volume", self.volume);
        if self.interval_secs == 0 {
            report.push("interval_secs", "must be positive");
        }
        report
    }

    fn descriptor() -> VariantDescriptor {
        VariantDescriptor::new(
            Self::KIND,
            AccessPattern::LowFrequency,
            vec![
                FieldDef::required("open", FieldType::Decimal),
                FieldDef::required("high", FieldType::Decimal),
                FieldDef::required("low", FieldType::Decimal),
                FieldDef::required("close", FieldType::Decimal),
                FieldDef::required("volume", FieldType::Decimal),
                FieldDef::required("interval_secs", FieldType::Integer),
            ],
        )
    }

    async fn fetch_from(
        source: &dyn SourcePort,
        query: &SeriesQuery,
    ) -> Result<Vec<Self>, HandlerError> {
        source.fetch_ohlcv(query).await
    }

    async fn store_to(&self, sink: &dyn SinkPort) -> Result<(), HandlerError> {
        sink.store_ohlcv(self).await
    }
}

#[async_trait]
impl SeriesRecord for MarketAnalyticsRecord {
    const KIND: RecordKind = RecordKind::Analytics;
    const READ_OP: Operation = Operation::ReadAnalytics;
    const WRITE_OP: Operation = Operation::WriteAnalytics;

    fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    fn venue(&self) -> &Venue {
        &self.venue
    }

    fn observed_at(&self) -> Timestamp {
        self.observed_at
    }

    fn source(&self) -> &SourceTag {
        &self.source
    }

    fn attribution(&self) -> &str {
        &self.attribution
    }

    fn validate(&self) -> ValidationReport {
        let mut report = shared_checks(&self.instrument, &self.venue, &self.source, &self.attribution);
        require_positive(&mut report, "vwap", self.vwap);
        require_positive(&mut report, "high", self.high);
        require_positive(&mut report, "low", self.low);
        if self.low > self.high {
            report.push("low", "must not exceed high");
        }
        require_non_negative(&mut report, "volume", self.volume);
        if self.trade_count < 0 {
            report.push("trade_count", "must not be negative");
        }
        if self.window_secs == 0 {
            report.push("window_secs", "must be positive");
        }
        report
    }

    fn descriptor() -> VariantDescriptor {
        VariantDescriptor::new(
            Self::KIND,
            AccessPattern::LowFrequency,
            vec![
                FieldDef::required("vwap", FieldType::Decimal),
                FieldDef::required("high", FieldType::Decimal),
                FieldDef::required("low", FieldType::Decimal),
                FieldDef::required("volume", FieldType::Decimal),
                FieldDef::required("trade_count", FieldType::BigInt),
                FieldDef::required("window_secs", FieldType::Integer),
            ],
        )
    }

    async fn fetch_from(
        source: &dyn SourcePort,
        query: &SeriesQuery,
    ) -> Result<Vec<Self>, HandlerError> {
        source.fetch_analytics(query).await
    }

    async fn store_to(&self, sink: &dyn SinkPort) -> Result<(), HandlerError> {
        sink.store_analytics(self).await
    }
}

#[async_trait]
impl SeriesRecord for TopOfBookRecord {
    const KIND: RecordKind = RecordKind::TopOfBook;
    const READ_OP: Operation = Operation::ReadTopOfBook;
    const WRITE_OP: Operation = Operation::WriteTopOfBook;

    fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    fn venue(&self) -> &Venue {
        &self.venue
    }

    fn observed_at(&self) -> Timestamp {
        self.observed_at
    }

    fn source(&self) -> &SourceTag {
        &self.source
    }

    fn attribution(&self) -> &str {
        &self.attribution
    }

    fn validate(&self) -> ValidationReport {
        let mut report = shared_checks(&self.instrument, &self.venue, &self.source, &self.attribution);
        require_positive(&mut report, "bid", self.bid);
        require_positive(&mut report, "ask", self.ask);
        if self.bid > self.ask {
            report.push("bid", "must not exceed ask");
        }
        require_non_negative(&mut report, "bid_size", self.bid_size);
        require_non_negative(&mut report, "ask_size", self.ask_size);
        report
    }

    fn descriptor() -> VariantDescriptor {
        VariantDescriptor::new(
            Self::KIND,
            AccessPattern::HighFrequency,
            vec![
                FieldDef::required("bid", FieldType::Decimal),
                FieldDef::required("bid_size", FieldType::Decimal),
                FieldDef::required("ask", FieldType::Decimal),
                FieldDef::required("ask_size", FieldType::Decimal),
            ],
        )
    }

    async fn fetch_from(
        source: &dyn SourcePort,
        query: &SeriesQuery,
    ) -> Result<Vec<Self>, HandlerError> {
        source.fetch_top_of_book(query).await
    }

    async fn store_to(&self, sink: &dyn SinkPort) -> Result<(), HandlerError> {
        sink.store_top_of_book(self).await
    }
}

// ============================================================================
// Union
// ============================================================================

/// Any record variant, tagged for transport at boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    /// Price observation.
    Price(PriceRecord),
    /// OHLCV bar.
    Ohlcv(OhlcvRecord),
    /// Windowed analytics.
    Analytics(MarketAnalyticsRecord),
    /// Top-of-book snapshot.
    TopOfBook(TopOfBookRecord),
}

impl Record {
    /// Variant tag.
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Price(_) => RecordKind::Price,
            Self::Ohlcv(_) => RecordKind::Ohlcv,
            Self::Analytics(_) => RecordKind::Analytics,
            Self::TopOfBook(_) => RecordKind::TopOfBook,
        }
    }

    /// Logical series identifier.
    #[must_use]
    pub fn instrument(&self) -> &InstrumentId {
        match self {
            Self::Price(r) => &r.instrument,
            Self::Ohlcv(r) => &r.instrument,
            Self::Analytics(r) => &r.instrument,
            Self::TopOfBook(r) => &r.instrument,
        }
    }

    /// Venue the observation was made on.
    #[must_use]
    pub fn venue(&self) -> &Venue {
        match self {
            Self::Price(r) => &r.venue,
            Self::Ohlcv(r) => &r.venue,
            Self::Analytics(r) => &r.venue,
            Self::TopOfBook(r) => &r.venue,
        }
    }

    /// Observation time.
    #[must_use]
    pub fn observed_at(&self) -> Timestamp {
        match self {
            Self::Price(r) => r.observed_at,
            Self::Ohlcv(r) => r.observed_at,
            Self::Analytics(r) => r.observed_at,
            Self::TopOfBook(r) => r.observed_at,
        }
    }

    /// Structural validation of the wrapped record.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        match self {
            Self::Price(r) => r.validate(),
            Self::Ohlcv(r) => r.validate(),
            Self::Analytics(r) => r.validate(),
            Self::TopOfBook(r) => r.validate(),
        }
    }
}

impl From<PriceRecord> for Record {
    fn from(record: PriceRecord) -> Self {
        Self::Price(record)
    }
}

impl From<OhlcvRecord> for Record {
    fn from(record: OhlcvRecord) -> Self {
        Self::Ohlcv(record)
    }
}

impl From<MarketAnalyticsRecord> for Record {
    fn from(record: MarketAnalyticsRecord) -> Self {
        Self::Analytics(record)
    }
}

impl From<TopOfBookRecord> for Record {
    fn from(record: TopOfBookRecord) -> Self {
        Self::TopOfBook(record)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn sample_price() -> PriceRecord {
        PriceRecord {
            instrument: InstrumentId::new("AAPL"),
            venue: Venue::new("XNAS"),
            observed_at: Timestamp::parse("2026-01-19T14:30:00Z").unwrap(),
            source: SourceTag::new("alpaca-sip"),
            attribution: "Consolidated Tape".to_string(),
            price: dec!(150.25),
            volume: Some(dec!(100)),
        }
    }

    pub(crate) fn sample_ohlcv() -> OhlcvRecord {
        OhlcvRecord {
            instrument: InstrumentId::new("AAPL"),
            venue: Venue::new("XNAS"),
            observed_at: Timestamp::parse("2026-01-19T14:30:00Z").unwrap(),
            source: SourceTag::new("alpaca-sip"),
            attribution: "Consolidated Tape".to_string(),
            open: dec!(150.00),
            high: dec!(151.00),
            low: dec!(149.50),
            close: dec!(150.75),
            volume: dec!(120000),
            interval_secs: 60,
        }
    }

    pub(crate) fn sample_analytics() -> MarketAnalyticsRecord {
        MarketAnalyticsRecord {
            instrument: InstrumentId::new("AAPL"),
            venue: Venue::new("XNAS"),
            observed_at: Timestamp::parse("2026-01-19T15:00:00Z").unwrap(),
            source: SourceTag::new("analytics-rollup"),
            attribution: "Consolidated Tape".to_string(),
            vwap: dec!(150.42),
            high: dec!(151.00),
            low: dec!(149.50),
            volume: dec!(480000),
            trade_count: 3200,
            window_secs: 1800,
        }
    }

    pub(crate) fn sample_top_of_book() -> TopOfBookRecord {
        TopOfBookRecord {
            instrument: InstrumentId::new("AAPL"),
            venue: Venue::new("XNAS"),
            observed_at: Timestamp::parse("2026-01-19T14:30:00Z").unwrap(),
            source: SourceTag::new("alpaca-sip"),
            attribution: "Consolidated Tape".to_string(),
            bid: dec!(150.20),
            bid_size: dec!(300),
            ask: dec!(150.30),
            ask_size: dec!(200),
        }
    }

    #[test]
    fn samples_pass_structural_validation() {
        assert!(sample_price().validate().is_valid());
        assert!(sample_ohlcv().validate().is_valid());
        assert!(sample_analytics().validate().is_valid());
        assert!(sample_top_of_book().validate().is_valid());
    }

    #[test]
    fn price_validation_rejects_non_positive_price() {
        let mut record = sample_price();
        record.price = Decimal::ZERO;
        let report = record.validate();
        assert!(!report.is_valid());
        assert_eq!(report.issues()[0].field, "price");
    }

    #[test]
    fn price_validation_rejects_missing_venue() {
        let mut record = sample_price();
        record.venue = Venue::new("");
        assert!(!record.validate().is_valid());
    }

    #[test]
    fn price_validation_rejects_missing_attribution() {
        let mut record = sample_price();
        record.attribution = String::new();
        assert!(!record.validate().is_valid());
    }

    #[test]
    fn ohlcv_validation_rejects_inverted_range() {
        let mut record = sample_ohlcv();
        record.low = dec!(152.00);
        let report = record.validate();
        assert!(report.issues().iter().any(|i| i.field == "low"));
    }

    #[test]
    fn ohlcv_validation_rejects_open_outside_range() {
        let mut record = sample_ohlcv();
        record.open = dec!(200.00);
        let report = record.validate();
        assert!(report.issues().iter().any(|i| i.field == "open"));
    }

    #[test]
    fn ohlcv_validation_rejects_zero_interval() {
        let mut record = sample_ohlcv();
        record.interval_secs = 0;
        assert!(!record.validate().is_valid());
    }

    #[test]
    fn analytics_validation_rejects_negative_trade_count() {
        let mut record = sample_analytics();
        record.trade_count = -1;
        let report = record.validate();
        assert!(report.issues().iter().any(|i| i.field == "trade_count"));
    }

    #[test]
    fn top_of_book_validation_rejects_crossed_book() {
        let mut record = sample_top_of_book();
        record.bid = dec!(150.40);
        let report = record.validate();
        assert!(report.issues().iter().any(|i| i.field == "bid"));
    }

    #[test]
    fn validation_reports_every_violation() {
        let mut record = sample_price();
        record.venue = Venue::new("");
        record.attribution = String::new();
        record.price = Decimal::ZERO;
        assert_eq!(record.validate().issues().len(), 3);
    }

    #[test]
    fn top_of_book_mid_and_spread() {
        let record = sample_top_of_book();
        assert_eq!(record.mid(), dec!(150.25));
        assert_eq!(record.spread(), dec!(0.10));
    }

    #[test]
    fn record_union_is_kind_tagged() {
        let record: Record = sample_price().into();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"price\""));

        let parsed: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind(), RecordKind::Price);
        assert_eq!(parsed.instrument().as_str(), "AAPL");
    }

    #[test]
    fn record_union_accessors() {
        let record: Record = sample_ohlcv().into();
        assert_eq!(record.kind(), RecordKind::Ohlcv);
        assert_eq!(record.venue().as_str(), "XNAS");
        assert!(record.validate().is_valid());
    }

    #[test]
    fn operation_constants_pair_per_variant() {
        assert_eq!(PriceRecord::READ_OP.paired(), PriceRecord::WRITE_OP);
        assert_eq!(OhlcvRecord::WRITE_OP.record(), RecordKind::Ohlcv);
        assert_eq!(
            MarketAnalyticsRecord::READ_OP.record(),
            RecordKind::Analytics
        );
        assert_eq!(TopOfBookRecord::KIND, RecordKind::TopOfBook);
    }
}
