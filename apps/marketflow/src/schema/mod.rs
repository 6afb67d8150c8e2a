//! Schema Propagator
//!
//! Turns the data model into deployable storage and stream schemas. One
//! authoritative model — assembled from the record variants' descriptors —
//! feeds both outputs, so a field added to a variant lands in its table
//! and its topic in the same generation run.
//!
//! Generation is pure and deterministic: the same model renders
//! byte-identical text on every run, on every machine. Drift between the
//! generated schema and what is actually deployed is detected and
//! reported, never repaired automatically.

pub mod storage;
pub mod stream;

pub use storage::StorageSchema;
pub use stream::StreamSchema;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::record::{
    MarketAnalyticsRecord, OhlcvRecord, PriceRecord, RecordKind, SeriesRecord, TopOfBookRecord,
};
use crate::error::EngineError;

/// Column name of the temporal key, shared by every variant.
pub const TEMPORAL_KEY: &str = "observed_at";

/// Columns identifying a series; with [`TEMPORAL_KEY`] they uniquely
/// identify a record.
pub const SERIES_KEY: [&str; 2] = ["instrument", "venue"];

/// Dialect-neutral column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// UTF-8 text.
    Text,
    /// Arbitrary-precision decimal.
    Decimal,
    /// Timestamp with time zone.
    TimestampTz,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
}

impl FieldType {
    /// SQL rendering of this type.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Decimal => "NUMERIC",
            Self::TimestampTz => "TIMESTAMPTZ",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
        }
    }
}

/// One column of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Column name.
    pub name: String,
    /// Column type.
    pub field_type: FieldType,
    /// Whether NULL is allowed.
    pub nullable: bool,
}

impl FieldDef {
    /// A NOT NULL column.
    #[must_use]
    pub fn required(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            nullable: false,
        }
    }

    /// A nullable column.
    #[must_use]
    pub fn nullable(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            nullable: true,
        }
    }
}

/// Write/read intensity class of a variant.
///
/// Drives the policy table: partition window, retention, compression,
/// and stream fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPattern {
    /// Many small writes, recent reads (prices, top-of-book).
    HighFrequency,
    /// Fewer writes, long lookback reads (bars, analytics).
    LowFrequency,
}

/// Policy values for one access pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Storage partition window, in seconds.
    pub partition_window_secs: u64,
    /// Storage retention, in days.
    pub retention_days: u32,
    /// Days after which partitions are compressed.
    pub compress_after_days: u32,
    /// Stream partition count.
    pub stream_partitions: u32,
}

impl AccessPattern {
    /// The policy table.
    #[must_use]
    pub const fn policy(self) -> AccessPolicy {
        match self {
            Self::HighFrequency => AccessPolicy {
                partition_window_secs: 3_600,
                retention_days: 30,
                compress_after_days: 7,
                stream_partitions: 16,
            },
            Self::LowFrequency => AccessPolicy {
                partition_window_secs: 86_400,
                retention_days: 730,
                compress_after_days: 30,
                stream_partitions: 4,
            },
        }
    }
}

/// Schema-facing description of one record variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDescriptor {
    /// Variant tag.
    pub kind: RecordKind,
    /// Access pattern, selecting the policy row.
    pub access: AccessPattern,
    /// Complete column list: the shared mandatory columns first, then
    /// the variant's own.
    pub fields: Vec<FieldDef>,
}

impl VariantDescriptor {
    /// Build a descriptor, prepending the shared mandatory columns.
    #[must_use]
    pub fn new(kind: RecordKind, access: AccessPattern, variant_fields: Vec<FieldDef>) -> Self {
        let mut fields = shared_fields();
        fields.extend(variant_fields);
        Self {
            kind,
            access,
            fields,
        }
    }
}

fn shared_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::required("instrument", FieldType::Text),
        FieldDef::required("venue", FieldType::Text),
        FieldDef::required(TEMPORAL_KEY, FieldType::TimestampTz),
        FieldDef::required("source", FieldType::Text),
        FieldDef::required("attribution", FieldType::Text),
    ]
}

/// The authoritative data model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModel {
    /// Variant descriptors, in declaration order.
    pub variants: Vec<VariantDescriptor>,
}

impl DataModel {
    /// The engine's standard model: every record variant, in declaration
    /// order.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            variants: vec![
                PriceRecord::descriptor(),
                OhlcvRecord::descriptor(),
                MarketAnalyticsRecord::descriptor(),
                TopOfBookRecord::descriptor(),
            ],
        }
    }
}

/// One variant's rendered schema text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFragment {
    /// Variant name.
    pub variant: String,
    /// Rendered storage and stream schema for the variant.
    pub body: String,
}

/// Generated schemas for the whole model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSet {
    /// Storage schemas, one per variant, in model order.
    pub storage: Vec<StorageSchema>,
    /// Stream schemas, one per variant, in model order.
    pub stream: Vec<StreamSchema>,
}

impl SchemaSet {
    /// Per-variant fragments, in model order.
    ///
    /// A change to one variant's descriptor changes only that variant's
    /// fragment.
    #[must_use]
    pub fn fragments(&self) -> Vec<SchemaFragment> {
        self.storage
            .iter()
            .zip(&self.stream)
            .map(|(storage, stream)| SchemaFragment {
                variant: storage.variant.clone(),
                body: format!("{}\n{}", storage.render(), stream.render()),
            })
            .collect()
    }

    /// Full rendered schema text, fragments in model order.
    #[must_use]
    pub fn render(&self) -> String {
        self.fragments()
            .iter()
            .map(|fragment| fragment.body.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// SHA-256 of the rendered text, as lowercase hex.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.render().as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Compare the generated fragments against what is deployed.
    ///
    /// # Errors
    ///
    /// Returns a schema-drift error naming every variant whose deployed
    /// fragment is missing, divergent, or unknown to the model. Nothing
    /// is repaired.
    pub fn detect_drift(&self, deployed: &[SchemaFragment]) -> Result<(), EngineError> {
        let mut drifted = Vec::new();

        for expected in self.fragments() {
            match deployed.iter().find(|f| f.variant == expected.variant) {
                None => drifted.push(expected.variant),
                Some(actual) if actual.body != expected.body => drifted.push(expected.variant),
                Some(_) => {}
            }
        }

        for actual in deployed {
            if !self.storage.iter().any(|s| s.variant == actual.variant) {
                drifted.push(actual.variant.clone());
            }
        }

        if drifted.is_empty() {
            return Ok(());
        }
        tracing::warn!(variants = ?drifted, "Schema drift detected");
        Err(EngineError::schema_drift(
            drifted,
            "deployed schema diverges from the generated model",
        ))
    }
}

/// Generate storage and stream schemas from a model.
#[must_use]
pub fn generate(model: &DataModel) -> SchemaSet {
    SchemaSet {
        storage: model.variants.iter().map(StorageSchema::from_descriptor).collect(),
        stream: model.variants.iter().map(StreamSchema::from_descriptor).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_model_covers_every_variant_in_order() {
        let model = DataModel::standard();
        let kinds: Vec<_> = model.variants.iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            [
                RecordKind::Price,
                RecordKind::Ohlcv,
                RecordKind::Analytics,
                RecordKind::TopOfBook
            ]
        );
    }

    #[test]
    fn every_variant_carries_the_shared_columns_first() {
        let model = DataModel::standard();
        for variant in &model.variants {
            let names: Vec<_> = variant.fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(
                &names[..5],
                &["instrument", "venue", "observed_at", "source", "attribution"],
                "variant {} misses shared columns",
                variant.kind
            );
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let model = DataModel::standard();
        let first = generate(&model);
        let second = generate(&model);

        assert_eq!(first.render(), second.render());
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fragment_change_is_local_to_its_variant() {
        let model = DataModel::standard();
        let baseline = generate(&model).fragments();

        let mut changed_model = model.clone();
        changed_model.variants[1]
            .fields
            .push(FieldDef::required("trade_count", FieldType::BigInt));
        let changed = generate(&changed_model).fragments();

        assert_eq!(baseline.len(), changed.len());
        for (before, after) in baseline.iter().zip(&changed) {
            if before.variant == "ohlcv" {
                assert_ne!(before.body, after.body);
            } else {
                assert_eq!(before.body, after.body, "fragment {} changed", before.variant);
            }
        }
    }

    #[test]
    fn drift_detection_flags_divergent_and_missing_variants() {
        let set = generate(&DataModel::standard());
        let mut deployed = set.fragments();

        // In sync
        assert!(set.detect_drift(&deployed).is_ok());

        // Divergent body
        deployed[0].body.push_str("\n-- manual patch");
        // Missing variant
        deployed.remove(2);

        let err = set.detect_drift(&deployed).unwrap_err();
        match err {
            EngineError::SchemaDrift { variants, .. } => {
                assert!(variants.contains(&"price".to_string()));
                assert!(variants.contains(&"analytics".to_string()));
                assert!(!variants.contains(&"ohlcv".to_string()));
            }
            other => panic!("expected SchemaDrift, got {other}"),
        }
    }

    #[test]
    fn drift_detection_flags_unknown_deployed_variants() {
        let set = generate(&DataModel::standard());
        let mut deployed = set.fragments();
        deployed.push(SchemaFragment {
            variant: "greeks".to_string(),
            body: "CREATE TABLE md_greeks ()".to_string(),
        });

        let err = set.detect_drift(&deployed).unwrap_err();
        match err {
            EngineError::SchemaDrift { variants, .. } => {
                assert_eq!(variants, ["greeks"]);
            }
            other => panic!("expected SchemaDrift, got {other}"),
        }
    }

    #[test]
    fn fingerprint_tracks_model_changes() {
        let baseline = generate(&DataModel::standard()).fingerprint();

        let mut model = DataModel::standard();
        model.variants[0]
            .fields
            .push(FieldDef::nullable("conditions", FieldType::Text));
        let changed = generate(&model).fingerprint();

        assert_eq!(baseline.len(), 64);
        assert_ne!(baseline, changed);
    }
}
