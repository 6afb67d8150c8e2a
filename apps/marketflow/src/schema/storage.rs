//! Time-partitioned table descriptors.
//!
//! One table per record variant, named `md_<variant>`, partitioned on the
//! temporal key with retention and compression picked from the policy
//! table. The descriptor stays dialect-neutral; [`StorageSchema::render`]
//! emits TimescaleDB-flavored statements as deployable text.

use serde::{Deserialize, Serialize};

use super::{FieldDef, SERIES_KEY, TEMPORAL_KEY, VariantDescriptor};

/// Storage schema for one record variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSchema {
    /// Variant name.
    pub variant: String,
    /// Table name (`md_<variant>`).
    pub table: String,
    /// Complete column list, in descriptor order.
    pub columns: Vec<FieldDef>,
    /// Temporal partition key column.
    pub temporal_key: String,
    /// Columns that uniquely identify a record.
    pub uniqueness_key: Vec<String>,
    /// Partition window, in seconds.
    pub partition_window_secs: u64,
    /// Retention, in days.
    pub retention_days: u32,
    /// Days after which partitions are compressed.
    pub compress_after_days: u32,
}

impl StorageSchema {
    /// Derive the storage schema from a variant descriptor.
    #[must_use]
    pub fn from_descriptor(descriptor: &VariantDescriptor) -> Self {
        let policy = descriptor.access.policy();
        let variant = descriptor.kind.as_str().to_string();
        let mut uniqueness_key: Vec<String> =
            SERIES_KEY.iter().map(|c| (*c).to_string()).collect();
        uniqueness_key.push(TEMPORAL_KEY.to_string());

        Self {
            table: format!("md_{variant}"),
            variant,
            columns: descriptor.fields.clone(),
            temporal_key: TEMPORAL_KEY.to_string(),
            uniqueness_key,
            partition_window_secs: policy.partition_window_secs,
            retention_days: policy.retention_days,
            compress_after_days: policy.compress_after_days,
        }
    }

    /// Render the schema as deployable DDL text.
    ///
    /// Deterministic: the same descriptor renders byte-identical text on
    /// every run.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("-- storage: {}\n", self.variant));
        out.push_str(&format!("CREATE TABLE IF NOT EXISTS {} (\n", self.table));
        for column in &self.columns {
            let nullability = if column.nullable { "" } else { " NOT NULL" };
            out.push_str(&format!(
                "    {} {}{},\n",
                column.name,
                column.field_type.sql(),
                nullability
            ));
        }
        out.push_str(&format!(
            "    UNIQUE ({})\n);\n",
            self.uniqueness_key.join(", ")
        ));

        out.push_str(&format!(
            "SELECT create_hypertable('{}', '{}', chunk_time_interval => INTERVAL '{} seconds', if_not_exists => TRUE);\n",
            self.table, self.temporal_key, self.partition_window_secs
        ));
        out.push_str(&format!(
            "SELECT add_retention_policy('{}', INTERVAL '{} days', if_not_exists => TRUE);\n",
            self.table, self.retention_days
        ));
        out.push_str(&format!(
            "ALTER TABLE {} SET (timescaledb.compress, timescaledb.compress_segmentby = '{}');\n",
            self.table,
            SERIES_KEY.join(", ")
        ));
        out.push_str(&format!(
            "SELECT add_compression_policy('{}', INTERVAL '{} days', if_not_exists => TRUE);\n",
            self.table, self.compress_after_days
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{OhlcvRecord, PriceRecord, SeriesRecord};

    #[test]
    fn price_schema_uses_the_high_frequency_policy() {
        let schema = StorageSchema::from_descriptor(&PriceRecord::descriptor());

        assert_eq!(schema.variant, "price");
        assert_eq!(schema.table, "md_price");
        assert_eq!(schema.temporal_key, "observed_at");
        assert_eq!(schema.uniqueness_key, ["instrument", "venue", "observed_at"]);
        assert_eq!(schema.partition_window_secs, 3_600);
        assert_eq!(schema.retention_days, 30);
        assert_eq!(schema.compress_after_days, 7);
    }

    #[test]
    fn ohlcv_schema_uses_the_low_frequency_policy() {
        let schema = StorageSchema::from_descriptor(&OhlcvRecord::descriptor());

        assert_eq!(schema.table, "md_ohlcv");
        assert_eq!(schema.partition_window_secs, 86_400);
        assert_eq!(schema.retention_days, 730);
    }

    #[test]
    fn render_emits_every_column_and_policy_statement() {
        let schema = StorageSchema::from_descriptor(&PriceRecord::descriptor());
        let ddl = schema.render();

        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS md_price"));
        assert!(ddl.contains("instrument TEXT NOT NULL"));
        assert!(ddl.contains("price NUMERIC NOT NULL"));
        // volume is the one nullable column on the price variant
        assert!(ddl.contains("volume NUMERIC,"));
        assert!(ddl.contains("UNIQUE (instrument, venue, observed_at)"));
        assert!(ddl.contains("create_hypertable('md_price', 'observed_at'"));
        assert!(ddl.contains("add_retention_policy('md_price', INTERVAL '30 days'"));
        assert!(ddl.contains("add_compression_policy('md_price', INTERVAL '7 days'"));
    }

    #[test]
    fn render_is_deterministic() {
        let descriptor = PriceRecord::descriptor();
        let first = StorageSchema::from_descriptor(&descriptor).render();
        let second = StorageSchema::from_descriptor(&descriptor).render();
        assert_eq!(first, second);
    }
}
