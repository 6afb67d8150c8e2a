//! Stream topic descriptors.
//!
//! One topic per record variant, `marketdata.<variant>.v1`, with the
//! partition count picked from the policy table. The partition key is a
//! SHA-256 of `instrument ":" venue`, so every event of one logical series
//! lands in the same partition and stays ordered. The derivation is
//! restart-stable by construction; a process-local hasher would not be.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::VariantDescriptor;
use crate::domain::identifiers::{InstrumentId, Venue};

/// Stream schema for one record variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSchema {
    /// Variant name.
    pub variant: String,
    /// Topic name (`marketdata.<variant>.v1`).
    pub topic: String,
    /// Number of topic partitions.
    pub partitions: u32,
    /// Human-readable key derivation expression, for deployment review.
    pub key_expression: String,
}

impl StreamSchema {
    /// Derive the stream schema from a variant descriptor.
    #[must_use]
    pub fn from_descriptor(descriptor: &VariantDescriptor) -> Self {
        let variant = descriptor.kind.as_str().to_string();
        Self {
            topic: format!("marketdata.{variant}.v1"),
            variant,
            partitions: descriptor.access.policy().stream_partitions,
            key_expression: "sha256(instrument ':' venue)".to_string(),
        }
    }

    /// Partition an event of this topic lands in.
    ///
    /// First 8 bytes of the key digest, big-endian, mod the partition
    /// count. A zero partition count maps everything to partition 0.
    #[must_use]
    pub fn partition_for(&self, instrument: &InstrumentId, venue: &Venue) -> u32 {
        let digest = Sha256::digest(partition_key(instrument, venue).as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % u64::from(self.partitions.max(1))) as u32
    }

    /// Render the schema as deployable topic-config text.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "-- stream: {}\ntopic: {}\npartitions: {}\nkey: {}\n",
            self.variant, self.topic, self.partitions, self.key_expression
        )
    }
}

/// The partition key of one logical series.
#[must_use]
pub fn partition_key(instrument: &InstrumentId, venue: &Venue) -> String {
    format!("{}:{}", instrument.as_str(), venue.as_str())
}
