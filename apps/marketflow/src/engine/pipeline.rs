//! Composed read → transform → write pipelines.
//!
//! A pipeline moves one record variant from a reader engine to a writer
//! engine. The composition laws are enforced by construction: the single
//! type parameter makes the read output and write input the same variant;
//! flow is strictly reader to writer; the write stage starts only after
//! the read result is fully resolved; and construction rejects engines
//! that cannot serve their stage. Failures travel as results, never as
//! panics.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::WorkflowEngine;
use super::batch::BatchOutcome;
use crate::domain::query::SeriesQuery;
use crate::domain::record::SeriesRecord;
use crate::error::EngineError;

type Transform<R> = Arc<dyn Fn(R) -> Option<R> + Send + Sync>;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Records the read stage returned.
    pub read_count: usize,
    /// Records the transform dropped.
    pub dropped_count: usize,
    /// Aggregate outcome of the write stage.
    pub write: BatchOutcome,
}

/// A composed pipeline over one record variant.
pub struct Pipeline<R: SeriesRecord> {
    reader: Arc<WorkflowEngine>,
    writer: Arc<WorkflowEngine>,
    transform: Option<Transform<R>>,
}

impl<R: SeriesRecord> Pipeline<R> {
    /// Compose a reader engine with a writer engine.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the reader has no source
    /// handler or the writer has no sink handler — an inadmissible
    /// composition is rejected before anything runs.
    pub fn new(
        reader: Arc<WorkflowEngine>,
        writer: Arc<WorkflowEngine>,
    ) -> Result<Self, EngineError> {
        if !reader.has_source() {
            return Err(EngineError::configuration(format!(
                "pipeline reader '{}' has no source handler for {}",
                reader.name(),
                R::READ_OP
            )));
        }
        if !writer.has_sink() {
            return Err(EngineError::configuration(format!(
                "pipeline writer '{}' has no sink handler for {}",
                writer.name(),
                R::WRITE_OP
            )));
        }
        Ok(Self {
            reader,
            writer,
            transform: None,
        })
    }

    /// Insert a pure per-record transform between the stages.
    ///
    /// Returning `None` drops the record.
    #[must_use]
    pub fn with_transform(
        mut self,
        transform: impl Fn(R) -> Option<R> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Run the pipeline once for one series query.
    ///
    /// The read stage resolves completely before the first write; the
    /// write stage aggregates per-record failures like any batch write.
    ///
    /// # Errors
    ///
    /// A read failure surfaces as-is and the write stage never starts;
    /// write-stage configuration failures (draining writer) surface from
    /// the batch call.
    pub async fn run(&self, query: &SeriesQuery) -> Result<PipelineOutcome, EngineError> {
        let records: Vec<R> = self.reader.read(query).await?;
        let read_count = records.len();

        let outgoing: Vec<R> = match &self.transform {
            Some(transform) => records.into_iter().filter_map(|r| transform(r)).collect(),
            None => records,
        };
        let dropped_count = read_count - outgoing.len();

        let write = self.writer.write_batch(&outgoing).await?;
        Ok(PipelineOutcome {
            read_count,
            dropped_count,
            write,
        })
    }
}

impl<R: SeriesRecord> std::fmt::Debug for Pipeline<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("reader", &self.reader.name())
            .field("writer", &self.writer.name())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::domain::identifiers::{InstrumentId, Venue};
    use crate::domain::record::tests::sample_price;
    use crate::domain::record::{
        MarketAnalyticsRecord, OhlcvRecord, PriceRecord, TopOfBookRecord,
    };
    use crate::ports::handler::{HandlerError, SinkPort, SourcePort};

    struct PriceSource {
        records: Vec<PriceRecord>,
    }

    #[async_trait]
    impl SourcePort for PriceSource {
        async fn fetch_prices(
            &self,
            _query: &SeriesQuery,
        ) -> Result<Vec<PriceRecord>, HandlerError> {
            Ok(self.records.clone())
        }

        async fn fetch_ohlcv(
            &self,
            _query: &SeriesQuery,
        ) -> Result<Vec<OhlcvRecord>, HandlerError> {
            Ok(vec![])
        }

        async fn fetch_analytics(
            &self,
            _query: &SeriesQuery,
        ) -> Result<Vec<MarketAnalyticsRecord>, HandlerError> {
            Ok(vec![])
        }

        async fn fetch_top_of_book(
            &self,
            _query: &SeriesQuery,
        ) -> Result<Vec<TopOfBookRecord>, HandlerError> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        prices: Mutex<Vec<PriceRecord>>,
        others: AtomicUsize,
    }

    #[async_trait]
    impl SinkPort for CollectingSink {
        async fn store_price(&self, record: &PriceRecord) -> Result<(), HandlerError> {
            self.prices.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn store_ohlcv(&self, _record: &OhlcvRecord) -> Result<(), HandlerError> {
            self.others.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn store_analytics(
            &self,
            _record: &MarketAnalyticsRecord,
        ) -> Result<(), HandlerError> {
            self.others.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn store_top_of_book(&self, _record: &TopOfBookRecord) -> Result<(), HandlerError> {
            self.others.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn query() -> SeriesQuery {
        SeriesQuery::new(InstrumentId::new("AAPL"), Venue::new("XNAS"))
    }

    async fn engines(records: Vec<PriceRecord>) -> (Arc<WorkflowEngine>, Arc<WorkflowEngine>, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let reader = Arc::new(
            WorkflowEngine::builder()
                .with_name("reader")
                .with_source(Arc::new(PriceSource { records }))
                .build()
                .unwrap(),
        );
        let writer = Arc::new(
            WorkflowEngine::builder()
                .with_name("writer")
                .with_sink(Arc::clone(&sink) as _)
                .build()
                .unwrap(),
        );
        reader.initialize().await.unwrap();
        writer.initialize().await.unwrap();
        (reader, writer, sink)
    }

    #[tokio::test]
    async fn pipeline_moves_records_reader_to_writer() {
        let (reader, writer, sink) = engines(vec![sample_price(), sample_price()]).await;
        let pipeline = Pipeline::<PriceRecord>::new(reader, writer).unwrap();

        let outcome = pipeline.run(&query()).await.unwrap();

        assert_eq!(outcome.read_count, 2);
        assert_eq!(outcome.dropped_count, 0);
        assert_eq!(outcome.write.success_count, 2);
        assert_eq!(sink.prices.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn transform_can_rewrite_and_drop_records() {
        let mut cheap = sample_price();
        cheap.price = dec!(1.00);
        let (reader, writer, sink) = engines(vec![sample_price(), cheap]).await;

        let pipeline = Pipeline::<PriceRecord>::new(reader, writer)
            .unwrap()
            .with_transform(|mut record| {
                if record.price < dec!(10) {
                    return None;
                }
                record.source = crate::domain::identifiers::SourceTag::new("pipeline");
                Some(record)
            });

        let outcome = pipeline.run(&query()).await.unwrap();

        assert_eq!(outcome.read_count, 2);
        assert_eq!(outcome.dropped_count, 1);
        assert_eq!(outcome.write.success_count, 1);
        assert_eq!(sink.prices.lock().unwrap()[0].source.as_str(), "pipeline");
    }

    #[tokio::test]
    async fn inadmissible_composition_is_rejected_at_construction() {
        let (reader, writer, _sink) = engines(vec![]).await;

        // The writer has no source; composing it as the reader must fail
        let err = Pipeline::<PriceRecord>::new(Arc::clone(&writer), writer).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
        assert!(format!("{err}").contains("no source handler"));

        // And a reader engine cannot serve the write stage
        let err = Pipeline::<PriceRecord>::new(Arc::clone(&reader), reader).unwrap_err();
        assert!(format!("{err}").contains("no sink handler"));
    }

    #[tokio::test]
    async fn read_failure_prevents_the_write_stage() {
        struct FailingSource;

        #[async_trait]
        impl SourcePort for FailingSource {
            async fn fetch_prices(
                &self,
                _query: &SeriesQuery,
            ) -> Result<Vec<PriceRecord>, HandlerError> {
                Err(HandlerError::Status {
                    code: 404,
                    message: "unknown instrument".to_string(),
                })
            }

            async fn fetch_ohlcv(
                &self,
                _query: &SeriesQuery,
            ) -> Result<Vec<OhlcvRecord>, HandlerError> {
                Ok(vec![])
            }

            async fn fetch_analytics(
                &self,
                _query: &SeriesQuery,
            ) -> Result<Vec<MarketAnalyticsRecord>, HandlerError> {
                Ok(vec![])
            }

            async fn fetch_top_of_book(
                &self,
                _query: &SeriesQuery,
            ) -> Result<Vec<TopOfBookRecord>, HandlerError> {
                Ok(vec![])
            }
        }

        let sink = Arc::new(CollectingSink::default());
        let reader = Arc::new(
            WorkflowEngine::builder()
                .with_source(Arc::new(FailingSource))
                .build()
                .unwrap(),
        );
        let writer = Arc::new(
            WorkflowEngine::builder()
                .with_sink(Arc::clone(&sink) as _)
                .build()
                .unwrap(),
        );
        reader.initialize().await.unwrap();
        writer.initialize().await.unwrap();

        let pipeline = Pipeline::<PriceRecord>::new(reader, writer).unwrap();
        let err = pipeline.run(&query()).await.unwrap_err();

        assert!(matches!(err, EngineError::Transport { .. }));
        assert!(sink.prices.lock().unwrap().is_empty());
    }
}
