//! Pipeline module: detect, hash, parse, score, batch.
//!
//! The parsing core is synchronous. This module drives it per file and, for
//! async callers, fans files out onto the blocking pool.

mod report;

pub use report::{FileReport, ProcessedFile};

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::Stream;
use tracing::{debug, error, info, warn};

use crate::conf::IngestConfig;
use crate::hashing;
use crate::parser::formats::access_log::EventClassifier;
use crate::parser::formats::AccessLogParser;
use crate::parser::metrics::ParsingMetrics;
use crate::parser::stats::EventStatistics;
use crate::parser::{detect_log_type, FormatTag, NormalizedEvent, ParseError, ParserFactory};
use crate::scoring::{RiskDistribution, RiskScorer, ScoredEvent};

/// Batches buffered between a blocking parser and an async consumer.
const CHANNEL_DEPTH: usize = 4;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no parser registered for format {format} ({path})")]
    NoParser { format: FormatTag, path: PathBuf },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to hash {path}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid attack signature: {0}")]
    Signature(#[from] regex::Error),

    #[error("batch sink failed: {0}")]
    Sink(String),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("worker pool closed")]
    Cancelled,
}

pub struct Pipeline {
    config: IngestConfig,
    factory: Arc<ParserFactory>,
    scorer: RiskScorer,
    metrics: Arc<ParsingMetrics>,
}

impl Pipeline {
    pub fn new(config: IngestConfig, factory: Arc<ParserFactory>) -> Self {
        let scorer = RiskScorer::with_tables(config.scoring.clone());
        Self {
            config,
            factory,
            scorer,
            metrics: Arc::new(ParsingMetrics::new()),
        }
    }

    /// Default parsers, with the access-log parser tuned from `config`.
    pub fn from_config(config: IngestConfig) -> Result<Self, PipelineError> {
        let mut access_log = AccessLogParser::new()
            .with_sample_size(config.detection_sample_lines)
            .with_large_file_threshold(config.streaming_threshold_bytes);
        if !config.signatures.is_empty() {
            let classifier = EventClassifier::with_signatures(&config.signatures)?;
            info!("Loaded {} custom attack signatures", config.signatures.len());
            access_log = access_log.with_classifier(Arc::new(classifier));
        }

        let factory = ParserFactory::new();
        factory.register(FormatTag::AccessLog.as_str(), Arc::new(access_log));
        Ok(Self::new(config, Arc::new(factory)))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn factory(&self) -> &ParserFactory {
        &self.factory
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    pub fn metrics(&self) -> &ParsingMetrics {
        &self.metrics
    }

    pub fn score(&self, event: NormalizedEvent) -> ScoredEvent {
        let assessment = self.scorer.score(&event);
        self.metrics.record_risk(assessment.risk_label);
        ScoredEvent::new(event, assessment)
    }

    /// Re-derive scores when `recalculate` is set, otherwise keep them.
    ///
    /// Returns how many events were rescored.
    pub fn rescore(&self, events: &mut [ScoredEvent], recalculate: bool) -> usize {
        if !recalculate {
            return 0;
        }
        for scored in events.iter_mut() {
            scored.apply(self.scorer.score(&scored.event));
        }
        events.len()
    }

    /// Ingest one file, handing scored events to `sink` in batches of
    /// `batch_size`. The last batch may be shorter.
    pub fn process_file<F>(&self, path: &Path, mut sink: F) -> Result<FileReport, PipelineError>
    where
        F: FnMut(Vec<ScoredEvent>) -> Result<(), PipelineError>,
    {
        let started = Instant::now();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let format = detect_log_type(path, &filename);
        self.metrics.record_detection(format);
        debug!(path = %path.display(), format = %format, "Detected log format");

        let sha256 = hashing::sha256_file(path).map_err(|source| {
            self.metrics.record_file_error();
            PipelineError::Hash {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let Some(parser) = self.factory.get_parser(format) else {
            self.metrics.record_no_parser();
            warn!(path = %path.display(), format = %format, "No parser available");
            return Err(PipelineError::NoParser {
                format,
                path: path.to_path_buf(),
            });
        };

        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let streamed = size > self.config.streaming_threshold_bytes;

        let mut batcher = Batcher::new(self.config.batch_size, &mut sink);
        let (parsed, failed, skipped, statistics) = if streamed {
            info!(path = %path.display(), size, "Large file, parsing in streaming mode");
            let mut stream = parser.stream(path).inspect_err(|_| self.metrics.record_file_error())?;
            for event in stream.by_ref() {
                batcher.push(self.score(event))?;
            }
            (stream.parsed(), stream.failed(), stream.skipped(), None)
        } else {
            let outcome = parser.parse(path).inspect_err(|_| self.metrics.record_file_error())?;
            let statistics = EventStatistics::from_events(&outcome.events);
            for event in outcome.events {
                batcher.push(self.score(event))?;
            }
            (outcome.parsed, outcome.failed, outcome.skipped, Some(statistics))
        };
        let (scored, risk_distribution) = batcher.finish()?;

        let elapsed = started.elapsed();
        self.metrics.record_file(format, parsed, failed, skipped, elapsed);
        info!(
            path = %path.display(),
            format = %format,
            parsed,
            failed,
            skipped,
            "Finished file"
        );

        Ok(FileReport {
            path: path.to_path_buf(),
            filename,
            format,
            sha256,
            parsed,
            failed,
            skipped,
            scored,
            streamed,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            risk_distribution,
            statistics,
        })
    }

    /// [`Pipeline::process_file`] with every scored event kept in memory.
    pub fn collect_file(&self, path: &Path) -> Result<ProcessedFile, PipelineError> {
        let mut events = Vec::new();
        let report = self.process_file(path, |batch| {
            events.extend(batch);
            Ok(())
        })?;
        Ok(ProcessedFile { report, events })
    }

    /// Process files concurrently on the blocking pool, at most
    /// `max_concurrent_files` at a time. Results keep input order.
    pub async fn process_files(self: &Arc<Self>, paths: Vec<PathBuf>) -> Vec<Result<ProcessedFile, PipelineError>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_files));

        let tasks = paths.into_iter().map(|path| {
            let pipeline = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire_owned().await.map_err(|_| PipelineError::Cancelled)?;
                let result = tokio::task::spawn_blocking(move || pipeline.collect_file(&path)).await?;
                if let Err(ref e) = result {
                    error!("File processing failed: {}", e);
                }
                result
            }
        });

        join_all(tasks).await
    }

    /// Scored batches of one file as an async stream.
    ///
    /// Parsing runs on the blocking pool and waits whenever the consumer is
    /// `CHANNEL_DEPTH` batches behind, so memory stays bounded for any file
    /// size. Dropping the stream stops the parser at its next batch.
    pub fn stream_batches(self: Arc<Self>, path: PathBuf) -> impl Stream<Item = Result<Vec<ScoredEvent>, PipelineError>> {
        let pipeline = self;
        async_stream::stream! {
            let (tx, mut rx) = mpsc::channel::<Result<Vec<ScoredEvent>, PipelineError>>(CHANNEL_DEPTH);

            let worker = tokio::task::spawn_blocking(move || {
                let result = pipeline.process_file(&path, |batch| {
                    tx.blocking_send(Ok(batch))
                        .map_err(|_| PipelineError::Sink("consumer dropped".into()))
                });
                match result {
                    Ok(report) => debug!(path = %report.path.display(), scored = report.scored, "Stream complete"),
                    Err(PipelineError::Sink(_)) => debug!("Batch consumer went away, stopping parser"),
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                    }
                }
            });

            while let Some(item) = rx.recv().await {
                yield item;
            }

            if let Err(e) = worker.await {
                yield Err(PipelineError::Join(e));
            }
        }
    }
}

/// Accumulates scored events and flushes full batches to the sink.
struct Batcher<'s, F> {
    batch_size: usize,
    batch: Vec<ScoredEvent>,
    sink: &'s mut F,
    scored: u64,
    distribution: RiskDistribution,
}

impl<'s, F> Batcher<'s, F>
where
    F: FnMut(Vec<ScoredEvent>) -> Result<(), PipelineError>,
{
    fn new(batch_size: usize, sink: &'s mut F) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            batch: Vec::with_capacity(batch_size),
            sink,
            scored: 0,
            distribution: RiskDistribution::default(),
        }
    }

    fn push(&mut self, event: ScoredEvent) -> Result<(), PipelineError> {
        self.scored += 1;
        self.distribution.record(&event);
        self.batch.push(event);
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PipelineError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let full = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        (self.sink)(full)
    }

    fn finish(mut self) -> Result<(u64, RiskDistribution), PipelineError> {
        self.flush()?;
        Ok((self.scored, self.distribution))
    }
}
