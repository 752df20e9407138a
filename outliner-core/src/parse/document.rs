use std::{
    collections::HashSet,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::mpsc;
use tracing::Instrument;

use super::{
    aggregate::{Aggregator, DocumentOutcome},
    page::{WorkerContext, WorkerModels},
    pool::{ContextFactory, PoolConfig, WorkerPool},
    producer::{produce_documents, ProducerEvent},
    titles::DEFAULT_HEADING_LEVELS,
};
use crate::{
    entities::{DocumentId, InputDocument, PageResult, RunReport},
    error::{AggregationError, DocumentFailure, FailureReason, PoolError, WorkerInitError},
    pdf::PdfBackend,
};

/// Pipeline configuration for [`OutlineExtractor`].
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Number of page workers, each holding its own models.
    pub workers: usize,
    /// Pixels added around every detection before text lookup and OCR.
    pub padding: f32,
    /// Page raster resolution.
    pub render_dpi: f32,
    /// Longest wait for the next pipeline event before giving up.
    pub result_timeout: Duration,
    pub task_capacity: usize,
    pub result_capacity: usize,
    /// Maximum number of heading levels in outlines.
    pub heading_levels: usize,
    /// When set, workers write annotated page images here.
    pub debug_dir: Option<PathBuf>,
}

impl ExtractConfig {
    pub const MAX_DEFAULT_WORKERS: usize = 4;
    pub const PADDING: f32 = 5.0;
    pub const RENDER_DPI: f32 = 100.0;
    pub const RESULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// min(available cores, 4)
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(Self::MAX_DEFAULT_WORKERS)
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        let workers = Self::default_workers();
        Self {
            workers,
            padding: Self::PADDING,
            render_dpi: Self::RENDER_DPI,
            result_timeout: Self::RESULT_TIMEOUT,
            task_capacity: workers * 2,
            result_capacity: workers * 2,
            heading_levels: DEFAULT_HEADING_LEVELS,
            debug_dir: None,
        }
    }
}

enum Incoming {
    Producer(Option<ProducerEvent>),
    Page(Option<PageResult>),
}

/// Runs the whole extraction: one producer splitting documents into page
/// tasks, a pool of workers, and a single aggregator emitting one outcome
/// per document.
pub struct OutlineExtractor {
    backend: Arc<dyn PdfBackend>,
    pool: WorkerPool,
    config: ExtractConfig,
}

impl OutlineExtractor {
    /// Starts the worker pool. `load_models` runs once on each worker
    /// thread; the pool starts if at least one worker loads successfully.
    pub async fn start<F>(
        backend: Arc<dyn PdfBackend>,
        config: ExtractConfig,
        load_models: F,
    ) -> Result<Self, PoolError>
    where
        F: Fn(usize) -> anyhow::Result<WorkerModels> + Send + Sync + 'static,
    {
        let factory: ContextFactory = {
            let backend = Arc::clone(&backend);
            let padding = config.padding;
            let debug_dir = config.debug_dir.clone();
            Arc::new(move |id| {
                let models = load_models(id).map_err(|e| WorkerInitError::new(id, &e))?;
                Ok(WorkerContext {
                    models,
                    backend: Arc::clone(&backend),
                    padding,
                    debug_dir: debug_dir.clone(),
                })
            })
        };
        let pool = WorkerPool::start(
            PoolConfig {
                workers: config.workers,
                task_capacity: config.task_capacity,
                result_capacity: config.result_capacity,
            },
            factory,
        )
        .await?;

        Ok(Self {
            backend,
            pool,
            config,
        })
    }

    pub fn healthy_workers(&self) -> usize {
        self.pool.healthy_workers()
    }

    /// Processes `documents` and shuts the pool down.
    ///
    /// `on_outcome` is called as soon as each document is finalized or
    /// fails. Every input document is reported exactly once, either in
    /// `completed` or in `failed`.
    #[tracing::instrument(skip_all, fields(documents = documents.len()))]
    pub async fn run<C>(self, documents: Vec<InputDocument>, mut on_outcome: C) -> RunReport
    where
        C: FnMut(&DocumentOutcome),
    {
        let start = Instant::now();
        let Self {
            backend,
            mut pool,
            config,
        } = self;

        let mut report = RunReport::default();
        let doc_ids: Vec<DocumentId> = documents.iter().map(|d| d.doc_id.clone()).collect();
        let (event_tx, mut event_rx) = mpsc::channel(config.result_capacity.max(1));
        let producer = match pool.submitter() {
            Ok(submitter) => {
                let dpi = config.render_dpi;
                Some(tokio::task::spawn_blocking(move || {
                    let queued =
                        produce_documents(backend.as_ref(), &documents, dpi, &submitter, &event_tx);
                    tracing::debug!("producer done, {queued} pages");
                }))
            }
            Err(e) => {
                // No producer: the event channel closes at once and every
                // input falls through to NotProcessed below
                drop(event_tx);
                tracing::error!("{e}");
                report.aborted = Some(AggregationError::PoolClosed);
                None
            }
        };

        let mut aggregator = Aggregator::new(config.heading_levels);
        let mut producer_done = false;
        let mut record = |outcome: DocumentOutcome, report: &mut RunReport| {
            on_outcome(&outcome);
            match outcome {
                DocumentOutcome::Completed(done) => report.completed.push(done),
                DocumentOutcome::Failed(failure) => report.failed.push(failure),
            }
        };

        loop {
            if producer_done && aggregator.is_idle() {
                break;
            }
            let results = pool.results();
            let incoming = tokio::time::timeout(config.result_timeout, async {
                tokio::select! {
                    event = event_rx.recv(), if !producer_done => Incoming::Producer(event),
                    result = results.recv() => Incoming::Page(result),
                }
            })
            .await;

            let outcome = match incoming {
                Err(_) => {
                    tracing::error!(
                        "no page result within {:?}, abandoning {} documents",
                        config.result_timeout,
                        aggregator.pending()
                    );
                    report.aborted = Some(AggregationError::Timeout(config.result_timeout));
                    break;
                }
                Ok(Incoming::Producer(None)) => {
                    producer_done = true;
                    None
                }
                Ok(Incoming::Producer(Some(event))) => match event {
                    ProducerEvent::Planned { doc_id, pages } => aggregator.announce(doc_id, pages),
                    ProducerEvent::PageFailed { doc_id, page } => {
                        aggregator.accept(PageResult::empty(doc_id, page))
                    }
                    ProducerEvent::DocumentFailed(failure) => Some(aggregator.fail(failure)),
                },
                Ok(Incoming::Page(Some(result))) => aggregator.accept(result),
                Ok(Incoming::Page(None)) => {
                    tracing::error!("all workers exited with documents pending");
                    report.aborted = Some(AggregationError::WorkersExited);
                    break;
                }
            };
            if let Some(outcome) = outcome {
                record(outcome, &mut report);
            }
        }

        for failure in aggregator.abandon_remaining() {
            tracing::warn!("{failure}");
            record(DocumentOutcome::Failed(failure), &mut report);
        }
        // Documents the producer never reached
        let unreported: Vec<DocumentId> = {
            let reported: HashSet<&str> = report
                .completed
                .iter()
                .map(|d| d.doc_id.as_str())
                .chain(report.failed.iter().map(|f| f.doc_id.as_str()))
                .collect();
            doc_ids
                .into_iter()
                .filter(|id| !reported.contains(id.as_str()))
                .collect()
        };
        for doc_id in unreported {
            let failure = DocumentFailure {
                doc_id,
                reason: FailureReason::NotProcessed,
            };
            tracing::warn!("{failure}");
            record(DocumentOutcome::Failed(failure), &mut report);
        }

        // A stalled producer unblocks once its channels close
        drop(event_rx);
        pool.shutdown().in_current_span().await;
        if let Some(producer) = producer {
            if let Err(e) = producer.await {
                tracing::error!("producer panicked: {e}");
            }
        }

        report.elapsed = start.elapsed();
        tracing::info!(
            "run finished in {}ms: {} completed, {} failed",
            report.elapsed.as_millis(),
            report.completed.len(),
            report.failed.len()
        );
        report
    }
}
