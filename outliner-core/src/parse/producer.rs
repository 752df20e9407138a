use std::time::Instant;

use tokio::sync::mpsc;
use tracing::instrument;

use super::pool::TaskSubmitter;
use crate::{
    entities::{DocumentId, InputDocument, PageID, Task},
    error::{DocumentFailure, FailureReason},
    pdf::PdfBackend,
};

/// Producer side notifications, ordered per document: `Planned` always
/// precedes `PageFailed` for the same document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerEvent {
    /// Announced before any task of the document is submitted.
    Planned { doc_id: DocumentId, pages: usize },
    /// The page could not be split; it counts as an empty page.
    PageFailed { doc_id: DocumentId, page: PageID },
    DocumentFailed(DocumentFailure),
}

/// The task queue or the event channel closed under the producer.
#[derive(Debug)]
pub(crate) struct ProducerStopped;

fn emit(events: &mpsc::Sender<ProducerEvent>, event: ProducerEvent) -> Result<(), ProducerStopped> {
    events.blocking_send(event).map_err(|_| ProducerStopped)
}

/// Splits one document into page tasks.
///
/// Returns the document's page count. An unreadable document is reported
/// as `DocumentFailed` and counts as zero pages.
#[instrument(skip(backend, submitter, events), fields(doc = %doc.doc_id))]
pub(crate) fn produce_document(
    backend: &dyn PdfBackend,
    doc: &InputDocument,
    dpi: f32,
    submitter: &TaskSubmitter,
    events: &mpsc::Sender<ProducerEvent>,
) -> Result<usize, ProducerStopped> {
    let start = Instant::now();
    let source = match backend.open(&doc.path) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("can't open document: {e:#}");
            emit(
                events,
                ProducerEvent::DocumentFailed(DocumentFailure {
                    doc_id: doc.doc_id.clone(),
                    reason: FailureReason::Unreadable(format!("{e:#}")),
                }),
            )?;
            return Ok(0);
        }
    };

    let pages = source.page_count();
    emit(
        events,
        ProducerEvent::Planned {
            doc_id: doc.doc_id.clone(),
            pages,
        },
    )?;

    for page in 0..pages {
        match source.split_page(page, dpi) {
            Ok(split) => submitter
                .submit(Task {
                    doc_id: doc.doc_id.clone(),
                    page: split.page,
                    raster: split.raster,
                    fragment: split.fragment,
                })
                .map_err(|_| ProducerStopped)?,
            Err(e) => {
                tracing::error!("can't split page {page}: {e:#}");
                emit(
                    events,
                    ProducerEvent::PageFailed {
                        doc_id: doc.doc_id.clone(),
                        page,
                    },
                )?;
            }
        }
    }

    tracing::info!(
        "queued {pages} pages in {}ms",
        start.elapsed().as_millis()
    );
    Ok(pages)
}

/// Feeds every document in input order. Runs on a blocking thread since
/// rendering and submission both block.
///
/// Returns the total page count queued or reported failed.
pub(crate) fn produce_documents(
    backend: &dyn PdfBackend,
    documents: &[InputDocument],
    dpi: f32,
    submitter: &TaskSubmitter,
    events: &mpsc::Sender<ProducerEvent>,
) -> usize {
    let mut total = 0;
    for doc in documents {
        match produce_document(backend, doc, dpi, submitter, events) {
            Ok(pages) => total += pages,
            Err(ProducerStopped) => {
                tracing::warn!("pipeline closed, stopping before {}", doc.doc_id);
                break;
            }
        }
    }
    total
}
