use std::collections::{HashMap, HashSet};

use super::{doc_title::detect_title, text::normalize_text, titles::title_levels_kmeans};
use crate::{
    entities::{Block, CompletedDocument, DocumentId, DocumentRecord, PageResult},
    error::{DocumentFailure, FailureReason},
};

/// Terminal state of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Completed(CompletedDocument),
    Failed(DocumentFailure),
}

#[derive(Debug, Default)]
struct DocumentAccumulator {
    pages_expected: Option<usize>,
    pages_received: usize,
    blocks: Vec<Block>,
}

/// Collects page results per document and finalizes each document once
/// exactly as many results as announced pages arrived.
///
/// Results may arrive before the page count is announced; they are
/// buffered. Results for an already finalized document are dropped.
#[derive(Debug)]
pub struct Aggregator {
    open: HashMap<DocumentId, DocumentAccumulator>,
    finalized: HashSet<DocumentId>,
    heading_levels: usize,
}

impl Aggregator {
    pub fn new(heading_levels: usize) -> Self {
        Self {
            open: HashMap::new(),
            finalized: HashSet::new(),
            heading_levels,
        }
    }

    /// Records the page count of a document.
    pub fn announce(&mut self, doc_id: DocumentId, pages: usize) -> Option<DocumentOutcome> {
        if self.finalized.contains(&doc_id) {
            tracing::warn!("page count announced twice for {doc_id}");
            return None;
        }
        let acc = self.open.entry(doc_id.clone()).or_default();
        acc.pages_expected = Some(pages);
        self.try_finalize(doc_id)
    }

    /// Adds one page result, finalizing its document when complete.
    pub fn accept(&mut self, result: PageResult) -> Option<DocumentOutcome> {
        let PageResult {
            doc_id,
            page,
            blocks,
        } = result;
        if self.finalized.contains(&doc_id) {
            tracing::warn!("dropping late result for page {page} of finalized {doc_id}");
            return None;
        }
        let acc = self.open.entry(doc_id.clone()).or_default();
        acc.pages_received += 1;
        acc.blocks.extend(blocks);
        tracing::debug!(
            "{doc_id}: page {page} received ({}/{})",
            acc.pages_received,
            acc.pages_expected
                .map_or_else(|| "?".to_owned(), |n| n.to_string())
        );
        self.try_finalize(doc_id)
    }

    /// Records a document that produced no pages at all.
    pub fn fail(&mut self, failure: DocumentFailure) -> DocumentOutcome {
        self.open.remove(&failure.doc_id);
        self.finalized.insert(failure.doc_id.clone());
        DocumentOutcome::Failed(failure)
    }

    /// True when no announced or buffered document is waiting for pages.
    pub fn is_idle(&self) -> bool {
        self.open.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.open.len()
    }

    /// Gives up on every open document.
    pub fn abandon_remaining(&mut self) -> Vec<DocumentFailure> {
        let mut failures: Vec<DocumentFailure> = self
            .open
            .drain()
            .map(|(doc_id, acc)| {
                let reason = match acc.pages_expected {
                    Some(expected) => FailureReason::Abandoned {
                        received: acc.pages_received,
                        expected,
                    },
                    None => FailureReason::Unannounced {
                        received: acc.pages_received,
                    },
                };
                DocumentFailure { doc_id, reason }
            })
            .collect();
        failures.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        for failure in &failures {
            self.finalized.insert(failure.doc_id.clone());
        }
        failures
    }

    fn try_finalize(&mut self, doc_id: DocumentId) -> Option<DocumentOutcome> {
        let acc = self.open.get(&doc_id)?;
        let expected = acc.pages_expected?;
        if acc.pages_received < expected {
            return None;
        }
        let acc = self.open.remove(&doc_id)?;
        self.finalized.insert(doc_id.clone());

        if acc.pages_received > expected {
            return Some(DocumentOutcome::Failed(DocumentFailure {
                doc_id,
                reason: FailureReason::PageCountMismatch {
                    received: acc.pages_received,
                    expected,
                },
            }));
        }
        let record = build_record(acc.blocks, self.heading_levels);
        tracing::info!(
            "{doc_id}: finalized with title {:?} and {} outline entries",
            record.title,
            record.outline.len()
        );
        Some(DocumentOutcome::Completed(CompletedDocument { doc_id, record }))
    }
}

/// Orders a document's blocks by (page, top) and derives its record.
///
/// The first outline entry is dropped when it repeats the title.
pub fn build_record(mut blocks: Vec<Block>, heading_levels: usize) -> DocumentRecord {
    blocks.sort_by(|a, b| a.page.cmp(&b.page).then(a.bbox.y0.total_cmp(&b.bbox.y0)));

    let mut outline = title_levels_kmeans(&blocks, heading_levels);
    let title = detect_title(&blocks);

    let same_as_title = outline.first().is_some_and(|first| {
        !title.is_empty()
            && normalize_text(&first.text).to_lowercase() == normalize_text(&title).to_lowercase()
    });
    if same_as_title {
        outline.remove(0);
    }
    DocumentRecord { title, outline }
}
