//! Outline extraction for batches of PDF documents.
//!
//! Pages are rendered and split by a producer, a fixed pool of workers runs
//! layout detection and text association (falling back to OCR), and a single
//! aggregator turns each completed document into a [`DocumentRecord`] made of
//! a title and a leveled outline.

pub(crate) mod draw;

pub mod entities;
pub mod error;
pub mod layout;
pub mod ocr;
pub mod parse;
pub mod pdf;
pub mod utils;

pub use entities::{
    CompletedDocument, DocumentRecord, HeadingLevel, InputDocument, OutlineEntry, RunReport,
};
pub use error::{AggregationError, DocumentFailure, FailureReason, PoolError, WorkerInitError};
pub use parse::{DocumentOutcome, ExtractConfig, OutlineExtractor, WorkerModels};
pub use utils::save_document_record;
