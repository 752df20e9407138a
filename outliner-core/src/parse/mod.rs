pub mod aggregate;
pub mod doc_title;
pub mod document;
pub mod kmeans;
pub mod page;
pub mod pool;
pub mod producer;
pub mod text;
pub mod titles;

pub use aggregate::{build_record, Aggregator, DocumentOutcome};
pub use document::{ExtractConfig, OutlineExtractor};
pub use page::{parse_page, WorkerContext, WorkerModels, EMPTY_OCR_CONFIDENCE};
pub use pool::{ContextFactory, PoolConfig, TaskSubmitter, WorkerPool};
pub use producer::ProducerEvent;
