//! Random-access view over one or more source PDFs.
//!
//! Documents are loaded once per run and flattened into a single 0-based page index space in
//! load order. Unreadable inputs are reported and skipped; every readable document still
//! contributes its pages.

mod discovery;
pub(crate) mod document;
mod page_source;
pub mod types;

pub use discovery::{DiscoveryError, discover_documents};
pub use document::Document;
pub use page_source::PageSource;
pub use types::{
    DocumentId, DocumentInfo, LoadError, PageAccessError, PageCharacteristics, PageMetadata,
    PageRangeError, PageRef,
};
