use std::path::{Path, PathBuf};

use super::document::Document;
use super::types::{
    DocumentId, DocumentInfo, LoadError, PageAccessError, PageCharacteristics, PageMetadata,
    PageRangeError, PageRef,
};

/// Random-access view over the pages of every successfully loaded document.
///
/// Global indices are contiguous and follow load order: the first page of each document comes
/// directly after the last page of the previous one. The source is read-only and safe to reuse
/// across chunks.
pub struct PageSource {
    documents: Vec<Document>,
    /// Global index of each document's first page, parallel to `documents`.
    offsets: Vec<usize>,
    total_pages: usize,
}

impl PageSource {
    /// Load every path, keeping the documents that parse and reporting the ones that don't.
    ///
    /// Document ids are assigned by input position, so a failed document leaves a gap in the id
    /// sequence rather than shifting later documents.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> (Self, Vec<LoadError>) {
        let mut documents = Vec::with_capacity(paths.len());
        let mut errors = Vec::new();

        for (position, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            match Document::load(DocumentId(position), path) {
                Ok(document) => {
                    tracing::info!(
                        document = document.name(),
                        pages = document.page_count(),
                        bytes = document.byte_size(),
                        "Loaded document"
                    );
                    documents.push(document);
                }
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %error,
                        "Skipping unreadable document"
                    );
                    errors.push(error);
                }
            }
        }

        (Self::from_documents(documents), errors)
    }

    /// Build a source from documents that are already loaded, in the given order.
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let mut offsets = Vec::with_capacity(documents.len());
        let mut total_pages = 0;
        for document in &documents {
            offsets.push(total_pages);
            total_pages += document.page_count();
        }
        Self {
            documents,
            offsets,
            total_pages,
        }
    }

    /// Number of pages across every loaded document.
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Resolve a global index into its owning document and local index.
    pub fn page_ref(&self, global_index: usize) -> Result<PageRef, PageRangeError> {
        let (document, local_index) = self.locate(global_index)?;
        Ok(PageRef {
            document: document.id(),
            local_index,
            global_index,
        })
    }

    /// Self-contained single-page PDF bytes for a global index.
    pub fn page_bytes(&self, global_index: usize) -> Result<Vec<u8>, PageAccessError> {
        let (document, local_index) = self.locate(global_index)?;
        document
            .isolate_page(local_index)
            .map_err(|error| PageAccessError::Isolation {
                index: global_index,
                reason: error.to_string(),
            })
    }

    /// Static metadata for a global index.
    pub fn page_metadata(&self, global_index: usize) -> Result<PageMetadata, PageRangeError> {
        let (document, local_index) = self.locate(global_index)?;
        Ok(PageMetadata {
            source_name: document.name().to_string(),
            local_index,
            size_hint: document.content_size(local_index),
            document_bytes: document.byte_size(),
        })
    }

    /// Structural facts about a page, or `None` when its dictionary cannot be read.
    pub fn page_characteristics(
        &self,
        global_index: usize,
    ) -> Result<Option<PageCharacteristics>, PageRangeError> {
        let (document, local_index) = self.locate(global_index)?;
        Ok(document.page_characteristics(local_index))
    }

    /// Summaries of the loaded documents in load order.
    pub fn documents(&self) -> Vec<DocumentInfo> {
        self.documents
            .iter()
            .zip(&self.offsets)
            .map(|(document, offset)| DocumentInfo {
                id: document.id(),
                path: PathBuf::from(document.path()),
                name: document.name().to_string(),
                byte_size: document.byte_size(),
                sha256: document.sha256().to_string(),
                page_count: document.page_count(),
                first_global_page: *offset,
            })
            .collect()
    }

    fn locate(&self, global_index: usize) -> Result<(&Document, usize), PageRangeError> {
        if global_index >= self.total_pages {
            return Err(PageRangeError {
                index: global_index,
                total: self.total_pages,
            });
        }
        // `offsets` is sorted and starts at 0, so the owning document is the last one whose
        // first page is not after the requested index.
        let position = self.offsets.partition_point(|offset| *offset <= global_index) - 1;
        let document = &self.documents[position];
        Ok((document, global_index - self.offsets[position]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::document::tests::make_pdf;

    fn source_with(documents: &[(&str, &[&str])]) -> PageSource {
        let loaded = documents
            .iter()
            .enumerate()
            .map(|(position, (name, pages))| {
                Document::from_bytes(DocumentId(position), Path::new(name), &make_pdf(pages))
                    .unwrap()
            })
            .collect();
        PageSource::from_documents(loaded)
    }

    #[test]
    fn flattens_documents_into_contiguous_indices() {
        let source = source_with(&[("a.pdf", &["a0", "a1"]), ("b.pdf", &["b0", "b1", "b2"])]);
        assert_eq!(source.total_pages(), 5);

        let first_of_b = source.page_ref(2).unwrap();
        assert_eq!(first_of_b.document, DocumentId(1));
        assert_eq!(first_of_b.local_index, 0);

        let last = source.page_metadata(4).unwrap();
        assert_eq!(last.source_name, "b.pdf");
        assert_eq!(last.local_index, 2);
    }

    #[test]
    fn out_of_bounds_index_is_a_range_error() {
        let source = source_with(&[("a.pdf", &["only"])]);
        assert_eq!(
            source.page_ref(1),
            Err(PageRangeError { index: 1, total: 1 })
        );
        assert!(matches!(
            source.page_bytes(7),
            Err(PageAccessError::Range(PageRangeError { index: 7, total: 1 }))
        ));
    }

    #[test]
    fn load_reports_bad_documents_and_keeps_good_ones() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pdf");
        let bad = dir.path().join("bad.pdf");
        let missing = dir.path().join("missing.pdf");
        std::fs::write(&good, make_pdf(&["x", "y"])).unwrap();
        std::fs::write(&bad, b"%PDF-garbage").unwrap();

        let (source, errors) = PageSource::load(&[bad.clone(), good.clone(), missing.clone()]);
        assert_eq!(source.total_pages(), 2);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path(), bad.as_path());
        assert!(matches!(errors[1], LoadError::Unreadable { .. }));

        let documents = source.documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, DocumentId(1));
        assert_eq!(documents[0].first_global_page, 0);
    }

    #[test]
    fn page_bytes_isolate_the_requested_page() {
        let source = source_with(&[("a.pdf", &["first"]), ("b.pdf", &["second", "third"])]);
        let bytes = source.page_bytes(2).unwrap();
        let reparsed = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(reparsed.get_pages().len(), 1);
    }
}
