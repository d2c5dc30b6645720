//! Cheap, static judgement of documents and pages that are likely to hang a parser.
//!
//! The classifier only ever looks at metadata (file name, file size, page position), so it
//! runs before any page bytes are decoded. Rules are evaluated in order and the first match
//! wins:
//!
//! 1. File name contains a configured known-bad substring → [`ProblematicReason::KnownPattern`].
//! 2. File is below the small-file threshold and has a report-like name →
//!    [`ProblematicReason::SizeAnomaly`].
//! 3. File is above the large-file threshold → [`ProblematicReason::LargeDocument`]
//!    (awareness only; extraction still starts at Primary).
//! 4. Page is below the early-page threshold of a report-like document →
//!    [`ProblematicReason::EarlyPageOfReport`].
//! 5. Otherwise [`ProblematicReason::None`].

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::config::{ClassifierConfig, ConfigError, sanitize_patterns};
use crate::source::PageMetadata;

/// Why a document or page was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblematicReason {
    /// File name matches a configured known-bad signature.
    KnownPattern,
    /// Small, report-like file: structurally irregular documents of this kind hang parsers.
    SizeAnomaly,
    /// Very large file; flagged so operators can see it, not skipped.
    LargeDocument,
    /// Title or contents page of a report-like document.
    EarlyPageOfReport,
    /// Nothing suspicious.
    None,
}

/// Result of classifying a document or a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProblematicityVerdict {
    /// Whether any rule matched.
    pub is_problematic: bool,
    /// The first rule that matched.
    pub reason: ProblematicReason,
}

impl ProblematicityVerdict {
    /// Verdict for inputs no rule matched.
    pub const CLEAN: Self = Self {
        is_problematic: false,
        reason: ProblematicReason::None,
    };

    fn flagged(reason: ProblematicReason) -> Self {
        Self {
            is_problematic: true,
            reason,
        }
    }

    /// Whether extraction should bypass the Primary strategy for this page.
    pub fn skips_primary(&self) -> bool {
        matches!(
            self.reason,
            ProblematicReason::KnownPattern
                | ProblematicReason::SizeAnomaly
                | ProblematicReason::EarlyPageOfReport
        )
    }
}

/// Document-level signals the classifier may consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentSignals<'a> {
    /// File name of the document.
    pub name: &'a str,
    /// Size of the file in bytes.
    pub byte_size: u64,
}

impl<'a> From<&'a PageMetadata> for DocumentSignals<'a> {
    fn from(metadata: &'a PageMetadata) -> Self {
        Self {
            name: &metadata.source_name,
            byte_size: metadata.document_bytes,
        }
    }
}

/// A pluggable judge consulted before expensive parsing.
pub trait ContentClassifier: Send + Sync {
    /// Classify a whole document from its static metadata.
    fn classify_document(&self, document: DocumentSignals<'_>) -> ProblematicityVerdict;

    /// Classify one page, given its owning document and 0-based local index.
    fn classify_page(
        &self,
        document: DocumentSignals<'_>,
        page_index: usize,
    ) -> ProblematicityVerdict;

    /// Convenience wrapper over [`ContentClassifier::classify_page`] for page metadata.
    fn classify(&self, metadata: &PageMetadata) -> ProblematicityVerdict {
        self.classify_page(DocumentSignals::from(metadata), metadata.local_index)
    }
}

/// Filename and size heuristics driven entirely by [`ClassifierConfig`].
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    known_bad_patterns: Vec<String>,
    report_pattern: Regex,
    small_file_threshold_bytes: u64,
    large_file_threshold_bytes: u64,
    early_page_threshold: usize,
}

impl HeuristicClassifier {
    /// Compile the classifier from configuration.
    pub fn new(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        let report_pattern = RegexBuilder::new(&config.report_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: config.report_pattern.clone(),
                source,
            })?;

        Ok(Self {
            known_bad_patterns: sanitize_patterns(&config.known_bad_patterns),
            report_pattern,
            small_file_threshold_bytes: config.small_file_threshold_bytes,
            large_file_threshold_bytes: config.large_file_threshold_bytes,
            early_page_threshold: config.early_page_threshold,
        })
    }

    fn is_report_like(&self, name: &str) -> bool {
        self.report_pattern.is_match(name)
    }
}

impl ContentClassifier for HeuristicClassifier {
    fn classify_document(&self, document: DocumentSignals<'_>) -> ProblematicityVerdict {
        let lowered = document.name.to_lowercase();
        if self
            .known_bad_patterns
            .iter()
            .any(|pattern| lowered.contains(pattern.as_str()))
        {
            return ProblematicityVerdict::flagged(ProblematicReason::KnownPattern);
        }
        if document.byte_size < self.small_file_threshold_bytes
            && self.is_report_like(document.name)
        {
            return ProblematicityVerdict::flagged(ProblematicReason::SizeAnomaly);
        }
        if document.byte_size > self.large_file_threshold_bytes {
            return ProblematicityVerdict::flagged(ProblematicReason::LargeDocument);
        }
        ProblematicityVerdict::CLEAN
    }

    fn classify_page(
        &self,
        document: DocumentSignals<'_>,
        page_index: usize,
    ) -> ProblematicityVerdict {
        let verdict = self.classify_document(document);
        if verdict.is_problematic {
            return verdict;
        }
        if page_index < self.early_page_threshold && self.is_report_like(document.name) {
            return ProblematicityVerdict::flagged(ProblematicReason::EarlyPageOfReport);
        }
        ProblematicityVerdict::CLEAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    fn classifier() -> HeuristicClassifier {
        HeuristicClassifier::new(&ClassifierConfig {
            known_bad_patterns: vec!["Scan_".into(), "legacy".into()],
            report_pattern: "report|brief".into(),
            small_file_threshold_bytes: 100 * KB,
            large_file_threshold_bytes: 50 * MB,
            early_page_threshold: 3,
        })
        .unwrap()
    }

    fn doc(name: &str, byte_size: u64) -> DocumentSignals<'_> {
        DocumentSignals { name, byte_size }
    }

    #[test]
    fn known_pattern_wins_over_every_other_rule() {
        let verdict = classifier().classify_page(doc("SCAN_Annual_Report.pdf", 10 * KB), 0);
        assert_eq!(verdict.reason, ProblematicReason::KnownPattern);
        assert!(verdict.skips_primary());
    }

    #[test]
    fn small_report_is_a_size_anomaly() {
        let verdict = classifier().classify_document(doc("quarterly-report.pdf", 20 * KB));
        assert_eq!(verdict.reason, ProblematicReason::SizeAnomaly);
        assert!(verdict.is_problematic);
    }

    #[test]
    fn small_non_report_is_clean() {
        let verdict = classifier().classify_document(doc("invoice.pdf", 20 * KB));
        assert_eq!(verdict, ProblematicityVerdict::CLEAN);
    }

    #[test]
    fn large_file_is_flagged_without_skipping_primary() {
        let verdict = classifier().classify_page(doc("archive.pdf", 80 * MB), 0);
        assert_eq!(verdict.reason, ProblematicReason::LargeDocument);
        assert!(verdict.is_problematic);
        assert!(!verdict.skips_primary());
    }

    #[test]
    fn early_pages_of_reports_are_flagged() {
        let classifier = classifier();
        let report = doc("Appellate Brief.pdf", 2 * MB);

        let early = classifier.classify_page(report, 2);
        assert_eq!(early.reason, ProblematicReason::EarlyPageOfReport);
        assert!(early.skips_primary());

        let later = classifier.classify_page(report, 3);
        assert_eq!(later, ProblematicityVerdict::CLEAN);
    }

    #[test]
    fn classify_uses_page_metadata() {
        let metadata = PageMetadata {
            source_name: "report.pdf".into(),
            local_index: 0,
            size_hint: 10,
            document_bytes: 5 * MB,
        };
        assert_eq!(
            classifier().classify(&metadata).reason,
            ProblematicReason::EarlyPageOfReport
        );
    }

    #[test]
    fn invalid_report_pattern_is_a_config_error() {
        let config = ClassifierConfig {
            report_pattern: "(unclosed".into(),
            ..ClassifierConfig::default()
        };
        assert!(matches!(
            HeuristicClassifier::new(&config),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
