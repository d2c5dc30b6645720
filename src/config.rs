use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_PAGES_PER_CHUNK: usize = 100;
const DEFAULT_OVERLAP_PAGES: usize = 10;
const DEFAULT_PRIMARY_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SECONDARY_TIMEOUT_SECS: u64 = 20;
const DEFAULT_OCR_TIMEOUT_SECS: u64 = 90;
const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 3;
const DEFAULT_PRIMARY_MAX_CONTENT_KB: usize = 2048;
const DEFAULT_REPORT_FILENAME_PATTERN: &str = "report|brief";
const DEFAULT_SMALL_FILE_THRESHOLD_KB: u64 = 256;
const DEFAULT_LARGE_FILE_THRESHOLD_MB: u64 = 50;
const DEFAULT_EARLY_PAGE_THRESHOLD: usize = 3;
const DEFAULT_OCR_LANGUAGE: &str = "eng";
const DEFAULT_OCR_DPI: u32 = 300;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// The report filename pattern is not a valid regular expression.
    #[error("Invalid report filename pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern as supplied by the operator.
        pattern: String,
        /// Underlying regex compilation failure.
        #[source]
        source: regex::Error,
    },
    /// Values parsed correctly but describe an impossible pipeline.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Chunking or deadline parameters that would make the pipeline misbehave.
///
/// These are fatal at startup and are never silently corrected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A chunk must hold at least one page.
    #[error("maxPagesPerChunk must be greater than zero")]
    ZeroChunkSize,
    /// The planner would advance by zero or negative pages and never terminate.
    #[error("overlapPages ({overlap}) must be smaller than maxPagesPerChunk ({max_pages})")]
    OverlapTooLarge {
        /// Requested overlap between consecutive chunks.
        overlap: usize,
        /// Requested nominal chunk size.
        max_pages: usize,
    },
    /// A strategy deadline of zero would time out every attempt immediately.
    #[error("{0} timeout must be greater than zero")]
    ZeroDeadline(&'static str),
    /// A breaker threshold of zero would disable every strategy before its first attempt.
    #[error("circuitBreakerThreshold must be greater than zero")]
    ZeroBreakerThreshold,
}

/// Runtime configuration for the extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Page-range planning parameters.
    pub chunking: ChunkingConfig,
    /// Hard wall-clock bound per strategy attempt.
    pub deadlines: DeadlineConfig,
    /// Timeout/error count at which a strategy is disabled for the rest of a chunk.
    pub circuit_breaker_threshold: u32,
    /// Pages whose content stream is larger than this skip the in-process Primary tier.
    pub primary_max_content_bytes: usize,
    /// Heuristics consulted before any expensive parse.
    pub classifier: ClassifierConfig,
    /// OCR fallback settings.
    pub ocr: OcrConfig,
    /// Optional override for the log file location.
    pub log_file: Option<PathBuf>,
}

/// Chunk size and overlap, both in pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Nominal number of pages per chunk.
    pub max_pages_per_chunk: usize,
    /// Pages shared between consecutive chunks.
    pub overlap_pages: usize,
}

impl ChunkingConfig {
    /// Reject parameters that would make the planner loop forever.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_pages_per_chunk == 0 {
            return Err(ConfigurationError::ZeroChunkSize);
        }
        if self.overlap_pages >= self.max_pages_per_chunk {
            return Err(ConfigurationError::OverlapTooLarge {
                overlap: self.overlap_pages,
                max_pages: self.max_pages_per_chunk,
            });
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_pages_per_chunk: DEFAULT_MAX_PAGES_PER_CHUNK,
            overlap_pages: DEFAULT_OVERLAP_PAGES,
        }
    }
}

/// Per-strategy deadlines. Primary is the shortest, OCR the longest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineConfig {
    /// Deadline for the fast structural parse.
    pub primary: Duration,
    /// Deadline for the robust structural parse.
    pub secondary: Duration,
    /// Deadline for rasterisation plus recognition.
    pub ocr: Duration,
}

impl DeadlineConfig {
    /// Upper bound on the time a single page can take across every tier.
    pub fn total(&self) -> Duration {
        self.primary + self.secondary + self.ocr
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.primary.is_zero() {
            return Err(ConfigurationError::ZeroDeadline("primary"));
        }
        if self.secondary.is_zero() {
            return Err(ConfigurationError::ZeroDeadline("secondary"));
        }
        if self.ocr.is_zero() {
            return Err(ConfigurationError::ZeroDeadline("ocr"));
        }
        Ok(())
    }
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            primary: Duration::from_secs(DEFAULT_PRIMARY_TIMEOUT_SECS),
            secondary: Duration::from_secs(DEFAULT_SECONDARY_TIMEOUT_SECS),
            ocr: Duration::from_secs(DEFAULT_OCR_TIMEOUT_SECS),
        }
    }
}

/// Tunable signals for the problematic-content classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Filename substrings that mark a document as known-bad (lower-cased).
    pub known_bad_patterns: Vec<String>,
    /// Case-insensitive regex identifying report-like filenames.
    pub report_pattern: String,
    /// Documents smaller than this many bytes are size anomalies when report-like.
    pub small_file_threshold_bytes: u64,
    /// Documents larger than this many bytes are flagged for awareness.
    pub large_file_threshold_bytes: u64,
    /// Pages below this local index of a report-like document skip Primary.
    pub early_page_threshold: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            known_bad_patterns: Vec::new(),
            report_pattern: DEFAULT_REPORT_FILENAME_PATTERN.to_string(),
            small_file_threshold_bytes: DEFAULT_SMALL_FILE_THRESHOLD_KB * 1024,
            large_file_threshold_bytes: DEFAULT_LARGE_FILE_THRESHOLD_MB * 1024 * 1024,
            early_page_threshold: DEFAULT_EARLY_PAGE_THRESHOLD,
        }
    }
}

/// OCR fallback settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrConfig {
    /// When false the OCR tier is never attempted.
    pub enabled: bool,
    /// Tesseract language code.
    pub language: String,
    /// Rasterisation resolution handed to `pdftoppm`.
    pub dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: DEFAULT_OCR_LANGUAGE.to_string(),
            dpi: DEFAULT_OCR_DPI,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            deadlines: DeadlineConfig::default(),
            circuit_breaker_threshold: DEFAULT_CIRCUIT_BREAKER_THRESHOLD,
            primary_max_content_bytes: DEFAULT_PRIMARY_MAX_CONTENT_KB * 1024,
            classifier: ClassifierConfig::default(),
            ocr: OcrConfig::default(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    ///
    /// Every variable is optional; absent or blank values keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            chunking: ChunkingConfig {
                max_pages_per_chunk: parse_env("CHUNK_MAX_PAGES")?
                    .unwrap_or(defaults.chunking.max_pages_per_chunk),
                overlap_pages: parse_env("CHUNK_OVERLAP_PAGES")?
                    .unwrap_or(defaults.chunking.overlap_pages),
            },
            deadlines: DeadlineConfig {
                primary: parse_env("PRIMARY_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.deadlines.primary),
                secondary: parse_env("SECONDARY_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.deadlines.secondary),
                ocr: parse_env("OCR_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.deadlines.ocr),
            },
            circuit_breaker_threshold: parse_env("CIRCUIT_BREAKER_THRESHOLD")?
                .unwrap_or(defaults.circuit_breaker_threshold),
            primary_max_content_bytes: parse_env::<usize>("PRIMARY_MAX_CONTENT_KB")?
                .map(|kb| kb * 1024)
                .unwrap_or(defaults.primary_max_content_bytes),
            classifier: ClassifierConfig {
                known_bad_patterns: load_env_optional("KNOWN_BAD_FILENAME_PATTERNS")
                    .map(|value| sanitize_patterns(value.split(',')))
                    .unwrap_or_default(),
                report_pattern: load_env_optional("REPORT_FILENAME_PATTERN")
                    .unwrap_or(defaults.classifier.report_pattern),
                small_file_threshold_bytes: parse_env::<u64>("SMALL_FILE_THRESHOLD_KB")?
                    .map(|kb| kb * 1024)
                    .unwrap_or(defaults.classifier.small_file_threshold_bytes),
                large_file_threshold_bytes: parse_env::<u64>("LARGE_FILE_THRESHOLD_MB")?
                    .map(|mb| mb * 1024 * 1024)
                    .unwrap_or(defaults.classifier.large_file_threshold_bytes),
                early_page_threshold: parse_env("EARLY_PAGE_THRESHOLD")?
                    .unwrap_or(defaults.classifier.early_page_threshold),
            },
            ocr: OcrConfig {
                enabled: load_env_optional("OCR_ENABLED")
                    .map(|value| parse_bool("OCR_ENABLED", &value))
                    .transpose()?
                    .unwrap_or(defaults.ocr.enabled),
                language: load_env_optional("OCR_LANGUAGE").unwrap_or(defaults.ocr.language),
                dpi: parse_env("OCR_DPI")?.unwrap_or(defaults.ocr.dpi),
            },
            log_file: load_env_optional("PDF_CHUNKER_LOG_FILE").map(PathBuf::from),
        };
        Ok(config)
    }

    /// Check every cross-field invariant. Call after applying CLI overrides.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.chunking.validate()?;
        self.deadlines.validate()?;
        if self.circuit_breaker_threshold == 0 {
            return Err(ConfigurationError::ZeroBreakerThreshold);
        }
        Ok(())
    }
}

/// Load `.env` (if present), read the environment, apply `overrides`, and validate the result.
pub fn load(overrides: impl FnOnce(&mut Config)) -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let mut config = Config::from_env()?;
    overrides(&mut config);
    config.validate()?;
    tracing::debug!(
        max_pages = config.chunking.max_pages_per_chunk,
        overlap = config.chunking.overlap_pages,
        breaker_threshold = config.circuit_breaker_threshold,
        ocr_enabled = config.ocr.enabled,
        known_bad = config.classifier.known_bad_patterns.len(),
        "Loaded configuration"
    );
    Ok(config)
}

/// Normalize filename patterns: trim, lower-case, dedupe, drop empties.
pub fn sanitize_patterns<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut unique = HashSet::new();
    let mut sanitized = Vec::new();
    for value in values {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if unique.insert(lower.clone()) {
            sanitized.push(lower);
        }
    }
    sanitized
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().expect("defaults validate");
    }

    #[test]
    fn overlap_equal_to_chunk_size_is_rejected() {
        let chunking = ChunkingConfig {
            max_pages_per_chunk: 10,
            overlap_pages: 10,
        };
        assert_eq!(
            chunking.validate(),
            Err(ConfigurationError::OverlapTooLarge {
                overlap: 10,
                max_pages: 10
            })
        );
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let chunking = ChunkingConfig {
            max_pages_per_chunk: 0,
            overlap_pages: 0,
        };
        assert_eq!(chunking.validate(), Err(ConfigurationError::ZeroChunkSize));
    }

    #[test]
    fn zero_deadline_and_threshold_are_rejected() {
        let mut config = Config::default();
        config.deadlines.secondary = Duration::ZERO;
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::ZeroDeadline("secondary"))
        );

        let mut config = Config::default();
        config.circuit_breaker_threshold = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::ZeroBreakerThreshold)
        );
    }

    #[test]
    fn sanitize_patterns_normalizes_and_dedupes() {
        let patterns = sanitize_patterns(["  Draft ", "draft", "", "SCAN_"]);
        assert_eq!(patterns, vec!["draft", "scan_"]);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("X", "Yes").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(matches!(
            parse_bool("X", "maybe"),
            Err(ConfigError::InvalidValue(key)) if key == "X"
        ));
    }

    #[test]
    fn deadline_total_sums_tiers() {
        let deadlines = DeadlineConfig {
            primary: Duration::from_secs(1),
            secondary: Duration::from_secs(2),
            ocr: Duration::from_secs(3),
        };
        assert_eq!(deadlines.total(), Duration::from_secs(6));
    }
}
