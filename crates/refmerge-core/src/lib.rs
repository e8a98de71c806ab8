//! Citation aggregation and reconciliation.
//!
//! Candidates arrive from structured lookup providers, a black-box model
//! extractor, and the text parser in `refmerge-parsing`; this crate scores
//! them, decides which candidates describe the same work, and merges them
//! into one canonical record per work.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub mod adapter;
pub mod merge;
pub mod pipeline;
pub mod scoring;
pub mod similarity;

pub use adapter::{
    model_candidates, MockProvider, ModelExtractor, ProviderClient, RawLookup, RawRecord,
    SourceAdapter,
};
pub use merge::merge_candidates;
pub use pipeline::{extract_citations, link_inline_citations, InlineReport};
pub use refmerge_parsing::{CitationLink, CitationRole, InlineMarker, MarkerStats, ReferenceEntry};
pub use scoring::{score_text_candidate, TextSignals};
pub use similarity::{author_similarity, same_work, similarity, token_jaccard};

/// Where a citation record came from.
///
/// The set is closed on purpose: priority and trust are total functions over
/// it, and adding a provider means extending these matches, not registering
/// anything at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Source {
    Crossref,
    OpenAlex,
    SemanticScholar,
    ModelExtractor,
    Text,
    Merged,
}

impl Source {
    /// Total precedence order used by the merge engine. `Merged` outranks
    /// everything so a reconciled record keeps its provenance.
    pub fn priority(self) -> u8 {
        match self {
            Source::Merged => 60,
            Source::Crossref => 50,
            Source::OpenAlex => 40,
            Source::SemanticScholar => 30,
            Source::ModelExtractor => 20,
            Source::Text => 10,
        }
    }

    /// Fixed confidence assigned to records from a structured provider.
    /// Text candidates are scored per-field instead and `Merged` never
    /// originates records, so neither carries a trust score.
    pub fn trust(self) -> Option<f64> {
        match self {
            Source::Crossref => Some(0.95),
            Source::OpenAlex => Some(0.90),
            Source::SemanticScholar => Some(0.80),
            Source::ModelExtractor => Some(0.70),
            Source::Text | Source::Merged => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Crossref => "crossref",
            Source::OpenAlex => "openalex",
            Source::SemanticScholar => "semantic_scholar",
            Source::ModelExtractor => "model_extractor",
            Source::Text => "text",
            Source::Merged => "merged",
        }
    }
}

/// One citation candidate inside a single extraction run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateCitation {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub source: Source,
    pub confidence: f64,
    /// Raw text around the capture, bounded by `ExtractConfig::max_raw_context`.
    pub raw_context: Option<String>,
    pub page_number: Option<u32>,
}

/// A reconciled citation: the output unit of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalCitation {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub source: Source,
    pub confidence: f64,
}

impl From<CanonicalCitation> for CandidateCitation {
    fn from(c: CanonicalCitation) -> Self {
        CandidateCitation {
            title: c.title,
            authors: c.authors,
            year: c.year,
            journal: c.journal,
            doi: c.doi,
            source: c.source,
            confidence: c.confidence,
            raw_context: None,
            page_number: None,
        }
    }
}

/// Field access shared by candidate and canonical records so the similarity
/// engine can compare any mix of the two.
pub trait CitationRecord {
    fn title(&self) -> Option<&str>;
    fn authors(&self) -> &[String];
    fn year(&self) -> Option<i32>;
    fn doi(&self) -> Option<&str>;
}

impl CitationRecord for CandidateCitation {
    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
    fn authors(&self) -> &[String] {
        &self.authors
    }
    fn year(&self) -> Option<i32> {
        self.year
    }
    fn doi(&self) -> Option<&str> {
        self.doi.as_deref()
    }
}

impl CitationRecord for CanonicalCitation {
    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
    fn authors(&self) -> &[String] {
        &self.authors
    }
    fn year(&self) -> Option<i32> {
        self.year
    }
    fn doi(&self) -> Option<&str> {
        self.doi.as_deref()
    }
}

/// The document an extraction run is about: its full text plus whatever
/// identity is already known for the provider match gate.
#[derive(Debug, Clone, Default)]
pub struct DocumentRef {
    pub title: Option<String>,
    pub doi: Option<String>,
    pub text: String,
}

/// Thresholds governing when two records count as the same work.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MergePolicy {
    /// Overall similarity at or above which records merge.
    pub merge_threshold: f64,
    /// Author similarity above which equal-year records merge.
    pub author_threshold: f64,
    /// Title token-Jaccard a provider response must reach against the
    /// requested document before its records are accepted.
    pub gate_threshold: f64,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy {
            merge_threshold: 0.8,
            author_threshold: 0.7,
            gate_threshold: 0.7,
        }
    }
}

impl MergePolicy {
    pub fn validate(&self) -> Result<(), ExtractError> {
        for (name, value) in [
            ("merge_threshold", self.merge_threshold),
            ("author_threshold", self.author_threshold),
            ("gate_threshold", self.gate_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ExtractError::ContractViolation(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Knobs for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub provider_timeout: Duration,
    pub max_concurrent_lookups: usize,
    /// Upper bound on stored `raw_context`, in characters.
    pub max_raw_context: usize,
    pub policy: MergePolicy,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            provider_timeout: Duration::from_secs(10),
            max_concurrent_lookups: 4,
            max_raw_context: 200,
            policy: MergePolicy::default(),
        }
    }
}

impl ExtractConfig {
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.max_concurrent_lookups == 0 {
            return Err(ExtractError::ContractViolation(
                "max_concurrent_lookups must be at least 1".into(),
            ));
        }
        self.policy.validate()
    }
}

/// Fatal errors: only malformed configuration, never provider trouble.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

/// Why one adapter produced nothing. Recorded and logged per run, never
/// propagated as an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterFailure {
    #[error("provider timed out")]
    Timeout,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}
