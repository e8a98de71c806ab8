//! Text-side citation parsing: bibliography location, the citation grammar
//! cascade, field normalization, and inline citation marker linking.
//!
//! Everything in this crate is synchronous and allocation-only; network
//! lookups and reconciliation live in `refmerge-core`.

use serde::Serialize;
use thiserror::Error;

pub mod entries;
pub mod grammar;
pub mod inline;
pub mod normalize;
pub mod section;

pub use entries::parse_reference_entries;
pub use grammar::{run_grammar_cascade, RawCapture};
pub use inline::{
    extract_markers, link_citations, marker_stats, CitationLink, CitationRole, InlineMarker,
    MarkerStats,
};
pub use section::{locate_reference_section, LocatedSection, SectionOrigin};

/// A single parsed bibliography line.
///
/// `number` is the sequence number when the bibliography is numbered
/// (`[12]` or `12.`); unnumbered styles leave it `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceEntry {
    pub number: Option<u32>,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub raw_text: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no reference section found in document text")]
    NoReferenceSection,
    #[error("document text is empty")]
    EmptyDocument,
}

/// Parse the bibliography entries of a full document, failing when no
/// reference section can be located even via the citation-dense fallback.
pub fn reference_entries_from_document(text: &str) -> Result<Vec<ReferenceEntry>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyDocument);
    }
    let section = locate_reference_section(text).ok_or(ParseError::NoReferenceSection)?;
    Ok(parse_reference_entries(&section.text))
}
