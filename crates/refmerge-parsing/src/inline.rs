//! Inline citation markers: finding `[3]`, `[1,2,5]`, `[3-7]`, and `(3)` in
//! body text, classifying how each citation is used, and linking marker
//! numbers back to bibliography entries.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::ReferenceEntry;

/// Chars of surrounding context fed to role classification.
const CONTEXT_CHARS: usize = 150;
/// How far sentence-boundary scanning goes in either direction.
const SENTENCE_SCAN_CHARS: usize = 500;
/// Ranges wider than this are kept as endpoints instead of being expanded.
const MAX_RANGE_SPAN: u32 = 50;

/// How a citation is used in its sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CitationRole {
    Evidence,
    Attribution,
    Comparison,
    Contrast,
    Method,
    Definition,
    Generic,
}

/// One inline citation marker found in body text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineMarker {
    /// Every individually referenced number, ranges expanded.
    pub numbers: Vec<u32>,
    pub raw_text: String,
    /// Byte offset of the marker in the scanned text.
    pub offset: usize,
    /// The sentence enclosing the marker, whitespace-flattened.
    pub sentence: String,
    pub role: CitationRole,
}

/// A marker number resolved (or not) against the bibliography.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationLink {
    pub number: u32,
    pub entry: Option<ReferenceEntry>,
    pub resolved: bool,
}

/// Aggregate view of the markers in one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerStats {
    /// Number of markers found.
    pub total_markers: usize,
    /// Number of individual number mentions across all markers.
    pub total_references: usize,
    pub unique_numbers: usize,
    pub role_counts: BTreeMap<CitationRole, usize>,
    /// Up to five most frequently cited numbers, count-descending.
    pub most_cited: Vec<(u32, usize)>,
}

struct MarkerGrammar {
    name: &'static str,
    pattern: &'static Lazy<Regex>,
}

// Interior padding like "[ 1 ]" shows up in PDF-extracted text; tolerate it.
static BRACKET_SINGLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\s*(\d{1,3})\s*\]").unwrap());
static BRACKET_LIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\s*(\d{1,3}(?:\s*(?:[,;]|[-–—])\s*\d{1,3})+)\s*\]").unwrap()
});
static PAREN_SINGLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*(\d{1,3})\s*\)").unwrap());
static PAREN_LIST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*(\d{1,3}(?:\s*,\s*\d{1,3})+)\s*\)").unwrap());

/// Evaluation order matters: when two grammars match at the same offset the
/// earlier one wins.
static MARKER_GRAMMARS: &[MarkerGrammar] = &[
    MarkerGrammar { name: "bracket-single", pattern: &BRACKET_SINGLE_RE },
    MarkerGrammar { name: "bracket-list", pattern: &BRACKET_LIST_RE },
    MarkerGrammar { name: "paren-single", pattern: &PAREN_SINGLE_RE },
    MarkerGrammar { name: "paren-list", pattern: &PAREN_LIST_RE },
];

/// Keyword tables checked in order; first hit wins, else [`CitationRole::Generic`].
static ROLE_KEYWORDS: &[(CitationRole, &[&str])] = &[
    (
        CitationRole::Evidence,
        &[
            "show", "shows", "showed", "shown", "demonstrate", "demonstrated", "found",
            "observed", "evidence", "reported", "confirmed",
        ],
    ),
    (
        CitationRole::Attribution,
        &[
            "according to", "proposed", "introduced", "developed", "suggested", "argued",
            "noted", "stated", "presented",
        ],
    ),
    (
        CitationRole::Comparison,
        &["similar", "similarly", "consistent with", "in line with", "comparable", "as in"],
    ),
    (
        CitationRole::Contrast,
        &["however", "in contrast", "unlike", "contrary", "whereas", "differs", "disagree"],
    ),
    (
        CitationRole::Method,
        &[
            "using", "method", "approach", "technique", "algorithm", "procedure",
            "following", "adapted from", "based on",
        ],
    ),
    (
        CitationRole::Definition,
        &["defined", "definition", "termed", "refers to", "known as", "called"],
    ),
];

/// Find all inline citation markers in `text`, sorted by offset, with
/// markers at identical offsets deduplicated (first grammar wins).
pub fn extract_markers(text: &str) -> Vec<InlineMarker> {
    let mut by_offset: BTreeMap<usize, InlineMarker> = BTreeMap::new();

    for grammar in MARKER_GRAMMARS {
        for caps in grammar.pattern.captures_iter(text) {
            let m = caps.get(0).unwrap();
            if by_offset.contains_key(&m.start()) {
                continue;
            }
            let numbers = parse_numbers(&caps[1]);
            if numbers.is_empty() {
                continue;
            }
            let sentence = enclosing_sentence(text, m.start(), m.end());
            let context = context_window(text, m.start(), m.end());
            let role = classify_role(&sentence, &context);
            by_offset.insert(
                m.start(),
                InlineMarker {
                    numbers,
                    raw_text: m.as_str().to_string(),
                    offset: m.start(),
                    sentence,
                    role,
                },
            );
        }
    }

    by_offset.into_values().collect()
}

/// Parse a marker payload like `1, 3-5; 9` into individual numbers.
///
/// Inverted ranges are skipped; ranges wider than [`MAX_RANGE_SPAN`] keep
/// only their endpoints.
fn parse_numbers(payload: &str) -> Vec<u32> {
    let mut numbers = Vec::new();
    for part in payload.split([',', ';']) {
        let part = part.trim();
        if let Some((a, b)) = part.split_once(['-', '–', '—']) {
            let (Ok(start), Ok(end)) = (a.trim().parse::<u32>(), b.trim().parse::<u32>()) else {
                continue;
            };
            if start > end {
                continue;
            }
            if end - start <= MAX_RANGE_SPAN {
                numbers.extend(start..=end);
            } else {
                numbers.push(start);
                numbers.push(end);
            }
        } else if let Ok(n) = part.parse::<u32>() {
            numbers.push(n);
        }
    }
    numbers.dedup();
    numbers
}

/// The sentence enclosing `[start, end)`: from the previous sentence-terminal
/// punctuation followed by whitespace to the next one, scanning at most
/// [`SENTENCE_SCAN_CHARS`] in each direction.
fn enclosing_sentence(text: &str, start: usize, end: usize) -> String {
    let scan_from = snap_back(text, start.saturating_sub(SENTENCE_SCAN_CHARS));
    let before = &text[scan_from..start];
    let mut sent_start = scan_from;
    let mut prev: Option<char> = None;
    for (i, c) in before.char_indices() {
        if c.is_whitespace() && prev.is_some_and(|p| ".!?".contains(p)) {
            sent_start = scan_from + i + c.len_utf8();
        }
        prev = Some(c);
    }

    let scan_to = snap_forward(text, (end + SENTENCE_SCAN_CHARS).min(text.len()));
    let after = &text[end..scan_to];
    let mut sent_end = scan_to;
    let mut chars = after.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if ".!?".contains(c) {
            let next_ws = chars.peek().map_or(true, |&(_, n)| n.is_whitespace());
            if next_ws {
                sent_end = end + i + c.len_utf8();
                break;
            }
        }
    }

    text[sent_start..sent_end]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn context_window(text: &str, start: usize, end: usize) -> String {
    let s = snap_back(text, start.saturating_sub(CONTEXT_CHARS));
    let e = snap_forward(text, (end + CONTEXT_CHARS).min(text.len()));
    text[s..e].to_string()
}

fn classify_role(sentence: &str, context: &str) -> CitationRole {
    let haystack = format!("{} {}", sentence, context).to_lowercase();
    for (role, keywords) in ROLE_KEYWORDS {
        if keywords.iter().any(|k| haystack.contains(k)) {
            return *role;
        }
    }
    CitationRole::Generic
}

/// Resolve every individually referenced number against the bibliography.
///
/// One link per unique number, sorted by number; numbers with no matching
/// entry come back unresolved rather than being dropped.
pub fn link_citations(markers: &[InlineMarker], entries: &[ReferenceEntry]) -> Vec<CitationLink> {
    let by_number: HashMap<u32, &ReferenceEntry> = entries
        .iter()
        .filter_map(|e| e.number.map(|n| (n, e)))
        .collect();

    let numbers: BTreeSet<u32> = markers.iter().flat_map(|m| m.numbers.iter().copied()).collect();
    numbers
        .into_iter()
        .map(|number| {
            let entry = by_number.get(&number).map(|&e| e.clone());
            let resolved = entry.is_some();
            CitationLink { number, entry, resolved }
        })
        .collect()
}

/// Summarize citation usage across a document's markers.
pub fn marker_stats(markers: &[InlineMarker]) -> MarkerStats {
    let mut role_counts: BTreeMap<CitationRole, usize> = BTreeMap::new();
    let mut counts: HashMap<u32, usize> = HashMap::new();
    let mut total_references = 0;

    for marker in markers {
        *role_counts.entry(marker.role).or_default() += 1;
        for &n in &marker.numbers {
            *counts.entry(n).or_default() += 1;
            total_references += 1;
        }
    }

    let unique_numbers = counts.len();
    let mut most_cited: Vec<(u32, usize)> = counts.into_iter().collect();
    most_cited.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    most_cited.truncate(5);

    MarkerStats {
        total_markers: markers.len(),
        total_references,
        unique_numbers,
        role_counts,
        most_cited,
    }
}

fn snap_back(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn snap_forward(text: &str, mut i: usize) -> usize {
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}
