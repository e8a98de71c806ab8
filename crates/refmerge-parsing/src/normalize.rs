//! Field normalization shared by the grammar cascade, the bibliography entry
//! parser, and the similarity side of `refmerge-core`.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const YEAR_MIN: i32 = 1900;
pub const YEAR_MAX: i32 = 2030;

const MAX_AUTHORS: usize = 15;

static ET_AL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[,\s]*\bet\s+al\.?").unwrap());
static CONJUNCTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+(?:and|&|et|und|y)\s+").unwrap());
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());
static PAGE_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\s*[-–—]\s*\d+$").unwrap());
static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"10\.\d{4,9}/[-._;()/:<>A-Za-z0-9]+").unwrap());
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>"\])]+"#).unwrap());
static JOURNAL_TAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[,;\s]*\b(?:vol\.?|volume|no\.?|issue|pp\.?|pages?)\b.*$").unwrap()
});
static JOURNAL_NUM_TAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,;\s]+\d[\d\s(),:\-–—]*$").unwrap());

/// Clean a raw title capture. `None` when the string is not a plausible
/// title: pure digits, URL-like, DOI-like, or a bare page range.
pub fn clean_title(raw: &str) -> Option<String> {
    let stripped = raw
        .trim()
        .trim_matches(|c: char| "\"“”'‘’".contains(c))
        .trim_end_matches(|c: char| ".,;: ".contains(c))
        .trim_start();
    let title = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if title.len() < 4
        || title.chars().all(|c| c.is_ascii_digit())
        || title.starts_with("http://")
        || title.starts_with("https://")
        || title.starts_with("www.")
        || DOI_RE.is_match(&title) && title.starts_with("10.")
        || PAGE_RANGE_RE.is_match(&title)
    {
        return None;
    }
    Some(title)
}

/// Split a raw author run into individual names.
///
/// Conjunctions ("and", "&", "et", "und", "y") become separators, "et al."
/// is dropped, tokens shorter than 3 chars are discarded, and the list is
/// capped at [`MAX_AUTHORS`].
pub fn split_authors(raw: &str) -> Vec<String> {
    let without_et_al = ET_AL_RE.replace_all(raw, "");
    let separated = CONJUNCTION_RE.replace_all(&without_et_al, ", ");

    separated
        .split([',', ';'])
        .map(str::trim)
        .filter(|t| t.len() >= 3 && t.chars().any(|c| c.is_alphabetic()))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .take(MAX_AUTHORS)
        .collect()
}

/// Strip trailing volume/issue/page fragments from a journal capture.
pub fn clean_journal(raw: &str) -> Option<String> {
    let head = JOURNAL_TAIL_RE.replace(raw.trim(), "");
    let head = JOURNAL_NUM_TAIL_RE.replace(&head, "");
    let journal = head
        .trim()
        .trim_end_matches(|c: char| ".,;: ".contains(c))
        .to_string();
    if journal.is_empty() || journal.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(journal)
}

pub fn valid_year(year: i32) -> bool {
    (YEAR_MIN..=YEAR_MAX).contains(&year)
}

/// Find the first plausible publication year in `text`.
pub fn parse_year(text: &str) -> Option<i32> {
    YEAR_RE
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<i32>().ok())
        .find(|&y| valid_year(y))
}

pub fn extract_doi(text: &str) -> Option<String> {
    DOI_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ')']).to_string())
}

pub fn extract_url(text: &str) -> Option<String> {
    URL_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string())
}

/// Canonical comparison key for a title: NFKD-decomposed, lowercased, with
/// everything that is not alphanumeric collapsed to single spaces.
pub fn normalize_title_key(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_space = true;
    for c in title.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Token set of a title for Jaccard comparison. Single-char tokens carry no
/// signal and are dropped.
pub fn title_tokens(title: &str) -> HashSet<String> {
    normalize_title_key(title)
        .split_whitespace()
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

/// Best-effort surname of one author name, lowercased.
///
/// Handles "Smith, J.", "J. Smith", and "Smith J" shapes by preferring the
/// last token that is not a bare initial.
pub fn surname(author: &str) -> Option<String> {
    let author = author.trim();
    if author.is_empty() {
        return None;
    }
    if let Some((head, _)) = author.split_once(',') {
        let head = head.trim();
        if !head.is_empty() {
            return head
                .split_whitespace()
                .last()
                .map(|s| s.trim_matches('.').to_lowercase());
        }
    }
    let tokens: Vec<&str> = author.split_whitespace().collect();
    tokens
        .iter()
        .rev()
        .map(|t| t.trim_matches(|c: char| ".,".contains(c)))
        .find(|t| t.chars().filter(|c| c.is_alphabetic()).count() >= 2)
        .or_else(|| tokens.last().copied())
        .map(|s| s.trim_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
}
