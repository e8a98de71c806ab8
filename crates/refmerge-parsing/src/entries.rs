//! Splitting a located bibliography into individual [`ReferenceEntry`]
//! records.
//!
//! Splitting is anchor-driven: `[n]` markers first, then Vancouver-style
//! `n.` line starts, then blank-line separation when the section carries no
//! numbering at all. Field extraction inside one entry is heuristic and
//! best-effort; entries with a number are kept even when only the number is
//! recoverable, so inline markers can still link to them.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::{
    clean_journal, clean_title, extract_doi, extract_url, parse_year, split_authors,
};
use crate::ReferenceEntry;

static BRACKET_ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\[(\d{1,3})\]").unwrap());
static NUM_DOT_ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(\d{1,3})\.[ \t]+").unwrap());
static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());
static QUOTED_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["“]([^"”]{4,300})["”]"#).unwrap());
static SEGMENT_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\s+").unwrap());
static VENUE_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:journal|proc(?:eedings)?|conference|conf|symposium|workshop|trans(?:actions)?|review|letters|press|arxiv|preprint)\b",
    )
    .unwrap()
});
static VENUE_CUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:19|20)\d{2}\b|\bdoi\b|https?://|\b10\.\d{4,9}/").unwrap());

/// Parse a bibliography section into individual entries.
pub fn parse_reference_entries(section: &str) -> Vec<ReferenceEntry> {
    split_raw_entries(section)
        .into_iter()
        .filter_map(|(number, chunk)| parse_entry(number, &chunk))
        .collect()
}

/// Split the section into `(number, raw text)` chunks.
fn split_raw_entries(section: &str) -> Vec<(Option<u32>, String)> {
    for anchor in [&BRACKET_ANCHOR_RE, &NUM_DOT_ANCHOR_RE] {
        let anchors: Vec<(usize, usize, u32)> = anchor
            .captures_iter(section)
            .filter_map(|c| {
                let m = c.get(0)?;
                let n = c[1].parse().ok()?;
                Some((m.start(), m.end(), n))
            })
            .collect();
        // A single anchor is more likely stray text than a numbered list.
        if anchors.len() < 2 {
            continue;
        }
        return anchors
            .iter()
            .enumerate()
            .map(|(i, &(start, _, n))| {
                let end = anchors.get(i + 1).map_or(section.len(), |&(s, _, _)| s);
                (Some(n), flatten(&section[start..end]))
            })
            .collect();
    }

    BLANK_LINE_RE
        .split(section)
        .map(flatten)
        .filter(|c| !c.is_empty())
        .map(|c| (None, c))
        .collect()
}

fn flatten(chunk: &str) -> String {
    chunk.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_entry(number: Option<u32>, raw: &str) -> Option<ReferenceEntry> {
    let body = strip_marker(raw);

    let doi = extract_doi(body);
    let url = extract_url(body);
    let year = parse_year(body);

    let (title, authors_raw, venue_raw) = if let Some(caps) = QUOTED_TITLE_RE.captures(body) {
        let m = caps.get(0).unwrap();
        let before = &body[..m.start()];
        let after = &body[m.end()..];
        (clean_title(&caps[1]), Some(before), Some(after))
    } else {
        positional_fields(body)
    };

    let authors = authors_raw.map(split_authors).unwrap_or_default();
    let venue = venue_raw.and_then(venue_from);

    let entry = ReferenceEntry {
        number,
        title,
        authors,
        year,
        venue,
        doi,
        url,
        raw_text: raw.to_string(),
    };
    // Keep anything linkable or identifiable; drop pure noise chunks.
    if entry.number.is_some() || entry.title.is_some() || entry.doi.is_some() {
        Some(entry)
    } else {
        None
    }
}

fn strip_marker(raw: &str) -> &str {
    if let Some(m) = BRACKET_ANCHOR_RE.find(raw) {
        if m.start() == 0 {
            return raw[m.end()..].trim_start();
        }
    }
    if let Some(m) = NUM_DOT_ANCHOR_RE.find(raw) {
        if m.start() == 0 {
            return raw[m.end()..].trim_start();
        }
    }
    raw
}

/// Period-separated field extraction for unquoted styles: the first segment
/// is treated as the author run, the first later segment that survives title
/// cleaning becomes the title, and what follows it feeds the venue.
fn positional_fields(body: &str) -> (Option<String>, Option<&str>, Option<&str>) {
    let mut segments: Vec<(usize, &str)> = Vec::new();
    let mut last = 0;
    for m in SEGMENT_SPLIT_RE.find_iter(body) {
        segments.push((last, &body[last..m.start()]));
        last = m.end();
    }
    segments.push((last, &body[last..]));

    let authors = segments
        .first()
        .map(|(_, s)| *s)
        .filter(|s| s.len() < 120 && parse_year(s).is_none());

    let skip = usize::from(authors.is_some());
    let title_idx = segments
        .iter()
        .enumerate()
        .skip(skip)
        .find(|(_, (_, s))| s.len() >= 8 && clean_title(s).is_some())
        .map(|(i, _)| i);

    match title_idx {
        Some(i) => {
            let title = clean_title(segments[i].1);
            let rest_start = segments.get(i + 1).map(|(off, _)| *off);
            (title, authors, rest_start.map(|off| &body[off..]))
        }
        None => (None, authors, None),
    }
}

/// Pick a venue out of the text trailing the title: everything up to where
/// the year/identifier machinery starts, cleaned, and accepted when it bears
/// a venue keyword or at least looks name-sized.
fn venue_from(rest: &str) -> Option<String> {
    let rest = rest.trim_start_matches(|c: char| ",;: ".contains(c)).trim_start();
    let head = VENUE_CUT_RE.find(rest).map_or(rest, |m| &rest[..m.start()]);
    let cleaned = clean_journal(head)?;
    if VENUE_KEYWORD_RE.is_match(&cleaned) || (4..=80).contains(&cleaned.len()) {
        Some(cleaned)
    } else {
        None
    }
}
