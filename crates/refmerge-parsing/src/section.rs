//! Locating the bibliography inside raw document text.
//!
//! The locator scans an ordered set of heading patterns covering plain,
//! numbered, centered, letter-spaced, and multi-language headings. A heading
//! in the later 75% of the document is preferred over earlier matches so that
//! a table-of-contents line does not win over the real section. When no
//! heading yields a citation-bearing section, a sliding-window scan picks the
//! densest stretch of citation tokens instead.

use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum number of characters an end marker must leave in the section
/// before it is honored.
const MIN_SECTION_CHARS: usize = 500;

/// Sections longer than this with almost no citation tokens trigger the
/// dense-window fallback.
const LONG_SECTION_CHARS: usize = 2000;

/// Citation tokens per word below which a long section is considered bogus.
const MIN_DENSITY: f64 = 0.02;

const WINDOW_CHARS: usize = 4000;
const WINDOW_STEP: usize = 2000;

/// How a section was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionOrigin {
    /// An explicit bibliography heading was matched.
    Heading,
    /// No usable heading; the densest sliding window of the full text.
    DenseWindow,
}

/// The isolated bibliography text and where it came from.
#[derive(Debug, Clone)]
pub struct LocatedSection {
    pub text: String,
    /// Byte offset of the section start within the original document.
    pub start: usize,
    pub origin: SectionOrigin,
}

static HEADING_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Plain or numbered heading; a trailing dot leader + page number is
        // tolerated so table-of-contents lines still register as matches and
        // are rejected by position, not silently missed.
        r"(?mi)^[ \t]*(?:\d{1,2}\.?|[IVX]{1,4}\.)?[ \t]*(?:References|Bibliography|Works\s+Cited|Literature\s+Cited)[ \t]*:?[ \t.]*\d{0,4}[ \t]*$",
        // Centered/boxed headings framed by rule characters.
        r"(?mi)^[ \t]*[-=*_]{2,}[ \t]*References[ \t]*[-=*_]{2,}[ \t]*$",
        // Letter-spaced all-caps heading ("R E F E R E N C E S").
        r"(?mi)^[ \t]*R[ \t]+E[ \t]+F[ \t]+E[ \t]+R[ \t]+E[ \t]+N[ \t]+C[ \t]+E[ \t]+S[ \t]*$",
        // CJK headings.
        r"(?m)^[ \t]*(?:参考文献|引用文献|文献)[ \t]*$",
        // Other language headings.
        r"(?mi)^[ \t]*(?:Références|Bibliographie|Literatur|Bibliografía|Referencias)[ \t]*:?[ \t]*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("heading pattern"))
    .collect()
});

static SECTION_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?mi)^[ \t]*(?:Appendix|Appendices|Acknowledgments|Acknowledgements|Supplementary(?:\s+Material)?|Author\s+Contributions|Biograph(?:y|ies)|About\s+the\s+Authors?|Annex\b)",
    )
    .expect("section end pattern")
});

static BRACKET_NUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d{1,3}\]").unwrap());
static PAREN_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?:19|20)\d{2}[a-z]?\)").unwrap());

/// Locate the bibliography in `text`.
///
/// Returns `None` when the text is empty or contains no citation tokens at
/// all — the caller treats that as "no candidates", never as an error.
pub fn locate_reference_section(text: &str) -> Option<LocatedSection> {
    if text.trim().is_empty() {
        return None;
    }

    if let Some(heading_end) = pick_heading(text) {
        let rest = &text[heading_end..];
        let end = section_end(rest);
        let body = &rest[..end];
        // Track how much the front trim removes so `start` stays the exact
        // offset of `text` within the original document.
        let lead = body.len() - body.trim_start_matches('\n').len();
        let section = body[lead..].trim_end_matches('\n');
        if !section.trim().is_empty() {
            let long_but_sparse =
                section.len() > LONG_SECTION_CHARS && citation_density(section) < MIN_DENSITY;
            if !long_but_sparse {
                return Some(LocatedSection {
                    text: section.to_string(),
                    start: heading_end + lead,
                    origin: SectionOrigin::Heading,
                });
            }
        }
    }

    densest_window(text)
}

/// Pick the heading match to use: the first one in the later 75% of the
/// document, else the last match found anywhere.
fn pick_heading(text: &str) -> Option<usize> {
    let mut matches: Vec<(usize, usize)> = Vec::new();
    for re in HEADING_RES.iter() {
        for m in re.find_iter(text) {
            matches.push((m.start(), m.end()));
        }
    }
    if matches.is_empty() {
        return None;
    }
    matches.sort_unstable();
    matches.dedup_by_key(|(s, _)| *s);

    let cutoff = text.len() / 4;
    matches
        .iter()
        .find(|(s, _)| *s >= cutoff)
        .or_else(|| matches.last())
        .map(|(_, e)| *e)
}

/// Where the section ends inside `rest`: the first appendix-like heading that
/// leaves at least [`MIN_SECTION_CHARS`] behind, else the end of the text.
fn section_end(rest: &str) -> usize {
    SECTION_END_RE
        .find_iter(rest)
        .map(|m| m.start())
        .find(|&s| s >= MIN_SECTION_CHARS)
        .unwrap_or(rest.len())
}

/// Citation tokens (bracket numbers and parenthetical years) per word.
fn citation_density(text: &str) -> f64 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }
    let tokens = BRACKET_NUM_RE.find_iter(text).count() + PAREN_YEAR_RE.find_iter(text).count();
    tokens as f64 / words as f64
}

/// Scan fixed-size sliding windows of the full text and return the densest
/// one. `None` when no window contains a single citation token.
fn densest_window(text: &str) -> Option<LocatedSection> {
    let mut best: Option<(f64, usize, usize)> = None;
    let mut start = 0;
    while start < text.len() {
        let s = snap_boundary(text, start);
        let e = snap_boundary(text, s.saturating_add(WINDOW_CHARS));
        if s >= e {
            break;
        }
        let window = &text[s..e];
        let density = citation_density(window);
        if density > 0.0 && best.map_or(true, |(d, _, _)| density > d) {
            best = Some((density, s, e));
        }
        if e == text.len() {
            break;
        }
        start += WINDOW_STEP;
    }

    best.map(|(_, s, e)| LocatedSection {
        text: text[s..e].to_string(),
        start: s,
        origin: SectionOrigin::DenseWindow,
    })
}

/// Move `i` forward to the next UTF-8 character boundary.
fn snap_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_heading() {
        let text = "Some body text.\n\nReferences\n\n[1] First ref here.\n[2] Second ref here.\n";
        let section = locate_reference_section(text).unwrap();
        assert_eq!(section.origin, SectionOrigin::Heading);
        assert!(section.text.contains("[1] First ref here."));
    }

    #[test]
    fn numbered_heading() {
        let text = "Body.\n\n6. References\n\n[1] A ref.\n[2] Another ref.\n";
        let section = locate_reference_section(text).unwrap();
        assert!(section.text.contains("[1] A ref."));
    }

    #[test]
    fn letter_spaced_heading() {
        let text = "Body text here.\n\nR E F E R E N C E S\n\n[1] A ref line.\n[2] B ref line.\n";
        let section = locate_reference_section(text).unwrap();
        assert_eq!(section.origin, SectionOrigin::Heading);
        assert!(section.text.contains("[1] A ref line."));
    }

    #[test]
    fn cjk_heading() {
        let text = "本文です。\n\n参考文献\n\n[1] 著者, タイトル, 2020.\n[2] 著者, 別のタイトル, 2021.\n";
        let section = locate_reference_section(text).unwrap();
        assert_eq!(section.origin, SectionOrigin::Heading);
        assert!(section.text.contains("[1]"));
    }

    #[test]
    fn french_heading() {
        let text = "Corps du texte.\n\nRéférences\n\n[1] Premier.\n[2] Deuxième.\n";
        let section = locate_reference_section(text).unwrap();
        assert!(section.text.contains("[1] Premier."));
    }

    #[test]
    fn toc_entry_loses_to_real_heading() {
        // A "References .......... 12" line near the start must not win over
        // the real heading deep in the document.
        let mut text = String::from("Contents\nReferences .......... 12\n");
        text.push_str(&"body text line filling space\n".repeat(80));
        text.push_str("References\n\n[1] Real ref one here.\n[2] Real ref two here.\n");
        let section = locate_reference_section(&text).unwrap();
        assert_eq!(section.origin, SectionOrigin::Heading);
        assert!(section.text.contains("[1] Real ref one here."));
        // Section must start after the real heading, i.e. past 50% depth.
        assert!(section.start > text.len() / 2);
    }

    #[test]
    fn early_heading_used_when_no_late_match() {
        let text = "References\n\n[1] Only ref here early.\n[2] Second early ref.\n";
        // The only match is in the first 25%; the last match anywhere is used.
        let section = locate_reference_section(text).unwrap();
        assert!(section.text.contains("[1] Only ref here early."));
    }

    #[test]
    fn section_ends_at_appendix_when_enough_remains() {
        let refs = "[1] A reference entry with some padding text behind it.\n".repeat(12);
        let text = format!("Body.\n\nReferences\n\n{refs}\nAppendix A\n\nExtra material here.");
        let section = locate_reference_section(&text).unwrap();
        assert!(section.text.contains("[1] A reference entry"));
        assert!(!section.text.contains("Extra material"));
    }

    #[test]
    fn appendix_ignored_when_section_would_be_tiny() {
        // End marker within the first 500 chars is skipped; the section runs
        // to the end of the document instead.
        let text = "Body.\n\nReferences\n\n[1] Short.\nAppendix A\n[2] Still part of refs.\n";
        let section = locate_reference_section(text).unwrap();
        assert!(section.text.contains("[2] Still part of refs."));
    }

    #[test]
    fn dense_window_fallback_without_heading() {
        let mut text = "prose without any citations at all\n".repeat(60);
        text.push_str(&"Smith et al. (2020) showed things [1], [2], [3] and more [4].\n".repeat(30));
        let section = locate_reference_section(&text).unwrap();
        assert_eq!(section.origin, SectionOrigin::DenseWindow);
        assert!(section.text.contains("[1]"));
    }

    #[test]
    fn no_citations_anywhere_returns_none() {
        let text = "just ordinary prose with no citation tokens\n".repeat(40);
        assert!(locate_reference_section(&text).is_none());
    }

    #[test]
    fn empty_text_returns_none() {
        assert!(locate_reference_section("").is_none());
        assert!(locate_reference_section("   \n\t").is_none());
    }

    #[test]
    fn start_points_at_the_section_text_exactly() {
        // The leading-newline trim must be reflected in `start`, or every
        // capture offset inside the section is shifted.
        let text = "Body prose.\n\nReferences\n\n研究背景の説明\n[1] First ref here.\n[2] Second ref here.\n";
        let section = locate_reference_section(text).unwrap();
        assert!(text[section.start..].starts_with(&section.text));
        assert!(section.text.starts_with("研究背景"));
    }

    #[test]
    fn density_counts_tokens_per_word() {
        assert_eq!(citation_density(""), 0.0);
        let d = citation_density("as shown in [1] and (2020) results");
        assert!(d > 0.2, "density {d}");
    }
}
