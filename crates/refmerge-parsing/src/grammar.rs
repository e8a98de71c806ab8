//! The citation grammar cascade.
//!
//! Each citation style is one entry in a declarative rule table: a regex plus
//! a mapping from capture groups to fields. Every grammar runs over the whole
//! reference section independently; overlapping matches are expected and are
//! reconciled later by the merge engine, not here.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::valid_year;

/// Raw characters of context kept around each match.
const CONTEXT_CHARS: usize = 100;

/// Maps capture group indices to citation fields.
///
/// `years` lists group indices in declared order; the first captured value
/// in the valid publication range wins.
struct FieldMap {
    number: Option<usize>,
    authors: Option<usize>,
    title: Option<usize>,
    journal: Option<usize>,
    years: &'static [usize],
}

struct CitationGrammar {
    name: &'static str,
    pattern: &'static Lazy<Regex>,
    fields: FieldMap,
}

/// One accepted raw capture from a grammar, prior to field normalization.
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub grammar: &'static str,
    pub number: Option<u32>,
    /// Raw author run, unsplit.
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub title: String,
    pub journal: Option<String>,
    pub doi: Option<String>,
    /// ±100 chars around the match.
    pub context: String,
    pub offset: usize,
    /// The match carried an explicit bracket/sequence number.
    pub bracket_signal: bool,
    /// The match carried a parenthesized year.
    pub year_paren_signal: bool,
}

static BRACKET_QUOTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\[(\d{1,3})\]\s*([^"“”\n]+?)[,.]?\s*(?:\(((?:19|20)\d{2})\)[,.]?\s*)?["“]([^"”\n]{4,300})["”][,.]?\s*([^,\n]*)(?:[^\n]*?((?:19|20)\d{2}))?"#,
    )
    .unwrap()
});

static BRACKET_PERIODS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[(\d{1,3})\]\s*((?:[A-Z][A-Za-z'’\-]{1,30}(?:\s+[A-Z]{1,3}\.?)?)(?:,\s*[A-Z][A-Za-z'’\-]{1,30}(?:\s+[A-Z]{1,3}\.?)?){0,20})\.\s+([^.\n]{8,300})\.\s*([^,.\n]{0,120})(?:[^\n]*?((?:19|20)\d{2}))?",
    )
    .unwrap()
});

static APA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([A-Z][^()\n]{2,80}?)\s*\(((?:19|20)\d{2})[a-z]?\)[.:]?\s*([^.\n]{8,300})[.,]\s*([^,.\n]{0,120})?",
    )
    .unwrap()
});

static VANCOUVER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*(\d{1,3})\.\s+([^.\n]{3,200}?)\.\s+([^.\n]{8,300})\.\s*([^;,.\n]{0,120})(?:[^\n]*?((?:19|20)\d{2}))?",
    )
    .unwrap()
});

static COLON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([A-Z][^:\n]{2,80}):\s*([^:\n]{8,300}?)[.,]\s+([^,\n]{0,120}?),?\s*((?:19|20)\d{2})",
    )
    .unwrap()
});

static ET_AL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"([A-Z][A-Za-z'’\-]{2,30}(?:\s+(?:and\s+)?[A-Z][A-Za-z'’\-]{2,30}){0,3}\s+et\s+al\.?),?\s*\(?((?:19|20)\d{2})\)?[.,:]?\s*([^.\n]{8,300})?",
    )
    .unwrap()
});

static PAREN_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?:19|20)\d{2}[a-z]?\)").unwrap());

/// The cascade, in evaluation order. Adding a citation style is one entry
/// here, not a new code path.
static GRAMMARS: &[CitationGrammar] = &[
    CitationGrammar {
        name: "numbered-bracket-quoted-title",
        pattern: &BRACKET_QUOTED_RE,
        fields: FieldMap {
            number: Some(1),
            authors: Some(2),
            title: Some(4),
            journal: Some(5),
            years: &[3, 6],
        },
    },
    CitationGrammar {
        name: "numbered-bracket-periods",
        pattern: &BRACKET_PERIODS_RE,
        fields: FieldMap {
            number: Some(1),
            authors: Some(2),
            title: Some(3),
            journal: Some(4),
            years: &[5],
        },
    },
    CitationGrammar {
        name: "apa-parenthetical-year",
        pattern: &APA_RE,
        fields: FieldMap {
            number: None,
            authors: Some(1),
            title: Some(3),
            journal: Some(4),
            years: &[2],
        },
    },
    CitationGrammar {
        name: "vancouver-numbered",
        pattern: &VANCOUVER_RE,
        fields: FieldMap {
            number: Some(1),
            authors: Some(2),
            title: Some(3),
            journal: Some(4),
            years: &[5],
        },
    },
    CitationGrammar {
        name: "colon-separated",
        pattern: &COLON_RE,
        fields: FieldMap {
            number: None,
            authors: Some(1),
            title: Some(2),
            journal: Some(3),
            years: &[4],
        },
    },
    CitationGrammar {
        name: "et-al-fallback",
        pattern: &ET_AL_RE,
        fields: FieldMap {
            number: None,
            authors: Some(1),
            title: Some(3),
            journal: None,
            years: &[2],
        },
    },
];

/// Run every grammar over the section and collect accepted captures.
///
/// A capture is accepted only when its trimmed title is at least 8 chars long
/// and it carries a valid year or a nonempty author run.
pub fn run_grammar_cascade(section: &str) -> Vec<RawCapture> {
    let mut captures = Vec::new();

    for grammar in GRAMMARS {
        for caps in grammar.pattern.captures_iter(section) {
            let m = caps.get(0).expect("whole match");

            let group = |idx: Option<usize>| -> Option<String> {
                idx.and_then(|i| caps.get(i))
                    .map(|g| g.as_str().trim().to_string())
                    .filter(|s| !s.is_empty())
            };

            // Char count, not bytes: CJK titles must clear the same bar.
            let title = match group(grammar.fields.title) {
                Some(t) if t.chars().count() >= 8 => t,
                _ => continue,
            };

            let year = grammar
                .fields
                .years
                .iter()
                .filter_map(|&i| caps.get(i))
                .filter_map(|g| g.as_str().trim().parse::<i32>().ok())
                .find(|&y| valid_year(y));

            let authors = group(grammar.fields.authors);
            if year.is_none() && authors.is_none() {
                continue;
            }

            let number = group(grammar.fields.number).and_then(|n| n.parse().ok());
            // DOIs frequently trail the part of the entry the grammar itself
            // consumes, so they are pulled from the wider context window.
            let context = context_window(section, m.start(), m.end());
            let doi = crate::normalize::extract_doi(&context);

            captures.push(RawCapture {
                grammar: grammar.name,
                number,
                authors,
                year,
                title,
                journal: group(grammar.fields.journal),
                doi,
                context,
                offset: m.start(),
                bracket_signal: number.is_some(),
                year_paren_signal: PAREN_YEAR_RE.is_match(m.as_str()),
            });
        }
    }

    captures
}

fn context_window(text: &str, start: usize, end: usize) -> String {
    let s = snap_back(text, start.saturating_sub(CONTEXT_CHARS));
    let e = snap_forward(text, (end + CONTEXT_CHARS).min(text.len()));
    text[s..e].split_whitespace().collect::<Vec<_>>().join(" ")
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ieee_quoted_title() {
        let text = r#"[1] J. Smith, A. Jones, "Deep Learning for Vision," IEEE TPAMI, 2020."#;
        let caps = run_grammar_cascade(text);
        let c = caps
            .iter()
            .find(|c| c.grammar == "numbered-bracket-quoted-title")
            .unwrap();
        assert_eq!(c.number, Some(1));
        assert!(c.title.starts_with("Deep Learning for Vision"));
        assert_eq!(c.year, Some(2020));
        assert!(c.bracket_signal);
        assert_eq!(c.authors.as_deref(), Some("J. Smith, A. Jones"));
    }

    #[test]
    fn ieee_paren_year_before_title() {
        let text = r#"[3] Brown, C. (2019). "A Study of Citation Graph Methods." Nature Methods"#;
        let caps = run_grammar_cascade(text);
        let c = caps
            .iter()
            .find(|c| c.grammar == "numbered-bracket-quoted-title")
            .unwrap();
        assert_eq!(c.year, Some(2019));
        assert!(c.year_paren_signal);
    }

    #[test]
    fn bracket_periods_style() {
        let text = "[2] Brown A, Davis B. Another important paper on methods. Journal of Things, 2022.";
        let caps = run_grammar_cascade(text);
        let c = caps
            .iter()
            .find(|c| c.grammar == "numbered-bracket-periods")
            .unwrap();
        assert_eq!(c.title, "Another important paper on methods");
        assert_eq!(c.year, Some(2022));
        assert_eq!(c.journal.as_deref(), Some("Journal of Things"));
    }

    #[test]
    fn apa_style() {
        let text = "Smith, J., & Jones, A. (2020). Deep learning for vision tasks. Journal of AI, 12(3), 45-67.";
        let caps = run_grammar_cascade(text);
        let c = caps
            .iter()
            .find(|c| c.grammar == "apa-parenthetical-year")
            .unwrap();
        assert_eq!(c.year, Some(2020));
        assert_eq!(c.title, "Deep learning for vision tasks");
        assert!(c.year_paren_signal);
        assert!(!c.bracket_signal);
    }

    #[test]
    fn vancouver_style() {
        let text = "\n1. Brown A, Davis B. Measurement of citation accuracy. J Things. 2022;12:45-67.";
        let caps = run_grammar_cascade(text);
        let c = caps
            .iter()
            .find(|c| c.grammar == "vancouver-numbered")
            .unwrap();
        assert_eq!(c.number, Some(1));
        assert_eq!(c.title, "Measurement of citation accuracy");
        assert_eq!(c.year, Some(2022));
    }

    #[test]
    fn colon_style() {
        let text = "Smith J, Jones A: Deep learning for vision. J Neurosci 2020, 40:123-135.";
        let caps = run_grammar_cascade(text);
        let c = caps.iter().find(|c| c.grammar == "colon-separated").unwrap();
        assert_eq!(c.title, "Deep learning for vision");
        assert_eq!(c.year, Some(2020));
        assert_eq!(c.authors.as_deref(), Some("Smith J, Jones A"));
    }

    #[test]
    fn et_al_fallback_needs_trailing_title() {
        // With a plausible trailing chunk the capture is kept.
        let text = "Nakamura et al. (2018) proposed a streaming reconciliation model";
        let caps = run_grammar_cascade(text);
        let c = caps.iter().find(|c| c.grammar == "et-al-fallback").unwrap();
        assert_eq!(c.year, Some(2018));
        assert!(c.title.contains("streaming reconciliation"));

        // A bare marker with nothing after it fails the title-length gate.
        let bare = run_grammar_cascade("Nakamura et al. (2018)");
        assert!(bare.iter().all(|c| c.grammar != "et-al-fallback"));
    }

    #[test]
    fn short_title_rejected() {
        let text = r#"[4] K. Lee, "Short," IEEE, 2021."#;
        let caps = run_grammar_cascade(text);
        assert!(caps
            .iter()
            .all(|c| c.grammar != "numbered-bracket-quoted-title"));
    }

    #[test]
    fn title_gate_counts_chars_not_bytes() {
        // Five CJK chars span many bytes but are still too short.
        let text = "[8] 山田, \"研究の概要,\" 学会誌, 2020.";
        let caps = run_grammar_cascade(text);
        assert!(caps
            .iter()
            .all(|c| c.grammar != "numbered-bracket-quoted-title"));

        // Eleven chars clear the gate regardless of byte width.
        let text = "[9] 山田, \"深層学習による画像認識,\" 学会誌, 2021.";
        let caps = run_grammar_cascade(text);
        let c = caps
            .iter()
            .find(|c| c.grammar == "numbered-bracket-quoted-title")
            .unwrap();
        assert!(c.title.starts_with("深層学習による画像認識"));
    }

    #[test]
    fn first_valid_year_wins() {
        // 1847 is out of range; the trailing 2020 must be picked up instead.
        let text = r#"[5] M. Chen, "On the Works of an Earlier Century Composer 1847," Musicology Review, 2020."#;
        let caps = run_grammar_cascade(text);
        let c = caps
            .iter()
            .find(|c| c.grammar == "numbered-bracket-quoted-title")
            .unwrap();
        assert_eq!(c.year, Some(2020));
    }

    #[test]
    fn doi_pulled_from_match_text() {
        let text = "[6] R. Patel, \"A Paper With an Identifier Attached\", PLOS ONE, 2021. doi:10.1371/journal.pone.0001";
        let caps = run_grammar_cascade(text);
        let c = caps
            .iter()
            .find(|c| c.grammar == "numbered-bracket-quoted-title")
            .unwrap();
        assert_eq!(c.doi.as_deref(), Some("10.1371/journal.pone.0001"));
    }

    #[test]
    fn context_is_bounded_and_flattened() {
        let text = format!(
            "{}[7] S. Kim, \"Context Windows in Long Documents\", VLDB, 2019.{}",
            "x".repeat(400),
            "y".repeat(400)
        );
        let caps = run_grammar_cascade(&text);
        let c = caps.first().unwrap();
        assert!(c.context.len() <= c.title.len() + 2 * CONTEXT_CHARS + 120);
        assert!(!c.context.contains('\n'));
    }

    #[test]
    fn empty_section_yields_nothing() {
        assert!(run_grammar_cascade("").is_empty());
        assert!(run_grammar_cascade("no citations in this prose at all").is_empty());
    }
}
