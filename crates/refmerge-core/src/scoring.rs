//! Confidence scoring for text-derived candidates.
//!
//! Structured providers carry a fixed trust score; candidates parsed out of
//! raw text earn their confidence field by field. The score is monotone:
//! adding a field never lowers it.

use crate::CandidateCitation;

const BASE: f64 = 0.3;
const CAP: f64 = 0.9;

/// Structural evidence from the capture itself, not stored on the candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSignals {
    /// The capture carried an explicit `[n]`/sequence-number prefix.
    pub bracket_number: bool,
    /// The capture carried a parenthesized year.
    pub parenthesized_year: bool,
}

/// Score a text-derived candidate in [BASE, CAP].
pub fn score_text_candidate(candidate: &CandidateCitation, signals: TextSignals) -> f64 {
    let mut score = BASE;

    if let Some(title) = candidate.title.as_deref() {
        let chars = title.chars().count();
        if chars > 15 {
            score += 0.2;
        }
        if chars > 30 {
            score += 0.1;
        }
    }
    if !candidate.authors.is_empty() {
        score += 0.15;
        if candidate.authors.len() > 1 {
            score += 0.05;
        }
    }
    if candidate.year.is_some() {
        score += 0.15;
    }
    if candidate.journal.as_deref().is_some_and(|j| j.len() > 5) {
        score += 0.1;
    }
    if candidate.doi.is_some() {
        score += 0.1;
    }
    if signals.bracket_number {
        score += 0.05;
    }
    if signals.parenthesized_year {
        score += 0.05;
    }

    score.min(CAP)
}
