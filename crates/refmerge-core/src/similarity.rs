//! Deciding how alike two citation records are, and whether they describe
//! the same work.

use std::collections::HashSet;

use refmerge_parsing::normalize::{surname, title_tokens};

use crate::{CitationRecord, MergePolicy};

const TITLE_WEIGHT: f64 = 0.6;
const AUTHOR_WEIGHT: f64 = 0.3;
const YEAR_WEIGHT: f64 = 0.1;

/// Jaccard similarity of the two titles' normalized token sets.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    jaccard(&title_tokens(a), &title_tokens(b))
}

/// Jaccard similarity of the two author lists' surname sets.
pub fn author_similarity(a: &[String], b: &[String]) -> f64 {
    let sa: HashSet<String> = a.iter().filter_map(|n| surname(n)).collect();
    let sb: HashSet<String> = b.iter().filter_map(|n| surname(n)).collect();
    jaccard(&sa, &sb)
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Weighted similarity of two records, renormalized over the components
/// both sides actually carry. 0.0 when they share no comparable field.
pub fn similarity<A, B>(a: &A, b: &B) -> f64
where
    A: CitationRecord + ?Sized,
    B: CitationRecord + ?Sized,
{
    let mut weight = 0.0;
    let mut score = 0.0;

    if let (Some(ta), Some(tb)) = (a.title(), b.title()) {
        weight += TITLE_WEIGHT;
        score += TITLE_WEIGHT * token_jaccard(ta, tb);
    }
    if !a.authors().is_empty() && !b.authors().is_empty() {
        weight += AUTHOR_WEIGHT;
        score += AUTHOR_WEIGHT * author_similarity(a.authors(), b.authors());
    }
    if let (Some(ya), Some(yb)) = (a.year(), b.year()) {
        weight += YEAR_WEIGHT;
        if ya == yb {
            score += YEAR_WEIGHT;
        }
    }

    if weight == 0.0 {
        0.0
    } else {
        score / weight
    }
}

/// Whether two records describe the same published work.
pub fn same_work<A, B>(a: &A, b: &B, policy: &MergePolicy) -> bool
where
    A: CitationRecord + ?Sized,
    B: CitationRecord + ?Sized,
{
    if let (Some(da), Some(db)) = (a.doi(), b.doi()) {
        let (da, db) = (da.trim(), db.trim());
        if !da.is_empty() && da.eq_ignore_ascii_case(db) {
            return true;
        }
    }
    if similarity(a, b) >= policy.merge_threshold {
        return true;
    }
    matches!((a.year(), b.year()), (Some(ya), Some(yb)) if ya == yb)
        && author_similarity(a.authors(), b.authors()) > policy.author_threshold
}
