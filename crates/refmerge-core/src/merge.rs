//! Reconciling candidates into canonical citations.
//!
//! Candidates are taken in source-priority order, so the highest-trust
//! record for a work forms the canonical entry and lower-priority duplicates
//! can only fill gaps. The pass repeats until the output stops shrinking:
//! filled-in fields can make two entries recognizable as the same work only
//! after a first combination.

use std::cmp::Ordering;

use tracing::trace;

use refmerge_parsing::normalize::normalize_title_key;

use crate::similarity::{same_work, similarity};
use crate::{CandidateCitation, CanonicalCitation, MergePolicy, Source};

/// Merge candidates into canonical citations. Fixed point on its own
/// output: feeding the result back in changes nothing.
pub fn merge_candidates(
    candidates: Vec<CandidateCitation>,
    policy: &MergePolicy,
) -> Vec<CanonicalCitation> {
    let mut canonical = merge_pass(candidates, policy);
    loop {
        let before = canonical.len();
        canonical = merge_pass(canonical.into_iter().map(Into::into).collect(), policy);
        if canonical.len() == before {
            return canonical;
        }
    }
}

fn merge_pass(mut candidates: Vec<CandidateCitation>, policy: &MergePolicy) -> Vec<CanonicalCitation> {
    candidates.sort_by(|a, b| {
        b.source
            .priority()
            .cmp(&a.source.priority())
            .then(b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal))
    });

    let mut canonical: Vec<CanonicalCitation> = Vec::new();
    for candidate in candidates {
        let best = canonical
            .iter()
            .enumerate()
            .filter(|(_, c)| same_work(*c, &candidate, policy))
            .max_by(|(_, x), (_, y)| {
                similarity(*x, &candidate)
                    .partial_cmp(&similarity(*y, &candidate))
                    .unwrap_or(Ordering::Equal)
            })
            .map(|(i, _)| i);

        match best {
            Some(i) => {
                trace!(
                    source = candidate.source.as_str(),
                    title = candidate.title.as_deref().unwrap_or(""),
                    "merging candidate into canonical entry"
                );
                merge_into(&mut canonical[i], candidate);
            }
            None => canonical.push(promote(candidate)),
        }
    }
    canonical
}

fn promote(c: CandidateCitation) -> CanonicalCitation {
    CanonicalCitation {
        title: c.title,
        authors: c.authors,
        year: c.year,
        journal: c.journal,
        doi: c.doi,
        source: c.source,
        confidence: c.confidence,
    }
}

/// Fold one candidate into an existing canonical entry.
///
/// Fields only ever fill gaps. Provenance is promoted on strictly higher
/// priority; a field conflict between equal-priority sources marks the
/// entry as [`Source::Merged`].
fn merge_into(canon: &mut CanonicalCitation, candidate: CandidateCitation) {
    let equal_priority = candidate.source.priority() == canon.source.priority();
    let mut conflict = false;

    match (&canon.title, &candidate.title) {
        (None, Some(_)) => canon.title = candidate.title.clone(),
        (Some(a), Some(b)) if equal_priority => {
            conflict |= normalize_title_key(a) != normalize_title_key(b);
        }
        _ => {}
    }
    if canon.authors.is_empty() {
        canon.authors = candidate.authors.clone();
    } else if equal_priority && !candidate.authors.is_empty() {
        conflict |= canon.authors != candidate.authors;
    }
    match (canon.year, candidate.year) {
        (None, Some(y)) => canon.year = Some(y),
        (Some(a), Some(b)) if equal_priority => conflict |= a != b,
        _ => {}
    }
    match (&canon.journal, &candidate.journal) {
        (None, Some(_)) => canon.journal = candidate.journal.clone(),
        (Some(a), Some(b)) if equal_priority => conflict |= a != b,
        _ => {}
    }
    match (&canon.doi, &candidate.doi) {
        (None, Some(_)) => canon.doi = candidate.doi.clone(),
        (Some(a), Some(b)) if equal_priority => {
            conflict |= !a.trim().eq_ignore_ascii_case(b.trim());
        }
        _ => {}
    }

    if candidate.source.priority() > canon.source.priority() {
        canon.source = candidate.source;
    }
    if conflict && canon.source != Source::Merged {
        trace!(title = canon.title.as_deref().unwrap_or(""), "equal-priority conflict, marking merged");
        canon.source = Source::Merged;
    }
    canon.confidence = canon.confidence.max(candidate.confidence);
}
