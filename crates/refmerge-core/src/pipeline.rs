//! The extraction pipeline: provider fan-out, text parsing, scoring, and
//! merging, plus the independent inline-citation entry point.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use refmerge_parsing::normalize::{clean_journal, clean_title, split_authors};
use refmerge_parsing::{
    extract_markers, link_citations, locate_reference_section, marker_stats,
    parse_reference_entries, run_grammar_cascade, CitationLink, InlineMarker, MarkerStats,
    ReferenceEntry, SectionOrigin,
};

use crate::adapter::{model_candidates, ModelExtractor, ProviderClient, SourceAdapter};
use crate::merge::merge_candidates;
use crate::scoring::{score_text_candidate, TextSignals};
use crate::{
    AdapterFailure, CandidateCitation, CanonicalCitation, DocumentRef, ExtractConfig, ExtractError,
    Source,
};

/// Run one full extraction: fan out provider lookups, parse the document
/// text while they run, then score and merge everything into canonical
/// citations.
///
/// Never fails on provider trouble; the only error is a malformed
/// [`ExtractConfig`]. Cancelling `cancel` abandons pending lookups and
/// returns whatever was already collected.
pub async fn extract_citations(
    doc: &DocumentRef,
    providers: &[Arc<dyn ProviderClient>],
    extractor: Option<Arc<dyn ModelExtractor>>,
    config: &ExtractConfig,
    cancel: CancellationToken,
) -> Result<Vec<CanonicalCitation>, ExtractError> {
    config.validate()?;

    let doc = Arc::new(doc.clone());
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_lookups));
    let mut join_set: JoinSet<(Source, Vec<CandidateCitation>, Option<AdapterFailure>)> =
        JoinSet::new();

    for client in providers {
        let adapter = SourceAdapter::new(Arc::clone(client), config);
        let doc = Arc::clone(&doc);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        join_set.spawn(async move {
            let source = adapter.source();
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return (source, Vec::new(), None),
            };
            tokio::select! {
                _ = cancel.cancelled() => (source, Vec::new(), None),
                out = adapter.fetch(&doc) => (source, out.0, out.1),
            }
        });
    }

    if let Some(extractor) = extractor {
        let doc = Arc::clone(&doc);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let timeout = config.provider_timeout;
        join_set.spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return (Source::ModelExtractor, Vec::new(), None),
            };
            tokio::select! {
                _ = cancel.cancelled() => (Source::ModelExtractor, Vec::new(), None),
                out = model_candidates(extractor.as_ref(), &doc.text, timeout) => {
                    (Source::ModelExtractor, out.0, out.1)
                }
            }
        });
    }

    // The text side is cheap CPU work; it runs while the lookups are in
    // flight.
    let mut candidates = text_candidates(&doc.text, config);

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((source, mut found, failure)) => {
                if let Some(failure) = failure {
                    warn!(source = source.as_str(), error = %failure, "adapter produced nothing");
                }
                debug!(source = source.as_str(), count = found.len(), "adapter finished");
                candidates.append(&mut found);
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => warn!(error = %err, "adapter task panicked"),
        }
    }

    let total = candidates.len();
    let canonical = merge_candidates(candidates, &config.policy);
    info!(
        candidates = total,
        canonical = canonical.len(),
        "extraction complete"
    );
    Ok(canonical)
}

/// Parse, normalize, and score citation candidates out of document text.
pub fn text_candidates(text: &str, config: &ExtractConfig) -> Vec<CandidateCitation> {
    let Some(section) = locate_reference_section(text) else {
        debug!("no reference section located");
        return Vec::new();
    };
    let captures = run_grammar_cascade(&section.text);
    debug!(
        origin = ?section.origin,
        captures = captures.len(),
        "grammar cascade finished"
    );

    // Form feeds mark page breaks when the text came from a paginated source.
    let paginated = text.contains('\x0c');

    let mut out = Vec::new();
    for capture in captures {
        let Some(title) = clean_title(&capture.title) else {
            continue;
        };
        let signals = TextSignals {
            bracket_number: capture.bracket_signal,
            parenthesized_year: capture.year_paren_signal,
        };
        let page_number = paginated.then(|| {
            let abs = section.start + capture.offset;
            text[..abs].matches('\x0c').count() as u32 + 1
        });

        let mut candidate = CandidateCitation {
            title: Some(title),
            authors: capture.authors.as_deref().map(split_authors).unwrap_or_default(),
            year: capture.year,
            journal: capture.journal.as_deref().and_then(clean_journal),
            doi: capture.doi,
            source: Source::Text,
            confidence: 0.0,
            raw_context: Some(truncate_chars(&capture.context, config.max_raw_context)),
            page_number,
        };
        candidate.confidence = score_text_candidate(&candidate, signals);
        out.push(candidate);
    }
    out
}

/// Everything the inline side of a document yields in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineReport {
    pub links: Vec<CitationLink>,
    pub entries: Vec<ReferenceEntry>,
    pub markers: Vec<InlineMarker>,
    pub stats: MarkerStats,
}

/// Find inline citation markers in the body text and resolve them against
/// the parsed bibliography. Purely synchronous; independent of the
/// provider pipeline.
pub fn link_inline_citations(text: &str) -> InlineReport {
    // Only an explicit heading cleanly separates body from bibliography; a
    // dense-window guess still yields entries, but markers are taken from
    // the whole text.
    let (body, entries) = match locate_reference_section(text) {
        Some(s) if s.origin == SectionOrigin::Heading => {
            (&text[..s.start], parse_reference_entries(&s.text))
        }
        Some(s) => (text, parse_reference_entries(&s.text)),
        None => (text, Vec::new()),
    };
    let markers = extract_markers(body);
    let links = link_citations(&markers, &entries);
    let stats = marker_stats(&markers);
    debug!(
        markers = markers.len(),
        entries = entries.len(),
        resolved = links.iter().filter(|l| l.resolved).count(),
        "inline linking finished"
    );
    InlineReport { links, entries, markers, stats }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => s[..i].to_string(),
        None => s.to_string(),
    }
}
