//! Source adapters: the uniform boundary between lookup providers and the
//! rest of the pipeline.
//!
//! Providers are black boxes behind [`ProviderClient`]. The adapter wrapper
//! owns everything they must not be trusted with: the per-call timeout, the
//! match gate against the requested document, provenance tagging, and trust
//! scoring. Adapter failures are recorded and logged, never propagated.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use refmerge_parsing::normalize::valid_year;

use crate::similarity::token_jaccard;
use crate::{AdapterFailure, CandidateCitation, DocumentRef, ExtractConfig, Source};

pub type LookupFuture<'a> = Pin<Box<dyn Future<Output = Result<RawLookup, String>> + Send + 'a>>;

/// A structured lookup provider for one [`Source`].
pub trait ProviderClient: Send + Sync {
    fn source(&self) -> Source;

    /// Look up records for a document known by `title` and/or `doi`.
    fn lookup<'a>(&'a self, title: Option<&'a str>, doi: Option<&'a str>) -> LookupFuture<'a>;
}

/// One record as a provider returns it, before provenance and scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub doi: Option<String>,
}

/// A provider response: which document the provider believes it matched,
/// plus the records for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawLookup {
    pub matched_title: Option<String>,
    pub matched_doi: Option<String>,
    pub records: Vec<RawRecord>,
}

/// Wraps one [`ProviderClient`] with timeout, match gate, and scoring.
pub struct SourceAdapter {
    client: Arc<dyn ProviderClient>,
    timeout: Duration,
    gate_threshold: f64,
}

impl SourceAdapter {
    pub fn new(client: Arc<dyn ProviderClient>, config: &ExtractConfig) -> Self {
        SourceAdapter {
            client,
            timeout: config.provider_timeout,
            gate_threshold: config.policy.gate_threshold,
        }
    }

    pub fn source(&self) -> Source {
        self.client.source()
    }

    /// Fetch candidates for `doc`. Always returns; trouble comes back as an
    /// [`AdapterFailure`] next to an empty list.
    pub async fn fetch(&self, doc: &DocumentRef) -> (Vec<CandidateCitation>, Option<AdapterFailure>) {
        let source = self.client.source();
        let Some(trust) = source.trust() else {
            warn!(source = source.as_str(), "client registered for a non-provider source");
            return (Vec::new(), None);
        };

        let lookup = self
            .client
            .lookup(doc.title.as_deref(), doc.doi.as_deref());
        let lookup = match tokio::time::timeout(self.timeout, lookup).await {
            Err(_) => return (Vec::new(), Some(AdapterFailure::Timeout)),
            Ok(Err(msg)) => return (Vec::new(), Some(AdapterFailure::Unavailable(msg))),
            Ok(Ok(lookup)) => lookup,
        };

        if !self.gate_accepts(doc, &lookup) {
            debug!(
                source = source.as_str(),
                matched_title = lookup.matched_title.as_deref().unwrap_or(""),
                "provider response failed the match gate"
            );
            return (Vec::new(), None);
        }

        let candidates = lookup
            .records
            .into_iter()
            .map(|r| candidate_from_record(r, source, trust))
            .collect();
        (candidates, None)
    }

    /// A response is accepted only when the provider demonstrably located
    /// the requested document: exact DOI, or title tokens close enough.
    fn gate_accepts(&self, doc: &DocumentRef, lookup: &RawLookup) -> bool {
        if let (Some(want), Some(got)) = (doc.doi.as_deref(), lookup.matched_doi.as_deref()) {
            if want.eq_ignore_ascii_case(got.trim()) {
                return true;
            }
        }
        if let (Some(want), Some(got)) = (doc.title.as_deref(), lookup.matched_title.as_deref()) {
            if token_jaccard(want, got) >= self.gate_threshold {
                return true;
            }
        }
        false
    }
}

/// Tag a raw record with provenance and a fixed trust score. An
/// out-of-range year drops the field, not the record.
fn candidate_from_record(record: RawRecord, source: Source, trust: f64) -> CandidateCitation {
    let year = record.year.filter(|&y| valid_year(y));
    if year.is_none() && record.year.is_some() {
        debug!(source = source.as_str(), year = record.year, "dropping out-of-range year");
    }
    CandidateCitation {
        title: record.title,
        authors: record.authors,
        year,
        journal: record.journal,
        doi: record.doi,
        source,
        confidence: trust,
        raw_context: None,
        page_number: None,
    }
}

pub type ModelExtractFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<serde_json::Value>, String>> + Send + 'a>>;

/// A black-box model that reads document text and emits loosely structured
/// citation records as JSON values.
pub trait ModelExtractor: Send + Sync {
    fn extract<'a>(&'a self, text: &'a str) -> ModelExtractFuture<'a>;
}

/// Run the model extractor and decode its payload. Individual malformed
/// values are skipped; a failed or fully undecodable run is reported as
/// [`AdapterFailure::MalformedResponse`] or [`AdapterFailure::Unavailable`].
pub async fn model_candidates(
    extractor: &dyn ModelExtractor,
    text: &str,
    timeout: Duration,
) -> (Vec<CandidateCitation>, Option<AdapterFailure>) {
    let values = match tokio::time::timeout(timeout, extractor.extract(text)).await {
        Err(_) => return (Vec::new(), Some(AdapterFailure::Timeout)),
        Ok(Err(msg)) => return (Vec::new(), Some(AdapterFailure::Unavailable(msg))),
        Ok(Ok(values)) => values,
    };

    let Some(trust) = Source::ModelExtractor.trust() else {
        return (Vec::new(), None);
    };
    let total = values.len();
    let mut skipped = 0usize;
    let mut candidates = Vec::with_capacity(total);
    for value in values {
        match serde_json::from_value::<RawRecord>(value) {
            Ok(record) => {
                candidates.push(candidate_from_record(record, Source::ModelExtractor, trust));
            }
            Err(err) => {
                skipped += 1;
                debug!(error = %err, "skipping malformed extractor record");
            }
        }
    }

    let failure = (skipped > 0 && candidates.is_empty()).then(|| {
        AdapterFailure::MalformedResponse(format!("{skipped} of {total} records undecodable"))
    });
    (candidates, failure)
}

/// Scripted provider for tests: a fixed response, an optional delay, and an
/// optional failure.
pub struct MockProvider {
    pub source: Source,
    pub response: Result<RawLookup, String>,
    pub delay: Option<Duration>,
}

impl MockProvider {
    pub fn found(source: Source, matched_title: &str, records: Vec<RawRecord>) -> Self {
        MockProvider {
            source,
            response: Ok(RawLookup {
                matched_title: Some(matched_title.to_string()),
                matched_doi: None,
                records,
            }),
            delay: None,
        }
    }

    pub fn failing(source: Source, message: &str) -> Self {
        MockProvider {
            source,
            response: Err(message.to_string()),
            delay: None,
        }
    }
}

impl ProviderClient for MockProvider {
    fn source(&self) -> Source {
        self.source
    }

    fn lookup<'a>(&'a self, _title: Option<&'a str>, _doi: Option<&'a str>) -> LookupFuture<'a> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str) -> DocumentRef {
        DocumentRef {
            title: Some(title.to_string()),
            doi: None,
            text: String::new(),
        }
    }

    fn record(title: &str) -> RawRecord {
        RawRecord {
            title: Some(title.to_string()),
            authors: vec!["J. Smith".to_string()],
            year: Some(2020),
            journal: None,
            doi: None,
        }
    }

    #[tokio::test]
    async fn matching_title_passes_the_gate() {
        let provider = Arc::new(MockProvider::found(
            Source::Crossref,
            "Deep Learning for Vision",
            vec![record("Deep Learning for Vision")],
        ));
        let adapter = SourceAdapter::new(provider, &ExtractConfig::default());
        let (candidates, failure) = adapter.fetch(&doc("Deep Learning for Vision")).await;
        assert!(failure.is_none());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, Source::Crossref);
        assert_eq!(candidates[0].confidence, 0.95);
    }

    #[tokio::test]
    async fn unrelated_title_fails_closed() {
        let provider = Arc::new(MockProvider::found(
            Source::OpenAlex,
            "A Completely Different Paper About Chemistry",
            vec![record("A Completely Different Paper About Chemistry")],
        ));
        let adapter = SourceAdapter::new(provider, &ExtractConfig::default());
        let (candidates, failure) = adapter.fetch(&doc("Deep Learning for Vision")).await;
        assert!(failure.is_none());
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn doi_match_passes_without_title() {
        let provider = Arc::new(MockProvider {
            source: Source::Crossref,
            response: Ok(RawLookup {
                matched_title: None,
                matched_doi: Some("10.1234/ABC.5678".to_string()),
                records: vec![record("Whatever the Provider Calls It")],
            }),
            delay: None,
        });
        let adapter = SourceAdapter::new(provider, &ExtractConfig::default());
        let doc = DocumentRef {
            title: None,
            doi: Some("10.1234/abc.5678".to_string()),
            text: String::new(),
        };
        let (candidates, _) = adapter.fetch(&doc).await;
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn provider_error_is_a_recorded_failure() {
        let provider = Arc::new(MockProvider::failing(Source::SemanticScholar, "boom"));
        let adapter = SourceAdapter::new(provider, &ExtractConfig::default());
        let (candidates, failure) = adapter.fetch(&doc("Anything")).await;
        assert!(candidates.is_empty());
        assert_eq!(
            failure,
            Some(AdapterFailure::Unavailable("boom".to_string()))
        );
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let provider = Arc::new(MockProvider {
            source: Source::OpenAlex,
            response: Ok(RawLookup::default()),
            delay: Some(Duration::from_secs(60)),
        });
        let config = ExtractConfig {
            provider_timeout: Duration::from_millis(20),
            ..ExtractConfig::default()
        };
        let adapter = SourceAdapter::new(provider, &config);
        let (candidates, failure) = adapter.fetch(&doc("Anything at all")).await;
        assert!(candidates.is_empty());
        assert_eq!(failure, Some(AdapterFailure::Timeout));
    }

    #[tokio::test]
    async fn invalid_year_dropped_record_kept() {
        let mut rec = record("Deep Learning for Vision");
        rec.year = Some(1847);
        let provider = Arc::new(MockProvider::found(
            Source::Crossref,
            "Deep Learning for Vision",
            vec![rec],
        ));
        let adapter = SourceAdapter::new(provider, &ExtractConfig::default());
        let (candidates, _) = adapter.fetch(&doc("Deep Learning for Vision")).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].year, None);
    }

    struct ScriptedExtractor(Vec<serde_json::Value>);

    impl ModelExtractor for ScriptedExtractor {
        fn extract<'a>(&'a self, _text: &'a str) -> ModelExtractFuture<'a> {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    #[tokio::test]
    async fn model_payload_is_decoded_leniently() {
        let extractor = ScriptedExtractor(vec![
            serde_json::json!({
                "title": "A Model Extracted Citation",
                "authors": ["K. Lee"],
                "year": 2021
            }),
            serde_json::json!("not an object"),
        ]);
        let (candidates, failure) =
            model_candidates(&extractor, "text", Duration::from_secs(1)).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, Source::ModelExtractor);
        assert_eq!(candidates[0].confidence, 0.70);
        // One record survived, so the skipped one is not a run failure.
        assert!(failure.is_none());
    }

    #[tokio::test]
    async fn fully_malformed_payload_is_reported() {
        let extractor = ScriptedExtractor(vec![serde_json::json!(42)]);
        let (candidates, failure) =
            model_candidates(&extractor, "text", Duration::from_secs(1)).await;
        assert!(candidates.is_empty());
        assert!(matches!(failure, Some(AdapterFailure::MalformedResponse(_))));
    }
}
