//! Duplicate detection across the local registry, destination, and external registries

use std::sync::Arc;

use depoline_core::{
    CandidateSource, CatalogClient, Decision, DuplicateCandidate, MigrationRecord, RateLimiter,
    RecordDescriptor, RetryPolicy, SearchQuery, Tier, call_with_retry,
};
use rustc_hash::FxHashSet;

use crate::config::MatchingConfig;
use crate::registry::{CandidateRecord, LocalRegistry, RegistryAdapter};
use crate::similarity::{self, Fingerprint};

/// Destination search wiring: the catalog plus the run's shared limiter.
pub struct DestinationSearch {
    pub client: Arc<dyn CatalogClient>,
    pub limiter: Arc<RateLimiter>,
    pub retry: RetryPolicy,
}

pub struct MatchingEngine {
    config: MatchingConfig,
    local: LocalRegistry,
    destination: Option<DestinationSearch>,
    adapters: Vec<Box<dyn RegistryAdapter>>,
}

impl MatchingEngine {
    /// `config` must already be validated (weights normalized).
    pub fn new(config: MatchingConfig, local: LocalRegistry) -> Self {
        Self {
            config,
            local,
            destination: None,
            adapters: Vec::new(),
        }
    }

    pub fn with_destination(mut self, destination: DestinationSearch) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_adapter(mut self, adapter: Box<dyn RegistryAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Sources consulted, for logs (`local`, `destination`, `external:crossref`, ...).
    pub fn source_names(&self) -> Vec<String> {
        let mut names = vec![CandidateSource::LocalRegistry.to_string()];
        if self.destination.is_some() {
            names.push(CandidateSource::DestinationSearch.to_string());
        }
        for a in &self.adapters {
            names.push(CandidateSource::ExternalRegistry(a.name().to_string()).to_string());
        }
        names
    }

    /// Candidates for a record, best first. Records without a descriptor have none.
    ///
    /// A failing source is logged and skipped; the others still contribute.
    pub fn find_candidates(&self, record: &MigrationRecord) -> Vec<DuplicateCandidate> {
        let Some(descriptor) = record.descriptor.as_ref() else {
            return Vec::new();
        };
        let fp = Fingerprint::new(
            &descriptor.title,
            descriptor.abstract_text.as_deref(),
            &descriptor.creators,
        );

        let mut found = Vec::new();
        for entry in self.local.others(&record.id) {
            let exact = similarity::normalize(&entry.candidate.title) == fp.title;
            found.extend(self.classify(&fp, CandidateSource::LocalRegistry, &entry.candidate, exact));
        }

        if let Some(dest) = &self.destination {
            match self.search_destination(dest, descriptor) {
                Ok(hits) => {
                    for hit in hits
                        .iter()
                        .filter(|h| h.identifier.as_deref() != record.remote_id.as_deref())
                    {
                        found.extend(self.classify(&fp, CandidateSource::DestinationSearch, hit, false));
                    }
                }
                Err(e) => log::warn!("{}: destination search failed: {e}", record.id),
            }
        }

        for adapter in &self.adapters {
            match adapter.search(descriptor) {
                Ok(hits) => {
                    let source = CandidateSource::ExternalRegistry(adapter.name().to_string());
                    for hit in &hits {
                        found.extend(self.classify(&fp, source.clone(), hit, false));
                    }
                }
                Err(e) => log::warn!("{}: {} search failed: {e}", record.id, adapter.name()),
            }
        }

        rank(found)
    }

    fn search_destination(
        &self,
        dest: &DestinationSearch,
        descriptor: &RecordDescriptor,
    ) -> Result<Vec<CandidateRecord>, depoline_core::CallError> {
        let query = SearchQuery {
            title: descriptor.title.clone(),
            max_results: self.config.max_results,
        };
        let out = call_with_retry("destination search", &dest.limiter, &dest.retry, || {
            dest.client.search(&query)
        });
        Ok(out
            .result?
            .into_iter()
            .map(|r| CandidateRecord {
                identifier: Some(r.remote_id),
                doi: r.doi,
                title: r.title,
                abstract_text: r.description,
                creators: r.creators,
                url: r.url,
            })
            .collect())
    }

    /// Score one hit and assign a tier, or drop it below the review threshold.
    fn classify(
        &self,
        fp: &Fingerprint,
        source: CandidateSource,
        hit: &CandidateRecord,
        exact_title: bool,
    ) -> Option<DuplicateCandidate> {
        let other = Fingerprint::new(&hit.title, hit.abstract_text.as_deref(), &hit.creators);
        let (mut score, mut breakdown) = similarity::score(fp, &other, &self.config.weights);
        if exact_title && !fp.title.is_empty() {
            score = 1.0;
            breakdown.title = 1.0;
        }
        let tier = self.tier(score)?;
        Some(DuplicateCandidate {
            source,
            identifier: hit.identifier.clone(),
            doi: hit.doi.clone(),
            title: hit.title.clone(),
            url: hit.url.clone(),
            score,
            breakdown,
            tier,
            decision: Decision::Unresolved,
        })
    }

    pub fn tier(&self, score: f64) -> Option<Tier> {
        if score >= self.config.high_confidence {
            Some(Tier::HighConfidence)
        } else if score >= self.config.review {
            Some(Tier::Review)
        } else if self.config.keep_low_confidence {
            Some(Tier::LowConfidence)
        } else {
            None
        }
    }
}

/// Sort best first (ties prefer a DOI) and drop repeats of the same work.
fn rank(mut found: Vec<DuplicateCandidate>) -> Vec<DuplicateCandidate> {
    found.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.has_doi().cmp(&a.has_doi()))
    });
    let mut seen = FxHashSet::default();
    found.retain(|c| {
        let key = match c.doi.as_deref().filter(|d| !d.is_empty()) {
            Some(doi) => format!("doi:{}", doi.to_lowercase()),
            None => format!("{}:{}", c.source, c.key().1),
        };
        seen.insert(key)
    });
    found
}

/// Carry curator decisions over from a previous run of matching.
pub fn carry_decisions(previous: &[DuplicateCandidate], fresh: &mut [DuplicateCandidate]) {
    for candidate in fresh.iter_mut() {
        if let Some(old) = previous.iter().find(|p| p.key() == candidate.key()) {
            candidate.decision = old.decision;
        }
    }
}
