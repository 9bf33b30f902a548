//! Text normalization and per-signal similarity

use depoline_core::ScoreBreakdown;
use rustc_hash::FxHashSet;

use crate::config::Weights;

/// Lowercase, trim, and collapse internal whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized Levenshtein similarity of two normalized strings. `None` if either is empty.
pub fn text_similarity(a: &str, b: &str) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some(strsim::normalized_levenshtein(a, b))
}

/// Jaccard overlap of normalized creator names. `None` if either side has none.
pub fn creator_overlap(a: &[String], b: &[String]) -> Option<f64> {
    let set = |names: &[String]| -> FxHashSet<String> {
        names
            .iter()
            .map(|n| normalize(n))
            .filter(|n| !n.is_empty())
            .collect()
    };
    let (a, b) = (set(a), set(b));
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let shared = a.intersection(&b).count();
    let union = a.union(&b).count();
    Some(shared as f64 / union as f64)
}

/// Matching view of either side of a comparison, pre-normalized.
#[derive(Debug, Clone, Default)]
pub struct Fingerprint {
    pub title: String,
    pub abstract_text: String,
    pub creators: Vec<String>,
}

impl Fingerprint {
    pub fn new(title: &str, abstract_text: Option<&str>, creators: &[String]) -> Self {
        Self {
            title: normalize(title),
            abstract_text: abstract_text.map(normalize).unwrap_or_default(),
            creators: creators.to_vec(),
        }
    }
}

/// Weighted score over the signals present on both sides.
///
/// Missing signals drop out and the remaining weights are renormalized, so a
/// candidate without an abstract is judged on title and creators alone.
pub fn score(record: &Fingerprint, candidate: &Fingerprint, weights: &Weights) -> (f64, ScoreBreakdown) {
    let title = text_similarity(&record.title, &candidate.title).unwrap_or(0.0);
    let abstract_text = text_similarity(&record.abstract_text, &candidate.abstract_text);
    let creators = creator_overlap(&record.creators, &candidate.creators);

    let mut total = title * weights.title;
    let mut weight = weights.title;
    if let Some(s) = abstract_text {
        total += s * weights.abstract_text;
        weight += weights.abstract_text;
    }
    if let Some(s) = creators {
        total += s * weights.creators;
        weight += weights.creators;
    }
    let score = if weight > 0.0 { total / weight } else { 0.0 };

    (
        score.clamp(0.0, 1.0),
        ScoreBreakdown {
            title,
            abstract_text,
            creators,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  Sea  Surface\tTemperature\n"), "sea surface temperature");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn identical_text_scores_one() {
        assert_eq!(text_similarity("abc", "abc"), Some(1.0));
        assert_eq!(text_similarity("", "abc"), None);
    }

    #[test]
    fn creator_overlap_is_jaccard() {
        let a = names(&["Smith, J.", "Doe, A."]);
        let b = names(&["smith, j.", "Roe, B."]);
        let overlap = creator_overlap(&a, &b).unwrap();
        assert!((overlap - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(creator_overlap(&a, &[]), None);
    }

    #[test]
    fn missing_signals_renormalize() {
        let weights = Weights::default();
        let record = Fingerprint::new("Kelp forest survey", Some("Annual survey"), &names(&["A"]));
        let candidate = Fingerprint::new("Kelp forest survey", None, &[]);
        let (s, breakdown) = score(&record, &candidate, &weights);
        assert_eq!(s, 1.0);
        assert_eq!(breakdown.abstract_text, None);
        assert_eq!(breakdown.creators, None);
    }

    #[test]
    fn all_signals_weighted() {
        let weights = Weights::default();
        let record = Fingerprint::new("Same title", Some("same abstract"), &names(&["A"]));
        let candidate = Fingerprint::new("Same title", Some("same abstract"), &names(&["B"]));
        let (s, _) = score(&record, &candidate, &weights);
        // Title and abstract match fully, creators not at all.
        assert!((s - 0.85).abs() < 1e-9);
    }

    #[test]
    fn empty_title_scores_zero() {
        let weights = Weights::default();
        let (s, _) = score(&Fingerprint::default(), &Fingerprint::default(), &weights);
        assert_eq!(s, 0.0);
    }
}
