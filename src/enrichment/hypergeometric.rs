//! Over-representation analysis with the hypergeometric distribution

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use statrs::distribution::{DiscreteCDF, Hypergeometric};

use super::catalog::{AnnotationCatalog, OntologyBranch};
use super::mapping::GeneIdMapper;
use crate::error::{DgeError, Result};
use crate::stats::cmp_nan_last;
use crate::testing::benjamini_hochberg;

/// Parameters for enrichment testing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentParams {
    /// Keep terms with raw p-value at or below this
    pub pvalue_cutoff: f64,
    /// Report at most this many terms
    pub top_n: Option<usize>,
    pub branch: OntologyBranch,
}

impl Default for EnrichmentParams {
    fn default() -> Self {
        Self {
            pvalue_cutoff: 0.001,
            top_n: None,
            branch: OntologyBranch::BiologicalProcess,
        }
    }
}

/// One over-represented term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub term_id: String,
    pub description: String,
    pub pvalue: f64,
    /// Benjamini-Hochberg adjusted over every tested term
    pub padj: f64,
    /// Foreground genes annotated to the term
    pub count: usize,
    /// Universe genes annotated to the term
    pub term_size: usize,
    pub foreground_size: usize,
    pub universe_size: usize,
    /// Overlapping genes (mapped ids) in foreground order
    pub genes: Vec<String>,
}

impl EnrichmentResult {
    /// count/foreground over term_size/universe
    pub fn fold_enrichment(&self) -> f64 {
        (self.count as f64 / self.foreground_size as f64) / (self.term_size as f64 / self.universe_size as f64)
    }
}

/// Enrichment results plus the identifier mapping gaps met on the way
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub branch: OntologyBranch,
    /// Ranked ascending by p-value
    pub results: Vec<EnrichmentResult>,
    /// Terms with at least one foreground hit
    pub n_tested: usize,
    pub unmapped_foreground: usize,
    pub unmapped_universe: usize,
    /// Mapped foreground ids missing from the mapped universe
    pub foreground_outside_universe: usize,
}

impl EnrichmentReport {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Map ids, dropping unmapped ones and duplicates; returns (mapped, n_unmapped)
fn map_ids(ids: &[String], mapper: &dyn GeneIdMapper) -> (Vec<String>, usize) {
    let mut seen = HashSet::new();
    let mut mapped = Vec::with_capacity(ids.len());
    let mut unmapped = 0;
    for id in ids {
        match mapper.map_id(id) {
            Some(m) => {
                if seen.insert(m.clone()) {
                    mapped.push(m);
                }
            }
            None => unmapped += 1,
        }
    }
    (mapped, unmapped)
}

/// P(X >= count) for X ~ Hypergeometric(universe, term_size, foreground)
pub fn hypergeometric_pvalue(count: usize, universe: usize, term_size: usize, foreground: usize) -> Result<f64> {
    if count == 0 {
        return Ok(1.0);
    }
    let dist = Hypergeometric::new(universe as u64, term_size as u64, foreground as u64).map_err(|e| {
        DgeError::InvalidInput {
            reason: format!(
                "hypergeometric(N={}, K={}, n={}): {}",
                universe, term_size, foreground, e
            ),
        }
    })?;
    // sf(x) is P(X > x)
    Ok(dist.sf(count as u64 - 1).clamp(0.0, 1.0))
}

/// Test every term of `params.branch` for over-representation of `foreground`
/// against `universe`.
pub fn enrich(
    foreground: &[String],
    universe: &[String],
    mapper: &dyn GeneIdMapper,
    catalog: &dyn AnnotationCatalog,
    params: &EnrichmentParams,
) -> Result<EnrichmentReport> {
    let mut report = EnrichmentReport {
        branch: params.branch,
        ..Default::default()
    };

    if foreground.is_empty() {
        log::info!("Empty foreground: no enrichment to test");
        return Ok(report);
    }

    let (universe_ids, unmapped_universe) = map_ids(universe, mapper);
    report.unmapped_universe = unmapped_universe;
    if universe_ids.is_empty() {
        return Err(DgeError::insufficient(
            "enrichment",
            format!("none of the {} universe genes could be mapped", universe.len()),
        ));
    }
    let universe_set: HashSet<&str> = universe_ids.iter().map(String::as_str).collect();

    let (mapped_foreground, unmapped_foreground) = map_ids(foreground, mapper);
    report.unmapped_foreground = unmapped_foreground;
    let n_mapped = mapped_foreground.len();
    let foreground_ids: Vec<String> = mapped_foreground
        .into_iter()
        .filter(|id| universe_set.contains(id.as_str()))
        .collect();
    report.foreground_outside_universe = n_mapped - foreground_ids.len();

    if unmapped_foreground > 0 || unmapped_universe > 0 {
        log::warn!(
            "Identifier mapping gaps: {} of {} foreground and {} of {} universe genes unmapped",
            unmapped_foreground,
            foreground.len(),
            unmapped_universe,
            universe.len()
        );
    }

    if foreground_ids.is_empty() {
        log::warn!("No foreground gene survived mapping; enrichment is empty");
        return Ok(report);
    }

    let n_universe = universe_ids.len();
    let n_foreground = foreground_ids.len();

    let mut tested: Vec<EnrichmentResult> = Vec::new();
    for term in catalog.terms(params.branch) {
        let members: HashSet<&str> = term
            .genes
            .iter()
            .map(String::as_str)
            .filter(|g| universe_set.contains(g))
            .collect();
        if members.is_empty() {
            continue;
        }

        let hits: Vec<String> = foreground_ids
            .iter()
            .filter(|g| members.contains(g.as_str()))
            .cloned()
            .collect();
        if hits.is_empty() {
            continue;
        }

        let pvalue = hypergeometric_pvalue(hits.len(), n_universe, members.len(), n_foreground)?;
        tested.push(EnrichmentResult {
            term_id: term.id.clone(),
            description: term.description.clone(),
            pvalue,
            padj: f64::NAN,
            count: hits.len(),
            term_size: members.len(),
            foreground_size: n_foreground,
            universe_size: n_universe,
            genes: hits,
        });
    }

    let pvalues: Vec<Option<f64>> = tested.iter().map(|r| Some(r.pvalue)).collect();
    for (result, padj) in tested.iter_mut().zip(benjamini_hochberg(&pvalues)) {
        result.padj = padj.unwrap_or(f64::NAN);
    }
    report.n_tested = tested.len();

    let mut results: Vec<EnrichmentResult> = tested
        .into_iter()
        .filter(|r| r.pvalue <= params.pvalue_cutoff)
        .collect();
    results.sort_by(|a, b| cmp_nan_last(&a.pvalue, &b.pvalue).then_with(|| a.term_id.cmp(&b.term_id)));
    if let Some(n) = params.top_n {
        results.truncate(n);
    }

    log::info!(
        "{} enrichment: {} of {} tested terms with p <= {} ({} foreground, {} universe genes)",
        params.branch,
        results.len(),
        report.n_tested,
        params.pvalue_cutoff,
        n_foreground,
        n_universe
    );
    report.results = results;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{IdentityMapper, InMemoryCatalog, MappingTable};

    fn universe(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("g{}", i)).collect()
    }

    fn catalog() -> InMemoryCatalog {
        let mut c = InMemoryCatalog::new();
        let strong: Vec<String> = (0..10).map(|i| format!("g{}", i)).collect();
        let strong: Vec<&str> = strong.iter().map(String::as_str).collect();
        c.add_term(OntologyBranch::BiologicalProcess, "GO:A", "strong", &strong);
        c.add_term(OntologyBranch::BiologicalProcess, "GO:B", "weak", &["g0", "g50", "g60", "g70"]);
        c.add_term(OntologyBranch::BiologicalProcess, "GO:C", "outside", &["x1", "x2"]);
        c.add_term(OntologyBranch::MolecularFunction, "GO:M", "binding", &["g1"]);
        c
    }

    #[test]
    fn test_pvalue_non_increasing_in_overlap() {
        let mut last = 1.0;
        for count in 1..=10 {
            let p = hypergeometric_pvalue(count, 200, 20, 10).unwrap();
            assert!(p <= last + 1e-15);
            last = p;
        }
        assert_eq!(hypergeometric_pvalue(0, 200, 20, 10).unwrap(), 1.0);
    }

    #[test]
    fn test_all_hits_probability() {
        // P(X >= 3) with N=10, K=3, n=3 is 1 / C(10, 3)
        let p = hypergeometric_pvalue(3, 10, 3, 3).unwrap();
        assert!((p - 1.0 / 120.0).abs() < 1e-12);
    }

    #[test]
    fn test_strong_term_reported() {
        let fg: Vec<String> = (0..8).map(|i| format!("g{}", i)).collect();
        let report = enrich(&fg, &universe(200), &IdentityMapper, &catalog(), &EnrichmentParams::default()).unwrap();
        assert_eq!(report.n_tested, 2);
        assert_eq!(report.results.len(), 1);
        let top = &report.results[0];
        assert_eq!(top.term_id, "GO:A");
        assert_eq!(top.count, 8);
        assert_eq!(top.term_size, 10);
        assert_eq!(top.foreground_size, 8);
        assert_eq!(top.universe_size, 200);
        assert!(top.padj >= top.pvalue);
        assert!(top.fold_enrichment() > 1.0);
    }

    #[test]
    fn test_cutoff_and_top_n() {
        let fg: Vec<String> = (0..8).map(|i| format!("g{}", i)).collect();
        let params = EnrichmentParams {
            pvalue_cutoff: 1.0,
            top_n: Some(1),
            ..Default::default()
        };
        let report = enrich(&fg, &universe(200), &IdentityMapper, &catalog(), &params).unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].term_id, "GO:A");

        let params = EnrichmentParams {
            pvalue_cutoff: 1.0,
            ..Default::default()
        };
        let report = enrich(&fg, &universe(200), &IdentityMapper, &catalog(), &params).unwrap();
        assert_eq!(report.results.len(), 2);
        assert!(report.results[0].pvalue <= report.results[1].pvalue);
    }

    #[test]
    fn test_empty_foreground_is_empty_result() {
        let report = enrich(&[], &universe(10), &IdentityMapper, &catalog(), &EnrichmentParams::default()).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_empty_universe_is_error() {
        let fg = vec!["g1".to_string()];
        let err = enrich(&fg, &[], &IdentityMapper, &catalog(), &EnrichmentParams::default()).unwrap_err();
        assert!(matches!(err, DgeError::InsufficientData { ref stage, .. } if stage == "enrichment"));
    }

    #[test]
    fn test_mapping_gaps_counted() {
        let mapper = MappingTable::from_pairs((0..100).map(|i| (format!("s{}", i), format!("g{}", i))));
        let fg: Vec<String> = vec!["s0".into(), "s1".into(), "nope".into()];
        let univ: Vec<String> = (0..120).map(|i| format!("s{}", i)).collect();
        let params = EnrichmentParams {
            pvalue_cutoff: 1.0,
            ..Default::default()
        };
        let report = enrich(&fg, &univ, &mapper, &catalog(), &params).unwrap();
        assert_eq!(report.unmapped_foreground, 1);
        assert_eq!(report.unmapped_universe, 20);
        assert_eq!(report.foreground_outside_universe, 0);
        assert_eq!(report.results[0].universe_size, 100);
        assert_eq!(report.results[0].foreground_size, 2);
    }
}
