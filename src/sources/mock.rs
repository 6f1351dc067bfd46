//! In-memory collaborators for tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use crate::{
    err::AdapterError,
    pipeline::ds::{CisregulatoryEvidence, Gene, GwasAssociation, RegulatoryEvidence, Snp},
};

use super::{
    CisregulatorySource, GeneResolver, GwasSource, LdPair, LdSource, OntologySource,
    PhenotypeSource, RegulatorySource, SnpResolver,
};

fn simulated_failure(what: &str) -> AdapterError {
    AdapterError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        format!("simulated network error for {}", what),
    ))
}

pub struct MockGwasSource {
    name: String,
    associations: Vec<GwasAssociation>,
    fail: bool,
}

impl MockGwasSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            associations: Vec::new(),
            fail: false,
        }
    }

    pub fn with(mut self, snp: &str, disease: &str, efo: &str, pvalue: f64) -> Self {
        self.associations.push(GwasAssociation {
            snp: snp.to_string(),
            disease: disease.to_string(),
            efo: efo.to_string(),
            pvalue,
            source: self.name.clone(),
            study: None,
        });
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl GwasSource for MockGwasSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_gwas(
        &self,
        diseases: &[String],
        efos: &[String],
    ) -> Result<Vec<GwasAssociation>, AdapterError> {
        if self.fail {
            return Err(simulated_failure(&self.name));
        }
        Ok(self
            .associations
            .iter()
            .filter(|a| diseases.contains(&a.disease) || efos.contains(&a.efo))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockSnpResolver {
    snps: HashMap<String, Vec<Snp>>,
    failing: HashSet<String>,
    calls: Arc<AtomicUsize>,
}

impl MockSnpResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one location of a SNP; call repeatedly for multiple locations.
    pub fn with(mut self, snp: Snp) -> Self {
        self.snps.entry(snp.rs_id.clone()).or_default().push(snp);
        self
    }

    pub fn failing(mut self, rs_id: &str) -> Self {
        self.failing.insert(rs_id.to_string());
        self
    }

    /// Shared counter of `resolve_snp` calls.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl SnpResolver for MockSnpResolver {
    fn resolve_snp(&self, rs_id: &str) -> Result<Vec<Snp>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(rs_id) {
            return Err(simulated_failure(rs_id));
        }
        self.snps
            .get(rs_id)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(rs_id.to_string()))
    }
}

#[derive(Default)]
pub struct MockGeneResolver {
    genes: Vec<Gene>,
    calls: Arc<AtomicUsize>,
}

impl MockGeneResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gene: Gene) -> Self {
        self.genes.push(gene);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    fn find(&self, pred: impl Fn(&Gene) -> bool, key: &str) -> Result<Gene, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.genes
            .iter()
            .find(|gene| pred(gene))
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(key.to_string()))
    }
}

impl GeneResolver for MockGeneResolver {
    fn gene_by_id(&self, gene_id: &str) -> Result<Gene, AdapterError> {
        self.find(|gene| gene.id == gene_id, gene_id)
    }

    fn gene_by_symbol(&self, symbol: &str) -> Result<Gene, AdapterError> {
        self.find(|gene| gene.name == symbol, symbol)
    }

    fn genes_in_region(&self, chrom: &str, start: i64, end: i64) -> Result<Vec<Gene>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .genes
            .iter()
            .filter(|gene| gene.chrom == chrom && gene.tss >= start && gene.tss <= end)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockLdSource {
    pairs: Vec<LdPair>,
    failing: HashSet<String>,
}

impl MockLdSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, variation1: &str, variation2: &str, r2: f64) -> Self {
        self.pairs.push(LdPair {
            variation1: variation1.to_string(),
            variation2: variation2.to_string(),
            r2,
        });
        self
    }

    pub fn failing(mut self, rs_id: &str) -> Self {
        self.failing.insert(rs_id.to_string());
        self
    }
}

impl LdSource for MockLdSource {
    fn fetch_ld_neighbors(
        &self,
        rs_id: &str,
        _population: &str,
        r2_threshold: f64,
    ) -> Result<Vec<LdPair>, AdapterError> {
        if self.failing.contains(rs_id) {
            return Err(simulated_failure(rs_id));
        }
        Ok(self
            .pairs
            .iter()
            .filter(|pair| pair.partner_of(rs_id).is_some() && pair.r2 >= r2_threshold)
            .cloned()
            .collect())
    }
}

pub struct MockCisregulatorySource {
    name: String,
    evidence: Vec<CisregulatoryEvidence>,
    fail: bool,
}

impl MockCisregulatorySource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            evidence: Vec::new(),
            fail: false,
        }
    }

    pub fn with(mut self, snp: &Snp, gene: &Gene, score: f64) -> Self {
        self.evidence.push(CisregulatoryEvidence {
            snp: snp.clone(),
            gene: gene.clone(),
            score,
            source: self.name.clone(),
            study: None,
            tissue: None,
        });
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl CisregulatorySource for MockCisregulatorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_cisregulatory(
        &self,
        snps: &[Snp],
        _tissues: &[String],
    ) -> Result<Vec<CisregulatoryEvidence>, AdapterError> {
        if self.fail {
            return Err(simulated_failure(&self.name));
        }
        Ok(self
            .evidence
            .iter()
            .filter(|e| snps.iter().any(|snp| snp.rs_id == e.snp.rs_id))
            .cloned()
            .collect())
    }
}

pub struct MockRegulatorySource {
    name: String,
    evidence: Vec<RegulatoryEvidence>,
    fail: bool,
}

impl MockRegulatorySource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            evidence: Vec::new(),
            fail: false,
        }
    }

    pub fn with(mut self, snp: &Snp, score: f64) -> Self {
        self.evidence.push(RegulatoryEvidence {
            snp: snp.clone(),
            score,
            source: self.name.clone(),
            study: None,
            tissue: None,
        });
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl RegulatorySource for MockRegulatorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_regulatory(
        &self,
        snps: &[Snp],
        _tissues: &[String],
    ) -> Result<Vec<RegulatoryEvidence>, AdapterError> {
        if self.fail {
            return Err(simulated_failure(&self.name));
        }
        Ok(self
            .evidence
            .iter()
            .filter(|e| snps.iter().any(|snp| snp.rs_id == e.snp.rs_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockPhenotypeSource {
    genes: HashSet<String>,
    calls: Arc<AtomicUsize>,
}

impl MockPhenotypeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gene_name: &str) -> Self {
        self.genes.insert(gene_name.to_string());
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl PhenotypeSource for MockPhenotypeSource {
    fn gene_has_known_phenotype(&self, gene: &Gene) -> Result<bool, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.genes.contains(&gene.name))
    }
}

#[derive(Default)]
pub struct MockOntologySource {
    suggestions: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,
}

impl MockOntologySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suggestion(mut self, term: &str, efo: &str) -> Self {
        self.suggestions.insert(term.to_string(), efo.to_string());
        self
    }

    pub fn with_children(mut self, efo: &str, children: &[&str]) -> Self {
        self.children.insert(
            efo.to_string(),
            children.iter().map(|c| c.to_string()).collect(),
        );
        self
    }
}

impl OntologySource for MockOntologySource {
    fn suggest_efo(&self, term: &str) -> Result<Option<String>, AdapterError> {
        Ok(self.suggestions.get(term).cloned())
    }

    fn efo_children(&self, efo: &str) -> Result<Vec<String>, AdapterError> {
        Ok(self.children.get(efo).cloned().unwrap_or_default())
    }
}
