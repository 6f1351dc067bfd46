//! External collaborators of the pipeline.
//!
//! Each kind of evidence is served by a trait; the active implementations are
//! selected by name in the configuration (see `crate::conf::SourcesConf`).
//! All calls are blocking and independent of each other, so the pipeline fans
//! them out with `rayon`.

pub mod bed;
pub mod ensembl;
pub mod gtex;
pub mod gwas_files;
pub mod ontology;
pub mod phenotype;

#[cfg(test)]
pub mod mock;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    err::AdapterError,
    pipeline::ds::{CisregulatoryEvidence, Gene, GwasAssociation, RegulatoryEvidence, Snp},
};

/// One LD record as reported by the LD service.
#[derive(Debug, Clone, PartialEq)]
pub struct LdPair {
    pub variation1: String,
    pub variation2: String,
    pub r2: f64,
}

impl LdPair {
    /// Return the partner of `rs_id` in this pair, if `rs_id` is part of it.
    pub fn partner_of(&self, rs_id: &str) -> Option<&str> {
        if self.variation1 == rs_id {
            Some(&self.variation2)
        } else if self.variation2 == rs_id {
            Some(&self.variation1)
        } else {
            None
        }
    }
}

/// Source of raw GWAS associations.
pub trait GwasSource: Send + Sync {
    /// Human-readable name used in evidence records and logs.
    fn name(&self) -> &str;

    /// Fetch all associations matching any of the diseases or EFO ids.
    fn fetch_gwas(
        &self,
        diseases: &[String],
        efos: &[String],
    ) -> Result<Vec<GwasAssociation>, AdapterError>;
}

/// Resolution of SNP identifiers to genomic coordinates.
pub trait SnpResolver: Send + Sync {
    /// Return all locations of `rs_id`; more than one for merged identifiers.
    fn resolve_snp(&self, rs_id: &str) -> Result<Vec<Snp>, AdapterError>;
}

/// Gene annotation service.
pub trait GeneResolver: Send + Sync {
    /// Look up a gene by its stable ENSEMBL identifier.
    fn gene_by_id(&self, gene_id: &str) -> Result<Gene, AdapterError>;

    /// Look up a gene by its HGNC symbol.
    fn gene_by_symbol(&self, symbol: &str) -> Result<Gene, AdapterError>;

    /// All genes overlapping the 1-based closed interval `chrom:start-end`.
    fn genes_in_region(&self, chrom: &str, start: i64, end: i64) -> Result<Vec<Gene>, AdapterError>;
}

/// Linkage disequilibrium service.
pub trait LdSource: Send + Sync {
    /// Return all pairs involving `rs_id` with r² at least `r2_threshold`.
    fn fetch_ld_neighbors(
        &self,
        rs_id: &str,
        population: &str,
        r2_threshold: f64,
    ) -> Result<Vec<LdPair>, AdapterError>;
}

/// Source of (gene, SNP) evidence.
pub trait CisregulatorySource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch_cisregulatory(
        &self,
        snps: &[Snp],
        tissues: &[String],
    ) -> Result<Vec<CisregulatoryEvidence>, AdapterError>;
}

/// Source of SNP-level regulatory evidence.
pub trait RegulatorySource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch_regulatory(
        &self,
        snps: &[Snp],
        tissues: &[String],
    ) -> Result<Vec<RegulatoryEvidence>, AdapterError>;
}

/// Knowledge about genes with annotated phenotypes.
pub trait PhenotypeSource: Send + Sync {
    fn gene_has_known_phenotype(&self, gene: &Gene) -> Result<bool, AdapterError>;
}

/// Disease ontology services used to expand the query.
pub trait OntologySource: Send + Sync {
    /// Suggest the best matching EFO id for a free-text disease name.
    fn suggest_efo(&self, term: &str) -> Result<Option<String>, AdapterError>;

    /// Return all descendants of the given EFO id (excluding itself).
    fn efo_children(&self, efo: &str) -> Result<Vec<String>, AdapterError>;
}

impl<T: SnpResolver + ?Sized> SnpResolver for Arc<T> {
    fn resolve_snp(&self, rs_id: &str) -> Result<Vec<Snp>, AdapterError> {
        (**self).resolve_snp(rs_id)
    }
}

impl<T: LdSource + ?Sized> LdSource for Arc<T> {
    fn fetch_ld_neighbors(
        &self,
        rs_id: &str,
        population: &str,
        r2_threshold: f64,
    ) -> Result<Vec<LdPair>, AdapterError> {
        (**self).fetch_ld_neighbors(rs_id, population, r2_threshold)
    }
}

/// Memoizing wrapper around a `SnpResolver`.
///
/// Successful lookups are cached; failures are not, so a later call retries.
pub struct CachedSnpResolver {
    inner: Box<dyn SnpResolver>,
    cache: Mutex<HashMap<String, Vec<Snp>>>,
}

impl CachedSnpResolver {
    pub fn new(inner: Box<dyn SnpResolver>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl SnpResolver for CachedSnpResolver {
    fn resolve_snp(&self, rs_id: &str) -> Result<Vec<Snp>, AdapterError> {
        if let Some(snps) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(rs_id)
        {
            return Ok(snps.clone());
        }

        let snps = self.inner.resolve_snp(rs_id)?;
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(rs_id.to_string(), snps.clone());
        Ok(snps)
    }
}
