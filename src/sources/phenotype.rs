//! Knowledge about genes with annotated phenotypes.

use std::{collections::HashMap, sync::Mutex, time::Instant};

use hpo::Ontology;

use crate::{err::AdapterError, pipeline::ds::Gene};

use super::PhenotypeSource;

/// Phenotype source that knows no phenotypes at all.
#[derive(Debug, Default)]
pub struct NoPhenotypes;

impl PhenotypeSource for NoPhenotypes {
    fn gene_has_known_phenotype(&self, _gene: &Gene) -> Result<bool, AdapterError> {
        Ok(false)
    }
}

/// Phenotype source backed by the HPO gene annotations.
///
/// A gene has a known phenotype if HPO annotates its symbol with at least one term.
pub struct HpoPhenotypeSource {
    ontology: Ontology,
}

impl HpoPhenotypeSource {
    /// Load the ontology from the standard files in `path_hpo_dir`.
    pub fn load(path_hpo_dir: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Loading HPO from {}...", path_hpo_dir);
        let before_loading = Instant::now();
        let ontology = Ontology::from_standard(path_hpo_dir)
            .map_err(|e| anyhow::anyhow!("could not load HPO from {}: {}", path_hpo_dir, e))?;
        tracing::info!("...done loading HPO in {:?}", before_loading.elapsed());
        Ok(Self::new(ontology))
    }

    pub fn new(ontology: Ontology) -> Self {
        Self { ontology }
    }
}

impl PhenotypeSource for HpoPhenotypeSource {
    fn gene_has_known_phenotype(&self, gene: &Gene) -> Result<bool, AdapterError> {
        Ok(self
            .ontology
            .gene_by_name(&gene.name)
            .map(|hpo_gene| !hpo_gene.hpo_terms().is_empty())
            .unwrap_or(false))
    }
}

/// Caller-owned memoization of known-phenotype answers, keyed by gene ID.
///
/// A failing lookup is logged and answered with `false`; it is not cached.
pub struct KnownPhenotypes {
    source: Box<dyn PhenotypeSource>,
    cache: Mutex<HashMap<String, bool>>,
}

impl KnownPhenotypes {
    pub fn new(source: Box<dyn PhenotypeSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn has_known_phenotype(&self, gene: &Gene) -> bool {
        if let Some(known) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&gene.id)
        {
            return *known;
        }

        match self.source.gene_has_known_phenotype(gene) {
            Ok(known) => {
                self.cache
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(gene.id.clone(), known);
                known
            }
            Err(e) => {
                tracing::warn!("phenotype lookup for gene {} failed: {}", gene.name, e);
                false
            }
        }
    }
}

impl Default for KnownPhenotypes {
    fn default() -> Self {
        Self::new(Box::new(NoPhenotypes))
    }
}
