//! Access to the Ensembl REST API: SNP coordinates, LD, genes and VEP.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use crate::{
    err::AdapterError,
    pipeline::ds::{CisregulatoryEvidence, Gene, Snp},
};

use super::{CisregulatorySource, GeneResolver, LdPair, LdSource, SnpResolver};

/// Maximal number of identifiers per VEP POST request.
pub const VEP_BATCH_SIZE: usize = 200;

/// Default timeout of one request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Records as returned by the REST API.
pub(crate) mod wire {
    use serde::{Deserialize, Serialize};
    use serde_with::{serde_as, DisplayFromStr};

    #[derive(Deserialize, Debug, Clone)]
    pub struct Mapping {
        pub seq_region_name: String,
        pub start: i64,
        pub end: i64,
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct Variation {
        #[serde(default)]
        pub mappings: Vec<Mapping>,
    }

    #[serde_as]
    #[derive(Deserialize, Debug, Clone)]
    pub struct LdRecord {
        pub variation1: String,
        pub variation2: String,
        #[serde_as(as = "DisplayFromStr")]
        pub r2: f64,
    }

    /// Gene from `/lookup` or `/overlap`.
    #[derive(Deserialize, Debug, Clone)]
    pub struct Gene {
        pub id: String,
        pub display_name: Option<String>,
        pub external_name: Option<String>,
        pub seq_region_name: String,
        pub start: i64,
        pub end: i64,
        pub strand: i8,
        pub biotype: String,
    }

    #[derive(Serialize, Debug)]
    pub struct VepRequest<'a> {
        pub ids: &'a [&'a str],
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct TranscriptConsequence {
        pub gene_id: String,
        pub impact: String,
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct VepResult {
        pub input: String,
        #[serde(default)]
        pub transcript_consequences: Vec<TranscriptConsequence>,
    }
}

/// Locations of `rs_id`, at the midpoint of each mapping.
fn snps_from_variation(rs_id: &str, variation: wire::Variation) -> Vec<Snp> {
    variation
        .mappings
        .into_iter()
        .map(|mapping| Snp {
            rs_id: rs_id.to_string(),
            chrom: mapping.seq_region_name,
            pos: (mapping.start + mapping.end) / 2,
        })
        .collect()
}

/// Convert a gene record; `fallback_name` is used if the record has no name.
fn gene_from_wire(gene: wire::Gene, fallback_name: &str) -> Gene {
    let tss = if gene.strand > 0 { gene.start } else { gene.end };
    Gene {
        name: gene
            .display_name
            .or(gene.external_name)
            .unwrap_or_else(|| fallback_name.to_string()),
        id: gene.id,
        chrom: gene.seq_region_name,
        tss,
        biotype: gene.biotype,
    }
}

/// Score of a VEP impact class, `None` for unknown classes.
pub fn vep_impact_score(impact: &str) -> Option<f64> {
    match impact {
        "HIGH" => Some(4.0),
        "MEDIUM" => Some(3.0),
        "LOW" => Some(2.0),
        "MODERATE" | "MODIFIER" => Some(1.0),
        _ => None,
    }
}

/// Blocking client for one Ensembl REST server.
pub struct EnsemblClient {
    client: reqwest::blocking::Client,
    server: String,
    species: String,
    genes_by_id: Mutex<HashMap<String, Gene>>,
    genes_by_symbol: Mutex<HashMap<String, Gene>>,
}

impl EnsemblClient {
    pub fn new(server: &str, species: &str, timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gwas2genes/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            species: species.to_string(),
            genes_by_id: Mutex::new(HashMap::new()),
            genes_by_symbol: Mutex::new(HashMap::new()),
        })
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    fn url(&self, ext: &str) -> String {
        format!("{}/{}", self.server, ext.trim_start_matches('/'))
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        ext: &str,
        query: &[(&str, String)],
    ) -> Result<T, AdapterError> {
        let url = self.url(ext);
        tracing::trace!("GET {}", &url);
        Ok(self
            .client
            .get(&url)
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?
            .error_for_status()?
            .json()?)
    }

    fn post_json<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        ext: &str,
        body: &B,
    ) -> Result<T, AdapterError> {
        let url = self.url(ext);
        tracing::trace!("POST {}", &url);
        Ok(self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()?
            .error_for_status()?
            .json()?)
    }

    fn cached_gene(
        cache: &Mutex<HashMap<String, Gene>>,
        key: &str,
        fetch: impl FnOnce() -> Result<Gene, AdapterError>,
    ) -> Result<Gene, AdapterError> {
        if let Some(gene) = cache.lock().unwrap_or_else(|e| e.into_inner()).get(key) {
            return Ok(gene.clone());
        }
        let gene = fetch()?;
        cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), gene.clone());
        Ok(gene)
    }
}

impl SnpResolver for EnsemblClient {
    fn resolve_snp(&self, rs_id: &str) -> Result<Vec<Snp>, AdapterError> {
        let variation: wire::Variation =
            self.get_json(&format!("/variation/{}/{}", &self.species, rs_id), &[])?;
        Ok(snps_from_variation(rs_id, variation))
    }
}

impl LdSource for EnsemblClient {
    fn fetch_ld_neighbors(
        &self,
        rs_id: &str,
        population: &str,
        r2_threshold: f64,
    ) -> Result<Vec<LdPair>, AdapterError> {
        let records: Vec<wire::LdRecord> = self.get_json(
            &format!("/ld/{}/{}/{}", &self.species, rs_id, population),
            &[("r2", r2_threshold.to_string())],
        )?;
        Ok(records
            .into_iter()
            .map(|record| LdPair {
                variation1: record.variation1,
                variation2: record.variation2,
                r2: record.r2,
            })
            .filter(|pair| pair.r2 >= r2_threshold)
            .collect())
    }
}

impl GeneResolver for EnsemblClient {
    fn gene_by_id(&self, gene_id: &str) -> Result<Gene, AdapterError> {
        Self::cached_gene(&self.genes_by_id, gene_id, || {
            let gene: wire::Gene = self.get_json(&format!("/lookup/id/{}", gene_id), &[])?;
            Ok(gene_from_wire(gene, gene_id))
        })
    }

    fn gene_by_symbol(&self, symbol: &str) -> Result<Gene, AdapterError> {
        Self::cached_gene(&self.genes_by_symbol, symbol, || {
            let gene: wire::Gene = self.get_json(
                &format!("/lookup/symbol/{}/{}", &self.species, symbol),
                &[],
            )?;
            Ok(gene_from_wire(gene, symbol))
        })
    }

    fn genes_in_region(&self, chrom: &str, start: i64, end: i64) -> Result<Vec<Gene>, AdapterError> {
        let genes: Vec<wire::Gene> = self.get_json(
            &format!(
                "/overlap/region/{}/{}:{}-{}",
                &self.species,
                chrom,
                start.max(1),
                end.max(1)
            ),
            &[("feature", "gene".to_string())],
        )?;
        Ok(genes
            .into_iter()
            .map(|gene| {
                let fallback = gene.id.clone();
                gene_from_wire(gene, &fallback)
            })
            .collect())
    }
}

/// Convert VEP results into evidence for the transcripts' genes.
///
/// Results for unknown SNPs, unknown impact classes and genes that cannot be
/// looked up are skipped.
fn vep_evidence(
    results: Vec<wire::VepResult>,
    snps: &IndexMap<&str, &Snp>,
    genes: &dyn GeneResolver,
) -> Vec<CisregulatoryEvidence> {
    let mut evidence = Vec::new();
    for result in results {
        let Some(snp) = snps.get(result.input.as_str()) else {
            continue;
        };
        for consequence in result.transcript_consequences {
            let Some(score) = vep_impact_score(&consequence.impact) else {
                tracing::trace!("unknown VEP impact {}", &consequence.impact);
                continue;
            };
            match genes.gene_by_id(&consequence.gene_id) {
                Ok(gene) => evidence.push(CisregulatoryEvidence {
                    snp: (*snp).clone(),
                    gene,
                    score,
                    source: "VEP".to_string(),
                    study: None,
                    tissue: None,
                }),
                Err(e) => tracing::warn!(
                    "VEP: could not look up gene {}: {}",
                    &consequence.gene_id,
                    e
                ),
            }
        }
    }
    evidence
}

/// Variant effect predictions as cis-regulatory evidence.
pub struct VepSource {
    ensembl: Arc<EnsemblClient>,
}

impl VepSource {
    pub fn new(ensembl: Arc<EnsemblClient>) -> Self {
        Self { ensembl }
    }
}

impl CisregulatorySource for VepSource {
    fn name(&self) -> &str {
        "VEP"
    }

    fn fetch_cisregulatory(
        &self,
        snps: &[Snp],
        _tissues: &[String],
    ) -> Result<Vec<CisregulatoryEvidence>, AdapterError> {
        let by_id = snps
            .iter()
            .map(|snp| (snp.rs_id.as_str(), snp))
            .collect::<IndexMap<_, _>>();
        let ids = by_id.keys().copied().collect::<Vec<_>>();

        let mut result = Vec::new();
        for batch in ids.chunks(VEP_BATCH_SIZE) {
            let results: Vec<wire::VepResult> = self.ensembl.post_json(
                &format!("/vep/{}/id", self.ensembl.species()),
                &wire::VepRequest { ids: batch },
            )?;
            result.append(&mut vep_evidence(results, &by_id, self.ensembl.as_ref()));
        }
        Ok(result)
    }
}
