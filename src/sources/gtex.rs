//! Expression QTLs from a GTEx REST endpoint as cis-regulatory evidence.

use std::{sync::Arc, time::Duration};

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::{
    err::AdapterError,
    pipeline::ds::{CisregulatoryEvidence, Gene, Snp},
};

use super::{CisregulatorySource, GeneResolver};

/// Genes within this distance of the LD SNPs are tested.
pub const GENE_WINDOW: i64 = 1_000_000;

mod wire {
    use serde::Deserialize;
    use serde_with::{serde_as, DisplayFromStr, PickFirst};

    #[serde_as]
    #[derive(Deserialize, Debug, Clone)]
    pub struct Eqtl {
        pub snp: String,
        #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
        pub value: f64,
    }
}

/// The region `chrom:start-end` of genes to test for the given SNPs.
///
/// All SNPs of a cluster lie on the chromosome of the first one.
fn gene_window(snps: &[Snp]) -> Option<(&str, i64, i64)> {
    let first = snps.first()?;
    let start = snps.iter().map(|snp| snp.pos).min()?;
    let end = snps.iter().map(|snp| snp.pos).max()?;
    Some((
        first.chrom.as_str(),
        (start - GENE_WINDOW).max(1),
        end + GENE_WINDOW,
    ))
}

fn eqtl_evidence(
    gene: &Gene,
    tissue: &str,
    eqtls: Vec<wire::Eqtl>,
    snps: &IndexMap<&str, &Snp>,
) -> Vec<CisregulatoryEvidence> {
    eqtls
        .into_iter()
        .filter_map(|eqtl| {
            snps.get(eqtl.snp.as_str()).map(|snp| CisregulatoryEvidence {
                snp: (*snp).clone(),
                gene: gene.clone(),
                score: eqtl.value,
                source: "GTEx".to_string(),
                study: None,
                tissue: Some(tissue.to_string()),
            })
        })
        .collect()
}

/// GTEx eQTL source.
pub struct GtexSource {
    client: reqwest::blocking::Client,
    server: String,
    genes: Arc<dyn GeneResolver>,
}

impl GtexSource {
    pub fn new(
        server: &str,
        timeout: Duration,
        genes: Arc<dyn GeneResolver>,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?,
            server: server.trim_end_matches('/').to_string(),
            genes,
        })
    }

    fn fetch_eqtls(&self, gene: &Gene, tissue: &str) -> Result<Vec<wire::Eqtl>, AdapterError> {
        let url = format!("{}/eqtl/id/homo_sapiens/{}", &self.server, &gene.id);
        Ok(self
            .client
            .get(&url)
            .query(&[("statistic", "p-value"), ("tissue", tissue)])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?
            .error_for_status()?
            .json()?)
    }
}

impl CisregulatorySource for GtexSource {
    fn name(&self) -> &str {
        "GTEx"
    }

    fn fetch_cisregulatory(
        &self,
        snps: &[Snp],
        tissues: &[String],
    ) -> Result<Vec<CisregulatoryEvidence>, AdapterError> {
        let Some((chrom, start, end)) = gene_window(snps) else {
            return Ok(Vec::new());
        };
        // Evidence on protein-coding genes is discarded downstream.
        let genes = self
            .genes
            .genes_in_region(chrom, start, end)?
            .into_iter()
            .filter(|gene| !gene.is_protein_coding())
            .collect::<Vec<_>>();
        tracing::debug!(
            "testing {} genes in {}:{}-{} for eQTLs",
            genes.len(),
            chrom,
            start,
            end
        );

        let by_id = snps
            .iter()
            .map(|snp| (snp.rs_id.as_str(), snp))
            .collect::<IndexMap<_, _>>();
        let queries = genes
            .iter()
            .flat_map(|gene| tissues.iter().map(move |tissue| (gene, tissue.as_str())))
            .collect::<Vec<_>>();

        let span = tracing::Span::current();
        Ok(queries
            .par_iter()
            .map(|(gene, tissue)| {
                let _enter = span.enter();
                match self.fetch_eqtls(gene, tissue) {
                    Ok(eqtls) => eqtl_evidence(gene, tissue, eqtls, &by_id),
                    Err(e) => {
                        tracing::warn!(
                            "GTEx query for gene {} in tissue {} failed: {}",
                            &gene.id,
                            tissue,
                            e
                        );
                        Vec::new()
                    }
                }
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect())
    }
}
