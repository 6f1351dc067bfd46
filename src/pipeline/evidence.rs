//! Collection of cis-regulatory and regulatory evidence for the SNPs of a cluster.

use indexmap::IndexMap;
use rayon::prelude::*;
use thousands::Separable;

use crate::sources::{CisregulatorySource, RegulatorySource};

use super::ds::{CisregulatoryEvidence, GeneSnpAssociation, RegulatoryEvidence, Snp};

/// Key of a (gene, SNP) pair: ENSEMBL gene ID and rsID.
pub type GeneSnpKey = (String, String);

/// Query all cis-regulatory sources and group the evidence by (gene, SNP).
///
/// Evidence on protein-coding genes is dropped.  Groups are ordered by first
/// appearance, iterating sources in configuration order.
pub fn cisregulatory_evidence(
    ld_snps: &[Snp],
    tissues: &[String],
    sources: &[Box<dyn CisregulatorySource>],
) -> IndexMap<GeneSnpKey, Vec<CisregulatoryEvidence>> {
    tracing::debug!(
        "searching for cis-regulatory data on {} SNPs in {} sources",
        ld_snps.len().separate_with_commas(),
        sources.len()
    );

    let span = tracing::Span::current();
    let per_source = sources
        .par_iter()
        .map(|source| {
            let _enter = span.enter();
            match source.fetch_cisregulatory(ld_snps, tissues) {
                Ok(evidence) => {
                    tracing::debug!(
                        "found {} interactions in {}",
                        evidence.len().separate_with_commas(),
                        source.name()
                    );
                    evidence
                }
                Err(e) => {
                    tracing::warn!("cis-regulatory source {} failed: {}", source.name(), e);
                    Vec::new()
                }
            }
        })
        .collect::<Vec<_>>();

    let mut result: IndexMap<GeneSnpKey, Vec<CisregulatoryEvidence>> = IndexMap::new();
    for evidence in per_source
        .into_iter()
        .flatten()
        .filter(|evidence| !evidence.gene.is_protein_coding())
    {
        result
            .entry((evidence.gene.id.clone(), evidence.snp.rs_id.clone()))
            .or_default()
            .push(evidence);
    }

    tracing::debug!(
        "found {} cis-regulatory (gene, SNP) pairs",
        result.len().separate_with_commas()
    );
    result
}

/// Query all regulatory sources for `snps` and group the evidence by rsID.
pub fn regulatory_evidence(
    snps: &[Snp],
    tissues: &[String],
    sources: &[Box<dyn RegulatorySource>],
) -> IndexMap<String, Vec<RegulatoryEvidence>> {
    tracing::debug!(
        "searching for regulatory data on {} SNPs in {} sources",
        snps.len().separate_with_commas(),
        sources.len()
    );

    let span = tracing::Span::current();
    let per_source = sources
        .par_iter()
        .map(|source| {
            let _enter = span.enter();
            match source.fetch_regulatory(snps, tissues) {
                Ok(evidence) => evidence,
                Err(e) => {
                    tracing::warn!("regulatory source {} failed: {}", source.name(), e);
                    Vec::new()
                }
            }
        })
        .collect::<Vec<_>>();

    let mut result: IndexMap<String, Vec<RegulatoryEvidence>> = IndexMap::new();
    for evidence in per_source.into_iter().flatten() {
        if snps.iter().any(|snp| snp.rs_id == evidence.snp.rs_id) {
            result
                .entry(evidence.snp.rs_id.clone())
                .or_default()
                .push(evidence);
        }
    }

    tracing::debug!(
        "found {} regulatory SNPs among {}",
        result.len().separate_with_commas(),
        snps.len().separate_with_commas()
    );
    result
}

/// Associate genes to the LD SNPs of a cluster.
///
/// The score of a (gene, SNP) pair is the sum of its cis-regulatory evidence
/// scores and the regulatory evidence scores of the SNP.
pub fn ld_snps_to_genes(
    ld_snps: &[Snp],
    tissues: &[String],
    cisregulatory_sources: &[Box<dyn CisregulatorySource>],
    regulatory_sources: &[Box<dyn RegulatorySource>],
) -> Vec<GeneSnpAssociation> {
    if ld_snps.is_empty() {
        return Vec::new();
    }

    let cisreg = cisregulatory_evidence(ld_snps, tissues, cisregulatory_sources);
    if cisreg.is_empty() {
        return Vec::new();
    }

    let mut selected: IndexMap<&str, &Snp> = IndexMap::new();
    for evidence in cisreg.values().flatten() {
        selected
            .entry(evidence.snp.rs_id.as_str())
            .or_insert(&evidence.snp);
    }
    let selected_snps = selected.into_values().cloned().collect::<Vec<_>>();
    let reg = regulatory_evidence(&selected_snps, tissues, regulatory_sources);

    cisreg
        .into_iter()
        .filter_map(|((_, rs_id), cisregulatory_evidence)| {
            let first = cisregulatory_evidence.first()?;
            let (gene, snp) = (first.gene.clone(), first.snp.clone());
            let regulatory_evidence = reg.get(&rs_id).cloned().unwrap_or_default();
            let score = cisregulatory_evidence.iter().map(|e| e.score).sum::<f64>()
                + regulatory_evidence.iter().map(|e| e.score).sum::<f64>();
            Some(GeneSnpAssociation {
                gene,
                snp,
                score,
                cisregulatory_evidence,
                regulatory_evidence,
            })
        })
        .collect()
}
