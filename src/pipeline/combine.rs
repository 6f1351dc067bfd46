//! Combination of fine-mapping and functional evidence into one gene per cluster.

use indexmap::IndexMap;

use crate::sources::phenotype::KnownPhenotypes;

use super::ds::{Cluster, GeneClusterAssociation, GeneSnpAssociation};

/// Blend the PICS probability `p` with the evidence-weighted score `g`.
///
/// Computes `((p·p^(1/3) + g·g^(1/3)) / 2)^3`.
pub fn total_score(p: f64, g: f64) -> f64 {
    ((p * p.cbrt() + g * g.cbrt()) / 2.0).powi(3)
}

/// Reduce the evidence of one cluster to its single best gene.
///
/// Only (gene, SNP) pairs whose SNP has a PICS probability qualify.  Genes
/// with a known phenotype get the maximal evidence score over the qualifying
/// pairs.  Returns `None` if no pair qualifies; on ties the first pair wins.
pub fn cluster_to_gene(
    cluster: &Cluster,
    associations: &[GeneSnpAssociation],
    pics: &IndexMap<String, f64>,
    known_phenotypes: &KnownPhenotypes,
) -> Option<GeneClusterAssociation> {
    let qualifying = associations
        .iter()
        .filter_map(|assoc| pics.get(&assoc.snp.rs_id).map(|p| (assoc, *p)))
        .collect::<Vec<_>>();
    let max_evidence = qualifying
        .iter()
        .map(|(assoc, _)| assoc.score)
        .fold(None, |acc: Option<f64>, score| {
            Some(acc.map_or(score, |acc| acc.max(score)))
        })?;

    let mut best: Option<GeneClusterAssociation> = None;
    for (assoc, p) in qualifying {
        let known_phenotype = known_phenotypes.has_known_phenotype(&assoc.gene);
        let evidence = if known_phenotype {
            max_evidence
        } else {
            assoc.score
        };
        let score = total_score(p, evidence * p);
        tracing::trace!(
            "{} / {}: pics = {}, evidence = {}, score = {}",
            assoc.gene.name,
            assoc.snp.rs_id,
            p,
            evidence,
            score
        );

        if best.as_ref().map_or(true, |best| score > best.score) {
            best = Some(GeneClusterAssociation {
                gene: assoc.gene.clone(),
                cluster: cluster.clone(),
                score,
                pics: p,
                known_phenotype,
                evidence: assoc.clone(),
            });
        }
    }
    best
}

/// Return the highest-scoring association; the first one on ties.
pub fn best_association(
    associations: impl IntoIterator<Item = GeneClusterAssociation>,
) -> Option<GeneClusterAssociation> {
    associations.into_iter().fold(None, |best, candidate| match best {
        Some(best) if best.score >= candidate.score => Some(best),
        _ => Some(candidate),
    })
}
