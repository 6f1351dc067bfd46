//! Gene prioritization from GWAS hits: the evidence-fusion and fine-mapping pipeline.
//!
//! The stages are, in order, deduplication of GWAS associations (`dedup`),
//! LD clustering (`cluster`), fine-mapping (`pics`), evidence aggregation
//! (`evidence`) and the reduction to one gene per cluster (`combine`).
//! `rank_genes` runs all of them against a set of `Sources`.

pub mod cluster;
pub mod combine;
pub mod dedup;
pub mod ds;
pub mod evidence;
pub mod pics;

use std::time::Instant;

use indexmap::IndexMap;
use rayon::prelude::*;
use thousands::Separable;

use crate::{
    err::ConfError,
    sources::{
        phenotype::KnownPhenotypes, CisregulatorySource, GwasSource, LdSource, RegulatorySource,
        SnpResolver,
    },
};

use self::{
    cluster::LdParams,
    ds::{Cluster, GeneClusterAssociation, GwasAssociation},
    pics::PicsModel,
};

/// Tissue used when the query names none.
pub const DEFAULT_TISSUE: &str = "Whole_Blood";

/// How many associations `rank_genes` returns.
#[derive(
    clap::ValueEnum,
    serde::Serialize,
    serde::Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ResultMode {
    /// Only the best association over all clusters.
    #[default]
    Best,
    /// The best association of each cluster, by descending score.
    PerCluster,
}

/// Numeric parameters of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    /// Associations with a p-value at or above this are ignored.
    pub pvalue_cutoff: f64,
    /// Minimal r² of LD neighbours.
    pub r2_threshold: f64,
    pub pics_model: PicsModel,
    pub result_mode: ResultMode,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            pvalue_cutoff: dedup::PVALUE_CUTOFF,
            r2_threshold: cluster::R2_THRESHOLD,
            pics_model: PicsModel::default(),
            result_mode: ResultMode::default(),
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), ConfError> {
        if !(self.pvalue_cutoff > 0.0 && self.pvalue_cutoff <= 1.0) {
            return Err(ConfError::InvalidPvalueCutoff(self.pvalue_cutoff));
        }
        if !(0.0..=1.0).contains(&self.r2_threshold) {
            return Err(ConfError::InvalidR2Threshold(self.r2_threshold));
        }
        Ok(())
    }
}

/// The collaborators the pipeline draws its data from.
pub struct Sources {
    pub gwas: Vec<Box<dyn GwasSource>>,
    pub snps: Box<dyn SnpResolver>,
    pub ld: Box<dyn LdSource>,
    pub cisregulatory: Vec<Box<dyn CisregulatorySource>>,
    pub regulatory: Vec<Box<dyn RegulatorySource>>,
    pub phenotypes: KnownPhenotypes,
}

/// Fetch the raw associations from all GWAS sources, in source order.
pub fn fetch_gwas_associations(
    diseases: &[String],
    efos: &[String],
    sources: &[Box<dyn GwasSource>],
) -> Vec<GwasAssociation> {
    let span = tracing::Span::current();
    sources
        .par_iter()
        .map(|source| {
            let _enter = span.enter();
            let before_fetch = Instant::now();
            match source.fetch_gwas(diseases, efos) {
                Ok(associations) => {
                    tracing::info!(
                        "found {} associations in {} in {:?}",
                        associations.len().separate_with_commas(),
                        source.name(),
                        before_fetch.elapsed()
                    );
                    associations
                }
                Err(e) => {
                    tracing::warn!("GWAS source {} failed: {}", source.name(), e);
                    Vec::new()
                }
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Compute the r² of each LD SNP of `cluster` with its top hit.
///
/// The top hit has r² 1 with itself and SNPs missing from the LD service's
/// answer get `None`.  Returns `None` if the LD query fails.
fn ld_to_top_hit(
    cluster: &Cluster,
    ld: &dyn LdSource,
    ld_params: &LdParams,
) -> Option<(IndexMap<String, Option<f64>>, f64)> {
    let top = cluster.top_gwas_hit()?;
    let pairs = match ld.fetch_ld_neighbors(
        &top.snp.rs_id,
        &ld_params.population,
        ld_params.r2_threshold,
    ) {
        Ok(pairs) => pairs,
        Err(e) => {
            tracing::warn!(
                "LD lookup for top GWAS hit {} failed, skipping cluster: {}",
                &top.snp.rs_id,
                e
            );
            return None;
        }
    };

    let mut r2s: IndexMap<String, Option<f64>> = cluster
        .ld_snps
        .iter()
        .map(|snp| (snp.rs_id.clone(), None))
        .collect();
    for pair in &pairs {
        if let Some(partner) = pair.partner_of(&top.snp.rs_id) {
            if let Some(r2) = r2s.get_mut(partner) {
                r2.get_or_insert(pair.r2);
            }
        }
    }
    r2s.insert(top.snp.rs_id.clone(), Some(1.0));

    Some((r2s, top.pvalue))
}

/// Find the best gene for one cluster.
fn score_cluster(
    cluster: &Cluster,
    tissues: &[String],
    sources: &Sources,
    ld_params: &LdParams,
    pics_model: PicsModel,
) -> Option<GeneClusterAssociation> {
    let (r2s, pvalue) = ld_to_top_hit(cluster, sources.ld.as_ref(), ld_params)?;
    let pics = pics::pics(&r2s, pvalue, pics_model);

    let associations = evidence::ld_snps_to_genes(
        &cluster.ld_snps,
        tissues,
        &sources.cisregulatory,
        &sources.regulatory,
    );

    let result = combine::cluster_to_gene(cluster, &associations, &pics, &sources.phenotypes);
    if let Some(result) = &result {
        tracing::debug!(
            "best gene for cluster of {} GWAS SNPs: {} (score {})",
            cluster.gwas_snps.len(),
            result.gene.name,
            result.score
        );
    }
    result
}

/// Rank candidate genes for the given diseases and EFO ids.
///
/// Only the first population is used for LD queries.  Without tissues,
/// `DEFAULT_TISSUE` is used.  Failing collaborators are logged and
/// contribute nothing; an empty query gives an empty result.
pub fn rank_genes(
    diseases: &[String],
    efos: &[String],
    populations: &[String],
    tissues: &[String],
    sources: &Sources,
    params: &Params,
) -> Result<Vec<GeneClusterAssociation>, ConfError> {
    if diseases.is_empty() && efos.is_empty() {
        tracing::info!("no diseases or EFO ids given, nothing to rank");
        return Ok(Vec::new());
    }

    params.validate()?;
    let population = populations.first().ok_or(ConfError::NoPopulation)?;
    if populations.len() > 1 {
        tracing::info!(
            "using population {} for LD, ignoring {} others",
            population,
            populations.len() - 1
        );
    }
    let tissues = if tissues.is_empty() {
        vec![DEFAULT_TISSUE.to_string()]
    } else {
        tissues.to_vec()
    };

    let before_ranking = Instant::now();
    let associations = fetch_gwas_associations(diseases, efos, &sources.gwas);
    let gwas_snps = dedup::dedup_associations(associations, params.pvalue_cutoff);
    tracing::info!(
        "found {} significant GWAS SNPs",
        gwas_snps.len().separate_with_commas()
    );

    let ld_params = LdParams {
        population: population.clone(),
        r2_threshold: params.r2_threshold,
    };
    let clusters =
        cluster::cluster_gwas_snps(&gwas_snps, sources.snps.as_ref(), sources.ld.as_ref(), &ld_params);

    let span = tracing::Span::current();
    let per_cluster = clusters
        .par_iter()
        .filter_map(|cluster| {
            span.in_scope(|| score_cluster(cluster, &tissues, sources, &ld_params, params.pics_model))
        })
        .collect::<Vec<_>>();
    tracing::info!(
        "scored {} of {} clusters in {:?}",
        per_cluster.len().separate_with_commas(),
        clusters.len().separate_with_commas(),
        before_ranking.elapsed()
    );

    Ok(match params.result_mode {
        ResultMode::Best => combine::best_association(per_cluster).into_iter().collect(),
        ResultMode::PerCluster => {
            let mut per_cluster = per_cluster;
            per_cluster.sort_by(|a, b| b.score.total_cmp(&a.score));
            per_cluster
        }
    })
}
