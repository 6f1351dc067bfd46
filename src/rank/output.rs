//! Writing of ranked gene associations.

use std::io::Write;

use itertools::Itertools;
use serde::Serialize;

use crate::{
    common::{io::open_write_maybe_gz, worker_version},
    pipeline::ds::GeneClusterAssociation,
};

/// Output file format.
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
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON document with all evidence.
    #[default]
    Json,
    /// One line per association, evidence summarized.
    Tsv,
}

/// JSON document written by `rank`.
#[derive(Serialize, Debug)]
struct Document<'a> {
    version: &'a str,
    results: &'a [GeneClusterAssociation],
}

const TSV_HEADER: &[&str] = &[
    "gene_symbol",
    "gene_id",
    "score",
    "pics",
    "evidence_score",
    "known_phenotype",
    "snp",
    "chrom",
    "pos",
    "top_gwas_snp",
    "top_pvalue",
    "diseases",
    "sources",
];

#[derive(Serialize, Debug)]
struct TsvRecord<'a> {
    gene_symbol: &'a str,
    gene_id: &'a str,
    score: f64,
    pics: f64,
    evidence_score: f64,
    known_phenotype: bool,
    snp: &'a str,
    chrom: &'a str,
    pos: i64,
    top_gwas_snp: Option<&'a str>,
    top_pvalue: Option<f64>,
    diseases: String,
    sources: String,
}

impl<'a> From<&'a GeneClusterAssociation> for TsvRecord<'a> {
    fn from(assoc: &'a GeneClusterAssociation) -> Self {
        let top = assoc.cluster.top_gwas_hit();
        let diseases = assoc
            .cluster
            .gwas_snps
            .iter()
            .map(|gwas_snp| gwas_snp.disease.as_str())
            .unique()
            .join(",");
        let sources = assoc
            .evidence
            .cisregulatory_evidence
            .iter()
            .map(|e| e.source.as_str())
            .chain(
                assoc
                    .evidence
                    .regulatory_evidence
                    .iter()
                    .map(|e| e.source.as_str()),
            )
            .unique()
            .join(",");

        Self {
            gene_symbol: &assoc.gene.name,
            gene_id: &assoc.gene.id,
            score: assoc.score,
            pics: assoc.pics,
            evidence_score: assoc.evidence.score,
            known_phenotype: assoc.known_phenotype,
            snp: &assoc.evidence.snp.rs_id,
            chrom: &assoc.evidence.snp.chrom,
            pos: assoc.evidence.snp.pos,
            top_gwas_snp: top.map(|top| top.snp.rs_id.as_str()),
            top_pvalue: top.map(|top| top.pvalue),
            diseases,
            sources,
        }
    }
}

pub fn write_json<W: Write>(
    results: &[GeneClusterAssociation],
    mut writer: W,
) -> Result<(), anyhow::Error> {
    serde_json::to_writer_pretty(
        &mut writer,
        &Document {
            version: worker_version(),
            results,
        },
    )?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

pub fn write_tsv<W: Write>(
    results: &[GeneClusterAssociation],
    writer: W,
) -> Result<(), anyhow::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(TSV_HEADER)?;
    for assoc in results {
        writer.serialize(TsvRecord::from(assoc))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `results` to `path_out` (`-` for stdout, `.gz` for compression).
pub fn write_results(
    results: &[GeneClusterAssociation],
    format: OutputFormat,
    path_out: &str,
) -> Result<(), anyhow::Error> {
    let writer = open_write_maybe_gz(path_out)
        .map_err(|e| anyhow::anyhow!("could not open {} for writing: {}", path_out, e))?;
    match format {
        OutputFormat::Json => write_json(results, writer),
        OutputFormat::Tsv => write_tsv(results, writer),
    }
}
