//! Data structures flowing through the gene prioritization pipeline.

use serde::{Deserialize, Serialize};

/// A SNP resolved to genomic coordinates.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snp {
    /// The dbSNP identifier, e.g., `rs7028896`.
    pub rs_id: String,
    /// Canonical chromosome name (no `chr` prefix).
    pub chrom: String,
    /// Midpoint of the mapped interval.
    pub pos: i64,
}

/// A gene as returned by the annotation services.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gene {
    /// Gene symbol.
    pub name: String,
    /// Stable ENSEMBL gene identifier.
    pub id: String,
    /// Canonical chromosome name.
    pub chrom: String,
    /// Position of the transcription start site.
    pub tss: i64,
    /// ENSEMBL biotype, e.g., `protein_coding` or `lincRNA`.
    pub biotype: String,
}

impl Gene {
    pub fn is_protein_coding(&self) -> bool {
        self.biotype == "protein_coding"
    }
}

/// A raw association between a SNP and a disease as reported by one GWAS source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GwasAssociation {
    /// The SNP identifier as reported (not yet resolved).
    pub snp: String,
    /// Name of the disease/trait.
    pub disease: String,
    /// Ontology identifier(s) of the disease/trait.
    pub efo: String,
    /// Reported p-value.
    pub pvalue: f64,
    /// Name of the source, e.g., `GWAS Catalog`.
    pub source: String,
    /// Optional study identifier (e.g., PubMed ID).
    pub study: Option<String>,
}

/// A deduplicated GWAS hit: the best association per SNP.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GwasSnp {
    /// The SNP identifier.
    pub rs_id: String,
    /// Disease of the first association seen for this SNP.
    pub disease: String,
    /// Ontology identifier of the first association seen for this SNP.
    pub efo: String,
    /// Minimal p-value over `evidence`.
    pub pvalue: f64,
    /// All associations merged into this record, in order of discovery.
    pub evidence: Vec<GwasAssociation>,
}

/// A `GwasSnp` placed at one of the genomic locations of its SNP.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LocatedGwasSnp {
    /// The resolved SNP.
    pub snp: Snp,
    /// Disease of the underlying hit.
    pub disease: String,
    /// Ontology identifier of the underlying hit.
    pub efo: String,
    /// Best p-value of the underlying hit.
    pub pvalue: f64,
    /// Supporting associations of the underlying hit.
    pub evidence: Vec<GwasAssociation>,
}

impl LocatedGwasSnp {
    pub fn new(gwas_snp: &GwasSnp, snp: Snp) -> Self {
        Self {
            snp,
            disease: gwas_snp.disease.clone(),
            efo: gwas_snp.efo.clone(),
            pvalue: gwas_snp.pvalue,
            evidence: gwas_snp.evidence.clone(),
        }
    }
}

/// A set of GWAS seed hits together with all SNPs in LD with any of them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Cluster {
    /// The GWAS hits seeding the cluster.
    pub gwas_snps: Vec<LocatedGwasSnp>,
    /// The SNPs in LD with any seed, unique by rsID; includes the seeds.
    pub ld_snps: Vec<Snp>,
}

impl Cluster {
    /// Return the seed with the lowest p-value (the first one on ties).
    pub fn top_gwas_hit(&self) -> Option<&LocatedGwasSnp> {
        self.gwas_snps.iter().fold(None, |best, candidate| match best {
            Some(best) if best.pvalue <= candidate.pvalue => Some(best),
            _ => Some(candidate),
        })
    }
}

/// Evidence linking a SNP to the regulation of a specific gene.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CisregulatoryEvidence {
    pub snp: Snp,
    pub gene: Gene,
    pub score: f64,
    pub source: String,
    pub study: Option<String>,
    pub tissue: Option<String>,
}

/// Evidence on the general regulatory potential of a SNP.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegulatoryEvidence {
    pub snp: Snp,
    pub score: f64,
    pub source: String,
    pub study: Option<String>,
    pub tissue: Option<String>,
}

/// Aggregated evidence for a (gene, SNP) pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneSnpAssociation {
    pub gene: Gene,
    pub snp: Snp,
    /// Sum of all cis-regulatory and regulatory evidence scores.
    pub score: f64,
    pub cisregulatory_evidence: Vec<CisregulatoryEvidence>,
    pub regulatory_evidence: Vec<RegulatoryEvidence>,
}

/// The final association of a gene with a cluster.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneClusterAssociation {
    pub gene: Gene,
    pub cluster: Cluster,
    /// Combined fine-mapping and evidence score.
    pub score: f64,
    /// Fine-mapping probability of the evidence SNP.
    pub pics: f64,
    /// Whether the known-phenotype override was applied.
    pub known_phenotype: bool,
    pub evidence: GeneSnpAssociation,
}


#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::fixtures::*;
    use super::*;

    #[test]
    fn top_gwas_hit_lowest_pvalue_first_on_ties() {
        let cluster = Cluster {
            gwas_snps: vec![
                located("rs1", 100, 1e-5),
                located("rs2", 200, 1e-8),
                located("rs3", 300, 1e-8),
            ],
            ld_snps: vec![],
        };

        assert_eq!(
            cluster.top_gwas_hit().map(|hit| hit.snp.rs_id.as_str()),
            Some("rs2")
        );
    }

    #[test]
    fn top_gwas_hit_empty() {
        let cluster = Cluster {
            gwas_snps: vec![],
            ld_snps: vec![],
        };

        assert!(cluster.top_gwas_hit().is_none());
    }

    #[rstest::rstest]
    #[case("protein_coding", true)]
    #[case("lincRNA", false)]
    #[case("antisense", false)]
    fn gene_is_protein_coding(#[case] biotype: &str, #[case] expected: bool) {
        assert_eq!(gene("X", biotype).is_protein_coding(), expected);
    }
}
