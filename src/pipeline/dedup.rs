//! Merging of raw GWAS associations into one record per SNP.

use indexmap::{map::Entry, IndexMap};
use thousands::Separable;

use super::ds::{GwasAssociation, GwasSnp};

/// Default significance cutoff for GWAS associations.
pub const PVALUE_CUTOFF: f64 = 1e-4;

/// Merge `associations` into one `GwasSnp` per SNP identifier.
///
/// Associations with a p-value at or above `pvalue_cutoff` are dropped.  The
/// resulting records keep the disease and EFO of the first association seen
/// for their SNP; only the p-value (minimum) and the evidence list (all
/// associations, in order) are updated by later associations.  Records are
/// returned in order of first discovery.
pub fn dedup_associations(associations: Vec<GwasAssociation>, pvalue_cutoff: f64) -> Vec<GwasSnp> {
    let total = associations.len();
    let mut by_snp: IndexMap<String, GwasSnp> = IndexMap::new();

    for association in associations
        .into_iter()
        .filter(|association| association.pvalue < pvalue_cutoff)
    {
        match by_snp.entry(association.snp.clone()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if association.pvalue < record.pvalue {
                    record.pvalue = association.pvalue;
                }
                record.evidence.push(association);
            }
            Entry::Vacant(entry) => {
                entry.insert(GwasSnp {
                    rs_id: association.snp.clone(),
                    disease: association.disease.clone(),
                    efo: association.efo.clone(),
                    pvalue: association.pvalue,
                    evidence: vec![association],
                });
            }
        }
    }

    tracing::debug!(
        "merged {} associations into {} unique GWAS SNPs (p-value cutoff {:e})",
        total.separate_with_commas(),
        by_snp.len().separate_with_commas(),
        pvalue_cutoff
    );

    by_snp.into_values().collect()
}
