//! Evidence from overlapping LD SNPs with BED annotation files.

use std::{collections::BTreeMap, path::Path, sync::Arc, time::Instant};

use bio::data_structures::interval_tree::ArrayBackedIntervalTree;
use indexmap::IndexMap;
use thousands::Separable;

use crate::{
    common::{build_chrom_map, io::open_read_maybe_gz, CHROMS},
    err::AdapterError,
    pipeline::ds::{CisregulatoryEvidence, Gene, RegulatoryEvidence, Snp},
};

use super::{CisregulatorySource, GeneResolver, RegulatorySource};

/// Alias for the interval tree that we use.
type IntervalTree = ArrayBackedIntervalTree<u64, u32>;

/// One BED line.
#[derive(Debug, Clone, PartialEq)]
pub struct BedRecord {
    /// 0-based begin position.
    pub begin: u64,
    /// End position.
    pub end: u64,
    /// Columns after the third one.
    pub annotations: Vec<String>,
}

/// BED records with per-chromosome interval trees.
#[derive(Default, Debug)]
pub struct BedIndex {
    chrom_map: IndexMap<String, usize>,
    /// Records, stored by chromosome.
    records: Vec<Vec<BedRecord>>,
    /// Interval trees, stored by chromosome.
    trees: Vec<IntervalTree>,
}

impl BedIndex {
    /// Load a BED file, plain or gzip-compressed.
    ///
    /// Records on chromosomes outside of `CHROMS` are skipped.
    pub fn load(path: &Path) -> Result<Self, AdapterError> {
        tracing::debug!("loading BED records from {:?}...", path);
        let before_loading = Instant::now();

        let mut result = BedIndex {
            chrom_map: build_chrom_map(),
            ..Default::default()
        };
        for _ in CHROMS {
            result.records.push(Vec::new());
            result.trees.push(IntervalTree::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false) // BED has no header
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .quoting(false)
            .flexible(true)
            .from_reader(open_read_maybe_gz(path)?);

        let source_name = path.display().to_string();
        let mut total_count = 0usize;
        for (record_no, record) in reader.records().enumerate() {
            let record = record?;
            let malformed = |message: String| AdapterError::Malformed {
                source_name: source_name.clone(),
                record_no: record_no + 1,
                message,
            };
            if record.len() < 3 {
                return Err(malformed(format!(
                    "expected at least 3 fields, got {}",
                    record.len()
                )));
            }
            let parse_pos = |idx: usize| {
                record[idx]
                    .parse::<u64>()
                    .map_err(|e| malformed(format!("invalid position {:?}: {}", &record[idx], e)))
            };
            let (begin, end) = (parse_pos(1)?, parse_pos(2)?);
            if end < begin {
                return Err(malformed(format!("end {} before begin {}", end, begin)));
            }

            let Some(chrom_idx) = result.chrom_map.get(&record[0]).copied() else {
                tracing::trace!("skipping record on chromosome {}", &record[0]);
                continue;
            };
            result.trees[chrom_idx].insert(begin..end, result.records[chrom_idx].len() as u32);
            result.records[chrom_idx].push(BedRecord {
                begin,
                end,
                annotations: record.iter().skip(3).map(|s| s.to_string()).collect(),
            });
            total_count += 1;
        }
        result.trees.iter_mut().for_each(|tree| tree.index());

        tracing::debug!(
            "... done loading {} records and building trees in {:?}",
            total_count.separate_with_commas(),
            before_loading.elapsed()
        );
        Ok(result)
    }

    /// Return the records overlapping the base at `snp.pos`.
    pub fn overlapping(&self, snp: &Snp) -> Vec<&BedRecord> {
        let (Some(chrom_idx), Ok(pos)) = (self.chrom_map.get(&snp.chrom), u64::try_from(snp.pos))
        else {
            return Vec::new();
        };
        self.trees[*chrom_idx]
            .find(pos..pos + 1)
            .iter()
            .map(|cursor| &self.records[*chrom_idx][*cursor.data() as usize])
            .collect()
    }
}

/// Distance-dependent false discovery rates of enhancer-gene correlations.
#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct FdrModel {
    pub bin_width: u64,
    pub max_distance: u64,
    /// FDR by distance bin, `null` if unknown.
    pub fdr: BTreeMap<u64, Option<f64>>,
}

impl FdrModel {
    /// Load the model from a JSON file.
    pub fn load(path: &Path) -> Result<Self, AdapterError> {
        Ok(serde_json::from_reader(open_read_maybe_gz(path)?)?)
    }

    /// Score the interaction between `snp` and `gene`.
    pub fn score(&self, snp: &Snp, gene: &Gene) -> f64 {
        if gene.chrom != snp.chrom || self.bin_width == 0 {
            return 0.0;
        }
        let distance = snp.pos.abs_diff(gene.tss);
        if distance > self.max_distance {
            return 0.0;
        }
        match self.fdr.get(&(distance / self.bin_width)).copied().flatten() {
            Some(fdr) if fdr < 0.6 => 2.0,
            Some(fdr) if fdr < 0.85 => 1.0,
            _ => 0.0,
        }
    }
}

/// Regulome chromatin states: score 2 for categories 1 and 2, else 1.
pub struct RegulomeSource {
    index: BedIndex,
}

impl RegulomeSource {
    pub fn new(index: BedIndex) -> Self {
        Self { index }
    }

    pub fn load(path: &Path) -> Result<Self, AdapterError> {
        Ok(Self::new(BedIndex::load(path)?))
    }
}

impl RegulatorySource for RegulomeSource {
    fn name(&self) -> &str {
        "Regulome"
    }

    fn fetch_regulatory(
        &self,
        snps: &[Snp],
        _tissues: &[String],
    ) -> Result<Vec<RegulatoryEvidence>, AdapterError> {
        Ok(snps
            .iter()
            .flat_map(|snp| {
                self.index.overlapping(snp).into_iter().map(|record| {
                    let category = record.annotations.first().map(String::as_str).unwrap_or("");
                    RegulatoryEvidence {
                        snp: snp.clone(),
                        score: if category.starts_with('1') || category.starts_with('2') {
                            2.0
                        } else {
                            1.0
                        },
                        source: self.name().to_string(),
                        study: None,
                        tissue: None,
                    }
                })
            })
            .collect())
    }
}

/// Enhancer-gene correlation data sets scored with an `FdrModel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CorrelationKind {
    /// Name column is `;`-separated with the HGNC symbol third.
    #[strum(serialize = "Fantom5")]
    Fantom5,
    /// HGNC symbol in the fourth column.
    #[strum(serialize = "DHS")]
    Dhs,
}

impl CorrelationKind {
    fn gene_symbol(self, record: &BedRecord) -> Option<&str> {
        let name = record.annotations.first()?;
        match self {
            CorrelationKind::Fantom5 => name.split(';').nth(2),
            CorrelationKind::Dhs => Some(name.as_str()),
        }
    }
}

/// Cis-regulatory evidence from enhancer-gene correlations.
pub struct CorrelationSource {
    kind: CorrelationKind,
    name: String,
    index: BedIndex,
    fdr_model: FdrModel,
    genes: Arc<dyn GeneResolver>,
}

impl CorrelationSource {
    pub fn new(
        kind: CorrelationKind,
        index: BedIndex,
        fdr_model: FdrModel,
        genes: Arc<dyn GeneResolver>,
    ) -> Self {
        Self {
            kind,
            name: kind.to_string(),
            index,
            fdr_model,
            genes,
        }
    }

    pub fn load(
        kind: CorrelationKind,
        path_bed: &Path,
        path_fdrs: &Path,
        genes: Arc<dyn GeneResolver>,
    ) -> Result<Self, AdapterError> {
        Ok(Self::new(
            kind,
            BedIndex::load(path_bed)?,
            FdrModel::load(path_fdrs)?,
            genes,
        ))
    }
}

impl CisregulatorySource for CorrelationSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_cisregulatory(
        &self,
        snps: &[Snp],
        _tissues: &[String],
    ) -> Result<Vec<CisregulatoryEvidence>, AdapterError> {
        let mut result = Vec::new();
        for snp in snps {
            for record in self.index.overlapping(snp) {
                let Some(symbol) = self.kind.gene_symbol(record) else {
                    tracing::trace!("{} record without gene symbol at {}", &self.name, record.begin);
                    continue;
                };
                let gene = match self.genes.gene_by_symbol(symbol) {
                    Ok(gene) => gene,
                    Err(e) => {
                        tracing::warn!("{}: could not look up gene {}: {}", &self.name, symbol, e);
                        continue;
                    }
                };
                let score = self.fdr_model.score(snp, &gene);
                if score > 0.0 {
                    result.push(CisregulatoryEvidence {
                        snp: snp.clone(),
                        gene,
                        score,
                        source: self.name.clone(),
                        study: None,
                        tissue: None,
                    });
                }
            }
        }
        Ok(result)
    }
}
