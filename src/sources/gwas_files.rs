//! GWAS associations from the flat-file databases.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::{
    common::io::open_read_maybe_gz, err::AdapterError, pipeline::ds::GwasAssociation,
};

use super::GwasSource;

/// Prefix of EFO URIs in the GWAS Catalog.
const EFO_URI_PREFIX: &str = "http://www.ebi.ac.uk/efo/";

/// The supported flat-file formats.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GwasFileKind {
    GwasCatalog,
    Grasp,
    PhewasCatalog,
    GwasDb,
}

impl GwasFileKind {
    /// Name used in evidence records.
    pub fn source_name(self) -> &'static str {
        match self {
            GwasFileKind::GwasCatalog => "GWAS Catalog",
            GwasFileKind::Grasp => "GRASP",
            GwasFileKind::PhewasCatalog => "Phewas Catalog",
            GwasFileKind::GwasDb => "GWAS DB",
        }
    }

    /// File name in the database directory.
    pub fn file_name(self) -> &'static str {
        match self {
            GwasFileKind::GwasCatalog => "GWAS_Catalog.txt",
            GwasFileKind::Grasp => "GRASP.txt",
            GwasFileKind::PhewasCatalog => "Phewas_Catalog.txt",
            GwasFileKind::GwasDb => "GWAS_DB.txt",
        }
    }

    /// Whether the first line is a header without `#`.
    fn has_header(self) -> bool {
        matches!(self, GwasFileKind::GwasCatalog)
    }
}

/// Query terms of a scan, prepared for one file format.
struct Query<'a> {
    diseases: &'a [String],
    efos: Vec<String>,
}

impl<'a> Query<'a> {
    fn new(kind: GwasFileKind, diseases: &'a [String], efos: &[String]) -> Self {
        let efos = match kind {
            // GWAS DB writes `EFOID:0000270` for `EFO_0000270`.
            GwasFileKind::GwasDb => efos.iter().map(|efo| efo.replacen('_', "ID:", 1)).collect(),
            _ => efos.to_vec(),
        };
        Self { diseases, efos }
    }

    fn matches(&self, disease: &str, efos: &[&str]) -> bool {
        self.diseases.iter().any(|d| d == disease)
            || efos.iter().any(|efo| self.efos.iter().any(|e| e == efo))
    }
}

fn field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    kind: GwasFileKind,
    record_no: usize,
) -> Result<&'r str, AdapterError> {
    record.get(idx).ok_or_else(|| AdapterError::Malformed {
        source_name: kind.source_name().to_string(),
        record_no,
        message: format!("missing field {}", idx + 1),
    })
}

fn parse_pvalue(value: &str, kind: GwasFileKind, record_no: usize) -> Result<f64, AdapterError> {
    value.trim().parse::<f64>().map_err(|e| AdapterError::Malformed {
        source_name: kind.source_name().to_string(),
        record_no,
        message: format!("invalid p-value {:?}: {}", value, e),
    })
}

/// Convert one record into the associations it contributes to the query.
fn parse_record(
    kind: GwasFileKind,
    record: &csv::StringRecord,
    record_no: usize,
    query: &Query,
) -> Result<Vec<GwasAssociation>, AdapterError> {
    let malformed = |message: String| AdapterError::Malformed {
        source_name: kind.source_name().to_string(),
        record_no,
        message,
    };
    let get = |idx: usize| field(record, idx, kind, record_no);

    match kind {
        GwasFileKind::GwasCatalog => {
            if record.len() != 36 {
                return Err(malformed(format!("expected 36 fields, got {}", record.len())));
            }
            let disease = get(7)?;
            let efo = get(35)?.replace(EFO_URI_PREFIX, "");
            if !query.matches(disease, &efo.split(", ").collect::<Vec<_>>()) {
                return Ok(Vec::new());
            }
            let pvalue = parse_pvalue(get(27)?, kind, record_no)?;
            let study = Some(get(1)?.to_string()).filter(|s| !s.is_empty());
            Ok(get(21)?
                .split(',')
                .map(str::trim)
                .filter(|snp| !snp.is_empty())
                .map(|snp| GwasAssociation {
                    snp: snp.to_string(),
                    disease: disease.to_string(),
                    efo: efo.clone(),
                    pvalue,
                    source: kind.source_name().to_string(),
                    study: study.clone(),
                })
                .collect())
        }
        GwasFileKind::Grasp => {
            if record.len() < 61 {
                return Err(malformed(format!(
                    "expected at least 61 fields, got {}",
                    record.len()
                )));
            }
            let (disease, efo) = (get(11)?, get(60)?);
            if !query.matches(disease, &[efo]) {
                return Ok(Vec::new());
            }
            Ok(vec![GwasAssociation {
                snp: format!("rs{}", get(4)?),
                disease: disease.to_string(),
                efo: efo.to_string(),
                pvalue: parse_pvalue(get(10)?, kind, record_no)?,
                source: kind.source_name().to_string(),
                study: Some(get(7)?.to_string()),
            }])
        }
        GwasFileKind::PhewasCatalog => {
            if record.len() < 10 {
                return Err(malformed(format!(
                    "expected at least 10 fields, got {}",
                    record.len()
                )));
            }
            let (disease, efo) = (get(2)?, get(9)?);
            if !query.matches(disease, &[efo]) {
                return Ok(Vec::new());
            }
            Ok(vec![GwasAssociation {
                snp: get(1)?.to_string(),
                disease: disease.to_string(),
                efo: efo.to_string(),
                pvalue: parse_pvalue(get(4)?, kind, record_no)?,
                source: kind.source_name().to_string(),
                study: None,
            }])
        }
        GwasFileKind::GwasDb => {
            if record.len() < 22 {
                return Err(malformed(format!(
                    "expected at least 22 fields, got {}",
                    record.len()
                )));
            }
            let (disease, efo) = (get(14)?, get(21)?);
            if !query.matches(disease, &[efo]) {
                return Ok(Vec::new());
            }
            Ok(vec![GwasAssociation {
                snp: get(2)?.to_string(),
                disease: disease.to_string(),
                efo: efo.to_string(),
                pvalue: parse_pvalue(get(7)?, kind, record_no)?,
                source: kind.source_name().to_string(),
                study: Some(get(6)?.to_string()),
            }])
        }
    }
}

/// A GWAS source reading one tab-separated file, plain or gzip-compressed.
#[derive(Debug, Clone)]
pub struct GwasFileSource {
    kind: GwasFileKind,
    path: PathBuf,
}

impl GwasFileSource {
    pub fn new(kind: GwasFileKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Source reading the default file name of `kind` from `databases_dir`.
    pub fn in_dir(kind: GwasFileKind, databases_dir: &Path) -> Self {
        Self::new(kind, databases_dir.join(kind.file_name()))
    }

    pub fn kind(&self) -> GwasFileKind {
        self.kind
    }
}

impl GwasSource for GwasFileSource {
    fn name(&self) -> &str {
        self.kind.source_name()
    }

    fn fetch_gwas(
        &self,
        diseases: &[String],
        efos: &[String],
    ) -> Result<Vec<GwasAssociation>, AdapterError> {
        tracing::debug!("scanning {}", self.path.display());
        let before_scan = Instant::now();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.kind.has_header())
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .quoting(false)
            .flexible(true)
            .from_reader(open_read_maybe_gz(&self.path)?);

        let query = Query::new(self.kind, diseases, efos);
        let mut result = Vec::new();
        for (record_no, record) in reader.records().enumerate() {
            let record = record?;
            result.append(&mut parse_record(self.kind, &record, record_no + 1, &query)?);
        }

        tracing::debug!(
            "found {} associations in {} in {:?}",
            result.len(),
            self.path.display(),
            before_scan.elapsed()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn source(kind: GwasFileKind) -> GwasFileSource {
        GwasFileSource::in_dir(kind, Path::new("tests/data/gwas"))
    }

    #[test]
    fn gwas_catalog_by_disease_splits_snps() -> Result<(), anyhow::Error> {
        let res = source(GwasFileKind::GwasCatalog).fetch_gwas(&strings(&["Asthma"]), &[])?;

        assert_eq!(
            res.iter().map(|a| a.snp.as_str()).collect::<Vec<_>>(),
            vec!["rs1000", "rs1001", "rs1002"]
        );
        assert_eq!(res[0].efo, "EFO_0000270");
        assert_eq!(res[0].study.as_deref(), Some("20860503"));
        assert_eq!(res[1].pvalue, 2e-8);
        assert!(res.iter().all(|a| a.source == "GWAS Catalog"));
        Ok(())
    }

    #[test]
    fn gwas_catalog_by_efo_of_multi_trait_record() -> Result<(), anyhow::Error> {
        let res =
            source(GwasFileKind::GwasCatalog).fetch_gwas(&[], &strings(&["EFO_0000384"]))?;

        assert_eq!(res.len(), 1);
        assert_eq!(res[0].snp, "rs2000");
        assert_eq!(res[0].disease, "Crohn's disease");
        Ok(())
    }

    #[test]
    fn grasp_prefixes_snp_ids() -> Result<(), anyhow::Error> {
        let res = source(GwasFileKind::Grasp).fetch_gwas(&[], &strings(&["EFO_0000270"]))?;

        assert_eq!(res.len(), 1);
        assert_eq!(res[0].snp, "rs3000");
        assert_eq!(res[0].disease, "Asthma");
        assert_eq!(res[0].pvalue, 3e-7);
        assert_eq!(res[0].study.as_deref(), Some("21804549"));
        Ok(())
    }

    #[test]
    fn phewas_catalog() -> Result<(), anyhow::Error> {
        let res =
            source(GwasFileKind::PhewasCatalog).fetch_gwas(&strings(&["Asthma"]), &[])?;

        assert_eq!(res.len(), 1);
        assert_eq!(res[0].snp, "rs4000");
        assert_eq!(res[0].efo, "EFO_0000270");
        assert_eq!(res[0].study, None);
        Ok(())
    }

    #[test]
    fn gwas_db_rewrites_efo_query() -> Result<(), anyhow::Error> {
        let res = source(GwasFileKind::GwasDb).fetch_gwas(&[], &strings(&["EFO_0000270"]))?;

        assert_eq!(res.len(), 1);
        assert_eq!(res[0].snp, "rs5000");
        assert_eq!(res[0].efo, "EFOID:0000270");
        assert_eq!(res[0].pvalue, 4e-9);
        Ok(())
    }

    #[test]
    fn no_match_gives_empty() -> Result<(), anyhow::Error> {
        let res = source(GwasFileKind::GwasCatalog)
            .fetch_gwas(&strings(&["Nonexistent trait"]), &strings(&["EFO_9999999"]))?;

        assert!(res.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_record_fails_source() {
        let source = GwasFileSource::new(
            GwasFileKind::GwasCatalog,
            "tests/data/gwas/malformed/GWAS_Catalog.txt",
        );

        let res = source.fetch_gwas(&strings(&["Asthma"]), &[]);

        assert!(
            matches!(res, Err(AdapterError::Malformed { record_no: 2, .. })),
            "{:?}",
            res
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let source = GwasFileSource::new(GwasFileKind::Grasp, "tests/data/gwas/missing.txt");

        assert!(matches!(
            source.fetch_gwas(&strings(&["Asthma"]), &[]),
            Err(AdapterError::Io(_))
        ));
    }

    #[rstest::rstest]
    #[case("gwas_catalog", GwasFileKind::GwasCatalog)]
    #[case("grasp", GwasFileKind::Grasp)]
    #[case("phewas_catalog", GwasFileKind::PhewasCatalog)]
    #[case("gwas_db", GwasFileKind::GwasDb)]
    fn kind_from_str(#[case] s: &str, #[case] expected: GwasFileKind) -> Result<(), anyhow::Error> {
        assert_eq!(s.parse::<GwasFileKind>()?, expected);
        assert_eq!(expected.to_string(), s);
        Ok(())
    }
}
