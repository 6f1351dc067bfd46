//! Configuration file of the `rank` sub command.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration against the public EBI/Ensembl services.

use std::{
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    common::GenomeRelease,
    err::ConfError,
    pipeline::{self, pics::PicsModel, Params, ResultMode, Sources},
    sources::{
        bed::{CorrelationKind, CorrelationSource, RegulomeSource},
        ensembl::{EnsemblClient, VepSource},
        gtex::GtexSource,
        gwas_files::{GwasFileKind, GwasFileSource},
        ontology::EbiOntologyClient,
        phenotype::{HpoPhenotypeSource, KnownPhenotypes},
        CachedSnpResolver, CisregulatorySource, GeneResolver, GwasSource, RegulatorySource,
    },
};

/// The cis-regulatory sources that can be enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CisregulatoryKind {
    Gtex,
    Fantom5,
    Dhs,
    Vep,
}

/// The regulatory sources that can be enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RegulatoryKind {
    Regulome,
}

/// Top-level configuration.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConf,
    pub sources: SourcesConf,
    pub databases: DatabasesConf,
    pub ensembl: EnsemblConf,
    pub gtex: GtexConf,
    pub ontology: OntologyConf,
    pub phenotypes: PhenotypesConf,
}

/// Parameters of the pipeline and the default query.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct PipelineConf {
    pub pvalue_cutoff: f64,
    pub r2_threshold: f64,
    /// LD reference populations; only the first one is used.
    pub populations: Vec<String>,
    pub tissues: Vec<String>,
    pub pics_model: PicsModel,
    pub result_mode: ResultMode,
}

impl Default for PipelineConf {
    fn default() -> Self {
        Self {
            pvalue_cutoff: pipeline::dedup::PVALUE_CUTOFF,
            r2_threshold: pipeline::cluster::R2_THRESHOLD,
            populations: vec!["1000GENOMES:phase_3:GBR".to_string()],
            tissues: vec![pipeline::DEFAULT_TISSUE.to_string()],
            pics_model: PicsModel::default(),
            result_mode: ResultMode::default(),
        }
    }
}

impl PipelineConf {
    pub fn params(&self) -> Params {
        Params {
            pvalue_cutoff: self.pvalue_cutoff,
            r2_threshold: self.r2_threshold,
            pics_model: self.pics_model,
            result_mode: self.result_mode,
        }
    }
}

/// Names of the active sources per kind of evidence.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct SourcesConf {
    pub gwas: Vec<String>,
    pub cisregulatory: Vec<String>,
    pub regulatory: Vec<String>,
}

impl Default for SourcesConf {
    fn default() -> Self {
        Self {
            gwas: vec![
                GwasFileKind::GwasCatalog.to_string(),
                GwasFileKind::GwasDb.to_string(),
                GwasFileKind::PhewasCatalog.to_string(),
            ],
            cisregulatory: vec![
                CisregulatoryKind::Gtex.to_string(),
                CisregulatoryKind::Fantom5.to_string(),
                CisregulatoryKind::Vep.to_string(),
            ],
            regulatory: vec![RegulatoryKind::Regulome.to_string()],
        }
    }
}

fn parse_names<T: FromStr>(kind: &'static str, names: &[String]) -> Result<Vec<T>, ConfError> {
    names
        .iter()
        .map(|name| {
            T::from_str(name).map_err(|_| ConfError::UnknownSource {
                kind,
                name: name.clone(),
            })
        })
        .collect()
}

impl SourcesConf {
    pub fn gwas_kinds(&self) -> Result<Vec<GwasFileKind>, ConfError> {
        parse_names("GWAS", &self.gwas)
    }

    pub fn cisregulatory_kinds(&self) -> Result<Vec<CisregulatoryKind>, ConfError> {
        parse_names("cis-regulatory", &self.cisregulatory)
    }

    pub fn regulatory_kinds(&self) -> Result<Vec<RegulatoryKind>, ConfError> {
        parse_names("regulatory", &self.regulatory)
    }
}

/// Location of the flat-file databases.
///
/// The GWAS files use their fixed names (e.g., `GWAS_Catalog.txt`) in `dir`.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct DatabasesConf {
    pub dir: String,
    pub regulome: String,
    pub fantom5: String,
    pub fantom5_fdrs: String,
    pub dhs: String,
    pub dhs_fdrs: String,
}

impl Default for DatabasesConf {
    fn default() -> Self {
        Self {
            dir: "databases".to_string(),
            regulome: "Regulome.txt".to_string(),
            fantom5: "Fantom5.txt".to_string(),
            fantom5_fdrs: "Fantom5.fdrs.json".to_string(),
            dhs: "DHS.txt".to_string(),
            dhs_fdrs: "DHS.fdrs.json".to_string(),
        }
    }
}

impl DatabasesConf {
    /// The database directory with `~` and environment variables expanded.
    pub fn dir(&self) -> Result<PathBuf, anyhow::Error> {
        Ok(PathBuf::from(shellexpand::full(&self.dir)?.as_ref()))
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct EnsemblConf {
    /// Server URL; derived from `release` if unset.
    pub server: Option<String>,
    pub species: String,
    pub release: GenomeRelease,
    pub timeout_secs: u64,
}

impl Default for EnsemblConf {
    fn default() -> Self {
        Self {
            server: None,
            species: "human".to_string(),
            release: GenomeRelease::default(),
            timeout_secs: 30,
        }
    }
}

impl EnsemblConf {
    pub fn server(&self) -> &str {
        self.server
            .as_deref()
            .unwrap_or_else(|| self.release.ensembl_server())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct GtexConf {
    pub server: String,
}

impl Default for GtexConf {
    fn default() -> Self {
        Self {
            server: "https://rest.ensembl.org".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct OntologyConf {
    pub zooma_server: String,
    pub ols_server: String,
}

impl Default for OntologyConf {
    fn default() -> Self {
        Self {
            zooma_server: "https://www.ebi.ac.uk/spot/zooma/v2/api".to_string(),
            ols_server: "https://www.ebi.ac.uk/ols4".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
#[serde(default)]
pub struct PhenotypesConf {
    /// Directory with the standard HPO files; no gene has a known phenotype if unset.
    pub hpo_dir: Option<String>,
}

impl Config {
    /// Load configuration from the TOML file at `path`.
    pub fn load(path: &str) -> Result<Self, anyhow::Error> {
        let path = shellexpand::tilde(path);
        tracing::debug!("loading configuration from {}", &path);
        let toml_str = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&toml_str)?)
    }

    /// Check values that serde cannot check.
    pub fn validate(&self) -> Result<(), ConfError> {
        self.pipeline.params().validate()?;
        if self.pipeline.populations.is_empty() {
            return Err(ConfError::NoPopulation);
        }
        self.sources.gwas_kinds()?;
        self.sources.cisregulatory_kinds()?;
        self.sources.regulatory_kinds()?;
        Ok(())
    }

    /// Construct the collaborators of the pipeline.
    ///
    /// Flat files backing BED sources are loaded here; GWAS files are read
    /// on each query.
    pub fn build_sources(&self) -> Result<Sources, anyhow::Error> {
        self.validate()?;
        let dir = self.databases.dir()?;
        let ensembl = Arc::new(EnsemblClient::new(
            self.ensembl.server(),
            &self.ensembl.species,
            self.ensembl.timeout(),
        )?);
        let genes: Arc<dyn GeneResolver> = ensembl.clone();

        let gwas = self
            .sources
            .gwas_kinds()?
            .into_iter()
            .map(|kind| Box::new(GwasFileSource::in_dir(kind, &dir)) as Box<dyn GwasSource>)
            .collect();

        let mut cisregulatory: Vec<Box<dyn CisregulatorySource>> = Vec::new();
        for kind in self.sources.cisregulatory_kinds()? {
            tracing::debug!("setting up cis-regulatory source {}", kind);
            let source: Box<dyn CisregulatorySource> = match kind {
                CisregulatoryKind::Gtex => Box::new(GtexSource::new(
                    &self.gtex.server,
                    self.ensembl.timeout(),
                    genes.clone(),
                )?),
                CisregulatoryKind::Fantom5 => Box::new(CorrelationSource::load(
                    CorrelationKind::Fantom5,
                    &dir.join(&self.databases.fantom5),
                    &dir.join(&self.databases.fantom5_fdrs),
                    genes.clone(),
                )?),
                CisregulatoryKind::Dhs => Box::new(CorrelationSource::load(
                    CorrelationKind::Dhs,
                    &dir.join(&self.databases.dhs),
                    &dir.join(&self.databases.dhs_fdrs),
                    genes.clone(),
                )?),
                CisregulatoryKind::Vep => Box::new(VepSource::new(ensembl.clone())),
            };
            cisregulatory.push(source);
        }

        let mut regulatory: Vec<Box<dyn RegulatorySource>> = Vec::new();
        for kind in self.sources.regulatory_kinds()? {
            tracing::debug!("setting up regulatory source {}", kind);
            let source: Box<dyn RegulatorySource> = match kind {
                RegulatoryKind::Regulome => {
                    Box::new(RegulomeSource::load(&dir.join(&self.databases.regulome))?)
                }
            };
            regulatory.push(source);
        }

        let phenotypes = match &self.phenotypes.hpo_dir {
            Some(hpo_dir) => KnownPhenotypes::new(Box::new(HpoPhenotypeSource::load(
                shellexpand::full(hpo_dir)?.as_ref(),
            )?)),
            None => KnownPhenotypes::default(),
        };

        Ok(Sources {
            gwas,
            snps: Box::new(CachedSnpResolver::new(Box::new(ensembl.clone()))),
            ld: Box::new(ensembl),
            cisregulatory,
            regulatory,
            phenotypes,
        })
    }

    pub fn build_ontology(&self) -> Result<EbiOntologyClient, anyhow::Error> {
        Ok(EbiOntologyClient::new(
            &self.ontology.zooma_server,
            &self.ontology.ols_server,
            self.ensembl.timeout(),
        )?)
    }
}

/// Load the configuration at `path` or fall back to the defaults.
pub fn load_or_default(path: Option<&str>) -> Result<Config, anyhow::Error> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_config_full() -> Result<(), anyhow::Error> {
        let conf = Config::load("tests/conf/full.toml")?;

        assert_eq!(
            conf,
            Config {
                pipeline: PipelineConf {
                    pvalue_cutoff: 1e-5,
                    r2_threshold: 0.7,
                    populations: vec!["1000GENOMES:phase_3:CEU".to_string()],
                    tissues: vec!["Lung".to_string(), "Whole_Blood".to_string()],
                    pics_model: PicsModel::Cdf,
                    result_mode: ResultMode::PerCluster,
                },
                sources: SourcesConf {
                    gwas: vec!["gwas_catalog".to_string(), "grasp".to_string()],
                    cisregulatory: vec!["fantom5".to_string(), "dhs".to_string()],
                    regulatory: vec!["regulome".to_string()],
                },
                databases: DatabasesConf {
                    dir: "tests/data/bed".to_string(),
                    ..Default::default()
                },
                ensembl: EnsemblConf {
                    server: None,
                    species: "human".to_string(),
                    release: GenomeRelease::Grch37,
                    timeout_secs: 10,
                },
                gtex: GtexConf::default(),
                ontology: OntologyConf {
                    zooma_server: "https://zooma.example.org/api".to_string(),
                    ols_server: "https://ols.example.org".to_string(),
                },
                phenotypes: PhenotypesConf { hpo_dir: None },
            }
        );
        assert_eq!(conf.ensembl.server(), "https://grch37.rest.ensembl.org");
        Ok(())
    }

    #[test]
    fn parse_config_empty() -> Result<(), anyhow::Error> {
        let conf: Config = toml::from_str("")?;

        assert_eq!(conf, Config::default());
        assert_eq!(conf.pipeline.params(), Params::default());
        assert_eq!(conf.ensembl.server(), "https://rest.ensembl.org");
        assert!(conf.validate().is_ok());
        Ok(())
    }

    #[test]
    fn load_or_default_without_path() -> Result<(), anyhow::Error> {
        assert_eq!(load_or_default(None)?, Config::default());
        Ok(())
    }

    #[test]
    fn validate_unknown_source() {
        let mut conf = Config::default();
        conf.sources.cisregulatory.push("gerp".to_string());

        assert_eq!(
            conf.validate(),
            Err(ConfError::UnknownSource {
                kind: "cis-regulatory",
                name: "gerp".to_string()
            })
        );
    }

    #[test]
    fn validate_no_population() {
        let mut conf = Config::default();
        conf.pipeline.populations.clear();

        assert_eq!(conf.validate(), Err(ConfError::NoPopulation));
    }

    #[test]
    fn build_sources_from_files() -> Result<(), anyhow::Error> {
        let conf = Config::load("tests/conf/full.toml")?;

        let sources = conf.build_sources()?;

        assert_eq!(
            sources.gwas.iter().map(|s| s.name()).collect::<Vec<_>>(),
            vec!["GWAS Catalog", "GRASP"]
        );
        assert_eq!(
            sources
                .cisregulatory
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>(),
            vec!["Fantom5", "DHS"]
        );
        assert_eq!(
            sources
                .regulatory
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>(),
            vec!["Regulome"]
        );
        Ok(())
    }

    #[test]
    fn build_sources_missing_database() {
        let mut conf = Config::default();
        conf.databases.dir = "tests/data/does-not-exist".to_string();

        assert!(conf.build_sources().is_err());
    }
}
