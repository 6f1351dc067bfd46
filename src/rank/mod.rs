//! Code implementing the `rank` sub command.

pub mod output;

use std::time::Instant;

use clap::Parser;
use thousands::Separable;
use tracing::info;

use crate::{
    common::trace_rss_now,
    conf::{self, Config},
    pipeline::{self, pics::PicsModel, ResultMode},
    sources::ontology::expand_efos,
};

use self::output::OutputFormat;

/// Command line arguments for `rank` sub command.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Rank candidate genes for diseases", long_about = None)]
pub struct Args {
    /// Disease or trait name to query; may be given multiple times.
    #[arg(long = "disease")]
    pub diseases: Vec<String>,
    /// EFO id to query, e.g., `EFO_0000270`; may be given multiple times.
    #[arg(long = "efo")]
    pub efos: Vec<String>,
    /// LD reference population, overrides the configuration.
    #[arg(long = "population")]
    pub populations: Vec<String>,
    /// GTEx tissue, overrides the configuration.
    #[arg(long = "tissue")]
    pub tissues: Vec<String>,
    /// Path to TOML configuration file; defaults are used if missing.
    #[arg(long)]
    pub path_conf: Option<String>,
    /// Directory with the flat-file databases, overrides the configuration.
    #[arg(long)]
    pub path_databases: Option<String>,
    /// PICS model, overrides the configuration.
    #[arg(long, value_enum)]
    pub pics_model: Option<PicsModel>,
    /// Result mode, overrides the configuration.
    #[arg(long, value_enum)]
    pub result_mode: Option<ResultMode>,
    /// Expand diseases and EFO ids through the ontology services.
    #[arg(long, default_value_t = false)]
    pub expand_efos: bool,
    /// Path to output file, `-` for stdout.
    #[arg(long, default_value = "-")]
    pub path_output: String,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub output_format: OutputFormat,
}

/// Apply the overrides from the command line to `conf`.
fn apply_args(mut conf: Config, args: &Args) -> Config {
    if !args.populations.is_empty() {
        conf.pipeline.populations = args.populations.clone();
    }
    if !args.tissues.is_empty() {
        conf.pipeline.tissues = args.tissues.clone();
    }
    if let Some(path_databases) = &args.path_databases {
        conf.databases.dir = path_databases.clone();
    }
    if let Some(pics_model) = args.pics_model {
        conf.pipeline.pics_model = pics_model;
    }
    if let Some(result_mode) = args.result_mode {
        conf.pipeline.result_mode = result_mode;
    }
    conf
}

/// Main entry point for `rank` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    let conf = apply_args(conf::load_or_default(args.path_conf.as_deref())?, args);
    conf.validate()?;

    info!("Setting up sources...");
    let before_loading = Instant::now();
    let sources = conf.build_sources()?;
    info!(
        "...done setting up sources in {:?}",
        before_loading.elapsed()
    );
    trace_rss_now();

    let efos = if args.expand_efos {
        info!("Expanding query through EFO...");
        let efos = expand_efos(&args.diseases, &args.efos, &conf.build_ontology()?);
        info!("... query expanded to {} EFO ids", efos.len().separate_with_commas());
        efos
    } else {
        args.efos.clone()
    };

    info!("Ranking genes...");
    let before_ranking = Instant::now();
    let results = pipeline::rank_genes(
        &args.diseases,
        &efos,
        &conf.pipeline.populations,
        &conf.pipeline.tissues,
        &sources,
        &conf.pipeline.params(),
    )?;
    info!(
        "... done ranking genes in {:?}, {} results",
        before_ranking.elapsed(),
        results.len().separate_with_commas()
    );
    for result in &results {
        info!("  {} ({}) score={}", &result.gene.name, &result.gene.id, result.score);
    }

    output::write_results(&results, args.output_format, &args.path_output)?;
    trace_rss_now();

    info!(
        "All of `rank` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn apply_args_overrides() {
        let args = Args {
            populations: vec!["1000GENOMES:phase_3:CEU".into()],
            path_databases: Some("/data/gwas".into()),
            pics_model: Some(PicsModel::Cdf),
            ..Default::default()
        };

        let conf = apply_args(Config::default(), &args);

        assert_eq!(conf.pipeline.populations, vec!["1000GENOMES:phase_3:CEU"]);
        assert_eq!(conf.pipeline.tissues, vec!["Whole_Blood"]);
        assert_eq!(conf.databases.dir, "/data/gwas");
        assert_eq!(conf.pipeline.pics_model, PicsModel::Cdf);
        assert_eq!(conf.pipeline.result_mode, ResultMode::Best);
    }

    #[test]
    fn run_without_matches() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path_output = tmp_dir.join("out.tsv");

        let args = Args {
            diseases: vec!["No Such Disease".into()],
            path_conf: Some("tests/conf/offline.toml".into()),
            path_output: path_output.to_string_lossy().to_string(),
            output_format: OutputFormat::Tsv,
            ..Default::default()
        };
        run(&crate::common::Args::default(), &args)?;

        insta::assert_snapshot!(
            std::fs::read_to_string(&path_output)?,
            @"gene_symbol	gene_id	score	pics	evidence_score	known_phenotype	snp	chrom	pos	top_gwas_snp	top_pvalue	diseases	sources"
        );
        Ok(())
    }

    #[test]
    fn run_unknown_source_fails() {
        let args = Args {
            efos: vec!["EFO_0000270".into()],
            path_conf: Some("tests/conf/unknown_source.toml".into()),
            ..Default::default()
        };

        assert!(run(&crate::common::Args::default(), &args).is_err());
    }
}
