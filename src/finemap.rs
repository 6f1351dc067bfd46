//! Code implementing the `finemap` sub command: PICS on a user-provided LD table.

use std::{io::BufRead, time::Instant};

use clap::Parser;
use indexmap::IndexMap;
use thousands::Separable;
use tracing::info;

use crate::{
    common::io::{open_read_maybe_gz, open_write_maybe_gz},
    err::AdapterError,
    pipeline::pics::{pics, PicsModel},
};

/// Command line arguments for `finemap` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Compute PICS probabilities for an LD block", long_about = None)]
pub struct Args {
    /// Path to TSV file with `rsid` and r² to the top hit (`.` if unknown).
    #[arg(long, required = true)]
    pub path_ld: String,
    /// p-value of the top hit.
    #[arg(long, required = true)]
    pub pvalue: f64,
    /// PICS model to use.
    #[arg(long, value_enum, default_value_t = PicsModel::Density)]
    pub pics_model: PicsModel,
    /// Path to output TSV file, `-` for stdout.
    #[arg(long, default_value = "-")]
    pub path_output: String,
}

/// Read the LD table; later rows for the same SNP are ignored.
fn read_ld_table(reader: impl BufRead, source_name: &str) -> Result<IndexMap<String, Option<f64>>, AdapterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(reader);

    let mut result = IndexMap::new();
    for (record_no, record) in reader.records().enumerate() {
        let record = record?;
        let malformed = |message: String| AdapterError::Malformed {
            source_name: source_name.to_string(),
            record_no: record_no + 1,
            message,
        };
        if record.len() != 2 {
            return Err(malformed(format!("expected 2 fields, got {}", record.len())));
        }
        let r2 = match &record[1] {
            "." => None,
            value => match value.parse::<f64>() {
                Ok(r2) if (0.0..=1.0).contains(&r2) => Some(r2),
                _ => return Err(malformed(format!("invalid r2 value: {}", value))),
            },
        };
        result.entry(record[0].to_string()).or_insert(r2);
    }
    Ok(result)
}

/// Main entry point for `finemap` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    if !(args.pvalue >= 0.0 && args.pvalue <= 1.0) {
        anyhow::bail!("p-value must be in [0, 1], got {}", args.pvalue);
    }

    let ld = read_ld_table(open_read_maybe_gz(&args.path_ld)?, &args.path_ld)?;
    info!("read LD for {} SNPs", ld.len().separate_with_commas());

    let probs = pics(&ld, args.pvalue, args.pics_model);

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(open_write_maybe_gz(&args.path_output)?);
    for (rs_id, prob) in &probs {
        writer.serialize((rs_id, prob))?;
    }
    writer.flush()?;

    info!(
        "All of `finemap` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}
