//! gwas2genes main executable

pub mod common;
pub mod conf;
pub mod err;
pub mod finemap;
pub mod pipeline;
pub mod rank;
pub mod sources;

use clap::{Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Prioritize candidate genes from GWAS hits",
    long_about = "This tool combines GWAS hits, LD structure, fine-mapping and \
                  regulatory evidence to rank candidate causal genes for diseases"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Rank candidate genes for diseases and EFO ids.
    Rank(rank::Args),
    /// Compute PICS probabilities for a user-provided LD block.
    Finemap(finemap::Args),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector globally so that rayon workers log as well, then go into sub commands.
    tracing::subscriber::set_global_default(collector)?;
    let term = Term::stderr();
    match &cli.command {
        Commands::Rank(args) => rank::run(&cli.common, args)?,
        Commands::Finemap(args) => finemap::run(&cli.common, args)?,
    }
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
