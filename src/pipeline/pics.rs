//! PICS fine-mapping: probability of each SNP in a cluster to be causal.
//!
//! See <http://pubs.broadinstitute.org/pubs/finemapping/> for the method.

use indexmap::IndexMap;
use statrs::distribution::{ContinuousCDF, Normal};

/// Smallest p-value used for computing `-log10(p)`.
const MIN_PVALUE: f64 = 1e-300;

/// Which normal distribution function enters the per-SNP probability.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PicsModel {
    /// `1 - density(m; mean, sd)`, compatible with the STOPGAP scripts.
    ///
    /// Not monotone in r²: close to r² = 1 the density exceeds 1 and the
    /// probability is floored at 0, so a SNP in near-perfect LD with the top
    /// hit can score lower than one in weaker LD.  Use `Cdf` if this matters.
    #[default]
    Density,
    /// `1 - cdf(m; mean, sd)`.
    Cdf,
}

/// Density of the normal distribution with mean `mu` and standard deviation `sd` at `x`.
pub fn normal_density(x: f64, mu: f64, sd: f64) -> f64 {
    (-((x - mu) / sd).powi(2) / 2.0).exp() / (sd * (2.0 * std::f64::consts::PI).sqrt())
}

/// Mean and standard deviation of the association signal at a SNP.
///
/// `r2` is the LD to the top hit, `None` for SNPs without LD information.
pub fn signal_distribution(r2: Option<f64>, minus_log_pvalue: f64) -> (f64, f64) {
    match r2 {
        Some(r2) => {
            let sd = (1.0 - r2.powf(3.2)).sqrt() * minus_log_pvalue.sqrt() / 2.0;
            let mean = r2 * minus_log_pvalue;
            (mean, sd)
        }
        None => (1.0 + minus_log_pvalue, 0.0),
    }
}

/// Unnormalized probability of a SNP, floored at 0.
fn raw_probability(r2: Option<f64>, minus_log_pvalue: f64, model: PicsModel) -> f64 {
    let (mean, sd) = signal_distribution(r2, minus_log_pvalue);
    if sd.is_nan() || sd <= 0.0 {
        return 1.0;
    }
    let prob = match model {
        PicsModel::Density => 1.0 - normal_density(minus_log_pvalue, mean, sd),
        PicsModel::Cdf => match Normal::new(mean, sd) {
            Ok(normal) => 1.0 - normal.cdf(minus_log_pvalue),
            Err(_) => 0.0,
        },
    };
    if prob.is_finite() {
        prob.max(0.0)
    } else {
        0.0
    }
}

/// Compute normalized PICS probabilities.
///
/// `ld` maps each SNP of the cluster to its r² with the top hit (`None` if
/// unknown) and `pvalue` is the top hit's p-value.  The returned
/// probabilities sum to 1, unless no SNP has a positive probability, in which
/// case all SNPs get probability 0.
pub fn pics(ld: &IndexMap<String, Option<f64>>, pvalue: f64, model: PicsModel) -> IndexMap<String, f64> {
    let minus_log_pvalue = -pvalue.max(MIN_PVALUE).log10();

    let probs = ld
        .iter()
        .map(|(rs_id, r2)| (rs_id.clone(), raw_probability(*r2, minus_log_pvalue, model)))
        .collect::<IndexMap<_, _>>();
    let sum: f64 = probs.values().sum();

    if sum > 0.0 && sum.is_finite() {
        probs
            .into_iter()
            .map(|(rs_id, prob)| (rs_id, prob / sum))
            .collect()
    } else {
        tracing::debug!("PICS probabilities sum to {}, no fine-mapping signal", sum);
        probs.into_keys().map(|rs_id| (rs_id, 0.0)).collect()
    }
}
