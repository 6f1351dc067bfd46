/// Failure of an external collaborator (evidence source, LD service, ...).
///
/// These are recovered by the pipeline: the failing call contributes an
/// empty result and a warning is logged.
#[derive(thiserror::Error, Debug)]
pub enum AdapterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("problem reading tabular data: {0}")]
    Csv(#[from] csv::Error),
    #[error("problem decoding JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed record in {source_name} (record {record_no}): {message}")]
    Malformed {
        source_name: String,
        record_no: usize,
        message: String,
    },
    #[error("not found: {0}")]
    NotFound(String),
}

/// Problems with the configuration that are detected before running.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfError {
    #[error("unknown {kind} source: {name}")]
    UnknownSource { kind: &'static str, name: String },
    #[error("at least one population must be configured")]
    NoPopulation,
    #[error("p-value cutoff must be in (0, 1], got {0}")]
    InvalidPvalueCutoff(f64),
    #[error("r2 threshold must be in [0, 1], got {0}")]
    InvalidR2Threshold(f64),
}
