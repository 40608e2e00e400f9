pub mod config;
pub use config::{AnalysisGroups, Config, ExportConfig, ProfilingConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FieldProfilerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Config error: {0}")]
    Config(String),
    #[error("field '{0}' not found")]
    FieldNotFound(String),
    #[error("invalid criterion: {0}")]
    InvalidCriterion(String),
    #[error("rule error: {0}")]
    Rule(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FieldProfilerError>;
