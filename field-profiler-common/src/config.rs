use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Switches for the optional statistic groups. A disabled group is skipped
/// during accumulation, not just hidden from the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisGroups {
    #[serde(default = "enabled")]
    pub distribution_shape: bool, // skewness, kurtosis, normality
    #[serde(default = "enabled")]
    pub outliers: bool,
    #[serde(default = "enabled")]
    pub text_case_and_nonprintable: bool,
    #[serde(default = "enabled")]
    pub date_time_and_weekend: bool,
    #[serde(default = "enabled")]
    pub correlation: bool,
}

fn enabled() -> bool {
    true
}

impl Default for AnalysisGroups {
    fn default() -> Self {
        Self {
            distribution_shape: true,
            outliers: true,
            text_case_and_nonprintable: true,
            date_time_and_weekend: true,
            correlation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingConfig {
    /// Non-null values inspected per field when the declared kind is unknown.
    #[serde(default = "default_classification_sample")]
    pub classification_sample_size: usize,
    /// Upper bound on records buffered while collecting classification samples.
    #[serde(default = "default_classification_scan_limit")]
    pub classification_scan_limit: usize,
    /// Entries reported in each top-values table.
    #[serde(default = "default_unique_cap")]
    pub unique_retention_cap: usize,
    /// Distinct values counted exactly before the summarizer stops admitting new keys.
    #[serde(default = "default_unique_tracking_limit")]
    pub unique_tracking_limit: usize,
    /// Valid numeric values retained for exact quantiles; above it a t-digest takes over.
    #[serde(default = "default_exact_quantile_threshold")]
    pub exact_quantile_threshold: usize,
    #[serde(default = "default_bins")]
    pub histogram_bins: usize,
    /// Record ids kept per issue list (conversion errors, non-printable text).
    #[serde(default = "default_issue_id_cap")]
    pub issue_id_cap: usize,
    #[serde(default = "default_normality_alpha")]
    pub normality_alpha: f64,
    /// chrono format strings tried in order; the first match wins.
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
    #[serde(default)]
    pub groups: AnalysisGroups,
}

fn default_classification_sample() -> usize {
    1000
}
fn default_classification_scan_limit() -> usize {
    10_000
}
fn default_unique_cap() -> usize {
    50
}
fn default_unique_tracking_limit() -> usize {
    100_000
}
fn default_exact_quantile_threshold() -> usize {
    1_000_000
}
fn default_bins() -> usize {
    30
}
fn default_issue_id_cap() -> usize {
    1000
}
fn default_normality_alpha() -> f64 {
    0.05
}
fn default_date_formats() -> Vec<String> {
    [
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d",
        "%d.%m.%Y",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            classification_sample_size: default_classification_sample(),
            classification_scan_limit: default_classification_scan_limit(),
            unique_retention_cap: default_unique_cap(),
            unique_tracking_limit: default_unique_tracking_limit(),
            exact_quantile_threshold: default_exact_quantile_threshold(),
            histogram_bins: default_bins(),
            issue_id_cap: default_issue_id_cap(),
            normality_alpha: default_normality_alpha(),
            date_formats: default_date_formats(),
            groups: AnalysisGroups::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_format() -> String {
    "json".into()
}
fn default_output_dir() -> String {
    ".".into()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub profiling: ProfilingConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("field-profiler")
            .join("config.toml")
    }

    pub fn load() -> crate::Result<Self> {
        let path = if let Ok(env_path) = std::env::var("FIELD_PROFILER_CONFIG") {
            PathBuf::from(env_path) // $FIELD_PROFILER_CONFIG overrides default config path
        } else {
            Self::config_path()
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let cfg: Self =
            toml::from_str(&content).map_err(|e| crate::FieldProfilerError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self) -> crate::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::FieldProfilerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> crate::Result<()> {
        let p = &self.profiling;
        if p.unique_retention_cap == 0 {
            return Err(crate::FieldProfilerError::Config(
                "unique_retention_cap must be at least 1".into(),
            ));
        }
        if p.unique_tracking_limit < p.unique_retention_cap {
            return Err(crate::FieldProfilerError::Config(format!(
                "unique_tracking_limit ({}) must not be below unique_retention_cap ({})",
                p.unique_tracking_limit, p.unique_retention_cap
            )));
        }
        if !(0.0..1.0).contains(&p.normality_alpha) {
            return Err(crate::FieldProfilerError::Config(format!(
                "normality_alpha must be in [0, 1), got {}",
                p.normality_alpha
            )));
        }
        Ok(())
    }
}
