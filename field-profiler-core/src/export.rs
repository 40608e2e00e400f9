use field_profiler_common::{FieldProfilerError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::profile::correlation::CorrelationMatrix;
use crate::profile::metric::Metric;
use crate::report::{DatasetProfile, FamilyStats, FieldProfileReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Html => "html",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = FieldProfilerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "html" | "htm" => Ok(ExportFormat::Html),
            other => Err(FieldProfilerError::Config(format!(
                "unknown export format '{other}' (expected json, csv or html)"
            ))),
        }
    }
}

/// Writes `<dir>/<stem>.<ext>` and returns the path written.
pub fn export(profile: &DatasetProfile, format: ExportFormat, dir: &Path, stem: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{stem}.{}", format.extension()));
    let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
    match format {
        ExportFormat::Json => write_json(&mut file, profile)?,
        ExportFormat::Csv => write_csv(&mut file, profile)?,
        ExportFormat::Html => write_html(&mut file, profile)?,
    }
    file.flush()?;
    Ok(path)
}

// headless summary, one block per field
pub fn print_summary(profile: &DatasetProfile) {
    println!("{:<24} {}", "Records profiled:", profile.records_profiled);
    println!("{:<24} {}", "Fields:", profile.fields.len());
    for report in &profile.fields {
        println!();
        println!("{:<24} {}", "Field:", report.field_name);
        for (label, value) in report.summary_rows() {
            println!("  {:<22} {}", format!("{label}:"), value);
        }
    }
    for outcome in &profile.validation {
        println!();
        println!("{:<24} {}", "Rule:", outcome.rule);
        println!("  {:<22} {} of {}", "failures:", outcome.fail_count, outcome.total_checked);
    }
}

pub fn write_json<W: Write>(w: &mut W, profile: &DatasetProfile) -> Result<()> {
    serde_json::to_writer_pretty(&mut *w, profile).map_err(|e| FieldProfilerError::Other(e.to_string()))?;
    writeln!(w)?;
    Ok(())
}

const CSV_HEADER: &str = "field_name,family,total,valid,null,empty,conversion_errors,null_percentage,\
distinct,distinct_exact,mean,std_dev,min,median,max,min_length,max_length,type_hint";

fn csv_escape(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn cell(m: &Metric<f64>) -> String {
    m.as_option().map_or("-".into(), |v| format!("{v:.6}"))
}

/// One flat row per field.
pub fn write_csv<W: Write>(w: &mut W, profile: &DatasetProfile) -> Result<()> {
    writeln!(w, "{CSV_HEADER}")?;
    for r in &profile.fields {
        let dash = || "-".to_string();
        let (mean, std_dev, min, median, max, min_len, max_len) = match &r.stats {
            FamilyStats::Numeric(s) => (
                cell(&s.mean),
                cell(&s.std_dev),
                cell(&s.min),
                cell(&s.percentiles.median),
                cell(&s.max),
                dash(),
                dash(),
            ),
            FamilyStats::Text(s) => (
                cell(&s.mean_length),
                cell(&s.std_dev_length),
                dash(),
                dash(),
                dash(),
                s.min_length.as_option().map_or_else(dash, |v| v.to_string()),
                s.max_length.as_option().map_or_else(dash, |v| v.to_string()),
            ),
            FamilyStats::Date(s) => (
                dash(),
                dash(),
                s.min.as_option().map_or_else(dash, |v| v.to_string()),
                dash(),
                s.max.as_option().map_or_else(dash, |v| v.to_string()),
                dash(),
                dash(),
            ),
        };
        let unique = r.unique();
        writeln!(
            w,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            csv_escape(&r.field_name),
            r.family,
            r.total_count,
            r.valid_count,
            r.null_count,
            r.empty_count,
            r.conversion_error_count,
            r.null_percentage.as_option().map_or("-".into(), |v| format!("{v:.4}")),
            unique.distinct_count,
            unique.distinct_exact,
            mean,
            std_dev,
            min,
            median,
            max,
            min_len,
            max_len,
            csv_escape(r.type_hint.as_deref().unwrap_or("")),
        )?;
    }
    Ok(())
}

fn html_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Background for a coefficient: red for negative, blue for positive.
fn heat_color(r: f64) -> String {
    let a = r.abs().clamp(0.0, 1.0);
    let fade = (255.0 * (1.0 - a)).round() as u8;
    if r < 0.0 {
        format!("rgb(255,{fade},{fade})")
    } else {
        format!("rgb({fade},{fade},255)")
    }
}

fn write_field_html<W: Write>(w: &mut W, report: &FieldProfileReport) -> Result<()> {
    writeln!(w, "<section><h2>{}</h2>", html_escape(&report.field_name))?;
    writeln!(w, "<table class=\"stats\">")?;
    for (label, value) in report.summary_rows() {
        writeln!(w, "<tr><th>{}</th><td>{}</td></tr>", html_escape(&label), html_escape(&value))?;
    }
    writeln!(w, "</table>")?;
    let top = &report.unique().top_values;
    if !top.is_empty() {
        writeln!(w, "<table class=\"top\"><tr><th>value</th><th>count</th><th>%</th></tr>")?;
        for e in top {
            writeln!(
                w,
                "<tr><td>{}</td><td>{}</td><td>{:.2}</td></tr>",
                html_escape(&e.value),
                e.count,
                e.percentage
            )?;
        }
        writeln!(w, "</table>")?;
    }
    writeln!(w, "</section>")?;
    Ok(())
}

fn write_heatmap<W: Write>(w: &mut W, matrix: &CorrelationMatrix) -> Result<()> {
    writeln!(w, "<section><h2>Correlation</h2><table class=\"heat\"><tr><th></th>")?;
    for f in &matrix.fields {
        write!(w, "<th>{}</th>", html_escape(f))?;
    }
    writeln!(w, "</tr>")?;
    for (i, row) in matrix.coefficients.iter().enumerate() {
        write!(w, "<tr><th>{}</th>", html_escape(&matrix.fields[i]))?;
        for c in row {
            match c {
                Metric::Value(r) => write!(w, "<td style=\"background:{}\">{r:.3}</td>", heat_color(*r))?,
                other => write!(w, "<td>{}</td>", other.display())?,
            }
        }
        writeln!(w, "</tr>")?;
    }
    writeln!(w, "</table></section>")?;
    Ok(())
}

/// Standalone HTML page: one statistics table per field plus the correlation heat-map.
pub fn write_html<W: Write>(w: &mut W, profile: &DatasetProfile) -> Result<()> {
    writeln!(w, "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Field profile</title>")?;
    writeln!(
        w,
        "<style>body{{font-family:sans-serif}}table{{border-collapse:collapse;margin:8px 0}}\
th,td{{border:1px solid #ccc;padding:2px 8px;text-align:left}}</style></head><body>"
    )?;
    writeln!(
        w,
        "<h1>Field profile</h1><p>{} records profiled, reference date {}</p>",
        profile.records_profiled, profile.reference_date
    )?;
    for report in &profile.fields {
        write_field_html(w, report)?;
    }
    if let Some(matrix) = &profile.correlation {
        write_heatmap(w, matrix)?;
    }
    if !profile.validation.is_empty() {
        writeln!(w, "<section><h2>Validation</h2><table><tr><th>rule</th><th>failures</th><th>checked</th></tr>")?;
        for o in &profile.validation {
            writeln!(
                w,
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                html_escape(&o.rule),
                o.fail_count,
                o.total_checked
            )?;
        }
        writeln!(w, "</table></section>")?;
    }
    writeln!(w, "</body></html>")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::full_scan::Profiler;
    use crate::record::{DeclaredKind, FieldSpec, MemorySource, RawValue};
    use field_profiler_common::ProfilingConfig;

    #[test]
    fn csv_escape_quotes_separators_and_line_breaks() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("two\nlines"), "\"two\nlines\"");
        assert_eq!(csv_escape("bare\rreturn"), "\"bare\rreturn\"");
    }

    fn profile() -> DatasetProfile {
        let mut src = MemorySource::new(vec![
            FieldSpec::new("x", DeclaredKind::Numeric),
            FieldSpec::new("y", DeclaredKind::Numeric),
            FieldSpec::new("label, \"quoted\"", DeclaredKind::Text),
        ]);
        for i in 0..10i64 {
            src.push(vec![i.into(), (i * 2).into(), format!("<b>{i}</b>").into()]);
        }
        src.push(vec![RawValue::Null, 1.into(), "".into()]);
        Profiler::new(&ProfilingConfig::default())
            .run(&src)
            .unwrap()
            .completed()
            .unwrap()
    }

    #[test]
    fn json_round_trips() {
        let p = profile();
        let mut buf = Vec::new();
        write_json(&mut buf, &p).unwrap();
        let back: DatasetProfile = serde_json::from_slice(&buf).unwrap();
        assert_eq!(back.fields.len(), 3);
        assert_eq!(back.fields[0].null_count, 1);
    }

    #[test]
    fn csv_has_row_per_field_and_escapes() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &profile()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("field_name,family,total"));
        assert!(lines[1].starts_with("x,numeric,11,10,1,0,0,"));
        assert!(lines[3].starts_with("\"label, \"\"quoted\"\"\",text,"));
    }

    #[test]
    fn html_escapes_values_and_renders_heatmap() {
        let mut buf = Vec::new();
        write_html(&mut buf, &profile()).unwrap();
        let html = String::from_utf8(buf).unwrap();
        assert!(html.contains("&lt;b&gt;"));
        assert!(!html.contains("<b>0</b>"));
        assert!(html.contains("Correlation"));
        assert!(html.contains("1.000"));
    }

    #[test]
    fn export_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = export(&profile(), "csv".parse().unwrap(), dir.path(), "run").unwrap();
        assert_eq!(path, dir.path().join("run.csv"));
        assert!(std::fs::read_to_string(path).unwrap().starts_with("field_name"));
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn heat_colors_scale_with_magnitude() {
        assert_eq!(heat_color(1.0), "rgb(0,0,255)");
        assert_eq!(heat_color(-1.0), "rgb(255,0,0)");
        assert_eq!(heat_color(0.0), "rgb(255,255,255)");
    }
}
