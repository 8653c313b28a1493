//! Loaders for the static reference data (income statistics, postal-code
//! boundaries) and for the raw detection documents.
//!
//! Every loader returns a frame in the canonical column layout from
//! [`crate::schema::reference`], so the joiner never sees source-specific
//! column names.

use std::path::Path;

use polars::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::IncomeSource;
use crate::error::{PipelineError, Result};
use crate::schema::reference;

/// Income statistics of one postal code.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomeRecord {
    pub postal_code: String,
    pub average_gross_income: Option<f64>,
    pub average_disposable_income: Option<f64>,
}

/// Boundary polygon of one postal code, kept as GeoJSON.
#[derive(Debug, Clone, PartialEq)]
pub struct PostalBoundary {
    pub postal_code: String,
    pub geometry: Value,
}

pub fn income_to_frame(records: &[IncomeRecord]) -> Result<DataFrame> {
    let codes: Vec<String> = records.iter().map(|r| r.postal_code.clone()).collect();
    let gross: Vec<Option<f64>> = records.iter().map(|r| r.average_gross_income).collect();
    let disposable: Vec<Option<f64>> = records
        .iter()
        .map(|r| r.average_disposable_income)
        .collect();

    Ok(DataFrame::new(vec![
        Column::new(reference::COD_POSTAL.into(), &codes),
        Column::new(reference::AVG_GROSS_INCOME.into(), &gross),
        Column::new(reference::AVG_DISPOSABLE_INCOME.into(), &disposable),
    ])?)
}

pub fn boundaries_to_frame(boundaries: &[PostalBoundary]) -> Result<DataFrame> {
    let codes: Vec<String> = boundaries.iter().map(|b| b.postal_code.clone()).collect();
    let geometry: Vec<String> = boundaries
        .iter()
        .map(|b| b.geometry.to_string())
        .collect();

    Ok(DataFrame::new(vec![
        Column::new(reference::COD_POSTAL.into(), &codes),
        Column::new(reference::GEOMETRY.into(), &geometry),
    ])?)
}

// ── Income CSV ──────────────────────────────────────────────────────────────

/// Parse a locale-formatted number. With a `,` decimal mark every `.` is a
/// thousands separator (`"12.345,67"`, `"15.000"`); with `.` every `,` is.
pub fn parse_decimal(raw: &str, decimal_mark: char) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let thousands = if decimal_mark == ',' { '.' } else { ',' };
    let normalized: String = s
        .chars()
        .filter(|c| *c != thousands)
        .map(|c| if c == decimal_mark { '.' } else { c })
        .collect();
    normalized.parse::<f64>().ok()
}

/// Read a CSV file with all columns as String dtype and trimmed column names.
fn read_csv_as_strings(path: &Path, separator: u8) -> Result<DataFrame> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .map_parse_options(|opts| opts.with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;
    Ok(df)
}

/// Cast an income column to Float64; string columns go through
/// [`parse_decimal`], unparsable cells become null.
fn income_column_to_f64(df: &mut DataFrame, name: &str, decimal_mark: char) -> Result<()> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::MissingColumn(name.to_string()))?;

    let parsed: Series = if column.dtype() == &DataType::String {
        let values: Float64Chunked = column
            .str()?
            .into_iter()
            .map(|v| v.and_then(|raw| parse_decimal(raw, decimal_mark)))
            .collect();
        values.with_name(name.into()).into_series()
    } else {
        column
            .as_materialized_series()
            .cast(&DataType::Float64)?
    };

    df.with_column(parsed)?;
    Ok(())
}

/// Bring a raw income table into the canonical layout:
/// `COD_POSTAL` (trimmed string), gross and disposable income (Float64).
/// Other columns are dropped.
pub fn prepare_income(raw: DataFrame, source: &IncomeSource) -> Result<DataFrame> {
    let wanted = [
        (source.postal_code_column.as_str(), reference::COD_POSTAL),
        (source.gross_income_column.as_str(), reference::AVG_GROSS_INCOME),
        (
            source.disposable_income_column.as_str(),
            reference::AVG_DISPOSABLE_INCOME,
        ),
    ];
    for (name, _) in &wanted {
        if raw.column(name).is_err() {
            return Err(PipelineError::MissingColumn(name.to_string()));
        }
    }

    let mut df = raw
        .lazy()
        .select(
            wanted
                .iter()
                .map(|(from, to)| col(*from).alias(*to))
                .collect::<Vec<_>>(),
        )
        .with_columns([col(reference::COD_POSTAL)
            .cast(DataType::String)
            .str()
            .strip_chars(lit(" \t\r\n"))])
        .collect()?;

    let decimal_mark = source.decimal_mark()?;
    income_column_to_f64(&mut df, reference::AVG_GROSS_INCOME, decimal_mark)?;
    income_column_to_f64(&mut df, reference::AVG_DISPOSABLE_INCOME, decimal_mark)?;
    Ok(df)
}

pub fn load_income_csv(path: &Path, source: &IncomeSource) -> Result<DataFrame> {
    let raw = read_csv_as_strings(path, source.separator_byte()?)?;
    let df = prepare_income(raw, source)?;
    info!(path = %path.display(), rows = df.height(), "loaded income reference");
    Ok(df)
}

// ── GeoJSON ─────────────────────────────────────────────────────────────────

/// Parse a GeoJSON FeatureCollection into postal-code boundaries.
///
/// Features lacking the postal-code property are skipped.
pub fn boundaries_from_geojson(text: &str, postal_code_property: &str) -> Result<Vec<PostalBoundary>> {
    let doc: Value = serde_json::from_str(text)?;
    let features = doc
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::InvalidData("GeoJSON has no `features` array".into()))?;

    let mut out = Vec::with_capacity(features.len());
    let mut skipped = 0usize;
    for feature in features {
        let code = match feature
            .get("properties")
            .and_then(|p| p.get(postal_code_property))
        {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                skipped += 1;
                continue;
            }
        };
        out.push(PostalBoundary {
            postal_code: code,
            geometry: feature.get("geometry").cloned().unwrap_or(Value::Null),
        });
    }

    if skipped > 0 {
        warn!(skipped, property = postal_code_property, "features without postal code skipped");
    }
    Ok(out)
}

pub fn load_geojson(path: &Path, postal_code_property: &str) -> Result<DataFrame> {
    let text = std::fs::read_to_string(path)?;
    let boundaries = boundaries_from_geojson(&text, postal_code_property)?;
    info!(path = %path.display(), features = boundaries.len(), "loaded postal boundaries");
    boundaries_to_frame(&boundaries)
}

// ── Detection documents ─────────────────────────────────────────────────────

/// Parse raw detection documents: either a JSON array of documents or an
/// object keyed by document id (collection export).
pub fn documents_from_json(text: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(docs) => Ok(docs),
        Value::Object(map) => Ok(map.into_iter().map(|(_, doc)| doc).collect()),
        _ => Err(PipelineError::InvalidData(
            "detections must be a JSON array or object".into(),
        )),
    }
}

pub fn load_documents(path: &Path) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)?;
    let docs = documents_from_json(&text)?;
    debug!(path = %path.display(), documents = docs.len(), "loaded detection documents");
    Ok(docs)
}
