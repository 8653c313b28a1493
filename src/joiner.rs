//! Metrics joiner: reference data (boundaries + income terciles) joined with
//! the postal-code rollup of the detections.

use std::collections::BTreeSet;

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::aggregator::rollup_postal_codes;
use crate::error::{PipelineError, Result};
use crate::normalizer::share_of_total;
use crate::schema::{detection, reference, totals};
use crate::stats::TercileEdges;

/// Tercile edges fitted on the full income reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IncomeTerciles {
    pub gross: Option<TercileEdges>,
    pub disposable: Option<TercileEdges>,
}

fn require(df: &DataFrame, columns: &[&str]) -> Result<()> {
    for c in columns {
        if df.column(c).is_err() {
            return Err(PipelineError::MissingColumn(c.to_string()));
        }
    }
    Ok(())
}

fn distinct_strings(df: &DataFrame, name: &str) -> Result<BTreeSet<String>> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .flatten()
        .map(|s| s.to_string())
        .collect())
}

fn tercile_column(df: &DataFrame, source: &str, target: &str) -> Result<(Column, Option<TercileEdges>)> {
    let values = df.column(source)?.f64()?;
    let edges = TercileEdges::fit(values.into_iter());
    let labels: Vec<Option<&str>> = values
        .into_iter()
        .map(|v| edges.and_then(|e| e.classify(v)).map(|t| t.label()))
        .collect();
    Ok((Column::new(target.into(), &labels), edges))
}

/// Add `Cat_avg_Gross_Income` / `Cat_avg_Disposable_Income`.
///
/// Edges come from the whole income table passed in, before any join, so
/// the buckets do not depend on which postal codes have detections.
#[instrument(skip_all, fields(rows = income.height()))]
pub fn assign_income_terciles(income: &DataFrame) -> Result<(DataFrame, IncomeTerciles)> {
    require(
        income,
        &[
            reference::COD_POSTAL,
            reference::AVG_GROSS_INCOME,
            reference::AVG_DISPOSABLE_INCOME,
        ],
    )?;

    let (gross_col, gross) =
        tercile_column(income, reference::AVG_GROSS_INCOME, reference::CAT_GROSS_INCOME)?;
    let (disp_col, disposable) = tercile_column(
        income,
        reference::AVG_DISPOSABLE_INCOME,
        reference::CAT_DISPOSABLE_INCOME,
    )?;

    let mut df = income.clone();
    df.with_column(gross_col)?;
    df.with_column(disp_col)?;
    debug!(?gross, ?disposable, "fitted income terciles");

    Ok((df, IncomeTerciles { gross, disposable }))
}

/// Inner join of boundaries and income on postal code. Codes missing from
/// either side cannot be mapped or correlated and are dropped.
#[instrument(skip_all)]
pub fn join_reference(geometry: &DataFrame, income: &DataFrame) -> Result<DataFrame> {
    require(geometry, &[reference::COD_POSTAL, reference::GEOMETRY])?;
    require(income, &[reference::COD_POSTAL])?;

    let geo_codes = distinct_strings(geometry, reference::COD_POSTAL)?;
    let income_codes = distinct_strings(income, reference::COD_POSTAL)?;
    let geometry_only = geo_codes.difference(&income_codes).count();
    let income_only = income_codes.difference(&geo_codes).count();
    if geometry_only > 0 || income_only > 0 {
        warn!(geometry_only, income_only, "postal codes missing from one reference source dropped");
    }

    let df = geometry
        .clone()
        .lazy()
        .select([col(reference::COD_POSTAL), col(reference::GEOMETRY)])
        .join(
            income.clone().lazy(),
            [col(reference::COD_POSTAL)],
            [col(reference::COD_POSTAL)],
            JoinArgs::new(JoinType::Inner),
        )
        .sort_by_exprs([col(reference::COD_POSTAL)], SortMultipleOptions::default())
        .collect()?;

    info!(postal_codes = df.height(), "joined reference data");
    Ok(df)
}

/// Left join of the reference table with the postal-code rollup.
///
/// Every reference row survives. Rows without detections get zero counts,
/// null shares and `has_detections = false`. Detected postal codes absent
/// from the reference are dropped and logged.
#[instrument(skip_all, fields(reference = reference_df.height(), postal = postal.height()))]
pub fn enrich(reference_df: &DataFrame, postal: &DataFrame) -> Result<DataFrame> {
    require(reference_df, &[reference::COD_POSTAL])?;
    require(postal, &[detection::POST_CODE, totals::TOTAL_BOTTLES])?;

    let known = distinct_strings(reference_df, reference::COD_POSTAL)?;
    let unmatched: Vec<String> = distinct_strings(postal, detection::POST_CODE)?
        .into_iter()
        .filter(|code| !known.contains(code))
        .collect();
    if !unmatched.is_empty() {
        warn!(count = unmatched.len(), codes = ?unmatched, "detected postal codes without reference data dropped");
    }

    let counts: Vec<String> = postal
        .get_column_names_str()
        .into_iter()
        .filter(|c| *c != detection::POST_CODE && !totals::SHARES.contains(c))
        .map(|c| c.to_string())
        .collect();

    let metrics = postal
        .clone()
        .lazy()
        .select(
            std::iter::once(col(detection::POST_CODE).alias(reference::COD_POSTAL))
                .chain(counts.iter().map(|c| col(c.as_str())))
                .collect::<Vec<_>>(),
        );

    let df = reference_df
        .clone()
        .lazy()
        .join(
            metrics,
            [col(reference::COD_POSTAL)],
            [col(reference::COD_POSTAL)],
            JoinArgs::new(JoinType::Left),
        )
        .with_columns([col(totals::TOTAL_BOTTLES)
            .is_not_null()
            .alias(reference::HAS_DETECTIONS)])
        .with_columns(
            counts
                .iter()
                .map(|c| col(c.as_str()).fill_null(lit(0i64)))
                .collect::<Vec<_>>(),
        )
        .with_columns([
            share_of_total(totals::TOTAL_DANONE).alias(totals::DANONE_SHARE),
            share_of_total(totals::TOTAL_COMPETITOR).alias(totals::COMPETITOR_SHARE),
        ])
        .sort_by_exprs([col(reference::COD_POSTAL)], SortMultipleOptions::default())
        .collect()?;

    info!(rows = df.height(), unmatched = unmatched.len(), "enriched postal metrics");
    Ok(df)
}

/// Roll shelf aggregates up to postal codes and enrich them.
pub fn enrich_shelves(reference_df: &DataFrame, shelves: &DataFrame) -> Result<DataFrame> {
    let postal = rollup_postal_codes(shelves)?;
    enrich(reference_df, &postal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{boundaries_to_frame, income_to_frame, IncomeRecord, PostalBoundary};
    use serde_json::json;

    fn income(codes_and_gross: &[(&str, f64)]) -> DataFrame {
        let records: Vec<IncomeRecord> = codes_and_gross
            .iter()
            .map(|(c, g)| IncomeRecord {
                postal_code: c.to_string(),
                average_gross_income: Some(*g),
                average_disposable_income: Some(g * 0.8),
            })
            .collect();
        income_to_frame(&records).unwrap()
    }

    fn geometry(codes: &[&str]) -> DataFrame {
        let boundaries: Vec<PostalBoundary> = codes
            .iter()
            .map(|c| PostalBoundary {
                postal_code: c.to_string(),
                geometry: json!({"type": "Polygon", "coordinates": []}),
            })
            .collect();
        boundaries_to_frame(&boundaries).unwrap()
    }

    fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|s| s.map(|s| s.to_string()))
            .collect()
    }

    #[test]
    fn terciles_cover_the_full_income_table() {
        let (df, terciles) = assign_income_terciles(&income(&[
            ("a", 10.0),
            ("b", 20.0),
            ("c", 30.0),
            ("d", 40.0),
            ("e", 50.0),
            ("f", 60.0),
        ]))
        .unwrap();
        assert!(terciles.gross.is_some());
        let cats = strings(&df, reference::CAT_GROSS_INCOME);
        assert_eq!(
            cats,
            ["Low", "Low", "Medium", "Medium", "High", "High"]
                .iter()
                .map(|s| Some(s.to_string()))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn reference_join_keeps_only_codes_on_both_sides() {
        let (inc, _) = assign_income_terciles(&income(&[("08001", 1.0), ("08002", 2.0)])).unwrap();
        let df = join_reference(&geometry(&["08002", "08003"]), &inc).unwrap();
        assert_eq!(strings(&df, reference::COD_POSTAL), vec![Some("08002".to_string())]);
        assert!(df.column(reference::GEOMETRY).is_ok());
        assert!(df.column(reference::CAT_GROSS_INCOME).is_ok());
    }

    #[test]
    fn empty_geometry_gives_empty_reference() {
        let (inc, _) = assign_income_terciles(&income(&[("08001", 1.0)])).unwrap();
        let df = join_reference(&geometry(&[]), &inc).unwrap();
        assert_eq!(df.height(), 0);
        assert!(df.column(reference::AVG_GROSS_INCOME).is_ok());
    }

    #[test]
    fn enrich_keeps_unobserved_codes_with_zero_counts() {
        let (inc, _) = assign_income_terciles(&income(&[("08001", 1.0), ("08002", 2.0)])).unwrap();
        let reference_df = join_reference(&geometry(&["08001", "08002"]), &inc).unwrap();
        let postal = DataFrame::new(vec![
            Column::new(detection::POST_CODE.into(), &["08001", "09999"]),
            Column::new("fontvella".into(), &[4i64, 1]),
            Column::new(totals::TOTAL_DANONE.into(), &[4i64, 1]),
            Column::new(totals::TOTAL_COMPETITOR.into(), &[2i64, 0]),
            Column::new(totals::TOTAL_BOTTLES.into(), &[8i64, 1]),
        ])
        .unwrap();

        let df = enrich(&reference_df, &postal).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            strings(&df, reference::COD_POSTAL),
            vec![Some("08001".to_string()), Some("08002".to_string())]
        );
        let bottles: Vec<Option<i64>> = df.column(totals::TOTAL_BOTTLES).unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(bottles, vec![Some(8), Some(0)]);
        let share: Vec<Option<f64>> = df.column(totals::DANONE_SHARE).unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(share, vec![Some(0.5), None]);
        let observed: Vec<Option<bool>> = df
            .column(reference::HAS_DETECTIONS)
            .unwrap()
            .bool()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(observed, vec![Some(true), Some(false)]);
    }
}
