//! Postal aggregator: group normalized rows and sum their counts.
//!
//! Shares are ratios and are never summed or averaged here; after every
//! grouping they are re-derived from the summed totals.

use polars::prelude::*;
use tracing::{debug, info, instrument};

use crate::error::{PipelineError, Result};
use crate::normalizer::share_of_total;
use crate::schema::{detection, totals};

/// One row per `(post_code, store_type, store_name, shelf_id)`.
#[instrument(skip_all, fields(rows = normalized.height()))]
pub fn aggregate_shelves(normalized: &DataFrame) -> Result<DataFrame> {
    let df = group_and_sum(normalized, &detection::GROUP_KEY)?;
    info!(groups = df.height(), "aggregated shelves");
    Ok(df)
}

/// One row per postal code, used for the reference join.
#[instrument(skip_all, fields(rows = df.height()))]
pub fn rollup_postal_codes(df: &DataFrame) -> Result<DataFrame> {
    let out = group_and_sum(df, &[detection::POST_CODE])?;
    debug!(postal_codes = out.height(), "rolled up postal codes");
    Ok(out)
}

/// Columns summed when grouping: everything except key columns, the photo
/// type and the share ratios.
fn summed_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names_str()
        .into_iter()
        .filter(|c| {
            !detection::GROUP_KEY.contains(c)
                && !totals::SHARES.contains(c)
                && *c != detection::PHOTO_TYPE
        })
        .map(|c| c.to_string())
        .collect()
}

fn group_and_sum(df: &DataFrame, keys: &[&str]) -> Result<DataFrame> {
    for required in keys
        .iter()
        .chain([totals::TOTAL_DANONE, totals::TOTAL_COMPETITOR, totals::TOTAL_BOTTLES].iter())
    {
        if df.column(required).is_err() {
            return Err(PipelineError::MissingColumn(required.to_string()));
        }
    }

    let aggs: Vec<Expr> = summed_columns(df)
        .iter()
        .map(|c| col(c.as_str()).sum())
        .collect();
    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();

    let out = df
        .clone()
        .lazy()
        .group_by(key_exprs.clone())
        .agg(aggs)
        .with_columns([
            share_of_total(totals::TOTAL_DANONE).alias(totals::DANONE_SHARE),
            share_of_total(totals::TOTAL_COMPETITOR).alias(totals::COMPETITOR_SHARE),
        ])
        .sort_by_exprs(key_exprs, SortMultipleOptions::default())
        .collect()?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{BrandCategory, BrandClassification};
    use crate::normalizer::{normalize, DetectionRecord, PhotoType};

    fn labels() -> BrandClassification {
        BrandClassification::new([
            ("fontvella", BrandCategory::Danone),
            ("evian", BrandCategory::Competitor),
        ])
    }

    fn shelf(post_code: &str, shelf_id: &str, fontvella: u64, evian: u64, reported: u64) -> DetectionRecord {
        DetectionRecord {
            post_code: post_code.into(),
            store_type: "super".into(),
            store_name: "X".into(),
            shelf_id: shelf_id.into(),
            photo_type: PhotoType::Prod,
            brand_counts: [("fontvella".to_string(), fontvella), ("evian".to_string(), evian)]
                .into_iter()
                .collect(),
            num_bottles_reported: reported,
        }
    }

    fn i64_col(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
        df.column(name).unwrap().i64().unwrap().into_iter().collect()
    }

    #[test]
    fn sums_records_sharing_a_shelf_key() {
        let records = vec![shelf("08001", "1", 3, 2, 5), shelf("08001", "1", 1, 0, 2)];
        let normalized = normalize(&records, &labels()).unwrap();
        let df = aggregate_shelves(&normalized).unwrap();

        assert_eq!(df.height(), 1);
        assert_eq!(i64_col(&df, totals::TOTAL_DANONE), vec![Some(4)]);
        assert_eq!(i64_col(&df, totals::TOTAL_COMPETITOR), vec![Some(2)]);
        // per-record maxima are summed: max(5,5) + max(1,2)
        assert_eq!(i64_col(&df, totals::TOTAL_BOTTLES), vec![Some(7)]);
        assert_eq!(i64_col(&df, "fontvella"), vec![Some(4)]);

        let share = df.column(totals::DANONE_SHARE).unwrap().f64().unwrap().get(0).unwrap();
        assert!((share - 4.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn distinct_shelves_stay_separate_and_sorted() {
        let records = vec![shelf("08002", "1", 1, 1, 0), shelf("08001", "2", 1, 0, 0), shelf("08001", "1", 0, 1, 0)];
        let normalized = normalize(&records, &labels()).unwrap();
        let df = aggregate_shelves(&normalized).unwrap();

        assert_eq!(df.height(), 3);
        let keys: Vec<(String, String)> = df
            .column(detection::POST_CODE)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .zip(df.column(detection::SHELF_ID).unwrap().str().unwrap().into_iter())
            .map(|(p, s)| (p.unwrap().to_string(), s.unwrap().to_string()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("08001".to_string(), "1".to_string()),
                ("08001".to_string(), "2".to_string()),
                ("08002".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn postal_rollup_uses_ratio_of_sums() {
        let records = vec![shelf("08001", "1", 1, 0, 1), shelf("08001", "2", 0, 9, 9)];
        let normalized = normalize(&records, &labels()).unwrap();
        let shelves = aggregate_shelves(&normalized).unwrap();
        let postal = rollup_postal_codes(&shelves).unwrap();

        assert_eq!(postal.height(), 1);
        assert!(postal.column(detection::STORE_NAME).is_err());
        let share = postal.column(totals::DANONE_SHARE).unwrap().f64().unwrap().get(0).unwrap();
        // mean of shares would be 0.5
        assert!((share - 0.1).abs() < 1e-12);
    }

    #[test]
    fn empty_input_aggregates_to_empty() {
        let normalized = normalize(&[], &labels()).unwrap();
        let df = aggregate_shelves(&normalized).unwrap();
        assert_eq!(df.height(), 0);
        assert!(df.column(totals::DANONE_SHARE).is_ok());
    }

    #[test]
    fn missing_key_column_is_reported() {
        let df = DataFrame::new(vec![Column::new("x".into(), &[1i64])]).unwrap();
        let err = aggregate_shelves(&df).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(c) if c == detection::POST_CODE));
    }
}
