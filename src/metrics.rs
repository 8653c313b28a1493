//! Derived dashboard metrics: market-share summary, income correlations,
//! brand shares and the per-postal-code divergence table.
//!
//! Shares are fractions in `[0, 1]`. Scaling to percentages and rounding
//! are left to the view layer.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::classification::{BrandCategory, BrandClassification};
use crate::error::{PipelineError, Result};
use crate::schema::{brand_share, correlation, detection, divergence, reference, totals};
use crate::stats::{mean_defined, pearson};

/// Mean shelf shares across observed rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarketShareSummary {
    pub danone: f64,
    pub competitor: f64,
    /// Unclassified remainder, clamped at zero.
    pub other: f64,
}

fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::MissingColumn(name.to_string()))?
        .cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

fn i64_sum(df: &DataFrame, name: &str) -> Result<i64> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::MissingColumn(name.to_string()))?
        .cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().flatten().sum::<i64>())
}

/// Row-level mean of `danone_share` and `competitor_share`.
///
/// This is a mean of ratios, not a pooled ratio. Rows with no bottles have
/// undefined shares and are left out of the means.
#[instrument(skip_all, fields(rows = df.height()))]
pub fn market_share_summary(df: &DataFrame) -> Result<MarketShareSummary> {
    let danone = mean_defined(f64_values(df, totals::DANONE_SHARE)?);
    let competitor = mean_defined(f64_values(df, totals::COMPETITOR_SHARE)?);
    let other = if danone.is_nan() || competitor.is_nan() {
        f64::NAN
    } else {
        (1.0 - danone - competitor).max(0.0)
    };
    debug!(danone, competitor, other, "market share summary");
    Ok(MarketShareSummary {
        danone,
        competitor,
        other,
    })
}

/// Pearson correlation of each variable with `Average Gross Income`.
///
/// Variables are the requested brands present in `enriched`, followed by
/// the two category totals. Only rows with detections take part. A
/// variable with zero variance gets NaN.
#[instrument(skip_all, fields(rows = enriched.height()))]
pub fn income_correlations(enriched: &DataFrame, brands: &[String]) -> Result<DataFrame> {
    let observed = enriched
        .clone()
        .lazy()
        .filter(col(reference::HAS_DETECTIONS))
        .collect()?;
    let income = f64_values(&observed, reference::AVG_GROSS_INCOME)?;

    let variables: Vec<&str> = brands
        .iter()
        .map(|b| b.as_str())
        .filter(|b| observed.column(b).is_ok())
        .chain([totals::TOTAL_DANONE, totals::TOTAL_COMPETITOR])
        .collect();

    let mut coefficients = Vec::with_capacity(variables.len());
    for var in &variables {
        let values = f64_values(&observed, var)?;
        coefficients.push(pearson(income.iter().copied().zip(values)));
    }

    Ok(DataFrame::new(vec![
        Column::new(correlation::VARIABLE.into(), &variables),
        Column::new(correlation::CORRELATION.into(), &coefficients),
    ])?)
}

/// Each brand's count as a fraction of all bottles on all shelves, with
/// its category. Sorted by share (highest first), then brand name.
#[instrument(skip_all, fields(rows = shelves.height()))]
pub fn brand_share_table(
    shelves: &DataFrame,
    brands: &[String],
    classification: &BrandClassification,
) -> Result<DataFrame> {
    let total = i64_sum(shelves, totals::TOTAL_BOTTLES)?;

    let mut rows: Vec<(String, f64, &'static str)> = Vec::new();
    for brand in brands {
        if shelves.column(brand).is_err() {
            continue;
        }
        let count = i64_sum(shelves, brand)?;
        let share = if total > 0 {
            count as f64 / total as f64
        } else {
            f64::NAN
        };
        rows.push((brand.clone(), share, classification.category(brand).label()));
    }

    rows.sort_by(|a, b| match (a.1.is_nan(), b.1.is_nan()) {
        (false, false) => b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => a.0.cmp(&b.0),
    });

    let products: Vec<&str> = rows.iter().map(|r| r.0.as_str()).collect();
    let shares: Vec<f64> = rows.iter().map(|r| r.1).collect();
    let categories: Vec<&str> = rows.iter().map(|r| r.2).collect();

    Ok(DataFrame::new(vec![
        Column::new(brand_share::PRODUCT.into(), &products),
        Column::new(brand_share::SHARE.into(), &shares),
        Column::new(brand_share::CATEGORY.into(), &categories),
    ])?)
}

/// Brand counts of one postal code for a diverging bar chart: Danone
/// brands positive, competitor brands negated. Unclassified brands are
/// left out. Danone rows come first, each group in brand order.
pub fn divergence_table(
    shelves: &DataFrame,
    post_code: &str,
    classification: &BrandClassification,
) -> Result<DataFrame> {
    let rows = shelves
        .clone()
        .lazy()
        .filter(col(detection::POST_CODE).eq(lit(post_code)))
        .collect()?;

    let mut brands = Vec::new();
    let mut values = Vec::new();
    let mut categories = Vec::new();
    for cat in [BrandCategory::Danone, BrandCategory::Competitor] {
        for brand in classification.brands_in(cat) {
            if rows.column(brand).is_err() {
                continue;
            }
            let count = i64_sum(&rows, brand)?;
            brands.push(brand.to_string());
            values.push(if cat == BrandCategory::Competitor {
                -count
            } else {
                count
            });
            categories.push(cat.label());
        }
    }

    Ok(DataFrame::new(vec![
        Column::new(divergence::BRAND.into(), &brands),
        Column::new(divergence::VALUE.into(), &values),
        Column::new(divergence::CATEGORY.into(), &categories),
    ])?)
}

/// Distinct postal codes with detections, sorted.
pub fn postal_codes(shelves: &DataFrame) -> Result<Vec<String>> {
    let codes: BTreeSet<String> = shelves
        .column(detection::POST_CODE)
        .map_err(|_| PipelineError::MissingColumn(detection::POST_CODE.to_string()))?
        .str()?
        .into_iter()
        .flatten()
        .map(|s| s.to_string())
        .collect();
    Ok(codes.into_iter().collect())
}
