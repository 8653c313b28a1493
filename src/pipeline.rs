use polars::prelude::*;
use serde_json::Value;
use tracing::{info, instrument};

use crate::aggregator::aggregate_shelves;
use crate::context::SessionContext;
use crate::error::Result;
use crate::joiner::enrich_shelves;
use crate::metrics::{
    brand_share_table, income_correlations, market_share_summary, postal_codes,
    MarketShareSummary,
};
use crate::normalizer::{normalize, records_from_documents, DetectionRecord};

/// Everything the presentation layer reads.
#[derive(Debug, Clone)]
pub struct DashboardData {
    /// One row per `(post_code, store_type, store_name, shelf_id)`.
    pub shelves: DataFrame,
    /// One row per reference postal code.
    pub enriched: DataFrame,
    pub summary: MarketShareSummary,
    pub correlations: DataFrame,
    pub brand_shares: DataFrame,
    /// Postal codes that have detections, sorted.
    pub postal_codes: Vec<String>,
}

/// Normalize, aggregate, join and derive the dashboard metrics.
///
/// Pure over its inputs: the same context and records always give the same
/// tables.
#[instrument(skip_all, fields(records = records.len()))]
pub fn run(ctx: &SessionContext, records: &[DetectionRecord]) -> Result<DashboardData> {
    let normalized = normalize(records, ctx.classification())?;
    let shelves = aggregate_shelves(&normalized)?;
    let enriched = enrich_shelves(ctx.reference(), &shelves)?;

    let summary = market_share_summary(&shelves)?;
    let correlations = income_correlations(&enriched, ctx.brands())?;
    let brand_shares = brand_share_table(&shelves, ctx.brands(), ctx.classification())?;
    let postal_codes = postal_codes(&shelves)?;

    info!(
        shelves = shelves.height(),
        enriched = enriched.height(),
        postal_codes = postal_codes.len(),
        "pipeline finished"
    );

    Ok(DashboardData {
        shelves,
        enriched,
        summary,
        correlations,
        brand_shares,
        postal_codes,
    })
}

/// [`run`] over raw documents.
pub fn run_documents(ctx: &SessionContext, docs: &[Value]) -> Result<DashboardData> {
    let records = records_from_documents(docs, ctx.classification());
    run(ctx, &records)
}
