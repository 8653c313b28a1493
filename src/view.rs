//! View module: turns a UI selection into a render request.
//!
//! The presentation layer owns page layout and drawing. This module only
//! extracts the chart data from the pipeline tables and serializes it to
//! JSON, so tab switching stays a pure function of `(data, selection)`.
use std::str::FromStr;

use polars::prelude::*;
use serde::Serialize;
use serde_json::Value;

use crate::context::SessionContext;
use crate::error::{PipelineError, Result};
use crate::metrics::divergence_table;
use crate::normalizer::brand_columns;
use crate::pipeline::DashboardData;
use crate::schema::{brand_share, correlation, divergence, reference, totals};

// ── Selection ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    MainKpis,
    GranularKpis,
}

impl FromStr for Tab {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "main" | "mainkpis" => Ok(Self::MainKpis),
            "granular" | "granularkpis" => Ok(Self::GranularKpis),
            _ => Err(PipelineError::UnknownSelection(format!("tab {s:?}"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub tab: Tab,
    pub post_code: Option<String>,
    pub score_column: Option<String>,
}

// ── Render request ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeBand {
    Red,
    Yellow,
    Green,
}

impl GaugeBand {
    pub fn for_value(v: f64) -> Self {
        if v < 0.5 {
            Self::Red
        } else if v < 0.75 {
            Self::Yellow
        } else {
            Self::Green
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gauge {
    pub title: String,
    pub value: Option<f64>,
    pub band: Option<GaugeBand>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationBar {
    pub variable: String,
    pub correlation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandShareBar {
    pub product: String,
    pub share_percent: Option<f64>,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DivergenceBar {
    pub brand: String,
    pub value: i64,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapArea {
    pub postal_code: String,
    pub geometry: Value,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethMap {
    pub value_column: String,
    pub areas: Vec<MapArea>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tab", rename_all = "snake_case")]
pub enum RenderRequest {
    MainKpis {
        gauges: Vec<Gauge>,
        correlations: Vec<CorrelationBar>,
        brand_shares: Vec<BrandShareBar>,
        map: ChoroplethMap,
    },
    GranularKpis {
        post_code: Option<String>,
        divergence: Vec<DivergenceBar>,
        map: ChoroplethMap,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SidebarInfo {
    pub version: String,
    pub last_updated: String,
}

pub fn sidebar(ctx: &SessionContext) -> SidebarInfo {
    SidebarInfo {
        version: ctx.version().to_string(),
        last_updated: chrono::Local::now().date_naive().format("%Y-%m-%d").to_string(),
    }
}

// ── Data extraction ─────────────────────────────────────────────────────────

/// Round for display; undefined values become `None`.
fn round_to(v: Option<f64>, digits: i32) -> Option<f64> {
    let v = v.filter(|x| x.is_finite())?;
    let scale = 10f64.powi(digits);
    Some((v * scale).round() / scale)
}

fn gauge(title: &str, value: f64) -> Gauge {
    let value = round_to(Some(value), 2);
    Gauge {
        title: title.to_string(),
        value,
        band: value.map(GaugeBand::for_value),
    }
}

fn str_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

fn extract_map(enriched: &DataFrame, value_column: &str) -> Result<ChoroplethMap> {
    let codes = str_values(enriched, reference::COD_POSTAL)?;
    let geometries = str_values(enriched, reference::GEOMETRY)?;
    let values = f64_values(enriched, value_column)?;

    let areas = codes
        .into_iter()
        .zip(geometries)
        .zip(values)
        .map(|((postal_code, geometry), value)| MapArea {
            postal_code,
            geometry: serde_json::from_str(&geometry).unwrap_or(Value::Null),
            value: value.filter(|v| v.is_finite()),
        })
        .collect();

    Ok(ChoroplethMap {
        value_column: value_column.to_string(),
        areas,
    })
}

fn extract_correlations(df: &DataFrame) -> Result<Vec<CorrelationBar>> {
    let vars = str_values(df, correlation::VARIABLE)?;
    let coefs = f64_values(df, correlation::CORRELATION)?;
    Ok(vars
        .into_iter()
        .zip(coefs)
        .map(|(variable, c)| CorrelationBar {
            variable,
            correlation: round_to(c, 2),
        })
        .collect())
}

fn extract_brand_shares(df: &DataFrame) -> Result<Vec<BrandShareBar>> {
    let products = str_values(df, brand_share::PRODUCT)?;
    let shares = f64_values(df, brand_share::SHARE)?;
    let categories = str_values(df, brand_share::CATEGORY)?;
    Ok(products
        .into_iter()
        .zip(shares)
        .zip(categories)
        .map(|((product, share), category)| BrandShareBar {
            product,
            share_percent: round_to(share.map(|s| s * 100.0), 1),
            category,
        })
        .collect())
}

fn extract_divergence(df: &DataFrame) -> Result<Vec<DivergenceBar>> {
    let brands = str_values(df, divergence::BRAND)?;
    let values: Vec<i64> = df
        .column(divergence::VALUE)?
        .i64()?
        .into_iter()
        .map(|v| v.unwrap_or(0))
        .collect();
    let categories = str_values(df, divergence::CATEGORY)?;
    Ok(brands
        .into_iter()
        .zip(values)
        .zip(categories)
        .map(|((brand, value), category)| DivergenceBar {
            brand,
            value,
            category,
        })
        .collect())
}

// ── Entry point ─────────────────────────────────────────────────────────────

/// Build the render request for a selection. Unknown postal codes or score
/// columns are rejected; missing ones default to the first available.
pub fn render_request(
    ctx: &SessionContext,
    data: &DashboardData,
    selection: &Selection,
) -> Result<RenderRequest> {
    match selection.tab {
        Tab::MainKpis => Ok(RenderRequest::MainKpis {
            gauges: vec![
                gauge("Danone Shelf Share", data.summary.danone),
                gauge("Competitor Shelf Share", data.summary.competitor),
                gauge("Bottles Shelf Share", data.summary.other),
            ],
            correlations: extract_correlations(&data.correlations)?,
            brand_shares: extract_brand_shares(&data.brand_shares)?,
            map: extract_map(&data.enriched, totals::DANONE_SHARE)?,
        }),
        Tab::GranularKpis => {
            let post_code = match &selection.post_code {
                Some(code) if data.postal_codes.contains(code) => Some(code.clone()),
                Some(code) => {
                    return Err(PipelineError::UnknownSelection(format!(
                        "postal code {code:?}"
                    )))
                }
                None => data.postal_codes.first().cloned(),
            };

            let available = brand_columns(&data.enriched);
            let score_column = match &selection.score_column {
                Some(c) if available.contains(c) => c.clone(),
                Some(c) => {
                    return Err(PipelineError::UnknownSelection(format!("score column {c:?}")))
                }
                None => ctx
                    .brands()
                    .iter()
                    .find(|b| available.contains(b))
                    .cloned()
                    .unwrap_or_else(|| totals::TOTAL_DANONE.to_string()),
            };

            let divergence = match &post_code {
                Some(code) => extract_divergence(&divergence_table(
                    &data.shelves,
                    code,
                    ctx.classification(),
                )?)?,
                None => Vec::new(),
            };

            Ok(RenderRequest::GranularKpis {
                post_code,
                divergence,
                map: extract_map(&data.enriched, &score_column)?,
            })
        }
    }
}

pub fn render_json(
    ctx: &SessionContext,
    data: &DashboardData,
    selection: &Selection,
) -> Result<String> {
    let request = render_request(ctx, data, selection)?;
    Ok(serde_json::to_string(&request)?)
}
