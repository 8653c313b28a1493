//! Record normalizer: raw detection documents → one flat row per production
//! photo with brand totals and shelf shares.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::classification::{BrandCategory, BrandClassification};
use crate::error::Result;
use crate::schema::{detection, document, photo_type, reference, totals};

/// Origin of a shelf photo. Only `Prod` photos are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PhotoType {
    Prod,
    Test,
    #[default]
    Unknown,
}

impl PhotoType {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            photo_type::PROD => Self::Prod,
            photo_type::TEST => Self::Test,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prod => photo_type::PROD,
            Self::Test => photo_type::TEST,
            Self::Unknown => "",
        }
    }
}

/// One raw observation of a store shelf photo.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DetectionRecord {
    pub post_code: String,
    pub store_type: String,
    pub store_name: String,
    pub shelf_id: String,
    pub photo_type: PhotoType,
    pub brand_counts: BTreeMap<String, u64>,
    pub num_bottles_reported: u64,
}

impl DetectionRecord {
    /// Build a record from a raw (possibly nested) document.
    ///
    /// Missing or malformed fields fall back to empty strings / zero counts,
    /// so a bad document never fails the batch.
    pub fn from_document(doc: &Value, classification: &BrandClassification) -> Self {
        let flat = flatten_document(doc);

        let text = |key: &str| flat.get(key).map(value_to_text).unwrap_or_default();
        let shelf_id = flat
            .get(detection::SHELF_ID)
            .or_else(|| flat.get(document::SHELF_ID_ALIAS))
            .map(value_to_text)
            .unwrap_or_default();

        let mut brand_counts = BTreeMap::new();
        for (key, value) in &flat {
            if let Some(brand) = key.strip_prefix(document::PREDICTIONS_PREFIX) {
                let total = brand_counts.entry(brand.to_string()).or_insert(0);
                *total = (*total + value_to_count(value)).min(MAX_COUNT);
            } else if classification.is_classified(key) {
                let total = brand_counts.entry(key.clone()).or_insert(0);
                *total = (*total + value_to_count(value)).min(MAX_COUNT);
            }
        }

        Self {
            post_code: text(detection::POST_CODE),
            store_type: text(detection::STORE_TYPE),
            store_name: text(detection::STORE_NAME),
            shelf_id,
            photo_type: PhotoType::parse(&text(detection::PHOTO_TYPE)),
            brand_counts,
            num_bottles_reported: flat
                .get(detection::NUM_BOTTLES)
                .map(value_to_count)
                .unwrap_or(0),
        }
    }
}

/// Parse a batch of raw documents.
pub fn records_from_documents(
    docs: &[Value],
    classification: &BrandClassification,
) -> Vec<DetectionRecord> {
    docs.iter()
        .map(|d| DetectionRecord::from_document(d, classification))
        .collect()
}

/// Flatten nested objects into `parent_child` keys.
pub fn flatten_document(doc: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = doc {
        flatten_into(map, None, &mut out);
    }
    out
}

fn flatten_into(map: &Map<String, Value>, prefix: Option<&str>, out: &mut BTreeMap<String, Value>) {
    for (key, value) in map {
        let path = match prefix {
            Some(p) => format!("{p}{}{key}", document::PATH_SEPARATOR),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) => flatten_into(inner, Some(&path), out),
            other => {
                out.insert(path, other.clone());
            }
        }
    }
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Upper bound of a single count; keeps summed Int64 columns from overflowing.
pub const MAX_COUNT: u64 = u32::MAX as u64;

/// Non-negative integral count capped at [`MAX_COUNT`], or zero.
fn value_to_count(v: &Value) -> u64 {
    let as_float = match v {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return u.min(MAX_COUNT);
            }
            n.as_f64()
        }
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match as_float {
        Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => {
            f.min(MAX_COUNT as f64) as u64
        }
        _ => 0,
    }
}

fn count_to_i64(count: u64) -> i64 {
    count.min(MAX_COUNT) as i64
}

const RESERVED_COLUMNS: [&str; 9] = [
    detection::PHOTO_TYPE,
    detection::NUM_BOTTLES,
    reference::COD_POSTAL,
    reference::GEOMETRY,
    reference::AVG_GROSS_INCOME,
    reference::AVG_DISPOSABLE_INCOME,
    reference::CAT_GROSS_INCOME,
    reference::CAT_DISPOSABLE_INCOME,
    reference::HAS_DETECTIONS,
];

/// True for key, total, share and reference columns; false for brand counts.
pub fn is_reserved_column(name: &str) -> bool {
    detection::GROUP_KEY.contains(&name)
        || totals::COUNTS.contains(&name)
        || totals::SHARES.contains(&name)
        || RESERVED_COLUMNS.contains(&name)
}

/// Columns of a detection table that hold per-brand counts.
pub fn brand_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names_str()
        .into_iter()
        .filter(|c| !is_reserved_column(c))
        .map(|c| c.to_string())
        .collect()
}

/// Lay the raw records out as a flat table. Brands absent from a record
/// are filled with zero.
pub fn records_to_frame(records: &[DetectionRecord]) -> Result<DataFrame> {
    let brands: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.brand_counts.keys().map(|b| b.as_str()))
        .filter(|b| !is_reserved_column(b))
        .collect();

    let strings = |f: fn(&DetectionRecord) -> &str| -> Vec<String> {
        records.iter().map(|r| f(r).to_string()).collect()
    };

    let mut columns: Vec<Column> = vec![
        Column::new(detection::POST_CODE.into(), &strings(|r| r.post_code.as_str())),
        Column::new(detection::STORE_TYPE.into(), &strings(|r| r.store_type.as_str())),
        Column::new(detection::STORE_NAME.into(), &strings(|r| r.store_name.as_str())),
        Column::new(detection::SHELF_ID.into(), &strings(|r| r.shelf_id.as_str())),
        Column::new(
            detection::PHOTO_TYPE.into(),
            &strings(|r| r.photo_type.as_str()),
        ),
        Column::new(
            detection::NUM_BOTTLES.into(),
            &records
                .iter()
                .map(|r| count_to_i64(r.num_bottles_reported))
                .collect::<Vec<i64>>(),
        ),
    ];

    for brand in brands {
        let counts: Vec<i64> = records
            .iter()
            .map(|r| count_to_i64(r.brand_counts.get(brand).copied().unwrap_or(0)))
            .collect();
        columns.push(Column::new(brand.into(), &counts));
    }

    Ok(DataFrame::new(columns)?)
}

/// Sum of the given count columns, zero when there are none.
pub(crate) fn sum_columns<S: AsRef<str>>(cols: &[S]) -> Expr {
    cols.iter()
        .fold(lit(0i64), |acc, c| acc + col(c.as_ref()).fill_null(lit(0i64)))
}

/// `numerator / total_bottles`, null when the shelf has no bottles.
pub(crate) fn share_of_total(numerator: &str) -> Expr {
    when(col(totals::TOTAL_BOTTLES).gt(lit(0i64)))
        .then(
            col(numerator).cast(DataType::Float64)
                / col(totals::TOTAL_BOTTLES).cast(DataType::Float64),
        )
        .otherwise(lit(NULL).cast(DataType::Float64))
}

/// Normalize raw records into one row per production photo.
///
/// Output columns: the four group keys, `Num_bottles`, one count column
/// per brand seen, then `total_danone`, `total_competitor`,
/// `predicted_total`, `total_bottles`, `danone_share`, `competitor_share`.
#[instrument(skip_all, fields(records = records.len()))]
pub fn normalize(
    records: &[DetectionRecord],
    classification: &BrandClassification,
) -> Result<DataFrame> {
    let raw = records_to_frame(records)?;
    let brands = brand_columns(&raw);

    let danone: Vec<&str> = brands
        .iter()
        .map(|b| b.as_str())
        .filter(|b| classification.category(b) == BrandCategory::Danone)
        .collect();
    let competitor: Vec<&str> = brands
        .iter()
        .map(|b| b.as_str())
        .filter(|b| classification.category(b) == BrandCategory::Competitor)
        .collect();
    debug!(
        brands = brands.len(),
        danone = danone.len(),
        competitor = competitor.len(),
        "classified brand columns"
    );

    let mut output: Vec<Expr> = detection::GROUP_KEY.iter().map(|c| col(*c)).collect();
    output.push(col(detection::NUM_BOTTLES));
    output.extend(brands.iter().map(|b| col(b.as_str())));
    output.extend(totals::COUNTS.iter().map(|c| col(*c)));
    output.extend(totals::SHARES.iter().map(|c| col(*c)));

    let df = raw
        .lazy()
        .filter(col(detection::PHOTO_TYPE).eq(lit(photo_type::PROD)))
        .with_columns([
            sum_columns(&danone).alias(totals::TOTAL_DANONE),
            sum_columns(&competitor).alias(totals::TOTAL_COMPETITOR),
        ])
        .with_columns([
            (col(totals::TOTAL_DANONE) + col(totals::TOTAL_COMPETITOR))
                .alias(totals::PREDICTED_TOTAL),
        ])
        // Trust the larger of detected and reported bottle counts.
        .with_columns([when(col(totals::PREDICTED_TOTAL).gt_eq(col(detection::NUM_BOTTLES)))
            .then(col(totals::PREDICTED_TOTAL))
            .otherwise(col(detection::NUM_BOTTLES))
            .alias(totals::TOTAL_BOTTLES)])
        .with_columns([
            share_of_total(totals::TOTAL_DANONE).alias(totals::DANONE_SHARE),
            share_of_total(totals::TOTAL_COMPETITOR).alias(totals::COMPETITOR_SHARE),
        ])
        .select(output)
        .collect()?;

    info!(
        input = records.len(),
        kept = df.height(),
        dropped = records.len() - df.height(),
        "normalized detection records"
    );
    Ok(df)
}
