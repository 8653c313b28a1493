#![allow(dead_code)]

use bottle_vision::reference::{boundaries_to_frame, income_to_frame, IncomeRecord, PostalBoundary};
use bottle_vision::{BrandCategory, BrandClassification, DetectionRecord, PhotoType, SessionContext};
use serde_json::json;

pub fn labels() -> BrandClassification {
    BrandClassification::new([
        ("fontvella", BrandCategory::Danone),
        ("lanjaron", BrandCategory::Danone),
        ("evian", BrandCategory::Competitor),
        ("veri", BrandCategory::Competitor),
    ])
}

pub fn brands() -> Vec<String> {
    ["fontvella", "lanjaron", "evian", "veri"]
        .iter()
        .map(|b| b.to_string())
        .collect()
}

pub fn boundaries(codes: &[&str]) -> Vec<PostalBoundary> {
    codes
        .iter()
        .map(|c| PostalBoundary {
            postal_code: c.to_string(),
            geometry: json!({
                "type": "Polygon",
                "coordinates": [[[2.1, 41.3], [2.2, 41.3], [2.2, 41.4], [2.1, 41.3]]]
            }),
        })
        .collect()
}

pub fn incomes(rows: &[(&str, f64)]) -> Vec<IncomeRecord> {
    rows.iter()
        .map(|(c, g)| IncomeRecord {
            postal_code: c.to_string(),
            average_gross_income: Some(*g),
            average_disposable_income: Some(g * 0.75),
        })
        .collect()
}

/// Six reference postal codes; 08006 has income but no boundary.
pub fn context() -> SessionContext {
    let geometry =
        boundaries_to_frame(&boundaries(&["08001", "08002", "08003", "08004", "08005"])).unwrap();
    let income = income_to_frame(&incomes(&[
        ("08001", 20_000.0),
        ("08002", 25_000.0),
        ("08003", 30_000.0),
        ("08004", 35_000.0),
        ("08005", 40_000.0),
        ("08006", 45_000.0),
    ]))
    .unwrap();
    SessionContext::new(labels(), brands(), &geometry, &income)
        .unwrap()
        .with_version("1.0.0")
}

pub fn record(
    post_code: &str,
    shelf_id: &str,
    photo: PhotoType,
    counts: &[(&str, u64)],
    reported: u64,
) -> DetectionRecord {
    DetectionRecord {
        post_code: post_code.into(),
        store_type: "super".into(),
        store_name: "X".into(),
        shelf_id: shelf_id.into(),
        photo_type: photo,
        brand_counts: counts.iter().map(|(b, n)| (b.to_string(), *n)).collect(),
        num_bottles_reported: reported,
    }
}
