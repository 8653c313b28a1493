/// Column-name constants for the bottle-vision tables.
/// Single source of truth - exported to Python via PyO3.

// ── Raw detection columns ───────────────────────────────────────────────────
pub mod detection {
    pub const POST_CODE: &str = "post_code";
    pub const STORE_TYPE: &str = "store_type";
    pub const STORE_NAME: &str = "store_name";
    pub const SHELF_ID: &str = "shelf_id";
    pub const PHOTO_TYPE: &str = "photo_type";
    pub const NUM_BOTTLES: &str = "Num_bottles";

    /// Composite key of a shelf aggregate.
    pub const GROUP_KEY: [&str; 4] = [POST_CODE, STORE_TYPE, STORE_NAME, SHELF_ID];
}

// ── Document layout ─────────────────────────────────────────────────────────
pub mod document {
    /// Separator used when flattening nested documents.
    pub const PATH_SEPARATOR: &str = "_";
    /// Flattened prefix of the per-brand prediction counts.
    pub const PREDICTIONS_PREFIX: &str = "predictions_";
    /// Legacy spelling of the shelf key.
    pub const SHELF_ID_ALIAS: &str = "shelf id";
}

// ── Photo type values ───────────────────────────────────────────────────────
pub mod photo_type {
    pub const PROD: &str = "Prod";
    pub const TEST: &str = "Test";
}

// ── Derived totals ──────────────────────────────────────────────────────────
pub mod totals {
    pub const TOTAL_DANONE: &str = "total_danone";
    pub const TOTAL_COMPETITOR: &str = "total_competitor";
    pub const PREDICTED_TOTAL: &str = "predicted_total";
    pub const TOTAL_BOTTLES: &str = "total_bottles";
    pub const DANONE_SHARE: &str = "danone_share";
    pub const COMPETITOR_SHARE: &str = "competitor_share";

    /// Count columns, summed during aggregation.
    pub const COUNTS: [&str; 4] = [TOTAL_DANONE, TOTAL_COMPETITOR, PREDICTED_TOTAL, TOTAL_BOTTLES];

    /// Ratio columns, always re-derived and never summed.
    pub const SHARES: [&str; 2] = [DANONE_SHARE, COMPETITOR_SHARE];
}

// ── Reference (geometry + income) columns ───────────────────────────────────
pub mod reference {
    pub const COD_POSTAL: &str = "COD_POSTAL";
    pub const GEOMETRY: &str = "geometry";
    pub const AVG_GROSS_INCOME: &str = "Average Gross Income";
    pub const AVG_DISPOSABLE_INCOME: &str = "Average Disposable Income";
    pub const CAT_GROSS_INCOME: &str = "Cat_avg_Gross_Income";
    pub const CAT_DISPOSABLE_INCOME: &str = "Cat_avg_Disposable_Income";
    pub const HAS_DETECTIONS: &str = "has_detections";
}

// ── Tercile labels ──────────────────────────────────────────────────────────
pub mod tercile {
    pub const LOW: &str = "Low";
    pub const MEDIUM: &str = "Medium";
    pub const HIGH: &str = "High";
}

// ── Category labels ─────────────────────────────────────────────────────────
pub mod category {
    pub const DANONE: &str = "Danone";
    pub const COMPETITOR: &str = "competitor";
    pub const UNCLASSIFIED: &str = "unclassified";
}

// ── Correlation table ───────────────────────────────────────────────────────
pub mod correlation {
    pub const VARIABLE: &str = "Variable";
    pub const CORRELATION: &str = "Correlation";
}

// ── Brand share (podium) table ──────────────────────────────────────────────
pub mod brand_share {
    pub const PRODUCT: &str = "Product";
    pub const SHARE: &str = "Share";
    pub const CATEGORY: &str = "Category";
}

// ── Divergence table ────────────────────────────────────────────────────────
pub mod divergence {
    pub const BRAND: &str = "brand";
    pub const VALUE: &str = "value";
    pub const CATEGORY: &str = "Category";
}
