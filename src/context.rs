use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::classification::BrandClassification;
use crate::config::DashboardConfig;
use crate::error::Result;
use crate::joiner::{assign_income_terciles, join_reference, IncomeTerciles};
use crate::reference::{load_geojson, load_income_csv};

/// Read-only inputs of one dashboard session.
///
/// Built once and passed by reference into every pipeline stage.
#[derive(Debug, Clone)]
pub struct SessionContext {
    classification: BrandClassification,
    brands: Vec<String>,
    reference: DataFrame,
    terciles: IncomeTerciles,
    version: String,
}

impl SessionContext {
    /// Assemble a session from in-memory reference data.
    ///
    /// `income` must be in the canonical layout (see
    /// [`crate::reference::prepare_income`]). Terciles are fitted on it
    /// before it is joined with `geometry`.
    pub fn new(
        classification: BrandClassification,
        brands: Vec<String>,
        geometry: &DataFrame,
        income: &DataFrame,
    ) -> Result<Self> {
        let (income, terciles) = assign_income_terciles(income)?;
        let reference = join_reference(geometry, &income)?;
        Ok(Self {
            classification,
            brands,
            reference,
            terciles,
            version: String::new(),
        })
    }

    /// Load every reference file named in `config`, relative to `base`.
    pub fn load(config: &DashboardConfig, base: &Path) -> Result<Self> {
        let cfg = config.resolved(base);
        let classification = BrandClassification::from_json_file(&cfg.data.brand_labels)?;
        let income = load_income_csv(&cfg.data.income, &cfg.income)?;
        let geometry = load_geojson(&cfg.data.geometry, &cfg.geometry.postal_code_property)?;

        let mut ctx = Self::new(
            classification,
            cfg.dashboard.brands.clone(),
            &geometry,
            &income,
        )?;
        ctx.version = cfg.dashboard.version.clone();
        info!(
            brands = ctx.classification.len(),
            postal_codes = ctx.reference.height(),
            "session context ready"
        );
        Ok(ctx)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn classification(&self) -> &BrandClassification {
        &self.classification
    }

    /// Brand columns of interest, in display order.
    pub fn brands(&self) -> &[String] {
        &self.brands
    }

    /// Boundaries joined with income and terciles, one row per postal code.
    pub fn reference(&self) -> &DataFrame {
        &self.reference
    }

    pub fn terciles(&self) -> &IncomeTerciles {
        &self.terciles
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}
