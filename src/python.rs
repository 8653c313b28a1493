use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::config::DashboardConfig;
use crate::context::SessionContext;
use crate::error::PipelineError;
use crate::pipeline::{self, DashboardData};
use crate::reference::{documents_from_json, load_documents};
use crate::schema;
use crate::view::{self, Selection};

#[pyclass]
pub struct DashboardSession {
    base_path: PathBuf,
    config: DashboardConfig,
    context: Option<SessionContext>,
    data: Option<DashboardData>,
}

#[pymethods]
impl DashboardSession {
    #[new]
    #[pyo3(signature = (base_path, config_file=None))]
    fn new(base_path: String, config_file: Option<&str>) -> PyResult<Self> {
        let base_path = PathBuf::from(base_path);
        let config = match config_file {
            Some(f) => DashboardConfig::from_file(&base_path.join(f))?,
            None => DashboardConfig::default(),
        };
        Ok(Self {
            base_path,
            config,
            context: None,
            data: None,
        })
    }

    // ── Loading ─────────────────────────────────────────────────────────────

    /// Load brand labels, income and boundaries; returns the joined
    /// reference table. Clears previous pipeline results.
    fn load_reference(&mut self) -> PyResult<PyDataFrame> {
        let ctx = SessionContext::load(&self.config, &self.base_path)?;
        let df = ctx.reference().clone();
        self.context = Some(ctx);
        self.data = None;
        Ok(PyDataFrame(df))
    }

    /// Run the pipeline on a detections file (default: the configured one).
    /// Returns the enriched postal-code table.
    #[pyo3(signature = (filename=None))]
    fn run(&mut self, filename: Option<&str>) -> PyResult<PyDataFrame> {
        let path = match filename {
            Some(f) => self.base_path.join(f),
            None => self.config.resolved(&self.base_path).data.detections,
        };
        let docs = load_documents(&path)?;
        self.run_docs(&docs)
    }

    /// Run the pipeline on a JSON string of raw documents.
    fn run_json(&mut self, documents_json: &str) -> PyResult<PyDataFrame> {
        let docs = documents_from_json(documents_json)?;
        self.run_docs(&docs)
    }

    // ── Views ───────────────────────────────────────────────────────────────

    /// Render request for a tab as a JSON string.
    #[pyo3(signature = (tab, post_code=None, score_column=None))]
    fn render(
        &self,
        tab: &str,
        post_code: Option<String>,
        score_column: Option<String>,
    ) -> PyResult<String> {
        let selection = Selection {
            tab: tab.parse()?,
            post_code,
            score_column,
        };
        let json = view::render_json(self.context()?, self.data()?, &selection)?;
        Ok(json)
    }

    fn sidebar(&self) -> PyResult<(String, String)> {
        let info = view::sidebar(self.context()?);
        Ok((info.version, info.last_updated))
    }

    // ── Properties ──────────────────────────────────────────────────────────

    #[getter]
    fn reference_df(&self) -> Option<PyDataFrame> {
        self.context.as_ref().map(|c| PyDataFrame(c.reference().clone()))
    }

    #[getter]
    fn shelves_df(&self) -> Option<PyDataFrame> {
        self.data.as_ref().map(|d| PyDataFrame(d.shelves.clone()))
    }

    #[getter]
    fn enriched_df(&self) -> Option<PyDataFrame> {
        self.data.as_ref().map(|d| PyDataFrame(d.enriched.clone()))
    }

    #[getter]
    fn correlations_df(&self) -> Option<PyDataFrame> {
        self.data.as_ref().map(|d| PyDataFrame(d.correlations.clone()))
    }

    #[getter]
    fn brand_shares_df(&self) -> Option<PyDataFrame> {
        self.data.as_ref().map(|d| PyDataFrame(d.brand_shares.clone()))
    }

    /// `(danone, competitor, other)` mean shelf shares.
    #[getter]
    fn market_share(&self) -> Option<(f64, f64, f64)> {
        self.data
            .as_ref()
            .map(|d| (d.summary.danone, d.summary.competitor, d.summary.other))
    }

    #[getter]
    fn postal_codes(&self) -> Vec<String> {
        self.data
            .as_ref()
            .map(|d| d.postal_codes.clone())
            .unwrap_or_default()
    }
}

impl DashboardSession {
    fn context(&self) -> Result<&SessionContext, PipelineError> {
        self.context
            .as_ref()
            .ok_or_else(|| PipelineError::NotLoaded("reference data".into()))
    }

    fn data(&self) -> Result<&DashboardData, PipelineError> {
        self.data
            .as_ref()
            .ok_or_else(|| PipelineError::NotLoaded("detections".into()))
    }

    fn run_docs(&mut self, docs: &[serde_json::Value]) -> PyResult<PyDataFrame> {
        let data = pipeline::run_documents(self.context()?, docs)?;
        let enriched = data.enriched.clone();
        self.data = Some(data);
        Ok(PyDataFrame(enriched))
    }
}

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Detection
    let detection = PyModule::new(m.py(), "detection")?;
    detection.add("POST_CODE", schema::detection::POST_CODE)?;
    detection.add("STORE_TYPE", schema::detection::STORE_TYPE)?;
    detection.add("STORE_NAME", schema::detection::STORE_NAME)?;
    detection.add("SHELF_ID", schema::detection::SHELF_ID)?;
    detection.add("PHOTO_TYPE", schema::detection::PHOTO_TYPE)?;
    detection.add("NUM_BOTTLES", schema::detection::NUM_BOTTLES)?;
    m.add_submodule(&detection)?;

    // Totals
    let totals = PyModule::new(m.py(), "totals")?;
    totals.add("TOTAL_DANONE", schema::totals::TOTAL_DANONE)?;
    totals.add("TOTAL_COMPETITOR", schema::totals::TOTAL_COMPETITOR)?;
    totals.add("PREDICTED_TOTAL", schema::totals::PREDICTED_TOTAL)?;
    totals.add("TOTAL_BOTTLES", schema::totals::TOTAL_BOTTLES)?;
    totals.add("DANONE_SHARE", schema::totals::DANONE_SHARE)?;
    totals.add("COMPETITOR_SHARE", schema::totals::COMPETITOR_SHARE)?;
    m.add_submodule(&totals)?;

    // Reference
    let reference = PyModule::new(m.py(), "reference")?;
    reference.add("COD_POSTAL", schema::reference::COD_POSTAL)?;
    reference.add("GEOMETRY", schema::reference::GEOMETRY)?;
    reference.add("AVG_GROSS_INCOME", schema::reference::AVG_GROSS_INCOME)?;
    reference.add(
        "AVG_DISPOSABLE_INCOME",
        schema::reference::AVG_DISPOSABLE_INCOME,
    )?;
    reference.add("CAT_GROSS_INCOME", schema::reference::CAT_GROSS_INCOME)?;
    reference.add(
        "CAT_DISPOSABLE_INCOME",
        schema::reference::CAT_DISPOSABLE_INCOME,
    )?;
    reference.add("HAS_DETECTIONS", schema::reference::HAS_DETECTIONS)?;
    m.add_submodule(&reference)?;

    // Tables
    let tables = PyModule::new(m.py(), "tables")?;
    tables.add("VARIABLE", schema::correlation::VARIABLE)?;
    tables.add("CORRELATION", schema::correlation::CORRELATION)?;
    tables.add("PRODUCT", schema::brand_share::PRODUCT)?;
    tables.add("SHARE", schema::brand_share::SHARE)?;
    tables.add("CATEGORY", schema::brand_share::CATEGORY)?;
    tables.add("BRAND", schema::divergence::BRAND)?;
    tables.add("VALUE", schema::divergence::VALUE)?;
    m.add_submodule(&tables)?;

    Ok(())
}

#[pymodule]
fn bottle_vision(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<DashboardSession>()?;
    add_schema_exports(m)?;
    Ok(())
}
