//! Bottle-vision dashboard core: turns shelf-photo detections into
//! postal-code metrics joined with boundary and income reference data.
//!
//! Pipeline: [`normalizer`] → [`aggregator`] → [`joiner`], with
//! [`metrics`] derived from the results and [`view`] mapping UI selections
//! to render requests.

pub mod aggregator;
pub mod classification;
pub mod config;
pub mod context;
pub mod error;
pub mod joiner;
pub mod metrics;
pub mod normalizer;
pub mod pipeline;
pub mod reference;
pub mod schema;
pub mod stats;
pub mod view;

#[cfg(feature = "python")]
mod python;

pub use classification::{BrandCategory, BrandClassification};
pub use config::DashboardConfig;
pub use context::SessionContext;
pub use error::{PipelineError, Result};
pub use normalizer::{DetectionRecord, PhotoType};
pub use pipeline::{run, run_documents, DashboardData};
