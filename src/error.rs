use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Data not loaded: {0}")]
    NotLoaded(String),

    #[error("Column not found: {0}")]
    MissingColumn(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Unknown selection: {0}")]
    UnknownSelection(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(feature = "python")]
impl From<PipelineError> for pyo3::PyErr {
    fn from(err: PipelineError) -> pyo3::PyErr {
        pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
    }
}
