use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::schema::reference;

/// Brands the dashboard plots by default.
pub const DEFAULT_BRANDS: [&str; 21] = [
    "fontvella",
    "viladrau",
    "cabreiroa",
    "vichy",
    "lanjaron",
    "bezoya",
    "veri",
    "aquabona",
    "solan",
    "evian",
    "ribes",
    "boix",
    "aquarel",
    "perrier",
    "fonter",
    "aquafina",
    "fontagudes",
    "aquadeus",
    "casera",
    "santaniol",
    "cocacola",
];

/// Top-level dashboard configuration, usually read from `dashboard.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub data: DataFiles,
    pub income: IncomeSource,
    pub geometry: GeometrySource,
    pub dashboard: DashboardOptions,
}

/// Input files. Relative paths resolve against the config's base directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataFiles {
    pub detections: PathBuf,
    pub brand_labels: PathBuf,
    pub income: PathBuf,
    pub geometry: PathBuf,
}

impl Default for DataFiles {
    fn default() -> Self {
        Self {
            detections: PathBuf::from("Data/detections.json"),
            brand_labels: PathBuf::from("Data/competitor_danone_labels_dict.json"),
            income: PathBuf::from("Data/renta_barcelona.csv"),
            geometry: PathBuf::from("Data/BARCELONA.geojson"),
        }
    }
}

/// Layout of the income CSV.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IncomeSource {
    pub separator: String,
    /// Decimal mark of the income figures, `,` or `.`; the other one is
    /// read as a thousands separator.
    pub decimal: String,
    pub postal_code_column: String,
    pub gross_income_column: String,
    pub disposable_income_column: String,
}

impl Default for IncomeSource {
    fn default() -> Self {
        Self {
            separator: ";".to_string(),
            decimal: ",".to_string(),
            postal_code_column: reference::COD_POSTAL.to_string(),
            gross_income_column: reference::AVG_GROSS_INCOME.to_string(),
            disposable_income_column: reference::AVG_DISPOSABLE_INCOME.to_string(),
        }
    }
}

impl IncomeSource {
    pub fn separator_byte(&self) -> Result<u8> {
        match self.separator.as_bytes() {
            [b] => Ok(*b),
            _ => Err(PipelineError::InvalidData(format!(
                "income separator must be a single byte, got {:?}",
                self.separator
            ))),
        }
    }

    pub fn decimal_mark(&self) -> Result<char> {
        match self.decimal.as_str() {
            "," => Ok(','),
            "." => Ok('.'),
            other => Err(PipelineError::InvalidData(format!(
                "income decimal mark must be \",\" or \".\", got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeometrySource {
    /// Feature property holding the postal code.
    pub postal_code_property: String,
}

impl Default for GeometrySource {
    fn default() -> Self {
        Self {
            postal_code_property: reference::COD_POSTAL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardOptions {
    /// Brand columns used for correlations, brand shares and map selection.
    pub brands: Vec<String>,
    pub version: String,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            brands: DEFAULT_BRANDS.iter().map(|b| b.to_string()).collect(),
            version: "1.0.0".to_string(),
        }
    }
}

impl DashboardConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        cfg.income.separator_byte()?;
        cfg.income.decimal_mark()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Copy with every data path joined onto `base`.
    pub fn resolved(&self, base: &Path) -> Self {
        let mut cfg = self.clone();
        for path in [
            &mut cfg.data.detections,
            &mut cfg.data.brand_labels,
            &mut cfg.data.income,
            &mut cfg.data.geometry,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = DashboardConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.income.separator, ";");
        assert_eq!(cfg.income.decimal_mark().unwrap(), ',');
        assert_eq!(cfg.geometry.postal_code_property, "COD_POSTAL");
        assert_eq!(cfg.dashboard.brands.len(), DEFAULT_BRANDS.len());
    }

    #[test]
    fn partial_sections_override_defaults() {
        let cfg = DashboardConfig::from_toml_str(
            r#"
            [income]
            separator = ","
            postal_code_column = "ZIP_code"

            [dashboard]
            brands = ["fontvella", "evian"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.income.separator_byte().unwrap(), b',');
        assert_eq!(cfg.income.postal_code_column, "ZIP_code");
        assert_eq!(cfg.income.gross_income_column, "Average Gross Income");
        assert_eq!(cfg.dashboard.brands, vec!["fontvella", "evian"]);
        assert_eq!(cfg.dashboard.version, "1.0.0");
    }

    #[test]
    fn multi_byte_separator_is_rejected() {
        let err = DashboardConfig::from_toml_str("[income]\nseparator = \";;\"").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidData(_)));
    }

    #[test]
    fn decimal_mark_must_be_comma_or_point() {
        let cfg = DashboardConfig::from_toml_str("[income]\ndecimal = \".\"").unwrap();
        assert_eq!(cfg.income.decimal_mark().unwrap(), '.');
        let err = DashboardConfig::from_toml_str("[income]\ndecimal = \"'\"").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidData(_)));
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let mut cfg = DashboardConfig::default();
        cfg.data.geometry = PathBuf::from("/abs/geo.json");
        let resolved = cfg.resolved(Path::new("/srv/dash"));
        assert_eq!(resolved.data.income, PathBuf::from("/srv/dash/Data/renta_barcelona.csv"));
        assert_eq!(resolved.data.geometry, PathBuf::from("/abs/geo.json"));
    }
}
