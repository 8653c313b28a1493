use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::schema::category;

/// Category a brand counts towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BrandCategory {
    Danone,
    Competitor,
    /// Not in the label table; excluded from both totals.
    Unclassified,
}

impl BrandCategory {
    /// Parse a label from the brand table. Matching is case-insensitive.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "danone" => Self::Danone,
            "competitor" => Self::Competitor,
            _ => Self::Unclassified,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Danone => category::DANONE,
            Self::Competitor => category::COMPETITOR,
            Self::Unclassified => category::UNCLASSIFIED,
        }
    }
}

/// Immutable brand → category table, loaded once per session.
#[derive(Debug, Clone, Default)]
pub struct BrandClassification {
    labels: BTreeMap<String, BrandCategory>,
}

impl BrandClassification {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, BrandCategory)>,
        S: Into<String>,
    {
        Self {
            labels: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Parse the JSON label file: `{"fontvella": "Danone", "evian": "competitor", ...}`.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: BTreeMap<String, String> = serde_json::from_str(text)?;
        let labels = raw
            .into_iter()
            .map(|(brand, label)| {
                let cat = BrandCategory::from_label(&label);
                if cat == BrandCategory::Unclassified {
                    warn!(%brand, %label, "unknown brand label, brand left unclassified");
                }
                (brand, cat)
            })
            .collect();
        Ok(Self { labels })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn category(&self, brand: &str) -> BrandCategory {
        self.labels
            .get(brand)
            .copied()
            .unwrap_or(BrandCategory::Unclassified)
    }

    pub fn is_classified(&self, brand: &str) -> bool {
        self.category(brand) != BrandCategory::Unclassified
    }

    /// Brands of one category, in name order.
    pub fn brands_in(&self, cat: BrandCategory) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .filter(move |(_, c)| **c == cat)
            .map(|(b, _)| b.as_str())
    }

    pub fn brands(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(|b| b.as_str())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labels_case_insensitively() {
        let c = BrandClassification::from_json_str(
            r#"{"fontvella": "Danone", "evian": "competitor", "lanjaron": "DANONE", "x": "other"}"#,
        )
        .unwrap();
        assert_eq!(c.category("fontvella"), BrandCategory::Danone);
        assert_eq!(c.category("lanjaron"), BrandCategory::Danone);
        assert_eq!(c.category("evian"), BrandCategory::Competitor);
        assert_eq!(c.category("x"), BrandCategory::Unclassified);
    }

    #[test]
    fn absent_brand_is_unclassified() {
        let c = BrandClassification::new([("fontvella", BrandCategory::Danone)]);
        assert_eq!(c.category("cocacola"), BrandCategory::Unclassified);
        assert!(!c.is_classified("cocacola"));
    }

    #[test]
    fn brands_in_is_name_ordered() {
        let c = BrandClassification::new([
            ("viladrau", BrandCategory::Danone),
            ("evian", BrandCategory::Competitor),
            ("fontvella", BrandCategory::Danone),
        ]);
        let danone: Vec<&str> = c.brands_in(BrandCategory::Danone).collect();
        assert_eq!(danone, vec!["fontvella", "viladrau"]);
    }
}
