//! Value-to-text rules attached to table columns.

use serde::Serialize;

use crate::model::Cell;

pub const MISSING: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFormat {
    /// 4 decimals, scientific below 0.001.
    PValue,
    /// Bayes factors and evidence ratios, 2 decimals.
    Ratio,
    /// Rate estimates and other continuous values, 3 decimals.
    Rate,
    Count,
    Text,
}

impl ColumnFormat {
    /// Format for a column key the crate has no explicit rule for.
    pub fn infer(key: &str) -> Self {
        let lowered = key.to_ascii_lowercase();
        if lowered.contains("p-value") || lowered == "p" || lowered.ends_with(" p") || lowered == "p-asmp" {
            Self::PValue
        } else if lowered.contains("bayes") || lowered == "er" || lowered.contains("evidence ratio") {
            Self::Ratio
        } else if lowered.contains("branches") || lowered.contains("rate classes") || lowered == "partition" || lowered == "codon" {
            Self::Count
        } else {
            Self::Rate
        }
    }

    pub fn render(self, cell: Option<&Cell>) -> String {
        let Some(cell) = cell else {
            return MISSING.to_string();
        };
        match (self, cell) {
            (_, Cell::Text(text)) => text.clone(),
            (_, Cell::Missing) => MISSING.to_string(),
            (Self::Count, Cell::Integer(value)) => value.to_string(),
            (_, Cell::Integer(value)) => self.render_number(*value as f64),
            (_, Cell::Number(value)) => self.render_number(*value),
        }
    }

    fn render_number(self, value: f64) -> String {
        match self {
            Self::PValue => format_p_value(value),
            Self::Ratio => format_ratio(value),
            Self::Rate => format_fixed(value, 3),
            Self::Count => format_count(value),
            Self::Text => value.to_string(),
        }
    }
}

pub fn format_p_value(value: f64) -> String {
    if value.is_nan() {
        MISSING.to_string()
    } else if value < 0.001 {
        format!("{value:.2e}")
    } else {
        format!("{value:.4}")
    }
}

pub fn format_ratio(value: f64) -> String {
    format_fixed(value, 2)
}

pub fn format_fixed(value: f64, decimals: usize) -> String {
    match value {
        v if v.is_nan() => MISSING.to_string(),
        v if v == f64::INFINITY => "∞".to_string(),
        v if v == f64::NEG_INFINITY => "-∞".to_string(),
        v => format!("{v:.decimals$}"),
    }
}

pub fn format_count(value: f64) -> String {
    if value.is_finite() {
        format!("{}", value.round() as i64)
    } else {
        format_fixed(value, 0)
    }
}

/// Threshold as written in labels (`0.1`, not `0.1000`).
pub fn format_threshold(threshold: f64) -> String {
    format!("{threshold}")
}
