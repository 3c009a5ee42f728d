use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use tracing::warn;

use crate::format::ColumnFormat;

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Caller-supplied cutoffs. For posterior-based methods `p_value` holds the
/// minimum posterior probability instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub p_value: f64,
    pub evidence_ratio: f64,
}

impl Thresholds {
    /// Clamps `p_value` into `[0, 1]` and keeps `evidence_ratio` non-negative.
    /// NaN falls back to the supplied defaults.
    pub fn sanitized(p_value: f64, evidence_ratio: f64, defaults: Thresholds) -> Self {
        let p_value = if p_value.is_nan() {
            warn!(default = defaults.p_value, "threshold is NaN, using default");
            defaults.p_value
        } else if !(0.0..=1.0).contains(&p_value) {
            let clamped = p_value.clamp(0.0, 1.0);
            warn!(requested = p_value, clamped, "threshold outside [0, 1], clamping");
            clamped
        } else {
            p_value
        };
        let evidence_ratio = if evidence_ratio.is_nan() || evidence_ratio < 0.0 {
            warn!(
                requested = evidence_ratio,
                default = defaults.evidence_ratio,
                "evidence-ratio threshold invalid, using default"
            );
            defaults.evidence_ratio
        } else {
            evidence_ratio
        };
        Self {
            p_value,
            evidence_ratio,
        }
    }
}

/// One component of a discrete rate mixture (omega or synonymous rate).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateClass {
    #[serde(serialize_with = "serialize_number")]
    pub rate: f64,
    pub weight: f64,
}

// ---------------------------------------------------------------------------
// Tiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TileValue {
    Count(u64),
    #[serde(serialize_with = "serialize_number")]
    Number(f64),
    Text(String),
}

impl std::fmt::Display for TileValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<usize> for TileValue {
    fn from(value: usize) -> Self {
        Self::Count(value as u64)
    }
}

impl From<u64> for TileValue {
    fn from(value: u64) -> Self {
        Self::Count(value)
    }
}

impl From<String> for TileValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Describes the alignment and run (`Input`) or reports a finding (`Result`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TileCategory {
    Input,
    Result,
}

impl TileCategory {
    pub fn color(self) -> &'static str {
        match self {
            Self::Input => "asbestos",
            Self::Result => "midnight_blue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileSpec {
    /// Stable identifier; consumers should look tiles up by key, not position.
    pub key: &'static str,
    pub number: TileValue,
    pub description: String,
    pub category: TileCategory,
    pub color: &'static str,
    pub icon: &'static str,
}

impl TileSpec {
    pub fn new(
        key: &'static str,
        number: impl Into<TileValue>,
        description: impl Into<String>,
        category: TileCategory,
        icon: &'static str,
    ) -> Self {
        Self {
            key,
            number: number.into(),
            description: description.into(),
            category,
            color: category.color(),
            icon,
        }
    }
}

pub fn find_tile<'a>(tiles: &'a [TileSpec], key: &str) -> Option<&'a TileSpec> {
    tiles.iter().find(|tile| tile.key == key)
}

/// JSON has no infinities: `±∞` is written as `"Infinity"`/`"-Infinity"` so
/// it stays distinguishable from a missing value. NaN is written as `null`.
pub fn serialize_number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    match *value {
        v if v == f64::INFINITY => serializer.serialize_str("Infinity"),
        v if v == f64::NEG_INFINITY => serializer.serialize_str("-Infinity"),
        v if v.is_nan() => serializer.serialize_none(),
        v => serializer.serialize_f64(v),
    }
}

pub fn serialize_optional_number<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(number) => serialize_number(number, serializer),
        None => serializer.serialize_none(),
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Integer(i64),
    #[serde(serialize_with = "serialize_number")]
    Number(f64),
    Text(String),
    Missing,
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Missing, Cell::Number)
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Cell::Integer(value as i64)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

pub type TableRow = BTreeMap<String, Cell>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub key: String,
    pub label: String,
}

impl Header {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// Display color for one classification label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryColor {
    pub label: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub entries: &'static [(&'static str, &'static str)],
}

impl Palette {
    pub fn color(&self, label: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == label)
            .map(|(_, color)| *color)
    }

    pub fn categories(&self) -> Vec<CategoryColor> {
        self.entries
            .iter()
            .map(|&(label, color)| CategoryColor { label, color })
            .collect()
    }
}

pub const SITE_PALETTE: Palette = Palette {
    entries: &[
        ("Diversifying", "#e74c3c"),
        ("Purifying", "#3498db"),
        ("Neutral", "#95a5a6"),
        ("Invariable", "#ecf0f1"),
    ],
};

pub const EPISODIC_PALETTE: Palette = Palette {
    entries: &[
        ("Diversifying", "#e3243b"),
        ("Neutral", "#444"),
        ("Invariable", "#CCC"),
    ],
};

pub const BRANCH_PALETTE: Palette = Palette {
    entries: &[
        ("Significant", "#DC143C"),
        ("Tested", "#1f77b4"),
        ("Not-tested", "#cccccc"),
    ],
};

/// Rows, ordered headers and per-column render rules. Every header key is
/// either present in every row or rendered as a placeholder by its format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSpec {
    pub rows: Vec<TableRow>,
    pub headers: Vec<Header>,
    pub formats: BTreeMap<String, ColumnFormat>,
    pub categories: Vec<CategoryColor>,
}

impl TableSpec {
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            headers: Vec::new(),
            formats: BTreeMap::new(),
            categories: Vec::new(),
        }
    }

    pub fn format_of(&self, key: &str) -> ColumnFormat {
        self.formats
            .get(key)
            .copied()
            .unwrap_or_else(|| ColumnFormat::infer(key))
    }

    /// One row rendered in header order.
    pub fn render_row(&self, row: &TableRow) -> Vec<String> {
        self.headers
            .iter()
            .map(|header| self.format_of(&header.key).render(row.get(&header.key)))
            .collect()
    }

    pub fn column(&self, key: &str) -> Vec<Option<&Cell>> {
        self.rows.iter().map(|row| row.get(key)).collect()
    }

    /// Number of rows whose `class` cell equals `label`.
    pub fn count_class(&self, label: &str) -> usize {
        self.rows
            .iter()
            .filter(|row| matches!(row.get("class"), Some(Cell::Text(class)) if class == label))
            .count()
    }
}

/// Accumulates headers and formats side by side so they cannot drift.
#[derive(Debug, Default)]
pub struct TableLayout {
    headers: Vec<Header>,
    formats: BTreeMap<String, ColumnFormat>,
}

impl TableLayout {
    pub fn column(mut self, key: impl Into<String>, label: impl Into<String>, format: ColumnFormat) -> Self {
        self.push(key, label, format);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, label: impl Into<String>, format: ColumnFormat) {
        let key = key.into();
        self.formats.insert(key.clone(), format);
        self.headers.push(Header::new(key, label));
    }

    pub fn finish(self, rows: Vec<TableRow>, palette: &Palette) -> TableSpec {
        TableSpec {
            rows,
            headers: self.headers,
            formats: self.formats,
            categories: palette.categories(),
        }
    }
}
