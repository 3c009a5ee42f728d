//! Multiple instantaneous substitutions: nested likelihood ratio tests
//! between single, double and triple-hit codon models, with per-site
//! evidence ratios and log-likelihoods under each model.

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::common;
use crate::error::{SchemaError, SchemaResult};
use crate::format::{format_threshold, ColumnFormat};
use crate::model::{
    serialize_number, serialize_optional_number, Cell, Palette, TableLayout, TableRow, TableSpec, Thresholds,
    TileCategory, TileSpec,
};
use crate::schema::{self, fields, Field};

/// `p_value` gates the model comparisons, `evidence_ratio` the site support.
pub const DEFAULT_THRESHOLDS: Thresholds = Thresholds {
    p_value: 0.1,
    evidence_ratio: 5.0,
};

const TEST_LRT: &[&str] = &["LRT"];
const TEST_P_VALUE: &[&str] = &["p-value", "p"];

/// Site tables here carry no classification column.
const UNCLASSIFIED: Palette = Palette { entries: &[] };

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MultiHitAttributes {
    pub number_of_sequences: u64,
    pub number_of_sites: u64,
    pub number_of_partitions: u64,
    pub model_tests: usize,
    pub evidence_ratio_keys: Vec<String>,
    pub log_likelihood_keys: Vec<String>,
}

/// One nested model comparison, e.g. `Triple-hit vs single-hit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelTest {
    pub name: String,
    #[serde(serialize_with = "serialize_optional_number")]
    pub lrt: Option<f64>,
    #[serde(serialize_with = "serialize_optional_number")]
    pub p_value: Option<f64>,
}

impl ModelTest {
    pub fn is_significant(&self, threshold: f64) -> bool {
        self.p_value.is_some_and(|p| p < threshold)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestSummary {
    pub significant: Vec<String>,
    pub total: usize,
}

/// Observed span of one evidence-ratio series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRange {
    pub key: String,
    #[serde(serialize_with = "serialize_number")]
    pub min: f64,
    #[serde(serialize_with = "serialize_number")]
    pub max: f64,
}

/// Per-site vectors keyed by model comparison, in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteSeries {
    pub entries: Vec<(String, Vec<f64>)>,
}

impl SiteSeries {
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Length of the first series; later series may run shorter.
    pub fn site_count(&self) -> usize {
        self.entries.first().map_or(0, |(_, values)| values.len())
    }

    fn value(&self, series: usize, site: usize) -> Option<f64> {
        self.entries.get(series)?.1.get(site).copied()
    }
}

/// True when the document's test results compare hit models.
pub fn has_hit_tests(doc: &Value) -> bool {
    schema::resolve(doc, &fields::TEST_RESULTS)
        .and_then(|found| found.value.as_object())
        .is_some_and(|tests| tests.keys().any(|name| name.to_ascii_lowercase().contains("-hit")))
}

fn try_series(doc: &Value, field: &Field) -> SchemaResult<SiteSeries> {
    let Some(found) = schema::resolve(doc, field) else {
        return Ok(SiteSeries::default());
    };
    let path = found.path.join("/");
    let map = found
        .value
        .as_object()
        .ok_or_else(|| SchemaError::malformed(&path, "expected per-site series keyed by model"))?;
    let entries = schema::ordered_entries(map)
        .into_iter()
        .map(|(key, value)| {
            schema::numeric_series(value)
                .map(|values| (key.to_string(), values))
                .ok_or_else(|| SchemaError::malformed(format!("{path}/{key}"), "series holds a non-numeric value"))
        })
        .collect::<SchemaResult<Vec<_>>>()?;
    Ok(SiteSeries { entries })
}

pub fn try_evidence_ratios(doc: &Value) -> SchemaResult<SiteSeries> {
    try_series(doc, &fields::EVIDENCE_RATIOS)
}

pub fn try_site_log_likelihoods(doc: &Value) -> SchemaResult<SiteSeries> {
    try_series(doc, &fields::SITE_LOG_LIKELIHOOD)
}

/// Every entry under `test results`; a null entry counts as a test without
/// statistics.
pub fn try_tests(doc: &Value) -> SchemaResult<Vec<ModelTest>> {
    let Some(found) = schema::resolve(doc, &fields::TEST_RESULTS) else {
        return Ok(Vec::new());
    };
    let path = found.path.join("/");
    let tests = found
        .value
        .as_object()
        .ok_or_else(|| SchemaError::malformed(&path, "test results are not an object"))?;
    schema::ordered_entries(tests)
        .into_iter()
        .map(|(name, result)| {
            let (lrt, p_value) = match result {
                Value::Null => (None, None),
                Value::Object(result) => (
                    schema::first_number(result, TEST_LRT),
                    schema::first_number(result, TEST_P_VALUE),
                ),
                _ => {
                    return Err(SchemaError::malformed(
                        format!("{path}/{name}"),
                        "test result is not an object",
                    ))
                }
            };
            Ok(ModelTest {
                name: name.to_string(),
                lrt,
                p_value,
            })
        })
        .collect()
}

pub fn tests(doc: Option<&Value>) -> Vec<ModelTest> {
    let Some(doc) = schema::document(doc) else {
        return Vec::new();
    };
    try_tests(doc).unwrap_or_else(|error| {
        warn!(%error, "multi-hit test results unavailable");
        Vec::new()
    })
}

fn summarize(tests: &[ModelTest], threshold: f64) -> TestSummary {
    TestSummary {
        significant: tests
            .iter()
            .filter(|test| test.is_significant(threshold))
            .map(|test| test.name.clone())
            .collect(),
        total: tests.len(),
    }
}

/// Tests whose p-value falls strictly below `threshold`.
pub fn try_test_summary(doc: &Value, threshold: f64) -> SchemaResult<TestSummary> {
    Ok(summarize(&try_tests(doc)?, threshold))
}

pub fn test_summary(doc: Option<&Value>, threshold: f64) -> TestSummary {
    let Some(doc) = schema::document(doc) else {
        return TestSummary::default();
    };
    try_test_summary(doc, threshold).unwrap_or_else(|error| {
        warn!(%error, "multi-hit test summary unavailable");
        TestSummary::default()
    })
}

/// Minimum and maximum of each non-empty evidence-ratio series.
pub fn try_evidence_ratio_ranges(doc: &Value) -> SchemaResult<Vec<SeriesRange>> {
    Ok(try_evidence_ratios(doc)?
        .entries
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(key, values)| SeriesRange {
            key,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
        .collect())
}

pub fn evidence_ratio_ranges(doc: Option<&Value>) -> Vec<SeriesRange> {
    let Some(doc) = schema::document(doc) else {
        return Vec::new();
    };
    try_evidence_ratio_ranges(doc).unwrap_or_else(|error| {
        warn!(%error, "multi-hit evidence ratio ranges unavailable");
        Vec::new()
    })
}

/// Sites where at least one model comparison reaches `threshold`.
pub fn supported_sites(ratios: &SiteSeries, threshold: f64) -> usize {
    (0..ratios.site_count())
        .filter(|&site| {
            (0..ratios.entries.len()).any(|series| ratios.value(series, site).is_some_and(|er| er >= threshold))
        })
        .count()
}

fn is_multihit_document(doc: &Value) -> bool {
    schema::field_present(doc, &fields::TEST_RESULTS) || schema::field_present(doc, &fields::EVIDENCE_RATIOS)
}

pub fn try_extract(doc: &Value) -> SchemaResult<MultiHitAttributes> {
    if !is_multihit_document(doc) {
        return Ok(MultiHitAttributes::default());
    }
    let mut attributes = input_attributes(doc);
    attributes.model_tests = try_tests(doc)?.len();
    attributes.evidence_ratio_keys = try_evidence_ratios(doc)?.keys();
    attributes.log_likelihood_keys = try_site_log_likelihoods(doc)?.keys();
    Ok(attributes)
}

pub fn extract(doc: Option<&Value>) -> MultiHitAttributes {
    let Some(doc) = schema::document(doc) else {
        return MultiHitAttributes::default();
    };
    try_extract(doc).unwrap_or_else(|error| {
        warn!(%error, "multi-hit results unusable, extracting input attributes only");
        input_attributes(doc)
    })
}

fn input_attributes(doc: &Value) -> MultiHitAttributes {
    let counts = common::input_counts(doc, None);
    MultiHitAttributes {
        number_of_sequences: counts.sequences,
        number_of_sites: counts.sites,
        number_of_partitions: counts.partitions,
        ..MultiHitAttributes::default()
    }
}

/// Tile order: sequences, sites, partitions, tested branches, significant
/// model comparisons, sites with evidence-ratio support.
pub fn tiles(doc: Option<&Value>, thresholds: &Thresholds) -> Vec<TileSpec> {
    let Some(doc) = schema::document(doc) else {
        return Vec::new();
    };
    if !is_multihit_document(doc) {
        return Vec::new();
    }
    let counts = common::input_counts(doc, None);
    let mut tiles = common::input_tiles(counts, common::tested_branch_count(doc));

    match try_tests(doc) {
        Ok(tests) => {
            let summary = summarize(&tests, thresholds.p_value);
            tiles.push(TileSpec::new(
                "significant_tests",
                summary.significant.len(),
                format!(
                    "of {} model comparisons significant at p <{}",
                    summary.total,
                    format_threshold(thresholds.p_value)
                ),
                TileCategory::Result,
                "icon-plus icons",
            ));
        }
        Err(error) => warn!(%error, "multi-hit test results unusable, skipping test tile"),
    }
    match try_evidence_ratios(doc) {
        Ok(ratios) if !ratios.entries.is_empty() => tiles.push(TileSpec::new(
            "supported_sites",
            supported_sites(&ratios, thresholds.evidence_ratio),
            format!(
                "sites with evidence ratio ≥{} for a multi-hit model",
                format_threshold(thresholds.evidence_ratio)
            ),
            TileCategory::Result,
            "icon-energy icons",
        )),
        Ok(_) => {}
        Err(error) => warn!(%error, "multi-hit evidence ratios unusable, skipping site tile"),
    }
    tiles
}

/// Site column followed by one column per series, rows numbered from 1.
fn series_table(series: &SiteSeries, format: ColumnFormat) -> TableSpec {
    let site_count = series.site_count();
    if site_count == 0 {
        return TableSpec::empty();
    }
    let mut layout = TableLayout::default().column("codon", "Site", ColumnFormat::Count);
    for (key, _) in &series.entries {
        layout.push(key.clone(), key.clone(), format);
    }
    let rows = (0..site_count)
        .into_par_iter()
        .map(|site| {
            let mut row = TableRow::new();
            row.insert("codon".to_string(), Cell::from(site + 1));
            for (index, (key, _)) in series.entries.iter().enumerate() {
                row.insert(key.clone(), Cell::from(series.value(index, site)));
            }
            row
        })
        .collect();
    layout.finish(rows, &UNCLASSIFIED)
}

pub fn try_evidence_ratio_table(doc: &Value) -> SchemaResult<TableSpec> {
    Ok(series_table(&try_evidence_ratios(doc)?, ColumnFormat::Ratio))
}

pub fn try_log_likelihood_table(doc: &Value) -> SchemaResult<TableSpec> {
    Ok(series_table(&try_site_log_likelihoods(doc)?, ColumnFormat::Rate))
}

pub fn log_likelihood_table(doc: Option<&Value>) -> TableSpec {
    let Some(doc) = schema::document(doc) else {
        return TableSpec::empty();
    };
    try_log_likelihood_table(doc).unwrap_or_else(|error| {
        warn!(%error, "multi-hit site log-likelihood table unavailable");
        TableSpec::empty()
    })
}

/// The evidence-ratio table; thresholds do not change its rows.
pub fn try_table(doc: &Value, _thresholds: &Thresholds) -> SchemaResult<TableSpec> {
    try_evidence_ratio_table(doc)
}

pub fn table(doc: Option<&Value>, thresholds: &Thresholds) -> TableSpec {
    let Some(doc) = schema::document(doc) else {
        return TableSpec::empty();
    };
    try_table(doc, thresholds).unwrap_or_else(|error| {
        warn!(%error, "multi-hit table unavailable");
        TableSpec::empty()
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::methods::fixtures;
    use crate::model::{find_tile, TileValue};

    #[test]
    fn test_summary_counts_strictly_significant_comparisons() {
        // `Triple-hit vs double-hit` sits exactly at 0.1
        let summary = test_summary(Some(&fixtures::multihit()), DEFAULT_THRESHOLDS.p_value);
        assert_eq!(
            summary.significant,
            vec!["Double-hit vs single-hit".to_string(), "Triple-hit vs single-hit".to_string()]
        );
        assert_eq!(summary.total, 5);

        let strict = test_summary(Some(&fixtures::multihit()), 0.02);
        assert_eq!(strict.significant, vec!["Double-hit vs single-hit".to_string()]);
        assert_eq!(test_summary(None, 0.1), TestSummary::default());
    }

    #[test]
    fn null_test_entries_count_toward_the_total_only() {
        let doc = json!({"test results": {"Triple-hit vs double-hit": null, "Double-hit vs single-hit": {"LRT": 9.0, "p-value": 0.01}}});
        let tests = try_tests(&doc).unwrap();
        assert_eq!(tests[1].name, "Triple-hit vs double-hit");
        assert_eq!(tests[1].p_value, None);
        assert_eq!(try_test_summary(&doc, 0.1).unwrap().significant.len(), 1);

        let malformed = json!({"test results": {"Triple-hit vs single-hit": 0.01}});
        assert_eq!(try_tests(&malformed).unwrap_err().path(), "test results/Triple-hit vs single-hit");
    }

    #[test]
    fn evidence_ratio_table_has_one_column_per_comparison() {
        let table = table(Some(&fixtures::multihit()), &DEFAULT_THRESHOLDS);
        let keys = table.headers.iter().map(|header| header.key.as_str()).collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec!["codon", "Three-hit", "Three-hit islands vs 2-hit", "Three-hit vs three-hit islands", "Two-hit"]
        );
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[3]["codon"], Cell::Integer(4));
        assert_eq!(table.rows[1]["Two-hit"], Cell::Number(12.5));
        assert_eq!(table.format_of("Two-hit"), ColumnFormat::Ratio);
        assert!(table.categories.is_empty());
    }

    #[test]
    fn shorter_series_render_as_missing() {
        let doc = json!({"Evidence Ratios": {"A": [[1.0, 2.0, 3.0]], "B": [[4.0]]}});
        let table = try_evidence_ratio_table(&doc).unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[2]["B"], Cell::Missing);
        assert_eq!(table.render_row(&table.rows[2])[2], "N/A");
    }

    #[test]
    fn log_likelihood_table_follows_model_keys() {
        let table = log_likelihood_table(Some(&fixtures::multihit()));
        assert_eq!(table.headers.len(), 4);
        assert_eq!(table.rows[0]["Standard (single-hit)"], Cell::Number(-12.1));
        assert_eq!(table.format_of("Double-hit"), ColumnFormat::Rate);
        assert!(log_likelihood_table(None).rows.is_empty());
    }

    #[test]
    fn evidence_ratio_ranges_span_each_series() {
        let ranges = evidence_ratio_ranges(Some(&fixtures::multihit()));
        let two_hit = ranges.iter().find(|range| range.key == "Two-hit").unwrap();
        assert_eq!((two_hit.min, two_hit.max), (0.4, 12.5));
        assert_eq!(ranges.len(), 4);

        let doc = json!({"Evidence Ratios": {"A": [[]], "B": [[2.0, "inf"]]}});
        let ranges = try_evidence_ratio_ranges(&doc).unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].max, f64::INFINITY);
        assert_eq!(serde_json::to_value(&ranges[0]).unwrap()["max"], json!("Infinity"));
    }

    #[test]
    fn supported_sites_need_one_comparison_at_threshold() {
        let ratios = try_evidence_ratios(&fixtures::multihit()).unwrap();
        assert_eq!(supported_sites(&ratios, 5.0), 2);
        assert_eq!(supported_sites(&ratios, 100.0), 0);
        assert_eq!(supported_sites(&SiteSeries::default(), 1.0), 0);
    }

    #[test]
    fn attributes_list_series_keys() {
        let attributes = extract(Some(&fixtures::multihit()));
        assert_eq!(attributes.number_of_sequences, 6);
        assert_eq!(attributes.number_of_sites, 4);
        assert_eq!(attributes.model_tests, 5);
        assert_eq!(attributes.evidence_ratio_keys.len(), 4);
        assert_eq!(
            attributes.log_likelihood_keys,
            vec!["Double-hit", "Standard (single-hit)", "Triple-hit", "Triple-hit-island"]
        );
        assert_eq!(extract(Some(&json!({"input": {}}))), MultiHitAttributes::default());
    }

    #[test]
    fn malformed_series_degrade_to_input_attributes() {
        let mut doc = fixtures::multihit();
        doc["Evidence Ratios"]["Two-hit"] = json!({"site": 1});
        assert_eq!(try_extract(&doc).unwrap_err().path(), "Evidence Ratios/Two-hit");
        let attributes = extract(Some(&doc));
        assert_eq!(attributes.number_of_sequences, 6);
        assert!(attributes.evidence_ratio_keys.is_empty());
        assert!(table(Some(&doc), &DEFAULT_THRESHOLDS).rows.is_empty());
    }

    #[test]
    fn tiles_follow_documented_order() {
        let tiles = tiles(Some(&fixtures::multihit()), &DEFAULT_THRESHOLDS);
        let keys = tiles.iter().map(|tile| tile.key).collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec!["sequences", "sites", "partitions", "tested_branches", "significant_tests", "supported_sites"]
        );
        let significant = find_tile(&tiles, "significant_tests").unwrap();
        assert_eq!(significant.number, TileValue::Count(2));
        assert_eq!(significant.description, "of 5 model comparisons significant at p <0.1");
        assert_eq!(find_tile(&tiles, "supported_sites").unwrap().number, TileValue::Count(2));
    }

    #[test]
    fn hit_tests_identify_the_document() {
        assert!(has_hit_tests(&fixtures::multihit()));
        assert!(!has_hit_tests(&fixtures::absrel()));
        assert!(!has_hit_tests(&json!({"test results": [1, 2]})));
    }
}
