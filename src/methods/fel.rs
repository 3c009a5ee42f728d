//! Fixed-effects site model: one alpha, one beta and one p-value per site.

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::common;
use crate::classify::{classify_site, RateEvidence, SiteClass};
use crate::error::SchemaResult;
use crate::format::{format_threshold, ColumnFormat};
use crate::model::{Palette, TableSpec, Thresholds, TileCategory, TileSpec, SITE_PALETTE};
use crate::schema::{self, fields, NamedRecord, SiteMatrix};


pub const DEFAULT_THRESHOLDS: Thresholds = Thresholds {
    p_value: 0.1,
    evidence_ratio: 100.0,
};

/// Column layout assumed when a document carries no `MLE.headers`.
pub const DEFAULT_COLUMNS: &[(&str, &str)] = &[
    ("alpha", "Synonymous substitution rate at a site"),
    ("beta", "Non-synonymous substitution rate at a site"),
    ("alpha=beta", "The rate estimate under the neutral model"),
    ("LRT", "Likelihood ratio test statistic for beta = alpha, versus beta != alpha"),
    ("p-value", "Asymptotic p-value for evidence of selection, i.e. beta != alpha"),
    ("Total branch length", "The total length of branches contributing to inference at this site"),
];

const ALPHA: &[&str] = &["alpha", "α"];
const BETA: &[&str] = &["beta", "β"];
const P_VALUE: &[&str] = &["p-value", "p"];
const LRT: &[&str] = &["LRT"];
const CONFIDENCE_COLUMNS: &[&str] = &["dN/dS LB", "dN/dS MLE", "dN/dS UB"];
const ASYMPTOTIC_P: &[&str] = &["p-asmp"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FelAttributes {
    pub number_of_sequences: u64,
    pub number_of_sites: u64,
    pub number_of_partitions: u64,
    pub tested_branch_count: usize,
    pub variable_site_count: usize,
    pub has_srv: bool,
    pub has_ci: bool,
    pub has_positive_lrt: bool,
    pub has_pasmt: bool,
    pub has_background: bool,
    pub bootstrap_replicates: Option<u64>,
}

/// A classified site record positioned in the alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct FelSite {
    pub partition: usize,
    pub codon: usize,
    pub record: NamedRecord,
    pub class: SiteClass,
}

pub fn try_extract(doc: &Value) -> SchemaResult<FelAttributes> {
    Ok(match schema::site_matrix(doc, DEFAULT_COLUMNS)? {
        Some(matrix) => attributes_from(doc, Some(&matrix)),
        None => FelAttributes::default(),
    })
}

/// Zeroed attributes without a site matrix. A malformed matrix still yields
/// the counts that do not depend on it.
pub fn extract(doc: Option<&Value>) -> FelAttributes {
    let Some(doc) = schema::document(doc) else {
        return FelAttributes::default();
    };
    match schema::site_matrix(doc, DEFAULT_COLUMNS) {
        Ok(Some(matrix)) => attributes_from(doc, Some(&matrix)),
        Ok(None) => FelAttributes::default(),
        Err(error) => {
            warn!(%error, "FEL site matrix unusable, extracting input attributes only");
            attributes_from(doc, None)
        }
    }
}

fn attributes_from(doc: &Value, matrix: Option<&SiteMatrix>) -> FelAttributes {
    let counts = common::input_counts(doc, matrix);
    let records = || matrix.into_iter().flat_map(SiteMatrix::records);

    FelAttributes {
        number_of_sequences: counts.sequences,
        number_of_sites: counts.sites,
        number_of_partitions: counts.partitions,
        tested_branch_count: common::tested_branch_count(doc),
        variable_site_count: records()
            .filter(|record| {
                let total = record.first_of(ALPHA).unwrap_or(0.0) + record.first_of(BETA).unwrap_or(0.0);
                total > 0.0
            })
            .count(),
        has_srv: records().any(|record| record.first_of(ALPHA).is_some_and(|alpha| alpha > 0.0 && alpha != 1.0)),
        has_ci: schema::field_present(doc, &fields::CONFIDENCE_INTERVALS)
            || matrix.is_some_and(|matrix| matrix.has_column(CONFIDENCE_COLUMNS)),
        has_positive_lrt: records().any(|record| record.first_of(LRT).is_some_and(|lrt| lrt > 0.0)),
        has_pasmt: schema::field_present(doc, &fields::MLE_RESAMPLES)
            || matrix.is_some_and(|matrix| matrix.has_column(ASYMPTOTIC_P)),
        has_background: common::has_background(doc),
        bootstrap_replicates: schema::resolve_count(doc, &fields::SIMULATED).filter(|count| *count > 0),
    }
}

pub fn classify(record: &NamedRecord, threshold: f64) -> SiteClass {
    classify_site(
        &RateEvidence {
            synonymous: record.first_of(ALPHA),
            nonsynonymous: record.first_of(BETA),
            p_value: record.first_of(P_VALUE),
        },
        threshold,
    )
}

fn classify_matrix(matrix: &SiteMatrix, threshold: f64) -> Vec<FelSite> {
    matrix
        .sites()
        .par_iter()
        .map(|site| FelSite {
            partition: site.partition,
            codon: site.codon,
            record: site.record.clone(),
            class: classify(site.record, threshold),
        })
        .collect()
}

pub fn try_sites(doc: &Value, thresholds: &Thresholds) -> SchemaResult<Vec<FelSite>> {
    Ok(schema::site_matrix(doc, DEFAULT_COLUMNS)?
        .map(|matrix| classify_matrix(&matrix, thresholds.p_value))
        .unwrap_or_default())
}

/// Tile order: sequences, sites, partitions, tested branches, variable sites,
/// bootstrap replicates (when resampled), diversifying sites, purifying sites.
pub fn tiles(doc: Option<&Value>, thresholds: &Thresholds) -> Vec<TileSpec> {
    let Some(doc) = schema::document(doc) else {
        return Vec::new();
    };
    let (attributes, sites) = match schema::site_matrix(doc, DEFAULT_COLUMNS) {
        Ok(None) => return Vec::new(),
        Ok(Some(matrix)) => (
            attributes_from(doc, Some(&matrix)),
            Some(classify_matrix(&matrix, thresholds.p_value)),
        ),
        Err(error) => {
            warn!(%error, "FEL site matrix unusable, emitting input tiles only");
            (attributes_from(doc, None), None)
        }
    };

    let mut tiles = common::input_tiles(
        common::InputCounts {
            sequences: attributes.number_of_sequences,
            sites: attributes.number_of_sites,
            partitions: attributes.number_of_partitions,
        },
        attributes.tested_branch_count,
    );
    let Some(sites) = sites else {
        return tiles;
    };

    tiles.push(TileSpec::new(
        "variable_sites",
        attributes.variable_site_count,
        "non-invariant sites tested",
        TileCategory::Input,
        "icon-check icons",
    ));
    if let Some(replicates) = attributes.bootstrap_replicates {
        tiles.push(common::bootstrap_tile(replicates));
    }
    let count = |class: SiteClass| sites.iter().filter(|site| site.class == class).count();
    let threshold = format_threshold(thresholds.p_value);
    tiles.push(TileSpec::new(
        "diversifying_sites",
        count(SiteClass::Diversifying),
        format!("sites under diversifying positive selection at p≤{threshold}"),
        TileCategory::Result,
        "icon-plus icons",
    ));
    tiles.push(TileSpec::new(
        "purifying_sites",
        count(SiteClass::Purifying),
        format!("sites under purifying negative selection at p≤{threshold}"),
        TileCategory::Result,
        "icon-minus icons",
    ));
    tiles
}

pub fn try_table(doc: &Value, thresholds: &Thresholds) -> SchemaResult<TableSpec> {
    try_table_with(doc, thresholds, &SITE_PALETTE)
}

pub fn try_table_with(doc: &Value, thresholds: &Thresholds, palette: &Palette) -> SchemaResult<TableSpec> {
    let Some(matrix) = schema::site_matrix(doc, DEFAULT_COLUMNS)? else {
        return Ok(TableSpec::empty());
    };
    let mut layout = common::site_layout(&matrix);
    layout.push(
        "class",
        format!("Site classification at p≤{}", format_threshold(thresholds.p_value)),
        ColumnFormat::Text,
    );
    let rows = classify_matrix(&matrix, thresholds.p_value)
        .par_iter()
        .map(|site| {
            let mut row = common::site_row(site.partition, site.codon, &site.record);
            row.insert("class".to_string(), site.class.label().into());
            row
        })
        .collect();
    Ok(layout.finish(rows, palette))
}

pub fn table(doc: Option<&Value>, thresholds: &Thresholds) -> TableSpec {
    let Some(doc) = schema::document(doc) else {
        return TableSpec::empty();
    };
    try_table(doc, thresholds).unwrap_or_else(|error| {
        warn!(%error, "FEL table unavailable");
        TableSpec::empty()
    })
}
