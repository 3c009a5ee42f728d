//! Episodic site model: per site, a synonymous rate and a two-class mixture
//! of non-synonymous rates across branches.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::common;
use crate::classify::{classify_episodic_site, SiteClass};
use crate::error::{SchemaError, SchemaResult};
use crate::evidence::evidence_ratio;
use crate::format::{format_ratio, format_threshold, ColumnFormat, MISSING};
use crate::model::{
    serialize_number, Palette, RateClass, TableSpec, Thresholds, TileCategory, TileSpec, EPISODIC_PALETTE,
};
use crate::schema::{self, fields, NamedRecord, SiteMatrix};


pub const DEFAULT_THRESHOLDS: Thresholds = Thresholds {
    p_value: 0.1,
    evidence_ratio: 100.0,
};

pub const DEFAULT_COLUMNS: &[(&str, &str)] = &[
    ("alpha", "Synonymous substitution rate at a site"),
    ("beta-", "Non-synonymous substitution rate at a site for the negative/neutral evolution component"),
    ("p-", "Mixture distribution weight allocated to beta-"),
    ("beta+", "Non-synonymous substitution rate at a site for the positive/neutral evolution component"),
    ("p+", "Mixture distribution weight allocated to beta+"),
    ("LRT", "Likelihood ratio test statistic for episodic diversification"),
    ("p-value", "Asymptotic p-value for episodic diversification"),
    ("# branches under selection", "Approximate number of branches under selection at this site"),
    ("Total branch length", "The total length of branches contributing to inference at this site"),
    ("MEME LogL", "Site Log-likelihood under the MEME model"),
    ("FEL LogL", "Site Log-likelihood under the FEL model"),
    ("Variation p", "Asymptotic p-value for dN/dS variation across branches"),
];

const ALPHA: &[&str] = &["alpha", "α"];
const BETA_MINUS: &[&str] = &["beta-", "β-", "β<sup>-</sup>"];
const WEIGHT_MINUS: &[&str] = &["p-"];
const BETA_PLUS: &[&str] = &["beta+", "β+", "β<sup>+</sup>"];
const WEIGHT_PLUS: &[&str] = &["p+"];
const P_VALUE: &[&str] = &["p-value"];
const SELECTED_BRANCHES: &[&str] = &["# branches under selection", "# branches with pos. selection", "Branches"];
const VARIATION_P: &[&str] = &["Variation p"];

/// Posterior class index of the beta+ component in branch attributes.
pub const DIVERSIFYING_RATE_CLASS: usize = 1;
const SITE_POSTERIORS: &str = "Posterior prob omega class by site";

/// Rate ratio reported when alpha is zero and beta is not.
const UNBOUNDED_OMEGA: f64 = 100.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemeAttributes {
    pub number_of_sequences: u64,
    pub number_of_sites: u64,
    pub number_of_partitions: u64,
    pub tested_branch_count: usize,
    pub resamples: Option<u64>,
    pub has_substitutions: bool,
    pub has_site_lrt: bool,
    pub has_background: bool,
    pub partition_sizes: Vec<usize>,
    /// 1-based (partition, codon) of every site in matrix order.
    pub site_index: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemeSite {
    pub partition: usize,
    pub codon: usize,
    pub record: NamedRecord,
    pub class: SiteClass,
}

/// Posterior that one branch is in the beta+ class at one site, and the
/// evidence ratio against the site's mixture weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchSitePosterior {
    pub branch: String,
    pub partition: usize,
    pub codon: usize,
    pub prior: Option<f64>,
    pub posterior: f64,
    #[serde(serialize_with = "serialize_number")]
    pub evidence_ratio: f64,
}

pub fn try_extract(doc: &Value) -> SchemaResult<MemeAttributes> {
    Ok(match schema::site_matrix(doc, DEFAULT_COLUMNS)? {
        Some(matrix) => attributes_from(doc, Some(&matrix)),
        None => MemeAttributes::default(),
    })
}

pub fn extract(doc: Option<&Value>) -> MemeAttributes {
    let Some(doc) = schema::document(doc) else {
        return MemeAttributes::default();
    };
    match schema::site_matrix(doc, DEFAULT_COLUMNS) {
        Ok(Some(matrix)) => attributes_from(doc, Some(&matrix)),
        Ok(None) => MemeAttributes::default(),
        Err(error) => {
            warn!(%error, "MEME site matrix unusable, extracting input attributes only");
            attributes_from(doc, None)
        }
    }
}

fn attributes_from(doc: &Value, matrix: Option<&SiteMatrix>) -> MemeAttributes {
    let counts = common::input_counts(doc, matrix);
    let mut partition_sizes = schema::partition_sizes(doc);
    if partition_sizes.is_empty() {
        if let Some(matrix) = matrix {
            partition_sizes = matrix.blocks.iter().map(|block| block.records.len()).collect();
        }
    }

    MemeAttributes {
        number_of_sequences: counts.sequences,
        number_of_sites: counts.sites,
        number_of_partitions: counts.partitions,
        tested_branch_count: common::tested_branch_count(doc),
        resamples: resample_count(doc),
        has_substitutions: schema::field_present(doc, &fields::SUBSTITUTIONS),
        has_site_lrt: matrix.is_some_and(|matrix| matrix.has_column(VARIATION_P)),
        has_background: common::has_background(doc),
        partition_sizes,
        site_index: matrix
            .map(|matrix| {
                matrix
                    .sites()
                    .iter()
                    .map(|site| (site.partition, site.codon))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Replicates per site in `MLE.LRT`; `None` when no resampling was run.
fn resample_count(doc: &Value) -> Option<u64> {
    let resamples = schema::resolve(doc, &fields::MLE_RESAMPLES)?.value;
    let (_, first_partition) = schema::partition_children(resamples).into_iter().next()?;
    let replicates = first_partition.as_array()?.first()?.as_array()?.len() as u64;
    (replicates > 0).then_some(replicates)
}

pub fn classify(record: &NamedRecord, threshold: f64) -> SiteClass {
    classify_episodic_site(
        record.first_of(ALPHA),
        record.first_of(BETA_MINUS),
        record.first_of(BETA_PLUS),
        record.first_of(P_VALUE),
        threshold,
    )
}

fn classify_matrix(matrix: &SiteMatrix, threshold: f64) -> Vec<MemeSite> {
    matrix
        .sites()
        .par_iter()
        .map(|site| MemeSite {
            partition: site.partition,
            codon: site.codon,
            record: site.record.clone(),
            class: classify(site.record, threshold),
        })
        .collect()
}

pub fn try_sites(doc: &Value, thresholds: &Thresholds) -> SchemaResult<Vec<MemeSite>> {
    Ok(schema::site_matrix(doc, DEFAULT_COLUMNS)?
        .map(|matrix| classify_matrix(&matrix, thresholds.p_value))
        .unwrap_or_default())
}

/// Sites with evidence of episodic diversifying selection at `threshold`.
pub fn count_sites_at(doc: Option<&Value>, threshold: f64) -> usize {
    sites_or_empty(doc, threshold)
        .iter()
        .filter(|site| site.class == SiteClass::Diversifying)
        .count()
}

/// Median of the approximate selected-branch count over selected sites.
pub fn median_selected_branches(doc: Option<&Value>, threshold: f64) -> Option<f64> {
    let mut branches = sites_or_empty(doc, threshold)
        .iter()
        .filter(|site| site.class == SiteClass::Diversifying)
        .filter_map(|site| site.record.first_of(SELECTED_BRANCHES))
        .collect::<Vec<_>>();
    common::median(&mut branches)
}

fn sites_or_empty(doc: Option<&Value>, threshold: f64) -> Vec<MemeSite> {
    let Some(doc) = schema::document(doc) else {
        return Vec::new();
    };
    let thresholds = Thresholds {
        p_value: threshold,
        ..DEFAULT_THRESHOLDS
    };
    try_sites(doc, &thresholds).unwrap_or_else(|error| {
        warn!(%error, "MEME sites unavailable");
        Vec::new()
    })
}

/// `beta / alpha` with 0/0 read as neutral (1) and x/0 capped.
pub fn omega_ratio(beta: f64, alpha: f64) -> f64 {
    if alpha > 0.0 {
        beta / alpha
    } else if beta > 0.0 {
        UNBOUNDED_OMEGA
    } else {
        1.0
    }
}

/// The site's two-class omega mixture: (beta-/alpha, p-), (beta+/alpha, p+).
pub fn omega_mixture(record: &NamedRecord) -> Option<[RateClass; 2]> {
    let alpha = record.first_of(ALPHA)?;
    let component = |beta: &[&str], weight: &[&str]| -> Option<RateClass> {
        Some(RateClass {
            rate: omega_ratio(record.first_of(beta)?, alpha),
            weight: record.first_of(weight)?,
        })
    };
    Some([
        component(BETA_MINUS, WEIGHT_MINUS)?,
        component(BETA_PLUS, WEIGHT_PLUS)?,
    ])
}

/// Per branch and site posterior of `rate_class` from the branch attributes,
/// with the evidence ratio against the site's `p+` weight. Codons continue
/// across partitions in partition order.
pub fn try_branch_site_posteriors(doc: &Value, rate_class: usize) -> SchemaResult<Vec<BranchSitePosterior>> {
    let Some(attributes) = schema::resolve(doc, &fields::BRANCH_ATTRIBUTES) else {
        return Ok(Vec::new());
    };
    let matrix = schema::site_matrix(doc, DEFAULT_COLUMNS)?;
    let priors = matrix
        .iter()
        .flat_map(|matrix| matrix.blocks.iter())
        .map(|block| (block.id.as_str(), block.records.as_slice()))
        .collect::<BTreeMap<_, _>>();
    let attributes_path = attributes.path.join("/");

    let mut out = Vec::new();
    let mut offset = 0;
    for (ordinal, (partition, branches)) in schema::partition_children(attributes.value).into_iter().enumerate() {
        let records = priors.get(partition.as_str()).copied().unwrap_or_default();
        let mut width = 0;
        for (branch, values) in schema::keyed_children(branches) {
            let Some(by_class) = values.get(SITE_POSTERIORS) else {
                continue;
            };
            let path = format!("{attributes_path}/{partition}/{branch}/{SITE_POSTERIORS}");
            let posteriors = match by_class.get(rate_class) {
                Some(series) => schema::numeric_series(series)
                    .ok_or_else(|| SchemaError::malformed(&path, "posteriors are not numeric"))?,
                None => continue,
            };
            width = width.max(posteriors.len());
            for (index, posterior) in posteriors.into_iter().enumerate() {
                let prior = records.get(index).and_then(|record| record.first_of(WEIGHT_PLUS));
                out.push(BranchSitePosterior {
                    branch: branch.clone(),
                    partition: ordinal + 1,
                    codon: offset + index + 1,
                    prior,
                    posterior,
                    evidence_ratio: evidence_ratio(prior.unwrap_or(f64::NAN), posterior),
                });
            }
        }
        offset += if records.is_empty() { width } else { records.len() };
    }
    Ok(out)
}

pub fn branch_site_posteriors(doc: Option<&Value>, rate_class: usize) -> Vec<BranchSitePosterior> {
    let Some(doc) = schema::document(doc) else {
        return Vec::new();
    };
    try_branch_site_posteriors(doc, rate_class).unwrap_or_else(|error| {
        warn!(%error, "MEME branch-site posteriors unavailable");
        Vec::new()
    })
}

/// Tile order: sequences, sites, partitions, tested branches, bootstrap
/// replicates (when resampled), selected sites, median branches per selected
/// site, sites with dN/dS variation (when reported).
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
            warn!(%error, "MEME site matrix unusable, emitting input tiles only");
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
    if let Some(replicates) = attributes.resamples {
        tiles.push(common::bootstrap_tile(replicates));
    }
    let Some(sites) = sites else {
        return tiles;
    };

    let threshold = format_threshold(thresholds.p_value);
    let selected = sites
        .iter()
        .filter(|site| site.class == SiteClass::Diversifying)
        .collect::<Vec<_>>();
    let mut branches = selected
        .iter()
        .filter_map(|site| site.record.first_of(SELECTED_BRANCHES))
        .collect::<Vec<_>>();

    tiles.push(TileSpec::new(
        "selected_sites",
        selected.len(),
        format!("sites subject to episodic diversifying selection at p≤{threshold}"),
        TileCategory::Result,
        "icon-plus icons",
    ));
    tiles.push(TileSpec::new(
        "branches_per_selected_site",
        common::median(&mut branches).map_or_else(|| MISSING.to_string(), format_ratio),
        "median branches with support for selection per selected site",
        TileCategory::Result,
        "icon-share icons",
    ));
    if attributes.has_site_lrt {
        let varying = sites
            .iter()
            .filter(|site| site.record.first_of(VARIATION_P).is_some_and(|p| p <= thresholds.p_value))
            .count();
        tiles.push(TileSpec::new(
            "variable_omega_sites",
            varying,
            format!("sites with dN/dS variation across branches at p≤{threshold}"),
            TileCategory::Result,
            "icon-energy icons",
        ));
    }
    tiles
}

pub fn try_table(doc: &Value, thresholds: &Thresholds) -> SchemaResult<TableSpec> {
    try_table_with(doc, thresholds, &EPISODIC_PALETTE)
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
        warn!(%error, "MEME table unavailable");
        TableSpec::empty()
    })
}
