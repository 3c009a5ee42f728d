//! Branch-site random effects model: one test per branch, with a per-branch
//! omega mixture and optional per-site likelihood profiles.
//!
//! Engines have written branch results in two layouts: a `branch attributes`
//! map (optionally keyed by partition) and a `test results` map keyed by
//! branch. Both are read and merged by branch name, branch attributes first.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::common;
use crate::classify::{classify_branch, BranchClass};
use crate::error::{SchemaError, SchemaResult};
use crate::evidence::{bayes_factor_from_lrt, holm_bonferroni, likelihood_ratio, BayesTier, Significance};
use crate::format::{format_fixed, format_threshold, ColumnFormat, MISSING};
use crate::model::{
    serialize_number, serialize_optional_number, Cell, Palette, RateClass, TableLayout, TableRow, TableSpec, Thresholds,
    TileCategory, TileSpec, BRANCH_PALETTE,
};
use crate::schema::{self, fields};

#[cfg(test)]
mod tests;

pub const DEFAULT_THRESHOLDS: Thresholds = Thresholds {
    p_value: 0.05,
    evidence_ratio: 100.0,
};

const UNCORRECTED_P: &[&str] = &["Uncorrected P-value", "uncorrected p"];
const CORRECTED_P: &[&str] = &["Corrected P-value", "corrected p", "p"];
const RATE_CLASS_COUNT: &[&str] = &["Rate classes"];
const BRANCH_LRT: &[&str] = &["LRT"];
const BAYES_FACTOR: &[&str] = &["Bayes Factor"];
const RATE_DISTRIBUTIONS: &str = "Rate Distributions";
const DOUBLE_HIT: &str = "rate at which 2 nucleotides are changed instantly within a single codon";
const TRIPLE_HIT: &str = "rate at which 3 nucleotides are changed instantly within a single codon";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbsrelBranch {
    pub name: String,
    pub tested: bool,
    pub rate_classes: Option<u64>,
    pub uncorrected_p: Option<f64>,
    pub corrected_p: Option<f64>,
    /// `corrected_p` was filled in by Holm-Bonferroni over the tested family.
    pub holm_corrected: bool,
    #[serde(serialize_with = "serialize_optional_number")]
    pub lrt: Option<f64>,
    #[serde(serialize_with = "serialize_optional_number")]
    pub bayes_factor: Option<f64>,
    pub omega_distribution: Vec<RateClass>,
    pub double_hit_rate: Option<f64>,
    pub triple_hit_rate: Option<f64>,
}

impl AbsrelBranch {
    pub fn significance(&self, threshold: f64) -> Significance {
        Significance::assess(self.uncorrected_p, self.corrected_p, threshold)
    }

    pub fn bayes_tier(&self) -> Option<BayesTier> {
        self.bayes_factor.map(BayesTier::from_bayes_factor)
    }

    /// Declared rate-class count, else the size of the reported mixture.
    pub fn rate_class_count(&self) -> usize {
        self.rate_classes
            .map(|count| count as usize)
            .unwrap_or(self.omega_distribution.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelFit {
    pub name: String,
    pub log_likelihood: Option<f64>,
    pub aic: Option<f64>,
    pub parameters: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FitSummary {
    pub baseline: Option<ModelFit>,
    pub full: Option<ModelFit>,
    /// `2 * (logL_full - logL_baseline)`, reported as computed.
    #[serde(serialize_with = "serialize_optional_number")]
    pub likelihood_ratio: Option<f64>,
}

/// Evidence ratio for selection on one branch at one site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSite {
    pub branch: String,
    pub site: usize,
    #[serde(serialize_with = "serialize_number")]
    pub evidence_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateClassRange {
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MultiHitRates {
    pub double_hit: Option<f64>,
    pub triple_hit: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AbsrelAttributes {
    pub number_of_sequences: u64,
    pub number_of_sites: u64,
    pub number_of_partitions: u64,
    pub tested_branch_count: usize,
    pub positive_results: u64,
    pub reported_p_threshold: Option<f64>,
    pub profilable_branches: Vec<String>,
    pub srv_rate_classes: usize,
    pub srv_distribution: Vec<RateClass>,
    pub omega_rate_classes: RateClassRange,
    pub multi_hit: MultiHitRates,
    pub partition_sizes: Vec<usize>,
    pub has_substitutions: bool,
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

/// Per-branch objects from every layout, merged by name in first-seen order.
fn branch_sources<'a>(doc: &'a Value) -> SchemaResult<Vec<(String, Vec<&'a Map<String, Value>>)>> {
    let mut order: Vec<(String, Vec<&'a Map<String, Value>>)> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    let mut add = |name: String, entry: &'a Value| {
        let Some(map) = entry.as_object() else {
            return;
        };
        match index.get(&name) {
            Some(&at) => order[at].1.push(map),
            None => {
                index.insert(name.clone(), order.len());
                order.push((name, vec![map]));
            }
        }
    };

    if let Some(attributes) = schema::resolve(doc, &fields::BRANCH_ATTRIBUTES) {
        if !attributes.value.is_object() {
            return Err(SchemaError::malformed(
                attributes.path.join("/"),
                "expected branches keyed by name",
            ));
        }
        let partitions = schema::partition_children(attributes.value);
        if partitions.is_empty() {
            for (name, entry) in schema::keyed_children(attributes.value) {
                if name != "attributes" {
                    add(name, entry);
                }
            }
        } else {
            for (_, partition) in partitions {
                for (name, entry) in schema::keyed_children(partition) {
                    add(name, entry);
                }
            }
        }
    }

    if let Some(results) = schema::resolve(doc, &fields::TEST_RESULTS) {
        for (name, entry) in schema::keyed_children(results.value) {
            add(name, entry);
        }
    }
    Ok(order)
}

fn number(maps: &[&Map<String, Value>], keys: &[&str]) -> Option<f64> {
    maps.iter().find_map(|map| schema::first_number(map, keys))
}

fn branch_from(name: String, maps: &[&Map<String, Value>], tested: bool) -> AbsrelBranch {
    let distributions = maps.iter().find_map(|map| map.get(RATE_DISTRIBUTIONS));
    let side_rate = |key: &str| {
        number(maps, &[key]).or_else(|| distributions.and_then(|value| value.get(key)).and_then(schema::as_f64))
    };
    let lrt = number(maps, BRANCH_LRT);

    AbsrelBranch {
        name,
        tested,
        rate_classes: number(maps, RATE_CLASS_COUNT)
            .filter(|count| count.is_finite() && *count >= 0.0)
            .map(|count| count.round() as u64),
        uncorrected_p: number(maps, UNCORRECTED_P),
        corrected_p: number(maps, CORRECTED_P),
        holm_corrected: false,
        lrt,
        bayes_factor: number(maps, BAYES_FACTOR).or_else(|| lrt.map(bayes_factor_from_lrt)),
        omega_distribution: distributions.map(common::rate_classes).unwrap_or_default(),
        double_hit_rate: side_rate(DOUBLE_HIT),
        triple_hit_rate: side_rate(TRIPLE_HIT),
    }
}

/// Every branch with reported results. The explicit `tested` map decides
/// which branches were tested; without one, a branch that carries a p-value
/// counts as tested. Missing corrected p-values are filled by Holm-Bonferroni
/// over the tested branches that report an uncorrected p-value.
pub fn try_branches(doc: &Value) -> SchemaResult<Vec<AbsrelBranch>> {
    let tested_map = schema::tested_map(doc);
    let mut branches = branch_sources(doc)?
        .into_iter()
        .map(|(name, maps)| {
            let has_p = number(&maps, UNCORRECTED_P).is_some() || number(&maps, CORRECTED_P).is_some();
            let tested = match &tested_map {
                Some(map) => map.is_tested(&name),
                None => has_p,
            };
            branch_from(name, &maps, tested)
        })
        .collect::<Vec<_>>();

    let family = branches
        .iter()
        .enumerate()
        .filter(|(_, branch)| branch.tested)
        .filter_map(|(at, branch)| branch.uncorrected_p.map(|p| (at, p)))
        .collect::<Vec<_>>();
    if family.iter().any(|(at, _)| branches[*at].corrected_p.is_none()) {
        let adjusted = holm_bonferroni(&family.iter().map(|(_, p)| *p).collect::<Vec<_>>());
        for ((at, _), corrected) in family.iter().zip(adjusted) {
            let branch = &mut branches[*at];
            if branch.corrected_p.is_none() {
                debug!(branch = %branch.name, corrected, "corrected p-value filled by Holm-Bonferroni");
                branch.corrected_p = Some(corrected);
                branch.holm_corrected = true;
            }
        }
    }
    Ok(branches)
}

pub fn branches(doc: Option<&Value>) -> Vec<AbsrelBranch> {
    let Some(doc) = schema::document(doc) else {
        return Vec::new();
    };
    try_branches(doc).unwrap_or_else(|error| {
        warn!(%error, "aBSREL branch results unavailable");
        Vec::new()
    })
}

pub fn classify(branch: &AbsrelBranch, threshold: f64) -> BranchClass {
    classify_branch(branch.tested, branch.corrected_p, threshold)
}

// ---------------------------------------------------------------------------
// Model fits
// ---------------------------------------------------------------------------

fn model_fit(name: &str, value: &Value) -> Option<ModelFit> {
    let map = value.as_object()?;
    Some(ModelFit {
        name: name.to_string(),
        log_likelihood: schema::first_number(map, fields::FIT_LOG_LIKELIHOOD),
        aic: schema::first_number(map, fields::FIT_AIC),
        parameters: schema::first_number(map, fields::FIT_PARAMETERS)
            .filter(|count| count.is_finite() && *count >= 0.0)
            .map(|count| count.round() as u64),
    })
}

/// Every fitted model in the document, in key order.
pub fn model_fits(doc: Option<&Value>) -> Vec<ModelFit> {
    schema::document(doc)
        .and_then(|doc| schema::lookup(doc, &["fits"]))
        .map(|fits| {
            schema::keyed_children(fits)
                .into_iter()
                .filter_map(|(name, fit)| model_fit(&name, fit))
                .collect()
        })
        .unwrap_or_default()
}

pub fn fit_summary(doc: Option<&Value>) -> FitSummary {
    let Some(doc) = schema::document(doc) else {
        return FitSummary::default();
    };
    let resolve_fit = |field: &schema::Field| {
        let found = schema::resolve(doc, field)?;
        model_fit(found.path.last().copied().unwrap_or(field.name), found.value)
    };
    let baseline = resolve_fit(&fields::BASELINE_FIT);
    let full = resolve_fit(&fields::FULL_FIT);
    let likelihood_ratio = match (&baseline, &full) {
        (Some(baseline), Some(full)) => baseline
            .log_likelihood
            .zip(full.log_likelihood)
            .map(|(null, alternative)| likelihood_ratio(null, alternative)),
        _ => None,
    };
    FitSummary {
        baseline,
        full,
        likelihood_ratio,
    }
}

// ---------------------------------------------------------------------------
// Site profiles
// ---------------------------------------------------------------------------

fn unconstrained_log_likelihoods(doc: &Value) -> SchemaResult<Option<Vec<f64>>> {
    let Some(site_ll) = schema::resolve(doc, &fields::SITE_LOG_LIKELIHOOD) else {
        return Ok(None);
    };
    let Some(unconstrained) = site_ll.value.get("unconstrained").filter(|value| !value.is_null()) else {
        return Ok(None);
    };
    schema::numeric_series(unconstrained)
        .or_else(|| schema::lookup(unconstrained, &["0"]).and_then(schema::numeric_series))
        .map(Some)
        .ok_or_else(|| {
            SchemaError::malformed(
                format!("{}/unconstrained", site_ll.path.join("/")),
                "expected a numeric per-site series",
            )
        })
}

/// Branch-by-site evidence ratios `exp(logL_unconstrained - logL_branch)`
/// for every branch with a constrained site profile.
pub fn try_profile_sites(doc: &Value) -> SchemaResult<Vec<ProfileSite>> {
    let Some(unconstrained) = unconstrained_log_likelihoods(doc)? else {
        return Ok(Vec::new());
    };
    let Some(site_ll) = schema::resolve(doc, &fields::SITE_LOG_LIKELIHOOD) else {
        return Ok(Vec::new());
    };
    let Some(tested) = site_ll.value.get("tested") else {
        return Ok(Vec::new());
    };
    let base_path = format!("{}/tested", site_ll.path.join("/"));

    let per_branch = schema::keyed_children(tested)
        .par_iter()
        .map(|(branch, series)| -> SchemaResult<Vec<ProfileSite>> {
            let constrained = schema::numeric_series(series).ok_or_else(|| {
                SchemaError::malformed(format!("{base_path}/{branch}"), "expected a numeric per-site series")
            })?;
            Ok(constrained
                .iter()
                .zip(&unconstrained)
                .enumerate()
                .map(|(index, (branch_ll, free_ll))| {
                    let ratio = (free_ll - branch_ll).exp();
                    ProfileSite {
                        branch: branch.clone(),
                        site: index + 1,
                        evidence_ratio: if ratio.is_nan() { 1.0 } else { ratio },
                    }
                })
                .collect::<Vec<_>>())
        })
        .collect::<SchemaResult<Vec<_>>>()?;
    Ok(per_branch.into_iter().flatten().collect())
}

pub fn profile_sites(doc: Option<&Value>) -> Vec<ProfileSite> {
    let Some(doc) = schema::document(doc) else {
        return Vec::new();
    };
    try_profile_sites(doc).unwrap_or_else(|error| {
        warn!(%error, "aBSREL site profiles unavailable");
        Vec::new()
    })
}

/// Sites per branch whose evidence ratio reaches `threshold`.
fn supported_sites(profiles: &[ProfileSite], threshold: f64) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for profile in profiles.iter().filter(|profile| profile.evidence_ratio >= threshold) {
        *counts.entry(profile.branch.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Branches per site (index `site - 1`) whose evidence ratio reaches
/// `threshold`, in one pass over the profiles.
fn supported_branches_by_site(profiles: &[ProfileSite], site_count: usize, threshold: f64) -> Vec<usize> {
    let mut counts = vec![0; site_count];
    for profile in profiles.iter().filter(|profile| profile.evidence_ratio >= threshold) {
        if let Some(count) = profile.site.checked_sub(1).and_then(|index| counts.get_mut(index)) {
            *count += 1;
        }
    }
    counts
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

pub fn try_extract(doc: &Value) -> SchemaResult<AbsrelAttributes> {
    let branches = try_branches(doc)?;
    Ok(attributes_from(doc, &branches))
}

/// Zeroed attributes when the document reports no branches.
pub fn extract(doc: Option<&Value>) -> AbsrelAttributes {
    let Some(doc) = schema::document(doc) else {
        return AbsrelAttributes::default();
    };
    attributes_from(doc, &branches(Some(doc)))
}

fn attributes_from(doc: &Value, branches: &[AbsrelBranch]) -> AbsrelAttributes {
    if branches.is_empty() {
        return AbsrelAttributes::default();
    }
    let counts = common::input_counts(doc, None);
    let reported_p_threshold = schema::resolve_f64(doc, &fields::REPORTED_P_THRESHOLD);

    let tested_branch_count = schema::tested_map(doc)
        .map(|tested| tested.median_tested())
        .unwrap_or_else(|| branches.iter().filter(|branch| branch.tested).count());
    let positive_results = schema::resolve_count(doc, &fields::POSITIVE_RESULTS).unwrap_or_else(|| {
        let threshold = reported_p_threshold.unwrap_or(DEFAULT_THRESHOLDS.p_value);
        branches
            .iter()
            .filter(|branch| classify(branch, threshold).is_significant())
            .count() as u64
    });

    let srv_distribution = schema::resolve(doc, &fields::SRV_DISTRIBUTION)
        .map(|found| common::rate_classes(found.value))
        .unwrap_or_default();
    let srv_rate_classes = schema::resolve(doc, &fields::SYNONYMOUS_POSTERIORS)
        .and_then(|found| found.value.as_array().map(Vec::len))
        .unwrap_or(srv_distribution.len());

    let class_counts = branches
        .iter()
        .map(AbsrelBranch::rate_class_count)
        .filter(|count| *count > 0)
        .collect::<Vec<_>>();
    let omega_rate_classes = RateClassRange {
        min: class_counts.iter().copied().min().unwrap_or(0),
        max: class_counts.iter().copied().max().unwrap_or(0),
    };

    let median_of = |rate: fn(&AbsrelBranch) -> Option<f64>| {
        let mut values = branches.iter().filter_map(rate).collect::<Vec<_>>();
        common::median(&mut values)
    };

    AbsrelAttributes {
        number_of_sequences: counts.sequences,
        number_of_sites: counts.sites,
        number_of_partitions: counts.partitions.max(1),
        tested_branch_count,
        positive_results,
        reported_p_threshold,
        profilable_branches: schema::resolve(doc, &fields::SITE_LOG_LIKELIHOOD)
            .and_then(|found| found.value.get("tested"))
            .map(|tested| schema::keyed_children(tested).into_iter().map(|(name, _)| name).collect())
            .unwrap_or_default(),
        srv_rate_classes,
        srv_distribution,
        omega_rate_classes,
        multi_hit: MultiHitRates {
            double_hit: median_of(|branch| branch.double_hit_rate),
            triple_hit: median_of(|branch| branch.triple_hit_rate),
        },
        partition_sizes: schema::partition_sizes(doc),
        has_substitutions: schema::field_present(doc, &fields::SUBSTITUTIONS),
    }
}

// ---------------------------------------------------------------------------
// Tiles
// ---------------------------------------------------------------------------

/// Tile order: sequences, sites, partitions, tested branches, rate classes
/// per branch, synonymous rate variation, branches under selection, sites
/// per tested branch with ER support (when profiled), multi-hit rates (when
/// reported).
pub fn tiles(doc: Option<&Value>, thresholds: &Thresholds) -> Vec<TileSpec> {
    let Some(doc) = schema::document(doc) else {
        return Vec::new();
    };
    let branches = branches(Some(doc));
    if branches.is_empty() {
        return Vec::new();
    }
    let attributes = attributes_from(doc, &branches);

    let mut tiles = common::input_tiles(
        common::InputCounts {
            sequences: attributes.number_of_sequences,
            sites: attributes.number_of_sites,
            partitions: attributes.number_of_partitions,
        },
        attributes.tested_branch_count,
    );
    tiles.push(TileSpec::new(
        "rate_classes",
        format!(
            "{}-{}",
            attributes.omega_rate_classes.min, attributes.omega_rate_classes.max
        ),
        "rate classes per branch",
        TileCategory::Input,
        "icon-grid icons",
    ));
    tiles.push(TileSpec::new(
        "synonymous_rate_variation",
        if attributes.srv_rate_classes > 0 {
            format!("{} classes", attributes.srv_rate_classes)
        } else {
            "None".to_string()
        },
        "synonymous rate variation",
        TileCategory::Input,
        "icon-layers icons",
    ));
    tiles.push(TileSpec::new(
        "selected_branches",
        branches
            .iter()
            .filter(|branch| classify(branch, thresholds.p_value).is_significant())
            .count(),
        format!(
            "branches with evidence of selection at p≤{}",
            format_threshold(thresholds.p_value)
        ),
        TileCategory::Result,
        "icon-plus icons",
    ));

    let profiles = profile_sites(Some(doc));
    if !profiles.is_empty() {
        let supported = supported_sites(&profiles, thresholds.evidence_ratio);
        let tested = branches.iter().filter(|branch| branch.tested).collect::<Vec<_>>();
        let total = tested
            .iter()
            .map(|branch| supported.get(branch.name.as_str()).copied().unwrap_or(0))
            .sum::<usize>();
        let mean = total as f64 / tested.len().max(1) as f64;
        tiles.push(TileSpec::new(
            "sites_per_tested_branch",
            format_fixed(mean, 1),
            format!(
                "Sites/tested branch with ER≥{} for positive selection",
                format_threshold(thresholds.evidence_ratio)
            ),
            TileCategory::Result,
            "icon-energy icons",
        ));
    }

    let MultiHitRates { double_hit, triple_hit } = attributes.multi_hit;
    if double_hit.is_some() || triple_hit.is_some() {
        let render = |rate: Option<f64>| rate.map_or_else(|| MISSING.to_string(), |rate| format_fixed(rate, 4));
        tiles.push(TileSpec::new(
            "multi_hit_rates",
            format!("{}:{}", render(double_hit), render(triple_hit)),
            "Median multiple hit rates (2H:3H)",
            TileCategory::Result,
            "icon-target icons",
        ));
    }
    tiles
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

fn yes_no(flag: bool) -> Cell {
    Cell::from(if flag { "Yes" } else { "No" })
}

fn optional_count(count: Option<u64>) -> Cell {
    count.map_or(Cell::Missing, |count| Cell::Integer(count as i64))
}

pub fn try_table(doc: &Value, thresholds: &Thresholds) -> SchemaResult<TableSpec> {
    try_table_with(doc, thresholds, &BRANCH_PALETTE)
}

/// One row per branch: name, tested flag, rate classes, uncorrected and
/// corrected p-values, Bayes factor with its tier, and the classification.
pub fn try_table_with(doc: &Value, thresholds: &Thresholds, palette: &Palette) -> SchemaResult<TableSpec> {
    let branches = try_branches(doc)?;
    if branches.is_empty() {
        return Ok(TableSpec::empty());
    }
    let layout = TableLayout::default()
        .column("branch", "Branch", ColumnFormat::Text)
        .column("tested", "Tested", ColumnFormat::Text)
        .column("Rate classes", "Rate Classes", ColumnFormat::Count)
        .column("Uncorrected P-value", "Uncorrected p-value", ColumnFormat::PValue)
        .column("Corrected P-value", "Corrected p-value", ColumnFormat::PValue)
        .column("Bayes Factor", "Bayes Factor", ColumnFormat::Ratio)
        .column("Bayes tier", "Evidence", ColumnFormat::Text)
        .column(
            "class",
            format!("Branch classification at p≤{}", format_threshold(thresholds.p_value)),
            ColumnFormat::Text,
        );

    let rows = branches
        .par_iter()
        .map(|branch| {
            let mut row = TableRow::new();
            row.insert("branch".to_string(), Cell::from(branch.name.as_str()));
            row.insert("tested".to_string(), yes_no(branch.tested));
            row.insert("Rate classes".to_string(), optional_count(branch.rate_classes));
            row.insert("Uncorrected P-value".to_string(), Cell::from(branch.uncorrected_p));
            row.insert("Corrected P-value".to_string(), Cell::from(branch.corrected_p));
            row.insert("Bayes Factor".to_string(), Cell::from(branch.bayes_factor));
            row.insert(
                "Bayes tier".to_string(),
                branch.bayes_tier().map_or(Cell::Missing, |tier| Cell::from(tier.label())),
            );
            row.insert(
                "class".to_string(),
                Cell::from(classify(branch, thresholds.p_value).label()),
            );
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
        warn!(%error, "aBSREL branch table unavailable");
        TableSpec::empty()
    })
}

fn describe_distribution(classes: &[RateClass]) -> String {
    if classes.is_empty() {
        return MISSING.to_string();
    }
    classes
        .iter()
        .enumerate()
        .map(|(index, class)| {
            format!(
                "ω{} = {} ({}%)",
                index + 1,
                format_fixed(class.rate, 2),
                format_fixed(class.weight * 100.0, 2)
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// One row per branch with its omega mixture; tested branches also carry
/// their corrected p-value and the number of sites with ER support.
pub fn try_distribution_table(doc: &Value, thresholds: &Thresholds) -> SchemaResult<TableSpec> {
    let branches = try_branches(doc)?;
    if branches.is_empty() {
        return Ok(TableSpec::empty());
    }
    let profiles = try_profile_sites(doc)?;
    let supported = supported_sites(&profiles, thresholds.evidence_ratio);

    let layout = TableLayout::default()
        .column("branch", "Branch", ColumnFormat::Text)
        .column("tested", "Tested", ColumnFormat::Text)
        .column("p-value", "p-value (corrected)", ColumnFormat::PValue)
        .column(
            "sites",
            format!("Sites with ER≥{}", format_threshold(thresholds.evidence_ratio)),
            ColumnFormat::Count,
        )
        .column("rates", "Rate classes", ColumnFormat::Count)
        .column("distribution", "ω distribution", ColumnFormat::Text);

    let rows = branches
        .iter()
        .map(|branch| {
            let mut row = TableRow::new();
            row.insert("branch".to_string(), Cell::from(branch.name.as_str()));
            row.insert("tested".to_string(), yes_no(branch.tested));
            let (p_value, sites) = if branch.tested {
                (
                    Cell::from(branch.corrected_p),
                    Cell::from(supported.get(branch.name.as_str()).copied().unwrap_or(0)),
                )
            } else {
                (Cell::Missing, Cell::Missing)
            };
            row.insert("p-value".to_string(), p_value);
            row.insert("sites".to_string(), sites);
            row.insert("rates".to_string(), Cell::from(branch.rate_class_count()));
            row.insert(
                "distribution".to_string(),
                Cell::Text(describe_distribution(&branch.omega_distribution)),
            );
            row
        })
        .collect();
    Ok(layout.finish(rows, &BRANCH_PALETTE))
}

pub fn distribution_table(doc: Option<&Value>, thresholds: &Thresholds) -> TableSpec {
    let Some(doc) = schema::document(doc) else {
        return TableSpec::empty();
    };
    try_distribution_table(doc, thresholds).unwrap_or_else(|error| {
        warn!(%error, "aBSREL distribution table unavailable");
        TableSpec::empty()
    })
}

/// 1-based codons in partition order; falls back to `1..=n` without a
/// partition map.
fn codons(doc: &Value, site_count: usize) -> Vec<usize> {
    let Some(partitions) = schema::resolve(doc, &fields::DATA_PARTITIONS) else {
        return (1..=site_count).collect();
    };
    let mut out = Vec::new();
    for (id, _) in schema::keyed_children(partitions.value) {
        if let Ok(Some(coverage)) = schema::partition_coverage(doc, &id) {
            out.extend(coverage.into_iter().map(|site| site + 1));
        }
    }
    if out.is_empty() {
        (1..=site_count).collect()
    } else {
        out
    }
}

/// Posterior mean synonymous rate per site from the SRV mixture and the
/// per-class site posteriors.
fn srv_posterior_means(doc: &Value) -> Vec<Option<f64>> {
    let distribution = schema::resolve(doc, &fields::SRV_DISTRIBUTION)
        .map(|found| common::rate_classes(found.value))
        .unwrap_or_default();
    let posteriors = schema::resolve(doc, &fields::SYNONYMOUS_POSTERIORS)
        .and_then(|found| found.value.as_array())
        .map(|rows| rows.iter().map(schema::numeric_series).collect::<Option<Vec<_>>>())
        .unwrap_or_default()
        .unwrap_or_default();
    if distribution.is_empty() || posteriors.len() != distribution.len() {
        return Vec::new();
    }
    let sites = posteriors.iter().map(Vec::len).max().unwrap_or(0);
    (0..sites)
        .map(|site| {
            distribution
                .iter()
                .zip(&posteriors)
                .map(|(class, weights)| weights.get(site).map(|weight| class.rate * weight))
                .sum::<Option<f64>>()
        })
        .collect()
}

/// One row per site: codon, unconstrained log-likelihood, SRV posterior mean
/// (when modelled) and the number of branches with ER support.
pub fn try_site_table(doc: &Value, thresholds: &Thresholds) -> SchemaResult<TableSpec> {
    let log_likelihoods = unconstrained_log_likelihoods(doc)?.unwrap_or_default();
    let srv_means = srv_posterior_means(doc);
    let site_count = log_likelihoods.len().max(srv_means.len());
    if site_count == 0 {
        return Ok(TableSpec::empty());
    }
    let supported = supported_branches_by_site(&try_profile_sites(doc)?, site_count, thresholds.evidence_ratio);

    let mut layout = TableLayout::default()
        .column("codon", "Site", ColumnFormat::Count)
        .column("LogL", "log(L)", ColumnFormat::Rate);
    if !srv_means.is_empty() {
        layout.push("SRV posterior mean", "E[α]", ColumnFormat::Rate);
    }
    layout.push(
        "ER",
        format!("ER Branch (≥{})", format_threshold(thresholds.evidence_ratio)),
        ColumnFormat::Count,
    );

    let codons = codons(doc, site_count);
    let rows = (0..site_count)
        .into_par_iter()
        .map(|index| {
            let mut row = TableRow::new();
            row.insert(
                "codon".to_string(),
                Cell::from(codons.get(index).copied().unwrap_or(index + 1)),
            );
            row.insert("LogL".to_string(), Cell::from(log_likelihoods.get(index).copied()));
            if !srv_means.is_empty() {
                row.insert(
                    "SRV posterior mean".to_string(),
                    Cell::from(srv_means.get(index).copied().flatten()),
                );
            }
            row.insert("ER".to_string(), Cell::from(supported[index]));
            row
        })
        .collect();
    Ok(layout.finish(rows, &BRANCH_PALETTE))
}

pub fn site_table(doc: Option<&Value>, thresholds: &Thresholds) -> TableSpec {
    let Some(doc) = schema::document(doc) else {
        return TableSpec::empty();
    };
    try_site_table(doc, thresholds).unwrap_or_else(|error| {
        warn!(%error, "aBSREL site table unavailable");
        TableSpec::empty()
    })
}
