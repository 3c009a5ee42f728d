//! Approximate Bayesian site model: posterior probabilities of pervasive
//! purifying and diversifying selection per site.

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::common;
use crate::classify::{classify_posterior_site, SiteClass};
use crate::error::{SchemaError, SchemaResult};
use crate::evidence::BayesTier;
use crate::format::{format_threshold, ColumnFormat};
use crate::model::{Cell, Palette, TableSpec, Thresholds, TileCategory, TileSpec, SITE_PALETTE};
use crate::schema::{self, fields, NamedRecord, SiteMatrix};

/// `p_value` here is the minimum posterior probability.
pub const DEFAULT_THRESHOLDS: Thresholds = Thresholds {
    p_value: 0.9,
    evidence_ratio: 100.0,
};

pub const DEFAULT_COLUMNS: &[(&str, &str)] = &[
    ("alpha", "Mean posterior synonymous substitution rate at a site"),
    ("beta", "Mean posterior non-synonymous substitution rate at a site"),
    ("beta-alpha", "Mean posterior beta-alpha"),
    ("Prob[alpha>beta]", "Posterior probability of negative selection at a site"),
    ("Prob[alpha<beta]", "Posterior probability of positive selection at a site"),
    ("BayesFactor[alpha<beta]", "Empirical Bayes Factor for positive selection at a site"),
];

const ALPHA: &[&str] = &["alpha", "α"];
const BETA: &[&str] = &["beta", "β"];
const PROB_PURIFYING: &[&str] = &["Prob[alpha>beta]", "Prob[α>β]"];
const PROB_DIVERSIFYING: &[&str] = &["Prob[alpha<beta]", "Prob[α<β]"];
const BAYES_FACTOR: &[&str] = &["BayesFactor[alpha<beta]", "BayesFactor[α<β]"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FubarAttributes {
    pub number_of_sequences: u64,
    pub number_of_sites: u64,
    pub number_of_partitions: u64,
    pub grid_points: usize,
    pub has_bayes_factor: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FubarSummary {
    pub positive_sites: usize,
    pub negative_sites: usize,
    pub total_sites: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FubarSite {
    pub partition: usize,
    pub codon: usize,
    pub record: NamedRecord,
    pub class: SiteClass,
}

/// One point of the rate grid, weighted by the prior or by one site's posterior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridPoint {
    pub alpha: f64,
    pub beta: f64,
    pub weight: f64,
}

pub fn try_extract(doc: &Value) -> SchemaResult<FubarAttributes> {
    Ok(match schema::site_matrix(doc, DEFAULT_COLUMNS)? {
        Some(matrix) => attributes_from(doc, Some(&matrix)),
        None => FubarAttributes::default(),
    })
}

pub fn extract(doc: Option<&Value>) -> FubarAttributes {
    let Some(doc) = schema::document(doc) else {
        return FubarAttributes::default();
    };
    match schema::site_matrix(doc, DEFAULT_COLUMNS) {
        Ok(Some(matrix)) => attributes_from(doc, Some(&matrix)),
        Ok(None) => FubarAttributes::default(),
        Err(error) => {
            warn!(%error, "FUBAR site matrix unusable, extracting input attributes only");
            attributes_from(doc, None)
        }
    }
}

fn attributes_from(doc: &Value, matrix: Option<&SiteMatrix>) -> FubarAttributes {
    let counts = common::input_counts(doc, matrix);
    FubarAttributes {
        number_of_sequences: counts.sequences,
        number_of_sites: counts.sites,
        number_of_partitions: counts.partitions,
        grid_points: schema::resolve(doc, &fields::GRID)
            .and_then(|grid| grid.value.as_array().map(Vec::len))
            .unwrap_or(0),
        has_bayes_factor: matrix.is_some_and(|matrix| matrix.has_column(BAYES_FACTOR)),
    }
}

pub fn classify(record: &NamedRecord, threshold: f64) -> SiteClass {
    classify_posterior_site(
        record.first_of(ALPHA),
        record.first_of(BETA),
        record.first_of(PROB_PURIFYING),
        record.first_of(PROB_DIVERSIFYING),
        threshold,
    )
}

fn classify_matrix(matrix: &SiteMatrix, threshold: f64) -> Vec<FubarSite> {
    matrix
        .sites()
        .par_iter()
        .map(|site| FubarSite {
            partition: site.partition,
            codon: site.codon,
            record: site.record.clone(),
            class: classify(site.record, threshold),
        })
        .collect()
}

pub fn try_sites(doc: &Value, thresholds: &Thresholds) -> SchemaResult<Vec<FubarSite>> {
    Ok(schema::site_matrix(doc, DEFAULT_COLUMNS)?
        .map(|matrix| classify_matrix(&matrix, thresholds.p_value))
        .unwrap_or_default())
}

/// The rate grid with its prior weights; empty when the document has no grid.
pub fn try_grid(doc: &Value) -> SchemaResult<Vec<GridPoint>> {
    let Some(grid) = schema::resolve(doc, &fields::GRID) else {
        return Ok(Vec::new());
    };
    let path = grid.path.join("/");
    let points = grid
        .value
        .as_array()
        .ok_or_else(|| SchemaError::malformed(&path, "grid is not an array"))?;
    points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let values = point
                .as_array()
                .and_then(|cells| cells.iter().map(schema::as_f64).collect::<Option<Vec<_>>>());
            match values.as_deref() {
                Some([alpha, beta, weight, ..]) => Ok(GridPoint {
                    alpha: *alpha,
                    beta: *beta,
                    weight: *weight,
                }),
                _ => Err(SchemaError::malformed(
                    format!("{path}/{index}"),
                    "grid point is not an (alpha, beta, weight) triple",
                )),
            }
        })
        .collect()
}

/// Grid points reweighted by the posterior of 1-based codon `site`. Falls
/// back to the prior weights when the document carries no per-site posterior
/// or no partition covers the site.
pub fn try_site_grid(doc: &Value, site: usize) -> SchemaResult<Vec<GridPoint>> {
    let grid = try_grid(doc)?;
    let (Some(posterior), Some(partitions), Some(target)) = (
        schema::resolve(doc, &fields::POSTERIOR),
        schema::resolve(doc, &fields::DATA_PARTITIONS),
        site.checked_sub(1),
    ) else {
        return Ok(grid);
    };
    if grid.is_empty() {
        return Ok(grid);
    }

    for (partition, _) in schema::partition_children(partitions.value) {
        let Some(coverage) = schema::partition_coverage(doc, &partition)? else {
            continue;
        };
        let Some(index) = coverage.iter().position(|&covered| covered == target) else {
            continue;
        };
        let index = index.to_string();
        let path = format!("{}/{partition}/{index}", posterior.path.join("/"));
        let weights = schema::lookup(posterior.value, &[partition.as_str(), index.as_str()])
            .ok_or_else(|| SchemaError::malformed(&path, "no posterior for a covered site"))?;
        let weights = schema::numeric_series(weights)
            .ok_or_else(|| SchemaError::malformed(&path, "posterior holds a non-numeric value"))?;
        if weights.len() != grid.len() {
            return Err(SchemaError::malformed(
                &path,
                format!("{} posterior weights for {} grid points", weights.len(), grid.len()),
            ));
        }
        return Ok(grid
            .into_iter()
            .zip(weights)
            .map(|(point, weight)| GridPoint { weight, ..point })
            .collect());
    }
    debug!(site, "site not covered by any partition, using prior grid weights");
    Ok(grid)
}

pub fn site_grid(doc: Option<&Value>, site: usize) -> Vec<GridPoint> {
    let Some(doc) = schema::document(doc) else {
        return Vec::new();
    };
    try_site_grid(doc, site).unwrap_or_else(|error| {
        warn!(%error, site, "FUBAR site grid unavailable");
        Vec::new()
    })
}

/// Sites whose posterior for each direction strictly exceeds `threshold`.
pub fn summary(doc: Option<&Value>, threshold: f64) -> FubarSummary {
    let Some(doc) = schema::document(doc) else {
        return FubarSummary::default();
    };
    let matrix = match schema::site_matrix(doc, DEFAULT_COLUMNS) {
        Ok(Some(matrix)) => matrix,
        Ok(None) => return FubarSummary::default(),
        Err(error) => {
            warn!(%error, "FUBAR summary unavailable");
            return FubarSummary::default();
        }
    };
    let exceeds = |record: &NamedRecord, aliases: &[&str]| record.first_of(aliases).is_some_and(|p| p > threshold);
    FubarSummary {
        positive_sites: matrix.records().filter(|record| exceeds(record, PROB_DIVERSIFYING)).count(),
        negative_sites: matrix.records().filter(|record| exceeds(record, PROB_PURIFYING)).count(),
        total_sites: matrix.site_count(),
    }
}

/// Tile order: sequences, sites, partitions, grid points (when reported),
/// diversifying sites, purifying sites.
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
            warn!(%error, "FUBAR site matrix unusable, emitting input tiles only");
            (attributes_from(doc, None), None)
        }
    };

    let mut tiles = common::input_tiles(
        common::InputCounts {
            sequences: attributes.number_of_sequences,
            sites: attributes.number_of_sites,
            partitions: attributes.number_of_partitions,
        },
        common::tested_branch_count(doc),
    );
    if attributes.grid_points > 0 {
        tiles.push(TileSpec::new(
            "grid_points",
            attributes.grid_points,
            "grid points in the rate prior",
            TileCategory::Input,
            "icon-grid icons",
        ));
    }
    let Some(sites) = sites else {
        return tiles;
    };

    let count = |class: SiteClass| sites.iter().filter(|site| site.class == class).count();
    let threshold = format_threshold(thresholds.p_value);
    tiles.push(TileSpec::new(
        "diversifying_sites",
        count(SiteClass::Diversifying),
        format!("sites under pervasive diversifying selection at posterior probability ≥{threshold}"),
        TileCategory::Result,
        "icon-plus icons",
    ));
    tiles.push(TileSpec::new(
        "purifying_sites",
        count(SiteClass::Purifying),
        format!("sites under pervasive purifying selection at posterior probability ≥{threshold}"),
        TileCategory::Result,
        "icon-minus icons",
    ));
    tiles
}

pub fn try_table(doc: &Value, thresholds: &Thresholds) -> SchemaResult<TableSpec> {
    try_table_with(doc, thresholds, &SITE_PALETTE)
}

/// Matrix columns, the Bayes-factor tier (when reported) and the class.
pub fn try_table_with(doc: &Value, thresholds: &Thresholds, palette: &Palette) -> SchemaResult<TableSpec> {
    let Some(matrix) = schema::site_matrix(doc, DEFAULT_COLUMNS)? else {
        return Ok(TableSpec::empty());
    };
    let with_tier = matrix.has_column(BAYES_FACTOR);
    let mut layout = common::site_layout(&matrix);
    if with_tier {
        layout.push("Bayes tier", "Evidence for positive selection", ColumnFormat::Text);
    }
    layout.push(
        "class",
        format!(
            "Site classification at posterior probability ≥{}",
            format_threshold(thresholds.p_value)
        ),
        ColumnFormat::Text,
    );

    let rows = classify_matrix(&matrix, thresholds.p_value)
        .par_iter()
        .map(|site| {
            let mut row = common::site_row(site.partition, site.codon, &site.record);
            if with_tier {
                let tier = site
                    .record
                    .first_of(BAYES_FACTOR)
                    .map_or(Cell::Missing, |bf| Cell::from(BayesTier::from_bayes_factor(bf).label()));
                row.insert("Bayes tier".to_string(), tier);
            }
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
        warn!(%error, "FUBAR table unavailable");
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
    fn classifies_by_posterior_probability() {
        let sites = try_sites(&fixtures::fubar(), &DEFAULT_THRESHOLDS).unwrap();
        let classes = sites.iter().map(|site| site.class).collect::<Vec<_>>();
        assert_eq!(
            classes,
            vec![
                SiteClass::Diversifying,
                SiteClass::Purifying,
                SiteClass::Neutral,
                SiteClass::Invariable
            ]
        );
    }

    #[test]
    fn posterior_at_threshold_counts_as_support() {
        let record = NamedRecord::from_pairs(&[("alpha", 1.0), ("beta", 2.0), ("Prob[alpha<beta]", 0.9)]);
        assert_eq!(classify(&record, 0.9), SiteClass::Diversifying);
    }

    #[test]
    fn summary_counts_strictly_exceeding_sites() {
        let summary = summary(Some(&fixtures::fubar()), 0.9);
        assert_eq!(
            summary,
            FubarSummary {
                positive_sites: 1,
                negative_sites: 1,
                total_sites: 4
            }
        );
        assert_eq!(super::summary(None, 0.9), FubarSummary::default());
    }

    #[test]
    fn attributes_report_grid_and_bayes_factor() {
        let attributes = extract(Some(&fixtures::fubar()));
        assert_eq!(attributes.number_of_sequences, 5);
        assert_eq!(attributes.grid_points, 3);
        assert!(attributes.has_bayes_factor);
    }

    #[test]
    fn table_adds_bayes_tier_and_class() {
        let table = table(Some(&fixtures::fubar()), &DEFAULT_THRESHOLDS);
        assert_eq!(table.rows[0]["Bayes tier"], Cell::Text("Very Strong".to_string()));
        assert_eq!(table.rows[2]["Bayes tier"], Cell::Text("Weak".to_string()));
        assert_eq!(table.rows[1]["Bayes tier"], Cell::Text("No Evidence".to_string()));
        assert_eq!(table.count_class("Invariable"), 1);
        assert_eq!(
            table.headers.last().unwrap().label,
            "Site classification at posterior probability ≥0.9"
        );
        assert_eq!(table.format_of("BayesFactor[alpha<beta]"), ColumnFormat::Ratio);
    }

    #[test]
    fn tiles_follow_documented_order() {
        let tiles = tiles(Some(&fixtures::fubar()), &DEFAULT_THRESHOLDS);
        let keys = tiles.iter().map(|tile| tile.key).collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                "sequences",
                "sites",
                "partitions",
                "tested_branches",
                "grid_points",
                "diversifying_sites",
                "purifying_sites"
            ]
        );
        assert_eq!(find_tile(&tiles, "diversifying_sites").unwrap().number, TileValue::Count(1));
    }

    #[test]
    fn site_grid_uses_the_covering_partition_posterior() {
        let doc = fixtures::fubar();
        let grid = site_grid(Some(&doc), 2);
        let weights = grid.iter().map(|point| point.weight).collect::<Vec<_>>();
        assert_eq!(weights, vec![0.7, 0.25, 0.05]);
        assert_eq!((grid[2].alpha, grid[2].beta), (1.0, 5.0));
    }

    #[test]
    fn site_grid_falls_back_to_prior_weights() {
        let doc = fixtures::fubar();
        let prior = try_grid(&doc).unwrap().iter().map(|point| point.weight).collect::<Vec<_>>();
        assert_eq!(prior, vec![0.02, 0.3, 0.68]);

        let uncovered = try_site_grid(&doc, 9).unwrap();
        assert_eq!(uncovered.iter().map(|point| point.weight).collect::<Vec<_>>(), prior);
        assert_eq!(try_site_grid(&doc, 0).unwrap().len(), 3);

        let mut without_posterior = doc.clone();
        without_posterior.as_object_mut().unwrap().remove("posterior");
        assert_eq!(try_site_grid(&without_posterior, 1).unwrap()[0].weight, 0.02);
        assert!(site_grid(None, 1).is_empty());
    }

    #[test]
    fn site_grid_rejects_posteriors_that_do_not_match_the_grid() {
        let mut doc = fixtures::fubar();
        doc["posterior"]["0"][1] = json!([[0.5, 0.5]]);
        let error = try_site_grid(&doc, 2).unwrap_err();
        assert_eq!(error.path(), "posterior/0/1");
        assert!(site_grid(Some(&doc), 2).is_empty());

        doc["grid"][1] = json!([0.1, "high"]);
        assert_eq!(try_grid(&doc).unwrap_err().path(), "grid/1");
    }

    #[test]
    fn five_column_layout_without_bayes_factor() {
        let doc = json!({
            "MLE": {"content": {"0": [[1.0, 2.0, 1.0, 0.01, 0.99]]}}
        });
        let table = table(Some(&doc), &DEFAULT_THRESHOLDS);
        assert!(table.headers.iter().all(|header| header.key != "Bayes tier"));
        assert_eq!(table.count_class("Diversifying"), 1);
    }
}
