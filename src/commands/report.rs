use std::path::Path;

use anyhow::Result;
use selection_report::methods::{absrel, fubar, meme, multihit};
use selection_report::{Method, MethodAttributes, TableSpec, Thresholds, TileSpec};
use serde::Serialize;
use tracing::info;

use crate::cli::ReportArgs;
use crate::commands::load::{Analysis, load};
use crate::util::{now_utc_string, write_json_pretty};

#[derive(Debug, Serialize)]
pub struct Report {
    pub generated_at: String,
    pub source: String,
    pub source_sha256: String,
    pub method: &'static str,
    pub thresholds: Thresholds,
    pub attributes: MethodAttributes,
    pub tiles: Vec<TileSpec>,
    pub table: TableSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<MethodDetails>,
}

/// Method-specific sections beyond the shared tiles and table.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MethodDetails {
    Meme {
        branch_site_posteriors: Vec<meme::BranchSitePosterior>,
    },
    Absrel {
        fits: absrel::FitSummary,
        omega_distribution: TableSpec,
        site_profile: TableSpec,
    },
    Fubar {
        summary: fubar::FubarSummary,
    },
    MultiHit {
        tests: Vec<multihit::ModelTest>,
        test_summary: multihit::TestSummary,
        evidence_ratio_ranges: Vec<multihit::SeriesRange>,
        site_log_likelihood: TableSpec,
    },
}

pub fn run(args: ReportArgs) -> Result<()> {
    let analysis = load(&args.query)?;
    let report = build_report(&analysis);
    write_report(&args.output, &report)?;

    info!(
        path = %args.output.display(),
        method = report.method,
        tiles = report.tiles.len(),
        rows = report.table.rows.len(),
        "wrote report"
    );
    Ok(())
}

pub fn build_report(analysis: &Analysis) -> Report {
    let doc = analysis.document();
    let thresholds = &analysis.thresholds;
    let details = match analysis.method {
        Method::Fel => None,
        Method::Meme => Some(MethodDetails::Meme {
            branch_site_posteriors: meme::branch_site_posteriors(doc, meme::DIVERSIFYING_RATE_CLASS),
        }),
        Method::Absrel => Some(MethodDetails::Absrel {
            fits: absrel::fit_summary(doc),
            omega_distribution: absrel::distribution_table(doc, thresholds),
            site_profile: absrel::site_table(doc, thresholds),
        }),
        Method::Fubar => Some(MethodDetails::Fubar {
            summary: fubar::summary(doc, thresholds.p_value),
        }),
        Method::MultiHit => Some(MethodDetails::MultiHit {
            tests: multihit::tests(doc),
            test_summary: multihit::test_summary(doc, thresholds.p_value),
            evidence_ratio_ranges: multihit::evidence_ratio_ranges(doc),
            site_log_likelihood: multihit::log_likelihood_table(doc),
        }),
    };

    Report {
        generated_at: now_utc_string(),
        source: analysis.source.clone(),
        source_sha256: analysis.sha256.clone(),
        method: analysis.method.name(),
        thresholds: analysis.thresholds,
        attributes: analysis.method.attributes(doc),
        tiles: analysis.method.tiles(doc, thresholds),
        table: analysis.method.table(doc, thresholds),
        details,
    }
}

fn write_report(path: &Path, report: &Report) -> Result<()> {
    write_json_pretty(path, report)
}
