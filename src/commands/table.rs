use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use selection_report::methods::{absrel, multihit};
use selection_report::{Method, TableSpec};
use tracing::info;

use crate::cli::{TableArgs, TableView};
use crate::commands::load::{Analysis, load};

pub fn run(args: TableArgs) -> Result<()> {
    let analysis = load(&args.query)?;
    let table = build_table(&analysis, args.view)?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.query.json {
        serde_json::to_writer_pretty(&mut output, &table)
            .context("failed to serialize table json output")?;
        writeln!(output)?;
    } else {
        for line in render_lines(&table) {
            writeln!(output, "{line}")?;
        }
    }
    output.flush()?;

    info!(
        method = %analysis.method,
        view = args.view.as_str(),
        rows = table.rows.len(),
        "table complete"
    );
    Ok(())
}

pub fn build_table(analysis: &Analysis, view: TableView) -> Result<TableSpec> {
    let doc = analysis.document();
    let thresholds = &analysis.thresholds;
    Ok(match (view, analysis.method) {
        (TableView::Primary, method) => method.table(doc, thresholds),
        (TableView::OmegaDistribution, Method::Absrel) => absrel::distribution_table(doc, thresholds),
        (TableView::SiteProfile, Method::Absrel) => absrel::site_table(doc, thresholds),
        (TableView::SiteLogLikelihood, Method::MultiHit) => multihit::log_likelihood_table(doc),
        (view, method) => bail!("table view {} is not available for {method}", view.as_str()),
    })
}

/// Header labels, then each row through its column formatters.
pub fn render_lines(table: &TableSpec) -> Vec<String> {
    if table.headers.is_empty() {
        return Vec::new();
    }
    let header = table
        .headers
        .iter()
        .map(|header| header.label.as_str())
        .collect::<Vec<_>>()
        .join("\t");
    std::iter::once(header)
        .chain(table.rows.iter().map(|row| table.render_row(row).join("\t")))
        .collect()
}

#[cfg(test)]
mod tests {
    use selection_report::model::{Cell, SITE_PALETTE, TableLayout, TableRow, Thresholds};
    use selection_report::format::ColumnFormat;
    use serde_json::json;

    use super::*;

    fn analysis(method: Method, document: serde_json::Value) -> Analysis {
        Analysis {
            source: "test".to_string(),
            sha256: String::new(),
            document: Some(document),
            method,
            thresholds: method.default_thresholds(),
        }
    }

    #[test]
    fn rows_render_through_column_formats() {
        let mut row = TableRow::new();
        row.insert("codon".to_string(), Cell::from(3_usize));
        row.insert("p-value".to_string(), Cell::Number(0.00005));
        let table = TableLayout::default()
            .column("codon", "Site", ColumnFormat::Count)
            .column("p-value", "p-value", ColumnFormat::PValue)
            .column("class", "Class", ColumnFormat::Text)
            .finish(vec![row], &SITE_PALETTE);

        let lines = render_lines(&table);
        assert_eq!(lines[0], "Site\tp-value\tClass");
        assert_eq!(lines[1].split('\t').next(), Some("3"));
        assert!(lines[1].ends_with("\tN/A"));
        assert!(render_lines(&TableSpec::empty()).is_empty());
    }

    #[test]
    fn absrel_only_views_are_rejected_for_site_methods() {
        let fel = analysis(Method::Fel, json!({}));
        assert!(build_table(&fel, TableView::SiteProfile).is_err());
        assert!(build_table(&fel, TableView::Primary).unwrap().rows.is_empty());

        let absrel = Analysis {
            thresholds: Thresholds {
                p_value: 0.05,
                evidence_ratio: 100.0,
            },
            ..analysis(Method::Absrel, json!({}))
        };
        assert!(build_table(&absrel, TableView::OmegaDistribution).is_ok());
        assert!(build_table(&absrel, TableView::SiteLogLikelihood).is_err());
    }

    #[test]
    fn multi_hit_log_likelihood_view() {
        let doc = json!({"Site Log Likelihood": {"Double-hit": [[-3.5, -4.0]], "Standard (single-hit)": [[-3.6, -4.2]]}});
        let multihit = analysis(Method::MultiHit, doc);
        let table = build_table(&multihit, TableView::SiteLogLikelihood).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(render_lines(&table)[0], "Site\tDouble-hit\tStandard (single-hit)");
        assert!(build_table(&multihit, TableView::SiteProfile).is_err());
    }
}
