//! Pieces every method family shares: alignment counts with their
//! fallbacks, the leading input tiles and per-site table rows.

use serde_json::Value;
use tracing::debug;

use crate::format::ColumnFormat;
use crate::model::{Cell, RateClass, TableLayout, TableRow, TileCategory, TileSpec};
use crate::schema::{self, fields, NamedRecord, SiteMatrix};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct InputCounts {
    pub sequences: u64,
    pub sites: u64,
    pub partitions: u64,
}

/// Declared counts, or counts derived from the tree, the matrix and the
/// partition map when the engine did not write them.
pub(crate) fn input_counts(doc: &Value, matrix: Option<&SiteMatrix>) -> InputCounts {
    let sequences = schema::resolve_count(doc, &fields::NUMBER_OF_SEQUENCES).unwrap_or_else(|| {
        let derived = schema::first_tree(doc).map_or(0, schema::count_newick_leaves) as u64;
        debug!(derived, "sequence count derived from tree leaves");
        derived
    });

    let sites = schema::resolve_count(doc, &fields::NUMBER_OF_SITES).unwrap_or_else(|| {
        let derived = match matrix {
            Some(matrix) => matrix.site_count(),
            None => schema::partition_sizes(doc).iter().sum(),
        } as u64;
        debug!(derived, "site count derived from records");
        derived
    });

    let partitions = schema::resolve_count(doc, &fields::PARTITION_COUNT).unwrap_or_else(|| {
        let declared = schema::resolve(doc, &fields::DATA_PARTITIONS)
            .map_or(0, |partitions| schema::keyed_children(partitions.value).len());
        let derived = if declared > 0 {
            declared
        } else {
            matrix.map_or(0, |matrix| matrix.blocks.len())
        } as u64;
        debug!(derived, "partition count derived from partition keys");
        derived
    });

    InputCounts {
        sequences,
        sites,
        partitions,
    }
}

/// Upper median of tested branches per partition; 0 without a `tested` map.
pub(crate) fn tested_branch_count(doc: &Value) -> usize {
    schema::tested_map(doc).map_or(0, |tested| tested.median_tested())
}

pub(crate) fn has_background(doc: &Value) -> bool {
    schema::tested_map(doc).is_some_and(|tested| tested.has_background())
}

pub(crate) fn input_tiles(counts: InputCounts, tested_branches: usize) -> Vec<TileSpec> {
    vec![
        TileSpec::new(
            "sequences",
            counts.sequences,
            "sequences in the alignment",
            TileCategory::Input,
            "icon-options-vertical icons",
        ),
        TileSpec::new(
            "sites",
            counts.sites,
            "codon sites in the alignment",
            TileCategory::Input,
            "icon-options icons",
        ),
        TileSpec::new(
            "partitions",
            counts.partitions,
            "partitions",
            TileCategory::Input,
            "icon-arrow-up icons",
        ),
        TileSpec::new(
            "tested_branches",
            tested_branches,
            "median branches/partition used for testing",
            TileCategory::Input,
            "icon-share icons",
        ),
    ]
}

pub(crate) fn bootstrap_tile(replicates: u64) -> TileSpec {
    TileSpec::new(
        "bootstrap_replicates",
        replicates,
        "parametric bootstrap replicates",
        TileCategory::Input,
        "icon-layers icons",
    )
}

/// Partition and site columns followed by every matrix column, verbatim.
pub(crate) fn site_layout(matrix: &SiteMatrix) -> TableLayout {
    let mut layout = TableLayout::default()
        .column("partition", "Partition", ColumnFormat::Count)
        .column("codon", "Site", ColumnFormat::Count);
    for column in &matrix.columns {
        layout.push(
            column.key.clone(),
            column.description.clone(),
            ColumnFormat::infer(&column.key),
        );
    }
    layout
}

pub(crate) fn site_row(partition: usize, codon: usize, record: &NamedRecord) -> TableRow {
    let mut row = TableRow::new();
    row.insert("partition".to_string(), Cell::from(partition));
    row.insert("codon".to_string(), Cell::from(codon));
    for (key, value) in record.fields() {
        row.insert(key.to_string(), Cell::from(value));
    }
    row
}

/// Reads a rate mixture in any of the layouts engines write:
/// `[[rate, weight], ..]`, `{"0": [rate, weight], ..}`,
/// `{"0": {"rate": r, "proportion": w}, ..}` or bare rates (weight 1).
/// Non-numeric keys (named side rates) are skipped.
pub(crate) fn rate_classes(value: &Value) -> Vec<RateClass> {
    schema::partition_children(value)
        .into_iter()
        .filter_map(|(_, entry)| match entry {
            Value::Array(pair) => Some(RateClass {
                rate: pair.first().and_then(schema::as_f64)?,
                weight: pair.get(1).and_then(schema::as_f64).unwrap_or(1.0),
            }),
            Value::Object(map) => Some(RateClass {
                rate: schema::first_number(map, &["omega", "rate", "value", "0"])?,
                weight: schema::first_number(map, &["weight", "proportion", "1"]).unwrap_or(1.0),
            }),
            scalar => schema::as_f64(scalar).map(|rate| RateClass { rate, weight: 1.0 }),
        })
        .collect()
}

/// Standard median; `None` for no values.
pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let middle = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[middle - 1] + values[middle]) / 2.0)
    } else {
        Some(values[middle])
    }
}
