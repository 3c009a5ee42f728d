//! Path-based access into raw result documents.
//!
//! Producing engines rename and move fields between versions, so every field
//! the rest of the crate reads is declared once in [`fields`] as a prioritized
//! list of equivalent paths. Lookups return the first usable value or `None`;
//! only shape errors on data a computation actually needs surface as
//! [`SchemaError`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{SchemaError, SchemaResult};

pub type FieldPath = &'static [&'static str];

/// A logical field and the paths it has historically been written under,
/// most preferred first.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub paths: &'static [FieldPath],
}

impl Field {
    pub const fn new(name: &'static str, paths: &'static [FieldPath]) -> Self {
        Self { name, paths }
    }
}

/// A value found for a [`Field`], tagged with the alias that produced it.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub value: &'a Value,
    pub alias: usize,
    pub path: FieldPath,
}

pub mod fields {
    use super::Field;

    pub const NUMBER_OF_SEQUENCES: Field = Field::new(
        "number of sequences",
        &[&["input", "number of sequences"], &["sequences"]],
    );
    pub const NUMBER_OF_SITES: Field = Field::new(
        "number of sites",
        &[&["input", "number of sites"], &["sites"]],
    );
    pub const PARTITION_COUNT: Field = Field::new(
        "partition count",
        &[&["input", "partition count"], &["partition count"]],
    );
    pub const TREES: Field = Field::new("trees", &[&["input", "trees"], &["input", "tree"]]);
    pub const DATA_PARTITIONS: Field =
        Field::new("data partitions", &[&["data partitions"], &["partitions"]]);
    pub const TESTED: Field = Field::new("tested", &[&["tested"]]);
    pub const MLE_HEADERS: Field = Field::new("MLE headers", &[&["MLE", "headers"]]);
    pub const MLE_CONTENT: Field = Field::new("MLE content", &[&["MLE", "content"]]);
    pub const MLE_RESAMPLES: Field = Field::new("MLE resamples", &[&["MLE", "LRT"]]);
    pub const SIMULATED: Field = Field::new(
        "parametric bootstrap replicates",
        &[&["simulated"], &["input", "simulated"]],
    );
    pub const CONFIDENCE_INTERVALS: Field = Field::new(
        "confidence intervals",
        &[&["confidence interval"], &["confidence intervals"]],
    );
    pub const SUBSTITUTIONS: Field = Field::new("substitutions", &[&["substitutions"]]);
    pub const BRANCH_ATTRIBUTES: Field =
        Field::new("branch attributes", &[&["branch attributes"]]);
    pub const TEST_RESULTS: Field = Field::new("test results", &[&["test results"]]);
    pub const POSITIVE_RESULTS: Field = Field::new(
        "positive test results",
        &[
            &["test results", "positive test results"],
            &["branches with selection"],
        ],
    );
    pub const REPORTED_P_THRESHOLD: Field = Field::new(
        "p-value threshold",
        &[&["test results", "P-value threshold"], &["p-value threshold"]],
    );
    pub const SITE_LOG_LIKELIHOOD: Field =
        Field::new("site log likelihood", &[&["Site Log Likelihood"]]);
    pub const SYNONYMOUS_POSTERIORS: Field = Field::new(
        "synonymous site posteriors",
        &[&["Synonymous site-posteriors"], &["Synonymous site posteriors"]],
    );
    pub const SRV_DISTRIBUTION: Field = Field::new(
        "synonymous rate distribution",
        &[
            &[
                "fits",
                "Full adaptive model",
                "Rate Distributions",
                "Synonymous site-to-site rates",
            ],
            &[
                "fits",
                "Full model",
                "Rate Distributions",
                "Synonymous site-to-site rates",
            ],
        ],
    );
    pub const BASELINE_FIT: Field = Field::new(
        "baseline model fit",
        &[
            &["fits", "Baseline model"],
            &["fits", "Baseline MG94xREV"],
            &["fits", "MG94xREV with separate rates for branch sets"],
        ],
    );
    pub const FULL_FIT: Field = Field::new(
        "full model fit",
        &[&["fits", "Full adaptive model"], &["fits", "Full model"]],
    );
    pub const ANALYSIS_INFO: Field = Field::new(
        "analysis description",
        &[&["analysis", "info"], &["analysis", "citation"]],
    );
    pub const ANALYSIS_VERSION: Field = Field::new("analysis version", &[&["analysis", "version"]]);
    pub const GRID: Field = Field::new("posterior grid", &[&["grid"]]);
    pub const POSTERIOR: Field = Field::new("grid posterior by site", &[&["posterior"]]);
    pub const EVIDENCE_RATIOS: Field = Field::new("evidence ratios", &[&["Evidence Ratios"]]);

    pub const FIT_LOG_LIKELIHOOD: &[&str] = &["Log Likelihood", "log-likelihood", "LogL"];
    pub const FIT_AIC: &[&str] = &["AIC-c", "AIC"];
    pub const FIT_PARAMETERS: &[&str] = &["estimated parameters", "parameters"];
}

/// Treats `null` and the literal JSON `null` document as no document at all.
pub fn document(doc: Option<&Value>) -> Option<&Value> {
    doc.filter(|value| !value.is_null())
}

/// Walks `path` through objects (by key) and arrays (by decimal index).
pub fn lookup<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = doc;
    for key in path {
        current = match current {
            Value::Object(map) => map.get(*key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

/// First non-null value along the field's alias list.
pub fn resolve<'a>(doc: &'a Value, field: &Field) -> Option<Resolved<'a>> {
    for (alias, path) in field.paths.iter().enumerate() {
        let Some(value) = lookup(doc, path) else {
            continue;
        };
        if alias > 0 {
            debug!(field = field.name, path = %path.join("/"), "resolved through alias");
        }
        return Some(Resolved {
            value,
            alias,
            path: *path,
        });
    }
    debug!(field = field.name, "field absent");
    None
}

/// First alias whose value `convert` accepts. Aliases holding a value of the
/// wrong type are skipped rather than treated as authoritative.
pub fn resolve_with<'a, T>(
    doc: &'a Value,
    field: &Field,
    convert: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    for (alias, path) in field.paths.iter().enumerate() {
        let Some(value) = lookup(doc, path) else {
            continue;
        };
        if let Some(converted) = convert(value) {
            if alias > 0 {
                debug!(field = field.name, path = %path.join("/"), "resolved through alias");
            }
            return Some(converted);
        }
    }
    debug!(field = field.name, "field absent");
    None
}

pub fn resolve_f64(doc: &Value, field: &Field) -> Option<f64> {
    resolve_with(doc, field, as_f64)
}

pub fn resolve_count(doc: &Value, field: &Field) -> Option<u64> {
    resolve_with(doc, field, as_count)
}

/// Structural presence: the field exists and carries content.
pub fn field_present(doc: &Value, field: &Field) -> bool {
    resolve_with(doc, field, |value| is_present(Some(value)).then_some(())).is_some()
}

pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Number(_)) => true,
    }
}

/// Numbers, and strings holding numbers (engines emit `"inf"` and `"nan"` as text).
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn as_count(value: &Value) -> Option<u64> {
    as_f64(value)
        .filter(|number| number.is_finite() && *number >= 0.0)
        .map(|number| number.round() as u64)
}

pub fn first_number(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| map.get(*key).and_then(as_f64))
}

/// Object entries with integer-like keys first in numeric order, then the rest.
pub fn ordered_entries(map: &Map<String, Value>) -> Vec<(&str, &Value)> {
    let mut numeric = Vec::new();
    let mut named = Vec::new();
    for (key, value) in map {
        match key.parse::<u64>() {
            Ok(index) => numeric.push((index, key.as_str(), value)),
            Err(_) => named.push((key.as_str(), value)),
        }
    }
    numeric.sort_by_key(|(index, _, _)| *index);
    numeric
        .into_iter()
        .map(|(_, key, value)| (key, value))
        .chain(named)
        .collect()
}

/// Children of an object (ordered as [`ordered_entries`]) or of an array
/// (keyed by index). Scalars have no children.
pub fn keyed_children(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Object(map) => ordered_entries(map)
            .into_iter()
            .map(|(key, child)| (key.to_string(), child))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, child)| (index.to_string(), child))
            .collect(),
        _ => Vec::new(),
    }
}

/// Partition-keyed children only (`"0"`, `"1"`, ...). Engines park metadata
/// such as an `attributes` block next to the partitions.
pub fn partition_children(value: &Value) -> Vec<(String, &Value)> {
    keyed_children(value)
        .into_iter()
        .filter(|(key, _)| key.parse::<u64>().is_ok())
        .collect()
}

/// Flattens the series shapes engines use for one per-site vector:
/// `[v0, v1, ..]`, `[[v0, v1, ..]]` and `[[v0], [v1], ..]`.
pub fn numeric_series(value: &Value) -> Option<Vec<f64>> {
    let items = value.as_array()?;
    if items.iter().all(|item| as_f64(item).is_some()) {
        return Some(items.iter().filter_map(as_f64).collect());
    }
    if let [only] = items.as_slice() {
        if only.is_array() {
            return numeric_series(only);
        }
    }
    let singletons = items
        .iter()
        .map(|item| match item.as_array().map(Vec::as_slice) {
            Some([cell]) => as_f64(cell),
            _ => None,
        })
        .collect::<Option<Vec<f64>>>();
    singletons
}

// ---------------------------------------------------------------------------
// Named records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub key: String,
    pub description: String,
}

impl Column {
    pub fn new(key: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
        }
    }
}

/// One positional tuple bound to its column names at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRecord {
    keys: Arc<[String]>,
    values: Vec<Option<f64>>,
}

impl NamedRecord {
    pub fn new(keys: Arc<[String]>, values: Vec<Option<f64>>) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        Self { keys, values }
    }

    pub fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        let keys = pairs
            .iter()
            .map(|(key, _)| key.to_string())
            .collect::<Vec<_>>();
        let values = pairs.iter().map(|(_, value)| Some(*value)).collect();
        Self::new(keys.into(), values)
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.keys
            .iter()
            .position(|candidate| candidate == key)
            .and_then(|index| self.values[index])
    }

    /// Value of the first alias present in this record.
    pub fn first_of(&self, aliases: &[&str]) -> Option<f64> {
        aliases.iter().find_map(|alias| self.get(alias))
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<f64>)> + '_ {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

pub fn parse_columns(headers: &Value, path: &str) -> SchemaResult<Vec<Column>> {
    let items = headers
        .as_array()
        .ok_or_else(|| SchemaError::malformed(path, "expected an array of [key, description]"))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(key) => Ok(Column::new(key, key)),
            Value::Array(pair) => {
                let key = pair.first().and_then(Value::as_str).ok_or_else(|| {
                    SchemaError::malformed(format!("{path}/{index}"), "header key is not a string")
                })?;
                let description = pair.get(1).and_then(Value::as_str).unwrap_or(key);
                Ok(Column::new(key, description))
            }
            _ => Err(SchemaError::malformed(
                format!("{path}/{index}"),
                "header entry is neither a string nor a pair",
            )),
        })
        .collect()
}

/// Columns trimmed or padded so there is exactly one per tuple position.
fn columns_for_width(columns: &[Column], width: usize) -> Vec<Column> {
    (0..width)
        .map(|index| {
            columns.get(index).cloned().unwrap_or_else(|| {
                let key = format!("column {}", index + 1);
                Column::new(&key, &key)
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PartitionBlock {
    pub id: String,
    pub ordinal: usize,
    pub coverage: Vec<usize>,
    pub records: Vec<NamedRecord>,
}

/// Per-site matrix of one document with every tuple bound to column names.
#[derive(Debug, Clone)]
pub struct SiteMatrix {
    pub columns: Vec<Column>,
    pub blocks: Vec<PartitionBlock>,
}

/// A record located in the alignment: 1-based partition and codon.
#[derive(Debug, Clone, Copy)]
pub struct SiteRef<'a> {
    pub partition: usize,
    pub codon: usize,
    pub record: &'a NamedRecord,
}

impl SiteMatrix {
    pub fn site_count(&self) -> usize {
        self.blocks.iter().map(|block| block.records.len()).sum()
    }

    pub fn has_column(&self, aliases: &[&str]) -> bool {
        self.columns
            .iter()
            .any(|column| aliases.contains(&column.key.as_str()))
    }

    pub fn records(&self) -> impl Iterator<Item = &NamedRecord> + '_ {
        self.blocks.iter().flat_map(|block| block.records.iter())
    }

    /// Every record with its absolute position. A coverage list shorter than
    /// the partition continues numbering after the last covered site.
    pub fn sites(&self) -> Vec<SiteRef<'_>> {
        let mut out = Vec::with_capacity(self.site_count());
        let mut next = 0;
        for block in &self.blocks {
            for (index, record) in block.records.iter().enumerate() {
                let site = block.coverage.get(index).copied().unwrap_or(next);
                next = site + 1;
                out.push(SiteRef {
                    partition: block.ordinal + 1,
                    codon: site + 1,
                    record,
                });
            }
        }
        out
    }
}

/// Binds `MLE.content` to `MLE.headers` (or `default_columns` when the
/// document carries no headers). `Ok(None)` means the matrix is absent.
pub fn site_matrix(doc: &Value, default_columns: &[(&str, &str)]) -> SchemaResult<Option<SiteMatrix>> {
    let Some(content) = resolve(doc, &fields::MLE_CONTENT) else {
        return Ok(None);
    };
    let content_path = content.path.join("/");
    if !matches!(content.value, Value::Object(_) | Value::Array(_)) {
        return Err(SchemaError::malformed(
            content_path,
            "expected partitions keyed by id",
        ));
    }

    let declared = match resolve(doc, &fields::MLE_HEADERS) {
        Some(headers) => parse_columns(headers.value, &headers.path.join("/"))?,
        None => default_columns
            .iter()
            .map(|(key, description)| Column::new(key, description))
            .collect(),
    };

    let mut width: Option<usize> = None;
    let mut raw_blocks = Vec::new();
    for (ordinal, (id, rows)) in keyed_children(content.value).into_iter().enumerate() {
        let block_path = format!("{content_path}/{id}");
        let rows = rows
            .as_array()
            .ok_or_else(|| SchemaError::malformed(&block_path, "expected an array of rows"))?;
        let mut parsed = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let cells = row.as_array().ok_or_else(|| {
                SchemaError::malformed(format!("{block_path}/{index}"), "row is not an array")
            })?;
            match width {
                None => width = Some(cells.len()),
                Some(expected) if expected != cells.len() => {
                    return Err(SchemaError::malformed(
                        format!("{block_path}/{index}"),
                        format!("ragged row: {} columns, expected {expected}", cells.len()),
                    ));
                }
                Some(_) => {}
            }
            parsed.push(cells.iter().map(as_f64).collect::<Vec<_>>());
        }
        let coverage = partition_coverage(doc, &id)?;
        raw_blocks.push((id, ordinal, coverage, parsed));
    }

    let columns = columns_for_width(&declared, width.unwrap_or(declared.len()));
    let keys: Arc<[String]> = columns
        .iter()
        .map(|column| column.key.clone())
        .collect::<Vec<_>>()
        .into();

    let blocks = raw_blocks
        .into_iter()
        .map(|(id, ordinal, coverage, rows)| PartitionBlock {
            id,
            ordinal,
            coverage: coverage.unwrap_or_default(),
            records: rows
                .into_iter()
                .map(|values| NamedRecord::new(Arc::clone(&keys), values))
                .collect(),
        })
        .collect();

    Ok(Some(SiteMatrix { columns, blocks }))
}

/// Absolute site indices covered by one partition.
pub fn partition_coverage(doc: &Value, partition: &str) -> SchemaResult<Option<Vec<usize>>> {
    let Some(partitions) = resolve(doc, &fields::DATA_PARTITIONS) else {
        return Ok(None);
    };
    let Some(coverage) = lookup(partitions.value, &[partition, "coverage"]) else {
        return Ok(None);
    };
    let path = format!("{}/{partition}/coverage", partitions.path.join("/"));
    let items = coverage
        .as_array()
        .ok_or_else(|| SchemaError::malformed(&path, "coverage is not an array"))?;
    let sites = match items.first() {
        Some(Value::Array(inner)) => inner,
        _ => items,
    };
    sites
        .iter()
        .map(|site| {
            as_count(site)
                .map(|index| index as usize)
                .ok_or_else(|| SchemaError::malformed(&path, "coverage holds a non-index value"))
        })
        .collect::<SchemaResult<Vec<_>>>()
        .map(Some)
}

/// Sizes of every declared partition, in partition order.
pub fn partition_sizes(doc: &Value) -> Vec<usize> {
    let Some(partitions) = resolve(doc, &fields::DATA_PARTITIONS) else {
        return Vec::new();
    };
    keyed_children(partitions.value)
        .into_iter()
        .map(|(id, _)| {
            partition_coverage(doc, &id)
                .ok()
                .flatten()
                .map_or(0, |coverage| coverage.len())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tested branches
// ---------------------------------------------------------------------------

/// The explicit `tested` designation: per partition, branch name to whether
/// the branch was in the test set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestedMap {
    pub partitions: Vec<BTreeMap<String, bool>>,
}

impl TestedMap {
    pub fn is_tested(&self, branch: &str) -> bool {
        self.partitions
            .iter()
            .any(|partition| partition.get(branch).copied().unwrap_or(false))
    }

    /// Upper median of tested-branch counts across partitions.
    pub fn median_tested(&self) -> usize {
        let mut counts = self
            .partitions
            .iter()
            .map(|partition| partition.values().filter(|tested| **tested).count())
            .collect::<Vec<_>>();
        if counts.is_empty() {
            return 0;
        }
        counts.sort_unstable();
        counts[counts.len() / 2]
    }

    pub fn has_background(&self) -> bool {
        self.partitions
            .iter()
            .any(|partition| partition.values().any(|tested| !tested))
    }
}

pub fn tested_map(doc: &Value) -> Option<TestedMap> {
    let tested = resolve(doc, &fields::TESTED)?.value;
    if !is_present(Some(tested)) {
        return None;
    }

    let designation = |map: &Map<String, Value>| -> BTreeMap<String, bool> {
        map.iter()
            .filter_map(|(branch, status)| {
                status
                    .as_str()
                    .map(|status| (branch.clone(), status.eq_ignore_ascii_case("test")))
            })
            .collect()
    };

    let partitions = match tested {
        Value::Object(map) if map.values().all(Value::is_string) => vec![designation(map)],
        _ => keyed_children(tested)
            .into_iter()
            .filter_map(|(_, partition)| partition.as_object().map(designation))
            .collect(),
    };
    Some(TestedMap { partitions })
}

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

/// First tree string, whether `trees` is a string, a list or a partition map.
pub fn first_tree(doc: &Value) -> Option<&str> {
    let trees = resolve(doc, &fields::TREES)?.value;
    match trees {
        Value::String(newick) => Some(newick.as_str()),
        _ => keyed_children(trees)
            .into_iter()
            .find_map(|(_, tree)| tree.as_str()),
    }
}

/// Number of leaves (taxa) in a Newick string.
pub fn count_newick_leaves(newick: &str) -> usize {
    let mut leaves = 0;
    let mut expect_leaf = false;
    let mut in_quote = false;
    let mut in_comment = false;

    for ch in newick.chars() {
        if in_comment {
            in_comment = ch != ']';
            continue;
        }
        if in_quote {
            in_quote = ch != '\'';
            continue;
        }
        match ch {
            '[' => in_comment = true,
            '(' | ',' => expect_leaf = true,
            ')' | ';' | ':' => expect_leaf = false,
            c if c.is_whitespace() => {}
            _ => {
                if expect_leaf {
                    leaves += 1;
                    expect_leaf = false;
                }
                in_quote = ch == '\'';
            }
        }
    }
    leaves
}
