use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use selection_report::{Method, Thresholds};
use serde_json::Value;
use tracing::info;

use crate::cli::{MethodArg, QueryArgs};
use crate::util::sha256_hex;

/// A parsed result document with the method and thresholds that apply to it.
#[derive(Debug)]
pub struct Analysis {
    pub source: String,
    pub sha256: String,
    pub document: Option<Value>,
    pub method: Method,
    pub thresholds: Thresholds,
}

impl Analysis {
    pub fn document(&self) -> Option<&Value> {
        self.document.as_ref()
    }
}

pub fn load(args: &QueryArgs) -> Result<Analysis> {
    let (source, bytes) = read_input(&args.input)?;
    let document = parse_document(&bytes, &source)?;
    let method = resolve_method(args.method, document.as_ref())?;
    let thresholds = method.thresholds(args.threshold, args.er_threshold);

    info!(
        source = %source,
        method = %method,
        requested = args.method.as_str(),
        threshold = thresholds.p_value,
        er_threshold = thresholds.evidence_ratio,
        "loaded result document"
    );

    Ok(Analysis {
        source,
        sha256: sha256_hex(&bytes),
        document,
        method,
        thresholds,
    })
}

fn read_input(path: &Path) -> Result<(String, Vec<u8>)> {
    if path.as_os_str() == "-" {
        let mut bytes = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("failed to read result document from stdin")?;
        return Ok(("<stdin>".to_string(), bytes));
    }

    let bytes = fs::read(path)
        .with_context(|| format!("failed to read result document: {}", path.display()))?;
    Ok((path.display().to_string(), bytes))
}

/// A JSON `null` document means "no results yet" and is not an error.
pub fn parse_document(bytes: &[u8], source: &str) -> Result<Option<Value>> {
    let value: Value = serde_json::from_slice(bytes)
        .with_context(|| format!("failed to parse result document: {source}"))?;
    Ok(match value {
        Value::Null => None,
        value => Some(value),
    })
}

pub fn resolve_method(choice: MethodArg, document: Option<&Value>) -> Result<Method> {
    if let Some(method) = choice.method() {
        return Ok(method);
    }
    let Some(document) = document else {
        bail!("cannot detect the method of an empty document; pass --method");
    };
    match Method::detect(document) {
        Some(method) => Ok(method),
        None => bail!("could not detect the analysis method; pass --method"),
    }
}
