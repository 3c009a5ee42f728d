//! One module per method family. Each exposes the same query surface:
//! `extract` (attributes), `classify` (one record), `tiles` and `table`,
//! plus `try_*` variants that surface malformed shapes to the caller.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::model::{TableSpec, Thresholds, TileSpec};
use crate::schema::{self, fields};

pub mod absrel;
mod common;
pub mod fel;
pub mod fubar;
pub mod meme;
pub mod multihit;

#[cfg(test)]
pub(crate) mod fixtures;

const METHOD_NAME_PATTERN: &str = r"(?i)\b(aBSREL|FUBAR|MEME|FEL|multi-?hit)\b";

static METHOD_NAME: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(METHOD_NAME_PATTERN));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Method {
    Fel,
    Meme,
    Absrel,
    Fubar,
    MultiHit,
}

/// Attributes of whichever method produced a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MethodAttributes {
    Fel(fel::FelAttributes),
    Meme(meme::MemeAttributes),
    Absrel(absrel::AbsrelAttributes),
    Fubar(fubar::FubarAttributes),
    MultiHit(multihit::MultiHitAttributes),
}

impl Method {
    pub const ALL: [Method; 5] = [Method::Fel, Method::Meme, Method::Absrel, Method::Fubar, Method::MultiHit];

    pub fn name(self) -> &'static str {
        match self {
            Self::Fel => "FEL",
            Self::Meme => "MEME",
            Self::Absrel => "aBSREL",
            Self::Fubar => "FUBAR",
            Self::MultiHit => "Multi-hit",
        }
    }

    pub fn default_thresholds(self) -> Thresholds {
        match self {
            Self::Fel => fel::DEFAULT_THRESHOLDS,
            Self::Meme => meme::DEFAULT_THRESHOLDS,
            Self::Absrel => absrel::DEFAULT_THRESHOLDS,
            Self::Fubar => fubar::DEFAULT_THRESHOLDS,
            Self::MultiHit => multihit::DEFAULT_THRESHOLDS,
        }
    }

    /// Caller overrides merged over this method's defaults.
    pub fn thresholds(self, p_value: Option<f64>, evidence_ratio: Option<f64>) -> Thresholds {
        let defaults = self.default_thresholds();
        Thresholds::sanitized(
            p_value.unwrap_or(defaults.p_value),
            evidence_ratio.unwrap_or(defaults.evidence_ratio),
            defaults,
        )
    }

    /// Names the producing method from the analysis description, falling back
    /// to structural fingerprints of the result matrix.
    pub fn detect(doc: &Value) -> Option<Method> {
        Self::detect_from_description(doc).or_else(|| Self::detect_from_structure(doc))
    }

    fn detect_from_description(doc: &Value) -> Option<Method> {
        let pattern = match &*METHOD_NAME {
            Ok(pattern) => pattern,
            Err(error) => {
                warn!(%error, "method name pattern failed to compile, using structure only");
                return None;
            }
        };
        [fields::ANALYSIS_INFO, fields::ANALYSIS_VERSION]
            .iter()
            .filter_map(|field| schema::resolve(doc, field).and_then(|found| found.value.as_str()))
            .find_map(|text| {
                let name = pattern.captures(text)?.get(1)?.as_str().to_ascii_lowercase();
                match name.as_str() {
                    "absrel" => Some(Method::Absrel),
                    "fubar" => Some(Method::Fubar),
                    "meme" => Some(Method::Meme),
                    "fel" => Some(Method::Fel),
                    "multi-hit" | "multihit" => Some(Method::MultiHit),
                    _ => None,
                }
            })
    }

    fn detect_from_structure(doc: &Value) -> Option<Method> {
        let header_keys = schema::resolve(doc, &fields::MLE_HEADERS)
            .and_then(|headers| schema::parse_columns(headers.value, "MLE/headers").ok())
            .unwrap_or_default()
            .into_iter()
            .map(|column| column.key)
            .collect::<Vec<_>>();
        let has_header = |key: &str| header_keys.iter().any(|candidate| candidate == key);

        if has_header("beta+") {
            Some(Method::Meme)
        } else if header_keys.iter().any(|key| key.starts_with("Prob[")) || schema::field_present(doc, &fields::GRID) {
            Some(Method::Fubar)
        } else if schema::field_present(doc, &fields::MLE_CONTENT) {
            Some(Method::Fel)
        } else if multihit::has_hit_tests(doc) {
            Some(Method::MultiHit)
        } else if schema::field_present(doc, &fields::BRANCH_ATTRIBUTES) || schema::field_present(doc, &fields::TEST_RESULTS) {
            Some(Method::Absrel)
        } else {
            None
        }
    }

    pub fn attributes(self, doc: Option<&Value>) -> MethodAttributes {
        match self {
            Self::Fel => MethodAttributes::Fel(fel::extract(doc)),
            Self::Meme => MethodAttributes::Meme(meme::extract(doc)),
            Self::Absrel => MethodAttributes::Absrel(absrel::extract(doc)),
            Self::Fubar => MethodAttributes::Fubar(fubar::extract(doc)),
            Self::MultiHit => MethodAttributes::MultiHit(multihit::extract(doc)),
        }
    }

    pub fn tiles(self, doc: Option<&Value>, thresholds: &Thresholds) -> Vec<TileSpec> {
        match self {
            Self::Fel => fel::tiles(doc, thresholds),
            Self::Meme => meme::tiles(doc, thresholds),
            Self::Absrel => absrel::tiles(doc, thresholds),
            Self::Fubar => fubar::tiles(doc, thresholds),
            Self::MultiHit => multihit::tiles(doc, thresholds),
        }
    }

    pub fn table(self, doc: Option<&Value>, thresholds: &Thresholds) -> TableSpec {
        match self {
            Self::Fel => fel::table(doc, thresholds),
            Self::Meme => meme::table(doc, thresholds),
            Self::Absrel => absrel::table(doc, thresholds),
            Self::Fubar => fubar::table(doc, thresholds),
            Self::MultiHit => multihit::table(doc, thresholds),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
