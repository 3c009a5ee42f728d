//! Per-record classification.
//!
//! Every rule is a flat decision table over one record's numbers and the
//! caller's threshold. No rule looks at other records.

use serde::Serialize;

/// Rates at or below this are treated as zero.
pub const RATE_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SiteClass {
    Diversifying,
    Purifying,
    Neutral,
    Invariable,
}

impl SiteClass {
    pub const ALL: [SiteClass; 4] = [
        SiteClass::Diversifying,
        SiteClass::Purifying,
        SiteClass::Neutral,
        SiteClass::Invariable,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Diversifying => "Diversifying",
            Self::Purifying => "Purifying",
            Self::Neutral => "Neutral",
            Self::Invariable => "Invariable",
        }
    }

    pub fn is_significant(self) -> bool {
        matches!(self, Self::Diversifying | Self::Purifying)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BranchClass {
    Significant,
    Tested,
    #[serde(rename = "Not-tested")]
    NotTested,
}

impl BranchClass {
    pub const ALL: [BranchClass; 3] = [
        BranchClass::Significant,
        BranchClass::Tested,
        BranchClass::NotTested,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Significant => "Significant",
            Self::Tested => "Tested",
            Self::NotTested => "Not-tested",
        }
    }

    pub fn is_significant(self) -> bool {
        self == Self::Significant
    }
}

/// The numbers a site-level dN/dS rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateEvidence {
    pub synonymous: Option<f64>,
    pub nonsynonymous: Option<f64>,
    pub p_value: Option<f64>,
}

fn is_zero(rate: f64) -> bool {
    rate.abs() <= RATE_EPSILON
}

/// Invariable needs every listed rate reported and zero.
pub fn is_invariable(rates: &[Option<f64>]) -> bool {
    !rates.is_empty() && rates.iter().all(|rate| rate.is_some_and(is_zero))
}

/// Site rule shared by the dN/dS methods:
///
/// | rates both zero | p <= threshold | beta > alpha | class        |
/// |-----------------|----------------|--------------|--------------|
/// | yes             | any            | any          | Invariable   |
/// | no              | yes            | yes          | Diversifying |
/// | no              | yes            | no           | Purifying    |
/// | no              | no / absent    | any          | Neutral      |
pub fn classify_site(evidence: &RateEvidence, threshold: f64) -> SiteClass {
    if is_invariable(&[evidence.synonymous, evidence.nonsynonymous]) {
        return SiteClass::Invariable;
    }
    let significant = evidence.p_value.is_some_and(|p| p <= threshold);
    if !significant {
        return SiteClass::Neutral;
    }
    match (evidence.synonymous, evidence.nonsynonymous) {
        (Some(alpha), Some(beta)) if beta > alpha => SiteClass::Diversifying,
        (Some(_), Some(_)) => SiteClass::Purifying,
        // direction unknown without both rates
        _ => SiteClass::Neutral,
    }
}

/// Episodic variant: the test is one-sided for beta+ > alpha, so a
/// significant site is always Diversifying. Invariable requires alpha, beta+
/// and (when reported) beta- to be zero.
pub fn classify_episodic_site(
    alpha: Option<f64>,
    beta_minus: Option<f64>,
    beta_plus: Option<f64>,
    p_value: Option<f64>,
    threshold: f64,
) -> SiteClass {
    let mut rates = vec![alpha, beta_plus];
    if beta_minus.is_some() {
        rates.push(beta_minus);
    }
    if is_invariable(&rates) {
        SiteClass::Invariable
    } else if p_value.is_some_and(|p| p <= threshold) {
        SiteClass::Diversifying
    } else {
        SiteClass::Neutral
    }
}

/// Posterior variant: support is a probability that must reach the threshold.
pub fn classify_posterior_site(
    alpha: Option<f64>,
    beta: Option<f64>,
    prob_purifying: Option<f64>,
    prob_diversifying: Option<f64>,
    threshold: f64,
) -> SiteClass {
    let supported = |probability: Option<f64>| probability.is_some_and(|p| p >= threshold);
    if is_invariable(&[alpha, beta]) {
        SiteClass::Invariable
    } else if supported(prob_diversifying) {
        SiteClass::Diversifying
    } else if supported(prob_purifying) {
        SiteClass::Purifying
    } else {
        SiteClass::Neutral
    }
}

pub fn classify_branch(tested: bool, corrected_p: Option<f64>, threshold: f64) -> BranchClass {
    if !tested {
        BranchClass::NotTested
    } else if corrected_p.is_some_and(|p| p <= threshold) {
        BranchClass::Significant
    } else {
        BranchClass::Tested
    }
}
