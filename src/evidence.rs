//! Secondary statistics derived from reported values.
//!
//! Every function here is total: degenerate inputs (p = 1, zero odds, NaN)
//! map to a documented value instead of NaN or a panic.

use serde::Serialize;

/// `p / (1 - p)`, with `odds(1) = +inf`. Inputs are clamped into `[0, 1]`.
pub fn odds(p: f64) -> f64 {
    let p = p.clamp(0.0, 1.0);
    if p >= 1.0 { f64::INFINITY } else { p / (1.0 - p) }
}

/// Posterior odds over prior odds.
///
/// Both odds zero, both infinite, or either probability undefined yields 1
/// (no shift in evidence). Positive posterior odds over zero prior odds
/// yields `+inf`.
pub fn evidence_ratio(prior: f64, posterior: f64) -> f64 {
    if prior.is_nan() || posterior.is_nan() {
        return 1.0;
    }
    let prior_odds = odds(prior);
    let posterior_odds = odds(posterior);

    match (prior_odds, posterior_odds) {
        (p, q) if p == 0.0 && q == 0.0 => 1.0,
        (p, _) if p == 0.0 => f64::INFINITY,
        (p, q) if p.is_infinite() && q.is_infinite() => 1.0,
        (p, q) => q / p,
    }
}

/// Ordinal strength of a Bayes factor, breakpoints 1, 3, 10 and 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BayesTier {
    #[serde(rename = "No Evidence")]
    NoEvidence,
    Weak,
    Substantial,
    Strong,
    #[serde(rename = "Very Strong")]
    VeryStrong,
}

impl BayesTier {
    pub fn from_bayes_factor(bayes_factor: f64) -> Self {
        match bayes_factor {
            bf if bf.is_nan() || bf < 1.0 => Self::NoEvidence,
            bf if bf < 3.0 => Self::Weak,
            bf if bf < 10.0 => Self::Substantial,
            bf if bf < 100.0 => Self::Strong,
            _ => Self::VeryStrong,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoEvidence => "No Evidence",
            Self::Weak => "Weak",
            Self::Substantial => "Substantial",
            Self::Strong => "Strong",
            Self::VeryStrong => "Very Strong",
        }
    }
}

/// `2 * (logL_alternative - logL_null)`.
///
/// Model nesting is not checked and negative values are returned as computed.
/// Only an undefined difference (NaN, or inf - inf) collapses to 0.
pub fn likelihood_ratio(null_log_likelihood: f64, alternative_log_likelihood: f64) -> f64 {
    let statistic = 2.0 * (alternative_log_likelihood - null_log_likelihood);
    if statistic.is_nan() { 0.0 } else { statistic }
}

/// Bayes factor stand-in for engines that report only a branch LRT.
pub fn bayes_factor_from_lrt(lrt: f64) -> f64 {
    if lrt.is_nan() { 1.0 } else { lrt.exp() }
}

/// Holm-Bonferroni step-down adjustment, returned in input order.
/// Undefined p-values are treated as 1.
pub fn holm_bonferroni(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    let mut order = (0..m).collect::<Vec<_>>();
    let sanitized = p_values
        .iter()
        .map(|p| if p.is_nan() { 1.0 } else { p.clamp(0.0, 1.0) })
        .collect::<Vec<_>>();
    order.sort_by(|left, right| sanitized[*left].total_cmp(&sanitized[*right]));

    let mut adjusted = vec![1.0; m];
    let mut running_max = 0.0_f64;
    for (rank, index) in order.into_iter().enumerate() {
        let scaled = ((m - rank) as f64 * sanitized[index]).min(1.0);
        running_max = running_max.max(scaled);
        adjusted[index] = running_max;
    }
    adjusted
}

/// Whether a test passes the threshold before and after multiple-testing correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Significance {
    pub uncorrected: bool,
    pub corrected: bool,
}

impl Significance {
    pub fn assess(uncorrected: Option<f64>, corrected: Option<f64>, threshold: f64) -> Self {
        let passes = |p: Option<f64>| p.is_some_and(|p| p <= threshold);
        Self {
            uncorrected: passes(uncorrected),
            corrected: passes(corrected),
        }
    }

    /// Significant only before correction.
    pub fn lost_to_correction(self) -> bool {
        self.uncorrected && !self.corrected
    }
}
