//! Small result documents shaped like real engine output.

use serde_json::{json, Value};

pub(crate) fn fel() -> Value {
    json!({
        "analysis": {
            "info": "FEL (Fixed Effects Likelihood) estimates site-wise synonymous (alpha) and non-synonymous (beta) rates"
        },
        "input": {
            "number of sequences": 8,
            "number of sites": 3,
            "partition count": 1,
            "trees": {"0": "((a,b)n1,(c,d)n2,(e,f)n3,(g,h)n4);"}
        },
        "MLE": {
            "headers": [
                ["alpha", "Synonymous substitution rate at a site"],
                ["beta", "Non-synonymous substitution rate at a site"],
                ["alpha=beta", "The rate estimate under the neutral model"],
                ["LRT", "Likelihood ratio test statistic for beta = alpha, versus beta != alpha"],
                ["p-value", "Asymptotic p-value for evidence of selection, i.e. beta != alpha"],
                ["Total branch length", "The total length of branches contributing to inference at this site"]
            ],
            "content": {"0": [
                [1.83, 1.04, 1.40, 0.26, 0.6064180503450036, 0.52],
                [0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                [2.02, 2.45, 2.20, 3.94, 0.047, 1.10]
            ]}
        },
        "data partitions": {"0": {"name": "default", "coverage": [[0, 1, 2]]}},
        "tested": {"0": {
            "a": "test", "b": "test", "c": "test", "d": "test",
            "e": "test", "f": "test", "g": "test", "h": "test",
            "n1": "background", "n2": "background", "n3": "background", "n4": "background"
        }}
    })
}

pub(crate) fn meme() -> Value {
    json!({
        "analysis": {
            "info": "MEME (Mixed Effects Model of Evolution) estimates a site-wise synonymous (alpha) and a two-category mixture of non-synonymous rates"
        },
        "input": {
            "number of sequences": 3,
            "number of sites": 4,
            "partition count": 2,
            "trees": {"0": "(a,b,c);", "1": "(a,b,c);"}
        },
        "MLE": {
            "headers": [
                ["alpha", "Synonymous substitution rate at a site"],
                ["beta-", "Non-synonymous substitution rate at a site for the negative/neutral evolution component"],
                ["p-", "Mixture distribution weight allocated to beta-; loosely -- the proportion of the tree evolving neutrally or under negative selection"],
                ["beta+", "Non-synonymous substitution rate at a site for the positive/neutral evolution component"],
                ["p+", "Mixture distribution weight allocated to beta+; loosely -- the proportion of the tree evolving neutrally or under positive selection"],
                ["LRT", "Likelihood ratio test statistic for episodic diversification, i.e., p+ > 0 and beta+ > alpha"],
                ["p-value", "Asymptotic p-value for episodic diversification, i.e., p+ > 0 and beta+ > alpha"],
                ["# branches under selection", "The (very approximate and rough) estimate of how many branches may have been under selection at this site"],
                ["Total branch length", "The total length of branches contributing to inference at this site"],
                ["MEME LogL", "Site Log-likelihood under the MEME model"],
                ["FEL LogL", "Site Log-likelihood under the FEL model"],
                ["Variation p", "Asymptotic p-value for whether or not there is evidence of dN/dS variation across branches"]
            ],
            "content": {
                "0": [
                    [1.2, 0.5, 0.7, 4.1, 0.3, 5.2, 0.04, 2.0, 1.1, -10.0, -12.0, 0.2],
                    [0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.2, -3.0, -3.0, 1.0]
                ],
                "1": [
                    [0.8, 0.4, 0.9, 1.1, 0.1, 0.2, 0.6, 0.0, 0.9, -8.0, -8.0, 0.5],
                    [1.0, 0.2, 0.5, 6.0, 0.5, 9.8, 0.005, 4.0, 1.3, -11.0, -15.0, 0.03]
                ]
            },
            "LRT": {
                "0": [[1.2, 0.3, 2.2], [0.0, 0.0, 0.0]],
                "1": [[0.1, 0.4, 0.2], [3.3, 2.9, 4.0]]
            }
        },
        "data partitions": {
            "0": {"name": "first", "coverage": [[0, 1]]},
            "1": {"name": "second", "coverage": [[2, 3]]}
        },
        "tested": {
            "0": {"a": "test", "b": "test", "c": "background"},
            "1": {"a": "test", "b": "test", "c": "background"}
        },
        "branch attributes": {
            "0": {
                "a": {"Posterior prob omega class by site": [[0.1, 1.0], [0.9, 0.0]]},
                "b": {"Posterior prob omega class by site": [[0.7, 1.0], [0.3, 0.0]]}
            },
            "1": {
                "a": {"Posterior prob omega class by site": [[0.5, 0.02], [0.5, 0.98]]}
            },
            "attributes": {"Posterior prob omega class by site": {"attribute type": "node label"}}
        },
        "substitutions": {"0": {"0": {"a": "ATG", "b": "ATA"}}}
    })
}

pub(crate) fn absrel() -> Value {
    json!({
        "input": {
            "number of sequences": 4,
            "number of sites": 3,
            "partition count": 1,
            "trees": {"0": "((A,B)Node1,C,D);"}
        },
        "fits": {
            "Baseline MG94xREV": {"Log Likelihood": -1240.1, "AIC-c": 2500.3, "estimated parameters": 10},
            "Full adaptive model": {
                "Log Likelihood": -1234.5,
                "AIC-c": 2495.0,
                "estimated parameters": 14,
                "Rate Distributions": {
                    "Synonymous site-to-site rates": {
                        "0": {"rate": 0.5, "proportion": 0.4},
                        "1": {"rate": 1.5, "proportion": 0.6}
                    }
                }
            }
        },
        "test results": {"P-value threshold": 0.05, "positive test results": 1, "tested": 4},
        "tested": {"0": {"A": "test", "B": "test", "C": "test", "D": "test", "Node1": "background"}},
        "branch attributes": {
            "0": {
                "A": {
                    "Rate classes": 2,
                    "Uncorrected P-value": 0.012,
                    "Corrected P-value": 0.046,
                    "LRT": 9.1,
                    "Rate Distributions": [[0.2, 0.9], [12.5, 0.1]],
                    "rate at which 2 nucleotides are changed instantly within a single codon": 0.1,
                    "rate at which 3 nucleotides are changed instantly within a single codon": 0.02
                },
                "B": {
                    "Rate classes": 1,
                    "Uncorrected P-value": 0.09,
                    "Corrected P-value": 0.36,
                    "LRT": 1.2,
                    "Rate Distributions": [[0.5, 1.0]],
                    "rate at which 2 nucleotides are changed instantly within a single codon": 0.3,
                    "rate at which 3 nucleotides are changed instantly within a single codon": 0.0
                },
                "C": {
                    "Rate classes": 1,
                    "Uncorrected P-value": 0.5,
                    "LRT": 0.0,
                    "Rate Distributions": [[0.3, 1.0]]
                },
                "D": {
                    "Rate classes": 2,
                    "Uncorrected P-value": 1.0,
                    "Corrected P-value": 1.0,
                    "LRT": 0.0,
                    "Rate Distributions": [[0.1, 0.5], [1.0, 0.5]]
                },
                "Node1": {"Rate classes": 1, "Rate Distributions": [[0.4, 1.0]]}
            },
            "attributes": {"Rate classes": {"attribute type": "branch label"}}
        },
        "Site Log Likelihood": {
            "unconstrained": [[-16.0, -20.0, -9.0]],
            "tested": {
                "A": [[-21.0, -20.5, -9.0]],
                "B": [[-16.1], [-20.0], [-9.2]]
            }
        },
        "Synonymous site-posteriors": [[0.9, 0.1, 0.5], [0.1, 0.9, 0.5]],
        "data partitions": {"0": {"name": "absrel.filter.default", "coverage": [[0, 1, 2]]}}
    })
}

/// Legacy layout: test results keyed by branch, no `tested` map.
pub(crate) fn absrel_legacy() -> Value {
    json!({
        "sequences": 3,
        "sites": 5,
        "branches with selection": 1,
        "p-value threshold": 0.05,
        "test results": {
            "X": {"uncorrected p": 0.001, "corrected p": 0.003, "Rate classes": 2, "LRT": 12.0},
            "Y": {"uncorrected p": 0.2, "Bayes Factor": 2.1},
            "Z": {"uncorrected p": 0.04}
        },
        "branch attributes": {
            "X": {"Rate Distributions": {"0": [0.1, 0.8], "1": [9.0, 0.2]}},
            "W": {"Rate Distributions": {"0": [0.7, 1.0]}}
        }
    })
}

pub(crate) fn fubar() -> Value {
    json!({
        "analysis": {
            "info": "Perform a Fast Unbiased AppRoximate Bayesian (FUBAR) analysis of a coding sequence alignment"
        },
        "input": {"number of sequences": 5, "number of sites": 4, "partition count": 1},
        "MLE": {
            "headers": [
                ["alpha", "Mean posterior synonymous substitution rate at a site"],
                ["beta", "Mean posterior non-synonymous substitution rate at a site"],
                ["beta-alpha", "Mean posterior beta-alpha"],
                ["Prob[alpha>beta]", "Posterior probability of negative selection at a site"],
                ["Prob[alpha<beta]", "Posterior probability of positive selection at a site"],
                ["BayesFactor[alpha<beta]", "Empiricial Bayes Factor for positive selection at a site"]
            ],
            "content": {"0": [
                [1.0, 3.0, 2.0, 0.02, 0.95, 125.0],
                [3.0, 0.2, -2.8, 0.97, 0.01, 0.05],
                [1.0, 1.1, 0.1, 0.4, 0.6, 2.1],
                [0.0, 0.0, 0.0, 0.5, 0.5, 1.0]
            ]}
        },
        "data partitions": {"0": {"name": "default", "coverage": [[0, 1, 2, 3]]}},
        "grid": [[0.1, 0.1, 0.02], [0.1, 1.0, 0.3], [1.0, 5.0, 0.68]],
        "posterior": {"0": [
            [[0.01, 0.04, 0.95]],
            [[0.7, 0.25, 0.05]],
            [[0.2, 0.5, 0.3]],
            [[0.3, 0.4, 0.3]]
        ]}
    })
}

pub(crate) fn multihit() -> Value {
    json!({
        "analysis": {
            "info": "Examine whether or not a codon alignment is better fit by models which permit multiple instantaneous substitutions"
        },
        "input": {
            "number of sequences": 6,
            "number of sites": 4,
            "partition count": 1,
            "trees": {"0": "((a,b),(c,d),(e,f));"}
        },
        "test results": {
            "Double-hit vs single-hit": {"LRT": 8.4, "p-value": 0.01},
            "Triple-hit vs Triple-hit-island": {"LRT": 0.2, "p-value": 0.5},
            "Triple-hit vs double-hit": {"LRT": 2.7, "p-value": 0.1},
            "Triple-hit vs single-hit": {"LRT": 11.1, "p-value": 0.04},
            "Triple-hit-island vs double-hit": {"LRT": 0.0, "p-value": 0.8}
        },
        "Evidence Ratios": {
            "Three-hit": [[1.2, 3.0, 0.9, 6.1]],
            "Three-hit islands vs 2-hit": [[0.8, 1.1, 1.0, 2.0]],
            "Three-hit vs three-hit islands": [[1.5, 0.7, 1.3, 4.9]],
            "Two-hit": [[0.4, 12.5, 1.0, 2.2]]
        },
        "Site Log Likelihood": {
            "Standard (single-hit)": [[-12.1, -30.4, -8.8, -22.0]],
            "Double-hit": [[-12.0, -28.0, -8.8, -21.5]],
            "Triple-hit": [[-11.9, -27.9, -8.7, -20.1]],
            "Triple-hit-island": [[-12.0, -28.0, -8.8, -21.4]]
        },
        "data partitions": {"0": {"name": "default", "coverage": [[0, 1, 2, 3]]}}
    })
}
