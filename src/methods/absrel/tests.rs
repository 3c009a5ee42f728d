use serde_json::json;

use super::*;
use crate::methods::fixtures;
use crate::model::{find_tile, TileValue};

fn branch<'a>(branches: &'a [AbsrelBranch], name: &str) -> &'a AbsrelBranch {
    branches.iter().find(|branch| branch.name == name).unwrap()
}

#[test]
fn branches_merge_attributes_and_honour_tested_map() {
    let branches = branches(Some(&fixtures::absrel()));
    let names = branches.iter().map(|branch| branch.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["A", "B", "C", "D", "Node1"]);

    let a = branch(&branches, "A");
    assert!(a.tested);
    assert_eq!(a.rate_classes, Some(2));
    assert_eq!(a.corrected_p, Some(0.046));
    assert!(!a.holm_corrected);
    assert_eq!(a.omega_distribution[1], RateClass { rate: 12.5, weight: 0.1 });
    assert!((a.bayes_factor.unwrap() - 9.1_f64.exp()).abs() < 1e-6);
    assert_eq!(a.bayes_tier(), Some(BayesTier::VeryStrong));

    assert!(!branch(&branches, "Node1").tested);
}

#[test]
fn missing_corrected_p_is_filled_by_holm() {
    let branches = branches(Some(&fixtures::absrel()));
    let c = branch(&branches, "C");
    assert!(c.holm_corrected);
    assert_eq!(c.corrected_p, Some(1.0));
    assert_eq!(branch(&branches, "B").corrected_p, Some(0.36));
}

#[test]
fn legacy_layout_infers_tested_from_results() {
    let branches = branches(Some(&fixtures::absrel_legacy()));
    let names = branches.iter().map(|branch| branch.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["W", "X", "Y", "Z"]);

    assert!(!branch(&branches, "W").tested);
    let x = branch(&branches, "X");
    assert!(x.tested);
    assert_eq!(x.corrected_p, Some(0.003));
    assert_eq!(x.omega_distribution.len(), 2);

    let y = branch(&branches, "Y");
    assert_eq!(y.bayes_tier(), Some(BayesTier::Weak));
    assert!((y.corrected_p.unwrap() - 0.2).abs() < 1e-12);
    assert!((branch(&branches, "Z").corrected_p.unwrap() - 0.08).abs() < 1e-12);
}

#[test]
fn explicit_tested_map_wins_over_results() {
    let mut doc = fixtures::absrel_legacy();
    doc["tested"] = json!({"0": {"X": "test", "Y": "background", "Z": "test", "W": "test"}});
    let branches = branches(Some(&doc));
    assert!(!branch(&branches, "Y").tested);
    assert!(branch(&branches, "W").tested);
}

#[test]
fn branch_classification() {
    let branches = branches(Some(&fixtures::absrel()));
    let classes = branches
        .iter()
        .map(|branch| classify(branch, 0.05))
        .collect::<Vec<_>>();
    assert_eq!(
        classes,
        vec![
            BranchClass::Significant,
            BranchClass::Tested,
            BranchClass::Tested,
            BranchClass::Tested,
            BranchClass::NotTested
        ]
    );
    let b = branch(&branches, "B");
    assert!(b.significance(0.1).uncorrected);
    assert!(b.significance(0.1).lost_to_correction());
}

#[test]
fn fit_summary_reports_raw_likelihood_ratio() {
    let summary = fit_summary(Some(&fixtures::absrel()));
    assert_eq!(summary.baseline.as_ref().unwrap().name, "Baseline MG94xREV");
    assert_eq!(summary.full.as_ref().unwrap().parameters, Some(14));
    assert!((summary.likelihood_ratio.unwrap() - 11.2).abs() < 1e-6);

    let legacy = json!({"fits": {
        "Baseline model": {"log-likelihood": -10.0, "AIC": 30.0, "parameters": 5},
        "Full adaptive model": {"log-likelihood": -12.0, "AIC": 36.0, "parameters": 6}
    }});
    assert!((fit_summary(Some(&legacy)).likelihood_ratio.unwrap() + 4.0).abs() < 1e-12);
    assert_eq!(model_fits(Some(&legacy)).len(), 2);
    assert_eq!(fit_summary(None), FitSummary::default());
}

#[test]
fn profile_sites_are_exp_of_log_likelihood_gap() {
    let profiles = profile_sites(Some(&fixtures::absrel()));
    assert_eq!(profiles.len(), 6);
    let first = &profiles[0];
    assert_eq!((first.branch.as_str(), first.site), ("A", 1));
    assert!((first.evidence_ratio - 5.0_f64.exp()).abs() < 1e-9);
    let singleton_layout = profiles.iter().find(|profile| profile.branch == "B" && profile.site == 3).unwrap();
    assert!((singleton_layout.evidence_ratio - 0.2_f64.exp()).abs() < 1e-9);
}

#[test]
fn malformed_profile_surfaces_from_try() {
    let mut doc = fixtures::absrel();
    doc["Site Log Likelihood"]["tested"]["A"] = json!({"bad": true});
    let error = try_profile_sites(&doc).unwrap_err();
    assert_eq!(error.path(), "Site Log Likelihood/tested/A");
    assert!(profile_sites(Some(&doc)).is_empty());
    assert!(try_site_table(&doc, &DEFAULT_THRESHOLDS).is_err());
}

#[test]
fn attributes_cover_srv_rate_classes_and_multi_hit() {
    let attributes = extract(Some(&fixtures::absrel()));
    assert_eq!(attributes.number_of_sequences, 4);
    assert_eq!(attributes.tested_branch_count, 4);
    assert_eq!(attributes.positive_results, 1);
    assert_eq!(attributes.reported_p_threshold, Some(0.05));
    assert_eq!(attributes.profilable_branches, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(attributes.srv_rate_classes, 2);
    assert_eq!(attributes.srv_distribution.len(), 2);
    assert_eq!(attributes.omega_rate_classes, RateClassRange { min: 1, max: 2 });
    assert!((attributes.multi_hit.double_hit.unwrap() - 0.2).abs() < 1e-12);
    assert!((attributes.multi_hit.triple_hit.unwrap() - 0.01).abs() < 1e-12);
    assert_eq!(attributes.partition_sizes, vec![3]);
}

#[test]
fn legacy_attributes_fall_back() {
    let attributes = extract(Some(&fixtures::absrel_legacy()));
    assert_eq!(attributes.number_of_sequences, 3);
    assert_eq!(attributes.number_of_sites, 5);
    assert_eq!(attributes.number_of_partitions, 1);
    assert_eq!(attributes.tested_branch_count, 3);
    assert_eq!(attributes.positive_results, 1);
    assert_eq!(attributes.multi_hit, MultiHitRates::default());
}

#[test]
fn extract_without_branches_is_zeroed() {
    assert_eq!(extract(Some(&json!({"input": {"number of sites": 4}}))), AbsrelAttributes::default());
    assert_eq!(extract(None), AbsrelAttributes::default());
}

#[test]
fn tiles_follow_documented_order() {
    let thresholds = Thresholds {
        p_value: 0.05,
        evidence_ratio: 1.0,
    };
    let tiles = tiles(Some(&fixtures::absrel()), &thresholds);
    let keys = tiles.iter().map(|tile| tile.key).collect::<Vec<_>>();
    assert_eq!(
        keys,
        vec![
            "sequences",
            "sites",
            "partitions",
            "tested_branches",
            "rate_classes",
            "synonymous_rate_variation",
            "selected_branches",
            "sites_per_tested_branch",
            "multi_hit_rates"
        ]
    );
    assert_eq!(find_tile(&tiles, "rate_classes").unwrap().number, TileValue::Text("1-2".to_string()));
    assert_eq!(
        find_tile(&tiles, "synonymous_rate_variation").unwrap().number,
        TileValue::Text("2 classes".to_string())
    );
    assert_eq!(find_tile(&tiles, "selected_branches").unwrap().number, TileValue::Count(1));
    assert_eq!(
        find_tile(&tiles, "sites_per_tested_branch").unwrap().number,
        TileValue::Text("1.5".to_string())
    );
    assert_eq!(
        find_tile(&tiles, "multi_hit_rates").unwrap().number,
        TileValue::Text("0.2000:0.0100".to_string())
    );
}

#[test]
fn legacy_tiles_omit_unreported_sections() {
    let tiles = tiles(Some(&fixtures::absrel_legacy()), &DEFAULT_THRESHOLDS);
    assert!(find_tile(&tiles, "sites_per_tested_branch").is_none());
    assert!(find_tile(&tiles, "multi_hit_rates").is_none());
    assert_eq!(
        find_tile(&tiles, "synonymous_rate_variation").unwrap().number,
        TileValue::Text("None".to_string())
    );
}

#[test]
fn branch_table_rows_and_labels() {
    let table = table(Some(&fixtures::absrel()), &DEFAULT_THRESHOLDS);
    assert_eq!(table.rows.len(), 5);
    assert_eq!(table.count_class("Significant"), 1);
    assert_eq!(table.count_class("Not-tested"), 1);
    assert_eq!(table.headers.last().unwrap().label, "Branch classification at p≤0.05");

    let rendered = table.render_row(&table.rows[0]);
    assert_eq!(rendered[0], "A");
    assert_eq!(rendered[4], "0.0460");
    assert_eq!(rendered[6], "Very Strong");
    let node = table.render_row(&table.rows[4]);
    assert_eq!(node[3], "N/A");
}

#[test]
fn distribution_table_counts_supported_sites_for_tested_branches() {
    let table = distribution_table(Some(&fixtures::absrel()), &DEFAULT_THRESHOLDS);
    assert_eq!(table.rows[0]["sites"], Cell::Integer(1));
    assert_eq!(table.rows[1]["sites"], Cell::Integer(0));
    assert_eq!(table.rows[4]["sites"], Cell::Missing);
    assert_eq!(
        table.rows[0]["distribution"],
        Cell::Text("ω1 = 0.20 (90.00%), ω2 = 12.50 (10.00%)".to_string())
    );
    assert_eq!(table.headers[3].label, "Sites with ER≥100");
}

#[test]
fn site_table_carries_log_likelihood_srv_mean_and_er_count() {
    let table = site_table(Some(&fixtures::absrel()), &DEFAULT_THRESHOLDS);
    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.rows[0]["codon"], Cell::Integer(1));
    assert_eq!(table.rows[0]["LogL"], Cell::Number(-16.0));
    assert_eq!(table.rows[0]["ER"], Cell::Integer(1));
    assert_eq!(table.rows[1]["ER"], Cell::Integer(0));
    match &table.rows[1]["SRV posterior mean"] {
        Cell::Number(mean) => assert!((mean - 1.4).abs() < 1e-12),
        other => panic!("unexpected cell {other:?}"),
    }
    assert_eq!(table.headers.last().unwrap().label, "ER Branch (≥100)");
}

#[test]
fn null_documents_degrade() {
    assert!(tiles(None, &DEFAULT_THRESHOLDS).is_empty());
    assert!(table(None, &DEFAULT_THRESHOLDS).rows.is_empty());
    assert!(site_table(None, &DEFAULT_THRESHOLDS).rows.is_empty());
    assert!(distribution_table(None, &DEFAULT_THRESHOLDS).rows.is_empty());
}

#[test]
fn site_support_is_bucketed_by_site() {
    let profile = |branch: &str, site: usize, evidence_ratio: f64| ProfileSite {
        branch: branch.to_string(),
        site,
        evidence_ratio,
    };
    let profiles = vec![
        profile("A", 1, 500.0),
        profile("B", 1, 120.0),
        profile("A", 2, 3.0),
        profile("B", 3, f64::INFINITY),
        profile("C", 9, 1000.0),
    ];
    assert_eq!(supported_branches_by_site(&profiles, 3, 100.0), vec![2, 0, 1]);
}

#[test]
fn site_table_counts_match_profiles_on_a_long_alignment() {
    let sites = 3000;
    let free = (0..sites).map(|site| -(site as f64 % 7.0)).collect::<Vec<_>>();
    let branch = |shift: f64| free.iter().map(|ll| ll - shift).collect::<Vec<_>>();
    let doc = json!({
        "Site Log Likelihood": {
            "unconstrained": [free],
            "tested": {"A": [branch(5.0)], "B": [branch(1.0)], "C": [branch(6.0)]}
        }
    });
    let table = site_table(Some(&doc), &DEFAULT_THRESHOLDS);
    assert_eq!(table.rows.len(), sites);
    assert!(table.rows.iter().all(|row| row["ER"] == Cell::Integer(2)));
}
