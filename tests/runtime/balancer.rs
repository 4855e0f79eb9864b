//! Tests for load-balancing policies

use std::collections::HashMap;

use h2_rpc::{LbPolicy, LbPolicyKind};

#[test]
fn test_pick_first_returns_first_available() {
    let policy = LbPolicy::new(LbPolicyKind::PickFirst);
    policy.add_address("a", 1);
    policy.add_address("b", 1);
    assert_eq!(policy.pick().as_deref(), Some("a"));
    assert_eq!(policy.pick().as_deref(), Some("a"));

    policy.mark_unavailable("a");
    assert_eq!(policy.pick().as_deref(), Some("b"));
    policy.mark_unavailable("b");
    assert_eq!(policy.pick(), None);
    policy.mark_available("a");
    assert_eq!(policy.pick().as_deref(), Some("a"));
}

#[test]
fn test_round_robin_cycles_in_order() {
    let policy = LbPolicy::new(LbPolicyKind::RoundRobin);
    policy.add_address("a", 1);
    policy.add_address("b", 1);
    policy.add_address("c", 1);

    let picks: Vec<_> = (0..6).map(|_| policy.pick().unwrap()).collect();
    assert_eq!(picks, vec!["a", "b", "c", "a", "b", "c"]);
}

#[test]
fn test_round_robin_skips_unavailable_without_starving_others() {
    let policy = LbPolicy::new(LbPolicyKind::RoundRobin);
    policy.add_address("a", 1);
    policy.add_address("b", 1);
    policy.add_address("c", 1);
    for _ in 0..6 {
        policy.pick().unwrap();
    }

    policy.mark_unavailable("b");
    let picks: Vec<_> = (0..4).map(|_| policy.pick().unwrap()).collect();
    assert_eq!(picks, vec!["a", "c", "a", "c"]);
}

#[test]
fn test_round_robin_fairness_over_many_picks() {
    let policy = LbPolicy::new(LbPolicyKind::RoundRobin);
    for name in ["a", "b", "c", "d"] {
        policy.add_address(name, 1);
    }
    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..400 {
        *counts.entry(policy.pick().unwrap()).or_default() += 1;
    }
    for name in ["a", "b", "c", "d"] {
        assert_eq!(counts[name], 100);
    }
}

#[test]
fn test_round_robin_exhausted_list_returns_none() {
    let policy = LbPolicy::new(LbPolicyKind::RoundRobin);
    policy.add_address("a", 1);
    policy.mark_unavailable("a");
    assert_eq!(policy.pick(), None);
}

#[test]
fn test_weighted_zero_available_weight_returns_none() {
    let policy = LbPolicy::new(LbPolicyKind::Weighted);
    policy.add_address("a", 5);
    policy.mark_unavailable("a");
    assert_eq!(policy.pick(), None);
}

#[test]
fn test_weighted_selection_is_roughly_proportional() {
    let policy = LbPolicy::new(LbPolicyKind::Weighted);
    policy.add_address("light", 1);
    policy.add_address("heavy", 3);

    const PICKS: usize = 8_000;
    let mut heavy = 0usize;
    for _ in 0..PICKS {
        if policy.pick().as_deref() == Some("heavy") {
            heavy += 1;
        }
    }
    let observed = heavy as f64 / PICKS as f64;
    assert!(
        (observed - 0.75).abs() < 0.05,
        "heavy picked {observed} of the time"
    );
}

#[test]
fn test_weighted_respects_availability_changes() {
    let policy = LbPolicy::new(LbPolicyKind::Weighted);
    policy.add_address("a", 1);
    policy.add_address("b", 1_000);
    policy.mark_unavailable("b");
    for _ in 0..50 {
        assert_eq!(policy.pick().as_deref(), Some("a"));
    }
}

#[test]
fn test_weight_below_one_is_clamped() {
    let policy = LbPolicy::new(LbPolicyKind::Weighted);
    policy.add_address("a", 0);
    assert_eq!(policy.addresses()[0].weight, 1);
    assert!(policy.pick().is_some());
}

#[test]
fn test_mark_unknown_target_reports_failure() {
    let policy = LbPolicy::new(LbPolicyKind::PickFirst);
    policy.add_address("a", 1);
    assert!(!policy.mark_unavailable("nope"));
    assert!(policy.mark_unavailable("a"));
}
