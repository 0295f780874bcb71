//! Property and scenario tests for the build unit sequencer.
//!
//! These tests verify that:
//! - changed files are yielded before every unchanged file
//! - no design document is yielded twice
//! - restriction filtering is idempotent
//! - an orphaned spec document yields exactly one nonconformity

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use designbuild_core::{
    ids, BuildConfig, BuildIdentity, BuildMonitor, BuildPaths, BuildScope, BuildUnitSequencer,
    RepositoryLayout, ResponseStrategy, Restriction,
};
use proptest::prelude::*;
use tempfile::TempDir;

fn config_for(root: &Path, scope: BuildScope) -> BuildConfig {
    let layout = RepositoryLayout::default();
    let paths = BuildPaths::in_place(root, &layout).unwrap();
    BuildConfig::new(BuildIdentity::generate("seq", "tester"), paths, layout).with_scope(scope)
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sequence(config: &BuildConfig, monitor: &BuildMonitor) -> Vec<PathBuf> {
    BuildUnitSequencer::new(config, monitor)
        .unwrap()
        .map(|unit| unit.unwrap().rel_path)
        .collect()
}

/// Strategy: a set of module names and a subset flagged as changed.
fn arb_modules() -> impl Strategy<Value = (Vec<String>, Vec<bool>)> {
    prop::collection::btree_set("[a-z][a-z0-9_]{0,8}", 1..8)
        .prop_flat_map(|names| {
            let names: Vec<String> = names.into_iter().collect();
            let len = names.len();
            (Just(names), prop::collection::vec(any::<bool>(), len))
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Changed files come strictly before unchanged files; nothing repeats.
    #[test]
    fn changed_files_lead_and_never_repeat((names, changed_mask) in arb_modules(), with_specs in any::<bool>()) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let mut changed = Vec::new();
        for (name, is_changed) in names.iter().zip(&changed_mask) {
            let rel = format!("src/{name}.rs");
            write(root, &rel, "pub fn f() {}\n");
            if with_specs {
                write(root, &format!("src/spec/spec_{name}.rs"), "fn t() {}\n");
            }
            if *is_changed {
                changed.push(PathBuf::from(&rel));
                if with_specs {
                    // the spec and its design document both changed
                    changed.push(PathBuf::from(format!("src/spec/spec_{name}.rs")));
                }
            }
        }
        let scope = BuildScope { changed_files: changed.clone(), ..BuildScope::default() };
        let config = config_for(root, scope);
        let monitor = BuildMonitor::new(ResponseStrategy::Comprehensive);
        let order = sequence(&config, &monitor);

        let unique: HashSet<&PathBuf> = order.iter().collect();
        prop_assert_eq!(unique.len(), order.len());
        prop_assert_eq!(order.len(), names.len());

        let changed_designs: HashSet<PathBuf> = changed
            .iter()
            .filter(|p| !p.to_string_lossy().contains("/spec/"))
            .cloned()
            .collect();
        let boundary = changed_designs.len();
        for (i, path) in order.iter().enumerate() {
            prop_assert_eq!(changed_designs.contains(path), i < boundary);
        }
        prop_assert_eq!(monitor.nonconformity_count(), 0);
    }

    /// Filtering an already filtered sequence changes nothing.
    #[test]
    fn restriction_is_idempotent(
        paths in prop::collection::vec("[a-c]{1,2}/[a-c]{1,2}\\.rs", 0..12),
        names in prop::collection::vec("[a-c]{1,2}", 0..3),
    ) {
        let restriction = Restriction::new(names);
        let paths: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
        let once = restriction.filter(paths);
        let twice = restriction.filter(once.clone());
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn orphaned_spec_reports_missing_design_once() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/geo/area.rs", "pub fn area() {}\n");
    write(root, "src/geo/spec/spec_area.rs", "fn t() {}\n");
    write(root, "src/geo/spec/spec_volume.rs", "fn t() {}\n");
    write(root, "src/geo/spec/data/fixture.json", "{}");

    let scope = BuildScope {
        // changed and discovered by the walk: still reported once
        changed_files: vec![PathBuf::from("src/geo/spec/spec_volume.rs")],
        ..BuildScope::default()
    };
    let config = config_for(root, scope);
    let monitor = BuildMonitor::new(ResponseStrategy::Comprehensive);
    let order = sequence(&config, &monitor);

    assert_eq!(order, vec![PathBuf::from("src/geo/area.rs")]);
    let report = monitor.notify_build_end();
    assert_eq!(report.nonconformities.len(), 1);
    let nc = &report.nonconformities[0];
    assert_eq!(nc.msg_id, ids::MISSING_DESIGN_FILE);
    assert_eq!(nc.path, PathBuf::from("src/geo/spec/spec_volume.rs"));
}

#[test]
fn unit_carries_spec_and_syntax_errors_are_nonfatal() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/ok.rs", "pub fn ok() {}\n");
    write(root, "src/spec/spec_ok.rs", "fn test_ok() {}\n");
    write(root, "src/broken.rs", "pub fn broken() {\n");

    let config = config_for(root, BuildScope::default());
    let monitor = BuildMonitor::new(ResponseStrategy::Comprehensive);
    let units: Vec<_> = BuildUnitSequencer::new(&config, &monitor)
        .unwrap()
        .map(Result::unwrap)
        .collect();

    assert_eq!(units.len(), 2);
    let broken = &units[0];
    assert_eq!(broken.rel_path, PathBuf::from("src/broken.rs"));
    assert!(broken.tree.is_none());
    let ok = &units[1];
    assert!(ok.outline().is_some());
    let spec = ok.spec.as_ref().unwrap();
    assert_eq!(spec.rel_path, PathBuf::from("src/spec/spec_ok.rs"));
    assert!(spec.spec.is_none());
    assert_eq!(ok.log_dir, root.join("tmp/log/units/src/ok.rs"));

    let report = monitor.notify_build_end();
    assert_eq!(report.nonconformities.len(), 1);
    assert_eq!(report.nonconformities[0].msg_id, ids::SYNTAX_ERROR);
    assert_eq!(report.nonconformities[0].line, Some(1));
}

#[test]
fn changed_only_and_restriction_limit_the_sequence() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/geo/area.rs", "pub fn area() {}\n");
    write(root, "src/geo/volume.rs", "pub fn volume() {}\n");
    write(root, "src/net/socket.rs", "pub fn socket() {}\n");

    let changed_only = config_for(
        root,
        BuildScope {
            changed_files: vec![PathBuf::from("src/net/socket.rs")],
            changed_only: true,
            ..BuildScope::default()
        },
    );
    let monitor = BuildMonitor::new(ResponseStrategy::Comprehensive);
    assert_eq!(
        sequence(&changed_only, &monitor),
        vec![PathBuf::from("src/net/socket.rs")]
    );

    let restricted = config_for(
        root,
        BuildScope {
            restriction: vec!["geo".to_string()],
            ..BuildScope::default()
        },
    );
    assert_eq!(
        sequence(&restricted, &monitor),
        vec![
            PathBuf::from("src/geo/area.rs"),
            PathBuf::from("src/geo/volume.rs")
        ]
    );
}

#[test]
fn fail_fast_stops_the_sequence() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/a.rs", "pub fn a() {\n");
    write(root, "src/b.rs", "pub fn b() {}\n");

    let config = config_for(root, BuildScope::default()).with_fail_fast(true);
    let monitor = BuildMonitor::new(ResponseStrategy::FailFast);
    let results: Vec<_> = BuildUnitSequencer::new(&config, &monitor).unwrap().collect();

    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
}
