//! Property tests for batch application
//!
//! A batch of non-overlapping replacements produces the same file no matter
//! the order in which the producer listed them.

use autofix::edit::{apply_operations, EditOperation, PatchBatch};
use autofix::PatchEngine;
use autofix::backup::BackupStore;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;

fn source(lines: usize) -> String {
    (1..=lines).map(|i| format!("value_{i} = {i}\n")).collect()
}

/// Line count, a set of distinct lines to replace, and a shuffle of them.
fn replacement_plan() -> impl Strategy<Value = (usize, Vec<usize>, Vec<usize>)> {
    (2usize..30).prop_flat_map(|lines| {
        proptest::collection::btree_set(1..=lines, 1..=lines.min(8)).prop_flat_map(move |set| {
            let targets: Vec<usize> = set.into_iter().collect();
            let shuffled = Just(targets.clone()).prop_shuffle();
            (Just(lines), Just(targets), shuffled)
        })
    })
}

proptest! {
    #[test]
    fn test_replacement_order_is_irrelevant((lines, sorted, shuffled) in replacement_plan()) {
        let content = source(lines);
        let op = |line: usize| EditOperation::replace(line, format!("patched_{line} = 0"));

        let in_order: PatchBatch = sorted.iter().copied().map(op).collect();
        let permuted: PatchBatch = shuffled.iter().copied().map(op).collect();

        let a = apply_operations(&content, &in_order);
        let b = apply_operations(&content, &permuted);

        prop_assert_eq!(&a.content, &b.content);
        prop_assert_eq!(a.applied, sorted.len());
        prop_assert!(a.skipped.is_empty());

        let expected: BTreeMap<usize, String> =
            sorted.iter().map(|&l| (l, format!("patched_{l} = 0"))).collect();
        for (i, line) in a.content.lines().enumerate() {
            match expected.get(&(i + 1)) {
                Some(new) => prop_assert_eq!(line, new.as_str()),
                None => prop_assert_eq!(line, format!("value_{} = {}", i + 1, i + 1)),
            }
        }
    }

    #[test]
    fn test_engine_commits_permuted_batches((lines, _sorted, shuffled) in replacement_plan()) {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("values.py");
        fs::write(&target, source(lines)).unwrap();
        let engine = PatchEngine::new(BackupStore::new(dir.path().join("backups")));

        let batch: PatchBatch = shuffled
            .iter()
            .map(|&line| EditOperation::replace(line, format!("patched_{line} = 0")))
            .collect();
        let report = engine.apply_patch(&target, &batch, false).unwrap();

        prop_assert_eq!(report.applied, shuffled.len());
        let written = fs::read_to_string(&target).unwrap();
        prop_assert_eq!(written.lines().count(), lines);
    }
}
