#![forbid(unsafe_code)]

//! Property tests over the index/value model and grouping.
//!
//! Strategies build small series with a deliberately narrow label space so
//! duplicate labels and multi-row groups show up in most cases.

use std::collections::BTreeSet;

use proptest::prelude::*;

use tb_frame::{Config, Series};
use tb_groupby::GroupBy;
use tb_index::Level;
use tb_runtime::Options;
use tb_types::{NullKind, Scalar};

// ---------------------------------------------------------------------------
// Strategy generators
// ---------------------------------------------------------------------------

fn quiet() -> Options {
    Options::default().with_log_warnings(false)
}

fn arb_value() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        4 => (-1_000i64..1_000).prop_map(|v| Scalar::Float64(v as f64 / 4.0)),
        1 => Just(Scalar::Null(NullKind::NaN)),
    ]
}

fn arb_label() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        3 => (0i64..5).prop_map(Scalar::Int64),
        1 => Just(Scalar::Null(NullKind::Null)),
    ]
}

/// Two-level series of length `1..=max_len`.
fn arb_series(max_len: usize) -> impl Strategy<Value = Series> {
    (1..=max_len).prop_flat_map(|len| {
        (
            proptest::collection::vec(arb_label(), len),
            proptest::collection::vec("[a-c]", len),
            proptest::collection::vec(arb_value(), len),
        )
            .prop_filter_map("series must construct", |(outer, inner, values)| {
                let config = Config::new()
                    .with_index_level(outer)
                    .with_index_level(inner)
                    .with_index_names(["outer", "inner"]);
                Series::new(values, config, quiet()).ok()
            })
    })
}

#[derive(Debug, Clone)]
enum Op {
    Set(usize),
    Insert(usize),
    Drop(usize),
    DropMany(Vec<usize>),
    Swap(usize, usize),
    Subset(Vec<usize>),
    DropNull,
    Sort(bool),
    SwapLevels,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..40).prop_map(Op::Set),
        (0usize..40).prop_map(Op::Insert),
        (0usize..40).prop_map(Op::Drop),
        proptest::collection::vec(0usize..40, 0..4).prop_map(Op::DropMany),
        (0usize..40, 0usize..40).prop_map(|(i, j)| Op::Swap(i, j)),
        proptest::collection::vec(0usize..40, 0..6).prop_map(Op::Subset),
        Just(Op::DropNull),
        any::<bool>().prop_map(Op::Sort),
        Just(Op::SwapLevels),
    ]
}

/// Apply one operation in place; errors are expected for bad positions.
fn apply(series: &mut Series, op: &Op) -> bool {
    let mut handle = series.in_place();
    let outcome = match op {
        Op::Set(pos) => handle.set(*pos, 1.5),
        Op::Insert(pos) => handle.insert_row(*pos, 2.5, vec![Scalar::Int64(9), "z".into()]),
        Op::Drop(pos) => handle.drop_row(*pos),
        Op::DropMany(positions) => handle.drop_rows(positions),
        Op::Swap(i, j) => handle.swap_rows(*i, *j),
        Op::Subset(positions) => handle.subset_rows(positions),
        Op::DropNull => handle.drop_null(),
        Op::Sort(ascending) => handle.sort(*ascending),
        Op::SwapLevels => handle.swap_levels(0, 1),
    };
    outcome.is_ok()
}

/// Same operation through the copy-returning API.
fn apply_copy(series: &Series, op: &Op) -> Option<Series> {
    let outcome = match op {
        Op::Set(pos) => series.set(*pos, 1.5),
        Op::Insert(pos) => series.insert_row(*pos, 2.5, vec![Scalar::Int64(9), "z".into()]),
        Op::Drop(pos) => series.drop_row(*pos),
        Op::DropMany(positions) => series.drop_rows(positions),
        Op::Swap(i, j) => series.swap_rows(*i, *j),
        Op::Subset(positions) => series.subset_rows(positions),
        Op::DropNull => series.drop_null(),
        Op::Sort(ascending) => series.sort(*ascending),
        Op::SwapLevels => series.swap_levels(0, 1),
    };
    outcome.ok()
}

/// Every label's recorded positions agree with a fresh scan of the labels.
fn label_map_is_consistent(level: &Level) -> bool {
    let labels = level.labels().to_strings();
    let scanned_ok = labels
        .iter()
        .enumerate()
        .all(|(position, label)| level.positions(label).contains(&position));
    let total: usize = level.label_map().values().map(Vec::len).sum();
    let keys: BTreeSet<&String> = level.label_map().keys().collect();
    let distinct: BTreeSet<&String> = labels.iter().collect();
    scanned_ok && total == level.len() && keys == distinct
}

// ---------------------------------------------------------------------------
// Property: alignment and label maps survive any mutation sequence
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Values and every index level keep the same length.
    #[test]
    fn prop_mutations_preserve_alignment(
        mut series in arb_series(12),
        ops in proptest::collection::vec(arb_op(), 0..12),
    ) {
        for op in &ops {
            apply(&mut series, op);
            prop_assert!(series.ensure_alignment().is_ok());
            for level in series.index().levels() {
                prop_assert_eq!(level.len(), series.len());
            }
        }
    }

    /// Label maps always match the labels they were derived from.
    #[test]
    fn prop_label_maps_stay_fresh(
        mut series in arb_series(12),
        ops in proptest::collection::vec(arb_op(), 0..12),
    ) {
        for op in &ops {
            apply(&mut series, op);
            for level in series.index().levels() {
                prop_assert!(label_map_is_consistent(level));
            }
            let names = series.index().names();
            for (position, name) in names.iter().enumerate() {
                prop_assert!(series.index().name_map()[*name].contains(&position));
            }
        }
    }

    /// A failed multi-position operation leaves the series untouched.
    #[test]
    fn prop_failed_drop_rows_is_atomic(
        mut series in arb_series(12),
        mut positions in proptest::collection::vec(0usize..12, 0..4),
    ) {
        positions.push(series.len() + 3);
        let before = series.clone();
        prop_assert!(series.in_place().drop_rows(&positions).is_err());
        prop_assert_eq!(series, before);
    }

    /// A copy-returning operation never changes its source, and matches the
    /// in-place form applied to a clone.
    #[test]
    fn prop_copies_do_not_touch_source(series in arb_series(12), op in arb_op()) {
        let before = series.clone();
        let copied = apply_copy(&series, &op);
        prop_assert_eq!(&series, &before);

        let mut in_place = series.clone();
        if apply(&mut in_place, &op) {
            prop_assert_eq!(copied, Some(in_place));
        } else {
            prop_assert!(copied.is_none());
        }
    }
}

// ---------------------------------------------------------------------------
// Property: grouping partitions rows
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Groups are disjoint, cover every row, and list positions in order.
    #[test]
    fn prop_groups_partition_rows(series in arb_series(20), level in 0usize..2) {
        let grouping = series.group_by_index(&[level]).expect("grouping");
        let mut seen = BTreeSet::new();
        for group in grouping.sorted_groups() {
            prop_assert!(group.positions().windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(group.first_position(), group.positions()[0]);
            for &position in group.positions() {
                prop_assert!(seen.insert(position));
            }
        }
        prop_assert_eq!(seen.len(), series.len());
    }

    /// Sorted keys are strictly increasing and match the unordered map.
    #[test]
    fn prop_sorted_groups_are_sorted(series in arb_series(20)) {
        let grouping = series.group_by_index(&[0, 1]).expect("grouping");
        let keys: Vec<&str> = grouping.sorted_groups().iter().map(|g| g.key()).collect();
        prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(keys.len(), grouping.groups().len());
    }

    /// Group sums add up to the whole-series sum.
    #[test]
    fn prop_group_sums_add_up(series in arb_series(20)) {
        let sums = series
            .group_by_index(&[])
            .and_then(|g| g.sum())
            .expect("sum");
        prop_assert!((sums.sum() - series.sum()).abs() < 1e-6);
    }

    /// Concurrent aggregation reassembles results in the sequential order.
    #[test]
    fn prop_async_matches_sync(series in arb_series(20)) {
        let concurrent = series.clone().with_options(quiet().with_async_aggregation(true));
        let left = series.group_by_index(&[0]).and_then(|g| g.mean()).expect("sync");
        let right = concurrent.group_by_index(&[0]).and_then(|g| g.mean()).expect("async");
        prop_assert!(left.values().semantic_eq(right.values()));
        prop_assert_eq!(left.index(), right.index());
    }
}
