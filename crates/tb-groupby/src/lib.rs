#![forbid(unsafe_code)]

//! Split-apply-combine over row groups.
//!
//! A grouping snapshots its source at creation time, so later mutation of the
//! source never shows through. Group keys are the stringified labels of the
//! selected levels joined with `" | "`; a single level uses the bare label.
//! Every reduction emits one row per group in sorted-key order.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use tb_columnar::{Column, ColumnError, check_positions};
use tb_frame::{DataFrame, FrameError, Series};
use tb_index::{Index, IndexError, Level};
use tb_runtime::{Options, soft_failure};
use tb_types::{Aggregation, Kind, NULL_LABEL, NullKind, Scalar};
use thiserror::Error;

/// Joins per-level labels into one group key.
pub const KEY_SEPARATOR: &str = " | ";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GroupByError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// One group: its key and the ordered row positions carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    key: String,
    positions: Vec<usize>,
    first_position: usize,
}

impl Group {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    #[must_use]
    pub fn first_position(&self) -> usize {
        self.first_position
    }

    #[must_use]
    pub fn last_position(&self) -> usize {
        self.positions
            .last()
            .copied()
            .unwrap_or(self.first_position)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Build the group key of `row` from the key columns.
fn row_key(key_columns: &[Column], row: usize) -> String {
    key_columns
        .iter()
        .map(|column| {
            column
                .value(row)
                .map_or_else(|| NULL_LABEL.to_owned(), ToString::to_string)
        })
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

// ── Group table ────────────────────────────────────────────────────────

/// Key → group table plus the key columns needed to label the output.
#[derive(Debug, Clone)]
struct GroupTable {
    groups: HashMap<String, Group>,
    sorted_keys: Vec<String>,
    key_columns: Vec<Column>,
    key_names: Vec<String>,
}

impl GroupTable {
    fn derive(key_columns: Vec<Column>, key_names: Vec<String>) -> Self {
        let len = key_columns.first().map_or(0, Column::len);
        let mut groups: HashMap<String, Group> = HashMap::new();
        for row in 0..len {
            let key = row_key(&key_columns, row);
            groups
                .entry(key)
                .or_insert_with_key(|key| Group {
                    key: key.clone(),
                    positions: Vec::new(),
                    first_position: row,
                })
                .positions
                .push(row);
        }
        let mut sorted_keys: Vec<String> = groups.keys().cloned().collect();
        sorted_keys.sort_unstable();
        Self {
            groups,
            sorted_keys,
            key_columns,
            key_names,
        }
    }

    fn sorted(&self) -> impl Iterator<Item = &Group> + '_ {
        self.sorted_keys.iter().filter_map(|key| self.groups.get(key))
    }

    fn first_positions(&self) -> Vec<usize> {
        self.sorted().map(Group::first_position).collect()
    }

    fn last_positions(&self) -> Vec<usize> {
        self.sorted().map(Group::last_position).collect()
    }

    /// One row per group, labelled by each key column at the group's first
    /// position. Key column kinds carry over unchanged.
    fn output_index(&self) -> Result<Index, GroupByError> {
        let firsts = self.first_positions();
        let levels = self
            .key_columns
            .iter()
            .zip(&self.key_names)
            .map(|(column, name)| Ok(Level::new(column.subset(&firsts)?, name.clone())))
            .collect::<Result<Vec<_>, GroupByError>>()?;
        Ok(Index::new(levels)?)
    }
}

/// Run `compute` once per group subset and return results in subset order.
///
/// Synchronous unless `options.async_aggregation` is set, in which case every
/// subset becomes its own task on the rayon pool. Results travel back over a
/// channel tagged with their sequence number and are placed by it. In either
/// mode a computation that panics leaves `fallback()` in its slot.
fn run_groups<T, R, F>(
    subsets: Vec<T>,
    options: &Options,
    fallback: impl Fn() -> R,
    compute: F,
) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    if !options.async_aggregation {
        return subsets
            .into_iter()
            .enumerate()
            .map(|(seq, subset)| {
                panic::catch_unwind(AssertUnwindSafe(|| compute(subset))).unwrap_or_else(|_| {
                    log::debug!("group {seq} failed; substituting a missing aggregate");
                    fallback()
                })
            })
            .collect();
    }

    let total = subsets.len();
    log::debug!("aggregating {total} groups on the rayon pool");
    let (sender, receiver) = crossbeam_channel::unbounded::<(usize, Option<R>)>();
    let compute = &compute;
    rayon::scope(|scope| {
        for (seq, subset) in subsets.into_iter().enumerate() {
            let sender = sender.clone();
            scope.spawn(move |_| {
                let result = panic::catch_unwind(AssertUnwindSafe(|| compute(subset))).ok();
                // receiver outlives the scope
                let _ = sender.send((seq, result));
            });
        }
    });
    drop(sender);

    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    for (seq, result) in receiver.iter() {
        if result.is_none() {
            log::debug!("group {seq} failed; substituting a missing aggregate");
        }
        slots[seq] = result;
    }
    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(&fallback))
        .collect()
}

fn missing() -> Scalar {
    Scalar::Null(NullKind::NaN)
}

fn output_kind(aggregation: Aggregation) -> Kind {
    if aggregation == Aggregation::Count {
        Kind::Int64
    } else {
        Kind::Float64
    }
}

// ── Entry points ───────────────────────────────────────────────────────

/// Group rows by index levels.
pub trait GroupBy {
    type Grouping;

    /// Group by the listed index levels; an empty list means every level.
    fn group_by_index(&self, levels: &[usize]) -> Result<Self::Grouping, GroupByError>;
}

/// Group a frame's rows by the values of some of its columns.
pub trait GroupByColumns {
    /// The grouped columns form the key and are left out of aggregates.
    /// An empty list falls back to grouping by every index level.
    fn group_by(&self, cols: &[usize]) -> Result<FrameGrouping, GroupByError>;
}

fn index_keys(index: &Index, levels: &[usize]) -> Result<(Vec<Column>, Vec<String>), GroupByError> {
    let selected: Vec<usize> = if levels.is_empty() {
        (0..index.num_levels()).collect()
    } else {
        index.check_levels(levels)?;
        levels.to_vec()
    };
    let columns = selected
        .iter()
        .map(|&level| index.levels()[level].labels().clone())
        .collect();
    let names = selected
        .iter()
        .map(|&level| index.levels()[level].name().to_owned())
        .collect();
    Ok((columns, names))
}

impl GroupBy for Series {
    type Grouping = SeriesGrouping;

    fn group_by_index(&self, levels: &[usize]) -> Result<SeriesGrouping, GroupByError> {
        self.ensure_alignment()?;
        let (key_columns, key_names) = index_keys(self.index(), levels)?;
        Ok(SeriesGrouping {
            source: self.clone(),
            table: GroupTable::derive(key_columns, key_names),
        })
    }
}

impl GroupBy for DataFrame {
    type Grouping = FrameGrouping;

    fn group_by_index(&self, levels: &[usize]) -> Result<FrameGrouping, GroupByError> {
        self.ensure_alignment()?;
        let (key_columns, key_names) = index_keys(self.index(), levels)?;
        Ok(FrameGrouping {
            source: self.clone(),
            table: GroupTable::derive(key_columns, key_names),
            value_cols: (0..self.num_cols()).collect(),
        })
    }
}

impl GroupByColumns for DataFrame {
    fn group_by(&self, cols: &[usize]) -> Result<FrameGrouping, GroupByError> {
        if cols.is_empty() {
            return self.group_by_index(&[]);
        }
        self.ensure_alignment()?;
        check_positions(cols, self.num_cols())?;
        let key_columns = cols.iter().map(|&col| self.values()[col].clone()).collect();
        let key_names = cols
            .iter()
            .map(|&col| self.columns().joined_label(col))
            .collect::<Result<Vec<_>, _>>()?;
        let value_cols = (0..self.num_cols())
            .filter(|col| !cols.contains(col))
            .collect();
        Ok(FrameGrouping {
            source: self.clone(),
            table: GroupTable::derive(key_columns, key_names),
            value_cols,
        })
    }
}

// ── Series grouping ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SeriesGrouping {
    source: Series,
    table: GroupTable,
}

impl SeriesGrouping {
    /// Groups keyed by their key, in no particular order. Iteration order of
    /// the map is not stable across runs; use [`Self::sorted_groups`] when
    /// order matters.
    #[must_use]
    pub fn groups(&self) -> &HashMap<String, Group> {
        &self.table.groups
    }

    /// Groups in lexicographic key order.
    #[must_use]
    pub fn sorted_groups(&self) -> Vec<&Group> {
        self.table.sorted().collect()
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.table.sorted_keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.groups.is_empty()
    }

    /// Rows of one group. Soft failure: `None` on an unknown key.
    #[must_use]
    pub fn group(&self, key: &str) -> Option<Series> {
        let Some(group) = self.table.groups.get(key) else {
            soft_failure(
                self.source.options(),
                "group",
                format!("group key {key:?} not found"),
            );
            return None;
        };
        self.source.subset_rows(group.positions()).ok()
    }

    fn take(&self, positions: &[usize]) -> Result<Series, GroupByError> {
        let values = self.source.values().subset(positions)?;
        let series = Series::from_column(values, self.table.output_index()?, self.source.name())?;
        Ok(series.with_options(self.source.options().clone()))
    }

    /// Each group's first row.
    pub fn first(&self) -> Result<Series, GroupByError> {
        self.take(&self.table.first_positions())
    }

    /// Each group's last row.
    pub fn last(&self) -> Result<Series, GroupByError> {
        self.take(&self.table.last_positions())
    }

    fn subsets(&self) -> Vec<Vec<Scalar>> {
        let values = self.source.values().values();
        self.table
            .sorted()
            .map(|group| {
                group
                    .positions()
                    .iter()
                    .map(|&position| values[position].clone())
                    .collect()
            })
            .collect()
    }

    /// Reduce every group with `aggregation`.
    pub fn aggregate(&self, aggregation: Aggregation) -> Result<Series, GroupByError> {
        let options = self.source.options();
        let reduced = run_groups(self.subsets(), options, missing, |values| {
            aggregation.apply(&values)
        });
        let column = Column::new(output_kind(aggregation), reduced, options.null_policy())?;
        let series = Series::from_column(column, self.table.output_index()?, self.source.name())?;
        Ok(series.with_options(options.clone()))
    }

    pub fn sum(&self) -> Result<Series, GroupByError> {
        self.aggregate(Aggregation::Sum)
    }

    pub fn mean(&self) -> Result<Series, GroupByError> {
        self.aggregate(Aggregation::Mean)
    }

    pub fn median(&self) -> Result<Series, GroupByError> {
        self.aggregate(Aggregation::Median)
    }

    pub fn min(&self) -> Result<Series, GroupByError> {
        self.aggregate(Aggregation::Min)
    }

    pub fn max(&self) -> Result<Series, GroupByError> {
        self.aggregate(Aggregation::Max)
    }

    /// Population standard deviation per group.
    pub fn std(&self) -> Result<Series, GroupByError> {
        self.aggregate(Aggregation::Std)
    }

    pub fn var(&self) -> Result<Series, GroupByError> {
        self.aggregate(Aggregation::Var)
    }

    pub fn count(&self) -> Result<Series, GroupByError> {
        self.aggregate(Aggregation::Count)
    }

    /// Run `f` on each group's rows and collect one value per group. The
    /// output kind is inferred from the results.
    pub fn apply<F>(&self, f: F) -> Result<Series, GroupByError>
    where
        F: Fn(&Series) -> Scalar + Sync,
    {
        let options = self.source.options();
        let subsets = self
            .table
            .sorted()
            .map(|group| self.source.subset_rows(group.positions()))
            .collect::<Result<Vec<_>, _>>()?;
        let results = run_groups(subsets, options, missing, |subset| f(&subset));
        let column = Column::from_values(results, options.null_policy())?;
        let series = Series::from_column(column, self.table.output_index()?, self.source.name())?;
        Ok(series.with_options(options.clone()))
    }
}

// ── DataFrame grouping ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FrameGrouping {
    source: DataFrame,
    table: GroupTable,
    value_cols: Vec<usize>,
}

impl FrameGrouping {
    /// Groups keyed by their key, in no particular order.
    #[must_use]
    pub fn groups(&self) -> &HashMap<String, Group> {
        &self.table.groups
    }

    #[must_use]
    pub fn sorted_groups(&self) -> Vec<&Group> {
        self.table.sorted().collect()
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.table.sorted_keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.groups.is_empty()
    }

    /// Rows of one group, every column included. Soft failure: `None` on an
    /// unknown key.
    #[must_use]
    pub fn group(&self, key: &str) -> Option<DataFrame> {
        let Some(group) = self.table.groups.get(key) else {
            soft_failure(
                self.source.options(),
                "group",
                format!("group key {key:?} not found"),
            );
            return None;
        };
        self.source.subset_rows(group.positions()).ok()
    }

    fn assemble(&self, values: Vec<Column>) -> Result<DataFrame, GroupByError> {
        let columns = self.source.columns().subset(&self.value_cols)?;
        let frame = DataFrame::from_parts(
            values,
            self.table.output_index()?,
            columns,
            self.source.name(),
        )?;
        Ok(frame.with_options(self.source.options().clone()))
    }

    fn take(&self, positions: &[usize]) -> Result<DataFrame, GroupByError> {
        let values = self
            .value_cols
            .iter()
            .map(|&col| self.source.values()[col].subset(positions))
            .collect::<Result<Vec<_>, _>>()?;
        self.assemble(values)
    }

    pub fn first(&self) -> Result<DataFrame, GroupByError> {
        self.take(&self.table.first_positions())
    }

    pub fn last(&self) -> Result<DataFrame, GroupByError> {
        self.take(&self.table.last_positions())
    }

    /// Per group, per value column: the column's values at the group's rows.
    fn subsets(&self) -> Vec<Vec<Vec<Scalar>>> {
        self.table
            .sorted()
            .map(|group| {
                self.value_cols
                    .iter()
                    .map(|&col| {
                        let values = self.source.values()[col].values();
                        group
                            .positions()
                            .iter()
                            .map(|&position| values[position].clone())
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }

    /// Reduce every value column within every group.
    pub fn aggregate(&self, aggregation: Aggregation) -> Result<DataFrame, GroupByError> {
        let options = self.source.options();
        let width = self.value_cols.len();
        let per_group = run_groups(
            self.subsets(),
            options,
            || vec![missing(); width],
            |columns| {
                columns
                    .iter()
                    .map(|values| aggregation.apply(values))
                    .collect::<Vec<_>>()
            },
        );

        let mut per_column: Vec<Vec<Scalar>> = vec![Vec::with_capacity(per_group.len()); width];
        for row in per_group {
            for (column, value) in per_column.iter_mut().zip(row) {
                column.push(value);
            }
        }
        let values = per_column
            .into_iter()
            .map(|reduced| Column::new(output_kind(aggregation), reduced, options.null_policy()))
            .collect::<Result<Vec<_>, _>>()?;
        self.assemble(values)
    }

    pub fn sum(&self) -> Result<DataFrame, GroupByError> {
        self.aggregate(Aggregation::Sum)
    }

    pub fn mean(&self) -> Result<DataFrame, GroupByError> {
        self.aggregate(Aggregation::Mean)
    }

    pub fn median(&self) -> Result<DataFrame, GroupByError> {
        self.aggregate(Aggregation::Median)
    }

    pub fn min(&self) -> Result<DataFrame, GroupByError> {
        self.aggregate(Aggregation::Min)
    }

    pub fn max(&self) -> Result<DataFrame, GroupByError> {
        self.aggregate(Aggregation::Max)
    }

    pub fn std(&self) -> Result<DataFrame, GroupByError> {
        self.aggregate(Aggregation::Std)
    }

    pub fn var(&self) -> Result<DataFrame, GroupByError> {
        self.aggregate(Aggregation::Var)
    }

    pub fn count(&self) -> Result<DataFrame, GroupByError> {
        self.aggregate(Aggregation::Count)
    }

    /// Run `f` on each group's rows (every column) and collect one value per
    /// group into a Series labelled like the aggregates.
    pub fn apply<F>(&self, f: F) -> Result<Series, GroupByError>
    where
        F: Fn(&DataFrame) -> Scalar + Sync,
    {
        let options = self.source.options();
        let subsets = self
            .table
            .sorted()
            .map(|group| self.source.subset_rows(group.positions()))
            .collect::<Result<Vec<_>, _>>()?;
        let results = run_groups(subsets, options, missing, |subset| f(&subset));
        let column = Column::from_values(results, options.null_policy())?;
        let series = Series::from_column(column, self.table.output_index()?, self.source.name())?;
        Ok(series.with_options(options.clone()))
    }
}
