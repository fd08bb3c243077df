use tb_columnar::{Column, check_positions};
use tb_index::{ColLevel, Columns, Index, Level};
use tb_runtime::{Options, soft_failure};
use tb_types::{Aggregation, Kind, NullPolicy, Scalar};

use crate::{Config, FrameError, Series, check_alignment};

/// Label given to a reset index level that had no name.
const DEFAULT_INDEX_LABEL: &str = "index";

/// A labeled, typed, two-dimensional container: one [`Column`] per column
/// label, all sharing one row [`Index`].
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    values: Vec<Column>,
    index: Index,
    columns: Columns,
    name: String,
    options: Options,
}

impl DataFrame {
    /// Build from column-major data: `data[c]` holds every value of column `c`.
    pub fn new(
        data: Vec<Vec<Scalar>>,
        config: Config,
        options: Options,
    ) -> Result<Self, FrameError> {
        let values = data
            .into_iter()
            .map(|column| config.build_column(column, options.null_policy()))
            .collect::<Result<Vec<_>, _>>()?;
        let num_rows = values
            .first()
            .map(Column::len)
            .or_else(|| config.index.first().map(Vec::len))
            .unwrap_or(0);
        if let Some(bad) = values.iter().find(|column| column.len() != num_rows) {
            return Err(FrameError::LengthMismatch {
                expected: num_rows,
                found: bad.len(),
            });
        }
        let index = config.build_index(num_rows, options.null_policy())?;
        let columns = config.build_columns(values.len())?;
        Ok(Self {
            values,
            index,
            columns,
            name: config.name,
            options,
        })
    }

    pub fn from_parts(
        values: Vec<Column>,
        index: Index,
        columns: Columns,
        name: impl Into<String>,
    ) -> Result<Self, FrameError> {
        let frame = Self {
            values,
            index,
            columns,
            name: name.into(),
            options: Options::default(),
        };
        frame.ensure_alignment()?;
        Ok(frame)
    }

    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Row count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn num_cols(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn index_levels(&self) -> usize {
        self.index.num_levels()
    }

    #[must_use]
    pub fn col_levels(&self) -> usize {
        self.columns.num_levels()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn rename(&self, name: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.name = name.into();
        copy
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[Column] {
        &self.values
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Every column has the index's length and exactly one set of labels.
    pub fn ensure_alignment(&self) -> Result<(), FrameError> {
        self.columns.ensure_aligned()?;
        if self.columns.len() != self.values.len() {
            return Err(FrameError::ColumnsMisaligned {
                values: self.values.len(),
                labels: self.columns.len(),
            });
        }
        self.values
            .iter()
            .try_for_each(|column| check_alignment(column, &self.index))
    }

    // ── Selection ──────────────────────────────────────────────────────

    /// Value at (`row`, `col`); `None` (logged) when either is out of range.
    #[must_use]
    pub fn at(&self, row: usize, col: usize) -> Option<Scalar> {
        let value = self
            .values
            .get(col)
            .and_then(|column| column.value(row))
            .cloned();
        if value.is_none() {
            soft_failure(
                &self.options,
                "at",
                format!(
                    "({row}, {col}) out of range for {} rows x {} columns",
                    self.len(),
                    self.num_cols()
                ),
            );
        }
        value
    }

    /// First column whose level-0 label is `label`.
    #[must_use]
    pub fn col(&self, label: &str) -> Option<Series> {
        let position = *self.columns.select_label(label, &self.options).first()?;
        self.col_at(position).ok()
    }

    pub fn col_at(&self, position: usize) -> Result<Series, FrameError> {
        check_positions(&[position], self.num_cols())?;
        let name = self.columns.joined_label(position)?;
        Ok(
            Series::from_column(self.values[position].clone(), self.index.clone(), name)?
                .with_options(self.options.clone()),
        )
    }

    /// Values of one row across every column.
    pub fn row(&self, position: usize) -> Result<Vec<Scalar>, FrameError> {
        check_positions(&[position], self.len())?;
        Ok(self
            .values
            .iter()
            .map(|column| column.values()[position].clone())
            .collect())
    }

    /// Rows where `predicate` holds for column `col`; nulls never match.
    #[must_use]
    pub fn filter(&self, col: usize, predicate: impl Fn(&Scalar) -> bool) -> Vec<usize> {
        let Some(column) = self.values.get(col) else {
            soft_failure(
                &self.options,
                "filter",
                format!("column {col} out of range for {} columns", self.num_cols()),
            );
            return Vec::new();
        };
        let positions: Vec<usize> = column
            .values()
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.is_missing() && predicate(value))
            .map(|(position, _)| position)
            .collect();
        if positions.is_empty() {
            soft_failure(&self.options, "filter", "no rows matched");
        }
        positions
    }

    /// Columns whose level-0 label is listed, in the order listed. Unknown
    /// labels are skipped (and logged).
    #[must_use]
    pub fn select_cols(&self, labels: &[&str]) -> Self {
        let positions: Vec<usize> = labels
            .iter()
            .flat_map(|label| self.columns.select_label(label, &self.options))
            .collect();
        self.subset_cols(&positions).unwrap_or_else(|_| self.clone())
    }

    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let positions: Vec<usize> = (0..n.min(self.len())).collect();
        self.subset_rows(&positions).unwrap_or_else(|_| self.clone())
    }

    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let len = self.len();
        let positions: Vec<usize> = (len - n.min(len)..len).collect();
        self.subset_rows(&positions).unwrap_or_else(|_| self.clone())
    }

    // ── Math ───────────────────────────────────────────────────────────

    /// One reduced value per column, indexed by the column labels (one index
    /// level per column level).
    pub fn aggregate(&self, aggregation: Aggregation) -> Result<Series, FrameError> {
        let policy = self.options.null_policy();
        let kind = if aggregation == Aggregation::Count {
            Kind::Int64
        } else {
            Kind::Float64
        };
        let reduced = self
            .values
            .iter()
            .map(|column| aggregation.apply(column.values()))
            .collect();
        // Column labels are names, never sentinel nulls.
        let verbatim = NullPolicy::with_sentinels(Vec::<String>::new());
        let levels = self
            .columns
            .levels()
            .iter()
            .map(|level| {
                Level::new(
                    Column::from_strings(level.labels().to_vec(), &verbatim),
                    level.name(),
                )
            })
            .collect();
        let index = Index::new(levels)?;
        Ok(
            Series::from_column(Column::new(kind, reduced, policy)?, index, aggregation.name())?
                .with_options(self.options.clone()),
        )
    }

    pub fn sum(&self) -> Result<Series, FrameError> {
        self.aggregate(Aggregation::Sum)
    }

    pub fn mean(&self) -> Result<Series, FrameError> {
        self.aggregate(Aggregation::Mean)
    }

    pub fn median(&self) -> Result<Series, FrameError> {
        self.aggregate(Aggregation::Median)
    }

    pub fn min(&self) -> Result<Series, FrameError> {
        self.aggregate(Aggregation::Min)
    }

    pub fn max(&self) -> Result<Series, FrameError> {
        self.aggregate(Aggregation::Max)
    }

    pub fn std(&self) -> Result<Series, FrameError> {
        self.aggregate(Aggregation::Std)
    }

    pub fn var(&self) -> Result<Series, FrameError> {
        self.aggregate(Aggregation::Var)
    }

    pub fn count(&self) -> Result<Series, FrameError> {
        self.aggregate(Aggregation::Count)
    }

    // ── Copy-returning mutation ────────────────────────────────────────

    pub fn in_place(&mut self) -> DataFrameInPlace<'_> {
        DataFrameInPlace { frame: self }
    }

    fn with_copy(
        &self,
        apply: impl FnOnce(&mut DataFrameInPlace<'_>) -> Result<(), FrameError>,
    ) -> Result<Self, FrameError> {
        let mut copy = self.clone();
        apply(&mut copy.in_place())?;
        Ok(copy)
    }

    pub fn insert_row(
        &self,
        position: usize,
        values: Vec<Scalar>,
        labels: Vec<Scalar>,
    ) -> Result<Self, FrameError> {
        self.with_copy(|f| f.insert_row(position, values, labels))
    }

    pub fn append_row(&self, values: Vec<Scalar>, labels: Vec<Scalar>) -> Result<Self, FrameError> {
        self.with_copy(|f| f.append_row(values, labels))
    }

    pub fn set_row(&self, position: usize, values: Vec<Scalar>) -> Result<Self, FrameError> {
        self.with_copy(|f| f.set_row(position, values))
    }

    pub fn set_rows(&self, positions: &[usize], values: Vec<Scalar>) -> Result<Self, FrameError> {
        self.with_copy(|f| f.set_rows(positions, values))
    }

    pub fn drop_row(&self, position: usize) -> Result<Self, FrameError> {
        self.with_copy(|f| f.drop_row(position))
    }

    pub fn drop_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        self.with_copy(|f| f.drop_rows(positions))
    }

    pub fn drop_null(&self) -> Result<Self, FrameError> {
        self.with_copy(|f| f.drop_null())
    }

    pub fn swap_rows(&self, i: usize, j: usize) -> Result<Self, FrameError> {
        self.with_copy(|f| f.swap_rows(i, j))
    }

    pub fn subset_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        self.with_copy(|f| f.subset_rows(positions))
    }

    pub fn sort_by(&self, col: usize, ascending: bool) -> Result<Self, FrameError> {
        self.with_copy(|f| f.sort_by(col, ascending))
    }

    pub fn fillna(&self, value: impl Into<Scalar>) -> Result<Self, FrameError> {
        self.with_copy(|f| f.fillna(value))
    }

    pub fn insert_col(
        &self,
        position: usize,
        column: Column,
        labels: Vec<String>,
    ) -> Result<Self, FrameError> {
        self.with_copy(|f| f.insert_col(position, column, labels))
    }

    pub fn append_col(&self, column: Column, labels: Vec<String>) -> Result<Self, FrameError> {
        self.with_copy(|f| f.append_col(column, labels))
    }

    pub fn set_col(&self, position: usize, column: Column) -> Result<Self, FrameError> {
        self.with_copy(|f| f.set_col(position, column))
    }

    pub fn drop_col(&self, position: usize) -> Result<Self, FrameError> {
        self.with_copy(|f| f.drop_col(position))
    }

    pub fn drop_cols(&self, positions: &[usize]) -> Result<Self, FrameError> {
        self.with_copy(|f| f.drop_cols(positions))
    }

    pub fn swap_cols(&self, i: usize, j: usize) -> Result<Self, FrameError> {
        self.with_copy(|f| f.swap_cols(i, j))
    }

    pub fn subset_cols(&self, positions: &[usize]) -> Result<Self, FrameError> {
        self.with_copy(|f| f.subset_cols(positions))
    }

    pub fn convert_col(&self, position: usize, kind: Kind) -> Result<Self, FrameError> {
        self.with_copy(|f| f.convert_col(position, kind))
    }

    pub fn convert(&self, kind: Kind) -> Result<Self, FrameError> {
        self.with_copy(|f| f.convert(kind))
    }

    pub fn to_float64(&self) -> Result<Self, FrameError> {
        self.convert(Kind::Float64)
    }

    pub fn to_int64(&self) -> Result<Self, FrameError> {
        self.convert(Kind::Int64)
    }

    pub fn to_utf8(&self) -> Result<Self, FrameError> {
        self.convert(Kind::Utf8)
    }

    pub fn to_bool(&self) -> Result<Self, FrameError> {
        self.convert(Kind::Bool)
    }

    pub fn to_datetime(&self) -> Result<Self, FrameError> {
        self.convert(Kind::DateTime)
    }

    pub fn to_interface(&self) -> Result<Self, FrameError> {
        self.convert(Kind::Interface)
    }

    pub fn insert_index_level(&self, position: usize, level: Level) -> Result<Self, FrameError> {
        self.with_copy(|f| f.insert_index_level(position, level))
    }

    pub fn drop_index_level(&self, position: usize) -> Result<Self, FrameError> {
        self.with_copy(|f| f.drop_index_level(position))
    }

    pub fn drop_index_levels(&self, positions: &[usize]) -> Result<Self, FrameError> {
        self.with_copy(|f| f.drop_index_levels(positions))
    }

    pub fn swap_index_levels(&self, i: usize, j: usize) -> Result<Self, FrameError> {
        self.with_copy(|f| f.swap_index_levels(i, j))
    }

    pub fn subset_index_levels(&self, positions: &[usize]) -> Result<Self, FrameError> {
        self.with_copy(|f| f.subset_index_levels(positions))
    }

    pub fn convert_index_level(&self, position: usize, kind: Kind) -> Result<Self, FrameError> {
        self.with_copy(|f| f.convert_index_level(position, kind))
    }

    pub fn insert_col_level(&self, position: usize, level: ColLevel) -> Result<Self, FrameError> {
        self.with_copy(|f| f.insert_col_level(position, level))
    }

    pub fn drop_col_level(&self, position: usize) -> Result<Self, FrameError> {
        self.with_copy(|f| f.drop_col_level(position))
    }

    pub fn swap_col_levels(&self, i: usize, j: usize) -> Result<Self, FrameError> {
        self.with_copy(|f| f.swap_col_levels(i, j))
    }

    pub fn subset_col_levels(&self, positions: &[usize]) -> Result<Self, FrameError> {
        self.with_copy(|f| f.subset_col_levels(positions))
    }

    pub fn set_index(&self, col: usize) -> Result<Self, FrameError> {
        self.with_copy(|f| f.set_index(col))
    }

    pub fn reset_index(&self, level: usize) -> Result<Self, FrameError> {
        self.with_copy(|f| f.reset_index(level))
    }
}

/// Mutable handle over a [`DataFrame`].
///
/// Each operation checks alignment first, then runs against a staged copy
/// that replaces the frame only once the whole operation has succeeded.
pub struct DataFrameInPlace<'a> {
    frame: &'a mut DataFrame,
}

impl DataFrameInPlace<'_> {
    fn stage(
        &mut self,
        apply: impl FnOnce(&mut DataFrame) -> Result<(), FrameError>,
    ) -> Result<(), FrameError> {
        self.frame.ensure_alignment()?;
        let mut staged = self.frame.clone();
        apply(&mut staged)?;
        staged.ensure_alignment()?;
        *self.frame = staged;
        Ok(())
    }

    fn check_width(&self, values: &[Scalar]) -> Result<(), FrameError> {
        if values.len() != self.frame.num_cols() {
            return Err(FrameError::RowWidthMismatch {
                expected: self.frame.num_cols(),
                found: values.len(),
            });
        }
        Ok(())
    }

    fn check_height(&self, column: &Column) -> Result<(), FrameError> {
        if column.len() != self.frame.len() {
            return Err(FrameError::LengthMismatch {
                expected: self.frame.len(),
                found: column.len(),
            });
        }
        Ok(())
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.frame.name = name.into();
    }

    // ── Rows ───────────────────────────────────────────────────────────

    /// Insert a row before `position` (`position == len` appends) with one
    /// value per column and one label per index level.
    pub fn insert_row(
        &mut self,
        position: usize,
        values: Vec<Scalar>,
        labels: Vec<Scalar>,
    ) -> Result<(), FrameError> {
        self.check_width(&values)?;
        self.stage(|frame| {
            let policy = frame.options.null_policy().clone();
            frame.index.in_place().insert_row(position, labels, &policy)?;
            for (column, value) in frame.values.iter_mut().zip(values) {
                column.insert(position, value, &policy)?;
            }
            Ok(())
        })
    }

    pub fn append_row(&mut self, values: Vec<Scalar>, labels: Vec<Scalar>) -> Result<(), FrameError> {
        let position = self.frame.len();
        self.insert_row(position, values, labels)
    }

    pub fn set_row(&mut self, position: usize, values: Vec<Scalar>) -> Result<(), FrameError> {
        self.set_rows(&[position], values)
    }

    /// Write `values[c]` into column `c` at every listed row.
    pub fn set_rows(&mut self, positions: &[usize], values: Vec<Scalar>) -> Result<(), FrameError> {
        self.check_width(&values)?;
        check_positions(positions, self.frame.len())?;
        self.stage(|frame| {
            let DataFrame {
                values: columns,
                options,
                ..
            } = frame;
            for (column, value) in columns.iter_mut().zip(values) {
                column.set_many(positions, value, options.null_policy())?;
            }
            Ok(())
        })
    }

    pub fn drop_row(&mut self, position: usize) -> Result<(), FrameError> {
        self.drop_rows(&[position])
    }

    pub fn drop_rows(&mut self, positions: &[usize]) -> Result<(), FrameError> {
        check_positions(positions, self.frame.len())?;
        self.stage(|frame| {
            frame.index.in_place().drop_rows(positions)?;
            for column in &mut frame.values {
                column.drop_many(positions)?;
            }
            Ok(())
        })
    }

    /// Drop every row holding a null in any column.
    pub fn drop_null(&mut self) -> Result<(), FrameError> {
        let mut doomed: Vec<usize> = self
            .frame
            .values
            .iter()
            .flat_map(Column::null)
            .collect();
        doomed.sort_unstable();
        doomed.dedup();
        self.drop_rows(&doomed)
    }

    pub fn swap_rows(&mut self, i: usize, j: usize) -> Result<(), FrameError> {
        check_positions(&[i, j], self.frame.len())?;
        self.stage(|frame| {
            frame.index.in_place().swap_rows(i, j)?;
            for column in &mut frame.values {
                column.swap(i, j)?;
            }
            Ok(())
        })
    }

    pub fn subset_rows(&mut self, positions: &[usize]) -> Result<(), FrameError> {
        check_positions(positions, self.frame.len())?;
        self.stage(|frame| {
            frame.index.in_place().subset_rows(positions)?;
            for column in &mut frame.values {
                *column = column.subset(positions)?;
            }
            Ok(())
        })
    }

    /// Reorder rows by the values of column `col`, nulls last.
    pub fn sort_by(&mut self, col: usize, ascending: bool) -> Result<(), FrameError> {
        check_positions(&[col], self.frame.num_cols())?;
        let order = self.frame.values[col].sort_order(ascending);
        self.subset_rows(&order)
    }

    pub fn fillna(&mut self, value: impl Into<Scalar>) -> Result<(), FrameError> {
        let value = value.into();
        self.stage(|frame| {
            let DataFrame {
                values: columns,
                options,
                ..
            } = frame;
            for column in columns.iter_mut() {
                *column = column.fillna(&value, options.null_policy())?;
            }
            Ok(())
        })
    }

    // ── Columns ────────────────────────────────────────────────────────

    /// Insert `column` before `position` with one label per column level.
    pub fn insert_col(
        &mut self,
        position: usize,
        column: Column,
        labels: Vec<String>,
    ) -> Result<(), FrameError> {
        self.check_height(&column)?;
        self.stage(|frame| {
            frame.columns.insert(position, labels)?;
            frame.values.insert(position, column);
            Ok(())
        })
    }

    pub fn append_col(&mut self, column: Column, labels: Vec<String>) -> Result<(), FrameError> {
        let position = self.frame.num_cols();
        self.insert_col(position, column, labels)
    }

    /// Replace the values of column `position`, keeping its labels.
    pub fn set_col(&mut self, position: usize, column: Column) -> Result<(), FrameError> {
        self.check_height(&column)?;
        check_positions(&[position], self.frame.num_cols())?;
        self.stage(|frame| {
            frame.values[position] = column;
            Ok(())
        })
    }

    pub fn drop_col(&mut self, position: usize) -> Result<(), FrameError> {
        self.drop_cols(&[position])
    }

    pub fn drop_cols(&mut self, positions: &[usize]) -> Result<(), FrameError> {
        check_positions(positions, self.frame.num_cols())?;
        self.stage(|frame| {
            frame.columns.drop_many(positions)?;
            let mut doomed = positions.to_vec();
            doomed.sort_unstable();
            doomed.dedup();
            for position in doomed.into_iter().rev() {
                frame.values.remove(position);
            }
            Ok(())
        })
    }

    pub fn swap_cols(&mut self, i: usize, j: usize) -> Result<(), FrameError> {
        check_positions(&[i, j], self.frame.num_cols())?;
        self.stage(|frame| {
            frame.columns.swap(i, j)?;
            frame.values.swap(i, j);
            Ok(())
        })
    }

    /// Keep the listed columns in the order given.
    pub fn subset_cols(&mut self, positions: &[usize]) -> Result<(), FrameError> {
        check_positions(positions, self.frame.num_cols())?;
        self.stage(|frame| {
            frame.columns = frame.columns.subset(positions)?;
            frame.values = positions
                .iter()
                .map(|&position| frame.values[position].clone())
                .collect();
            Ok(())
        })
    }

    pub fn convert_col(&mut self, position: usize, kind: Kind) -> Result<(), FrameError> {
        check_positions(&[position], self.frame.num_cols())?;
        self.stage(|frame| {
            let DataFrame {
                values: columns,
                options,
                ..
            } = frame;
            columns[position].convert_in_place(kind, options.null_policy())?;
            Ok(())
        })
    }

    /// Convert every column to `kind`.
    pub fn convert(&mut self, kind: Kind) -> Result<(), FrameError> {
        self.stage(|frame| {
            let DataFrame {
                values: columns,
                options,
                ..
            } = frame;
            for column in columns.iter_mut() {
                column.convert_in_place(kind, options.null_policy())?;
            }
            Ok(())
        })
    }

    pub fn to_float64(&mut self) -> Result<(), FrameError> {
        self.convert(Kind::Float64)
    }

    pub fn to_int64(&mut self) -> Result<(), FrameError> {
        self.convert(Kind::Int64)
    }

    pub fn to_utf8(&mut self) -> Result<(), FrameError> {
        self.convert(Kind::Utf8)
    }

    pub fn to_bool(&mut self) -> Result<(), FrameError> {
        self.convert(Kind::Bool)
    }

    pub fn to_datetime(&mut self) -> Result<(), FrameError> {
        self.convert(Kind::DateTime)
    }

    pub fn to_interface(&mut self) -> Result<(), FrameError> {
        self.convert(Kind::Interface)
    }

    // ── Index and column levels ────────────────────────────────────────

    pub fn insert_index_level(&mut self, position: usize, level: Level) -> Result<(), FrameError> {
        self.stage(|frame| Ok(frame.index.in_place().insert_level(position, level)?))
    }

    pub fn drop_index_level(&mut self, position: usize) -> Result<(), FrameError> {
        self.drop_index_levels(&[position])
    }

    pub fn drop_index_levels(&mut self, positions: &[usize]) -> Result<(), FrameError> {
        self.stage(|frame| Ok(frame.index.in_place().drop_levels(positions)?))
    }

    pub fn swap_index_levels(&mut self, i: usize, j: usize) -> Result<(), FrameError> {
        self.stage(|frame| Ok(frame.index.in_place().swap_levels(i, j)?))
    }

    pub fn subset_index_levels(&mut self, positions: &[usize]) -> Result<(), FrameError> {
        self.stage(|frame| Ok(frame.index.in_place().subset_levels(positions)?))
    }

    pub fn convert_index_level(&mut self, position: usize, kind: Kind) -> Result<(), FrameError> {
        self.stage(|frame| {
            let DataFrame { index, options, .. } = frame;
            index
                .in_place()
                .convert_level(position, kind, options.null_policy())?;
            Ok(())
        })
    }

    pub fn insert_col_level(&mut self, position: usize, level: ColLevel) -> Result<(), FrameError> {
        self.stage(|frame| Ok(frame.columns.insert_level(position, level)?))
    }

    pub fn drop_col_level(&mut self, position: usize) -> Result<(), FrameError> {
        self.stage(|frame| Ok(frame.columns.drop_level(position)?))
    }

    pub fn swap_col_levels(&mut self, i: usize, j: usize) -> Result<(), FrameError> {
        self.stage(|frame| Ok(frame.columns.swap_levels(i, j)?))
    }

    pub fn subset_col_levels(&mut self, positions: &[usize]) -> Result<(), FrameError> {
        self.stage(|frame| Ok(frame.columns.subset_levels(positions)?))
    }

    /// Move column `col` out of the values and in front of the index levels.
    /// The new level is named after the column's joined labels.
    pub fn set_index(&mut self, col: usize) -> Result<(), FrameError> {
        check_positions(&[col], self.frame.num_cols())?;
        self.stage(|frame| {
            let name = frame.columns.joined_label(col)?;
            let labels = frame.values.remove(col);
            frame.columns.drop(col)?;
            frame
                .index
                .in_place()
                .insert_level(0, Level::new(labels, name))?;
            Ok(())
        })
    }

    /// Move index level `level` into the values as column 0. Resetting the only
    /// level leaves a default `0..n` index behind.
    pub fn reset_index(&mut self, level: usize) -> Result<(), FrameError> {
        self.stage(|frame| {
            let taken = frame.index.in_place().take_level(level)?;
            let mut labels = vec![String::new(); frame.columns.num_levels()];
            labels[0] = if taken.name().is_empty() {
                DEFAULT_INDEX_LABEL.to_owned()
            } else {
                taken.name().to_owned()
            };
            frame.columns.insert(0, labels)?;
            frame.values.insert(0, taken.labels().clone());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use tb_columnar::Column;
    use tb_index::{ColLevel, IndexError, Level};
    use tb_runtime::Options;
    use tb_types::{Kind, NullKind, NullPolicy, Scalar};

    use super::DataFrame;
    use crate::{Config, FrameError};

    fn quiet() -> Options {
        Options::default().with_log_warnings(false)
    }

    /// Three rows, columns `a` (int) and `b` (float), index `x y z`.
    fn sample() -> DataFrame {
        let config = Config::new()
            .with_index_level(["x", "y", "z"])
            .with_index_names(["key"])
            .with_column_level(["a", "b"])
            .with_name("sample");
        let data = vec![
            vec![1.into(), 2.into(), 3.into()],
            vec![1.5.into(), f64::NAN.into(), 3.5.into()],
        ];
        DataFrame::new(data, config, quiet()).expect("frame")
    }

    #[test]
    fn construction_builds_labels() {
        let frame = sample();
        assert_eq!(frame.num_rows(), 3);
        assert_eq!(frame.num_cols(), 2);
        assert_eq!(frame.index_levels(), 1);
        assert_eq!(frame.col_levels(), 1);
        assert_eq!(frame.values()[0].kind(), Kind::Int64);
        assert_eq!(frame.values()[1].kind(), Kind::Float64);
        assert_eq!(frame.index().names(), vec!["key"]);
    }

    #[test]
    fn default_labels_when_config_is_empty() {
        let frame = DataFrame::new(
            vec![vec![1.into()], vec!["s".into()]],
            Config::new(),
            quiet(),
        )
        .expect("frame");
        assert_eq!(frame.columns().levels()[0].labels(), &["0", "1"]);
        assert_eq!(frame.index().levels()[0].positions("0"), &[0]);
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let err = DataFrame::new(
            vec![vec![1.into(), 2.into()], vec![1.into()]],
            Config::new(),
            quiet(),
        )
        .expect_err("ragged");
        assert_eq!(
            err,
            FrameError::LengthMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn lookups() {
        let frame = sample();
        assert_eq!(frame.at(2, 0), Some(Scalar::Int64(3)));
        assert_eq!(frame.at(3, 0), None);
        assert_eq!(frame.at(0, 5), None);

        let b = frame.col("b").expect("column b");
        assert_eq!(b.name(), "b");
        assert_eq!(b.count(), 2);
        assert!(frame.col("nope").is_none());

        assert_eq!(
            frame.row(1).expect("row"),
            vec![Scalar::Int64(2), Scalar::Null(NullKind::NaN)]
        );
        assert!(frame.row(3).is_err());
        assert!(frame.col_at(2).is_err());
    }

    #[test]
    fn filter_and_select_cols() {
        let frame = sample();
        let rows = frame.filter(0, |v| v.to_f64().is_ok_and(|x| x >= 2.0));
        assert_eq!(rows, vec![1, 2]);
        assert!(frame.filter(9, |_| true).is_empty());

        let picked = frame.select_cols(&["b", "missing", "a"]);
        assert_eq!(picked.num_cols(), 2);
        assert_eq!(picked.columns().levels()[0].labels(), &["b", "a"]);
    }

    #[test]
    fn insert_and_append_rows() {
        let frame = sample();
        let grown = frame
            .insert_row(1, vec![9.into(), 9.5.into()], vec!["w".into()])
            .expect("insert");
        assert_eq!(grown.len(), 4);
        assert_eq!(grown.at(1, 0), Some(Scalar::Int64(9)));
        assert_eq!(grown.index().levels()[0].positions("w"), &[1]);
        assert_eq!(grown.index().levels()[0].positions("y"), &[2]);

        let appended = frame
            .append_row(vec![4.into(), 4.5.into()], vec!["q".into()])
            .expect("append");
        assert_eq!(appended.at(3, 1), Some(Scalar::Float64(4.5)));
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn row_width_is_checked() {
        let err = sample()
            .insert_row(0, vec![1.into()], vec!["w".into()])
            .expect_err("width");
        assert_eq!(
            err,
            FrameError::RowWidthMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn drop_rows_out_of_range_is_atomic() {
        let mut frame = sample();
        let before = frame.clone();
        let err = frame.in_place().drop_rows(&[0, 99]).expect_err("range");
        assert!(err.is_out_of_range());
        assert_eq!(frame, before);

        frame.in_place().drop_rows(&[0, 2]).expect("drop");
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.index().levels()[0].positions("y"), &[0]);
    }

    #[test]
    fn set_rows_writes_one_value_per_column() {
        let frame = sample();
        let updated = frame
            .set_rows(&[0, 2], vec![0.into(), 0.into()])
            .expect("set");
        assert_eq!(updated.at(2, 0), Some(Scalar::Int64(0)));
        assert_eq!(updated.at(2, 1), Some(Scalar::Float64(0.0)));
        assert_eq!(updated.at(1, 0), Some(Scalar::Int64(2)));

        let mut same = frame.clone();
        assert!(same.in_place().set_rows(&[0, 3], vec![0.into(), 0.into()]).is_err());
        assert_eq!(same, frame);
    }

    #[test]
    fn drop_null_removes_rows_with_any_null() {
        let cleaned = sample().drop_null().expect("drop");
        assert_eq!(cleaned.len(), 2);
        assert!(cleaned.index().levels()[0].positions("y").is_empty());
    }

    #[test]
    fn sort_by_column() {
        let sorted = sample().sort_by(1, false).expect("sort");
        assert_eq!(sorted.at(0, 1), Some(Scalar::Float64(3.5)));
        assert_eq!(sorted.at(2, 1), Some(Scalar::Null(NullKind::NaN)));
        assert_eq!(sorted.index().levels()[0].positions("z"), &[0]);
    }

    #[test]
    fn column_operations() {
        let frame = sample();
        let extra = Column::from_strings(vec!["p", "q", "r"], &NullPolicy::default());
        let wider = frame
            .insert_col(0, extra, vec!["c".to_owned()])
            .expect("insert");
        assert_eq!(wider.num_cols(), 3);
        assert_eq!(wider.col("c").expect("c").kind(), Kind::Utf8);
        assert_eq!(wider.columns().select_label("a", &quiet()), vec![1]);

        let narrow = wider.drop_cols(&[0, 2]).expect("drop");
        assert_eq!(narrow.columns().levels()[0].labels(), &["a"]);

        let swapped = frame.swap_cols(0, 1).expect("swap");
        assert_eq!(swapped.col_at(0).expect("col").name(), "b");

        let short = Column::from_i64(vec![1]);
        assert!(matches!(
            frame.append_col(short, vec!["d".to_owned()]),
            Err(FrameError::LengthMismatch { .. })
        ));

        let mut same = frame.clone();
        assert!(same.in_place().drop_cols(&[1, 4]).is_err());
        assert_eq!(same, frame);
    }

    #[test]
    fn conversions() {
        let frame = sample();
        let strings = frame.to_utf8().expect("utf8");
        assert!(strings.values().iter().all(|c| c.kind() == Kind::Utf8));
        assert_eq!(strings.at(1, 1), Some(Scalar::Null(NullKind::Null)));

        let one = frame.convert_col(0, Kind::Float64).expect("convert");
        assert_eq!(one.values()[0].kind(), Kind::Float64);
        assert_eq!(frame.values()[0].kind(), Kind::Int64);
    }

    #[test]
    fn index_and_column_levels() {
        let frame = sample();
        let level = Level::new(Column::from_i64(vec![1, 1, 2]), "grp");
        let two = frame.insert_index_level(1, level).expect("insert");
        assert_eq!(two.index().names(), vec!["key", "grp"]);

        let swapped = two.swap_index_levels(0, 1).expect("swap");
        assert_eq!(swapped.index().names(), vec!["grp", "key"]);

        let err = two.drop_index_levels(&[0, 1]).expect_err("all");
        assert_eq!(err, FrameError::Index(IndexError::CannotDropAllLevels));

        let converted = two.convert_index_level(1, Kind::Utf8).expect("convert");
        assert_eq!(converted.index().levels()[1].kind(), Kind::Utf8);

        let outer = ColLevel::new(vec!["g", "g"], "group");
        let nested = frame.insert_col_level(0, outer).expect("col level");
        assert_eq!(nested.col_levels(), 2);
        assert_eq!(nested.col_at(1).expect("col").name(), "g | b");
        let flat = nested.drop_col_level(0).expect("drop");
        assert_eq!(flat.columns(), frame.columns());
    }

    #[test]
    fn set_and_reset_index() {
        let frame = sample();
        let indexed = frame.set_index(0).expect("set");
        assert_eq!(indexed.num_cols(), 1);
        assert_eq!(indexed.index().names(), vec!["a", "key"]);
        assert_eq!(indexed.index().levels()[0].positions("3"), &[2]);

        let reset = indexed.reset_index(0).expect("reset");
        assert_eq!(reset.num_cols(), 2);
        assert_eq!(reset.columns().levels()[0].labels(), &["a", "b"]);
        assert_eq!(reset.index().names(), vec!["key"]);

        let fully = frame.reset_index(0).expect("reset only level");
        assert_eq!(fully.columns().levels()[0].labels(), &["key", "a", "b"]);
        assert_eq!(fully.index().levels()[0].positions("2"), &[2]);
    }

    #[test]
    fn per_column_math_is_indexed_by_labels() {
        let frame = sample();
        let sums = frame.sum().expect("sum");
        assert_eq!(sums.name(), "sum");
        assert_eq!(sums.at_label("a"), vec![Scalar::Float64(6.0)]);
        assert_eq!(sums.at_label("b"), vec![Scalar::Float64(5.0)]);

        let counts = frame.count().expect("count");
        assert_eq!(counts.values().values(), &[Scalar::Int64(3), Scalar::Int64(2)]);

        let means = frame.mean().expect("mean");
        assert_eq!(means.at(1), Some(Scalar::Float64(2.5)));
    }

    #[test]
    fn per_column_math_keeps_sentinel_like_labels() {
        let config = Config::new().with_column_level(["nil", "x"]);
        let data = vec![vec![1.into(), 2.into()], vec![3.into(), 4.into()]];
        let frame = DataFrame::new(data, config, quiet()).expect("frame");
        let sums = frame.sum().expect("sum");
        assert_eq!(sums.at_label("nil"), vec![Scalar::Float64(3.0)]);
        assert_eq!(sums.at_label("x"), vec![Scalar::Float64(7.0)]);
        assert_eq!(
            sums.index().levels()[0].labels().values(),
            &[Scalar::from("nil"), Scalar::from("x")]
        );
    }

    #[test]
    fn copies_never_share_state() {
        let frame = sample();
        let mut copy = frame.fillna(0).expect("fill");
        copy.in_place().set_row(0, vec![7.into(), 7.into()]).expect("set");
        assert_eq!(frame.at(0, 0), Some(Scalar::Int64(1)));
        assert_eq!(frame.at(1, 1), Some(Scalar::Null(NullKind::NaN)));
        assert_eq!(copy.at(1, 1), Some(Scalar::Float64(0.0)));
    }

    #[test]
    fn from_parts_checks_alignment() {
        let frame = sample();
        let err = DataFrame::from_parts(
            vec![Column::from_i64(vec![1, 2])],
            frame.index().clone(),
            frame.columns().subset(&[0]).expect("subset"),
            "bad",
        )
        .expect_err("misaligned");
        assert!(matches!(err, FrameError::Misaligned { values: 2, index: 3 }));
    }
}
