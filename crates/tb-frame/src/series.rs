use tb_columnar::{Column, check_positions};
use tb_index::{Index, Level};
use tb_runtime::{Options, soft_failure};
use tb_types::{Aggregation, Kind, Scalar};

use crate::{Config, FrameError, check_alignment};

/// A labeled, typed, one-dimensional container.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    values: Column,
    index: Index,
    name: String,
    options: Options,
}

impl Series {
    /// Build from raw values; the kind is inferred unless `config.kind` is set.
    pub fn new(values: Vec<Scalar>, config: Config, options: Options) -> Result<Self, FrameError> {
        let column = config.build_column(values, options.null_policy())?;
        let index = config.build_index(column.len(), options.null_policy())?;
        Ok(Self {
            values: column,
            index,
            name: config.name,
            options,
        })
    }

    pub fn from_column(
        column: Column,
        index: Index,
        name: impl Into<String>,
    ) -> Result<Self, FrameError> {
        check_alignment(&column, &index)?;
        Ok(Self {
            values: column,
            index,
            name: name.into(),
            options: Options::default(),
        })
    }

    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
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
    pub fn kind(&self) -> Kind {
        self.values.kind()
    }

    #[must_use]
    pub fn values(&self) -> &Column {
        &self.values
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[must_use]
    pub fn index_levels(&self) -> usize {
        self.index.num_levels()
    }

    #[must_use]
    pub fn valid(&self) -> Vec<usize> {
        self.values.valid()
    }

    #[must_use]
    pub fn null(&self) -> Vec<usize> {
        self.values.null()
    }

    pub fn ensure_alignment(&self) -> Result<(), FrameError> {
        check_alignment(&self.values, &self.index)
    }

    // ── Selection ──────────────────────────────────────────────────────

    /// Value at `position`; `None` (logged) when out of range.
    #[must_use]
    pub fn at(&self, position: usize) -> Option<Scalar> {
        let value = self.values.value(position).cloned();
        if value.is_none() {
            soft_failure(
                &self.options,
                "at",
                format!("position {position} out of range for length {}", self.len()),
            );
        }
        value
    }

    /// Values whose level-0 label matches `label`.
    #[must_use]
    pub fn at_label(&self, label: &str) -> Vec<Scalar> {
        self.index
            .select_label(label, 0, &self.options)
            .into_iter()
            .filter_map(|position| self.values.value(position).cloned())
            .collect()
    }

    /// Rows whose level-0 label matches `label`, as a new Series.
    #[must_use]
    pub fn select_label(&self, label: &str) -> Option<Self> {
        let positions = self.index.select_label(label, 0, &self.options);
        if positions.is_empty() {
            return None;
        }
        self.subset_rows(&positions).ok()
    }

    /// Positions whose value satisfies `predicate`. Nulls are never passed in.
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&Scalar) -> bool) -> Vec<usize> {
        let positions: Vec<usize> = self
            .values
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

    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let take = n.min(self.len());
        let positions: Vec<usize> = (0..take).collect();
        self.take_rows(&positions)
    }

    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let len = self.len();
        let positions: Vec<usize> = (len - n.min(len)..len).collect();
        self.take_rows(&positions)
    }

    /// `positions` are known to be in range.
    fn take_rows(&self, positions: &[usize]) -> Self {
        self.subset_rows(positions).unwrap_or_else(|_| self.clone())
    }

    // ── Math ───────────────────────────────────────────────────────────

    /// Reduce the whole container, skipping nulls.
    #[must_use]
    pub fn aggregate(&self, aggregation: Aggregation) -> Scalar {
        aggregation.apply(self.values.values())
    }

    fn aggregate_f64(&self, aggregation: Aggregation) -> f64 {
        self.aggregate(aggregation).to_f64().unwrap_or(f64::NAN)
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.aggregate_f64(Aggregation::Sum)
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        self.aggregate_f64(Aggregation::Mean)
    }

    #[must_use]
    pub fn median(&self) -> f64 {
        self.aggregate_f64(Aggregation::Median)
    }

    #[must_use]
    pub fn min(&self) -> f64 {
        self.aggregate_f64(Aggregation::Min)
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        self.aggregate_f64(Aggregation::Max)
    }

    /// Population standard deviation.
    #[must_use]
    pub fn std(&self) -> f64 {
        self.aggregate_f64(Aggregation::Std)
    }

    #[must_use]
    pub fn var(&self) -> f64 {
        self.aggregate_f64(Aggregation::Var)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.values.count_valid()
    }

    // ── Copy-returning mutation ────────────────────────────────────────

    pub fn in_place(&mut self) -> SeriesInPlace<'_> {
        SeriesInPlace { series: self }
    }

    fn with_copy(
        &self,
        apply: impl FnOnce(&mut SeriesInPlace<'_>) -> Result<(), FrameError>,
    ) -> Result<Self, FrameError> {
        let mut copy = self.clone();
        apply(&mut copy.in_place())?;
        Ok(copy)
    }

    pub fn set(&self, position: usize, value: impl Into<Scalar>) -> Result<Self, FrameError> {
        self.with_copy(|s| s.set(position, value))
    }

    pub fn set_rows(
        &self,
        positions: &[usize],
        value: impl Into<Scalar>,
    ) -> Result<Self, FrameError> {
        self.with_copy(|s| s.set_rows(positions, value))
    }

    pub fn insert_row(
        &self,
        position: usize,
        value: impl Into<Scalar>,
        labels: Vec<Scalar>,
    ) -> Result<Self, FrameError> {
        self.with_copy(|s| s.insert_row(position, value, labels))
    }

    pub fn append_row(
        &self,
        value: impl Into<Scalar>,
        labels: Vec<Scalar>,
    ) -> Result<Self, FrameError> {
        self.with_copy(|s| s.append_row(value, labels))
    }

    pub fn drop_row(&self, position: usize) -> Result<Self, FrameError> {
        self.with_copy(|s| s.drop_row(position))
    }

    pub fn drop_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        self.with_copy(|s| s.drop_rows(positions))
    }

    pub fn drop_null(&self) -> Result<Self, FrameError> {
        self.with_copy(|s| s.drop_null())
    }

    pub fn swap_rows(&self, i: usize, j: usize) -> Result<Self, FrameError> {
        self.with_copy(|s| s.swap_rows(i, j))
    }

    pub fn subset_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        self.with_copy(|s| s.subset_rows(positions))
    }

    pub fn sort(&self, ascending: bool) -> Result<Self, FrameError> {
        self.with_copy(|s| s.sort(ascending))
    }

    pub fn fillna(&self, value: impl Into<Scalar>) -> Result<Self, FrameError> {
        self.with_copy(|s| s.fillna(value))
    }

    pub fn convert(&self, kind: Kind) -> Result<Self, FrameError> {
        self.with_copy(|s| s.convert(kind))
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

    pub fn insert_level(&self, position: usize, level: Level) -> Result<Self, FrameError> {
        self.with_copy(|s| s.insert_level(position, level))
    }

    pub fn append_level(&self, level: Level) -> Result<Self, FrameError> {
        self.with_copy(|s| s.append_level(level))
    }

    pub fn set_level(&self, position: usize, level: Level) -> Result<Self, FrameError> {
        self.with_copy(|s| s.set_level(position, level))
    }

    pub fn drop_level(&self, position: usize) -> Result<Self, FrameError> {
        self.with_copy(|s| s.drop_level(position))
    }

    pub fn drop_levels(&self, positions: &[usize]) -> Result<Self, FrameError> {
        self.with_copy(|s| s.drop_levels(positions))
    }

    pub fn swap_levels(&self, i: usize, j: usize) -> Result<Self, FrameError> {
        self.with_copy(|s| s.swap_levels(i, j))
    }

    pub fn subset_levels(&self, positions: &[usize]) -> Result<Self, FrameError> {
        self.with_copy(|s| s.subset_levels(positions))
    }

    pub fn convert_level(&self, position: usize, kind: Kind) -> Result<Self, FrameError> {
        self.with_copy(|s| s.convert_level(position, kind))
    }
}

/// Mutable handle over a [`Series`].
///
/// Alignment is checked before every operation. Operations that touch both
/// values and labels are staged on copies and committed only when both sides
/// succeed.
pub struct SeriesInPlace<'a> {
    series: &'a mut Series,
}

impl SeriesInPlace<'_> {
    fn stage(
        &mut self,
        apply: impl FnOnce(&mut Column, &mut Index, &Options) -> Result<(), FrameError>,
    ) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        let mut values = self.series.values.clone();
        let mut index = self.series.index.clone();
        apply(&mut values, &mut index, &self.series.options)?;
        check_alignment(&values, &index)?;
        self.series.values = values;
        self.series.index = index;
        Ok(())
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.series.name = name.into();
    }

    pub fn set(&mut self, position: usize, value: impl Into<Scalar>) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        let series = &mut *self.series;
        series
            .values
            .set(position, value.into(), series.options.null_policy())?;
        Ok(())
    }

    /// Set every listed row to `value`; nothing changes if any position is bad.
    pub fn set_rows(
        &mut self,
        positions: &[usize],
        value: impl Into<Scalar>,
    ) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        let series = &mut *self.series;
        series
            .values
            .set_many(positions, value.into(), series.options.null_policy())?;
        Ok(())
    }

    /// Insert before `position` with one label per index level;
    /// `position == len` appends.
    pub fn insert_row(
        &mut self,
        position: usize,
        value: impl Into<Scalar>,
        labels: Vec<Scalar>,
    ) -> Result<(), FrameError> {
        let value = value.into();
        self.stage(|values, index, options| {
            index
                .in_place()
                .insert_row(position, labels, options.null_policy())?;
            values.insert(position, value, options.null_policy())?;
            Ok(())
        })
    }

    pub fn append_row(
        &mut self,
        value: impl Into<Scalar>,
        labels: Vec<Scalar>,
    ) -> Result<(), FrameError> {
        let position = self.series.len();
        self.insert_row(position, value, labels)
    }

    pub fn drop_row(&mut self, position: usize) -> Result<(), FrameError> {
        self.drop_rows(&[position])
    }

    pub fn drop_rows(&mut self, positions: &[usize]) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        check_positions(positions, self.series.len())?;
        self.stage(|values, index, _| {
            index.in_place().drop_rows(positions)?;
            values.drop_many(positions)?;
            Ok(())
        })
    }

    pub fn drop_null(&mut self) -> Result<(), FrameError> {
        let nulls = self.series.null();
        self.drop_rows(&nulls)
    }

    pub fn swap_rows(&mut self, i: usize, j: usize) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        check_positions(&[i, j], self.series.len())?;
        self.stage(|values, index, _| {
            index.in_place().swap_rows(i, j)?;
            values.swap(i, j)?;
            Ok(())
        })
    }

    /// Keep the listed rows in the order given; positions may repeat.
    pub fn subset_rows(&mut self, positions: &[usize]) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        check_positions(positions, self.series.len())?;
        self.stage(|values, index, _| {
            index.in_place().subset_rows(positions)?;
            *values = values.subset(positions)?;
            Ok(())
        })
    }

    /// Reorder rows by value, nulls last.
    pub fn sort(&mut self, ascending: bool) -> Result<(), FrameError> {
        let order = self.series.values.sort_order(ascending);
        self.subset_rows(&order)
    }

    pub fn fillna(&mut self, value: impl Into<Scalar>) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        let series = &mut *self.series;
        series.values = series
            .values
            .fillna(&value.into(), series.options.null_policy())?;
        Ok(())
    }

    pub fn convert(&mut self, kind: Kind) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        let series = &mut *self.series;
        series
            .values
            .convert_in_place(kind, series.options.null_policy())?;
        Ok(())
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

    // ── Index levels ───────────────────────────────────────────────────

    pub fn insert_level(&mut self, position: usize, level: Level) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        self.series.index.in_place().insert_level(position, level)?;
        Ok(())
    }

    pub fn append_level(&mut self, level: Level) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        self.series.index.in_place().append_level(level)?;
        Ok(())
    }

    pub fn set_level(&mut self, position: usize, level: Level) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        self.series.index.in_place().set_level(position, level)?;
        Ok(())
    }

    pub fn drop_level(&mut self, position: usize) -> Result<(), FrameError> {
        self.drop_levels(&[position])
    }

    pub fn drop_levels(&mut self, positions: &[usize]) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        self.series.index.in_place().drop_levels(positions)?;
        Ok(())
    }

    pub fn swap_levels(&mut self, i: usize, j: usize) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        self.series.index.in_place().swap_levels(i, j)?;
        Ok(())
    }

    pub fn subset_levels(&mut self, positions: &[usize]) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        self.series.index.in_place().subset_levels(positions)?;
        Ok(())
    }

    pub fn convert_level(&mut self, position: usize, kind: Kind) -> Result<(), FrameError> {
        self.series.ensure_alignment()?;
        let series = &mut *self.series;
        series
            .index
            .in_place()
            .convert_level(position, kind, series.options.null_policy())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tb_columnar::Column;
    use tb_index::{Index, Level};
    use tb_runtime::Options;
    use tb_types::{Kind, NullKind, NullPolicy, Scalar};

    use super::Series;
    use crate::{Config, FrameError};

    fn quiet() -> Options {
        Options::default().with_log_warnings(false)
    }

    fn ints(values: &[i64]) -> Series {
        let values = values.iter().copied().map(Scalar::Int64).collect();
        Series::new(values, Config::new(), quiet()).expect("series")
    }

    fn floats(values: &[f64]) -> Series {
        let values = values.iter().copied().map(Scalar::Float64).collect();
        Series::new(values, Config::new(), quiet()).expect("series")
    }

    fn keyed() -> Series {
        let config = Config::new()
            .with_index_level([1_i64, 1, 2, 2])
            .with_index_level(["a", "b", "a", "b"])
            .with_index_names(["num", "letter"])
            .with_name("vals");
        let values = vec![10.into(), 20.into(), 30.into(), 40.into()];
        Series::new(values, config, quiet()).expect("series")
    }

    #[test]
    fn construction_infers_kind_and_default_index() {
        let series = ints(&[1, 2, 3]);
        assert_eq!(series.kind(), Kind::Int64);
        assert_eq!(series.len(), 3);
        assert_eq!(series.index_levels(), 1);
        assert_eq!(series.index().levels()[0].positions("2"), &[2]);
    }

    #[test]
    fn explicit_kind_overrides_inference() {
        let config = Config::new().with_kind(Kind::Float64);
        let series = Series::new(vec![1.into(), "x".into()], config, quiet()).expect("series");
        assert_eq!(series.kind(), Kind::Float64);
        assert_eq!(series.values().values()[1], Scalar::Null(NullKind::NaN));
    }

    #[test]
    fn index_length_must_match_values() {
        let config = Config::new().with_index_level(["a"]);
        let err = Series::new(vec![1.into(), 2.into()], config, quiet()).expect_err("length");
        assert_eq!(
            err,
            FrameError::LengthMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn soft_lookups_return_sentinels() {
        let series = keyed();
        assert_eq!(series.at(1), Some(Scalar::Int64(20)));
        assert_eq!(series.at(9), None);
        assert_eq!(series.at_label("2"), vec![Scalar::Int64(30), Scalar::Int64(40)]);
        assert!(series.at_label("7").is_empty());
        assert!(series.select_label("7").is_none());
        assert!(series.filter(|v| v.to_f64().is_ok_and(|x| x > 100.0)).is_empty());
    }

    #[test]
    fn select_label_keeps_every_level() {
        let picked = keyed().select_label("1").expect("rows");
        assert_eq!(picked.len(), 2);
        assert_eq!(picked.index().levels()[1].positions("b"), &[1]);
        assert_eq!(picked.name(), "vals");
    }

    #[test]
    fn filter_skips_nulls() {
        let series = floats(&[1.0, f64::NAN, 3.0]);
        assert_eq!(series.filter(|_| true), vec![0, 2]);
    }

    #[test]
    fn copy_mutation_leaves_source_untouched() {
        let source = keyed();
        let changed = source.set(0, 99).expect("set");
        assert_eq!(changed.at(0), Some(Scalar::Int64(99)));
        assert_eq!(source.at(0), Some(Scalar::Int64(10)));

        let shorter = source.drop_row(0).expect("drop");
        assert_eq!(shorter.len(), 3);
        assert_eq!(source.len(), 4);
        assert_eq!(source.index().levels()[0].positions("1"), &[0, 1]);
    }

    #[test]
    fn in_place_mutation_changes_receiver() {
        let mut series = keyed();
        series.in_place().set(0, 5).expect("set");
        series
            .in_place()
            .append_row(50, vec![3.into(), "c".into()])
            .expect("append");
        assert_eq!(series.len(), 5);
        assert_eq!(series.at(0), Some(Scalar::Int64(5)));
        assert_eq!(series.index().levels()[0].positions("3"), &[4]);
        series.ensure_alignment().expect("aligned");
    }

    #[test]
    fn drop_rows_out_of_range_changes_nothing() {
        let mut series = ints(&[1, 2, 3]);
        let before = series.clone();
        let err = series.in_place().drop_rows(&[0, 99]).expect_err("range");
        assert!(err.is_out_of_range());
        assert_eq!(series, before);
    }

    #[test]
    fn set_rows_is_atomic() {
        let mut series = ints(&[1, 2, 3]);
        let before = series.clone();
        assert!(series.in_place().set_rows(&[0, 5], 0).is_err());
        assert_eq!(series, before);
        series.in_place().set_rows(&[0, 2], 0).expect("set");
        assert_eq!(series.values().values()[2], Scalar::Int64(0));
    }

    #[test]
    fn insert_row_with_wrong_label_count_changes_nothing() {
        let mut series = keyed();
        let before = series.clone();
        assert!(series.in_place().insert_row(0, 1, vec![1.into()]).is_err());
        assert_eq!(series, before);
    }

    #[test]
    fn drop_null_and_sort() {
        let series = floats(&[3.0, f64::NAN, 1.0, 2.0]);
        let cleaned = series.drop_null().expect("drop");
        assert_eq!(cleaned.len(), 3);
        assert_eq!(cleaned.index().levels()[0].positions("3"), &[2]);

        let sorted = series.sort(true).expect("sort");
        assert_eq!(
            sorted.values().values(),
            &[
                Scalar::Float64(1.0),
                Scalar::Float64(2.0),
                Scalar::Float64(3.0),
                Scalar::Null(NullKind::NaN),
            ]
        );
        assert_eq!(sorted.index().levels()[0].positions("2"), &[0]);
    }

    #[test]
    fn swap_and_subset_rows_move_labels_with_values() {
        let series = keyed();
        let swapped = series.swap_rows(0, 3).expect("swap");
        assert_eq!(swapped.at(0), Some(Scalar::Int64(40)));
        assert_eq!(swapped.index().levels()[0].positions("2"), &[0, 2]);

        let subset = series.subset_rows(&[3, 3, 0]).expect("subset");
        assert_eq!(subset.len(), 3);
        assert_eq!(subset.index().levels()[1].positions("b"), &[0, 1]);
    }

    #[test]
    fn head_and_tail_clamp() {
        let series = ints(&[1, 2, 3]);
        assert_eq!(series.head(2).len(), 2);
        assert_eq!(series.head(10).len(), 3);
        assert_eq!(series.tail(1).at(0), Some(Scalar::Int64(3)));
        assert!(series.tail(0).is_empty());
    }

    #[test]
    fn string_int_string_round_trip() {
        let strings = vec!["1".into(), "2".into(), "3".into()];
        let series = Series::new(strings, Config::new(), quiet()).expect("series");
        let back = series
            .to_int64()
            .and_then(|s| s.to_utf8())
            .expect("round trip");
        assert_eq!(back.values(), series.values());
    }

    #[test]
    fn unparsable_strings_become_nan() {
        let series = Series::new(vec!["abc".into(), "2.5".into()], Config::new(), quiet())
            .expect("series");
        let floats = series.to_float64().expect("float");
        assert_eq!(
            floats.values().values(),
            &[Scalar::Null(NullKind::NaN), Scalar::Float64(2.5)]
        );
    }

    #[test]
    fn datetime_conversion() {
        let series = Series::new(vec!["2024-03-01 12:00:00".into()], Config::new(), quiet())
            .expect("series");
        let converted = series.to_datetime().expect("datetime");
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("date");
        assert_eq!(converted.at(0), Some(Scalar::DateTime(expected)));
    }

    #[test]
    fn math_skips_nulls() {
        let series = floats(&[1.0, f64::NAN, 2.0, 3.0, 4.0]);
        assert_eq!(series.sum(), 10.0);
        assert_eq!(series.mean(), 2.5);
        assert_eq!(series.median(), 2.5);
        assert_eq!(series.min(), 1.0);
        assert_eq!(series.max(), 4.0);
        assert_eq!(series.count(), 4);
        assert!((series.std() - 1.118_033_988_749_895).abs() < 1e-12);
        assert!(floats(&[]).mean().is_nan());
    }

    #[test]
    fn index_level_operations() {
        let series = keyed();
        let swapped = series.swap_levels(0, 1).expect("swap");
        assert_eq!(swapped.index().names(), vec!["letter", "num"]);

        let extra = Level::new(
            Column::from_strings(vec!["x", "x", "y", "y"], &NullPolicy::default()),
            "extra",
        );
        let three = series.append_level(extra).expect("append");
        assert_eq!(three.index_levels(), 3);

        let one = three.subset_levels(&[2]).expect("subset");
        assert_eq!(one.index().names(), vec!["extra"]);

        let mut same = series.clone();
        assert!(same.in_place().drop_levels(&[0, 1]).is_err());
        assert_eq!(same, series);

        let converted = series.convert_level(0, Kind::Utf8).expect("convert");
        assert_eq!(converted.index().levels()[0].kind(), Kind::Utf8);
    }

    #[test]
    fn out_of_sync_series_reports_misalignment() {
        let column = Column::from_i64(vec![1, 2, 3]);
        let err = Series::from_column(column, Index::default_range(2), "bad")
            .expect_err("misaligned");
        assert!(matches!(err, FrameError::Misaligned { values: 3, index: 2 }));
        assert!(!err.is_out_of_range());
    }
}
