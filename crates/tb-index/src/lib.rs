#![forbid(unsafe_code)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tb_columnar::{Column, ColumnError, check_positions};
use tb_runtime::{Options, soft_failure};
use tb_types::{Kind, NullPolicy, Scalar, TypeError};
use thiserror::Error;

mod columns;

pub use columns::{ColLevel, Columns};

/// Stringified label → ordered positions holding that label.
pub type LabelMap = HashMap<String, Vec<usize>>;

/// Level name → ordered level positions carrying that name.
pub type NameMap = HashMap<String, Vec<usize>>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("an index needs at least one level")]
    NoLevels,
    #[error("cannot drop every level")]
    CannotDropAllLevels,
    #[error("level length {found} does not match index length {expected}")]
    LevelLengthMismatch { expected: usize, found: usize },
    #[error("index levels out of alignment: lengths {lengths:?}")]
    Misaligned { lengths: Vec<usize> },
    #[error("level position {position} out of range for {num_levels} levels")]
    LevelOutOfRange { position: usize, num_levels: usize },
    #[error("level name {name:?} not found")]
    LevelNameNotFound { name: String },
    #[error("expected {expected} labels (one per level), got {found}")]
    LabelCountMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl IndexError {
    /// Name misses are routine lookups that callers may log and skip;
    /// everything else is a hard error.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::LevelNameNotFound { .. })
    }
}

pub(crate) fn build_label_map(labels: impl Iterator<Item = String>) -> LabelMap {
    let mut map = LabelMap::new();
    for (position, label) in labels.enumerate() {
        map.entry(label).or_default().push(position);
    }
    map
}

pub(crate) fn build_name_map<'a>(names: impl Iterator<Item = &'a str>) -> NameMap {
    let mut map = NameMap::new();
    for (position, name) in names.enumerate() {
        map.entry(name.to_owned()).or_default().push(position);
    }
    map
}

pub(crate) fn check_level(position: usize, num_levels: usize) -> Result<(), IndexError> {
    if position >= num_levels {
        return Err(IndexError::LevelOutOfRange {
            position,
            num_levels,
        });
    }
    Ok(())
}

pub(crate) fn check_levels(positions: &[usize], num_levels: usize) -> Result<(), IndexError> {
    positions
        .iter()
        .try_for_each(|&position| check_level(position, num_levels))
}

// ── Level ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct LevelParts {
    labels: Column,
    name: String,
}

impl From<LevelParts> for Level {
    fn from(parts: LevelParts) -> Self {
        Self::new(parts.labels, parts.name)
    }
}

/// One labeled dimension of a composite row key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "LevelParts")]
pub struct Level {
    labels: Column,
    name: String,
    #[serde(skip)]
    label_map: LabelMap,
}

impl PartialEq for Level {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.labels == other.labels
    }
}

impl Level {
    #[must_use]
    pub fn new(labels: Column, name: impl Into<String>) -> Self {
        let mut level = Self {
            labels,
            name: name.into(),
            label_map: LabelMap::new(),
        };
        level.refresh();
        level
    }

    pub fn from_values(
        values: Vec<Scalar>,
        name: impl Into<String>,
        policy: &NullPolicy,
    ) -> Result<Self, IndexError> {
        Ok(Self::new(Column::from_values(values, policy)?, name))
    }

    /// Int64 labels `0..len` with an empty name.
    #[must_use]
    pub fn default_range(len: usize) -> Self {
        let labels = (0..len)
            .map(|i| i64::try_from(i).unwrap_or(i64::MAX))
            .collect();
        Self::new(Column::from_i64(labels), "")
    }

    /// Recompute the label map from the current labels.
    pub fn refresh(&mut self) {
        self.label_map = build_label_map(self.labels.values().iter().map(ToString::to_string));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.labels.kind()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn labels(&self) -> &Column {
        &self.labels
    }

    #[must_use]
    pub fn label(&self, position: usize) -> Option<&Scalar> {
        self.labels.value(position)
    }

    #[must_use]
    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }

    /// Positions holding `label` (stringified form); empty when absent.
    #[must_use]
    pub fn positions(&self, label: &str) -> &[usize] {
        self.label_map.get(label).map_or(&[], Vec::as_slice)
    }

    /// Distinct stringified labels in order of first appearance.
    #[must_use]
    pub fn unique_labels(&self) -> Vec<String> {
        let mut first: Vec<(usize, &String)> = self
            .label_map
            .iter()
            .map(|(label, positions)| (positions[0], label))
            .collect();
        first.sort_unstable();
        first.into_iter().map(|(_, label)| label.clone()).collect()
    }

    pub fn convert(&self, kind: Kind, policy: &NullPolicy) -> Result<Self, IndexError> {
        let mut level = self.clone();
        level.in_place().convert(kind, policy)?;
        Ok(level)
    }

    pub fn to_float64(&self, policy: &NullPolicy) -> Result<Self, IndexError> {
        self.convert(Kind::Float64, policy)
    }

    pub fn to_int64(&self, policy: &NullPolicy) -> Result<Self, IndexError> {
        self.convert(Kind::Int64, policy)
    }

    pub fn to_utf8(&self, policy: &NullPolicy) -> Result<Self, IndexError> {
        self.convert(Kind::Utf8, policy)
    }

    pub fn to_bool(&self, policy: &NullPolicy) -> Result<Self, IndexError> {
        self.convert(Kind::Bool, policy)
    }

    pub fn to_datetime(&self, policy: &NullPolicy) -> Result<Self, IndexError> {
        self.convert(Kind::DateTime, policy)
    }

    pub fn to_interface(&self, policy: &NullPolicy) -> Result<Self, IndexError> {
        self.convert(Kind::Interface, policy)
    }

    pub fn in_place(&mut self) -> LevelInPlace<'_> {
        LevelInPlace { level: self }
    }

    pub fn subset(&self, positions: &[usize]) -> Result<Self, IndexError> {
        Ok(Self::new(self.labels.subset(positions)?, self.name.clone()))
    }
}

/// In-place handle over a [`Level`]; every call leaves the label map fresh.
pub struct LevelInPlace<'a> {
    level: &'a mut Level,
}

impl LevelInPlace<'_> {
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.level.set_name(name);
    }

    /// Swap the label container's kind and rebuild the label map.
    pub fn convert(&mut self, kind: Kind, policy: &NullPolicy) -> Result<(), IndexError> {
        self.level.labels.convert_in_place(kind, policy)?;
        self.level.refresh();
        Ok(())
    }

    pub fn to_float64(&mut self, policy: &NullPolicy) -> Result<(), IndexError> {
        self.convert(Kind::Float64, policy)
    }

    pub fn to_int64(&mut self, policy: &NullPolicy) -> Result<(), IndexError> {
        self.convert(Kind::Int64, policy)
    }

    pub fn to_utf8(&mut self, policy: &NullPolicy) -> Result<(), IndexError> {
        self.convert(Kind::Utf8, policy)
    }

    pub fn to_bool(&mut self, policy: &NullPolicy) -> Result<(), IndexError> {
        self.convert(Kind::Bool, policy)
    }

    pub fn to_datetime(&mut self, policy: &NullPolicy) -> Result<(), IndexError> {
        self.convert(Kind::DateTime, policy)
    }

    pub fn to_interface(&mut self, policy: &NullPolicy) -> Result<(), IndexError> {
        self.convert(Kind::Interface, policy)
    }

    pub fn set(
        &mut self,
        position: usize,
        label: Scalar,
        policy: &NullPolicy,
    ) -> Result<(), IndexError> {
        self.level.labels.set(position, label, policy)?;
        self.level.refresh();
        Ok(())
    }

    pub fn insert(
        &mut self,
        position: usize,
        label: Scalar,
        policy: &NullPolicy,
    ) -> Result<(), IndexError> {
        self.level.labels.insert(position, label, policy)?;
        self.level.refresh();
        Ok(())
    }

    pub fn drop(&mut self, position: usize) -> Result<(), IndexError> {
        self.level.labels.drop(position)?;
        self.level.refresh();
        Ok(())
    }

    pub fn drop_many(&mut self, positions: &[usize]) -> Result<(), IndexError> {
        self.level.labels.drop_many(positions)?;
        self.level.refresh();
        Ok(())
    }

    pub fn swap(&mut self, i: usize, j: usize) -> Result<(), IndexError> {
        self.level.labels.swap(i, j)?;
        self.level.refresh();
        Ok(())
    }

    pub fn subset(&mut self, positions: &[usize]) -> Result<(), IndexError> {
        self.level.labels = self.level.labels.subset(positions)?;
        self.level.refresh();
        Ok(())
    }
}

// ── Index ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct IndexParts {
    levels: Vec<Level>,
}

impl TryFrom<IndexParts> for Index {
    type Error = IndexError;

    fn try_from(parts: IndexParts) -> Result<Self, Self::Error> {
        Self::new(parts.levels)
    }
}

/// Ordered levels of equal length forming a composite row key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "IndexParts")]
pub struct Index {
    levels: Vec<Level>,
    #[serde(skip)]
    name_map: NameMap,
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.levels == other.levels
    }
}

impl Index {
    pub fn new(levels: Vec<Level>) -> Result<Self, IndexError> {
        let Some(first) = levels.first() else {
            return Err(IndexError::NoLevels);
        };
        let expected = first.len();
        if let Some(bad) = levels.iter().find(|level| level.len() != expected) {
            return Err(IndexError::LevelLengthMismatch {
                expected,
                found: bad.len(),
            });
        }
        let mut index = Self {
            levels,
            name_map: NameMap::new(),
        };
        index.refresh();
        Ok(index)
    }

    #[must_use]
    pub fn from_level(level: Level) -> Self {
        let mut index = Self {
            levels: vec![level],
            name_map: NameMap::new(),
        };
        index.refresh_names();
        index
    }

    #[must_use]
    pub fn default_range(len: usize) -> Self {
        Self::from_level(Level::default_range(len))
    }

    /// Recompute every level's label map and the level-name map.
    pub fn refresh(&mut self) {
        for level in &mut self.levels {
            level.refresh();
        }
        self.refresh_names();
    }

    fn refresh_names(&mut self) {
        self.name_map = build_name_map(self.levels.iter().map(Level::name));
    }

    /// Row count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, Level::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, position: usize) -> Result<&Level, IndexError> {
        check_level(position, self.levels.len())?;
        Ok(&self.levels[position])
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.levels.iter().map(Level::name).collect()
    }

    #[must_use]
    pub fn name_map(&self) -> &NameMap {
        &self.name_map
    }

    /// Every level must have the same length.
    pub fn ensure_aligned(&self) -> Result<(), IndexError> {
        let expected = self.len();
        if self.levels.iter().any(|level| level.len() != expected) {
            return Err(IndexError::Misaligned {
                lengths: self.levels.iter().map(Level::len).collect(),
            });
        }
        Ok(())
    }

    // ── Lookup ─────────────────────────────────────────────────────────

    /// First level named `name`. Soft failure: `None`, logged when enabled.
    #[must_use]
    pub fn select_name(&self, name: &str, options: &Options) -> Option<usize> {
        match self.name_map.get(name).and_then(|positions| positions.first()) {
            Some(&position) => Some(position),
            None => {
                soft_failure(options, "select_name", format!("level name {name:?} not found"));
                None
            }
        }
    }

    /// First level position for each name, in the order given.
    pub fn select_names(&self, names: &[&str]) -> Result<Vec<usize>, IndexError> {
        names
            .iter()
            .map(|name| {
                self.name_map
                    .get(*name)
                    .and_then(|positions| positions.first().copied())
                    .ok_or_else(|| IndexError::LevelNameNotFound {
                        name: (*name).to_owned(),
                    })
            })
            .collect()
    }

    /// Validate level positions without resolving anything.
    pub fn check_levels(&self, positions: &[usize]) -> Result<(), IndexError> {
        check_levels(positions, self.levels.len())
    }

    /// Rows whose label at `level` stringifies to `label`.
    /// Soft failure: empty on a miss or an invalid level.
    #[must_use]
    pub fn select_label(&self, label: &str, level: usize, options: &Options) -> Vec<usize> {
        let Some(level_ref) = self.levels.get(level) else {
            soft_failure(
                options,
                "select_label",
                format!("level {level} out of range for {} levels", self.levels.len()),
            );
            return Vec::new();
        };
        let positions = level_ref.positions(label);
        if positions.is_empty() {
            soft_failure(
                options,
                "select_label",
                format!("label {label:?} not found in level {level}"),
            );
        }
        positions.to_vec()
    }

    // ── Copy-returning forms ───────────────────────────────────────────

    pub fn in_place(&mut self) -> IndexInPlace<'_> {
        IndexInPlace { index: self }
    }

    fn with_copy(
        &self,
        apply: impl FnOnce(&mut IndexInPlace<'_>) -> Result<(), IndexError>,
    ) -> Result<Self, IndexError> {
        let mut copy = self.clone();
        apply(&mut copy.in_place())?;
        Ok(copy)
    }

    pub fn subset_rows(&self, positions: &[usize]) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.subset_rows(positions))
    }

    pub fn insert_row(
        &self,
        position: usize,
        labels: Vec<Scalar>,
        policy: &NullPolicy,
    ) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.insert_row(position, labels, policy))
    }

    pub fn drop_row(&self, position: usize) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.drop_row(position))
    }

    pub fn drop_rows(&self, positions: &[usize]) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.drop_rows(positions))
    }

    pub fn swap_rows(&self, i: usize, j: usize) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.swap_rows(i, j))
    }

    pub fn insert_level(&self, position: usize, level: Level) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.insert_level(position, level))
    }

    pub fn append_level(&self, level: Level) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.append_level(level))
    }

    pub fn set_level(&self, position: usize, level: Level) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.set_level(position, level))
    }

    pub fn drop_level(&self, position: usize) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.drop_level(position))
    }

    pub fn drop_levels(&self, positions: &[usize]) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.drop_levels(positions))
    }

    pub fn swap_levels(&self, i: usize, j: usize) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.swap_levels(i, j))
    }

    pub fn subset_levels(&self, positions: &[usize]) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.subset_levels(positions))
    }

    pub fn convert_level(
        &self,
        position: usize,
        kind: Kind,
        policy: &NullPolicy,
    ) -> Result<Self, IndexError> {
        self.with_copy(|idx| idx.convert_level(position, kind, policy))
    }
}

/// In-place handle over an [`Index`].
///
/// Every operation validates all of its inputs before touching any level and
/// refreshes the derived maps before returning.
pub struct IndexInPlace<'a> {
    index: &'a mut Index,
}

impl IndexInPlace<'_> {
    fn check_level_len(&self, level: &Level) -> Result<(), IndexError> {
        let expected = self.index.len();
        if level.len() != expected {
            return Err(IndexError::LevelLengthMismatch {
                expected,
                found: level.len(),
            });
        }
        Ok(())
    }

    pub fn subset_rows(&mut self, positions: &[usize]) -> Result<(), IndexError> {
        check_positions(positions, self.index.len())?;
        for level in &mut self.index.levels {
            level.in_place().subset(positions)?;
        }
        Ok(())
    }

    /// Insert one row; `labels` holds one label per level.
    pub fn insert_row(
        &mut self,
        position: usize,
        labels: Vec<Scalar>,
        policy: &NullPolicy,
    ) -> Result<(), IndexError> {
        let num_levels = self.index.levels.len();
        if labels.len() != num_levels {
            return Err(IndexError::LabelCountMismatch {
                expected: num_levels,
                found: labels.len(),
            });
        }
        check_positions(&[position], self.index.len() + 1)?;
        for (level, label) in self.index.levels.iter_mut().zip(labels) {
            level.in_place().insert(position, label, policy)?;
        }
        Ok(())
    }

    pub fn drop_row(&mut self, position: usize) -> Result<(), IndexError> {
        self.drop_rows(&[position])
    }

    pub fn drop_rows(&mut self, positions: &[usize]) -> Result<(), IndexError> {
        check_positions(positions, self.index.len())?;
        for level in &mut self.index.levels {
            level.in_place().drop_many(positions)?;
        }
        Ok(())
    }

    pub fn swap_rows(&mut self, i: usize, j: usize) -> Result<(), IndexError> {
        check_positions(&[i, j], self.index.len())?;
        for level in &mut self.index.levels {
            level.in_place().swap(i, j)?;
        }
        Ok(())
    }

    /// Insert `level` before `position`; `position == num_levels` appends.
    pub fn insert_level(&mut self, position: usize, level: Level) -> Result<(), IndexError> {
        check_level(position, self.index.levels.len() + 1)?;
        self.check_level_len(&level)?;
        self.index.levels.insert(position, level);
        self.index.refresh();
        Ok(())
    }

    pub fn append_level(&mut self, level: Level) -> Result<(), IndexError> {
        let position = self.index.levels.len();
        self.insert_level(position, level)
    }

    pub fn set_level(&mut self, position: usize, level: Level) -> Result<(), IndexError> {
        check_level(position, self.index.levels.len())?;
        self.check_level_len(&level)?;
        self.index.levels[position] = level;
        self.index.refresh();
        Ok(())
    }

    pub fn set_level_name(&mut self, position: usize, name: &str) -> Result<(), IndexError> {
        check_level(position, self.index.levels.len())?;
        self.index.levels[position].in_place().set_name(name);
        self.index.refresh_names();
        Ok(())
    }

    pub fn drop_level(&mut self, position: usize) -> Result<(), IndexError> {
        self.drop_levels(&[position])
    }

    /// Remove the listed levels; rejected outright if any position is invalid
    /// or nothing would remain.
    pub fn drop_levels(&mut self, positions: &[usize]) -> Result<(), IndexError> {
        let num_levels = self.index.levels.len();
        check_levels(positions, num_levels)?;
        let mut doomed = positions.to_vec();
        doomed.sort_unstable();
        doomed.dedup();
        if doomed.len() >= num_levels {
            return Err(IndexError::CannotDropAllLevels);
        }
        for position in doomed.into_iter().rev() {
            self.index.levels.remove(position);
        }
        self.index.refresh();
        Ok(())
    }

    pub fn swap_levels(&mut self, i: usize, j: usize) -> Result<(), IndexError> {
        check_levels(&[i, j], self.index.levels.len())?;
        self.index.levels.swap(i, j);
        self.index.refresh();
        Ok(())
    }

    /// Keep only the listed levels, in the order given.
    pub fn subset_levels(&mut self, positions: &[usize]) -> Result<(), IndexError> {
        if positions.is_empty() {
            return Err(IndexError::NoLevels);
        }
        check_levels(positions, self.index.levels.len())?;
        let levels = positions
            .iter()
            .map(|&position| self.index.levels[position].clone())
            .collect();
        self.index.levels = levels;
        self.index.refresh();
        Ok(())
    }

    pub fn convert_level(
        &mut self,
        position: usize,
        kind: Kind,
        policy: &NullPolicy,
    ) -> Result<(), IndexError> {
        check_level(position, self.index.levels.len())?;
        self.index.levels[position].in_place().convert(kind, policy)?;
        Ok(())
    }

    /// Remove and return a level, replacing the index with a default range
    /// when it was the last one.
    pub fn take_level(&mut self, position: usize) -> Result<Level, IndexError> {
        check_level(position, self.index.levels.len())?;
        let len = self.index.len();
        let level = self.index.levels.remove(position);
        if self.index.levels.is_empty() {
            self.index.levels.push(Level::default_range(len));
        }
        self.index.refresh();
        Ok(level)
    }
}
