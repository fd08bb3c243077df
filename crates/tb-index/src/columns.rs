//! Column labels: an index-like structure whose labels are plain strings.

use serde::{Deserialize, Serialize};
use tb_columnar::check_positions;
use tb_runtime::{Options, soft_failure};

use crate::{
    IndexError, LabelMap, NameMap, build_label_map, build_name_map, check_level, check_levels,
};

#[derive(Debug, Clone, Deserialize)]
struct ColLevelParts {
    labels: Vec<String>,
    name: String,
}

impl From<ColLevelParts> for ColLevel {
    fn from(parts: ColLevelParts) -> Self {
        Self::new(parts.labels, parts.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ColLevelParts")]
pub struct ColLevel {
    labels: Vec<String>,
    name: String,
    #[serde(skip)]
    label_map: LabelMap,
}

impl PartialEq for ColLevel {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.labels == other.labels
    }
}

impl ColLevel {
    #[must_use]
    pub fn new<S: Into<String>>(labels: Vec<S>, name: impl Into<String>) -> Self {
        let mut level = Self {
            labels: labels.into_iter().map(Into::into).collect(),
            name: name.into(),
            label_map: LabelMap::new(),
        };
        level.refresh();
        level
    }

    pub fn refresh(&mut self) {
        self.label_map = build_label_map(self.labels.iter().cloned());
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
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }

    #[must_use]
    pub fn positions(&self, label: &str) -> &[usize] {
        self.label_map.get(label).map_or(&[], Vec::as_slice)
    }
}

/// Column labels across one or more levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ColumnsParts")]
pub struct Columns {
    levels: Vec<ColLevel>,
    #[serde(skip)]
    name_map: NameMap,
}

#[derive(Debug, Clone, Deserialize)]
struct ColumnsParts {
    levels: Vec<ColLevel>,
}

impl TryFrom<ColumnsParts> for Columns {
    type Error = IndexError;

    fn try_from(parts: ColumnsParts) -> Result<Self, Self::Error> {
        Self::new(parts.levels)
    }
}

impl PartialEq for Columns {
    fn eq(&self, other: &Self) -> bool {
        self.levels == other.levels
    }
}

impl Columns {
    pub fn new(levels: Vec<ColLevel>) -> Result<Self, IndexError> {
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
        let mut columns = Self {
            levels,
            name_map: NameMap::new(),
        };
        columns.refresh();
        Ok(columns)
    }

    /// Labels `"0"..="n-1"` in a single unnamed level.
    #[must_use]
    pub fn default_range(len: usize) -> Self {
        Self::from_names((0..len).map(|i| i.to_string()).collect())
    }

    #[must_use]
    pub fn from_names<S: Into<String>>(names: Vec<S>) -> Self {
        let mut columns = Self {
            levels: vec![ColLevel::new(names, "")],
            name_map: NameMap::new(),
        };
        columns.refresh();
        columns
    }

    pub fn refresh(&mut self) {
        for level in &mut self.levels {
            level.refresh();
        }
        self.name_map = build_name_map(self.levels.iter().map(ColLevel::name));
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, ColLevel::len)
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
    pub fn levels(&self) -> &[ColLevel] {
        &self.levels
    }

    pub fn level(&self, position: usize) -> Result<&ColLevel, IndexError> {
        check_level(position, self.levels.len())?;
        Ok(&self.levels[position])
    }

    #[must_use]
    pub fn name_map(&self) -> &NameMap {
        &self.name_map
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.levels.iter().map(ColLevel::name).collect()
    }

    pub fn ensure_aligned(&self) -> Result<(), IndexError> {
        let expected = self.len();
        if self.levels.iter().any(|level| level.len() != expected) {
            return Err(IndexError::Misaligned {
                lengths: self.levels.iter().map(ColLevel::len).collect(),
            });
        }
        Ok(())
    }

    /// Per-level labels of column `position`.
    pub fn labels_at(&self, position: usize) -> Result<Vec<String>, IndexError> {
        check_positions(&[position], self.len())?;
        Ok(self
            .levels
            .iter()
            .map(|level| level.labels[position].clone())
            .collect())
    }

    /// Per-level labels of column `position` joined with `" | "`.
    pub fn joined_label(&self, position: usize) -> Result<String, IndexError> {
        Ok(self.labels_at(position)?.join(" | "))
    }

    #[must_use]
    pub fn select_name(&self, name: &str, options: &Options) -> Option<usize> {
        match self.name_map.get(name).and_then(|positions| positions.first()) {
            Some(&position) => Some(position),
            None => {
                soft_failure(
                    options,
                    "select_name",
                    format!("column level name {name:?} not found"),
                );
                None
            }
        }
    }

    /// Columns labelled `label` in level 0.
    #[must_use]
    pub fn select_label(&self, label: &str, options: &Options) -> Vec<usize> {
        self.select_label_in(0, label, options)
    }

    #[must_use]
    pub fn select_label_in(&self, level: usize, label: &str, options: &Options) -> Vec<usize> {
        let Some(level_ref) = self.levels.get(level) else {
            soft_failure(
                options,
                "select_label",
                format!("column level {level} out of range for {} levels", self.levels.len()),
            );
            return Vec::new();
        };
        let positions = level_ref.positions(label);
        if positions.is_empty() {
            soft_failure(
                options,
                "select_label",
                format!("column label {label:?} not found in level {level}"),
            );
        }
        positions.to_vec()
    }

    // ── Column mutation ────────────────────────────────────────────────

    /// Insert a column label before `position`; one label per level.
    pub fn insert(&mut self, position: usize, labels: Vec<String>) -> Result<(), IndexError> {
        if labels.len() != self.levels.len() {
            return Err(IndexError::LabelCountMismatch {
                expected: self.levels.len(),
                found: labels.len(),
            });
        }
        check_positions(&[position], self.len() + 1)?;
        for (level, label) in self.levels.iter_mut().zip(labels) {
            level.labels.insert(position, label);
        }
        self.refresh();
        Ok(())
    }

    pub fn set(&mut self, position: usize, labels: Vec<String>) -> Result<(), IndexError> {
        if labels.len() != self.levels.len() {
            return Err(IndexError::LabelCountMismatch {
                expected: self.levels.len(),
                found: labels.len(),
            });
        }
        check_positions(&[position], self.len())?;
        for (level, label) in self.levels.iter_mut().zip(labels) {
            level.labels[position] = label;
        }
        self.refresh();
        Ok(())
    }

    pub fn drop(&mut self, position: usize) -> Result<(), IndexError> {
        self.drop_many(&[position])
    }

    pub fn drop_many(&mut self, positions: &[usize]) -> Result<(), IndexError> {
        check_positions(positions, self.len())?;
        let mut doomed = positions.to_vec();
        doomed.sort_unstable();
        doomed.dedup();
        for level in &mut self.levels {
            for &position in doomed.iter().rev() {
                level.labels.remove(position);
            }
        }
        self.refresh();
        Ok(())
    }

    pub fn swap(&mut self, i: usize, j: usize) -> Result<(), IndexError> {
        check_positions(&[i, j], self.len())?;
        for level in &mut self.levels {
            level.labels.swap(i, j);
        }
        self.refresh();
        Ok(())
    }

    pub fn subset(&self, positions: &[usize]) -> Result<Self, IndexError> {
        check_positions(positions, self.len())?;
        let levels = self
            .levels
            .iter()
            .map(|level| {
                let labels = positions
                    .iter()
                    .map(|&position| level.labels[position].clone())
                    .collect::<Vec<String>>();
                ColLevel::new(labels, level.name.clone())
            })
            .collect();
        Self::new(levels)
    }

    // ── Level mutation ─────────────────────────────────────────────────

    pub fn insert_level(&mut self, position: usize, level: ColLevel) -> Result<(), IndexError> {
        check_level(position, self.levels.len() + 1)?;
        if level.len() != self.len() {
            return Err(IndexError::LevelLengthMismatch {
                expected: self.len(),
                found: level.len(),
            });
        }
        self.levels.insert(position, level);
        self.refresh();
        Ok(())
    }

    pub fn drop_level(&mut self, position: usize) -> Result<(), IndexError> {
        self.drop_levels(&[position])
    }

    pub fn drop_levels(&mut self, positions: &[usize]) -> Result<(), IndexError> {
        check_levels(positions, self.levels.len())?;
        let mut doomed = positions.to_vec();
        doomed.sort_unstable();
        doomed.dedup();
        if doomed.len() >= self.levels.len() {
            return Err(IndexError::CannotDropAllLevels);
        }
        for position in doomed.into_iter().rev() {
            self.levels.remove(position);
        }
        self.refresh();
        Ok(())
    }

    pub fn swap_levels(&mut self, i: usize, j: usize) -> Result<(), IndexError> {
        check_levels(&[i, j], self.levels.len())?;
        self.levels.swap(i, j);
        self.refresh();
        Ok(())
    }

    pub fn subset_levels(&mut self, positions: &[usize]) -> Result<(), IndexError> {
        if positions.is_empty() {
            return Err(IndexError::NoLevels);
        }
        check_levels(positions, self.levels.len())?;
        self.levels = positions
            .iter()
            .map(|&position| self.levels[position].clone())
            .collect();
        self.refresh();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tb_runtime::Options;

    use super::{ColLevel, Columns};
    use crate::IndexError;

    fn quiet() -> Options {
        Options::default().with_log_warnings(false)
    }

    fn two_level() -> Columns {
        Columns::new(vec![
            ColLevel::new(vec!["a", "a", "b"], "outer"),
            ColLevel::new(vec!["x", "y", "x"], "inner"),
        ])
        .expect("columns")
    }

    #[test]
    fn default_range_labels_are_stringified_positions() {
        let columns = Columns::default_range(3);
        assert_eq!(columns.levels()[0].labels(), &["0", "1", "2"]);
        assert_eq!(columns.select_label("2", &quiet()), vec![2]);
    }

    #[test]
    fn labels_at_spans_every_level() {
        let columns = two_level();
        assert_eq!(columns.labels_at(1).expect("labels"), vec!["a", "y"]);
        assert_eq!(columns.joined_label(2).expect("label"), "b | x");
        assert!(columns.labels_at(3).is_err());
    }

    #[test]
    fn select_label_searches_any_level() {
        let columns = two_level();
        assert_eq!(columns.select_label("a", &quiet()), vec![0, 1]);
        assert_eq!(columns.select_label_in(1, "x", &quiet()), vec![0, 2]);
        assert!(columns.select_label_in(4, "x", &quiet()).is_empty());
        assert_eq!(columns.select_name("inner", &quiet()), Some(1));
    }

    #[test]
    fn column_mutation_refreshes_maps() {
        let mut columns = two_level();
        columns
            .insert(0, vec!["c".to_owned(), "z".to_owned()])
            .expect("insert");
        assert_eq!(columns.select_label("a", &quiet()), vec![1, 2]);

        columns.swap(0, 3).expect("swap");
        assert_eq!(columns.select_label("c", &quiet()), vec![3]);

        columns.drop_many(&[0, 0, 1]).expect("drop");
        assert_eq!(columns.len(), 2);
        assert_eq!(columns.levels()[1].labels(), &["y", "z"]);
    }

    #[test]
    fn drop_many_is_atomic() {
        let mut columns = two_level();
        let before = columns.clone();
        assert!(columns.drop_many(&[0, 7]).is_err());
        assert_eq!(columns, before);
    }

    #[test]
    fn level_operations() {
        let mut columns = two_level();
        columns.swap_levels(0, 1).expect("swap");
        assert_eq!(columns.names(), vec!["inner", "outer"]);
        assert_eq!(columns.name_map()["outer"], vec![1]);

        let err = columns.drop_levels(&[0, 1]).expect_err("all");
        assert_eq!(err, IndexError::CannotDropAllLevels);

        columns.subset_levels(&[1]).expect("subset");
        assert_eq!(columns.num_levels(), 1);
        assert_eq!(columns.select_label("b", &quiet()), vec![2]);

        let short = ColLevel::new(vec!["only"], "short");
        assert!(matches!(
            columns.insert_level(0, short),
            Err(IndexError::LevelLengthMismatch { .. })
        ));
    }

    #[test]
    fn subset_keeps_requested_order() {
        let columns = two_level();
        let picked = columns.subset(&[2, 0]).expect("subset");
        assert_eq!(picked.levels()[0].labels(), &["b", "a"]);
        assert_eq!(picked.names(), vec!["outer", "inner"]);
    }
}
