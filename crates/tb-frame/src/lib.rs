#![forbid(unsafe_code)]

//! Labeled one- and two-dimensional containers.
//!
//! Every structural operation comes in two forms: a copy-returning method on
//! `&self`, and an in-place method on the handle returned by `in_place()`.
//! The copy form clones the receiver and runs the in-place form on the clone.

use serde::{Deserialize, Serialize};
use tb_columnar::{Column, ColumnError};
use tb_index::{ColLevel, Columns, Index, IndexError, Level};
use tb_types::{Kind, NullPolicy, Scalar, TypeError};
use thiserror::Error;

mod frame;
mod series;

pub use frame::{DataFrame, DataFrameInPlace};
pub use series::{Series, SeriesInPlace};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    /// Values and row labels disagree on length.
    #[error("values ({values}) and index ({index}) out of alignment")]
    Misaligned { values: usize, index: usize },
    #[error("{values} value columns but {labels} column labels")]
    ColumnsMisaligned { values: usize, labels: usize },
    #[error("length mismatch: expected {expected}, got {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("expected {expected} row values (one per column), got {found}")]
    RowWidthMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl FrameError {
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Index(err) if err.is_soft())
    }

    /// True for a rejected row, column or label position.
    #[must_use]
    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            Self::Column(ColumnError::PositionOutOfRange { .. })
                | Self::Index(IndexError::Column(ColumnError::PositionOutOfRange { .. }))
                | Self::Index(IndexError::LevelOutOfRange { .. })
        )
    }
}

/// Construction configuration for [`Series`] and [`DataFrame`].
///
/// Empty `index` means a default `0..n` range; empty `columns` means labels
/// `"0"..="n-1"`. One inner vector per level in both cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: Vec<Vec<Scalar>>,
    pub index_names: Vec<String>,
    pub columns: Vec<Vec<String>>,
    pub column_names: Vec<String>,
    /// Force every value container to this kind instead of inferring it.
    pub kind: Option<Kind>,
    pub name: String,
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_index_level<I, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.index.push(labels.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_index_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_column_level<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.push(labels.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub(crate) fn build_column(
        &self,
        values: Vec<Scalar>,
        policy: &NullPolicy,
    ) -> Result<Column, FrameError> {
        let column = match self.kind {
            Some(kind) => Column::new(kind, values, policy)?,
            None => Column::from_values(values, policy)?,
        };
        Ok(column)
    }

    pub(crate) fn build_index(&self, len: usize, policy: &NullPolicy) -> Result<Index, FrameError> {
        let level_name = |position: usize| {
            self.index_names
                .get(position)
                .cloned()
                .unwrap_or_default()
        };
        let index = if self.index.is_empty() {
            let mut index = Index::default_range(len);
            index.in_place().set_level_name(0, &level_name(0))?;
            index
        } else {
            let levels = self
                .index
                .iter()
                .enumerate()
                .map(|(position, labels)| {
                    Level::from_values(labels.clone(), level_name(position), policy)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Index::new(levels)?
        };
        if index.len() != len {
            return Err(FrameError::LengthMismatch {
                expected: len,
                found: index.len(),
            });
        }
        Ok(index)
    }

    pub(crate) fn build_columns(&self, len: usize) -> Result<Columns, FrameError> {
        let level_name = |position: usize| {
            self.column_names
                .get(position)
                .cloned()
                .unwrap_or_default()
        };
        let columns = if self.columns.is_empty() {
            let labels: Vec<String> = (0..len).map(|i| i.to_string()).collect();
            Columns::new(vec![ColLevel::new(labels, level_name(0))])?
        } else {
            let levels = self
                .columns
                .iter()
                .enumerate()
                .map(|(position, labels)| ColLevel::new(labels.clone(), level_name(position)))
                .collect();
            Columns::new(levels)?
        };
        if columns.len() != len {
            return Err(FrameError::LengthMismatch {
                expected: len,
                found: columns.len(),
            });
        }
        Ok(columns)
    }
}

pub(crate) fn check_alignment(values: &Column, index: &Index) -> Result<(), FrameError> {
    index.ensure_aligned()?;
    if values.len() != index.len() {
        return Err(FrameError::Misaligned {
            values: values.len(),
            index: index.len(),
        });
    }
    Ok(())
}
