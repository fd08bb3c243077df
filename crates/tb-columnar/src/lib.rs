#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tb_types::{Kind, NullKind, NullPolicy, Scalar, TypeError, convert_scalar, infer_kind};
use thiserror::Error;

/// Packed validity bits, one per row; `true` marks a non-null value.
#[derive(Debug, Clone, Eq)]
pub struct ValidityMask {
    words: Vec<u64>,
    len: usize,
}

impl ValidityMask {
    #[must_use]
    pub fn from_values(values: &[Scalar]) -> Self {
        let len = values.len();
        let mut words = vec![0_u64; len.div_ceil(64)];
        for (idx, value) in values.iter().enumerate() {
            if !value.is_missing() {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Self { words, len }
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        (self.words[idx / 64] >> (idx % 64)) & 1 == 1
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.get(idx))
    }

    /// Positions whose bit equals `valid`.
    #[must_use]
    pub fn positions(&self, valid: bool) -> Vec<usize> {
        self.bits()
            .enumerate()
            .filter_map(|(idx, bit)| (bit == valid).then_some(idx))
            .collect()
    }
}

impl PartialEq for ValidityMask {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.bits().eq(other.bits())
    }
}

impl Serialize for ValidityMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bits: Vec<bool> = self.bits().collect();
        bits.serialize(serializer)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("position {position} out of range for length {len}")]
    PositionOutOfRange { position: usize, len: usize },
    #[error("column length mismatch: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("cannot build a container of kind {kind}")]
    InvalidKind { kind: Kind },
    #[error(transparent)]
    Type(#[from] TypeError),
}

#[derive(Debug, Clone, Deserialize)]
struct ColumnParts {
    kind: Kind,
    values: Vec<Scalar>,
}

impl TryFrom<ColumnParts> for Column {
    type Error = ColumnError;

    /// Serialized values are already null-tagged, so only the kind is
    /// re-applied and the validity mask is derived again.
    fn try_from(parts: ColumnParts) -> Result<Self, Self::Error> {
        let policy = NullPolicy::with_sentinels(Vec::<String>::new());
        Self::new(parts.kind, parts.values, &policy)
    }
}

/// A fixed-kind, nullable, ordered sequence of values.
///
/// Every element is either a value of `kind` or that kind's null marker,
/// except in `Interface` containers which accept any concrete value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ColumnParts")]
pub struct Column {
    kind: Kind,
    values: Vec<Scalar>,
    validity: ValidityMask,
}

fn check_position(position: usize, len: usize) -> Result<(), ColumnError> {
    if position >= len {
        return Err(ColumnError::PositionOutOfRange { position, len });
    }
    Ok(())
}

/// Validate every position before anything is touched.
pub fn check_positions(positions: &[usize], len: usize) -> Result<(), ColumnError> {
    positions
        .iter()
        .try_for_each(|&position| check_position(position, len))
}

impl Column {
    /// Build a container of an explicit kind, coercing and null-tagging each
    /// value.
    pub fn new(kind: Kind, values: Vec<Scalar>, policy: &NullPolicy) -> Result<Self, ColumnError> {
        if kind == Kind::None {
            return Err(ColumnError::InvalidKind { kind });
        }
        let values = values
            .into_iter()
            .map(|value| convert_scalar(value, kind, policy))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_coerced(kind, values))
    }

    /// Build a container whose kind is inferred from the values.
    pub fn from_values(values: Vec<Scalar>, policy: &NullPolicy) -> Result<Self, ColumnError> {
        let tagged: Vec<Scalar> = values.into_iter().map(|v| policy.tag(v)).collect();
        let kind = infer_kind(&tagged);
        Self::new(kind, tagged, policy)
    }

    #[must_use]
    pub fn from_f64(values: Vec<f64>) -> Self {
        let values = values
            .into_iter()
            .map(|v| {
                if v.is_nan() {
                    Scalar::Null(NullKind::NaN)
                } else {
                    Scalar::Float64(v)
                }
            })
            .collect();
        Self::from_coerced(Kind::Float64, values)
    }

    #[must_use]
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self::from_coerced(Kind::Int64, values.into_iter().map(Scalar::Int64).collect())
    }

    #[must_use]
    pub fn from_bools(values: Vec<bool>) -> Self {
        Self::from_coerced(Kind::Bool, values.into_iter().map(Scalar::Bool).collect())
    }

    #[must_use]
    pub fn from_strings<S: Into<String>>(values: Vec<S>, policy: &NullPolicy) -> Self {
        let values = values
            .into_iter()
            .map(|v| policy.tag(Scalar::Utf8(v.into())))
            .collect();
        Self::from_coerced(Kind::Utf8, values)
    }

    #[must_use]
    pub fn from_datetimes(values: Vec<NaiveDateTime>) -> Self {
        let policy = NullPolicy::with_sentinels(Vec::<String>::new());
        let values = values
            .into_iter()
            .map(|v| policy.tag(Scalar::DateTime(v)))
            .collect();
        Self::from_coerced(Kind::DateTime, values)
    }

    /// `len` copies of the kind's null marker.
    #[must_use]
    pub fn nulls(kind: Kind, len: usize) -> Self {
        Self::from_coerced(kind, vec![Scalar::missing_for_kind(kind); len])
    }

    fn from_coerced(kind: Kind, values: Vec<Scalar>) -> Self {
        let validity = ValidityMask::from_values(&values);
        Self {
            kind,
            values,
            validity,
        }
    }

    fn refresh_validity(&mut self) {
        self.validity = ValidityMask::from_values(&self.values);
    }

    fn coerce(&self, value: Scalar, policy: &NullPolicy) -> Result<Scalar, ColumnError> {
        Ok(convert_scalar(value, self.kind, policy)?)
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
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
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Scalar> {
        self.values
    }

    #[must_use]
    pub fn value(&self, position: usize) -> Option<&Scalar> {
        self.values.get(position)
    }

    pub fn get(&self, position: usize) -> Result<&Scalar, ColumnError> {
        self.values
            .get(position)
            .ok_or(ColumnError::PositionOutOfRange {
                position,
                len: self.values.len(),
            })
    }

    #[must_use]
    pub fn validity(&self) -> &ValidityMask {
        &self.validity
    }

    /// Positions holding non-null values.
    #[must_use]
    pub fn valid(&self) -> Vec<usize> {
        self.validity.positions(true)
    }

    /// Positions holding nulls.
    #[must_use]
    pub fn null(&self) -> Vec<usize> {
        self.validity.positions(false)
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        self.validity.count_valid()
    }

    #[must_use]
    pub fn isna(&self) -> Vec<bool> {
        self.validity.bits().map(|bit| !bit).collect()
    }

    /// Stringified values, as used for label maps and group keys.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.values.iter().map(ToString::to_string).collect()
    }

    // ── Conversion ─────────────────────────────────────────────────────

    pub fn convert_to(&self, kind: Kind, policy: &NullPolicy) -> Result<Self, ColumnError> {
        Self::new(kind, self.values.clone(), policy)
    }

    pub fn convert_in_place(&mut self, kind: Kind, policy: &NullPolicy) -> Result<(), ColumnError> {
        let converted = self.convert_to(kind, policy)?;
        *self = converted;
        Ok(())
    }

    pub fn to_float64(&self, policy: &NullPolicy) -> Result<Self, ColumnError> {
        self.convert_to(Kind::Float64, policy)
    }

    pub fn to_int64(&self, policy: &NullPolicy) -> Result<Self, ColumnError> {
        self.convert_to(Kind::Int64, policy)
    }

    pub fn to_utf8(&self, policy: &NullPolicy) -> Result<Self, ColumnError> {
        self.convert_to(Kind::Utf8, policy)
    }

    pub fn to_bool(&self, policy: &NullPolicy) -> Result<Self, ColumnError> {
        self.convert_to(Kind::Bool, policy)
    }

    pub fn to_datetime(&self, policy: &NullPolicy) -> Result<Self, ColumnError> {
        self.convert_to(Kind::DateTime, policy)
    }

    pub fn to_interface(&self, policy: &NullPolicy) -> Result<Self, ColumnError> {
        self.convert_to(Kind::Interface, policy)
    }

    // ── Positional access and mutation ─────────────────────────────────

    /// New container holding the values at `positions`, in that order.
    pub fn subset(&self, positions: &[usize]) -> Result<Self, ColumnError> {
        check_positions(positions, self.len())?;
        let values = positions.iter().map(|&p| self.values[p].clone()).collect();
        Ok(Self::from_coerced(self.kind, values))
    }

    pub fn swap(&mut self, i: usize, j: usize) -> Result<(), ColumnError> {
        check_position(i, self.len())?;
        check_position(j, self.len())?;
        self.values.swap(i, j);
        self.refresh_validity();
        Ok(())
    }

    /// Insert before `position`; `position == len` appends.
    pub fn insert(
        &mut self,
        position: usize,
        value: Scalar,
        policy: &NullPolicy,
    ) -> Result<(), ColumnError> {
        check_position(position, self.len() + 1)?;
        let value = self.coerce(value, policy)?;
        self.values.insert(position, value);
        self.refresh_validity();
        Ok(())
    }

    pub fn append(&mut self, value: Scalar, policy: &NullPolicy) -> Result<(), ColumnError> {
        self.insert(self.len(), value, policy)
    }

    /// Append every value of `other`, converted to this container's kind.
    pub fn extend(&mut self, other: &Self, policy: &NullPolicy) -> Result<(), ColumnError> {
        let converted = other
            .values
            .iter()
            .map(|v| self.coerce(v.clone(), policy))
            .collect::<Result<Vec<_>, _>>()?;
        self.values.extend(converted);
        self.refresh_validity();
        Ok(())
    }

    pub fn drop(&mut self, position: usize) -> Result<(), ColumnError> {
        check_position(position, self.len())?;
        self.values.remove(position);
        self.refresh_validity();
        Ok(())
    }

    /// Drop every listed position, or nothing if any position is invalid.
    pub fn drop_many(&mut self, positions: &[usize]) -> Result<(), ColumnError> {
        check_positions(positions, self.len())?;
        let doomed: BTreeSet<usize> = positions.iter().copied().collect();
        let mut idx = 0;
        self.values.retain(|_| {
            let keep = !doomed.contains(&idx);
            idx += 1;
            keep
        });
        self.refresh_validity();
        Ok(())
    }

    pub fn set(
        &mut self,
        position: usize,
        value: Scalar,
        policy: &NullPolicy,
    ) -> Result<(), ColumnError> {
        check_position(position, self.len())?;
        self.values[position] = self.coerce(value, policy)?;
        self.refresh_validity();
        Ok(())
    }

    /// Overwrite every listed position with `value`, or nothing if any
    /// position is invalid.
    pub fn set_many(
        &mut self,
        positions: &[usize],
        value: Scalar,
        policy: &NullPolicy,
    ) -> Result<(), ColumnError> {
        check_positions(positions, self.len())?;
        let value = self.coerce(value, policy)?;
        for &position in positions {
            self.values[position] = value.clone();
        }
        self.refresh_validity();
        Ok(())
    }

    // ── Missingness and ordering ───────────────────────────────────────

    /// Replace every null with `fill`, converted to this container's kind.
    pub fn fillna(&self, fill: &Scalar, policy: &NullPolicy) -> Result<Self, ColumnError> {
        let fill = self.coerce(fill.clone(), policy)?;
        let values = self
            .values
            .iter()
            .map(|v| if v.is_missing() { fill.clone() } else { v.clone() })
            .collect();
        Ok(Self::from_coerced(self.kind, values))
    }

    /// Copy without nulls, plus the positions that were kept.
    #[must_use]
    pub fn dropna(&self) -> (Self, Vec<usize>) {
        let kept = self.valid();
        let values = kept.iter().map(|&pos| self.values[pos].clone()).collect();
        (Self::from_coerced(self.kind, values), kept)
    }

    /// Stable permutation that sorts the values, nulls last either way.
    #[must_use]
    pub fn sort_order(&self, ascending: bool) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            let (left, right) = (&self.values[a], &self.values[b]);
            match (left.is_missing(), right.is_missing()) {
                (false, false) if !ascending => left.sort_cmp(right).reverse(),
                _ => left.sort_cmp(right),
            }
        });
        order
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(left, right)| left.semantic_eq(right))
    }
}
