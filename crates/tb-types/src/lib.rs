#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Text every null renders as, whatever its kind.
pub const NULL_LABEL: &str = "NaN";

/// Display format used when a datetime is stringified.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Placeholder for "nothing inferred yet"; never the kind of a built container.
    None,
    Float64,
    Int64,
    Utf8,
    Bool,
    DateTime,
    Interface,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Float64 => "float64",
            Self::Int64 => "int64",
            Self::Utf8 => "string",
            Self::Bool => "bool",
            Self::DateTime => "datetime",
            Self::Interface => "interface",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Null,
    NaN,
    NaT,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Float64(f64),
    Int64(i64),
    Utf8(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Scalar {
    /// Kind of this individual value. Nulls report `Kind::None`.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Null(_) => Kind::None,
            Self::Float64(_) => Kind::Float64,
            Self::Int64(_) => Kind::Int64,
            Self::Utf8(_) => Kind::Utf8,
            Self::Bool(_) => Kind::Bool,
            Self::DateTime(_) => Kind::DateTime,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    #[must_use]
    pub fn missing_for_kind(kind: Kind) -> Self {
        match kind {
            Kind::Float64 => Self::Null(NullKind::NaN),
            Kind::DateTime => Self::Null(NullKind::NaT),
            Kind::None | Kind::Int64 | Kind::Utf8 | Kind::Bool | Kind::Interface => {
                Self::Null(NullKind::Null)
            }
        }
    }

    /// Equality that treats any two missing values as equal.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => true,
            (false, false) => self == other,
            _ => false,
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::DateTime(v) => datetime_to_nanos(v)
                .map(|n| n as f64)
                .ok_or(TypeError::DateTimeOutOfRange { value: *v }),
            Self::Null(kind) => Err(TypeError::ValueIsMissing { kind: *kind }),
            Self::Utf8(v) => Err(TypeError::NonNumericValue {
                value: v.clone(),
                kind: Kind::Utf8,
            }),
        }
    }

    /// Total order used for sorting: nulls last, then by kind for mixed
    /// interface containers, then by value.
    #[must_use]
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Int64(a), Self::Float64(b)) => {
                (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Self::Float64(a), Self::Int64(b)) => {
                a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
            }
            (Self::Utf8(a), Self::Utf8(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(_) => f.write_str(NULL_LABEL),
            Self::Float64(v) if v.is_nan() => f.write_str(NULL_LABEL),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
            Self::Bool(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.format(DATETIME_FORMAT)),
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int64(i64::from(value))
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDateTime> for Scalar {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("conversion from {from} to {to} is not supported")]
    UnsupportedConversion { from: Kind, to: Kind },
    #[error("value {value:?} has non-numeric kind {kind}")]
    NonNumericValue { value: String, kind: Kind },
    #[error("datetime {value} cannot be represented as Unix nanoseconds")]
    DateTimeOutOfRange { value: NaiveDateTime },
    #[error("value is missing ({kind:?})")]
    ValueIsMissing { kind: NullKind },
}

// ── Null policy ────────────────────────────────────────────────────────

/// Strings treated as null when a string container is built.
pub const DEFAULT_NULL_SENTINELS: [&str; 5] = ["", "NaN", "n/a", "N/A", "nil"];

/// Type-specific null tagging rules.
///
/// Floats are null when NaN, datetimes when they equal the zero time, strings
/// when they belong to the sentinel set. Other kinds are only null when the
/// input is already `Scalar::Null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullPolicy {
    sentinels: BTreeSet<String>,
}

impl Default for NullPolicy {
    fn default() -> Self {
        Self::with_sentinels(DEFAULT_NULL_SENTINELS)
    }
}

impl NullPolicy {
    #[must_use]
    pub fn with_sentinels<I, S>(sentinels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sentinels: sentinels.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn sentinels(&self) -> &BTreeSet<String> {
        &self.sentinels
    }

    #[must_use]
    pub fn is_null_str(&self, value: &str) -> bool {
        self.sentinels.contains(value)
    }

    /// Replace a value with its kind's null marker when the policy says so.
    #[must_use]
    pub fn tag(&self, value: Scalar) -> Scalar {
        match value {
            Scalar::Float64(v) if v.is_nan() => Scalar::Null(NullKind::NaN),
            Scalar::Utf8(ref s) if self.is_null_str(s) => Scalar::Null(NullKind::Null),
            Scalar::DateTime(ref dt) if is_zero_time(dt) => Scalar::Null(NullKind::NaT),
            other => other,
        }
    }
}

/// `0001-01-01 00:00:00`, the datetime null marker.
#[must_use]
pub fn is_zero_time(value: &NaiveDateTime) -> bool {
    value.year() == 1
        && value.ordinal() == 1
        && value.num_seconds_from_midnight() == 0
        && value.nanosecond() == 0
}

// ── Kind inference ─────────────────────────────────────────────────────

/// Infer the container kind for a set of raw values.
///
/// Integers mixed with floats widen to `Float64`; any other mix falls back to
/// `Interface`. All-null or empty input yields `Float64`.
#[must_use]
pub fn infer_kind(values: &[Scalar]) -> Kind {
    let mut current = Kind::None;
    for value in values {
        let kind = value.kind();
        current = match (current, kind) {
            (_, Kind::None) => current,
            (Kind::None, k) => k,
            (a, b) if a == b => a,
            (Kind::Int64, Kind::Float64) | (Kind::Float64, Kind::Int64) => Kind::Float64,
            _ => return Kind::Interface,
        };
    }
    if current == Kind::None {
        Kind::Float64
    } else {
        current
    }
}

// ── Conversion ─────────────────────────────────────────────────────────

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Free-form datetime parsing. Returns `None` when no known layout matches.
#[must_use]
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let text = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(text, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    })
}

#[must_use]
pub fn datetime_from_nanos(nanos: i64) -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp_nanos(nanos).naive_utc()
}

#[must_use]
pub fn datetime_to_nanos(value: &NaiveDateTime) -> Option<i64> {
    value.and_utc().timestamp_nanos_opt()
}

fn float_to_i64(v: f64) -> Option<i64> {
    let truncated = v.trunc();
    if !truncated.is_finite() || truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
        return None;
    }
    Some(truncated as i64)
}

fn parse_i64(raw: &str) -> Option<i64> {
    let text = raw.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().and_then(float_to_i64))
}

fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Best-effort conversion of one value into `target`.
///
/// Never fails on content: anything that cannot be represented becomes the
/// target's null. Only `Kind::None` is rejected as a target.
pub fn convert_scalar(value: Scalar, target: Kind, policy: &NullPolicy) -> Result<Scalar, TypeError> {
    let from = value.kind();
    let missing = Scalar::missing_for_kind(target);
    if target == Kind::None {
        return Err(TypeError::UnsupportedConversion { from, to: target });
    }
    if value.is_missing() {
        return Ok(missing);
    }
    if target == Kind::Interface || from == target {
        return Ok(policy.tag(value));
    }

    let converted = match target {
        Kind::Float64 => match value {
            Scalar::Int64(v) => Some(Scalar::Float64(v as f64)),
            Scalar::Bool(v) => Some(Scalar::Float64(if v { 1.0 } else { 0.0 })),
            Scalar::Utf8(ref s) => parse_f64(s).map(Scalar::Float64),
            Scalar::DateTime(ref dt) => datetime_to_nanos(dt).map(|n| Scalar::Float64(n as f64)),
            _ => None,
        },
        Kind::Int64 => match value {
            Scalar::Float64(v) => float_to_i64(v).map(Scalar::Int64),
            Scalar::Bool(v) => Some(Scalar::Int64(i64::from(v))),
            Scalar::Utf8(ref s) => parse_i64(s).map(Scalar::Int64),
            Scalar::DateTime(ref dt) => datetime_to_nanos(dt).map(Scalar::Int64),
            _ => None,
        },
        Kind::Utf8 => Some(Scalar::Utf8(value.to_string())),
        Kind::Bool => Some(Scalar::Bool(true)),
        Kind::DateTime => match value {
            Scalar::Float64(v) => float_to_i64(v).map(|n| Scalar::DateTime(datetime_from_nanos(n))),
            Scalar::Int64(v) => Some(Scalar::DateTime(datetime_from_nanos(v))),
            Scalar::Bool(v) => Some(Scalar::DateTime(datetime_from_nanos(i64::from(v)))),
            Scalar::Utf8(ref s) => parse_datetime(s).map(Scalar::DateTime),
            _ => None,
        },
        Kind::None | Kind::Interface => None,
    };

    Ok(converted.map_or(missing, |scalar| policy.tag(scalar)))
}

// ── Null-skipping reductions ───────────────────────────────────────────

/// Reductions available for whole containers and per-group aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Std,
    Var,
    Count,
}

impl Aggregation {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::Std => "std",
            Self::Var => "var",
            Self::Count => "count",
        }
    }

    /// Apply the reduction, skipping nulls and non-numeric values.
    ///
    /// `Count` yields `Int64`; everything else yields `Float64`, NaN when
    /// there is nothing to reduce (except `Sum`, which yields 0).
    #[must_use]
    pub fn apply(self, values: &[Scalar]) -> Scalar {
        if self == Self::Count {
            let n = values.iter().filter(|v| !v.is_missing()).count();
            return Scalar::Int64(i64::try_from(n).unwrap_or(i64::MAX));
        }
        let nums = numeric_values(values);
        let out = match self {
            Self::Sum => Some(nums.iter().sum()),
            Self::Mean => mean(&nums),
            Self::Median => median(nums),
            Self::Min => nums.iter().copied().reduce(f64::min),
            Self::Max => nums.iter().copied().reduce(f64::max),
            Self::Var => variance(&nums),
            Self::Std => variance(&nums).map(f64::sqrt),
            Self::Count => None,
        };
        out.map_or(Scalar::Null(NullKind::NaN), Scalar::Float64)
    }
}

/// Finite numeric view of a value slice; nulls and strings are skipped.
#[must_use]
pub fn numeric_values(values: &[Scalar]) -> Vec<f64> {
    values
        .iter()
        .filter(|v| !v.is_missing())
        .filter_map(|v| v.to_f64().ok())
        .collect()
}

fn mean(nums: &[f64]) -> Option<f64> {
    if nums.is_empty() {
        return None;
    }
    Some(nums.iter().sum::<f64>() / nums.len() as f64)
}

fn median(mut nums: Vec<f64>) -> Option<f64> {
    if nums.is_empty() {
        return None;
    }
    nums.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = nums.len() / 2;
    if nums.len() % 2 == 0 {
        Some((nums[mid - 1] + nums[mid]) / 2.0)
    } else {
        Some(nums[mid])
    }
}

/// Population variance (ddof = 0).
fn variance(nums: &[f64]) -> Option<f64> {
    let center = mean(nums)?;
    let sum_sq: f64 = nums.iter().map(|x| (x - center).powi(2)).sum();
    Some(sum_sq / nums.len() as f64)
}
