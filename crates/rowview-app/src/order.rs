//! Paging and ordering of top-level rows.

use crate::error::ConfigError;
use rowview_core::{FieldAccess, FieldValue, Record, ViewSnapshot};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Sort direction of one order key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// One key of a multi-key ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Field the rows are compared on.
    pub field: String,
    /// Direction applied to this key.
    #[serde(default)]
    pub direction: Direction,
}

impl OrderSpec {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Ascending => write!(f, "{}:asc", self.field),
            Direction::Descending => write!(f, "{}:desc", self.field),
        }
    }
}

/// Error parsing an `field[:asc|desc]` token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid order `{0}`, expected `field[:asc|desc]`")]
pub struct ParseOrderError(String);

impl FromStr for OrderSpec {
    type Err = ParseOrderError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let (field, direction) = token.split_once(':').unwrap_or((token, "asc"));
        let field = field.trim();
        if field.is_empty() {
            return Err(ParseOrderError(token.to_owned()));
        }
        let direction = match direction.trim().to_ascii_lowercase().as_str() {
            "asc" => Direction::Ascending,
            "desc" => Direction::Descending,
            _ => return Err(ParseOrderError(token.to_owned())),
        };
        Ok(Self {
            field: field.to_owned(),
            direction,
        })
    }
}

/// Validated multi-key comparator.
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    specs: Vec<OrderSpec>,
    // No declared field set: keys are checked against the loaded rows instead.
    schemaless: bool,
}

impl Comparator {
    /// Validate `specs` against the sortable fields.
    ///
    /// With an empty `sortable_fields` the keys are only checked once rows
    /// are available, see [`check_fields`](Self::check_fields).
    ///
    /// # Errors
    /// Returns [`ConfigError::UnknownField`] for a field outside `sortable_fields`.
    pub fn compile(specs: &[OrderSpec], sortable_fields: &[String]) -> Result<Self, ConfigError> {
        if !sortable_fields.is_empty()
            && let Some(spec) = specs
                .iter()
                .find(|spec| !sortable_fields.iter().any(|field| *field == spec.field))
        {
            return Err(ConfigError::UnknownField(spec.field.clone()));
        }
        Ok(Self {
            specs: specs.to_vec(),
            schemaless: sortable_fields.is_empty(),
        })
    }

    /// Reject keys that no top-level row of `snapshot` carries.
    ///
    /// Only applies to comparators compiled without sortable fields; an empty
    /// snapshot has nothing to sort and passes.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnknownField`] for the first key no row has.
    pub fn check_fields(&self, snapshot: &ViewSnapshot) -> Result<(), ConfigError> {
        if !self.schemaless || snapshot.is_empty() {
            return Ok(());
        }
        match self.specs.iter().find(|spec| {
            !snapshot
                .top_level()
                .iter()
                .any(|row| row.field_value(&spec.field).is_some())
        }) {
            Some(spec) => Err(ConfigError::UnknownField(spec.field.clone())),
            None => Ok(()),
        }
    }

    /// Returns true when no key is set.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Compare two rows key by key; the first non-equal key decides.
    pub fn compare<R: FieldAccess>(&self, a: &R, b: &R) -> Ordering {
        self.specs.iter().fold(Ordering::Equal, |acc, spec| {
            acc.then_with(|| {
                let ordering = value_of(a, &spec.field).cmp(value_of(b, &spec.field));
                match spec.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            })
        })
    }
}

fn value_of<'a, R: FieldAccess>(row: &'a R, field: &str) -> &'a FieldValue {
    const NULL: &FieldValue = &FieldValue::Null;
    row.field_value(field).unwrap_or(NULL)
}

/// Take the page `[offset, offset + length)` of the top-level rows, then sort
/// it. Rows outside the page never take part in the ordering.
pub fn page(
    snapshot: &ViewSnapshot,
    offset: usize,
    length: usize,
    comparator: &Comparator,
) -> Vec<Arc<Record>> {
    let mut rows: Vec<Arc<Record>> = snapshot
        .top_level()
        .iter()
        .skip(offset)
        .take(length)
        .cloned()
        .collect();
    if !comparator.is_empty() {
        rows.sort_by(|a, b| comparator.compare(a.as_ref(), b.as_ref()));
    }
    rows
}
