//! Immutable row tree nodes.

use crate::id::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Scalar value carried by a record field.
///
/// Variants are declared in comparison order, so values of different kinds
/// order as `Null < Bool < Int < Text`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Absent value.
    #[default]
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integral number.
    Int(i64),
    /// Free text.
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(value) => value.fmt(f),
            Self::Int(value) => value.fmt(f),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Narrow capability used by comparators and matchers to read a field by name.
pub trait FieldAccess {
    /// Value of `field`, or `None` when the row does not carry it.
    fn field_value(&self, field: &str) -> Option<&FieldValue>;
}

/// A node of the row tree: identity, field values and ordered children.
///
/// Children are shared through [`Arc`] so the flattened index of a
/// [`ViewSnapshot`](crate::ViewSnapshot) can point at the exact same instance
/// the tree holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    id: RecordId,
    fields: BTreeMap<String, FieldValue>,
    children: Vec<Arc<Record>>,
}

impl Record {
    /// Start building a record with the given identity.
    pub fn builder(id: impl Into<RecordId>) -> RecordBuilder {
        RecordBuilder {
            id: id.into(),
            fields: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Identity of this row.
    #[must_use]
    pub const fn id(&self) -> &RecordId {
        &self.id
    }

    /// All field values in name order.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Included rows, in source order.
    #[must_use]
    pub fn children(&self) -> &[Arc<Self>] {
        &self.children
    }

    /// Returns true when the row has included rows.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

impl FieldAccess for Record {
    fn field_value(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}

/// Builder for [`Record`].
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    id: RecordId,
    fields: BTreeMap<String, FieldValue>,
    children: Vec<Arc<Record>>,
}

impl RecordBuilder {
    /// Set a field; a `Null` value removes it.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let name = name.into();
        match value.into() {
            FieldValue::Null => {
                self.fields.remove(&name);
            }
            value => {
                self.fields.insert(name, value);
            }
        }
        self
    }

    /// Append an included row.
    #[must_use]
    pub fn child(mut self, child: impl Into<Arc<Record>>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append several included rows.
    #[must_use]
    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Arc<Record>>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Freeze the record.
    #[must_use]
    pub fn build(self) -> Record {
        Record {
            id: self.id,
            fields: self.fields,
            children: self.children,
        }
    }
}
