use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, sync::Arc};
use uuid::Uuid;

/// Identifier of a materialized view (UUID v7).
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct ViewId(pub Uuid);

impl ViewId {
    #[must_use]
    /// Generate a fresh view identifier.
    pub fn new() -> Self {
        // UUID version 7 keeps views created later sorting after older ones.
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ViewId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Serialize for ViewId {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ViewId {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of a single row anywhere in a record tree.
///
/// Backends hand out either numeric keys or opaque strings; both are kept in
/// their textual form so `RecordId::from(42)` and `"42".parse()` are equal.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct RecordId(Arc<str>);

impl RecordId {
    /// Build an id from its textual form.
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// Borrow the textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, when the id is a plain integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self::new(value.to_string())
    }
}

impl From<i32> for RecordId {
    fn from(value: i32) -> Self {
        Self::from(i64::from(value))
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl Serialize for RecordId {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.as_int() {
            Some(n) if n.to_string() == *self.0 => s.serialize_i64(n),
            _ => s.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        d.deserialize_any(RecordIdVisitor)
    }
}

struct RecordIdVisitor;

impl Visitor<'_> for RecordIdVisitor {
    type Value = RecordId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer or string record id")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(RecordId::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(RecordId::new(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        if v.trim().is_empty() {
            return Err(E::custom("record id must not be blank"));
        }
        Ok(RecordId::new(v))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn view_id_uses_uuid_v7() {
        let id = ViewId::new();
        assert_eq!(id.0.get_version_num(), 7);
    }

    #[test]
    fn view_id_roundtrip() {
        let uuid = Uuid::now_v7();
        let parsed: ViewId = uuid.to_string().parse().expect("must parse view id");
        assert_eq!(parsed.0, uuid);
    }

    #[test]
    fn numeric_and_textual_ids_are_equal() {
        let parsed: RecordId = "42".parse().expect("infallible");
        assert_eq!(RecordId::from(42), parsed);
        assert_eq!(parsed.as_int(), Some(42));
        assert_eq!(RecordId::from("storage-7").as_int(), None);
    }

    #[test]
    fn record_id_accepts_json_numbers_and_strings() {
        let ids: Vec<RecordId> =
            serde_json::from_str(r#"[7, "hu-8"]"#).expect("must parse ids");
        assert_eq!(ids, vec![RecordId::from(7), RecordId::from("hu-8")]);
        assert!(serde_json::from_str::<RecordId>(r#""  ""#).is_err());
    }

    #[test]
    fn numeric_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&vec![RecordId::from(7), RecordId::from("007")])
            .expect("must serialize");
        assert_eq!(json, r#"[7,"007"]"#);
    }
}
