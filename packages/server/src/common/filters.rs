//! Opaque filter expressions forwarded verbatim to the search collaborator.
//!
//! Absence of a filter is an explicit variant rather than an empty JSON
//! object, so merging or copying definitions can never silently lose the
//! distinction between "no filter" and "filter that matches nothing".

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A structured filter expression (tree of field -> operator -> value).
///
/// The expression is never interpreted here; it is carried through to the
/// search collaborator untouched. `null` and `{}` on the wire both map to
/// [`Filters::None`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filters {
    #[default]
    None,
    Expr(Value),
}

impl Filters {
    pub fn from_value(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Filters::None,
            Some(Value::Object(ref map)) if map.is_empty() => Filters::None,
            Some(value) => Filters::Expr(value),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Filters::None)
    }

    /// The wire representation: the expression itself, or `{}` when absent.
    pub fn to_query_value(&self) -> Value {
        match self {
            Filters::None => Value::Object(serde_json::Map::new()),
            Filters::Expr(value) => value.clone(),
        }
    }
}

impl Serialize for Filters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_query_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(Filters::from_value(value))
    }
}
