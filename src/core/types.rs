//! Value model shared by templates, expressions, the scope and the journal.
//!
//! A [`Value`] is the materialized representation of a resource or parameter.
//! It is a closed set of variants, each with an explicit journal type tag, so
//! that replaying the journal never needs runtime type introspection.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name → value map; one per scope, and one per element of a group aggregate.
pub type ValueMap = IndexMap<String, Value>;

// ============================================================================
// Value kinds (declared expression / context / parameter types)
// ============================================================================

/// Declared kind of an expression, template context or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Integer,
    String,
    BoolList,
    IntegerList,
    StringList,
}

impl ValueKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Bool" => Some(Self::Bool),
            "Integer" => Some(Self::Integer),
            "String" => Some(Self::String),
            "BoolList" => Some(Self::BoolList),
            "IntegerList" => Some(Self::IntegerList),
            "StringList" => Some(Self::StringList),
            _ => None,
        }
    }

    pub fn is_list(self) -> bool {
        matches!(self, Self::BoolList | Self::IntegerList | Self::StringList)
    }

    /// Element kind of a list kind; scalars are their own element kind.
    pub fn element(self) -> Self {
        match self {
            Self::BoolList => Self::Bool,
            Self::IntegerList => Self::Integer,
            Self::StringList => Self::String,
            scalar => scalar,
        }
    }

    /// List kind whose elements are of this kind.
    pub fn list_of(self) -> Self {
        match self {
            Self::Bool => Self::BoolList,
            Self::Integer => Self::IntegerList,
            Self::String => Self::StringList,
            list => list,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "Bool",
            Self::Integer => "Integer",
            Self::String => "String",
            Self::BoolList => "BoolList",
            Self::IntegerList => "IntegerList",
            Self::StringList => "StringList",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Values
// ============================================================================

/// A materialized value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    BoolList(Vec<bool>),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
    /// Aggregate of a template group: one scope map per context binding.
    Group(Vec<ValueMap>),
}

impl Value {
    /// Whether this value satisfies the declared kind exactly.
    pub fn is_kind(&self, kind: ValueKind) -> bool {
        matches!(
            (self, kind),
            (Self::Bool(_), ValueKind::Bool)
                | (Self::Int(_), ValueKind::Integer)
                | (Self::Str(_), ValueKind::String)
                | (Self::BoolList(_), ValueKind::BoolList)
                | (Self::IntList(_), ValueKind::IntegerList)
                | (Self::StrList(_), ValueKind::StringList)
        )
    }

    /// Split a list value into scalar values. Scalars and groups yield `None`.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Self::BoolList(v) => Some(v.iter().copied().map(Self::Bool).collect()),
            Self::IntList(v) => Some(v.iter().copied().map(Self::Int).collect()),
            Self::FloatList(v) => Some(v.iter().copied().map(Self::Float).collect()),
            Self::StrList(v) => Some(v.iter().cloned().map(Self::Str).collect()),
            _ => None,
        }
    }

    /// Build a list of `kind` from scalar elements. Returns `None` if any
    /// element is not of the element kind.
    pub fn list_from(kind: ValueKind, items: Vec<Value>) -> Option<Value> {
        match kind.list_of() {
            ValueKind::BoolList => items
                .into_iter()
                .map(|v| match v {
                    Self::Bool(b) => Some(b),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Self::BoolList),
            ValueKind::IntegerList => items
                .into_iter()
                .map(|v| match v {
                    Self::Int(i) => Some(i),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Self::IntList),
            _ => items
                .into_iter()
                .map(|v| match v {
                    Self::Str(s) => Some(s),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Self::StrList),
        }
    }

    /// Coerce a function result to the declared kind, upgrading a lone scalar
    /// to a one-element list when a list is declared.
    pub fn coerce(self, kind: ValueKind) -> Option<Value> {
        if self.is_kind(kind) {
            return Some(self);
        }
        if kind.is_list() && self.is_kind(kind.element()) {
            return Self::list_from(kind, vec![self]);
        }
        None
    }

    /// Strict decode of a plain JSON literal of `kind` (no functions, no
    /// string fallbacks).
    pub fn from_json(kind: ValueKind, raw: &serde_json::Value) -> Option<Value> {
        match kind {
            ValueKind::Bool => raw.as_bool().map(Self::Bool),
            ValueKind::Integer => raw.as_i64().map(Self::Int),
            ValueKind::String => raw.as_str().map(|s| Self::Str(s.to_string())),
            list => {
                let items = raw
                    .as_array()?
                    .iter()
                    .map(|i| Self::from_json(list.element(), i))
                    .collect::<Option<Vec<_>>>()?;
                Self::list_from(list, items)
            }
        }
    }

    pub fn as_group(&self) -> Option<&[ValueMap]> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

// ============================================================================
// Resource actions
// ============================================================================

/// Lifecycle action declared for a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[default]
    Create,
    Update,
    Get,
}

impl Action {
    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update => "updated",
            Self::Get => "fetched",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Get => write!(f, "get"),
        }
    }
}
