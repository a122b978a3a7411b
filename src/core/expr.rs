//! Typed expressions with intrinsic functions.
//!
//! An expression is either a literal of its declared kind or a function call
//! (`Ref`, `Select`, `TemplateAttrElem`, `TemplateAttr`). List kinds may also
//! hold an ordered sequence of scalar sub-expressions. Evaluation is lazy:
//! nothing is resolved until [`Expr::get_value`] is called against a scope.
//!
//! Decoding mirrors CloudFormation leniency: native JSON first, then
//! numeric/boolean strings (Bool and Integer only), then a function call.
//! Unknown function names are reported as such and never masked.

use serde::de::Deserializer;
use serde::Deserialize;

use super::error::{Error, Result};
use super::scope::ValueLookup;
use super::types::{Value, ValueKind};

pub const FUNC_REF: &str = "Ref";
pub const FUNC_SELECT: &str = "Select";
pub const FUNC_TEMPLATE_ATTR_ELEM: &str = "TemplateAttrElem";
pub const FUNC_TEMPLATE_ATTR: &str = "TemplateAttr";

/// A typed expression node together with its textual declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    kind: ValueKind,
    declaration: String,
    node: Node,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Items(Vec<Expr>),
    Call(Box<Func>),
}

/// Intrinsic function call.
#[derive(Debug, Clone, PartialEq)]
pub enum Func {
    Ref(String),
    Select { index: i64, list: Expr },
    TemplateAttrElem {
        reference: String,
        attr: String,
        index: i64,
    },
    TemplateAttr { reference: String, attr: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AttrElemArgs {
    #[serde(rename = "Ref")]
    reference: String,
    attr: String,
    index: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AttrArgs {
    #[serde(rename = "Ref")]
    reference: String,
    attr: String,
}

impl Expr {
    /// Literal expression. `value` must match `kind`.
    pub fn literal(kind: ValueKind, value: Value) -> Self {
        Self {
            kind,
            declaration: value.to_string(),
            node: Node::Literal(value),
        }
    }

    /// Function-call expression of the given kind.
    pub fn call(kind: ValueKind, func: Func, declaration: impl Into<String>) -> Self {
        Self {
            kind,
            declaration: declaration.into(),
            node: Node::Call(Box::new(func)),
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn declaration(&self) -> &str {
        &self.declaration
    }

    pub fn is_call(&self) -> bool {
        matches!(self.node, Node::Call(_))
    }

    /// Decode an expression of `kind` from raw template JSON.
    pub fn decode(kind: ValueKind, raw: &serde_json::Value) -> Result<Self> {
        if kind.is_list() {
            decode_list(kind, raw)
        } else {
            decode_scalar(kind, raw)
        }
    }

    /// True if every dependency needed to evaluate is present. No side effects.
    pub fn is_ready(&self, scope: &dyn ValueLookup) -> bool {
        match &self.node {
            Node::Literal(_) => true,
            Node::Items(items) => items.iter().all(|e| e.is_ready(scope)),
            Node::Call(f) => f.is_ready(scope),
        }
    }

    /// Evaluate against `scope`, producing a value of the declared kind.
    pub fn get_value(&self, scope: &dyn ValueLookup) -> Result<Value> {
        match &self.node {
            Node::Literal(v) => Ok(v.clone()),
            Node::Items(items) => {
                let values = items
                    .iter()
                    .map(|e| e.get_value(scope))
                    .collect::<Result<Vec<_>>>()?;
                Value::list_from(self.kind.element(), values).ok_or_else(|| self.mismatch())
            }
            Node::Call(f) => f
                .evaluate(self, scope)?
                .coerce(self.kind)
                .ok_or_else(|| self.mismatch()),
        }
    }

    pub(crate) fn mismatch(&self) -> Error {
        Error::TypeMismatch {
            declaration: self.declaration.clone(),
            kind: self.kind,
        }
    }
}

impl Func {
    fn is_ready(&self, scope: &dyn ValueLookup) -> bool {
        match self {
            Self::Ref(name) => scope.lookup(name).is_some(),
            Self::Select { list, .. } => list.is_ready(scope),
            Self::TemplateAttrElem {
                reference,
                attr,
                index,
            } => scope
                .lookup(reference)
                .and_then(Value::as_group)
                .and_then(|g| usize::try_from(*index).ok().and_then(|i| g.get(i)))
                .is_some_and(|m| m.contains_key(attr)),
            Self::TemplateAttr { reference, attr } => scope
                .lookup(reference)
                .and_then(Value::as_group)
                .is_some_and(|g| g.iter().any(|m| m.contains_key(attr))),
        }
    }

    fn evaluate(&self, owner: &Expr, scope: &dyn ValueLookup) -> Result<Value> {
        match self {
            Self::Ref(name) => scope
                .lookup(name)
                .cloned()
                .ok_or_else(|| Error::MissingParameter(name.clone())),
            Self::Select { index, list } => {
                let items = list
                    .get_value(scope)?
                    .elements()
                    .ok_or_else(|| list.mismatch())?;
                usize::try_from(*index)
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .ok_or_else(|| Error::InvalidIndex {
                        index: *index,
                        declaration: list.declaration().to_string(),
                    })
            }
            Self::TemplateAttrElem {
                reference,
                attr,
                index,
            } => {
                let group = group_of(reference, owner, scope)?;
                let elem = usize::try_from(*index)
                    .ok()
                    .and_then(|i| group.get(i))
                    .ok_or_else(|| Error::InvalidIndex {
                        index: *index,
                        declaration: owner.declaration().to_string(),
                    })?;
                elem.get(attr)
                    .cloned()
                    .ok_or_else(|| Error::MissingParameter(format!("{}.{}", reference, attr)))
            }
            Self::TemplateAttr { reference, attr } => {
                let group = group_of(reference, owner, scope)?;
                let mut flat = Vec::new();
                for value in group.iter().filter_map(|m| m.get(attr)) {
                    match value.elements() {
                        Some(items) => flat.extend(items),
                        None => flat.push(value.clone()),
                    }
                }
                Value::list_from(owner.kind().element(), flat).ok_or_else(|| owner.mismatch())
            }
        }
    }

    /// Decode a function call object. Unknown names fail immediately.
    fn decode(kind: ValueKind, raw: &serde_json::Value) -> Result<Self> {
        let obj = raw.as_object().ok_or_else(|| Error::Decode {
            declaration: raw.to_string(),
            kind,
            reason: "not a function call".into(),
        })?;
        for (name, body) in obj {
            let attempt = match name.as_str() {
                FUNC_REF => body
                    .as_str()
                    .map(|s| Self::Ref(s.to_string()))
                    .ok_or_else(|| bad_call(kind, raw, "Ref expects a name")),
                FUNC_SELECT => decode_select(kind, raw, body),
                FUNC_TEMPLATE_ATTR_ELEM => serde_json::from_value::<AttrElemArgs>(body.clone())
                    .map(|a| Self::TemplateAttrElem {
                        reference: a.reference,
                        attr: a.attr,
                        index: a.index,
                    })
                    .map_err(|e| bad_call(kind, raw, &e.to_string())),
                FUNC_TEMPLATE_ATTR if !kind.is_list() => Err(bad_call(
                    kind,
                    raw,
                    "TemplateAttr requires a list kind",
                )),
                FUNC_TEMPLATE_ATTR => serde_json::from_value::<AttrArgs>(body.clone())
                    .map(|a| Self::TemplateAttr {
                        reference: a.reference,
                        attr: a.attr,
                    })
                    .map_err(|e| bad_call(kind, raw, &e.to_string())),
                other => return Err(Error::UnknownFunction(other.to_string())),
            };
            match attempt {
                Ok(f) => return Ok(f),
                Err(e @ Error::UnknownFunction(_)) => return Err(e),
                Err(_) => continue,
            }
        }
        Err(bad_call(kind, raw, "cannot decode function"))
    }
}

fn group_of<'s>(
    reference: &str,
    owner: &Expr,
    scope: &'s dyn ValueLookup,
) -> Result<&'s [crate::core::types::ValueMap]> {
    scope
        .lookup(reference)
        .ok_or_else(|| Error::MissingParameter(reference.to_string()))?
        .as_group()
        .ok_or_else(|| owner.mismatch())
}

fn bad_call(kind: ValueKind, raw: &serde_json::Value, reason: &str) -> Error {
    Error::Decode {
        declaration: raw.to_string(),
        kind,
        reason: reason.to_string(),
    }
}

fn decode_select(kind: ValueKind, raw: &serde_json::Value, body: &serde_json::Value) -> Result<Func> {
    if kind.is_list() {
        return Err(bad_call(kind, raw, "Select yields a scalar"));
    }
    let args = match body.as_array() {
        Some(a) if a.len() == 2 => a,
        _ => return Err(bad_call(kind, raw, "Select expects [index, list]")),
    };
    let index = args[0]
        .as_i64()
        .ok_or_else(|| bad_call(kind, raw, "Select index must be an integer"))?;
    let list = Expr::decode(kind.list_of(), &args[1])?;
    Ok(Func::Select { index, list })
}

/// Native JSON literal of a scalar kind.
fn native_scalar(kind: ValueKind, raw: &serde_json::Value) -> std::result::Result<Value, String> {
    let v = match kind {
        ValueKind::Bool => raw.as_bool().map(Value::Bool),
        ValueKind::Integer => raw.as_i64().map(Value::Int),
        ValueKind::String => raw.as_str().map(|s| Value::Str(s.to_string())),
        _ => None,
    };
    v.ok_or_else(|| format!("invalid type: {}, expected {}", json_type(raw), kind))
}

/// Numeric and boolean strings, as CloudFormation allows them.
fn string_scalar(kind: ValueKind, raw: &serde_json::Value) -> Option<Value> {
    let s = raw.as_str()?;
    match kind {
        ValueKind::Integer => s.parse::<i64>().ok().map(Value::Int),
        ValueKind::Bool => match s {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(Value::Bool(true)),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn decode_scalar(kind: ValueKind, raw: &serde_json::Value) -> Result<Expr> {
    let native_err = match native_scalar(kind, raw) {
        Ok(v) => return Ok(Expr::literal(kind, v)),
        Err(e) => e,
    };
    if let Some(v) = string_scalar(kind, raw) {
        return Ok(Expr::literal(kind, v));
    }
    match Func::decode(kind, raw) {
        Ok(f) => Ok(Expr::call(kind, f, raw.to_string())),
        Err(e @ Error::UnknownFunction(_)) => Err(e),
        Err(_) => Err(Error::Decode {
            declaration: raw.to_string(),
            kind,
            reason: native_err,
        }),
    }
}

fn decode_list(kind: ValueKind, raw: &serde_json::Value) -> Result<Expr> {
    if let Some(arr) = raw.as_array() {
        let items = arr
            .iter()
            .map(|r| decode_scalar(kind.element(), r))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Expr {
            kind,
            declaration: raw.to_string(),
            node: Node::Items(items),
        });
    }
    match Func::decode(kind, raw) {
        Ok(f) => return Ok(Expr::call(kind, f, raw.to_string())),
        Err(e @ Error::UnknownFunction(_)) => return Err(e),
        Err(_) => {}
    }
    // A lone scalar stands for a one-element list.
    if let Ok(item) = decode_scalar(kind.element(), raw) {
        return Ok(Expr {
            kind,
            declaration: raw.to_string(),
            node: Node::Items(vec![item]),
        });
    }
    Err(Error::Decode {
        declaration: raw.to_string(),
        kind,
        reason: format!("invalid type: {}, expected {}", json_type(raw), kind),
    })
}

fn json_type(raw: &serde_json::Value) -> &'static str {
    match raw {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ============================================================================
// Typed wrappers used as resource property fields
// ============================================================================

macro_rules! typed_expr {
    ($(#[$doc:meta])* $name:ident, $kind:expr, $out:ty, $variant:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name(Expr);

        impl $name {
            pub fn literal(value: $out) -> Self {
                Self(Expr::literal($kind, Value::$variant(value)))
            }

            pub fn expr(&self) -> &Expr {
                &self.0
            }

            pub fn is_ready(&self, scope: &dyn ValueLookup) -> bool {
                self.0.is_ready(scope)
            }

            pub fn value(&self, scope: &dyn ValueLookup) -> Result<$out> {
                match self.0.get_value(scope)? {
                    Value::$variant(v) => Ok(v),
                    _ => Err(self.0.mismatch()),
                }
            }
        }

        impl TryFrom<&serde_json::Value> for $name {
            type Error = Error;

            fn try_from(raw: &serde_json::Value) -> Result<Self> {
                Expr::decode($kind, raw).map(Self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
                let raw = serde_json::Value::deserialize(d)?;
                Expr::decode($kind, &raw)
                    .map(Self)
                    .map_err(serde::de::Error::custom)
            }
        }
    };
}

typed_expr!(
    /// Bool-kinded expression.
    BoolExpr, ValueKind::Bool, bool, Bool
);
typed_expr!(
    /// Integer-kinded expression.
    IntegerExpr, ValueKind::Integer, i64, Int
);
typed_expr!(
    /// String-kinded expression.
    StringExpr, ValueKind::String, String, Str
);
typed_expr!(BoolListExpr, ValueKind::BoolList, Vec<bool>, BoolList);
typed_expr!(IntegerListExpr, ValueKind::IntegerList, Vec<i64>, IntList);
typed_expr!(StringListExpr, ValueKind::StringList, Vec<String>, StrList);

/// Readiness of an optional property; absent properties are always ready.
pub fn opt_ready<T>(expr: &Option<T>, ready: impl Fn(&T) -> bool) -> bool {
    expr.as_ref().is_none_or(ready)
}
