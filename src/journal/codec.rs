//! Type-tagged encoding of published values for the resume journal.
//!
//! Scalars carry a primitive tag (`string`, `int64`, `float64`, `bool`),
//! lists carry `[]` + element tag. Group aggregates carry a JSON string of a
//! parallel sequence of `{attribute → tag}` maps, one per element.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::{Error, Result};
use crate::core::types::{Value, ValueMap};

/// Resource type whose value is a group aggregate.
pub const GROUP_RESOURCE_TYPE: &str = crate::core::parser::TEMPLATE_TYPE;

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheRecord {
    pub name: String,
    pub resource_type: String,
    #[serde(default)]
    pub in_template: bool,
    pub value_type: String,
    pub value: serde_json::Value,
}

impl fmt::Display for CacheRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheRecord(ResourceName:{}, ResourceType:{})",
            self.name, self.resource_type
        )
    }
}

impl CacheRecord {
    pub fn new(name: &str, resource_type: &str, value: &Value, in_template: bool) -> Result<Self> {
        let value_type = match value {
            Value::Group(maps) => group_tag(name, maps)?,
            other => type_tag(other).ok_or_else(|| {
                Error::MalformedCacheRecord(format!("value of {} has no type tag", name))
            })?,
        };
        Ok(Self {
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            in_template,
            value_type,
            value: serde_json::to_value(value)?,
        })
    }

    /// Reconstruct the recorded value.
    pub fn decode(&self) -> Result<Value> {
        if self.resource_type == GROUP_RESOURCE_TYPE {
            return self.decode_group();
        }
        decode_tagged(&self.value_type, &self.value).ok_or_else(|| self.malformed())
    }

    fn decode_group(&self) -> Result<Value> {
        let tags: Vec<IndexMap<String, String>> =
            serde_json::from_str(&self.value_type).map_err(|_| self.malformed())?;
        let rows = self.value.as_array().ok_or_else(|| self.malformed())?;
        if rows.len() != tags.len() {
            return Err(self.malformed());
        }
        let mut maps = Vec::with_capacity(rows.len());
        for (row, row_tags) in rows.iter().zip(&tags) {
            let row = row.as_object().ok_or_else(|| self.malformed())?;
            if row.len() != row_tags.len() {
                return Err(self.malformed());
            }
            let mut map = ValueMap::with_capacity(row.len());
            for (key, raw) in row {
                let tag = row_tags.get(key).ok_or_else(|| self.malformed())?;
                let value = decode_tagged(tag, raw).ok_or_else(|| self.malformed())?;
                map.insert(key.clone(), value);
            }
            maps.push(map);
        }
        Ok(Value::Group(maps))
    }

    fn malformed(&self) -> Error {
        Error::MalformedCacheRecord(format!(
            "got invalid cache data for {} with value type {}",
            self, self.value_type
        ))
    }
}

/// Tag of a non-group value.
pub fn type_tag(value: &Value) -> Option<String> {
    let tag = match value {
        Value::Bool(_) => "bool",
        Value::Int(_) => "int64",
        Value::Float(_) => "float64",
        Value::Str(_) => "string",
        Value::BoolList(_) => "[]bool",
        Value::IntList(_) => "[]int64",
        Value::FloatList(_) => "[]float64",
        Value::StrList(_) => "[]string",
        Value::Group(_) => return None,
    };
    Some(tag.to_string())
}

fn group_tag(name: &str, maps: &[ValueMap]) -> Result<String> {
    let mut tags = Vec::with_capacity(maps.len());
    for map in maps {
        let mut row = IndexMap::with_capacity(map.len());
        for (key, value) in map {
            let tag = type_tag(value).ok_or_else(|| {
                Error::MalformedCacheRecord(format!("nested group {} in {}", key, name))
            })?;
            row.insert(key.clone(), tag);
        }
        tags.push(row);
    }
    Ok(serde_json::to_string(&tags)?)
}

#[derive(Clone, Copy)]
enum Prim {
    Bool,
    Int,
    Float,
    Str,
}

fn prim(tag: &str) -> Option<Prim> {
    match tag {
        "string" => Some(Prim::Str),
        "bool" => Some(Prim::Bool),
        t if t.starts_with("int") => Some(Prim::Int),
        t if t.starts_with("float") => Some(Prim::Float),
        _ => None,
    }
}

fn decode_tagged(tag: &str, raw: &serde_json::Value) -> Option<Value> {
    match tag.strip_prefix("[]") {
        Some(elem) => decode_list(prim(elem)?, raw),
        None => decode_scalar(prim(tag)?, raw),
    }
}

fn decode_scalar(p: Prim, raw: &serde_json::Value) -> Option<Value> {
    match p {
        Prim::Bool => raw.as_bool().map(Value::Bool),
        Prim::Int => raw.as_i64().map(Value::Int),
        Prim::Float => raw.as_f64().map(Value::Float),
        Prim::Str => raw.as_str().map(|s| Value::Str(s.to_string())),
    }
}

fn decode_list(p: Prim, raw: &serde_json::Value) -> Option<Value> {
    // A nil slice was written as null.
    let empty = Vec::new();
    let items = match raw {
        serde_json::Value::Null => &empty,
        other => other.as_array()?,
    };
    let v = match p {
        Prim::Bool => Value::BoolList(items.iter().map(|i| i.as_bool()).collect::<Option<_>>()?),
        Prim::Int => Value::IntList(items.iter().map(|i| i.as_i64()).collect::<Option<_>>()?),
        Prim::Float => Value::FloatList(items.iter().map(|i| i.as_f64()).collect::<Option<_>>()?),
        Prim::Str => Value::StrList(
            items
                .iter()
                .map(|i| i.as_str().map(str::to_string))
                .collect::<Option<_>>()?,
        ),
    };
    Some(v)
}
