//! Local list computations: concatenate list expressions into one value.
//! They never touch the control plane.

use serde::Deserialize;

use super::{Env, Resource};
use crate::core::error::Result;
use crate::core::expr::{IntegerListExpr, StringListExpr};
use crate::core::scope::ValueLookup;
use crate::core::types::Value;

pub const INTEGER_LIST_TYPE: &str = "IntegerList";
pub const STRING_LIST_TYPE: &str = "StringList";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IntegerList {
    #[serde(default)]
    attributes: Vec<IntegerListExpr>,
    #[serde(skip)]
    repr: Option<Vec<i64>>,
}

impl Resource for IntegerList {
    fn resource_type(&self) -> &'static str {
        INTEGER_LIST_TYPE
    }

    fn requires_credential(&self) -> bool {
        false
    }

    fn is_ready(&self, scope: &dyn ValueLookup) -> bool {
        self.attributes.iter().all(|a| a.is_ready(scope))
    }

    fn create(&mut self, env: &Env<'_>) -> Result<bool> {
        let mut out = Vec::new();
        for attr in &self.attributes {
            out.extend(attr.value(env.scope)?);
        }
        self.repr = Some(out);
        Ok(true)
    }

    fn repr(&self) -> Option<Value> {
        self.repr.clone().map(Value::IntList)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StringList {
    #[serde(default)]
    attributes: Vec<StringListExpr>,
    #[serde(skip)]
    repr: Option<Vec<String>>,
}

impl Resource for StringList {
    fn resource_type(&self) -> &'static str {
        STRING_LIST_TYPE
    }

    fn requires_credential(&self) -> bool {
        false
    }

    fn is_ready(&self, scope: &dyn ValueLookup) -> bool {
        self.attributes.iter().all(|a| a.is_ready(scope))
    }

    fn create(&mut self, env: &Env<'_>) -> Result<bool> {
        let mut out = Vec::new();
        for attr in &self.attributes {
            out.extend(attr.value(env.scope)?);
        }
        self.repr = Some(out);
        Ok(true)
    }

    fn repr(&self) -> Option<Value> {
        self.repr.clone().map(Value::StrList)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scope::Scope;
    use crate::resources::testing::MockApi;
    use serde_json::json;

    #[test]
    fn test_list_integer_concatenates() {
        let mut scope = Scope::new();
        scope.set("osds", Value::IntList(vec![3, 4]));
        scope.set("one", Value::Int(9));
        let mut l: IntegerList = serde_json::from_value(json!({
            "Attributes": [[1, 2], {"Ref": "osds"}, {"Ref": "one"}]
        }))
        .unwrap();
        assert!(l.is_ready(&scope));
        let api = MockApi::default();
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        assert!(l.create(&env).unwrap());
        assert_eq!(l.repr(), Some(Value::IntList(vec![1, 2, 3, 4, 9])));
        assert!(api.calls.borrow().is_empty());
    }

    #[test]
    fn test_list_string_waits_for_refs() {
        let scope = Scope::new();
        let l: StringList =
            serde_json::from_value(json!({"Attributes": [{"Ref": "hosts"}]})).unwrap();
        assert!(!l.is_ready(&scope));
        assert!(!l.requires_credential());
    }

    #[test]
    fn test_list_empty_attributes() {
        let scope = Scope::new();
        let api = MockApi::default();
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: true,
        };
        let mut l: StringList = serde_json::from_value(json!({})).unwrap();
        assert!(l.create(&env).unwrap());
        assert_eq!(l.repr(), Some(Value::StrList(vec![])));
    }
}
