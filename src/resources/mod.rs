//! Resource implementations, one per template `Type`.
//!
//! Each resource owns its typed property expressions and its materialized
//! representation. The executor drives it through [`Resource`]; a
//! [`Registry`] maps the template's type string to a constructor.

pub mod block_volume;
pub mod disk_list;
pub mod list;
pub mod object;
pub mod pool;
pub mod token;

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;

use crate::core::error::{Error, Result};
use crate::core::scope::{Scope, ValueLookup};
use crate::core::types::{Action, Value};
use crate::transport::ApiClient;

/// Poll spacing in seconds when neither the template nor the resource sets one.
pub const DEFAULT_CHECK_INTERVAL: u64 = 3;

/// What a resource sees while one lifecycle step runs.
pub struct Env<'a> {
    pub scope: &'a Scope,
    pub api: &'a dyn ApiClient,
    pub dry_run: bool,
}

/// Lifecycle capability of a provisioned object.
///
/// Every step defaults to "not implemented" so a resource only writes the
/// steps its template actions can reach.
pub trait Resource: fmt::Debug {
    fn resource_type(&self) -> &'static str;

    /// Default poll spacing in seconds.
    fn check_interval(&self) -> u64 {
        DEFAULT_CHECK_INTERVAL
    }

    /// Whether creating this resource needs a control-plane credential.
    fn requires_credential(&self) -> bool {
        true
    }

    /// Credential-kind resources are never journaled; their representation
    /// becomes the outbound call credential.
    fn is_credential(&self) -> bool {
        false
    }

    /// Are all declared property expressions resolvable?
    fn is_ready(&self, scope: &dyn ValueLookup) -> bool;

    fn get(&mut self, _env: &Env<'_>) -> Result<()> {
        Err(self.not_implemented("get"))
    }

    fn create(&mut self, _env: &Env<'_>) -> Result<bool> {
        Err(self.not_implemented("create"))
    }

    fn is_created(&mut self, _env: &Env<'_>) -> Result<bool> {
        Err(self.not_implemented("is_created"))
    }

    fn update(&mut self, _env: &Env<'_>, _prior: &Value) -> Result<bool> {
        Err(self.not_implemented("update"))
    }

    fn is_updated(&mut self, _env: &Env<'_>) -> Result<bool> {
        Err(self.not_implemented("is_updated"))
    }

    fn delete(&mut self, _env: &Env<'_>, _prior: &Value) -> Result<bool> {
        Err(self.not_implemented("delete"))
    }

    fn is_deleted(&mut self, _env: &Env<'_>) -> Result<bool> {
        Err(self.not_implemented("is_deleted"))
    }

    /// Materialized representation; `None` until a lifecycle step set it.
    fn repr(&self) -> Option<Value>;

    fn not_implemented(&self, operation: &'static str) -> Error {
        Error::NotImplemented {
            resource_type: self.resource_type().to_string(),
            operation,
        }
    }
}

type Factory = Box<dyn Fn(Action, &serde_json::Value) -> Result<Box<dyn Resource>>>;

/// Type string → resource constructor.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every resource type this crate ships.
    pub fn builtin() -> Self {
        let mut r = Self::empty();
        r.register(token::TOKEN_TYPE, |_, p| from_properties::<token::Token>(p));
        r.register(list::INTEGER_LIST_TYPE, |_, p| {
            from_properties::<list::IntegerList>(p)
        });
        r.register(list::STRING_LIST_TYPE, |_, p| {
            from_properties::<list::StringList>(p)
        });
        r.register(pool::POOL_TYPE, |_, p| from_properties::<pool::Pool>(p));
        r.register(disk_list::DISK_LIST_TYPE, |action, p| match action {
            Action::Update => from_properties::<disk_list::DiskListUpdate>(p),
            Action::Create | Action::Get => from_properties::<disk_list::DiskList>(p),
        });
        r.register(block_volume::BLOCK_VOLUME_TYPE, |_, p| {
            from_properties::<block_volume::BlockVolume>(p)
        });
        r
    }

    pub fn register<F>(&mut self, resource_type: &str, factory: F)
    where
        F: Fn(Action, &serde_json::Value) -> Result<Box<dyn Resource>> + 'static,
    {
        self.factories
            .insert(resource_type.to_string(), Box::new(factory));
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.factories.contains_key(resource_type)
    }

    /// Instantiate `resource_type` from its raw `Properties` object.
    pub fn build(
        &self,
        resource_type: &str,
        action: Action,
        properties: &serde_json::Value,
    ) -> Result<Box<dyn Resource>> {
        let factory = self
            .factories
            .get(resource_type)
            .ok_or_else(|| Error::UnknownResourceType(resource_type.to_string()))?;
        factory(action, properties)
    }

    pub fn types(&self) -> Vec<&str> {
        let mut t: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        t.sort_unstable();
        t
    }
}

/// Decode a resource from its `Properties` object.
pub fn from_properties<T>(properties: &serde_json::Value) -> Result<Box<dyn Resource>>
where
    T: Resource + DeserializeOwned + 'static,
{
    let r: T = serde_json::from_value(properties.clone()).map_err(Error::from_properties)?;
    Ok(Box::new(r))
}

/// Readiness of optional expression fields, absent ones counting as ready.
macro_rules! all_ready {
    ($scope:expr; $($field:expr),+ $(,)?) => {
        true $(&& $crate::core::expr::opt_ready(&$field, |e| e.is_ready($scope)))+
    };
}
pub(crate) use all_ready;


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_builtin_types() {
        let r = Registry::builtin();
        assert_eq!(
            r.types(),
            vec!["BlockVolume", "DiskList", "IntegerList", "Pool", "StringList", "Token"]
        );
        assert!(r.contains("Pool"));
        assert!(!r.contains("Template"));
    }

    #[test]
    fn test_registry_unknown_type() {
        let r = Registry::builtin();
        let err = r.build("Osd", Action::Create, &json!({})).unwrap_err();
        assert!(matches!(err, Error::UnknownResourceType(ref t) if t == "Osd"));
    }

    #[test]
    fn test_registry_build_decodes_properties() {
        let r = Registry::builtin();
        let res = r
            .build("Pool", Action::Create, &json!({"Name": "p0", "Size": 3}))
            .unwrap();
        assert_eq!(res.resource_type(), "Pool");
        assert_eq!(res.check_interval(), 10);
        assert!(res.repr().is_none());
    }

    #[test]
    fn test_registry_bad_properties() {
        let r = Registry::builtin();
        assert!(r
            .build("Pool", Action::Create, &json!({"Name": {"Join": []}}))
            .is_err());
    }

    #[test]
    fn test_registry_dispatches_on_action() {
        let r = Registry::builtin();
        let scope = Scope::new();
        let api = testing::MockApi::default();
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: true,
        };
        let prior = Value::IntList(vec![4, 5]);

        let mut update = r
            .build("DiskList", Action::Update, &json!({"DiskType": "SSD"}))
            .unwrap();
        assert!(update.update(&env, &prior).unwrap());
        assert_eq!(update.repr(), Some(prior.clone()));

        let mut select = r
            .build("DiskList", Action::Create, &json!({"Num": 1}))
            .unwrap();
        assert!(select.update(&env, &prior).is_err());
        select.get(&env).unwrap();
        assert!(matches!(select.repr(), Some(Value::IntList(ref ids)) if ids.len() == 1));
    }

    #[test]
    fn test_registry_get_control_plane_objects() {
        let r = Registry::builtin();
        let scope = Scope::new();
        let api = testing::MockApi::default();
        api.respond("ListPools", json!({"pools": [{"id": 2, "name": "p0"}]}));
        api.respond(
            "ListBlockVolumes",
            json!({"block_volumes": [{"id": 6, "name": "v0"}]}),
        );
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        let mut pool = r.build("Pool", Action::Get, &json!({"Name": "p0"})).unwrap();
        pool.get(&env).unwrap();
        assert_eq!(pool.repr(), Some(Value::Int(2)));

        let mut vol = r
            .build("BlockVolume", Action::Get, &json!({"Name": "v0"}))
            .unwrap();
        vol.get(&env).unwrap();
        assert_eq!(vol.repr(), Some(Value::Int(6)));
    }

    #[test]
    fn test_resource_defaults_not_implemented() {
        let r = Registry::builtin();
        let mut res = r
            .build("IntegerList", Action::Get, &json!({"Attributes": []}))
            .unwrap();
        let scope = Scope::new();
        let api = testing::MockApi::default();
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        let err = res.get(&env).unwrap_err();
        assert!(matches!(err, Error::NotImplemented { operation: "get", .. }));
        assert!(res.update(&env, &Value::Int(1)).is_err());
        assert!(res.delete(&env, &Value::Int(1)).is_err());
        assert!(res.is_deleted(&env).is_err());
    }
}
