//! Storage pool. Reuses an existing pool of the same name, otherwise creates
//! one and polls until the cluster reports it active.

use serde::Deserialize;
use serde_json::{json, Map, Value as Json};

use super::object::{fake_id, ApiBinding};
use super::{all_ready, Env, Resource};
use crate::core::error::{Error, Result};
use crate::core::expr::{IntegerExpr, IntegerListExpr, StringExpr};
use crate::core::scope::ValueLookup;
use crate::core::types::Value;

pub const POOL_TYPE: &str = "Pool";

const BINDING: ApiBinding = ApiBinding {
    list: "ListPools",
    get: "GetPool",
    create: "CreatePool",
    id_param: "pool_id",
    record_key: "pool",
    records_key: "pools",
};

const DEFAULT_POOL_ROLE: &str = "data";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pool {
    #[serde(default)]
    name: Option<StringExpr>,
    #[serde(default)]
    pool_name: Option<StringExpr>,
    #[serde(default)]
    coding_chunk_num: Option<IntegerExpr>,
    #[serde(default)]
    data_chunk_num: Option<IntegerExpr>,
    #[serde(default)]
    failure_domain_type: Option<StringExpr>,
    #[serde(default, rename = "OsdIDs", alias = "OsdIds")]
    osd_ids: Option<IntegerListExpr>,
    #[serde(default)]
    pool_type: Option<StringExpr>,
    #[serde(default)]
    pool_role: Option<StringExpr>,
    #[serde(default, rename = "ProtectionDomainID", alias = "ProtectionDomainId")]
    protection_domain_id: Option<IntegerExpr>,
    #[serde(default)]
    size: Option<IntegerExpr>,
    #[serde(skip)]
    id: Option<i64>,
}

impl Pool {
    fn create_request(&self, name: &str, scope: &dyn ValueLookup) -> Result<Json> {
        let mut pool = Map::new();
        pool.insert("name".into(), json!(name));
        if let Some(e) = &self.pool_name {
            pool.insert("pool_name".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.coding_chunk_num {
            pool.insert("coding_chunk_num".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.data_chunk_num {
            pool.insert("data_chunk_num".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.failure_domain_type {
            pool.insert("failure_domain_type".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.osd_ids {
            pool.insert("osd_ids".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.pool_type {
            pool.insert("pool_type".into(), json!(e.value(scope)?));
        }
        let role = match &self.pool_role {
            Some(e) => e.value(scope)?,
            None => DEFAULT_POOL_ROLE.to_string(),
        };
        pool.insert("pool_role".into(), json!(role));
        if let Some(e) = &self.protection_domain_id {
            pool.insert("protection_domain_id".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.size {
            pool.insert("size".into(), json!(e.value(scope)?));
        }
        Ok(json!({ "pool": pool }))
    }

    fn name_expr(&self) -> Result<&StringExpr> {
        self.name
            .as_ref()
            .ok_or_else(|| Error::MissingParameter(format!("{}.Name", POOL_TYPE)))
    }

    fn require_id(&self) -> Result<i64> {
        self.id
            .ok_or_else(|| Error::Transport("pool has no id yet".into()))
    }
}

impl Resource for Pool {
    fn resource_type(&self) -> &'static str {
        POOL_TYPE
    }

    fn check_interval(&self) -> u64 {
        10
    }

    fn is_ready(&self, scope: &dyn ValueLookup) -> bool {
        all_ready!(scope;
            self.coding_chunk_num,
            self.data_chunk_num,
            self.failure_domain_type,
            self.name,
            self.pool_name,
            self.osd_ids,
            self.pool_type,
            self.pool_role,
            self.protection_domain_id,
            self.size,
        )
    }

    fn get(&mut self, env: &Env<'_>) -> Result<()> {
        let name = self.name_expr()?;
        if env.dry_run {
            self.id = Some(fake_id());
            return Ok(());
        }
        let name = name.value(env.scope)?;
        self.id = Some(BINDING.get_by_name(env, &name)?);
        Ok(())
    }

    fn create(&mut self, env: &Env<'_>) -> Result<bool> {
        let name = self.name_expr()?;
        if env.dry_run {
            self.id = Some(fake_id());
            return Ok(true);
        }
        let name = name.value(env.scope)?;
        if let Some(id) = BINDING.find_by_name(env, &name)? {
            self.id = Some(id);
            return Ok(false);
        }
        let req = self.create_request(&name, env.scope)?;
        let (id, _) = BINDING.create(env, &req)?;
        self.id = Some(id);
        Ok(false)
    }

    fn is_created(&mut self, env: &Env<'_>) -> Result<bool> {
        BINDING.poll(env, self.require_id()?)
    }

    fn repr(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scope::Scope;
    use crate::resources::testing::MockApi;

    fn pool(props: Json) -> Pool {
        serde_json::from_value(props).unwrap()
    }

    #[test]
    fn test_pool_create_new_then_poll() {
        let mut scope = Scope::new();
        scope.set("osds", Value::IntList(vec![1, 2, 3]));
        let mut p = pool(json!({"Name": "pool0", "OsdIDs": {"Ref": "osds"}, "Size": 3}));
        assert!(p.is_ready(&scope));

        let api = MockApi::with_token("t");
        api.respond("ListPools", json!({"pools": []}));
        api.respond("CreatePool", json!({"pool": {"id": 11, "status": "creating"}}));
        api.respond("GetPool", json!({"pool": {"id": 11, "status": "creating"}}));
        api.respond("GetPool", json!({"pool": {"id": 11, "status": "active"}}));
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        assert!(!p.create(&env).unwrap());
        assert_eq!(p.repr(), Some(Value::Int(11)));
        assert!(!p.is_created(&env).unwrap());
        assert!(p.is_created(&env).unwrap());

        let calls = api.calls.borrow();
        let body = calls[1].body.as_ref().unwrap();
        assert_eq!(body["pool"]["osd_ids"], json!([1, 2, 3]));
        assert_eq!(body["pool"]["pool_role"], "data");
        assert!(body["pool"].get("pool_type").is_none());
    }

    #[test]
    fn test_pool_reuses_existing_by_name() {
        let scope = Scope::new();
        let mut p = pool(json!({"Name": "pool0"}));
        let api = MockApi::with_token("t");
        api.respond("ListPools", json!({"pools": [{"id": 5, "name": "pool0"}]}));
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        assert!(!p.create(&env).unwrap());
        assert_eq!(p.repr(), Some(Value::Int(5)));
        assert_eq!(api.operations(), vec!["ListPools"]);
    }

    #[test]
    fn test_pool_get_existing() {
        let mut scope = Scope::new();
        scope.set("pool_name", Value::Str("pool0".into()));
        let mut p = pool(json!({"Name": {"Ref": "pool_name"}}));
        let api = MockApi::default();
        api.respond("ListPools", json!({"pools": [{"id": 8, "name": "pool0"}]}));
        api.respond("ListPools", json!({"pools": []}));
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        p.get(&env).unwrap();
        assert_eq!(p.repr(), Some(Value::Int(8)));
        assert!(p.get(&env).is_err());
        assert_eq!(api.operations(), vec!["ListPools", "ListPools"]);
    }

    #[test]
    fn test_pool_requires_name() {
        let scope = Scope::new();
        let api = MockApi::with_token("t");
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        let mut p = pool(json!({"Size": 1}));
        assert!(matches!(p.create(&env), Err(Error::MissingParameter(_))));
    }

    #[test]
    fn test_pool_failed_status() {
        let scope = Scope::new();
        let api = MockApi::with_token("t");
        api.respond("GetPool", json!({"pool": {"id": 2, "status": "error"}}));
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        let mut p = pool(json!({"Name": "x"}));
        p.id = Some(2);
        assert!(p.is_created(&env).is_err());
    }

    #[test]
    fn test_pool_dry_run_fabricates_id() {
        let scope = Scope::new();
        let api = MockApi::default();
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: true,
        };
        let mut p = pool(json!({"Name": "x"}));
        assert!(p.create(&env).unwrap());
        assert!(matches!(p.repr(), Some(Value::Int(id)) if id > 0));
        assert!(api.calls.borrow().is_empty());
    }
}
