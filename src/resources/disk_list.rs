//! Disk selection and bulk disk updates.
//!
//! `Create` and `Get` list the cluster's disks and keep the ids of active
//! disks passing every filter. An `Update` entry of the same type patches
//! each disk of the list already published under its name.

use serde::Deserialize;
use serde_json::{json, Map, Value as Json};
use tracing::debug;

use super::object::fake_id;
use super::{all_ready, Env, Resource};
use crate::core::error::{Error, Result};
use crate::core::expr::{BoolExpr, IntegerExpr, IntegerListExpr, StringExpr};
use crate::core::scope::ValueLookup;
use crate::core::types::Value;

pub const DISK_LIST_TYPE: &str = "DiskList";

const LIST_DISKS: &str = "ListDisks";
const UPDATE_DISK: &str = "UpdateDisk";
const DISK_ID_PARAM: &str = "disk_id";
const RECORDS_KEY: &str = "disks";
const ACTIVE: &str = "active";
const GIB: i64 = 1 << 30;
const DRY_RUN_DISKS: i64 = 2;

#[derive(Debug, Deserialize)]
struct DiskRecord {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    bytes: i64,
    #[serde(default)]
    device: String,
    #[serde(default)]
    disk_type: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    is_cache: bool,
    #[serde(default)]
    status: String,
    #[serde(default)]
    wwid: String,
    #[serde(default)]
    host: Option<HostRef>,
}

#[derive(Debug, Deserialize)]
struct HostRef {
    id: i64,
}

/// Ids of the disks matching a set of filters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiskList {
    #[serde(default)]
    used: Option<BoolExpr>,
    #[serde(default)]
    device: Option<StringExpr>,
    #[serde(default)]
    disk_type: Option<StringExpr>,
    /// Substring of the disk model.
    #[serde(default)]
    model: Option<StringExpr>,
    #[serde(default, rename = "MinSizeGB")]
    min_size_gb: Option<IntegerExpr>,
    #[serde(default, rename = "MaxSizeGB")]
    max_size_gb: Option<IntegerExpr>,
    #[serde(default, rename = "HostIDs", alias = "HostIds")]
    host_ids: Option<IntegerListExpr>,
    /// Exact number of disks to keep; fewer matches is an error.
    #[serde(default)]
    num: Option<IntegerExpr>,
    #[serde(default)]
    num_per_host: Option<IntegerExpr>,
    #[serde(default)]
    is_cache: Option<BoolExpr>,
    #[serde(default)]
    status: Option<StringExpr>,
    /// Substring of the disk WWID.
    #[serde(default, rename = "WWID", alias = "Wwid")]
    wwid: Option<StringExpr>,
    #[serde(skip)]
    repr: Option<Vec<i64>>,
}

impl DiskList {
    fn select(&self, env: &Env<'_>) -> Result<Vec<i64>> {
        if env.dry_run {
            return self.fake_select(env.scope);
        }
        let mut ids = Vec::new();
        match &self.host_ids {
            None => ids = self.list_host(env, None)?,
            Some(hosts) => {
                for host in hosts.value(env.scope)? {
                    ids.extend(self.list_host(env, Some(host))?);
                }
            }
        }
        if let Some(num) = &self.num {
            let num = num.value(env.scope)?;
            let wanted = usize::try_from(num).unwrap_or(0);
            if ids.len() < wanted {
                return Err(Error::Transport(format!("failed to get {} valid disks", num)));
            }
            ids.truncate(wanted);
        }
        Ok(ids)
    }

    fn fake_select(&self, scope: &dyn ValueLookup) -> Result<Vec<i64>> {
        let count = match (&self.host_ids, &self.num) {
            (Some(hosts), _) => DRY_RUN_DISKS * hosts.value(scope)?.len() as i64,
            (None, Some(num)) => num.value(scope)?,
            (None, None) => DRY_RUN_DISKS,
        };
        Ok((0..count).map(|_| fake_id()).collect())
    }

    /// Active matching disks, optionally restricted to one host.
    fn list_host(&self, env: &Env<'_>, host: Option<i64>) -> Result<Vec<i64>> {
        let mut query = Vec::new();
        if let Some(used) = &self.used {
            query.push(("used", used.value(env.scope)?.to_string()));
        }
        if let Some(host) = host {
            query.push(("host_id", host.to_string()));
        }
        query.push(("limit", "-1".to_string()));

        let body = env.api.call(LIST_DISKS, None, &[], &query)?;
        let mut doc: Json = serde_json::from_slice(&body)?;
        let records = doc
            .get_mut(RECORDS_KEY)
            .map(Json::take)
            .ok_or_else(|| Error::Transport(format!("key {} not found in records data", RECORDS_KEY)))?;
        let disks: Vec<DiskRecord> = serde_json::from_value(records)?;

        let per_host_limit = match &self.num_per_host {
            Some(e) => Some(e.value(env.scope)?),
            None => None,
        };
        let mut per_host = std::collections::HashMap::<i64, i64>::new();
        let mut ids = Vec::new();
        for disk in &disks {
            if !self.matches(disk, env.scope)? {
                continue;
            }
            if disk.status != ACTIVE {
                debug!("disk {} in status {} is skipped", disk.id, disk.status);
                continue;
            }
            if let Some(limit) = per_host_limit {
                let Some(host) = &disk.host else { continue };
                let taken = per_host.entry(host.id).or_default();
                if *taken >= limit {
                    continue;
                }
                *taken += 1;
            }
            ids.push(disk.id);
        }
        Ok(ids)
    }

    fn matches(&self, disk: &DiskRecord, scope: &dyn ValueLookup) -> Result<bool> {
        if let Some(e) = &self.device {
            if disk.device != e.value(scope)? {
                return Ok(false);
            }
        }
        if let Some(e) = &self.disk_type {
            if disk.disk_type != e.value(scope)? {
                return Ok(false);
            }
        }
        if let Some(e) = &self.model {
            if !disk.model.contains(&e.value(scope)?) {
                return Ok(false);
            }
        }
        if let Some(e) = &self.min_size_gb {
            if disk.bytes < e.value(scope)?.saturating_mul(GIB) {
                return Ok(false);
            }
        }
        if let Some(e) = &self.max_size_gb {
            if disk.bytes > e.value(scope)?.saturating_mul(GIB) {
                return Ok(false);
            }
        }
        if let Some(e) = &self.is_cache {
            if disk.is_cache != e.value(scope)? {
                return Ok(false);
            }
        }
        if let Some(e) = &self.status {
            if disk.status != e.value(scope)? {
                return Ok(false);
            }
        }
        if let Some(e) = &self.wwid {
            if !disk.wwid.contains(&e.value(scope)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Resource for DiskList {
    fn resource_type(&self) -> &'static str {
        DISK_LIST_TYPE
    }

    fn is_ready(&self, scope: &dyn ValueLookup) -> bool {
        all_ready!(scope;
            self.used,
            self.device,
            self.disk_type,
            self.model,
            self.min_size_gb,
            self.max_size_gb,
            self.host_ids,
            self.num,
            self.num_per_host,
            self.is_cache,
            self.status,
            self.wwid,
        )
    }

    fn get(&mut self, env: &Env<'_>) -> Result<()> {
        self.repr = Some(self.select(env)?);
        Ok(())
    }

    fn create(&mut self, env: &Env<'_>) -> Result<bool> {
        self.repr = Some(self.select(env)?);
        Ok(true)
    }

    fn repr(&self) -> Option<Value> {
        self.repr.clone().map(Value::IntList)
    }
}

/// Patch applied to every disk of a previously selected list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiskListUpdate {
    #[serde(default)]
    disk_type: Option<StringExpr>,
    #[serde(default)]
    lighting_status: Option<StringExpr>,
    #[serde(skip)]
    repr: Option<Vec<i64>>,
}

impl DiskListUpdate {
    fn update_request(&self, scope: &dyn ValueLookup) -> Result<Json> {
        let mut disk = Map::new();
        if let Some(e) = &self.disk_type {
            disk.insert("disk_type".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.lighting_status {
            disk.insert("lighting_status".into(), json!(e.value(scope)?));
        }
        Ok(json!({ "disk": disk }))
    }
}

impl Resource for DiskListUpdate {
    fn resource_type(&self) -> &'static str {
        DISK_LIST_TYPE
    }

    fn is_ready(&self, scope: &dyn ValueLookup) -> bool {
        all_ready!(scope; self.disk_type, self.lighting_status)
    }

    fn update(&mut self, env: &Env<'_>, prior: &Value) -> Result<bool> {
        let Value::IntList(ids) = prior else {
            return Err(Error::Template(format!(
                "{} update expects a list of disk ids, got {}",
                DISK_LIST_TYPE, prior
            )));
        };
        if !env.dry_run {
            let req = self.update_request(env.scope)?;
            for id in ids {
                env.api
                    .call(UPDATE_DISK, Some(&req), &[(DISK_ID_PARAM, id.to_string())], &[])?;
            }
        }
        self.repr = Some(ids.clone());
        Ok(true)
    }

    fn repr(&self) -> Option<Value> {
        self.repr.clone().map(Value::IntList)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scope::Scope;
    use crate::resources::testing::MockApi;

    fn disks() -> Json {
        json!({"disks": [
            {"id": 1, "bytes": 500 * GIB, "disk_type": "HDD", "status": "active", "host": {"id": 7}},
            {"id": 2, "bytes": 100 * GIB, "disk_type": "SSD", "status": "active", "host": {"id": 7},
             "model": "INTEL SSDSC2", "wwid": "0x5000c5"},
            {"id": 3, "bytes": 800 * GIB, "disk_type": "HDD", "status": "active", "host": {"id": 7}},
            {"id": 4, "bytes": 800 * GIB, "disk_type": "HDD", "status": "offline", "host": {"id": 8}},
            {"id": 5, "bytes": 800 * GIB, "disk_type": "HDD", "status": "active", "host": {"id": 8}}
        ]})
    }

    fn list(props: Json) -> DiskList {
        serde_json::from_value(props).unwrap()
    }

    #[test]
    fn test_disk_list_filters_active_disks() {
        let scope = Scope::new();
        let api = MockApi::with_token("t");
        api.respond("ListDisks", disks());
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        let mut l = list(json!({"DiskType": "HDD", "MinSizeGB": 200, "Used": false}));
        assert!(l.create(&env).unwrap());
        assert_eq!(l.repr(), Some(Value::IntList(vec![1, 3, 5])));

        let calls = api.calls.borrow();
        assert_eq!(
            calls[0].query,
            vec![
                ("used".to_string(), "false".to_string()),
                ("limit".to_string(), "-1".to_string())
            ]
        );
    }

    #[test]
    fn test_disk_list_substring_filters() {
        let scope = Scope::new();
        let api = MockApi::with_token("t");
        api.respond("ListDisks", disks());
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        let mut l = list(json!({"Model": "INTEL", "WWID": "5000"}));
        l.get(&env).unwrap();
        assert_eq!(l.repr(), Some(Value::IntList(vec![2])));
    }

    #[test]
    fn test_disk_list_per_host_and_num() {
        let mut scope = Scope::new();
        scope.set("hosts", Value::IntList(vec![7, 8]));
        let api = MockApi::with_token("t");
        api.respond(
            "ListDisks",
            json!({"disks": [
                {"id": 1, "status": "active", "host": {"id": 7}},
                {"id": 2, "status": "active", "host": {"id": 7}},
                {"id": 9, "status": "active"}
            ]}),
        );
        api.respond(
            "ListDisks",
            json!({"disks": [
                {"id": 4, "status": "offline", "host": {"id": 8}},
                {"id": 5, "status": "active", "host": {"id": 8}},
                {"id": 6, "status": "active", "host": {"id": 8}}
            ]}),
        );
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        let mut l = list(json!({"HostIDs": {"Ref": "hosts"}, "NumPerHost": 1, "Num": 2}));
        assert!(l.is_ready(&scope));
        assert!(l.create(&env).unwrap());
        assert_eq!(l.repr(), Some(Value::IntList(vec![1, 5])));
        let calls = api.calls.borrow();
        assert_eq!(calls[0].query[0], ("host_id".to_string(), "7".to_string()));
        assert_eq!(calls[1].query[0], ("host_id".to_string(), "8".to_string()));
    }

    #[test]
    fn test_disk_list_too_few_disks() {
        let scope = Scope::new();
        let api = MockApi::with_token("t");
        api.respond("ListDisks", disks());
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        let mut l = list(json!({"DiskType": "SSD", "Num": 2}));
        let err = l.create(&env).unwrap_err();
        assert!(err.to_string().contains("failed to get 2 valid disks"));
    }

    #[test]
    fn test_disk_list_dry_run() {
        let mut scope = Scope::new();
        scope.set("hosts", Value::IntList(vec![7, 8, 9]));
        let api = MockApi::default();
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: true,
        };
        let mut l = list(json!({"HostIDs": {"Ref": "hosts"}}));
        l.create(&env).unwrap();
        assert_eq!(l.repr().and_then(|v| v.elements()).map(|e| e.len()), Some(6));

        let mut l = list(json!({"Num": 3}));
        l.create(&env).unwrap();
        assert_eq!(l.repr().and_then(|v| v.elements()).map(|e| e.len()), Some(3));
        assert!(api.calls.borrow().is_empty());
    }

    #[test]
    fn test_disk_list_update_patches_each_disk() {
        let scope = Scope::new();
        let api = MockApi::with_token("t");
        api.respond("UpdateDisk", json!({"disk": {"id": 1}}));
        api.respond("UpdateDisk", json!({"disk": {"id": 3}}));
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        let mut u: DiskListUpdate =
            serde_json::from_value(json!({"DiskType": "SSD"})).unwrap();
        assert!(u.update(&env, &Value::IntList(vec![1, 3])).unwrap());
        assert_eq!(u.repr(), Some(Value::IntList(vec![1, 3])));

        let calls = api.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].path, vec![("disk_id".to_string(), "3".to_string())]);
        assert_eq!(calls[0].body, Some(json!({"disk": {"disk_type": "SSD"}})));
    }

    #[test]
    fn test_disk_list_update_rejects_scalar_prior() {
        let scope = Scope::new();
        let api = MockApi::with_token("t");
        let env = Env {
            scope: &scope,
            api: &api,
            dry_run: false,
        };
        let mut u: DiskListUpdate = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(u.update(&env, &Value::Int(1)), Err(Error::Template(_))));
        assert!(u.create(&env).is_err());
    }
}
