//! Block volume in a pool, with optional QoS limits.

use serde::Deserialize;
use serde_json::{json, Map, Value as Json};

use super::object::{check_status, fake_id, ApiBinding};
use super::{all_ready, Env, Resource};
use crate::core::error::{Error, Result};
use crate::core::expr::{BoolExpr, IntegerExpr, StringExpr};
use crate::core::scope::ValueLookup;
use crate::core::types::Value;

pub const BLOCK_VOLUME_TYPE: &str = "BlockVolume";

const BINDING: ApiBinding = ApiBinding {
    list: "ListBlockVolumes",
    get: "GetBlockVolume",
    create: "CreateBlockVolume",
    id_param: "block_volume_id",
    record_key: "block_volume",
    records_key: "block_volumes",
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockVolumeQos {
    #[serde(default)]
    burst_total_bw: Option<IntegerExpr>,
    #[serde(default)]
    burst_total_iops: Option<IntegerExpr>,
    #[serde(default)]
    max_total_bw: Option<IntegerExpr>,
    #[serde(default)]
    max_total_iops: Option<IntegerExpr>,
}

impl BlockVolumeQos {
    fn is_ready(&self, scope: &dyn ValueLookup) -> bool {
        all_ready!(scope;
            self.burst_total_bw,
            self.burst_total_iops,
            self.max_total_bw,
            self.max_total_iops,
        )
    }

    fn request(&self, scope: &dyn ValueLookup) -> Result<Json> {
        let mut qos = Map::new();
        for (key, expr) in [
            ("burst_total_bw", &self.burst_total_bw),
            ("burst_total_iops", &self.burst_total_iops),
            ("max_total_bw", &self.max_total_bw),
            ("max_total_iops", &self.max_total_iops),
        ] {
            if let Some(e) = expr {
                qos.insert(key.to_string(), json!(e.value(scope)?));
            }
        }
        Ok(Json::Object(qos))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockVolume {
    #[serde(default, rename = "BlockSnapshotID", alias = "BlockSnapshotId")]
    block_snapshot_id: Option<IntegerExpr>,
    #[serde(default)]
    description: Option<StringExpr>,
    #[serde(default)]
    flattened: Option<BoolExpr>,
    #[serde(default)]
    format: Option<IntegerExpr>,
    #[serde(default)]
    name: Option<StringExpr>,
    #[serde(default)]
    performance_priority: Option<IntegerExpr>,
    #[serde(default, rename = "PoolID", alias = "PoolId")]
    pool_id: Option<IntegerExpr>,
    #[serde(default)]
    qos: Option<BlockVolumeQos>,
    #[serde(default)]
    qos_enabled: Option<BoolExpr>,
    #[serde(default)]
    size: Option<IntegerExpr>,
    #[serde(skip)]
    id: Option<i64>,
}

impl BlockVolume {
    fn name_expr(&self) -> Result<&StringExpr> {
        self.name
            .as_ref()
            .ok_or_else(|| Error::MissingParameter(format!("{}.Name", BLOCK_VOLUME_TYPE)))
    }

    fn create_request(&self, name: &str, scope: &dyn ValueLookup) -> Result<Json> {
        let mut vol = Map::new();
        vol.insert("name".into(), json!(name));
        let pool_id = match &self.pool_id {
            Some(e) => e.value(scope)?,
            None => 0,
        };
        vol.insert("pool_id".into(), json!(pool_id));
        if let Some(e) = &self.block_snapshot_id {
            vol.insert("block_snapshot_id".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.description {
            vol.insert("description".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.flattened {
            vol.insert("flattened".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.format {
            vol.insert("format".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.performance_priority {
            vol.insert("performance_priority".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.qos_enabled {
            vol.insert("qos_enabled".into(), json!(e.value(scope)?));
        }
        if let Some(e) = &self.size {
            vol.insert("size".into(), json!(e.value(scope)?));
        }
        if let Some(qos) = &self.qos {
            vol.insert("qos".into(), qos.request(scope)?);
        }
        Ok(json!({ "block_volume": vol }))
    }
}

impl Resource for BlockVolume {
    fn resource_type(&self) -> &'static str {
        BLOCK_VOLUME_TYPE
    }

    fn is_ready(&self, scope: &dyn ValueLookup) -> bool {
        all_ready!(scope;
            self.block_snapshot_id,
            self.description,
            self.flattened,
            self.format,
            self.name,
            self.performance_priority,
            self.pool_id,
            self.qos_enabled,
            self.size,
        ) && self.qos.as_ref().is_none_or(|q| q.is_ready(scope))
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
        let (id, status) = BINDING.create(env, &req)?;
        self.id = Some(id);
        check_status(&status)
    }

    fn is_created(&mut self, env: &Env<'_>) -> Result<bool> {
        let id = self
            .id
            .ok_or_else(|| Error::Transport("block volume has no id yet".into()))?;
        BINDING.poll(env, id)
    }

    fn repr(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }
}
