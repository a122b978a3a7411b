//! Shared plumbing for control-plane objects: lookup by name through the
//! list operation, id/status extraction from responses, and status polling.

use serde_json::Value as Json;

use super::Env;
use crate::core::error::{Error, Result};

/// Statuses meaning the object finished provisioning.
const DONE_STATUSES: &[&str] = &["active", "finished", "healthy"];
/// Statuses meaning provisioning failed for good.
const FAILED_STATUSES: &[&str] = &["error", "verifying_error", "syncing_error"];

/// Operation ids and response keys of one object kind.
#[derive(Debug, Clone, Copy)]
pub struct ApiBinding {
    pub list: &'static str,
    pub get: &'static str,
    pub create: &'static str,
    /// Path parameter naming the object in the get operation.
    pub id_param: &'static str,
    /// Key of the single object in get/create responses.
    pub record_key: &'static str,
    /// Key of the array in list responses.
    pub records_key: &'static str,
}

impl ApiBinding {
    /// Id of the object named `name`, if the cluster already has one.
    pub fn find_by_name(&self, env: &Env<'_>, name: &str) -> Result<Option<i64>> {
        let body = env
            .api
            .call(self.list, None, &[], &[("limit", "-1".to_string())])?;
        let doc: Json = serde_json::from_slice(&body)?;
        let records = doc[self.records_key].as_array().ok_or_else(|| {
            Error::Transport(format!("key {} not found in records data", self.records_key))
        })?;
        Ok(records
            .iter()
            .find(|r| r["name"] == name)
            .and_then(|r| r["id"].as_i64()))
    }

    /// Id of an object that must already exist.
    pub fn get_by_name(&self, env: &Env<'_>, name: &str) -> Result<i64> {
        self.find_by_name(env, name)?.ok_or_else(|| {
            Error::Transport(format!("{} {} not found", self.record_key, name))
        })
    }

    pub fn create(&self, env: &Env<'_>, request: &Json) -> Result<(i64, String)> {
        let body = env.api.call(self.create, Some(request), &[], &[])?;
        self.identify_and_status(&body)
    }

    /// Fetch the object and report whether it reached a done status.
    pub fn poll(&self, env: &Env<'_>, id: i64) -> Result<bool> {
        let body = env
            .api
            .call(self.get, None, &[(self.id_param, id.to_string())], &[])?;
        let (_, status) = self.identify_and_status(&body)?;
        check_status(&status)
    }

    pub fn identify_and_status(&self, body: &[u8]) -> Result<(i64, String)> {
        let doc: Json = serde_json::from_slice(body)?;
        let record = &doc[self.record_key];
        if record.is_null() {
            return Err(Error::Transport(format!(
                "key {} not found in response data",
                self.record_key
            )));
        }
        let id = record["id"]
            .as_i64()
            .ok_or_else(|| Error::Transport(format!("field id of {} not found", self.record_key)))?;
        let status = record["status"].as_str().unwrap_or_default().to_string();
        Ok((id, status))
    }
}

/// `Ok(true)` when done, `Ok(false)` while in progress.
pub fn check_status(status: &str) -> Result<bool> {
    if DONE_STATUSES.contains(&status) {
        Ok(true)
    } else if FAILED_STATUSES.contains(&status) {
        Err(Error::Transport(format!("resource is in status {}", status)))
    } else {
        Ok(false)
    }
}

/// Stand-in id for dry runs.
pub fn fake_id() -> i64 {
    use rand::Rng;
    rand::thread_rng().gen_range(1..i64::MAX)
}
