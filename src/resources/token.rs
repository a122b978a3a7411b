//! Session token. Its representation is the credential for later calls.

use serde::Deserialize;
use serde_json::{json, Map, Value as Json};

use super::{all_ready, Env, Resource};
use crate::core::error::{Error, Result};
use crate::core::expr::StringExpr;
use crate::core::scope::ValueLookup;
use crate::core::types::Value;

pub const TOKEN_TYPE: &str = "Token";

const CREATE_TOKEN: &str = "CreateToken";
const DRY_RUN_TOKEN: &str = "28171a13317c4252806979bc86a69c4f";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Token {
    #[serde(default)]
    name: Option<StringExpr>,
    #[serde(default)]
    email: Option<StringExpr>,
    #[serde(default)]
    password: Option<StringExpr>,
    #[serde(skip)]
    uuid: Option<String>,
}

impl Token {
    fn auth_request(&self, scope: &dyn ValueLookup) -> Result<Json> {
        let mut user = Map::new();
        for (key, expr) in [
            ("name", &self.name),
            ("email", &self.email),
            ("password", &self.password),
        ] {
            if let Some(e) = expr {
                user.insert(key.to_string(), Json::String(e.value(scope)?));
            }
        }
        Ok(json!({"auth": {"identity": {"password": {"user": user}}}}))
    }
}

impl Resource for Token {
    fn resource_type(&self) -> &'static str {
        TOKEN_TYPE
    }

    fn requires_credential(&self) -> bool {
        false
    }

    fn is_credential(&self) -> bool {
        true
    }

    fn is_ready(&self, scope: &dyn ValueLookup) -> bool {
        all_ready!(scope; self.name, self.email, self.password)
    }

    fn create(&mut self, env: &Env<'_>) -> Result<bool> {
        if env.dry_run {
            self.uuid = Some(DRY_RUN_TOKEN.to_string());
            return Ok(true);
        }
        let req = self.auth_request(env.scope)?;
        let body = env.api.call(CREATE_TOKEN, Some(&req), &[], &[])?;
        let resp: Json = serde_json::from_slice(&body)?;
        let uuid = resp["token"]["uuid"]
            .as_str()
            .ok_or_else(|| Error::Transport("token uuid missing from response".into()))?;
        self.uuid = Some(uuid.to_string());
        Ok(true)
    }

    fn repr(&self) -> Option<Value> {
        self.uuid.clone().map(Value::Str)
    }
}
