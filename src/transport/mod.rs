//! Control-plane transport: call-by-operation-id over the cluster's OpenAPI.

pub mod openapi;

use crate::core::error::Result;

/// Header carrying the session credential on every call.
pub const AUTH_TOKEN_HEADER: &str = "Xms-Auth-Token";

/// Path or query parameters, in insertion order.
pub type Params<'a> = &'a [(&'a str, String)];

/// Generic passthrough to the control plane.
pub trait ApiClient {
    /// Invoke `operation_id` with an optional JSON body. Returns the raw
    /// response body; non-2xx responses are errors.
    fn call(
        &self,
        operation_id: &str,
        body: Option<&serde_json::Value>,
        path_params: Params<'_>,
        query: Params<'_>,
    ) -> Result<Vec<u8>>;

    /// Replace the credential used for all subsequent calls.
    fn set_credential(&mut self, token: &str);

    fn credential(&self) -> Option<&str>;

    fn server_version(&self) -> &str;

    fn openapi_version(&self) -> &str;
}

/// Substitute `{name}` placeholders in an operation path.
pub(crate) fn fill_path(template: &str, declared: &[String], params: Params<'_>) -> Result<String> {
    let mut path = template.to_string();
    for name in declared {
        let value = params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .ok_or_else(|| {
                crate::core::error::Error::Transport(format!("path param {} not set", name))
            })?;
        path = path.replace(&format!("{{{}}}", name), value);
    }
    Ok(path)
}
