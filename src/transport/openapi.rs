//! OpenAPI-indexed HTTP client for the cluster control plane.
//!
//! The cluster publishes its API description at `<server>/docs/openapi.json`
//! (the `/v1` suffix of the endpoint stripped). Operations are indexed by
//! `operationId` so resources can call them without knowing URLs.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use super::{fill_path, ApiClient, Params, AUTH_TOKEN_HEADER};
use crate::core::error::{Error, Result};

/// Method, path template and declared path parameters of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub method: String,
    pub path: String,
    pub path_params: Vec<String>,
}

/// Parsed API description.
#[derive(Debug, Clone, Default)]
pub struct ApiSpec {
    pub openapi: String,
    pub version: String,
    operations: HashMap<String, Operation>,
}

impl ApiSpec {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let doc: serde_json::Value = serde_json::from_slice(bytes)?;
        let openapi = doc["openapi"].as_str().unwrap_or_default().to_string();
        let version = doc["info"]["version"].as_str().unwrap_or_default().to_string();

        let mut operations = HashMap::new();
        if let Some(paths) = doc["paths"].as_object() {
            for (path, methods) in paths {
                let Some(methods) = methods.as_object() else {
                    continue;
                };
                for (method, info) in methods {
                    let Some(id) = info["operationId"].as_str() else {
                        continue;
                    };
                    let path_params = info["parameters"]
                        .as_array()
                        .map(|params| {
                            params
                                .iter()
                                .filter(|p| p["in"] == "path")
                                .filter_map(|p| p["name"].as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    operations.insert(
                        id.to_string(),
                        Operation {
                            method: method.to_uppercase(),
                            path: path.clone(),
                            path_params,
                        },
                    );
                }
            }
        }
        Ok(Self {
            openapi,
            version,
            operations,
        })
    }

    pub fn operation(&self, id: &str) -> Option<&Operation> {
        self.operations.get(id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

pub struct OpenApiClient {
    http: reqwest::blocking::Client,
    server: String,
    token: Option<String>,
    spec: ApiSpec,
}

impl OpenApiClient {
    /// Client for `server` with no API description loaded yet.
    pub fn new(server: &str, token: Option<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            server: server.to_string(),
            token: token.filter(|t| !t.is_empty()),
            spec: ApiSpec::default(),
        })
    }

    pub fn spec_url(&self) -> String {
        format!("{}/docs/openapi.json", spec_base(&self.server))
    }

    /// Fetch and index the server's API description.
    pub fn load_spec(&mut self) -> Result<()> {
        let url = self.spec_url();
        debug!("fetching openapi spec from {}", url);
        let resp = self.http.get(&url).send()?;
        let status = resp.status();
        let bytes = resp.bytes()?;
        if status.as_u16() >= 300 {
            return Err(Error::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        self.spec = ApiSpec::parse(&bytes)?;
        debug!(
            "indexed {} operations (server {})",
            self.spec.len(),
            self.spec.version
        );
        Ok(())
    }
}

fn spec_base(server: &str) -> &str {
    server.strip_suffix("/v1").unwrap_or(server)
}

impl ApiClient for OpenApiClient {
    fn call(
        &self,
        operation_id: &str,
        body: Option<&serde_json::Value>,
        path_params: Params<'_>,
        query: Params<'_>,
    ) -> Result<Vec<u8>> {
        let op = self
            .spec
            .operation(operation_id)
            .ok_or_else(|| Error::Transport(format!("operation id {} not found", operation_id)))?;
        let path = fill_path(&op.path, &op.path_params, path_params)?;
        let method = reqwest::Method::from_bytes(op.method.as_bytes())
            .map_err(|e| Error::Transport(e.to_string()))?;
        debug!("{} {} ({})", op.method, path, operation_id);

        let mut req = self.http.request(method, format!("{}{}", self.server, path));
        if let Some(token) = &self.token {
            req = req.header(AUTH_TOKEN_HEADER, token);
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send()?;
        let status = resp.status();
        let bytes = resp.bytes()?;
        if status.as_u16() >= 300 {
            return Err(Error::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }

    fn set_credential(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    fn credential(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn server_version(&self) -> &str {
        &self.spec.version
    }

    fn openapi_version(&self) -> &str {
        &self.spec.openapi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"{
        "openapi": "3.0.0",
        "info": {"version": "SDS_4.2.000.0"},
        "paths": {
            "/pools/": {
                "get": {"operationId": "ListPools", "parameters": [{"name": "limit", "in": "query"}]},
                "post": {"operationId": "CreatePool"}
            },
            "/pools/{pool_id}": {
                "parameters": [],
                "get": {
                    "operationId": "GetPool",
                    "parameters": [{"name": "pool_id", "in": "path"}]
                }
            }
        }
    }"#;

    #[test]
    fn test_openapi_parse_indexes_operations() {
        let spec = ApiSpec::parse(SPEC.as_bytes()).unwrap();
        assert_eq!(spec.openapi, "3.0.0");
        assert_eq!(spec.version, "SDS_4.2.000.0");
        assert_eq!(spec.len(), 3);

        let get = spec.operation("GetPool").unwrap();
        assert_eq!(get.method, "GET");
        assert_eq!(get.path, "/pools/{pool_id}");
        assert_eq!(get.path_params, vec!["pool_id".to_string()]);

        let list = spec.operation("ListPools").unwrap();
        assert!(list.path_params.is_empty());
        assert_eq!(spec.operation("CreatePool").unwrap().method, "POST");
    }

    #[test]
    fn test_openapi_parse_rejects_invalid_json() {
        assert!(ApiSpec::parse(b"not json").is_err());
    }

    #[test]
    fn test_openapi_spec_url_strips_version() {
        let c = OpenApiClient::new("http://10.0.0.1:8056/v1", None).unwrap();
        assert_eq!(c.spec_url(), "http://10.0.0.1:8056/docs/openapi.json");
        let c = OpenApiClient::new("http://10.0.0.1:8056", None).unwrap();
        assert_eq!(c.spec_url(), "http://10.0.0.1:8056/docs/openapi.json");
    }

    #[test]
    fn test_openapi_credential() {
        let mut c = OpenApiClient::new("http://h/v1", Some(String::new())).unwrap();
        assert_eq!(c.credential(), None);
        c.set_credential("abc");
        assert_eq!(c.credential(), Some("abc"));
    }

    #[test]
    fn test_openapi_unknown_operation() {
        let c = OpenApiClient::new("http://h/v1", None).unwrap();
        let err = c.call("GetPool", None, &[], &[]).unwrap_err();
        assert!(err.to_string().contains("operation id GetPool not found"));
    }
}
