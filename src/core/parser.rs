//! Template parsing and validation.
//!
//! A template is a JSON document with `Description`, typed `Parameters`, an
//! ordered `Resources` list and named `Templates` (raw nested resource lists
//! expanded by group entries). Expressions and resource instances are built
//! once here and are immutable afterwards, except for the representation
//! each resource materializes while it runs.

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

use super::error::{Error, Result};
use super::expr::Expr;
use super::types::{Action, Value, ValueKind, ValueMap};
use crate::resources::{Registry, Resource};

/// Type of a group entry.
pub const TEMPLATE_TYPE: &str = "Template";
/// Reserved parameter holding the control-plane endpoint.
pub const PARAM_CLUSTER_URL: &str = "ClusterURL";
/// Context action iterating a list one element per binding.
pub const CONTEXT_ACTION_RANGE: &str = "range";

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDocument {
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: IndexMap<String, RawParameter>,
    #[serde(default)]
    resources: Vec<serde_json::Value>,
    #[serde(default)]
    templates: IndexMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawParameter {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawResource {
    name: String,
    #[serde(rename = "Type")]
    resource_type: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    sleep: u64,
    #[serde(default)]
    wait_interval: u64,
    #[serde(default)]
    check_interval: u64,
    #[serde(default)]
    context: Vec<RawContext>,
    #[serde(default)]
    template_name: Option<String>,
    #[serde(default)]
    properties: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawContext {
    name: String,
    #[serde(rename = "Type")]
    kind: String,
    #[serde(default)]
    action: String,
    value: serde_json::Value,
}

/// Typed parameter with its default value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub kind: ValueKind,
    pub value: Value,
}

/// One context of a group entry.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub name: String,
    pub kind: ValueKind,
    /// Iterate the list value, one binding per element.
    pub range: bool,
    pub value: Expr,
}

/// One entry of a resource list.
#[derive(Debug)]
pub struct ResourceInTemplate {
    pub name: String,
    pub resource_type: String,
    pub action: Action,
    /// Seconds to sleep after the resource completes.
    pub sleep: u64,
    /// Seconds to wait before the first poll.
    pub wait_interval: u64,
    /// Poll spacing override in seconds; 0 uses the resource's default.
    pub check_interval: u64,
    pub context: Vec<TemplateContext>,
    pub template_name: Option<String>,
    /// `None` for group entries.
    pub properties: Option<Box<dyn Resource>>,
}

impl ResourceInTemplate {
    pub fn is_group(&self) -> bool {
        self.resource_type == TEMPLATE_TYPE
    }

    /// Whether this entry consumes a journal record.
    pub fn is_journaled(&self) -> bool {
        self.properties.as_ref().is_none_or(|p| !p.is_credential())
    }
}

/// A parsed template document.
#[derive(Debug)]
pub struct Template {
    pub description: String,
    pub parameters: IndexMap<String, Parameter>,
    pub resources: Vec<ResourceInTemplate>,
    pub templates: IndexMap<String, serde_json::Value>,
}

impl Template {
    /// Parse a template file from disk.
    pub fn load(path: &Path, registry: &Registry) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("failed to read {}", path.display()), path, e))?;
        Self::parse(&content, registry)
    }

    /// Parse a template from a JSON string. Every `Templates` body is parsed
    /// once up front so nested groups are rejected before anything runs.
    pub fn parse(json: &str, registry: &Registry) -> Result<Self> {
        let raw: RawDocument = serde_json::from_str(json)
            .map_err(|e| Error::Template(format!("JSON parse error: {}", e)))?;

        let mut parameters = IndexMap::with_capacity(raw.parameters.len());
        for (name, p) in raw.parameters {
            let param = parse_parameter(&name, &p)?;
            parameters.insert(name, param);
        }

        let resources = parse_list(&raw.resources, registry, false)?;
        let template = Self {
            description: raw.description,
            parameters,
            resources,
            templates: raw.templates,
        };
        for name in template.templates.keys() {
            template.nested(name, registry)?;
        }
        Ok(template)
    }

    /// Control-plane endpoint from the reserved parameter.
    pub fn endpoint(&self) -> Result<&str> {
        match self.parameters.get(PARAM_CLUSTER_URL) {
            Some(Parameter {
                value: Value::Str(url),
                ..
            }) if !url.is_empty() => Ok(url),
            Some(_) => Err(Error::Template(format!("invalid input {}", PARAM_CLUSTER_URL))),
            None => Err(Error::MissingParameter(PARAM_CLUSTER_URL.to_string())),
        }
    }

    /// Parameter values seeding the top-level scope.
    pub fn initial_values(&self) -> ValueMap {
        self.parameters
            .iter()
            .filter(|(name, _)| name.as_str() != PARAM_CLUSTER_URL)
            .map(|(name, p)| (name.clone(), p.value.clone()))
            .collect()
    }

    /// Fresh instances of the named nested resource list.
    pub fn nested(&self, template_name: &str, registry: &Registry) -> Result<Vec<ResourceInTemplate>> {
        let body = self.templates.get(template_name).ok_or_else(|| {
            Error::Template(format!("template with name {} not found", template_name))
        })?;
        let entries = body.as_array().ok_or_else(|| {
            Error::Template(format!("template {} must be a list of resources", template_name))
        })?;
        parse_list(entries, registry, true)
            .map_err(|e| annotate(e, &format!("in template {}", template_name)))
    }
}

/// Structural problem found by [`validate_template`].
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Validate a parsed template. Returns a list of errors (empty = valid).
pub fn validate_template(template: &Template) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(e) = template.endpoint() {
        errors.push(ValidationError {
            message: e.to_string(),
        });
    }

    // A name may be re-declared only to update what it already holds.
    let mut seen = std::collections::HashSet::new();
    for r in &template.resources {
        if !seen.insert(r.name.as_str()) && r.action != Action::Update {
            errors.push(ValidationError {
                message: format!("duplicate resource name '{}'", r.name),
            });
        }
        if let Some(name) = &r.template_name {
            if r.is_group() && !template.templates.contains_key(name) {
                errors.push(ValidationError {
                    message: format!(
                        "resource '{}' references unknown template '{}'",
                        r.name, name
                    ),
                });
            }
        }
    }
    errors
}

fn annotate(e: Error, context: &str) -> Error {
    match e {
        Error::Template(m) => Error::Template(format!("{}: {}", context, m)),
        other => other,
    }
}

fn parse_parameter(name: &str, raw: &RawParameter) -> Result<Parameter> {
    let kind = ValueKind::parse(&raw.kind)
        .ok_or_else(|| Error::Template(format!("unknown parameter type {}", raw.kind)))?;
    let value = Value::from_json(kind, &raw.value).ok_or_else(|| {
        Error::Template(format!("invalid value {} for parameter {} of type {}", raw.value, name, kind))
    })?;
    Ok(Parameter { kind, value })
}

fn parse_list(
    entries: &[serde_json::Value],
    registry: &Registry,
    in_group: bool,
) -> Result<Vec<ResourceInTemplate>> {
    entries
        .iter()
        .map(|e| parse_resource(e, registry, in_group))
        .collect()
}

fn parse_action(action: &str, name: &str) -> Result<Action> {
    match action {
        "" | "Create" => Ok(Action::Create),
        "Update" => Ok(Action::Update),
        "Get" => Ok(Action::Get),
        other => Err(Error::Template(format!(
            "resource {} has invalid action {}",
            name, other
        ))),
    }
}

fn parse_resource(
    raw: &serde_json::Value,
    registry: &Registry,
    in_group: bool,
) -> Result<ResourceInTemplate> {
    let r: RawResource = serde_json::from_value(raw.clone())
        .map_err(|e| Error::Template(format!("invalid resource: {}", e)))?;
    let action = parse_action(&r.action, &r.name)?;

    let mut context = Vec::new();
    let mut template_name = r.template_name.filter(|n| !n.is_empty());
    let properties = if r.resource_type == TEMPLATE_TYPE {
        if in_group {
            return Err(Error::Template(format!(
                "nested template unsupported (resource {})",
                r.name
            )));
        }
        if template_name.is_none() {
            return Err(Error::Template(format!(
                "TemplateName is required for template resource {}",
                r.name
            )));
        }
        context = r
            .context
            .iter()
            .map(|c| parse_context(c, &r.name))
            .collect::<Result<_>>()?;
        None
    } else {
        template_name = None;
        let props = r.properties.as_ref().ok_or_else(|| {
            Error::Template(format!("Properties is required for resource {}", r.name))
        })?;
        let built = registry
            .build(&r.resource_type, action, props)
            .map_err(|e| match e {
                Error::UnknownResourceType(_) | Error::UnknownFunction(_) => e,
                other => Error::Template(format!("resource {}: {}", r.name, other)),
            })?;
        Some(built)
    };

    Ok(ResourceInTemplate {
        name: r.name,
        resource_type: r.resource_type,
        action,
        sleep: r.sleep,
        wait_interval: r.wait_interval,
        check_interval: r.check_interval,
        context,
        template_name,
        properties,
    })
}

fn parse_context(raw: &RawContext, resource: &str) -> Result<TemplateContext> {
    let kind = ValueKind::parse(&raw.kind).ok_or_else(|| {
        Error::Template(format!(
            "got invalid template context type {} in {}",
            raw.kind, resource
        ))
    })?;
    let range = match raw.action.as_str() {
        "" => false,
        CONTEXT_ACTION_RANGE if kind.is_list() => true,
        CONTEXT_ACTION_RANGE => {
            return Err(Error::Template(format!(
                "context {} of {} uses range on non-list type {}",
                raw.name, resource, kind
            )))
        }
        other => {
            return Err(Error::Template(format!(
                "got invalid template context action {}",
                other
            )))
        }
    };
    let value = Expr::decode(kind, &raw.value)?;
    Ok(TemplateContext {
        name: raw.name.clone(),
        kind,
        range,
        value,
    })
}
