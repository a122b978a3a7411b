//! Lifecycle driver: runs a template's resources in declaration order.
//!
//! Each entry is either replayed from the resume journal or driven through
//! its Create/Update/Get step (with bounded polling), published into the
//! scope and appended to the journal. Group entries expand into one nested
//! run per context binding. Any error stops the run; the journal keeps
//! everything completed so far for the next attempt.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span};

use super::error::{Error, Result};
use super::expander;
use super::parser::{ResourceInTemplate, Template, TEMPLATE_TYPE};
use super::scope::Scope;
use super::types::{Action, Value, ValueMap};
use crate::journal::{hasher, Journal};
use crate::resources::{Env, Registry, Resource};
use crate::transport::ApiClient;

/// Directory holding journals when none is configured.
pub const DEFAULT_CACHE_DIR: &str = "formation_cache";
/// Poll attempts before a Create/Update is declared timed out.
pub const DEFAULT_CHECK_COUNT: u32 = 30;

/// Configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub cache_dir: PathBuf,
    /// Discard any journal left by a previous run.
    pub no_continue: bool,
    pub dry_run: bool,
    /// Credential to start with; a `Token` resource replaces it.
    pub token: Option<String>,
    pub max_checks: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            no_continue: false,
            dry_run: false,
            token: None,
            max_checks: DEFAULT_CHECK_COUNT,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Entries driven through their lifecycle (nested ones included).
    pub processed: usize,
    /// Entries replayed from the journal.
    pub restored: usize,
    /// Top-level values published by the run.
    pub values: ValueMap,
    pub duration: Duration,
}

/// One run of a template against a control plane.
pub struct Stack<'a> {
    template: Template,
    registry: &'a Registry,
    api: &'a mut dyn ApiClient,
    config: &'a RunConfig,
    scope: Scope,
    journal: Journal,
    processed: usize,
    restored: usize,
}

impl<'a> Stack<'a> {
    /// Open the template's journal and seed the scope with its parameters.
    pub fn new(
        template: Template,
        registry: &'a Registry,
        api: &'a mut dyn ApiClient,
        config: &'a RunConfig,
    ) -> Result<Self> {
        let endpoint = template.endpoint()?;
        let path = hasher::journal_path(&config.cache_dir, &template.description, endpoint);
        let journal = Journal::open(&path, config.no_continue)?;
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            api.set_credential(token);
        }
        let scope = Scope::with_values(template.initial_values());
        Ok(Self {
            template,
            registry,
            api,
            config,
            scope,
            journal,
            processed: 0,
            restored: 0,
        })
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Pending top-level entries, `(cached)` marking those the journal covers.
    pub fn pending(&self) -> Vec<String> {
        self.journal.annotate_pending(
            self.template
                .resources
                .iter()
                .map(|r| (r.name.as_str(), r.is_journaled())),
        )
    }

    /// Process every resource. The journal is deleted only when all succeed.
    pub fn run(mut self) -> Result<RunSummary> {
        let start = Instant::now();
        info!("stack started processing resources: {}", self.pending().join(", "));

        let mut resources = std::mem::take(&mut self.template.resources);
        self.process_list(&mut resources, false)?;

        let Self {
            scope,
            journal,
            processed,
            restored,
            ..
        } = self;
        journal.finish();
        let duration = start.elapsed();
        info!(
            "stack finished: {} processed, {} restored in {:.1}s",
            processed,
            restored,
            duration.as_secs_f64()
        );
        Ok(RunSummary {
            processed,
            restored,
            values: scope.values().clone(),
            duration,
        })
    }

    fn process_list(&mut self, entries: &mut [ResourceInTemplate], in_template: bool) -> Result<()> {
        for entry in entries.iter_mut() {
            if entry.is_group() {
                self.process_group(entry)?;
            } else {
                self.process_resource(entry, in_template)?;
            }
        }
        Ok(())
    }

    fn process_group(&mut self, entry: &ResourceInTemplate) -> Result<()> {
        let template_name = entry.template_name.as_deref().ok_or_else(|| {
            Error::Template(format!("template resource {} has no TemplateName", entry.name))
        })?;
        let span = info_span!("template", name = %entry.name);
        let _guard = span.enter();

        let bindings = expander::bindings(&entry.name, &entry.context, &self.scope)?;
        info!("expanding {} into {} binding(s)", template_name, bindings.len());

        let mut aggregate = Vec::with_capacity(bindings.len());
        for (i, binding) in bindings.into_iter().enumerate() {
            debug!("binding {}: {:?}", i, binding);
            let saved = self.scope.take_values();
            self.scope.push_scope(saved);
            self.scope.set_context(Some(binding));

            let result = self.run_binding(template_name);

            self.scope.set_context(None);
            let inner = self.scope.take_values();
            let outer = self.scope.pop_scope().unwrap_or_default();
            self.scope.replace_values(outer);
            result?;
            aggregate.push(inner);
        }

        let value = match self.journal.restore(&entry.name, TEMPLATE_TYPE)? {
            Some(restored) => {
                info!("template resource {} restored from journal", entry.name);
                self.restored += 1;
                restored
            }
            None => {
                let value = Value::Group(aggregate);
                self.journal.record(&entry.name, TEMPLATE_TYPE, &value, false)?;
                info!("template resource {} has been processed", entry.name);
                value
            }
        };
        self.scope.set(&entry.name, value);
        Ok(())
    }

    fn run_binding(&mut self, template_name: &str) -> Result<()> {
        let mut body = self.template.nested(template_name, self.registry)?;
        self.process_list(&mut body, true)
    }

    fn process_resource(&mut self, entry: &mut ResourceInTemplate, in_template: bool) -> Result<()> {
        let journaled = entry.is_journaled();
        if journaled {
            if let Some(value) = self.journal.restore(&entry.name, &entry.resource_type)? {
                info!("{} {} restored from journal", entry.resource_type, entry.name);
                self.scope.set(&entry.name, value);
                self.restored += 1;
                return Ok(());
            }
        }

        let value = self
            .drive(entry)
            .map_err(|e| e.lifecycle(&entry.name, &entry.resource_type, entry.action))?;
        self.processed += 1;

        if !journaled {
            if let Value::Str(token) = &value {
                self.api.set_credential(token);
                info!("refreshed call credential from {}", entry.name);
            }
        }
        self.scope.set(&entry.name, value.clone());

        if entry.sleep > 0 {
            info!("sleep {} seconds", entry.sleep);
            std::thread::sleep(Duration::from_secs(entry.sleep));
        }
        if journaled {
            self.journal
                .record(&entry.name, &entry.resource_type, &value, in_template)?;
        }
        Ok(())
    }

    /// Run the entry's action to completion and return its representation.
    fn drive(&self, entry: &mut ResourceInTemplate) -> Result<Value> {
        let name = entry.name.as_str();
        let resource = entry
            .properties
            .as_mut()
            .ok_or_else(|| Error::Template(format!("resource {} has no Properties", name)))?;
        if !resource.is_ready(&self.scope) {
            return Err(Error::ResourceNotReady(name.to_string()));
        }

        let env = Env {
            scope: &self.scope,
            api: &*self.api,
            dry_run: self.config.dry_run,
        };
        let poll = Poll {
            name,
            wait_interval: entry.wait_interval,
            check_interval: entry.check_interval,
            max_checks: self.config.max_checks,
        };
        info!("try to {} resource {} of type {}", entry.action, name, resource.resource_type());
        match entry.action {
            Action::Get => resource.get(&env)?,
            Action::Create => {
                if resource.requires_credential() && self.api.credential().is_none() {
                    return Err(Error::MissingCredential(name.to_string()));
                }
                if !resource.create(&env)? {
                    poll.wait(&mut **resource, Action::Create, |r| r.is_created(&env))?;
                }
            }
            Action::Update => {
                // Current map only; bindings and outer maps never hold the prior value.
                let prior = self.scope.values().get(name).cloned().ok_or_else(|| {
                    Error::Template(format!("failed to get resource {} for update", name))
                })?;
                if !resource.update(&env, &prior)? {
                    poll.wait(&mut **resource, Action::Update, |r| r.is_updated(&env))?;
                }
            }
        }

        let value = resource.repr().ok_or_else(|| {
            Error::Template(format!("resource {} produced no representation", name))
        })?;
        if resource.is_credential() {
            info!("resource {} has been {}", name, entry.action.past_tense());
        } else {
            info!(
                "resource {} with representation {} has been {}",
                name,
                value,
                entry.action.past_tense()
            );
        }
        Ok(value)
    }
}

/// Bounded readiness polling for one resource.
struct Poll<'n> {
    name: &'n str,
    wait_interval: u64,
    check_interval: u64,
    max_checks: u32,
}

impl Poll<'_> {
    fn wait<F>(&self, resource: &mut dyn Resource, action: Action, mut check: F) -> Result<()>
    where
        F: FnMut(&mut dyn Resource) -> Result<bool>,
    {
        if self.wait_interval > 0 {
            std::thread::sleep(Duration::from_secs(self.wait_interval));
        }
        let interval = match self.check_interval {
            0 => resource.check_interval(),
            n => n,
        };
        info!("start to check status of resource {}", self.name);
        for attempt in 1..=self.max_checks {
            debug!("check {} time(s)", attempt);
            if check(&mut *resource)? {
                return Ok(());
            }
            if interval > 0 {
                std::thread::sleep(Duration::from_secs(interval));
            }
        }
        Err(Error::Timeout {
            name: self.name.to_string(),
            action,
        })
    }
}
