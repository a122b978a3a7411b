//! CLI subcommands: apply, validate, status, types.

use crate::core::executor::{RunConfig, Stack, DEFAULT_CACHE_DIR, DEFAULT_CHECK_COUNT};
use crate::core::parser::{self, Template};
use crate::journal::{hasher, Journal};
use crate::resources::Registry;
use crate::transport::openapi::OpenApiClient;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision every resource of a template, resuming from its journal
    Apply {
        /// Path to the template
        #[arg(short, long)]
        file: PathBuf,

        /// Initial control-plane credential
        #[arg(short, long, env = "STACKFORM_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Directory holding resume journals
        #[arg(long, env = "STACKFORM_CACHE_PATH", default_value = DEFAULT_CACHE_DIR)]
        cache_path: PathBuf,

        /// Discard the journal of a previous run
        #[arg(long)]
        no_continue: bool,

        /// Fabricate representations instead of calling the control plane
        #[arg(long)]
        dry_run: bool,

        /// Status checks before a create or update times out
        #[arg(long, default_value_t = DEFAULT_CHECK_COUNT)]
        max_checks: u32,
    },

    /// Validate a template without contacting the control plane
    Validate {
        /// Path to the template
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show which resources a resumed run would replay
    Status {
        /// Path to the template
        #[arg(short, long)]
        file: PathBuf,

        /// Directory holding resume journals
        #[arg(long, env = "STACKFORM_CACHE_PATH", default_value = DEFAULT_CACHE_DIR)]
        cache_path: PathBuf,
    },

    /// List the resource types templates may use
    Types,
}

/// Dispatch a CLI subcommand.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    let registry = Registry::builtin();
    match cmd {
        Commands::Apply {
            file,
            token,
            cache_path,
            no_continue,
            dry_run,
            max_checks,
        } => {
            let config = RunConfig {
                cache_dir: cache_path,
                no_continue,
                dry_run,
                token,
                max_checks,
            };
            cmd_apply(&file, &registry, &config)
        }
        Commands::Validate { file } => cmd_validate(&file, &registry),
        Commands::Status { file, cache_path } => cmd_status(&file, &cache_path, &registry),
        Commands::Types => {
            for t in registry.types() {
                println!("{}", t);
            }
            Ok(())
        }
    }
}

fn load_and_validate(file: &Path, registry: &Registry) -> Result<Template, String> {
    let template = Template::load(file, registry).map_err(|e| e.to_string())?;
    let errors = parser::validate_template(&template);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }
    Ok(template)
}

fn cmd_validate(file: &Path, registry: &Registry) -> Result<(), String> {
    let template = load_and_validate(file, registry)?;
    println!(
        "OK: {} ({} resources, {} templates)",
        template.description,
        template.resources.len(),
        template.templates.len()
    );
    Ok(())
}

fn cmd_apply(file: &Path, registry: &Registry, config: &RunConfig) -> Result<(), String> {
    let template = load_and_validate(file, registry)?;
    let endpoint = template.endpoint().map_err(|e| e.to_string())?.to_string();

    let mut client = OpenApiClient::new(&endpoint, config.token.clone()).map_err(|e| e.to_string())?;
    if !config.dry_run {
        client.load_spec().map_err(|e| e.to_string())?;
    }

    let stack = Stack::new(template, registry, &mut client, config).map_err(|e| e.to_string())?;
    let summary = stack.run().map_err(|e| e.to_string())?;

    if config.dry_run {
        println!("Dry run: no control-plane calls were made.");
    }
    println!(
        "Done: {} processed, {} restored from journal ({:.1}s)",
        summary.processed,
        summary.restored,
        summary.duration.as_secs_f64()
    );
    for (name, value) in &summary.values {
        println!("  {} = {}", name, value);
    }
    Ok(())
}

fn cmd_status(file: &Path, cache_dir: &Path, registry: &Registry) -> Result<(), String> {
    let template = Template::load(file, registry).map_err(|e| e.to_string())?;
    let endpoint = template.endpoint().map_err(|e| e.to_string())?;
    let path = hasher::journal_path(cache_dir, &template.description, endpoint);

    if !path.exists() {
        println!("No journal at {}. Nothing to resume.", path.display());
        return Ok(());
    }
    let journal = Journal::open(&path, false).map_err(|e| e.to_string())?;
    println!("Journal: {}", path.display());
    println!("  Records: {}", journal.records().len());
    let pending = journal.annotate_pending(
        template
            .resources
            .iter()
            .map(|r| (r.name.as_str(), r.is_journaled())),
    );
    for entry in pending {
        println!("    {}", entry);
    }
    Ok(())
}
