//! Subcommand implementations, kept free of process-level concerns so they
//! can be driven from tests.

use std::path::Path;

use anyhow::{bail, Context};
use docmigrate_core::{Error, RunConfig, Value};
use docmigrate_migrate::{
    builtin, builtin_names, resolve_preset, CancelToken, Executor, Preset, RunError, RunOptions,
    RunSummary,
};
use docmigrate_store::SqliteStore;
use tracing::{error, info};

/// How a `run` invocation ended.
#[derive(Debug)]
pub enum Outcome {
    Completed(RunSummary),
    Failed(RunError),
}

/// Resolve the configured preset and run it against the SQLite store.
///
/// Preset problems are reported before the store is opened.
pub fn run_preset(config: &RunConfig, cancel: CancelToken) -> Outcome {
    let arg = config.preset.clone().unwrap_or_default();
    let fail = |error: Error| {
        Outcome::Failed(RunError {
            error,
            summary: RunSummary::new(arg.as_str(), config.dry_run),
        })
    };

    if arg.trim().is_empty() {
        return fail(Error::Config("no preset given".into()));
    }
    let preset = match resolve_preset(&arg).and_then(|p| p.validate().map(|_| p)) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let store = match SqliteStore::open(&config.db_path) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    info!(
        "Running preset '{}' against {}",
        preset.name,
        config.db_path.display()
    );
    match Executor::new(&store)
        .with_options(RunOptions::from(config))
        .with_cancel(cancel)
        .run(&preset)
    {
        Ok(summary) => Outcome::Completed(summary),
        Err(e) => Outcome::Failed(e),
    }
}

/// Print the outcome and return the process exit code.
pub fn report(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::Completed(summary) => {
            print!("{}", summary.render());
            println!("Status: COMPLETE");
            0
        }
        Outcome::Failed(failure) => {
            error!("Run failed: {}", failure.error);
            eprintln!("Error: {}", failure.error);
            eprintln!();
            eprint!("{}", failure.summary.render());
            eprintln!("Status: MIGRATION FAILED");
            1
        }
    }
}

/// Check a preset without touching any store.
pub fn validate_preset(arg: &str) -> anyhow::Result<Preset> {
    let preset = resolve_preset(arg)?;
    preset.validate()?;
    Ok(preset)
}

/// One-line description of a preset.
pub fn describe(preset: &Preset) -> String {
    let ops: usize = preset.collections.iter().map(|c| c.operations.len()).sum();
    let names: Vec<&str> = preset.collections.iter().map(|c| c.name.as_str()).collect();
    format!(
        "{}: batch limit {}, {} operations over {}",
        preset.name,
        preset.batch_limit,
        ops,
        names.join(", ")
    )
}

/// Lines for `presets`.
pub fn list_presets() -> Vec<String> {
    builtin_names()
        .iter()
        .filter_map(|name| builtin(name))
        .map(|p| describe(&p))
        .collect()
}

/// Seed a collection from a JSON file: either an array of objects (an `id`
/// string field becomes the document id) or an object of id → fields.
pub fn import_documents(store: &SqliteStore, collection: &str, path: &Path) -> anyhow::Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    let mut count = 0;
    match parsed {
        Value::Array(items) => {
            for (i, item) in items.into_iter().enumerate() {
                let Value::Object(mut fields) = item else {
                    bail!("element {} of {} is not an object", i, path.display());
                };
                let id = match fields.remove("id") {
                    Some(Value::String(id)) => Some(id),
                    Some(other) => bail!("element {} has a non-string id: {}", i, other),
                    None => None,
                };
                store.insert(collection, id.as_deref(), &fields)?;
                count += 1;
            }
        }
        Value::Object(map) => {
            for (id, item) in map {
                let Value::Object(fields) = item else {
                    bail!("document {} in {} is not an object", id, path.display());
                };
                store.insert(collection, Some(id.as_str()), &fields)?;
                count += 1;
            }
        }
        _ => bail!("{} must contain a JSON array or object", path.display()),
    }

    info!("Imported {} documents into {}", count, collection);
    Ok(count)
}
