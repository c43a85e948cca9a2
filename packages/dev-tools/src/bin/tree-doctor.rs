//! Tree Doctor
//!
//! Checks (and optionally repairs) the nested-set boundaries of a libsql database.
//!
//! # Usage
//!
//! ```bash
//! # Report every scope of the table described by menus.json
//! cargo run --bin tree-doctor -- ./data/menus.db menus.json check
//!
//! # Recompute one scope from its parent pointers
//! cargo run --bin tree-doctor -- ./data/menus.db menus.json fix '{"menu_id": 2}'
//! ```
//!
//! The config file is a JSON `TreeTableConfig`; omitted fields take their defaults.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (e.g., "info", "debug")

use anyhow::{anyhow, bail, Context};
use clap::{Parser, ValueEnum};
use nestedset_core::models::{ScopeKey, ScopeValue};
use nestedset_core::{NestedSetService, TreeTableConfig};
use serde_json::Value;
use std::path::PathBuf;

/// Check or repair the nested-set boundaries of a libsql database
#[derive(Debug, Parser)]
#[command(name = "tree-doctor")]
#[command(about = "Check or repair nested-set boundaries", long_about = None)]
struct Args {
    /// Path to the libsql database file
    db: PathBuf,

    /// JSON `TreeTableConfig` describing the table
    config: PathBuf,

    #[arg(value_enum)]
    mode: Mode,

    /// Restrict to one scope, e.g. '{"menu_id": 2}'
    scope: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Report every scope
    Check,
    /// Recompute broken scopes from parent pointers
    Fix,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let db_path = args.db;
    let config_text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("Failed to read config file {}", args.config.display()))?;
    let config: TreeTableConfig =
        serde_json::from_str(&config_text).context("Invalid table configuration")?;
    let mode = args.mode;

    if !db_path.exists() {
        bail!("database {} does not exist", db_path.display());
    }

    tracing::info!("Database: {}", db_path.display());
    tracing::info!("Table: {}", config.table);

    let service = NestedSetService::open(db_path, config).await?;

    let scopes = match args.scope.as_deref() {
        Some(raw) => vec![service.resolver().normalize(&parse_scope(raw)?)?],
        None => service.list_scopes().await?,
    };

    let mut broken = 0;
    for scope in &scopes {
        let report = service.count_errors(scope).await?;
        let status = if report.is_broken() { "BROKEN" } else { "ok" };
        println!("{} {}: {}", status, scope, report);

        if !report.is_broken() {
            continue;
        }

        match mode {
            Mode::Check => broken += 1,
            Mode::Fix => {
                let summary = service.fix_tree(scope).await?;
                let after = service.count_errors(scope).await?;
                println!("  fixed {} row(s): {}", summary.updated, after);
                if after.is_broken() {
                    broken += 1;
                }
            }
        }
    }

    tracing::info!("Checked {} scope(s)", scopes.len());

    if broken > 0 {
        bail!("{} scope(s) still broken", broken);
    }
    Ok(())
}

/// Parse `{"menu_id": 2, "lang": "en"}` into a scope key
fn parse_scope(raw: &str) -> anyhow::Result<ScopeKey> {
    let value: Value = serde_json::from_str(raw).context("Scope must be a JSON object")?;
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("Scope must be a JSON object, got {}", value))?;

    object
        .iter()
        .map(|(column, value)| -> anyhow::Result<(String, ScopeValue)> {
            let value = match value {
                Value::String(text) => ScopeValue::Text(text.clone()),
                Value::Number(number) => number
                    .as_i64()
                    .map(ScopeValue::Integer)
                    .ok_or_else(|| anyhow!("Scope value for '{}' must be an integer", column))?,
                other => bail!("Unsupported scope value for '{}': {}", column, other),
            };
            Ok((column.clone(), value))
        })
        .collect()
}
