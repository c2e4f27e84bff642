//! Inspect and populate a SQLite catalog.
//!
//! # Usage
//!
//! ```bash
//! # List schemas with their class counts
//! cargo run --bin catalog_inspect -- schemas
//!
//! # List the classes of one schema
//! cargo run --bin catalog_inspect -- classes Plant
//!
//! # List the unit family, grouped by schema
//! cargo run --bin catalog_inspect -- units
//!
//! # Import JSON schema definitions (store.readonly must be false)
//! cargo run --bin catalog_inspect -- import units.json plant.json
//! ```
//!
//! The store and logging settings come from `metacatalog.toml`, the file
//! named by `METACATALOG_CONFIG`, or `--config <path>`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use metacatalog::{
    units_by_schema, CatalogConfig, FileUnitsLocator, SchemaDef, SchemaManager, SqliteStore,
};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let config = match args.iter().position(|a| a == "--config") {
        Some(index) => {
            let path = args
                .get(index + 1)
                .cloned()
                .context("--config needs a path")?;
            args.drain(index..=index + 1);
            CatalogConfig::load(Path::new(&path))?
        }
        None => CatalogConfig::load_default(),
    };
    init_logging(&config)?;

    let Some(command) = args.first().cloned() else {
        print_usage();
        process::exit(1);
    };
    match command.as_str() {
        "schemas" => cmd_schemas(&config),
        "classes" => cmd_classes(&config, &args[1..]),
        "units" => cmd_units(&config),
        "import" => cmd_import(&config, &args[1..]),
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        cmd => {
            eprintln!("Error: Unknown command '{}'", cmd);
            print_usage();
            process::exit(1);
        }
    }
}

fn init_logging(config: &CatalogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("Invalid logging filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn open_manager(config: &CatalogConfig, readonly: bool) -> Result<SchemaManager<SqliteStore>> {
    let path = &config.store.path;
    let store = if readonly {
        SqliteStore::open_readonly(path)
    } else {
        SqliteStore::open(path)
    }
    .with_context(|| format!("Failed to open catalog: {}", path.display()))?;

    Ok(match &config.legacy_units.directory {
        Some(directory) => {
            SchemaManager::with_units_locator(store, Box::new(FileUnitsLocator::new(directory)))
        }
        None => SchemaManager::new(store),
    })
}

fn cmd_schemas(config: &CatalogConfig) -> Result<()> {
    let manager = open_manager(config, config.store.readonly)?;
    let schemas = manager.get_schemas(false)?;
    println!("{} schemas in {}", schemas.len(), config.store.path.display());
    for schema in schemas {
        let classes = manager.with_store(|store| {
            metacatalog::CatalogStore::class_ids(store, schema.id).map(|ids| ids.len())
        })?;
        println!(
            "  {:<32} {:<12} {}  {} classes",
            schema.name, schema.alias, schema.version, classes
        );
    }
    Ok(())
}

fn cmd_classes(config: &CatalogConfig, args: &[String]) -> Result<()> {
    let [name] = args else {
        bail!("Usage: catalog_inspect classes <schema>");
    };
    let manager = open_manager(config, config.store.readonly)?;
    let schema = manager
        .get_schema(name, true)?
        .with_context(|| format!("No schema named '{}'", name))?;
    println!("{} ({})", schema.full_name(), schema.label());
    for id in schema.class_ids() {
        if let Some(class) = manager.get_class_by_id(id)? {
            println!(
                "  {:<32} {:?}, {} properties",
                class.name,
                class.class_type(),
                class.properties.len()
            );
        }
    }
    Ok(())
}

fn cmd_units(config: &CatalogConfig) -> Result<()> {
    let manager = open_manager(config, config.store.readonly)?;
    let catalog = manager.get_unit_catalog()?;
    println!("unit catalog ({:?})", catalog.source);
    let mut grouped: Vec<_> = units_by_schema(&catalog).into_iter().collect();
    grouped.sort();
    for (schema, units) in grouped {
        println!("  {}: {}", schema, units.join(", "));
    }
    Ok(())
}

fn cmd_import(config: &CatalogConfig, args: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("Usage: catalog_inspect import <schema.json> [<schema.json> ...]");
    }
    if config.store.readonly {
        bail!("store.readonly is set, refusing to import");
    }
    let defs = args
        .iter()
        .map(|path| load_definition(Path::new(path)))
        .collect::<Result<Vec<_>>>()?;
    let manager = open_manager(config, false)?;
    for schema in manager.import_schemas(defs)? {
        println!("✓ {}", schema.full_name());
    }
    Ok(())
}

fn load_definition(path: &Path) -> Result<SchemaDef> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse schema file: {}", path.display()))
}

fn print_usage() {
    let default_config = PathBuf::from(metacatalog::config::CONFIG_FILE_NAME);
    println!("catalog_inspect - inspect a metadata catalog");
    println!();
    println!("USAGE:");
    println!("    catalog_inspect [--config <path>] <command> [args]");
    println!();
    println!("COMMANDS:");
    println!("    schemas               List schemas and class counts");
    println!("    classes <schema>      List the classes of a schema");
    println!("    units                 List the unit family");
    println!("    import <file>...      Import JSON schema definitions");
    println!();
    println!("Configuration defaults to {}", default_config.display());
}
