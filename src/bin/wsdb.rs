use serde::Deserialize;
use std::fs;
use std::path::Path;
use wsdb::behavior::workspace::GovernedSchema;
use wsdb::catalog::Catalog;
use wsdb::catalog::schema::TableSchema;
use wsdb::config::WorkspaceConfig;
use wsdb::query::sql::create_table_sql;

/// Input schema: an optional table-name prefix and plain table definitions.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    table_prefix: Option<String>,
    tables: Vec<TableSchema>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Err("missing command".into());
    }
    match args[1].as_str() {
        "augment" => cmd_augment(&args[2..]),
        "ddl" => cmd_ddl(&args[2..]),
        "describe" => cmd_describe(&args[2..]),
        other => {
            print_usage();
            Err(format!("unknown top-level command: {other}"))
        }
    }
}

fn cmd_augment(args: &[String]) -> Result<(), String> {
    let schema = load_governed(args)?;
    let json = serde_json::to_string_pretty(schema.catalog())
        .map_err(|e| format!("encode catalog: {e}"))?;
    emit(args, &json)
}

fn cmd_ddl(args: &[String]) -> Result<(), String> {
    let schema = load_governed(args)?;
    let ddl = schema
        .catalog()
        .tables
        .values()
        .map(create_table_sql)
        .collect::<Vec<_>>()
        .join("\n\n");
    emit(args, &ddl)
}

fn cmd_describe(args: &[String]) -> Result<(), String> {
    let schema = load_governed(args)?;
    for table in schema.governed_tables() {
        println!(
            "{}\t{}\t{}\t{}",
            table.table_name,
            table.version_table,
            table.column_prefix,
            table.columns.len()
        );
    }
    Ok(())
}

fn load_governed(args: &[String]) -> Result<GovernedSchema, String> {
    let schema_path = parse_flag_value(args, "--schema").ok_or("--schema is required")?;
    let catalog = load_catalog(Path::new(&schema_path))?;
    let config = match parse_flag_value(args, "--config") {
        Some(path) => {
            let raw =
                fs::read_to_string(&path).map_err(|e| format!("read config {path}: {e}"))?;
            WorkspaceConfig::from_json(&raw).map_err(|e| format!("config {path}: {e}"))?
        }
        None => WorkspaceConfig::default(),
    };
    GovernedSchema::derive(catalog, config).map_err(|e| format!("augment: {e}"))
}

fn load_catalog(path: &Path) -> Result<Catalog, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
    let file: SchemaFile =
        serde_json::from_str(&raw).map_err(|e| format!("parse {}: {e}", path.display()))?;
    let mut catalog = Catalog::new();
    if let Some(prefix) = file.table_prefix {
        catalog = catalog.with_table_prefix(prefix);
    }
    for table in file.tables {
        let name = table.table_name.clone();
        catalog
            .create_table(table)
            .map_err(|e| format!("table {name}: {e}"))?;
    }
    Ok(catalog)
}

fn emit(args: &[String], output: &str) -> Result<(), String> {
    match parse_flag_value(args, "--out") {
        Some(path) => {
            fs::write(&path, format!("{output}\n")).map_err(|e| format!("write {path}: {e}"))?;
            println!("ok\t{path}");
            Ok(())
        }
        None => {
            println!("{output}");
            Ok(())
        }
    }
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    for idx in 0..args.len() {
        if args[idx] == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  wsdb augment --schema <schema.json> [--config <config.json>] [--out <file>]");
    eprintln!("  wsdb ddl --schema <schema.json> [--config <config.json>] [--out <file>]");
    eprintln!("  wsdb describe --schema <schema.json> [--config <config.json>]");
}
