//! Basic usage example for the env file parser
//!
//! Parses an env file, validates a broken one, and loads a cascade of files
//! into an in-memory store. Run with `RUST_LOG=dotenv_parser=debug` to see
//! the parser's log output.

use dotenv_parser::{
    EnvError, EnvLoader, EnvStore, MapVariableHandler, MemoryStore, ParserConfig, parse_with,
    validate,
};
use std::fs;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> Result<(), EnvError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let env_text = r#"
# Database settings
HOST=localhost
PORT=5432
DATABASE_URL=postgres://${USER}@${HOST}:${PORT}/mydb
GREETING="Hello,\n${USER}!"
RAW='${NOT_EXPANDED}'
"#;

    let mut snapshot = MapVariableHandler::new();
    snapshot.insert("USER", "admin");

    let result = parse_with(env_text, ParserConfig::new(), Box::new(snapshot))?;
    println!("Parsed variables:");
    for (key, value) in &result.variables {
        println!("  {} = {:?}", key, value);
    }

    let broken = "GOOD=1\nthis line has no equals\n2FAST=x\nLOOP=${LOOP}\n";
    let report = validate(broken);
    println!("\nValidation passed: {}", report.success());
    for error in &report.errors {
        println!("  [{}] {}", error.kind, error);
    }

    let dir = std::env::temp_dir().join("dotenv-parser-demo");
    if fs::create_dir_all(&dir).is_ok()
        && fs::write(dir.join(".env"), "MODE=development\nPORT=3000\n").is_ok()
        && fs::write(dir.join(".env.local"), "PORT=4000\n").is_ok()
    {
        let mut store = MemoryStore::new();
        store.set("MODE", "ci")?;

        let loaded = EnvLoader::new()
            .source(dir.join(".env"))
            .source(dir.join(".env.local"))
            .source(dir.join(".env.missing"))
            .load_into(&mut store)?;
        println!("\nWritten: {:?}, kept existing: {:?}", loaded.written, loaded.skipped);
        println!("Store: {:?}", store.variables());
    }

    Ok(())
}
