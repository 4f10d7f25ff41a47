//! # Dotenv Rust Parser
//!
//! A parser for `.env` style configuration files.
//!
//! ## Overview
//!
//! The parser reads `KEY=VALUE` assignments line by line and supports:
//!
//! - **Quoting modes**: bare values with `#` comments, literal `'single'`
//!   quotes, and `"double"` quotes with escape sequences
//! - **Multiline values**: a quoted value continues until its closing quote
//! - **Interpolation**: `${NAME}` references, resolved after the whole file is
//!   read so forward references work, with circular reference detection
//! - **Two error modes**: fail-fast (first error is returned) and accumulate
//!   (every error is collected alongside the variables that did parse)
//! - **Cascading loads**: several files merged with later-wins priority, then
//!   written into a store without clobbering existing entries
//!
//! ## Basic Usage
//!
//! ```rust
//! use dotenv_parser::parse;
//!
//! let content = "HOST=localhost\nPORT=5432\nDATABASE_URL=postgres://${HOST}:${PORT}/mydb";
//! let variables = parse(content)?;
//! assert_eq!(variables["DATABASE_URL"], "postgres://localhost:5432/mydb");
//! # Ok::<(), dotenv_parser::EnvError>(())
//! ```
//!
//! ## Validating a File
//!
//! ```rust
//! use dotenv_parser::{validate, ParseErrorKind};
//!
//! let result = validate("GOOD=1\nnot an assignment\nALSO_GOOD=2");
//! assert!(!result.success());
//! assert_eq!(result.errors[0].kind, ParseErrorKind::MalformedLine);
//! assert_eq!(result.variables["ALSO_GOOD"], "2");
//! ```
//!
//! ## External Environment
//!
//! Names that the source does not define are looked up through a
//! [`VariableHandler`]. Local definitions always take precedence.
//!
//! ```rust
//! use dotenv_parser::{parse_with, MapVariableHandler, ParserConfig};
//!
//! let mut snapshot = MapVariableHandler::new();
//! snapshot.insert("USER", "deploy");
//!
//! let result = parse_with("HOME_DIR=/home/${USER}", ParserConfig::new(), Box::new(snapshot))?;
//! assert_eq!(result.variables["HOME_DIR"], "/home/deploy");
//! # Ok::<(), dotenv_parser::EnvError>(())
//! ```
//!
//! ## Cascading Files
//!
//! ```rust,no_run
//! use dotenv_parser::{EnvLoader, MemoryStore};
//!
//! let mut store = MemoryStore::new();
//! let report = EnvLoader::new()
//!     .source(".env")
//!     .source(".env.production")
//!     .source(".env.local")
//!     .load_into(&mut store)?;
//! println!("wrote {} variables", report.written.len());
//! # Ok::<(), dotenv_parser::EnvError>(())
//! ```

pub mod error;
pub mod interpolation;
pub mod lexer;
pub mod loader;
pub mod parser;


// Re-export main types and functions
pub use error::{EnvError, ParseError, ParseErrorKind};
pub use lexer::{StringFormat, is_valid_key};
pub use loader::{
    EnvLoader, EnvStore, LoadReport, MemoryStore, ProcessEnvStore, dotenv, load_into_store,
};
pub use parser::{
    EnvMap, EnvParser, ErrorMode, ParseResult, ParserConfig, parse, parse_file, parse_with,
    validate,
};

// Re-export variable handler types
pub use interpolation::{
    ChainedVariableHandler, EnvironmentVariableHandler, MapVariableHandler, NoVariableHandler,
    VariableHandler,
};
