//! Cascading loads from several env files
//!
//! Sources are listed from lowest to highest priority. Each one is parsed on
//! its own, a later source overrides keys from an earlier one, and a source
//! that does not exist is skipped. The merged variables can then be written
//! into an [`EnvStore`], where existing entries win unless overriding is
//! enabled.

use crate::error::{EnvError, ParseError};
use crate::interpolation::VariableHandler;
use crate::parser::{EnvMap, EnvParser, ErrorMode, ParseResult, ParserConfig};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for loaded variables
pub trait EnvStore {
    /// Current value of `key`, if set
    fn get(&self, key: &str) -> Option<String>;

    /// Returns true if `key` is set
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key` to `value`
    fn set(&mut self, key: &str, value: &str) -> Result<(), EnvError>;
}

/// The environment of the current process.
///
/// Writes are meant for start-up, before other threads read or modify the
/// environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvStore;

impl EnvStore for ProcessEnvStore {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn contains(&self, key: &str) -> bool {
        std::env::var_os(key).is_some()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), EnvError> {
        if key.is_empty() || key.contains(['=', '\0']) {
            return Err(EnvError::Store {
                key: key.to_string(),
                message: "key is not a valid environment variable name".to_string(),
            });
        }
        if value.contains('\0') {
            return Err(EnvError::Store {
                key: key.to_string(),
                message: "value contains a NUL character".to_string(),
            });
        }
        // SAFETY: loading happens once at start-up from a single thread; no
        // other thread reads or writes the environment concurrently.
        unsafe { std::env::set_var(key, value) };
        Ok(())
    }
}

/// In-memory store, useful for tests and for building an environment for a
/// child process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    variables: EnvMap,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `variables`
    pub fn from_map(variables: EnvMap) -> Self {
        Self { variables }
    }

    pub fn variables(&self) -> &EnvMap {
        &self.variables
    }

    pub fn into_map(self) -> EnvMap {
        self.variables
    }
}

impl EnvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.variables.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), EnvError> {
        self.variables.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl VariableHandler for MemoryStore {
    fn resolve_variable(&self, name: &str) -> Option<String> {
        self.get(name)
    }
}

/// What a load into a store did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Keys written to the store
    pub written: Vec<String>,
    /// Keys left alone because the store already had them
    pub skipped: Vec<String>,
    /// Errors collected from all sources
    pub errors: Vec<ParseError>,
}

impl LoadReport {
    /// True when no source reported an error
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Writes `variables` into `store`. A key already present in the store is
/// kept unless `override_existing` is set.
///
/// Writes are not transactional. If the store rejects a key, the error names
/// that key and returns at once; keys earlier in `variables` stay written and
/// later ones are not attempted.
pub fn load_into_store(
    variables: &EnvMap,
    store: &mut dyn EnvStore,
    override_existing: bool,
) -> Result<LoadReport, EnvError> {
    let mut report = LoadReport::default();
    for (key, value) in variables {
        if !override_existing && store.contains(key) {
            report.skipped.push(key.clone());
            continue;
        }
        store.set(key, value)?;
        report.written.push(key.clone());
    }
    debug!(
        written = report.written.len(),
        skipped = report.skipped.len(),
        "loaded variables into store"
    );
    Ok(report)
}

/// Loads an ordered list of env files
pub struct EnvLoader {
    sources: Vec<PathBuf>,
    mode: ErrorMode,
    override_existing: bool,
    parser: EnvParser,
}

impl EnvLoader {
    /// Creates a fail-fast loader with no sources
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            mode: ErrorMode::FailFast,
            override_existing: false,
            parser: EnvParser::with_config(ParserConfig::new().with_mode(ErrorMode::Accumulate)),
        }
    }

    /// Loader for the conventional `.env` then `.env.local` cascade in the
    /// current directory
    pub fn dotenv() -> Self {
        Self::new().source(".env").source(".env.local")
    }

    /// Appends a source with higher priority than those already added
    pub fn source<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.sources.push(path.into());
        self
    }

    /// Appends several sources, lowest priority first
    pub fn sources<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.sources.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Sets whether the overall load fails on the first collected error
    pub fn mode(mut self, mode: ErrorMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets whether loaded values replace existing store entries
    pub fn override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    /// Suppresses warnings for unresolved references
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.parser.config_mut().quiet = quiet;
        self
    }

    /// Replaces the external environment used during interpolation
    pub fn with_variable_handler(mut self, handler: Box<dyn VariableHandler>) -> Self {
        self.parser = self.parser.with_variable_handler(handler);
        self
    }

    /// Sources in load order, lowest priority first
    pub fn source_paths(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Parses every source and merges the results, later sources winning
    pub fn load(&self) -> Result<ParseResult, EnvError> {
        let mut merged = ParseResult::default();

        for path in &self.sources {
            let Some(result) = self.load_source(path)? else {
                continue;
            };
            debug!(
                path = %path.display(),
                variables = result.variables.len(),
                errors = result.errors.len(),
                "parsed env source"
            );
            merged.variables.extend(result.variables);
            merged.errors.extend(result.errors);
        }

        if self.mode.is_fail_fast()
            && let Some(err) = merged.first_error()
        {
            return Err(EnvError::Parse(err.clone()));
        }
        Ok(merged)
    }

    /// Loads every source, then writes the merged variables into `store`
    pub fn load_into(&self, store: &mut dyn EnvStore) -> Result<LoadReport, EnvError> {
        let result = self.load()?;
        let mut report = load_into_store(&result.variables, store, self.override_existing)?;
        report.errors = result.errors;
        Ok(report)
    }

    /// Loads every source into the process environment
    pub fn load_into_process_env(&self) -> Result<LoadReport, EnvError> {
        self.load_into(&mut ProcessEnvStore)
    }

    /// Parses one source. `None` means the source does not exist.
    fn load_source(&self, path: &Path) -> Result<Option<ParseResult>, EnvError> {
        match fs::read_to_string(path) {
            Ok(content) => self.parser.parse(&content).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "skipping missing env source");
                Ok(None)
            }
            Err(err) => Ok(Some(ParseResult::new(
                EnvMap::new(),
                vec![ParseError::file_read(&path.display().to_string(), &err)],
            ))),
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Loads `.env` and `.env.local` from the current directory into the process
/// environment without replacing variables that are already set
pub fn dotenv() -> Result<LoadReport, EnvError> {
    EnvLoader::dotenv().load_into_process_env()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;
    use crate::interpolation::NoVariableHandler;
    use std::fs;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn loader() -> EnvLoader {
        EnvLoader::new().with_variable_handler(Box::new(NoVariableHandler))
    }

    /// Memory store that refuses one key
    struct RejectingStore {
        inner: MemoryStore,
        rejected: &'static str,
    }

    impl EnvStore for RejectingStore {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), EnvError> {
            if key == self.rejected {
                return Err(EnvError::Store {
                    key: key.to_string(),
                    message: "rejected".to_string(),
                });
            }
            self.inner.set(key, value)
        }
    }

    #[test]
    fn test_dotenv_cascade_order() {
        let loader = EnvLoader::dotenv();
        assert_eq!(
            loader.source_paths(),
            &[PathBuf::from(".env"), PathBuf::from(".env.local")]
        );

        let loader = loader.sources(["a.env", "b.env"]);
        assert_eq!(loader.source_paths().len(), 4);
        assert_eq!(loader.source_paths()[3], PathBuf::from("b.env"));
    }

    #[test]
    fn test_store_failure_keeps_earlier_writes() {
        let existing: EnvMap = [("KEEP".to_string(), "old".to_string())].into_iter().collect();
        let mut store = RejectingStore {
            inner: MemoryStore::from_map(existing),
            rejected: "BAD",
        };
        let variables: EnvMap = [("FIRST", "1"), ("KEEP", "new"), ("BAD", "x"), ("LAST", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let err = load_into_store(&variables, &mut store, false).unwrap_err();
        assert!(matches!(err, EnvError::Store { ref key, .. } if key == "BAD"));

        let map = store.inner.into_map();
        assert_eq!(map["FIRST"], "1");
        assert_eq!(map["KEEP"], "old");
        assert!(!map.contains_key("BAD"));
        assert!(!map.contains_key("LAST"));
    }

    #[test]
    fn test_later_source_overrides_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(&dir, ".env", "K=base\nONLY1=x\n");
        let local = write(&dir, ".env.local", "K=override\n");

        let result = loader().source(base).source(local).load().unwrap();
        assert!(result.success());
        assert_eq!(result.variables["K"], "override");
        assert_eq!(result.variables["ONLY1"], "x");
    }

    #[test]
    fn test_missing_source_is_skipped_even_in_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(&dir, ".env", "K=base\n");

        let result = loader()
            .source(base)
            .source(dir.path().join("does-not-exist.env"))
            .load()
            .unwrap();
        assert!(result.success());
        assert_eq!(result.variables["K"], "base");
    }

    #[test]
    fn test_errors_are_concatenated_in_source_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(&dir, "first.env", "bad line\nA=1\n");
        let second = write(&dir, "second.env", "1KEY=x\nB=2\n");

        let result = loader()
            .mode(ErrorMode::Accumulate)
            .sources([first, second])
            .load()
            .unwrap();
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].kind, ParseErrorKind::MalformedLine);
        assert_eq!(result.errors[1].kind, ParseErrorKind::InvalidKey);
        assert_eq!(result.variables["A"], "1");
        assert_eq!(result.variables["B"], "2");
    }

    #[test]
    fn test_fail_fast_returns_first_error_across_sources() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(&dir, "first.env", "A=1\n");
        let second = write(&dir, "second.env", "B=\"open\n");
        let third = write(&dir, "third.env", "nope\n");

        let err = loader()
            .sources([first, second, third])
            .load()
            .unwrap_err();
        assert_eq!(err.kind(), Some(ParseErrorKind::UnterminatedQuote));
    }

    #[test]
    fn test_unreadable_source_is_file_read_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file
        let result = loader()
            .mode(ErrorMode::Accumulate)
            .source(dir.path())
            .load()
            .unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ParseErrorKind::FileReadError);
    }

    #[test]
    fn test_store_entries_win_by_default() {
        let mut variables = EnvMap::new();
        variables.insert("K".to_string(), "new".to_string());
        variables.insert("FRESH".to_string(), "1".to_string());

        let mut store = MemoryStore::new();
        store.set("K", "orig").unwrap();

        let report = load_into_store(&variables, &mut store, false).unwrap();
        assert_eq!(store.get("K").as_deref(), Some("orig"));
        assert_eq!(store.get("FRESH").as_deref(), Some("1"));
        assert_eq!(report.skipped, vec!["K"]);
        assert_eq!(report.written, vec!["FRESH"]);

        let report = load_into_store(&variables, &mut store, true).unwrap();
        assert_eq!(store.get("K").as_deref(), Some("new"));
        assert_eq!(report.written, vec!["K", "FRESH"]);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_load_into_keeps_errors_in_accumulate_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, ".env", "A=1\noops\n");

        let mut store = MemoryStore::new();
        let report = loader()
            .mode(ErrorMode::Accumulate)
            .source(path)
            .load_into(&mut store)
            .unwrap();
        assert!(!report.success());
        assert_eq!(report.written, vec!["A"]);
        assert_eq!(store.get("A").as_deref(), Some("1"));
    }

    #[test]
    fn test_memory_store_as_external_environment() {
        let mut store = MemoryStore::new();
        store.set("REGION", "eu-west-1").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, ".env", "BUCKET=assets-${REGION}\n");
        let result = EnvLoader::new()
            .with_variable_handler(Box::new(store.clone()))
            .source(path)
            .load()
            .unwrap();
        assert_eq!(result.variables["BUCKET"], "assets-eu-west-1");
    }

    #[test]
    fn test_process_store_rejects_nul_values() {
        let mut store = ProcessEnvStore;
        let err = store
            .set("DOTENV_PARSER_LOADER_NUL_TEST", "a\0b")
            .unwrap_err();
        assert!(matches!(err, EnvError::Store { .. }));
        assert!(!store.contains("DOTENV_PARSER_LOADER_NUL_TEST"));
    }
}
