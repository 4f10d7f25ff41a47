//! `${NAME}` interpolation over parsed variables
//!
//! Interpolation runs as a second pass once every assignment in a source has
//! been read, so a value may refer to a variable defined further down the file.
//! Local variables shadow the external environment; names found in neither
//! expand to the empty string.

use crate::error::ParseError;
use crate::lexer::is_valid_key;
use crate::parser::{RawEntry, RawVariables};
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::warn;

/// Trait for looking up variables that are not defined in the parsed source
pub trait VariableHandler {
    /// Resolves a variable by name
    fn resolve_variable(&self, name: &str) -> Option<String>;
}

/// Reads from the process environment at lookup time
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentVariableHandler;

impl VariableHandler for EnvironmentVariableHandler {
    fn resolve_variable(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// An empty external environment
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVariableHandler;

impl VariableHandler for NoVariableHandler {
    fn resolve_variable(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Map-based variable handler, typically a snapshot of an environment
#[derive(Debug, Clone, Default)]
pub struct MapVariableHandler {
    variables: HashMap<String, String>,
}

impl MapVariableHandler {
    /// Creates an empty handler
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handler from an existing map
    pub fn from_map(variables: HashMap<String, String>) -> Self {
        Self { variables }
    }

    /// Takes a snapshot of the current process environment
    pub fn from_process_env() -> Self {
        Self::from_map(std::env::vars().collect())
    }

    /// Inserts a variable
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Gets a reference to the internal map
    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapVariableHandler {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl VariableHandler for MapVariableHandler {
    fn resolve_variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }
}

/// Tries several handlers in order; the first hit wins
#[derive(Default)]
pub struct ChainedVariableHandler {
    handlers: Vec<Box<dyn VariableHandler>>,
}

impl ChainedVariableHandler {
    /// Creates an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler to the end of the chain
    pub fn add_handler(&mut self, handler: Box<dyn VariableHandler>) {
        self.handlers.push(handler);
    }

    /// Creates a chained handler from a vector of handlers
    pub fn from_handlers(handlers: Vec<Box<dyn VariableHandler>>) -> Self {
        Self { handlers }
    }
}

impl VariableHandler for ChainedVariableHandler {
    fn resolve_variable(&self, name: &str) -> Option<String> {
        self.handlers
            .iter()
            .find_map(|handler| handler.resolve_variable(name))
    }
}

/// Default limit on nested `${NAME}` expansions for one top-level variable
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Why a top-level variable could not be expanded
#[derive(Debug)]
enum ResolveFailure {
    Cycle(Vec<String>),
    TooDeep(Vec<String>),
}

/// Names currently being expanded for one top-level lookup
#[derive(Debug, Clone, Default)]
pub struct ResolutionStack {
    names: SmallVec<[String; 8]>,
}

impl ResolutionStack {
    /// Creates an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `name` is mid-expansion
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|entry| entry == name)
    }

    pub fn push(&mut self, name: &str) {
        self.names.push(name.to_string());
    }

    pub fn pop(&mut self) {
        self.names.pop();
    }

    /// Current expansion depth
    pub fn depth(&self) -> usize {
        self.names.len()
    }

    /// The chain of names that leads back to `name`, e.g. `A -> B -> A`
    pub fn cycle_through(&self, name: &str) -> Vec<String> {
        let mut chain: Vec<String> = self.names.iter().cloned().collect();
        chain.push(name.to_string());
        chain
    }
}

/// Expands `${NAME}` references across a set of raw variables
pub struct Interpolator<'a> {
    raw: &'a RawVariables,
    external: &'a dyn VariableHandler,
    quiet: bool,
    max_depth: usize,
    resolved: HashMap<String, String>,
}

impl<'a> Interpolator<'a> {
    /// Creates an interpolator over `raw`, falling back to `external` for
    /// names the source does not define
    pub fn new(raw: &'a RawVariables, external: &'a dyn VariableHandler) -> Self {
        Self {
            raw,
            external,
            quiet: false,
            max_depth: DEFAULT_MAX_DEPTH,
            resolved: HashMap::new(),
        }
    }

    /// Suppresses warnings about unresolved names
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Caps how many variables may be mid-expansion at once
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Expands every raw variable. A variable caught in a cycle keeps its raw
    /// value and the cycle is reported; with `stop_on_error` the pass ends at
    /// the first cycle.
    pub fn resolve_all(
        mut self,
        stop_on_error: bool,
    ) -> (IndexMap<String, String>, Vec<ParseError>) {
        let raw = self.raw;
        let mut variables = IndexMap::with_capacity(raw.len());
        let mut errors = Vec::new();

        for (key, entry) in raw {
            let mut stack = ResolutionStack::new();
            match self.resolve_variable(key, entry, &mut stack) {
                Ok(value) => {
                    variables.insert(key.clone(), value);
                }
                Err(failure) => {
                    errors.push(match failure {
                        ResolveFailure::Cycle(chain) => ParseError::circular_reference(
                            entry.line_number,
                            &entry.raw_content,
                            &chain,
                        ),
                        ResolveFailure::TooDeep(chain) => ParseError::reference_too_deep(
                            entry.line_number,
                            &entry.raw_content,
                            self.max_depth,
                            &chain,
                        ),
                    });
                    variables.insert(key.clone(), entry.value.clone());
                    if stop_on_error {
                        break;
                    }
                }
            }
        }

        (variables, errors)
    }

    fn resolve_variable(
        &mut self,
        name: &str,
        entry: &RawEntry,
        stack: &mut ResolutionStack,
    ) -> Result<String, ResolveFailure> {
        if !entry.format.needs_expansion() {
            return Ok(entry.value.clone());
        }
        if let Some(value) = self.resolved.get(name) {
            return Ok(value.clone());
        }

        stack.push(name);
        let expanded = self.expand(&entry.value, stack);
        stack.pop();

        let value = expanded?;
        self.resolved.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Replaces each `${NAME}` in `input`. Text that looks like a reference
    /// but does not hold a valid identifier is copied through.
    fn expand(
        &mut self,
        input: &str,
        stack: &mut ResolutionStack,
    ) -> Result<String, ResolveFailure> {
        let mut result = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) if is_valid_key(&after[..end]) => {
                    let name = &after[..end];
                    let value = self.lookup(name, stack)?;
                    result.push_str(&value);
                    rest = &after[end + 1..];
                }
                _ => {
                    result.push_str("${");
                    rest = after;
                }
            }
        }
        result.push_str(rest);

        Ok(result)
    }

    fn lookup(
        &mut self,
        name: &str,
        stack: &mut ResolutionStack,
    ) -> Result<String, ResolveFailure> {
        let raw = self.raw;
        if let Some(entry) = raw.get(name) {
            if stack.contains(name) {
                return Err(ResolveFailure::Cycle(stack.cycle_through(name)));
            }
            if stack.depth() >= self.max_depth {
                return Err(ResolveFailure::TooDeep(stack.cycle_through(name)));
            }
            return self.resolve_variable(name, entry, stack);
        }

        if let Some(value) = self.external.resolve_variable(name) {
            return Ok(value);
        }

        if !self.quiet {
            warn!(
                variable = name,
                "Variable '{}' is not defined; substituting an empty string", name
            );
        }
        Ok(String::new())
    }
}
