//! Env file parser
//!
//! The parser walks the lines produced by the lexer, owns the single pending
//! multiline value, and collects a raw variable map together with every error
//! found. Interpolation then expands the raw map, and the result is either
//! returned whole (accumulate mode) or reduced to its first error (fail-fast
//! mode).

use crate::error::{EnvError, ParseError, ParseErrorKind};
use crate::interpolation::{
    DEFAULT_MAX_DEPTH, EnvironmentVariableHandler, Interpolator, VariableHandler,
};
use crate::lexer::{
    EnvLexer, LineKind, MultilineBuffer, StringFormat, decode_line, normalize_line_endings,
};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// Expanded variables in source order
pub type EnvMap = IndexMap<String, String>;

/// Raw variables in source order, before interpolation
pub type RawVariables = IndexMap<String, RawEntry>;

/// How errors are surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Stop at the first error and return it
    #[default]
    FailFast,
    /// Collect every error and keep going
    Accumulate,
}

impl ErrorMode {
    pub fn is_fail_fast(self) -> bool {
        self == ErrorMode::FailFast
    }
}

/// Configuration options for the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Error surfacing mode
    pub mode: ErrorMode,
    /// Suppress warnings for references that resolve to nothing
    pub quiet: bool,
    /// Expand `${NAME}` references
    pub interpolate: bool,
    /// Maximum number of variables mid-expansion at once
    pub max_depth: usize,
}

impl ParserConfig {
    /// Creates a new parser configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the error mode
    pub fn with_mode(mut self, mode: ErrorMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets whether unresolved references are reported
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Sets whether `${NAME}` references are expanded
    pub fn with_interpolation(mut self, interpolate: bool) -> Self {
        self.interpolate = interpolate;
        self
    }

    /// Sets the maximum reference nesting depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            mode: ErrorMode::FailFast,
            quiet: false,
            interpolate: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A variable as assigned in the source, before interpolation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Decoded value with `${...}` references still in place
    pub value: String,
    /// Quoting mode the value was written in
    pub format: StringFormat,
    /// Line of the assignment (first line for multiline values)
    pub line_number: usize,
    /// Text of that line
    pub raw_content: String,
}

/// Outcome of parsing one or more sources
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseResult {
    /// Expanded variables
    pub variables: EnvMap,
    /// Errors in the order they were found
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn new(variables: EnvMap, errors: Vec<ParseError>) -> Self {
        Self { variables, errors }
    }

    /// True when no error was recorded
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<&ParseError> {
        self.errors.first()
    }

    /// Errors of a single kind
    pub fn errors_of_kind(&self, kind: ParseErrorKind) -> impl Iterator<Item = &ParseError> + '_ {
        self.errors.iter().filter(move |err| err.kind == kind)
    }

    /// Returns the variables, or the first error if there was any
    pub fn into_result(self) -> Result<EnvMap, EnvError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(EnvError::Parse(err)),
            None => Ok(self.variables),
        }
    }
}

impl Serialize for ParseResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ParseResult", 3)?;
        state.serialize_field("variables", &self.variables)?;
        state.serialize_field("errors", &self.errors)?;
        state.serialize_field("success", &self.success())?;
        state.end()
    }
}

/// Env file parser
pub struct EnvParser {
    config: ParserConfig,
    variable_handler: Box<dyn VariableHandler>,
}

impl EnvParser {
    /// Creates a fail-fast parser that falls back to the process environment
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    /// Creates a parser with custom configuration
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            variable_handler: Box::new(EnvironmentVariableHandler),
        }
    }

    /// Replaces the external environment used for names not defined locally
    pub fn with_variable_handler(mut self, handler: Box<dyn VariableHandler>) -> Self {
        self.variable_handler = handler;
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut ParserConfig {
        &mut self.config
    }

    /// Parses `content`. In fail-fast mode the first error is returned as
    /// `Err`; in accumulate mode errors are reported in the result.
    pub fn parse(&self, content: &str) -> Result<ParseResult, EnvError> {
        self.report(self.parse_to_result(content))
    }

    /// Reads and parses a file. A file that cannot be read is reported as a
    /// `FileReadError`.
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<ParseResult, EnvError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => self.parse(&content),
            Err(err) => self.report(ParseResult::new(
                EnvMap::new(),
                vec![ParseError::file_read(&path.display().to_string(), &err)],
            )),
        }
    }

    /// First pass: reads every assignment without interpolating.
    pub fn parse_raw(&self, content: &str) -> (RawVariables, Vec<ParseError>) {
        let normalized = normalize_line_endings(content);
        let stop_on_error = self.config.mode.is_fail_fast();
        let mut variables = RawVariables::new();
        let mut errors = Vec::new();
        let mut pending: Option<MultilineBuffer> = None;

        for line in EnvLexer::new(&normalized) {
            if let Some(buffer) = &mut pending {
                if let Some(value) = buffer.push_line(line.text) {
                    trace!(line = buffer.start_line, key = %buffer.key, "closed multiline value");
                    let entry = RawEntry {
                        value,
                        format: buffer.format(),
                        line_number: buffer.start_line,
                        raw_content: std::mem::take(&mut buffer.start_content),
                    };
                    variables.insert(std::mem::take(&mut buffer.key), entry);
                    pending = None;
                }
                continue;
            }

            match decode_line(line.text) {
                LineKind::Skip => {}
                LineKind::Malformed => {
                    errors.push(ParseError::malformed_line(line.number, line.text));
                }
                LineKind::InvalidKey(key) => {
                    errors.push(ParseError::invalid_key(line.number, line.text, key));
                }
                LineKind::Assignment { key, value, format } => {
                    trace!(line = line.number, key, "parsed assignment");
                    variables.insert(
                        key.to_string(),
                        RawEntry {
                            value,
                            format,
                            line_number: line.number,
                            raw_content: line.text.to_string(),
                        },
                    );
                }
                LineKind::OpenQuote {
                    key,
                    partial,
                    quote,
                } => {
                    pending = Some(MultilineBuffer::new(key, partial, quote, line));
                }
            }

            if stop_on_error && !errors.is_empty() {
                return (variables, errors);
            }
        }

        if let Some(buffer) = pending {
            errors.push(ParseError::unterminated_quote(
                buffer.start_line,
                &buffer.start_content,
                &buffer.key,
                buffer.quote,
            ));
        }

        (variables, errors)
    }

    fn parse_to_result(&self, content: &str) -> ParseResult {
        let fail_fast = self.config.mode.is_fail_fast();
        let (raw, mut errors) = self.parse_raw(content);
        if fail_fast && !errors.is_empty() {
            return ParseResult::new(EnvMap::new(), errors);
        }

        let variables = if self.config.interpolate {
            let (variables, interpolation_errors) =
                Interpolator::new(&raw, self.variable_handler.as_ref())
                    .quiet(self.config.quiet)
                    .max_depth(self.config.max_depth)
                    .resolve_all(fail_fast);
            errors.extend(interpolation_errors);
            variables
        } else {
            raw.into_iter()
                .map(|(key, entry)| (key, entry.value))
                .collect()
        };

        debug!(
            variables = variables.len(),
            errors = errors.len(),
            "parsed env content"
        );
        ParseResult::new(variables, errors)
    }

    fn report(&self, result: ParseResult) -> Result<ParseResult, EnvError> {
        if self.config.mode.is_fail_fast()
            && let Some(err) = result.first_error()
        {
            return Err(EnvError::Parse(err.clone()));
        }
        Ok(result)
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses env content in fail-fast mode, falling back to the process
/// environment for names not defined in `content`
pub fn parse(content: &str) -> Result<EnvMap, EnvError> {
    EnvParser::new()
        .parse(content)
        .map(|result| result.variables)
}

/// Parses env content with a custom configuration and external environment
pub fn parse_with(
    content: &str,
    config: ParserConfig,
    handler: Box<dyn VariableHandler>,
) -> Result<ParseResult, EnvError> {
    EnvParser::with_config(config)
        .with_variable_handler(handler)
        .parse(content)
}

/// Reads and parses a file in fail-fast mode
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<EnvMap, EnvError> {
    EnvParser::new()
        .parse_file(path)
        .map(|result| result.variables)
}

/// Checks a whole file's content, collecting every error without warnings
pub fn validate(content: &str) -> ParseResult {
    EnvParser::with_config(
        ParserConfig::new()
            .with_mode(ErrorMode::Accumulate)
            .with_quiet(true),
    )
    .parse_to_result(content)
}
