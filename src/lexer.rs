//! Env file lexical analysis
//!
//! This module splits normalized input into numbered lines and classifies each
//! line on its own: blank or comment, malformed, an assignment with a decoded
//! value, or the opening of a quoted value that continues on later lines.
//! Continuation lines are fed into a [`MultilineBuffer`], which the parser owns.

use std::borrow::Cow;

/// How a value was written in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    /// Bare value, comment stripped and trimmed
    Unquoted,
    /// `'...'`, taken literally
    Single,
    /// `"..."`, with escape sequences resolved when the value closes on
    /// its opening line
    Double,
}

impl StringFormat {
    /// Returns true if `${NAME}` references in the value are expanded
    pub fn needs_expansion(self) -> bool {
        !matches!(self, StringFormat::Single)
    }

    fn from_quote(quote: char) -> Self {
        if quote == '\'' {
            StringFormat::Single
        } else {
            StringFormat::Double
        }
    }
}

/// A physical line of input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLine<'a> {
    /// Line number (1-based)
    pub number: usize,
    /// Line text without its terminator
    pub text: &'a str,
}

/// Classification of a single line outside of a multiline value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Blank line or `#` comment
    Skip,
    /// Non-comment line without `=`
    Malformed,
    /// The text before `=` is not a valid identifier
    InvalidKey(&'a str),
    /// A complete `KEY=VALUE` assignment
    Assignment {
        key: &'a str,
        value: String,
        format: StringFormat,
    },
    /// A quoted value whose closing delimiter is not on this line
    OpenQuote {
        key: &'a str,
        partial: &'a str,
        quote: char,
    },
}

/// Result of decoding the text after `=`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue<'a> {
    /// The value is complete on this line
    Complete { value: String, format: StringFormat },
    /// The quoted value continues on the next line
    NeedsContinuation { partial: &'a str, quote: char },
}

/// A quoted value spanning several lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultilineBuffer {
    /// Key being assigned
    pub key: String,
    /// Raw text collected so far, lines joined with `\n`
    pub accumulated_value: String,
    /// Delimiter that closes the value
    pub quote: char,
    /// Line on which the value was opened
    pub start_line: usize,
    /// Text of the opening line, kept for error reporting
    pub start_content: String,
}

impl MultilineBuffer {
    /// Opens a buffer for a value that was not closed on `start_line`
    pub fn new(key: &str, partial: &str, quote: char, line: RawLine<'_>) -> Self {
        Self {
            key: key.to_string(),
            accumulated_value: partial.to_string(),
            quote,
            start_line: line.number,
            start_content: line.text.to_string(),
        }
    }

    /// Feeds the next physical line. Returns the accumulated text once the
    /// line contains the delimiter; otherwise the line is accumulated.
    ///
    /// Continuation lines are taken as written: the first delimiter closes
    /// the value and no escape sequences are resolved.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        match line.find(self.quote) {
            Some(end) => {
                let mut value = std::mem::take(&mut self.accumulated_value);
                value.push('\n');
                value.push_str(&line[..end]);
                Some(value)
            }
            None => {
                self.accumulated_value.push('\n');
                self.accumulated_value.push_str(line);
                None
            }
        }
    }

    /// Format of the value once closed
    pub fn format(&self) -> StringFormat {
        StringFormat::from_quote(self.quote)
    }
}

/// Iterator over the numbered lines of normalized input
pub struct EnvLexer<'a> {
    lines: std::iter::Enumerate<std::str::Split<'a, char>>,
}

impl<'a> EnvLexer<'a> {
    /// Creates a lexer over input that has already been through
    /// [`normalize_line_endings`]
    pub fn new(input: &'a str) -> Self {
        Self {
            lines: input.split('\n').enumerate(),
        }
    }
}

impl<'a> Iterator for EnvLexer<'a> {
    type Item = RawLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines
            .next()
            .map(|(index, text)| RawLine { number: index + 1, text })
    }
}

/// Converts CRLF and lone CR line breaks to LF
pub fn normalize_line_endings(input: &str) -> Cow<'_, str> {
    if input.contains('\r') {
        Cow::Owned(input.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(input)
    }
}

/// Checks a key against `^[a-zA-Z_][a-zA-Z0-9_]*$`
pub fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Classifies a line that is not part of an open multiline value
pub fn decode_line(text: &str) -> LineKind<'_> {
    let mut content = text.trim_start();
    if content.is_empty() || content.starts_with('#') {
        return LineKind::Skip;
    }

    // Shell compatibility: `export KEY=value`
    if let Some(rest) = content.strip_prefix("export")
        && rest.starts_with([' ', '\t'])
    {
        content = rest.trim_start();
    }

    let Some(eq) = content.find('=') else {
        return LineKind::Malformed;
    };

    let key = content[..eq].trim();
    if !is_valid_key(key) {
        return LineKind::InvalidKey(key);
    }

    match decode_value(&content[eq + 1..]) {
        DecodedValue::Complete { value, format } => LineKind::Assignment { key, value, format },
        DecodedValue::NeedsContinuation { partial, quote } => {
            LineKind::OpenQuote { key, partial, quote }
        }
    }
}

/// Decodes the raw text after `=`, choosing the quoting mode from its first
/// non-space character
pub fn decode_value(raw: &str) -> DecodedValue<'_> {
    let value = raw.trim_start();

    match value.chars().next() {
        Some(quote @ ('\'' | '"')) => {
            let body = &value[1..];
            match find_closing_quote(body, quote) {
                Some(end) => {
                    let inner = &body[..end];
                    let decoded = if quote == '"' {
                        unescape_double_quoted(inner).into_owned()
                    } else {
                        inner.to_string()
                    };
                    DecodedValue::Complete {
                        value: decoded,
                        format: StringFormat::from_quote(quote),
                    }
                }
                None => DecodedValue::NeedsContinuation {
                    partial: body,
                    quote,
                },
            }
        }
        _ => DecodedValue::Complete {
            value: strip_inline_comment(value.trim()).trim_end().to_string(),
            format: StringFormat::Unquoted,
        },
    }
}

/// Finds the byte offset of the closing delimiter. Inside double quotes a
/// backslash escapes the following character.
fn find_closing_quote(text: &str, quote: char) -> Option<usize> {
    let mut chars = text.char_indices();
    while let Some((index, ch)) = chars.next() {
        if ch == quote {
            return Some(index);
        }
        if ch == '\\' && quote == '"' {
            chars.next();
        }
    }
    None
}

/// Truncates an unquoted value at the first `#` outside of quotes
pub fn strip_inline_comment(value: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;

    for (index, ch) in value.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double => return &value[..index],
            _ => {}
        }
    }
    value
}

/// Resolves `\n`, `\t`, `\r`, `\\` and `\"`. Unknown escapes are kept as
/// written, backslash included.
pub fn unescape_double_quoted(input: &str) -> Cow<'_, str> {
    if !input.contains('\\') {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    Cow::Owned(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(text: &str) -> (String, String, StringFormat) {
        match decode_line(text) {
            LineKind::Assignment { key, value, format } => (key.to_string(), value, format),
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_keys() {
        assert!(is_valid_key("KEY"));
        assert!(is_valid_key("_private"));
        assert!(is_valid_key("camelCase_2"));
        assert!(is_valid_key("a"));
    }

    #[test]
    fn test_invalid_keys() {
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("1KEY"));
        assert!(!is_valid_key("MY-KEY"));
        assert!(!is_valid_key("MY KEY"));
        assert!(!is_valid_key("KÉY"));
    }

    #[test]
    fn test_skip_blank_and_comment_lines() {
        assert_eq!(decode_line(""), LineKind::Skip);
        assert_eq!(decode_line("   \t"), LineKind::Skip);
        assert_eq!(decode_line("# comment"), LineKind::Skip);
        assert_eq!(decode_line("   # indented comment"), LineKind::Skip);
    }

    #[test]
    fn test_malformed_and_invalid_key() {
        assert_eq!(decode_line("JUST_A_WORD"), LineKind::Malformed);
        assert_eq!(decode_line("9LIVES=cat"), LineKind::InvalidKey("9LIVES"));
        assert_eq!(decode_line("=value"), LineKind::InvalidKey(""));
    }

    #[test]
    fn test_unquoted_value() {
        let (key, value, format) = assignment("  KEY =  some value   ");
        assert_eq!(key, "KEY");
        assert_eq!(value, "some value");
        assert_eq!(format, StringFormat::Unquoted);
    }

    #[test]
    fn test_unquoted_inline_comment() {
        let (_, value, _) = assignment("PORT=5432 # database port");
        assert_eq!(value, "5432");

        let (_, value, _) = assignment("EMPTY=# nothing here");
        assert_eq!(value, "");
    }

    #[test]
    fn test_unquoted_hash_inside_embedded_quotes() {
        let (_, value, _) = assignment("TAG=a\"#b\"c # trailing");
        assert_eq!(value, "a\"#b\"c");
    }

    #[test]
    fn test_export_prefix() {
        let (key, value, _) = assignment("export   DB_HOST=localhost");
        assert_eq!(key, "DB_HOST");
        assert_eq!(value, "localhost");

        // `export` alone is an ordinary key
        let (key, _, _) = assignment("export=1");
        assert_eq!(key, "export");
    }

    #[test]
    fn test_single_quoted_is_literal() {
        let (_, value, format) = assignment(r"A='${X}\n'");
        assert_eq!(value, r"${X}\n");
        assert_eq!(format, StringFormat::Single);
        assert!(!format.needs_expansion());
    }

    #[test]
    fn test_double_quoted_escapes() {
        let (_, value, format) = assignment(r#"A="First\nSecond\t\"quoted\" \\ \q""#);
        assert_eq!(value, "First\nSecond\t\"quoted\" \\ \\q");
        assert_eq!(format, StringFormat::Double);
    }

    #[test]
    fn test_text_after_closing_quote_is_ignored() {
        let (_, value, _) = assignment(r#"A="value" # comment"#);
        assert_eq!(value, "value");
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(assignment("A=").1, "");
        assert_eq!(assignment("A=''").1, "");
        assert_eq!(assignment("A=\"\"").1, "");
    }

    #[test]
    fn test_open_quote() {
        match decode_line("CERT=\"-----BEGIN") {
            LineKind::OpenQuote {
                key,
                partial,
                quote,
            } => {
                assert_eq!(key, "CERT");
                assert_eq!(partial, "-----BEGIN");
                assert_eq!(quote, '"');
            }
            other => panic!("Expected open quote, got {:?}", other),
        }
    }

    #[test]
    fn test_escaped_quote_does_not_close() {
        assert!(matches!(
            decode_value(r#""still \" open"#),
            DecodedValue::NeedsContinuation { quote: '"', .. }
        ));
    }

    #[test]
    fn test_multiline_buffer_accumulates_until_close() {
        let line = RawLine {
            number: 3,
            text: "KEY='first",
        };
        let mut buffer = MultilineBuffer::new("KEY", "first", '\'', line);
        assert_eq!(buffer.push_line("second"), None);
        assert_eq!(buffer.push_line("third' # done"), Some("first\nsecond\nthird".to_string()));
        assert_eq!(buffer.start_line, 3);
    }

    #[test]
    fn test_multiline_double_quoted_is_kept_raw() {
        let line = RawLine {
            number: 1,
            text: "KEY=\"a\\tb",
        };
        let mut buffer = MultilineBuffer::new("KEY", "a\\tb", '"', line);
        assert_eq!(buffer.push_line("c\\d\""), Some("a\\tb\nc\\d".to_string()));
    }

    #[test]
    fn test_multiline_closes_on_first_delimiter() {
        let line = RawLine {
            number: 1,
            text: "A=\"one",
        };
        let mut buffer = MultilineBuffer::new("A", "one", '"', line);
        // A backslash does not protect the delimiter on a continuation line
        assert_eq!(buffer.push_line("two\\\"three\""), Some("one\ntwo\\".to_string()));
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_line_endings("A=1\r\nB=2\rC=3"), "A=1\nB=2\nC=3");
        assert!(matches!(normalize_line_endings("A=1\n"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_lexer_numbers_lines() {
        let lines: Vec<_> = EnvLexer::new("A=1\n\nB=2").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], RawLine { number: 1, text: "A=1" });
        assert_eq!(lines[2], RawLine { number: 3, text: "B=2" });
    }
}
