// Copyright 2021 the gura-rs developers
// Part of the gura crate.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::loader::Loader;
use crate::types::{Object, Value};
use crate::write::float_to_string;

pub use self::error::{ErrorKind, GuraError};

mod error {
    use std::fmt;

    /// An error raised while parsing a Gura document.
    ///
    /// `pos` is a byte index into the text buffer the error was raised
    /// against. Note that imports are resolved by splicing the imported
    /// files' text into the buffer before the document is parsed, so
    /// positions in a document that uses imports refer to the spliced
    /// buffer rather than to any single source file.
    #[derive(Debug, Fail)]
    pub struct GuraError {
        pub kind: ErrorKind,
        pub pos: usize,
        /// 1-based.
        pub line: usize,
    }

    impl GuraError {
        pub(crate) fn new(kind: ErrorKind, pos: usize, line: usize) -> GuraError {
            GuraError { kind, pos, line }
        }
    }

    impl fmt::Display for GuraError {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "{} at line {} position {}", self.kind, self.line, self.pos)
        }
    }

    /// Covers every way a document can be rejected.
    ///
    /// Only `Parse` is a plain grammar mismatch that the parser may
    /// recover from by trying another alternative; every other kind
    /// aborts the parse where it occurred.
    #[derive(Debug, Fail, PartialEq)]
    pub enum ErrorKind {
        /// The text does not match the grammar.
        #[fail(display = "{}", _0)]
        Parse(String),
        /// A tab in indentation, a width not divisible by 4, or an
        /// illegal step between nesting levels.
        #[fail(display = "invalid indentation: {}", _0)]
        InvalidIndentation(String),
        /// The key reappears within the same object.
        #[fail(display = "the key '{}' has been already defined", _0)]
        DuplicatedKey(String),
        /// The variable name is defined twice.
        #[fail(display = "the variable '{}' has been already declared", _0)]
        DuplicatedVariable(String),
        /// `$name` resolves neither in the document nor in the environment.
        #[fail(display = "the variable '{}' is not defined in the document nor as an environment variable", _0)]
        VariableNotDefined(String),
        /// The same resolved path was imported more than once.
        #[fail(display = "the file '{}' has been already imported", _0)]
        DuplicatedImport(String),
        /// An imported file could not be read.
        #[fail(display = "could not read imported file '{}'", _0)]
        ImportFailed(String),
    }

    impl ErrorKind {
        pub(crate) fn is_recoverable(&self) -> bool {
            match *self {
                ErrorKind::Parse(_) => true,
                _ => false,
            }
        }
    }
}

// Characters a number lexeme may contain. The '-' must be last so it
// is not read as a range.
const NUMBER_CHARS: &str = "0-9A-Fa-fxobinEe+._-";
// Acceptable chars for keys and variable names.
const KEY_CHARS: &str = "0-9A-Za-z_";
const HEX_DIGITS: &str = "0-9a-fA-F";
// All four of \n \r \f \v terminate a line.
const NEW_LINE_CHARS: &str = "\u{c}\u{b}\r\n";
const WS_AND_NEW_LINE_CHARS: &str = " \u{c}\u{b}\r\n\t";

/// One entry of an expanded character class: either a literal or an
/// inclusive `a-b` range.
#[derive(Debug, Copy, Clone)]
enum ClassPart {
    Single(char),
    Range(char, char),
}

fn expand_char_class(class: &str) -> Vec<ClassPart> {
    let chars: Vec<char> = class.chars().collect();
    let mut parts = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if i + 2 < chars.len() && chars[i + 1] == '-' {
            assert!(chars[i] < chars[i + 2], "bad character range (this is a bug!)");
            parts.push(ClassPart::Range(chars[i], chars[i + 2]));
            i += 3;
        } else {
            parts.push(ClassPart::Single(chars[i]));
            i += 1;
        }
    }
    parts
}

/// What a grammar rule produced.
///
/// `Empty` is a *successful* match of nothing: an expression with no
/// pairs, or a pair cut short because the line dedented out of the
/// current object. Callers use it to end their loops.
#[derive(Debug)]
enum Matched {
    UselessLine,
    Comment,
    Variable,
    Import { path: String, pos: usize, line: usize },
    Pair { key: String, value: Value, indent: usize, pos: usize, line: usize },
    List(Vec<Value>),
    Expression { object: Object, indent: usize },
    Value(Value),
    Empty,
}

impl Matched {
    fn unwrap_value(self) -> Value {
        match self {
            Matched::Value(value) => value,
            _ => panic!("rule did not yield a plain value (this is a bug!)"),
        }
    }
}

type RuleResult = Result<Matched, GuraError>;
type Rule = for<'a, 'b> fn(&'a mut Parser<'b>) -> RuleResult;

/// State for one parse. Holds the active text buffer (replaced once if
/// the document has imports), the cursor, and the tables that give the
/// format its scoping rules.
pub(crate) struct Parser<'a> {
    text: String,
    /// Byte index of the next unconsumed character.
    cursor: usize,
    /// 1-based; bumped whenever a newline character is consumed.
    line: usize,
    variables: HashMap<String, Value>,
    indentation_levels: Vec<usize>,
    imported_files: HashSet<PathBuf>,
    class_cache: HashMap<&'static str, Vec<ClassPart>>,
    loader: &'a Loader,
}

/// Parses a complete document with the given collaborators.
pub(crate) fn load_with(loader: &Loader, text: &str) -> Result<Value, GuraError> {
    let mut parser = Parser::new(loader);
    parser.restart(text.to_string());
    let result = parser.start()?;
    parser.assert_end()?;
    Ok(result)
}

impl<'a> Parser<'a> {
    fn new(loader: &'a Loader) -> Parser<'a> {
        Parser {
            text: String::new(),
            cursor: 0,
            line: 1,
            variables: HashMap::new(),
            indentation_levels: Vec::new(),
            imported_files: HashSet::new(),
            class_cache: HashMap::new(),
            loader,
        }
    }

    fn restart(&mut self, text: String) {
        self.text = text;
        self.cursor = 0;
        self.line = 1;
    }

    fn at_end(&self) -> bool {
        self.cursor >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.text[self.cursor..].chars().next()
    }

    fn advance(&mut self, ch: char) {
        self.cursor += ch.len_utf8();
        if NEW_LINE_CHARS.contains(ch) {
            self.line += 1;
        }
    }

    fn mark(&self) -> (usize, usize) {
        (self.cursor, self.line)
    }

    fn reset(&mut self, mark: (usize, usize)) {
        self.cursor = mark.0;
        self.line = mark.1;
    }

    fn parse_error(&self, message: String) -> GuraError {
        GuraError::new(ErrorKind::Parse(message), self.cursor, self.line)
    }

    // ---------------------------------------------------------------
    // primitives

    /// Consumes the next character, whatever it is.
    fn char_any(&mut self) -> Result<char, GuraError> {
        match self.peek() {
            Some(ch) => {
                self.advance(ch);
                Ok(ch)
            }
            None => Err(self.parse_error("expected a character but reached end of input".to_string())),
        }
    }

    fn class_matches(&mut self, class: &'static str, ch: char) -> bool {
        let parts = self.class_cache.entry(class).or_insert_with(|| expand_char_class(class));
        parts.iter().any(|part| match *part {
            ClassPart::Single(single) => single == ch,
            ClassPart::Range(lo, hi) => lo <= ch && ch <= hi,
        })
    }

    /// Consumes the next character if it belongs to `class`.
    fn char_class(&mut self, class: &'static str) -> Result<char, GuraError> {
        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Err(self.parse_error(format!("expected [{}] but reached end of input", class))),
        };
        if self.class_matches(class, ch) {
            self.advance(ch);
            Ok(ch)
        } else {
            Err(self.parse_error(format!("expected [{}] but got {:?}", class, ch)))
        }
    }

    fn maybe_char(&mut self, class: &'static str) -> Option<char> {
        self.char_class(class).ok()
    }

    /// Consumes the first of `keywords` found at the cursor.
    fn keyword(&mut self, keywords: &[&'static str]) -> Result<&'static str, GuraError> {
        let next = match self.peek() {
            Some(ch) => ch,
            None => {
                return Err(self.parse_error(format!(
                    "expected {} but reached end of input",
                    keywords.join(","),
                )));
            }
        };
        for &keyword in keywords {
            if self.text[self.cursor..].starts_with(keyword) {
                self.cursor += keyword.len();
                return Ok(keyword);
            }
        }
        Err(self.parse_error(format!("expected {} but got {:?}", keywords.join(","), next)))
    }

    fn maybe_keyword(&mut self, keywords: &[&'static str]) -> Option<&'static str> {
        self.keyword(keywords).ok()
    }

    // ---------------------------------------------------------------
    // ordered alternatives

    /// Tries `rules` in order and returns the first success. Failed
    /// alternatives have the cursor restored; the error reported after
    /// all of them fail is the one that reached deepest into the input,
    /// naming every rule that tied for that depth.
    fn matches(&mut self, rules: &[(&'static str, Rule)]) -> RuleResult {
        let mut farthest: Option<GuraError> = None;
        let mut farthest_rules: Vec<&'static str> = Vec::new();

        for &(name, rule) in rules {
            let mark = self.mark();
            let err = match rule(self) {
                Ok(matched) => return Ok(matched),
                Err(err) => err,
            };
            if !err.kind.is_recoverable() {
                return Err(err);
            }
            self.reset(mark);

            let farther = farthest.as_ref().map_or(true, |best| err.pos > best.pos);
            let tied = farthest.as_ref().map_or(false, |best| err.pos == best.pos);
            if farther {
                farthest = Some(err);
                farthest_rules.clear();
                farthest_rules.push(name);
            } else if tied {
                farthest_rules.push(name);
            }
        }

        let farthest = farthest.expect("no alternatives were given (this is a bug!)");
        if farthest_rules.len() == 1 {
            return Err(farthest);
        }
        let pos = farthest.pos.min(self.text.len().saturating_sub(1));
        let got = match self.text.get(pos..).and_then(|tail| tail.chars().next()) {
            Some(ch) => format!("{:?}", ch),
            None => "end of input".to_string(),
        };
        Err(GuraError::new(
            ErrorKind::Parse(format!("expected {} but got {}", farthest_rules.join(", "), got)),
            pos,
            farthest.line,
        ))
    }

    /// Like `matches`, but a grammar mismatch restores the cursor and
    /// yields `None`. Anything else still aborts.
    fn maybe_matches(&mut self, rules: &[(&'static str, Rule)]) -> Result<Option<Matched>, GuraError> {
        let mark = self.mark();
        match self.matches(rules) {
            Ok(matched) => Ok(Some(matched)),
            Err(ref err) if err.kind.is_recoverable() => {
                self.reset(mark);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn maybe_rule(&mut self, rule: Rule) -> Result<Option<Matched>, GuraError> {
        let mark = self.mark();
        match rule(self) {
            Ok(matched) => Ok(Some(matched)),
            Err(ref err) if err.kind.is_recoverable() => {
                self.reset(mark);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    // ---------------------------------------------------------------
    // whitespace

    /// Consumes blanks and tabs.
    fn ws(&mut self) {
        while self.maybe_keyword(&[" ", "\t"]).is_some() {}
    }

    fn maybe_new_line(&mut self) {
        let _ = self.char_class(NEW_LINE_CHARS);
    }

    fn eat_ws_and_new_lines(&mut self) {
        while self.maybe_char(WS_AND_NEW_LINE_CHARS).is_some() {}
    }

    /// Counts the spaces that indent the current line. Tabs may not
    /// take part in indentation.
    fn ws_with_indentation(&mut self) -> Result<usize, GuraError> {
        let mut indent = 0;
        while !self.at_end() {
            match self.maybe_keyword(&[" ", "\t"]) {
                Some(" ") => indent += 1,
                Some(_) => g_bail!(GuraError::new(
                    ErrorKind::InvalidIndentation("tabs are not allowed for indentation".to_string()),
                    self.cursor - 1,
                    self.line,
                )),
                None => break,
            }
        }
        Ok(indent)
    }

    // ---------------------------------------------------------------
    // variables

    /// Reads a maximal run of name characters after a `$`.
    fn var_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(ch) = self.maybe_char(KEY_CHARS) {
            name.push(ch);
        }
        name
    }

    /// Resolves a variable, falling back to the environment.
    fn variable_lookup(&mut self, name: &str) -> Result<Value, GuraError> {
        if let Some(value) = self.variables.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = (self.loader.env_lookup)(name) {
            return Ok(Value::Text(value));
        }
        Err(GuraError::new(
            ErrorKind::VariableNotDefined(name.to_string()),
            self.cursor,
            self.line,
        ))
    }

    // ---------------------------------------------------------------
    // strings and keys

    fn unquoted_string(&mut self) -> Result<String, GuraError> {
        let mut name = String::new();
        name.push(self.char_class(KEY_CHARS)?);
        while let Some(ch) = self.maybe_char(KEY_CHARS) {
            name.push(ch);
        }
        Ok(name)
    }

    /// An unquoted string followed by a required `:`.
    fn key(&mut self) -> Result<String, GuraError> {
        let key = self.unquoted_string()?;
        self.keyword(&[":"])?;
        Ok(key)
    }

    /// A `"…"` string with `$var` interpolation and no escape
    /// processing. Import paths are written in this form.
    fn quoted_string_with_var(&mut self) -> Result<String, GuraError> {
        self.keyword(&["\""])?;
        let mut chars = String::new();
        loop {
            let ch = self.char_any()?;
            if ch == '"' {
                break;
            }
            if ch == '$' {
                let name = self.var_name();
                let value = self.variable_lookup(&name)?;
                chars.push_str(&interpolated(&value));
            } else {
                chars.push(ch);
            }
        }
        Ok(chars)
    }

    // ---------------------------------------------------------------
    // imports

    /// Collects the leading import statements, expands each imported
    /// file recursively, and splices the expanded text in place of the
    /// statements. Leaves the buffer untouched when there are none.
    fn compute_imports(&mut self, parent_dir: Option<&Path>) -> Result<(), GuraError> {
        let mut files_to_import: Vec<(String, usize, usize)> = Vec::new();

        while !self.at_end() {
            let item = self.maybe_matches(&[
                ("gura_import", gura_import as Rule),
                ("variable", variable as Rule),
                ("useless_line", useless_line as Rule),
            ])?;
            match item {
                None => break,
                Some(Matched::Import { path, pos, line }) => files_to_import.push((path, pos, line)),
                Some(_) => {}
            }
        }

        if files_to_import.is_empty() {
            return Ok(());
        }

        let mut expanded = String::new();
        for (path, pos, line) in files_to_import {
            let file_path = match parent_dir {
                Some(dir) => dir.join(&path),
                None => PathBuf::from(&path),
            };

            if self.imported_files.contains(&file_path) {
                g_bail!(GuraError::new(
                    ErrorKind::DuplicatedImport(file_path.display().to_string()),
                    pos,
                    line,
                ));
            }
            // Mark before recursing so that cyclic imports surface as
            // duplicates instead of recursing forever.
            self.imported_files.insert(file_path.clone());

            let content = match (self.loader.file_reader)(&file_path) {
                Ok(content) => content,
                Err(_) => g_bail!(GuraError::new(
                    ErrorKind::ImportFailed(file_path.display().to_string()),
                    pos,
                    line,
                )),
            };

            // The child shares the imported-files set so duplicates are
            // caught across the whole import graph.
            let mut child = Parser::new(self.loader);
            child.imported_files = std::mem::take(&mut self.imported_files);
            let child_dir = file_path.parent().map(|dir| dir.to_owned());
            let content = child.text_with_imports(content, child_dir.as_deref())?;
            self.imported_files = child.imported_files;

            expanded.push_str(&content);
            expanded.push('\n');
        }

        expanded.push_str(&self.text[self.cursor..]);
        self.restart(expanded);
        Ok(())
    }

    /// Expands the imports of one imported file and returns its final
    /// text, ready to be spliced into the parent buffer.
    fn text_with_imports(&mut self, text: String, parent_dir: Option<&Path>) -> Result<String, GuraError> {
        self.restart(text);
        self.compute_imports(parent_dir)?;
        Ok(std::mem::take(&mut self.text))
    }

    // ---------------------------------------------------------------
    // entry

    fn start(&mut self) -> Result<Value, GuraError> {
        let base_dir = self.loader.base_dir.clone();
        self.compute_imports(base_dir.as_deref())?;
        let result = self.matches(&[("expression", expression as Rule)])?;
        self.eat_ws_and_new_lines();
        match result {
            Matched::Expression { object, .. } => Ok(Value::Object(object)),
            _ => Ok(Value::Object(Object::new())),
        }
    }

    fn assert_end(&self) -> Result<(), GuraError> {
        if !self.at_end() {
            let got = self.peek().expect("cursor within bounds (this is a bug!)");
            g_bail!(self.parse_error(format!("expected end of input but got {:?}", got)));
        }
        Ok(())
    }
}

/// Renders a variable's value for interpolation into a string.
fn interpolated(value: &Value) -> String {
    match *value {
        Value::Text(ref s) => s.clone(),
        Value::Integer(n) => n.to_string(),
        Value::Float(x) => float_to_string(x),
        _ => panic!("a variable held a non-scalar value (this is a bug!)"),
    }
}

// -------------------------------------------------------------------
// grammar rules

/// A line holding only whitespace and/or a comment, ended by a newline
/// (or by the end of input after a comment).
fn useless_line(p: &mut Parser<'_>) -> RuleResult {
    p.ws();
    let comment = p.maybe_rule(comment)?;
    let initial_line = p.line;
    p.maybe_new_line();
    let has_new_line = p.line - initial_line == 1;

    if comment.is_none() && !has_new_line {
        g_bail!(p.parse_error("the line contains valid data".to_string()));
    }
    Ok(Matched::UselessLine)
}

/// `#` up to and including the end of the line.
fn comment(p: &mut Parser<'_>) -> RuleResult {
    p.keyword(&["#"])?;
    while !p.at_end() {
        let ch = p.char_any()?;
        if NEW_LINE_CHARS.contains(ch) {
            break;
        }
    }
    Ok(Matched::Comment)
}

fn null(p: &mut Parser<'_>) -> RuleResult {
    p.keyword(&["null"])?;
    Ok(Matched::Value(Value::Null))
}

fn boolean(p: &mut Parser<'_>) -> RuleResult {
    let value = p.keyword(&["true", "false"])? == "true";
    Ok(Matched::Value(Value::Bool(value)))
}

/// The `empty` literal, which denotes an object with no keys.
fn empty_object(p: &mut Parser<'_>) -> RuleResult {
    p.keyword(&["empty"])?;
    Ok(Matched::Value(Value::Object(Object::new())))
}

/// Accumulates a number lexeme and converts it. Only `[+-]?inf` and
/// `[+-]?nan` are special float tokens; every other lexeme that does
/// not convert is an error.
fn number(p: &mut Parser<'_>) -> RuleResult {
    let mut lexeme = String::new();
    lexeme.push(p.char_class(NUMBER_CHARS)?);
    while let Some(ch) = p.maybe_char(NUMBER_CHARS) {
        lexeme.push(ch);
    }

    match convert_number(&lexeme) {
        Some(value) => Ok(Matched::Value(value)),
        None => Err(p.parse_error(format!("'{}' is not a valid number", lexeme))),
    }
}

fn convert_number(lexeme: &str) -> Option<Value> {
    let unsigned = lexeme
        .strip_prefix(|c| c == '+' || c == '-')
        .unwrap_or(lexeme);
    if unsigned == "inf" || unsigned == "nan" {
        let sign = if lexeme.starts_with('-') { -1.0 } else { 1.0 };
        let value = if unsigned == "inf" { f64::INFINITY } else { f64::NAN };
        return Some(Value::Float(sign * value));
    }

    // Underscores are visual separators; they may not lead, trail, or
    // double up.
    if lexeme.starts_with('_') || lexeme.ends_with('_') || lexeme.contains("__") {
        return None;
    }
    let plain: String = lexeme.chars().filter(|&c| c != '_').collect();

    if let Some(digits) = plain.strip_prefix("0x") {
        return i64::from_str_radix(digits, 16).ok().map(Value::Integer);
    }
    if let Some(digits) = plain.strip_prefix("0o") {
        return i64::from_str_radix(digits, 8).ok().map(Value::Integer);
    }
    if let Some(digits) = plain.strip_prefix("0b") {
        return i64::from_str_radix(digits, 2).ok().map(Value::Integer);
    }

    if plain.contains(|c| c == '.' || c == 'e' || c == 'E') {
        return plain.parse::<f64>().ok().map(Value::Float);
    }
    plain.parse::<i64>().ok().map(Value::Integer)
}

/// A `"…"` or `"""…"""` string with escapes and `$var` interpolation.
fn basic_string(p: &mut Parser<'_>) -> RuleResult {
    let quote = p.keyword(&["\"\"\"", "\""])?;
    let is_multiline = quote == "\"\"\"";

    // A newline immediately following the opening delimiter is
    // trimmed. All other whitespace remains intact.
    if is_multiline {
        let _ = p.maybe_char("\n");
    }

    let mut chars = String::new();
    loop {
        if p.maybe_keyword(&[quote]).is_some() {
            break;
        }

        let ch = p.char_any()?;
        if ch == '\\' {
            let escape = p.char_any()?;
            if is_multiline && escape == '\n' {
                // A backslash at the end of a line swallows all the
                // whitespace up to the next piece of content.
                p.eat_ws_and_new_lines();
            } else if escape == 'u' || escape == 'U' {
                let width = if escape == 'u' { 4 } else { 8 };
                let mut digits = String::with_capacity(width);
                for _ in 0..width {
                    digits.push(p.char_class(HEX_DIGITS)?);
                }
                let code_point = u32::from_str_radix(&digits, 16)
                    .expect("hex digits were just matched (this is a bug!)");
                match std::char::from_u32(code_point) {
                    Some(decoded) => chars.push(decoded),
                    None => g_bail!(p.parse_error(format!("{:#x} is not a valid code point", code_point))),
                }
            } else {
                match escape {
                    'b' => chars.push('\u{8}'),
                    'f' => chars.push('\u{c}'),
                    'n' => chars.push('\n'),
                    'r' => chars.push('\r'),
                    't' => chars.push('\t'),
                    '"' => chars.push('"'),
                    '\\' => chars.push('\\'),
                    '$' => chars.push('$'),
                    other => {
                        // Unknown escapes pass through literally.
                        chars.push('\\');
                        chars.push(other);
                    }
                }
            }
        } else if ch == '$' {
            let name = p.var_name();
            let value = p.variable_lookup(&name)?;
            chars.push_str(&interpolated(&value));
        } else {
            chars.push(ch);
        }
    }
    Ok(Matched::Value(Value::Text(chars)))
}

/// A `'…'` or `'''…'''` string: no escapes, no interpolation.
fn literal_string(p: &mut Parser<'_>) -> RuleResult {
    let quote = p.keyword(&["'''", "'"])?;

    if quote == "'''" {
        let _ = p.maybe_char("\n");
    }

    let mut chars = String::new();
    loop {
        if p.maybe_keyword(&[quote]).is_some() {
            break;
        }
        chars.push(p.char_any()?);
    }
    Ok(Matched::Value(Value::Text(chars)))
}

/// `$name` used as a value.
fn variable_value(p: &mut Parser<'_>) -> RuleResult {
    p.keyword(&["$"])?;
    let name = p.unquoted_string()?;
    let value = p.variable_lookup(&name)?;
    Ok(Matched::Value(value))
}

/// `$name: value` — defines a variable. Only scalar values are
/// allowed on the right-hand side.
fn variable(p: &mut Parser<'_>) -> RuleResult {
    let (start_pos, start_line) = p.mark();
    p.keyword(&["$"])?;
    let key = p.key()?;
    p.ws();
    let value = p
        .matches(&[
            ("basic_string", basic_string as Rule),
            ("literal_string", literal_string as Rule),
            ("number", number as Rule),
            ("variable_value", variable_value as Rule),
        ])?
        .unwrap_value();

    if p.variables.contains_key(&key) {
        g_bail!(GuraError::new(ErrorKind::DuplicatedVariable(key), start_pos, start_line));
    }
    p.variables.insert(key, value);
    Ok(Matched::Variable)
}

/// `import "path"`. The path may interpolate variables. Emitted with
/// the position of its path literal so that duplicate imports can be
/// reported precisely.
fn gura_import(p: &mut Parser<'_>) -> RuleResult {
    p.keyword(&["import"])?;
    p.char_class(" ")?;
    let (pos, line) = p.mark();
    let path = p.quoted_string_with_var()?;
    p.ws();
    p.maybe_new_line();
    Ok(Matched::Import { path, pos, line })
}

fn primitive_type(p: &mut Parser<'_>) -> RuleResult {
    p.ws();
    let value = p.matches(&[
        ("null", null as Rule),
        ("boolean", boolean as Rule),
        ("basic_string", basic_string as Rule),
        ("literal_string", literal_string as Rule),
        ("number", number as Rule),
        ("variable_value", variable_value as Rule),
        ("empty_object", empty_object as Rule),
    ])?;
    p.ws();
    Ok(value)
}

fn complex_type(p: &mut Parser<'_>) -> RuleResult {
    p.matches(&[("list", list as Rule), ("expression", expression as Rule)])
}

fn any_type(p: &mut Parser<'_>) -> RuleResult {
    let mark = p.mark();
    match primitive_type(p) {
        Ok(matched) => Ok(matched),
        Err(ref err) if err.kind.is_recoverable() => {
            p.reset(mark);
            complex_type(p)
        }
        Err(err) => Err(err),
    }
}

fn maybe_any_type(p: &mut Parser<'_>) -> Result<Option<Matched>, GuraError> {
    let mark = p.mark();
    match any_type(p) {
        Ok(matched) => Ok(Some(matched)),
        Err(ref err) if err.kind.is_recoverable() => {
            p.reset(mark);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// `[ … ]` with `,` separators. A trailing comma is fine, and blank
/// and comment lines may appear between elements.
fn list(p: &mut Parser<'_>) -> RuleResult {
    let mut items = Vec::new();

    p.ws();
    p.keyword(&["["])?;
    loop {
        p.ws();
        p.maybe_new_line();

        if p.maybe_rule(useless_line)?.is_some() {
            continue;
        }

        let item = match maybe_any_type(p)? {
            None | Some(Matched::Empty) => break,
            Some(matched) => matched,
        };
        let value = match item {
            Matched::Expression { object, .. } => Value::Object(object),
            Matched::List(values) => Value::Array(values),
            other => other.unwrap_value(),
        };
        items.push(value);

        p.ws();
        p.maybe_new_line();
        if p.maybe_keyword(&[","]).is_none() {
            break;
        }
    }

    p.ws();
    p.maybe_new_line();
    p.keyword(&["]"])?;
    Ok(Matched::List(items))
}

/// A `key: value` binding. Owns the indentation bookkeeping: pushing
/// on the first deeper pair, and popping plus rewinding to the start
/// of the line when a dedent closes the current object.
fn pair(p: &mut Parser<'_>) -> RuleResult {
    let start = p.mark();
    let current_indent = p.ws_with_indentation()?;

    let (key_pos, key_line) = p.mark();
    let key = p.key()?;
    p.ws();

    if current_indent % 4 != 0 {
        g_bail!(GuraError::new(
            ErrorKind::InvalidIndentation(format!(
                "indentation of {} is not divisible by 4",
                current_indent,
            )),
            key_pos,
            key_line,
        ));
    }

    match p.indentation_levels.last().cloned() {
        Some(last) if current_indent > last => p.indentation_levels.push(current_indent),
        Some(last) if current_indent < last => {
            p.indentation_levels.pop();
            // The indentation is already consumed; rewind so the
            // enclosing expression sees this line from its beginning.
            p.reset(start);
            return Ok(Matched::Empty);
        }
        Some(_) => {} // sibling
        None => p.indentation_levels.push(current_indent),
    }

    let value = any_type(p)?;
    if let Matched::Empty = value {
        g_bail!(p.parse_error("invalid pair".to_string()));
    }

    let value = match value {
        Matched::Expression { object, indent: child_indent } => {
            if child_indent == current_indent {
                let child_key = object.keys().next().cloned().unwrap_or_default();
                g_bail!(GuraError::new(
                    ErrorKind::InvalidIndentation(format!(
                        "wrong indentation for pair '{}' (parent '{}' has same level)",
                        child_key, key,
                    )),
                    p.cursor,
                    p.line,
                ));
            }
            let delta = if child_indent > current_indent {
                child_indent - current_indent
            } else {
                current_indent - child_indent
            };
            g_ensure!(
                delta == 4,
                GuraError::new(
                    ErrorKind::InvalidIndentation(
                        "difference between indentation levels must be 4".to_string(),
                    ),
                    p.cursor,
                    p.line,
                ),
            );
            Value::Object(object)
        }
        Matched::List(items) => {
            // An embedded object may have popped a level on its way
            // out; put this pair's level back on top.
            p.indentation_levels.pop();
            p.indentation_levels.push(current_indent);
            Value::Array(items)
        }
        other => other.unwrap_value(),
    };

    p.maybe_new_line();

    Ok(Matched::Pair { key, value, indent: current_indent, pos: key_pos, line: key_line })
}

/// A block of variables, pairs and useless lines sharing one
/// indentation level; yields an object.
fn expression(p: &mut Parser<'_>) -> RuleResult {
    let mut object = Object::new();
    let mut indent = 0;

    while !p.at_end() {
        let item = p.maybe_matches(&[
            ("variable", variable as Rule),
            ("pair", pair as Rule),
            ("useless_line", useless_line as Rule),
        ])?;

        match item {
            None | Some(Matched::Empty) => break,
            Some(Matched::Pair { key, value, indent: pair_indent, pos, line }) => {
                g_ensure!(
                    !object.contains_key(&key),
                    GuraError::new(ErrorKind::DuplicatedKey(key), pos, line),
                );
                object.insert(key, value);
                indent = pair_indent;
            }
            Some(_) => {}
        }

        // A ']' or ',' here means this object is embedded in a list
        // and the list is taking over.
        let mark = p.mark();
        p.ws();
        if p.maybe_keyword(&["]", ","]).is_some() {
            p.indentation_levels.pop();
            p.cursor -= 1;
            break;
        }
        p.reset(mark);
    }

    if object.is_empty() {
        Ok(Matched::Empty)
    } else {
        Ok(Matched::Expression { object, indent })
    }
}
