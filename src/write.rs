// Copyright 2021 the gura-rs developers
// Part of the gura crate.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::io;

use crate::types::{Object, Value};

/// Serializes a value into canonical Gura text.
///
/// Objects nest with four spaces of indentation, strings come out in
/// their escaped basic form, and arrays pick the multiline layout only
/// when every element is itself a non-empty object or array. Leading
/// and trailing newlines are stripped, so the result of dumping an
/// object has no final newline.
pub fn dump(value: &Value) -> String {
    dump_value(value).trim_matches('\n').to_string()
}

/// Writes a value in canonical Gura form to an io::Write instance.
pub fn to_writer<W: io::Write>(mut w: W, value: &Value) -> io::Result<()> {
    w.write_all(dump(value).as_bytes())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&dump(self))
    }
}

fn dump_value(value: &Value) -> String {
    match *value {
        Value::Null => "null".to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Float(x) => float_to_string(x),
        Value::Text(ref text) => quote(text),
        Value::Array(ref items) => dump_array(items),
        Value::Object(ref object) => {
            if object.is_empty() {
                "empty".to_string()
            } else {
                dump_object(object)
            }
        }
    }
}

fn dump_object(object: &Object) -> String {
    let mut out = String::new();
    for (key, value) in object {
        out.push_str(key);
        out.push(':');
        match *value {
            Value::Object(ref child) if !child.is_empty() => {
                out.push('\n');
                out.push_str(&indent(&dump_object(child)));
            }
            Value::Object(_) => out.push_str(" empty\n"),
            ref other => {
                out.push(' ');
                out.push_str(&dump_value(other));
                out.push('\n');
            }
        }
    }
    out
}

fn dump_array(items: &[Value]) -> String {
    let multiline = !items.is_empty() && items.iter().all(|item| match *item {
        Value::Object(ref object) => !object.is_empty(),
        Value::Array(ref inner) => !inner.is_empty(),
        _ => false,
    });

    if multiline {
        let blocks: Vec<String> = items
            .iter()
            .map(|item| {
                let block = dump_value(item);
                let indented = indent(block.trim_matches('\n'));
                indented.trim_end_matches('\n').to_string()
            })
            .collect();
        format!("[\n{}\n]", blocks.join(",\n"))
    } else {
        let rendered: Vec<String> = items.iter().map(compact).collect();
        format!("[{}]", rendered.join(", "))
    }
}

// Objects caught in a compact array render as comma-joined pairs.
fn compact(value: &Value) -> String {
    match *value {
        Value::Object(ref object) if !object.is_empty() => object
            .iter()
            .map(|(key, value)| format!("{}: {}", key, compact(value)))
            .collect::<Vec<_>>()
            .join(", "),
        _ => dump_value(value),
    }
}

/// Prefixes every line of `text` with four spaces.
fn indent(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Escapes and quotes a string in its basic form.
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// NaN and the infinities have their own tokens; everything else goes
/// through dtoa so that floats survive a round trip unchanged.
pub(crate) fn float_to_string(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    format!("{}", Dtoa(x))
}

struct Dtoa(f64);
impl fmt::Display for Dtoa {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // goes through a byte buffer; dtoa has no fmt adapter
        let mut bytes = vec![];
        dtoa::write(&mut bytes, self.0).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8(bytes).expect("dtoa writes ascii (this is a bug!)"))
    }
}
