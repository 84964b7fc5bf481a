// Copyright 2021 the gura-rs developers
// Part of the gura crate.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Tests that every error kind surfaces where it should, with the
//! byte position and line the message points at.

#![deny(unused)]

use gura::{ErrorKind, Loader};

#[macro_use]
mod common;

#[test]
fn indentation_not_divisible_by_four() {
    // Two-space indent; the error points at `b` on line 2.
    let err = gura::load("a:\n  b: 1\n").unwrap_err();
    assert_eq!((err.pos, err.line), (5, 2));
    assert_matches!(
        ErrorKind::InvalidIndentation(ref msg) if msg.contains("divisible by 4"),
        err.kind,
    );
}

#[test]
fn tabs_cannot_indent() {
    let err = gura::load("a:\n\tb: 1\n").unwrap_err();
    assert_eq!((err.pos, err.line), (3, 2));
    assert_matches!(
        ErrorKind::InvalidIndentation(ref msg) if msg.contains("tabs are not allowed"),
        err.kind,
    );
}

#[test]
fn tabs_in_a_blank_line_are_rejected_too() {
    let err = gura::load("a: 1\n  \t\n").unwrap_err();
    assert_matches!(
        ErrorKind::InvalidIndentation(ref msg) if msg.contains("tabs are not allowed"),
        err.kind,
    );
}

#[test]
fn child_on_the_parents_level() {
    let err = gura::load("a:\nb: 1\n").unwrap_err();
    assert_matches!(
        ErrorKind::InvalidIndentation(ref msg)
            if msg.contains("pair 'b'") && msg.contains("parent 'a'") && msg.contains("same level"),
        err.kind,
    );
}

#[test]
fn indentation_step_must_be_four() {
    let err = gura::load("a:\n        b: 1\n").unwrap_err();
    assert_matches!(
        ErrorKind::InvalidIndentation(ref msg) if msg.contains("must be 4"),
        err.kind,
    );
}

#[test]
fn duplicated_key() {
    let err = gura::load("a: 1\na: 2\n").unwrap_err();
    assert_eq!((err.pos, err.line), (5, 2));
    assert_eq!(err.kind, ErrorKind::DuplicatedKey("a".to_string()));
}

#[test]
fn duplicated_key_in_a_nested_object() {
    let err = gura::load("o:\n    a: 1\n    a: 2\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicatedKey("a".to_string()));
    assert_eq!(err.line, 3);
}

#[test]
fn duplicated_variable() {
    let err = gura::load("$x: 1\n$x: 2\n").unwrap_err();
    assert_eq!((err.pos, err.line), (6, 2));
    assert_eq!(err.kind, ErrorKind::DuplicatedVariable("x".to_string()));
}

#[test]
fn variable_not_defined() {
    let err = Loader::new()
        .env_lookup(|_| None)
        .load("a: $nope\n")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::VariableNotDefined("nope".to_string()));
    assert_eq!(err.line, 1);
}

#[test]
fn trailing_garbage_is_rejected() {
    let err = gura::load("a: 1\n!!!\n").unwrap_err();
    assert_eq!((err.pos, err.line), (5, 2));
    assert_matches!(
        ErrorKind::Parse(ref msg) if msg.contains("expected end of input"),
        err.kind,
    );
}

#[test]
fn pair_without_a_value() {
    let err = gura::load("a: 1_\n").unwrap_err();
    assert_eq!((err.pos, err.line), (3, 1));
    assert_matches!(
        ErrorKind::Parse(ref msg) if msg.contains("invalid pair"),
        err.kind,
    );
}

#[test]
fn errors_display_their_location() {
    let err = gura::load("a: 1\na: 2\n").unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("'a'"), "unexpected message: {}", rendered);
    assert!(rendered.contains("line 2"), "unexpected message: {}", rendered);
    assert!(rendered.contains("position 5"), "unexpected message: {}", rendered);
}
