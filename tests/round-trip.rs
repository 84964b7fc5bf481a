// Copyright 2021 the gura-rs developers
// Part of the gura crate.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Round-trip properties: parsing a dump gives back the same tree,
//! and trailing blank lines never change what a document means.

#![deny(unused)]

use indoc::indoc;

use gura::Value;

#[macro_use]
mod common;

/// load . dump . load must be the identity on parsed documents.
#[test]
fn document_round_trips() {
    const DOCUMENTS: &[&str] = &[
        "a: 1\n",
        indoc!(r#"
            name: "gura"
            enabled: true
            fallback: null
            ratio: 0.25
        "#),
        indoc!(r#"
            server:
                host: "localhost"
                port: 8080
                tls:
                    enabled: false
            retries: 3
        "#),
        indoc!(r#"
            integers: [1, 2, 3]
            nested: [[1], [2, 3]]
            objects: [
                a: 1,
                b: 2
            ]
            nothing: []
        "#),
        indoc!(r#"
            # comments vanish but the values stay
            $prefix: "/opt"
            path: "$prefix/bin"
            limit: inf
            x: empty
        "#),
        indoc!(r#"
            text: """line one
            line two"""
            raw: 'kept \n as-is'
        "#),
    ];

    for document in DOCUMENTS {
        let first = gura::load(document).expect(document);
        let second = gura::load(&gura::dump(&first)).expect(document);
        assert_eq!(first, second, "document was: {:?}", document);
    }
}

/// dump . load must be the identity on value trees.
#[test]
fn value_round_trips() {
    let values = vec![
        object! {
            "null" => Value::Null,
            "bool" => true,
            "int" => -7,
            "float" => 0.125,
            "text" => "with \"quotes\", $dollars and\nnewlines",
        },
        object! {
            "a" => object! {
                "b" => object! { "c" => 1 },
                "d" => array![1, 2],
            },
            "e" => object! {},
        },
        object! {
            "compact" => array![1, "two", 3.5, Value::Null],
            "deep" => array![array![1, 2], array![3]],
            "records" => array![
                object! { "k" => 1, "v" => "x" },
                object! { "k" => 2, "v" => "y" },
            ],
            "single" => array![1, object! { "only" => true }],
            "blank" => array![],
        },
        object! {
            "plus" => f64::INFINITY,
            "minus" => f64::NEG_INFINITY,
            "big" => 1e300,
            "tiny" => -2.5e-10,
        },
    ];

    for value in values {
        let reloaded = gura::load(&gura::dump(&value)).expect(&gura::dump(&value));
        assert_eq!(value, reloaded, "dump was: {:?}", gura::dump(&value));
    }
}

#[test]
fn nan_round_trips_by_nan_ness() {
    let dumped = gura::dump(&object! { "x" => f64::NAN });
    assert_eq!(dumped, "x: nan");
    let reloaded = gura::load(&dumped).unwrap();
    assert_matches!(
        Some(&Value::Float(x)) if x.is_nan(),
        reloaded.get("x"),
    );
}

/// Appends every short combination of trailing blank lines to
/// canonical documents and checks the parse is unchanged.
#[test]
fn trailing_blank_lines_are_ignored() {
    // Inputs written in the canonical output format.
    const BODIES: &[&str] = &[
        "a: 1",
        "nested:\n    b: 2\nc: [1, 2]",
    ];

    // Things allowed to show up as trailing blank lines. (Tabs are
    // absent: a tab anywhere in leading whitespace is an error.)
    const BLANK_LINES: &[&str] = &[
        "",
        "  ",
        "    ",
        "   # trailing comment",
    ];

    for &body in BODIES {
        for blanks in permutations_with_replacement_upto(3, BLANK_LINES) {
            let mut input = body.to_string();
            for blank in blanks {
                input.push('\n');
                input.push_str(blank);
            }

            let value = gura::load(&input).expect(&input);
            assert_eq!(gura::dump(&value), body, "input was: {:?}", input);
        }
    }
}

fn permutations_with_replacement<T>(n: usize, items: &[T]) -> Vec<Vec<T>>
where T: Clone,
{
    match n {
        0 => vec![vec![]],
        _ => {
            permutations_with_replacement(n - 1, items)
                .into_iter()
                .flat_map(|v| items.iter().cloned().map(move |x| {
                    let mut v = v.clone();
                    v.push(x);
                    v
                }))
                .collect()
        }
    }
}

fn permutations_with_replacement_upto<T>(n_max: usize, items: &[T]) -> Vec<Vec<T>>
where T: Clone,
{ (0..n_max+1).flat_map(|n| permutations_with_replacement(n, items)).collect() }

#[test]
fn test_permutations_upto() {
    let mut actual = permutations_with_replacement_upto(2, &[1u32, 2u32]);
    actual.sort();

    let mut expected = vec![
        vec![], vec![1], vec![2],
        vec![1, 1], vec![1, 2],
        vec![2, 1], vec![2, 2],
    ];
    expected.sort();
    assert_eq!(actual, expected);
}
