// Copyright 2021 the gura-rs developers
// Part of the gura crate.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#[allow(unused_macros)]
macro_rules! assert_matches {
    ($pat:pat $(if $cond:expr)*, $expr:expr $(,)*) => {{
        let e = $expr;
        match e {
            $pat $(if $cond)* => {},
            _ => panic!("assert_matches failed!
Expected: {}
  Actual: {:#?}", stringify!($pat), e),
        }
    }}
}

// Builds a Value::Object from key => value entries, in order.
#[allow(unused_macros)]
macro_rules! object {
    ($($key:expr => $value:expr),* $(,)*) => {{
        #[allow(unused_mut)]
        let mut object = ::gura::Object::new();
        $( object.insert($key.to_string(), ::gura::Value::from($value)); )*
        ::gura::Value::Object(object)
    }}
}

// Builds a Value::Array, converting each element.
#[allow(unused_macros)]
macro_rules! array {
    ($($value:expr),* $(,)*) => {
        ::gura::Value::Array(vec![ $( ::gura::Value::from($value) ),* ])
    }
}
