// Copyright 2021 the gura-rs developers
// Part of the gura crate.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![doc(html_root_url = "https://docs.rs/gura/0.1.0")]

//! Library for reading and writing [Gura] configuration files.
//!
//! Gura is a human-friendly configuration format: objects structured
//! by four-space indentation, typed scalars, arrays, `$variables`
//! with environment fallback, and an `import` statement for splitting
//! a configuration across files.
//!
//! ```rust
//! use gura::Value;
//!
//! const EXAMPLE: &str = r#"
//! title: "my service"
//!
//! server:
//!     host: "127.0.0.1"
//!     port: 8080
//! "#;
//!
//! fn main() -> Result<(), gura::GuraError> {
//!     let config = gura::load(EXAMPLE)?;
//!
//!     assert_eq!(config.get("title"), Some(&Value::Text("my service".into())));
//!     assert_eq!(
//!         config.get("server").and_then(|server| server.get("port")),
//!         Some(&Value::Integer(8080)),
//!     );
//!
//!     // `dump` emits the canonical form, comments dropped.
//!     assert_eq!(gura::dump(&config), "\
//! title: \"my service\"
//! server:
//!     host: \"127.0.0.1\"
//!     port: 8080");
//!     Ok(())
//! }
//! ```
//!
//! Parsing with custom collaborators (a base directory for imports, a
//! fake environment, an in-memory filesystem) goes through [`Loader`].
//!
//! [Gura]: https://gura.netlify.app/
//! [`Loader`]: struct.Loader.html

#[macro_use]
extern crate failure;

#[macro_use]
mod util;
mod loader;
mod parse;
mod types;
mod write;

pub use crate::loader::Loader;
pub use crate::parse::{ErrorKind, GuraError};
pub use crate::types::{Object, Value};
pub use crate::write::{dump, to_writer};

use std::path::Path;

/// Parses a complete Gura document.
///
/// The result is always a [`Value::Object`]; a document holding only
/// comments and blank lines yields an object with no keys. Relative
/// import paths are resolved against the process working directory;
/// use [`load_from_path`] or a [`Loader`] to anchor them elsewhere.
///
/// [`Value::Object`]: enum.Value.html
/// [`load_from_path`]: fn.load_from_path.html
/// [`Loader`]: struct.Loader.html
pub fn load(text: &str) -> Result<Value, GuraError> {
    Loader::new().load(text)
}

/// Reads and parses a Gura document from the filesystem.
///
/// Imports inside the document are resolved relative to the file's
/// own directory.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Value, failure::Error> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let mut loader = Loader::new();
    if let Some(dir) = path.parent() {
        loader = loader.base_dir(dir);
    }
    Ok(loader.load(&text)?)
}
