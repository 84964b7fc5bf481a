// Copyright 2021 the gura-rs developers
// Part of the gura crate.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Configurable document loading.
//!
//! [`Loader`] owns the two collaborators the parser is otherwise
//! silent about: how `import` statements read files, and how an
//! unresolved `$name` consults the environment. Swapping either for a
//! closure keeps parsing pure in tests and lets embedders virtualize
//! the filesystem.
//!
//! [`Loader`]: struct.Loader.html

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::parse::{self, GuraError};
use crate::types::Value;

/// Configures and runs a [`load`].
///
/// ```rust
/// use gura::{Loader, Value};
///
/// let value = Loader::new()
///     .env_lookup(|name| match name {
///         "GREETING" => Some("hello".to_string()),
///         _ => None,
///     })
///     .load("message: \"$GREETING world\"")
///     .unwrap();
///
/// assert_eq!(value.get("message"), Some(&Value::Text("hello world".into())));
/// ```
///
/// The defaults are what [`load`] itself uses: no base directory,
/// `std::env::var` for variables, and `std::fs::read_to_string` for
/// imported files.
///
/// [`load`]: ../fn.load.html
pub struct Loader {
    pub(crate) base_dir: Option<PathBuf>,
    pub(crate) env_lookup: Box<dyn Fn(&str) -> Option<String>>,
    pub(crate) file_reader: Box<dyn Fn(&Path) -> io::Result<String>>,
}

impl Loader {
    pub fn new() -> Loader {
        Loader {
            base_dir: None,
            env_lookup: Box::new(|name| env::var(name).ok()),
            file_reader: Box::new(|path| fs::read_to_string(path)),
        }
    }

    /// Directory that relative import paths are joined with.
    pub fn base_dir<P: Into<PathBuf>>(mut self, dir: P) -> Loader {
        self.base_dir = Some(dir.into());
        self
    }

    /// Replaces the environment used as the fallback for `$name`
    /// references that the document itself does not define.
    pub fn env_lookup<F>(mut self, lookup: F) -> Loader
    where F: Fn(&str) -> Option<String> + 'static,
    {
        self.env_lookup = Box::new(lookup);
        self
    }

    /// Replaces the reader used to fetch the contents of imported
    /// files.
    pub fn file_reader<F>(mut self, reader: F) -> Loader
    where F: Fn(&Path) -> io::Result<String> + 'static,
    {
        self.file_reader = Box::new(reader);
        self
    }

    /// Parses a complete Gura document with this configuration.
    pub fn load(&self, text: &str) -> Result<Value, GuraError> {
        parse::load_with(self, text)
    }
}

impl Default for Loader {
    fn default() -> Loader { Loader::new() }
}
