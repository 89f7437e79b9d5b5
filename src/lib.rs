//! Kiln - Template Engine
//!
//! A template engine for the Jinja family of template languages: expressions and
//! filters, control flow, template inheritance with `super()`, blocks that can be
//! called with `self`, macros and call blocks.
//!
//! Templates are compiled into closures once and cached for the whole process, so
//! rendering the same source again skips lexing, parsing and compiling.
//!
//! # Examples
//!
//! ```
//! use kiln::{Engine, Store};
//!
//! let engine = Engine::new();
//! let store = Store::new().with_must("people", ["taylor", "casey"]);
//! let result = engine.render(
//!     "{% for person in people %}{{ person | capitalize }}{% if not loop.last %}, {% endif %}{% endfor %}",
//!     &store,
//! );
//!
//! assert_eq!(result.unwrap(), "Taylor, Casey");
//! ```
pub mod filter;
pub mod host;

mod compile;
mod engine;
mod log;
mod pipe;
mod region;
mod render;

pub use crate::{
    compile::{compile, merge, parse, tokenize, Builder, Marker, Syntax, Template, Unit},
    engine::Engine,
    filter::Filter,
    host::Host,
    log::{Error, Kind},
    region::Region,
    render::{store::Store, Undefined},
};

/// Compile and render the source with a default [`Engine`].
///
/// # Errors
///
/// Returns an [`Error`] if compiling or rendering fails.
///
/// # Examples
///
/// ```
/// use kiln::Store;
///
/// let result = kiln::render("{{ 'yes' if ready else 'no' }}", &Store::new().with_must("ready", true));
/// assert_eq!(result.unwrap(), "yes");
/// ```
#[inline]
pub fn render(source: &str, store: &Store) -> Result<String, Error> {
    Engine::new().render(source, store)
}
