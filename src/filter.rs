//! Contains the `Filter` trait and other types useful for creating and using filters.
//!
//! A filter is any type which implements the [`Filter`][`crate::filter::Filter`] trait.
//! You can assign a filter to an [`Engine`][`crate::Engine`] with the
//! [`add_filter`][`crate::Engine::add_filter()`] method, and it will be available in any
//! [`Template`][`crate::Template`] compiled by that engine. A custom filter replaces a
//! built-in filter with the same name.
//!
//! Given this expression:
//!
//! ```html
//! {{ name | prepend("hello, ") | append(suffix="!") | upper }}
//! ```
//!
//! The "name" value is not quoted, and so it is perceived to be an identifier and not a
//! literal string. Upon rendering this expression, Kiln will search the
//! [`Store`][`crate::Store`] for "name" and use that value as the input for the first
//! filter in the chain.
//!
//! The pipe "|" denotes that the following identifier is the name of a filter.
//! Filter names are resolved when the template is compiled, with the first letter
//! lowercased, so `Upper` and `upper` are the same filter.
//!
//! Arguments are passed to the filter as a map. Named arguments, like `suffix` above,
//! use their name as the key. Anonymous arguments have no explicitly assigned name, but
//! they do still receive an implicitly generated name: for each anonymous argument in a
//! filter call, the name is equal to (n + 1) where "n" is the number of anonymous
//! arguments that came before it. So, the "hello, " argument for the "prepend" filter
//! will have a name of "1".
//!
//! # Examples
//!
//! We'll create a filter that repeats a string.
//!
//! You can either create a struct and implement the trait on that, or just create
//! a function matching the trait signature. Kiln will accept both.
//!
//! Here we use a function:
//!
//! ```rust
//! use kiln::{
//!     filter::{
//!         serde::{json, Value},
//!         Error,
//!     },
//!     Engine, Store,
//! };
//! use std::collections::HashMap;
//!
//! fn repeat(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
//!     let times = args.get("1").and_then(Value::as_u64).unwrap_or(2) as usize;
//!     match value {
//!         Value::String(string) => Ok(json!(string.repeat(times))),
//!         _ => Err(Error::build("filter `repeat` requires string input")
//!                 .with_help("use quotes to coerce data to string")
//!              ),
//!     }
//! }
//!
//! let engine = Engine::new().with_filter_must("repeat", repeat);
//! let result = engine.render(
//!     "{{ name | repeat(3) }}",
//!     &Store::new().with_must("name", "ab"),
//! );
//!
//! assert_eq!(result.unwrap(), "ababab");
//! ```
//!
//! If you return an [`Error`][`crate::filter::Error`] in your filter without using the
//! [`with_visual`][`crate::filter::Error::with_visual`] method to set your own
//! visualization, Kiln will automatically generate one that points to the filter.
//!
//! If you were to pass a number to the filter and print the error with `{:#}`,
//! you would see:
//!
//! ```text
//! render error: filter `repeat` requires string input
//!   --> ?:1:11
//!    |
//!  1 | {{ name | repeat(3) }}
//!    |           ^^^^^^
//!    |
//!   = help: use quotes to coerce data to string
//! ```
pub mod builtin;

pub mod serde {
    //! Contains types from `serde_json`.
    pub use serde_json::*;
}
pub mod visual {
    //! Contains the `Visual` trait and different types which implement `Visual`.
    pub use crate::log::{Pointer, Visual};
}

pub use crate::{log::Error, region::Region};

use serde_json::Value;
use std::collections::HashMap;

/// Describes a type which can be used to transform input in an expression.
pub trait Filter: Sync + Send {
    /// Execute the filter with the given input and return a new Value as output.
    fn apply(&self, input: &Value, args: &HashMap<String, Value>) -> Result<Value, Error>;
}

/// Allows assignment of any function matching the signature of `apply` as a `Filter`
/// to `Engine`, instead of requiring a struct be created.
impl<F> Filter for F
where
    F: Fn(&Value, &HashMap<String, Value>) -> Result<Value, Error> + Sync + Send,
{
    fn apply(&self, value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
        self(value, args)
    }
}

#[cfg(test)]
mod tests {
    use crate::{engine::Engine, log::Error, Store};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    #[test]
    fn test_call_chain() {
        let engine = get_test_engine();
        let result = engine.render(
            "{{ name | to_lowercase | left(3) }}",
            &Store::new().with_must("name", "TAYLOR"),
        );

        assert_eq!(result.unwrap(), "tay");
    }

    #[test]
    fn test_call_chain_error() {
        let engine = get_test_engine();
        let result = engine.render(
            "{{ name | to_lowercase | left(\"10\") }}",
            &Store::new().with_must("name", "TAYLOR"),
        );

        let error = result.unwrap_err();
        assert_eq!(error.get_position(), Some((1, 26)));
    }

    #[test]
    fn test_custom_overrides_builtin() {
        let engine = Engine::new().with_filter_must("upper", left);
        let result = engine.render("{{ 'abc' | upper(1) }}", &Store::new());

        assert_eq!(result.unwrap(), "a");
    }

    #[test]
    fn test_filter_name_first_letter() {
        let result = Engine::new().render("{{ 'abc' | Upper }}", &Store::new());

        assert_eq!(result.unwrap(), "ABC");
    }

    /// Return a new Engine equipped with test filters.
    fn get_test_engine() -> Engine {
        Engine::new()
            .with_filter_must("to_lowercase", to_lowercase)
            .with_filter_must("left", left)
    }

    /// Lowercase the given value.
    ///
    /// # Errors
    ///
    /// Returns an Error if the Value is not of type String.
    fn to_lowercase(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
        match value {
            Value::String(string) => Ok(json!(string.to_owned().to_lowercase())),
            _ => Err(Error::build("filter `to_lowercase` requires string input")),
        }
    }

    /// Return the first n characters of the input Value from the left,
    /// where n is the value of the argument.
    ///
    /// Similar to TSQL `LEFT`.
    ///
    /// # Errors
    ///
    /// Returns an Error if the input is not a string, more than one
    /// argument is provided, or the argument is not a number.
    fn left(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
        let arg_len = args.len();
        if arg_len != 1 {
            return Err(Error::build(format!(
                "filter `left` expects `1` argument, received `{arg_len}`"
            )));
        }

        match (value, args.get("1")) {
            (Value::String(string), Some(Value::Number(number))) => match number.as_u64() {
                Some(n) => Ok(json!(string.chars().take(n as usize).collect::<String>())),
                None => Err(Error::build(format!(
                    "filter `left` expects an integer that fits in u64, `{number}` is invalid"
                ))),
            },
            (Value::String(_), n) => Err(Error::build(format!(
                "filter `left` expects a number argument, received `{n:?}`"
            ))),
            _ => Err(Error::build("filter `left` expects string input")),
        }
    }
}
