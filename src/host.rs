//! Contains the `Host` trait, which runs the code of `exec` blocks.
//!
//! Kiln does not execute code on its own. An [`Engine`][`crate::Engine`] given a
//! host with [`with_host`][`crate::Engine::with_host`] passes it the verbatim
//! content of every `{% exec %}` block along with the current context.
//!
//! ```rust
//! use kiln::{filter::serde::Value, Engine, Error, Store};
//!
//! fn shout(code: &str, _: &Store) -> Result<Value, Error> {
//!     Ok(Value::String(code.trim().to_uppercase()))
//! }
//!
//! let engine = Engine::new().with_host(shout);
//! let result = engine.render("{% exec %}hi{% endexec %}", &Store::new());
//!
//! assert_eq!(result.unwrap(), "HI");
//! ```
//!
//! A host that returns `none` or an empty string renders the `else` branch of the
//! block. A host that returns an [`Error`] renders the `catch` branch, with the
//! reason of the error available as `error`, or fails the render when the block
//! has no `catch` branch.
use crate::{log::Error, Store};
use serde_json::Value;

/// Describes a type which can execute the code of an `exec` block.
pub trait Host: Send + Sync {
    /// Execute the code with the given context and return the value to output.
    fn execute(&self, code: &str, store: &Store) -> Result<Value, Error>;
}

impl<F> Host for F
where
    F: Fn(&str, &Store) -> Result<Value, Error> + Send + Sync,
{
    fn execute(&self, code: &str, store: &Store) -> Result<Value, Error> {
        self(code, store)
    }
}

#[cfg(test)]
mod tests {
    use crate::{log::Error, Engine, Store};
    use serde_json::{json, Value};

    #[test]
    fn test_exec_output() {
        let engine = Engine::new().with_host(lookup);
        let result = engine.render(
            "{% exec %}name{% endexec %}",
            &Store::new().with_must("name", "taylor"),
        );

        assert_eq!(result.unwrap(), "taylor");
    }

    #[test]
    fn test_exec_else() {
        let engine = Engine::new().with_host(lookup);
        let result = engine.render(
            "{% exec %}ghost{% else %}nothing{% endexec %}",
            &Store::new(),
        );

        assert_eq!(result.unwrap(), "nothing");
    }

    #[test]
    fn test_exec_catch() {
        let engine = Engine::new().with_host(lookup);
        let result = engine.render(
            "{% exec %}!{% catch %}failed: {{ error }}{% end %}",
            &Store::new(),
        );

        assert_eq!(result.unwrap(), "failed: bad code");
    }

    #[test]
    fn test_exec_error_propagates() {
        let engine = Engine::new().with_host(lookup);
        let result = engine.render("{% exec %}!{% endexec %}", &Store::new());

        assert_eq!(result.unwrap_err().get_reason(), "bad code");
    }

    #[test]
    fn test_exec_without_host() {
        let result = Engine::new().render("{% exec %}x{% endexec %}", &Store::new());

        assert_eq!(result.unwrap_err().get_reason(), "missing host");
    }

    /// A host that reads the variable named by the code.
    fn lookup(code: &str, store: &Store) -> Result<Value, Error> {
        if code.trim() == "!" {
            return Err(Error::build("bad code"));
        }

        Ok(store.get(code.trim()).cloned().unwrap_or(json!(null)))
    }
}
