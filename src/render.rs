pub mod check;
pub mod compare;
pub mod store;

use crate::{
    compile::{tree::Parameter, Template},
    log::{Error, INVALID_SYNTAX, RECURSION_LIMIT},
    pipe::Pipe,
    Engine, Store,
};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tracing::trace;

use self::store::{Layers, Shadow};

/// Upper bound on nested macro calls within one render.
const MAX_CALLS: usize = 128;

/// Policy for names and properties that cannot be resolved.
///
/// The policy is baked into a compiled [`Template`], so the same source compiled
/// under two policies produces two templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Undefined {
    /// Undefined names and null values render as nothing. Accessing a property
    /// of an undefined or null value is an error.
    #[default]
    Default,
    /// Undefined names and missing properties are errors. Null values still
    /// render as nothing.
    Strict,
    /// An expression that renders an undefined value is echoed back as
    /// `{{ expression }}`.
    Debug,
    /// Undefined names and any broken link in a property chain render as
    /// nothing, without an error.
    Chainable,
}

/// A compiled fragment that writes output.
pub(crate) type Emit = dyn Fn(&mut Frame<'_>, &mut Pipe<'_>) -> Result<(), Error> + Send + Sync;

/// A compiled expression. `None` is an undefined value.
pub(crate) type Eval = dyn Fn(&mut Frame<'_>) -> Result<Option<Value>, Error> + Send + Sync;

/// Box a closure as an [`Emit`].
pub(crate) fn emit<F>(f: F) -> Box<Emit>
where
    F: Fn(&mut Frame<'_>, &mut Pipe<'_>) -> Result<(), Error> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Box a closure as an [`Eval`].
pub(crate) fn eval<F>(f: F) -> Box<Eval>
where
    F: Fn(&mut Frame<'_>) -> Result<Option<Value>, Error> + Send + Sync + 'static,
{
    Box::new(f)
}

/// The body of a call block, invoked by `caller()` inside the called macro.
pub(crate) struct Caller {
    parameters: Arc<Vec<Parameter>>,
    body: Arc<Emit>,
    /// Scope layers at the call block.
    locals: Layers,
}

impl Caller {
    pub(crate) fn new(
        parameters: Arc<Vec<Parameter>>,
        body: Arc<Emit>,
        locals: Layers,
    ) -> Self {
        Self {
            parameters,
            body,
            locals,
        }
    }
}

/// State of a single render.
///
/// Every render owns its [`Frame`], so compiled templates can be rendered from
/// many threads at once.
pub struct Frame<'render> {
    pub(crate) engine: &'render Engine,
    pub(crate) template: &'render Template,
    pub(crate) shadow: Shadow<'render>,
    /// Active invocations of each block.
    depth: HashMap<String, usize>,
    callers: Vec<Caller>,
    /// Number of includes between this render and the outermost one.
    pub(crate) includes: usize,
    /// Active macro calls.
    calls: usize,
}

impl<'render> Frame<'render> {
    /// Create a new [`Frame`].
    pub(crate) fn new(
        engine: &'render Engine,
        template: &'render Template,
        store: &'render Store,
        includes: usize,
    ) -> Self {
        Self {
            engine,
            template,
            shadow: Shadow::new(store),
            depth: HashMap::new(),
            callers: vec![],
            includes,
            calls: 0,
        }
    }

    /// Render the main body of the [`Template`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if any part of the template fails to render.
    pub(crate) fn render(&mut self) -> Result<String, Error> {
        let template = self.template;
        let mut buffer = String::new();
        (template.main)(self, &mut Pipe::new(&mut buffer))?;
        trim_newline(&mut buffer);

        Ok(buffer)
    }

    /// Run `f` inside a new scope layer.
    pub(crate) fn scoped<T, F>(&mut self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Self) -> Result<T, Error>,
    {
        self.shadow.push();
        let result = f(self);
        self.shadow.pop();

        result
    }

    /// Render `body` into a new buffer and return the text.
    pub(crate) fn capture(&mut self, body: &Emit) -> Result<String, Error> {
        let mut buffer = String::new();
        body(self, &mut Pipe::new(&mut buffer))?;

        Ok(buffer)
    }

    /// Render the block with the given name, and return the text with one
    /// trailing newline removed.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the block is nested in itself more often than
    /// the engine allows, or rendering the body fails.
    pub(crate) fn call_block(&mut self, name: &str) -> Result<String, Error> {
        let template = self.template;
        let body = template
            .blocks
            .get(name)
            .ok_or_else(|| Error::build(INVALID_SYNTAX).with_help(format!("block `{name}` does not exist")))?;

        let depth = self.depth.entry(name.to_string()).or_insert(0);
        if *depth > self.engine.max_depth {
            return Err(Error::build(RECURSION_LIMIT).with_help(format!(
                "block `{name}` called itself more than {} time(s)",
                self.engine.max_depth
            )));
        }
        *depth += 1;
        trace!(block = name, depth = *depth, "rendering block");

        let result = self.scoped(|frame| frame.capture(body.as_ref()));
        if let Some(depth) = self.depth.get_mut(name) {
            *depth -= 1;
        }

        let mut text = result?;
        trim_newline(&mut text);

        Ok(text)
    }

    /// Render the parent version of the named block.
    pub(crate) fn call_super(&mut self, name: &str) -> Result<String, Error> {
        let template = self.template;
        let body = template
            .supers
            .get(name)
            .ok_or_else(|| Error::build(INVALID_SYNTAX).with_help(format!("block `{name}` has no parent")))?;

        let mut text = self.scoped(|frame| frame.capture(body.as_ref()))?;
        trim_newline(&mut text);

        Ok(text)
    }

    /// Call the macro stored under the given key.
    ///
    /// The body sees the top-level assignments and the arguments, nothing else.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the arguments do not match the parameters, calls
    /// are nested too deeply, or rendering the body fails.
    pub(crate) fn call_macro(
        &mut self,
        key: &str,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<String, Error> {
        let template = self.template;
        let definition = template
            .macros
            .get(key)
            .ok_or_else(|| Error::build(INVALID_SYNTAX).with_help(format!("macro `{key}` does not exist")))?;
        if self.calls >= MAX_CALLS {
            return Err(Error::build(RECURSION_LIMIT)
                .with_help(format!("macro `{key}` exceeded {MAX_CALLS} nested calls")));
        }

        let layer = bind(key, &definition.parameters, positional, named)?;
        let previous = self.shadow.isolate(layer);
        self.calls += 1;
        let result = self.capture(definition.body.as_ref());
        self.calls -= 1;
        self.shadow.restore(previous);

        let mut text = result?;
        trim_newline(&mut text);

        Ok(text)
    }

    /// Push a [`Caller`] for the duration of `f`.
    pub(crate) fn with_caller<T, F>(&mut self, caller: Caller, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Self) -> Result<T, Error>,
    {
        self.callers.push(caller);
        let result = f(self);
        self.callers.pop();

        result
    }

    /// Render the body of the innermost call block.
    ///
    /// The body is rendered in the scope of the call block, and the text has
    /// every run of whitespace collapsed to one space and is trimmed.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if there is no call block, the arguments do not
    /// match its parameters, or rendering the body fails.
    pub(crate) fn call_caller(
        &mut self,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<String, Error> {
        let caller = self.callers.pop().ok_or_else(|| {
            Error::build(INVALID_SYNTAX)
                .with_help("`caller()` may only be used in a macro invoked by a call block")
        })?;

        let result = bind("caller", &caller.parameters, positional, named).and_then(|layer| {
            let previous = self.shadow.restore(caller.locals.clone());
            self.shadow.push();
            for (name, value) in layer {
                self.shadow.insert(name, value);
            }
            let result = self.capture(caller.body.as_ref());
            self.shadow.restore(previous);

            result
        });
        self.callers.push(caller);

        Ok(result?.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    /// Return true if a call block is active.
    pub(crate) fn has_caller(&self) -> bool {
        !self.callers.is_empty()
    }
}

/// Bind arguments to parameters.
///
/// Positional arguments are bound in order, named arguments override them and
/// parameters that receive nothing use their default, or none.
fn bind(
    name: &str,
    parameters: &[Parameter],
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
) -> Result<HashMap<String, Value>, Error> {
    if positional.len() > parameters.len() {
        return Err(Error::build(INVALID_SYNTAX).with_help(format!(
            "`{name}` takes {} argument(s), received {}",
            parameters.len(),
            positional.len()
        )));
    }

    let mut layer = HashMap::with_capacity(parameters.len());
    let mut positional = positional.into_iter();
    for (parameter, default) in parameters {
        let value = positional
            .next()
            .or_else(|| default.clone())
            .unwrap_or(Value::Null);
        layer.insert(parameter.clone(), value);
    }
    for (key, value) in named {
        if !parameters.iter().any(|(parameter, _)| *parameter == key) {
            return Err(Error::build(INVALID_SYNTAX)
                .with_help(format!("`{name}` has no parameter named `{key}`")));
        }
        layer.insert(key, value);
    }

    Ok(layer)
}

/// Remove one trailing line terminator.
pub(crate) fn trim_newline(text: &mut String) {
    if text.ends_with("\r\n") {
        text.truncate(text.len() - 2);
    } else if text.ends_with('\n') {
        text.truncate(text.len() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::{bind, trim_newline};
    use serde_json::json;

    #[test]
    fn test_trim_newline() {
        let mut text = String::from("a\n\n");
        trim_newline(&mut text);
        assert_eq!(text, "a\n");

        let mut text = String::from("a\r\n");
        trim_newline(&mut text);
        assert_eq!(text, "a");
    }

    #[test]
    fn test_bind_defaults_and_named() {
        let parameters = vec![
            ("a".to_string(), None),
            ("b".to_string(), Some(json!(2))),
            ("c".to_string(), None),
        ];
        let layer = bind(
            "m",
            &parameters,
            vec![json!(1)],
            vec![("c".to_string(), json!(3))],
        )
        .unwrap();

        assert_eq!(layer["a"], json!(1));
        assert_eq!(layer["b"], json!(2));
        assert_eq!(layer["c"], json!(3));
    }

    #[test]
    fn test_bind_missing_is_none() {
        let parameters = vec![("a".to_string(), None)];
        let layer = bind("m", &parameters, vec![], vec![]).unwrap();

        assert_eq!(layer["a"], json!(null));
    }

    #[test]
    fn test_bind_rejects_extra_arguments() {
        let parameters = vec![("a".to_string(), None)];

        assert!(bind("m", &parameters, vec![json!(1), json!(2)], vec![]).is_err());
        assert!(bind("m", &parameters, vec![], vec![("z".to_string(), json!(1))]).is_err());
    }
}
