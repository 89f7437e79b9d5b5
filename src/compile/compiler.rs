//! Kiln compiler.
//!
//! Lowers the Abstract Syntax Tree of a [`Unit`] into closures. Every statement
//! becomes an [`Emit`] that writes to a [`Pipe`], and every expression becomes an
//! [`Eval`] that produces a value, or `None` when the value is undefined.
//!
//! Names are resolved here rather than during the render: filters, macros,
//! blocks and parent blocks are looked up once, and unknown names are compile
//! errors.
use crate::{
    compile::{
        template::CompiledMacro,
        tree::{
            Arguments, Binary, Call, Exec, Expression, For, If, Include, MacroCall, Origin,
            Output, Set, SetValue, Test, Tree, UnaryOperator,
        },
        Operator, Scope, Template, Unit,
    },
    filter::{builtin, Filter},
    log::{
        error_missing_template, error_write, Error, INCOMPATIBLE_TYPES, INVALID_FILTER,
        INVALID_SYNTAX, UNDEFINED_VARIABLE,
    },
    pipe::stringify,
    region::Region,
    render::{
        check::check,
        compare::{arithmetic, compare_values, contains, is_truthy, type_name},
        emit, eval, Caller, Emit, Eval, Frame, Undefined,
    },
    Store,
};
use serde_json::{json, Map, Value};
use std::{collections::HashMap, fmt::Write, sync::Arc};
use tracing::debug;

/// Upper bound on the number of items `range` produces.
const MAX_RANGE: usize = 100_000;

/// Compiled arguments of a call, named or anonymous.
type CompiledArguments = Vec<(Option<String>, Box<Eval>)>;

/// Compile a [`Unit`] into a [`Template`].
///
/// Custom filters take precedence over built-in filters of the same name.
///
/// # Errors
///
/// Returns an [`Error`] when the unit refers to an unknown filter, macro, block
/// or function, uses `super()` where no parent block exists, or includes a
/// template by something other than a string literal.
pub fn compile(
    unit: &Unit,
    filters: &HashMap<String, Arc<dyn Filter>>,
    undefined: Undefined,
) -> Result<Template, Error> {
    Compiler::new(unit, filters, undefined).compile()
}

/// How reads of missing values behave.
#[derive(Debug, Clone, Copy)]
struct Policy {
    /// Reading through an undefined or null value yields undefined.
    silent: bool,
    /// Reading a missing name or property is an error.
    strict: bool,
}

/// Provides methods to compile a [`Unit`] into a [`Template`].
pub struct Compiler<'unit> {
    unit: &'unit Unit,
    filters: &'unit HashMap<String, Arc<dyn Filter>>,
    undefined: Undefined,
    /// Template the node being compiled was parsed from.
    origin: Origin,
    /// Name of the block being compiled, and whether it is a parent version.
    block: Option<(String, bool)>,
    /// Namespace of the macro being compiled.
    namespace: Option<String>,
    /// When set, missing values never raise errors.
    probe: bool,
}

impl<'unit> Compiler<'unit> {
    /// Create a new [`Compiler`].
    pub fn new(
        unit: &'unit Unit,
        filters: &'unit HashMap<String, Arc<dyn Filter>>,
        undefined: Undefined,
    ) -> Self {
        Self {
            unit,
            filters,
            undefined,
            origin: unit.origin.clone(),
            block: None,
            namespace: None,
            probe: false,
        }
    }

    /// Compile the blocks, parent blocks and macros of the [`Unit`], followed by
    /// its top-level body.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if any part of the unit cannot be compiled.
    pub fn compile(mut self) -> Result<Template, Error> {
        let unit = self.unit;

        let mut blocks = HashMap::with_capacity(unit.blocks.len());
        for (name, block) in &unit.blocks {
            self.origin = block.origin.clone();
            self.block = Some((name.clone(), false));
            blocks.insert(name.clone(), self.compile_scope(&block.body)?);
        }

        let mut supers = HashMap::with_capacity(unit.parents.len());
        for (name, block) in &unit.parents {
            self.origin = block.origin.clone();
            self.block = Some((name.clone(), true));
            supers.insert(name.clone(), self.compile_scope(&block.body)?);
        }

        self.block = None;
        let mut macros = HashMap::with_capacity(unit.macros.len());
        for (key, definition) in &unit.macros {
            self.origin = definition.origin.clone();
            self.namespace = definition.namespace.clone();
            let body = self.compile_scope(&definition.body)?;
            macros.insert(
                key.clone(),
                CompiledMacro {
                    parameters: definition.parameters.clone(),
                    body,
                },
            );
        }

        self.origin = unit.origin.clone();
        self.namespace = None;
        let main = self.compile_scope(&unit.scope)?;

        debug!(
            template = unit.get_name(),
            blocks = blocks.len(),
            macros = macros.len(),
            undefined = ?self.undefined,
            "compiled template",
        );

        Ok(Template {
            name: unit.get_name().to_string(),
            main,
            blocks,
            supers,
            macros,
            undefined: self.undefined,
        })
    }

    /// Compile every [`Tree`] in the [`Scope`] into a single [`Emit`].
    fn compile_scope(&mut self, scope: &Scope) -> Result<Box<Emit>, Error> {
        let mut parts = Vec::with_capacity(scope.data.len());
        for tree in &scope.data {
            if let Some(part) = self.compile_tree(tree)? {
                parts.push(part);
            }
        }

        Ok(emit(move |frame, pipe| {
            for part in &parts {
                part(frame, pipe)?;
            }
            Ok(())
        }))
    }

    /// Compile a [`Tree`], returning `None` when it produces no output.
    fn compile_tree(&mut self, tree: &Tree) -> Result<Option<Box<Emit>>, Error> {
        let part = match tree {
            Tree::Text(text) | Tree::Raw(text) => {
                let text = text.clone();
                emit(move |_, pipe| pipe.write_str(&text).map_err(|_| error_write()))
            }
            Tree::Output(output) => self.compile_output(output)?,
            Tree::If(tree) => self.compile_if(tree)?,
            Tree::For(tree) => self.compile_for(tree)?,
            Tree::Block(block) => {
                let name = block.name.clone();
                let origin = block.origin.clone();
                let region = block.region;
                emit(move |frame, pipe| {
                    let text = frame
                        .call_block(&name)
                        .map_err(|error| origin.locate(error, region))?;
                    pipe.write_str(&text).map_err(|_| error_write())
                })
            }
            Tree::Include(include) => self.compile_include(include)?,
            Tree::Set(set) => self.compile_set(set)?,
            Tree::Call(call) => self.compile_call(call)?,
            Tree::Exec(exec) => self.compile_exec(exec)?,
            Tree::Extends(_)
            | Tree::Macro(_)
            | Tree::Import(_)
            | Tree::FromImport(_)
            | Tree::Comment(_) => return Ok(None),
        };

        Ok(Some(part))
    }

    fn compile_output(&mut self, output: &Output) -> Result<Box<Emit>, Error> {
        let value = self.compile_expression(&output.expression)?;
        let placeholder = (self.undefined == Undefined::Debug)
            .then(|| format!("{{{{ {} }}}}", output.text.trim()));

        Ok(emit(move |frame, pipe| match value(frame)? {
            Some(value) => pipe.write_value(&value).map_err(|_| error_write()),
            None => match &placeholder {
                Some(text) => pipe.write_str(text).map_err(|_| error_write()),
                None => Ok(()),
            },
        }))
    }

    fn compile_if(&mut self, tree: &If) -> Result<Box<Emit>, Error> {
        let mut branches = Vec::with_capacity(tree.branches.len());
        for (condition, body) in &tree.branches {
            branches.push((self.compile_expression(condition)?, self.compile_scope(body)?));
        }
        let otherwise = self.compile_optional_scope(tree.else_branch.as_ref())?;

        Ok(emit(move |frame, pipe| {
            for (condition, body) in &branches {
                if truthy(&condition(frame)?) {
                    return body(frame, pipe);
                }
            }
            match &otherwise {
                Some(body) => body(frame, pipe),
                None => Ok(()),
            }
        }))
    }

    fn compile_for(&mut self, tree: &For) -> Result<Box<Emit>, Error> {
        let targets = tree.targets.clone();
        let iterable = self.compile_expression(&tree.iterable)?;
        let condition = match &tree.filter {
            Some(filter) => Some(self.compile_expression(filter)?),
            None => None,
        };
        let body = self.compile_scope(&tree.body)?;
        let otherwise = self.compile_optional_scope(tree.else_branch.as_ref())?;
        let origin = self.origin.clone();
        let region = tree.iterable.get_region();

        Ok(emit(move |frame, pipe| {
            let items = iterate(iterable(frame)?, targets.len())
                .map_err(|error| origin.locate(error, region))?;

            let length = frame.scoped(|frame| {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(condition) = &condition {
                        bind_targets(frame, &targets, &item);
                        if !truthy(&condition(frame)?) {
                            continue;
                        }
                    }
                    kept.push(item);
                }

                let length = kept.len();
                for (index, item) in kept.iter().enumerate() {
                    bind_targets(frame, &targets, item);
                    frame.shadow.insert("loop", loop_value(index, length));
                    body(frame, pipe)?;
                }
                Ok(length)
            })?;

            match &otherwise {
                Some(body) if length == 0 => body(frame, pipe),
                _ => Ok(()),
            }
        }))
    }

    fn compile_include(&mut self, include: &Include) -> Result<Box<Emit>, Error> {
        let names = self.template_names(&include.target)?;
        let ignore_missing = include.ignore_missing;
        let with_context = include.with_context;
        let origin = self.origin.clone();
        let region = include.region;

        Ok(emit(move |frame, pipe| {
            let store = if with_context {
                frame.shadow.flatten()
            } else {
                Store::new()
            };

            for name in &names {
                let included = frame
                    .engine
                    .include(name, &store, frame.includes)
                    .map_err(|error| origin.locate(error, region))?;
                if let Some(text) = included {
                    return pipe.write_str(&text).map_err(|_| error_write());
                }
            }
            if ignore_missing {
                return Ok(());
            }

            Err(origin.locate(error_missing_template(names.join("`, `")), region))
        }))
    }

    /// Return the template names an include refers to.
    ///
    /// The target is a string literal, or an array of them where the first
    /// template that exists is used.
    fn template_names(&self, target: &Expression) -> Result<Vec<String>, Error> {
        let names = match target.as_literal() {
            Some(Value::String(name)) => Some(vec![name]),
            _ => match target {
                Expression::Array(array) => array
                    .items
                    .iter()
                    .map(|item| match item.as_literal() {
                        Some(Value::String(name)) => Some(name),
                        _ => None,
                    })
                    .collect(),
                _ => None,
            },
        };

        names.ok_or_else(|| {
            self.error(Error::compile(INVALID_SYNTAX), target.get_region())
                .with_help("include targets must be a string literal or an array of them")
        })
    }

    fn compile_set(&mut self, set: &Set) -> Result<Box<Emit>, Error> {
        let name = set.name.clone();

        let part = match &set.value {
            SetValue::Expression(expression) => {
                let value = self.compile_expression(expression)?;
                emit(move |frame, _| {
                    let value = value(frame)?.unwrap_or(Value::Null);
                    frame.shadow.assign(name.as_str(), value);
                    Ok(())
                })
            }
            SetValue::Capture(body) => {
                let body = self.compile_scope(body)?;
                emit(move |frame, _| {
                    let text = frame.capture(body.as_ref())?;
                    frame.shadow.assign(name.as_str(), Value::String(text));
                    Ok(())
                })
            }
        };

        Ok(part)
    }

    fn compile_call(&mut self, call: &Call) -> Result<Box<Emit>, Error> {
        let key = self
            .resolve_macro(call.call.receiver.as_deref(), &call.call.name)
            .ok_or_else(|| {
                self.error(Error::compile(INVALID_SYNTAX), call.call.region)
                    .with_help(format!("call block target `{}` is not a macro", call.call.name))
            })?;
        let arguments = self.compile_arguments(&call.call.arguments)?;
        let body: Arc<Emit> = Arc::from(self.compile_scope(&call.body)?);
        let parameters = Arc::new(call.parameters.clone());
        let origin = self.origin.clone();
        let region = call.call.region;

        Ok(emit(move |frame, pipe| {
            let (positional, named) = evaluate_arguments(frame, &arguments)?;
            let caller = Caller::new(
                Arc::clone(&parameters),
                Arc::clone(&body),
                frame.shadow.snapshot(),
            );
            let text = frame
                .with_caller(caller, |frame| frame.call_macro(&key, positional, named))
                .map_err(|error| origin.locate(error, region))?;

            pipe.write_str(&text).map_err(|_| error_write())
        }))
    }

    fn compile_exec(&mut self, exec: &Exec) -> Result<Box<Emit>, Error> {
        let code = exec.code.clone();
        let otherwise = self.compile_optional_scope(exec.else_branch.as_ref())?;
        let catch = self.compile_optional_scope(exec.catch_branch.as_ref())?;
        let origin = self.origin.clone();
        let region = exec.region;

        Ok(emit(move |frame, pipe| {
            let host = frame.engine.host.clone().ok_or_else(|| {
                origin.locate(
                    Error::render("missing host")
                        .with_help("exec blocks require a host, add one with `Engine::with_host`"),
                    region,
                )
            })?;

            let store = frame.shadow.flatten();
            match host.execute(&code, &store) {
                Ok(value) if is_empty(&value) => match &otherwise {
                    Some(body) => body(frame, pipe),
                    None => Ok(()),
                },
                Ok(value) => pipe.write_value(&value).map_err(|_| error_write()),
                Err(error) => match &catch {
                    Some(body) => {
                        debug!(reason = error.get_reason(), "host failed, rendering catch");
                        frame.scoped(|frame| {
                            let reason = Value::String(error.get_reason().to_string());
                            frame.shadow.insert("error", reason);
                            body(frame, pipe)
                        })
                    }
                    None => Err(origin.locate(error, region)),
                },
            }
        }))
    }

    fn compile_optional_scope(&mut self, scope: Option<&Scope>) -> Result<Option<Box<Emit>>, Error> {
        scope.map(|scope| self.compile_scope(scope)).transpose()
    }

    /// Compile an [`Expression`] into an [`Eval`].
    pub fn compile_expression(&mut self, expression: &Expression) -> Result<Box<Eval>, Error> {
        let origin = self.origin.clone();
        let region = expression.get_region();
        let policy = self.policy();

        let compiled = match expression {
            Expression::Literal(literal) => {
                let value = literal.value.clone();
                eval(move |_| Ok(Some(value.clone())))
            }
            Expression::Variable(variable) => {
                let name = variable.name.clone();
                eval(move |frame| match frame.shadow.get(&name) {
                    Some(value) => Ok(Some(value.clone())),
                    None if policy.strict => Err(origin.locate(
                        Error::render(UNDEFINED_VARIABLE)
                            .with_help(format!("`{name}` is not defined")),
                        region,
                    )),
                    None => Ok(None),
                })
            }
            Expression::Property(property) => {
                let receiver = self.compile_expression(&property.receiver)?;
                let key = Value::String(property.name.clone());
                eval(move |frame| {
                    access(receiver(frame)?, &key, policy).map_err(|e| origin.locate(e, region))
                })
            }
            Expression::Index(index) => {
                let receiver = self.compile_expression(&index.receiver)?;
                let key = self.compile_expression(&index.index)?;
                eval(move |frame| {
                    let value = receiver(frame)?;
                    let key = key(frame)?.unwrap_or(Value::Null);
                    access(value, &key, policy).map_err(|e| origin.locate(e, region))
                })
            }
            Expression::Unary(unary) => {
                let operand = self.compile_expression(&unary.operand)?;
                let chainable = self.undefined == Undefined::Chainable;
                match unary.operator {
                    UnaryOperator::Not => {
                        eval(move |frame| Ok(Some(Value::Bool(!truthy(&operand(frame)?)))))
                    }
                    UnaryOperator::Negate => eval(move |frame| match operand(frame)? {
                        None if chainable => Ok(None),
                        value => arithmetic(&json!(0), Operator::Subtract, &value.unwrap_or(Value::Null))
                            .map(Some)
                            .map_err(|e| origin.locate(e, region)),
                    }),
                }
            }
            Expression::Binary(binary) => self.compile_binary(binary)?,
            Expression::Filter(filter) => {
                let name = normalize(&filter.name);
                let resolved = self.resolve_filter(&filter.name, &name, filter.name_region)?;
                let receiver = if matches!(name.as_str(), "default" | "d") {
                    self.compile_probe(&filter.receiver)?
                } else {
                    self.compile_expression(&filter.receiver)?
                };
                let arguments = self.compile_arguments(&filter.arguments)?;
                let name_region = filter.name_region;

                eval(move |frame| {
                    let value = receiver(frame)?.unwrap_or(Value::Null);
                    let arguments = filter_arguments(frame, &arguments)?;
                    resolved
                        .apply(&value, &arguments)
                        .map(Some)
                        .map_err(|error| origin.locate(error, name_region))
                })
            }
            Expression::Array(array) => {
                let items = array
                    .items
                    .iter()
                    .map(|item| self.compile_expression(item))
                    .collect::<Result<Vec<_>, _>>()?;
                eval(move |frame| {
                    let mut values = Vec::with_capacity(items.len());
                    for item in &items {
                        values.push(item(frame)?.unwrap_or(Value::Null));
                    }
                    Ok(Some(Value::Array(values)))
                })
            }
            Expression::Dict(dict) => {
                let mut pairs = Vec::with_capacity(dict.pairs.len());
                for (key, value) in &dict.pairs {
                    pairs.push((self.compile_expression(key)?, self.compile_expression(value)?));
                }
                eval(move |frame| {
                    let mut map = Map::with_capacity(pairs.len());
                    for (key, value) in &pairs {
                        let key = match key(frame)? {
                            Some(Value::String(key)) => key,
                            Some(key @ (Value::Number(_) | Value::Bool(_))) => key.to_string(),
                            other => {
                                return Err(origin.locate(
                                    Error::build(INCOMPATIBLE_TYPES).with_help(format!(
                                        "dictionary keys must be strings, found `{}`",
                                        type_name(&other.unwrap_or(Value::Null))
                                    )),
                                    region,
                                ))
                            }
                        };
                        map.insert(key, value(frame)?.unwrap_or(Value::Null));
                    }
                    Ok(Some(Value::Object(map)))
                })
            }
            Expression::Conditional(conditional) => {
                let value = self.compile_expression(&conditional.value)?;
                let condition = self.compile_expression(&conditional.condition)?;
                let otherwise = match &conditional.otherwise {
                    Some(otherwise) => Some(self.compile_expression(otherwise)?),
                    None => None,
                };
                eval(move |frame| {
                    if truthy(&condition(frame)?) {
                        return value(frame);
                    }
                    match &otherwise {
                        Some(otherwise) => otherwise(frame),
                        None => Ok(None),
                    }
                })
            }
            Expression::Test(test) => self.compile_test(test)?,
            Expression::SuperCall(_) => {
                let name = match &self.block {
                    Some((name, false)) if self.unit.parents.contains_key(name) => name.clone(),
                    _ => {
                        return Err(self.error(Error::compile(INVALID_SYNTAX), region).with_help(
                            "`super()` may only be used in a block that overrides a parent block",
                        ))
                    }
                };
                eval(move |frame| {
                    frame
                        .call_super(&name)
                        .map(|text| Some(Value::String(text)))
                        .map_err(|error| origin.locate(error, region))
                })
            }
            Expression::SelfCall(call) => {
                if !self.unit.blocks.contains_key(&call.name) {
                    return Err(self
                        .error(Error::compile(INVALID_SYNTAX), region)
                        .with_help(format!("block `{}` does not exist", call.name)));
                }
                let name = call.name.clone();
                eval(move |frame| {
                    frame
                        .call_block(&name)
                        .map(|text| Some(Value::String(text)))
                        .map_err(|error| origin.locate(error, region))
                })
            }
            Expression::MacroCall(call) => self.compile_macro_call(call)?,
        };

        Ok(compiled)
    }

    /// Compile an [`Expression`] whose missing values never raise errors.
    fn compile_probe(&mut self, expression: &Expression) -> Result<Box<Eval>, Error> {
        let previous = std::mem::replace(&mut self.probe, true);
        let compiled = self.compile_expression(expression);
        self.probe = previous;

        compiled
    }

    fn compile_binary(&mut self, binary: &Binary) -> Result<Box<Eval>, Error> {
        let left = self.compile_expression(&binary.left)?;
        let right = self.compile_expression(&binary.right)?;
        let operator = binary.operator;
        let chainable = self.undefined == Undefined::Chainable;
        let origin = self.origin.clone();
        let region = binary.region;

        let compiled = match operator {
            Operator::And => eval(move |frame| {
                let value = left(frame)?;
                if !truthy(&value) {
                    return Ok(value);
                }
                right(frame)
            }),
            Operator::Or => eval(move |frame| {
                let value = left(frame)?;
                if truthy(&value) {
                    return Ok(value);
                }
                right(frame)
            }),
            Operator::Concat => eval(move |frame| {
                let mut text = left(frame)?.map(|v| stringify(&v)).unwrap_or_default();
                if let Some(value) = right(frame)? {
                    text.push_str(&stringify(&value));
                }
                Ok(Some(Value::String(text)))
            }),
            Operator::In | Operator::NotIn => eval(move |frame| {
                let item = left(frame)?.unwrap_or(Value::Null);
                let container = match right(frame)? {
                    Some(container) => container,
                    None if chainable => return Ok(Some(Value::Bool(operator == Operator::NotIn))),
                    None => Value::Null,
                };
                let found = contains(&container, &item).map_err(|e| origin.locate(e, region))?;
                Ok(Some(Value::Bool(found != (operator == Operator::NotIn))))
            }),
            operator if operator.is_comparison() => eval(move |frame| {
                let left = left(frame)?.unwrap_or(Value::Null);
                let right = right(frame)?.unwrap_or(Value::Null);
                compare_values(&left, operator, &right)
                    .map(|result| Some(Value::Bool(result)))
                    .map_err(|e| origin.locate(e, region))
            }),
            operator => eval(move |frame| {
                let (left, right) = match (left(frame)?, right(frame)?) {
                    (Some(left), Some(right)) => (left, right),
                    _ if chainable => return Ok(None),
                    (left, right) => (left.unwrap_or(Value::Null), right.unwrap_or(Value::Null)),
                };
                arithmetic(&left, operator, &right)
                    .map(Some)
                    .map_err(|e| origin.locate(e, region))
            }),
        };

        Ok(compiled)
    }

    fn compile_test(&mut self, test: &Test) -> Result<Box<Eval>, Error> {
        let operand = self.compile_probe(&test.operand)?;
        let argument = match &test.argument {
            Some(argument) => Some(self.compile_expression(argument)?),
            None => None,
        };
        let (callable, is_caller) = match test.operand.as_ref() {
            Expression::Variable(variable) if variable.name == "caller" => (false, true),
            Expression::Variable(variable) => (self.resolve_macro(None, &variable.name).is_some(), false),
            Expression::Property(property) => (
                self.resolve_macro(Some(property.receiver.as_ref()), &property.name)
                    .is_some(),
                false,
            ),
            _ => (false, false),
        };
        let kind = test.kind;
        let negated = test.negated;
        let origin = self.origin.clone();
        let region = test.region;

        Ok(eval(move |frame| {
            let value = operand(frame)?;
            let argument = match &argument {
                Some(argument) => argument(frame)?,
                None => None,
            };
            let callable = callable || (is_caller && frame.has_caller());
            let result = check(kind, value.as_ref(), argument.as_ref(), callable)
                .map_err(|e| origin.locate(e, region))?;

            Ok(Some(Value::Bool(result != negated)))
        }))
    }

    fn compile_macro_call(&mut self, call: &MacroCall) -> Result<Box<Eval>, Error> {
        let origin = self.origin.clone();
        let region = call.region;
        let arguments = self.compile_arguments(&call.arguments)?;

        if let Some(key) = self.resolve_macro(call.receiver.as_deref(), &call.name) {
            return Ok(eval(move |frame| {
                let (positional, named) = evaluate_arguments(frame, &arguments)?;
                frame
                    .call_macro(&key, positional, named)
                    .map(|text| Some(Value::String(text)))
                    .map_err(|error| origin.locate(error, region))
            }));
        }

        let compiled = match (call.receiver.as_deref(), call.name.as_str()) {
            (None, "caller") => eval(move |frame| {
                let (positional, named) = evaluate_arguments(frame, &arguments)?;
                frame
                    .call_caller(positional, named)
                    .map(|text| Some(Value::String(text)))
                    .map_err(|error| origin.locate(error, region))
            }),
            (None, "range") => eval(move |frame| {
                let (positional, _) = evaluate_arguments(frame, &arguments)?;
                range(&positional)
                    .map(Some)
                    .map_err(|error| origin.locate(error, region))
            }),
            (Some(receiver), name @ ("items" | "keys" | "values")) if call.arguments.is_empty() => {
                let receiver = self.compile_expression(receiver)?;
                let policy = self.policy();
                let name = name.to_string();
                eval(move |frame| {
                    method(receiver(frame)?, &name, policy)
                        .map_err(|error| origin.locate(error, region))
                })
            }
            _ => {
                return Err(self
                    .error(Error::compile(INVALID_SYNTAX), region)
                    .with_help(format!("`{}` is not a macro or function", call.name)))
            }
        };

        Ok(compiled)
    }

    fn compile_arguments(&mut self, arguments: &Arguments) -> Result<CompiledArguments, Error> {
        arguments
            .values
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.compile_expression(value)?)))
            .collect()
    }

    /// Find the filter with the given name.
    ///
    /// Custom filters are searched by the name as written and by the
    /// normalized name, then the built-in filters by the normalized name.
    fn resolve_filter(
        &self,
        name: &str,
        normalized: &str,
        region: Region,
    ) -> Result<Arc<dyn Filter>, Error> {
        if let Some(filter) = self.filters.get(name).or_else(|| self.filters.get(normalized)) {
            return Ok(Arc::clone(filter));
        }
        if let Some(filter) = builtin::lookup(normalized) {
            return Ok(Arc::new(filter));
        }

        Err(self
            .error(Error::compile(INVALID_FILTER), region)
            .with_help(format!(
                "template wants to use the `{name}` filter, but a filter with that name was not \
                found, did you add the filter to the engine with `.add_filter` or `.with_filter`?"
            )))
    }

    /// Return the key of the macro called by `receiver.name(...)`.
    ///
    /// Inside an imported macro, siblings from the same template are found
    /// before macros of the importing template.
    fn resolve_macro(&self, receiver: Option<&Expression>, name: &str) -> Option<String> {
        let path = match receiver {
            Some(receiver) => format!("{}.{name}", dotted(receiver)?),
            None => name.to_string(),
        };

        if let Some(namespace) = &self.namespace {
            let key = format!("{namespace}.{path}");
            if self.unit.macros.contains_key(&key) {
                return Some(key);
            }
        }

        self.unit.macros.contains_key(&path).then_some(path)
    }

    fn policy(&self) -> Policy {
        Policy {
            silent: self.probe
                || matches!(self.undefined, Undefined::Chainable | Undefined::Debug),
            strict: !self.probe && self.undefined == Undefined::Strict,
        }
    }

    /// Point the [`Error`] at the [`Region`] of the template being compiled.
    fn error(&self, error: Error, region: Region) -> Error {
        error
            .with_pointer(&self.origin.source, region)
            .with_name(&*self.origin.name)
    }
}

/// Lowercase the first letter of a filter name.
fn normalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Return the dotted path of a chain of names, such as `forms.fields`.
fn dotted(expression: &Expression) -> Option<String> {
    match expression {
        Expression::Variable(variable) => Some(variable.name.clone()),
        Expression::Property(property) => {
            Some(format!("{}.{}", dotted(&property.receiver)?, property.name))
        }
        _ => None,
    }
}

fn truthy(value: &Option<Value>) -> bool {
    value.as_ref().is_some_and(is_truthy)
}

/// Return true if a host result should render the `else` branch.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(string) => string.is_empty(),
        _ => false,
    }
}

/// Read a property, index or key of the receiver.
fn access(receiver: Option<Value>, key: &Value, policy: Policy) -> Result<Option<Value>, Error> {
    let value = match receiver {
        None | Some(Value::Null) if policy.silent => return Ok(None),
        None | Some(Value::Null) => {
            return Err(Error::render(UNDEFINED_VARIABLE)
                .with_help(format!("cannot read `{}` of an undefined value", stringify(key))))
        }
        Some(value) => value,
    };

    let found = match (&value, key) {
        (Value::Object(object), Value::String(key)) => object.get(key).cloned(),
        (Value::Object(object), Value::Number(key)) => object.get(&key.to_string()).cloned(),
        (Value::Array(array), Value::Number(index)) => {
            position(index.as_i64(), array.len()).and_then(|i| array.get(i).cloned())
        }
        (Value::String(string), Value::Number(index)) => {
            let chars: Vec<char> = string.chars().collect();
            position(index.as_i64(), chars.len())
                .and_then(|i| chars.get(i).map(|c| Value::String(c.to_string())))
        }
        _ => None,
    };

    match found {
        None if policy.strict => Err(Error::render(UNDEFINED_VARIABLE).with_help(format!(
            "`{}` has no attribute `{}`",
            type_name(&value),
            stringify(key)
        ))),
        found => Ok(found),
    }
}

/// Convert an index that may count from the end into a position.
fn position(index: Option<i64>, len: usize) -> Option<usize> {
    let index = index?;
    if index < 0 {
        len.checked_sub(usize::try_from(index.unsigned_abs()).ok()?)
    } else {
        usize::try_from(index).ok()
    }
}

/// Call a mapping method.
fn method(receiver: Option<Value>, name: &str, policy: Policy) -> Result<Option<Value>, Error> {
    let object = match receiver {
        Some(Value::Object(object)) => object,
        None | Some(Value::Null) if policy.silent => return Ok(None),
        other => {
            return Err(Error::build(INCOMPATIBLE_TYPES).with_help(format!(
                "method `{name}` requires a mapping, found `{}`",
                type_name(&other.unwrap_or(Value::Null))
            )))
        }
    };

    let values = match name {
        "items" => object
            .into_iter()
            .map(|(key, value)| Value::Array(vec![Value::String(key), value]))
            .collect(),
        "keys" => object.into_iter().map(|(key, _)| Value::String(key)).collect(),
        _ => object.into_iter().map(|(_, value)| value).collect(),
    };

    Ok(Some(Value::Array(values)))
}

/// Produce the numbers of `range(stop)` or `range(start, stop[, step])`.
fn range(arguments: &[Value]) -> Result<Value, Error> {
    let numbers = arguments
        .iter()
        .map(|value| {
            value.as_i64().ok_or_else(|| {
                Error::build(INCOMPATIBLE_TYPES)
                    .with_help(format!("`range` requires integers, found `{}`", stringify(value)))
            })
        })
        .collect::<Result<Vec<i64>, Error>>()?;

    let (start, stop, step) = match numbers.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(Error::build(INVALID_SYNTAX)
                .with_help("`range` takes between 1 and 3 arguments"))
        }
    };
    if step == 0 {
        return Err(Error::build(INVALID_SYNTAX).with_help("`range` step must not be zero"));
    }

    let mut values = vec![];
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        if values.len() >= MAX_RANGE {
            return Err(Error::build(INVALID_SYNTAX)
                .with_help(format!("`range` may not produce more than {MAX_RANGE} items")));
        }
        values.push(Value::from(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }

    Ok(Value::Array(values))
}

/// Turn a value into loop items, with one value per loop target.
fn iterate(value: Option<Value>, targets: usize) -> Result<Vec<Vec<Value>>, Error> {
    let items: Vec<Value> = match value {
        None | Some(Value::Null) => return Ok(vec![]),
        Some(Value::Array(array)) => array,
        Some(Value::Object(object)) if targets == 2 => {
            return Ok(object
                .into_iter()
                .map(|(key, value)| vec![Value::String(key), value])
                .collect())
        }
        Some(Value::Object(object)) => object.into_iter().map(|(key, _)| Value::String(key)).collect(),
        Some(Value::String(string)) => string
            .chars()
            .map(|char| Value::String(char.to_string()))
            .collect(),
        Some(other) => {
            return Err(Error::build(INCOMPATIBLE_TYPES)
                .with_help(format!("`{}` is not iterable", type_name(&other))))
        }
    };

    if targets == 1 {
        return Ok(items.into_iter().map(|item| vec![item]).collect());
    }

    items
        .into_iter()
        .map(|item| match item {
            Value::Array(values) if values.len() == targets => Ok(values),
            other => Err(Error::build(INCOMPATIBLE_TYPES).with_help(format!(
                "cannot unpack `{}` into {targets} loop targets",
                stringify(&other)
            ))),
        })
        .collect()
}

fn bind_targets(frame: &mut Frame<'_>, targets: &[String], item: &[Value]) {
    for (target, value) in targets.iter().zip(item) {
        frame.shadow.insert(target.as_str(), value.clone());
    }
}

/// Return the `loop` variable for the item at `index`.
fn loop_value(index: usize, length: usize) -> Value {
    json!({
        "index": index + 1,
        "index0": index,
        "revindex": length - index,
        "revindex0": length - index - 1,
        "first": index == 0,
        "last": index + 1 == length,
        "length": length,
    })
}

/// Evaluate call arguments into positional and named values.
fn evaluate_arguments(
    frame: &mut Frame<'_>,
    arguments: &CompiledArguments,
) -> Result<(Vec<Value>, Vec<(String, Value)>), Error> {
    let mut positional = vec![];
    let mut named = vec![];
    for (name, value) in arguments {
        let value = value(frame)?.unwrap_or(Value::Null);
        match name {
            Some(name) => named.push((name.clone(), value)),
            None => positional.push(value),
        }
    }

    Ok((positional, named))
}

/// Evaluate filter arguments into a map.
///
/// Any argument without a name is named after its position among the
/// anonymous arguments, starting at "1".
fn filter_arguments(
    frame: &mut Frame<'_>,
    arguments: &CompiledArguments,
) -> Result<HashMap<String, Value>, Error> {
    let mut buffer = HashMap::with_capacity(arguments.len());
    let mut unnamed = 1;

    for (name, value) in arguments {
        let name = match name {
            Some(name) => name.clone(),
            None => {
                let temp = unnamed;
                unnamed += 1;
                temp.to_string()
            }
        };
        buffer.insert(name, value(frame)?.unwrap_or(Value::Null));
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::{compile, iterate, normalize, range};
    use crate::{
        compile::{parse, tokenize, Syntax, Template},
        render::{Frame, Undefined},
        Engine, Store,
    };
    use serde_json::json;
    use std::collections::HashMap;

    fn helper_compile(source: &str, undefined: Undefined) -> Result<Template, crate::log::Error> {
        let tokens = tokenize(source, &Syntax::default())?;
        let unit = parse(source, tokens, "test")?;
        compile(&unit, &HashMap::new(), undefined)
    }

    fn helper_render(source: &str, store: &Store) -> String {
        let template = helper_compile(source, Undefined::Default).unwrap();
        let engine = Engine::new();
        Frame::new(&engine, &template, store, 0).render().unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Upper"), "upper");
        assert_eq!(normalize("length"), "length");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_range() {
        assert_eq!(range(&[json!(3)]).unwrap(), json!([0, 1, 2]));
        assert_eq!(range(&[json!(5), json!(1), json!(-2)]).unwrap(), json!([5, 3]));
        assert!(range(&[json!(1), json!(5), json!(0)]).is_err());
        assert!(range(&[json!(0), json!(1_000_000)]).is_err());
    }

    #[test]
    fn test_iterate_pairs() {
        let items = iterate(Some(json!({"a": 1})), 2).unwrap();
        assert_eq!(items, vec![vec![json!("a"), json!(1)]]);
        assert!(iterate(Some(json!(1)), 1).is_err());
        assert!(iterate(None, 1).unwrap().is_empty());
    }

    #[test]
    fn test_compile_unknown_filter() {
        assert!(helper_compile("{{ a|nope }}", Undefined::Default).is_err());
    }

    #[test]
    fn test_compile_super_outside_block() {
        assert!(helper_compile("{{ super() }}", Undefined::Default).is_err());
    }

    #[test]
    fn test_compile_unknown_block() {
        assert!(helper_compile("{{ self.missing() }}", Undefined::Default).is_err());
    }

    #[test]
    fn test_compile_call_requires_macro() {
        assert!(helper_compile("{% call nothing() %}x{% endcall %}", Undefined::Default).is_err());
    }

    #[test]
    fn test_render_and_or_values() {
        let store = Store::new().with_must("name", "taylor");

        assert_eq!(helper_render("{{ missing or name }}", &store), "taylor");
        assert_eq!(helper_render("{{ name and 'yes' }}", &store), "yes");
        assert_eq!(helper_render("{{ 0 and 'yes' }}", &store), "0");
    }

    #[test]
    fn test_render_loop_variables() {
        let result = helper_render(
            "{% for x in ['a', 'b', 'c'] %}{{ loop.index }}{{ x }}{% if not loop.last %},{% endif %}{% endfor %}",
            &Store::new(),
        );

        assert_eq!(result, "1a,2b,3c");
    }

    #[test]
    fn test_render_loop_filter_and_else() {
        let store = Store::new().with_must("numbers", vec![1, 2, 3, 4]);

        assert_eq!(
            helper_render("{% for n in numbers if n is even %}{{ n }}{% endfor %}", &store),
            "24"
        );
        assert_eq!(
            helper_render("{% for n in numbers if n > 10 %}{{ n }}{% else %}none{% endfor %}", &store),
            "none"
        );
    }

    #[test]
    fn test_render_loop_pairs() {
        let store = Store::new().with_must("map", json!({"a": 1, "b": 2}));

        assert_eq!(
            helper_render("{% for k, v in map.items() %}{{ k }}={{ v }};{% endfor %}", &store),
            "a=1;b=2;"
        );
    }

    #[test]
    fn test_render_set_capture() {
        assert_eq!(
            helper_render("{% set greeting %}hi {{ 'there' }}{% endset %}{{ greeting|upper }}", &Store::new()),
            "HI THERE"
        );
    }

    #[test]
    fn test_render_set_in_loop_outlives_loop() {
        let result = helper_render(
            "{% for x in [1, 2] %}{% set last = x %}{% endfor %}[{{ last }}]",
            &Store::new(),
        );

        assert_eq!(result, "[2]");
    }

    #[test]
    fn test_render_set_in_block_outlives_block() {
        let result = helper_render(
            "{% block head %}{% set title = 'T' %}{% endblock %}|{{ title }}",
            &Store::new(),
        );

        assert_eq!(result, "|T");
    }

    #[test]
    fn test_render_set_in_macro_stays_local() {
        let result = helper_render(
            "{% macro m() %}{% for i in [1] %}{% set inner = 'in' %}{% endfor %}{{ inner }}{% endmacro %}{{ m() }}[{{ inner }}]",
            &Store::new(),
        );

        assert_eq!(result, "in[]");
    }

    #[test]
    fn test_render_filter_applies_to_whole_operand() {
        let store = Store::new().with_must("x", "bob");

        assert_eq!(helper_render("{{ 'a' ~ 'b' | upper }}", &store), "AB");
        assert_eq!(helper_render("{{ x or 'guest' | upper }}", &store), "BOB");
        assert_eq!(helper_render("{{ missing or 'guest' | upper }}", &store), "GUEST");
        assert_eq!(helper_render("{{ -3 | abs }}", &store), "3");
    }

    #[test]
    fn test_render_macro_defaults() {
        let result = helper_render(
            "{% macro tag(name, kind='div') %}<{{ kind }}>{{ name }}{% endmacro %}{{ tag('a') }}|{{ tag('b', kind='p') }}",
            &Store::new(),
        );

        assert_eq!(result, "<div>a|<p>b");
    }

    #[test]
    fn test_render_call_block() {
        let result = helper_render(
            "{% macro box() %}[{{ caller() }}]{% endmacro %}{% call box() %}  a \n  b  {% endcall %}",
            &Store::new(),
        );

        assert_eq!(result, "[a b]");
    }

    #[test]
    fn test_render_call_block_parameters() {
        let result = helper_render(
            "{% macro each(items) %}{% for i in items %}{{ caller(i) }}{% endfor %}{% endmacro %}\
             {% call(item) each([1, 2]) %}<{{ item }}>{% endcall %}",
            &Store::new(),
        );

        assert_eq!(result, "<1><2>");
    }

    #[test]
    fn test_render_tests() {
        let store = Store::new().with_must("n", 4);

        assert_eq!(helper_render("{{ n is even }}", &store), "true");
        assert_eq!(helper_render("{{ n is not divisibleby 3 }}", &store), "true");
        assert_eq!(helper_render("{{ missing is defined }}", &store), "false");
        assert_eq!(helper_render("{{ missing.deep is undefined }}", &store), "true");
    }

    #[test]
    fn test_render_default_filter_probes() {
        let store = Store::new();

        assert_eq!(helper_render("{{ missing.deep|default('x') }}", &store), "x");
    }

    #[test]
    fn test_render_property_of_undefined_fails() {
        let template = helper_compile("{{ missing.deep }}", Undefined::Default).unwrap();
        let engine = Engine::new();
        let store = Store::new();

        assert!(Frame::new(&engine, &template, &store, 0).render().is_err());
    }
}
