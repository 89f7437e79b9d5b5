use crate::{
    compile::{Operator, Scope},
    log::Error,
    region::Region,
};
use serde_json::Value;
use std::{fmt::Display, sync::Arc};

/// Name and source text of the template a node was parsed from.
///
/// Blocks and macros move between templates during inheritance and imports,
/// so they carry their origin to keep errors pointing at the right file.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    /// Name of the template.
    pub name: Arc<str>,
    /// Source text of the template.
    pub source: Arc<str>,
}

impl Origin {
    /// Create a new [`Origin`] from the given name and source text.
    pub fn new(name: &str, source: &str) -> Self {
        Self {
            name: Arc::from(name),
            source: Arc::from(source),
        }
    }

    /// Point the [`Error`] at the [`Region`] of this template, unless it already
    /// points somewhere.
    pub(crate) fn locate(&self, error: Error, region: Region) -> Error {
        error.or_pointer(&self.source, region).with_name(&*self.name)
    }
}

/// The Abstract Syntax Tree.
#[derive(Debug, Clone)]
pub enum Tree {
    /// Text outside of any tag.
    Text(String),
    /// Render an expression.
    Output(Output),
    /// An "if" block with any number of "elif" branches.
    If(If),
    /// A loop.
    For(For),
    /// Reference to a parent template.
    Extends(Extends),
    /// A named, overridable block.
    Block(Block),
    /// Render another template.
    Include(Include),
    /// Content of a raw block.
    Raw(String),
    /// An assignment.
    Set(Set),
    /// A macro definition.
    Macro(Macro),
    /// A call block, which invokes a macro that may call back into the body.
    Call(Call),
    /// Import the macros of a template as a namespace.
    Import(Import),
    /// Import specific macros of a template.
    FromImport(FromImport),
    /// A comment, which is never rendered.
    Comment(String),
    /// Code executed by the host.
    Exec(Exec),
}

/// Represents data within expression tags and block arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal value located directly in the template source.
    Literal(Literal),
    /// A value located by name.
    Variable(Variable),
    /// Access to a named property, such as `person.name`.
    Property(Property),
    /// Access to an index or key, such as `people[0]`.
    Index(Index),
    /// A unary operation.
    Unary(Unary),
    /// A binary operation.
    Binary(Binary),
    /// A value passed through a filter.
    Filter(Filter),
    /// An array literal.
    Array(Array),
    /// A dictionary literal.
    Dict(Dict),
    /// A ternary, `a if condition else b`.
    Conditional(Conditional),
    /// A test, `value is defined`.
    Test(Test),
    /// The rendering of the parent version of the current block.
    SuperCall(Region),
    /// The rendering of a block in the current template, `self.name()`.
    SelfCall(SelfCall),
    /// A call to a macro or a built-in function.
    MacroCall(MacroCall),
}

impl Expression {
    /// Get the [`Region`] from the underlying Expression kind.
    pub fn get_region(&self) -> Region {
        match self {
            Expression::Literal(literal) => literal.region,
            Expression::Variable(variable) => variable.region,
            Expression::Property(property) => property.region,
            Expression::Index(index) => index.region,
            Expression::Unary(unary) => unary.region,
            Expression::Binary(binary) => binary.region,
            Expression::Filter(filter) => filter.region,
            Expression::Array(array) => array.region,
            Expression::Dict(dict) => dict.region,
            Expression::Conditional(conditional) => conditional.region,
            Expression::Test(test) => test.region,
            Expression::SuperCall(region) => *region,
            Expression::SelfCall(call) => call.region,
            Expression::MacroCall(call) => call.region,
        }
    }

    /// Return the literal value, if this is a [`Literal`].
    ///
    /// A negated numeric literal is folded into a negative number.
    pub fn as_literal(&self) -> Option<Value> {
        match self {
            Expression::Literal(literal) => Some(literal.value.clone()),
            Expression::Unary(Unary {
                operator: UnaryOperator::Negate,
                operand,
                ..
            }) => match operand.as_literal()? {
                Value::Number(number) => {
                    if let Some(i) = number.as_i64() {
                        Some(Value::from(-i))
                    } else {
                        number.as_f64().map(|f| Value::from(-f))
                    }
                }
                _ => None,
            },
            _ => None,
        }
    }
}

/// Literal data that does not need to be evaluated any further.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: Value,
    pub region: Region,
}

/// A name that is looked up in the render scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub region: Region,
}

/// Access to a named property of the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub receiver: Box<Expression>,
    pub name: String,
    pub region: Region,
}

/// Access to an index or key of the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub receiver: Box<Expression>,
    pub index: Box<Expression>,
    pub region: Region,
}

/// Operators that take a single operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// not
    Not,
    /// -
    Negate,
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Not => write!(f, "not"),
            UnaryOperator::Negate => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unary {
    pub operator: UnaryOperator,
    pub operand: Box<Expression>,
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub left: Box<Expression>,
    pub operator: Operator,
    pub right: Box<Expression>,
    pub region: Region,
}

/// A value passed through a named filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// The value to the left of the pipe.
    pub receiver: Box<Expression>,
    /// Name of the filter.
    pub name: String,
    /// Arguments after the receiver.
    pub arguments: Arguments,
    /// Region of the name.
    pub name_region: Region,
    pub region: Region,
}

/// Set of arguments given to a filter, macro or function.
///
/// Named arguments are `key=value` pairs, anonymous arguments have no name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Arguments {
    pub values: Vec<(Option<String>, Expression)>,
    pub region: Region,
}

impl Arguments {
    /// Return an iterator over the anonymous arguments.
    pub fn positional(&self) -> impl Iterator<Item = &Expression> {
        self.values
            .iter()
            .filter(|(name, _)| name.is_none())
            .map(|(_, value)| value)
    }

    /// Return true if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub items: Vec<Expression>,
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dict {
    pub pairs: Vec<(Expression, Expression)>,
    pub region: Region,
}

/// A ternary expression.
///
/// When the condition is not truthy and no alternative exists, the result
/// is undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub value: Box<Expression>,
    pub condition: Box<Expression>,
    pub otherwise: Option<Box<Expression>>,
    pub region: Region,
}

/// Checks that can be made with `is`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    Defined,
    Undefined,
    None,
    Even,
    Odd,
    DivisibleBy,
    Iterable,
    Number,
    String,
    Mapping,
    Sequence,
    SameAs,
    Lower,
    Upper,
    Callable,
    EqualTo,
    Escaped,
}

impl TestKind {
    /// Return the [`TestKind`] with the given name, if any.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "defined" => TestKind::Defined,
            "undefined" => TestKind::Undefined,
            "none" => TestKind::None,
            "even" => TestKind::Even,
            "odd" => TestKind::Odd,
            "divisibleby" => TestKind::DivisibleBy,
            "iterable" => TestKind::Iterable,
            "number" => TestKind::Number,
            "string" => TestKind::String,
            "mapping" => TestKind::Mapping,
            "sequence" => TestKind::Sequence,
            "sameas" => TestKind::SameAs,
            "lower" => TestKind::Lower,
            "upper" => TestKind::Upper,
            "callable" => TestKind::Callable,
            "equalto" | "eq" => TestKind::EqualTo,
            "escaped" => TestKind::Escaped,
            _ => return None,
        };

        Some(kind)
    }

    /// Return true if the test requires an argument.
    pub fn takes_argument(&self) -> bool {
        matches!(
            self,
            TestKind::DivisibleBy | TestKind::SameAs | TestKind::EqualTo
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Test {
    pub operand: Box<Expression>,
    pub kind: TestKind,
    pub negated: bool,
    pub argument: Option<Box<Expression>>,
    pub region: Region,
}

/// A call to render a block of the current template.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfCall {
    pub name: String,
    pub region: Region,
}

/// A call to a macro, or to a built-in function or method.
///
/// `ns.name(...)` carries the receiver `ns`, which is either an import
/// namespace or a value whose method is called.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroCall {
    pub receiver: Option<Box<Expression>>,
    pub name: String,
    pub arguments: Arguments,
    pub region: Region,
}

/// Represents a call to render some kind of Expression.
#[derive(Debug, Clone)]
pub struct Output {
    pub expression: Expression,
    /// Source text of the expression.
    pub text: String,
    pub region: Region,
}

/// Conditional rendering.
///
/// The first branch whose condition is truthy is rendered.
#[derive(Debug, Clone)]
pub struct If {
    pub branches: Vec<(Expression, Scope)>,
    pub else_branch: Option<Scope>,
    pub region: Region,
}

/// Loop rendering.
#[derive(Debug, Clone)]
pub struct For {
    /// One target for items, or two for key and value pairs.
    pub targets: Vec<String>,
    pub iterable: Expression,
    /// Inline condition that filters items before the loop runs.
    pub filter: Option<Expression>,
    pub body: Scope,
    /// Rendered when nothing was iterated.
    pub else_branch: Option<Scope>,
    pub region: Region,
}

/// Reference to a parent template.
#[derive(Debug, Clone)]
pub struct Extends {
    pub target: Expression,
    pub region: Region,
}

/// A named block.
#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub body: Scope,
    /// True if the block was marked with `scoped`.
    pub scoped: bool,
    pub origin: Origin,
    pub region: Region,
}

/// Command to render another template.
#[derive(Debug, Clone)]
pub struct Include {
    pub target: Expression,
    pub ignore_missing: bool,
    pub with_context: bool,
    pub region: Region,
}

/// The value of an assignment.
#[derive(Debug, Clone)]
pub enum SetValue {
    /// `{% set name = expression %}`
    Expression(Expression),
    /// `{% set name %}...{% endset %}`
    Capture(Scope),
}

#[derive(Debug, Clone)]
pub struct Set {
    pub name: String,
    pub value: SetValue,
    pub region: Region,
}

/// Parameter of a macro or call block, with an optional literal default.
pub type Parameter = (String, Option<Value>);

/// A macro definition.
#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub body: Scope,
    /// Prefix used to resolve calls to sibling macros, set when the macro
    /// was imported from another template.
    pub namespace: Option<String>,
    pub origin: Origin,
    pub region: Region,
}

/// A call block.
#[derive(Debug, Clone)]
pub struct Call {
    /// Parameters accepted by `caller()`.
    pub parameters: Vec<Parameter>,
    /// The macro that is invoked.
    pub call: MacroCall,
    pub body: Scope,
    pub region: Region,
}

/// `{% import target as alias %}`
#[derive(Debug, Clone)]
pub struct Import {
    pub target: Expression,
    pub alias: String,
    pub region: Region,
}

/// `{% from target import name [as alias], ... %}`
#[derive(Debug, Clone)]
pub struct FromImport {
    pub target: Expression,
    pub names: Vec<(String, Option<String>)>,
    pub region: Region,
}

/// Code executed by the host.
#[derive(Debug, Clone)]
pub struct Exec {
    pub code: String,
    /// Rendered when the host returns nothing.
    pub else_branch: Option<Scope>,
    /// Rendered when the host fails.
    pub catch_branch: Option<Scope>,
    pub region: Region,
}
