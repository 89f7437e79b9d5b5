mod compiler;
mod inherit;
mod lex;
mod parse;
mod syntax;
mod template;
mod unit;

pub use crate::compile::{
    compiler::{compile, Compiler},
    inherit::merge,
    lex::{token, tokenize, Lexer},
    parse::{parse, scope::Scope, tree, Parser},
    syntax::{Builder, Marker, Syntax},
    template::Template,
    unit::Unit,
};

use crate::log::Error;
use std::fmt::Display;

pub(crate) type TokenResult = Result<Option<(token::Token, crate::Region)>, Error>;

/// Keywords recognized by the Lexer and Parser.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Keyword {
    /// Enables negation.
    Not,
    /// Logical conjunction.
    And,
    /// Logical disjunction.
    Or,
    /// Divides the targets from the iterable in a loop, and tests membership
    /// in expressions.
    ///
    /// In this example, the target is "person" while the iterable
    /// is "people":
    ///
    /// "for person in people"
    In,
    /// Beginning of a test, such as "x is defined".
    Is,
    /// Beginning of an "if" block, or the condition of a ternary.
    If,
    /// Additional branch of an "if" block.
    Elif,
    /// Marks the beginning of the else branch in an "if", "for" or "exec" block,
    /// or the alternative of a ternary.
    Else,
    /// End of an "if" block.
    EndIf,
    /// Beginning of a loop.
    For,
    /// End of a loop.
    EndFor,
    /// Beginning of a "block" block.
    Block,
    /// End of a "block" block.
    EndBlock,
    /// Beginning of an extends tag.
    Extends,
    /// Beginning of an include tag.
    Include,
    /// Beginning of a raw block.
    Raw,
    /// End of a raw block.
    EndRaw,
    /// Beginning of an assignment.
    Set,
    /// End of a capturing assignment.
    EndSet,
    /// Beginning of a macro definition.
    Macro,
    /// End of a macro definition.
    EndMacro,
    /// Beginning of a call block.
    Call,
    /// End of a call block.
    EndCall,
    /// Beginning of an import tag.
    Import,
    /// Beginning of a from-import tag.
    From,
    /// Introduces an alias in import tags.
    As,
    /// Beginning of a host execution block.
    Exec,
    /// Marks the beginning of the catch branch in an "exec" block.
    Catch,
    /// Generic end of an "exec" block.
    End,
    /// End of an "exec" block.
    EndExec,
}

impl Keyword {
    /// Return the [`Keyword`] spelled by the given text, if any.
    pub fn from_text(text: &str) -> Option<Self> {
        let keyword = match text {
            "not" => Keyword::Not,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "in" => Keyword::In,
            "is" => Keyword::Is,
            "if" => Keyword::If,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "endif" => Keyword::EndIf,
            "for" => Keyword::For,
            "endfor" => Keyword::EndFor,
            "block" => Keyword::Block,
            "endblock" => Keyword::EndBlock,
            "extends" => Keyword::Extends,
            "include" => Keyword::Include,
            "raw" => Keyword::Raw,
            "endraw" => Keyword::EndRaw,
            "set" => Keyword::Set,
            "endset" => Keyword::EndSet,
            "macro" => Keyword::Macro,
            "endmacro" => Keyword::EndMacro,
            "call" => Keyword::Call,
            "endcall" => Keyword::EndCall,
            "import" => Keyword::Import,
            "from" => Keyword::From,
            "as" => Keyword::As,
            "exec" => Keyword::Exec,
            "catch" => Keyword::Catch,
            "end" => Keyword::End,
            "endexec" => Keyword::EndExec,
            _ => return None,
        };

        Some(keyword)
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Keyword::Not => "not",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::In => "in",
            Keyword::Is => "is",
            Keyword::If => "if",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::EndIf => "endif",
            Keyword::For => "for",
            Keyword::EndFor => "endfor",
            Keyword::Block => "block",
            Keyword::EndBlock => "endblock",
            Keyword::Extends => "extends",
            Keyword::Include => "include",
            Keyword::Raw => "raw",
            Keyword::EndRaw => "endraw",
            Keyword::Set => "set",
            Keyword::EndSet => "endset",
            Keyword::Macro => "macro",
            Keyword::EndMacro => "endmacro",
            Keyword::Call => "call",
            Keyword::EndCall => "endcall",
            Keyword::Import => "import",
            Keyword::From => "from",
            Keyword::As => "as",
            Keyword::Exec => "exec",
            Keyword::Catch => "catch",
            Keyword::End => "end",
            Keyword::EndExec => "endexec",
        };

        write!(f, "{text}")
    }
}

/// Operators recognized by the Lexer and Parser.
///
/// The word operators (`and`, `or`, `in`, `not in`) are read as keywords by the
/// Lexer and converted by the Parser.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Operator {
    /// +
    Add,
    /// -
    Subtract,
    /// *
    Multiply,
    /// /
    Divide,
    /// //
    FloorDivide,
    /// %
    Modulo,
    /// **
    Power,
    /// ~
    Concat,
    /// >
    Greater,
    /// <
    Lesser,
    /// ==
    Equal,
    /// !=
    NotEqual,
    /// >=
    GreaterOrEqual,
    /// <=
    LesserOrEqual,
    /// and
    And,
    /// or
    Or,
    /// in
    In,
    /// not in
    NotIn,
}

impl Operator {
    /// Return true if the [`Operator`] compares two values and produces a boolean.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Greater
                | Operator::Lesser
                | Operator::Equal
                | Operator::NotEqual
                | Operator::GreaterOrEqual
                | Operator::LesserOrEqual
        )
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Add => write!(f, "+"),
            Operator::Subtract => write!(f, "-"),
            Operator::Multiply => write!(f, "*"),
            Operator::Divide => write!(f, "/"),
            Operator::FloorDivide => write!(f, "//"),
            Operator::Modulo => write!(f, "%"),
            Operator::Power => write!(f, "**"),
            Operator::Concat => write!(f, "~"),
            Operator::Greater => write!(f, ">"),
            Operator::Lesser => write!(f, "<"),
            Operator::Equal => write!(f, "=="),
            Operator::NotEqual => write!(f, "!="),
            Operator::GreaterOrEqual => write!(f, ">="),
            Operator::LesserOrEqual => write!(f, "<="),
            Operator::And => write!(f, "and"),
            Operator::Or => write!(f, "or"),
            Operator::In => write!(f, "in"),
            Operator::NotIn => write!(f, "not in"),
        }
    }
}
