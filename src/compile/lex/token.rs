use crate::compile::{syntax::Marker, Keyword, Operator};
use std::fmt::Display;

/// Types emitted by the Lexer.
///
/// An abstraction over raw text to make construction of Tree types easier.
/// The text, line and column of a token are recovered from the
/// [`Region`][`crate::Region`] that accompanies it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Token {
    /// Text outside of any tag.
    Text,
    /// Content of a raw block, or code of an exec block, taken verbatim.
    Verbatim,
    /// Content of a comment.
    Comment,
    /// String literal within a tag.
    String,
    /// Number within a tag.
    Number,
    /// Identifier (unquoted string) within a tag.
    Identifier,
    /// Beginning of an expression - {{ by default.
    BeginExpression,
    /// End of an expression - }} by default.
    EndExpression,
    /// Beginning of a block - {% by default.
    BeginBlock,
    /// End of a block - %} by default.
    EndBlock,
    /// Beginning of a comment - {# by default.
    BeginComment,
    /// End of a comment - #} by default.
    EndComment,
    /// .
    Period,
    /// ,
    Comma,
    /// :
    Colon,
    /// |
    Pipe,
    /// =
    Assign,
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// {
    LeftBrace,
    /// }
    RightBrace,
    /// A boolean true.
    True,
    /// A boolean false.
    False,
    /// The absence of a value.
    None,
    /// A reserved word.
    Keyword(Keyword),
    /// Describes an action taken on two values.
    Operator(Operator),
}

impl Token {
    /// Convert a Marker into a Token.
    ///
    /// Return value includes the resulting Token and a boolean which indicates
    /// if the Token is whitespace trimmed.
    pub(crate) fn from_usize_trim(id: usize) -> (Self, bool) {
        match Marker::from(id) {
            Marker::BeginExpression => (Self::BeginExpression, false),
            Marker::EndExpression => (Self::EndExpression, false),
            Marker::BeginExpressionTrim => (Self::BeginExpression, true),
            Marker::EndExpressionTrim => (Self::EndExpression, true),
            Marker::BeginBlock => (Self::BeginBlock, false),
            Marker::EndBlock => (Self::EndBlock, false),
            Marker::BeginBlockTrim => (Self::BeginBlock, true),
            Marker::EndBlockTrim => (Self::EndBlock, true),
            Marker::BeginComment => (Self::BeginComment, false),
            Marker::EndComment => (Self::EndComment, false),
            Marker::BeginCommentTrim => (Self::BeginComment, true),
            Marker::EndCommentTrim => (Self::EndComment, true),
        }
    }

    /// Return true if the Token closes a tag.
    pub(crate) fn is_closing(&self) -> bool {
        matches!(
            self,
            Token::EndExpression | Token::EndBlock | Token::EndComment
        )
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Text => write!(f, "text"),
            Token::Verbatim => write!(f, "verbatim"),
            Token::Comment => write!(f, "comment"),
            Token::String => write!(f, "string"),
            Token::Number => write!(f, "number"),
            Token::Identifier => write!(f, "identifier"),
            Token::BeginExpression => write!(f, "begin expression"),
            Token::EndExpression => write!(f, "end expression"),
            Token::BeginBlock => write!(f, "begin block"),
            Token::EndBlock => write!(f, "end block"),
            Token::BeginComment => write!(f, "begin comment"),
            Token::EndComment => write!(f, "end comment"),
            Token::Period => write!(f, "period (.)"),
            Token::Comma => write!(f, "comma (,)"),
            Token::Colon => write!(f, "colon (:)"),
            Token::Pipe => write!(f, "pipe (|)"),
            Token::Assign => write!(f, "assign (=)"),
            Token::LeftParen => write!(f, "left parenthesis (()"),
            Token::RightParen => write!(f, "right parenthesis ())"),
            Token::LeftBracket => write!(f, "left bracket ([)"),
            Token::RightBracket => write!(f, "right bracket (])"),
            Token::LeftBrace => write!(f, "left brace ({{)"),
            Token::RightBrace => write!(f, "right brace (}})"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::None => write!(f, "none"),
            Token::Keyword(keyword) => write!(f, "keyword {keyword}"),
            Token::Operator(operator) => write!(f, "operator {operator}"),
        }
    }
}
