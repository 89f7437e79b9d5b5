use crate::compile::lex::token::Token;

/// Describes one entry of the mode stack of a [`Lexer`][`super::Lexer`].
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum CursorState {
    /// Indicates the [`Lexer`][`super::Lexer`] is reading text, outside of
    /// any tag.
    Default,
    /// Indicates the [`Lexer`][`super::Lexer`] is inside of a block or
    /// expression.
    Inside {
        /// The expected ending [`Token`].
        end_token: Token,
    },
    /// Indicates the [`Lexer`][`super::Lexer`] is inside of a comment.
    Comment,
    /// Indicates the [`Lexer`][`super::Lexer`] is inside of a line statement,
    /// which ends at the next newline.
    Line,
    /// Indicates the [`Lexer`][`super::Lexer`] is inside of a parenthesis,
    /// bracket or brace within a tag.
    Group {
        /// The character that closes the group.
        close: char,
    },
}
