pub mod token;

mod state;

use crate::{
    compile::{syntax::Syntax, Keyword, Operator, TokenResult},
    log::{expected_operator, Error, INVALID_SYNTAX, UNEXPECTED_EOF, UNEXPECTED_TOKEN},
    region::Region,
};

use self::{state::CursorState, token::Token};

use morel::Finder;
use std::collections::VecDeque;

/// Words that end the code of an exec block.
const EXEC_TERMINATORS: [&str; 4] = ["else", "catch", "endexec", "end"];

/// Words that end a raw block.
const RAW_TERMINATORS: [&str; 1] = ["endraw"];

/// Read the entire source text as [`Token`] instances.
///
/// # Errors
///
/// Returns an [`Error`] when the source contains an unterminated string,
/// comment or raw block, an unbalanced bracket, or an illegal character.
///
/// # Examples
///
/// ```
/// use kiln::{tokenize, Syntax};
///
/// let source = "hello {{ name }}";
/// let tokens = tokenize(source, &Syntax::default()).unwrap();
///
/// assert_eq!(tokens.len(), 4);
/// assert_eq!(tokens[2].1.literal(source), "name");
/// ```
pub fn tokenize(source: &str, syntax: &Syntax) -> Result<Vec<(Token, Region)>, Error> {
    let finder = syntax.to_finder();
    let mut lexer = Lexer::new(source, &finder, syntax);
    let mut tokens = vec![];

    while let Some(next) = lexer.next()? {
        tokens.push(next);
    }

    Ok(tokens)
}

/// Provides methods to read a source string as [`Token`] instances.
pub struct Lexer<'source> {
    /// Reference to the source text.
    pub source: &'source str,
    /// Position within source.
    pub cursor: usize,
    /// Compiled [`Finder`] instance used to search for markers
    /// in the source text.
    finder: &'source Finder,
    /// Configuration that provides the line prefixes.
    syntax: &'source Syntax,
    /// Stack of lexical modes. The top determines the action taken
    /// when `.next` is called.
    stack: Vec<CursorState>,
    /// When true, the following text will be left trimmed.
    left_trim: bool,
    /// Region of the most recent opening marker.
    opened: Region,
    /// Tokens that were read ahead and will be returned by the following
    /// calls to `.next`.
    buffer: VecDeque<(Token, Region)>,
}

/// Describes a line-oriented construct found in text.
enum LineSyntax {
    /// A line statement. `line` is the beginning of the line and `prefix` is the
    /// position of the prefix.
    Statement { line: usize, prefix: usize },
    /// A line comment. `begin` includes the horizontal whitespace before the
    /// prefix.
    Comment { begin: usize },
}

/// Describes the tag that terminates a verbatim region.
struct Terminator {
    /// Region of the opening marker.
    open: Region,
    /// True if the opening marker trims.
    open_trim: bool,
    /// Region of the word.
    word: Region,
    /// Region of the closing marker.
    close: Region,
    /// True if the closing marker trims.
    close_trim: bool,
}

impl<'source> Lexer<'source> {
    /// Create a new [`Lexer`] from the given source, [`Finder`] and [`Syntax`].
    ///
    /// The `Finder` must have been created from the same `Syntax`.
    #[inline]
    pub fn new(source: &'source str, finder: &'source Finder, syntax: &'source Syntax) -> Self {
        Self {
            source,
            cursor: 0,
            finder,
            syntax,
            stack: vec![CursorState::Default],
            left_trim: false,
            opened: Region::default(),
            buffer: VecDeque::new(),
        }
    }

    /// Return the next [`Token`] and [`Region`].
    ///
    /// Whitespace within tags is skipped.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when an unexpected [`Token`] is found.
    pub fn next(&mut self) -> TokenResult {
        loop {
            // Always prefer taking from the buffer when possible.
            if let Some(next) = self.buffer.pop_front() {
                return Ok(Some(next));
            }
            if self.cursor >= self.source.len() {
                return self.finish();
            }

            let from = self.cursor;
            match self.state() {
                CursorState::Default => self.lex_default(from)?,
                CursorState::Comment => self.lex_comment(from)?,
                CursorState::Inside { .. } | CursorState::Line | CursorState::Group { .. } => {
                    self.lex_tag(from)?
                }
            }
        }
    }

    /// Return the current lexical mode.
    fn state(&self) -> CursorState {
        self.stack.last().copied().unwrap_or(CursorState::Default)
    }

    /// Handle the end of the source text.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if a tag, comment or bracket is still open.
    fn finish(&mut self) -> TokenResult {
        let end = self.source.len();

        match self.state() {
            CursorState::Default => Ok(None),
            CursorState::Line => {
                self.stack.pop();
                Ok(Some((Token::EndBlock, (end..end).into())))
            }
            CursorState::Inside { end_token } => Err(Error::lex(UNEXPECTED_EOF)
                .with_pointer(self.source, self.opened)
                .with_help(format!("this tag is never closed, expected `{end_token}`"))),
            CursorState::Comment => Err(Error::lex(UNEXPECTED_EOF)
                .with_pointer(self.source, self.opened)
                .with_help("this comment is never closed")),
            CursorState::Group { close } => Err(Error::lex(UNEXPECTED_EOF)
                .with_pointer(self.source, end..end)
                .with_help(format!("expected `{close}` before the end of the source"))),
        }
    }

    /// Read text until the next opening marker, line statement or line comment.
    ///
    /// Assumes the cursor is outside of a tag.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when a raw block or exec block is never terminated.
    fn lex_default(&mut self, from: usize) -> Result<(), Error> {
        let marker = self.find_opening(from);
        let limit = marker
            .map(|(_, _, region)| region.begin)
            .unwrap_or(self.source.len());

        if let Some(line) = self.find_line_syntax(from, limit) {
            self.lex_line_syntax(from, line);
            return Ok(());
        }

        let Some((token, is_trimmed, region)) = marker else {
            let end = self.source.len();
            self.push_text(from, end, false);
            self.cursor = end;
            return Ok(());
        };

        self.push_text(from, region.begin, is_trimmed);
        self.cursor = region.end;
        self.opened = region;
        self.buffer.push_back((token, region));

        match token {
            Token::BeginExpression => self.stack.push(CursorState::Inside {
                end_token: Token::EndExpression,
            }),
            Token::BeginComment => self.stack.push(CursorState::Comment),
            _ => {
                self.stack.push(CursorState::Inside {
                    end_token: Token::EndBlock,
                });
                self.lex_verbatim(region)?;
            }
        }

        Ok(())
    }

    /// Return the next opening marker at or after the given position.
    ///
    /// Closing markers found in text are text, and are skipped.
    fn find_opening(&self, from: usize) -> Option<(Token, bool, Region)> {
        let mut at = from;

        while let Some((id, begin, end)) = self.finder.next(self.source, at) {
            let (token, is_trimmed) = Token::from_usize_trim(id);
            if !token.is_closing() {
                return Some((token, is_trimmed, (begin..end).into()));
            }
            at = end.max(at + 1);
        }

        None
    }

    /// Find the first line statement or line comment that begins between `from`
    /// and `limit`.
    fn find_line_syntax(&self, from: usize, limit: usize) -> Option<LineSyntax> {
        let statement = self.syntax.line_statement.as_deref().and_then(|prefix| {
            let window = &self.source[from..limit];
            let at_line_start = from == 0 || self.source[..from].ends_with('\n');
            let first = at_line_start.then_some(from);
            let rest = window
                .match_indices('\n')
                .map(|(index, _)| from + index + 1);

            first.into_iter().chain(rest).find_map(|line| {
                let indent = indentation(&self.source[line..]);
                let position = line + indent;
                (position < limit && self.source[position..].starts_with(prefix))
                    .then_some((line, position, prefix.len()))
            })
        });
        let comment = self.syntax.line_comment.as_deref().and_then(|prefix| {
            self.source[from..limit].find(prefix).map(|index| {
                let position = from + index;
                let before = &self.source[from..position];
                let begin = from + before.trim_end_matches([' ', '\t']).len();
                (begin, position, prefix.len())
            })
        });

        match (statement, comment) {
            (Some((line, prefix, length)), Some((begin, position, comment_length))) => {
                if position < prefix || (position == prefix && comment_length > length) {
                    Some(LineSyntax::Comment { begin })
                } else {
                    Some(LineSyntax::Statement { line, prefix })
                }
            }
            (Some((line, prefix, _)), None) => Some(LineSyntax::Statement { line, prefix }),
            (None, Some((begin, _, _))) => Some(LineSyntax::Comment { begin }),
            (None, None) => None,
        }
    }

    /// Emit the text before a line statement or line comment, and enter the
    /// line statement or skip the comment.
    fn lex_line_syntax(&mut self, from: usize, line: LineSyntax) {
        match line {
            LineSyntax::Statement { line, prefix } => {
                let length = self.syntax.line_statement.as_deref().map_or(0, str::len);
                let region: Region = (prefix..prefix + length).into();

                self.push_text(from, line, false);
                self.buffer.push_back((Token::BeginBlock, region));
                self.stack.push(CursorState::Line);
                self.opened = region;
                self.cursor = region.end;
            }
            LineSyntax::Comment { begin } => {
                self.push_text(from, begin, false);
                self.cursor = self.end_of_line(begin);
            }
        }
    }

    /// Return the position of the next newline, or the end of the source.
    fn end_of_line(&self, from: usize) -> usize {
        self.source[from..]
            .find('\n')
            .map_or(self.source.len(), |index| from + index)
    }

    /// Read a comment until the closing marker.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the comment is never closed.
    fn lex_comment(&mut self, from: usize) -> Result<(), Error> {
        let mut at = from;

        while let Some((id, begin, end)) = self.finder.next(self.source, at) {
            let (token, is_trimmed) = Token::from_usize_trim(id);
            if token == Token::EndComment {
                if begin > from {
                    self.buffer.push_back((Token::Comment, (from..begin).into()));
                }
                self.buffer.push_back((token, (begin..end).into()));
                self.stack.pop();
                self.left_trim = is_trimmed;
                self.cursor = end;

                return Ok(());
            }
            at = end.max(at + 1);
        }

        Err(Error::lex(INVALID_SYNTAX)
            .with_pointer(self.source, self.opened)
            .with_help("this comment is never closed"))
    }

    /// Capture the content of a raw block or the code of an exec block
    /// verbatim, if the block opening at `open` is one of those.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the terminating tag is never found.
    fn lex_verbatim(&mut self, open: Region) -> Result<(), Error> {
        let word_begin = open.end + leading_whitespace(&self.source[open.end..]);
        let word_end = word_begin
            + self.source[word_begin..]
                .chars()
                .take_while(|c| is_ident_continue(*c))
                .map(char::len_utf8)
                .sum::<usize>();
        let (keyword, terminators): (Keyword, &[&str]) =
            match &self.source[word_begin..word_end] {
                "raw" => (Keyword::Raw, &RAW_TERMINATORS),
                "exec" => (Keyword::Exec, &EXEC_TERMINATORS),
                _ => return Ok(()),
            };
        let close_begin = word_end + leading_whitespace(&self.source[word_end..]);
        let Some((close_trim, close_end)) = self.closing_at(close_begin) else {
            // Let the regular tag lexer report whatever follows.
            return Ok(());
        };

        self.stack.pop();
        self.buffer
            .push_back((Token::Keyword(keyword), (word_begin..word_end).into()));
        self.buffer
            .push_back((Token::EndBlock, (close_begin..close_end).into()));

        let terminator = self
            .find_terminator(close_end, terminators)
            .ok_or_else(|| {
                Error::lex(INVALID_SYNTAX)
                    .with_pointer(self.source, open.combine((word_begin..word_end).into()))
                    .with_help(format!(
                        "this `{keyword}` block is never closed, expected `{}`",
                        terminators.join("` or `")
                    ))
            })?;

        let mut begin = close_end;
        let mut end = terminator.open.begin;
        if close_trim {
            begin += trailing_newline(&self.source[begin..end]);
        }
        if terminator.open_trim {
            end = begin + self.source[begin..end].trim_end().len();
        }
        self.buffer.push_back((Token::Verbatim, (begin..end).into()));

        match keyword {
            Keyword::Raw => {
                self.buffer.push_back((Token::BeginBlock, terminator.open));
                self.buffer
                    .push_back((Token::Keyword(Keyword::EndRaw), terminator.word));
                self.buffer.push_back((Token::EndBlock, terminator.close));
                self.left_trim = terminator.close_trim;
                self.cursor = terminator.close.end;
            }
            _ => {
                // The terminating tag of an exec block is read normally.
                self.left_trim = false;
                self.cursor = terminator.open.begin;
            }
        }

        Ok(())
    }

    /// Return the trim flag and end position of a closing block marker that
    /// begins exactly at the given position.
    fn closing_at(&self, at: usize) -> Option<(bool, usize)> {
        let (id, end) = self.finder.starts(self.source, at)?;
        let (token, is_trimmed) = Token::from_usize_trim(id);

        (token == Token::EndBlock).then_some((is_trimmed, end))
    }

    /// Find the first block tag after `from` that consists of only one of the
    /// given words.
    fn find_terminator(&self, from: usize, words: &[&str]) -> Option<Terminator> {
        let mut at = from;

        while let Some((id, begin, end)) = self.finder.next(self.source, at) {
            at = end.max(at + 1);
            let (token, open_trim) = Token::from_usize_trim(id);
            if token != Token::BeginBlock {
                continue;
            }

            let word_begin = end + leading_whitespace(&self.source[end..]);
            let word_end = word_begin
                + self.source[word_begin..]
                    .chars()
                    .take_while(|c| is_ident_continue(*c))
                    .map(char::len_utf8)
                    .sum::<usize>();
            if !words.contains(&&self.source[word_begin..word_end]) {
                continue;
            }

            let close_begin = word_end + leading_whitespace(&self.source[word_end..]);
            if let Some((close_trim, close_end)) = self.closing_at(close_begin) {
                return Some(Terminator {
                    open: (begin..end).into(),
                    open_trim,
                    word: (word_begin..word_end).into(),
                    close: (close_begin..close_end).into(),
                    close_trim,
                });
            }
        }

        None
    }

    /// Buffer a [`Token::Text`] spanning the given positions, after applying any
    /// pending left trim and the optional right trim.
    ///
    /// Nothing is buffered when the text is empty after trimming.
    fn push_text(&mut self, mut begin: usize, mut end: usize, right_trim: bool) {
        if self.left_trim {
            self.left_trim = false;
            begin += trailing_newline(&self.source[begin..end]);
        }
        if right_trim {
            end = begin + self.source[begin..end].trim_end().len();
        }
        if begin < end {
            self.buffer.push_back((Token::Text, (begin..end).into()));
        }
    }

    /// Read the next [`Token`] inside of a tag.
    ///
    /// Assumes the cursor is inside of an expression, block or line statement.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when an unexpected [`Token`] is found.
    fn lex_tag(&mut self, from: usize) -> Result<(), Error> {
        let state = self.state();

        if !matches!(state, CursorState::Group { .. }) {
            if let Some((id, length)) = self.finder.starts(self.source, from) {
                let (token, is_trimmed) = Token::from_usize_trim(id);

                match state {
                    CursorState::Inside { end_token } if token == end_token => {
                        self.stack.pop();
                        self.left_trim = is_trimmed;
                        self.cursor = length;
                        self.buffer.push_back((token, (from..length).into()));

                        return Ok(());
                    }
                    CursorState::Inside { end_token } if token.is_closing() => {
                        let which = if end_token == Token::EndExpression {
                            "expression"
                        } else {
                            "block"
                        };

                        return Err(Error::lex(UNEXPECTED_TOKEN)
                            .with_pointer(self.source, from..length)
                            .with_help(format!("did you close the previous {which}?")));
                    }
                    CursorState::Line if token.is_closing() => {
                        return Err(Error::lex(UNEXPECTED_TOKEN)
                            .with_pointer(self.source, from..length)
                            .with_help("line statements end at the end of the line"));
                    }
                    _ => {}
                }
            }
        }

        if state == CursorState::Line {
            if let Some(prefix) = self.syntax.line_comment.as_deref() {
                if self.source[from..].starts_with(prefix) {
                    self.cursor = self.end_of_line(from);
                    return Ok(());
                }
            }
        }

        let mut advance = |length: usize, data: Token| {
            self.cursor += length;
            self.buffer.push_back((data, (from..from + length).into()));

            Ok(())
        };

        let mut iterator = self.source[from..]
            .char_indices()
            .map(|(d, c)| (from + d, c));
        let Some((index, char)) = iterator.next() else {
            return Ok(());
        };
        let following = iterator.next().map(|(_, c)| c);

        match char {
            '\n' if state == CursorState::Line => {
                self.stack.pop();
                advance(1, Token::EndBlock)
            }
            '*' if following == Some('*') => advance(2, Token::Operator(Operator::Power)),
            '*' => advance(1, Token::Operator(Operator::Multiply)),
            '/' if following == Some('/') => advance(2, Token::Operator(Operator::FloorDivide)),
            '/' => advance(1, Token::Operator(Operator::Divide)),
            '+' => advance(1, Token::Operator(Operator::Add)),
            '-' => advance(1, Token::Operator(Operator::Subtract)),
            '%' => advance(1, Token::Operator(Operator::Modulo)),
            '~' => advance(1, Token::Operator(Operator::Concat)),
            '.' => advance(1, Token::Period),
            ',' => advance(1, Token::Comma),
            ':' => advance(1, Token::Colon),
            '(' => self.open_group(index, ')', Token::LeftParen),
            '[' => self.open_group(index, ']', Token::LeftBracket),
            '{' => self.open_group(index, '}', Token::LeftBrace),
            ')' => self.close_group(index, char, Token::RightParen),
            ']' => self.close_group(index, char, Token::RightBracket),
            '}' => self.close_group(index, char, Token::RightBrace),
            '"' | '\'' => self.lex_string(index, char),
            '=' | '!' | '>' | '<' | '|' => self.lex_operator(index, char, following),
            c if c.is_whitespace() => {
                self.lex_whitespace(index, state == CursorState::Line);
                Ok(())
            }
            c if c.is_ascii_digit() => {
                self.lex_digit(index);
                Ok(())
            }
            c if is_ident_start(c) => {
                self.lex_ident_or_keyword(index);
                Ok(())
            }
            _ => Err(Error::lex(UNEXPECTED_TOKEN)
                .with_pointer(self.source, index..index + char.len_utf8())
                .with_help(
                    "expected an operator, an identifier, an ascii digit, a bracket \
                    or the beginning of a string literal marked with `\"` or `'`",
                )),
        }
    }

    /// Enter a bracket group.
    fn open_group(&mut self, from: usize, close: char, token: Token) -> Result<(), Error> {
        self.stack.push(CursorState::Group { close });
        self.buffer.push_back((token, (from..from + 1).into()));
        self.cursor = from + 1;

        Ok(())
    }

    /// Leave a bracket group.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the character does not close the innermost group.
    fn close_group(&mut self, from: usize, char: char, token: Token) -> Result<(), Error> {
        if self.state() != (CursorState::Group { close: char }) {
            return Err(Error::lex(UNEXPECTED_TOKEN)
                .with_pointer(self.source, from..from + 1)
                .with_help(format!("`{char}` does not close any open bracket")));
        }
        self.stack.pop();
        self.buffer.push_back((token, (from..from + 1).into()));
        self.cursor = from + 1;

        Ok(())
    }

    /// Buffer a [`Token`] based on the previous character.
    ///
    /// Checks the following character to ensure the correct `Token` is
    /// returned. All of these are recognized:
    ///
    /// `==`, `!=`, `>=`, `<=`, `=`, `|`, `>`, `<`
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when an unexpected [`Token`] is found.
    fn lex_operator(
        &mut self,
        from: usize,
        previous: char,
        following: Option<char>,
    ) -> Result<(), Error> {
        let (length, token) = match (previous, following) {
            // Double:
            ('=', Some('=')) => (2, Token::Operator(Operator::Equal)),
            ('!', Some('=')) => (2, Token::Operator(Operator::NotEqual)),
            ('>', Some('=')) => (2, Token::Operator(Operator::GreaterOrEqual)),
            ('<', Some('=')) => (2, Token::Operator(Operator::LesserOrEqual)),
            // Single:
            ('=', _) => (1, Token::Assign),
            ('|', _) => (1, Token::Pipe),
            ('>', _) => (1, Token::Operator(Operator::Greater)),
            ('<', _) => (1, Token::Operator(Operator::Lesser)),
            _ => {
                return Err(Error::lex(UNEXPECTED_TOKEN)
                    .with_pointer(self.source, from..from + 1)
                    .with_help(expected_operator(previous)));
            }
        };
        self.cursor = from + length;
        self.buffer.push_back((token, (from..from + length).into()));

        Ok(())
    }

    /// Buffer a [`Token::Number`].
    ///
    /// A number is a run of digits with at most one period, which must be
    /// followed by a digit.
    fn lex_digit(&mut self, from: usize) {
        let bytes = self.source.as_bytes();
        let mut end = from;
        let mut seen_period = false;

        while end < bytes.len() {
            match bytes[end] {
                b'0'..=b'9' => end += 1,
                b'.' if !seen_period
                    && bytes.get(end + 1).is_some_and(|b| b.is_ascii_digit()) =>
                {
                    seen_period = true;
                    end += 1;
                }
                _ => break,
            }
        }

        self.cursor = end;
        self.buffer.push_back((Token::Number, (from..end).into()));
    }

    /// Skip whitespace within a tag.
    ///
    /// Within a line statement the newline is left in place, because it ends the
    /// statement.
    fn lex_whitespace(&mut self, from: usize, line: bool) {
        let length = self.source[from..]
            .chars()
            .take_while(|c| c.is_whitespace() && !(line && *c == '\n'))
            .map(char::len_utf8)
            .sum::<usize>();

        self.cursor = from + length.max(1);
    }

    /// Buffer a [`Token::String`].
    ///
    /// The string ends at the first unescaped quote matching the opening quote.
    /// Escape sequences are consumed but not interpreted.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the string is never closed.
    fn lex_string(&mut self, from: usize, quote: char) -> Result<(), Error> {
        let mut escaped = false;
        let body = from + quote.len_utf8();

        for (index, char) in self.source[body..].char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match char {
                '\\' => escaped = true,
                c if c == quote => {
                    // Add one to the index of the character to comply with string slice
                    // semantics.
                    let to = body + index + 1;
                    self.cursor = to;
                    self.buffer.push_back((Token::String, (from..to).into()));

                    return Ok(());
                }
                _ => {}
            }
        }

        Err(Error::lex(INVALID_SYNTAX)
            .with_pointer(self.source, from..from + 1)
            .with_help(format!(
                "this might be an unterminated string, try closing it with `{quote}`"
            )))
    }

    /// Buffer a [`Token::Identifier`], [`Token::Keyword`] or literal keyword.
    fn lex_ident_or_keyword(&mut self, from: usize) {
        let length = self.source[from..]
            .chars()
            .take_while(|c| is_ident_continue(*c))
            .map(char::len_utf8)
            .sum::<usize>();
        let to = from + length;

        let token = match &self.source[from..to] {
            "true" | "True" => Token::True,
            "false" | "False" => Token::False,
            "none" | "None" => Token::None,
            text => Keyword::from_text(text)
                .map(Token::Keyword)
                .unwrap_or(Token::Identifier),
        };
        self.cursor = to;
        self.buffer.push_back((token, (from..to).into()));
    }
}

/// Return true if the given character is a recognized beginning identifier,
/// meaning '_' or an `xid_start`.
fn is_ident_start(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_start(c)
}

/// Return true if the given character is a recognized continue identifier,
/// meaning an `xid_continue`.
fn is_ident_continue(c: char) -> bool {
    unicode_ident::is_xid_continue(c)
}

/// Return the length of the leading whitespace of the text.
fn leading_whitespace(text: &str) -> usize {
    text.len() - text.trim_start().len()
}

/// Return the length of the leading spaces and tabs of the text.
fn indentation(text: &str) -> usize {
    text.len() - text.trim_start_matches([' ', '\t']).len()
}

/// Return the length of the leading horizontal whitespace of the text, plus at
/// most one line break.
fn trailing_newline(text: &str) -> usize {
    let horizontal = indentation(text);
    let rest = &text[horizontal..];

    if rest.starts_with("\r\n") {
        horizontal + 2
    } else if rest.starts_with('\n') {
        horizontal + 1
    } else {
        horizontal
    }
}

#[cfg(test)]
mod tests {
    use super::{tokenize, Token};
    use crate::{
        compile::{syntax::Builder, Keyword, Operator, Syntax},
        log::Kind,
        region::Region,
    };

    #[test]
    fn test_lex_default_no_match() {
        let expect = vec![(Token::Text, 0..11)];

        helper_lex_auto("lorem ipsum", expect)
    }

    #[test]
    fn test_lex_default_match_no_trim() {
        let expect = vec![
            (Token::Text, 0..12),
            (Token::BeginExpression, 12..14),
            (Token::Identifier, 15..20),
            (Token::EndExpression, 21..23),
        ];

        helper_lex_auto("lorem ipsum {{ dolor }}", expect);
    }

    #[test]
    fn test_lex_default_match_trim() {
        let expect = vec![
            (Token::Text, 0..11),
            (Token::BeginExpression, 12..15),
            (Token::Identifier, 16..21),
            (Token::EndExpression, 22..25),
        ];

        helper_lex_auto("lorem ipsum {{- dolor -}}", expect.clone());
        helper_lex_auto("lorem ipsum {{- dolor -}} \n", expect);
    }

    #[test]
    fn test_lex_right_trim_takes_one_newline() {
        let source = "{{ a -}}  \n\n  b";
        let tokens = tokenize(source, &Syntax::default()).unwrap();
        let (token, region) = tokens.last().copied().unwrap();

        assert_eq!(token, Token::Text);
        assert_eq!(region.literal(source), "\n  b");
    }

    #[test]
    fn test_lex_left_trim_removes_empty_text() {
        let tokens = tokenize("  \n {%- if x %}", &Syntax::default()).unwrap();

        assert_eq!(tokens[0].0, Token::BeginBlock);
    }

    #[test]
    fn test_lex_digit() {
        let expect = vec![
            (Token::BeginExpression, 0..2),
            (Token::Number, 3..7),
            (Token::EndExpression, 8..10),
        ];

        helper_lex_auto("{{ 10.5 }}", expect);
    }

    #[test]
    fn test_lex_digit_single_period() {
        let expect = vec![
            (Token::BeginExpression, 0..2),
            (Token::Number, 3..6),
            (Token::Period, 6..7),
            (Token::Identifier, 7..8),
            (Token::EndExpression, 9..11),
        ];

        helper_lex_auto("{{ 1.2.x }}", expect);
    }

    #[test]
    fn test_lex_keyword() {
        let expect = vec![
            (Token::BeginBlock, 0..2),
            (Token::Keyword(Keyword::If), 3..5),
            (Token::True, 6..10),
            (Token::EndBlock, 11..13),
        ];

        helper_lex_auto("{% if true %}", expect);
    }

    #[test]
    fn test_lex_operators() {
        let expect = vec![
            (Token::BeginExpression, 0..2),
            (Token::Identifier, 3..4),
            (Token::Operator(Operator::FloorDivide), 5..7),
            (Token::Number, 8..9),
            (Token::Operator(Operator::LesserOrEqual), 10..12),
            (Token::Identifier, 13..14),
            (Token::Operator(Operator::Concat), 15..16),
            (Token::String, 17..20),
            (Token::EndExpression, 21..23),
        ];

        helper_lex_auto("{{ a // 2 <= b ~ 'c' }}", expect);
    }

    #[test]
    fn test_lex_string_escape() {
        let expect = vec![
            (Token::BeginExpression, 0..2),
            (Token::String, 3..13),
            (Token::EndExpression, 14..16),
        ];

        helper_lex_auto(r#"{{ "\"name\"" }}"#, expect);
    }

    #[test]
    fn test_lex_unterminated_string() {
        let result = tokenize("{{ 'name }}", &Syntax::default());

        assert_eq!(result.unwrap_err().get_kind(), Kind::Lex);
    }

    #[test]
    fn test_lex_dict_inside_expression() {
        let expect = vec![
            (Token::BeginExpression, 0..2),
            (Token::LeftBrace, 3..4),
            (Token::String, 4..7),
            (Token::Colon, 7..8),
            (Token::LeftBrace, 9..10),
            (Token::String, 10..13),
            (Token::Colon, 13..14),
            (Token::Number, 15..16),
            (Token::RightBrace, 16..17),
            (Token::RightBrace, 17..18),
            (Token::EndExpression, 19..21),
        ];

        helper_lex_auto("{{ {'a': {'b': 1}} }}", expect);
    }

    #[test]
    fn test_lex_comment() {
        let expect = vec![
            (Token::Text, 0..2),
            (Token::BeginComment, 2..4),
            (Token::Comment, 4..11),
            (Token::EndComment, 11..13),
            (Token::Text, 13..15),
        ];

        helper_lex_auto("a {# note #} b", expect);
    }

    #[test]
    fn test_lex_unterminated_comment() {
        assert!(tokenize("a {# note", &Syntax::default()).is_err());
    }

    #[test]
    fn test_lex_raw() {
        let source = "{% raw %}{{ x }}{% endraw %}";
        let expect = vec![
            (Token::BeginBlock, 0..2),
            (Token::Keyword(Keyword::Raw), 3..6),
            (Token::EndBlock, 7..9),
            (Token::Verbatim, 9..16),
            (Token::BeginBlock, 16..18),
            (Token::Keyword(Keyword::EndRaw), 19..25),
            (Token::EndBlock, 26..28),
        ];

        helper_lex_auto(source, expect);
    }

    #[test]
    fn test_lex_raw_unterminated() {
        let result = tokenize("{% raw %}{{ x }}", &Syntax::default());

        assert!(result.is_err());
    }

    #[test]
    fn test_lex_exec_captures_code() {
        let source = "{% exec %}a {{ b }}{% else %}c{% endexec %}";
        let tokens = tokenize(source, &Syntax::default()).unwrap();

        assert_eq!(tokens[1].0, Token::Keyword(Keyword::Exec));
        assert_eq!(tokens[3].0, Token::Verbatim);
        assert_eq!(tokens[3].1.literal(source), "a {{ b }}");
        assert_eq!(tokens[5].0, Token::Keyword(Keyword::Else));
    }

    #[test]
    fn test_lex_stray_closer_is_text() {
        let expect = vec![(Token::Text, 0..9)];

        helper_lex_auto("a }} b %}", expect);
    }

    #[test]
    fn test_error_multiple_opening_tags() {
        let result = tokenize("hello {{ name }} {% if %}}", &Syntax::default());
        assert!(result.is_ok());

        let result = tokenize("hello {% name }} ", &Syntax::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_lex_unclosed_tag() {
        let result = tokenize("hello {{ name", &Syntax::default());

        assert_eq!(result.unwrap_err().get_kind(), Kind::Lex);
    }

    #[test]
    fn test_lex_line_statement() {
        let syntax = Builder::new().with_line_statement("#").to_syntax();
        let source = "a\n  # if x\nb\n";
        let tokens = tokenize(source, &syntax).unwrap();
        let kinds: Vec<Token> = tokens.iter().map(|(token, _)| *token).collect();

        assert_eq!(
            kinds,
            vec![
                Token::Text,
                Token::BeginBlock,
                Token::Keyword(Keyword::If),
                Token::Identifier,
                Token::EndBlock,
                Token::Text,
            ]
        );
        assert_eq!(tokens[0].1.literal(source), "a\n");
        assert_eq!(tokens[5].1.literal(source), "b\n");
    }

    #[test]
    fn test_lex_line_comment() {
        let syntax = Builder::new().with_line_comment("##").to_syntax();
        let source = "a ## hidden\nb";
        let tokens = tokenize(source, &syntax).unwrap();
        let text: Vec<&str> = tokens.iter().map(|(_, r)| r.literal(source)).collect();

        assert_eq!(text, vec!["a", "\nb"]);
    }

    /// Helper function which takes in a source string, tokenizes it with the
    /// default syntax and compares the result against the expectation.
    fn helper_lex_auto<T>(source: &str, expect: Vec<(Token, T)>)
    where
        T: Into<Region>,
    {
        let tokens = tokenize(source, &Syntax::default()).unwrap();
        let expect: Vec<(Token, Region)> = expect
            .into_iter()
            .map(|(token, region)| (token, region.into()))
            .collect();

        assert_eq!(tokens, expect);
    }
}
