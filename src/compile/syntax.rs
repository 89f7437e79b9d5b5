use morel::{Finder, Syntax as Markers};

/// Markers that identify expressions, blocks and comments within text.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Marker {
    /// Beginning of an Expression, which allows for outputting content
    /// and passing data through filters.
    BeginExpression = 0,
    /// End of an Expression.
    EndExpression = 1,
    /// Same as BeginExpression, but causes the trailing whitespace of the
    /// preceding raw text to be removed.
    BeginExpressionTrim = 2,
    /// Same as EndExpression, but causes the leading whitespace of the
    /// following raw text to be removed.
    EndExpressionTrim = 3,
    /// Beginning of a Block, which allows for logical constructs such
    /// as "if", "set" and "for".
    BeginBlock = 4,
    /// End of a Block.
    EndBlock = 5,
    /// Same as BeginBlock, but causes the trailing whitespace of the
    /// preceding raw text to be removed.
    BeginBlockTrim = 6,
    /// Same as EndBlock, but causes the leading whitespace of the
    /// following raw text to be removed.
    EndBlockTrim = 7,
    /// Beginning of a Comment, which is never rendered.
    BeginComment = 8,
    /// End of a Comment.
    EndComment = 9,
    /// Same as BeginComment, with trimming.
    BeginCommentTrim = 10,
    /// Same as EndComment, with trimming.
    EndCommentTrim = 11,
}

impl From<usize> for Marker {
    fn from(value: usize) -> Self {
        match value {
            0 => Self::BeginExpression,
            1 => Self::EndExpression,
            2 => Self::BeginExpressionTrim,
            3 => Self::EndExpressionTrim,
            4 => Self::BeginBlock,
            5 => Self::EndBlock,
            6 => Self::BeginBlockTrim,
            7 => Self::EndBlockTrim,
            8 => Self::BeginComment,
            9 => Self::EndComment,
            10 => Self::BeginCommentTrim,
            _ => Self::EndCommentTrim,
        }
    }
}

impl From<Marker> for usize {
    fn from(k: Marker) -> Self {
        k as usize
    }
}

/// Lexer configuration: the delimiters, the trim character and the optional
/// line-oriented prefixes.
///
/// Two templates with identical source but a different `Syntax` compile to
/// different [`Template`][`crate::Template`] instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Syntax {
    pub expression: (String, String),
    pub block: (String, String),
    pub comment: (String, String),
    pub whitespace: char,
    pub line_statement: Option<String>,
    pub line_comment: Option<String>,
}

impl Syntax {
    /// Compile a [`Finder`] that searches for every marker of this [`Syntax`].
    pub fn to_finder(&self) -> Finder {
        let mut markers: Vec<(usize, String)> = Vec::with_capacity(12);
        let whitespace = self.whitespace;
        let pairs = [
            (&self.expression, Marker::BeginExpression, Marker::EndExpression),
            (&self.block, Marker::BeginBlock, Marker::EndBlock),
            (&self.comment, Marker::BeginComment, Marker::EndComment),
        ];

        for ((left, right), begin, end) in pairs {
            let begin_trim = usize::from(begin) + 2;
            let end_trim = usize::from(end) + 2;
            markers.push((begin.into(), left.clone()));
            markers.push((end.into(), right.clone()));
            markers.push((begin_trim, format!("{left}{whitespace}")));
            markers.push((end_trim, format!("{whitespace}{right}")));
        }

        Finder::new(Markers::new(markers))
    }
}

impl Default for Syntax {
    fn default() -> Self {
        Builder::new().to_syntax()
    }
}

/// Provides methods to build a [`Syntax`].
///
/// # Example
///
/// ```
/// use kiln::Builder;
///
/// let syntax = Builder::new()
///     .with_expression("<%=", "%>")
///     .with_block("<%", "%>")
///     .with_line_statement("#")
///     .to_syntax();
/// ```
pub struct Builder<'marker> {
    expression: (&'marker str, &'marker str),
    block: (&'marker str, &'marker str),
    comment: (&'marker str, &'marker str),
    whitespace: char,
    line_statement: Option<&'marker str>,
    line_comment: Option<&'marker str>,
}

impl<'marker> Builder<'marker> {
    /// Create a new [`Builder`].
    ///
    /// The `Builder` has default markers:
    ///
    /// ```text
    /// Expressions: {{ name }}
    /// Blocks: {% if ... %}
    /// Comments: {# ... #}
    /// Whitespace:
    ///     Expression: {{- name -}}
    ///     Block:  {%- if ... -%}
    ///     Comment:  {#- ... -#}
    /// ```
    ///
    /// Line statements and line comments are disabled.
    #[inline]
    pub fn new() -> Self {
        Self {
            expression: ("{{", "}}"),
            block: ("{%", "%}"),
            comment: ("{#", "#}"),
            whitespace: '-',
            line_statement: None,
            line_comment: None,
        }
    }

    /// Set the expression markers.
    #[inline]
    pub fn set_expression(&mut self, begin: &'marker str, end: &'marker str) {
        self.expression = (begin, end);
    }

    /// Set the expression markers.
    ///
    /// Returns the [`Builder`], so additional methods may be chained.
    #[inline]
    pub fn with_expression(mut self, begin: &'marker str, end: &'marker str) -> Self {
        self.set_expression(begin, end);

        self
    }

    /// Set the block markers.
    #[inline]
    pub fn set_block(&mut self, begin: &'marker str, end: &'marker str) {
        self.block = (begin, end);
    }

    /// Set the block markers.
    ///
    /// Returns the [`Builder`], so additional methods may be chained.
    #[inline]
    pub fn with_block(mut self, begin: &'marker str, end: &'marker str) -> Self {
        self.set_block(begin, end);

        self
    }

    /// Set the comment markers.
    #[inline]
    pub fn set_comment(&mut self, begin: &'marker str, end: &'marker str) {
        self.comment = (begin, end);
    }

    /// Set the comment markers.
    ///
    /// Returns the [`Builder`], so additional methods may be chained.
    #[inline]
    pub fn with_comment(mut self, begin: &'marker str, end: &'marker str) -> Self {
        self.set_comment(begin, end);

        self
    }

    /// Set the whitespace trim character.
    #[inline]
    pub fn set_whitespace(&mut self, character: char) {
        self.whitespace = character;
    }

    /// Set the whitespace trim character.
    ///
    /// Returns the Builder, so additional methods may be chained.
    #[inline]
    pub fn with_whitespace(mut self, character: char) -> Self {
        self.set_whitespace(character);

        self
    }

    /// Set the line statement prefix.
    ///
    /// A line that begins with the prefix, ignoring indentation, is read as
    /// if its content was wrapped in block markers.
    #[inline]
    pub fn set_line_statement(&mut self, prefix: &'marker str) {
        self.line_statement = Some(prefix).filter(|p| !p.is_empty());
    }

    /// Set the line statement prefix.
    ///
    /// Returns the Builder, so additional methods may be chained.
    #[inline]
    pub fn with_line_statement(mut self, prefix: &'marker str) -> Self {
        self.set_line_statement(prefix);

        self
    }

    /// Set the line comment prefix.
    ///
    /// The prefix and everything after it on the same line is discarded.
    #[inline]
    pub fn set_line_comment(&mut self, prefix: &'marker str) {
        self.line_comment = Some(prefix).filter(|p| !p.is_empty());
    }

    /// Set the line comment prefix.
    ///
    /// Returns the Builder, so additional methods may be chained.
    #[inline]
    pub fn with_line_comment(mut self, prefix: &'marker str) -> Self {
        self.set_line_comment(prefix);

        self
    }

    /// Return a [`Syntax`] instance from the markers in this [`Builder`].
    pub fn to_syntax(self) -> Syntax {
        let owned = |(left, right): (&str, &str)| (left.to_string(), right.to_string());

        Syntax {
            expression: owned(self.expression),
            block: owned(self.block),
            comment: owned(self.comment),
            whitespace: self.whitespace,
            line_statement: self.line_statement.map(str::to_string),
            line_comment: self.line_comment.map(str::to_string),
        }
    }
}

impl Default for Builder<'_> {
    fn default() -> Self {
        Self::new()
    }
}
