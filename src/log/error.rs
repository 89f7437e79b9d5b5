use super::{Pointer, RED, RESET};
use crate::{log::Visual, region::Region};
use std::fmt::{Debug, Display, Formatter, Result};

/// Stage of the pipeline that produced an [`Error`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Kind {
    /// The source text could not be split into tokens.
    Lex,
    /// The tokens do not form a valid template.
    Parse,
    /// The template is well formed but cannot be compiled, such as when it
    /// refers to an unknown filter.
    Compile,
    /// The template failed while rendering.
    Render,
}

impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Kind::Lex => write!(f, "lex"),
            Kind::Parse => write!(f, "parse"),
            Kind::Compile => write!(f, "compile"),
            Kind::Render => write!(f, "render"),
        }
    }
}

/// Describes an error, and allows adding a contextual help text and visualization.
///
/// # Examples
///
/// Creating an [`Error`] that includes a [`Visual`] of type [`Pointer`]:
///
/// ```
/// use kiln::filter::{Error, Region};
///
/// Error::build("unexpected keyword")
///     .with_pointer("{% update name %}", Region::new(3..9))
///     .with_name("template.txt")
///     .with_help(r#"expected one of "if", "set", "for""#);
/// ```
///
/// When printed with `println!("{:#}", error)` the [`Error`] produces this output:
///
/// ```text
/// error: unexpected keyword
///   --> template.txt:1:4
///    |
///  1 | {% update name %}
///    |    ^^^^^^
///    |
///   = help: expected one of "if", "set", "for"
/// ```
pub struct Error {
    /// Describes the cause of the [`Error`].
    reason: String,
    /// The stage that produced the [`Error`].
    kind: Kind,
    /// A visualization to help illustrate the [`Error`].
    visual: Option<Box<dyn Visual>>,
    /// Additional information to display with the [`Error`].
    help: Option<String>,
    /// The name of the Template that the [`Error`] comes from.
    name: Option<String>,
}

impl Error {
    /// Create a new [`Error`] with the given reason text.
    ///
    /// The [`Kind`] defaults to [`Kind::Render`], which is what filters and hosts
    /// report. The additional fields may be populated using the various methods
    /// defined on `Error`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::filter::Error;
    ///
    /// Error::build("unexpected keyword")
    ///     .with_help("expected `if`, `set` or `for`, found `...`");
    /// ```
    pub fn build<T>(reason: T) -> Self
    where
        T: Into<String>,
    {
        Error {
            reason: reason.into(),
            kind: Kind::Render,
            name: None,
            visual: None,
            help: None,
        }
    }

    /// Create a new [`Error`] of kind [`Kind::Lex`].
    #[inline]
    pub fn lex<T: Into<String>>(reason: T) -> Self {
        Self::build(reason).with_kind(Kind::Lex)
    }

    /// Create a new [`Error`] of kind [`Kind::Parse`].
    #[inline]
    pub fn parse<T: Into<String>>(reason: T) -> Self {
        Self::build(reason).with_kind(Kind::Parse)
    }

    /// Create a new [`Error`] of kind [`Kind::Compile`].
    #[inline]
    pub fn compile<T: Into<String>>(reason: T) -> Self {
        Self::build(reason).with_kind(Kind::Compile)
    }

    /// Create a new [`Error`] of kind [`Kind::Render`].
    #[inline]
    pub fn render<T: Into<String>>(reason: T) -> Self {
        Self::build(reason)
    }

    /// Set the reason text, which is a short summary of the [`Error`].
    pub fn with_reason<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.reason = text.into();

        self
    }

    /// Set the [`Kind`].
    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = kind;

        self
    }

    /// Set the name text, which is the name of the [`Template`][`crate::Template`]
    /// that the [`Error`] is related to.
    ///
    /// A name that was already set is kept, so errors raised inside an included
    /// template keep pointing at that template.
    pub fn with_name<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        if self.name.is_none() {
            self.name = Some(text.into());
        }

        self
    }

    /// Set the [`Visual`], which is a visualization that helps illustrate the
    /// cause of the error.
    pub fn with_visual(mut self, visual: impl Visual + 'static) -> Self {
        self.visual = Some(Box::new(visual));

        self
    }

    /// Set the visualization to a new [`Pointer`] with the given source text and
    /// [`Region`].
    ///
    /// This is a shortcut method for creating a `Pointer` yourself and then
    /// setting it with the `with_visual` method.
    pub fn with_pointer<T>(mut self, source: &str, region: T) -> Self
    where
        T: Into<Region>,
    {
        self.visual = Some(Box::new(Pointer::new(source, region.into())));

        self
    }

    /// Set the visualization to a new [`Pointer`], unless the [`Error`] already
    /// has a visualization.
    ///
    /// Used for errors returned by filters and hosts, which may have set their
    /// own visualization.
    pub(crate) fn or_pointer<T>(self, source: &str, region: T) -> Self
    where
        T: Into<Region>,
    {
        if self.visual.is_some() {
            return self;
        }

        self.with_pointer(source, region)
    }

    /// Set the help text, which is contextual information to accompany the
    /// reason text.
    pub fn with_help<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.help = Some(text.into());

        self
    }

    /// Return the reason text.
    pub fn get_reason(&self) -> &str {
        &self.reason
    }

    /// Return the help text, if any.
    pub fn get_help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// Return the [`Kind`].
    pub fn get_kind(&self) -> Kind {
        self.kind
    }

    /// Return the name of the `Template` that the error is related to.
    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the one-based line and column the error points to, if the error
    /// carries a visualization.
    pub fn get_position(&self) -> Option<(usize, usize)> {
        self.visual.as_ref().map(|visual| {
            let (line, column) = visual.location();
            (line + 1, column + 1)
        })
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if !f.alternate() {
            writeln!(f, "{self:#}")?;
        }
        f.debug_struct("Error")
            .field("reason", &self.reason)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("visual", &self.visual)
            .field("help", &self.help)
            .finish()?;

        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let header = format!("{RED}{} error{RESET}", self.kind);
        write!(f, "{header}: {}", self.reason)?;

        if f.alternate() {
            if let Some(visual) = self.visual.as_ref() {
                return visual.display(f, self.name.as_deref(), self.help.as_deref());
            }
            if let Some(help) = self.help.as_deref() {
                write!(f, "\n = help: {help}")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for Error {}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.reason == other.reason
            && self.kind == other.kind
            && self.help == other.help
            && self.name == other.name
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, Kind};

    #[test]
    fn test_kind_constructors() {
        assert_eq!(Error::lex("a").get_kind(), Kind::Lex);
        assert_eq!(Error::parse("a").get_kind(), Kind::Parse);
        assert_eq!(Error::compile("a").get_kind(), Kind::Compile);
        assert_eq!(Error::render("a").get_kind(), Kind::Render);
        assert_eq!(Error::build("a").get_kind(), Kind::Render);
    }

    #[test]
    fn test_name_is_kept() {
        let error = Error::build("missing").with_name("inner.html").with_name("outer.html");

        assert_eq!(error.get_name(), Some("inner.html"));
    }

    #[test]
    fn test_position() {
        let error = Error::parse("unexpected token").with_pointer("a\nb {{ c", 4..6);

        assert_eq!(error.get_position(), Some((2, 3)));
    }

    #[test]
    fn test_display_plain() {
        let error = Error::compile("unknown filter").with_help("did you register it?");

        assert!(error.to_string().ends_with("unknown filter"));
        assert!(format!("{error:#}").contains("did you register it?"));
    }
}
