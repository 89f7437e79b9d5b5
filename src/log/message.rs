use super::Error;
use std::fmt::Display;

pub const UNEXPECTED_TOKEN: &str = "unexpected token";
pub const UNEXPECTED_BLOCK: &str = "unexpected block";
pub const UNEXPECTED_EOF: &str = "unexpected eof";
pub const INVALID_SYNTAX: &str = "invalid syntax";
pub const INVALID_FILTER: &str = "invalid filter";
pub const INVALID_TEST: &str = "invalid test";
pub const INCOMPATIBLE_TYPES: &str = "incompatible types";
pub const UNDEFINED_VARIABLE: &str = "undefined variable";
pub const RECURSION_LIMIT: &str = "recursion limit exceeded";
pub const MISSING_TEMPLATE: &str = "missing template";
pub const OUTSIDE_ROOT: &str = "template outside root";

/// Return an [`Error`] explaining that the end of source was not expected.
pub fn error_eof(source: &str) -> Error {
    let source_len = source.len();
    Error::parse(UNEXPECTED_EOF)
        .with_pointer(source, source_len..source_len)
        .with_help("expected additional tokens, did you close all blocks and expressions?")
}

/// Return an [`Error`] explaining that the write operation failed.
///
/// This is likely caused by a failure during a `write!` macro operation.
pub fn error_write() -> Error {
    Error::render("write failure")
        .with_help("failed to write result of render, are you low on memory?")
}

/// Return an [`Error`] describing a template that could not be found beneath
/// the template root.
pub fn error_missing_template<T>(name: T) -> Error
where
    T: Display,
{
    Error::render(MISSING_TEMPLATE).with_help(format!(
        "template `{name}` was not found, check the path relative to the template root"
    ))
}

/// Return a string describing an unexpected operator.
pub fn expected_operator<T>(received: T) -> String
where
    T: Display,
{
    format!(
        "expected operator like `+`, `-`, `*`, `/`, `==`, `!=`, `>=`, `<=`, found `{}`",
        received
    )
}

/// Return a string describing an unexpected token where a keyword should be.
pub fn expected_keyword<T>(received: T) -> String
where
    T: Display,
{
    format!(
        "expected keyword like `if`, `for`, `set`, `block`, `macro` or `include`, found `{}`",
        received
    )
}
