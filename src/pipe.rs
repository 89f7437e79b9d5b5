use serde_json::{Map, Value};
use std::fmt::{Arguments, Display, Result, Write};

/// Wraps some underlying buffer by providing methods that write to it
/// in different formats.
///
/// Blocks, macros and call blocks render into their own buffer, each with a
/// separate [`Pipe`].
pub struct Pipe<'buffer> {
    buffer: &'buffer mut (dyn Write + 'buffer),
}

impl<'buffer> Pipe<'buffer> {
    /// Create a new Pipe that writes to the given buffer.
    pub fn new(buffer: &'buffer mut String) -> Self {
        Self { buffer }
    }

    /// Write the given Value to the Pipe buffer.
    ///
    /// Null writes nothing and strings are written without quotes. Arrays and
    /// objects are written in the bracketed form used by the template language,
    /// where nested strings are quoted.
    ///
    /// # Errors
    ///
    /// The Pipe supports all Value types, so the only error that will
    /// be returned is propagated from the [write!] macro itself.
    pub fn write_value(&mut self, value: &Value) -> Result {
        match value {
            Value::Null => Ok(()),
            Value::String(string) => self.write_str(string),
            Value::Array(array) => self.write_array(array),
            Value::Object(object) => self.write_object(object),
            _ => self.write_display(value),
        }
    }

    /// Write a Value nested in an array or object.
    fn write_nested(&mut self, value: &Value) -> Result {
        match value {
            Value::Null => write!(self.buffer, "none"),
            Value::String(string) => self.write_quoted(string),
            _ => self.write_value(value),
        }
    }

    /// Write the value to the buffer using the Display implementation.
    fn write_display(&mut self, value: impl Display) -> Result {
        write!(self.buffer, "{}", value)
    }

    /// Write the string surrounded by single quotes.
    fn write_quoted(&mut self, string: &str) -> Result {
        write!(self.buffer, "'")?;
        for char in string.chars() {
            match char {
                '\'' => write!(self.buffer, "\\'")?,
                '\\' => write!(self.buffer, "\\\\")?,
                char => self.buffer.write_char(char)?,
            }
        }
        write!(self.buffer, "'")
    }

    /// Write the value to the buffer as a comma separated list and
    /// surrounded by brackets.
    fn write_array(&mut self, value: &[Value]) -> Result {
        write!(self.buffer, "[")?;
        for (index, item) in value.iter().enumerate() {
            if index > 0 {
                write!(self.buffer, ", ")?;
            }
            self.write_nested(item)?;
        }
        write!(self.buffer, "]")
    }

    /// Write the value to the buffer as key/value pairs and surrounded
    /// by curly braces.
    fn write_object(&mut self, value: &Map<String, Value>) -> Result {
        write!(self.buffer, "{{")?;
        for (index, (key, value)) in value.iter().enumerate() {
            if index > 0 {
                write!(self.buffer, ", ")?;
            }
            self.write_quoted(key)?;
            write!(self.buffer, ": ")?;
            self.write_nested(value)?;
        }
        write!(self.buffer, "}}")
    }
}

impl Write for Pipe<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> Result {
        Write::write_str(self.buffer, s)
    }

    #[inline]
    fn write_char(&mut self, c: char) -> Result {
        Write::write_char(self.buffer, c)
    }

    #[inline]
    fn write_fmt(&mut self, args: Arguments<'_>) -> Result {
        Write::write_fmt(self.buffer, args)
    }
}

/// Return the text a [`Value`] renders as.
pub fn stringify(value: &Value) -> String {
    if let Value::String(string) = value {
        return string.clone();
    }

    let mut buffer = String::new();
    // Writing to a String cannot fail.
    let _ = Pipe::new(&mut buffer).write_value(value);

    buffer
}

#[cfg(test)]
mod tests {
    use super::stringify;
    use serde_json::json;

    #[test]
    fn test_stringify_scalars() {
        assert_eq!(stringify(&json!(null)), "");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!(12)), "12");
        assert_eq!(stringify(&json!(1.5)), "1.5");
        assert_eq!(stringify(&json!("it's")), "it's");
    }

    #[test]
    fn test_stringify_collections() {
        assert_eq!(stringify(&json!(["a", 1, null])), "['a', 1, none]");
        assert_eq!(stringify(&json!({"a": "it's", "b": [true]})), "{'a': 'it\\'s', 'b': [true]}");
        assert_eq!(stringify(&json!([])), "[]");
    }
}
