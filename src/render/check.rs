use crate::{
    compile::tree::TestKind,
    log::{Error, INVALID_TEST},
    render::compare::{type_name, values_equal},
};
use serde_json::Value;

/// Evaluate an `is` test.
///
/// The operand is `None` when it is undefined. Only `defined` and `undefined`
/// can be true for an undefined operand.
///
/// `callable` is decided by the compiler, which knows the macros of the
/// template.
///
/// # Errors
///
/// Returns an [`Error`] if the test requires a number and the operand is
/// not one, or `divisibleby` is given zero.
pub fn check(
    kind: TestKind,
    operand: Option<&Value>,
    argument: Option<&Value>,
    callable: bool,
) -> Result<bool, Error> {
    let value = match (kind, operand) {
        (TestKind::Defined, operand) => return Ok(operand.is_some()),
        (TestKind::Undefined, operand) => return Ok(operand.is_none()),
        (TestKind::Callable, _) => return Ok(callable),
        (_, None) => return Ok(false),
        (_, Some(value)) => value,
    };
    let argument = argument.unwrap_or(&Value::Null);

    let result = match kind {
        TestKind::None => value.is_null(),
        TestKind::Even => integer(kind, value)? % 2 == 0,
        TestKind::Odd => integer(kind, value)? % 2 != 0,
        TestKind::DivisibleBy => {
            let divisor = integer(kind, argument)?;
            if divisor == 0 {
                return Err(Error::build(INVALID_TEST)
                    .with_help("test `divisibleby` requires a divisor other than zero"));
            }
            integer(kind, value)? % divisor == 0
        }
        TestKind::Iterable => matches!(
            value,
            Value::Array(_) | Value::Object(_) | Value::String(_)
        ),
        TestKind::Number => value.is_number(),
        TestKind::String => value.is_string(),
        TestKind::Mapping => value.is_object(),
        TestKind::Sequence => matches!(
            value,
            Value::Array(_) | Value::Object(_) | Value::String(_)
        ),
        TestKind::SameAs => value == argument,
        TestKind::Lower => value.as_str().is_some_and(|s| {
            s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase)
        }),
        TestKind::Upper => value.as_str().is_some_and(|s| {
            s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
        }),
        TestKind::EqualTo => values_equal(value, argument),
        TestKind::Escaped => false,
        TestKind::Defined | TestKind::Undefined | TestKind::Callable => unreachable!(),
    };

    Ok(result)
}

/// Return the [`Value`] as an integer, accepting floats with no fraction.
fn integer(kind: TestKind, value: &Value) -> Result<i64, Error> {
    let number = value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| f as i64)
    });

    number.ok_or_else(|| {
        Error::build(INVALID_TEST).with_help(format!(
            "test `{kind:?}` requires an integer, found `{}`",
            type_name(value)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::check;
    use crate::compile::tree::TestKind;
    use serde_json::json;

    #[test]
    fn test_check_undefined_operand() {
        assert!(check(TestKind::Undefined, None, None, false).unwrap());
        assert!(!check(TestKind::Defined, None, None, false).unwrap());
        assert!(!check(TestKind::None, None, None, false).unwrap());
        assert!(check(TestKind::None, Some(&json!(null)), None, false).unwrap());
    }

    #[test]
    fn test_check_numbers() {
        assert!(check(TestKind::Even, Some(&json!(4)), None, false).unwrap());
        assert!(check(TestKind::Odd, Some(&json!(3.0)), None, false).unwrap());
        assert!(check(TestKind::DivisibleBy, Some(&json!(9)), Some(&json!(3)), false).unwrap());
        assert!(check(TestKind::DivisibleBy, Some(&json!(9)), Some(&json!(0)), false).is_err());
        assert!(check(TestKind::Even, Some(&json!("four")), None, false).is_err());
    }

    #[test]
    fn test_check_strings() {
        assert!(check(TestKind::Lower, Some(&json!("abc 1")), None, false).unwrap());
        assert!(!check(TestKind::Lower, Some(&json!("Abc")), None, false).unwrap());
        assert!(check(TestKind::Upper, Some(&json!("ABC")), None, false).unwrap());
        assert!(!check(TestKind::Upper, Some(&json!("123")), None, false).unwrap());
    }

    #[test]
    fn test_check_types() {
        assert!(check(TestKind::Mapping, Some(&json!({})), None, false).unwrap());
        assert!(check(TestKind::Iterable, Some(&json!([])), None, false).unwrap());
        assert!(!check(TestKind::Iterable, Some(&json!(1)), None, false).unwrap());
        assert!(check(TestKind::EqualTo, Some(&json!(1)), Some(&json!(1.0)), false).unwrap());
        assert!(!check(TestKind::SameAs, Some(&json!(1)), Some(&json!(1.0)), false).unwrap());
        assert!(check(TestKind::Callable, None, None, true).unwrap());
    }
}
