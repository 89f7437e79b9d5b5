use crate::{
    compile::Operator,
    log::{Error, INCOMPATIBLE_TYPES},
};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Upper bound on the bytes of a repeated string, and the items of a
/// repeated array.
pub const MAX_REPEAT: usize = 1 << 24;

/// Return true if the given [`Value`] is truthy.
///
/// Null, false, zero and empty strings, arrays and objects are falsy,
/// everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(bool) => *bool,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(string) => !string.is_empty(),
        Value::Array(array) => !array.is_empty(),
        Value::Object(object) => !object.is_empty(),
    }
}

/// Compare two [`Value`] instances with a comparison [`Operator`].
///
/// Equality is defined for every pair of types, where integers and floats of
/// the same magnitude are equal. Ordering is defined for numbers, strings,
/// booleans and arrays of those.
///
/// # Errors
///
/// Returns an [`Error`] if the types cannot be ordered, or the operator is
/// not a comparison.
pub fn compare_values(left: &Value, operator: Operator, right: &Value) -> Result<bool, Error> {
    match operator {
        Operator::Equal => return Ok(values_equal(left, right)),
        Operator::NotEqual => return Ok(!values_equal(left, right)),
        _ => {}
    }

    let ordering = ordering(left, right).ok_or_else(|| {
        Error::build(INCOMPATIBLE_TYPES).with_help(format!(
            "types `{}` and `{}` cannot be compared",
            type_name(left),
            type_name(right)
        ))
    })?;

    let result = match operator {
        Operator::Greater => ordering == Ordering::Greater,
        Operator::Lesser => ordering == Ordering::Less,
        Operator::GreaterOrEqual => ordering != Ordering::Less,
        Operator::LesserOrEqual => ordering != Ordering::Greater,
        unsupported => {
            return Err(Error::build(INCOMPATIBLE_TYPES)
                .with_help(format!("operator `{unsupported}` is not a comparison")))
        }
    };

    Ok(result)
}

/// Return true if the two values are equal, treating integers and floats of
/// the same magnitude as equal.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => match (as_number(left), as_number(right)) {
            (Numeric::Integer(left), Numeric::Integer(right)) => left == right,
            (left, right) => left.to_f64() == right.to_f64(),
        },
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len()
                && left.iter().zip(right).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, l)| right.get(key).is_some_and(|r| values_equal(l, r)))
        }
        (left, right) => left == right,
    }
}

/// Return the ordering of two values, if they can be ordered.
pub fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => match (as_number(left), as_number(right)) {
            (Numeric::Integer(left), Numeric::Integer(right)) => Some(left.cmp(&right)),
            (left, right) => left.to_f64().partial_cmp(&right.to_f64()),
        },
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        (Value::Array(left), Value::Array(right)) => {
            for (l, r) in left.iter().zip(right) {
                match ordering(l, r)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(left.len().cmp(&right.len()))
        }
        _ => None,
    }
}

/// Return true if `container` holds `item`.
///
/// Strings contain substrings, arrays contain equal items and objects contain
/// keys.
///
/// # Errors
///
/// Returns an [`Error`] if the container is not a string, array or object, or
/// a string is searched for something other than a string.
pub fn contains(container: &Value, item: &Value) -> Result<bool, Error> {
    match (container, item) {
        (Value::String(container), Value::String(item)) => Ok(container.contains(item.as_str())),
        (Value::String(_), item) => Err(Error::build(INCOMPATIBLE_TYPES).with_help(format!(
            "only strings can be searched for in a string, found `{}`",
            type_name(item)
        ))),
        (Value::Array(container), item) => Ok(container.iter().any(|v| values_equal(v, item))),
        (Value::Object(container), Value::String(item)) => Ok(container.contains_key(item)),
        (Value::Object(_), _) => Ok(false),
        (container, _) => Err(Error::build(INCOMPATIBLE_TYPES).with_help(format!(
            "operator `in` requires a string, array or object, found `{}`",
            type_name(container)
        ))),
    }
}

/// Apply an arithmetic [`Operator`] to two values.
///
/// Integer operations stay integers while they fit, `/` always produces a
/// float, and `//` and `%` round toward negative infinity.
///
/// # Errors
///
/// Returns an [`Error`] on division by zero, or when the operator is not
/// defined for the types.
pub fn arithmetic(left: &Value, operator: Operator, right: &Value) -> Result<Value, Error> {
    match (left, operator, right) {
        (Value::Number(l), _, Value::Number(r)) => numeric(as_number(l), operator, as_number(r)),
        (Value::String(l), Operator::Add, Value::String(r)) => Ok(Value::String(format!("{l}{r}"))),
        (Value::Array(l), Operator::Add, Value::Array(r)) => {
            Ok(Value::Array(l.iter().chain(r).cloned().collect()))
        }
        (Value::String(string), Operator::Multiply, Value::Number(n))
        | (Value::Number(n), Operator::Multiply, Value::String(string)) => {
            let count = repeat_count(n);
            repeat_size(string.len(), count)?;
            Ok(Value::String(string.repeat(count)))
        }
        (Value::Array(array), Operator::Multiply, Value::Number(n))
        | (Value::Number(n), Operator::Multiply, Value::Array(array)) => {
            let size = repeat_size(array.len(), repeat_count(n))?;
            Ok(Value::Array(array.iter().cloned().cycle().take(size).collect()))
        }
        (left, operator, right) => Err(Error::build(INCOMPATIBLE_TYPES).with_help(format!(
            "operator `{operator}` is not defined for types `{}` and `{}`",
            type_name(left),
            type_name(right)
        ))),
    }
}

/// Return the number of times a string or array is repeated.
fn repeat_count(number: &Number) -> usize {
    number
        .as_i64()
        .map(|n| usize::try_from(n).unwrap_or(0))
        .unwrap_or(0)
}

/// Return the size of `count` repetitions of something of size `len`.
///
/// # Errors
///
/// Returns an [`Error`] if the size exceeds [`MAX_REPEAT`].
fn repeat_size(len: usize, count: usize) -> Result<usize, Error> {
    len.checked_mul(count)
        .filter(|size| *size <= MAX_REPEAT)
        .ok_or_else(|| {
            Error::build("repetition too large").with_help(format!(
                "repeating {len} item(s) {count} time(s) exceeds the limit of {MAX_REPEAT}"
            ))
        })
}

/// A number, split by kind.
#[derive(Debug, Clone, Copy)]
enum Numeric {
    Integer(i64),
    Float(f64),
}

impl Numeric {
    fn to_f64(self) -> f64 {
        match self {
            Numeric::Integer(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        self.to_f64() == 0.0
    }
}

fn as_number(number: &Number) -> Numeric {
    match number.as_i64() {
        Some(i) => Numeric::Integer(i),
        None => Numeric::Float(number.as_f64().unwrap_or(f64::NAN)),
    }
}

fn numeric(left: Numeric, operator: Operator, right: Numeric) -> Result<Value, Error> {
    if matches!(
        operator,
        Operator::Divide | Operator::FloorDivide | Operator::Modulo
    ) && right.is_zero()
    {
        return Err(Error::build("division by zero")
            .with_help(format!("the right side of `{operator}` must not be zero")));
    }

    let integers = match (left, right) {
        (Numeric::Integer(l), Numeric::Integer(r)) => Some((l, r)),
        _ => None,
    };
    let (l, r) = (left.to_f64(), right.to_f64());

    let value = match operator {
        Operator::Add => integers
            .and_then(|(l, r)| l.checked_add(r))
            .map_or_else(|| Value::from(l + r), Value::from),
        Operator::Subtract => integers
            .and_then(|(l, r)| l.checked_sub(r))
            .map_or_else(|| Value::from(l - r), Value::from),
        Operator::Multiply => integers
            .and_then(|(l, r)| l.checked_mul(r))
            .map_or_else(|| Value::from(l * r), Value::from),
        Operator::Divide => Value::from(l / r),
        Operator::FloorDivide => integers
            .and_then(|(l, r)| floor_div(l, r))
            .map_or_else(|| Value::from((l / r).floor()), Value::from),
        Operator::Modulo => integers
            .and_then(|(l, r)| floor_mod(l, r))
            .map_or_else(|| Value::from(l - r * (l / r).floor()), Value::from),
        Operator::Power => integers
            .and_then(|(l, r)| u32::try_from(r).ok().and_then(|r| l.checked_pow(r)))
            .map_or_else(|| Value::from(l.powf(r)), Value::from),
        unsupported => {
            return Err(Error::build(INCOMPATIBLE_TYPES)
                .with_help(format!("operator `{unsupported}` is not arithmetic")))
        }
    };

    Ok(value)
}

/// Integer division rounding toward negative infinity.
///
/// Returns `None` on overflow or division by zero.
fn floor_div(left: i64, right: i64) -> Option<i64> {
    let quotient = left.checked_div(right)?;
    if left % right != 0 && ((left < 0) != (right < 0)) {
        Some(quotient - 1)
    } else {
        Some(quotient)
    }
}

/// Integer remainder with the sign of the divisor.
///
/// Returns `None` on overflow or division by zero.
fn floor_mod(left: i64, right: i64) -> Option<i64> {
    let remainder = left.checked_rem(right)?;
    if remainder != 0 && ((remainder < 0) != (right < 0)) {
        Some(remainder + right)
    } else {
        Some(remainder)
    }
}

/// Return the name of the type of the [`Value`], for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "none",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{arithmetic, compare_values, contains, is_truthy, MAX_REPEAT};
    use crate::compile::Operator;
    use serde_json::json;

    #[test]
    fn test_truthy() {
        let true_values = vec![
            json!("lorem"),
            json!(12),
            json!(114.4),
            json!(-12),
            json!(true),
            json!(vec!["lorem", "ipsum"]),
            json!({"lorem": "ipsum"}),
        ];
        let false_values = vec![
            json!(""),
            json!(0),
            json!(0.0),
            json!(null),
            json!(false),
            json!(vec![""; 0]),
            json!({}),
        ];

        assert!(true_values.iter().all(is_truthy));
        assert!(!false_values.iter().any(is_truthy));
    }

    #[test]
    fn test_compare_mixed_numbers() {
        assert!(compare_values(&json!(1), Operator::Equal, &json!(1.0)).unwrap());
        assert!(compare_values(&json!(2), Operator::Greater, &json!(1.5)).unwrap());
        assert!(compare_values(&json!("a"), Operator::Lesser, &json!("b")).unwrap());
        assert!(compare_values(&json!([1, 2]), Operator::Lesser, &json!([1, 3])).unwrap());
    }

    #[test]
    fn test_compare_incompatible_types() {
        assert!(compare_values(&json!("hello"), Operator::Greater, &json!(true)).is_err());
        assert!(!compare_values(&json!("hello"), Operator::Equal, &json!(true)).unwrap());
    }

    #[test]
    fn test_arithmetic_integers() {
        assert_eq!(arithmetic(&json!(7), Operator::Add, &json!(3)).unwrap(), json!(10));
        assert_eq!(arithmetic(&json!(7), Operator::Divide, &json!(2)).unwrap(), json!(3.5));
        assert_eq!(arithmetic(&json!(7), Operator::FloorDivide, &json!(2)).unwrap(), json!(3));
        assert_eq!(arithmetic(&json!(-7), Operator::FloorDivide, &json!(2)).unwrap(), json!(-4));
        assert_eq!(arithmetic(&json!(-7), Operator::Modulo, &json!(3)).unwrap(), json!(2));
        assert_eq!(arithmetic(&json!(2), Operator::Power, &json!(10)).unwrap(), json!(1024));
    }

    #[test]
    fn test_arithmetic_division_by_zero() {
        assert!(arithmetic(&json!(1), Operator::Divide, &json!(0)).is_err());
        assert!(arithmetic(&json!(1), Operator::Modulo, &json!(0.0)).is_err());
    }

    #[test]
    fn test_arithmetic_integer_overflow() {
        let min = json!(i64::MIN);

        let quotient = arithmetic(&min, Operator::FloorDivide, &json!(-1)).unwrap();
        assert_eq!(quotient.as_f64(), Some(-(i64::MIN as f64)));
        let remainder = arithmetic(&min, Operator::Modulo, &json!(-1)).unwrap();
        assert_eq!(remainder.as_f64(), Some(0.0));
        assert_eq!(arithmetic(&json!(-7), Operator::Modulo, &json!(-3)).unwrap(), json!(-1));
        assert_eq!(arithmetic(&json!(7), Operator::Modulo, &json!(-3)).unwrap(), json!(-2));
    }

    #[test]
    fn test_arithmetic_repeat_limit() {
        let error = arithmetic(&json!("ab"), Operator::Multiply, &json!(i64::MAX)).unwrap_err();
        assert_eq!(error.get_reason(), "repetition too large");
        assert!(arithmetic(&json!([1, 2]), Operator::Multiply, &json!(i64::MAX)).is_err());
        assert!(arithmetic(&json!(MAX_REPEAT as i64 + 1), Operator::Multiply, &json!("x")).is_err());
        assert_eq!(arithmetic(&json!(3), Operator::Multiply, &json!([0])).unwrap(), json!([0, 0, 0]));
    }

    #[test]
    fn test_arithmetic_sequences() {
        assert_eq!(arithmetic(&json!("ab"), Operator::Add, &json!("cd")).unwrap(), json!("abcd"));
        assert_eq!(arithmetic(&json!("ab"), Operator::Multiply, &json!(2)).unwrap(), json!("abab"));
        assert_eq!(arithmetic(&json!([1]), Operator::Add, &json!([2])).unwrap(), json!([1, 2]));
        assert!(arithmetic(&json!(true), Operator::Add, &json!(false)).is_err());
    }

    #[test]
    fn test_contains() {
        assert!(contains(&json!("hello"), &json!("ell")).unwrap());
        assert!(contains(&json!([1, 2, 3]), &json!(2.0)).unwrap());
        assert!(contains(&json!({"a": 1}), &json!("a")).unwrap());
        assert!(!contains(&json!({"a": 1}), &json!("b")).unwrap());
        assert!(contains(&json!(12), &json!(1)).is_err());
    }
}
