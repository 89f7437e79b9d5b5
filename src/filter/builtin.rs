//! Filters available in every template.
//!
//! String filters accept any input and work on its rendered text, so `none`
//! becomes the empty string.
use crate::{
    compile::tree::TestKind,
    log::Error,
    pipe::stringify,
    render::{
        check::check,
        compare::{is_truthy, ordering, type_name, values_equal, MAX_REPEAT},
    },
};
use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap};
use time::{
    format_description::{self, well_known::Rfc3339},
    Date, OffsetDateTime,
};

/// Signature shared by every built-in filter.
pub type Builtin = fn(&Value, &HashMap<String, Value>) -> Result<Value, Error>;

/// Return the built-in filter with the given name, if any.
pub fn lookup(name: &str) -> Option<Builtin> {
    let filter: Builtin = match name {
        "upper" => upper,
        "lower" => lower,
        "capitalize" => capitalize,
        "title" => title,
        "trim" => trim,
        "replace" => replace,
        "join" => join,
        "length" | "count" => length,
        "first" => first,
        "last" => last,
        "sort" => sort,
        "unique" => unique,
        "reverse" => reverse,
        "map" => map,
        "select" => select,
        "reject" => reject,
        "round" => round,
        "abs" => abs,
        "int" => int,
        "float" => float,
        "string" => string,
        "list" => list,
        "default" | "d" => default,
        "escape" | "e" => escape,
        "urlencode" => urlencode,
        "date" => date,
        "tojson" => tojson,
        "wordcount" => wordcount,
        "truncate" => truncate,
        "center" => center,
        _ => return None,
    };

    Some(filter)
}

/// Return the argument with the given name, or at the given position.
fn argument<'a>(args: &'a HashMap<String, Value>, position: usize, name: &str) -> Option<&'a Value> {
    args.get(name).or_else(|| args.get(&position.to_string()))
}

fn integer_argument(
    filter: &str,
    args: &HashMap<String, Value>,
    position: usize,
    name: &str,
) -> Result<Option<i64>, Error> {
    match argument(args, position, name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            Error::build(format!("filter `{filter}` expects an integer for `{name}`"))
                .with_help(format!("found `{}`", stringify(value)))
        }),
    }
}

fn bool_argument(args: &HashMap<String, Value>, position: usize, name: &str) -> bool {
    argument(args, position, name).is_some_and(is_truthy)
}

fn array<'a>(filter: &str, value: &'a Value) -> Result<&'a Vec<Value>, Error> {
    value.as_array().ok_or_else(|| {
        Error::build(format!("filter `{filter}` requires an array"))
            .with_help(format!("found `{}`", type_name(value)))
    })
}

fn upper(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    Ok(Value::String(stringify(value).to_uppercase()))
}

fn lower(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    Ok(Value::String(stringify(value).to_lowercase()))
}

fn capitalize(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    let text = stringify(value);
    let mut chars = text.chars();

    Ok(Value::String(match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }))
}

/// Uppercase the first letter of every word and lowercase the rest.
fn title(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    let mut result = String::new();
    let mut boundary = true;
    for char in stringify(value).chars() {
        if boundary {
            result.extend(char.to_uppercase());
        } else {
            result.extend(char.to_lowercase());
        }
        boundary = !char.is_alphanumeric();
    }

    Ok(Value::String(result))
}

fn trim(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let text = stringify(value);
    let trimmed = match argument(args, 1, "chars") {
        Some(Value::String(chars)) => text.trim_matches(|c| chars.contains(c)),
        _ => text.trim(),
    };

    Ok(Value::String(trimmed.to_string()))
}

fn replace(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let (old, new) = match (argument(args, 1, "old"), argument(args, 2, "new")) {
        (Some(old), Some(new)) => (stringify(old), stringify(new)),
        _ => {
            return Err(Error::build("filter `replace` expects `2` arguments")
                .with_help("pass the text to find and its replacement, `replace('a', 'b')`"))
        }
    };
    let text = stringify(value);

    Ok(Value::String(
        match integer_argument("replace", args, 3, "count")? {
            Some(count) => text.replacen(&old, &new, usize::try_from(count).unwrap_or(0)),
            None => text.replace(&old, &new),
        },
    ))
}

fn join(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let separator = argument(args, 1, "d").map(stringify).unwrap_or_default();
    let attribute = argument(args, 2, "attribute").map(stringify);

    let items = array("join", value)?.iter().map(|item| match &attribute {
        Some(attribute) => item.get(attribute).map(stringify).unwrap_or_default(),
        None => stringify(item),
    });

    Ok(Value::String(items.collect::<Vec<_>>().join(&separator)))
}

fn length(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    let length = match value {
        Value::String(string) => string.chars().count(),
        Value::Array(array) => array.len(),
        Value::Object(object) => object.len(),
        _ => 0,
    };

    Ok(Value::from(length))
}

fn first(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    Ok(match value {
        Value::Array(array) => array.first().cloned().unwrap_or(Value::Null),
        Value::String(string) => string
            .chars()
            .next()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

fn last(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    Ok(match value {
        Value::Array(array) => array.last().cloned().unwrap_or(Value::Null),
        Value::String(string) => string
            .chars()
            .last()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

fn sort(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let reverse = bool_argument(args, 1, "reverse");
    let attribute = argument(args, 2, "attribute").map(stringify);
    let key = |item: &Value| -> Value {
        match &attribute {
            Some(attribute) => item.get(attribute).cloned().unwrap_or(Value::Null),
            None => item.clone(),
        }
    };

    let mut items = array("sort", value)?.clone();
    items.sort_by(|a, b| ordering(&key(a), &key(b)).unwrap_or(Ordering::Equal));
    if reverse {
        items.reverse();
    }

    Ok(Value::Array(items))
}

fn unique(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    let mut items: Vec<Value> = vec![];
    for item in array("unique", value)? {
        if !items.iter().any(|seen| values_equal(seen, item)) {
            items.push(item.clone());
        }
    }

    Ok(Value::Array(items))
}

fn reverse(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    Ok(match value {
        Value::Array(array) => Value::Array(array.iter().rev().cloned().collect()),
        Value::String(string) => Value::String(string.chars().rev().collect()),
        other => other.clone(),
    })
}

/// Pick an attribute from every item with `map(attribute='name')`, or pass
/// every item through another built-in filter with `map('upper')`.
fn map(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let items = array("map", value)?;

    if let Some(attribute) = args.get("attribute") {
        let attribute = stringify(attribute);
        return Ok(Value::Array(
            items
                .iter()
                .map(|item| item.get(&attribute).cloned().unwrap_or(Value::Null))
                .collect(),
        ));
    }

    let name = argument(args, 1, "filter").map(stringify).ok_or_else(|| {
        Error::build("filter `map` expects a filter name or an attribute")
            .with_help("use `map('upper')` or `map(attribute='name')`")
    })?;
    let filter = lookup(&name)
        .ok_or_else(|| Error::build(format!("filter `map` cannot find filter `{name}`")))?;

    let rest: HashMap<String, Value> = args
        .iter()
        .filter_map(|(key, value)| {
            let position = key.parse::<usize>().ok()?;
            (position > 1).then(|| ((position - 1).to_string(), value.clone()))
        })
        .collect();

    items
        .iter()
        .map(|item| filter(item, &rest))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Keep the items that pass a test, or that are truthy when no test is named.
fn select(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    filter_by_test("select", value, args, true)
}

/// Remove the items that pass a test, or that are truthy when no test is named.
fn reject(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    filter_by_test("reject", value, args, false)
}

fn filter_by_test(
    filter: &str,
    value: &Value,
    args: &HashMap<String, Value>,
    keep: bool,
) -> Result<Value, Error> {
    let items = array(filter, value)?;
    let kind = match argument(args, 1, "test") {
        Some(name) => {
            let name = stringify(name);
            Some(TestKind::from_name(&name).ok_or_else(|| {
                Error::build(format!("filter `{filter}` cannot find test `{name}`"))
            })?)
        }
        None => None,
    };
    let test_argument = argument(args, 2, "argument");

    let mut kept = vec![];
    for item in items {
        let passed = match kind {
            Some(kind) => check(kind, Some(item), test_argument, false)?,
            None => is_truthy(item),
        };
        if passed == keep {
            kept.push(item.clone());
        }
    }

    Ok(Value::Array(kept))
}

fn round(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let number = value.as_f64().ok_or_else(|| {
        Error::build("filter `round` requires a number")
            .with_help(format!("found `{}`", type_name(value)))
    })?;
    let precision = integer_argument("round", args, 1, "precision")?.unwrap_or(0);
    let factor = 10f64.powi(i32::try_from(precision).unwrap_or(0));
    let method = argument(args, 2, "method").map(stringify);

    let scaled = number * factor;
    let rounded = match method.as_deref() {
        None | Some("common") => scaled.round(),
        Some("ceil") => scaled.ceil(),
        Some("floor") => scaled.floor(),
        Some(other) => {
            return Err(Error::build(format!("filter `round` has no method `{other}`"))
                .with_help("use `common`, `ceil` or `floor`"))
        }
    };

    Ok(Value::from(rounded / factor))
}

fn abs(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    match value {
        Value::Number(number) => match number.as_i64() {
            Some(i) => Ok(i
                .checked_abs()
                .map_or_else(|| Value::from((i as f64).abs()), Value::from)),
            None => Ok(Value::from(number.as_f64().unwrap_or(f64::NAN).abs())),
        },
        other => Err(Error::build("filter `abs` requires a number")
            .with_help(format!("found `{}`", type_name(other)))),
    }
}

fn int(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let converted = match value {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|f| f as i64)),
        Value::String(string) => {
            let string = string.trim();
            string
                .parse::<i64>()
                .ok()
                .or_else(|| string.parse::<f64>().ok().map(|f| f as i64))
        }
        Value::Bool(bool) => Some(i64::from(*bool)),
        _ => None,
    };

    Ok(match converted {
        Some(converted) => Value::from(converted),
        None => argument(args, 1, "default").cloned().unwrap_or(Value::from(0)),
    })
}

fn float(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let converted = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(string) => string.trim().parse::<f64>().ok(),
        Value::Bool(bool) => Some(if *bool { 1.0 } else { 0.0 }),
        _ => None,
    };

    Ok(match converted {
        Some(converted) => Value::from(converted),
        None => argument(args, 1, "default").cloned().unwrap_or(Value::from(0.0)),
    })
}

fn string(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    Ok(Value::String(stringify(value)))
}

fn list(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    Ok(Value::Array(match value {
        Value::Null => vec![],
        Value::Array(array) => array.clone(),
        Value::String(string) => string.chars().map(|c| Value::String(c.to_string())).collect(),
        Value::Object(object) => object.keys().cloned().map(Value::String).collect(),
        other => vec![other.clone()],
    }))
}

/// Replace a missing value.
///
/// The receiver is undefined or none when it is missing. When `boolean` is
/// true, any falsy value is replaced.
fn default(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let replace = value.is_null() || (bool_argument(args, 2, "boolean") && !is_truthy(value));
    if !replace {
        return Ok(value.clone());
    }

    Ok(argument(args, 1, "default_value")
        .cloned()
        .unwrap_or_else(|| Value::String(String::new())))
}

fn escape(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    let text = stringify(value);
    let mut escaped = String::with_capacity(text.len());
    for char in text.chars() {
        match char {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            char => escaped.push(char),
        }
    }

    Ok(Value::String(escaped))
}

/// Percent-encode a string, or a mapping as a query string.
fn urlencode(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    let encoded = match value {
        Value::Object(object) => object
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    percent_encode(key, false),
                    percent_encode(&stringify(value), false)
                )
            })
            .collect::<Vec<_>>()
            .join("&"),
        other => percent_encode(&stringify(other), true),
    };

    Ok(Value::String(encoded))
}

fn percent_encode(text: &str, keep_slash: bool) -> String {
    let mut encoded = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(char::from(byte))
            }
            b'/' if keep_slash => encoded.push('/'),
            byte => encoded.push_str(&format!("%{byte:02X}")),
        }
    }

    encoded
}

/// Format a date.
///
/// The input is a unix timestamp, an RFC 3339 string or a `YYYY-MM-DD` string.
/// The format uses the `time` format description syntax, such as
/// `[year]-[month]-[day]`, which is the default.
fn date(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let format = argument(args, 1, "format")
        .map(stringify)
        .unwrap_or_else(|| "[year]-[month]-[day]".to_string());
    let description = format_description::parse(&format).map_err(|error| {
        Error::build("filter `date` received an invalid format").with_help(error.to_string())
    })?;

    let datetime = match value {
        Value::Number(number) => {
            let seconds = number
                .as_i64()
                .or_else(|| number.as_f64().map(|f| f as i64))
                .unwrap_or_default();
            OffsetDateTime::from_unix_timestamp(seconds).map_err(|error| {
                Error::build("filter `date` received an invalid timestamp")
                    .with_help(error.to_string())
            })?
        }
        Value::String(text) => parse_datetime(text)?,
        other => {
            return Err(Error::build("filter `date` requires a timestamp or a string")
                .with_help(format!("found `{}`", type_name(other))))
        }
    };

    datetime
        .format(&description)
        .map(Value::String)
        .map_err(|error| Error::build("filter `date` failed to format").with_help(error.to_string()))
}

fn parse_datetime(text: &str) -> Result<OffsetDateTime, Error> {
    if let Ok(datetime) = OffsetDateTime::parse(text, &Rfc3339) {
        return Ok(datetime);
    }

    let description = format_description::parse("[year]-[month]-[day]").map_err(|error| {
        Error::build("filter `date` received an invalid format").with_help(error.to_string())
    })?;
    Date::parse(text, &description)
        .map(|date| date.midnight().assume_utc())
        .map_err(|error| {
            Error::build(format!("filter `date` cannot parse `{text}`"))
                .with_help(error.to_string())
        })
}

fn tojson(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let result = match argument(args, 1, "indent") {
        Some(indent) if is_truthy(indent) => serde_json::to_string_pretty(value),
        _ => serde_json::to_string(value),
    };

    result
        .map(Value::String)
        .map_err(|error| Error::build("filter `tojson` failed").with_help(error.to_string()))
}

fn wordcount(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    Ok(Value::from(stringify(value).split_whitespace().count()))
}

/// Shorten a string to `length` characters, ending with `end`.
///
/// Strings up to `leeway` characters longer than `length` are kept. Unless
/// `killwords` is true, the string is cut at the last space.
fn truncate(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let text = stringify(value);
    let length = integer_argument("truncate", args, 1, "length")?.unwrap_or(255).max(0) as usize;
    let killwords = bool_argument(args, 2, "killwords");
    let end = argument(args, 3, "end")
        .map(stringify)
        .unwrap_or_else(|| "...".to_string());
    let leeway = integer_argument("truncate", args, 4, "leeway")?.unwrap_or(5).max(0) as usize;

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= length + leeway {
        return Ok(Value::String(text));
    }

    let kept: String = chars[..length.saturating_sub(end.chars().count())]
        .iter()
        .collect();
    let kept = match (killwords, kept.rfind(' ')) {
        (false, Some(space)) => kept[..space].to_string(),
        _ => kept,
    };

    Ok(Value::String(format!("{kept}{end}")))
}

/// Center a string in a field of `width` characters.
fn center(value: &Value, args: &HashMap<String, Value>) -> Result<Value, Error> {
    let text = stringify(value);
    let width = integer_argument("center", args, 1, "width")?.unwrap_or(80).max(0);
    let width = usize::try_from(width)
        .ok()
        .filter(|width| *width <= MAX_REPEAT)
        .ok_or_else(|| {
            Error::build("filter `center` received an invalid argument")
                .with_help(format!("`width` may not exceed {MAX_REPEAT}"))
        })?;
    let len = text.chars().count();
    if len >= width {
        return Ok(Value::String(text));
    }

    let margin = width - len;
    let left = margin / 2 + (margin & width & 1);
    let right = margin - left;

    Ok(Value::String(format!(
        "{}{text}{}",
        " ".repeat(left),
        " ".repeat(right)
    )))
}

#[cfg(test)]
mod tests {
    use super::lookup;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn helper_apply(name: &str, value: Value, args: &[(&str, Value)]) -> Value {
        let args: HashMap<String, Value> = args
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        lookup(name).unwrap()(&value, &args).unwrap()
    }

    #[test]
    fn test_string_filters() {
        assert_eq!(helper_apply("upper", json!("abc"), &[]), json!("ABC"));
        assert_eq!(helper_apply("capitalize", json!("hELLO"), &[]), json!("Hello"));
        assert_eq!(helper_apply("title", json!("hello big-world"), &[]), json!("Hello Big-World"));
        assert_eq!(helper_apply("trim", json!("  a  "), &[]), json!("a"));
        assert_eq!(
            helper_apply("replace", json!("aaa"), &[("1", json!("a")), ("2", json!("b")), ("3", json!(2))]),
            json!("bba")
        );
        assert_eq!(helper_apply("upper", json!(null), &[]), json!(""));
    }

    #[test]
    fn test_sequence_filters() {
        assert_eq!(helper_apply("join", json!([1, "a"]), &[("1", json!("-"))]), json!("1-a"));
        assert_eq!(helper_apply("length", json!("héllo"), &[]), json!(5));
        assert_eq!(helper_apply("first", json!([3, 4]), &[]), json!(3));
        assert_eq!(helper_apply("last", json!("xyz"), &[]), json!("z"));
        assert_eq!(helper_apply("sort", json!([3, 1, 2]), &[]), json!([1, 2, 3]));
        assert_eq!(helper_apply("sort", json!([3, 1, 2]), &[("reverse", json!(true))]), json!([3, 2, 1]));
        assert_eq!(helper_apply("unique", json!([1, 1.0, 2]), &[]), json!([1, 2]));
        assert_eq!(helper_apply("reverse", json!("abc"), &[]), json!("cba"));
        assert_eq!(helper_apply("list", json!("ab"), &[]), json!(["a", "b"]));
    }

    #[test]
    fn test_map_select_reject() {
        let people = json!([{"name": "a", "age": 3}, {"name": "b", "age": 4}]);

        assert_eq!(helper_apply("map", people, &[("attribute", json!("name"))]), json!(["a", "b"]));
        assert_eq!(helper_apply("map", json!(["a"]), &[("1", json!("upper"))]), json!(["A"]));
        assert_eq!(helper_apply("select", json!([1, 2, 3, 4]), &[("1", json!("odd"))]), json!([1, 3]));
        assert_eq!(helper_apply("reject", json!([0, 1, "", "a"]), &[]), json!([0, ""]));
    }

    #[test]
    fn test_number_filters() {
        assert_eq!(helper_apply("round", json!(2.567), &[("1", json!(2))]), json!(2.57));
        assert_eq!(helper_apply("round", json!(2.1), &[("method", json!("ceil"))]), json!(3.0));
        assert_eq!(helper_apply("abs", json!(-4), &[]), json!(4));
        assert_eq!(helper_apply("int", json!("42"), &[]), json!(42));
        assert_eq!(helper_apply("int", json!("4.7"), &[]), json!(4));
        assert_eq!(helper_apply("int", json!("x"), &[]), json!(0));
        assert_eq!(helper_apply("float", json!("1.5"), &[]), json!(1.5));
    }

    #[test]
    fn test_default() {
        assert_eq!(helper_apply("default", json!(null), &[("1", json!("x"))]), json!("x"));
        assert_eq!(helper_apply("d", json!(""), &[("1", json!("x"))]), json!(""));
        assert_eq!(
            helper_apply("default", json!(""), &[("1", json!("x")), ("2", json!(true))]),
            json!("x")
        );
    }

    #[test]
    fn test_escape_and_urlencode() {
        assert_eq!(helper_apply("e", json!("<a href=\"x\">'</a>"), &[]), json!("&lt;a href=&#34;x&#34;&gt;&#39;&lt;/a&gt;"));
        assert_eq!(helper_apply("urlencode", json!("a b/c&"), &[]), json!("a%20b/c%26"));
        assert_eq!(helper_apply("urlencode", json!({"q": "a b", "n": 1}), &[]), json!("q=a%20b&n=1"));
    }

    #[test]
    fn test_date() {
        assert_eq!(helper_apply("date", json!(0), &[]), json!("1970-01-01"));
        assert_eq!(
            helper_apply("date", json!("2024-03-05"), &[("1", json!("[day]/[month]/[year]"))]),
            json!("05/03/2024")
        );
        assert_eq!(
            helper_apply("date", json!("2024-03-05T10:20:30Z"), &[("1", json!("[hour]:[minute]"))]),
            json!("10:20")
        );
    }

    #[test]
    fn test_text_filters() {
        assert_eq!(helper_apply("tojson", json!({"a": [1, null]}), &[]), json!("{\"a\":[1,null]}"));
        assert_eq!(helper_apply("wordcount", json!("one two  three"), &[]), json!(3));
        assert_eq!(
            helper_apply("truncate", json!("hello world foo bar"), &[("1", json!(9))]),
            json!("hello...")
        );
        assert_eq!(
            helper_apply("truncate", json!("hello world foo bar"), &[("1", json!(9)), ("killwords", json!(true))]),
            json!("hello ...")
        );
        assert_eq!(helper_apply("center", json!("ab"), &[("1", json!(6))]), json!("  ab  "));
        assert_eq!(helper_apply("center", json!("a"), &[("1", json!(4))]), json!(" a  "));
        assert_eq!(helper_apply("center", json!("a"), &[("1", json!(-4))]), json!("a"));
    }

    #[test]
    fn test_center_width_limit() {
        let args: HashMap<String, Value> = [("width".to_string(), json!(i64::MAX))].into();
        let error = lookup("center").unwrap()(&json!("a"), &args).unwrap_err();

        assert_eq!(error.get_reason(), "filter `center` received an invalid argument");
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(lookup("nope").is_none());
    }
}
