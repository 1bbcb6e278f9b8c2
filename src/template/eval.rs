//! Expression evaluation.
//!
//! # Responsibilities
//! - Evaluate parsed expressions against a scope of JSON values
//! - Render values to text with fixed display rules
//! - Apply the `md5` and `tojson` filters
//!
//! # Display Rules
//! - strings verbatim, numbers in decimal
//! - booleans `True` / `False`, null `None`
//! - arrays and maps as compact JSON

use serde_json::{Map, Value};

use crate::template::parser::{Expr, Filter, Node};
use crate::template::{md5_hex, TemplateError};

pub type Scope = Map<String, Value>;

/// Render parsed nodes in order.
pub fn render_nodes(nodes: &[Node], scope: &Scope) -> Result<String, TemplateError> {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => out.push_str(&display(&evaluate(expr, scope)?)),
        }
    }
    Ok(out)
}

/// Evaluate one expression.
pub fn evaluate(expr: &Expr, scope: &Scope) -> Result<Value, TemplateError> {
    match expr {
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Int(i) => Ok(Value::from(*i)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::None => Ok(Value::Null),
        Expr::Name(name) => {
            guard_private(name)?;
            scope
                .get(name)
                .cloned()
                .ok_or_else(|| TemplateError::Undefined(format!("'{name}' is undefined")))
        }
        Expr::Attr(target, name) => {
            guard_private(name)?;
            let value = evaluate(target, scope)?;
            lookup_key(&value, name)
        }
        Expr::Index(target, index) => {
            let value = evaluate(target, scope)?;
            match evaluate(index, scope)? {
                Value::String(key) => {
                    guard_private(&key)?;
                    lookup_key(&value, &key)
                }
                Value::Number(n) => match n.as_i64() {
                    Some(i) => lookup_index(&value, i),
                    None => Err(TemplateError::Type(format!("invalid index {n}"))),
                },
                other => Err(TemplateError::Type(format!(
                    "cannot index with {}",
                    type_name(&other)
                ))),
            }
        }
        Expr::Add(left, right) => {
            let (left, right) = (evaluate(left, scope)?, evaluate(right, scope)?);
            add(&left, &right)
        }
        Expr::Concat(left, right) => {
            let mut text = display(&evaluate(left, scope)?);
            text.push_str(&display(&evaluate(right, scope)?));
            Ok(Value::String(text))
        }
        Expr::Filter(target, filter) => {
            let value = evaluate(target, scope)?;
            Ok(Value::String(apply_filter(*filter, &value)))
        }
    }
}

/// Text form of a value.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "True".into(),
        Value::Bool(false) => "False".into(),
        Value::Null => "None".into(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn apply_filter(filter: Filter, value: &Value) -> String {
    match filter {
        Filter::Md5 => md5_hex(&display(value)),
        Filter::ToJson => to_json(value),
    }
}

/// JSON encoding with keys sorted and `<`, `>`, `&`, `'` escaped.
fn to_json(value: &Value) -> String {
    let encoded = serde_json::to_string(&sorted(value)).unwrap_or_default();
    let mut out = String::with_capacity(encoded.len());
    for c in encoded.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\'' => out.push_str("\\u0027"),
            c => out.push(c),
        }
    }
    out
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn guard_private(name: &str) -> Result<(), TemplateError> {
    if name.starts_with('_') {
        return Err(TemplateError::Security(format!(
            "access to '{name}' is not allowed"
        )));
    }
    Ok(())
}

fn lookup_key(value: &Value, key: &str) -> Result<Value, TemplateError> {
    match value {
        Value::Object(map) => map
            .get(key)
            .cloned()
            .ok_or_else(|| TemplateError::Undefined(format!("no attribute or key '{key}'"))),
        other => Err(TemplateError::Undefined(format!(
            "{} has no attribute '{key}'",
            type_name(other)
        ))),
    }
}

fn lookup_index(value: &Value, index: i64) -> Result<Value, TemplateError> {
    let resolve = |len: usize| -> Option<usize> {
        let len = len as i64;
        let i = if index < 0 { len + index } else { index };
        (0..len).contains(&i).then_some(i as usize)
    };

    match value {
        Value::Array(items) => resolve(items.len())
            .map(|i| items[i].clone())
            .ok_or_else(|| TemplateError::Undefined(format!("index {index} out of range"))),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            resolve(chars.len())
                .map(|i| Value::String(chars[i].to_string()))
                .ok_or_else(|| TemplateError::Undefined(format!("index {index} out of range")))
        }
        Value::Object(map) => map
            .get(&index.to_string())
            .cloned()
            .ok_or_else(|| TemplateError::Undefined(format!("no key {index}"))),
        other => Err(TemplateError::Type(format!(
            "{} is not indexable",
            type_name(other)
        ))),
    }
}

fn add(left: &Value, right: &Value) -> Result<Value, TemplateError> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                if let Some(sum) = a.checked_add(b) {
                    return Ok(Value::from(sum));
                }
            }
            match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => Ok(Value::from(a + b)),
                _ => Err(TemplateError::Type("numeric overflow".into())),
            }
        }
        (a, b) => Err(TemplateError::Type(format!(
            "unsupported operand types for +: {} and {}",
            type_name(a),
            type_name(b)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "none",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::parser::{parse, parse_expression};
    use serde_json::json;

    fn scope() -> Scope {
        match json!({
            "request": {"id": "0190-abc", "headers": {"user-agent": "curl/8"}, "epoch": 1729117800},
            "matched": {"param": "abc"},
            "body": {"items": [1, 2, 3], "flag": true, "nothing": null},
            "query": {},
            "requestdata": "?a=1",
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn eval(source: &str) -> Result<Value, TemplateError> {
        evaluate(&parse_expression(source).unwrap(), &scope())
    }

    fn render(source: &str) -> Result<String, TemplateError> {
        render_nodes(&parse(source).unwrap(), &scope())
    }

    #[test]
    fn test_attribute_and_index_access() {
        assert_eq!(eval("matched.param").unwrap(), json!("abc"));
        assert_eq!(eval("request['headers']['user-agent']").unwrap(), json!("curl/8"));
        assert_eq!(eval("body.items[1]").unwrap(), json!(2));
        assert_eq!(eval("body.items[-1]").unwrap(), json!(3));
        assert_eq!(eval("'xyz'[0]").unwrap(), json!("x"));
    }

    #[test]
    fn test_display_rules() {
        assert_eq!(render("{{ body.flag }}/{{ body.nothing }}").unwrap(), "True/None");
        assert_eq!(render("{{ body.items }}").unwrap(), "[1,2,3]");
        assert_eq!(render("{{ request.epoch }}").unwrap(), "1729117800");
    }

    #[test]
    fn test_operators() {
        assert_eq!(eval("'a' + 'b'").unwrap(), json!("ab"));
        assert_eq!(eval("1 + 2").unwrap(), json!(3));
        assert_eq!(eval("'n=' ~ 5").unwrap(), json!("n=5"));
        assert!(matches!(eval("'a' + 1"), Err(TemplateError::Type(_))));
    }

    #[test]
    fn test_md5_filter_stringifies() {
        assert_eq!(eval("'hello' | md5").unwrap(), json!("5d41402abc4b2a76b9719d911017c592"));
        assert_eq!(eval("'' | md5").unwrap(), json!("d41d8cd98f00b204e9800998ecf8427e"));
        // 42 renders as "42" before hashing
        assert_eq!(eval("42 | md5").unwrap(), eval("'42' | md5").unwrap());
    }

    #[test]
    fn test_tojson_filter() {
        assert_eq!(
            render("{{ '<a href=\\'x\\'>&' | tojson }}").unwrap(),
            r#""\u003ca href=\u0027x\u0027\u003e\u0026""#
        );
        assert_eq!(render("{{ matched | tojson }}").unwrap(), r#"{"param":"abc"}"#);
    }

    #[test]
    fn test_undefined_names_fail() {
        assert!(matches!(eval("missing"), Err(TemplateError::Undefined(_))));
        assert!(matches!(eval("matched.nope"), Err(TemplateError::Undefined(_))));
        assert!(matches!(eval("body.items[10]"), Err(TemplateError::Undefined(_))));
    }

    #[test]
    fn test_private_access_is_security_error() {
        for source in [
            "request.__class__",
            "request['__class__']",
            "matched._private",
            "__builtins__",
        ] {
            assert!(eval(source).unwrap_err().is_security(), "{source}");
        }
    }
}
