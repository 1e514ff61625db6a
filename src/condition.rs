use serde_json::Value;

use crate::utils::error::ConditionError;

/// A parsed alert condition. Expressions are parsed once at configuration
/// load so malformed input fails there; evaluation itself cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    /// Empty expression: any truthy extracted value counts as in stock.
    Truthy,
    /// `bool:<true|false>`: truthiness of the value must equal the payload.
    Bool(bool),
    /// `text:'<literal>'`: case-insensitive containment.
    Text(String),
    /// `contains:'<literal>'`: case-sensitive containment.
    Contains(String),
    /// `exists`: value is not null.
    Exists,
}

impl Expect {
    pub fn parse(raw: &str) -> Result<Self, ConditionError> {
        let expression = raw.trim();
        if expression.is_empty() {
            return Ok(Expect::Truthy);
        }
        if expression.eq_ignore_ascii_case("exists") {
            return Ok(Expect::Exists);
        }
        let Some((kind, payload)) = expression.split_once(':') else {
            return Err(invalid(raw, "expected kind:payload"));
        };
        let payload = strip_quotes(payload.trim());
        match kind.trim().to_ascii_lowercase().as_str() {
            "bool" => match payload.to_ascii_lowercase().as_str() {
                "true" => Ok(Expect::Bool(true)),
                "false" => Ok(Expect::Bool(false)),
                _ => Err(invalid(raw, "bool payload must be true or false")),
            },
            "text" => {
                if payload.is_empty() {
                    Err(invalid(raw, "text payload must not be empty"))
                } else {
                    Ok(Expect::Text(payload.to_string()))
                }
            }
            "contains" => {
                if payload.is_empty() {
                    Err(invalid(raw, "contains payload must not be empty"))
                } else {
                    Ok(Expect::Contains(payload.to_string()))
                }
            }
            "exists" => {
                if payload.is_empty() {
                    Ok(Expect::Exists)
                } else {
                    Err(invalid(raw, "exists takes no payload"))
                }
            }
            other => Err(invalid(raw, &format!("unknown kind '{other}'"))),
        }
    }

    /// Turns an extracted value into an in-stock verdict.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Expect::Truthy => is_truthy(value),
            Expect::Bool(expected) => is_truthy(value) == *expected,
            Expect::Text(needle) => value_text(value)
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Expect::Contains(needle) => value_text(value).contains(needle.as_str()),
            Expect::Exists => !value.is_null(),
        }
    }
}

fn invalid(expression: &str, message: &str) -> ConditionError {
    ConditionError::InvalidExpression {
        expression: expression.to_string(),
        message: message.to_string(),
    }
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Null, false, "", and 0 are falsy; everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
