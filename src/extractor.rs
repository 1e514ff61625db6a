use scraper::{Html, Selector};
use serde_json::Value;

use crate::models::ExtractMethod;
use crate::utils::error::ExtractError;

/// Pulls a single scalar value out of a fetched body. DOM extraction takes
/// the text of the first element matching a CSS selector; JSON extraction
/// resolves a dot/bracket path and insists on a leaf.
pub fn extract(body: &str, method: ExtractMethod, rule: &str) -> Result<Value, ExtractError> {
    match method {
        ExtractMethod::Dom => extract_dom(body, rule),
        ExtractMethod::Json => extract_json(body, rule),
    }
}

/// Validates a rule without a document, so config loading can fail fast on
/// selectors and paths that could never work.
pub fn validate_rule(method: ExtractMethod, rule: &str) -> Result<(), ExtractError> {
    match method {
        ExtractMethod::Dom => {
            parse_selector(rule)?;
        }
        ExtractMethod::Json => {
            parse_path(rule)?;
        }
    }
    Ok(())
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{e:?}"),
    })
}

fn extract_dom(body: &str, selector: &str) -> Result<Value, ExtractError> {
    let parsed = parse_selector(selector)?;
    let document = Html::parse_document(body);
    let Some(element) = document.select(&parsed).next() else {
        return Err(ExtractError::NoMatch {
            selector: selector.to_string(),
        });
    };
    let text = element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();
    Ok(Value::String(text))
}

fn extract_json(body: &str, path: &str) -> Result<Value, ExtractError> {
    let document: Value = serde_json::from_str(body)?;
    let segments = parse_path(path)?;
    let mut current = &document;
    for segment in &segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key),
            (Segment::Index(index), Value::Array(items)) => items.get(*index),
            _ => None,
        }
        .ok_or_else(|| ExtractError::PathNotFound {
            path: path.to_string(),
        })?;
    }
    // Objects and arrays are never stringified into a value.
    if current.is_object() || current.is_array() {
        return Err(ExtractError::NonLeaf {
            path: path.to_string(),
        });
    }
    Ok(current.clone())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Parses paths like `a.b`, `items[2].name` or `data['k']`. An empty path
/// addresses the document root.
fn parse_path(path: &str) -> Result<Vec<Segment>, ExtractError> {
    let path = path.trim();
    let invalid = |message: &str| ExtractError::InvalidPath {
        path: path.to_string(),
        message: message.to_string(),
    };

    let mut segments = Vec::new();
    if path.is_empty() {
        return Ok(segments);
    }

    let mut chars = path.chars().peekable();
    let mut expect_key = true;
    loop {
        match chars.peek() {
            None => break,
            Some('.') => {
                chars.next();
                if chars.peek().is_none() {
                    return Err(invalid("trailing '.'"));
                }
                expect_key = true;
            }
            Some('[') => {
                chars.next();
                let mut content = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    content.push(c);
                }
                if !closed {
                    return Err(invalid("unterminated '['"));
                }
                let content = content.trim();
                if let Some(key) = strip_bracket_quotes(content) {
                    if key.is_empty() {
                        return Err(invalid("empty bracket key"));
                    }
                    segments.push(Segment::Key(key.to_string()));
                } else {
                    let index = content
                        .parse::<usize>()
                        .map_err(|_| invalid("bracket index must be an integer or quoted key"))?;
                    segments.push(Segment::Index(index));
                }
                expect_key = false;
            }
            Some(_) => {
                if !expect_key {
                    return Err(invalid("expected '.' or '[' between segments"));
                }
                let mut key = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '.' || c == '[' {
                        break;
                    }
                    key.push(c);
                    chars.next();
                }
                segments.push(Segment::Key(key));
                expect_key = false;
            }
        }
    }
    Ok(segments)
}

fn strip_bracket_quotes(content: &str) -> Option<&str> {
    for quote in ['\'', '"'] {
        if content.len() >= 2 && content.starts_with(quote) && content.ends_with(quote) {
            return Some(&content[1..content.len() - 1]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PRODUCT_PAGE: &str = r#"
        <html>
            <body>
                <div class="title">Sayaka 40g</div>
                <div class="product-form">
                    <button class="buy">Add <span>to</span> Cart</button>
                    <button class="buy">Notify Me</button>
                </div>
            </body>
        </html>
    "#;

    #[test]
    fn test_dom_extracts_first_match_text() {
        let value = extract(PRODUCT_PAGE, ExtractMethod::Dom, ".buy").unwrap();
        assert_eq!(value, json!("Add to Cart"));
    }

    #[test]
    fn test_dom_no_match_is_an_error() {
        let err = extract(PRODUCT_PAGE, ExtractMethod::Dom, ".sold-out").unwrap_err();
        assert!(matches!(err, ExtractError::NoMatch { .. }));
    }

    #[test]
    fn test_dom_invalid_selector_is_an_error() {
        let err = extract(PRODUCT_PAGE, ExtractMethod::Dom, "div >").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidSelector { .. }));
    }

    #[test]
    fn test_json_resolves_nested_path() {
        let body = r#"{"a":{"b":"in stock"}}"#;
        let value = extract(body, ExtractMethod::Json, "a.b").unwrap();
        assert_eq!(value, json!("in stock"));
    }

    #[test]
    fn test_json_non_leaf_is_an_error_not_a_string() {
        let body = r#"{"a":{"b":{"c":1}}}"#;
        let err = extract(body, ExtractMethod::Json, "a.b").unwrap_err();
        assert!(matches!(err, ExtractError::NonLeaf { .. }));
    }

    #[test]
    fn test_json_missing_path_is_an_error() {
        let body = r#"{"a":{"b":1}}"#;
        let err = extract(body, ExtractMethod::Json, "a.c").unwrap_err();
        assert!(matches!(err, ExtractError::PathNotFound { .. }));
    }

    #[test]
    fn test_json_index_and_quoted_key_segments() {
        let body = r#"{"items":[{"name":"first"},{"name":"second"}],"weird key":true}"#;
        assert_eq!(
            extract(body, ExtractMethod::Json, "items[1].name").unwrap(),
            json!("second")
        );
        assert_eq!(
            extract(body, ExtractMethod::Json, "['weird key']").unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_json_index_into_object_is_path_not_found() {
        let body = r#"{"a":{"b":1}}"#;
        let err = extract(body, ExtractMethod::Json, "a[0]").unwrap_err();
        assert!(matches!(err, ExtractError::PathNotFound { .. }));
    }

    #[test]
    fn test_json_empty_path_addresses_the_root() {
        assert_eq!(extract("42", ExtractMethod::Json, "").unwrap(), json!(42));

        let err = extract(r#"{"a":1}"#, ExtractMethod::Json, "").unwrap_err();
        assert!(matches!(err, ExtractError::NonLeaf { .. }));
    }

    #[test]
    fn test_json_invalid_document() {
        let err = extract("{not json", ExtractMethod::Json, "a").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidJson(_)));
    }

    #[test]
    fn test_path_syntax_errors() {
        for path in ["a.", "a[", "a[x]", "a['']", "a[0]b"] {
            let err = parse_path(path).unwrap_err();
            assert!(
                matches!(err, ExtractError::InvalidPath { .. }),
                "path '{path}' should be invalid"
            );
        }
    }

    #[test]
    fn test_validate_rule_catches_bad_rules_without_a_document() {
        assert!(validate_rule(ExtractMethod::Dom, ".price").is_ok());
        assert!(validate_rule(ExtractMethod::Dom, ">>>").is_err());
        assert!(validate_rule(ExtractMethod::Json, "a.b[0]").is_ok());
        assert!(validate_rule(ExtractMethod::Json, "a[").is_err());
    }

    #[test]
    fn test_json_null_leaf_is_a_value() {
        let body = r#"{"a":null}"#;
        assert_eq!(extract(body, ExtractMethod::Json, "a").unwrap(), json!(null));
    }
}
