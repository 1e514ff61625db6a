use serde::{Deserialize, Serialize};

pub mod check;
pub mod observation;
pub mod target;

// Re-exports for convenience
pub use check::CheckResult;
pub use observation::Observation;
pub use target::Target;

/// How a target's raw response is turned into a value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMethod {
    /// CSS selector against an HTML document.
    Dom,
    /// Dot/bracket path into a JSON document.
    Json,
}

impl std::str::FromStr for ExtractMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dom" => Ok(ExtractMethod::Dom),
            "json" => Ok(ExtractMethod::Json),
            other => Err(format!("unknown method '{other}', expected 'dom' or 'json'")),
        }
    }
}

impl std::fmt::Display for ExtractMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractMethod::Dom => write!(f, "dom"),
            ExtractMethod::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_method_serialization() {
        assert_eq!(
            serde_json::to_string(&ExtractMethod::Dom).unwrap(),
            "\"dom\""
        );
        assert_eq!(
            serde_json::to_string(&ExtractMethod::Json).unwrap(),
            "\"json\""
        );
    }

    #[test]
    fn test_extract_method_deserialization() {
        assert_eq!(
            serde_json::from_str::<ExtractMethod>("\"dom\"").unwrap(),
            ExtractMethod::Dom
        );
        assert_eq!(
            serde_json::from_str::<ExtractMethod>("\"json\"").unwrap(),
            ExtractMethod::Json
        );
    }

    #[test]
    fn test_extract_method_from_str() {
        assert_eq!("dom".parse::<ExtractMethod>().unwrap(), ExtractMethod::Dom);
        assert_eq!("JSON".parse::<ExtractMethod>().unwrap(), ExtractMethod::Json);
        assert!("xpath".parse::<ExtractMethod>().is_err());
    }

    #[test]
    fn test_extract_method_display() {
        assert_eq!(ExtractMethod::Dom.to_string(), "dom");
        assert_eq!(ExtractMethod::Json.to_string(), "json");
    }
}
