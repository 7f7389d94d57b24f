//! Typed results of classification calls.
//!
//! Structured classifier output is converted here and nowhere else. Missing
//! or malformed fields take the documented default.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field the grading prompts answer in.
pub const VERDICT_FIELD: &str = "binary_score";

/// Field the routing prompt answers in.
pub const INTENT_FIELD: &str = "datasource";

/// Binary gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Yes,
    No,
}

impl Verdict {
    /// Read a verdict from classifier output; anything but a clear "yes" is `No`.
    pub fn from_structured(value: &Value) -> Self {
        let field = match value {
            Value::Object(map) => map.get(VERDICT_FIELD),
            other => Some(other),
        };

        match field {
            Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("yes") => Verdict::Yes,
            Some(Value::Bool(true)) => Verdict::Yes,
            _ => Verdict::No,
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, Verdict::Yes)
    }
}

/// Whether a question needs document grounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Conversational,
    Technical,
}

impl Intent {
    /// Read an intent from classifier output; anything but a clear
    /// "conversational" is `Technical`.
    pub fn from_structured(value: &Value) -> Self {
        let field = match value {
            Value::Object(map) => map.get(INTENT_FIELD),
            other => Some(other),
        };

        match field {
            Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("conversational") => {
                Intent::Conversational
            }
            _ => Intent::Technical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Conversational => "conversational",
            Intent::Technical => "technical",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verdict_yes_forms() {
        for value in [
            json!({"binary_score": "yes"}),
            json!({"binary_score": " YES "}),
            json!({"binary_score": true}),
            json!("yes"),
        ] {
            assert_eq!(Verdict::from_structured(&value), Verdict::Yes, "{}", value);
        }
    }

    #[test]
    fn test_verdict_fails_closed() {
        for value in [
            json!({"binary_score": "no"}),
            json!({"binary_score": "maybe"}),
            json!({"score": "yes"}),
            json!({"binary_score": 1}),
            json!(["yes"]),
            json!(null),
            json!("yes please"),
        ] {
            assert_eq!(Verdict::from_structured(&value), Verdict::No, "{}", value);
        }
    }

    #[test]
    fn test_intent_defaults_to_technical() {
        assert_eq!(
            Intent::from_structured(&json!({"datasource": "Conversational"})),
            Intent::Conversational
        );
        assert_eq!(
            Intent::from_structured(&json!("conversational")),
            Intent::Conversational
        );

        for value in [
            json!({"datasource": "technical"}),
            json!({"datasource": "vectorstore"}),
            json!({}),
            json!(null),
            json!(42),
        ] {
            assert_eq!(Intent::from_structured(&value), Intent::Technical, "{}", value);
        }
    }

    #[test]
    fn test_serialized_forms() {
        assert_eq!(serde_json::to_value(Verdict::Yes).unwrap(), json!("yes"));
        assert_eq!(serde_json::to_value(Intent::Technical).unwrap(), json!("technical"));
    }
}
