// SPDX-License-Identifier: MIT

//! Review-verdict extraction from a review-phase dispatch's structured output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OrchestratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    ShipIt,
    NeedsMinorFixes,
    NeedsMajorRework,
}

impl ReviewVerdict {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "ship_it" => Some(ReviewVerdict::ShipIt),
            "needs_minor_fixes" => Some(ReviewVerdict::NeedsMinorFixes),
            "needs_major_rework" => Some(ReviewVerdict::NeedsMajorRework),
            _ => None,
        }
    }

    pub fn requires_another_cycle(self) -> bool {
        !matches!(self, ReviewVerdict::ShipIt)
    }
}

/// Pull `{verdict, issues}` out of a review dispatch's parsed metadata. The dispatcher
/// already enforces the narrow `{"required": [...]}` output-schema contract before a
/// review outcome reaches here, so a missing or malformed `verdict` field is always a
/// `SchemaValidation` error, never a silent default.
pub fn parse_review_output(parsed: &Option<Value>) -> Result<(ReviewVerdict, Vec<String>), OrchestratorError> {
    let Some(Value::Object(map)) = parsed else {
        return Err(OrchestratorError::SchemaValidation(
            "review dispatch produced no structured output".to_string(),
        ));
    };
    let verdict_str = map
        .get("verdict")
        .and_then(Value::as_str)
        .ok_or_else(|| OrchestratorError::SchemaValidation("review output missing verdict".to_string()))?;
    let verdict = ReviewVerdict::from_str(verdict_str)
        .ok_or_else(|| OrchestratorError::SchemaValidation(format!("unknown review verdict: {verdict_str}")))?;
    let issues = map
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();
    Ok((verdict, issues))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ship_it_needs_no_further_cycle() {
        assert!(!ReviewVerdict::ShipIt.requires_another_cycle());
        assert!(ReviewVerdict::NeedsMinorFixes.requires_another_cycle());
        assert!(ReviewVerdict::NeedsMajorRework.requires_another_cycle());
    }

    #[test]
    fn parses_verdict_and_issues() {
        let parsed = Some(json!({"verdict": "needs_minor_fixes", "issues": ["missing test"]}));
        let (verdict, issues) = parse_review_output(&parsed).unwrap();
        assert_eq!(verdict, ReviewVerdict::NeedsMinorFixes);
        assert_eq!(issues, vec!["missing test".to_string()]);
    }

    #[test]
    fn missing_metadata_is_schema_validation_error() {
        let err = parse_review_output(&None).unwrap_err();
        assert!(matches!(err, OrchestratorError::SchemaValidation(_)));
    }

    #[test]
    fn unknown_verdict_string_is_rejected() {
        let parsed = Some(json!({"verdict": "maybe"}));
        let err = parse_review_output(&parsed).unwrap_err();
        assert!(matches!(err, OrchestratorError::SchemaValidation(_)));
    }
}
